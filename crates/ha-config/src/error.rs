use std::path::PathBuf;

use thiserror::Error;

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Why a configuration directory could not be read
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid YAML in {}: {source}", path.display())]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("!secret {0} is not defined in secrets.yaml")]
    MissingSecret(String),

    #[error("!env_var {0} is not set")]
    MissingEnvVar(String),

    /// `chain` lists the files from the outermost include to the repeated one
    #[error("include cycle: {}", chain.iter().map(|p| p.display().to_string()).collect::<Vec<_>>().join(" -> "))]
    IncludeCycle { chain: Vec<PathBuf> },

    #[error("{tag} expects a string, got {found}")]
    TagArgument { tag: String, found: String },

    #[error("invalid value for '{key}': {reason}")]
    InvalidValue { key: String, reason: String },
}
