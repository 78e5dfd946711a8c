//! Reading `configuration.yaml` and the files it includes

use std::path::{Path, PathBuf};

use serde_yaml::value::TaggedValue;
use serde_yaml::{Mapping, Value};
use tracing::{debug, trace};

use crate::error::{ConfigError, ConfigResult};
use crate::secrets::Secrets;

enum Tag {
    Include(String),
    Secret(String),
    EnvVar(String),
}

impl Tag {
    /// `None` for tags the loader leaves alone
    fn parse(tagged: &TaggedValue) -> ConfigResult<Option<Self>> {
        let name = tagged.tag.to_string();
        let build: fn(String) -> Tag = match name.as_str() {
            "!include" => Tag::Include,
            "!secret" => Tag::Secret,
            "!env_var" => Tag::EnvVar,
            _ => return Ok(None),
        };
        match &tagged.value {
            Value::String(argument) => Ok(Some(build(argument.clone()))),
            other => Err(ConfigError::TagArgument {
                tag: name,
                found: format!("{:?}", other),
            }),
        }
    }
}

/// Resolves `!secret`, `!env_var` and `!include` while reading YAML
///
/// Includes are relative to the including file. Unknown tags are kept
/// with their content resolved.
pub struct YamlLoader {
    config_dir: PathBuf,
    secrets: Secrets,
    /// Files being read, outermost first
    reading: Vec<PathBuf>,
}

impl YamlLoader {
    pub fn new(config_dir: impl Into<PathBuf>) -> ConfigResult<Self> {
        let config_dir = config_dir.into();
        let secrets = Secrets::load(&config_dir)?;
        Ok(Self::with_secrets(config_dir, secrets))
    }

    pub fn with_secrets(config_dir: impl Into<PathBuf>, secrets: Secrets) -> Self {
        Self {
            config_dir: config_dir.into(),
            secrets,
            reading: Vec::new(),
        }
    }

    pub fn load_file(&mut self, file: impl AsRef<Path>) -> ConfigResult<Value> {
        let path = self.config_dir.join(file);
        self.read(path)
    }

    fn read(&mut self, path: PathBuf) -> ConfigResult<Value> {
        if self.reading.contains(&path) {
            let mut chain = self.reading.clone();
            chain.push(path);
            return Err(ConfigError::IncludeCycle { chain });
        }

        debug!("Reading {}", path.display());
        let content = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;

        self.reading.push(path.clone());
        let value = self.load_string(&content, &path);
        self.reading.pop();
        value
    }

    /// Parse `content` as if read from `source`
    pub fn load_string(&mut self, content: &str, source: &Path) -> ConfigResult<Value> {
        let raw = serde_yaml::from_str(content).map_err(|err| ConfigError::Yaml {
            path: source.to_path_buf(),
            source: err,
        })?;
        self.resolve(raw, source)
    }

    fn resolve(&mut self, value: Value, source: &Path) -> ConfigResult<Value> {
        Ok(match value {
            Value::Mapping(mapping) => {
                let mut resolved = Mapping::with_capacity(mapping.len());
                for (key, value) in mapping {
                    resolved.insert(key, self.resolve(value, source)?);
                }
                Value::Mapping(resolved)
            }
            Value::Sequence(items) => Value::Sequence(
                items
                    .into_iter()
                    .map(|item| self.resolve(item, source))
                    .collect::<ConfigResult<_>>()?,
            ),
            Value::Tagged(tagged) => self.resolve_tag(*tagged, source)?,
            scalar => scalar,
        })
    }

    fn resolve_tag(&mut self, tagged: TaggedValue, source: &Path) -> ConfigResult<Value> {
        match Tag::parse(&tagged)? {
            Some(Tag::Include(file)) => {
                let dir = source.parent().unwrap_or(&self.config_dir);
                let path = dir.join(&file);
                trace!("Including {}", path.display());
                self.read(path)
            }
            Some(Tag::Secret(key)) => self
                .secrets
                .get(&key)
                .map(|secret| Value::String(secret.to_string()))
                .ok_or(ConfigError::MissingSecret(key)),
            Some(Tag::EnvVar(var)) => std::env::var(&var)
                .map(Value::String)
                .map_err(|_| ConfigError::MissingEnvVar(var)),
            None => {
                let value = self.resolve(tagged.value, source)?;
                Ok(Value::Tagged(Box::new(TaggedValue {
                    tag: tagged.tag,
                    value,
                })))
            }
        }
    }
}

/// Read `<config_dir>/<file>` with every tag resolved
pub fn load_yaml(config_dir: impl Into<PathBuf>, file: impl AsRef<Path>) -> ConfigResult<Value> {
    YamlLoader::new(config_dir)?.load_file(file)
}

/// Parse YAML text with every tag resolved, includes relative to `config_dir`
pub fn load_yaml_string(
    config_dir: impl Into<PathBuf>,
    content: &str,
    source_name: &str,
) -> ConfigResult<Value> {
    let config_dir = config_dir.into();
    let source = config_dir.join(source_name);
    YamlLoader::new(config_dir)?.load_string(content, &source)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config_dir(files: &[(&str, &str)]) -> TempDir {
        let dir = TempDir::new().unwrap();
        for (name, content) in files {
            std::fs::write(dir.path().join(name), content).unwrap();
        }
        dir
    }

    #[test]
    fn test_secret_inside_integration_list() {
        let dir = config_dir(&[
            ("secrets.yaml", "lea_password: secret123\n"),
            (
                "configuration.yaml",
                "pronote:\n  - data:\n      username: lea\n      password: !secret lea_password\n",
            ),
        ]);

        let value = load_yaml(dir.path(), "configuration.yaml").unwrap();
        assert_eq!(value["pronote"][0]["data"]["password"], "secret123");
    }

    #[test]
    fn test_include_is_relative_to_including_file() {
        let dir = config_dir(&[("configuration.yaml", "pronote: !include accounts/all.yaml\n")]);
        std::fs::create_dir(dir.path().join("accounts")).unwrap();
        std::fs::write(dir.path().join("accounts/all.yaml"), "!include lea.yaml\n").unwrap();
        std::fs::write(dir.path().join("accounts/lea.yaml"), "- fixture: lea.json\n").unwrap();

        let value = load_yaml(dir.path(), "configuration.yaml").unwrap();
        assert_eq!(value["pronote"][0]["fixture"], "lea.json");
    }

    #[test]
    fn test_env_var() {
        let dir = config_dir(&[(
            "configuration.yaml",
            "url: !env_var HA_CONFIG_TEST_PRONOTE_URL\n",
        )]);
        std::env::set_var(
            "HA_CONFIG_TEST_PRONOTE_URL",
            "https://demo.index-education.net/pronote/",
        );

        let value = load_yaml(dir.path(), "configuration.yaml").unwrap();
        assert_eq!(value["url"], "https://demo.index-education.net/pronote/");
        std::env::remove_var("HA_CONFIG_TEST_PRONOTE_URL");

        let err = load_yaml(dir.path(), "configuration.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(var) if var == "HA_CONFIG_TEST_PRONOTE_URL"));
    }

    #[test]
    fn test_include_cycle_lists_chain() {
        let dir = config_dir(&[("a.yaml", "b: !include b.yaml\n"), ("b.yaml", "a: !include a.yaml\n")]);

        match load_yaml(dir.path(), "a.yaml") {
            Err(ConfigError::IncludeCycle { chain }) => {
                let names: Vec<_> = chain
                    .iter()
                    .map(|p| p.file_name().unwrap().to_str().unwrap())
                    .collect();
                assert_eq!(names, vec!["a.yaml", "b.yaml", "a.yaml"]);
            }
            other => panic!("expected an include cycle, got {:?}", other),
        }
    }

    #[test]
    fn test_tag_errors() {
        let dir = config_dir(&[]);

        let err = load_yaml_string(dir.path(), "password: !secret nonexistent\n", "c.yaml");
        assert!(matches!(err, Err(ConfigError::MissingSecret(key)) if key == "nonexistent"));

        let err = load_yaml_string(dir.path(), "password: !secret [a, b]\n", "c.yaml");
        assert!(matches!(err, Err(ConfigError::TagArgument { .. })));
    }

    #[test]
    fn test_unknown_tag_kept() {
        let dir = config_dir(&[]);
        let value = load_yaml_string(dir.path(), "when: !input start\n", "c.yaml").unwrap();
        assert!(matches!(value["when"], Value::Tagged(_)));
    }
}
