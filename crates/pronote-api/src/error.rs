use thiserror::Error;

/// Errors raised by a Pronote client or connector
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ClientError {
    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("cannot connect to {0}")]
    Connection(String),

    #[error("QR code login failed: {0}")]
    QrCode(String),

    #[error("child {0} not found on this account")]
    ChildNotFound(String),

    /// The server answered but refused this category
    #[error("{0} unavailable")]
    Unavailable(String),

    #[error("parse error: {0}")]
    Parse(String),
}

pub type ClientResult<T> = Result<T, ClientError>;
