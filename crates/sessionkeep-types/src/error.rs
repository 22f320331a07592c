use thiserror::Error;

/// Errors from backend operations (used by trait definitions in sessionkeep-core).
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database connection error")]
    Connection,

    #[error("query error: {0}")]
    Query(String),

    #[error("entity not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

/// Errors from the tag-and-base64 credential encoding.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("malformed JSON payload: {0}")]
    Json(String),

    #[error("invalid base64 in buffer payload: {0}")]
    InvalidBase64(String),

    #[error("invalid buffer tag: {0}")]
    InvalidBufferTag(String),
}

/// Errors raised while loading `sessionkeep.toml`.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(String),
}
