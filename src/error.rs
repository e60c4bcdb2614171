use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbTuneError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("database connection error: {0}")]
    Connection(String),

    #[error("knob apply error: {0}")]
    KnobApply(String),

    #[error("restart error: {0}")]
    Restart(String),

    #[error("query error: {0}")]
    Query(String),

    #[error("subprocess error: {0}")]
    Subprocess(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("optimizer error: {0}")]
    Optimizer(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl From<tokio_postgres::Error> for DbTuneError {
    fn from(e: tokio_postgres::Error) -> Self {
        DbTuneError::Connection(e.to_string())
    }
}

impl From<serde_json::Error> for DbTuneError {
    fn from(e: serde_json::Error) -> Self {
        DbTuneError::Serialization(e.to_string())
    }
}

impl From<toml::de::Error> for DbTuneError {
    fn from(e: toml::de::Error) -> Self {
        DbTuneError::Config(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DbTuneError>;
