use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Write conflict on {table}/{key}")]
    WriteConflict { table: String, key: String },

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("Record '{key}' not found in '{table}'")]
    NotFound { table: String, key: String },

    #[error("Transaction error: {0}")]
    TransactionError(String),

    #[error("Policy violation: {0}")]
    PolicyViolation(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Application(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Returns `true` for failures a fresh attempt may not hit again.
    ///
    /// Only write-write conflicts detected at commit are transient.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::WriteConflict { .. })
    }

    pub fn application(message: impl Into<String>) -> Self {
        Error::Application(message.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
