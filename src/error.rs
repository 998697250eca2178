use thiserror::Error;

/// Input rejected before it can become an intent
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("timer name must not be empty")]
    EmptyName,

    #[error("invalid duration '{0}': expected HH:MM[:SS] or a form like 1h30m")]
    InvalidDuration(String),

    #[error("hourly rate must be a non-negative number, got {0}")]
    InvalidRate(f64),
}

/// Failure applying an intent to the store
#[derive(Debug, Error, PartialEq)]
pub enum StoreError {
    #[error("malformed snapshot: {0}")]
    MalformedSnapshot(String),
}

impl StoreError {
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedSnapshot(msg.into())
    }
}

/// Failure reading or writing the persisted snapshot
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("storage io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("stored snapshot is not valid json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Failure producing or reading an export file
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("export io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Store(#[from] StoreError),
}
