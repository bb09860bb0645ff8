//! Error types for the records store and artifact storage.

use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    /// No record (or artifacts) for the build.
    #[error("build not found: {build}")]
    NotFound { build: String },

    #[error("database error: {0}")]
    Database(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Stored data (a row, a tag file, a nested tar entry) is not what it should be.
    #[error("corrupt store data: {0}")]
    Corrupt(String),

    /// An observer callback failed while the store was reporting progress.
    #[error("observer failed: {0:#}")]
    Observer(anyhow::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl StoreError {
    pub fn not_found(build: impl ToString) -> Self {
        Self::NotFound {
            build: build.to_string(),
        }
    }

    pub fn corrupt(detail: impl Into<String>) -> Self {
        Self::Corrupt(detail.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "NotFound",
            Self::Database(_) => "Database",
            Self::Io(_) => "Io",
            Self::Corrupt(_) => "Corrupt",
            Self::Observer(_) => "Observer",
            Self::Other(_) => "Other",
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}
