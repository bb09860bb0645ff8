use crate::build::IdentityError;
use crate::record::BuildRecord;
use crate::records::RecordsError;
use crate::registry::{Record, RegistryError};
use crate::store::StoreError;
use serde::Serialize;

/// Stable error codes for archive failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorCode {
    // Container structure
    TruncatedArchive,
    UnexpectedMember,
    MemberTooLarge,
    // Payload decoding
    ShapeMismatch,
    Conversion,
    InvalidJson,
    InvalidManifest,
    // Collaborators
    Io,
    Store,
    Observer,
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    /// The container ended before member `position` (1-based).
    #[error("truncated archive: member {position} ({expected}) is missing")]
    Truncated {
        position: usize,
        expected: &'static str,
    },

    #[error("unexpected archive member {position}: expected '{expected}', found '{found}'")]
    UnexpectedMember {
        position: usize,
        expected: &'static str,
        found: String,
    },

    #[error("archive member '{member}' declares {size} bytes, limit is {limit}")]
    MemberTooLarge {
        member: &'static str,
        size: u64,
        limit: u64,
    },

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid manifest entry: {0}")]
    Manifest(#[from] IdentityError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Store(StoreError),

    #[error("observer failed: {0:#}")]
    Observer(anyhow::Error),
}

impl ArchiveError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Truncated { .. } => ErrorCode::TruncatedArchive,
            Self::UnexpectedMember { .. } => ErrorCode::UnexpectedMember,
            Self::MemberTooLarge { .. } => ErrorCode::MemberTooLarge,
            Self::Registry(RegistryError::ShapeMismatch { .. }) => ErrorCode::ShapeMismatch,
            Self::Registry(RegistryError::Conversion { .. }) => ErrorCode::Conversion,
            Self::Json(_) => ErrorCode::InvalidJson,
            Self::Manifest(_) => ErrorCode::InvalidManifest,
            Self::Io(_) => ErrorCode::Io,
            Self::Store(_) => ErrorCode::Store,
            Self::Observer(_) => ErrorCode::Observer,
        }
    }
}

// Observer failures raised inside a collaborator surface as observer failures.
impl From<StoreError> for ArchiveError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Observer(e) => Self::Observer(e),
            other => Self::Store(other),
        }
    }
}

impl From<RecordsError> for ArchiveError {
    fn from(err: RecordsError) -> Self {
        match err {
            RecordsError::Json(e) => Self::Json(e),
            RecordsError::NotAnArray => Self::Registry(RegistryError::shape(
                BuildRecord::KIND,
                "records member is not a JSON array",
            )),
            RecordsError::Registry(e) => Self::Registry(e),
            RecordsError::Store(e) => e.into(),
            RecordsError::Observer(e) => Self::Observer(e),
        }
    }
}
