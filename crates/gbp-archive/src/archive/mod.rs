//! The archive container: three tar members in a fixed order.
//!
//! | # | Member         | Content                        |
//! |---|----------------|--------------------------------|
//! | 1 | `gbp-archive`  | metadata JSON                  |
//! | 2 | `records.json` | JSON array of build records    |
//! | 3 | `storage.tar`  | the storage backend's own dump |
//!
//! Both directions are single-pass over a byte stream.

mod errors;
mod read;
mod stage;
mod write;

pub use errors::{ArchiveError, ErrorCode};
pub use read::tabulate;

use crate::build::Build;
use crate::metadata::Metadata;
use crate::record::BuildRecord;
use crate::registry::TypeRegistry;
use crate::store::{ArtifactStorage, RecordStore};

pub const METADATA_MEMBER: &str = "gbp-archive";
pub const RECORDS_MEMBER: &str = "records.json";
pub const STORAGE_MEMBER: &str = "storage.tar";

/// Upper bound on the metadata member. It only ever holds a manifest.
pub const MAX_METADATA_BYTES: u64 = 10 * 1024 * 1024;

/// Payloads larger than this are staged on disk rather than in memory.
pub const DEFAULT_SPOOL_THRESHOLD: usize = 8 * 1024 * 1024;

/// Dumps builds to, and restores builds from, an archive stream.
pub struct Archiver<'a> {
    records: &'a dyn RecordStore,
    storage: &'a dyn ArtifactStorage,
    registry: &'a TypeRegistry,
    spool_threshold: usize,
}

impl<'a> Archiver<'a> {
    pub fn new(
        records: &'a dyn RecordStore,
        storage: &'a dyn ArtifactStorage,
        registry: &'a TypeRegistry,
    ) -> Self {
        Self {
            records,
            storage,
            registry,
            spool_threshold: DEFAULT_SPOOL_THRESHOLD,
        }
    }

    pub fn with_spool_threshold(mut self, bytes: usize) -> Self {
        self.spool_threshold = bytes;
        self
    }
}

/// What a restore applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreSummary {
    pub metadata: Metadata,
    /// Records as saved by the records store, in archive order.
    pub records: Vec<BuildRecord>,
    /// Builds the storage backend restored artifacts for.
    pub artifacts: Vec<Build>,
}
