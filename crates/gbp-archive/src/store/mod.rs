//! Collaborators the archive pipeline talks to: a records store and an
//! artifact storage backend.
//!
//! Both traits take `&self`; implementations guard their state internally so a
//! single store can be shared by the archiver and the buildspec resolver.

mod error;
pub mod fs;
mod schema;
pub mod sqlite;

#[cfg(any(test, feature = "testing"))]
pub mod memory;

pub use error::{StoreError, StoreResult};
pub use fs::FsStorage;
pub use schema::RECORDS_SCHEMA;
pub use sqlite::SqliteRecordStore;

use crate::build::Build;
use crate::observer::ArchiveObserver;
use crate::record::{BuildRecord, RecordOverrides};
use std::io::{Read, Write};

/// Persistent build records.
pub trait RecordStore {
    /// Machines that have at least one record, sorted.
    fn list_machines(&self) -> StoreResult<Vec<String>>;

    /// Every record of `machine`, in build order.
    fn for_machine(&self, machine: &str) -> StoreResult<Vec<BuildRecord>>;

    /// The record for `build`, or [`StoreError::NotFound`].
    fn get(&self, build: &Build) -> StoreResult<BuildRecord>;

    /// Insert or replace the record, applying `overrides` first. Returns the
    /// record as stored: a missing `submitted` time is set to now.
    fn save(&self, record: BuildRecord, overrides: RecordOverrides) -> StoreResult<BuildRecord>;

    fn exists(&self, build: &Build) -> StoreResult<bool>;

    /// Remove the record. Removing a missing record is not an error.
    fn delete(&self, build: &Build) -> StoreResult<()>;
}

/// Artifact storage backend.
///
/// `dump` and `restore` exchange an opaque byte stream; the archive only frames
/// it. Implementations report `(direction, Storage, build)` progress through the
/// observer and must fail with [`StoreError::Observer`] when it does.
pub trait ArtifactStorage {
    fn dump(
        &self,
        builds: &[Build],
        sink: &mut dyn Write,
        observer: &mut dyn ArchiveObserver,
    ) -> StoreResult<()>;

    /// Restore from a stream written by `dump`. Returns the builds restored.
    fn restore(
        &self,
        source: &mut dyn Read,
        observer: &mut dyn ArchiveObserver,
    ) -> StoreResult<Vec<Build>>;

    /// The build `<machine>@<tag>` points at. An empty tag means the
    /// published build.
    fn resolve_tag(&self, machine: &str, tag: &str) -> StoreResult<Option<Build>>;

    /// Whether artifacts for `build` are present.
    fn pulled(&self, build: &Build) -> StoreResult<bool>;
}

/// Every record in `store`, machine by machine.
pub fn all_records(store: &dyn RecordStore) -> StoreResult<Vec<BuildRecord>> {
    let mut records = Vec::new();
    for machine in store.list_machines()? {
        records.extend(store.for_machine(&machine)?);
    }
    Ok(records)
}

/// Apply overrides and fill in `submitted` the way every store does on save.
pub(crate) fn normalize(record: BuildRecord, overrides: RecordOverrides) -> BuildRecord {
    let mut record = record.with_overrides(overrides);
    if record.submitted.is_none() {
        record.submitted = Some(chrono::Utc::now());
    }
    record
}
