//! Dump and restore Gentoo Build Publisher builds as a single streamable archive.
//!
//! An archive is a plain tar stream with exactly three members, in order:
//!
//! ```text
//! gbp-archive    # metadata JSON (version, created, hostname, manifest)
//! records.json   # JSON array of build records
//! storage.tar    # the storage backend's own nested tar
//! ```
//!
//! The writer ([`Archiver::dump`]) and the reader ([`Archiver::restore`]) are
//! forward-only, so archives can be piped. Records are decoded through a
//! [`TypeRegistry`] that knows how to turn wire values (ISO-8601 strings) back
//! into typed fields.

pub mod archive;
pub mod build;
pub mod buildspec;
pub mod config;
pub mod metadata;
pub mod observer;
pub mod record;
pub mod records;
pub mod registry;
pub mod store;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Convenience re-exports
pub use archive::{
    tabulate, ArchiveError, Archiver, ErrorCode, RestoreSummary, DEFAULT_SPOOL_THRESHOLD,
    MAX_METADATA_BYTES, METADATA_MEMBER, RECORDS_MEMBER, STORAGE_MEMBER,
};
pub use build::{Build, IdentityError};
pub use buildspec::{
    filter_newer, resolve_buildspecs, select_records, BuildSpec, BuildSpecLookupError,
    ResolveError,
};
pub use config::{ArchiveConfig, ConfigError, ConfigOverrides};
pub use metadata::{Metadata, METADATA_VERSION};
pub use observer::{ArchiveObserver, Direction, NoopObserver, Phase};
pub use record::{BuildRecord, RecordOverrides};
pub use records::RecordsError;
pub use registry::{
    ConversionError, FieldValue, Fields, Record, RegistryError, TypeRegistry, TypedValue,
};
pub use store::{ArtifactStorage, FsStorage, RecordStore, SqliteRecordStore, StoreError, StoreResult};
