//! Record codec: the `records.json` member.
//!
//! Encoding is plain serde: each record is written as a flat JSON object, in
//! input order. Decoding parses the array generically and rebuilds each element
//! through a [`TypeRegistry`].

use crate::observer::{ArchiveObserver, Direction, Phase};
use crate::record::{BuildRecord, RecordOverrides};
use crate::registry::{Record, RegistryError, TypeRegistry};
use crate::store::{RecordStore, StoreError};
use serde::Serialize;
use serde_json::Value;
use std::io::Write;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum RecordsError {
    #[error("records JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("records JSON: expected an array of records")]
    NotAnArray,

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("observer failed: {0:#}")]
    Observer(anyhow::Error),
}

pub fn encode<R: Serialize>(records: &[R]) -> serde_json::Result<Vec<u8>> {
    serde_json::to_vec(records)
}

/// Decode a JSON array into records of type `R`, in order.
pub fn decode<R: Record>(bytes: &[u8], registry: &TypeRegistry) -> Result<Vec<R>, RecordsError> {
    decode_array(bytes)?
        .into_iter()
        .map(|value| registry.reconstruct_value(value).map_err(RecordsError::from))
        .collect()
}

fn decode_array(bytes: &[u8]) -> Result<Vec<Value>, RecordsError> {
    match serde_json::from_slice(bytes)? {
        Value::Array(values) => Ok(values),
        _ => Err(RecordsError::NotAnArray),
    }
}

/// Write `records` as JSON to `out`, reporting `(Dump, Records, build)` for each
/// record before anything is written.
pub fn dump(
    records: &[BuildRecord],
    out: &mut dyn Write,
    observer: &mut dyn ArchiveObserver,
) -> Result<(), RecordsError> {
    for record in records {
        observer
            .progress(Direction::Dump, Phase::Records, &record.build)
            .map_err(RecordsError::Observer)?;
    }
    serde_json::to_writer(out, records)?;
    Ok(())
}

/// Decode `bytes` and persist each record as it is decoded.
///
/// Records are saved one at a time; a failure leaves the records before it
/// saved. Returns the records as the store returned them.
pub fn restore(
    bytes: &[u8],
    registry: &TypeRegistry,
    store: &dyn RecordStore,
    observer: &mut dyn ArchiveObserver,
) -> Result<Vec<BuildRecord>, RecordsError> {
    let values = decode_array(bytes)?;
    let mut restored = Vec::with_capacity(values.len());

    for value in values {
        let record: BuildRecord = registry.reconstruct_value(value)?;
        observer
            .progress(Direction::Restore, Phase::Records, &record.build)
            .map_err(RecordsError::Observer)?;

        let saved = store.save(record, RecordOverrides::default())?;
        debug!(build = %saved.build, "record restored");
        restored.push(saved);
    }

    Ok(restored)
}
