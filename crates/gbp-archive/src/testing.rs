//! Fixtures shared by unit tests, integration tests and the CLI tests.
//!
//! Compiled for tests and with the `testing` feature.

pub use crate::store::memory::{MemoryRecordStore, MemoryStorage};

use crate::build::Build;
use crate::record::{BuildRecord, RecordOverrides};
use crate::store::RecordStore;
use chrono::{TimeZone, Utc};

/// `(machine, build_id, completed day of February 2025, completed hour)`.
const SEED: &[(&str, &str, u32, u32)] = &[
    ("lighthouse", "1", 19, 9),
    ("lighthouse", "2", 20, 9),
    ("lighthouse", "3", 21, 12),
    ("polaris", "1", 20, 18),
    ("polaris", "2", 22, 6),
    ("babette", "1", 21, 0),
];

/// Six records: `lighthouse` 1-3, `polaris` 1-2 and `babette` 1.
pub fn seed_records() -> Vec<BuildRecord> {
    SEED.iter()
        .map(|&(machine, id, day, hour)| {
            let mut record = BuildRecord::new(build(machine, id));
            record.submitted = Utc.with_ymd_and_hms(2025, 2, day, hour, 0, 0).single();
            record.built = Utc.with_ymd_and_hms(2025, 2, day, hour, 20, 0).single();
            record.completed = Utc.with_ymd_and_hms(2025, 2, day, hour, 25, 30).single();
            record.logs = Some(format!("build log for {}.{}\n", machine, id));
            record
        })
        .collect()
}

pub fn build(machine: &str, build_id: &str) -> Build {
    match Build::new(machine, build_id) {
        Ok(build) => build,
        Err(e) => panic!("bad fixture build {}.{}: {}", machine, build_id, e),
    }
}

/// Save every record into `store`.
pub fn seed_store(store: &dyn RecordStore) {
    for record in seed_records() {
        if let Err(e) = store.save(record, RecordOverrides::default()) {
            panic!("seeding records failed: {}", e);
        }
    }
}

/// Memory collaborators holding the seed records and one artifact per build.
pub fn seeded_stores() -> (MemoryRecordStore, MemoryStorage) {
    let records = MemoryRecordStore::new();
    seed_store(&records);

    let storage = MemoryStorage::new();
    for record in seed_records() {
        storage.put(&record.build, format!("artifacts of {}", record.build));
    }
    (records, storage)
}
