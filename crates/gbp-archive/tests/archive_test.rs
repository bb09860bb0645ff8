//! Container-level tests: round trips, determinism and structural failures.

use chrono::{DateTime, FixedOffset, Local, TimeZone, Utc};
use gbp_archive::observer::ArchiveObserver;
use gbp_archive::store::{RecordStore, StoreError, StoreResult};
use gbp_archive::testing::{build, seed_records, seeded_stores, MemoryRecordStore, MemoryStorage};
use gbp_archive::{
    tabulate, ArchiveError, Archiver, ArtifactStorage, Build, Direction, ErrorCode, Metadata,
    NoopObserver, Phase, TypeRegistry, METADATA_MEMBER, RECORDS_MEMBER, STORAGE_MEMBER,
};
use std::cell::Cell;
use std::io::{Read, Write};

fn all_builds() -> Vec<Build> {
    seed_records().into_iter().map(|r| r.build).collect()
}

fn dump(records: &MemoryRecordStore, storage: &MemoryStorage, builds: &[Build]) -> Vec<u8> {
    let registry = TypeRegistry::standard();
    let mut out = Vec::new();
    Archiver::new(records, storage, &registry)
        .dump(builds, &mut out, &mut NoopObserver)
        .unwrap();
    out
}

/// `(name, body)` of every member, in order.
fn members(bytes: &[u8]) -> Vec<(String, Vec<u8>)> {
    let mut archive = tar::Archive::new(bytes);
    archive
        .entries()
        .unwrap()
        .map(|entry| {
            let mut entry = entry.unwrap();
            let name = entry.path().unwrap().to_string_lossy().into_owned();
            let mut body = Vec::new();
            entry.read_to_end(&mut body).unwrap();
            (name, body)
        })
        .collect()
}

/// Re-pack members into a container, in the given order.
fn container(members: &[(&str, &[u8])]) -> Vec<u8> {
    let mut tar = tar::Builder::new(Vec::new());
    for (name, body) in members {
        let mut header = tar::Header::new_gnu();
        header.set_path(name).unwrap();
        header.set_size(body.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        tar.append(&header, *body).unwrap();
    }
    tar.into_inner().unwrap()
}

// ============================================================================
// Round trip
// ============================================================================

#[test]
fn test_round_trip_restores_records_and_artifacts() {
    let (records, storage) = seeded_stores();
    let bytes = dump(&records, &storage, &all_builds());

    let target_records = MemoryRecordStore::new();
    let target_storage = MemoryStorage::new();
    let registry = TypeRegistry::standard();
    let summary = Archiver::new(&target_records, &target_storage, &registry)
        .restore(bytes.as_slice(), &mut NoopObserver)
        .unwrap();

    let mut expected = seed_records();
    expected.sort_by(|a, b| a.build.cmp(&b.build));
    assert_eq!(summary.records, expected);
    assert_eq!(summary.artifacts.len(), 6);
    assert_eq!(summary.metadata.manifest.len(), 6);
    for record in &expected {
        assert_eq!(target_records.get(&record.build).unwrap(), *record);
        assert_eq!(
            target_storage.artifact(&record.build),
            storage.artifact(&record.build)
        );
    }
}

#[test]
fn test_container_has_three_members_in_order() {
    let (records, storage) = seeded_stores();
    let bytes = dump(&records, &storage, &all_builds());

    let names: Vec<String> = members(&bytes).into_iter().map(|(name, _)| name).collect();

    assert_eq!(names, vec![METADATA_MEMBER, RECORDS_MEMBER, STORAGE_MEMBER]);
}

#[test]
fn test_metadata_member_shape() {
    let (records, storage) = seeded_stores();
    let bytes = dump(&records, &storage, &[build("polaris", "2"), build("babette", "1")]);

    let metadata: serde_json::Value = serde_json::from_slice(&members(&bytes)[0].1).unwrap();

    assert_eq!(metadata["version"], 1);
    assert_eq!(metadata["manifest"], serde_json::json!(["babette.1", "polaris.2"]));
    assert!(metadata["hostname"].is_string());
    assert!(metadata["created"].as_str().unwrap().contains('T'));
}

#[test]
fn test_tabulate_reads_manifest() {
    let (records, storage) = seeded_stores();
    let bytes = dump(&records, &storage, &[build("lighthouse", "3"), build("lighthouse", "1")]);

    assert_eq!(
        tabulate(bytes.as_slice()).unwrap(),
        vec![build("lighthouse", "1"), build("lighthouse", "3")]
    );
}

// ============================================================================
// Determinism
// ============================================================================

#[test]
fn test_dumps_differ_only_in_created() {
    let (records, storage) = seeded_stores();
    let registry = TypeRegistry::standard();
    let archiver = Archiver::new(&records, &storage, &registry);

    let mut builds = all_builds();
    let mut first = Vec::new();
    archiver
        .dump_at(&builds, Utc.timestamp_opt(1_700_000_000, 0).unwrap(), &mut first, &mut NoopObserver)
        .unwrap();

    builds.reverse();
    let mut second = Vec::new();
    archiver
        .dump_at(&builds, Utc.timestamp_opt(1_700_086_400, 0).unwrap(), &mut second, &mut NoopObserver)
        .unwrap();

    let first = members(&first);
    let second = members(&second);
    let m1: Metadata = serde_json::from_slice(&first[0].1).unwrap();
    let m2: Metadata = serde_json::from_slice(&second[0].1).unwrap();

    assert_eq!(m1.manifest, m2.manifest);
    assert_ne!(m1.created, m2.created);
    assert_eq!(first[1].1, second[1].1, "records.json must be byte-identical");
    assert_eq!(first[2].1, second[2].1);
}

#[test]
fn test_same_instant_is_byte_identical() {
    let (records, storage) = seeded_stores();
    let registry = TypeRegistry::standard();
    let archiver = Archiver::new(&records, &storage, &registry);
    let created = Utc.timestamp_opt(1_700_000_000, 0).unwrap();

    let mut first = Vec::new();
    let mut second = Vec::new();
    archiver
        .dump_at(&all_builds(), created, &mut first, &mut NoopObserver)
        .unwrap();
    archiver
        .dump_at(&all_builds(), created, &mut second, &mut NoopObserver)
        .unwrap();

    assert_eq!(first, second);
}

#[test]
fn test_created_keeps_offset_and_mtime_is_the_instant() {
    let (records, storage) = seeded_stores();
    let registry = TypeRegistry::standard();
    let created = FixedOffset::east_opt(5 * 3600 + 1800)
        .unwrap()
        .timestamp_opt(1_700_000_000, 0)
        .unwrap();

    let mut out = Vec::new();
    Archiver::new(&records, &storage, &registry)
        .dump_at(&all_builds(), created, &mut out, &mut NoopObserver)
        .unwrap();

    let mut archive = tar::Archive::new(out.as_slice());
    let mut entry = archive.entries().unwrap().next().unwrap().unwrap();
    assert_eq!(entry.header().mtime().unwrap(), 1_700_000_000);
    let metadata: Metadata = serde_json::from_reader(&mut entry).unwrap();
    assert_eq!(metadata.created, "2023-11-15T03:43:20+05:30");
}

#[test]
fn test_dump_stamps_local_time() {
    let (records, storage) = seeded_stores();
    let bytes = dump(&records, &storage, &[build("babette", "1")]);

    let metadata: Metadata = serde_json::from_slice(&members(&bytes)[0].1).unwrap();
    let created = DateTime::parse_from_rfc3339(&metadata.created).unwrap();

    assert_eq!(
        created.offset().local_minus_utc(),
        Local::now().offset().local_minus_utc()
    );
}

#[test]
fn test_small_spool_threshold_spills_without_changing_output() {
    let (records, storage) = seeded_stores();
    let registry = TypeRegistry::standard();
    let created = Utc.timestamp_opt(1_700_000_000, 0).unwrap();

    let mut in_memory = Vec::new();
    Archiver::new(&records, &storage, &registry)
        .dump_at(&all_builds(), created, &mut in_memory, &mut NoopObserver)
        .unwrap();
    let mut spilled = Vec::new();
    Archiver::new(&records, &storage, &registry)
        .with_spool_threshold(16)
        .dump_at(&all_builds(), created, &mut spilled, &mut NoopObserver)
        .unwrap();

    assert_eq!(in_memory, spilled);
}

// ============================================================================
// Structural failures
// ============================================================================

#[test]
fn test_records_before_metadata_is_unexpected_member() {
    let (records, storage) = seeded_stores();
    let bytes = dump(&records, &storage, &all_builds());
    let m = members(&bytes);
    let reordered = container(&[
        (RECORDS_MEMBER, m[1].1.as_slice()),
        (METADATA_MEMBER, m[0].1.as_slice()),
        (STORAGE_MEMBER, m[2].1.as_slice()),
    ]);

    let target = MemoryRecordStore::new();
    let registry = TypeRegistry::standard();
    let err = Archiver::new(&target, &MemoryStorage::new(), &registry)
        .restore(reordered.as_slice(), &mut NoopObserver)
        .unwrap_err();

    match err {
        ArchiveError::UnexpectedMember {
            position,
            expected,
            found,
        } => {
            assert_eq!(position, 1);
            assert_eq!(expected, METADATA_MEMBER);
            assert_eq!(found, RECORDS_MEMBER);
        }
        other => panic!("expected UnexpectedMember, got {}", other),
    }
    assert!(target.is_empty());
}

/// Storage that counts restore calls and can be told to fail.
#[derive(Default)]
struct SpyStorage {
    inner: MemoryStorage,
    restores: Cell<usize>,
    fail_restore: bool,
}

impl ArtifactStorage for SpyStorage {
    fn dump(
        &self,
        builds: &[Build],
        sink: &mut dyn Write,
        observer: &mut dyn ArchiveObserver,
    ) -> StoreResult<()> {
        self.inner.dump(builds, sink, observer)
    }

    fn restore(
        &self,
        source: &mut dyn Read,
        observer: &mut dyn ArchiveObserver,
    ) -> StoreResult<Vec<Build>> {
        self.restores.set(self.restores.get() + 1);
        if self.fail_restore {
            return Err(StoreError::corrupt("disk full"));
        }
        self.inner.restore(source, observer)
    }

    fn resolve_tag(&self, machine: &str, tag: &str) -> StoreResult<Option<Build>> {
        self.inner.resolve_tag(machine, tag)
    }

    fn pulled(&self, build: &Build) -> StoreResult<bool> {
        self.inner.pulled(build)
    }
}

#[test]
fn test_missing_storage_member_is_truncated() {
    let (records, storage) = seeded_stores();
    let bytes = dump(&records, &storage, &all_builds());
    let m = members(&bytes);
    let truncated = container(&[(METADATA_MEMBER, m[0].1.as_slice()), (RECORDS_MEMBER, m[1].1.as_slice())]);

    let target = MemoryRecordStore::new();
    let spy = SpyStorage::default();
    let registry = TypeRegistry::standard();
    let err = Archiver::new(&target, &spy, &registry)
        .restore(truncated.as_slice(), &mut NoopObserver)
        .unwrap_err();

    assert_eq!(err.code(), ErrorCode::TruncatedArchive);
    assert!(matches!(err, ArchiveError::Truncated { position: 3, expected } if expected == STORAGE_MEMBER));
    // No rollback: the records member was already applied.
    assert_eq!(target.len(), 6);
    assert_eq!(spy.restores.get(), 0);
}

#[test]
fn test_empty_input_is_truncated_at_first_member() {
    let registry = TypeRegistry::standard();
    let err = Archiver::new(&MemoryRecordStore::new(), &MemoryStorage::new(), &registry)
        .restore(container(&[]).as_slice(), &mut NoopObserver)
        .unwrap_err();

    assert!(matches!(err, ArchiveError::Truncated { position: 1, .. }));
}

/// A member whose header declares `declared` bytes, followed by only `body`.
fn forged_member(name: &str, declared: u64, body: &[u8]) -> Vec<u8> {
    let mut header = tar::Header::new_gnu();
    header.set_path(name).unwrap();
    header.set_size(declared);
    header.set_mode(0o644);
    header.set_cksum();

    let mut bytes = header.as_bytes().to_vec();
    bytes.extend_from_slice(body);
    bytes.resize(bytes.len().div_ceil(512) * 512, 0);
    bytes
}

#[test]
fn test_oversized_metadata_header_is_rejected() {
    let forged = forged_member(METADATA_MEMBER, 1 << 42, br#"{"version":1}"#);

    let err = tabulate(forged.as_slice()).unwrap_err();
    assert_eq!(err.code(), ErrorCode::MemberTooLarge);

    let target = MemoryRecordStore::new();
    let registry = TypeRegistry::standard();
    let err = Archiver::new(&target, &MemoryStorage::new(), &registry)
        .restore(forged.as_slice(), &mut NoopObserver)
        .unwrap_err();
    assert!(matches!(
        err,
        ArchiveError::MemberTooLarge {
            member: METADATA_MEMBER,
            ..
        }
    ));
    assert!(target.is_empty());
}

#[test]
fn test_records_member_shorter_than_declared_is_an_error() {
    let (records, storage) = seeded_stores();
    let bytes = dump(&records, &storage, &all_builds());
    let metadata = &members(&bytes)[0].1;

    let mut forged = forged_member(METADATA_MEMBER, metadata.len() as u64, metadata);
    forged.extend(forged_member(RECORDS_MEMBER, 1 << 42, b"[]"));

    let target = MemoryRecordStore::new();
    let registry = TypeRegistry::standard();
    let err = Archiver::new(&target, &MemoryStorage::new(), &registry)
        .restore(forged.as_slice(), &mut NoopObserver)
        .unwrap_err();

    assert_eq!(err.code(), ErrorCode::Io);
    assert!(target.is_empty());
}

#[test]
fn test_storage_failure_leaves_records_applied() {
    let (records, storage) = seeded_stores();
    let bytes = dump(&records, &storage, &all_builds());

    let target = MemoryRecordStore::new();
    let spy = SpyStorage {
        fail_restore: true,
        ..Default::default()
    };
    let registry = TypeRegistry::standard();
    let err = Archiver::new(&target, &spy, &registry)
        .restore(bytes.as_slice(), &mut NoopObserver)
        .unwrap_err();

    assert_eq!(err.code(), ErrorCode::Store);
    assert_eq!(spy.restores.get(), 1);
    assert_eq!(target.len(), 6);
}

#[test]
fn test_bad_record_stops_restore_midway() {
    let (records, storage) = seeded_stores();
    let bytes = dump(&records, &storage, &all_builds());
    let m = members(&bytes);
    let mut rows: Vec<serde_json::Value> = serde_json::from_slice(m[1].1.as_slice()).unwrap();
    rows[2]["completed"] = serde_json::json!("not a date");
    let bad = serde_json::to_vec(&rows).unwrap();
    let archive = container(&[
        (METADATA_MEMBER, m[0].1.as_slice()),
        (RECORDS_MEMBER, bad.as_slice()),
        (STORAGE_MEMBER, m[2].1.as_slice()),
    ]);

    let target = MemoryRecordStore::new();
    let spy = SpyStorage::default();
    let registry = TypeRegistry::standard();
    let err = Archiver::new(&target, &spy, &registry)
        .restore(archive.as_slice(), &mut NoopObserver)
        .unwrap_err();

    assert_eq!(err.code(), ErrorCode::Conversion);
    assert_eq!(target.len(), 2);
    assert_eq!(spy.restores.get(), 0);
}

#[test]
fn test_trailing_members_are_ignored() {
    let (records, storage) = seeded_stores();
    let bytes = dump(&records, &storage, &[build("babette", "1")]);
    let m = members(&bytes);
    let archive = container(&[
        (METADATA_MEMBER, m[0].1.as_slice()),
        (RECORDS_MEMBER, m[1].1.as_slice()),
        (STORAGE_MEMBER, m[2].1.as_slice()),
        ("README", &b"extra"[..]),
    ]);

    let target = MemoryRecordStore::new();
    let registry = TypeRegistry::standard();
    let summary = Archiver::new(&target, &MemoryStorage::new(), &registry)
        .restore(archive.as_slice(), &mut NoopObserver)
        .unwrap();

    assert_eq!(summary.records.len(), 1);
}

// ============================================================================
// Observers
// ============================================================================

#[test]
fn test_dump_progress_order() {
    let (records, storage) = seeded_stores();
    let registry = TypeRegistry::standard();
    let mut lines = Vec::new();
    let mut observer = |d: Direction, p: Phase, b: &Build| -> anyhow::Result<()> {
        lines.push(format!("{} {} for {}", d.verb(), p, b));
        Ok(())
    };

    Archiver::new(&records, &storage, &registry)
        .dump(&[build("polaris", "1"), build("babette", "1")], Vec::new(), &mut observer)
        .unwrap();

    assert_eq!(
        lines,
        vec![
            "dumping records for babette.1",
            "dumping records for polaris.1",
            "dumping storage for babette.1",
            "dumping storage for polaris.1",
        ]
    );
}

struct Recorder {
    lines: Vec<String>,
    metadata: Option<Metadata>,
    want_metadata: bool,
}

impl ArchiveObserver for Recorder {
    fn progress(&mut self, direction: Direction, phase: Phase, build: &Build) -> anyhow::Result<()> {
        self.lines
            .push(format!("{} {} for {}", direction.verb(), phase, build));
        Ok(())
    }

    fn metadata(&mut self, metadata: &Metadata) -> anyhow::Result<()> {
        self.metadata = Some(metadata.clone());
        Ok(())
    }

    fn wants_metadata_progress(&self) -> bool {
        self.want_metadata
    }
}

#[test]
fn test_restore_progress_with_metadata() {
    let (records, storage) = seeded_stores();
    let bytes = dump(&records, &storage, &[build("babette", "1")]);

    let mut recorder = Recorder {
        lines: Vec::new(),
        metadata: None,
        want_metadata: true,
    };
    let registry = TypeRegistry::standard();
    Archiver::new(&MemoryRecordStore::new(), &MemoryStorage::new(), &registry)
        .restore(bytes.as_slice(), &mut recorder)
        .unwrap();

    assert_eq!(
        recorder.lines,
        vec![
            "restoring metadata for babette.1",
            "restoring records for babette.1",
            "restoring storage for babette.1",
        ]
    );
    assert_eq!(recorder.metadata.unwrap().manifest, vec!["babette.1"]);
}

#[test]
fn test_observer_error_aborts_dump() {
    let (records, storage) = seeded_stores();
    let registry = TypeRegistry::standard();
    let mut observer = |_: Direction, phase: Phase, _: &Build| -> anyhow::Result<()> {
        if phase == Phase::Storage {
            anyhow::bail!("console closed");
        }
        Ok(())
    };

    let err = Archiver::new(&records, &storage, &registry)
        .dump(&all_builds(), Vec::new(), &mut observer)
        .unwrap_err();

    assert_eq!(err.code(), ErrorCode::Observer);
    assert!(err.to_string().contains("console closed"));
}

#[test]
fn test_dump_of_unknown_build_fails() {
    let (records, storage) = seeded_stores();
    let registry = TypeRegistry::standard();

    let err = Archiver::new(&records, &storage, &registry)
        .dump(&[build("bogus", "1")], Vec::new(), &mut NoopObserver)
        .unwrap_err();

    match err {
        ArchiveError::Store(e) => assert!(e.is_not_found()),
        other => panic!("expected store error, got {}", other),
    }
}
