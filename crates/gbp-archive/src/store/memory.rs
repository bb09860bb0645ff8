//! In-memory collaborators for tests.

use super::{normalize, ArtifactStorage, RecordStore, StoreError, StoreResult};
use crate::build::Build;
use crate::observer::{ArchiveObserver, Direction, Phase};
use crate::record::{BuildRecord, RecordOverrides};
use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::sync::{Mutex, MutexGuard};

fn lock<T>(mutex: &Mutex<T>) -> StoreResult<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|_| StoreError::Other(anyhow::anyhow!("memory store lock poisoned")))
}

#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    records: Mutex<BTreeMap<Build, BuildRecord>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RecordStore for MemoryRecordStore {
    fn list_machines(&self) -> StoreResult<Vec<String>> {
        let mut machines: Vec<String> = lock(&self.records)?
            .keys()
            .map(|b| b.machine().to_string())
            .collect();
        machines.dedup();
        Ok(machines)
    }

    fn for_machine(&self, machine: &str) -> StoreResult<Vec<BuildRecord>> {
        Ok(lock(&self.records)?
            .values()
            .filter(|r| r.build.machine() == machine)
            .cloned()
            .collect())
    }

    fn get(&self, build: &Build) -> StoreResult<BuildRecord> {
        lock(&self.records)?
            .get(build)
            .cloned()
            .ok_or_else(|| StoreError::not_found(build))
    }

    fn save(&self, record: BuildRecord, overrides: RecordOverrides) -> StoreResult<BuildRecord> {
        let record = normalize(record, overrides);
        lock(&self.records)?.insert(record.build.clone(), record.clone());
        Ok(record)
    }

    fn exists(&self, build: &Build) -> StoreResult<bool> {
        Ok(lock(&self.records)?.contains_key(build))
    }

    fn delete(&self, build: &Build) -> StoreResult<()> {
        lock(&self.records)?.remove(build);
        Ok(())
    }
}

/// Artifact storage holding one opaque blob per build.
///
/// The dump stream is a tar with one `<machine>.<build_id>` entry per build
/// that has a blob.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    artifacts: Mutex<BTreeMap<Build, Vec<u8>>>,
    tags: Mutex<BTreeMap<(String, String), String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, build: &Build, data: impl Into<Vec<u8>>) {
        if let Ok(mut artifacts) = self.artifacts.lock() {
            artifacts.insert(build.clone(), data.into());
        }
    }

    pub fn artifact(&self, build: &Build) -> Option<Vec<u8>> {
        self.artifacts.lock().ok()?.get(build).cloned()
    }

    pub fn tag(&self, build: &Build, tag: &str) {
        if let Ok(mut tags) = self.tags.lock() {
            tags.insert(
                (build.machine().to_string(), tag.to_string()),
                build.build_id().to_string(),
            );
        }
    }
}

impl ArtifactStorage for MemoryStorage {
    fn dump(
        &self,
        builds: &[Build],
        sink: &mut dyn Write,
        observer: &mut dyn ArchiveObserver,
    ) -> StoreResult<()> {
        let mut tar = tar::Builder::new(sink);
        for build in builds {
            observer
                .progress(Direction::Dump, Phase::Storage, build)
                .map_err(StoreError::Observer)?;

            let data = match lock(&self.artifacts)?.get(build) {
                Some(data) => data.clone(),
                None => continue,
            };
            let mut header = tar::Header::new_gnu();
            header.set_path(build.to_string())?;
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            tar.append(&header, data.as_slice())?;
        }
        tar.finish()?;
        Ok(())
    }

    fn restore(
        &self,
        source: &mut dyn Read,
        observer: &mut dyn ArchiveObserver,
    ) -> StoreResult<Vec<Build>> {
        let mut archive = tar::Archive::new(source);
        let mut restored = Vec::new();

        for entry in archive.entries()? {
            let mut entry = entry?;
            let name = entry.path()?.to_string_lossy().into_owned();
            let build: Build = name
                .parse()
                .map_err(|e| StoreError::corrupt(format!("memory storage entry '{}': {}", name, e)))?;

            observer
                .progress(Direction::Restore, Phase::Storage, &build)
                .map_err(StoreError::Observer)?;

            let mut data = Vec::new();
            entry.read_to_end(&mut data)?;
            lock(&self.artifacts)?.insert(build.clone(), data);
            restored.push(build);
        }
        Ok(restored)
    }

    fn resolve_tag(&self, machine: &str, tag: &str) -> StoreResult<Option<Build>> {
        let tags = lock(&self.tags)?;
        match tags.get(&(machine.to_string(), tag.to_string())) {
            Some(id) => Ok(Some(
                Build::new(machine, id.as_str()).map_err(|e| StoreError::corrupt(e.to_string()))?,
            )),
            None => Ok(None),
        }
    }

    fn pulled(&self, build: &Build) -> StoreResult<bool> {
        Ok(lock(&self.artifacts)?.contains_key(build))
    }
}
