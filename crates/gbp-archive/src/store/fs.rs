//! FsStorage: build artifacts on the local filesystem.
//!
//! Layout under the storage root:
//!
//! ```text
//! builds/<machine>.<build_id>/...   # artifacts of one build
//! tags/<machine>/<tag>              # file holding the tagged build id
//! tags/<machine>/@published         # the published build
//! ```
//!
//! `dump` writes a nested tar with the same layout, restricted to the requested
//! builds and the tags that point at them.

use super::{ArtifactStorage, StoreError, StoreResult};
use crate::build::{is_safe_name, Build};
use crate::observer::{ArchiveObserver, Direction, Phase};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Component, Path, PathBuf};
use tar::{Archive, Builder, Header, HeaderMode};
use tracing::debug;

const BUILDS_DIR: &str = "builds";
const TAGS_DIR: &str = "tags";

/// Reserved tag file name for the published build.
pub const PUBLISHED_TAG: &str = "@published";

#[derive(Debug, Clone)]
pub struct FsStorage {
    root: PathBuf,
}

impl FsStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding the artifacts of `build`.
    pub fn build_path(&self, build: &Build) -> PathBuf {
        self.root.join(BUILDS_DIR).join(build.to_string())
    }

    pub fn tag_path(&self, machine: &str, tag: &str) -> PathBuf {
        let name = if tag.is_empty() { PUBLISHED_TAG } else { tag };
        self.root.join(TAGS_DIR).join(machine).join(name)
    }

    /// Point `<machine>@<tag>` at `build`.
    pub fn tag(&self, build: &Build, tag: &str) -> StoreResult<()> {
        if !is_safe_name(tag) || tag == PUBLISHED_TAG {
            return Err(StoreError::corrupt(format!("invalid tag name '{}'", tag)));
        }
        self.write_tag(build, tag)
    }

    /// Make `build` the published build of its machine.
    pub fn publish(&self, build: &Build) -> StoreResult<()> {
        self.write_tag(build, "")
    }

    fn write_tag(&self, build: &Build, tag: &str) -> StoreResult<()> {
        let path = self.tag_path(build.machine(), tag);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, build.build_id())?;
        Ok(())
    }

    /// Tags pointing at `build`, sorted. The published tag shows as `""`.
    pub fn tags(&self, build: &Build) -> StoreResult<Vec<String>> {
        Ok(self
            .machine_tags(build.machine())?
            .into_iter()
            .filter(|(_, id)| id == build.build_id())
            .map(|(name, _)| if name == PUBLISHED_TAG { String::new() } else { name })
            .collect())
    }

    /// Tag file name to build id, for every tag of `machine`.
    fn machine_tags(&self, machine: &str) -> StoreResult<BTreeMap<String, String>> {
        let dir = self.root.join(TAGS_DIR).join(machine);
        let mut tags = BTreeMap::new();

        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(tags),
            Err(e) => return Err(e.into()),
        };
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            let id = fs::read_to_string(entry.path())?.trim().to_string();
            tags.insert(name, id);
        }
        Ok(tags)
    }

    /// Remove a build's artifacts and every tag pointing at it.
    pub fn delete(&self, build: &Build) -> StoreResult<()> {
        for tag in self.tags(build)? {
            fs::remove_file(self.tag_path(build.machine(), &tag))?;
        }
        match fs::remove_dir_all(self.build_path(build)) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}

fn write_entry<W: Write>(tar: &mut Builder<W>, path: &str, data: &[u8]) -> io::Result<()> {
    let mut header = Header::new_gnu();
    header.set_path(path)?;
    header.set_size(data.len() as u64);
    header.set_mode(0o644);
    header.set_uid(0);
    header.set_gid(0);
    header.set_mtime(0);
    header.set_cksum();

    tar.append(&header, data)
}

/// Where a nested tar entry belongs: `Some(build)` for build artifacts,
/// `None` for tags. Anything else, or any path that could escape the storage
/// root, is rejected.
fn classify_entry(path: &Path) -> StoreResult<Option<Build>> {
    let unsafe_path = || StoreError::corrupt(format!("unsafe path in storage archive: {}", path.display()));

    let mut parts = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_str().ok_or_else(unsafe_path)?),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(unsafe_path())
            }
        }
    }

    match parts.as_slice() {
        [BUILDS_DIR] | [TAGS_DIR, ..] => Ok(None),
        [BUILDS_DIR, id, ..] => id
            .parse()
            .map(Some)
            .map_err(|e| StoreError::corrupt(format!("storage archive entry {}: {}", path.display(), e))),
        _ => Err(StoreError::corrupt(format!(
            "unexpected entry in storage archive: {}",
            path.display()
        ))),
    }
}

impl ArtifactStorage for FsStorage {
    fn dump(
        &self,
        builds: &[Build],
        sink: &mut dyn Write,
        observer: &mut dyn ArchiveObserver,
    ) -> StoreResult<()> {
        let mut tar = Builder::new(sink);
        tar.mode(HeaderMode::Deterministic);

        let mut dumped: BTreeMap<&str, HashSet<&str>> = BTreeMap::new();
        for build in builds {
            observer
                .progress(Direction::Dump, Phase::Storage, build)
                .map_err(StoreError::Observer)?;

            let path = self.build_path(build);
            if !path.is_dir() {
                debug!(%build, "no artifacts to dump");
                continue;
            }
            tar.append_dir_all(format!("{}/{}", BUILDS_DIR, build), &path)?;
            dumped
                .entry(build.machine())
                .or_default()
                .insert(build.build_id());
        }

        for (machine, ids) in &dumped {
            for (name, id) in self.machine_tags(machine)? {
                if ids.contains(id.as_str()) {
                    write_entry(
                        &mut tar,
                        &format!("{}/{}/{}", TAGS_DIR, machine, name),
                        id.as_bytes(),
                    )?;
                }
            }
        }

        tar.finish()?;
        Ok(())
    }

    fn restore(
        &self,
        source: &mut dyn Read,
        observer: &mut dyn ArchiveObserver,
    ) -> StoreResult<Vec<Build>> {
        fs::create_dir_all(&self.root)?;

        let mut archive = Archive::new(source);
        let mut seen = BTreeSet::new();
        let mut restored = Vec::new();

        for entry in archive.entries()? {
            let mut entry = entry?;
            let path = entry.path()?.into_owned();

            if let Some(build) = classify_entry(&path)? {
                if seen.insert(build.clone()) {
                    observer
                        .progress(Direction::Restore, Phase::Storage, &build)
                        .map_err(StoreError::Observer)?;
                    restored.push(build);
                }
            }

            if !entry.unpack_in(&self.root)? {
                return Err(StoreError::corrupt(format!(
                    "storage archive entry escapes root: {}",
                    path.display()
                )));
            }
        }

        Ok(restored)
    }

    fn resolve_tag(&self, machine: &str, tag: &str) -> StoreResult<Option<Build>> {
        if !is_safe_name(machine) || !(tag.is_empty() || is_safe_name(tag)) {
            debug!(machine, tag, "refusing to resolve unsafe tag name");
            return Ok(None);
        }
        let path = self.tag_path(machine, tag);
        let id = match fs::read_to_string(&path) {
            Ok(id) => id,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        Build::new(machine, id.trim())
            .map(Some)
            .map_err(|e| StoreError::corrupt(format!("tag file {}: {}", path.display(), e)))
    }

    fn pulled(&self, build: &Build) -> StoreResult<bool> {
        Ok(self.build_path(build).is_dir())
    }
}
