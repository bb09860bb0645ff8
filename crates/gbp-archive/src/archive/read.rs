use super::{
    ArchiveError, Archiver, RestoreSummary, MAX_METADATA_BYTES, METADATA_MEMBER, RECORDS_MEMBER,
    STORAGE_MEMBER,
};
use crate::build::Build;
use crate::metadata::{self, Metadata, METADATA_VERSION};
use crate::observer::{ArchiveObserver, Direction, Phase};
use crate::records;
use std::io::{self, Read};
use tar::{Archive, Entries, Entry};
use tracing::{debug, info, warn};

/// Forward-only cursor over the container members, checking names by position.
struct Members<'a, R: 'a + Read> {
    entries: Entries<'a, R>,
    position: usize,
}

impl<'a, R: 'a + Read> Members<'a, R> {
    fn new(entries: Entries<'a, R>) -> Self {
        Self {
            entries,
            position: 0,
        }
    }

    fn next(&mut self, expected: &'static str) -> Result<Entry<'a, R>, ArchiveError> {
        self.position += 1;
        let entry = match self.entries.next() {
            Some(entry) => entry?,
            None => {
                return Err(ArchiveError::Truncated {
                    position: self.position,
                    expected,
                })
            }
        };

        let found = entry.path()?.to_string_lossy().into_owned();
        if found != expected {
            return Err(ArchiveError::UnexpectedMember {
                position: self.position,
                expected,
                found,
            });
        }

        debug!(member = expected, size = entry.size(), "member read");
        Ok(entry)
    }

    /// Read member `expected` to the end.
    ///
    /// The header's size is only trusted as an upper bound: a member declaring
    /// more than `limit` bytes is rejected before reading, and one whose body
    /// ends early is an I/O error.
    fn read(&mut self, expected: &'static str, limit: u64) -> Result<Vec<u8>, ArchiveError> {
        let entry = self.next(expected)?;
        let size = entry.size();
        if size > limit {
            return Err(ArchiveError::MemberTooLarge {
                member: expected,
                size,
                limit,
            });
        }

        let mut bytes = Vec::new();
        entry.take(limit).read_to_end(&mut bytes)?;
        if (bytes.len() as u64) < size {
            return Err(ArchiveError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("member {} ended after {} of {} bytes", expected, bytes.len(), size),
            )));
        }
        Ok(bytes)
    }

    /// Names of any members after the last expected one.
    fn trailing(&mut self) -> Result<Vec<String>, ArchiveError> {
        let mut names = Vec::new();
        for entry in &mut self.entries {
            names.push(entry?.path()?.to_string_lossy().into_owned());
        }
        Ok(names)
    }
}

fn read_metadata<R: Read>(members: &mut Members<'_, R>) -> Result<Metadata, ArchiveError> {
    let metadata = metadata::decode(&members.read(METADATA_MEMBER, MAX_METADATA_BYTES)?)?;
    if metadata.version != METADATA_VERSION {
        warn!(version = metadata.version, "unknown archive metadata version");
    }
    Ok(metadata)
}

/// The manifest of an archive. Only the first member is read.
pub fn tabulate<R: Read>(input: R) -> Result<Vec<Build>, ArchiveError> {
    let mut archive = Archive::new(input);
    let mut members = Members::new(archive.entries()?);
    Ok(read_metadata(&mut members)?.builds()?)
}

impl Archiver<'_> {
    /// Restore an archive read from `input`.
    ///
    /// Records are saved as they are decoded and artifacts are restored as the
    /// storage member streams in. Nothing is rolled back: on error, whatever was
    /// applied before the failure stays applied.
    pub fn restore<R: Read>(
        &self,
        input: R,
        observer: &mut dyn ArchiveObserver,
    ) -> Result<RestoreSummary, ArchiveError> {
        let mut archive = Archive::new(input);
        let mut members = Members::new(archive.entries()?);

        let metadata = read_metadata(&mut members)?;
        observer.metadata(&metadata).map_err(ArchiveError::Observer)?;
        if observer.wants_metadata_progress() {
            match metadata.builds() {
                Ok(builds) => {
                    for build in &builds {
                        observer
                            .progress(Direction::Restore, Phase::Metadata, build)
                            .map_err(ArchiveError::Observer)?;
                    }
                }
                Err(e) => warn!(error = %e, "archive manifest lists an invalid build"),
            }
        }

        let bytes = members.read(RECORDS_MEMBER, u64::MAX)?;
        let records = records::restore(&bytes, self.registry, self.records, observer)?;

        let mut entry = members.next(STORAGE_MEMBER)?;
        let artifacts = self.storage.restore(&mut entry, observer)?;
        drop(entry);

        let trailing = members.trailing()?;
        if !trailing.is_empty() {
            warn!(members = ?trailing, "ignoring trailing archive members");
        }

        info!(
            records = records.len(),
            artifacts = artifacts.len(),
            "archive restored"
        );
        Ok(RestoreSummary {
            metadata,
            records,
            artifacts,
        })
    }
}
