use super::stage::{emit, StagedMember};
use super::{ArchiveError, Archiver, METADATA_MEMBER, RECORDS_MEMBER, STORAGE_MEMBER};
use crate::build::Build;
use crate::metadata;
use crate::observer::ArchiveObserver;
use crate::records;
use chrono::{DateTime, Local, TimeZone};
use std::fmt::Display;
use std::io::Write;
use tar::Builder;
use tracing::{debug, info};

impl Archiver<'_> {
    /// Write an archive of `builds` to `output`.
    ///
    /// Builds are sorted and deduplicated first, so the manifest and the
    /// records member do not depend on the order they were given in. If this
    /// returns an error, whatever reached `output` is not a valid archive.
    pub fn dump<W: Write>(
        &self,
        builds: &[Build],
        output: W,
        observer: &mut dyn ArchiveObserver,
    ) -> Result<(), ArchiveError> {
        self.dump_at(builds, Local::now(), output, observer)
    }

    /// [`dump`](Self::dump) with an explicit creation time. The metadata keeps
    /// its offset; member headers use the instant as their mtime, so two dumps
    /// at the same instant are byte-identical.
    pub fn dump_at<W, Tz>(
        &self,
        builds: &[Build],
        created: DateTime<Tz>,
        output: W,
        observer: &mut dyn ArchiveObserver,
    ) -> Result<(), ArchiveError>
    where
        W: Write,
        Tz: TimeZone,
        Tz::Offset: Display,
    {
        let mut builds = builds.to_vec();
        builds.sort();
        builds.dedup();

        let mtime = u64::try_from(created.timestamp()).unwrap_or(0);
        let mut tar = Builder::new(output);

        let metadata = metadata::create(&builds, &created);
        emit(
            &mut tar,
            METADATA_MEMBER,
            StagedMember::buffered(metadata::encode(&metadata)?),
            mtime,
        )?;

        let records = builds
            .iter()
            .map(|build| self.records.get(build))
            .collect::<Result<Vec<_>, _>>()?;
        let staged = StagedMember::spool(self.spool_threshold, |sink| {
            records::dump(&records, sink, &mut *observer).map_err(ArchiveError::from)
        })?;
        debug!(records = records.len(), size = staged.len(), "records staged");
        emit(&mut tar, RECORDS_MEMBER, staged, mtime)?;

        let staged = StagedMember::spool(self.spool_threshold, |sink| {
            self.storage
                .dump(&builds, sink, &mut *observer)
                .map_err(ArchiveError::from)
        })?;
        debug!(size = staged.len(), "storage staged");
        emit(&mut tar, STORAGE_MEMBER, staged, mtime)?;

        let mut output = tar.into_inner()?;
        output.flush()?;

        info!(builds = builds.len(), "archive dumped");
        Ok(())
    }
}
