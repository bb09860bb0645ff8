//! Verbose progress output.

use gbp_archive::{ArchiveObserver, Build, Direction, Metadata, Phase};
use std::io::Write;

/// Writes `"<dumping|restoring> <phase> for <build>"` lines at verbosity 1 and
/// archive metadata at verbosity 2.
pub struct VerboseObserver<W> {
    out: W,
    level: u8,
}

impl VerboseObserver<std::io::Stderr> {
    pub fn stderr(level: u8) -> Self {
        Self::new(std::io::stderr(), level)
    }
}

impl<W: Write> VerboseObserver<W> {
    pub fn new(out: W, level: u8) -> Self {
        Self { out, level }
    }
}

impl<W: Write> ArchiveObserver for VerboseObserver<W> {
    fn progress(&mut self, direction: Direction, phase: Phase, build: &Build) -> anyhow::Result<()> {
        if self.level > 0 {
            writeln!(self.out, "{} {} for {}", direction.verb(), phase, build)?;
        }
        Ok(())
    }

    fn metadata(&mut self, metadata: &Metadata) -> anyhow::Result<()> {
        if self.level > 1 {
            writeln!(
                self.out,
                "archive created {} on {} ({} builds)",
                metadata.created,
                metadata.hostname,
                metadata.manifest.len()
            )?;
        }
        Ok(())
    }

    fn wants_metadata_progress(&self) -> bool {
        self.level > 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build() -> Build {
        Build::new("lighthouse", "3").unwrap()
    }

    #[test]
    fn quiet_writes_nothing() {
        let mut observer = VerboseObserver::new(Vec::new(), 0);
        observer
            .progress(Direction::Dump, Phase::Records, &build())
            .unwrap();
        assert!(observer.out.is_empty());
        assert!(!observer.wants_metadata_progress());
    }

    #[test]
    fn verbose_line_format() {
        let mut observer = VerboseObserver::new(Vec::new(), 1);
        observer
            .progress(Direction::Restore, Phase::Storage, &build())
            .unwrap();
        assert_eq!(
            String::from_utf8(observer.out).unwrap(),
            "restoring storage for lighthouse.3\n"
        );
    }

    #[test]
    fn very_verbose_reports_metadata() {
        let mut observer = VerboseObserver::new(Vec::new(), 2);
        let metadata = Metadata {
            version: 1,
            created: "2025-02-22T09:00:00+00:00".into(),
            hostname: "gbp.invalid".into(),
            manifest: vec!["lighthouse.3".into()],
        };

        observer.metadata(&metadata).unwrap();

        assert!(observer.wants_metadata_progress());
        assert_eq!(
            String::from_utf8(observer.out).unwrap(),
            "archive created 2025-02-22T09:00:00+00:00 on gbp.invalid (1 builds)\n"
        );
    }
}
