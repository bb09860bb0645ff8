//! Progress hooks for dump and restore.
//!
//! Observers run synchronously on the caller's thread. An error returned from
//! an observer aborts the whole operation: progress reporting must never hide
//! a real failure.

use crate::build::Build;
use crate::metadata::Metadata;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Dump,
    Restore,
}

impl Direction {
    /// Progressive verb used in progress lines ("dumping", "restoring").
    pub fn verb(self) -> &'static str {
        match self {
            Self::Dump => "dumping",
            Self::Restore => "restoring",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Dump => "dump",
            Self::Restore => "restore",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Metadata,
    Records,
    Storage,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Metadata => "metadata",
            Self::Records => "records",
            Self::Storage => "storage",
        })
    }
}

pub trait ArchiveObserver {
    /// Called once per build per phase.
    fn progress(&mut self, direction: Direction, phase: Phase, build: &Build) -> anyhow::Result<()>;

    /// Called with the archive metadata on restore. Informational only.
    fn metadata(&mut self, _metadata: &Metadata) -> anyhow::Result<()> {
        Ok(())
    }

    /// Opt in to a [`Phase::Metadata`] progress call per manifest entry.
    fn wants_metadata_progress(&self) -> bool {
        false
    }
}

/// Observer that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl ArchiveObserver for NoopObserver {
    fn progress(&mut self, _: Direction, _: Phase, _: &Build) -> anyhow::Result<()> {
        Ok(())
    }
}

impl<F> ArchiveObserver for F
where
    F: FnMut(Direction, Phase, &Build) -> anyhow::Result<()>,
{
    fn progress(&mut self, direction: Direction, phase: Phase, build: &Build) -> anyhow::Result<()> {
        self(direction, phase, build)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_line_parts() {
        assert_eq!(Direction::Dump.verb(), "dumping");
        assert_eq!(Direction::Restore.verb(), "restoring");
        assert_eq!(Direction::Restore.to_string(), "restore");
        assert_eq!(Phase::Storage.to_string(), "storage");
    }

    #[test]
    fn closures_are_observers() {
        let build = Build::new("lighthouse", "1").unwrap();
        let mut seen = Vec::new();
        {
            let mut observer = |d: Direction, p: Phase, b: &Build| -> anyhow::Result<()> {
                seen.push(format!("{} {} {}", d, p, b));
                Ok(())
            };
            observer.progress(Direction::Dump, Phase::Records, &build).unwrap();
        }
        assert_eq!(seen, vec!["dump records lighthouse.1"]);
    }
}
