//! Two-phase member writing: stage a payload to learn its size, then emit it.
//!
//! A tar header carries the member size, so a payload has to be complete before
//! its header can be written. Small payloads are staged in memory; the rest go
//! through a [`SpooledTempFile`] that spills to disk past a threshold. Staged
//! data is dropped (and any temp file removed) on every exit path.

use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};
use tar::{Builder, Header};
use tempfile::SpooledTempFile;
use tracing::debug;

enum Body {
    Buffered(Cursor<Vec<u8>>),
    Spooled(SpooledTempFile),
}

/// A fully written payload with a known length.
pub(crate) struct StagedMember {
    body: Body,
    len: u64,
}

impl StagedMember {
    pub(crate) fn buffered(bytes: Vec<u8>) -> Self {
        let len = bytes.len() as u64;
        Self {
            body: Body::Buffered(Cursor::new(bytes)),
            len,
        }
    }

    /// Stage whatever `fill` writes, spilling to disk past `threshold` bytes.
    pub(crate) fn spool<F, E>(threshold: usize, fill: F) -> Result<Self, E>
    where
        F: FnOnce(&mut dyn Write) -> Result<(), E>,
        E: From<io::Error>,
    {
        let mut file = SpooledTempFile::new(threshold);
        fill(&mut file)?;
        file.flush()?;

        let len = file.seek(SeekFrom::End(0))?;
        file.seek(SeekFrom::Start(0))?;
        if file.is_rolled() {
            debug!(len, "member spilled to disk");
        }

        Ok(Self {
            body: Body::Spooled(file),
            len,
        })
    }

    pub(crate) fn len(&self) -> u64 {
        self.len
    }
}

impl Read for StagedMember {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match &mut self.body {
            Body::Buffered(cursor) => cursor.read(buf),
            Body::Spooled(file) => file.read(buf),
        }
    }
}

/// Write `staged` as member `name`: header first, then exactly `len` bytes.
pub(crate) fn emit<W: Write>(
    tar: &mut Builder<W>,
    name: &str,
    mut staged: StagedMember,
    mtime: u64,
) -> io::Result<()> {
    let mut header = Header::new_gnu();
    header.set_path(name)?;
    header.set_size(staged.len());
    header.set_mode(0o644);
    header.set_uid(0);
    header.set_gid(0);
    header.set_mtime(mtime);
    header.set_entry_type(tar::EntryType::Regular);
    header.set_cksum();

    tar.append(&header, &mut staged)?;
    debug!(member = name, size = staged.len(), "member written");
    Ok(())
}
