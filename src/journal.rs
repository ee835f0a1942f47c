//! Append-only update journal.
//!
//! The journal is a flat file of wire-format records, appended in the
//! order batches were accepted. On startup the whole file is memory-mapped
//! and replayed with normal-update semantics; an absent or empty file
//! means an empty index. Durability is best effort: the append and the
//! in-memory apply are independent steps, so a crash between them can lose
//! an update but never corrupts the index.

use memmap2::Mmap;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::wire::{BatchReader, RawRecord};
use crate::{Error, Result};

/// Append handle for the journal file. The service serializes access
/// through a mutex; appends happen outside any tree or cache lock.
#[derive(Debug)]
pub struct Journal {
    file: File,
    path: PathBuf,
}

impl Journal {
    /// Open (creating if absent) the journal for appending.
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    /// Append a batch of raw wire records and flush.
    pub fn append(&mut self, batch: &[u8]) -> Result<()> {
        self.file.write_all(batch)?;
        self.file.flush()?;
        Ok(())
    }

    /// Path this journal writes to.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Replay every record of the journal at `path` into `sink`, in file
/// order. Returns the number of records replayed.
///
/// An absent file replays zero records. A truncated or corrupt tail is an
/// unrecoverable [`Error::MalformedRecord`]; the caller treats replay
/// failure as fatal to initialization.
pub fn replay<F>(path: &Path, mut sink: F) -> Result<usize>
where
    F: FnMut(RawRecord<'_>) -> Result<()>,
{
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e.into()),
    };
    if file.metadata()?.len() == 0 {
        return Ok(0);
    }

    let mmap = unsafe { Mmap::map(&file)? };
    let mut count = 0usize;
    for record in BatchReader::new(&mmap) {
        sink(record?)?;
        count += 1;
    }
    log::debug!("journal replay: {} records from {}", count, path.display());
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::encode_record;
    use crate::{ControlAction, Opcode};

    #[test]
    fn test_replay_absent_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.journal");
        let n = replay(&path, |_| panic!("no records expected")).unwrap();
        assert_eq!(n, 0);
    }

    #[test]
    fn test_append_then_replay() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("domain.journal");

        let mut batch = Vec::new();
        encode_record(
            &mut batch,
            Opcode::Add,
            ControlAction::Redirect,
            "a.com",
            Some("10.0.0.1"),
        )
        .unwrap();
        encode_record(&mut batch, Opcode::Delete, ControlAction::Drop, "b.com", None).unwrap();

        {
            let mut journal = Journal::open(&path).unwrap();
            journal.append(&batch).unwrap();
        }

        let mut seen = Vec::new();
        let n = replay(&path, |rec| {
            seen.push((rec.opcode, rec.domain_str().into_owned()));
            Ok(())
        })
        .unwrap();
        assert_eq!(n, 2);
        assert_eq!(seen[0], (Opcode::Add, "a.com".to_string()));
        assert_eq!(seen[1], (Opcode::Delete, "b.com".to_string()));
    }

    #[test]
    fn test_appends_accumulate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("domain.journal");

        for domain in ["one.com", "two.com"] {
            let mut batch = Vec::new();
            encode_record(&mut batch, Opcode::Add, ControlAction::Drop, domain, None).unwrap();
            let mut journal = Journal::open(&path).unwrap();
            journal.append(&batch).unwrap();
        }

        let n = replay(&path, |_| Ok(())).unwrap();
        assert_eq!(n, 2);
    }

    #[test]
    fn test_truncated_tail_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("domain.journal");

        let mut batch = Vec::new();
        encode_record(&mut batch, Opcode::Add, ControlAction::Drop, "a.com", None).unwrap();
        batch.extend_from_slice(&[0x00, 0xff]); // torn write
        Journal::open(&path).unwrap().append(&batch).unwrap();

        let mut count = 0;
        let err = replay(&path, |_| {
            count += 1;
            Ok(())
        })
        .unwrap_err();
        assert!(matches!(err, Error::MalformedRecord { .. }));
        assert_eq!(count, 1);
    }
}
