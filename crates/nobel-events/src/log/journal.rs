//! Append-only JSON-lines journal backing [`MemoryLog`](super::MemoryLog).
//!
//! One record per published event. Each append is flushed with
//! `sync_data` before it returns, so an acknowledged publish survives a
//! crash. An append that fails is rolled back to the previous file length;
//! if even that fails the journal refuses every later append. On open the
//! file is replayed in order; a torn trailing line left by a crash
//! mid-write is ignored.
//!
//! A journal is held by one process at a time through an exclusive lock on
//! a `<path>.lock` sibling file. [`Journal::rewrite`] compacts the file down
//! to the records still retained.

use std::ffi::OsString;
use std::fmt;
use std::fs::{self, File, OpenOptions, TryLockError};
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use crate::subject::Subject;

/// A single journaled event.
///
/// A record without a payload only carries the subject's sequence counter
/// forward; compaction writes one when every event on a subject has expired.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct JournalRecord {
    pub subject: Subject,
    pub sequence: u64,
    pub published_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Vec<u8>>,
}

/// The file operations the journal needs.
pub(crate) trait JournalFile: Write + Send + fmt::Debug {
    /// Current length in bytes.
    fn size(&self) -> io::Result<u64>;
    /// Flush written data to stable storage.
    fn sync(&mut self) -> io::Result<()>;
    /// Cut the file back to `size` bytes and sync.
    fn truncate(&mut self, size: u64) -> io::Result<()>;
}

impl JournalFile for File {
    fn size(&self) -> io::Result<u64> {
        Ok(self.metadata()?.len())
    }

    fn sync(&mut self) -> io::Result<()> {
        self.sync_data()
    }

    fn truncate(&mut self, size: u64) -> io::Result<()> {
        self.set_len(size)?;
        self.sync_data()
    }
}

#[derive(Debug)]
struct Writer {
    file: Box<dyn JournalFile>,
    failed: bool,
}

/// Open handle on the journal file.
#[derive(Debug)]
pub(crate) struct Journal {
    path: PathBuf,
    writer: Mutex<Writer>,
    /// Held for the journal's lifetime; the OS lock drops with it.
    _lock: Option<File>,
}

impl Journal {
    /// Lock and open (or create) the journal at `path` and return the records already in it.
    ///
    /// Fails with [`io::ErrorKind::WouldBlock`] if another process holds the journal.
    pub fn open(path: &Path) -> io::Result<(Self, Vec<JournalRecord>)> {
        let lock = lock_exclusive(path)?;
        let records = if path.exists() {
            read_records(path)?
        } else {
            Vec::new()
        };
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        if !ends_with_newline(path)? {
            file.write_all(b"\n")?;
            file.sync_data()?;
        }
        Ok((
            Self {
                path: path.to_path_buf(),
                writer: Mutex::new(Writer {
                    file: Box::new(file),
                    failed: false,
                }),
                _lock: Some(lock),
            },
            records,
        ))
    }

    /// Build a journal over an arbitrary file, without locking.
    #[cfg(test)]
    pub fn with_file(path: &Path, file: Box<dyn JournalFile>) -> Self {
        Self {
            path: path.to_path_buf(),
            writer: Mutex::new(Writer {
                file,
                failed: false,
            }),
            _lock: None,
        }
    }

    /// Append one record and flush it to stable storage.
    ///
    /// On error the file is cut back to its length before the call. If that
    /// also fails the journal is marked failed and refuses further appends.
    pub fn append(&self, record: &JournalRecord) -> io::Result<()> {
        let line = encode_line(record)?;
        let mut writer = self.lock_writer();
        if writer.failed {
            return Err(io::Error::other(format!(
                "journal {} is unusable after an earlier failed append",
                self.path.display()
            )));
        }

        let size = writer.file.size()?;
        let Err(e) = write_synced(writer.file.as_mut(), &line) else {
            return Ok(());
        };
        if let Err(rollback) = writer.file.truncate(size) {
            error!(
                path = %self.path.display(),
                error = %rollback,
                "journal rollback failed, refusing further appends"
            );
            writer.failed = true;
        }
        Err(e)
    }

    /// Replace the journal contents with `records`.
    ///
    /// The new contents are written to a sibling file, synced, and renamed
    /// over the journal. Callers must keep appends out while this runs.
    pub fn rewrite(&self, records: &[JournalRecord]) -> io::Result<()> {
        let mut body = Vec::new();
        for record in records {
            body.extend_from_slice(&encode_line(record)?);
        }

        let staging = sibling(&self.path, "compact");
        {
            let mut file = File::create(&staging)?;
            file.write_all(&body)?;
            file.sync_all()?;
        }

        let mut writer = self.lock_writer();
        fs::rename(&staging, &self.path)?;
        writer.file = Box::new(OpenOptions::new().append(true).open(&self.path)?);
        writer.failed = false;
        Ok(())
    }

    /// Location of the journal file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_writer(&self) -> MutexGuard<'_, Writer> {
        self.writer.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn encode_line(record: &JournalRecord) -> io::Result<Vec<u8>> {
    let mut line = serde_json::to_vec(record).map_err(io::Error::other)?;
    line.push(b'\n');
    Ok(line)
}

fn write_synced(file: &mut dyn JournalFile, line: &[u8]) -> io::Result<()> {
    file.write_all(line)?;
    file.sync()
}

/// `<path>.<suffix>`, next to the journal.
fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}

fn lock_exclusive(path: &Path) -> io::Result<File> {
    let lock_path = sibling(path, "lock");
    let lock = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(&lock_path)?;
    match lock.try_lock() {
        Ok(()) => Ok(lock),
        Err(TryLockError::WouldBlock) => Err(io::Error::new(
            io::ErrorKind::WouldBlock,
            format!("journal {} is in use by another process", path.display()),
        )),
        Err(TryLockError::Error(e)) => Err(e),
    }
}

/// An empty file counts as ending with a newline.
fn ends_with_newline(path: &Path) -> io::Result<bool> {
    let mut file = File::open(path)?;
    if file.metadata()?.len() == 0 {
        return Ok(true);
    }
    file.seek(SeekFrom::End(-1))?;
    let mut last = [0_u8; 1];
    file.read_exact(&mut last)?;
    Ok(last == *b"\n")
}

fn read_records(path: &Path) -> io::Result<Vec<JournalRecord>> {
    let reader = BufReader::new(File::open(path)?);
    let mut records = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<JournalRecord>(&line) {
            Ok(record) => records.push(record),
            Err(e) => {
                warn!(
                    path = %path.display(),
                    line = index.saturating_add(1),
                    error = %e,
                    "skipping unreadable journal record"
                );
            }
        }
    }
    Ok(records)
}

/// In-memory journal file with switchable failures.
#[cfg(test)]
pub(crate) mod testing {
    use std::io::{self, Write};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex, PoisonError};

    use super::JournalFile;

    #[derive(Debug, Clone, Default)]
    pub(crate) struct FlakyFile {
        pub data: Arc<Mutex<Vec<u8>>>,
        pub fail_sync: Arc<AtomicBool>,
        pub fail_truncate: Arc<AtomicBool>,
    }

    impl FlakyFile {
        pub fn contents(&self) -> String {
            let data = self.data.lock().unwrap_or_else(PoisonError::into_inner);
            String::from_utf8_lossy(&data).into_owned()
        }
    }

    impl Write for FlakyFile {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.data
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl JournalFile for FlakyFile {
        fn size(&self) -> io::Result<u64> {
            let len = self.data.lock().unwrap_or_else(PoisonError::into_inner).len();
            u64::try_from(len).map_err(io::Error::other)
        }

        fn sync(&mut self) -> io::Result<()> {
            if self.fail_sync.load(Ordering::SeqCst) {
                return Err(io::Error::other("sync failed"));
            }
            Ok(())
        }

        fn truncate(&mut self, size: u64) -> io::Result<()> {
            if self.fail_truncate.load(Ordering::SeqCst) {
                return Err(io::Error::other("truncate failed"));
            }
            let size = usize::try_from(size).map_err(io::Error::other)?;
            self.data
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .truncate(size);
            Ok(())
        }
    }
}
