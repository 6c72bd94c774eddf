//! File-Backed Log Sink
//!
//! Appends lines to a single log file and serves reads by seeking to the
//! requested byte offset. Every reader opens its own handle, so pollers
//! never contend with each other for long.
//!
//! The file may be truncated or replaced by something outside the
//! process (logrotate, an operator). Before every append and read the
//! sink compares the file on disk with the length it last saw and the
//! identity of the file it writes to. A file that shrank, vanished or
//! was swapped counts as a rotation: the bytes seen so far move into a
//! base offset, so positions keep growing, and the writer is reopened
//! when the file was swapped. Reads below the base, past the end, or off
//! a line boundary fail with [`LogError::Rotated`].

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use log::{debug, info};

use super::sink::{complete_lines, encode_lines, LogChunk, LogError, LogPosition, LogSink};

/// Device and inode of a file, where the platform has them.
type FileIdentity = Option<(u64, u64)>;

#[cfg(unix)]
fn file_identity(meta: &fs::Metadata) -> FileIdentity {
    use std::os::unix::fs::MetadataExt;
    Some((meta.dev(), meta.ino()))
}

#[cfg(not(unix))]
fn file_identity(_meta: &fs::Metadata) -> FileIdentity {
    None
}

fn open_append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

/// The writer handle and what it knows about the file.
#[derive(Debug)]
struct WriterState {
    file: File,
    /// Bytes that belonged to files since rotated away
    base: u64,
    /// Length of the current file when last checked
    len: u64,
    identity: FileIdentity,
}

impl WriterState {
    fn end(&self) -> LogPosition {
        LogPosition::new(self.base + self.len)
    }

    /// Brings the state in line with the file currently at `path`.
    fn sync(&mut self, path: &Path) -> Result<(), LogError> {
        let meta = match fs::metadata(path) {
            Ok(meta) => meta,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return self.reopen(path, "log file was removed");
            }
            Err(e) => return Err(e.into()),
        };

        if file_identity(&meta) != self.identity {
            return self.reopen(path, "log file was replaced");
        }

        if meta.len() < self.len {
            info!(
                "Log file {} was truncated; positions below {} are gone",
                path.display(),
                self.end()
            );
            self.base += self.len;
        }
        self.len = meta.len();
        Ok(())
    }

    fn reopen(&mut self, path: &Path, reason: &str) -> Result<(), LogError> {
        let file = open_append(path)?;
        let meta = file.metadata()?;

        info!(
            "{}: {}; positions below {} are gone",
            reason,
            path.display(),
            self.end()
        );

        self.base += self.len;
        self.len = meta.len();
        self.identity = file_identity(&meta);
        self.file = file;
        Ok(())
    }
}

/// Log sink writing to a file on disk.
#[derive(Debug)]
pub struct FileLogSink {
    path: PathBuf,
    writer: Mutex<WriterState>,
}

impl FileLogSink {
    /// Opens (or creates) the log file in append mode.
    ///
    /// Positions start at the file's current length.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, LogError> {
        let path = path.into();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
                debug!("Created log directory: {}", parent.display());
            }
        }

        let file = open_append(&path)?;
        let meta = file.metadata()?;

        Ok(Self {
            path,
            writer: Mutex::new(WriterState {
                file,
                base: 0,
                len: meta.len(),
                identity: file_identity(&meta),
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn synced(&self) -> Result<MutexGuard<'_, WriterState>, LogError> {
        let mut state = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        state.sync(&self.path)?;
        Ok(state)
    }
}

impl LogSink for FileLogSink {
    fn append(&self, text: &str) -> Result<LogPosition, LogError> {
        let encoded = encode_lines(text);
        let mut state = self.synced()?;

        if !encoded.is_empty() {
            state.file.write_all(encoded.as_bytes())?;
            state.file.flush()?;
            state.len = state.file.metadata()?.len();
        }

        Ok(state.end())
    }

    fn end_position(&self) -> Result<LogPosition, LogError> {
        Ok(self.synced()?.end())
    }

    fn read_from(&self, position: LogPosition) -> Result<LogChunk, LogError> {
        let base = self.synced()?.base;

        if position.as_u64() < base {
            return Err(LogError::rotated(position, "data was discarded by rotation"));
        }
        let offset = position.as_u64() - base;

        let mut file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                if offset == 0 {
                    return Ok(LogChunk::empty(position));
                }
                return Err(LogError::rotated(position, "log file is missing"));
            }
            Err(e) => return Err(e.into()),
        };

        let len = file.metadata()?.len();
        if offset > len {
            return Err(LogError::rotated(
                position,
                format!("log file shrank to {} bytes", len),
            ));
        }

        if offset > 0 {
            // The byte before a valid position is always a newline.
            let mut previous = [0u8; 1];
            file.seek(SeekFrom::Start(offset - 1))?;
            file.read_exact(&mut previous)?;
            if previous[0] != b'\n' {
                return Err(LogError::rotated(position, "not on a line boundary"));
            }
        } else {
            file.seek(SeekFrom::Start(0))?;
        }

        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)?;

        let (lines, consumed) = complete_lines(&bytes);
        Ok(LogChunk {
            lines,
            position: position.advance(consumed),
        })
    }
}
