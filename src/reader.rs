//! The live tail reader.
//!
//! A [`TailReader`] reads a file sequentially from a start offset. At end of
//! file a read parks until the file changes, the reader is closed, or the
//! change subscription fails, then retries the read exactly once.

use crate::config::TailOptions;
use crate::error::{Error, Result};
use crate::watcher::{FileEventKind, FileWatch};
use std::fmt;
use std::fs::Metadata;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::{Mutex, watch};
use tracing::{debug, trace, warn};

/// Reported by [`TailReader::len`]: the size of a live file is never final.
pub const UNBOUNDED_LEN: i64 = -1;

/// Outcome of a single [`TailReader::read`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TailRead {
    /// This many bytes were copied into the buffer. Only zero for an empty buffer.
    Data(usize),
    /// Woken by a change notification, but the retry found no new bytes.
    /// Calling `read` again parks until the next change.
    Idle,
    /// The reader was closed (or opened without a watch and hit end of
    /// file). No more data will be produced.
    EndOfStream,
    /// The tracked file was removed while waiting for data.
    Removed,
    /// The tracked file was renamed while waiting for data.
    Renamed,
    /// The wait of [`TailReader::read_timeout`] elapsed.
    TimedOut,
}

impl TailRead {
    /// Whether this reader will never yield data again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TailRead::EndOfStream | TailRead::Removed | TailRead::Renamed
        )
    }
}

/// What ended a wait at end of file.
enum Wake {
    Changed,
    Closed,
    Removed,
    Renamed,
    TimedOut,
}

/// Sequential reader over a file that another process keeps appending to.
///
/// Reads and closes take `&self` so a reader shared through an `Arc` can be
/// closed from one task while another is parked in [`read`](Self::read).
/// At most one `read` may be in flight at a time.
pub struct TailReader {
    path: PathBuf,
    file: Mutex<Option<File>>,
    watch: Option<FileWatch>,
    offset: AtomicU64,
    closed: watch::Sender<bool>,
    metadata: Metadata,
}

impl TailReader {
    /// Opens `path` for tailing, starting at byte `start_offset`.
    pub async fn open<P: AsRef<Path>>(path: P, start_offset: u64) -> Result<Self> {
        Self::open_with(path, TailOptions::default().with_offset(start_offset)).await
    }

    /// Opens `path` with explicit options.
    ///
    /// Anything acquired before a failing step is released before the error
    /// is returned.
    pub async fn open_with<P: AsRef<Path>>(path: P, options: TailOptions) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let (file, metadata) = open_at(&path, options.offset).await?;

        let watch = if options.watch {
            Some(FileWatch::new(&path)?)
        } else {
            None
        };

        Ok(Self::from_parts(path, file, metadata, watch, options.offset))
    }

    /// Opens `path` from the start with a subscription built by the caller.
    #[cfg(test)]
    pub(crate) async fn open_with_watch(path: &Path, watch: FileWatch) -> Result<Self> {
        let (file, metadata) = open_at(path, 0).await?;
        Ok(Self::from_parts(path.to_path_buf(), file, metadata, Some(watch), 0))
    }

    fn from_parts(
        path: PathBuf,
        file: File,
        metadata: Metadata,
        watch: Option<FileWatch>,
        offset: u64,
    ) -> Self {
        debug!(
            path = %path.display(),
            offset,
            size = metadata.len(),
            watching = watch.is_some(),
            "opened tail reader"
        );

        let (closed, _) = watch::channel(false);

        Self {
            path,
            file: Mutex::new(Some(file)),
            watch,
            offset: AtomicU64::new(offset),
            closed,
            metadata,
        }
    }

    /// Reads the next bytes of the file into `buf`.
    ///
    /// Returns data immediately when the file has grown past the current
    /// offset. Otherwise parks until a change notification or close, and
    /// retries once. Underlying read failures and subscription failures are
    /// returned as errors; the reader should be closed after the latter.
    pub async fn read(&self, buf: &mut [u8]) -> Result<TailRead> {
        self.read_inner(buf, None).await
    }

    /// Like [`read`](Self::read), but gives up waiting after `timeout` and
    /// returns [`TailRead::TimedOut`].
    pub async fn read_timeout(&self, buf: &mut [u8], timeout: Duration) -> Result<TailRead> {
        self.read_inner(buf, Some(timeout)).await
    }

    async fn read_inner(&self, buf: &mut [u8], timeout: Option<Duration>) -> Result<TailRead> {
        match self.read_direct(buf).await? {
            None => return Ok(TailRead::EndOfStream),
            Some(0) => {}
            Some(n) => return Ok(TailRead::Data(n)),
        }

        if buf.is_empty() {
            return Ok(TailRead::Data(0));
        }

        let Some(watch) = &self.watch else {
            return Ok(TailRead::EndOfStream);
        };

        match self.wait_for_change(watch, timeout).await? {
            Wake::Changed => {}
            Wake::Closed => return Ok(TailRead::EndOfStream),
            Wake::Removed => return Ok(TailRead::Removed),
            Wake::Renamed => return Ok(TailRead::Renamed),
            Wake::TimedOut => return Ok(TailRead::TimedOut),
        }

        Ok(match self.read_direct(buf).await? {
            None => TailRead::EndOfStream,
            Some(0) => TailRead::Idle,
            Some(n) => TailRead::Data(n),
        })
    }

    /// Reads from the current position. `None` once the reader is closed.
    async fn read_direct(&self, buf: &mut [u8]) -> Result<Option<usize>> {
        if self.is_closed() {
            return Ok(None);
        }

        let mut guard = self.file.lock().await;
        let Some(file) = guard.as_mut() else {
            return Ok(None);
        };

        let n = file.read(buf).await?;
        self.offset.fetch_add(n as u64, Ordering::AcqRel);
        Ok(Some(n))
    }

    async fn wait_for_change(&self, watch: &FileWatch, timeout: Option<Duration>) -> Result<Wake> {
        let deadline = async {
            match timeout {
                Some(timeout) => tokio::time::sleep(timeout).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            biased;

            _ = self.closed_signal() => Ok(Wake::Closed),

            change = watch.next_change() => match change {
                // Subscription released by a concurrent close.
                None => Ok(Wake::Closed),
                Some(Err(e)) => Err(Error::Watcher(e)),
                Some(Ok(FileEventKind::Removed)) => Ok(Wake::Removed),
                Some(Ok(FileEventKind::Renamed)) => Ok(Wake::Renamed),
                Some(Ok(kind)) => {
                    trace!(path = %self.path.display(), ?kind, "woken by change");
                    Ok(Wake::Changed)
                }
            },

            _ = deadline => Ok(Wake::TimedOut),
        }
    }

    /// Resolves once close has been requested.
    async fn closed_signal(&self) {
        let mut closed = self.closed.subscribe();
        let _ = closed.wait_for(|closed| *closed).await;
    }

    /// Stops the reader and releases the file handle and the change
    /// subscription.
    ///
    /// A read parked at end of file wakes with [`TailRead::EndOfStream`].
    /// Only the first call does any work; later calls return `Ok(())`.
    pub async fn close(&self) -> Result<()> {
        let first = self
            .closed
            .send_if_modified(|closed| !std::mem::replace(closed, true));
        if !first {
            return Ok(());
        }

        // Waits out a direct read in progress; parked reads do not hold the lock.
        let file = self.file.lock().await.take();
        if let Some(file) = file {
            drop(file.into_std().await);
        }

        let released = match &self.watch {
            Some(watch) => watch.release().map_err(|source| Error::Unwatch {
                path: self.path.clone(),
                source,
            }),
            None => Ok(()),
        };

        match &released {
            Ok(()) => debug!(path = %self.path.display(), offset = self.offset(), "closed tail reader"),
            Err(e) => warn!(path = %self.path.display(), error = %e, "failed to release watch"),
        }

        released
    }

    /// Absolute position of the next byte to be delivered: the start offset
    /// plus every byte returned so far. Safe to call while a read is in flight.
    pub fn offset(&self) -> u64 {
        self.offset.load(Ordering::Acquire)
    }

    /// Always [`UNBOUNDED_LEN`]; a growing file has no meaningful length.
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> i64 {
        UNBOUNDED_LEN
    }

    /// The path the reader was opened with.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Metadata captured when the reader was opened. Not refreshed.
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Runs `f` with the underlying file handle, or returns `None` after close.
    pub async fn with_file<R>(&self, f: impl FnOnce(&File) -> R) -> Option<R> {
        self.file.lock().await.as_ref().map(f)
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Whether a change subscription is held.
    pub fn is_watching(&self) -> bool {
        self.watch.as_ref().is_some_and(FileWatch::is_active)
    }
}

/// Opens the file, positions it at `offset` and captures its metadata.
async fn open_at(path: &Path, offset: u64) -> Result<(File, Metadata)> {
    let mut file = File::open(path).await?;

    if offset > 0 {
        file.seek(SeekFrom::Start(offset))
            .await
            .map_err(|source| Error::Seek {
                path: path.to_path_buf(),
                offset,
                source,
            })?;
    }

    let metadata = file.metadata().await.map_err(|source| Error::Stat {
        path: path.to_path_buf(),
        source,
    })?;

    Ok((file, metadata))
}

impl fmt::Debug for TailReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TailReader")
            .field("path", &self.path)
            .field("offset", &self.offset())
            .field("watching", &self.is_watching())
            .field("closed", &self.is_closed())
            .finish()
    }
}
