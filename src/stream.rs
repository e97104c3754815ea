//! Stream adapter that drains a [`TailReader`] chunk by chunk.

use crate::error::{Error, Result};
use crate::reader::{TailRead, TailReader};
use futures::stream::{self, BoxStream, Fuse, FusedStream, Stream, StreamExt};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

/// Chunk size used by [`TailStream::new`].
pub const DEFAULT_CHUNK_SIZE: usize = 8 * 1024;

/// A stream of byte chunks appended to a tailed file.
///
/// Ends when the reader is closed. Removal or renaming of the file is
/// yielded as a final [`Error::FileRemoved`] / [`Error::FileRenamed`] item.
/// Nothing runs in the background: polling the stream drives the reader.
///
/// The stream is fused; once it has ended, further polls return `None`
/// without touching the reader.
pub struct TailStream {
    reader: Arc<TailReader>,
    inner: Fuse<BoxStream<'static, Result<Vec<u8>>>>,
}

struct State {
    reader: Arc<TailReader>,
    buf: Vec<u8>,
    done: bool,
}

impl TailStream {
    /// Streams `reader` in chunks of up to [`DEFAULT_CHUNK_SIZE`] bytes.
    pub fn new(reader: Arc<TailReader>) -> Self {
        Self::with_chunk_size(reader, DEFAULT_CHUNK_SIZE)
    }

    /// Streams `reader` in chunks of up to `chunk_size` bytes (at least one).
    pub fn with_chunk_size(reader: Arc<TailReader>, chunk_size: usize) -> Self {
        let state = State {
            reader: Arc::clone(&reader),
            buf: vec![0; chunk_size.max(1)],
            done: false,
        };

        Self {
            reader,
            inner: stream::unfold(state, next_chunk).boxed().fuse(),
        }
    }

    /// The reader behind this stream, e.g. to close it or observe its offset.
    pub fn reader(&self) -> &Arc<TailReader> {
        &self.reader
    }
}

async fn next_chunk(mut state: State) -> Option<(Result<Vec<u8>>, State)> {
    if state.done {
        return None;
    }

    loop {
        let outcome = match state.reader.read(&mut state.buf).await {
            Ok(outcome) => outcome,
            Err(e) => {
                state.done = true;
                return Some((Err(e), state));
            }
        };

        let item = match outcome {
            TailRead::Data(n) => Ok(state.buf[..n].to_vec()),
            TailRead::Idle | TailRead::TimedOut => continue,
            TailRead::EndOfStream => return None,
            TailRead::Removed => {
                state.done = true;
                Err(Error::FileRemoved {
                    path: state.reader.path().to_path_buf(),
                })
            }
            TailRead::Renamed => {
                state.done = true;
                Err(Error::FileRenamed {
                    path: state.reader.path().to_path_buf(),
                })
            }
        };

        return Some((item, state));
    }
}

impl Stream for TailStream {
    type Item = Result<Vec<u8>>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.poll_next_unpin(cx)
    }
}

impl FusedStream for TailStream {
    fn is_terminated(&self) -> bool {
        self.inner.is_terminated()
    }
}
