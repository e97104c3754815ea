//! A live tail reader for files that another process keeps appending to.
//!
//! A [`TailReader`] reads sequentially from a start offset. When it reaches the
//! current end of file it parks until filesystem change notifications report
//! new activity, instead of polling. Removal and renaming of the file (log
//! rotation) are reported as distinct outcomes so the caller can reopen,
//! alert, or stop.
//!
//! # Example
//!
//! ```rust,no_run
//! use log_tail::TailRead;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let reader = log_tail::open("app.log", 0).await?;
//!     let mut buf = [0u8; 4096];
//!
//!     loop {
//!         match reader.read(&mut buf).await? {
//!             TailRead::Data(n) => print!("{}", String::from_utf8_lossy(&buf[..n])),
//!             TailRead::Idle | TailRead::TimedOut => continue,
//!             TailRead::Removed | TailRead::Renamed => {
//!                 eprintln!("app.log was rotated");
//!                 break;
//!             }
//!             TailRead::EndOfStream => break,
//!         }
//!     }
//!
//!     reader.close().await?;
//!     Ok(())
//! }
//! ```

mod config;
mod error;
mod reader;
mod stream;
mod watcher;

#[cfg(test)]
mod test_helpers;

// Public API exports
pub use config::TailOptions;
pub use error::{Error, Result};
pub use reader::{TailRead, TailReader, UNBOUNDED_LEN};
pub use stream::{DEFAULT_CHUNK_SIZE, TailStream};

use std::path::Path;
use std::sync::Arc;

/// Opens `path` for tailing from byte `start_offset`.
///
/// The returned reader owns the file handle and the change subscription;
/// call [`TailReader::close`] when done with it.
pub async fn open<P: AsRef<Path>>(path: P, start_offset: u64) -> Result<TailReader> {
    TailReader::open(path, start_offset).await
}

/// Opens `path` and returns a stream of the chunks appended to it.
///
/// # Example
///
/// ```rust,no_run
/// use tokio_stream::StreamExt;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let mut stream = log_tail::tail("app.log", 0).await?;
///
///     while let Some(chunk) = stream.next().await {
///         print!("{}", String::from_utf8_lossy(&chunk?));
///     }
///
///     Ok(())
/// }
/// ```
pub async fn tail<P: AsRef<Path>>(path: P, start_offset: u64) -> Result<TailStream> {
    let reader = TailReader::open(path, start_offset).await?;
    Ok(TailStream::new(Arc::new(reader)))
}
