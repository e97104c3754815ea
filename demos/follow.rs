//! Follows a log file by name across rotations, like `tail -F`.
//!
//! The reader only reports that the file was renamed or removed; reopening
//! the new file at the same path is this program's decision.

use log_tail::{TailRead, TailReader};
use std::path::Path;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "fixtures/simple_append.log".to_string());

    let mut reader = TailReader::open(&path, 0).await?;
    let mut buf = vec![0u8; 4096];

    println!("Following {} (Ctrl-C to stop)", path);

    loop {
        let outcome = tokio::select! {
            outcome = reader.read_timeout(&mut buf, Duration::from_secs(30)) => outcome?,
            _ = tokio::signal::ctrl_c() => break,
        };

        match outcome {
            TailRead::Data(n) => print!("{}", String::from_utf8_lossy(&buf[..n])),
            TailRead::Idle => {}
            TailRead::TimedOut => eprintln!("[no new data for 30s, offset {}]", reader.offset()),
            TailRead::Removed | TailRead::Renamed => {
                eprintln!("[{} rotated at offset {}, reopening]", path, reader.offset());
                reader.close().await?;
                reader = reopen(&path).await?;
            }
            TailRead::EndOfStream => break,
        }
    }

    reader.close().await?;
    Ok(())
}

/// Waits for the path to exist again and opens it from the beginning.
async fn reopen(path: &str) -> Result<TailReader, Box<dyn std::error::Error>> {
    for _ in 0..50 {
        if Path::new(path).exists() {
            return Ok(TailReader::open(path, 0).await?);
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    Err(format!("{} did not reappear after rotation", path).into())
}
