use log_tail::{Error, TailReader, TailStream};
use std::env;
use std::process;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio_stream::StreamExt;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = env::args().collect();

    if args.len() < 2 || args.len() > 3 {
        eprintln!("Usage: {} <file_path> [start_offset]", args[0]);
        process::exit(1);
    }

    let file_path = &args[1];
    let start_offset = match args.get(2).map(|s| s.parse::<u64>()).transpose() {
        Ok(offset) => offset.unwrap_or(0),
        Err(e) => {
            eprintln!("Invalid start offset: {}", e);
            process::exit(1);
        }
    };

    let reader = match TailReader::open(file_path, start_offset).await {
        Ok(reader) => Arc::new(reader),
        Err(e) => {
            eprintln!("Error opening {}: {}", file_path, e);
            process::exit(1);
        }
    };

    // Ctrl-C closes the reader, which ends the stream below.
    let closer = Arc::clone(&reader);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            if let Err(e) = closer.close().await {
                tracing::warn!(error = %e, "close on interrupt failed");
            }
        }
    });

    let mut stdout = tokio::io::stdout();
    let mut stream = TailStream::new(Arc::clone(&reader));
    let mut status = 0;

    while let Some(chunk) = stream.next().await {
        match chunk {
            Ok(bytes) => {
                if let Err(e) = write_chunk(&mut stdout, &bytes).await {
                    eprintln!("Error writing output: {}", e);
                    status = 1;
                    break;
                }
            }
            Err(e @ (Error::FileRemoved { .. } | Error::FileRenamed { .. })) => {
                eprintln!("{}", e);
                status = 2;
                break;
            }
            Err(e) => {
                eprintln!("Error reading file: {}", e);
                status = 1;
                break;
            }
        }
    }

    if let Err(e) = reader.close().await {
        eprintln!("Error closing {}: {}", file_path, e);
        status = 1;
    }

    tracing::info!(path = %file_path, offset = reader.offset(), "stopped tailing");
    process::exit(status);
}

async fn write_chunk(stdout: &mut tokio::io::Stdout, bytes: &[u8]) -> std::io::Result<()> {
    stdout.write_all(bytes).await?;
    stdout.flush().await
}
