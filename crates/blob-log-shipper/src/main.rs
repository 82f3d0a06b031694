// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::env;
use std::future::Future;
use std::process::ExitCode;
use tokio::io::{self, AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use azure_blob_logs::{config::TransportConfig, formatter::Metadata, transport::BlobTransport};

#[tokio::main]
pub async fn main() -> ExitCode {
    let log_level = env::var("BLOB_LOGS_DIAGNOSTICS_LEVEL")
        .map(|val| val.to_lowercase())
        .unwrap_or("info".to_string());

    let env_filter = format!("h2=off,hyper=off,rustls=off,{}", log_level);

    #[allow(clippy::expect_used)]
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_new(env_filter).expect("could not parse log level in configuration"),
        )
        .with_writer(std::io::stderr)
        .with_level(true)
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(true)
        .finish();

    #[allow(clippy::expect_used)]
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    debug!("Logging subsystem enabled");

    let config = match TransportConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            error!("Error reading blob transport configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    let transport = match BlobTransport::from_config(config) {
        Ok(t) => t,
        Err(e) => {
            error!("Error creating blob transport: {e}");
            return ExitCode::FAILURE;
        }
    };

    match transport.initialize().await {
        Ok(true) => info!("Created container for blob logs"),
        Ok(false) => debug!("Using existing container for blob logs"),
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    }

    let level = transport.level().to_string();
    info!(
        "Shipping stdin to {} at level {}",
        transport.current_blob_name(),
        level
    );

    let ctrl_c = tokio::signal::ctrl_c();
    let forwarded = forward_lines(BufReader::new(io::stdin()), ctrl_c, |line| {
        let _ = transport.log(&level, line, &Metadata::None);
    })
    .await;
    debug!("Forwarded {} line(s)", forwarded);

    if let Err(e) = transport.shutdown().await {
        error!("Failed to flush pending lines: {e}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

/// Hands every input line to `forward` until end of input, a read error or
/// `shutdown` resolving. Returns the number of lines forwarded.
async fn forward_lines<R, S, F>(input: R, shutdown: S, mut forward: F) -> usize
where
    R: AsyncBufRead + Unpin,
    S: Future,
    F: FnMut(&str),
{
    let mut lines = input.lines();
    let mut forwarded = 0;
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            biased;
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    forward(&line);
                    forwarded += 1;
                }
                Ok(None) => {
                    debug!("Reached end of input");
                    break;
                }
                Err(e) => {
                    error!("Failed to read stdin: {e}");
                    break;
                }
            },
            _ = &mut shutdown => {
                info!("Interrupted, flushing pending lines");
                break;
            }
        }
    }
    forwarded
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn test_forwards_until_end_of_input() {
        let input: &[u8] = b"one\ntwo\nthree\n";
        let mut seen = Vec::new();
        let forwarded = forward_lines(input, std::future::pending::<()>(), |line| {
            seen.push(line.to_string())
        })
        .await;
        assert_eq!(forwarded, 3);
        assert_eq!(seen, vec!["one", "two", "three"]);
    }

    #[tokio::test]
    async fn test_shutdown_signal_is_seen_while_input_stays_open() {
        let (reader, mut writer) = tokio::io::duplex(64);
        let (signal_tx, signal_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            let mut seen = Vec::new();
            forward_lines(BufReader::new(reader), signal_rx, |line| {
                seen.push(line.to_string())
            })
            .await;
            seen
        });

        writer.write_all(b"first\nsecond\n").await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        signal_tx.send(()).unwrap();

        let seen = tokio::time::timeout(std::time::Duration::from_secs(5), task)
            .await
            .expect("forwarding did not stop on the signal")
            .unwrap();
        assert_eq!(seen, vec!["first", "second"]);
        drop(writer);
    }
}
