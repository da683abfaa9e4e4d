// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::future::Future;
use std::io::Write;
use std::process::ExitCode;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, error, info};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use ledger_dashboard::chain_view::ChainEvent;
use ledger_dashboard::config::{ClientConfig, LogFormat, DEFAULT_LOG_FILTER};
use ledger_dashboard::state::Session;
use ledger_dashboard::terminal::{self, Output};

const CLEAR_SCREEN: &str = "\x1b[2J\x1b[H";

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_LOG_FILTER.into());
    let registry = tracing_subscriber::registry().with(filter);
    // Logs go to stderr so they do not interleave with terminal output.
    match format {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init(),
        LogFormat::Pretty => registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .init(),
    }
}

fn prompt() {
    print!("> ");
    let _ = std::io::stdout().flush();
}

/// Read commands until input ends, `exit`, or `shutdown` resolves.
///
/// `shutdown` is created once by the caller, so a signal that arrives while
/// a command is running is still seen on the next turn of the loop.
async fn run_console<R, S>(
    session: &Session,
    input: R,
    mut events: broadcast::Receiver<ChainEvent>,
    shutdown: S,
) where
    R: AsyncBufRead + Unpin,
    S: Future<Output = std::io::Result<()>>,
{
    let mut lines = input.lines();
    let mut events_open = true;
    tokio::pin!(shutdown);

    prompt();
    loop {
        tokio::select! {
            biased;
            result = &mut shutdown => {
                if let Err(e) = result {
                    error!(error = %e, "Failed to listen for shutdown signal");
                }
                break;
            }
            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => break,
                    Err(e) => {
                        error!(error = %e, "Failed to read input");
                        break;
                    }
                };
                if matches!(line.trim(), "exit" | "quit") {
                    break;
                }
                match terminal::run_line(session, &line).await {
                    Ok(Some(Output::Text(text))) => println!("{text}"),
                    Ok(Some(Output::Clear)) => print!("{CLEAR_SCREEN}"),
                    Ok(None) => {}
                    Err(e) => println!("Error: {e}"),
                }
                prompt();
            }
            event = events.recv(), if events_open => match event {
                Ok(ChainEvent::NewBlock { previous_count, current_count }) => {
                    println!("\nNew block: chain grew from {previous_count} to {current_count} blocks");
                    prompt();
                }
                Err(RecvError::Lagged(skipped)) => debug!(skipped, "Chain events lagged"),
                Err(RecvError::Closed) => events_open = false,
            },
        }
    }
    println!();
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing(LogFormat::from_env());

    let config = ClientConfig::from_env();
    let session = match Session::from_config(&config) {
        Ok(session) => session,
        Err(e) => {
            error!(error = %e, "Failed to start session");
            return ExitCode::FAILURE;
        }
    };

    info!(node = %config.rpc_base_url, "Ledger dashboard starting");

    let poller = session.poller(config.poll_intervals);
    let events = poller.subscribe();
    let handle = poller.start();

    println!("Connected to {}. Type 'help' for commands.", config.rpc_base_url);
    run_console(
        &session,
        BufReader::new(tokio::io::stdin()),
        events,
        tokio::signal::ctrl_c(),
    )
    .await;

    handle.stop().await;
    info!("Ledger dashboard stopped");
    ExitCode::SUCCESS
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use ledger_dashboard::blockchain::client::NodeClient;
    use ledger_dashboard::storage::KeyMaterialStore;
    use tokio::io::AsyncWriteExt;
    use tokio::sync::oneshot;

    fn offline_session() -> Session {
        let client = NodeClient::new("http://127.0.0.1:9", Duration::from_millis(50)).unwrap();
        Session::new(client, KeyMaterialStore::in_memory(), 8)
    }

    #[tokio::test]
    async fn shutdown_ends_the_console_while_input_is_open() {
        let session = offline_session();
        let (_events_tx, events) = broadcast::channel(4);
        let (mut writer, reader) = tokio::io::duplex(256);
        let (stop_tx, stop_rx) = oneshot::channel::<()>();

        writer.write_all(b"help\n").await.unwrap();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            let _ = stop_tx.send(());
        });
        let shutdown = async move {
            let _ = stop_rx.await;
            Ok(())
        };

        // Input never reaches EOF, so only the shutdown future can end the loop.
        tokio::time::timeout(
            Duration::from_secs(5),
            run_console(&session, BufReader::new(reader), events, shutdown),
        )
        .await
        .expect("console should stop once shutdown has fired");
        drop(writer);
    }

    #[tokio::test]
    async fn exit_ends_the_console() {
        let session = offline_session();
        let (_events_tx, events) = broadcast::channel(4);
        let (mut writer, reader) = tokio::io::duplex(256);
        writer.write_all(b"help\nexit\n").await.unwrap();

        tokio::time::timeout(
            Duration::from_secs(5),
            run_console(&session, BufReader::new(reader), events, std::future::pending()),
        )
        .await
        .expect("console should stop on exit");
        drop(writer);
    }
}
