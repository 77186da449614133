//! Command-line surface and the thin drivers around the channel
//! engines. All protocol behavior lives in `byteferry-channel`; this
//! module only parses flags, wires up progress printing and loops the
//! receiver.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tracing::error;

use byteferry_channel::{TcpFileReceiver, TcpFileSender, TransferEvent};

use crate::config::Config;

#[derive(Parser, Debug)]
#[command(name = "transfer")]
#[command(about = "Send and receive files over a single TCP connection", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Listen for transfer sessions and save received files.
    Recv {
        /// Host to bind to.
        #[arg(long)]
        bind: Option<String>,

        /// Port to listen on.
        #[arg(long)]
        port: Option<u16>,

        /// Destination directory for received files.
        #[arg(long, default_value = ".")]
        dest: PathBuf,

        /// Read timeout in seconds (configured default when given
        /// without a value).
        #[arg(long, value_name = "SECS")]
        timeout: Option<Option<u64>>,
    },

    /// Connect to a receiver and send files.
    Send {
        /// Remote host to connect to.
        #[arg(long)]
        rhost: String,

        /// Remote port.
        port: u16,

        /// Read/write timeout in seconds (configured default when
        /// given without a value).
        #[arg(long, value_name = "SECS")]
        timeout: Option<Option<u64>>,

        /// Files to send, in order.
        #[arg(short = 'f', long = "file", required = true)]
        files: Vec<PathBuf>,
    },
}

pub async fn run(cli: Cli, config: Config) -> anyhow::Result<()> {
    match cli.command {
        Command::Recv {
            bind,
            port,
            dest,
            timeout,
        } => {
            let bind = bind.unwrap_or(config.bind);
            let port = port.unwrap_or(config.port);
            let timeout = resolve_timeout(timeout, config.timeout_secs);
            recv(bind, port, dest, timeout).await
        }
        Command::Send {
            rhost,
            port,
            timeout,
            files,
        } => {
            let timeout = resolve_timeout(timeout, config.timeout_secs);
            send(rhost, port, files, timeout).await
        }
    }
}

/// `--timeout` absent means no timeout; bare `--timeout` means the
/// configured default; `--timeout N` means N seconds.
fn resolve_timeout(flag: Option<Option<u64>>, default_secs: u64) -> Option<Duration> {
    flag.map(|secs| Duration::from_secs(secs.unwrap_or(default_secs)))
}

async fn recv(
    bind: String,
    port: u16,
    dest: PathBuf,
    timeout: Option<Duration>,
) -> anyhow::Result<()> {
    let receiver =
        TcpFileReceiver::bind(format!("{bind}:{port}"), dest, timeout).await?;
    println!("listening on {}", receiver.local_addr()?);

    // A failed session never kills the listener; log it and keep
    // serving, one connection at a time.
    loop {
        let (tx, mut rx) = mpsc::channel(64);
        let printer = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                match event {
                    TransferEvent::Connected { peer } => println!("connection from {peer}"),
                    TransferEvent::FileSaved { filename, .. } => println!("{filename} saved"),
                    _ => {}
                }
            }
        });

        if let Err(e) = receiver.accept_session(tx).await {
            error!(error = %e, "session failed");
            eprintln!("session failed: {e}");
        }
        let _ = printer.await;
    }
}

async fn send(
    rhost: String,
    port: u16,
    files: Vec<PathBuf>,
    timeout: Option<Duration>,
) -> anyhow::Result<()> {
    let (tx, mut rx) = mpsc::channel(64);
    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match event {
                TransferEvent::SendStarted { filename, .. } => {
                    println!("sending: {filename} ...");
                }
                TransferEvent::FileSent { filename } => println!("{filename} SENT"),
                _ => {}
            }
        }
    });

    let result =
        TcpFileSender::connect_and_send(format!("{rhost}:{port}"), &files, timeout, tx).await;
    let _ = printer.await;

    result?;
    Ok(())
}
