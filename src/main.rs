//! `gbn-transfer sender <port> <window> <loss> <corrupt>` serves files until
//! killed; `gbn-transfer receiver <host> <port> <file> <loss> <corrupt>`
//! fetches one file and exits non-zero if the transfer failed.

use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use gbn_transfer::config::{
    ImpairmentConfig, Probability, ReceiverConfig, SenderConfig, DEFAULT_FIN_RETRIES,
};
use gbn_transfer::packet::MAX_PAYLOAD;

/// Reliable file transfer over UDP with simulated loss and corruption.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand)]
enum Mode {
    /// Serve files from the working directory, one transfer at a time.
    Sender {
        /// UDP port to listen on.
        port: u16,
        /// Number of chunks sent per round.
        window: usize,
        /// Probability that an outbound packet is lost.
        loss: Probability,
        /// Probability that an outbound packet is corrupted.
        corrupt: Probability,
        /// Directory requested files are served from.
        #[arg(long, default_value = ".")]
        root: PathBuf,
        /// Acknowledgment wait per round, in milliseconds.
        #[arg(long, default_value_t = 1000)]
        timeout_ms: u64,
        /// Bytes per data chunk.
        #[arg(long, default_value_t = MAX_PAYLOAD)]
        chunk_size: usize,
        /// FIN transmissions before giving up on the FIN-ACK.
        #[arg(long, default_value_t = DEFAULT_FIN_RETRIES)]
        fin_retries: u32,
        /// Abandon a transfer after this many rounds without progress.
        #[arg(long)]
        max_stalled_rounds: Option<u32>,
        /// Seed for the impairment model.
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Fetch one file from a sender.
    Receiver {
        /// Sender host name or address.
        host: String,
        /// Sender UDP port.
        port: u16,
        /// Name of the file to request.
        file: String,
        /// Probability that an outbound packet is lost.
        loss: Probability,
        /// Probability that an outbound packet is corrupted.
        corrupt: Probability,
        /// Output path (default: n_<file> in the working directory).
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Seconds to wait for any packet before giving up; 0 waits forever.
        #[arg(long, default_value_t = 30)]
        idle_timeout: u64,
        /// Milliseconds to keep answering FINs after the transfer.
        #[arg(long, default_value_t = 2000)]
        linger_ms: u64,
        /// Seed for the impairment model.
        #[arg(long)]
        seed: Option<u64>,
    },
}

fn impairment(loss: Probability, corrupt: Probability, seed: Option<u64>) -> ImpairmentConfig {
    ImpairmentConfig {
        loss,
        corrupt,
        seed,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Set RUST_LOG to control verbosity; per-packet traffic is at debug.
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.mode {
        Mode::Sender {
            port,
            window,
            loss,
            corrupt,
            root,
            timeout_ms,
            chunk_size,
            fin_retries,
            max_stalled_rounds,
            seed,
        } => {
            let bind = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
            let mut config = SenderConfig::new(bind, window, impairment(loss, corrupt, seed));
            config.root = root;
            config.round_timeout = Duration::from_millis(timeout_ms);
            config.chunk_size = chunk_size;
            config.fin_retries = fin_retries;
            config.max_stalled_rounds = max_stalled_rounds;

            let mut server = gbn_transfer::Server::bind(config)
                .await
                .context("cannot start sender")?;
            server.run().await;
        }
        Mode::Receiver {
            host,
            port,
            file,
            loss,
            corrupt,
            output,
            idle_timeout,
            linger_ms,
            seed,
        } => {
            let mut config = ReceiverConfig::new(host, port, file, impairment(loss, corrupt, seed));
            if let Some(output) = output {
                config.output = output;
            }
            config.idle_timeout = (idle_timeout > 0).then(|| Duration::from_secs(idle_timeout));
            config.linger = Duration::from_millis(linger_ms);

            let summary = gbn_transfer::fetch(&config)
                .await
                .with_context(|| format!("transfer of {:?} failed", config.file_name))?;
            println!(
                "Received {} bytes into {}",
                summary.bytes,
                summary.output.display()
            );
        }
    }

    Ok(())
}
