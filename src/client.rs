//! Receiver role: fetch one file from a sender.
//!
//! 1. Send the REQUEST (unimpaired) and create the output file.
//! 2. Feed every packet from the sender into a [`ReceiverSession`], writing
//!    delivered chunks and sending ACKs through the impairment simulator.
//! 3. After the FIN-ACK, linger briefly so a retransmitted FIN (our FIN-ACK
//!    was lost) still gets an answer.
//!
//! Each receive waits at most the configured idle timeout, so a sender that
//! disappears mid-transfer produces [`FetchError::IdleTimeout`] instead of a
//! receiver blocked forever.

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use tokio::fs::File;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};

use crate::config::{ConfigError, ReceiverConfig};
use crate::packet::Packet;
use crate::receiver::{ReceiverSession, ReceiverStats, Step};
use crate::simulator::{Impairment, Simulator};
use crate::socket::{Socket, SocketError};
use crate::timer::RoundTimer;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("cannot resolve {host}:{port}: {source}")]
    Resolve {
        host: String,
        port: u16,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Socket(#[from] SocketError),
    #[error("cannot write output file {}: {source}", .path.display())]
    Output {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("no such file on sender: {0}")]
    NotFound(String),
    #[error("no packet from sender for {0:?}")]
    IdleTimeout(Duration),
}

/// A completed fetch.
#[derive(Debug)]
pub struct FetchSummary {
    pub output: PathBuf,
    pub bytes: u64,
    pub stats: ReceiverStats,
}

/// Fetch `config.file_name` from the configured sender.
pub async fn fetch(config: &ReceiverConfig) -> Result<FetchSummary, FetchError> {
    config.validate()?;
    let server = resolve(&config.host, config.port).await?;
    let local = if server.is_ipv4() {
        SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))
    } else {
        SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0))
    };
    let socket = Socket::bind(local).await?;
    let mut sim = Simulator::new(socket, Impairment::new(&config.impairment));

    sim.send_unimpaired(&Packet::request(&config.file_name), server).await?;
    log::info!("[receiver] → REQUEST {:?} to {server}; awaiting file", config.file_name);

    let file = File::create(&config.output)
        .await
        .map_err(|source| output_error(config, source))?;

    let mut session = ReceiverSession::new();
    let mut out = BufWriter::new(file);
    let outcome = receive(&mut sim, server, config, &mut session, &mut out).await;
    let received = match outcome {
        Ok(()) => out
            .into_inner()
            .sync_all()
            .await
            .map_err(|source| output_error(config, source)),
        Err(e) => {
            drop(out);
            Err(e)
        }
    };
    if let Err(e) = received {
        // A partial file is never left behind.
        if let Err(rm) = tokio::fs::remove_file(&config.output).await {
            log::warn!("[receiver] cannot remove {}: {rm}", config.output.display());
        }
        return Err(e);
    }

    linger(&mut sim, server, &mut session, config.linger).await;

    let stats = session.stats().clone();
    log::info!(
        "[receiver] received {} bytes in {} chunk(s) into {}",
        stats.bytes_accepted,
        stats.chunks_accepted,
        config.output.display()
    );
    Ok(FetchSummary {
        output: config.output.clone(),
        bytes: stats.bytes_accepted,
        stats,
    })
}

/// Run the session until the FIN is answered, writing chunks to `out`.
async fn receive<W>(
    sim: &mut Simulator,
    server: SocketAddr,
    config: &ReceiverConfig,
    session: &mut ReceiverSession,
    out: &mut W,
) -> Result<(), FetchError>
where
    W: AsyncWrite + Unpin,
{
    loop {
        let pkt = recv_from_server(sim, server, config.idle_timeout).await?;

        match session.on_packet(&pkt) {
            Step::Discard(reason) => {
                log::debug!("[receiver] ← {} seq={} discarded: {reason:?}", pkt.kind, pkt.seq)
            }
            Step::Deliver { data, ack } => {
                out.write_all(data)
                    .await
                    .map_err(|source| output_error(config, source))?;
                log::debug!("[receiver] ← DATA seq={} len={}; → ACK", pkt.seq, data.len());
                sim.send(&ack, server).await?;
            }
            Step::Reack(ack) => {
                log::debug!(
                    "[receiver] ← DATA seq={} (expected {}); → ACK again",
                    pkt.seq,
                    session.expected()
                );
                sim.send(&ack, server).await?;
            }
            Step::Finish(fin_ack) => {
                out.flush()
                    .await
                    .map_err(|source| output_error(config, source))?;
                log::debug!("[receiver] ← FIN seq={}; → FIN-ACK", pkt.seq);
                sim.send(&fin_ack, server).await?;
                return Ok(());
            }
            Step::NotFound => return Err(FetchError::NotFound(config.file_name.clone())),
        }
    }
}

/// Next well-formed packet from `server`, bounded by the idle timeout.
async fn recv_from_server(
    sim: &Simulator,
    server: SocketAddr,
    idle: Option<Duration>,
) -> Result<Packet, FetchError> {
    loop {
        let received = match idle {
            Some(limit) => tokio::time::timeout(limit, sim.recv())
                .await
                .map_err(|_| FetchError::IdleTimeout(limit))?,
            None => sim.recv().await,
        };
        match received {
            Ok((pkt, addr)) if addr == server => return Ok(pkt),
            Ok((pkt, addr)) => log::debug!("[receiver] ← {} from stranger {addr}; ignored", pkt.kind),
            Err(e) if e.is_malformed() => log::warn!("[receiver] malformed datagram: {e}"),
            Err(e) => return Err(e.into()),
        }
    }
}

/// Keep answering retransmitted FINs until `duration` passes.
async fn linger(sim: &mut Simulator, server: SocketAddr, session: &mut ReceiverSession, duration: Duration) {
    if duration.is_zero() {
        return;
    }
    let timer = RoundTimer::new(duration);
    while let Ok(received) = timer.wait(sim.recv()).await {
        let pkt = match received {
            Ok((pkt, addr)) if addr == server => pkt,
            Ok(_) => continue,
            Err(e) => {
                log::debug!("[receiver] error while lingering: {e}");
                continue;
            }
        };
        if let Step::Finish(fin_ack) = session.on_packet(&pkt) {
            log::debug!("[receiver] ← FIN seq={} again; → FIN-ACK", pkt.seq);
            if let Err(e) = sim.send(&fin_ack, server).await {
                log::debug!("[receiver] cannot resend FIN-ACK: {e}");
            }
        }
    }
}

async fn resolve(host: &str, port: u16) -> Result<SocketAddr, FetchError> {
    let resolve_error = |source: std::io::Error| FetchError::Resolve {
        host: host.to_string(),
        port,
        source,
    };
    let addrs = tokio::net::lookup_host((host, port))
        .await
        .map_err(&resolve_error)?;
    prefer_ipv4(addrs).ok_or_else(|| {
        resolve_error(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "no addresses found",
        ))
    })
}

/// First IPv4 address if there is one, else the first address at all.
///
/// Senders bind `0.0.0.0`, so `localhost` must not resolve to `::1`.
fn prefer_ipv4(addrs: impl IntoIterator<Item = SocketAddr>) -> Option<SocketAddr> {
    let mut fallback = None;
    for addr in addrs {
        if addr.is_ipv4() {
            return Some(addr);
        }
        fallback.get_or_insert(addr);
    }
    fallback
}

fn output_error(config: &ReceiverConfig, source: std::io::Error) -> FetchError {
    FetchError::Output {
        path: config.output.clone(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::pin::Pin;
    use std::task::{Context, Poll};

    use super::*;
    use crate::config::ImpairmentConfig;

    /// A destination whose every write fails.
    struct FullDisk;

    impl AsyncWrite for FullDisk {
        fn poll_write(self: Pin<&mut Self>, _: &mut Context<'_>, _: &[u8]) -> Poll<io::Result<usize>> {
            Poll::Ready(Err(io::Error::other("no space left")))
        }

        fn poll_flush(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    #[test]
    fn resolution_prefers_ipv4() {
        let v6: SocketAddr = "[::1]:9000".parse().unwrap();
        let v4: SocketAddr = "127.0.0.1:9000".parse().unwrap();
        assert_eq!(prefer_ipv4([v6, v4]), Some(v4));
        assert_eq!(prefer_ipv4([v6]), Some(v6));
        assert_eq!(prefer_ipv4(Vec::<SocketAddr>::new()), None);
    }

    #[tokio::test]
    async fn failed_write_stops_the_session_without_acking() {
        let loopback: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let sender = Socket::bind(loopback).await.unwrap();
        let mut sim = Simulator::new(
            Socket::bind(loopback).await.unwrap(),
            Impairment::new(&ImpairmentConfig::default()),
        );
        let config = ReceiverConfig::new("127.0.0.1", 0, "f.bin", ImpairmentConfig::default());
        let mut session = ReceiverSession::new();

        sender
            .send_to(&Packet::data(0, b"chunk"), sim.local_addr())
            .await
            .unwrap();
        let err = receive(&mut sim, sender.local_addr(), &config, &mut session, &mut FullDisk)
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::Output { .. }), "got {err}");
        let ack = tokio::time::timeout(Duration::from_millis(150), sender.recv_from()).await;
        assert!(ack.is_err(), "unwritten data must not be acknowledged");
    }
}
