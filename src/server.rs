//! Sender role: serve file requests one transfer at a time.
//!
//! ```text
//!  recv REQUEST ──▶ load file ──▶ ┌─ send round (≤ window DATA) ◀──┐
//!       │               │         │                                │
//!       │          not found      └─▶ wait for ACKs ── timeout ────┘
//!       ▼               ▼                   │
//!  (ignored if     FIN(seq 0)          all acked
//!   not REQUEST)                            ▼
//!                               FIN ──▶ wait FIN-ACK (resend on timeout)
//! ```
//!
//! The protocol decisions are made by [`SenderSession`]; this module owns the
//! socket, the file system and the clock.  A failed transfer never takes the
//! serve loop down: [`Server::run`] logs the error and waits for the next
//! request.

use std::net::SocketAddr;
use std::path::{Component, Path, PathBuf};

use thiserror::Error;

use crate::config::{ConfigError, SenderConfig};
use crate::packet::{Kind, Packet};
use crate::sender::{AckOutcome, SenderSession, SenderStats};
use crate::simulator::{Impairment, Simulator};
use crate::socket::{Socket, SocketError};
use crate::state::SenderState;
use crate::timer::RoundTimer;

/// Errors that end a transfer (or, from [`Server::bind`], the whole server).
#[derive(Debug, Error)]
pub enum ServeError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Socket(#[from] SocketError),
    #[error("no progress after {rounds} consecutive timed-out rounds")]
    Stalled { rounds: u32 },
}

/// Result of handling one request.
#[derive(Debug)]
pub enum ServeOutcome {
    /// Every chunk was acknowledged.  `fin_acked` is `false` when the FIN
    /// retries ran out before a FIN-ACK arrived.
    Completed {
        peer: SocketAddr,
        file_name: String,
        bytes: usize,
        fin_acked: bool,
        stats: SenderStats,
    },
    /// The file could not be read; the not-found FIN was sent.
    NotFound { peer: SocketAddr, file_name: String },
}

/// A bound sender serving transfers sequentially.
pub struct Server {
    config: SenderConfig,
    sim: Simulator,
    state: SenderState,
}

impl Server {
    /// Validate `config` and bind the listening socket.
    pub async fn bind(config: SenderConfig) -> Result<Self, ServeError> {
        config.validate()?;
        let socket = Socket::bind(config.bind).await?;
        let sim = Simulator::new(socket, Impairment::new(&config.impairment));
        log::info!(
            "[sender] listening on {} (window={}, loss={}, corrupt={})",
            sim.local_addr(),
            config.window,
            config.impairment.loss,
            config.impairment.corrupt
        );
        Ok(Self {
            config,
            sim,
            state: SenderState::AwaitingRequest,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.sim.local_addr()
    }

    fn set_state(&mut self, next: SenderState) {
        if self.state != next {
            log::debug!("[sender] {} → {next}", self.state);
            self.state = next;
        }
    }

    /// Serve transfers until the task is cancelled.
    pub async fn run(&mut self) {
        loop {
            match self.serve_one().await {
                Ok(ServeOutcome::Completed {
                    peer,
                    file_name,
                    bytes,
                    stats,
                    ..
                }) => log::info!(
                    "[sender] sent {file_name:?} ({bytes} bytes) to {peer}: {} rounds, {} retransmitted",
                    stats.rounds,
                    stats.retransmitted
                ),
                Ok(ServeOutcome::NotFound { peer, file_name }) => {
                    log::info!("[sender] {peer} asked for missing file {file_name:?}")
                }
                Err(e) => log::error!("[sender] transfer aborted: {e}"),
            }
        }
    }

    /// Wait for the next REQUEST and serve it to completion.
    pub async fn serve_one(&mut self) -> Result<ServeOutcome, ServeError> {
        self.set_state(SenderState::AwaitingRequest);
        let (peer, file_name) = self.next_request().await;
        log::info!("[sender] ← REQUEST {file_name:?} from {peer}");

        let contents = match self.load(&file_name).await {
            Some(contents) => contents,
            None => {
                self.sim.send_unimpaired(&Packet::not_found(), peer).await?;
                log::debug!("[sender] → FIN seq=0 (not found)");
                return Ok(ServeOutcome::NotFound { peer, file_name });
            }
        };

        let bytes = contents.len();
        let session = SenderSession::new(contents, self.config.chunk_size, self.config.window);
        let result = self.transfer(session, peer).await;
        self.set_state(SenderState::AwaitingRequest);
        let (fin_acked, stats) = result?;

        Ok(ServeOutcome::Completed {
            peer,
            file_name,
            bytes,
            fin_acked,
            stats,
        })
    }

    /// Block until a well-formed, uncorrupted REQUEST arrives.
    async fn next_request(&mut self) -> (SocketAddr, String) {
        loop {
            let (pkt, peer) = match self.sim.recv().await {
                Ok(v) => v,
                Err(e) => {
                    log::warn!("[sender] error receiving file request: {e}");
                    continue;
                }
            };
            if pkt.corrupt {
                log::debug!("[sender] ← corrupt {} from {peer}; ignored", pkt.kind);
                continue;
            }
            if pkt.kind != Kind::Request {
                log::debug!("[sender] ← non-request {} from {peer}; ignored", pkt.kind);
                continue;
            }
            match pkt.file_name() {
                Some(name) => return (peer, name.to_string()),
                None => log::warn!("[sender] request from {peer} is not valid UTF-8; ignored"),
            }
        }
    }

    /// Read the whole file, or `None` if it cannot be served.
    async fn load(&self, file_name: &str) -> Option<Vec<u8>> {
        let path = resolve(&self.config.root, file_name)?;
        match tokio::fs::read(&path).await {
            Ok(contents) => Some(contents),
            Err(e) => {
                log::debug!("[sender] cannot read {}: {e}", path.display());
                None
            }
        }
    }

    /// Run the windowed transfer and the FIN handshake for one session.
    async fn transfer(
        &mut self,
        mut session: SenderSession,
        peer: SocketAddr,
    ) -> Result<(bool, SenderStats), ServeError> {
        self.set_state(SenderState::Sending);
        log::info!(
            "[sender] sending {} bytes in {} chunk(s) to {peer}",
            session.file_len(),
            session.total_chunks()
        );

        let mut timer = RoundTimer::new(self.config.round_timeout);
        let mut stalled = 0u32;

        while !session.is_complete() {
            let base_before = session.base();
            for pkt in session.next_round() {
                self.sim.send(&pkt, peer).await?;
                log::debug!("[sender] → DATA seq={} len={}", pkt.seq, pkt.payload.len());
            }

            timer.arm();
            let finished = self.await_acks(&mut session, peer, &timer).await?;
            if !finished {
                session.on_timeout();
                log::debug!(
                    "[sender] no full ACK within {:?}; resending from seq={} (byte {}, {} in flight)",
                    timer.timeout(),
                    session.base(),
                    session.byte_offset(),
                    session.in_flight()
                );
            }

            if session.base() == base_before {
                stalled += 1;
                if let Some(limit) = self.config.max_stalled_rounds {
                    if stalled >= limit {
                        return Err(ServeError::Stalled { rounds: stalled });
                    }
                }
            } else {
                stalled = 0;
            }
        }

        self.set_state(SenderState::AwaitingFinAck);
        let fin_acked = self.close(&mut session, peer, &mut timer).await?;
        Ok((fin_acked, session.finish()))
    }

    /// Collect ACKs until the round is fully acknowledged (`true`) or the
    /// round deadline passes (`false`).
    async fn await_acks(
        &self,
        session: &mut SenderSession,
        peer: SocketAddr,
        timer: &RoundTimer,
    ) -> Result<bool, ServeError> {
        while !session.round_acked() {
            let (pkt, addr) = match timer.wait(self.sim.recv()).await {
                Err(_elapsed) => return Ok(false),
                Ok(Ok(v)) => v,
                Ok(Err(e)) if e.is_malformed() => {
                    log::warn!("[sender] malformed datagram: {e}");
                    continue;
                }
                Ok(Err(e)) => return Err(e.into()),
            };
            if addr != peer {
                log::debug!("[sender] busy; ignoring {} from {addr}", pkt.kind);
                continue;
            }

            match session.on_ack(&pkt) {
                AckOutcome::Advanced { acked, base } => {
                    log::debug!("[sender] ← ACK ack={} (slid {acked}, base={base})", pkt.ack)
                }
                AckOutcome::Corrupt => log::debug!("[sender] ← corrupt {}; ignored", pkt.kind),
                AckOutcome::WrongKind(kind) => log::debug!("[sender] ← non-ack {kind}; ignored"),
                AckOutcome::Stale { ack, base } => {
                    log::debug!("[sender] ← ACK ack={ack} below base={base}; ignored")
                }
                AckOutcome::Future { ack, round_end } => {
                    log::warn!("[sender] ← ACK ack={ack} for unsent data (round end {round_end}); ignored")
                }
            }
        }
        Ok(true)
    }

    /// Send the FIN until it is acknowledged or the retries run out.
    async fn close(
        &mut self,
        session: &mut SenderSession,
        peer: SocketAddr,
        timer: &mut RoundTimer,
    ) -> Result<bool, ServeError> {
        for attempt in 1..=self.config.fin_retries.max(1) {
            let fin = session.fin();
            self.sim.send(&fin, peer).await?;
            log::debug!("[sender] → FIN seq={} (attempt {attempt})", fin.seq);

            timer.arm();
            loop {
                let (pkt, addr) = match timer.wait(self.sim.recv()).await {
                    Err(_elapsed) => break,
                    Ok(Ok(v)) => v,
                    Ok(Err(e)) if e.is_malformed() => continue,
                    Ok(Err(e)) => return Err(e.into()),
                };
                if addr == peer && session.is_fin_ack(&pkt) {
                    log::debug!("[sender] ← FIN-ACK ack={}; closed", pkt.ack);
                    return Ok(true);
                }
                log::debug!("[sender] ← {} ack={} while closing; ignored", pkt.kind, pkt.ack);
            }
        }

        log::warn!("[sender] FIN not acknowledged by {peer}; releasing session");
        Ok(false)
    }
}

/// Map a requested name onto `root`, refusing anything that could escape it.
fn resolve(root: &Path, file_name: &str) -> Option<PathBuf> {
    let requested = Path::new(file_name);
    let mut components = requested.components().peekable();
    components.peek()?;
    if components.all(|c| matches!(c, Component::Normal(_) | Component::CurDir)) {
        Some(root.join(requested))
    } else {
        None
    }
}
