//! Go-Back-N send-side state machine.
//!
//! [`SenderSession`] owns the whole file in memory and transmits it in
//! rounds of at most `window` chunks.
//!
//! # Protocol contract
//!
//! - Chunk `n` covers bytes `n * chunk_size ..` of the file and travels as
//!   DATA with `seq = n`.
//! - ACKs are **cumulative**: `ack = K` confirms every chunk up to and
//!   including `K`.  An ACK in `base ..< round_end` slides the base to
//!   `K + 1`; ACKs below the base are stale and ACKs at or beyond
//!   `round_end` cover data never sent, so neither moves the window.
//! - When a round times out the caller starts a new round from the current
//!   base: only the unacknowledged tail is resent, but all of it (go back N).
//!
//! This module only manages state; all socket I/O is the caller's
//! responsibility (see [`crate::server`]).

use crate::packet::{Kind, Packet};
use crate::state::SenderState;

/// Effect of one inbound packet on the send window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    /// The base moved forward by `acked` chunks to `base`.
    Advanced { acked: u32, base: u32 },
    Corrupt,
    WrongKind(Kind),
    /// Acknowledges a chunk that is already below the base.
    Stale { ack: u32, base: u32 },
    /// Acknowledges a chunk that was not sent in this round.
    Future { ack: u32, round_end: u32 },
}

/// Counters for one send session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SenderStats {
    pub rounds: u64,
    /// DATA packets handed to the simulator, first sends and resends.
    pub data_sent: u64,
    /// DATA packets for chunks that had already been sent before.
    pub retransmitted: u64,
    pub timeouts: u64,
    pub acks_accepted: u64,
    pub acks_discarded: u64,
    pub fins_sent: u64,
}

/// Go-Back-N send-side state for one transfer.
///
/// # Sequence layout
///
/// ```text
///    base            round_end       total_chunks
///     │                  │                │
///  ───┼──────────────────┼────────────────┼──▶ seq
///     │ <── in flight ──▶│ <── not yet ──▶│
/// ```
#[derive(Debug)]
pub struct SenderSession {
    state: SenderState,
    file: Vec<u8>,
    chunk_size: usize,
    window: u32,
    total_chunks: u32,
    /// Oldest unacknowledged chunk; also the next ACK the window waits for.
    base: u32,
    /// One past the last chunk sent in the current round.
    round_end: u32,
    /// One past the highest chunk ever sent.
    high_water: u32,
    sent_in_round: u32,
    acked_in_round: u32,
    stats: SenderStats,
}

impl SenderSession {
    /// Create a session over `file`.
    ///
    /// `chunk_size` and `window` are clamped to at least 1; the caller is
    /// expected to have validated them (see [`crate::config::SenderConfig`]).
    pub fn new(file: Vec<u8>, chunk_size: usize, window: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        let total_chunks = file.len().div_ceil(chunk_size) as u32;
        Self {
            state: SenderState::Sending,
            file,
            chunk_size,
            // A window wider than the sequence space is the whole file.
            window: u32::try_from(window.max(1)).unwrap_or(u32::MAX),
            total_chunks,
            base: 0,
            round_end: 0,
            high_water: 0,
            sent_in_round: 0,
            acked_in_round: 0,
            stats: SenderStats::default(),
        }
    }

    pub fn state(&self) -> SenderState {
        self.state
    }

    pub fn total_chunks(&self) -> u32 {
        self.total_chunks
    }

    pub fn file_len(&self) -> usize {
        self.file.len()
    }

    /// Sequence number of the oldest unacknowledged chunk.
    pub fn base(&self) -> u32 {
        self.base
    }

    /// Byte offset of the window base within the file.
    pub fn byte_offset(&self) -> usize {
        (self.base as usize * self.chunk_size).min(self.file.len())
    }

    /// Chunks sent in the current round and not yet acknowledged.
    pub fn in_flight(&self) -> u32 {
        self.round_end.saturating_sub(self.base)
    }

    pub fn stats(&self) -> &SenderStats {
        &self.stats
    }

    /// `true` once every chunk has been acknowledged.
    pub fn is_complete(&self) -> bool {
        self.base >= self.total_chunks
    }

    /// `true` once every packet sent in the current round is acknowledged.
    pub fn round_acked(&self) -> bool {
        self.acked_in_round >= self.sent_in_round
    }

    /// Start a round: build up to `window` DATA packets from the base.
    ///
    /// Every returned packet counts as sent, even if the simulator later
    /// drops it; the sender cannot tell the difference.
    pub fn next_round(&mut self) -> Vec<Packet> {
        let remaining = self.total_chunks - self.base.min(self.total_chunks);
        let count = remaining.min(self.window);

        self.round_end = self.base + count;
        self.sent_in_round = count;
        self.acked_in_round = 0;
        self.stats.rounds += 1;
        self.stats.data_sent += u64::from(count);
        self.stats.retransmitted += u64::from(self.high_water.min(self.round_end).saturating_sub(self.base));
        self.high_water = self.high_water.max(self.round_end);

        (self.base..self.round_end)
            .map(|seq| Packet::data(seq, self.chunk(seq)))
            .collect()
    }

    /// Record that the current round timed out.
    pub fn on_timeout(&mut self) {
        self.stats.timeouts += 1;
    }

    /// Process a packet received while waiting for acknowledgments.
    pub fn on_ack(&mut self, pkt: &Packet) -> AckOutcome {
        let outcome = self.classify_ack(pkt);
        match outcome {
            AckOutcome::Advanced { acked, base } => {
                self.base = base;
                self.acked_in_round += acked;
                self.stats.acks_accepted += 1;
            }
            _ => self.stats.acks_discarded += 1,
        }
        outcome
    }

    fn classify_ack(&self, pkt: &Packet) -> AckOutcome {
        if pkt.corrupt {
            return AckOutcome::Corrupt;
        }
        if pkt.kind != Kind::Ack {
            return AckOutcome::WrongKind(pkt.kind);
        }
        if pkt.ack < self.base {
            return AckOutcome::Stale {
                ack: pkt.ack,
                base: self.base,
            };
        }
        if pkt.ack >= self.round_end {
            return AckOutcome::Future {
                ack: pkt.ack,
                round_end: self.round_end,
            };
        }
        AckOutcome::Advanced {
            acked: pkt.ack - self.base + 1,
            base: pkt.ack + 1,
        }
    }

    /// Enter the FIN phase and build the end-of-data FIN.
    ///
    /// Called once per transmission, so retransmitted FINs are counted.
    pub fn fin(&mut self) -> Packet {
        debug_assert!(self.is_complete(), "FIN before all chunks were acknowledged");
        self.state = SenderState::AwaitingFinAck;
        self.stats.fins_sent += 1;
        Packet::fin(self.total_chunks)
    }

    /// `true` if `pkt` is the receiver's FIN-ACK for our FIN.
    pub fn is_fin_ack(&self, pkt: &Packet) -> bool {
        !pkt.corrupt
            && pkt.kind == Kind::Fin
            && pkt.ack == self.total_chunks
    }

    /// Release the file buffer and hand back the counters.
    pub fn finish(self) -> SenderStats {
        self.stats
    }

    fn chunk(&self, seq: u32) -> &[u8] {
        let start = seq as usize * self.chunk_size;
        let end = (start + self.chunk_size).min(self.file.len());
        &self.file[start..end]
    }
}
