//! Receive-side transfer state machine.
//!
//! [`ReceiverSession`] accepts DATA strictly in order:
//!
//! - `seq == expected`: the chunk is delivered, `expected` advances and an
//!   ACK for `seq` is emitted.
//! - `seq < expected`: a duplicate, the sender missed our ACK.  The same ACK
//!   is emitted again but nothing is delivered, so each chunk is written
//!   exactly once.
//! - `seq > expected`: ahead of a gap.  Discarded without an ACK; the
//!   sender's Go-Back-N timeout resends the gap and everything after it.
//! - Corrupt packets are discarded silently.
//!
//! This module only manages state; all socket and file I/O is the caller's
//! responsibility (see [`crate::client`]).

use crate::packet::{Kind, Packet};
use crate::state::ReceiverState;

/// Why an inbound packet produced no reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Discard {
    Corrupt,
    /// Sequence ahead of the next expected one.
    Ahead { seq: u32, expected: u32 },
    /// A kind that makes no sense at this point (REQUEST, ACK, stray FIN).
    Unexpected { kind: Kind, seq: u32 },
    /// The session is already terminal.
    Terminal,
}

/// What the caller must do in response to one inbound packet.
#[derive(Debug, PartialEq, Eq)]
pub enum Step<'a> {
    /// Nothing to write, nothing to send.
    Discard(Discard),
    /// Append `data` to the output, then send `ack`.
    Deliver { data: &'a [u8], ack: Packet },
    /// Duplicate chunk: send `ack` again, write nothing.
    Reack(Packet),
    /// All data received: flush the output, then send the FIN-ACK.
    Finish(Packet),
    /// The sender has no such file.
    NotFound,
}

/// Counters for one receive session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReceiverStats {
    pub chunks_accepted: u64,
    pub bytes_accepted: u64,
    pub duplicates: u64,
    pub discarded: u64,
    /// ACKs produced, first-time and repeated.
    pub acks: u64,
    pub fin_acks: u64,
}

/// Receive-side state for one transfer.
#[derive(Debug, Default)]
pub struct ReceiverSession {
    state: ReceiverState,
    /// Sequence number of the next chunk to accept.
    expected: u32,
    /// Sequence of the accepted FIN, once closed.
    fin_seq: Option<u32>,
    stats: ReceiverStats,
}

impl ReceiverSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ReceiverState {
        self.state
    }

    pub fn expected(&self) -> u32 {
        self.expected
    }

    pub fn stats(&self) -> &ReceiverStats {
        &self.stats
    }

    /// Process one inbound packet.
    pub fn on_packet<'a>(&mut self, pkt: &'a Packet) -> Step<'a> {
        let step = self.classify(pkt);
        match &step {
            Step::Discard(_) => self.stats.discarded += 1,
            Step::Deliver { data, .. } => {
                self.stats.chunks_accepted += 1;
                self.stats.bytes_accepted += data.len() as u64;
                self.stats.acks += 1;
            }
            Step::Reack(_) => {
                self.stats.duplicates += 1;
                self.stats.acks += 1;
            }
            Step::Finish(_) => self.stats.fin_acks += 1,
            Step::NotFound => {}
        }
        step
    }

    fn classify<'a>(&mut self, pkt: &'a Packet) -> Step<'a> {
        if self.state.is_terminal() {
            return self.after_close(pkt);
        }
        if pkt.corrupt {
            return Step::Discard(Discard::Corrupt);
        }
        if self.state == ReceiverState::AwaitingGrant && pkt.is_not_found() {
            self.state = ReceiverState::Aborted;
            return Step::NotFound;
        }

        let expected = self.expected;
        if pkt.seq > expected {
            return Step::Discard(Discard::Ahead {
                seq: pkt.seq,
                expected,
            });
        }

        match (pkt.kind, pkt.seq == expected) {
            (Kind::Data, true) => {
                self.expected += 1;
                self.state = ReceiverState::Receiving;
                Step::Deliver {
                    data: &pkt.payload,
                    ack: Packet::ack(pkt.seq),
                }
            }
            (Kind::Data, false) => Step::Reack(Packet::ack(pkt.seq)),
            (Kind::Fin, true) => {
                self.state = ReceiverState::Closed;
                self.fin_seq = Some(pkt.seq);
                Step::Finish(Packet::fin_ack(pkt.seq))
            }
            (kind, _) => Step::Discard(Discard::Unexpected { kind, seq: pkt.seq }),
        }
    }

    /// Once closed, only a retransmitted FIN gets an answer: the sender
    /// resends it when our FIN-ACK was lost.
    fn after_close<'a>(&self, pkt: &'a Packet) -> Step<'a> {
        match self.fin_seq {
            Some(fin_seq) if !pkt.corrupt && pkt.kind == Kind::Fin && pkt.seq == fin_seq => {
                Step::Finish(Packet::fin_ack(fin_seq))
            }
            _ => Step::Discard(Discard::Terminal),
        }
    }
}
