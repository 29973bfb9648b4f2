//! Session finite-state machine (FSM) types.
//!
//! One enum per role.  Transitions are driven by [`crate::receiver`] and
//! [`crate::sender`]; this module only names the states so drivers, logs and
//! tests can refer to them.

/// States of a [`crate::receiver::ReceiverSession`].
///
/// ```text
///  AWAITING_GRANT ──DATA(0)──▶ RECEIVING ──FIN(expected)──▶ CLOSED
///        │   │                                                 ▲
///        │   └──────────FIN(0, end of data: empty file)────────┘
///        │
///        └──FIN(0, not found)──▶ ABORTED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReceiverState {
    /// Request sent; no data or FIN accepted yet.
    #[default]
    AwaitingGrant,
    /// At least one chunk accepted; waiting for more data or the FIN.
    Receiving,
    /// FIN accepted and acknowledged.  Terminal.
    Closed,
    /// The sender reported that the file does not exist.  Terminal.
    Aborted,
}

impl ReceiverState {
    /// `true` once the session can no longer accept data.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Closed | Self::Aborted)
    }
}

/// States of a sender transfer.
///
/// ```text
///  AWAITING_REQUEST ──REQUEST──▶ SENDING ──all chunks acked──▶ AWAITING_FIN_ACK
///         ▲                                                           │
///         └─────────────────────FIN-ACK (or retries spent)────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SenderState {
    #[default]
    AwaitingRequest,
    Sending,
    AwaitingFinAck,
}

impl std::fmt::Display for ReceiverState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

impl std::fmt::Display for SenderState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}
