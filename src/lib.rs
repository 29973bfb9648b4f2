//! `gbn-transfer` — reliable, in-order file transfer over UDP.
//!
//! # Architecture
//!
//! ```text
//!  ┌─────────────────┐   REQUEST / ACK / FIN-ACK   ┌─────────────────┐
//!  │ client          │────────────────────────────▶│ server          │
//!  │ (ReceiverSession│                             │ (SenderSession, │
//!  │  + output file) │◀────────────────────────────│  file in memory)│
//!  └────────┬────────┘      DATA / FIN             └────────┬────────┘
//!           │                                               │
//!  ┌────────▼───────────────────────────────────────────────▼────────┐
//!  │  Simulator  (probabilistic loss / corrupt flag on every send)   │
//!  └────────┬───────────────────────────────────────────────┬────────┘
//!           │ fixed-size datagrams                          │
//!  ┌────────▼──────┐                               ┌────────▼──────┐
//!  │    Socket     │                               │    Socket     │
//!  └───────────────┘                               └───────────────┘
//! ```
//!
//! Each module has a single responsibility:
//! - [`packet`]     — fixed-size wire format (serialise / deserialise)
//! - [`simulator`]  — loss and corruption injection on outbound packets
//! - [`socket`]     — async UDP socket speaking [`packet::Packet`]
//! - [`state`]      — finite-state-machine types for both roles
//! - [`receiver`]   — in-order, exactly-once receive state machine
//! - [`sender`]     — Go-Back-N windowed send state machine
//! - [`timer`]      — fixed per-round deadlines
//! - [`config`]     — validated configuration for both roles
//! - [`client`]     — drives one fetch: request, receive, FIN handshake
//! - [`server`]     — serves requests one after another

pub mod client;
pub mod config;
pub mod packet;
pub mod receiver;
pub mod sender;
pub mod server;
pub mod simulator;
pub mod socket;
pub mod state;
pub mod timer;

pub use client::{fetch, FetchError, FetchSummary};
pub use config::{ImpairmentConfig, Probability, ReceiverConfig, SenderConfig};
pub use server::{ServeError, ServeOutcome, Server};
