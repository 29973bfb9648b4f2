//! Channel impairment simulator.
//!
//! Loopback and LAN links rarely lose packets, so to exercise the recovery
//! paths every outbound packet can be passed through an [`Impairment`] first:
//!
//! | Fault       | Effect                                                  |
//! |-------------|---------------------------------------------------------|
//! | Loss        | The send is suppressed; the caller still sees success.  |
//! | Corruption  | The packet goes out with its `corrupt` flag set.        |
//!
//! Loss is checked before corruption and at most one fault applies per send.
//! Corruption never touches payload bytes: peers detect it from the flag
//! alone, which keeps protocol recovery separate from payload integrity.
//!
//! [`Simulator`] glues an [`Impairment`] to a [`Socket`].  Both roles use it
//! for all traffic; control signals that sit outside the recovery loop (the
//! file request and the not-found FIN) go through [`Simulator::send_unimpaired`].

use std::net::SocketAddr;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::{ImpairmentConfig, Probability};
use crate::packet::Packet;
use crate::socket::{Socket, SocketError};

/// What the impairment model decided for one send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Deliver,
    Corrupt,
    Drop,
}

/// Probabilistic fault model with its own RNG.
#[derive(Debug)]
pub struct Impairment {
    loss: Probability,
    corrupt: Probability,
    rng: StdRng,
}

impl Impairment {
    pub fn new(config: &ImpairmentConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            loss: config.loss,
            corrupt: config.corrupt,
            rng,
        }
    }

    /// Decide the fate of `packet`, setting its corrupt flag when required.
    pub fn apply(&mut self, packet: &mut Packet) -> Verdict {
        if self.rng.random_bool(self.loss.get()) {
            return Verdict::Drop;
        }
        if self.rng.random_bool(self.corrupt.get()) {
            packet.corrupt = true;
            return Verdict::Corrupt;
        }
        Verdict::Deliver
    }
}

/// A [`Socket`] whose outbound traffic passes through an [`Impairment`].
#[derive(Debug)]
pub struct Simulator {
    socket: Socket,
    impairment: Impairment,
}

impl Simulator {
    pub fn new(socket: Socket, impairment: Impairment) -> Self {
        Self { socket, impairment }
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.socket.local_addr()
    }

    /// Send through the fault model.
    ///
    /// A dropped packet is reported as `Ok(Verdict::Drop)`: from the caller's
    /// point of view the send succeeded, exactly as on a real lossy link.
    pub async fn send(&mut self, packet: &Packet, dest: SocketAddr) -> Result<Verdict, SocketError> {
        let mut packet = packet.clone();
        let verdict = self.impairment.apply(&mut packet);
        match verdict {
            Verdict::Drop => {
                log::debug!("[sim] dropped {} seq={} ack={}", packet.kind, packet.seq, packet.ack);
            }
            Verdict::Corrupt => {
                log::debug!("[sim] corrupted {} seq={} ack={}", packet.kind, packet.seq, packet.ack);
                self.socket.send_to(&packet, dest).await?;
            }
            Verdict::Deliver => self.socket.send_to(&packet, dest).await?,
        }
        Ok(verdict)
    }

    /// Send bypassing the fault model.
    pub async fn send_unimpaired(&self, packet: &Packet, dest: SocketAddr) -> Result<(), SocketError> {
        self.socket.send_to(packet, dest).await
    }

    /// Receive the next packet.  Inbound traffic is never impaired here; the
    /// peer's simulator already applied its faults.
    pub async fn recv(&self) -> Result<(Packet, SocketAddr), SocketError> {
        self.socket.recv_from().await
    }
}
