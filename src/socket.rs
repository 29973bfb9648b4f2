//! UDP transport for fixed-size [`Packet`]s.
//!
//! Every datagram carries exactly one encoded packet of [`PACKET_LEN`] bytes.
//! Anything else that arrives on the port is reported as malformed so the
//! caller can log it and keep receiving.

use std::net::SocketAddr;

use thiserror::Error;
use tokio::net::UdpSocket;

use crate::packet::{Packet, PacketError, PACKET_LEN};

#[derive(Debug, Error)]
pub enum SocketError {
    #[error("udp: {0}")]
    Io(#[from] std::io::Error),
    #[error("bad packet: {0}")]
    Packet(#[from] PacketError),
    #[error("datagram longer than one packet ({0}+ bytes)")]
    Oversized(usize),
}

impl SocketError {
    /// `true` when the datagram itself was bad and the socket is still usable.
    pub fn is_malformed(&self) -> bool {
        matches!(self, Self::Packet(_) | Self::Oversized(_))
    }
}

#[derive(Debug)]
pub struct Socket {
    udp: UdpSocket,
    addr: SocketAddr,
}

impl Socket {
    /// Bind to `addr`; port 0 picks an ephemeral port, see [`Socket::local_addr`].
    pub async fn bind(addr: SocketAddr) -> Result<Self, SocketError> {
        let udp = UdpSocket::bind(addr).await?;
        let addr = udp.local_addr()?;
        Ok(Self { udp, addr })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    pub async fn send_to(&self, packet: &Packet, dest: SocketAddr) -> Result<(), SocketError> {
        let wire = packet.encode()?;
        self.udp.send_to(&wire, dest).await?;
        Ok(())
    }

    /// Wait for one datagram and decode it.
    ///
    /// The buffer is one byte larger than a packet so that an oversized
    /// datagram is detected instead of silently truncated.
    pub async fn recv_from(&self) -> Result<(Packet, SocketAddr), SocketError> {
        let mut buf = [0u8; PACKET_LEN + 1];
        let (len, from) = self.udp.recv_from(&mut buf).await?;
        if len > PACKET_LEN {
            return Err(SocketError::Oversized(len));
        }
        Ok((Packet::decode(&buf[..len])?, from))
    }
}
