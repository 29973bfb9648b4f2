//! Wire-format definitions for transfer packets.
//!
//! Every datagram exchanged between the two roles is a [`Packet`].  This
//! module is responsible for:
//! - Defining the on-wire binary layout (header fields, payload).
//! - Serialising a [`Packet`] into a fixed-size byte buffer.
//! - Deserialising a raw byte slice back into a [`Packet`].
//!
//! No I/O happens here and no protocol validation either: whether a packet
//! makes sense in the current session is decided by [`crate::sender`] and
//! [`crate::receiver`].
//!
//! # Wire format
//!
//! All multi-byte integers are **big-endian**.  Every packet occupies exactly
//! [`PACKET_LEN`] bytes on the wire regardless of how much payload it carries;
//! unused payload bytes are zero.
//!
//! ```text
//!  0               1               2               3
//!  0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |             Kind              |        Sequence Number ...    |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |   ... Sequence Number         |   Acknowledgment Number ...   |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |   ... Acknowledgment Number   |     Payload Length ...        |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |   ... Payload Length          |         Corrupt Flag          |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                 Payload (MAX_PAYLOAD bytes) ...               |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! kind(2) + seq(4) + ack(4) + payload_len(4) + corrupt(2) = [`HEADER_LEN`]
//! = 16 bytes, followed by [`MAX_PAYLOAD`] = 1024 payload bytes.

use thiserror::Error;

/// Byte length of the fixed-size header on the wire.
pub const HEADER_LEN: usize = 16;

/// Payload capacity of a single packet; also the default chunk size.
pub const MAX_PAYLOAD: usize = 1024;

/// Total size of every packet on the wire.
pub const PACKET_LEN: usize = HEADER_LEN + MAX_PAYLOAD;

/// `ack` value of a FIN telling the receiver the requested file does not exist.
pub const FIN_NOT_FOUND: u32 = 0;

/// `ack` value of a FIN marking the end of the file data.
pub const FIN_END_OF_DATA: u32 = 1;

// Byte offsets of each field within the serialised header.
const OFF_KIND: usize = 0;
const OFF_SEQ: usize = 2;
const OFF_ACK: usize = 6;
const OFF_PAYLOAD_LEN: usize = 10;
const OFF_CORRUPT: usize = 14;

/// Packet type carried in the `kind` header field.
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    /// Receiver asks for a file; payload is the file name.
    Request = 1,
    /// One chunk of file data.
    Data = 2,
    /// Cumulative acknowledgment of the sequence in `ack`.
    Ack = 3,
    /// End of transfer, not-found signal, or the receiver's FIN-ACK.
    Fin = 4,
}

impl TryFrom<u16> for Kind {
    type Error = PacketError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Kind::Request),
            2 => Ok(Kind::Data),
            3 => Ok(Kind::Ack),
            4 => Ok(Kind::Fin),
            other => Err(PacketError::UnknownKind(other)),
        }
    }
}

impl std::fmt::Display for Kind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Kind::Request => "REQUEST",
            Kind::Data => "DATA",
            Kind::Ack => "ACK",
            Kind::Fin => "FIN",
        };
        f.write_str(name)
    }
}

/// A complete protocol datagram.
///
/// The payload length on the wire is taken from `payload.len()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub kind: Kind,
    /// Chunk index for DATA, final sequence for FIN; unused otherwise.
    pub seq: u32,
    /// Acknowledged sequence for ACK and FIN-ACK.
    pub ack: u32,
    /// Simulated bit error.  Payload bytes are never touched by the simulator.
    pub corrupt: bool,
    pub payload: Vec<u8>,
}

impl Packet {
    fn new(kind: Kind, seq: u32, ack: u32, payload: Vec<u8>) -> Self {
        Self {
            kind,
            seq,
            ack,
            corrupt: false,
            payload,
        }
    }

    /// File request carrying `file_name` as payload.
    pub fn request(file_name: &str) -> Self {
        Self::new(Kind::Request, 0, 0, file_name.as_bytes().to_vec())
    }

    /// Data chunk number `seq`.
    pub fn data(seq: u32, chunk: &[u8]) -> Self {
        Self::new(Kind::Data, seq, 0, chunk.to_vec())
    }

    /// Cumulative acknowledgment of chunk `seq`.
    pub fn ack(seq: u32) -> Self {
        Self::new(Kind::Ack, 0, seq, Vec::new())
    }

    /// End-of-data FIN sent once every chunk is acknowledged.
    ///
    /// `final_seq` is the number of chunks in the file, i.e. the sequence the
    /// receiver expects next.
    pub fn fin(final_seq: u32) -> Self {
        Self::new(Kind::Fin, final_seq, FIN_END_OF_DATA, Vec::new())
    }

    /// The receiver's answer to a FIN with sequence `fin_seq`.
    pub fn fin_ack(fin_seq: u32) -> Self {
        Self::new(Kind::Fin, 0, fin_seq, Vec::new())
    }

    /// FIN with sequence 0: the requested file does not exist.
    pub fn not_found() -> Self {
        Self::new(Kind::Fin, 0, FIN_NOT_FOUND, Vec::new())
    }

    /// `true` for the sender's not-found signal.
    pub fn is_not_found(&self) -> bool {
        self.kind == Kind::Fin && self.seq == 0 && self.ack == FIN_NOT_FOUND
    }

    /// Interpret the payload of a REQUEST as a UTF-8 file name.
    pub fn file_name(&self) -> Option<&str> {
        std::str::from_utf8(&self.payload).ok()
    }

    /// Serialise this packet into a [`PACKET_LEN`]-byte vector.
    pub fn encode(&self) -> Result<Vec<u8>, PacketError> {
        let payload_len = self.payload.len();
        if payload_len > MAX_PAYLOAD {
            return Err(PacketError::PayloadTooLarge(payload_len));
        }

        let mut buf = vec![0u8; PACKET_LEN];
        buf[OFF_KIND..OFF_KIND + 2].copy_from_slice(&(self.kind as u16).to_be_bytes());
        buf[OFF_SEQ..OFF_SEQ + 4].copy_from_slice(&self.seq.to_be_bytes());
        buf[OFF_ACK..OFF_ACK + 4].copy_from_slice(&self.ack.to_be_bytes());
        buf[OFF_PAYLOAD_LEN..OFF_PAYLOAD_LEN + 4]
            .copy_from_slice(&(payload_len as u32).to_be_bytes());
        buf[OFF_CORRUPT..OFF_CORRUPT + 2].copy_from_slice(&u16::from(self.corrupt).to_be_bytes());
        buf[HEADER_LEN..HEADER_LEN + payload_len].copy_from_slice(&self.payload);

        Ok(buf)
    }

    /// Parse a [`Packet`] from a raw byte slice.
    ///
    /// Returns [`Err`] if:
    /// - `buf` is shorter than [`PACKET_LEN`],
    /// - the kind field is not a known [`Kind`], or
    /// - the payload length exceeds [`MAX_PAYLOAD`].
    ///
    /// Bytes beyond [`PACKET_LEN`] are ignored.
    pub fn decode(buf: &[u8]) -> Result<Self, PacketError> {
        if buf.len() < PACKET_LEN {
            return Err(PacketError::BufferTooShort(buf.len()));
        }

        let kind = Kind::try_from(u16::from_be_bytes([buf[OFF_KIND], buf[OFF_KIND + 1]]))?;
        let seq = read_u32(buf, OFF_SEQ);
        let ack = read_u32(buf, OFF_ACK);
        let payload_len = read_u32(buf, OFF_PAYLOAD_LEN) as usize;
        let corrupt = u16::from_be_bytes([buf[OFF_CORRUPT], buf[OFF_CORRUPT + 1]]) != 0;

        if payload_len > MAX_PAYLOAD {
            return Err(PacketError::PayloadTooLarge(payload_len));
        }

        Ok(Packet {
            kind,
            seq,
            ack,
            corrupt,
            payload: buf[HEADER_LEN..HEADER_LEN + payload_len].to_vec(),
        })
    }
}

fn read_u32(buf: &[u8], off: usize) -> u32 {
    u32::from_be_bytes([buf[off], buf[off + 1], buf[off + 2], buf[off + 3]])
}

/// Errors that can arise when encoding or parsing a datagram.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PacketError {
    #[error("datagram of {0} bytes is shorter than a full packet")]
    BufferTooShort(usize),
    #[error("unknown packet kind {0}")]
    UnknownKind(u16),
    #[error("payload of {0} bytes exceeds packet capacity")]
    PayloadTooLarge(usize),
}
