//! SFTP version 3 wire protocol.
//!
//! Length-prefixed framing and marshalling for the v3 packet set
//! (draft-ietf-secsh-filexfer-02). The codec is symmetric: it can decode
//! and encode every supported packet kind, although a server only ever
//! decodes request tags and encodes response tags.

mod attrs;
mod consts;
mod packet;
mod wire;

pub use attrs::FileAttrs;
pub use consts::*;
pub use packet::{read_packet, write_packet, NameEntry, Packet, StatusError};

/// Largest accepted frame body, in bytes.
pub const MAX_PACKET_SIZE: u32 = 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// A length-prefixed field ran past the end of the packet body.
    #[error("short packet")]
    ShortPacket,
    #[error("packet too small ({0} bytes)")]
    PacketTooSmall(u32),
    #[error("packet too large ({0} bytes)")]
    PacketTooLarge(u32),
    #[error("unknown packet type {0}")]
    UnknownPacketType(u8),
    #[error("invalid utf-8 in string field")]
    InvalidString,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
