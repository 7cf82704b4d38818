//! Minecraft status protocol support.
//!
//! Implements just enough of the Server List Ping to use it as a readiness
//! probe: a handshake, an empty status request, and validation of the framed
//! reply. The JSON payload itself is never interpreted.
//!
//! Packets are framed as `<VarInt length><body>`; bodies above 1 MiB are
//! rejected. VarInts are the protocol's 7-bits-per-byte encoding with the
//! continuation bit in the MSB, capped at 32 bits.

pub mod ping;
pub mod varint;

pub use ping::probe;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("status exchange timed out")]
    Timeout,

    #[error("varint exceeds 32 bits")]
    VarIntTooBig,

    #[error("invalid packet length: {0}")]
    InvalidPacketLength(i32),

    #[error("unexpected packet id: {0:#04x}")]
    UnexpectedPacketId(i32),

    #[error("invalid status payload length: {0}")]
    InvalidPayloadLength(i32),
}
