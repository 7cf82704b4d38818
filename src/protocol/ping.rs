//! One-shot Server List Ping used as a readiness probe.

use std::time::{Duration, Instant};
use tokio::net::TcpStream;

use crate::protocol::varint::{
    decode_varint, encode_string, encode_varint, read_packet, write_packet,
};
use crate::protocol::ProtocolError;

/// Protocol version sent in the handshake (Minecraft 1.21).
const PROTOCOL_VERSION: i32 = 767;
const NEXT_STATE_STATUS: i32 = 1;
const STATUS_RESPONSE_ID: i32 = 0x00;
const DEFAULT_PORT: u16 = 25565;

/// Probe `addr` with a status exchange, bounded by `timeout`.
///
/// The deadline covers name resolution, the TCP dial and the whole exchange.
/// Returns the elapsed time from just before the dial until the reply's
/// payload length was validated. Any io, framing or protocol mismatch is a
/// failure; the JSON payload is never parsed.
pub async fn probe(addr: &str, timeout: Duration) -> Result<Duration, ProtocolError> {
    let start = Instant::now();
    match tokio::time::timeout(timeout, status_exchange(addr)).await {
        Ok(Ok(())) => Ok(start.elapsed()),
        Ok(Err(err)) => Err(err),
        Err(_) => Err(ProtocolError::Timeout),
    }
}

async fn status_exchange(addr: &str) -> Result<(), ProtocolError> {
    let mut stream = TcpStream::connect(addr).await?;
    let (host, port) = split_host_port(addr);

    // Handshake: packet id 0x00, protocol version, host, port, next state.
    let mut handshake = Vec::new();
    encode_varint(&mut handshake, 0x00);
    encode_varint(&mut handshake, PROTOCOL_VERSION);
    encode_string(&mut handshake, host);
    handshake.extend_from_slice(&port.to_be_bytes());
    encode_varint(&mut handshake, NEXT_STATE_STATUS);
    write_packet(&mut stream, &handshake).await?;

    // Status request: packet id 0x00 with an empty payload.
    write_packet(&mut stream, &[0x00]).await?;

    let body = read_packet(&mut stream).await?;
    let mut body = body.as_slice();
    let packet_id = decode_varint(&mut body)?;
    if packet_id != STATUS_RESPONSE_ID {
        return Err(ProtocolError::UnexpectedPacketId(packet_id));
    }
    let json_len = decode_varint(&mut body)?;
    if json_len <= 0 {
        return Err(ProtocolError::InvalidPayloadLength(json_len));
    }
    Ok(())
}

fn split_host_port(addr: &str) -> (&str, u16) {
    match addr.rsplit_once(':') {
        Some((host, port)) => (host, port.parse().unwrap_or(DEFAULT_PORT)),
        None => (addr, DEFAULT_PORT),
    }
}
