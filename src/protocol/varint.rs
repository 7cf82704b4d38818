//! VarInt and framed packet primitives.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::protocol::ProtocolError;

/// Largest accepted packet body.
pub const MAX_PACKET_LEN: i32 = 1024 * 1024;

/// Append a VarInt to `buf`.
pub fn encode_varint(buf: &mut Vec<u8>, value: i32) {
    let mut value = value as u32;
    loop {
        let mut byte = (value & 0x7F) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        buf.push(byte);
        if value == 0 {
            break;
        }
    }
}

/// Append a length-prefixed UTF-8 string to `buf`.
pub fn encode_string(buf: &mut Vec<u8>, s: &str) {
    encode_varint(buf, s.len() as i32);
    buf.extend_from_slice(s.as_bytes());
}

/// Decode a VarInt from an in-memory reader (e.g. a packet body slice).
pub fn decode_varint(r: &mut impl std::io::Read) -> Result<i32, ProtocolError> {
    let mut result: u32 = 0;
    let mut shift = 0;
    loop {
        let mut byte = [0u8; 1];
        r.read_exact(&mut byte)?;
        result |= ((byte[0] & 0x7F) as u32) << shift;
        if byte[0] & 0x80 == 0 {
            break;
        }
        shift += 7;
        if shift >= 32 {
            return Err(ProtocolError::VarIntTooBig);
        }
    }
    Ok(result as i32)
}

/// Read a VarInt from the wire.
pub async fn read_varint<R>(r: &mut R) -> Result<i32, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let mut result: u32 = 0;
    let mut shift = 0;
    loop {
        let byte = r.read_u8().await?;
        result |= ((byte & 0x7F) as u32) << shift;
        if byte & 0x80 == 0 {
            break;
        }
        shift += 7;
        if shift >= 32 {
            return Err(ProtocolError::VarIntTooBig);
        }
    }
    Ok(result as i32)
}

/// Write one framed packet: VarInt length followed by the body.
pub async fn write_packet<W>(w: &mut W, body: &[u8]) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
{
    let mut frame = Vec::with_capacity(body.len() + 5);
    encode_varint(&mut frame, body.len() as i32);
    frame.extend_from_slice(body);
    w.write_all(&frame).await?;
    w.flush().await?;
    Ok(())
}

/// Read one framed packet body, enforcing the length bounds.
pub async fn read_packet<R>(r: &mut R) -> Result<Vec<u8>, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let length = read_varint(r).await?;
    if length <= 0 || length > MAX_PACKET_LEN {
        return Err(ProtocolError::InvalidPacketLength(length));
    }
    let mut body = vec![0u8; length as usize];
    r.read_exact(&mut body).await?;
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded(value: i32) -> Vec<u8> {
        let mut buf = Vec::new();
        encode_varint(&mut buf, value);
        buf
    }

    #[test]
    fn known_vectors() {
        assert_eq!(encoded(0), [0x00]);
        assert_eq!(encoded(1), [0x01]);
        assert_eq!(encoded(127), [0x7F]);
        assert_eq!(encoded(128), [0x80, 0x01]);
        assert_eq!(encoded(255), [0xFF, 0x01]);
        assert_eq!(encoded(25565), [0xDD, 0xC7, 0x01]);
        assert_eq!(encoded(2147483647), [0xFF, 0xFF, 0xFF, 0xFF, 0x07]);
    }

    #[test]
    fn decode_roundtrip() {
        for value in [0, 1, 127, 128, 767, 25565, 1024 * 1024, i32::MAX] {
            let buf = encoded(value);
            let mut slice = buf.as_slice();
            assert_eq!(decode_varint(&mut slice).unwrap(), value);
            assert!(slice.is_empty());
        }
    }

    #[test]
    fn decode_rejects_oversized_varint() {
        let mut slice: &[u8] = &[0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x01];
        assert!(matches!(
            decode_varint(&mut slice),
            Err(ProtocolError::VarIntTooBig)
        ));
    }

    #[test]
    fn decode_rejects_truncated_input() {
        let mut slice: &[u8] = &[0x80];
        assert!(matches!(decode_varint(&mut slice), Err(ProtocolError::Io(_))));
    }

    #[tokio::test]
    async fn packet_roundtrip() {
        let (mut client, mut server) = tokio::io::duplex(256);

        write_packet(&mut client, b"hello").await.unwrap();
        let body = read_packet(&mut server).await.unwrap();
        assert_eq!(body, b"hello");
    }

    #[tokio::test]
    async fn empty_packet_is_rejected() {
        let (mut client, mut server) = tokio::io::duplex(256);

        client.write_all(&[0x00]).await.unwrap();
        assert!(matches!(
            read_packet(&mut server).await,
            Err(ProtocolError::InvalidPacketLength(0))
        ));
    }

    #[tokio::test]
    async fn oversized_packet_is_rejected() {
        let (mut client, mut server) = tokio::io::duplex(256);

        let mut frame = Vec::new();
        encode_varint(&mut frame, MAX_PACKET_LEN + 1);
        client.write_all(&frame).await.unwrap();
        assert!(matches!(
            read_packet(&mut server).await,
            Err(ProtocolError::InvalidPacketLength(_))
        ));
    }
}
