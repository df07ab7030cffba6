//! Bounds-checked primitives for the SFTP wire format.
//!
//! All integers are big-endian; strings are a u32 length prefix followed by
//! raw bytes, no terminator.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::ProtocolError;

pub(crate) fn get_u8(buf: &mut Bytes) -> Result<u8, ProtocolError> {
    if buf.remaining() < 1 {
        return Err(ProtocolError::ShortPacket);
    }
    Ok(buf.get_u8())
}

pub(crate) fn get_u32(buf: &mut Bytes) -> Result<u32, ProtocolError> {
    if buf.remaining() < 4 {
        return Err(ProtocolError::ShortPacket);
    }
    Ok(buf.get_u32())
}

pub(crate) fn get_u64(buf: &mut Bytes) -> Result<u64, ProtocolError> {
    if buf.remaining() < 8 {
        return Err(ProtocolError::ShortPacket);
    }
    Ok(buf.get_u64())
}

pub(crate) fn get_bytes(buf: &mut Bytes) -> Result<Vec<u8>, ProtocolError> {
    let len = get_u32(buf)? as usize;
    if buf.remaining() < len {
        return Err(ProtocolError::ShortPacket);
    }
    Ok(buf.copy_to_bytes(len).to_vec())
}

pub(crate) fn get_string(buf: &mut Bytes) -> Result<String, ProtocolError> {
    String::from_utf8(get_bytes(buf)?).map_err(|_| ProtocolError::InvalidString)
}

pub(crate) fn put_string(buf: &mut BytesMut, s: &str) {
    buf.put_u32(s.len() as u32);
    buf.put_slice(s.as_bytes());
}

pub(crate) fn put_bytes(buf: &mut BytesMut, b: &[u8]) {
    buf.put_u32(b.len() as u32);
    buf.put_slice(b);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_round_trip() {
        let mut buf = BytesMut::new();
        put_string(&mut buf, "/tmp/a.txt");
        let mut bytes = buf.freeze();
        assert_eq!(get_string(&mut bytes).unwrap(), "/tmp/a.txt");
        assert_eq!(bytes.remaining(), 0);
    }

    #[test]
    fn truncated_string_is_short_packet() {
        let mut buf = BytesMut::new();
        buf.put_u32(10);
        buf.put_slice(b"abc");
        let mut bytes = buf.freeze();
        assert!(matches!(
            get_string(&mut bytes),
            Err(ProtocolError::ShortPacket)
        ));
    }

    #[test]
    fn missing_length_is_short_packet() {
        let mut bytes = Bytes::from_static(&[0, 0]);
        assert!(matches!(
            get_u32(&mut bytes),
            Err(ProtocolError::ShortPacket)
        ));
    }
}
