use crate::errors::DeserializeError;
use bytes::{Buf, BufMut, Bytes, BytesMut};

pub fn ensure(buf: &Bytes, len: usize, what: &'static str) -> Result<(), DeserializeError> {
    if buf.remaining() < len {
        return Err(DeserializeError::UnexpectedEOF(what));
    }
    Ok(())
}

pub fn get_u8(buf: &mut Bytes, what: &'static str) -> Result<u8, DeserializeError> {
    ensure(buf, 1, what)?;
    Ok(buf.get_u8())
}

pub fn get_u16(buf: &mut Bytes, what: &'static str) -> Result<u16, DeserializeError> {
    ensure(buf, 2, what)?;
    Ok(buf.get_u16())
}

pub fn get_u32(buf: &mut Bytes, what: &'static str) -> Result<u32, DeserializeError> {
    ensure(buf, 4, what)?;
    Ok(buf.get_u32())
}

pub fn get_u64(buf: &mut Bytes, what: &'static str) -> Result<u64, DeserializeError> {
    ensure(buf, 8, what)?;
    Ok(buf.get_u64())
}

/// `[u32 len][bytes]`
pub fn get_bytes(buf: &mut Bytes, what: &'static str) -> Result<Bytes, DeserializeError> {
    let len = get_u32(buf, what)? as usize;
    ensure(buf, len, what)?;
    Ok(buf.split_to(len))
}

pub fn get_string(buf: &mut Bytes, what: &'static str) -> Result<String, DeserializeError> {
    let raw = get_bytes(buf, what)?;
    String::from_utf8(raw.to_vec()).map_err(|_| DeserializeError::InvalidUtf8(what))
}

pub fn put_bytes(buf: &mut BytesMut, bytes: &[u8]) {
    buf.put_u32(bytes.len() as u32);
    buf.extend_from_slice(bytes);
}

pub fn put_string(buf: &mut BytesMut, s: &str) {
    put_bytes(buf, s.as_bytes());
}

/// Optional strings travel as a presence byte followed by the string.
pub fn put_opt_string(buf: &mut BytesMut, s: Option<&str>) {
    match s {
        Some(s) => {
            buf.put_u8(1);
            put_string(buf, s);
        }
        None => buf.put_u8(0),
    }
}

pub fn get_opt_string(
    buf: &mut Bytes,
    what: &'static str,
) -> Result<Option<String>, DeserializeError> {
    match get_u8(buf, what)? {
        0 => Ok(None),
        1 => get_string(buf, what).map(Some),
        other => Err(DeserializeError::InvalidFormat(format!(
            "presence flag {other} for {what}"
        ))),
    }
}
