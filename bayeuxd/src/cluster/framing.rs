//! Length-prefixed field framing for backbone records.
//!
//! Each string is encoded as a 4-byte big-endian length prefix followed by
//! its UTF-8 bytes: `[u32 length][bytes]`. Counts are a bare big-endian `u32`.

use bytes::{Buf, BufMut};

use crate::error::CodecError;

const PREFIX_LEN: usize = 4;

/// Writes a length-prefixed string field.
pub(crate) fn put_str(buf: &mut impl BufMut, field: &'static str, value: &str) -> Result<(), CodecError> {
    let len = u32::try_from(value.len()).map_err(|_| CodecError::FieldTooLarge {
        field,
        len: value.len(),
        max: u32::MAX as usize,
    })?;
    buf.put_u32(len);
    buf.put_slice(value.as_bytes());
    Ok(())
}

/// Writes a bare `u32` count.
pub(crate) fn put_count(buf: &mut impl BufMut, field: &'static str, count: usize) -> Result<(), CodecError> {
    let count = u32::try_from(count).map_err(|_| CodecError::FieldTooLarge {
        field,
        len: count,
        max: u32::MAX as usize,
    })?;
    buf.put_u32(count);
    Ok(())
}

/// Reads a bare `u32` count.
pub(crate) fn get_count(buf: &mut impl Buf, field: &'static str) -> Result<usize, CodecError> {
    ensure(&*buf, field, PREFIX_LEN)?;
    Ok(buf.get_u32() as usize)
}

/// Reads a length-prefixed field as raw bytes.
pub(crate) fn get_bytes(buf: &mut impl Buf, field: &'static str) -> Result<Vec<u8>, CodecError> {
    let len = get_count(buf, field)?;
    ensure(&*buf, field, len)?;
    let mut bytes = vec![0u8; len];
    buf.copy_to_slice(&mut bytes);
    Ok(bytes)
}

/// Reads a length-prefixed UTF-8 string field.
pub(crate) fn get_string(buf: &mut impl Buf, field: &'static str) -> Result<String, CodecError> {
    let bytes = get_bytes(buf, field)?;
    String::from_utf8(bytes).map_err(|source| CodecError::InvalidUtf8 { field, source })
}

fn ensure(buf: &impl Buf, field: &'static str, needed: usize) -> Result<(), CodecError> {
    if buf.remaining() < needed {
        return Err(CodecError::Truncated {
            field,
            needed,
            remaining: buf.remaining(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn string_field_layout() {
        let mut buf = BytesMut::new();
        put_str(&mut buf, "id", "héllo").unwrap();
        assert_eq!(&buf[..4], &[0, 0, 0, 6]);
        assert_eq!(&buf[4..], "héllo".as_bytes());

        let mut read = buf.freeze();
        assert_eq!(get_string(&mut read, "id").unwrap(), "héllo");
        assert!(!read.has_remaining());
    }

    #[test]
    fn prefix_longer_than_payload_is_truncation() {
        let mut read: &[u8] = &[0, 0, 0, 9, b'a', b'b'];
        let err = get_string(&mut read, "channel").unwrap_err();
        assert!(matches!(
            err,
            CodecError::Truncated { field: "channel", needed: 9, remaining: 2 }
        ));
    }

    #[test]
    fn short_prefix_is_truncation() {
        let mut read: &[u8] = &[0, 1];
        assert!(matches!(
            get_count(&mut read, "count"),
            Err(CodecError::Truncated { needed: 4, .. })
        ));
    }

    #[test]
    fn invalid_utf8_is_reported() {
        let mut read: &[u8] = &[0, 0, 0, 2, 0xff, 0xfe];
        assert!(matches!(
            get_string(&mut read, "transport"),
            Err(CodecError::InvalidUtf8 { field: "transport", .. })
        ));
    }
}
