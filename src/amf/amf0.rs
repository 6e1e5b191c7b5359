//! AMF0 encoder and decoder
//!
//! Reference: AMF0 File Format Specification.
//!
//! ```text
//! 0x00 - Number (IEEE 754 double)
//! 0x01 - Boolean
//! 0x02 - String (UTF-8, 16-bit length prefix)
//! 0x03 - Object (key-value pairs until 0x000009)
//! 0x05 - Null
//! 0x06 - Undefined
//! 0x08 - ECMA Array (associative array)
//! 0x09 - Object End (0x000009 sequence)
//! 0x0A - Strict Array (dense array)
//! 0x0B - Date (double + timezone)
//! 0x0C - Long String (UTF-8, 32-bit length prefix)
//! ```
//!
//! Decoding is lenient about a missing object-end marker at the end of the
//! buffer; some encoders truncate the final 0x000009.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::value::Amf0Value;
use crate::error::AmfError;

const MARKER_NUMBER: u8 = 0x00;
const MARKER_BOOLEAN: u8 = 0x01;
const MARKER_STRING: u8 = 0x02;
const MARKER_OBJECT: u8 = 0x03;
const MARKER_NULL: u8 = 0x05;
const MARKER_UNDEFINED: u8 = 0x06;
const MARKER_ECMA_ARRAY: u8 = 0x08;
const MARKER_OBJECT_END: u8 = 0x09;
const MARKER_STRICT_ARRAY: u8 = 0x0A;
const MARKER_DATE: u8 = 0x0B;
const MARKER_LONG_STRING: u8 = 0x0C;

/// Maximum nesting depth for objects/arrays (prevent stack overflow)
const MAX_NESTING_DEPTH: usize = 64;

/// Decode a single AMF0 value from the buffer
pub fn decode(buf: &mut Bytes) -> Result<Amf0Value, AmfError> {
    decode_at(buf, 0)
}

/// Decode values until the buffer is exhausted
pub fn decode_all(buf: &mut Bytes) -> Result<Vec<Amf0Value>, AmfError> {
    let mut values = Vec::new();
    while buf.has_remaining() {
        values.push(decode(buf)?);
    }
    Ok(values)
}

fn decode_at(buf: &mut Bytes, depth: usize) -> Result<Amf0Value, AmfError> {
    if depth > MAX_NESTING_DEPTH {
        return Err(AmfError::NestingTooDeep);
    }
    if buf.is_empty() {
        return Err(AmfError::UnexpectedEof);
    }

    let marker = buf.get_u8();
    match marker {
        MARKER_NUMBER => {
            if buf.remaining() < 8 {
                return Err(AmfError::UnexpectedEof);
            }
            Ok(Amf0Value::Number(buf.get_f64()))
        }
        MARKER_BOOLEAN => {
            if buf.is_empty() {
                return Err(AmfError::UnexpectedEof);
            }
            Ok(Amf0Value::Boolean(buf.get_u8() != 0))
        }
        MARKER_STRING => Ok(Amf0Value::String(read_utf8(buf)?)),
        MARKER_LONG_STRING => Ok(Amf0Value::String(read_utf8_long(buf)?)),
        MARKER_OBJECT => Ok(Amf0Value::Object(read_pairs(buf, depth)?)),
        MARKER_NULL => Ok(Amf0Value::Null),
        MARKER_UNDEFINED => Ok(Amf0Value::Undefined),
        MARKER_ECMA_ARRAY => {
            if buf.remaining() < 4 {
                return Err(AmfError::UnexpectedEof);
            }
            // The count is a hint only; trust the end marker instead.
            let _count = buf.get_u32();
            Ok(Amf0Value::EcmaArray(read_pairs(buf, depth)?))
        }
        MARKER_STRICT_ARRAY => {
            if buf.remaining() < 4 {
                return Err(AmfError::UnexpectedEof);
            }
            let count = buf.get_u32() as usize;
            let mut elements = Vec::with_capacity(count.min(1024));
            for _ in 0..count {
                elements.push(decode_at(buf, depth + 1)?);
            }
            Ok(Amf0Value::StrictArray(elements))
        }
        MARKER_DATE => {
            if buf.remaining() < 10 {
                return Err(AmfError::UnexpectedEof);
            }
            let millis = buf.get_f64();
            let _timezone = buf.get_i16();
            Ok(Amf0Value::Date(millis))
        }
        _ => Err(AmfError::UnknownMarker(marker)),
    }
}

/// Read object/ECMA-array properties up to the end marker
fn read_pairs(buf: &mut Bytes, depth: usize) -> Result<Vec<(String, Amf0Value)>, AmfError> {
    let mut pairs = Vec::new();

    loop {
        // Truncated end marker, accept what we have
        let key = match read_utf8(buf) {
            Ok(key) => key,
            Err(AmfError::UnexpectedEof) if buf.is_empty() => break,
            Err(e) => return Err(e),
        };

        if key.is_empty() {
            if buf.is_empty() {
                break;
            }
            let end = buf.get_u8();
            if end == MARKER_OBJECT_END {
                break;
            }
            return Err(AmfError::InvalidObjectEnd);
        }

        let value = decode_at(buf, depth + 1)?;
        pairs.push((key, value));
    }

    Ok(pairs)
}

/// Read a UTF-8 string with 16-bit length prefix
fn read_utf8(buf: &mut Bytes) -> Result<String, AmfError> {
    if buf.remaining() < 2 {
        return Err(AmfError::UnexpectedEof);
    }
    let len = buf.get_u16() as usize;
    if buf.remaining() < len {
        return Err(AmfError::UnexpectedEof);
    }
    let bytes = buf.copy_to_bytes(len);
    String::from_utf8(bytes.to_vec()).map_err(|_| AmfError::InvalidUtf8)
}

/// Read a UTF-8 string with 32-bit length prefix
fn read_utf8_long(buf: &mut Bytes) -> Result<String, AmfError> {
    if buf.remaining() < 4 {
        return Err(AmfError::UnexpectedEof);
    }
    let len = buf.get_u32() as usize;
    if buf.remaining() < len {
        return Err(AmfError::UnexpectedEof);
    }
    let bytes = buf.copy_to_bytes(len);
    String::from_utf8(bytes.to_vec()).map_err(|_| AmfError::InvalidUtf8)
}

/// Encode a single AMF0 value into the buffer
pub fn encode(buf: &mut BytesMut, value: &Amf0Value) {
    match value {
        Amf0Value::Null => buf.put_u8(MARKER_NULL),
        Amf0Value::Undefined => buf.put_u8(MARKER_UNDEFINED),
        Amf0Value::Boolean(b) => {
            buf.put_u8(MARKER_BOOLEAN);
            buf.put_u8(u8::from(*b));
        }
        Amf0Value::Number(n) => {
            buf.put_u8(MARKER_NUMBER);
            buf.put_f64(*n);
        }
        Amf0Value::String(s) => {
            if s.len() > u16::MAX as usize {
                buf.put_u8(MARKER_LONG_STRING);
                buf.put_u32(s.len() as u32);
                buf.put_slice(s.as_bytes());
            } else {
                buf.put_u8(MARKER_STRING);
                write_utf8(buf, s);
            }
        }
        Amf0Value::Object(pairs) => {
            buf.put_u8(MARKER_OBJECT);
            write_pairs(buf, pairs);
        }
        Amf0Value::EcmaArray(pairs) => {
            buf.put_u8(MARKER_ECMA_ARRAY);
            buf.put_u32(pairs.len() as u32);
            write_pairs(buf, pairs);
        }
        Amf0Value::StrictArray(elements) => {
            buf.put_u8(MARKER_STRICT_ARRAY);
            buf.put_u32(elements.len() as u32);
            for element in elements {
                encode(buf, element);
            }
        }
        Amf0Value::Date(millis) => {
            buf.put_u8(MARKER_DATE);
            buf.put_f64(*millis);
            buf.put_i16(0);
        }
    }
}

/// Encode a sequence of values
pub fn encode_all(buf: &mut BytesMut, values: &[Amf0Value]) {
    for value in values {
        encode(buf, value);
    }
}

fn write_pairs(buf: &mut BytesMut, pairs: &[(String, Amf0Value)]) {
    for (key, value) in pairs {
        write_utf8(buf, key);
        encode(buf, value);
    }
    buf.put_u16(0);
    buf.put_u8(MARKER_OBJECT_END);
}

fn write_utf8(buf: &mut BytesMut, s: &str) {
    buf.put_u16(s.len() as u16);
    buf.put_slice(s.as_bytes());
}
