//! TLV (Type-Length-Value) encoding and decoding utilities.
//!
//! Packet layout follows the NDN packet format with single-byte TLV types,
//! plus a small crate-local range for the link-layer tags the self-learning
//! strategy relies on.

use crate::error::Error;
use bytes::{Buf, BufMut, Bytes, BytesMut};

/* ---------------------------------------------------------------- *
 * TLV type constants
 * ---------------------------------------------------------------- */

pub const TLV_INTEREST: u8            = 0x05;
pub const TLV_DATA: u8                = 0x06;
pub const TLV_NACK: u8                = 0x03;
pub const TLV_NAME: u8                = 0x07;
pub const TLV_COMPONENT: u8           = 0x08;
pub const TLV_NONCE: u8               = 0x0A;
pub const TLV_INTEREST_LIFETIME: u8   = 0x0C;
pub const TLV_MUST_BE_FRESH: u8       = 0x12;
pub const TLV_CAN_BE_PREFIX: u8       = 0x21;
pub const TLV_HOP_LIMIT: u8           = 0x22;
pub const TLV_FRESHNESS_PERIOD: u8    = 0x25;
pub const TLV_CONTENT: u8             = 0x15;
pub const TLV_NACK_REASON: u8         = 0x32;

// Link-layer tags (crate-local assignments).
pub const TLV_NON_DISCOVERY: u8       = 0x60;
pub const TLV_PREFIX_ANNOUNCEMENT: u8 = 0x61;
pub const TLV_PA_EXPIRATION: u8       = 0x6D;
pub const TLV_PA_SIGNATURE: u8        = 0x6E;

/* ---------------------------------------------------------------- *
 * Length field
 * ---------------------------------------------------------------- */

/// Encode the variable-width TLV *length* field.
///
/// * `< 253` → 1 byte
/// * `≤ 65 535` → marker 253 + 2-byte length
/// * otherwise → marker 254 + 4-byte length
pub fn encode_length(length: usize, buf: &mut BytesMut) {
    if length < 253 {
        buf.put_u8(length as u8);
    } else if length <= 65_535 {
        buf.put_u8(253);
        buf.put_u16(length as u16);
    } else {
        buf.put_u8(254);
        buf.put_u32(length as u32);
    }
}

/// Decode the TLV *length* field using NDN variable-length rules.
pub fn decode_length(buf: &mut impl Buf) -> Result<usize, Error> {
    if !buf.has_remaining() {
        return Err(Error::Tlv("buffer underflow in TLV length".into()));
    }
    match buf.get_u8() {
        n @ 0..=252 => Ok(n as usize),
        253 => {
            if buf.remaining() < 2 {
                return Err(Error::Tlv("buffer underflow in 16-bit TLV length".into()));
            }
            Ok(buf.get_u16() as usize)
        }
        254 => {
            if buf.remaining() < 4 {
                return Err(Error::Tlv("buffer underflow in 32-bit TLV length".into()));
            }
            Ok(buf.get_u32() as usize)
        }
        255 => Err(Error::Tlv("64-bit TLV lengths not supported".into())),
    }
}

/// Number of bytes the variable-width length field occupies for `length`.
pub fn length_size(length: usize) -> usize {
    if length < 253 {
        1
    } else if length <= 65_535 {
        3
    } else {
        5
    }
}

/* ---------------------------------------------------------------- *
 * Element
 * ---------------------------------------------------------------- */

/// A single TLV element: *type* plus its raw *value* bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub typ: u8,
    pub value: Bytes,
}

impl Element {
    pub fn new(typ: u8, value: impl Into<Bytes>) -> Self {
        Self { typ, value: value.into() }
    }

    /// A zero-length element, used for boolean flags and marker tags.
    pub fn empty(typ: u8) -> Self {
        Self { typ, value: Bytes::new() }
    }

    /// An element carrying an NDN NonNegativeInteger.
    pub fn number(typ: u8, n: u64) -> Self {
        let mut buf = BytesMut::new();
        if n <= u8::MAX as u64 {
            buf.put_u8(n as u8);
        } else if n <= u16::MAX as u64 {
            buf.put_u16(n as u16);
        } else if n <= u32::MAX as u64 {
            buf.put_u32(n as u32);
        } else {
            buf.put_u64(n);
        }
        Self { typ, value: buf.freeze() }
    }

    /// Interpret the value as an NDN NonNegativeInteger.
    pub fn as_number(&self) -> Result<u64, Error> {
        let v = &self.value;
        match v.len() {
            1 => Ok(v[0] as u64),
            2 => Ok(u16::from_be_bytes([v[0], v[1]]) as u64),
            4 => Ok(u32::from_be_bytes([v[0], v[1], v[2], v[3]]) as u64),
            8 => Ok(u64::from_be_bytes(v[..8].try_into().unwrap())),
            n => Err(Error::Tlv(format!("invalid NonNegativeInteger length {n}"))),
        }
    }

    /// Total number of bytes when this element is encoded.
    pub fn encoded_len(&self) -> usize {
        1 + length_size(self.value.len()) + self.value.len()
    }

    /// Append the encoded element to `buf`.
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(self.typ);
        encode_length(self.value.len(), buf);
        buf.extend_from_slice(&self.value);
    }

    /// Decode one element from the front of `buf`.
    pub fn decode(buf: &mut impl Buf) -> Result<Self, Error> {
        if !buf.has_remaining() {
            return Err(Error::Tlv("buffer too small for TLV header".into()));
        }
        let typ = buf.get_u8();
        let length = decode_length(buf)?;
        if buf.remaining() < length {
            return Err(Error::Tlv(format!(
                "TLV value requires {} bytes but only {} available",
                length,
                buf.remaining()
            )));
        }
        let value = buf.copy_to_bytes(length);
        Ok(Self { typ, value })
    }

    /// Iterate over the sub-elements nested inside this element's value.
    pub fn children(&self) -> Children {
        Children { rest: self.value.clone() }
    }
}

/// Iterator over nested TLV elements; stops at the first malformed one.
pub struct Children {
    rest: Bytes,
}

impl Iterator for Children {
    type Item = Result<Element, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if !self.rest.has_remaining() {
            return None;
        }
        Some(Element::decode(&mut self.rest))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn length_round_trip() {
        for len in [0usize, 1, 252, 253, 4000, 65_535, 65_536, 1 << 20] {
            let mut buf = BytesMut::new();
            encode_length(len, &mut buf);
            assert_eq!(buf.len(), length_size(len));
            let mut rd = buf.freeze();
            assert_eq!(decode_length(&mut rd).unwrap(), len);
        }
    }

    #[test]
    fn number_round_trip() {
        for n in [0u64, 255, 256, 65_536, u32::MAX as u64 + 1] {
            let el = Element::number(TLV_NONCE, n);
            assert_eq!(el.as_number().unwrap(), n);
        }
    }

    #[test]
    fn nested_children() {
        let mut inner = BytesMut::new();
        Element::new(TLV_COMPONENT, &b"a"[..]).encode(&mut inner);
        Element::new(TLV_COMPONENT, &b"bc"[..]).encode(&mut inner);
        let name = Element::new(TLV_NAME, inner.freeze());

        let kids: Vec<_> = name.children().collect::<Result<_, _>>().unwrap();
        assert_eq!(kids.len(), 2);
        assert_eq!(&kids[0].value[..], b"a");
        assert_eq!(&kids[1].value[..], b"bc");
    }

    #[test]
    fn truncated_value_is_rejected() {
        let mut buf = BytesMut::new();
        buf.put_u8(TLV_CONTENT);
        encode_length(10, &mut buf);
        buf.extend_from_slice(b"short");
        assert!(Element::decode(&mut buf.freeze()).is_err());
    }
}
