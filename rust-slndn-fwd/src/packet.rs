//! Link-level packet framing.
//!
//! A face carries exactly three packet kinds; the outer TLV type byte tells
//! them apart on the wire.

use bytes::Bytes;
use rust_slndn_common::ndn::{Data, Interest, Nack, Name};
use rust_slndn_common::{tlv, Error};

/// A packet traveling through a face.
#[derive(Debug, Clone)]
pub enum Packet {
    Interest(Interest),
    Data(Data),
    Nack(Nack),
}

impl Packet {
    /// The name this packet is about (the nacked Interest's name for Nacks).
    pub fn name(&self) -> &Name {
        match self {
            Packet::Interest(i) => &i.name,
            Packet::Data(d) => &d.name,
            Packet::Nack(n) => &n.interest.name,
        }
    }

    pub fn to_wire(&self) -> Bytes {
        match self {
            Packet::Interest(i) => i.to_wire(),
            Packet::Data(d) => d.to_wire(),
            Packet::Nack(n) => n.to_wire(),
        }
    }

    pub fn from_wire(wire: &[u8]) -> Result<Self, Error> {
        match wire.first() {
            Some(&tlv::TLV_INTEREST) => Ok(Packet::Interest(Interest::from_wire(wire)?)),
            Some(&tlv::TLV_DATA) => Ok(Packet::Data(Data::from_wire(wire)?)),
            Some(&tlv::TLV_NACK) => Ok(Packet::Nack(Nack::from_wire(wire)?)),
            Some(&t) => Err(Error::Packet(format!("unknown outer TLV type {t}"))),
            None => Err(Error::Packet("empty packet".into())),
        }
    }
}
