//! NDN packet types and structures.
//!
//! This module provides the names, packets, and link-layer tags used by the
//! self-learning forwarder. Tags (`NonDiscoveryTag`, `PrefixAnnouncementTag`)
//! are modeled as plain fields on `Interest` and `Data` and travel in the
//! wire encoding as crate-local TLV elements.

use crate::error::Error;
use crate::tlv::{self, Element};
use bytes::{Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use std::fmt;


/// Maximum size of an NDN packet.
pub const MAX_PACKET_SIZE: usize = 8800;

/// Default Interest lifetime when none is specified.
pub const DEFAULT_INTEREST_LIFETIME_MS: u32 = 4000;

/* ---------------------------------------------------------------- *
 * Name
 * ---------------------------------------------------------------- */

/// A single NDN name component.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NameComponent(pub Bytes);

impl NameComponent {
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &Bytes {
        &self.0
    }

    /// Parse a `v=N` version component.
    pub fn to_version(&self) -> Option<u64> {
        let s = std::str::from_utf8(&self.0).ok()?;
        s.strip_prefix("v=")?.parse().ok()
    }

    pub fn to_tlv(&self) -> Element {
        Element::new(tlv::TLV_COMPONENT, self.0.clone())
    }

    pub fn from_tlv(element: &Element) -> Result<Self, Error> {
        if element.typ != tlv::TLV_COMPONENT {
            return Err(Error::Packet(format!(
                "expected name component TLV type {}, got {}",
                tlv::TLV_COMPONENT,
                element.typ
            )));
        }
        Ok(Self(element.value.clone()))
    }
}

impl fmt::Display for NameComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let printable = self.0.iter().all(|&b| b.is_ascii_graphic() || b == b' ');
        if printable && !self.0.is_empty() {
            write!(f, "{}", String::from_utf8_lossy(&self.0))
        } else {
            write!(f, "0x")?;
            for &b in self.0.iter() {
                write!(f, "{b:02x}")?;
            }
            Ok(())
        }
    }
}

/// An NDN name: a sequence of name components.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Name {
    components: Vec<NameComponent>,
}

impl Name {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a name from its URI form, `/` separated. Empty segments are
    /// ignored, so `/` parses to the empty name.
    pub fn from_uri(s: &str) -> Self {
        let components = s
            .split('/')
            .filter(|c| !c.is_empty())
            .map(|c| NameComponent::new(c.as_bytes().to_vec()))
            .collect();
        Self { components }
    }

    pub fn push(&mut self, component: NameComponent) -> &mut Self {
        self.components.push(component);
        self
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    pub fn components(&self) -> impl Iterator<Item = &NameComponent> {
        self.components.iter()
    }

    pub fn get(&self, index: usize) -> Option<&NameComponent> {
        self.components.get(index)
    }

    /// The first `len` components as a new name.
    pub fn prefix(&self, len: usize) -> Self {
        Self {
            components: self.components.iter().take(len).cloned().collect(),
        }
    }

    pub fn is_prefix_of(&self, other: &Self) -> bool {
        self.len() <= other.len()
            && self
                .components
                .iter()
                .zip(other.components.iter())
                .all(|(a, b)| a == b)
    }

    /// Append a `v=N` version component.
    pub fn append_version(mut self, version: u64) -> Self {
        self.push(NameComponent::new(format!("v={version}").into_bytes()));
        self
    }

    /// The version carried by the last component, if it is one.
    pub fn version(&self) -> Option<u64> {
        self.components.last()?.to_version()
    }

    pub fn to_tlv(&self) -> Element {
        let mut buf = BytesMut::new();
        for component in &self.components {
            component.to_tlv().encode(&mut buf);
        }
        Element::new(tlv::TLV_NAME, buf.freeze())
    }

    pub fn from_tlv(element: &Element) -> Result<Self, Error> {
        if element.typ != tlv::TLV_NAME {
            return Err(Error::Packet(format!(
                "expected name TLV type {}, got {}",
                tlv::TLV_NAME,
                element.typ
            )));
        }
        let mut components = Vec::new();
        for child in element.children() {
            components.push(NameComponent::from_tlv(&child?)?);
        }
        Ok(Self { components })
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.components.is_empty() {
            return write!(f, "/");
        }
        for component in &self.components {
            write!(f, "/{component}")?;
        }
        Ok(())
    }
}

/* ---------------------------------------------------------------- *
 * Prefix Announcement
 * ---------------------------------------------------------------- */

/// A claim that a name prefix is reachable via the producing node.
///
/// The announcement is opaque to the forwarding plane; only the RIB inspects
/// it. The signature bytes are carried verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrefixAnnouncement {
    pub prefix: Name,
    pub expiration_ms: u64,
    pub signature: Bytes,
}

impl PrefixAnnouncement {
    pub fn new(prefix: Name, expiration_ms: u64, signature: impl Into<Bytes>) -> Self {
        Self {
            prefix,
            expiration_ms,
            signature: signature.into(),
        }
    }

    pub fn to_tlv(&self) -> Element {
        let mut buf = BytesMut::new();
        self.prefix.to_tlv().encode(&mut buf);
        Element::number(tlv::TLV_PA_EXPIRATION, self.expiration_ms).encode(&mut buf);
        Element::new(tlv::TLV_PA_SIGNATURE, self.signature.clone()).encode(&mut buf);
        Element::new(tlv::TLV_PREFIX_ANNOUNCEMENT, buf.freeze())
    }

    pub fn from_tlv(element: &Element) -> Result<Self, Error> {
        if element.typ != tlv::TLV_PREFIX_ANNOUNCEMENT {
            return Err(Error::Packet("not a prefix announcement".into()));
        }
        let mut prefix = None;
        let mut expiration_ms = None;
        let mut signature = None;
        for child in element.children() {
            let child = child?;
            match child.typ {
                tlv::TLV_NAME => prefix = Some(Name::from_tlv(&child)?),
                tlv::TLV_PA_EXPIRATION => expiration_ms = Some(child.as_number()?),
                tlv::TLV_PA_SIGNATURE => signature = Some(child.value.clone()),
                _ => {} // unknown fields are skipped
            }
        }
        Ok(Self {
            prefix: prefix.ok_or_else(|| Error::Packet("prefix announcement without name".into()))?,
            expiration_ms: expiration_ms
                .ok_or_else(|| Error::Packet("prefix announcement without expiration".into()))?,
            signature: signature
                .ok_or_else(|| Error::Packet("prefix announcement without signature".into()))?,
        })
    }
}

/* ---------------------------------------------------------------- *
 * Interest
 * ---------------------------------------------------------------- */

/// An NDN Interest packet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Interest {
    pub name: Name,
    pub nonce: u32,
    pub lifetime_ms: u32,
    pub hop_limit: Option<u8>,
    pub can_be_prefix: bool,
    pub must_be_fresh: bool,
    /// The `NonDiscoveryTag`: set when this Interest follows a known route.
    pub non_discovery: bool,
}

impl Interest {
    pub fn new(name: Name) -> Self {
        use std::time::{SystemTime, UNIX_EPOCH};
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Self {
            name,
            nonce: (now.as_nanos() % u32::MAX as u128) as u32,
            lifetime_ms: DEFAULT_INTEREST_LIFETIME_MS,
            hop_limit: Some(32),
            can_be_prefix: false,
            must_be_fresh: false,
            non_discovery: false,
        }
    }

    pub fn with_nonce(mut self, nonce: u32) -> Self {
        self.nonce = nonce;
        self
    }

    pub fn with_lifetime(mut self, lifetime_ms: u32) -> Self {
        self.lifetime_ms = lifetime_ms;
        self
    }

    pub fn with_non_discovery(mut self, non_discovery: bool) -> Self {
        self.non_discovery = non_discovery;
        self
    }

    /// Attach the `NonDiscoveryTag`.
    pub fn set_non_discovery_tag(&mut self) {
        self.non_discovery = true;
    }

    /// Remove the `NonDiscoveryTag`.
    pub fn remove_non_discovery_tag(&mut self) {
        self.non_discovery = false;
    }

    pub fn to_wire(&self) -> Bytes {
        let mut inner = BytesMut::new();
        self.name.to_tlv().encode(&mut inner);
        if self.can_be_prefix {
            Element::empty(tlv::TLV_CAN_BE_PREFIX).encode(&mut inner);
        }
        if self.must_be_fresh {
            Element::empty(tlv::TLV_MUST_BE_FRESH).encode(&mut inner);
        }
        Element::new(tlv::TLV_NONCE, Bytes::copy_from_slice(&self.nonce.to_be_bytes()))
            .encode(&mut inner);
        Element::number(tlv::TLV_INTEREST_LIFETIME, self.lifetime_ms as u64).encode(&mut inner);
        if let Some(hop_limit) = self.hop_limit {
            Element::new(tlv::TLV_HOP_LIMIT, vec![hop_limit]).encode(&mut inner);
        }
        if self.non_discovery {
            Element::empty(tlv::TLV_NON_DISCOVERY).encode(&mut inner);
        }
        let mut buf = BytesMut::new();
        Element::new(tlv::TLV_INTEREST, inner.freeze()).encode(&mut buf);
        buf.freeze()
    }

    pub fn from_wire(wire: &[u8]) -> Result<Self, Error> {
        let mut buf = Bytes::copy_from_slice(wire);
        let element = Element::decode(&mut buf)?;
        Self::from_tlv(&element)
    }

    pub(crate) fn from_tlv(element: &Element) -> Result<Self, Error> {
        if element.typ != tlv::TLV_INTEREST {
            return Err(Error::Packet("not an Interest".into()));
        }
        let mut name = None;
        let mut nonce = 0u32;
        let mut lifetime_ms = DEFAULT_INTEREST_LIFETIME_MS;
        let mut hop_limit = None;
        let mut can_be_prefix = false;
        let mut must_be_fresh = false;
        let mut non_discovery = false;
        for child in element.children() {
            let child = child?;
            match child.typ {
                tlv::TLV_NAME => name = Some(Name::from_tlv(&child)?),
                tlv::TLV_CAN_BE_PREFIX => can_be_prefix = true,
                tlv::TLV_MUST_BE_FRESH => must_be_fresh = true,
                tlv::TLV_NONCE => {
                    if child.value.len() != 4 {
                        return Err(Error::Packet("nonce must be 4 bytes".into()));
                    }
                    nonce = u32::from_be_bytes(child.value[..4].try_into().unwrap());
                }
                tlv::TLV_INTEREST_LIFETIME => lifetime_ms = child.as_number()? as u32,
                tlv::TLV_HOP_LIMIT => {
                    if child.value.len() != 1 {
                        return Err(Error::Packet("hop limit must be 1 byte".into()));
                    }
                    hop_limit = Some(child.value[0]);
                }
                tlv::TLV_NON_DISCOVERY => non_discovery = true,
                _ => {}
            }
        }
        Ok(Self {
            name: name.ok_or_else(|| Error::Packet("Interest without name".into()))?,
            nonce,
            lifetime_ms,
            hop_limit,
            can_be_prefix,
            must_be_fresh,
            non_discovery,
        })
    }
}

/* ---------------------------------------------------------------- *
 * Data
 * ---------------------------------------------------------------- */

/// An NDN Data packet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Data {
    pub name: Name,
    pub content: Bytes,
    pub freshness_period_ms: u32,
    /// The `PrefixAnnouncementTag`: an announcement attached by a producer or
    /// by a forwarder on the PA-attach path.
    pub prefix_ann: Option<PrefixAnnouncement>,
}

impl Data {
    pub fn new(name: Name, content: impl Into<Bytes>) -> Self {
        Self {
            name,
            content: content.into(),
            freshness_period_ms: 10_000,
            prefix_ann: None,
        }
    }

    pub fn with_prefix_ann(mut self, pa: PrefixAnnouncement) -> Self {
        self.prefix_ann = Some(pa);
        self
    }

    pub fn to_wire(&self) -> Bytes {
        let mut inner = BytesMut::new();
        self.name.to_tlv().encode(&mut inner);
        Element::number(tlv::TLV_FRESHNESS_PERIOD, self.freshness_period_ms as u64)
            .encode(&mut inner);
        Element::new(tlv::TLV_CONTENT, self.content.clone()).encode(&mut inner);
        if let Some(pa) = &self.prefix_ann {
            pa.to_tlv().encode(&mut inner);
        }
        let mut buf = BytesMut::new();
        Element::new(tlv::TLV_DATA, inner.freeze()).encode(&mut buf);
        buf.freeze()
    }

    pub fn from_wire(wire: &[u8]) -> Result<Self, Error> {
        let mut buf = Bytes::copy_from_slice(wire);
        let element = Element::decode(&mut buf)?;
        Self::from_tlv(&element)
    }

    pub(crate) fn from_tlv(element: &Element) -> Result<Self, Error> {
        if element.typ != tlv::TLV_DATA {
            return Err(Error::Packet("not a Data".into()));
        }
        let mut name = None;
        let mut content = Bytes::new();
        let mut freshness_period_ms = 0;
        let mut prefix_ann = None;
        for child in element.children() {
            let child = child?;
            match child.typ {
                tlv::TLV_NAME => name = Some(Name::from_tlv(&child)?),
                tlv::TLV_FRESHNESS_PERIOD => freshness_period_ms = child.as_number()? as u32,
                tlv::TLV_CONTENT => content = child.value.clone(),
                tlv::TLV_PREFIX_ANNOUNCEMENT => {
                    prefix_ann = Some(PrefixAnnouncement::from_tlv(&child)?)
                }
                _ => {}
            }
        }
        Ok(Self {
            name: name.ok_or_else(|| Error::Packet("Data without name".into()))?,
            content,
            freshness_period_ms,
            prefix_ann,
        })
    }
}

/* ---------------------------------------------------------------- *
 * Nack
 * ---------------------------------------------------------------- */

/// Reason code carried in a Nack header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum NackReason {
    None = 0,
    Congestion = 50,
    Duplicate = 100,
    NoRoute = 150,
}

impl NackReason {
    pub fn from_code(code: u64) -> Self {
        match code {
            50 => Self::Congestion,
            100 => Self::Duplicate,
            150 => Self::NoRoute,
            _ => Self::None,
        }
    }

    /// Compare two reasons; `None` is treated as most severe.
    pub fn less_severe(self, other: Self) -> Self {
        let rank = |r: Self| match r {
            Self::None => u8::MAX,
            r => r as u8,
        };
        if rank(self) <= rank(other) {
            self
        } else {
            other
        }
    }
}

impl fmt::Display for NackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::None => "None",
            Self::Congestion => "Congestion",
            Self::Duplicate => "Duplicate",
            Self::NoRoute => "NoRoute",
        };
        write!(f, "{s}")
    }
}

/// A negative acknowledgment: a reason plus the nacked Interest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Nack {
    pub reason: NackReason,
    pub interest: Interest,
}

impl Nack {
    pub fn new(reason: NackReason, interest: Interest) -> Self {
        Self { reason, interest }
    }

    pub fn to_wire(&self) -> Bytes {
        let mut inner = BytesMut::new();
        Element::number(tlv::TLV_NACK_REASON, self.reason as u64).encode(&mut inner);
        inner.extend_from_slice(&self.interest.to_wire());
        let mut buf = BytesMut::new();
        Element::new(tlv::TLV_NACK, inner.freeze()).encode(&mut buf);
        buf.freeze()
    }

    pub fn from_wire(wire: &[u8]) -> Result<Self, Error> {
        let mut buf = Bytes::copy_from_slice(wire);
        let element = Element::decode(&mut buf)?;
        Self::from_tlv(&element)
    }

    pub(crate) fn from_tlv(element: &Element) -> Result<Self, Error> {
        if element.typ != tlv::TLV_NACK {
            return Err(Error::Packet("not a Nack".into()));
        }
        let mut reason = NackReason::None;
        let mut interest = None;
        for child in element.children() {
            let child = child?;
            match child.typ {
                tlv::TLV_NACK_REASON => reason = NackReason::from_code(child.as_number()?),
                tlv::TLV_INTEREST => interest = Some(Interest::from_tlv(&child)?),
                _ => {}
            }
        }
        Ok(Self {
            reason,
            interest: interest.ok_or_else(|| Error::Packet("Nack without Interest".into()))?,
        })
    }
}
