//! Faces: logical link endpoints and the face table.
//!
//! A face delivers incoming packets to the main executor's ingress queue and
//! accepts outgoing packets through an unbounded channel drained by its
//! transport task. Faces are shared as `Arc<Face>`; the face table assigns
//! identifiers and defines the iteration order used by broadcast.

use crate::channel::Channel;
use crate::packet::Packet;
use log::{debug, info};
use rust_slndn_common::metrics::Counter;
use std::collections::BTreeMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::mpsc;

/// Identifies a face.
pub type FaceId = u64;

/// A face that has not been added to the face table yet.
pub const INVALID_FACE_ID: FaceId = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Local,
    NonLocal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkType {
    PointToPoint,
    MultiAccess,
    AdHoc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Persistency {
    Persistent,
    OnDemand,
    Permanent,
}

/// Parameters applied to a newly created face.
#[derive(Debug, Clone)]
pub struct FaceParams {
    pub persistency: Persistency,
    pub mtu: Option<usize>,
}

impl Default for FaceParams {
    fn default() -> Self {
        Self {
            persistency: Persistency::Persistent,
            mtu: None,
        }
    }
}

/// Identifies a remote peer on the link.
///
/// Only meaningful in the context of the face the packet arrived on; on
/// point-to-point links it is `None`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EndpointId {
    None,
    Ethernet([u8; 6]),
    Udp(SocketAddr),
    Tcp(SocketAddr),
}

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndpointId::None => write!(f, "-"),
            EndpointId::Ethernet(mac) => write!(
                f,
                "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
                mac[0], mac[1], mac[2], mac[3], mac[4], mac[5]
            ),
            EndpointId::Udp(addr) => write!(f, "udp://{addr}"),
            EndpointId::Tcp(addr) => write!(f, "tcp://{addr}"),
        }
    }
}

/// A logical link endpoint.
#[derive(Debug)]
pub struct Face {
    id: AtomicU64,
    scope: Scope,
    link_type: LinkType,
    persistency: Persistency,
    remote_uri: String,
    channel: Mutex<Option<Weak<dyn Channel>>>,
    out_tx: mpsc::UnboundedSender<Packet>,
    pub packets_sent: Counter,
    pub packets_received: Counter,
}

impl Face {
    /// Create a face together with the receiver its transport drains.
    pub fn new(
        scope: Scope,
        link_type: LinkType,
        persistency: Persistency,
        remote_uri: impl Into<String>,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<Packet>) {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let face = Arc::new(Self {
            id: AtomicU64::new(INVALID_FACE_ID),
            scope,
            link_type,
            persistency,
            remote_uri: remote_uri.into(),
            channel: Mutex::new(None),
            out_tx,
            packets_sent: Counter::new(),
            packets_received: Counter::new(),
        });
        (face, out_rx)
    }

    pub fn id(&self) -> FaceId {
        self.id.load(Ordering::Relaxed)
    }

    pub(crate) fn set_id(&self, id: FaceId) {
        self.id.store(id, Ordering::Relaxed);
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    pub fn link_type(&self) -> LinkType {
        self.link_type
    }

    pub fn persistency(&self) -> Persistency {
        self.persistency
    }

    pub fn remote_uri(&self) -> &str {
        &self.remote_uri
    }

    /// The channel that birthed this face, if it is still alive.
    pub fn channel(&self) -> Option<Arc<dyn Channel>> {
        self.channel
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .and_then(Weak::upgrade)
    }

    pub fn set_channel(&self, channel: &Arc<dyn Channel>) {
        *self.channel.lock().unwrap_or_else(|e| e.into_inner()) = Some(Arc::downgrade(channel));
    }

    /// Queue a packet for transmission. A closed transport drops the packet.
    pub fn send(&self, packet: Packet) {
        if self.out_tx.send(packet).is_err() {
            debug!("[Face {}] transport closed, packet dropped", self.id());
            return;
        }
        self.packets_sent.increment();
    }
}

/// `(Face, EndpointId)`: where exactly a packet came from.
#[derive(Clone)]
pub struct FaceEndpoint {
    pub face: Arc<Face>,
    pub endpoint: EndpointId,
}

impl FaceEndpoint {
    pub fn new(face: Arc<Face>, endpoint: EndpointId) -> Self {
        Self { face, endpoint }
    }
}

impl fmt::Display for FaceEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.face.id(), self.endpoint)
    }
}

/// The table of active faces, iterated in identifier order.
#[derive(Default)]
pub struct FaceTable {
    faces: BTreeMap<FaceId, Arc<Face>>,
    last_id: FaceId,
}

impl FaceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a face and assign its identifier. Re-adding a registered
    /// face returns its existing identifier.
    pub fn add(&mut self, face: Arc<Face>) -> FaceId {
        let existing = face.id();
        if existing != INVALID_FACE_ID && self.faces.contains_key(&existing) {
            return existing;
        }
        self.last_id += 1;
        let id = self.last_id;
        face.set_id(id);
        info!("[Face {}] added remote={}", id, face.remote_uri());
        self.faces.insert(id, face);
        id
    }

    pub fn get(&self, id: FaceId) -> Option<&Arc<Face>> {
        self.faces.get(&id)
    }

    pub fn remove(&mut self, id: FaceId) -> Option<Arc<Face>> {
        let removed = self.faces.remove(&id);
        if removed.is_some() {
            info!("[Face {id}] removed");
        }
        removed
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Face>> {
        self.faces.values()
    }

    pub fn len(&self) -> usize {
        self.faces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }
}
