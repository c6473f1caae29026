//! Channels: factories for faces.
//!
//! A channel owns a local endpoint (e.g. a bound UDP socket) and can mint
//! unicast faces toward remote peers on demand. Face creation is
//! asynchronous; completion callbacks are posted to the main executor, where
//! they run against the forwarder state.

use crate::executor::Executors;
use crate::face::{EndpointId, Face, FaceParams, LinkType, Scope};
use crate::forwarder::{Forwarder, IngressPacket};
use crate::packet::Packet;
use anyhow::{Context, Result};
use log::{debug, trace, warn};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;

/// Invoked on the main executor when a unicast face is ready.
pub type ConnectSuccess = Box<dyn FnOnce(&mut Forwarder, Arc<Face>) + Send>;

/// Invoked on the main executor when face creation failed, with a status
/// code and a human-readable reason.
pub type ConnectFailure = Box<dyn FnOnce(&mut Forwarder, u32, String) + Send>;

/// A factory for unicast faces toward remote endpoints.
pub trait Channel: Send + Sync {
    fn local_uri(&self) -> String;

    /// Open (or reuse) a unicast face to `remote`. Exactly one of the
    /// callbacks is posted to the main executor.
    fn connect(
        self: Arc<Self>,
        remote: EndpointId,
        params: FaceParams,
        on_success: ConnectSuccess,
        on_failure: ConnectFailure,
    );
}

/* ---------------------------------------------------------------- *
 * UDP channel
 * ---------------------------------------------------------------- */

/// A UDP channel: one socket, an optional multi-access group face, and
/// per-remote unicast faces created on demand.
pub struct UdpChannel {
    socket: Arc<UdpSocket>,
    local: SocketAddr,
    group: Option<SocketAddr>,
    executors: Executors,
    ingress: mpsc::UnboundedSender<IngressPacket>,
    unicast: Mutex<HashMap<SocketAddr, Arc<Face>>>,
    group_face: Mutex<Option<Arc<Face>>>,
}

impl UdpChannel {
    /// Bind the channel socket. If `group` is given, datagrams from unknown
    /// peers are delivered on a multi-access group face and sends on that
    /// face go to the group address.
    pub async fn bind(
        local: SocketAddr,
        group: Option<SocketAddr>,
        executors: Executors,
        ingress: mpsc::UnboundedSender<IngressPacket>,
    ) -> Result<Arc<Self>> {
        let socket = UdpSocket::bind(local)
            .await
            .with_context(|| format!("failed to bind UDP channel on {local}"))?;
        if let (Some(group), SocketAddr::V4(local)) = (group, local) {
            if let SocketAddr::V4(group) = group {
                socket
                    .join_multicast_v4(*group.ip(), *local.ip())
                    .with_context(|| format!("failed to join multicast group {group}"))?;
            }
        }
        let local = socket.local_addr()?;
        Ok(Arc::new(Self {
            socket: Arc::new(socket),
            local,
            group,
            executors,
            ingress,
            unicast: Mutex::new(HashMap::new()),
            group_face: Mutex::new(None),
        }))
    }

    /// Create the multi-access group face and register it with the face
    /// table on the main executor.
    pub fn create_group_face(self: &Arc<Self>) -> Option<Arc<Face>> {
        let group = self.group?;
        let (face, out_rx) = Face::new(
            Scope::NonLocal,
            LinkType::MultiAccess,
            crate::face::Persistency::Permanent,
            format!("udp://{group}"),
        );
        let channel: Arc<dyn Channel> = self.clone();
        face.set_channel(&channel);
        self.spawn_writer(out_rx, group);
        *lock(&self.group_face) = Some(face.clone());

        let registered = face.clone();
        self.executors.run_on_main(move |fw| {
            fw.faces.add(registered);
        });
        Some(face)
    }

    /// Run the receive loop: decode datagrams and hand them to the main
    /// executor's ingress queue, attributed to the unicast face for the
    /// source address when one exists, otherwise to the group face.
    pub fn spawn_receiver(self: &Arc<Self>) {
        let channel = self.clone();
        tokio::spawn(async move {
            let mut buf = vec![0u8; rust_slndn_common::ndn::MAX_PACKET_SIZE];
            loop {
                let (len, src) = match channel.socket.recv_from(&mut buf).await {
                    Ok(v) => v,
                    Err(e) => {
                        warn!("UDP channel {} receive error: {e}", channel.local);
                        continue;
                    }
                };
                let packet = match Packet::from_wire(&buf[..len]) {
                    Ok(p) => p,
                    Err(e) => {
                        trace!("UDP channel {}: bad packet from {src}: {e}", channel.local);
                        continue;
                    }
                };
                let face = lock(&channel.unicast)
                    .get(&src)
                    .cloned()
                    .or_else(|| lock(&channel.group_face).clone());
                let Some(face) = face else {
                    trace!("UDP channel {}: no face for {src}, dropped", channel.local);
                    continue;
                };
                if face.id() == crate::face::INVALID_FACE_ID {
                    trace!("UDP channel {}: face for {src} not registered yet", channel.local);
                    continue;
                }
                face.packets_received.increment();
                let _ = channel.ingress.send(IngressPacket {
                    face_id: face.id(),
                    endpoint: EndpointId::Udp(src),
                    packet,
                });
            }
        });
    }

    fn spawn_writer(&self, mut out_rx: mpsc::UnboundedReceiver<Packet>, remote: SocketAddr) {
        let socket = self.socket.clone();
        tokio::spawn(async move {
            while let Some(packet) = out_rx.recv().await {
                if let Err(e) = socket.send_to(&packet.to_wire(), remote).await {
                    debug!("UDP send to {remote} failed: {e}");
                }
            }
        });
    }

    fn make_unicast_face(self: &Arc<Self>, remote: SocketAddr, params: &FaceParams) -> Arc<Face> {
        let (face, out_rx) = Face::new(
            Scope::NonLocal,
            LinkType::PointToPoint,
            params.persistency,
            format!("udp://{remote}"),
        );
        let channel: Arc<dyn Channel> = self.clone();
        face.set_channel(&channel);
        self.spawn_writer(out_rx, remote);
        lock(&self.unicast).insert(remote, face.clone());
        face
    }
}

impl Channel for UdpChannel {
    fn local_uri(&self) -> String {
        format!("udp://{}", self.local)
    }

    fn connect(
        self: Arc<Self>,
        remote: EndpointId,
        params: FaceParams,
        on_success: ConnectSuccess,
        on_failure: ConnectFailure,
    ) {
        let addr = match remote {
            EndpointId::Udp(addr) => addr,
            other => {
                self.executors.run_on_main(move |fw| {
                    on_failure(fw, 400, format!("unsupported endpoint {other}"))
                });
                return;
            }
        };
        let face = match lock(&self.unicast).get(&addr) {
            Some(face) => face.clone(),
            None => self.make_unicast_face(addr, &params),
        };
        self.executors.run_on_main(move |fw| on_success(fw, face));
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}
