//! Shared fixtures for pipeline-level tests.
//!
//! The fixture owns both executors' queues and pumps them manually, so every
//! cross-executor round trip is deterministic.

use crate::channel::{Channel, ConnectFailure, ConnectSuccess};
use crate::executor::{Executors, MainTask, RibTask};
use crate::face::{EndpointId, Face, FaceEndpoint, FaceParams, LinkType, Persistency, Scope};
use crate::forwarder::{Forwarder, ForwarderConfig};
use crate::packet::Packet;
use crate::rib::RibService;
use rust_slndn_common::ndn::{Data, Interest, Nack};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::UnboundedReceiver;

pub(crate) struct TestBed {
    pub fw: Forwarder,
    pub rib: RibService,
    pub executors: Executors,
    main_rx: UnboundedReceiver<MainTask>,
    rib_rx: UnboundedReceiver<RibTask>,
}

impl TestBed {
    pub fn new() -> Self {
        let (executors, main_rx, rib_rx) = Executors::new();
        let fw = Forwarder::new(ForwarderConfig::default(), executors.clone())
            .expect("default config instantiates");
        let rib = RibService::new(executors.clone());
        Self {
            fw,
            rib,
            executors,
            main_rx,
            rib_rx,
        }
    }

    /// Register a face and keep its transmit sink for assertions.
    pub fn add_face(
        &mut self,
        scope: Scope,
        link_type: LinkType,
    ) -> (Arc<Face>, UnboundedReceiver<Packet>) {
        let (face, rx) = Face::new(scope, link_type, Persistency::Persistent, "test://");
        self.fw.add_face(face.clone());
        (face, rx)
    }

    /// Drain both executor queues until neither has work left.
    pub fn pump(&mut self) {
        loop {
            let mut progressed = false;
            while let Ok(task) = self.rib_rx.try_recv() {
                task(&mut self.rib);
                progressed = true;
            }
            while let Ok(task) = self.main_rx.try_recv() {
                task(&mut self.fw);
                progressed = true;
            }
            if !progressed {
                break;
            }
        }
    }

    pub fn interest(&mut self, face: &Arc<Face>, interest: Interest) {
        self.interest_from(face, EndpointId::None, interest);
    }

    pub fn interest_from(&mut self, face: &Arc<Face>, endpoint: EndpointId, interest: Interest) {
        self.fw
            .on_incoming_interest(FaceEndpoint::new(face.clone(), endpoint), interest);
    }

    pub fn data(&mut self, face: &Arc<Face>, data: Data) {
        self.data_from(face, EndpointId::None, data);
    }

    pub fn data_from(&mut self, face: &Arc<Face>, endpoint: EndpointId, data: Data) {
        self.fw
            .on_incoming_data(FaceEndpoint::new(face.clone(), endpoint), data);
    }

    pub fn nack(&mut self, face: &Arc<Face>, nack: Nack) {
        self.fw
            .on_incoming_nack(FaceEndpoint::new(face.clone(), EndpointId::None), nack);
    }
}

/// Everything queued on a face's transmit sink.
pub(crate) fn drain(rx: &mut UnboundedReceiver<Packet>) -> Vec<Packet> {
    let mut packets = Vec::new();
    while let Ok(packet) = rx.try_recv() {
        packets.push(packet);
    }
    packets
}

/// A channel whose connects succeed (or fail) immediately through the main
/// executor, recording every attempt.
pub(crate) struct TestChannel {
    executors: Executors,
    fail: bool,
    pub connects: Mutex<Vec<EndpointId>>,
    created: Mutex<Vec<(Arc<Face>, UnboundedReceiver<Packet>)>>,
}

impl TestChannel {
    pub fn new(executors: Executors, fail: bool) -> Arc<Self> {
        Arc::new(Self {
            executors,
            fail,
            connects: Mutex::new(Vec::new()),
            created: Mutex::new(Vec::new()),
        })
    }

    /// The faces minted so far, with their transmit sinks.
    pub fn take_created(&self) -> Vec<(Arc<Face>, UnboundedReceiver<Packet>)> {
        std::mem::take(&mut *self.created.lock().unwrap())
    }

    pub fn connect_count(&self) -> usize {
        self.connects.lock().unwrap().len()
    }
}

impl Channel for TestChannel {
    fn local_uri(&self) -> String {
        "test://channel".into()
    }

    fn connect(
        self: Arc<Self>,
        remote: EndpointId,
        params: FaceParams,
        on_success: ConnectSuccess,
        on_failure: ConnectFailure,
    ) {
        self.connects.lock().unwrap().push(remote.clone());
        if self.fail {
            self.executors
                .run_on_main(move |fw| on_failure(fw, 504, "connection refused".into()));
            return;
        }
        let (face, rx) = Face::new(
            Scope::NonLocal,
            LinkType::PointToPoint,
            params.persistency,
            format!("test://{remote}"),
        );
        self.created.lock().unwrap().push((face.clone(), rx));
        self.executors.run_on_main(move |fw| on_success(fw, face));
    }
}
