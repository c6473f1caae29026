//! The forwarding pipeline.
//!
//! Owns every table the strategy works against and implements the emission
//! API the strategy calls back into. All methods run on the main executor.

use crate::cs::ContentStore;
use crate::executor::{Executors, MainTask};
use crate::face::{Face, FaceEndpoint, FaceId, FaceTable, Scope};
use crate::fib::Fib;
use crate::packet::Packet;
use crate::pit::{self, Pit, PitHandle};
use crate::strategy::{self, SelfLearningStrategy};
use log::{debug, trace, warn};
use rust_slndn_common::metrics::ForwarderMetrics;
use rust_slndn_common::ndn::{Data, Interest, Nack, NackReason, Name};
use rust_slndn_common::Error;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

/// A packet handed to the main executor by a face's receive path.
pub struct IngressPacket {
    pub face_id: FaceId,
    pub endpoint: crate::face::EndpointId,
    pub packet: Packet,
}

#[derive(Debug, Clone)]
pub struct ForwarderConfig {
    /// Instance name of the forwarding strategy.
    pub strategy_name: Name,
    pub cs_capacity: usize,
    pub pit_sweep_interval: Duration,
}

impl Default for ForwarderConfig {
    fn default() -> Self {
        Self {
            strategy_name: SelfLearningStrategy::strategy_name(),
            cs_capacity: 4096,
            pit_sweep_interval: Duration::from_millis(100),
        }
    }
}

pub struct Forwarder {
    pub faces: FaceTable,
    pub fib: Fib,
    pub pit: Pit,
    pub cs: ContentStore,
    pub metrics: Arc<ForwarderMetrics>,
    strategy: Arc<SelfLearningStrategy>,
    executors: Executors,
    config: ForwarderConfig,
}

impl Forwarder {
    /// Construct the forwarder; fails fast on a bad strategy instance name.
    pub fn new(config: ForwarderConfig, executors: Executors) -> Result<Self, Error> {
        let strategy = Arc::new(strategy::default_registry().create(&config.strategy_name)?);
        Ok(Self {
            faces: FaceTable::new(),
            fib: Fib::new(),
            pit: Pit::new(),
            cs: ContentStore::new(config.cs_capacity),
            metrics: Arc::new(ForwarderMetrics::new()),
            strategy,
            executors,
            config,
        })
    }

    pub fn executors(&self) -> &Executors {
        &self.executors
    }

    /// Drive the main executor: posted tasks, ingress packets, PIT sweep.
    pub async fn run(
        mut self,
        mut tasks: mpsc::UnboundedReceiver<MainTask>,
        mut ingress: mpsc::UnboundedReceiver<IngressPacket>,
    ) {
        let mut sweep = tokio::time::interval(self.config.pit_sweep_interval);
        loop {
            tokio::select! {
                maybe_task = tasks.recv() => match maybe_task {
                    Some(task) => task(&mut self),
                    None => break,
                },
                maybe_packet = ingress.recv() => match maybe_packet {
                    Some(packet) => self.handle_packet(packet),
                    None => break,
                },
                _ = sweep.tick() => self.sweep_pit(),
            }
        }
    }

    /// Resolve the arrival face and dispatch by packet kind.
    pub fn handle_packet(&mut self, incoming: IngressPacket) {
        let Some(face) = self.faces.get(incoming.face_id).cloned() else {
            trace!("[Face {}] gone before dispatch, packet dropped", incoming.face_id);
            return;
        };
        let ingress = FaceEndpoint::new(face, incoming.endpoint);
        match incoming.packet {
            Packet::Interest(interest) => self.on_incoming_interest(ingress, interest),
            Packet::Data(data) => self.on_incoming_data(ingress, data),
            Packet::Nack(nack) => self.on_incoming_nack(ingress, nack),
        }
    }

    /* ------------------------------------------------------------ *
     * Pipeline
     * ------------------------------------------------------------ */

    pub fn on_incoming_interest(&mut self, ingress: FaceEndpoint, interest: Interest) {
        self.metrics.interests_received.increment();
        let now = Instant::now();
        trace!("Interest {} from={}", interest.name, ingress);

        // Localhost names never travel over non-local faces.
        if strategy::nexthop::localhost_prefix().is_prefix_of(&interest.name)
            && ingress.face.scope() != Scope::Local
        {
            debug!("Interest {} from={} violates /localhost scope", interest.name, ingress);
            self.metrics.interests_dropped.increment();
            return;
        }

        let (entry, is_new) = self.pit.insert(&interest, now);
        {
            let mut e = pit::lock(&entry);
            if !is_new && e.in_record(ingress.face.id()).is_none() && e.has_nonce(interest.nonce) {
                // Same nonce from another downstream: looped Interest.
                drop(e);
                debug!("Interest {} from={} duplicate nonce", interest.name, ingress);
                ingress
                    .face
                    .send(Packet::Nack(Nack::new(NackReason::Duplicate, interest)));
                self.metrics.nacks_sent.increment();
                return;
            }
            e.insert_in_record(ingress.face.id(), &interest, now);
        }
        self.metrics.pit_size.set(self.pit.len() as u64);

        let cached = self.cs.find(&interest, now).cloned();
        let strategy = Arc::clone(&self.strategy);
        match cached {
            Some(data) => {
                self.metrics.cs_hits.increment();
                // Satisfied before dispatch; the strategy may extend this.
                pit::lock(&entry).expiry = now;
                strategy.after_content_store_hit(self, &ingress, &data, &entry, now);
            }
            None => {
                self.metrics.cs_misses.increment();
                strategy.after_receive_interest(self, &ingress, &interest, &entry, now);
            }
        }
        if self.pit.remove_if_expired(&entry, now) {
            self.metrics.pit_size.set(self.pit.len() as u64);
        }
    }

    pub fn on_incoming_data(&mut self, ingress: FaceEndpoint, data: Data) {
        self.metrics.data_received.increment();
        let now = Instant::now();
        trace!("Data {} from={}", data.name, ingress);

        let matches = self.pit.find_data_matches(&data.name);
        if matches.is_empty() {
            debug!("Data {} from={} unsolicited", data.name, ingress);
            self.metrics.data_unsolicited.increment();
            return;
        }
        self.cs.insert(data.clone(), now);

        let strategy = Arc::clone(&self.strategy);
        for entry in matches {
            // Zeroed before dispatch; PA-attach paths extend it again.
            pit::lock(&entry).expiry = now;
            strategy.after_receive_data(self, &ingress, &data, &entry, now);
            self.pit.remove_if_expired(&entry, now);
        }
        self.metrics.pit_size.set(self.pit.len() as u64);
    }

    pub fn on_incoming_nack(&mut self, ingress: FaceEndpoint, nack: Nack) {
        self.metrics.nacks_received.increment();
        let now = Instant::now();
        trace!("Nack {} reason={} from={}", nack.interest.name, nack.reason, ingress);

        let Some(entry) = self.pit.find_exact(&nack.interest.name) else {
            debug!("Nack {} from={} no PIT entry", nack.interest.name, ingress);
            return;
        };
        let strategy = Arc::clone(&self.strategy);
        strategy.after_receive_nack(self, &ingress, &nack, &entry, now);
        if self.pit.remove_if_expired(&entry, now) {
            self.metrics.pit_size.set(self.pit.len() as u64);
        }
    }

    /// Remove expired PIT entries.
    pub fn sweep_pit(&mut self) {
        let removed = self.pit.sweep(Instant::now());
        if removed > 0 {
            self.metrics.pit_expirations.add(removed as u64);
            self.metrics.pit_size.set(self.pit.len() as u64);
        }
    }

    /* ------------------------------------------------------------ *
     * Strategy emission API
     * ------------------------------------------------------------ */

    /// Send an Interest upstream and record it on the entry. `None` when
    /// the face no longer exists.
    pub fn send_interest(
        &mut self,
        entry: &PitHandle,
        out_face: FaceId,
        interest: &Interest,
        now: Instant,
    ) -> Option<()> {
        let Some(face) = self.faces.get(out_face).cloned() else {
            warn!("[Face {out_face}] gone, Interest {} not sent", interest.name);
            return None;
        };
        pit::lock(entry).insert_out_record(out_face, interest, now);
        face.send(Packet::Interest(interest.clone()));
        self.metrics.interests_forwarded.increment();
        Some(())
    }

    /// Send Data to one downstream, consuming its in-record.
    pub fn send_data(&mut self, entry: &PitHandle, down_face: FaceId, data: &Data) {
        let Some(face) = self.faces.get(down_face).cloned() else {
            warn!("[Face {down_face}] gone, Data {} not sent", data.name);
            return;
        };
        pit::lock(entry).remove_in_record(down_face);
        face.send(Packet::Data(data.clone()));
        self.metrics.data_sent.increment();
    }

    /// Send Data to every downstream with an unexpired in-record, except
    /// the face the Data arrived on (unless that face is ad-hoc).
    pub fn send_data_to_all(&mut self, entry: &PitHandle, ingress: FaceId, data: &Data, now: Instant) {
        let downstreams: Vec<FaceId> = {
            let e = pit::lock(entry);
            e.in_records
                .iter()
                .filter(|r| r.expiry > now)
                .filter(|r| {
                    r.face != ingress
                        || self
                            .faces
                            .get(r.face)
                            .is_some_and(|f| f.link_type() == crate::face::LinkType::AdHoc)
                })
                .map(|r| r.face)
                .collect()
        };
        for face in downstreams {
            self.send_data(entry, face, data);
        }
    }

    /// Send Data to every downstream with an unexpired in-record. Used by
    /// the announcement-attach continuation, where the capture face is an
    /// upstream (or, on a cache hit, the requester itself) and must not be
    /// excluded.
    pub fn send_data_to_downstreams(&mut self, entry: &PitHandle, data: &Data, now: Instant) {
        let downstreams: Vec<FaceId> = {
            let e = pit::lock(entry);
            e.in_records
                .iter()
                .filter(|r| r.expiry > now)
                .map(|r| r.face)
                .collect()
        };
        for face in downstreams {
            self.send_data(entry, face, data);
        }
    }

    /// Send a Nack carrying the entry's Interest to one downstream,
    /// consuming its in-record.
    pub fn send_nack(&mut self, entry: &PitHandle, down_face: FaceId, reason: NackReason) {
        let Some(face) = self.faces.get(down_face).cloned() else {
            warn!("[Face {down_face}] gone, Nack not sent");
            return;
        };
        let interest = {
            let mut e = pit::lock(entry);
            e.remove_in_record(down_face);
            e.interest.clone()
        };
        trace!("Nack {} reason={} to={}", interest.name, reason, down_face);
        face.send(Packet::Nack(Nack::new(reason, interest)));
        self.metrics.nacks_sent.increment();
    }

    /// Give up on the entry: it is dropped at the next sweep.
    pub fn reject_pending_interest(&mut self, entry: &PitHandle, now: Instant) {
        let mut e = pit::lock(entry);
        e.rejected = true;
        e.expiry = now;
    }

    /// Re-arm the entry's expiry timer. A zero duration removes the entry
    /// right away.
    pub fn set_expiry_timer(&mut self, entry: &PitHandle, after: Duration) {
        let now = Instant::now();
        pit::lock(entry).expiry = now + after;
        if after.is_zero() {
            self.pit.remove(entry);
            self.metrics.pit_size.set(self.pit.len() as u64);
        }
    }

    /// Convenience for tests and the daemon: register a face.
    pub fn add_face(&mut self, face: Arc<Face>) -> FaceId {
        self.faces.add(face)
    }
}
