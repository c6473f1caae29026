//! Self-learning forwarding strategy.
//!
//! Forwards Interests along ranked nexthops with retransmission suppression
//! and round-robin retries. When the FIB has no entry, the Interest is
//! broadcast to non-local faces as a discovery Interest; the first returning
//! Data carries a prefix announcement that is installed as a route through
//! the RIB, so subsequent Interests follow the learned path. Data arriving
//! over a multi-access face promotes the sender to a dedicated unicast face
//! before the route is attached.

use crate::face::{Face, FaceEndpoint, FaceId, FaceParams, FaceTable, LinkType, Persistency, Scope};
use crate::fib::NextHop;
use crate::forwarder::Forwarder;
use crate::pit::{self, PitEntry, PitHandle};
use crate::strategy::nexthop;
use crate::strategy::retx_suppression::{RetxSuppressionExponential, RetxSuppressionResult};
use crate::channel::Channel;
use log::{debug, warn};
use rust_slndn_common::ndn::{Data, Interest, Nack, NackReason, Name, PrefixAnnouncement};
use rust_slndn_common::Error;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Lifetime requested for routes learned from prefix announcements.
pub const ROUTE_RENEW_LIFETIME: Duration = Duration::from_secs(600);

/// Number of retransmissions after which routes would be cleared and the
/// Interest re-flooded. Reserved for a future retry policy; the active path
/// does not consult it.
pub const RETX_TRIGGER_BROADCAST_COUNT: u32 = 7;

const STRATEGY_VERSION: u64 = 2;

#[derive(Debug)]
pub struct SelfLearningStrategy {
    instance_name: Name,
    retx_suppression: RetxSuppressionExponential,
}

impl SelfLearningStrategy {
    pub fn strategy_name() -> Name {
        Name::from_uri("/localhost/nfd/strategy/self-learning").append_version(STRATEGY_VERSION)
    }

    /// Instantiate from an instance name; parameters and foreign versions
    /// are configuration errors.
    pub fn new(instance: &Name) -> Result<Self, Error> {
        let parsed = super::parse_instance_name(instance);
        if !parsed.parameters.is_empty() {
            return Err(Error::StrategyInstantiation(
                "self-learning does not accept parameters".into(),
            ));
        }
        if let Some(version) = parsed.version {
            if version != STRATEGY_VERSION {
                return Err(Error::StrategyInstantiation(format!(
                    "self-learning does not support version {version}"
                )));
            }
        }
        Ok(Self {
            instance_name: Self::strategy_name(),
            retx_suppression: RetxSuppressionExponential::default(),
        })
    }

    pub fn instance_name(&self) -> &Name {
        &self.instance_name
    }

    /* ------------------------------------------------------------ *
     * Triggers
     * ------------------------------------------------------------ */

    pub fn after_receive_interest(
        &self,
        fw: &mut Forwarder,
        ingress: &FaceEndpoint,
        interest: &Interest,
        entry: &PitHandle,
        now: Instant,
    ) {
        let suppression = {
            let mut e = pit::lock(entry);
            self.retx_suppression.decide_per_pit_entry(&mut e, now)
        };
        if suppression == RetxSuppressionResult::Suppress {
            debug!("Interest {} from={} suppressed", interest.name, ingress);
            fw.metrics.interests_suppressed.increment();
            return;
        }

        let nexthops: Vec<NextHop> = fw
            .fib
            .lookup(&interest.name)
            .map(|e| e.nexthops().to_vec())
            .unwrap_or_default();

        // New Interests take the lowest-cost fresh nexthop; retransmissions
        // look for one they have not tried yet.
        let want_unused = suppression == RetxSuppressionResult::Forward;
        let choice = {
            let e = pit::lock(entry);
            nexthop::find_first_eligible(&ingress.face, interest, &nexthops, &fw.faces, &e, want_unused, now)
        };
        match choice {
            Some(nh) => self.has_untried_nexthop_handler(fw, ingress, nh.face, interest, entry, now),
            None if suppression == RetxSuppressionResult::New => {
                self.no_nexthop_handler(fw, ingress, interest, entry, now)
            }
            None => self.all_nexthop_tried_handler(fw, ingress, interest, &nexthops, entry, now),
        }
    }

    pub fn after_content_store_hit(
        &self,
        fw: &mut Forwarder,
        ingress: &FaceEndpoint,
        data: &Data,
        entry: &PitHandle,
        _now: Instant,
    ) {
        if ingress.face.scope() == Scope::Local {
            // The consumer is on this node; answer directly.
            fw.send_data(entry, ingress.face.id(), data);
            return;
        }
        let is_non_discovery = pit::lock(entry).interest.non_discovery;
        if !is_non_discovery && data.prefix_ann.is_none() {
            // A discovery Interest deserves an announcement with its Data.
            debug!("Data {} cs hit, look up announcement", data.name);
            self.async_process_data(fw, entry, ingress.face.id(), data);
        } else {
            fw.send_data(entry, ingress.face.id(), data);
        }
    }

    pub fn after_receive_data(
        &self,
        fw: &mut Forwarder,
        ingress: &FaceEndpoint,
        data: &Data,
        entry: &PitHandle,
        now: Instant,
    ) {
        let out_info: Option<bool> = {
            let e = pit::lock(entry);
            e.out_record(ingress.face.id())
                .map(|r| r.info().is_some_and(|i| i.is_non_discovery_interest))
        };
        let Some(was_non_discovery) = out_info else {
            debug!("Data {} from={} ignored, no out-record", data.name, ingress);
            return;
        };

        if was_non_discovery {
            let need = {
                let e = pit::lock(entry);
                Self::need_prefix_ann(&e, &fw.faces, now)
            };
            if need {
                // A downstream discovery Interest is waiting for a PA.
                self.async_process_data(fw, entry, ingress.face.id(), data);
            } else {
                fw.send_data_to_all(entry, ingress.face.id(), data, now);
            }
            return;
        }

        // The outgoing Interest was discovery.
        if let Some(pa) = data.prefix_ann.clone() {
            if ingress.face.link_type() == LinkType::MultiAccess {
                debug!(
                    "[Face {}] is multi-access, connect to unicast peer {}",
                    ingress.face.id(),
                    ingress.endpoint
                );
                self.promote_to_unicast(fw, ingress, data, pa, entry);
                // The Data leaves from the connect callbacks.
                return;
            }
            debug!("[Face {}] is unicast, announce route to it", ingress.face.id());
            Self::add_route(fw, ingress.face.id(), pa);
        }
        // Without a PA the upstream does not support self-learning; the
        // Data is still forwarded.
        fw.send_data_to_all(entry, ingress.face.id(), data, now);
    }

    pub fn after_receive_nack(
        &self,
        fw: &mut Forwarder,
        ingress: &FaceEndpoint,
        nack: &Nack,
        entry: &PitHandle,
        now: Instant,
    ) {
        debug!("Nack {} reason={} from={}", nack.interest.name, nack.reason, ingress);
        if nack.reason != NackReason::NoRoute {
            self.process_nack(fw, ingress, nack, entry, now);
            return;
        }

        // The nexthop is a dead end; expire its route before anything else.
        Self::renew_route(fw, nack.interest.name.clone(), ingress.face.id(), Duration::ZERO);

        let out_info: Option<bool> = {
            let e = pit::lock(entry);
            e.out_record(ingress.face.id())
                .map(|r| r.info().is_some_and(|i| i.is_non_discovery_interest))
        };
        let Some(was_non_discovery) = out_info else {
            debug!("no-route Nack {} from={} for an unsent Interest", nack.interest.name, ingress);
            return;
        };
        if !was_non_discovery {
            // A discovery Interest should never be answered with NO_ROUTE.
            debug!("no-route Nack {} from={} on a discovery out-record", nack.interest.name, ingress);
            return;
        }

        let interest = pit::lock(entry).interest.clone();
        let nexthops: Vec<NextHop> = fw
            .fib
            .lookup(&interest.name)
            .map(|e| e.nexthops().to_vec())
            .unwrap_or_default();
        let choice = {
            let e = pit::lock(entry);
            nexthop::find_first_eligible(&ingress.face, &interest, &nexthops, &fw.faces, &e, true, now)
        };
        if let Some(nh) = choice {
            self.has_untried_nexthop_handler(fw, ingress, nh.face, &interest, entry, now);
            return;
        }

        let consumer_face = {
            let e = pit::lock(entry);
            if Self::is_this_consumer(&e, &fw.faces) {
                e.in_records.first().map(|r| r.face)
            } else {
                None
            }
        };
        match consumer_face {
            Some(in_face_id) => {
                // This node is the consumer's first hop: fall back to
                // discovery and flood again.
                let mut discovery = interest;
                discovery.remove_non_discovery_tag();
                {
                    let mut e = pit::lock(entry);
                    if let Some(record) = e.in_record_mut(in_face_id) {
                        record.info_mut().is_non_discovery_interest = false;
                    }
                }
                let Some(in_face) = fw.faces.get(in_face_id).cloned() else {
                    return;
                };
                self.broadcast_interest(fw, &discovery, &in_face, entry, now);
            }
            None => self.process_nack(fw, ingress, nack, entry, now),
        }
    }

    /* ------------------------------------------------------------ *
     * Interest handlers
     * ------------------------------------------------------------ */

    fn no_nexthop_handler(
        &self,
        fw: &mut Forwarder,
        ingress: &FaceEndpoint,
        interest: &Interest,
        entry: &PitHandle,
        now: Instant,
    ) {
        let is_non_discovery = interest.non_discovery;
        {
            let mut e = pit::lock(entry);
            if let Some(record) = e.in_record_mut(ingress.face.id()) {
                record.info_mut().is_non_discovery_interest = is_non_discovery;
            }
        }
        if is_non_discovery {
            // A routed Interest hit a node without the route: dead end.
            debug!("Interest {} from={} no nexthop, Nack", interest.name, ingress);
            fw.send_nack(entry, ingress.face.id(), NackReason::NoRoute);
            fw.reject_pending_interest(entry, now);
        } else {
            debug!("Interest {} from={} no nexthop, broadcast", interest.name, ingress);
            self.broadcast_interest(fw, interest, &ingress.face, entry, now);
        }
    }

    fn has_untried_nexthop_handler(
        &self,
        fw: &mut Forwarder,
        ingress: &FaceEndpoint,
        out_face: FaceId,
        interest: &Interest,
        entry: &PitHandle,
        now: Instant,
    ) {
        let is_non_discovery = interest.non_discovery;
        {
            let mut e = pit::lock(entry);
            if let Some(record) = e.in_record_mut(ingress.face.id()) {
                record.info_mut().is_non_discovery_interest = is_non_discovery;
            }
        }
        // From the upstream's perspective this Interest follows a route.
        let mut outgoing = interest.clone();
        if !is_non_discovery {
            outgoing.set_non_discovery_tag();
        }
        if fw.send_interest(entry, out_face, &outgoing, now).is_some() {
            if let Some(record) = pit::lock(entry).out_record_mut(out_face) {
                record.info_mut().is_non_discovery_interest = true;
            }
            debug!("Interest {} to untried Face={}", outgoing.name, out_face);
        }
    }

    fn all_nexthop_tried_handler(
        &self,
        fw: &mut Forwarder,
        ingress: &FaceEndpoint,
        interest: &Interest,
        nexthops: &[NextHop],
        entry: &PitHandle,
        now: Instant,
    ) {
        debug!("Interest {} from={} all nexthops tried, round-robin", interest.name, ingress);
        let choice = {
            let e = pit::lock(entry);
            nexthop::find_eligible_with_earliest_out_record(&ingress.face, interest, nexthops, &fw.faces, &e, now)
        };
        match choice {
            Some(nh) => {
                fw.send_interest(entry, nh.face, interest, now);
                debug!("Interest {} from={} retried to Face={}", interest.name, ingress, nh.face);
            }
            None => {
                // Nothing eligible; the entry runs out on its own.
                debug!("Interest {} from={} retransmission has no nexthop", interest.name, ingress);
            }
        }
    }

    /// Send a discovery Interest out of every non-local face except the one
    /// it arrived on (unless that face is ad-hoc).
    fn broadcast_interest(
        &self,
        fw: &mut Forwarder,
        interest: &Interest,
        in_face: &Arc<Face>,
        entry: &PitHandle,
        now: Instant,
    ) {
        let out_faces: Vec<Arc<Face>> = fw.faces.iter().cloned().collect();
        for out_face in out_faces {
            if (out_face.id() == in_face.id() && out_face.link_type() != LinkType::AdHoc)
                || nexthop::would_violate_scope(in_face, interest, &out_face)
                || out_face.scope() == Scope::Local
            {
                continue;
            }
            debug!(
                "Interest {} from={} discovery to={}",
                interest.name,
                in_face.id(),
                out_face.id()
            );
            if fw.send_interest(entry, out_face.id(), interest, now).is_some() {
                if let Some(record) = pit::lock(entry).out_record_mut(out_face.id()) {
                    record.info_mut().is_non_discovery_interest = false;
                }
                fw.metrics.interests_broadcast.increment();
            }
        }
    }

    /* ------------------------------------------------------------ *
     * Prefix announcement workflow
     * ------------------------------------------------------------ */

    /// Look up an announcement for the Data on the rib executor and forward
    /// the Data with it attached back on the main executor.
    fn async_process_data(&self, fw: &mut Forwarder, entry: &PitHandle, in_face: FaceId, data: &Data) {
        // The expiry was zeroed during dispatch; the entry must survive the
        // executor round trip.
        fw.set_expiry_timer(entry, Duration::from_secs(1));
        let entry_weak = Arc::downgrade(entry);
        let data = data.clone();
        fw.executors().run_on_rib(move |rib| {
            let Some(pa) = rib.sl_find_ann(&data.name) else {
                debug!("no announcement covers {}", data.name);
                return;
            };
            rib.executors().run_on_main(move |fw| {
                let entry = entry_weak.upgrade();
                let in_face_alive = fw.faces.get(in_face).is_some();
                match entry {
                    Some(entry) if in_face_alive => {
                        debug!("found announcement {}", pa.prefix);
                        let mut data = data;
                        data.prefix_ann = Some(pa);
                        let now = Instant::now();
                        fw.send_data_to_downstreams(&entry, &data, now);
                        fw.set_expiry_timer(&entry, Duration::ZERO);
                    }
                    _ => debug!("PIT entry or face no longer exists"),
                }
            });
        });
    }

    /// True when some unexpired downstream presented a discovery Interest
    /// and not every downstream is on a local face: only then does the Data
    /// need an announcement attached.
    fn need_prefix_ann(entry: &PitEntry, faces: &FaceTable, now: Instant) -> bool {
        let mut has_discovery = false;
        let mut all_local = true;
        for record in entry.in_records.iter().filter(|r| r.expiry > now) {
            if record.info().is_some_and(|i| !i.is_non_discovery_interest) {
                has_discovery = true;
            }
            let local = faces
                .get(record.face)
                .is_some_and(|f| f.scope() == Scope::Local);
            if !local {
                all_local = false;
            }
        }
        has_discovery && !all_local
    }

    /// Install the announced route through the rib executor. The result is
    /// only logged; forwarding never waits for it.
    fn add_route(fw: &Forwarder, in_face: FaceId, pa: PrefixAnnouncement) {
        fw.metrics.routes_announced.increment();
        fw.executors().run_on_rib(move |rib| {
            let result = rib.sl_announce(&pa, in_face, ROUTE_RENEW_LIFETIME);
            debug!("announce route {} via Face={} result={}", pa.prefix, in_face, result);
        });
    }

    /// Cap the lifetime of the route for `name` via `in_face`; zero expires
    /// it immediately.
    fn renew_route(fw: &Forwarder, name: Name, in_face: FaceId, max_lifetime: Duration) {
        fw.metrics.routes_renewed.increment();
        fw.executors().run_on_rib(move |rib| {
            let result = rib.sl_renew(&name, in_face, max_lifetime);
            debug!("renew route {} via Face={} result={}", name, in_face, result);
        });
    }

    /// Open an on-demand unicast face toward the endpoint a multi-access
    /// Data came from, then attach the route to the new face. The Data is
    /// forwarded from the completion callbacks either way.
    fn promote_to_unicast(
        &self,
        fw: &mut Forwarder,
        ingress: &FaceEndpoint,
        data: &Data,
        pa: PrefixAnnouncement,
        entry: &PitHandle,
    ) {
        // Survive the asynchronous face creation.
        fw.set_expiry_timer(entry, Duration::from_secs(1));
        let Some(channel) = ingress.face.channel() else {
            warn!("[Face {}] has no channel, route not added", ingress.face.id());
            fw.send_data_to_all(entry, ingress.face.id(), data, Instant::now());
            return;
        };
        let params = FaceParams {
            persistency: Persistency::OnDemand,
            ..Default::default()
        };
        let ingress_id = ingress.face.id();
        let entry_ok = Arc::downgrade(entry);
        let entry_err = entry_ok.clone();
        let data_ok = data.clone();
        let data_err = data.clone();
        channel.connect(
            ingress.endpoint.clone(),
            params,
            Box::new(move |fw, face| {
                let face_id = fw.add_face(face);
                fw.metrics.faces_promoted.increment();
                debug!("[Face {face_id}] unicast face created, add route");
                match entry_ok.upgrade() {
                    Some(entry) => {
                        Self::add_route(fw, face_id, pa);
                        let now = Instant::now();
                        fw.send_data_to_all(&entry, ingress_id, &data_ok, now);
                        fw.set_expiry_timer(&entry, Duration::ZERO);
                    }
                    None => debug!("PIT entry gone before unicast face creation"),
                }
            }),
            Box::new(move |fw, code, reason| {
                debug!("unicast face creation failed code={code} reason={reason}");
                if let Some(entry) = entry_err.upgrade() {
                    let now = Instant::now();
                    fw.send_data_to_all(&entry, ingress_id, &data_err, now);
                    fw.set_expiry_timer(&entry, Duration::ZERO);
                }
            }),
        );
    }

    /* ------------------------------------------------------------ *
     * Default Nack processing
     * ------------------------------------------------------------ */

    /// Record the Nack on its out-record; once every unexpired upstream has
    /// nacked, pass the least severe reason to every downstream.
    fn process_nack(
        &self,
        fw: &mut Forwarder,
        ingress: &FaceEndpoint,
        nack: &Nack,
        entry: &PitHandle,
        now: Instant,
    ) {
        let decision = {
            let mut e = pit::lock(entry);
            match e.out_record_mut(ingress.face.id()) {
                None => None,
                Some(record) => {
                    record.nacked = Some(nack.reason);
                    let mut least = nack.reason;
                    let mut all_nacked = true;
                    for record in e.out_records.iter().filter(|r| r.expiry > now) {
                        match record.nacked {
                            Some(reason) => least = least.less_severe(reason),
                            None => all_nacked = false,
                        }
                    }
                    let downstreams: Vec<FaceId> = e
                        .in_records
                        .iter()
                        .filter(|r| r.expiry > now)
                        .map(|r| r.face)
                        .collect();
                    Some((all_nacked, least, downstreams))
                }
            }
        };
        let Some((all_nacked, least, downstreams)) = decision else {
            debug!("Nack {} from={} with no out-record", nack.interest.name, ingress);
            return;
        };
        if !all_nacked {
            // Another upstream may still answer.
            return;
        }
        for face in downstreams {
            fw.send_nack(entry, face, least);
        }
    }

    fn is_this_consumer(entry: &PitEntry, faces: &FaceTable) -> bool {
        entry.in_records.len() == 1
            && entry
                .in_records
                .first()
                .and_then(|r| faces.get(r.face))
                .is_some_and(|f| f.scope() == Scope::Local)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instantiation_accepts_own_version() {
        let bare = Name::from_uri("/localhost/nfd/strategy/self-learning");
        let strategy = SelfLearningStrategy::new(&bare).unwrap();
        assert_eq!(strategy.instance_name(), &SelfLearningStrategy::strategy_name());

        let versioned = SelfLearningStrategy::strategy_name();
        assert!(SelfLearningStrategy::new(&versioned).is_ok());
    }

    #[test]
    fn instantiation_rejects_foreign_version_and_parameters() {
        let old = Name::from_uri("/localhost/nfd/strategy/self-learning").append_version(1);
        assert!(SelfLearningStrategy::new(&old).is_err());

        let mut with_params = SelfLearningStrategy::strategy_name();
        with_params.push(rust_slndn_common::ndn::NameComponent::new(&b"x"[..]));
        assert!(SelfLearningStrategy::new(&with_params).is_err());
    }

    #[test]
    fn registry_resolves_by_versionless_prefix() {
        let registry = crate::strategy::default_registry();
        assert!(registry
            .create(&Name::from_uri("/localhost/nfd/strategy/self-learning"))
            .is_ok());
        assert!(registry.create(&SelfLearningStrategy::strategy_name()).is_ok());
        assert!(registry
            .create(&Name::from_uri("/localhost/nfd/strategy/best-route"))
            .is_err());
    }
}
