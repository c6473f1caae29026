//! End-to-end tests for the self-learning strategy.
//!
//! Each test drives the forwarding pipeline directly and pumps the two
//! executor queues by hand, so cross-executor ordering is deterministic.

#[cfg(test)]
mod tests {
    use crate::channel::Channel;
    use crate::face::{EndpointId, LinkType, Persistency, Scope};
    use crate::packet::Packet;
    use crate::testutil::{drain, TestBed, TestChannel};
    use rust_slndn_common::ndn::{Data, Interest, Nack, NackReason, Name, PrefixAnnouncement};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::{advance, Instant};

    fn interest(name: &str, nonce: u32) -> Interest {
        let mut i = Interest::new(Name::from_uri(name)).with_nonce(nonce);
        i.must_be_fresh = true;
        i
    }

    fn pa(prefix: &str) -> PrefixAnnouncement {
        PrefixAnnouncement::new(Name::from_uri(prefix), 600_000, vec![7u8; 16])
    }

    /// Producer Data that never satisfies from cache (zero freshness), so
    /// repeat Interests exercise the forwarding path.
    fn data(name: &str) -> Data {
        let mut d = Data::new(Name::from_uri(name), "payload");
        d.freshness_period_ms = 0;
        d
    }

    fn as_interest(packet: &Packet) -> &Interest {
        match packet {
            Packet::Interest(i) => i,
            other => panic!("expected Interest, got {other:?}"),
        }
    }

    fn as_data(packet: &Packet) -> &Data {
        match packet {
            Packet::Data(d) => d,
            other => panic!("expected Data, got {other:?}"),
        }
    }

    fn as_nack(packet: &Packet) -> &Nack {
        match packet {
            Packet::Nack(n) => n,
            other => panic!("expected Nack, got {other:?}"),
        }
    }

    /* ------------------------------------------------------------ *
     * Discovery and route learning
     * ------------------------------------------------------------ */

    #[tokio::test(start_paused = true)]
    async fn zero_config_discovery_learns_route() {
        let mut bed = TestBed::new();
        let (a, mut a_rx) = bed.add_face(Scope::Local, LinkType::PointToPoint);
        let (b, mut b_rx) = bed.add_face(Scope::NonLocal, LinkType::PointToPoint);
        let (_d, mut d_rx) = bed.add_face(Scope::NonLocal, LinkType::PointToPoint);

        // Empty FIB: the Interest floods to every non-local face.
        bed.interest(&a, interest("/x", 1));
        let to_b = drain(&mut b_rx);
        let to_d = drain(&mut d_rx);
        assert_eq!(to_b.len(), 1);
        assert_eq!(to_d.len(), 1);
        assert!(!as_interest(&to_b[0]).non_discovery);
        assert!(!as_interest(&to_d[0]).non_discovery);
        assert!(drain(&mut a_rx).is_empty());

        // The producer behind B answers with an announcement.
        bed.data(&b, data("/x").with_prefix_ann(pa("/x")));
        let to_a = drain(&mut a_rx);
        assert_eq!(to_a.len(), 1);
        assert_eq!(as_data(&to_a[0]).name, Name::from_uri("/x"));
        bed.pump();

        // Exactly one announcement reached the rib and became a FIB route.
        assert_eq!(bed.fw.metrics.routes_announced.value(), 1);
        assert!(bed.rib.manager().route(&Name::from_uri("/x"), b.id()).is_some());
        let fib_entry = bed.fw.fib.lookup(&Name::from_uri("/x")).unwrap();
        assert_eq!(fib_entry.nexthops().len(), 1);
        assert_eq!(fib_entry.nexthops()[0].face, b.id());

        // The next Interest follows the learned route, non-discovery.
        bed.interest(&a, interest("/x", 2));
        let to_b = drain(&mut b_rx);
        assert_eq!(to_b.len(), 1);
        assert!(as_interest(&to_b[0]).non_discovery);
        assert!(drain(&mut d_rx).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn dead_end_recovery_refloods_at_consumer() {
        let mut bed = TestBed::new();
        let (a, mut a_rx) = bed.add_face(Scope::Local, LinkType::PointToPoint);
        let (b, mut b_rx) = bed.add_face(Scope::NonLocal, LinkType::PointToPoint);
        let (_d, mut d_rx) = bed.add_face(Scope::NonLocal, LinkType::PointToPoint);

        // Learn the route to B first.
        bed.interest(&a, interest("/x", 1));
        bed.data(&b, data("/x").with_prefix_ann(pa("/x")));
        bed.pump();
        drain(&mut a_rx);
        drain(&mut b_rx);
        drain(&mut d_rx);

        // Follow the route; B has lost it in the meantime.
        bed.interest(&a, interest("/x", 2));
        let to_b = drain(&mut b_rx);
        assert_eq!(to_b.len(), 1);
        assert!(as_interest(&to_b[0]).non_discovery);

        bed.nack(&b, Nack::new(NackReason::NoRoute, as_interest(&to_b[0]).clone()));

        // This node is the consumer's first hop: the tag is cleared and the
        // discovery Interest floods again, including toward B.
        let to_b = drain(&mut b_rx);
        let to_d = drain(&mut d_rx);
        assert_eq!(to_b.len(), 1);
        assert_eq!(to_d.len(), 1);
        assert!(!as_interest(&to_b[0]).non_discovery);
        assert!(!as_interest(&to_d[0]).non_discovery);
        assert!(drain(&mut a_rx).is_empty());

        // The dead route was expired through the rib before anything else.
        bed.pump();
        assert_eq!(bed.fw.metrics.routes_renewed.value(), 1);
        assert_eq!(bed.rib.manager().route_count(), 0);
        assert!(bed.fw.fib.lookup(&Name::from_uri("/x")).is_none());
    }

    /* ------------------------------------------------------------ *
     * Suppression and retries
     * ------------------------------------------------------------ */

    #[tokio::test(start_paused = true)]
    async fn retransmission_within_window_is_suppressed() {
        let mut bed = TestBed::new();
        let (a, _a_rx) = bed.add_face(Scope::Local, LinkType::PointToPoint);
        let (_b, mut b_rx) = bed.add_face(Scope::NonLocal, LinkType::PointToPoint);

        bed.interest(&a, interest("/y", 1));
        assert_eq!(drain(&mut b_rx).len(), 1);

        advance(Duration::from_millis(5)).await;
        bed.interest(&a, interest("/y", 2));
        assert!(drain(&mut b_rx).is_empty());
        assert_eq!(bed.fw.metrics.interests_suppressed.value(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn round_robin_retry_after_all_nexthops_tried() {
        let mut bed = TestBed::new();
        let (a, _a_rx) = bed.add_face(Scope::Local, LinkType::PointToPoint);
        let (b, mut b_rx) = bed.add_face(Scope::NonLocal, LinkType::PointToPoint);
        let (d, mut d_rx) = bed.add_face(Scope::NonLocal, LinkType::PointToPoint);
        bed.fw.fib.insert(Name::from_uri("/z"), b.id(), 1);
        bed.fw.fib.insert(Name::from_uri("/z"), d.id(), 2);

        // First Interest takes the lowest-cost nexthop, tagged.
        bed.interest(&a, interest("/z", 1));
        let to_b = drain(&mut b_rx);
        assert_eq!(to_b.len(), 1);
        assert!(as_interest(&to_b[0]).non_discovery);
        assert!(drain(&mut d_rx).is_empty());

        // Retransmission goes to the untried nexthop.
        advance(Duration::from_millis(20)).await;
        bed.interest(&a, interest("/z", 2));
        let to_d = drain(&mut d_rx);
        assert_eq!(to_d.len(), 1);
        assert!(as_interest(&to_d[0]).non_discovery);
        assert!(drain(&mut b_rx).is_empty());

        // Third round: everything tried, round-robin back to the earliest
        // used nexthop, without touching the tag.
        advance(Duration::from_millis(40)).await;
        bed.interest(&a, interest("/z", 3));
        let to_b = drain(&mut b_rx);
        assert_eq!(to_b.len(), 1);
        assert!(!as_interest(&to_b[0]).non_discovery);
        assert!(drain(&mut d_rx).is_empty());
    }

    /* ------------------------------------------------------------ *
     * Broadcast rules
     * ------------------------------------------------------------ */

    #[tokio::test(start_paused = true)]
    async fn broadcast_excludes_ingress_and_local_but_not_ad_hoc() {
        let mut bed = TestBed::new();
        let (_a, mut a_rx) = bed.add_face(Scope::Local, LinkType::PointToPoint);
        let (_b, mut b_rx) = bed.add_face(Scope::NonLocal, LinkType::PointToPoint);
        let (h, mut h_rx) = bed.add_face(Scope::NonLocal, LinkType::AdHoc);
        let (_m, mut m_rx) = bed.add_face(Scope::NonLocal, LinkType::MultiAccess);

        // Discovery Interest arriving on the ad-hoc face: the broadcast may
        // legitimately go back out the same face.
        bed.interest(&h, interest("/b", 1));
        assert_eq!(drain(&mut b_rx).len(), 1);
        assert_eq!(drain(&mut m_rx).len(), 1);
        assert_eq!(drain(&mut h_rx).len(), 1);
        assert!(drain(&mut a_rx).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn localhost_names_never_leave_the_node() {
        let mut bed = TestBed::new();
        let (a, _a_rx) = bed.add_face(Scope::Local, LinkType::PointToPoint);
        let (b, mut b_rx) = bed.add_face(Scope::NonLocal, LinkType::PointToPoint);

        // From a local face the Interest stays; the broadcast skips B.
        bed.interest(&a, interest("/localhost/nfd/status", 1));
        assert!(drain(&mut b_rx).is_empty());

        // From a non-local face it is dropped before reaching the PIT.
        bed.interest(&b, interest("/localhost/nfd/status", 2));
        assert_eq!(bed.fw.metrics.interests_dropped.value(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn non_discovery_interest_without_route_is_nacked() {
        let mut bed = TestBed::new();
        let (c, mut c_rx) = bed.add_face(Scope::NonLocal, LinkType::PointToPoint);
        let (_b, mut b_rx) = bed.add_face(Scope::NonLocal, LinkType::PointToPoint);

        let routed = interest("/nowhere", 1).with_non_discovery(true);
        bed.interest(&c, routed);

        let to_c = drain(&mut c_rx);
        assert_eq!(to_c.len(), 1);
        assert_eq!(as_nack(&to_c[0]).reason, NackReason::NoRoute);
        // No flooding for routed Interests.
        assert!(drain(&mut b_rx).is_empty());
        assert!(bed.fw.pit.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn duplicate_nonce_from_another_face_is_nacked() {
        let mut bed = TestBed::new();
        let (a, _a_rx) = bed.add_face(Scope::Local, LinkType::PointToPoint);
        let (b, mut b_rx) = bed.add_face(Scope::NonLocal, LinkType::PointToPoint);
        let (c, mut c_rx) = bed.add_face(Scope::NonLocal, LinkType::PointToPoint);

        bed.interest(&a, interest("/loop", 42));
        drain(&mut b_rx);
        drain(&mut c_rx);

        bed.interest(&c, interest("/loop", 42));
        let to_c = drain(&mut c_rx);
        assert_eq!(to_c.len(), 1);
        assert_eq!(as_nack(&to_c[0]).reason, NackReason::Duplicate);
    }

    /* ------------------------------------------------------------ *
     * Multi-access promotion
     * ------------------------------------------------------------ */

    #[tokio::test(start_paused = true)]
    async fn multi_access_data_promotes_unicast_face() {
        let mut bed = TestBed::new();
        let (a, mut a_rx) = bed.add_face(Scope::Local, LinkType::PointToPoint);
        let (m, mut m_rx) = bed.add_face(Scope::NonLocal, LinkType::MultiAccess);
        let channel = TestChannel::new(bed.executors.clone(), false);
        let as_channel: Arc<dyn Channel> = channel.clone();
        m.set_channel(&as_channel);

        bed.interest(&a, interest("/m", 1));
        assert_eq!(drain(&mut m_rx).len(), 1);

        let peer = EndpointId::Ethernet([0x02, 0xaa, 0xbb, 0xcc, 0xdd, 0xee]);
        bed.data_from(&m, peer.clone(), data("/m").with_prefix_ann(pa("/m")));

        // The connect is in flight; the entry survives it and no Data has
        // left yet.
        assert_eq!(channel.connect_count(), 1);
        assert_eq!(channel.connects.lock().unwrap()[0], peer);
        assert_eq!(bed.fw.pit.len(), 1);
        assert!(drain(&mut a_rx).is_empty());

        bed.pump();

        // A unicast on-demand face to the peer exists and carries the route.
        let created = channel.take_created();
        assert_eq!(created.len(), 1);
        let unicast = &created[0].0;
        assert_ne!(unicast.id(), 0);
        assert_eq!(unicast.persistency(), Persistency::OnDemand);
        assert!(bed.rib.manager().route(&Name::from_uri("/m"), unicast.id()).is_some());
        assert!(bed.rib.manager().route(&Name::from_uri("/m"), m.id()).is_none());
        let fib_entry = bed.fw.fib.lookup(&Name::from_uri("/m")).unwrap();
        assert_eq!(fib_entry.nexthops().len(), 1);
        assert_eq!(fib_entry.nexthops()[0].face, unicast.id());

        // The Data reached the consumer and the entry is gone.
        let to_a = drain(&mut a_rx);
        assert_eq!(to_a.len(), 1);
        assert_eq!(as_data(&to_a[0]).name, Name::from_uri("/m"));
        assert!(bed.fw.pit.is_empty());
        assert_eq!(bed.fw.metrics.faces_promoted.value(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_promotion_still_forwards_data() {
        let mut bed = TestBed::new();
        let (a, mut a_rx) = bed.add_face(Scope::Local, LinkType::PointToPoint);
        let (m, mut m_rx) = bed.add_face(Scope::NonLocal, LinkType::MultiAccess);
        let channel = TestChannel::new(bed.executors.clone(), true);
        let as_channel: Arc<dyn Channel> = channel.clone();
        m.set_channel(&as_channel);

        bed.interest(&a, interest("/m", 1));
        drain(&mut m_rx);
        bed.data_from(
            &m,
            EndpointId::Ethernet([0x02, 0, 0, 0, 0, 1]),
            data("/m").with_prefix_ann(pa("/m")),
        );
        bed.pump();

        // No face, no route; the Data still reaches the consumer.
        assert_eq!(bed.fw.faces.len(), 2);
        assert_eq!(bed.rib.manager().route_count(), 0);
        assert!(bed.fw.fib.lookup(&Name::from_uri("/m")).is_none());
        assert_eq!(drain(&mut a_rx).len(), 1);
        assert!(bed.fw.pit.is_empty());
    }

    /* ------------------------------------------------------------ *
     * Announcement attachment
     * ------------------------------------------------------------ */

    /// An intermediate node with a remote discovery downstream attaches the
    /// announcement found in the rib before forwarding the Data.
    #[tokio::test(start_paused = true)]
    async fn intermediate_node_attaches_announcement() {
        let mut bed = TestBed::new();
        let (c, mut c_rx) = bed.add_face(Scope::NonLocal, LinkType::PointToPoint);
        let (b, mut b_rx) = bed.add_face(Scope::NonLocal, LinkType::PointToPoint);
        bed.fw.fib.insert(Name::from_uri("/s"), b.id(), 1);
        bed.rib.manager_mut().register_announcement(pa("/s"));

        // Discovery Interest from a remote downstream follows the route.
        bed.interest(&c, interest("/s/1", 1));
        let to_b = drain(&mut b_rx);
        assert_eq!(to_b.len(), 1);
        assert!(as_interest(&to_b[0]).non_discovery);

        // The Data needs an announcement; forwarding waits for the rib.
        bed.data(&b, data("/s/1"));
        assert!(drain(&mut c_rx).is_empty());
        bed.pump();

        let to_c = drain(&mut c_rx);
        assert_eq!(to_c.len(), 1);
        let attached = as_data(&to_c[0]).prefix_ann.as_ref().unwrap();
        assert_eq!(attached.prefix, Name::from_uri("/s"));
        assert!(bed.fw.pit.is_empty());
    }

    /// If the entry disappears while the rib lookup is in flight, the
    /// continuation detects the dangling weak handle and does nothing.
    #[tokio::test(start_paused = true)]
    async fn stale_continuation_is_a_no_op() {
        let mut bed = TestBed::new();
        let (c, mut c_rx) = bed.add_face(Scope::NonLocal, LinkType::PointToPoint);
        let (b, mut b_rx) = bed.add_face(Scope::NonLocal, LinkType::PointToPoint);
        bed.fw.fib.insert(Name::from_uri("/s"), b.id(), 1);
        bed.rib.manager_mut().register_announcement(pa("/s"));

        bed.interest(&c, interest("/s/1", 1));
        drain(&mut b_rx);
        bed.data(&b, data("/s/1"));

        // The entry goes away before the rib answers.
        let entry = bed.fw.pit.find_exact(&Name::from_uri("/s/1")).unwrap();
        bed.fw.set_expiry_timer(&entry, Duration::ZERO);
        drop(entry);

        bed.pump();
        assert!(drain(&mut c_rx).is_empty());
        assert!(bed.fw.pit.is_empty());
    }

    /// A purely local downstream does not need an announcement; the Data is
    /// forwarded synchronously.
    #[tokio::test(start_paused = true)]
    async fn local_downstream_skips_announcement_lookup() {
        let mut bed = TestBed::new();
        let (a, mut a_rx) = bed.add_face(Scope::Local, LinkType::PointToPoint);
        let (b, mut b_rx) = bed.add_face(Scope::NonLocal, LinkType::PointToPoint);
        bed.fw.fib.insert(Name::from_uri("/d"), b.id(), 1);

        bed.interest(&a, interest("/d", 1));
        drain(&mut b_rx);
        bed.data(&b, data("/d"));

        // Delivered without pumping the executors.
        let to_a = drain(&mut a_rx);
        assert_eq!(to_a.len(), 1);
        assert!(as_data(&to_a[0]).prefix_ann.is_none());
    }

    /* ------------------------------------------------------------ *
     * Content store hits
     * ------------------------------------------------------------ */

    #[tokio::test(start_paused = true)]
    async fn cs_hit_for_local_consumer_answers_directly() {
        let mut bed = TestBed::new();
        let (a, mut a_rx) = bed.add_face(Scope::Local, LinkType::PointToPoint);
        bed.fw.cs.insert(Data::new(Name::from_uri("/c"), "v"), Instant::now());

        let mut plain = interest("/c", 1);
        plain.must_be_fresh = false;
        bed.interest(&a, plain);

        let to_a = drain(&mut a_rx);
        assert_eq!(to_a.len(), 1);
        assert_eq!(as_data(&to_a[0]).name, Name::from_uri("/c"));
        assert_eq!(bed.fw.metrics.cs_hits.value(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cs_hit_for_remote_discovery_attaches_announcement() {
        let mut bed = TestBed::new();
        let (b, mut b_rx) = bed.add_face(Scope::NonLocal, LinkType::PointToPoint);
        bed.fw.cs.insert(Data::new(Name::from_uri("/c/1"), "v"), Instant::now());
        bed.rib.manager_mut().register_announcement(pa("/c"));

        let mut discovery = interest("/c/1", 1);
        discovery.must_be_fresh = false;
        bed.interest(&b, discovery);

        // Nothing leaves until the rib answered.
        assert!(drain(&mut b_rx).is_empty());
        bed.pump();
        let to_b = drain(&mut b_rx);
        assert_eq!(to_b.len(), 1);
        assert!(as_data(&to_b[0]).prefix_ann.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn cs_hit_for_remote_non_discovery_answers_directly() {
        let mut bed = TestBed::new();
        let (b, mut b_rx) = bed.add_face(Scope::NonLocal, LinkType::PointToPoint);
        bed.fw.cs.insert(Data::new(Name::from_uri("/c/1"), "v"), Instant::now());

        let mut routed = interest("/c/1", 1).with_non_discovery(true);
        routed.must_be_fresh = false;
        bed.interest(&b, routed);

        let to_b = drain(&mut b_rx);
        assert_eq!(to_b.len(), 1);
        assert!(as_data(&to_b[0]).prefix_ann.is_none());
    }

    /* ------------------------------------------------------------ *
     * Default Nack processing and unsolicited Data
     * ------------------------------------------------------------ */

    #[tokio::test(start_paused = true)]
    async fn non_no_route_nack_propagates_downstream() {
        let mut bed = TestBed::new();
        let (a, mut a_rx) = bed.add_face(Scope::Local, LinkType::PointToPoint);
        let (b, mut b_rx) = bed.add_face(Scope::NonLocal, LinkType::PointToPoint);
        bed.fw.fib.insert(Name::from_uri("/n"), b.id(), 1);

        bed.interest(&a, interest("/n", 1));
        let sent = drain(&mut b_rx);
        assert_eq!(sent.len(), 1);

        bed.nack(&b, Nack::new(NackReason::Congestion, as_interest(&sent[0]).clone()));
        let to_a = drain(&mut a_rx);
        assert_eq!(to_a.len(), 1);
        assert_eq!(as_nack(&to_a[0]).reason, NackReason::Congestion);
        // The route stays; congestion is not a routing failure.
        assert!(bed.fw.fib.lookup(&Name::from_uri("/n")).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn unsolicited_data_is_dropped() {
        let mut bed = TestBed::new();
        let (b, _b_rx) = bed.add_face(Scope::NonLocal, LinkType::PointToPoint);

        bed.data(&b, data("/nobody/asked"));
        assert_eq!(bed.fw.metrics.data_unsolicited.value(), 1);
        assert!(bed.fw.cs.is_empty());
    }

    /// Data arriving on a face the Interest was never sent to is ignored
    /// even when a PIT entry exists.
    #[tokio::test(start_paused = true)]
    async fn data_without_out_record_is_ignored() {
        let mut bed = TestBed::new();
        let (a, mut a_rx) = bed.add_face(Scope::Local, LinkType::PointToPoint);
        let (b, mut b_rx) = bed.add_face(Scope::NonLocal, LinkType::PointToPoint);
        let (c, _c_rx) = bed.add_face(Scope::NonLocal, LinkType::PointToPoint);
        bed.fw.fib.insert(Name::from_uri("/w"), b.id(), 1);

        bed.interest(&a, interest("/w", 1));
        drain(&mut b_rx);

        // C never got the Interest; its Data is not forwarded downstream.
        bed.data(&c, data("/w"));
        assert!(drain(&mut a_rx).is_empty());
    }
}
