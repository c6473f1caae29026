//! Nexthop selection and scope rules.
//!
//! Operates on the FIB entry's cost-ranked nexthop list. A nexthop is
//! eligible when it does not reflect the Interest back to its ingress face
//! (unless ad-hoc), does not violate scope, and, depending on the mode,
//! has no fresh out-record on the entry.

use crate::face::{Face, FaceTable, LinkType, Scope};
use crate::fib::NextHop;
use crate::pit::PitEntry;
use rust_slndn_common::ndn::{Interest, Name};
use std::sync::OnceLock;
use tokio::time::Instant;

/// Names under `/localhost` never leave the node.
pub fn localhost_prefix() -> &'static Name {
    static PREFIX: OnceLock<Name> = OnceLock::new();
    PREFIX.get_or_init(|| Name::from_uri("/localhost"))
}

/// Names under `/localhop` travel at most one hop.
pub fn localhop_prefix() -> &'static Name {
    static PREFIX: OnceLock<Name> = OnceLock::new();
    PREFIX.get_or_init(|| Name::from_uri("/localhop"))
}

/// Whether sending `interest` from `in_face` out of `out_face` would
/// violate the Interest's scope.
pub fn would_violate_scope(in_face: &Face, interest: &Interest, out_face: &Face) -> bool {
    if out_face.scope() == Scope::Local {
        // Forwarding to a local face never leaves the node.
        return false;
    }
    if localhost_prefix().is_prefix_of(&interest.name) {
        return true;
    }
    if localhop_prefix().is_prefix_of(&interest.name) {
        return in_face.scope() != Scope::Local;
    }
    false
}

/// Whether `nexthop` may carry `interest` for `entry`.
///
/// With `want_unused`, an out-record on the nexthop face disqualifies it
/// until the record goes stale (its last send is older than the Interest
/// lifetime); without, out-records are ignored.
pub fn is_eligible(
    in_face: &Face,
    interest: &Interest,
    nexthop: NextHop,
    faces: &FaceTable,
    entry: &PitEntry,
    want_unused: bool,
    now: Instant,
) -> bool {
    let Some(out_face) = faces.get(nexthop.face) else {
        return false;
    };
    // Do not forward back to the same face, unless it is ad-hoc.
    if out_face.id() == in_face.id() && out_face.link_type() != LinkType::AdHoc {
        return false;
    }
    if would_violate_scope(in_face, interest, out_face) {
        return false;
    }
    if want_unused {
        if let Some(record) = entry.out_record(nexthop.face) {
            if record.expiry > now {
                return false;
            }
        }
    }
    true
}

/// The lowest-cost eligible nexthop.
pub fn find_first_eligible(
    in_face: &Face,
    interest: &Interest,
    nexthops: &[NextHop],
    faces: &FaceTable,
    entry: &PitEntry,
    want_unused: bool,
    now: Instant,
) -> Option<NextHop> {
    nexthops
        .iter()
        .copied()
        .find(|&nh| is_eligible(in_face, interest, nh, faces, entry, want_unused, now))
}

/// The eligible nexthop whose out-record was sent to the longest ago,
/// for round-robin retries once every nexthop has been tried. A nexthop
/// without an out-record counts as oldest.
pub fn find_eligible_with_earliest_out_record(
    in_face: &Face,
    interest: &Interest,
    nexthops: &[NextHop],
    faces: &FaceTable,
    entry: &PitEntry,
    now: Instant,
) -> Option<NextHop> {
    nexthops
        .iter()
        .copied()
        .filter(|&nh| is_eligible(in_face, interest, nh, faces, entry, false, now))
        .min_by_key(|nh| entry.out_record(nh.face).map(|r| r.last_sent))
}
