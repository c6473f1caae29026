//! Routing Information Base.
//!
//! The RIB owns long-lived routes and the prefix announcements backing them.
//! It runs on the rib executor; the `sl_*` operations are what the
//! self-learning strategy posts over. FIB side effects are applied by tasks
//! posted back to the main executor.

use crate::executor::Executors;
use crate::face::FaceId;
use log::{debug, info};
use rust_slndn_common::ndn::{Name, PrefixAnnouncement};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

/// Cost assigned to routes learned through prefix announcements.
const LEARNED_ROUTE_COST: u64 = 0;

/// Outcome of an `sl_announce` / `sl_renew` operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlAnnounceResult {
    New,
    Refreshed,
    Expired,
    NotFound,
    ValidationFailure,
}

impl fmt::Display for SlAnnounceResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::New => "New",
            Self::Refreshed => "Refreshed",
            Self::Expired => "Expired",
            Self::NotFound => "NotFound",
            Self::ValidationFailure => "ValidationFailure",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug)]
pub struct RibRoute {
    pub prefix: Name,
    pub face: FaceId,
    pub expiry: Instant,
}

/// The route and announcement store.
#[derive(Default)]
pub struct RibManager {
    routes: HashMap<(Name, FaceId), RibRoute>,
    announcements: HashMap<Name, PrefixAnnouncement>,
}

impl RibManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate `pa` and install or refresh the route it announces.
    ///
    /// The route lifetime is the announcement lifetime clamped by `lifetime`.
    /// The announcement itself is retained so later `sl_find_ann` calls can
    /// return it.
    pub fn sl_announce(
        &mut self,
        pa: &PrefixAnnouncement,
        face: FaceId,
        lifetime: Duration,
        now: Instant,
    ) -> SlAnnounceResult {
        if pa.signature.is_empty() || pa.expiration_ms == 0 {
            debug!("announcement for {} failed validation", pa.prefix);
            return SlAnnounceResult::ValidationFailure;
        }
        let effective = lifetime.min(Duration::from_millis(pa.expiration_ms));
        let expiry = now + effective;
        self.announcements.insert(pa.prefix.clone(), pa.clone());
        let key = (pa.prefix.clone(), face);
        match self.routes.get_mut(&key) {
            Some(route) => {
                route.expiry = expiry;
                SlAnnounceResult::Refreshed
            }
            None => {
                info!("route {} via face {} installed for {:?}", pa.prefix, face, effective);
                self.routes.insert(
                    key,
                    RibRoute {
                        prefix: pa.prefix.clone(),
                        face,
                        expiry,
                    },
                );
                SlAnnounceResult::New
            }
        }
    }

    /// Cap the lifetime of the route covering `name` via `face`.
    ///
    /// `max_lifetime == 0` expires the route immediately. Returns the
    /// affected prefix so the caller can mirror the change into the FIB.
    pub fn sl_renew(
        &mut self,
        name: &Name,
        face: FaceId,
        max_lifetime: Duration,
        now: Instant,
    ) -> (SlAnnounceResult, Option<Name>) {
        // Longest route prefix of `name` registered on this face.
        let prefix = self
            .routes
            .values()
            .filter(|r| r.face == face && r.prefix.is_prefix_of(name))
            .max_by_key(|r| r.prefix.len())
            .map(|r| r.prefix.clone());
        let Some(prefix) = prefix else {
            return (SlAnnounceResult::NotFound, None);
        };
        if max_lifetime.is_zero() {
            self.routes.remove(&(prefix.clone(), face));
            info!("route {prefix} via face {face} expired on request");
            return (SlAnnounceResult::Expired, Some(prefix));
        }
        if let Some(route) = self.routes.get_mut(&(prefix.clone(), face)) {
            route.expiry = route.expiry.min(now + max_lifetime);
        }
        (SlAnnounceResult::Refreshed, Some(prefix))
    }

    /// The stored announcement whose prefix covers `name`, longest first.
    pub fn sl_find_ann(&self, name: &Name) -> Option<PrefixAnnouncement> {
        self.announcements
            .values()
            .filter(|pa| pa.prefix.is_prefix_of(name))
            .max_by_key(|pa| pa.prefix.len())
            .cloned()
    }

    /// Register a locally produced announcement (producer applications).
    pub fn register_announcement(&mut self, pa: PrefixAnnouncement) {
        debug!("local announcement registered for {}", pa.prefix);
        self.announcements.insert(pa.prefix.clone(), pa);
    }

    /// Drop routes whose lifetime has passed; returns the removed routes.
    pub fn expire_routes(&mut self, now: Instant) -> Vec<(Name, FaceId)> {
        let expired: Vec<(Name, FaceId)> = self
            .routes
            .iter()
            .filter(|(_, r)| r.expiry <= now)
            .map(|(k, _)| k.clone())
            .collect();
        for key in &expired {
            self.routes.remove(key);
            info!("route {} via face {} expired", key.0, key.1);
        }
        expired
    }

    pub fn route(&self, prefix: &Name, face: FaceId) -> Option<&RibRoute> {
        self.routes.get(&(prefix.clone(), face))
    }

    pub fn route_count(&self) -> usize {
        self.routes.len()
    }
}

/// The rib executor's state: the manager plus the handle used to post FIB
/// updates back to the main executor.
pub struct RibService {
    manager: RibManager,
    executors: Executors,
}

impl RibService {
    pub fn new(executors: Executors) -> Self {
        Self {
            manager: RibManager::new(),
            executors,
        }
    }

    pub fn manager(&self) -> &RibManager {
        &self.manager
    }

    pub fn manager_mut(&mut self) -> &mut RibManager {
        &mut self.manager
    }

    pub fn executors(&self) -> &Executors {
        &self.executors
    }

    /// `sl_announce` plus the FIB installation on the main executor.
    pub fn sl_announce(
        &mut self,
        pa: &PrefixAnnouncement,
        face: FaceId,
        lifetime: Duration,
    ) -> SlAnnounceResult {
        let now = Instant::now();
        let result = self.manager.sl_announce(pa, face, lifetime, now);
        if matches!(result, SlAnnounceResult::New | SlAnnounceResult::Refreshed) {
            let prefix = pa.prefix.clone();
            self.executors.run_on_main(move |fw| {
                fw.fib.insert(prefix, face, LEARNED_ROUTE_COST);
                fw.metrics.fib_size.set(fw.fib.len() as u64);
            });
        }
        result
    }

    /// `sl_renew` plus the FIB removal on the main executor when the route
    /// is expired on request.
    pub fn sl_renew(&mut self, name: &Name, face: FaceId, max_lifetime: Duration) -> SlAnnounceResult {
        let now = Instant::now();
        let (result, prefix) = self.manager.sl_renew(name, face, max_lifetime, now);
        if let (SlAnnounceResult::Expired, Some(prefix)) = (result, prefix) {
            self.executors.run_on_main(move |fw| {
                fw.fib.remove_nexthop(&prefix, face);
                fw.metrics.fib_size.set(fw.fib.len() as u64);
            });
        }
        result
    }

    pub fn sl_find_ann(&self, name: &Name) -> Option<PrefixAnnouncement> {
        self.manager.sl_find_ann(name)
    }

    /// Run the rib executor: drain the task queue and age out routes.
    pub async fn run(mut self, mut tasks: tokio::sync::mpsc::UnboundedReceiver<crate::executor::RibTask>) {
        let mut sweep = tokio::time::interval(Duration::from_secs(1));
        loop {
            tokio::select! {
                maybe_task = tasks.recv() => match maybe_task {
                    Some(task) => task(&mut self),
                    None => break,
                },
                _ = sweep.tick() => {
                    for (prefix, face) in self.manager.expire_routes(Instant::now()) {
                        self.executors.run_on_main(move |fw| {
                            fw.fib.remove_nexthop(&prefix, face);
                            fw.metrics.fib_size.set(fw.fib.len() as u64);
                        });
                    }
                }
            }
        }
    }
}
