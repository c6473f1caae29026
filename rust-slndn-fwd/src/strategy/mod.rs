//! Forwarding strategies.
//!
//! A strategy is selected by Name; instance names may carry a version
//! component (`v=N`) and, for some strategies, parameters after it. The
//! registry maps the versionless strategy prefix to a constructor and
//! rejects instance names the strategy cannot accept.

pub mod nexthop;
pub mod retx_suppression;
pub mod self_learning;

mod tests;

pub use self_learning::SelfLearningStrategy;

use rust_slndn_common::ndn::Name;
use rust_slndn_common::Error;
use std::collections::BTreeMap;

/// An instance name split into strategy prefix, version, and parameters.
#[derive(Debug, Clone)]
pub struct ParsedInstanceName {
    /// Up to and including the version component, when present.
    pub prefix: Name,
    pub version: Option<u64>,
    /// Components after the version.
    pub parameters: Name,
}

/// Split `input` at its first version component.
pub fn parse_instance_name(input: &Name) -> ParsedInstanceName {
    for (i, component) in input.components().enumerate() {
        if let Some(version) = component.to_version() {
            let mut parameters = Name::new();
            for c in input.components().skip(i + 1) {
                parameters.push(c.clone());
            }
            return ParsedInstanceName {
                prefix: input.prefix(i + 1),
                version: Some(version),
                parameters,
            };
        }
    }
    ParsedInstanceName {
        prefix: input.clone(),
        version: None,
        parameters: Name::new(),
    }
}

pub type StrategyCtor = fn(&Name) -> Result<SelfLearningStrategy, Error>;

/// Registered strategies, keyed by versionless prefix.
#[derive(Default)]
pub struct StrategyRegistry {
    strategies: BTreeMap<Name, StrategyCtor>,
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, strategy_name: &Name, ctor: StrategyCtor) {
        self.strategies.insert(versionless(strategy_name), ctor);
    }

    /// Instantiate the strategy `instance` names.
    pub fn create(&self, instance: &Name) -> Result<SelfLearningStrategy, Error> {
        match self.strategies.get(&versionless(instance)) {
            Some(ctor) => ctor(instance),
            None => Err(Error::StrategyInstantiation(format!(
                "unknown strategy {instance}"
            ))),
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &Name> {
        self.strategies.keys()
    }
}

fn versionless(name: &Name) -> Name {
    let parsed = parse_instance_name(name);
    match parsed.version {
        Some(_) => parsed.prefix.prefix(parsed.prefix.len() - 1),
        None => parsed.prefix,
    }
}

/// The registry with every built-in strategy registered.
pub fn default_registry() -> StrategyRegistry {
    let mut registry = StrategyRegistry::new();
    registry.register(&SelfLearningStrategy::strategy_name(), SelfLearningStrategy::new);
    registry
}
