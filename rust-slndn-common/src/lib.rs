//! Common types and utilities for the self-learning NDN forwarder.
//!
//! This crate provides the data model shared by the forwarding engine and the
//! command-line tools: names, packets and their link-layer tags, the TLV
//! codec, and the forwarder metrics counters.

pub mod error;
pub mod metrics;
pub mod ndn;
pub mod tlv;

/// Reexport of the common error type
pub use error::Error;
pub type Result<T> = std::result::Result<T, Error>;
