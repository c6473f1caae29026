//! Error types for the self-learning forwarder.

use thiserror::Error;

/// All possible errors that can occur within the forwarder libraries.
#[derive(Error, Debug)]
pub enum Error {
    /// Error related to TLV encoding/decoding.
    #[error("TLV error: {0}")]
    Tlv(String),

    /// Error related to NDN packet processing.
    #[error("NDN packet error: {0}")]
    Packet(String),

    /// Rejected strategy instance name (parameters or unsupported version).
    #[error("strategy instantiation error: {0}")]
    StrategyInstantiation(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
