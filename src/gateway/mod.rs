//! Peer network integration.
//!
//! The gateway owns the peer-to-peer connections: it downloads merkle blocks, verifies the
//! proofs, and hands verified results to the orchestrator as `GatewayEvent`s. This crate only
//! defines the contract plus an offline stand-in for watch-only use.

/// Gateway that never reaches the network
mod offline;
/// Gateway contract, events and errors
mod types;

pub use offline::{OfflineGateway, OfflineGatewayFactory};
pub use types::*;
