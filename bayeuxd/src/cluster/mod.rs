//! Multi-node cluster support for bayeuxd.
//!
//! Packets published on one node are fanned out to every other node through
//! a [`ServerBackbone`]. The broker-backed implementation publishes each
//! packet as one record on a shared topic and runs a pool of consumer workers
//! that decode incoming records and hand them to local dispatch.
//!
//! # Modules
//!
//! - [`backbone`] — The `ServerBackbone` contract.
//! - [`broker`] — Broker client abstraction, in-memory broker and Kafka clients.
//! - [`broker_backbone`] — Broker-backed backbone and its worker pool.
//! - [`codec`] — Binary record format for packets in transit.
//! - [`config`] — TOML-deserializable backbone configuration and resolved connection config.
//! - [`status`] — Start/stop lifecycle guard.

pub mod backbone;
pub mod broker;
pub mod broker_backbone;
pub mod codec;
pub mod config;
pub(crate) mod framing;
pub mod status;
mod worker;
mod worker_result;

pub use backbone::ServerBackbone;
pub use broker_backbone::BrokerBackbone;
pub use codec::PacketCodec;
pub use config::{BackboneConfig, BackboneConnectionConfig};
pub use status::ComponentStatus;
