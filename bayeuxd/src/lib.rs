//! Reliability and clustering core of a Bayeux publish/subscribe server.
//!
//! - [`extension`] — The extension pipeline plus the `ack` (reconnect-safe
//!   redelivery) and `timesync` (clock offset estimation) extensions.
//! - [`cluster`] — Fan-out of published packets to the other nodes of a
//!   cluster over a message broker.
//! - [`protocol`] — Channels, messages and packets.
//! - [`session`] — The session capability, a local session, and the
//!   read-only proxy for sessions living on other nodes.
//! - [`server`] — The local dispatch capability the backbone delivers into.
//!
//! Transports, subscription routing and handshake negotiation live outside
//! this crate. The crate logs through `tracing` and never installs a
//! subscriber.

pub mod cluster;
pub mod config;
pub mod error;
pub mod extension;
pub mod protocol;
pub mod server;
pub mod session;

pub use cluster::{BackboneConnectionConfig, BrokerBackbone, PacketCodec, ServerBackbone};
pub use config::Config;
pub use error::{
    BackboneError, BrokerError, ChannelError, CodecError, ConfigError, ExtensionError,
    ServerError, SessionError,
};
pub use extension::{AckExtension, Extension, ExtensionPipeline, TimesyncExtension};
pub use protocol::{ChannelId, ChannelIdCache, Message, Packet};
pub use server::{Server, Transport};
pub use session::{LocalSession, RemoteSession, Session};
