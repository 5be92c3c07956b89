//! Sessions as seen by extensions and the cluster layer.
//!
//! The [`Session`] trait is the narrow capability the rest of the server
//! exposes to this crate. [`LocalSession`] is a plain in-process
//! implementation; [`RemoteSession`] stands in for a session that lives on
//! another cluster node and refuses every mutation.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::error::SessionError;
use crate::extension::Extension;
use crate::protocol::Packet;

mod local;
mod remote;
mod state;

pub use local::LocalSession;
pub use remote::RemoteSession;
pub use state::ExtensionStates;

/// Callback for session lifecycle events.
pub trait SessionListener: Send + Sync {
    fn on_disconnect(&self, session: &dyn Session);
}

/// A client session known to this server.
///
/// Read accessors never fail. Mutators return [`SessionError`] so that
/// read-only stand-ins can refuse them loudly.
pub trait Session: Send + Sync {
    fn id(&self) -> &str;

    /// Name of the transport the session is connected through.
    fn transport_name(&self) -> &str;

    fn user_agent(&self) -> Option<&str>;

    fn is_local(&self) -> bool;

    fn is_handshook(&self) -> bool;

    fn is_connected(&self) -> bool;

    fn timeout(&self) -> Duration;

    fn interval(&self) -> Duration;

    fn max_interval(&self) -> Duration;

    fn is_long_polling(&self) -> bool;

    fn is_meta_connect_delivery_only(&self) -> bool;

    fn is_broadcast_to_publisher(&self) -> bool;

    fn attribute(&self, name: &str) -> Option<Value>;

    fn attribute_names(&self) -> Vec<String>;

    fn set_handshook(&self, handshook: bool) -> Result<(), SessionError>;

    fn set_connected(&self, connected: bool) -> Result<(), SessionError>;

    fn set_timeout(&self, timeout: Duration) -> Result<(), SessionError>;

    fn set_interval(&self, interval: Duration) -> Result<(), SessionError>;

    fn set_max_interval(&self, max_interval: Duration) -> Result<(), SessionError>;

    fn set_long_polling(&self, long_polling: bool) -> Result<(), SessionError>;

    fn set_meta_connect_delivery_only(&self, only: bool) -> Result<(), SessionError>;

    fn set_broadcast_to_publisher(&self, broadcast: bool) -> Result<(), SessionError>;

    /// Stores `value` under `name`, returning the previous value.
    fn set_attribute(&self, name: &str, value: Value) -> Result<Option<Value>, SessionError>;

    fn remove_attribute(&self, name: &str) -> Result<Option<Value>, SessionError>;

    /// Typed per-extension state owned by this session.
    fn extension_states(&self) -> Result<&ExtensionStates, SessionError>;

    /// Session-scoped extensions, run after the server-wide pipeline.
    fn extensions(&self) -> Vec<Arc<dyn Extension>>;

    fn add_extension(&self, extension: Arc<dyn Extension>) -> Result<(), SessionError>;

    /// Removes every session-scoped extension with the given name.
    fn remove_extension(&self, name: &str) -> Result<(), SessionError>;

    fn add_listener(&self, listener: Arc<dyn SessionListener>) -> Result<(), SessionError>;

    fn start_batch(&self) -> Result<(), SessionError>;

    /// Ends the current batch; `true` when the outermost batch closed.
    fn end_batch(&self) -> Result<bool, SessionError>;

    /// Queues a packet for delivery to the client.
    fn send(&self, packet: Packet) -> Result<(), SessionError>;

    /// Drains the packets queued for delivery.
    fn poll(&self) -> Result<Vec<Packet>, SessionError>;

    fn disconnect(&self) -> Result<(), SessionError>;
}
