use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::error::SessionError;
use crate::extension::Extension;
use crate::protocol::Packet;
use crate::server::Transport;
use crate::session::{ExtensionStates, Session, SessionListener};

/// Read-only stand-in for a session that lives on another cluster node.
///
/// It exists so that packets arriving over the backbone carry a valid sender
/// for local routing. It reports a live, handshaken session, takes its
/// timings from the local configuration of the named transport, and refuses
/// every mutation with [`SessionError::Unsupported`].
#[derive(Debug, Clone)]
pub struct RemoteSession {
    id: String,
    transport: Transport,
}

impl RemoteSession {
    pub fn new(id: impl Into<String>, transport: Transport) -> Self {
        RemoteSession {
            id: id.into(),
            transport,
        }
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }
}

impl Session for RemoteSession {
    fn id(&self) -> &str {
        &self.id
    }

    fn transport_name(&self) -> &str {
        self.transport.name()
    }

    fn user_agent(&self) -> Option<&str> {
        None
    }

    fn is_local(&self) -> bool {
        false
    }

    fn is_handshook(&self) -> bool {
        true
    }

    fn is_connected(&self) -> bool {
        true
    }

    fn timeout(&self) -> Duration {
        self.transport.timeout()
    }

    fn interval(&self) -> Duration {
        self.transport.interval()
    }

    fn max_interval(&self) -> Duration {
        self.transport.max_interval()
    }

    fn is_long_polling(&self) -> bool {
        false
    }

    fn is_meta_connect_delivery_only(&self) -> bool {
        false
    }

    fn is_broadcast_to_publisher(&self) -> bool {
        false
    }

    fn attribute(&self, _name: &str) -> Option<Value> {
        None
    }

    fn attribute_names(&self) -> Vec<String> {
        Vec::new()
    }

    fn set_handshook(&self, _handshook: bool) -> Result<(), SessionError> {
        Err(SessionError::unsupported("set_handshook"))
    }

    fn set_connected(&self, _connected: bool) -> Result<(), SessionError> {
        Err(SessionError::unsupported("set_connected"))
    }

    fn set_timeout(&self, _timeout: Duration) -> Result<(), SessionError> {
        Err(SessionError::unsupported("set_timeout"))
    }

    fn set_interval(&self, _interval: Duration) -> Result<(), SessionError> {
        Err(SessionError::unsupported("set_interval"))
    }

    fn set_max_interval(&self, _max_interval: Duration) -> Result<(), SessionError> {
        Err(SessionError::unsupported("set_max_interval"))
    }

    fn set_long_polling(&self, _long_polling: bool) -> Result<(), SessionError> {
        Err(SessionError::unsupported("set_long_polling"))
    }

    fn set_meta_connect_delivery_only(&self, _only: bool) -> Result<(), SessionError> {
        Err(SessionError::unsupported("set_meta_connect_delivery_only"))
    }

    fn set_broadcast_to_publisher(&self, _broadcast: bool) -> Result<(), SessionError> {
        Err(SessionError::unsupported("set_broadcast_to_publisher"))
    }

    fn set_attribute(&self, _name: &str, _value: Value) -> Result<Option<Value>, SessionError> {
        Err(SessionError::unsupported("set_attribute"))
    }

    fn remove_attribute(&self, _name: &str) -> Result<Option<Value>, SessionError> {
        Err(SessionError::unsupported("remove_attribute"))
    }

    fn extension_states(&self) -> Result<&ExtensionStates, SessionError> {
        Err(SessionError::unsupported("extension_states"))
    }

    fn extensions(&self) -> Vec<Arc<dyn Extension>> {
        Vec::new()
    }

    fn add_extension(&self, _extension: Arc<dyn Extension>) -> Result<(), SessionError> {
        Err(SessionError::unsupported("add_extension"))
    }

    fn remove_extension(&self, _name: &str) -> Result<(), SessionError> {
        Err(SessionError::unsupported("remove_extension"))
    }

    fn add_listener(&self, _listener: Arc<dyn SessionListener>) -> Result<(), SessionError> {
        Err(SessionError::unsupported("add_listener"))
    }

    fn start_batch(&self) -> Result<(), SessionError> {
        Err(SessionError::unsupported("start_batch"))
    }

    fn end_batch(&self) -> Result<bool, SessionError> {
        Err(SessionError::unsupported("end_batch"))
    }

    fn send(&self, _packet: Packet) -> Result<(), SessionError> {
        Err(SessionError::unsupported("send"))
    }

    fn poll(&self) -> Result<Vec<Packet>, SessionError> {
        Err(SessionError::unsupported("poll"))
    }

    fn disconnect(&self) -> Result<(), SessionError> {
        Err(SessionError::unsupported("disconnect"))
    }
}
