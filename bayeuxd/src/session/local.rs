use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde_json::Value;

use crate::error::SessionError;
use crate::extension::Extension;
use crate::protocol::Packet;
use crate::server::Transport;
use crate::session::{ExtensionStates, Session, SessionListener};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A session owned by this node.
///
/// Timings start from the transport's advice. Packets handed to
/// [`Session::send`] are queued until [`Session::poll`] drains them.
pub struct LocalSession {
    id: String,
    transport_name: String,
    user_agent: Option<String>,
    handshook: AtomicBool,
    connected: AtomicBool,
    long_polling: AtomicBool,
    meta_connect_delivery_only: AtomicBool,
    broadcast_to_publisher: AtomicBool,
    timeout_ms: AtomicU64,
    interval_ms: AtomicU64,
    max_interval_ms: AtomicU64,
    batch_depth: AtomicUsize,
    attributes: Mutex<HashMap<String, Value>>,
    states: ExtensionStates,
    extensions: Mutex<Vec<Arc<dyn Extension>>>,
    listeners: Mutex<Vec<Arc<dyn SessionListener>>>,
    queue: Mutex<VecDeque<Packet>>,
}

impl LocalSession {
    pub fn new(id: impl Into<String>, transport: &Transport) -> Self {
        LocalSession {
            id: id.into(),
            transport_name: transport.name().to_string(),
            user_agent: None,
            handshook: AtomicBool::new(false),
            connected: AtomicBool::new(false),
            long_polling: AtomicBool::new(false),
            meta_connect_delivery_only: AtomicBool::new(false),
            broadcast_to_publisher: AtomicBool::new(true),
            timeout_ms: AtomicU64::new(millis(transport.timeout())),
            interval_ms: AtomicU64::new(millis(transport.interval())),
            max_interval_ms: AtomicU64::new(millis(transport.max_interval())),
            batch_depth: AtomicUsize::new(0),
            attributes: Mutex::new(HashMap::new()),
            states: ExtensionStates::new(),
            extensions: Mutex::new(Vec::new()),
            listeners: Mutex::new(Vec::new()),
            queue: Mutex::new(VecDeque::new()),
        }
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn is_batching(&self) -> bool {
        self.batch_depth.load(Ordering::Acquire) > 0
    }

    pub fn queued(&self) -> usize {
        lock(&self.queue).len()
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

impl Session for LocalSession {
    fn id(&self) -> &str {
        &self.id
    }

    fn transport_name(&self) -> &str {
        &self.transport_name
    }

    fn user_agent(&self) -> Option<&str> {
        self.user_agent.as_deref()
    }

    fn is_local(&self) -> bool {
        true
    }

    fn is_handshook(&self) -> bool {
        self.handshook.load(Ordering::Acquire)
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.load(Ordering::Acquire))
    }

    fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.load(Ordering::Acquire))
    }

    fn max_interval(&self) -> Duration {
        Duration::from_millis(self.max_interval_ms.load(Ordering::Acquire))
    }

    fn is_long_polling(&self) -> bool {
        self.long_polling.load(Ordering::Acquire)
    }

    fn is_meta_connect_delivery_only(&self) -> bool {
        self.meta_connect_delivery_only.load(Ordering::Acquire)
    }

    fn is_broadcast_to_publisher(&self) -> bool {
        self.broadcast_to_publisher.load(Ordering::Acquire)
    }

    fn attribute(&self, name: &str) -> Option<Value> {
        lock(&self.attributes).get(name).cloned()
    }

    fn attribute_names(&self) -> Vec<String> {
        lock(&self.attributes).keys().cloned().collect()
    }

    fn set_handshook(&self, handshook: bool) -> Result<(), SessionError> {
        self.handshook.store(handshook, Ordering::Release);
        Ok(())
    }

    fn set_connected(&self, connected: bool) -> Result<(), SessionError> {
        self.connected.store(connected, Ordering::Release);
        Ok(())
    }

    fn set_timeout(&self, timeout: Duration) -> Result<(), SessionError> {
        self.timeout_ms.store(millis(timeout), Ordering::Release);
        Ok(())
    }

    fn set_interval(&self, interval: Duration) -> Result<(), SessionError> {
        self.interval_ms.store(millis(interval), Ordering::Release);
        Ok(())
    }

    fn set_max_interval(&self, max_interval: Duration) -> Result<(), SessionError> {
        self.max_interval_ms
            .store(millis(max_interval), Ordering::Release);
        Ok(())
    }

    fn set_long_polling(&self, long_polling: bool) -> Result<(), SessionError> {
        self.long_polling.store(long_polling, Ordering::Release);
        Ok(())
    }

    fn set_meta_connect_delivery_only(&self, only: bool) -> Result<(), SessionError> {
        self.meta_connect_delivery_only
            .store(only, Ordering::Release);
        Ok(())
    }

    fn set_broadcast_to_publisher(&self, broadcast: bool) -> Result<(), SessionError> {
        self.broadcast_to_publisher
            .store(broadcast, Ordering::Release);
        Ok(())
    }

    fn set_attribute(&self, name: &str, value: Value) -> Result<Option<Value>, SessionError> {
        Ok(lock(&self.attributes).insert(name.to_string(), value))
    }

    fn remove_attribute(&self, name: &str) -> Result<Option<Value>, SessionError> {
        Ok(lock(&self.attributes).remove(name))
    }

    fn extension_states(&self) -> Result<&ExtensionStates, SessionError> {
        Ok(&self.states)
    }

    fn extensions(&self) -> Vec<Arc<dyn Extension>> {
        lock(&self.extensions).clone()
    }

    fn add_extension(&self, extension: Arc<dyn Extension>) -> Result<(), SessionError> {
        lock(&self.extensions).push(extension);
        Ok(())
    }

    fn remove_extension(&self, name: &str) -> Result<(), SessionError> {
        lock(&self.extensions).retain(|extension| extension.name() != name);
        Ok(())
    }

    fn add_listener(&self, listener: Arc<dyn SessionListener>) -> Result<(), SessionError> {
        lock(&self.listeners).push(listener);
        Ok(())
    }

    fn start_batch(&self) -> Result<(), SessionError> {
        self.batch_depth.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    fn end_batch(&self) -> Result<bool, SessionError> {
        let previous = self
            .batch_depth
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |depth| {
                depth.checked_sub(1)
            })
            .unwrap_or(0);
        Ok(previous == 1)
    }

    fn send(&self, packet: Packet) -> Result<(), SessionError> {
        lock(&self.queue).push_back(packet);
        Ok(())
    }

    fn poll(&self) -> Result<Vec<Packet>, SessionError> {
        Ok(lock(&self.queue).drain(..).collect())
    }

    fn disconnect(&self) -> Result<(), SessionError> {
        self.connected.store(false, Ordering::Release);
        self.handshook.store(false, Ordering::Release);

        let listeners = lock(&self.listeners).clone();
        for listener in listeners {
            listener.on_disconnect(self);
        }
        Ok(())
    }
}

impl fmt::Debug for LocalSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalSession")
            .field("id", &self.id)
            .field("transport", &self.transport_name)
            .field("connected", &self.is_connected())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ChannelId;
    use serde_json::json;

    struct CountingListener(AtomicUsize);

    impl SessionListener for CountingListener {
        fn on_disconnect(&self, _session: &dyn Session) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn session() -> LocalSession {
        LocalSession::new("s1", &Transport::with_defaults("long-polling"))
    }

    #[test]
    fn starts_from_transport_advice() {
        let session = session();
        assert_eq!(session.timeout(), Duration::from_secs(30));
        assert_eq!(session.max_interval(), Duration::from_secs(10));
        assert_eq!(session.transport_name(), "long-polling");
        assert!(session.is_local());
    }

    #[test]
    fn attributes_round_trip() {
        let session = session();
        assert_eq!(session.set_attribute("k", json!(1)).unwrap(), None);
        assert_eq!(session.attribute("k"), Some(json!(1)));
        assert_eq!(session.remove_attribute("k").unwrap(), Some(json!(1)));
        assert!(session.attribute_names().is_empty());
    }

    #[test]
    fn nested_batches_close_once() {
        let session = session();
        session.start_batch().unwrap();
        session.start_batch().unwrap();
        assert!(!session.end_batch().unwrap());
        assert!(session.end_batch().unwrap());
        assert!(!session.end_batch().unwrap());
        assert!(!session.is_batching());
    }

    #[test]
    fn send_then_poll_drains_queue() {
        let session = session();
        let packet = Packet::new(None, ChannelId::parse("/chat").unwrap(), Vec::new());
        session.send(packet.clone()).unwrap();
        session.send(packet).unwrap();

        assert_eq!(session.queued(), 2);
        assert_eq!(session.poll().unwrap().len(), 2);
        assert_eq!(session.queued(), 0);
    }

    #[test]
    fn disconnect_notifies_listeners() {
        let session = session();
        let listener = Arc::new(CountingListener(AtomicUsize::new(0)));
        session.set_connected(true).unwrap();
        session.add_listener(listener.clone()).unwrap();

        session.disconnect().unwrap();

        assert!(!session.is_connected());
        assert_eq!(listener.0.load(Ordering::SeqCst), 1);
    }
}
