#![allow(dead_code)]

use std::sync::{Mutex, PoisonError};
use std::thread::sleep;
use std::time::{Duration, Instant};

use bayeuxd::{ChannelIdCache, Packet, Server, ServerError, Transport};

/// A node's local dispatch, recording every packet the backbone delivers.
pub struct TestServer {
    ids: ChannelIdCache,
    delivered: Mutex<Vec<(String, Packet)>>,
}

impl TestServer {
    pub fn new() -> Self {
        TestServer {
            ids: ChannelIdCache::new(),
            delivered: Mutex::new(Vec::new()),
        }
    }

    fn delivered(&self) -> std::sync::MutexGuard<'_, Vec<(String, Packet)>> {
        self.delivered.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Channels of delivered packets, in delivery order.
    pub fn channels(&self) -> Vec<String> {
        self.delivered()
            .iter()
            .map(|(_, packet)| packet.route().to_string())
            .collect()
    }

    pub fn transports(&self) -> Vec<String> {
        self.delivered()
            .iter()
            .map(|(transport, _)| transport.clone())
            .collect()
    }

    pub fn packets(&self) -> Vec<Packet> {
        self.delivered()
            .iter()
            .map(|(_, packet)| packet.clone())
            .collect()
    }

    pub fn count(&self) -> usize {
        self.delivered().len()
    }
}

impl Server for TestServer {
    fn publish_to_channel(
        &self,
        transport: &Transport,
        _channel: &str,
        packet: Packet,
    ) -> Result<(), ServerError> {
        self.delivered()
            .push((transport.name().to_string(), packet));
        Ok(())
    }

    fn transport(&self, name: &str) -> Option<Transport> {
        match name {
            "websocket" | "long-polling" => Some(Transport::with_defaults(name)),
            _ => None,
        }
    }

    fn channel_ids(&self) -> &ChannelIdCache {
        &self.ids
    }
}

/// Polls `condition` until it holds or `timeout` passes.
pub fn wait_for(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        sleep(Duration::from_millis(10));
    }
    condition()
}
