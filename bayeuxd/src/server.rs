//! The local server capability this crate depends on.
//!
//! Channel routing and transports live outside this crate; the backbone only
//! needs to re-inject packets into local dispatch and to look up transport
//! settings for remote sessions.

use std::time::Duration;

use crate::error::ServerError;
use crate::protocol::{ChannelIdCache, Packet};

/// Name of the reserved transport marking packets that arrived over the backbone.
pub const CLUSTERED_TRANSPORT_NAME: &str = "clustered";

const DEFAULT_TIMEOUT: Duration = Duration::from_millis(30_000);
const DEFAULT_INTERVAL: Duration = Duration::from_millis(0);
const DEFAULT_MAX_INTERVAL: Duration = Duration::from_millis(10_000);

/// Connection timing advertised by a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transport {
    name: String,
    timeout: Duration,
    interval: Duration,
    max_interval: Duration,
}

impl Transport {
    pub fn new(
        name: impl Into<String>,
        timeout: Duration,
        interval: Duration,
        max_interval: Duration,
    ) -> Self {
        Transport {
            name: name.into(),
            timeout,
            interval,
            max_interval,
        }
    }

    /// A transport with the Bayeux default advice (30s timeout, 0 interval, 10s max interval).
    pub fn with_defaults(name: impl Into<String>) -> Self {
        Self::new(name, DEFAULT_TIMEOUT, DEFAULT_INTERVAL, DEFAULT_MAX_INTERVAL)
    }

    /// The marker passed to local dispatch for packets received from the backbone.
    ///
    /// Dispatch must not hand packets carrying this marker back to the backbone.
    pub fn clustered() -> Self {
        Self::with_defaults(CLUSTERED_TRANSPORT_NAME)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn max_interval(&self) -> Duration {
        self.max_interval
    }

    pub fn is_clustered(&self) -> bool {
        self.name == CLUSTERED_TRANSPORT_NAME
    }
}

/// Local dispatch entry point used by the backbone.
pub trait Server: Send + Sync {
    /// Delivers `packet` to subscribers of `channel` on this node.
    fn publish_to_channel(
        &self,
        transport: &Transport,
        channel: &str,
        packet: Packet,
    ) -> Result<(), ServerError>;

    /// Looks up a configured transport by name.
    fn transport(&self, name: &str) -> Option<Transport>;

    /// The node-wide channel identifier cache.
    fn channel_ids(&self) -> &ChannelIdCache;
}
