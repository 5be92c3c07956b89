//! Clock offset estimation (the Bayeux `timesync` extension).
//!
//! Request: `ext.timesync = {tc, l, o}` (client send time, latency estimate,
//! offset estimate). Response: `ext.timesync = {tc, ts, p, a}` with
//! `p = now - ts` and `a = tc + o + l - ts`.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::{json, Value};
use tracing::trace;

use crate::error::ExtensionError;
use crate::extension::{session_failure, Clock, Extension, SystemClock};
use crate::protocol::message::as_long;
use crate::protocol::{meta, Message, Packet};
use crate::session::Session;

pub const TIMESYNC_FIELD: &str = "timesync";

const EXTENSION_NAME: &str = "timesync";

/// One client time sample, as received on a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeSync {
    request_message_id: String,
    server_receive_time: i64,
    client_send_time: i64,
    network_latency: i64,
    client_clock_offset: i64,
}

impl TimeSync {
    pub fn request_message_id(&self) -> &str {
        &self.request_message_id
    }

    pub fn server_receive_time(&self) -> i64 {
        self.server_receive_time
    }

    pub fn client_send_time(&self) -> i64 {
        self.client_send_time
    }

    pub fn network_latency(&self) -> i64 {
        self.network_latency
    }

    pub fn client_clock_offset(&self) -> i64 {
        self.client_clock_offset
    }

    /// Client-supplied values may be anything, so the arithmetic wraps.
    fn reply(&self, now: i64) -> Value {
        let ts = self.server_receive_time;
        let a = self
            .client_send_time
            .wrapping_add(self.client_clock_offset)
            .wrapping_add(self.network_latency)
            .wrapping_sub(ts);
        json!({
            "tc": self.client_send_time,
            "ts": ts,
            "p": now.wrapping_sub(ts),
            "a": a,
        })
    }
}

/// Single most-recent sample per session.
#[derive(Debug, Default)]
pub struct TimesyncState {
    slot: Mutex<Option<TimeSync>>,
}

impl TimesyncState {
    fn slot(&self) -> MutexGuard<'_, Option<TimeSync>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn current(&self) -> Option<TimeSync> {
        self.slot().clone()
    }

    /// Stores `sample` unless the stored one was sent later by the client.
    /// Returns whether the slot was replaced.
    pub fn offer(&self, sample: TimeSync) -> bool {
        let mut slot = self.slot();
        let replace = slot
            .as_ref()
            .map_or(true, |stored| stored.client_send_time <= sample.client_send_time);
        if replace {
            *slot = Some(sample);
        }
        replace
    }
}

/// The Bayeux `timesync` extension.
pub struct TimesyncExtension {
    clock: Arc<dyn Clock>,
}

impl Default for TimesyncExtension {
    fn default() -> Self {
        Self::new()
    }
}

impl TimesyncExtension {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        TimesyncExtension { clock }
    }

    fn sample(&self, message: &Message) -> Option<TimeSync> {
        let id = message.id()?;
        let timesync = message.ext_value(TIMESYNC_FIELD)?.as_object()?;
        let field = |name: &str| timesync.get(name).and_then(as_long);

        Some(TimeSync {
            request_message_id: id.to_string(),
            server_receive_time: self.clock.now_millis(),
            client_send_time: field("tc")?,
            network_latency: field("l")?,
            client_clock_offset: field("o")?,
        })
    }

    fn receive(&self, session: &dyn Session, packet: &Packet) -> Result<(), ExtensionError> {
        let Some(sample) = packet.messages().iter().find_map(|m| self.sample(m)) else {
            return Ok(());
        };

        let states = session
            .extension_states()
            .map_err(session_failure(EXTENSION_NAME))?;
        let (state, _) = states.get_or_insert_with(TimesyncState::default);
        let tc = sample.client_send_time;
        if !state.offer(sample) {
            trace!(session = session.id(), tc, "stale timesync sample kept out");
        }

        Ok(())
    }

    fn stamp(&self, session: &dyn Session, packet: &mut Packet) -> Result<(), ExtensionError> {
        let states = session
            .extension_states()
            .map_err(session_failure(EXTENSION_NAME))?;
        let Some(sample) = states.get::<TimesyncState>().and_then(|s| s.current()) else {
            return Ok(());
        };

        let matching = packet
            .messages_mut()
            .iter_mut()
            .find(|message| message.id() == Some(sample.request_message_id()));
        if let Some(message) = matching {
            let reply = sample.reply(self.clock.now_millis());
            message.ext_mut().insert(TIMESYNC_FIELD.to_string(), reply);
        }

        Ok(())
    }
}

impl Extension for TimesyncExtension {
    fn name(&self) -> &'static str {
        EXTENSION_NAME
    }

    fn on_request(
        &self,
        session: Option<&dyn Session>,
        packet: &mut Packet,
    ) -> Result<(), ExtensionError> {
        match session {
            Some(session) if meta::is_negotiation_route(packet.route()) => {
                self.receive(session, packet)
            }
            _ => Ok(()),
        }
    }

    fn on_response(
        &self,
        session: Option<&dyn Session>,
        packet: &mut Packet,
    ) -> Result<(), ExtensionError> {
        match session {
            Some(session) if meta::is_negotiation_route(packet.route()) => {
                self.stamp(session, packet)
            }
            _ => Ok(()),
        }
    }
}
