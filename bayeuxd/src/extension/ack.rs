//! Reconnect-safe delivery bookkeeping (the Bayeux `ack` extension).
//!
//! A client opts in by sending `ext.ack = true` on its handshake. From then on
//! every successful `/meta/connect` reply is stamped with an increasing ack id
//! and kept in a bounded per-session window. The client reports the highest
//! id it received on its next `/meta/connect` request:
//!
//! - window entries up to and including that id are discarded;
//! - entries above it were sent but never seen by the client, so they move to
//!   a resend queue and ride along on the next successful connect reply.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use crossbeam::queue::SegQueue;
use crossbeam_skiplist::SkipMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, trace, warn};

use crate::error::ExtensionError;
use crate::extension::{session_failure, Extension};
use crate::protocol::message::as_long;
use crate::protocol::{meta, Packet};
use crate::session::Session;

pub const ACK_FIELD: &str = "ack";

const EXTENSION_NAME: &str = "ack";

/// Which entry leaves the window when it overflows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AckEviction {
    /// Drop the entry with the highest ack id. Matches existing deployments.
    #[default]
    Newest,
    /// Drop the entry with the lowest ack id.
    Oldest,
}

/// Level at which window overflow is reported.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverflowLogLevel {
    Off,
    #[default]
    Debug,
    Info,
    Warn,
}

/// Per-session ack bookkeeping. Present only once the client enabled the extension.
pub struct AckState {
    counter: AtomicU64,
    size: AtomicUsize,
    window: SkipMap<u64, Packet>,
    resend: SegQueue<Packet>,
}

impl Default for AckState {
    fn default() -> Self {
        Self::new()
    }
}

impl AckState {
    pub fn new() -> Self {
        AckState {
            counter: AtomicU64::new(0),
            size: AtomicUsize::new(0),
            window: SkipMap::new(),
            resend: SegQueue::new(),
        }
    }

    /// The last ack id handed out; `0` before the first connect reply.
    pub fn counter(&self) -> u64 {
        self.counter.load(Ordering::Acquire)
    }

    pub fn window_len(&self) -> usize {
        self.size.load(Ordering::Acquire)
    }

    pub fn window_ids(&self) -> Vec<u64> {
        self.window.iter().map(|entry| *entry.key()).collect()
    }

    pub fn pending_resend(&self) -> usize {
        self.resend.len()
    }

    fn next_id(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::AcqRel) + 1
    }

    fn shrink(&self) {
        let shrunk = self
            .size
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |size| size.checked_sub(1));
        debug_assert!(shrunk.is_ok(), "ack window size fell out of step with the window");
    }

    /// Inserts `packet` under `id`, evicting one entry if the window is now
    /// larger than `max`. Returns the evicted id.
    fn record(&self, id: u64, packet: Packet, max: usize, eviction: AckEviction) -> Option<u64> {
        // Count before inserting so a concurrent removal never sees size 0.
        let size = self.size.fetch_add(1, Ordering::AcqRel) + 1;
        self.window.insert(id, packet);

        if size <= max {
            return None;
        }

        let evicted = match eviction {
            AckEviction::Newest => self.window.pop_back(),
            AckEviction::Oldest => self.window.pop_front(),
        }?;
        self.shrink();
        Some(*evicted.key())
    }

    /// Applies a client report of the highest id it received.
    ///
    /// Returns `(discarded, requeued)` counts.
    fn acknowledge(&self, acked: u64) -> (usize, usize) {
        let mut discarded = 0;
        while let Some(entry) = self.window.front() {
            if *entry.key() > acked {
                break;
            }
            if entry.remove() {
                self.shrink();
                discarded += 1;
            }
        }

        let mut requeued = 0;
        while let Some(entry) = self.window.pop_front() {
            self.shrink();
            self.resend.push(entry.value().clone());
            requeued += 1;
        }

        (discarded, requeued)
    }

    fn drain_resend(&self) -> Vec<Packet> {
        std::iter::from_fn(|| self.resend.pop()).collect()
    }
}

/// The Bayeux `ack` extension.
#[derive(Debug, Clone)]
pub struct AckExtension {
    max_window_size: usize,
    eviction: AckEviction,
    overflow_log_level: OverflowLogLevel,
}

impl AckExtension {
    pub fn new(max_window_size: usize) -> Self {
        AckExtension {
            max_window_size,
            eviction: AckEviction::default(),
            overflow_log_level: OverflowLogLevel::default(),
        }
    }

    pub fn with_eviction(mut self, eviction: AckEviction) -> Self {
        self.eviction = eviction;
        self
    }

    pub fn with_overflow_log_level(mut self, level: OverflowLogLevel) -> Self {
        self.overflow_log_level = level;
        self
    }

    pub fn max_window_size(&self) -> usize {
        self.max_window_size
    }

    /// The session's ack state, if the client enabled the extension.
    pub fn state(session: &dyn Session) -> Result<Option<Arc<AckState>>, ExtensionError> {
        let states = session
            .extension_states()
            .map_err(session_failure(EXTENSION_NAME))?;
        Ok(states.get::<AckState>())
    }

    fn log_overflow(&self, session: &str, evicted: u64) {
        match self.overflow_log_level {
            OverflowLogLevel::Off => {}
            OverflowLogLevel::Debug => {
                debug!(session, evicted, "session overflowed the ack window")
            }
            OverflowLogLevel::Info => {
                info!(session, evicted, "session overflowed the ack window")
            }
            OverflowLogLevel::Warn => {
                warn!(session, evicted, "session overflowed the ack window")
            }
        }
    }

    fn enable(&self, session: &dyn Session, packet: &Packet) -> Result<(), ExtensionError> {
        let requested = packet
            .messages()
            .iter()
            .any(|message| message.ext_value(ACK_FIELD).and_then(Value::as_bool) == Some(true));

        if requested {
            let states = session
                .extension_states()
                .map_err(session_failure(EXTENSION_NAME))?;
            let (_, created) = states.get_or_insert_with(AckState::new);
            if created {
                debug!(session = session.id(), "ack extension enabled");
            }
        }

        Ok(())
    }

    fn receive_ack(&self, session: &dyn Session, packet: &Packet) -> Result<(), ExtensionError> {
        let Some(state) = Self::state(session)? else {
            return Ok(());
        };

        let reported = packet
            .messages()
            .iter()
            .filter_map(|message| message.ext_value(ACK_FIELD))
            .filter_map(as_long)
            .filter_map(|id| u64::try_from(id).ok())
            .max();

        if let Some(acked) = reported {
            let (discarded, requeued) = state.acknowledge(acked);
            trace!(
                session = session.id(),
                acked,
                discarded,
                requeued,
                "client acknowledged"
            );
        }

        Ok(())
    }

    fn confirm_handshake(
        &self,
        session: &dyn Session,
        packet: &mut Packet,
    ) -> Result<(), ExtensionError> {
        if Self::state(session)?.is_none() {
            return Ok(());
        }

        session
            .set_long_polling(true)
            .map_err(session_failure(EXTENSION_NAME))?;

        for message in packet.messages_mut() {
            if message.is_successful() {
                message.ext_mut().insert(ACK_FIELD.to_string(), Value::Bool(true));
            }
        }

        Ok(())
    }

    fn stamp_connect(&self, session: &dyn Session, packet: &mut Packet) -> Result<(), ExtensionError> {
        let Some(state) = Self::state(session)? else {
            return Ok(());
        };
        let Some(position) = packet.messages().iter().position(|message| {
            message.is_successful() && message.channel() == Some(meta::CONNECT)
        }) else {
            return Ok(());
        };

        // Merging appends, so `position` still points at the connect reply.
        for resent in state.drain_resend() {
            *packet = packet.merge(&resent);
        }

        let id = state.next_id();
        packet.messages_mut()[position]
            .ext_mut()
            .insert(ACK_FIELD.to_string(), Value::from(id));

        if let Some(evicted) = state.record(id, packet.clone(), self.max_window_size, self.eviction) {
            self.log_overflow(session.id(), evicted);
        }

        Ok(())
    }
}

impl Extension for AckExtension {
    fn name(&self) -> &'static str {
        EXTENSION_NAME
    }

    fn on_request(
        &self,
        session: Option<&dyn Session>,
        packet: &mut Packet,
    ) -> Result<(), ExtensionError> {
        let Some(session) = session else {
            return Ok(());
        };

        match packet.route() {
            meta::HANDSHAKE => self.enable(session, packet),
            meta::CONNECT => self.receive_ack(session, packet),
            _ => Ok(()),
        }
    }

    fn on_response(
        &self,
        session: Option<&dyn Session>,
        packet: &mut Packet,
    ) -> Result<(), ExtensionError> {
        let Some(session) = session else {
            return Ok(());
        };

        match packet.route() {
            meta::HANDSHAKE => self.confirm_handshake(session, packet),
            meta::CONNECT => self.stamp_connect(session, packet),
            _ => Ok(()),
        }
    }
}
