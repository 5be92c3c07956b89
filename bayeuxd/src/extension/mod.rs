//! Server extension pipeline.
//!
//! Extensions see every packet that passes through a session at three points:
//! the incoming request, the outgoing response, and outgoing delivery of
//! published messages. They may edit message `ext` data and their own
//! per-session state, but never reorder or drop messages.
//!
//! An [`ExtensionPipeline`] runs its extensions in registration order,
//! followed by any extensions registered on the session itself. The first
//! hook that fails aborts the stage for that packet.

use std::fmt;
use std::sync::Arc;

use tracing::trace;

use crate::error::{ExtensionError, SessionError};
use crate::protocol::Packet;
use crate::session::Session;

mod ack;
mod clock;
mod timesync;

pub use ack::{AckEviction, AckExtension, AckState, OverflowLogLevel, ACK_FIELD};
pub use clock::{Clock, ManualClock, SystemClock};
pub use timesync::{TimeSync, TimesyncExtension, TimesyncState, TIMESYNC_FIELD};

/// A protocol extension. All hooks default to doing nothing.
pub trait Extension: Send + Sync {
    /// Stable name, used for logging and for removal from a session.
    fn name(&self) -> &'static str;

    fn on_request(
        &self,
        _session: Option<&dyn Session>,
        _packet: &mut Packet,
    ) -> Result<(), ExtensionError> {
        Ok(())
    }

    fn on_response(
        &self,
        _session: Option<&dyn Session>,
        _packet: &mut Packet,
    ) -> Result<(), ExtensionError> {
        Ok(())
    }

    fn on_delivery(
        &self,
        _session: Option<&dyn Session>,
        _packet: &mut Packet,
    ) -> Result<(), ExtensionError> {
        Ok(())
    }
}

/// The lifecycle point a hook runs at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Request,
    Response,
    Delivery,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stage = match self {
            Stage::Request => "request",
            Stage::Response => "response",
            Stage::Delivery => "delivery",
        };
        f.write_str(stage)
    }
}

/// Ordered list of server-wide extensions.
#[derive(Clone, Default)]
pub struct ExtensionPipeline {
    extensions: Vec<Arc<dyn Extension>>,
}

impl ExtensionPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, extension: Arc<dyn Extension>) -> &mut Self {
        self.extensions.push(extension);
        self
    }

    pub fn with(mut self, extension: Arc<dyn Extension>) -> Self {
        self.register(extension);
        self
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.extensions.iter().map(|e| e.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.extensions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.extensions.is_empty()
    }

    pub fn on_request(
        &self,
        session: Option<&dyn Session>,
        packet: &mut Packet,
    ) -> Result<(), ExtensionError> {
        self.run(Stage::Request, session, packet)
    }

    pub fn on_response(
        &self,
        session: Option<&dyn Session>,
        packet: &mut Packet,
    ) -> Result<(), ExtensionError> {
        self.run(Stage::Response, session, packet)
    }

    pub fn on_delivery(
        &self,
        session: Option<&dyn Session>,
        packet: &mut Packet,
    ) -> Result<(), ExtensionError> {
        self.run(Stage::Delivery, session, packet)
    }

    fn run(
        &self,
        stage: Stage,
        session: Option<&dyn Session>,
        packet: &mut Packet,
    ) -> Result<(), ExtensionError> {
        let session_extensions = session.map(|s| s.extensions()).unwrap_or_default();

        for extension in self.extensions.iter().chain(session_extensions.iter()) {
            trace!(
                extension = extension.name(),
                %stage,
                channel = packet.route(),
                "running extension"
            );
            match stage {
                Stage::Request => extension.on_request(session, packet)?,
                Stage::Response => extension.on_response(session, packet)?,
                Stage::Delivery => extension.on_delivery(session, packet)?,
            }
        }

        Ok(())
    }
}

impl fmt::Debug for ExtensionPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtensionPipeline")
            .field("extensions", &self.names())
            .finish()
    }
}

/// Wraps a session refusal into the failing extension's error.
pub(crate) fn session_failure(extension: &'static str) -> impl Fn(SessionError) -> ExtensionError {
    move |source| ExtensionError::Session { extension, source }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{ChannelId, Message};
    use serde_json::json;
    use std::sync::Mutex;

    struct Recorder {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl Extension for Recorder {
        fn name(&self) -> &'static str {
            self.name
        }

        fn on_request(
            &self,
            _session: Option<&dyn Session>,
            packet: &mut Packet,
        ) -> Result<(), ExtensionError> {
            self.log.lock().unwrap().push(format!("{}:request", self.name));
            for message in packet.messages_mut() {
                message.ext_mut().insert(self.name.to_string(), json!(true));
            }
            Ok(())
        }

        fn on_delivery(
            &self,
            _session: Option<&dyn Session>,
            _packet: &mut Packet,
        ) -> Result<(), ExtensionError> {
            self.log.lock().unwrap().push(format!("{}:delivery", self.name));
            Ok(())
        }
    }

    struct Failing;

    impl Extension for Failing {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn on_request(
            &self,
            _session: Option<&dyn Session>,
            _packet: &mut Packet,
        ) -> Result<(), ExtensionError> {
            Err(ExtensionError::Rejected {
                extension: "failing",
                reason: "nope".to_string(),
            })
        }
    }

    fn packet() -> Packet {
        Packet::new(
            None,
            ChannelId::parse("/chat").unwrap(),
            vec![Message::new("/chat").with_id("1")],
        )
    }

    #[test]
    fn runs_in_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let pipeline = ExtensionPipeline::new()
            .with(Arc::new(Recorder { name: "first", log: log.clone() }))
            .with(Arc::new(Recorder { name: "second", log: log.clone() }));
        let mut packet = packet();

        pipeline.on_request(None, &mut packet).unwrap();
        pipeline.on_delivery(None, &mut packet).unwrap();

        assert_eq!(
            *log.lock().unwrap(),
            ["first:request", "second:request", "first:delivery", "second:delivery"]
        );
        assert_eq!(packet.messages()[0].ext_value("second"), Some(&json!(true)));
        assert_eq!(pipeline.names(), ["first", "second"]);
    }

    #[test]
    fn failure_stops_the_stage() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let pipeline = ExtensionPipeline::new()
            .with(Arc::new(Failing))
            .with(Arc::new(Recorder { name: "after", log: log.clone() }));
        let mut packet = packet();

        let result = pipeline.on_request(None, &mut packet);

        assert!(matches!(result, Err(ExtensionError::Rejected { .. })));
        assert!(log.lock().unwrap().is_empty());
        assert!(packet.messages()[0].ext().is_none());
    }

    #[test]
    fn empty_pipeline_is_a_no_op() {
        let pipeline = ExtensionPipeline::new();
        let mut packet = packet();
        pipeline.on_response(None, &mut packet).unwrap();
        assert!(pipeline.is_empty());
    }
}
