//! Error types shared across the crate.
//!
//! Each concern gets its own enum so callers can match on what actually went
//! wrong: protocol model errors ([`ChannelError`]), session misuse
//! ([`SessionError`]), extension hooks ([`ExtensionError`]), the backbone wire
//! codec ([`CodecError`]), the message broker ([`BrokerError`]), the backbone
//! itself ([`BackboneError`]), the local dispatch collaborator
//! ([`ServerError`]) and configuration loading ([`ConfigError`]).

use thiserror::Error;

/// A channel path could not be canonicalized.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    #[error("channel path is empty")]
    Empty,
    #[error("channel path '{0}' must start with '/'")]
    MissingLeadingSlash(String),
    #[error("channel path '{0}' contains an empty segment")]
    EmptySegment(String),
}

/// A session operation was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// The session is a read-only stand-in and cannot perform `operation`.
    #[error("operation '{operation}' is not supported on this session")]
    Unsupported { operation: &'static str },
}

impl SessionError {
    pub fn unsupported(operation: &'static str) -> Self {
        SessionError::Unsupported { operation }
    }
}

/// An extension hook failed; processing of the packet stops at that stage.
#[derive(Debug, Error)]
pub enum ExtensionError {
    #[error("extension '{extension}' failed: {source}")]
    Session {
        extension: &'static str,
        #[source]
        source: SessionError,
    },
    #[error("extension '{extension}' rejected packet: {reason}")]
    Rejected {
        extension: &'static str,
        reason: String,
    },
}

/// A backbone record could not be encoded or decoded.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("record truncated while reading {field}: needed {needed} bytes, {remaining} remaining")]
    Truncated {
        field: &'static str,
        needed: usize,
        remaining: usize,
    },
    #[error("field {field} is {len} bytes, larger than the {max} byte limit")]
    FieldTooLarge {
        field: &'static str,
        len: usize,
        max: usize,
    },
    #[error("field {field} is not valid UTF-8")]
    InvalidUtf8 {
        field: &'static str,
        #[source]
        source: std::string::FromUtf8Error,
    },
    #[error("message {index} is not valid JSON: {source}")]
    InvalidMessage {
        index: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error("message {index} is not a JSON object")]
    NotAnObject { index: usize },
    #[error("invalid channel in record: {0}")]
    InvalidChannel(#[from] ChannelError),
    #[error("record names unknown transport '{0}'")]
    UnknownTransport(String),
    #[error("{0} trailing bytes after the last message")]
    TrailingBytes(usize),
}

/// Failures reported by a message broker client.
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("no broker nodes are reachable")]
    Unreachable,
    /// A blocked poll was interrupted through the consumer's wake-up handle.
    #[error("consumer poll interrupted by wakeup")]
    Wakeup,
    #[error("consumer is closed")]
    Closed,
    #[error("broker client error: {0}")]
    Client(String),
}

/// Failures of the cluster backbone.
#[derive(Debug, Error)]
pub enum BackboneError {
    #[error("unable to start the backbone service: {reason}")]
    Unavailable { reason: String },
    #[error("backbone broker failure: {0}")]
    Broker(#[from] BrokerError),
    #[error("backbone codec failure: {0}")]
    Codec(#[from] CodecError),
    #[error("failed to spawn consumer worker {index}: {source}")]
    Spawn {
        index: usize,
        #[source]
        source: std::io::Error,
    },
}

/// The local channel-dispatch collaborator failed to publish a packet.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("no channel matches '{0}'")]
    UnknownChannel(String),
    #[error("dispatch failed: {0}")]
    Dispatch(String),
}

/// Configuration could not be loaded or is inconsistent.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}
