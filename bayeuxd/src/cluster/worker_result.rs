//! Result enums for the consumer worker loop.
//!
//! These types separate the two decisions inside [`ConsumerWorker::run`]:
//! what a poll produced, and what became of each record in a batch.
//!
//! [`ConsumerWorker::run`]: super::worker::ConsumerWorker::run

use crate::cluster::broker::RecordBatch;
use crate::error::{BrokerError, CodecError, ServerError};

/// Outcome of one poll of the consumer.
#[derive(Debug)]
pub(crate) enum PollOutcome {
    /// At least one record arrived.
    Records(RecordBatch),
    /// The poll timed out empty.
    Idle,
    /// A wake-up interrupted the poll.
    Interrupted,
    /// The consumer can no longer be polled; the worker exits.
    Closed,
    /// The broker client failed; the worker backs off and polls again.
    Failed(BrokerError),
}

/// What happened to a single record.
#[derive(Debug)]
pub(crate) enum RecordOutcome {
    Dispatched,
    /// Published by this node, which already delivered it locally.
    OwnRecord,
    DecodeFailed(CodecError),
    DispatchFailed(ServerError),
}

/// Per-batch tally, logged at trace level and returned for tests.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct BatchSummary {
    pub dispatched: usize,
    pub skipped: usize,
    pub failed: usize,
    pub committed: usize,
}

impl BatchSummary {
    pub fn record(&mut self, outcome: &RecordOutcome) {
        match outcome {
            RecordOutcome::Dispatched => self.dispatched += 1,
            RecordOutcome::OwnRecord => self.skipped += 1,
            RecordOutcome::DecodeFailed(_) | RecordOutcome::DispatchFailed(_) => self.failed += 1,
        }
    }
}
