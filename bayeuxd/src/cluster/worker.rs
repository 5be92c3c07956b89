//! Consumer worker for the broker backbone.
//!
//! [`ConsumerWorker`] owns one consumer client and everything its poll loop
//! needs: the stop flag, the local dispatch endpoint and the transport marker
//! for clustered packets. [`ConsumerWorker::run`] is the loop; one thread runs
//! one worker until the backbone shuts down.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::sleep;
use std::time::Duration;

use tracing::{debug, error, info, trace, warn};

use crate::cluster::broker::{BrokerRecord, RecordBatch, TopicConsumer};
use crate::cluster::codec::PacketCodec;
use crate::cluster::worker_result::{BatchSummary, PollOutcome, RecordOutcome};
use crate::error::BrokerError;
use crate::server::{Server, Transport};

const FAILED_POLL_BACKOFF: Duration = Duration::from_millis(500);

pub(crate) struct ConsumerWorker<T: TopicConsumer> {
    index: usize,
    node_name: String,
    poll_timeout: Duration,
    consumer: T,
    stop: Arc<AtomicBool>,
    server: Arc<dyn Server>,
    /// Marker handed to local dispatch so clustered packets are not re-published.
    transport: Transport,
}

impl<T: TopicConsumer> ConsumerWorker<T> {
    pub fn new(
        index: usize,
        node_name: String,
        poll_timeout: Duration,
        consumer: T,
        stop: Arc<AtomicBool>,
        server: Arc<dyn Server>,
        transport: Transport,
    ) -> Self {
        ConsumerWorker {
            index,
            node_name,
            poll_timeout,
            consumer,
            stop,
            server,
            transport,
        }
    }

    fn stopping(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    fn poll(&mut self) -> PollOutcome {
        match self.consumer.poll(self.poll_timeout) {
            Ok(batch) if batch.is_empty() => PollOutcome::Idle,
            Ok(batch) => PollOutcome::Records(batch),
            Err(BrokerError::Wakeup) => PollOutcome::Interrupted,
            Err(BrokerError::Closed) => PollOutcome::Closed,
            Err(e) => PollOutcome::Failed(e),
        }
    }

    /// Decodes and dispatches one record.
    fn handle(&self, record: &BrokerRecord) -> RecordOutcome {
        if record.key.as_deref() == Some(self.node_name.as_str()) {
            return RecordOutcome::OwnRecord;
        }

        let packet = match PacketCodec::decode(&record.payload, self.server.as_ref()) {
            Ok(packet) => packet,
            Err(e) => return RecordOutcome::DecodeFailed(e),
        };
        let channel = packet.route().to_string();
        match self.server.publish_to_channel(&self.transport, &channel, packet) {
            Ok(()) => RecordOutcome::Dispatched,
            Err(e) => RecordOutcome::DispatchFailed(e),
        }
    }

    /// Dispatches every record, then commits each partition past its last
    /// record. Failed records are logged and skipped; their offsets are
    /// committed all the same.
    pub fn process_batch(&mut self, batch: &RecordBatch) -> BatchSummary {
        let mut summary = BatchSummary::default();

        for (partition, records) in batch.partitions() {
            for record in records {
                let outcome = self.handle(record);
                match &outcome {
                    RecordOutcome::DecodeFailed(e) => warn!(
                        worker = self.index,
                        partition,
                        offset = record.offset,
                        error = %e,
                        "dropping undecodable backbone record"
                    ),
                    RecordOutcome::DispatchFailed(e) => warn!(
                        worker = self.index,
                        partition,
                        offset = record.offset,
                        error = %e,
                        "failed to dispatch backbone record"
                    ),
                    RecordOutcome::Dispatched | RecordOutcome::OwnRecord => {}
                }
                summary.record(&outcome);
            }

            let Some(last) = records.last() else {
                continue;
            };
            match self.consumer.commit(partition, last.offset + 1) {
                Ok(()) => summary.committed += 1,
                Err(e) => error!(
                    worker = self.index,
                    partition,
                    offset = last.offset + 1,
                    error = %e,
                    "failed to commit backbone offset"
                ),
            }
        }

        trace!(worker = self.index, ?summary, "processed backbone batch");
        summary
    }

    /// Main worker loop.
    ///
    /// Checks the stop flag, polls, and hands any records to
    /// [`process_batch`](Self::process_batch). Returns once the stop flag is
    /// set or the consumer is closed, closing the consumer on the way out.
    pub fn run(mut self) {
        info!(worker = self.index, node = %self.node_name, "backbone consumer started");

        while !self.stopping() {
            // ── Poll and dispatch ──────────────────────────────────
            match self.poll() {
                PollOutcome::Records(batch) => {
                    self.process_batch(&batch);
                }
                PollOutcome::Idle => {}
                // ── Wake-ups and broker failures ──────────────────────
                PollOutcome::Interrupted => {
                    if self.stopping() {
                        debug!(worker = self.index, "backbone consumer woken for shutdown");
                    } else {
                        error!(worker = self.index, "backbone consumer woken unexpectedly");
                    }
                }
                PollOutcome::Closed => {
                    warn!(worker = self.index, "backbone consumer closed underneath worker");
                    break;
                }
                PollOutcome::Failed(e) => {
                    error!(worker = self.index, error = %e, "backbone poll failed");
                    sleep(FAILED_POLL_BACKOFF);
                }
            }
        }

        // ── Leave the consumer group ──────────────────────────────
        self.consumer.close();
        info!(worker = self.index, node = %self.node_name, "backbone consumer exited");
    }
}
