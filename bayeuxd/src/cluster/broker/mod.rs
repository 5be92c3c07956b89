//! Message broker client abstraction used by the backbone.
//!
//! The backbone only needs a narrow slice of a Kafka-style client: describe
//! the cluster, produce keyed records, and run consumers in a consumer group
//! with manual offset commits and a cooperative wake-up.
//!
//! - [`memory`] — in-process broker, used by tests and single-process setups.
//! - `kafka` — Apache Kafka through `rdkafka` (cargo feature `kafka`).

use std::collections::BTreeMap;
use std::time::Duration;

use bytes::Bytes;
use tracing::warn;

use crate::error::BrokerError;

#[cfg(feature = "kafka")]
pub mod kafka;
pub mod memory;

/// A broker node reported by the cluster description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerNode {
    pub id: i32,
    pub host: String,
    pub port: u16,
}

/// One consumed record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerRecord {
    pub partition: i32,
    pub offset: i64,
    pub key: Option<String>,
    pub payload: Bytes,
}

/// Records returned by one poll, grouped by partition in offset order.
#[derive(Debug, Default)]
pub struct RecordBatch {
    partitions: BTreeMap<i32, Vec<BrokerRecord>>,
}

impl RecordBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: BrokerRecord) {
        self.partitions
            .entry(record.partition)
            .or_default()
            .push(record);
    }

    pub fn is_empty(&self) -> bool {
        self.partitions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.partitions.values().map(Vec::len).sum()
    }

    pub fn partitions(&self) -> impl Iterator<Item = (i32, &[BrokerRecord])> {
        self.partitions
            .iter()
            .map(|(partition, records)| (*partition, records.as_slice()))
    }

    /// Pulls records from `next` until it runs dry or the batch holds `max`.
    ///
    /// Records already taken off the client are never thrown away: an error
    /// after the first record ends the batch early and is only logged. With
    /// an empty batch the error is returned.
    pub fn fill_from<F>(&mut self, max: usize, mut next: F) -> Result<(), BrokerError>
    where
        F: FnMut() -> Result<Option<BrokerRecord>, BrokerError>,
    {
        while self.len() < max {
            match next() {
                Ok(Some(record)) => self.push(record),
                Ok(None) => break,
                Err(e) if self.is_empty() => return Err(e),
                Err(e) => {
                    warn!(records = self.len(), error = %e, "broker poll failed mid-batch");
                    break;
                }
            }
        }
        Ok(())
    }
}

impl FromIterator<BrokerRecord> for RecordBatch {
    fn from_iter<I: IntoIterator<Item = BrokerRecord>>(records: I) -> Self {
        let mut batch = RecordBatch::new();
        for record in records {
            batch.push(record);
        }
        batch
    }
}

/// Settings for one consumer client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerSettings {
    pub client_id: String,
    pub group_id: String,
    pub topic: String,
    pub max_poll_records: usize,
}

/// Factory for broker clients.
pub trait BrokerConnector: Send + Sync + 'static {
    type Producer: TopicProducer;
    type Consumer: TopicConsumer;

    /// Lists the reachable broker nodes. An empty list means none are reachable.
    fn describe_cluster(&self) -> Result<Vec<BrokerNode>, BrokerError>;

    fn producer(&self, client_id: &str) -> Result<Self::Producer, BrokerError>;

    /// Creates a consumer already subscribed to `settings.topic`.
    fn consumer(&self, settings: &ConsumerSettings) -> Result<Self::Consumer, BrokerError>;
}

/// Fire-and-forget record producer, shareable across threads.
pub trait TopicProducer: Send + Sync + 'static {
    fn send(&self, topic: &str, key: &str, payload: &[u8]) -> Result<(), BrokerError>;
}

/// A consumer group member. Owned by exactly one worker thread.
pub trait TopicConsumer: Send + 'static {
    type Wakeup: ConsumerWakeup;

    /// Waits up to `timeout` for records.
    ///
    /// Fails with [`BrokerError::Wakeup`] when a wake-up was requested
    /// through [`TopicConsumer::wakeup_handle`] before or during the call.
    fn poll(&mut self, timeout: Duration) -> Result<RecordBatch, BrokerError>;

    /// Commits `next_offset` as the position to resume `partition` from.
    fn commit(&mut self, partition: i32, next_offset: i64) -> Result<(), BrokerError>;

    fn wakeup_handle(&self) -> Self::Wakeup;

    /// Leaves the consumer group.
    fn close(&mut self);
}

/// Interrupts a blocked [`TopicConsumer::poll`] from another thread.
pub trait ConsumerWakeup: Send + Sync + 'static {
    fn wakeup(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(partition: i32, offset: i64) -> BrokerRecord {
        BrokerRecord {
            partition,
            offset,
            key: None,
            payload: Bytes::new(),
        }
    }

    #[test]
    fn batch_groups_by_partition() {
        let batch: RecordBatch = [record(1, 0), record(0, 4), record(1, 1)]
            .into_iter()
            .collect();

        let grouped: Vec<(i32, Vec<i64>)> = batch
            .partitions()
            .map(|(p, records)| (p, records.iter().map(|r| r.offset).collect()))
            .collect();
        assert_eq!(grouped, [(0, vec![4]), (1, vec![0, 1])]);
        assert_eq!(batch.len(), 3);
    }

    #[test]
    fn fill_keeps_records_taken_before_an_error() {
        let mut script = vec![
            Ok(Some(record(0, 0))),
            Ok(Some(record(0, 1))),
            Err(BrokerError::Client("broker went away".to_string())),
            Ok(Some(record(0, 2))),
        ]
        .into_iter();
        let mut batch = RecordBatch::new();

        let result = batch.fill_from(10, || script.next().unwrap_or(Ok(None)));

        assert!(result.is_ok());
        assert_eq!(batch.len(), 2);
        // The record after the error stays with the client for the next poll.
        assert!(matches!(script.next(), Some(Ok(Some(_)))));
    }

    #[test]
    fn fill_reports_an_error_on_an_empty_batch() {
        let mut batch = RecordBatch::new();

        let result = batch.fill_from(10, || Err(BrokerError::Client("down".to_string())));

        assert!(matches!(result, Err(BrokerError::Client(_))));
        assert!(batch.is_empty());
    }

    #[test]
    fn fill_stops_at_max() {
        let mut offset = 0;
        let mut batch = RecordBatch::new();

        batch
            .fill_from(3, || {
                offset += 1;
                Ok(Some(record(0, offset)))
            })
            .unwrap();

        assert_eq!(batch.len(), 3);
    }
}
