//! In-process broker with Kafka-like consumer group semantics.
//!
//! Topics are split into a fixed number of partitions; a record's key picks
//! its partition. Each consumer group sees every record once: partitions are
//! assigned round-robin to the group's members in join order, and a group
//! created after records were produced starts at the end of the log.
//!
//! Every consumer owns a `flume` signal channel. Producers ping it when new
//! records land; wake-ups set a flag and ping it too, so a blocked poll
//! returns immediately either way.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use bytes::Bytes;
use tracing::debug;

use crate::cluster::broker::{
    BrokerConnector, BrokerNode, BrokerRecord, ConsumerSettings, ConsumerWakeup, RecordBatch,
    TopicConsumer, TopicProducer,
};
use crate::error::BrokerError;

const DEFAULT_PARTITIONS: usize = 1;

#[derive(Debug, Clone)]
pub struct MemoryBroker {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    partitions: usize,
    reachable: bool,
    state: Mutex<State>,
}

#[derive(Debug, Default)]
struct State {
    topics: HashMap<String, Vec<Vec<StoredRecord>>>,
    groups: HashMap<(String, String), Group>,
    next_member: u64,
}

#[derive(Debug, Clone)]
struct StoredRecord {
    key: String,
    payload: Bytes,
}

#[derive(Debug, Default)]
struct Group {
    /// Members in join order.
    members: Vec<Member>,
    /// Next offset to fetch, per partition.
    positions: Vec<i64>,
    committed: HashMap<i32, i64>,
}

#[derive(Debug)]
struct Member {
    id: u64,
    signal: flume::Sender<()>,
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::with_partitions(DEFAULT_PARTITIONS)
    }

    pub fn with_partitions(partitions: usize) -> Self {
        Self::build(partitions.max(1), true)
    }

    /// A broker whose cluster description never lists any node.
    pub fn unreachable() -> Self {
        Self::build(DEFAULT_PARTITIONS, false)
    }

    fn build(partitions: usize, reachable: bool) -> Self {
        MemoryBroker {
            inner: Arc::new(Inner {
                partitions,
                reachable,
                state: Mutex::new(State::default()),
            }),
        }
    }

    pub fn partitions(&self) -> usize {
        self.inner.partitions
    }

    /// Number of records ever produced to `topic`.
    pub fn log_len(&self, topic: &str) -> usize {
        self.inner
            .state()
            .topics
            .get(topic)
            .map_or(0, |logs| logs.iter().map(Vec::len).sum())
    }

    /// Last offset committed by `group` for `partition` of `topic`.
    pub fn committed_offset(&self, topic: &str, group: &str, partition: i32) -> Option<i64> {
        self.inner
            .state()
            .groups
            .get(&(topic.to_string(), group.to_string()))
            .and_then(|group| group.committed.get(&partition).copied())
    }

    /// Number of live consumers in `group` on `topic`.
    pub fn members(&self, topic: &str, group: &str) -> usize {
        self.inner
            .state()
            .groups
            .get(&(topic.to_string(), group.to_string()))
            .map_or(0, |group| group.members.len())
    }
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn partition_for(&self, key: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() % self.partitions as u64) as usize
    }
}

impl State {
    fn topic(&mut self, topic: &str, partitions: usize) -> &mut Vec<Vec<StoredRecord>> {
        self.topics
            .entry(topic.to_string())
            .or_insert_with(|| vec![Vec::new(); partitions])
    }
}

impl BrokerConnector for MemoryBroker {
    type Producer = MemoryProducer;
    type Consumer = MemoryConsumer;

    fn describe_cluster(&self) -> Result<Vec<BrokerNode>, BrokerError> {
        if !self.inner.reachable {
            return Ok(Vec::new());
        }
        Ok(vec![BrokerNode {
            id: 0,
            host: "localhost".to_string(),
            port: 9092,
        }])
    }

    fn producer(&self, client_id: &str) -> Result<MemoryProducer, BrokerError> {
        debug!(client_id, "memory producer created");
        Ok(MemoryProducer {
            inner: self.inner.clone(),
        })
    }

    fn consumer(&self, settings: &ConsumerSettings) -> Result<MemoryConsumer, BrokerError> {
        let (signal, signals) = flume::bounded(1);
        let mut state = self.inner.state();
        let partitions = self.inner.partitions;

        let ends: Vec<i64> = state
            .topic(&settings.topic, partitions)
            .iter()
            .map(|log| log.len() as i64)
            .collect();

        let id = state.next_member;
        state.next_member += 1;

        let group = state
            .groups
            .entry((settings.topic.clone(), settings.group_id.clone()))
            .or_insert_with(|| Group {
                positions: ends,
                ..Group::default()
            });
        group.members.push(Member { id, signal: signal.clone() });

        debug!(
            client_id = %settings.client_id,
            group = %settings.group_id,
            topic = %settings.topic,
            "memory consumer joined"
        );

        Ok(MemoryConsumer {
            inner: self.inner.clone(),
            id,
            topic: settings.topic.clone(),
            group: settings.group_id.clone(),
            max_poll_records: settings.max_poll_records.max(1),
            signal,
            signals,
            woken: Arc::new(AtomicBool::new(false)),
            closed: false,
        })
    }
}

#[derive(Debug)]
pub struct MemoryProducer {
    inner: Arc<Inner>,
}

impl TopicProducer for MemoryProducer {
    fn send(&self, topic: &str, key: &str, payload: &[u8]) -> Result<(), BrokerError> {
        let partition = self.inner.partition_for(key);
        let mut state = self.inner.state();
        state.topic(topic, self.inner.partitions)[partition].push(StoredRecord {
            key: key.to_string(),
            payload: Bytes::copy_from_slice(payload),
        });

        for ((group_topic, _), group) in &state.groups {
            if group_topic != topic {
                continue;
            }
            for member in &group.members {
                // A full channel already holds a pending notification.
                let _ = member.signal.try_send(());
            }
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct MemoryConsumer {
    inner: Arc<Inner>,
    id: u64,
    topic: String,
    group: String,
    max_poll_records: usize,
    signal: flume::Sender<()>,
    signals: flume::Receiver<()>,
    woken: Arc<AtomicBool>,
    closed: bool,
}

impl MemoryConsumer {
    fn fetch(&self) -> Result<RecordBatch, BrokerError> {
        let mut state = self.inner.state();
        let partitions = self.inner.partitions;
        let State { topics, groups, .. } = &mut *state;

        let logs = topics
            .get(&self.topic)
            .ok_or(BrokerError::Closed)?;
        let group = groups
            .get_mut(&(self.topic.clone(), self.group.clone()))
            .ok_or(BrokerError::Closed)?;
        let slot = group
            .members
            .iter()
            .position(|member| member.id == self.id)
            .ok_or(BrokerError::Closed)?;
        let members = group.members.len();

        let mut batch = RecordBatch::new();
        let mut budget = self.max_poll_records;
        for partition in (0..partitions).filter(|p| p % members == slot) {
            let log = &logs[partition];
            let position = &mut group.positions[partition];
            while budget > 0 {
                let Some(stored) = log.get(*position as usize) else {
                    break;
                };
                batch.push(BrokerRecord {
                    partition: partition as i32,
                    offset: *position,
                    key: Some(stored.key.clone()),
                    payload: stored.payload.clone(),
                });
                *position += 1;
                budget -= 1;
            }
        }
        Ok(batch)
    }
}

impl TopicConsumer for MemoryConsumer {
    type Wakeup = MemoryWakeup;

    fn poll(&mut self, timeout: Duration) -> Result<RecordBatch, BrokerError> {
        if self.closed {
            return Err(BrokerError::Closed);
        }
        let deadline = Instant::now() + timeout;

        loop {
            if self.woken.swap(false, Ordering::AcqRel) {
                return Err(BrokerError::Wakeup);
            }

            let batch = self.fetch()?;
            if !batch.is_empty() {
                return Ok(batch);
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(batch);
            }
            match self.signals.recv_timeout(remaining) {
                Ok(()) => continue,
                Err(flume::RecvTimeoutError::Timeout) => {
                    if self.woken.swap(false, Ordering::AcqRel) {
                        return Err(BrokerError::Wakeup);
                    }
                    return self.fetch();
                }
                Err(flume::RecvTimeoutError::Disconnected) => return Err(BrokerError::Closed),
            }
        }
    }

    fn commit(&mut self, partition: i32, next_offset: i64) -> Result<(), BrokerError> {
        let mut state = self.inner.state();
        let group = state
            .groups
            .get_mut(&(self.topic.clone(), self.group.clone()))
            .ok_or(BrokerError::Closed)?;
        group.committed.insert(partition, next_offset);
        Ok(())
    }

    fn wakeup_handle(&self) -> MemoryWakeup {
        MemoryWakeup {
            woken: self.woken.clone(),
            signal: self.signal.clone(),
        }
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let mut state = self.inner.state();
        if let Some(group) = state
            .groups
            .get_mut(&(self.topic.clone(), self.group.clone()))
        {
            group.members.retain(|member| member.id != self.id);
        }
    }
}

impl Drop for MemoryConsumer {
    fn drop(&mut self) {
        self.close();
    }
}

#[derive(Debug, Clone)]
pub struct MemoryWakeup {
    woken: Arc<AtomicBool>,
    signal: flume::Sender<()>,
}

impl ConsumerWakeup for MemoryWakeup {
    fn wakeup(&self) {
        self.woken.store(true, Ordering::Release);
        let _ = self.signal.try_send(());
    }
}
