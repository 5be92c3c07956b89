//! Apache Kafka broker clients through `rdkafka`.
//!
//! Producers send with `acks=0` and no retries. Consumers commit manually and
//! start from the latest offset when their group has no committed position.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{BaseConsumer, CommitMode, Consumer};
use rdkafka::error::KafkaError;
use rdkafka::message::Message as _;
use rdkafka::producer::{BaseRecord, DefaultProducerContext, ThreadedProducer};
use rdkafka::{Offset, TopicPartitionList};
use tracing::debug;

use crate::cluster::broker::{
    BrokerConnector, BrokerNode, BrokerRecord, ConsumerSettings, ConsumerWakeup, RecordBatch,
    TopicConsumer, TopicProducer,
};
use crate::cluster::config::BackboneConnectionConfig;
use crate::error::BrokerError;

const METADATA_TIMEOUT: Duration = Duration::from_secs(5);
/// Slice of a poll between wake-up checks.
const WAKEUP_CHECK: Duration = Duration::from_millis(100);

fn client_error(error: KafkaError) -> BrokerError {
    BrokerError::Client(error.to_string())
}

#[derive(Debug, Clone)]
pub struct KafkaConnector {
    bootstrap_servers: String,
}

impl KafkaConnector {
    pub fn new(servers: &[String]) -> Self {
        KafkaConnector {
            bootstrap_servers: servers.join(","),
        }
    }

    pub fn from_config(config: &BackboneConnectionConfig) -> Self {
        Self::new(&config.servers)
    }

    fn client_config(&self, client_id: &str) -> ClientConfig {
        let mut config = ClientConfig::new();
        config
            .set("bootstrap.servers", &self.bootstrap_servers)
            .set("client.id", client_id);
        config
    }
}

impl BrokerConnector for KafkaConnector {
    type Producer = KafkaProducer;
    type Consumer = KafkaConsumer;

    fn describe_cluster(&self) -> Result<Vec<BrokerNode>, BrokerError> {
        let probe: BaseConsumer = self
            .client_config("bayeux-cluster-probe")
            .create()
            .map_err(client_error)?;
        let metadata = probe
            .fetch_metadata(None, METADATA_TIMEOUT)
            .map_err(client_error)?;

        Ok(metadata
            .brokers()
            .iter()
            .map(|broker| BrokerNode {
                id: broker.id(),
                host: broker.host().to_string(),
                port: u16::try_from(broker.port()).unwrap_or_default(),
            })
            .collect())
    }

    fn producer(&self, client_id: &str) -> Result<KafkaProducer, BrokerError> {
        let producer: ThreadedProducer<DefaultProducerContext> = self
            .client_config(client_id)
            .set("acks", "0")
            .set("retries", "0")
            .create()
            .map_err(client_error)?;
        Ok(KafkaProducer { producer })
    }

    fn consumer(&self, settings: &ConsumerSettings) -> Result<KafkaConsumer, BrokerError> {
        let consumer: BaseConsumer = self
            .client_config(&settings.client_id)
            .set("group.id", &settings.group_id)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "latest")
            .create()
            .map_err(client_error)?;
        consumer
            .subscribe(&[settings.topic.as_str()])
            .map_err(client_error)?;

        debug!(client_id = %settings.client_id, topic = %settings.topic, "kafka consumer subscribed");

        Ok(KafkaConsumer {
            consumer,
            topic: settings.topic.clone(),
            max_poll_records: settings.max_poll_records.max(1),
            woken: Arc::new(AtomicBool::new(false)),
        })
    }
}

pub struct KafkaProducer {
    producer: ThreadedProducer<DefaultProducerContext>,
}

impl TopicProducer for KafkaProducer {
    fn send(&self, topic: &str, key: &str, payload: &[u8]) -> Result<(), BrokerError> {
        self.producer
            .send(BaseRecord::to(topic).key(key).payload(payload))
            .map_err(|(error, _)| client_error(error))
    }
}

pub struct KafkaConsumer {
    consumer: BaseConsumer,
    topic: String,
    max_poll_records: usize,
    woken: Arc<AtomicBool>,
}

impl KafkaConsumer {
    fn woken(&self) -> bool {
        self.woken.swap(false, Ordering::AcqRel)
    }

    fn next(&self, timeout: Duration) -> Result<Option<BrokerRecord>, BrokerError> {
        match self.consumer.poll(timeout) {
            None => Ok(None),
            Some(Err(error)) => Err(client_error(error)),
            Some(Ok(message)) => Ok(Some(BrokerRecord {
                partition: message.partition(),
                offset: message.offset(),
                key: message
                    .key()
                    .map(|key| String::from_utf8_lossy(key).into_owned()),
                payload: Bytes::copy_from_slice(message.payload().unwrap_or_default()),
            })),
        }
    }
}

impl TopicConsumer for KafkaConsumer {
    type Wakeup = KafkaWakeup;

    fn poll(&mut self, timeout: Duration) -> Result<RecordBatch, BrokerError> {
        let deadline = Instant::now() + timeout;
        let mut batch = RecordBatch::new();

        // Wait in short slices so a wake-up is noticed promptly.
        let first = loop {
            if self.woken() {
                return Err(BrokerError::Wakeup);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.next(remaining.min(WAKEUP_CHECK))? {
                Some(record) => break record,
                None if remaining.is_zero() => return Ok(batch),
                None => continue,
            }
        };
        batch.push(first);

        // The batch is never empty here, so a client error only cuts it short.
        batch.fill_from(self.max_poll_records, || self.next(Duration::ZERO))?;
        Ok(batch)
    }

    fn commit(&mut self, partition: i32, next_offset: i64) -> Result<(), BrokerError> {
        let mut offsets = TopicPartitionList::new();
        offsets
            .add_partition_offset(&self.topic, partition, Offset::Offset(next_offset))
            .map_err(client_error)?;
        self.consumer
            .commit(&offsets, CommitMode::Sync)
            .map_err(client_error)
    }

    fn wakeup_handle(&self) -> KafkaWakeup {
        KafkaWakeup {
            woken: self.woken.clone(),
        }
    }

    fn close(&mut self) {
        self.consumer.unsubscribe();
    }
}

#[derive(Debug, Clone)]
pub struct KafkaWakeup {
    woken: Arc<AtomicBool>,
}

impl ConsumerWakeup for KafkaWakeup {
    fn wakeup(&self) {
        self.woken.store(true, Ordering::Release);
    }
}
