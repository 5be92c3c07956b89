//! Message-broker-backed [`ServerBackbone`].
//!
//! Every node publishes to one shared topic, keyed by its node name. Each
//! backbone instance consumes under its own consumer group, so every node
//! receives every record, and spreads the topic's partitions across its
//! [`ConsumerWorker`]s. Records carrying the local node's key are skipped:
//! the local node delivered them when they were published.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, sleep, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::cluster::backbone::ServerBackbone;
use crate::cluster::broker::{
    BrokerConnector, ConsumerSettings, ConsumerWakeup, TopicConsumer, TopicProducer,
};
use crate::cluster::codec::PacketCodec;
use crate::cluster::config::BackboneConnectionConfig;
use crate::cluster::status::{ComponentStatus, StatusCell};
use crate::cluster::worker::ConsumerWorker;
use crate::error::BackboneError;
use crate::protocol::Packet;
use crate::server::{Server, Transport};

const REACHABILITY_RETRY: Duration = Duration::from_secs(1);

type WakeupOf<C> = <<C as BrokerConnector>::Consumer as TopicConsumer>::Wakeup;

struct WorkerHandle<W> {
    index: usize,
    stop: Arc<AtomicBool>,
    wakeup: W,
    thread: JoinHandle<()>,
}

pub struct BrokerBackbone<C: BrokerConnector> {
    connector: C,
    config: BackboneConnectionConfig,
    group_id: String,
    producer: C::Producer,
    status: StatusCell,
    workers: Mutex<Vec<WorkerHandle<WakeupOf<C>>>>,
}

impl<C: BrokerConnector> BrokerBackbone<C> {
    /// Opens the producer and verifies that the broker cluster is reachable,
    /// retrying once a second for up to the configured grace period.
    pub fn new(connector: C, config: BackboneConnectionConfig) -> Result<Self, BackboneError> {
        let group_id = Uuid::new_v4().simple().to_string();
        let producer = connector.producer(&config.producer_client_id())?;

        Self::await_cluster(&connector, &config)?;

        info!(
            node = %config.node_name,
            topic = %config.topic,
            group = %group_id,
            "backbone connected"
        );

        Ok(BrokerBackbone {
            connector,
            config,
            group_id,
            producer,
            status: StatusCell::new(),
            workers: Mutex::new(Vec::new()),
        })
    }

    fn await_cluster(connector: &C, config: &BackboneConnectionConfig) -> Result<(), BackboneError> {
        let deadline = Instant::now() + config.startup_grace_period;

        loop {
            let reason = match connector.describe_cluster() {
                Ok(nodes) if !nodes.is_empty() => {
                    debug!(nodes = nodes.len(), "broker cluster reachable");
                    return Ok(());
                }
                Ok(_) => "no broker nodes reachable".to_string(),
                Err(e) => e.to_string(),
            };

            if Instant::now() >= deadline {
                return Err(BackboneError::Unavailable { reason });
            }
            warn!(servers = ?config.servers, %reason, "broker cluster not reachable yet, retrying");
            sleep(REACHABILITY_RETRY);
        }
    }

    pub fn group_id(&self) -> &str {
        &self.group_id
    }

    pub fn topic(&self) -> &str {
        &self.config.topic
    }

    pub fn node_name(&self) -> &str {
        &self.config.node_name
    }

    pub fn status(&self) -> ComponentStatus {
        self.status.get()
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Number of running consumer workers.
    pub fn worker_count(&self) -> usize {
        self.workers().len()
    }

    fn workers(&self) -> MutexGuard<'_, Vec<WorkerHandle<WakeupOf<C>>>> {
        self.workers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn spawn_worker(
        &self,
        index: usize,
        server: &Arc<dyn Server>,
    ) -> Result<WorkerHandle<WakeupOf<C>>, BackboneError> {
        let consumer = self.connector.consumer(&ConsumerSettings {
            client_id: self.config.consumer_client_id(index),
            group_id: self.group_id.clone(),
            topic: self.config.topic.clone(),
            max_poll_records: self.config.max_poll_records,
        })?;
        let wakeup = consumer.wakeup_handle();
        let stop = Arc::new(AtomicBool::new(false));

        let worker = ConsumerWorker::new(
            index,
            self.config.node_name.clone(),
            self.config.poll_timeout,
            consumer,
            stop.clone(),
            server.clone(),
            Transport::clustered(),
        );
        let thread = thread::Builder::new()
            .name(format!("bayeux-consumer-{index}"))
            .spawn(move || worker.run())
            .map_err(|source| BackboneError::Spawn { index, source })?;

        Ok(WorkerHandle {
            index,
            stop,
            wakeup,
            thread,
        })
    }

    /// Flags every worker, wakes it out of its poll, then joins it.
    fn stop_workers(workers: Vec<WorkerHandle<WakeupOf<C>>>) {
        for worker in &workers {
            worker.stop.store(true, Ordering::Release);
            worker.wakeup.wakeup();
        }
        for worker in workers {
            if worker.thread.join().is_err() {
                error!(worker = worker.index, "backbone consumer panicked");
            }
        }
    }
}

impl<C: BrokerConnector> ServerBackbone for BrokerBackbone<C> {
    fn start_up(&self, server: Arc<dyn Server>) -> Result<(), BackboneError> {
        if !self.status.claim(
            ComponentStatus::Stopped,
            ComponentStatus::Starting,
            ComponentStatus::Started,
        ) {
            return Ok(());
        }

        let mut spawned = Vec::with_capacity(self.config.concurrency_limit);
        for index in 0..self.config.concurrency_limit {
            match self.spawn_worker(index, &server) {
                Ok(worker) => spawned.push(worker),
                Err(e) => {
                    Self::stop_workers(spawned);
                    self.status.set(ComponentStatus::Stopped);
                    return Err(e);
                }
            }
        }

        self.workers().extend(spawned);
        self.status.set(ComponentStatus::Started);
        info!(
            node = %self.config.node_name,
            workers = self.config.concurrency_limit,
            "backbone started"
        );
        Ok(())
    }

    fn shut_down(&self) -> Result<(), BackboneError> {
        if !self.status.claim(
            ComponentStatus::Started,
            ComponentStatus::Stopping,
            ComponentStatus::Stopped,
        ) {
            return Ok(());
        }

        let workers = std::mem::take(&mut *self.workers());
        Self::stop_workers(workers);

        self.status.set(ComponentStatus::Stopped);
        info!(node = %self.config.node_name, "backbone stopped");
        Ok(())
    }

    fn publish(&self, packet: &Packet) -> Result<(), BackboneError> {
        let payload = PacketCodec::encode_packet(packet)?;
        self.producer
            .send(&self.config.topic, &self.config.node_name, &payload)?;
        Ok(())
    }
}

impl<C: BrokerConnector> Drop for BrokerBackbone<C> {
    fn drop(&mut self) {
        let workers = std::mem::take(&mut *self.workers());
        if !workers.is_empty() {
            Self::stop_workers(workers);
        }
    }
}
