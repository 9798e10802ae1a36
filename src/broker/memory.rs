use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Notify;

use super::{BrokerError, Envelope, QueueTransport};

#[derive(Default)]
struct Queues {
    declared: HashSet<String>,
    ready: HashMap<String, VecDeque<String>>,
    // (queue, consumer) -> fetched but unacknowledged
    processing: HashMap<(String, String), Vec<String>>,
}

/// In-process transport with the same delivery semantics as Redis lists.
#[derive(Default)]
pub struct MemoryTransport {
    queues: Mutex<Queues>,
    arrivals: Notify,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Queues> {
        // A panicking test thread must not poison every later assertion.
        self.queues.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn is_declared(&self, queue: &str) -> bool {
        self.lock().declared.contains(queue)
    }

    /// Payloads waiting on `queue`, oldest first.
    pub fn payloads(&self, queue: &str) -> Vec<Value> {
        self.lock()
            .ready
            .get(queue)
            .map(|messages| {
                messages
                    .iter()
                    .filter_map(|raw| serde_json::from_str::<Envelope>(raw).ok())
                    .map(|envelope| envelope.payload)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Messages fetched by `consumer` and not yet acknowledged.
    pub fn unacked(&self, queue: &str, consumer: &str) -> usize {
        self.lock()
            .processing
            .get(&(queue.to_string(), consumer.to_string()))
            .map_or(0, Vec::len)
    }

    fn try_take(&self, queue: &str, consumer: &str) -> Option<String> {
        let mut queues = self.lock();
        let message = queues.ready.get_mut(queue)?.pop_front()?;
        queues
            .processing
            .entry((queue.to_string(), consumer.to_string()))
            .or_default()
            .push(message.clone());
        Some(message)
    }
}

#[async_trait]
impl QueueTransport for MemoryTransport {
    async fn declare(&self, queue: &str) -> Result<(), BrokerError> {
        let mut queues = self.lock();
        queues.declared.insert(queue.to_string());
        queues.ready.entry(queue.to_string()).or_default();
        Ok(())
    }

    async fn push(&self, queue: &str, message: String) -> Result<(), BrokerError> {
        self.lock()
            .ready
            .entry(queue.to_string())
            .or_default()
            .push_back(message);
        self.arrivals.notify_waiters();
        Ok(())
    }

    async fn fetch(
        &self,
        queue: &str,
        consumer: &str,
        wait: Duration,
    ) -> Result<Option<String>, BrokerError> {
        let deadline = tokio::time::Instant::now() + wait;
        loop {
            let arrived = self.arrivals.notified();
            if let Some(message) = self.try_take(queue, consumer) {
                return Ok(Some(message));
            }
            if tokio::time::timeout_at(deadline, arrived).await.is_err() {
                return Ok(self.try_take(queue, consumer));
            }
        }
    }

    async fn ack(&self, queue: &str, consumer: &str, message: &str) -> Result<(), BrokerError> {
        let mut queues = self.lock();
        if let Some(parked) = queues
            .processing
            .get_mut(&(queue.to_string(), consumer.to_string()))
        {
            if let Some(pos) = parked.iter().position(|m| m == message) {
                parked.remove(pos);
            }
        }
        Ok(())
    }

    async fn recover(&self, queue: &str, consumer: &str) -> Result<usize, BrokerError> {
        let mut queues = self.lock();
        let parked = queues
            .processing
            .remove(&(queue.to_string(), consumer.to_string()))
            .unwrap_or_default();
        let count = parked.len();
        let ready = queues.ready.entry(queue.to_string()).or_default();
        for message in parked.into_iter().rev() {
            ready.push_front(message);
        }
        Ok(count)
    }

    async fn depth(&self, queue: &str) -> Result<u64, BrokerError> {
        Ok(self.lock().ready.get(queue).map_or(0, |q| q.len() as u64))
    }

    async fn ping(&self) -> Result<(), BrokerError> {
        Ok(())
    }
}
