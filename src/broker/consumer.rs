use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::{watch, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;

use super::{BrokerError, Envelope, Publisher, QueueTransport};

/// How long a single fetch blocks before re-checking for shutdown.
const FETCH_WAIT: Duration = Duration::from_secs(1);
const RECONNECT_BACKOFF: Duration = Duration::from_secs(2);

pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Flip to `true` (or drop the sender) to stop a running consumer.
pub type ShutdownSignal = watch::Receiver<bool>;

/// Receives the payload of every delivered message.
#[async_trait]
pub trait MessageHandler: Send + Sync + 'static {
    async fn handle(&self, payload: Value) -> Result<(), HandlerError>;
}

/// Consumes one durable queue with a bounded number of in-flight messages.
pub struct Consumer {
    transport: Arc<dyn QueueTransport>,
    name: String,
    dead_letter: Option<String>,
}

impl Consumer {
    pub fn new(transport: Arc<dyn QueueTransport>, name: impl Into<String>) -> Self {
        Self {
            transport,
            name: name.into(),
            dead_letter: None,
        }
    }

    /// Copy messages whose handler failed onto `queue` before acknowledging them.
    pub fn with_dead_letter(mut self, queue: Option<String>) -> Self {
        self.dead_letter = queue;
        self
    }

    /// Deliver every message on `queue` to `handler` until shutdown.
    ///
    /// At most `concurrency_limit` messages are unacknowledged at a time: no
    /// message leaves the queue until a slot is free. Each message is
    /// acknowledged once its handler returns, whether or not the handler
    /// succeeded. Transport errors are logged and retried after a backoff,
    /// keeping the same handler. On shutdown no further messages are taken
    /// and in-flight handlers are awaited.
    pub async fn consume(
        &self,
        queue: &str,
        handler: Arc<dyn MessageHandler>,
        concurrency_limit: usize,
        mut shutdown: ShutdownSignal,
    ) -> Result<(), BrokerError> {
        let limit = concurrency_limit.max(1);
        self.transport.declare(queue).await?;

        let recovered = self.transport.recover(queue, &self.name).await?;
        if recovered > 0 {
            tracing::warn!(queue = %queue, consumer = %self.name, recovered, "Requeued unacknowledged messages from a previous run");
        }

        tracing::info!(queue = %queue, consumer = %self.name, concurrency_limit = limit, "Consumer started");

        let slots = Arc::new(Semaphore::new(limit));
        let mut in_flight = JoinSet::new();

        loop {
            if *shutdown.borrow() {
                break;
            }

            let permit = tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                permit = slots.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let message = tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                fetched = self.transport.fetch(queue, &self.name, FETCH_WAIT) => match fetched {
                    Ok(Some(message)) => message,
                    Ok(None) => continue,
                    Err(e) => {
                        tracing::error!(queue = %queue, error = %e, "Fetch failed, reconnecting");
                        tokio::time::sleep(RECONNECT_BACKOFF).await;
                        continue;
                    }
                },
            };

            while let Some(finished) = in_flight.try_join_next() {
                log_join_error(queue, finished);
            }

            in_flight.spawn(deliver(
                self.transport.clone(),
                handler.clone(),
                queue.to_string(),
                self.name.clone(),
                self.dead_letter.clone(),
                message,
                permit,
            ));
        }

        tracing::info!(queue = %queue, in_flight = in_flight.len(), "Consumer stopping, draining in-flight messages");
        while let Some(finished) = in_flight.join_next().await {
            log_join_error(queue, finished);
        }
        Ok(())
    }
}

fn log_join_error(queue: &str, result: Result<(), tokio::task::JoinError>) {
    if let Err(e) = result {
        // The message stays on the processing list and is requeued on the
        // next start.
        tracing::error!(queue = %queue, error = %e, "Message handler panicked");
    }
}

async fn deliver(
    transport: Arc<dyn QueueTransport>,
    handler: Arc<dyn MessageHandler>,
    queue: String,
    consumer: String,
    dead_letter: Option<String>,
    message: String,
    _permit: OwnedSemaphorePermit,
) {
    match serde_json::from_str::<Envelope>(&message) {
        Ok(envelope) => {
            tracing::debug!(queue = %queue, message_id = %envelope.id, "Delivering message");
            if let Err(e) = handler.handle(envelope.payload.clone()).await {
                tracing::error!(
                    queue = %queue,
                    message_id = %envelope.id,
                    error = %e,
                    "Handler failed, acknowledging without requeue"
                );
                metrics::counter!("pipeline_messages_rejected_total", "queue" => queue.clone())
                    .increment(1);
                if let Some(dlq) = dead_letter.as_deref() {
                    let parked = json!({
                        "queue": queue,
                        "message_id": envelope.id,
                        "error": e.to_string(),
                        "payload": envelope.payload,
                    });
                    if let Err(e) = Publisher::new(transport.clone()).publish(dlq, &parked).await {
                        tracing::error!(queue = %dlq, error = %e, "Failed to dead-letter message");
                    }
                }
            }
        }
        Err(e) => {
            tracing::error!(queue = %queue, error = %e, "Dropping undecodable message");
        }
    }

    if let Err(e) = transport.ack(&queue, &consumer, &message).await {
        tracing::error!(queue = %queue, error = %e, "Failed to acknowledge message");
    }
}
