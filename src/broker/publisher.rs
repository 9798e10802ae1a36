use std::sync::Arc;

use serde::Serialize;

use super::{BrokerError, Envelope, QueueTransport};

/// Publishes JSON payloads onto durable queues.
#[derive(Clone)]
pub struct Publisher {
    transport: Arc<dyn QueueTransport>,
}

impl Publisher {
    pub fn new(transport: Arc<dyn QueueTransport>) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &Arc<dyn QueueTransport> {
        &self.transport
    }

    /// Declare `queue` and publish `payload` onto it.
    ///
    /// A connection-class failure is retried once: the transport reconnects
    /// on the next command, so the queue is re-declared and the single push
    /// repeated. Anything else is returned as is.
    pub async fn publish<T: Serialize + ?Sized>(
        &self,
        queue: &str,
        payload: &T,
    ) -> Result<(), BrokerError> {
        let envelope = Envelope::new(queue, serde_json::to_value(payload)?);
        let message = serde_json::to_string(&envelope)?;

        match self.try_publish(queue, message.clone()).await {
            Err(e) if e.is_connection() => {
                tracing::warn!(queue = %queue, error = %e, "Publish failed on connection, retrying");
                self.try_publish(queue, message).await?;
            }
            other => other?,
        }

        metrics::counter!("pipeline_messages_published_total", "queue" => queue.to_string())
            .increment(1);
        tracing::debug!(queue = %queue, message_id = %envelope.id, "Published message");
        Ok(())
    }

    async fn try_publish(&self, queue: &str, message: String) -> Result<(), BrokerError> {
        self.transport.declare(queue).await?;
        self.transport.push(queue, message).await
    }
}
