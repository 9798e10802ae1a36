use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use super::{BrokerError, QueueTransport};

const REGISTRY_KEY: &str = "queues";

fn queue_key(queue: &str) -> String {
    format!("queue:{queue}")
}

fn processing_key(queue: &str, consumer: &str) -> String {
    format!("queue:{queue}:processing:{consumer}")
}

/// Durable queues as Redis lists.
///
/// Producers `LPUSH`; consumers atomically `BLMOVE` the oldest message from
/// the right end onto their own processing list and `LREM` it on ack.
/// Durability follows the server's persistence settings (AOF recommended).
pub struct RedisTransport {
    conn: ConnectionManager,
    // Blocking pops get their own connection so they never stall publishes
    // multiplexed on `conn`.
    blocking: ConnectionManager,
}

impl RedisTransport {
    pub async fn connect(broker_url: &str) -> Result<Self, BrokerError> {
        let client = redis::Client::open(broker_url)?;
        let conn = client.get_connection_manager().await?;
        let blocking = client.get_connection_manager().await?;
        tracing::info!("Connected queue transport");
        Ok(Self { conn, blocking })
    }

    pub async fn close(self) {
        drop(self.blocking);
        drop(self.conn);
        tracing::info!("Closed queue transport");
    }
}

#[async_trait]
impl QueueTransport for RedisTransport {
    async fn declare(&self, queue: &str) -> Result<(), BrokerError> {
        let mut conn = self.conn.clone();
        conn.sadd::<_, _, ()>(REGISTRY_KEY, queue).await?;
        Ok(())
    }

    async fn push(&self, queue: &str, message: String) -> Result<(), BrokerError> {
        let mut conn = self.conn.clone();
        conn.lpush::<_, _, ()>(queue_key(queue), message).await?;
        Ok(())
    }

    async fn fetch(
        &self,
        queue: &str,
        consumer: &str,
        wait: Duration,
    ) -> Result<Option<String>, BrokerError> {
        let mut conn = self.blocking.clone();
        let message: Option<String> = redis::cmd("BLMOVE")
            .arg(queue_key(queue))
            .arg(processing_key(queue, consumer))
            .arg("RIGHT")
            .arg("LEFT")
            .arg(wait.as_secs_f64())
            .query_async(&mut conn)
            .await?;
        Ok(message)
    }

    async fn ack(&self, queue: &str, consumer: &str, message: &str) -> Result<(), BrokerError> {
        let mut conn = self.conn.clone();
        conn.lrem::<_, _, ()>(processing_key(queue, consumer), 1, message)
            .await?;
        Ok(())
    }

    async fn recover(&self, queue: &str, consumer: &str) -> Result<usize, BrokerError> {
        let mut conn = self.conn.clone();
        let mut recovered = 0;
        // Newest parked first, each appended at the delivery end, so the
        // oldest parked message ends up next in line.
        loop {
            let moved: Option<String> = redis::cmd("LMOVE")
                .arg(processing_key(queue, consumer))
                .arg(queue_key(queue))
                .arg("LEFT")
                .arg("RIGHT")
                .query_async(&mut conn)
                .await?;
            if moved.is_none() {
                break;
            }
            recovered += 1;
        }
        Ok(recovered)
    }

    async fn depth(&self, queue: &str) -> Result<u64, BrokerError> {
        let mut conn = self.conn.clone();
        let depth: u64 = conn.llen(queue_key(queue)).await?;
        Ok(depth)
    }

    async fn ping(&self) -> Result<(), BrokerError> {
        let mut conn = self.conn.clone();
        redis::cmd("PING").query_async::<String>(&mut conn).await?;
        Ok(())
    }
}
