use std::collections::BTreeMap;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use super::{field_key, JobStateStore, StoreError};

const SCAN_BATCH: usize = 100;

/// ARGV: has_expected ("1"/"0"), expected, value, ttl seconds (0 = none).
const COMPARE_AND_SET: &str = r"
local current = redis.call('GET', KEYS[1])
if ARGV[1] == '1' then
    if current ~= ARGV[2] then return 0 end
elseif current then
    return 0
end
if tonumber(ARGV[4]) > 0 then
    redis.call('SET', KEYS[1], ARGV[3], 'EX', ARGV[4])
else
    redis.call('SET', KEYS[1], ARGV[3])
end
return 1
";

/// Redis-backed job state store.
///
/// Each field is a plain string key `job:{job_id}:{field}`. The connection
/// manager is multiplexed and reconnects on its own after a dropped
/// connection; the failing call still surfaces as an error.
pub struct RedisJobStore {
    conn: ConnectionManager,
    ttl_seconds: Option<u64>,
    compare_and_set: redis::Script,
}

impl RedisJobStore {
    pub async fn connect(redis_url: &str, ttl_seconds: Option<u64>) -> Result<Self, StoreError> {
        let client = redis::Client::open(redis_url)?;
        let conn = client.get_connection_manager().await?;
        tracing::info!(ttl_seconds = ?ttl_seconds, "Connected job state store");
        Ok(Self {
            conn,
            ttl_seconds,
            compare_and_set: redis::Script::new(COMPARE_AND_SET),
        })
    }

    pub async fn close(self) {
        drop(self.conn);
        tracing::info!("Closed job state store");
    }
}

#[async_trait]
impl JobStateStore for RedisJobStore {
    async fn set(&self, job_id: &str, field: &str, value: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let key = field_key(job_id, field);
        match self.ttl_seconds {
            Some(ttl) => conn.set_ex::<_, _, ()>(&key, value, ttl).await?,
            None => conn.set::<_, _, ()>(&key, value).await?,
        }
        tracing::debug!(key = %key, "SET");
        Ok(())
    }

    async fn get(&self, job_id: &str, field: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn.clone();
        let key = field_key(job_id, field);
        let value: Option<String> = conn.get(&key).await?;
        tracing::debug!(key = %key, present = value.is_some(), "GET");
        Ok(value)
    }

    async fn compare_and_set(
        &self,
        job_id: &str,
        field: &str,
        expected: Option<&str>,
        value: &str,
    ) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let key = field_key(job_id, field);
        // Runs as one script: WATCH would not be isolated on the shared
        // multiplexed connection.
        let written: i64 = self
            .compare_and_set
            .key(&key)
            .arg(if expected.is_some() { "1" } else { "0" })
            .arg(expected.unwrap_or_default())
            .arg(value)
            .arg(self.ttl_seconds.unwrap_or(0))
            .invoke_async(&mut conn)
            .await?;
        tracing::debug!(key = %key, written = written == 1, "CAS");
        Ok(written == 1)
    }

    async fn delete(&self, job_id: &str, field: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(field_key(job_id, field)).await?;
        Ok(())
    }

    async fn scan_all(&self, job_id: &str) -> Result<BTreeMap<String, String>, StoreError> {
        let mut conn = self.conn.clone();
        let prefix = field_key(job_id, "");
        let pattern = format!("{prefix}*");
        let mut fields = BTreeMap::new();
        let mut cursor: u64 = 0;

        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await?;

            if !keys.is_empty() {
                let values: Vec<Option<String>> = redis::cmd("MGET")
                    .arg(&keys)
                    .query_async(&mut conn)
                    .await?;
                // A key removed between SCAN and MGET comes back as nil.
                for (key, value) in keys.iter().zip(values) {
                    if let (Some(field), Some(value)) = (key.strip_prefix(&prefix), value) {
                        fields.insert(field.to_string(), value);
                    }
                }
            }

            if next == 0 {
                break;
            }
            cursor = next;
        }

        tracing::debug!(job_id = %job_id, count = fields.len(), "SCAN");
        Ok(fields)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        redis::cmd("PING").query_async::<String>(&mut conn).await?;
        Ok(())
    }
}
