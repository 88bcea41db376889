use redis::aio::ConnectionManager;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{info, warn};

use crate::{
    error::{RateLimitError, Result},
    store::{CounterEntry, CounterStore, InitOutcome},
};

/// Increment only when the key still exists, so a counter that expired
/// between the caller's read and this call is reported as gone instead of
/// being resurrected without a TTL.
const GUARDED_INCR: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 1 then
    return redis.call('INCR', KEYS[1])
else
    return -1
end
"#;

/// Redis client configuration
#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub url: String,
    pub connection_timeout: Duration,
    pub command_timeout: Duration,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            connection_timeout: Duration::from_secs(5),
            command_timeout: Duration::from_secs(1),
        }
    }
}

/// Redis client wrapper for counter operations
#[derive(Clone)]
pub struct RedisClient {
    connection: ConnectionManager,
    config: RedisConfig,
}

impl RedisClient {
    /// Create a new Redis client and verify the connection with a PING.
    pub async fn new(config: RedisConfig) -> Result<Self> {
        info!("Creating Redis client for URL: {}", config.url);

        let client = redis::Client::open(config.url.clone()).map_err(|e| {
            warn!("Failed to create Redis client: {}", e);
            RateLimitError::Redis(e)
        })?;

        let connection_result = tokio::time::timeout(
            config.connection_timeout,
            client.get_connection_manager(),
        )
        .await;

        let connection = match connection_result {
            Ok(Ok(conn)) => conn,
            Ok(Err(e)) => {
                warn!("Failed to create connection manager: {}", e);
                return Err(RateLimitError::Redis(e));
            }
            Err(_) => {
                warn!(
                    "Timeout while creating connection manager ({}s)",
                    config.connection_timeout.as_secs()
                );
                return Err(RateLimitError::StoreUnavailable(
                    "timeout while connecting to Redis".to_string(),
                ));
            }
        };

        let client = Self { connection, config };
        client.health_check().await?;
        info!("Redis client initialized successfully");
        Ok(client)
    }

    /// Run one Redis command future under the configured command timeout.
    async fn run<T, F>(&self, operation: &str, fut: F) -> Result<T>
    where
        F: std::future::Future<Output = redis::RedisResult<T>>,
    {
        match tokio::time::timeout(self.config.command_timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(RateLimitError::Redis(e)),
            Err(_) => Err(RateLimitError::StoreUnavailable(format!(
                "{} timed out after {}ms",
                operation,
                self.config.command_timeout.as_millis()
            ))),
        }
    }

    /// SET key 1 NX PX window. Returns true when this call created the key.
    pub async fn set_if_absent(&self, key: &str, window: Duration) -> Result<bool> {
        let mut conn = self.connection.clone();
        let reply: Option<String> = self
            .run(
                "SET NX",
                redis::cmd("SET")
                    .arg(key)
                    .arg(1)
                    .arg("NX")
                    .arg("PX")
                    .arg(window.as_millis() as u64)
                    .query_async(&mut conn),
            )
            .await?;
        Ok(reply.is_some())
    }

    /// Increment an existing key. `None` when the key no longer exists.
    pub async fn guarded_incr(&self, key: &str) -> Result<Option<u64>> {
        let mut conn = self.connection.clone();
        let script = redis::Script::new(GUARDED_INCR);
        let count: i64 = self
            .run("guarded INCR", script.key(key).invoke_async(&mut conn))
            .await?;
        if count < 0 {
            Ok(None)
        } else {
            Ok(Some(count as u64))
        }
    }

    /// Atomically read a key's value and remaining TTL.
    ///
    /// Returns `None` for a missing key, or a key with no expiry left (PTTL
    /// reports negative for both; counters without a TTL cannot be created
    /// through this client).
    pub async fn get_with_ttl(&self, key: &str) -> Result<Option<(u64, Duration)>> {
        let mut conn = self.connection.clone();
        let mut pipe = redis::pipe();
        pipe.atomic().cmd("GET").arg(key).cmd("PTTL").arg(key);

        let (value, pttl_ms): (Option<u64>, i64) =
            self.run("GET/PTTL", pipe.query_async(&mut conn)).await?;

        match (value, pttl_ms) {
            (Some(count), ttl) if ttl > 0 => {
                Ok(Some((count, Duration::from_millis(ttl as u64))))
            }
            _ => Ok(None),
        }
    }

    /// Check if the connection is healthy
    pub async fn health_check(&self) -> Result<()> {
        let mut conn = self.connection.clone();
        self.run("PING", redis::cmd("PING").query_async::<_, ()>(&mut conn))
            .await
    }
}

/// Counter store backed by a shared Redis instance.
///
/// Expiry is enforced server-side, so every limiter process sharing this
/// store also shares one clock authority for window boundaries.
pub struct RedisCounterStore {
    client: RedisClient,
}

impl RedisCounterStore {
    pub async fn connect(config: RedisConfig) -> Result<Self> {
        let client = RedisClient::new(config).await?;
        Ok(Self { client })
    }
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn get(&self, key: &str) -> Result<Option<CounterEntry>> {
        Ok(self
            .client
            .get_with_ttl(key)
            .await?
            .map(|(count, ttl)| CounterEntry {
                count,
                expires_at: Instant::now() + ttl,
            }))
    }

    async fn initialize(&self, key: &str, window: Duration) -> Result<InitOutcome> {
        if self.client.set_if_absent(key, window).await? {
            Ok(InitOutcome::Created)
        } else {
            Ok(InitOutcome::AlreadyExists)
        }
    }

    async fn increment(&self, key: &str) -> Result<Option<u64>> {
        self.client.guarded_incr(key).await
    }

    async fn health_check(&self) -> Result<()> {
        self.client.health_check().await
    }
}
