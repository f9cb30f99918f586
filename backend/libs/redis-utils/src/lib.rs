use anyhow::{Context, Result};
use redis::aio::ConnectionManager;
use redis::{Client, RedisError};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::{timeout, Duration};
use tracing::info;

/// Shared Redis connection manager guarded by a Tokio mutex.
type SharedConnectionManager = Arc<Mutex<ConnectionManager>>;

/// Lower bound applied to any configured command timeout.
const MIN_COMMAND_TIMEOUT: Duration = Duration::from_millis(100);

/// Redis connection handle shared by every store that needs cross-worker state
/// (OTP code associations, throttle counters).
#[derive(Clone)]
pub struct RedisPool {
    manager: SharedConnectionManager,
    command_timeout: Duration,
}

impl RedisPool {
    pub async fn connect(redis_url: &str, command_timeout: Duration) -> Result<Self> {
        let client = Client::open(redis_url).context("failed to parse REDIS_URL connection string")?;
        let connection_manager = ConnectionManager::new(client)
            .await
            .context("failed to initialize Redis connection manager")?;

        info!(
            timeout_ms = command_timeout.as_millis() as u64,
            "Redis connection manager ready"
        );

        Ok(Self {
            manager: Arc::new(Mutex::new(connection_manager)),
            command_timeout: command_timeout.max(MIN_COMMAND_TIMEOUT),
        })
    }

    /// Clone the underlying connection out of the mutex so the lock is not held
    /// across the command round trip.
    pub async fn connection(&self) -> ConnectionManager {
        self.manager.lock().await.clone()
    }

    /// Run a Redis future, failing with an IO error once the configured timeout passes.
    pub async fn run<F, T>(&self, future: F) -> Result<T, RedisError>
    where
        F: Future<Output = Result<T, RedisError>>,
    {
        run_with_timeout(self.command_timeout, future).await
    }
}

/// Bound a Redis command by wall-clock time.
pub async fn run_with_timeout<F, T>(limit: Duration, future: F) -> Result<T, RedisError>
where
    F: Future<Output = Result<T, RedisError>>,
{
    match timeout(limit, future).await {
        Ok(res) => res,
        Err(_) => Err(RedisError::from((
            redis::ErrorKind::IoError,
            "redis command timed out",
        ))),
    }
}
