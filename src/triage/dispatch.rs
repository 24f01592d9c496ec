use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::orchestrator::TriagePipeline;
use crate::core::config::QueueConfig;
use crate::core::shared::error::TriageError;

const WORKER_ERROR_BACKOFF: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriageJob {
    pub ticket_id: Uuid,
    pub enqueued_at: DateTime<Utc>,
}

impl TriageJob {
    pub fn new(ticket_id: Uuid) -> Self {
        Self {
            ticket_id,
            enqueued_at: Utc::now(),
        }
    }
}

/// Hands a ticket to the triage pipeline without blocking the caller.
#[async_trait]
pub trait WorkDispatcher: Send + Sync {
    async fn dispatch(&self, ticket_id: Uuid) -> Result<(), TriageError>;

    fn kind(&self) -> &'static str;
}

#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn push(&self, job: TriageJob) -> Result<(), TriageError>;

    /// Waits for the next job. `None` means the queue is closed.
    async fn pop(&self) -> Result<Option<TriageJob>, TriageError>;
}

/// In-process queue for tests and single-node deployments.
pub struct InMemoryJobQueue {
    tx: mpsc::UnboundedSender<TriageJob>,
    rx: Arc<Mutex<mpsc::UnboundedReceiver<TriageJob>>>,
}

impl InMemoryJobQueue {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Arc::new(Mutex::new(rx)),
        }
    }
}

impl Default for InMemoryJobQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn push(&self, job: TriageJob) -> Result<(), TriageError> {
        self.tx
            .send(job)
            .map_err(|e| TriageError::Dispatch(format!("queue closed: {e}")))
    }

    async fn pop(&self) -> Result<Option<TriageJob>, TriageError> {
        Ok(self.rx.lock().await.recv().await)
    }
}

/// Redis list queue: producers `RPUSH`, workers `BLPOP`.
#[cfg(feature = "cache")]
pub struct RedisJobQueue {
    client: redis::Client,
    key: String,
}

#[cfg(feature = "cache")]
impl RedisJobQueue {
    const POP_TIMEOUT_SECS: u64 = 1;

    /// Fails unless the server answers `PING`.
    pub async fn connect(url: &str, key: impl Into<String>) -> Result<Self, TriageError> {
        let client = redis::Client::open(url).map_err(|e| TriageError::Dispatch(e.to_string()))?;
        let mut conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| TriageError::Dispatch(e.to_string()))?;
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| TriageError::Dispatch(e.to_string()))?;

        Ok(Self {
            client,
            key: key.into(),
        })
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection, TriageError> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| TriageError::Dispatch(e.to_string()))
    }
}

#[cfg(feature = "cache")]
#[async_trait]
impl JobQueue for RedisJobQueue {
    async fn push(&self, job: TriageJob) -> Result<(), TriageError> {
        let payload =
            serde_json::to_string(&job).map_err(|e| TriageError::Dispatch(e.to_string()))?;
        let mut conn = self.connection().await?;
        let _: i64 = redis::cmd("RPUSH")
            .arg(&self.key)
            .arg(payload)
            .query_async(&mut conn)
            .await
            .map_err(|e| TriageError::Dispatch(e.to_string()))?;
        Ok(())
    }

    async fn pop(&self) -> Result<Option<TriageJob>, TriageError> {
        let mut conn = self.connection().await?;
        loop {
            let popped: Option<(String, String)> = redis::cmd("BLPOP")
                .arg(&self.key)
                .arg(Self::POP_TIMEOUT_SECS)
                .query_async(&mut conn)
                .await
                .map_err(|e| TriageError::Dispatch(e.to_string()))?;

            if let Some((_, payload)) = popped {
                return serde_json::from_str(&payload)
                    .map(Some)
                    .map_err(|e| TriageError::Dispatch(format!("bad job payload: {e}")));
            }
        }
    }
}

pub struct QueuedDispatcher {
    queue: Arc<dyn JobQueue>,
}

impl QueuedDispatcher {
    pub fn new(queue: Arc<dyn JobQueue>) -> Self {
        Self { queue }
    }
}

#[async_trait]
impl WorkDispatcher for QueuedDispatcher {
    async fn dispatch(&self, ticket_id: Uuid) -> Result<(), TriageError> {
        self.queue.push(TriageJob::new(ticket_id)).await?;
        info!("Queued triage job for ticket {}", ticket_id);
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "queued"
    }
}

/// Fire-and-forget task per ticket, after a short delay.
pub struct ImmediateDispatcher {
    pipeline: Arc<TriagePipeline>,
    delay: Duration,
}

impl ImmediateDispatcher {
    pub fn new(pipeline: Arc<TriagePipeline>, delay: Duration) -> Self {
        Self { pipeline, delay }
    }
}

#[async_trait]
impl WorkDispatcher for ImmediateDispatcher {
    async fn dispatch(&self, ticket_id: Uuid) -> Result<(), TriageError> {
        let pipeline = self.pipeline.clone();
        let delay = self.delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = pipeline.triage_ticket(ticket_id).await {
                error!("Immediate triage failed for ticket {}: {}", ticket_id, e);
            }
        });
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "immediate"
    }
}

/// Starts `count` workers draining `queue` into the pipeline. Workers exit when
/// the queue closes.
pub fn spawn_workers(
    queue: Arc<dyn JobQueue>,
    pipeline: Arc<TriagePipeline>,
    count: usize,
) -> Vec<JoinHandle<()>> {
    info!("Starting {} triage workers", count);
    (0..count)
        .map(|worker| {
            let queue = queue.clone();
            let pipeline = pipeline.clone();
            tokio::spawn(async move {
                loop {
                    match queue.pop().await {
                        Ok(Some(job)) => {
                            if let Err(e) = pipeline.triage_ticket(job.ticket_id).await {
                                error!(
                                    "Worker {} failed triage for ticket {}: {}",
                                    worker, job.ticket_id, e
                                );
                            }
                        }
                        Ok(None) => {
                            info!("Triage worker {} stopping: queue closed", worker);
                            break;
                        }
                        Err(e) => {
                            error!("Worker {} failed to pop job: {}", worker, e);
                            tokio::time::sleep(WORKER_ERROR_BACKOFF).await;
                        }
                    }
                }
            })
        })
        .collect()
}

#[cfg(feature = "cache")]
async fn connect_queue(config: &QueueConfig) -> Option<Arc<dyn JobQueue>> {
    let url = config.redis_url.as_ref()?;
    match RedisJobQueue::connect(url, config.queue_key.clone()).await {
        Ok(queue) => {
            info!("Using Redis triage queue {}", config.queue_key);
            Some(Arc::new(queue))
        }
        Err(e) => {
            warn!("Redis unavailable, falling back to immediate triage: {}", e);
            None
        }
    }
}

#[cfg(not(feature = "cache"))]
async fn connect_queue(config: &QueueConfig) -> Option<Arc<dyn JobQueue>> {
    if config.redis_url.is_some() {
        warn!("REDIS_URL set but built without the cache feature; using immediate triage");
    }
    None
}

/// Picks the queued dispatcher when the configured Redis answers, else immediate.
pub async fn select_dispatcher(
    config: &QueueConfig,
    pipeline: Arc<TriagePipeline>,
) -> (Arc<dyn WorkDispatcher>, Vec<JoinHandle<()>>) {
    if let Some(queue) = connect_queue(config).await {
        let workers = spawn_workers(queue.clone(), pipeline, config.workers);
        return (Arc::new(QueuedDispatcher::new(queue)), workers);
    }

    info!(
        "Using immediate triage dispatch ({}ms delay)",
        config.immediate_delay.as_millis()
    );
    (
        Arc::new(ImmediateDispatcher::new(pipeline, config.immediate_delay)),
        Vec::new(),
    )
}
