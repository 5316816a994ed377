//! Component B — bounded async upload queue in front of the S3-compatible
//! object store, plus a synchronous download path.
//!
//! Mirrors the teacher's worker-pool-behind-a-bounded-channel shape
//! (`worker.rs`/`engine.rs`): a fixed set of consumer tasks pull admitted
//! requests off an `mpsc` channel and run them to completion, independent
//! of the admitting caller.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::{BehaviorVersion, Region};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use mediahub_core::config::R2Config;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::error::EngineError;

const DEFAULT_WORKERS: usize = 8;
const DEFAULT_QUEUE_SIZE: usize = 1000;
const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_RETRY_BASE_DELAY: Duration = Duration::from_millis(300);

/// A cheap callback invoked once a store succeeds. Implementations should
/// do as little work as possible — spec §4.B calls this out explicitly —
/// since the upload worker awaits it before moving to the next request.
#[async_trait]
pub trait SuccessHook: Send + Sync {
    async fn call(&self);
}

#[async_trait]
impl<F> SuccessHook for F
where
    F: Fn() -> () + Send + Sync,
{
    async fn call(&self) {
        (self)();
    }
}

struct UploadRequest {
    key: String,
    content_type: String,
    payload: Vec<u8>,
    on_success: Option<Arc<dyn SuccessHook>>,
    cancellation: CancellationToken,
}

pub struct ObjectStoreConfig {
    pub workers: usize,
    pub queue_size: usize,
    pub max_retries: u32,
    pub retry_base_delay: Duration,
}

impl Default for ObjectStoreConfig {
    fn default() -> Self {
        ObjectStoreConfig {
            workers: DEFAULT_WORKERS,
            queue_size: DEFAULT_QUEUE_SIZE,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_base_delay: DEFAULT_RETRY_BASE_DELAY,
        }
    }
}

/// The S3 client and bucket, shared by every worker task. Kept separate
/// from [`ObjectStore`] so that worker tasks never hold a clone of the
/// admission `mpsc::Sender` — only `ObjectStore` handles (held by callers
/// submitting work) do. That separation is what lets `close()` actually
/// observe the channel close: dropping every `ObjectStore` handle drops
/// every sender, while the workers keep running off this `Arc` alone.
struct S3Inner {
    client: S3Client,
    bucket: String,
}

impl S3Inner {
    async fn download(&self, key: &str) -> Result<(Vec<u8>, String), EngineError> {
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| EngineError::Transient(anyhow::anyhow!(err)))?;
        let content_type = output.content_type().unwrap_or("application/octet-stream").to_string();
        let bytes = output
            .body
            .collect()
            .await
            .map_err(|err| EngineError::Transient(anyhow::anyhow!(err)))?
            .into_bytes()
            .to_vec();
        Ok((bytes, content_type))
    }

    async fn put(&self, key: &str, content_type: &str, payload: &[u8]) -> Result<(), EngineError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(payload.to_vec()))
            .send()
            .await
            .map_err(|err| EngineError::Transient(anyhow::anyhow!(err)))?;
        Ok(())
    }
}

/// The bounded-queue front-end described in spec §4.B. Cloning is cheap —
/// it only clones the `mpsc::Sender` and the shared S3 client handle — so
/// every caller (use-case, conversion workers) holds its own handle.
#[derive(Clone)]
pub struct ObjectStore {
    tx: mpsc::Sender<UploadRequest>,
    inner: Arc<S3Inner>,
}

/// Owns the worker tasks; dropping it after `close()` has drained the
/// queue is how the caller waits for in-flight uploads to finish.
pub struct ObjectStoreHandle {
    pub store: ObjectStore,
    workers: Vec<tokio::task::JoinHandle<()>>,
}

impl ObjectStoreHandle {
    /// Closes the admission channel and waits for every in-flight worker to
    /// drain, per spec §4.B `close()`. Dropping `store` here drops this
    /// handle's sender; once every other `ObjectStore` clone the caller
    /// handed out elsewhere is also dropped, the channel closes, `recv()`
    /// on the worker side returns `None`, and the awaits below return.
    pub async fn close(self) {
        let ObjectStoreHandle { store, workers } = self;
        drop(store);
        for worker in workers {
            if let Err(err) = worker.await {
                warn!(error = %err, "upload worker task panicked");
            }
        }
    }
}

fn build_client(cfg: &R2Config) -> S3Client {
    let credentials = Credentials::new(
        cfg.access_key_id.clone(),
        cfg.secret_key.clone(),
        None,
        None,
        "mediahub",
    );
    let s3_config = aws_sdk_s3::Config::builder()
        .behavior_version(BehaviorVersion::latest())
        .region(Region::new("auto"))
        .credentials_provider(credentials)
        .endpoint_url(cfg.base_endpoint())
        .force_path_style(true)
        .build();
    S3Client::from_conf(s3_config)
}

impl ObjectStore {
    /// Builds the client, spawns the worker pool, and returns a handle the
    /// caller keeps around to `close()` at shutdown.
    pub fn start(r2: &R2Config, bucket: String, cfg: ObjectStoreConfig) -> ObjectStoreHandle {
        let client = build_client(r2);
        let inner = Arc::new(S3Inner { client, bucket });
        let (tx, rx) = mpsc::channel(cfg.queue_size.max(1));
        let rx = Arc::new(tokio::sync::Mutex::new(rx));

        let store = ObjectStore { tx, inner: inner.clone() };

        let mut workers = Vec::with_capacity(cfg.workers.max(1));
        for worker_idx in 0..cfg.workers.max(1) {
            let rx = rx.clone();
            let inner = inner.clone();
            let max_retries = cfg.max_retries;
            let retry_base_delay = cfg.retry_base_delay;
            workers.push(tokio::spawn(async move {
                run_worker(worker_idx, rx, inner, max_retries, retry_base_delay).await;
            }));
        }

        ObjectStoreHandle { store, workers }
    }

    /// Non-blocking admission (spec §4.B `uploadWithHook`). Admits into the
    /// bounded queue and returns immediately; the actual PUT happens on a
    /// worker task. `on_success` runs exactly once, on the worker that
    /// performs the eventually-successful PUT, never on retry-exhaustion.
    #[instrument(skip(self, payload, on_success), fields(key = %key, size = payload.len()))]
    pub fn upload_with_hook(
        &self,
        key: String,
        content_type: String,
        payload: Vec<u8>,
        on_success: Option<Arc<dyn SuccessHook>>,
        cancellation: CancellationToken,
    ) -> Result<(), EngineError> {
        if cancellation.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        let req = UploadRequest { key, content_type, payload, on_success, cancellation };
        match self.tx.try_send(req) {
            Ok(()) => {
                debug!("upload admitted");
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(_)) => Err(EngineError::AdmissionFull),
            Err(mpsc::error::TrySendError::Closed(_)) => {
                Err(EngineError::Other(anyhow::anyhow!("upload queue is closed")))
            }
        }
    }

    /// Synchronous read-through download (spec §4.B `download`).
    #[instrument(skip(self), fields(key = %key))]
    pub async fn download(&self, key: &str) -> Result<(Vec<u8>, String), EngineError> {
        self.inner.download(key).await
    }
}

/// Bounded, deterministic jitter: ±5% of the nominal delay, derived from a
/// thread-local RNG (no need for it to be reproducible across runs — only
/// the bound matters to the spec).
fn jittered_backoff(base: Duration, attempt: u32) -> Duration {
    let nominal = base.saturating_mul(1u32.checked_shl(attempt).unwrap_or(u32::MAX));
    let nominal_ms = nominal.as_millis().max(1) as i64;
    let jitter_ms = (nominal_ms * 5) / 100;
    let offset = rand::random::<i64>().rem_euclid(2 * jitter_ms.max(1) + 1) - jitter_ms.max(1);
    let total_ms = (nominal_ms + offset).max(0) as u64;
    Duration::from_millis(total_ms)
}

async fn run_worker(
    worker_idx: usize,
    rx: Arc<tokio::sync::Mutex<mpsc::Receiver<UploadRequest>>>,
    inner: Arc<S3Inner>,
    max_retries: u32,
    retry_base_delay: Duration,
) {
    loop {
        let req = {
            let mut rx = rx.lock().await;
            rx.recv().await
        };
        let Some(req) = req else {
            debug!(worker_idx, "upload worker exiting, queue closed");
            return;
        };
        handle_request(worker_idx, &inner, req, max_retries, retry_base_delay).await;
    }
}

#[instrument(skip(inner, req), fields(worker_idx, key = %req.key))]
async fn handle_request(
    worker_idx: usize,
    inner: &S3Inner,
    req: UploadRequest,
    max_retries: u32,
    retry_base_delay: Duration,
) {
    let mut attempt = 0u32;
    loop {
        if req.cancellation.is_cancelled() {
            warn!(worker_idx, key = %req.key, "upload abandoned, request cancelled");
            return;
        }

        match inner.put(&req.key, &req.content_type, &req.payload).await {
            Ok(()) => {
                debug!(worker_idx, key = %req.key, attempt, "upload succeeded");
                if let Some(hook) = &req.on_success {
                    hook.call().await;
                }
                return;
            }
            Err(err) => {
                if attempt >= max_retries {
                    warn!(worker_idx, key = %req.key, attempt, error = %err, "upload retries exhausted, dropping");
                    return;
                }
                let delay = jittered_backoff(retry_base_delay, attempt);
                warn!(worker_idx, key = %req.key, attempt, error = %err, delay_ms = delay.as_millis() as u64, "upload attempt failed, retrying");
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = req.cancellation.cancelled() => {
                        warn!(worker_idx, key = %req.key, "upload abandoned during backoff, request cancelled");
                        return;
                    }
                }
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jittered_backoff_stays_within_five_percent() {
        let base = Duration::from_millis(300);
        for attempt in 0..4 {
            let nominal_ms = (300u128 << attempt) as i64;
            for _ in 0..200 {
                let got = jittered_backoff(base, attempt).as_millis() as i64;
                let lower = nominal_ms - (nominal_ms * 5) / 100 - 1;
                let upper = nominal_ms + (nominal_ms * 5) / 100 + 1;
                assert!(got >= lower.max(0) && got <= upper, "attempt {attempt}: {got} not in [{lower},{upper}]");
            }
        }
    }
}
