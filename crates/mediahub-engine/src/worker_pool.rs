//! Component D — the conversion worker pool: consumer-group reader, orphan
//! reclaim, per-message retry via re-enqueue, and ack discipline.
//!
//! Mirrors the original's `queue.Worker` almost line for line: a shared
//! consumer group and identity across `workers` goroutines (here, tasks),
//! an `XAUTOCLAIM` sweep that runs once up front to recover anything an
//! earlier, now-dead consumer left pending, then each task loops on
//! `XREADGROUP ... COUNT 1 BLOCK <block_timeout>`.

use std::sync::Arc;
use std::time::Duration;

use mediahub_core::config::WebpWorkerConfig;
use mediahub_core::job::{ConversionJob, StreamEntry};
use redis::streams::{StreamAutoClaimOptions, StreamMaxlen, StreamReadOptions};
use redis::AsyncCommands;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, instrument, warn};

use crate::converter;
use crate::error::EngineError;
use crate::holder::ClientHolder;
use crate::object_store::ObjectStore;

const AUTOCLAIM_BATCH: usize = 100;
const AUTOCLAIM_MIN_IDLE_FLOOR_MS: u64 = 30_000;

/// Starts the pool: ensures the consumer group exists, reclaims orphaned
/// pending entries once, then spawns `cfg.workers` reader tasks sharing the
/// configured consumer identity. Returns once every task has exited
/// (normally only on cancellation).
pub async fn run(
    holder: Arc<ClientHolder>,
    store: ObjectStore,
    cfg: WebpWorkerConfig,
    cancellation: CancellationToken,
) -> Result<(), EngineError> {
    ensure_group(&holder, &cfg).await?;
    reclaim_orphans(&holder, &cfg).await?;

    let mut tasks = JoinSet::new();
    for worker_idx in 0..cfg.workers.max(1) {
        let holder = holder.clone();
        let store = store.clone();
        let cfg = cfg.clone();
        let cancellation = cancellation.clone();
        tasks.spawn(async move {
            read_loop(worker_idx, holder, store, cfg, cancellation).await;
        });
    }

    while tasks.join_next().await.is_some() {}
    Ok(())
}

/// `XGROUP CREATE ... MKSTREAM 0`; an already-existing group (`BUSYGROUP`)
/// is success, not failure.
#[instrument(skip(holder, cfg))]
async fn ensure_group(holder: &ClientHolder, cfg: &WebpWorkerConfig) -> Result<(), EngineError> {
    let mut conn = holder.conn();
    let result: redis::RedisResult<()> = conn.xgroup_create_mkstream(&cfg.stream, &cfg.group, "0").await;
    match result {
        Ok(()) => Ok(()),
        Err(err) if err.code() == Some("BUSYGROUP") => {
            debug!("consumer group already exists");
            Ok(())
        }
        Err(err) => Err(err.into()),
    }
}

/// One-shot sweep over pending entries idle longer than
/// `max(30s, 6 * block_timeout)`, claiming them under our own consumer
/// identity so a dead consumer's in-flight jobs aren't lost.
#[instrument(skip(holder, cfg))]
async fn reclaim_orphans(holder: &ClientHolder, cfg: &WebpWorkerConfig) -> Result<(), EngineError> {
    let min_idle = AUTOCLAIM_MIN_IDLE_FLOOR_MS.max(cfg.block_timeout_ms.saturating_mul(6));
    let mut cursor = "0-0".to_string();

    loop {
        let mut conn = holder.conn();
        let options = StreamAutoClaimOptions::default().count(AUTOCLAIM_BATCH);
        let reply: redis::streams::StreamAutoClaimReply = match conn
            .xautoclaim_options(&cfg.stream, &cfg.group, &cfg.consumer, min_idle, &cursor, options)
            .await
        {
            Ok(reply) => reply,
            Err(err) => {
                warn!(error = %err, "orphan reclaim sweep failed, continuing without it");
                return Ok(());
            }
        };

        if reply.claimed.is_empty() {
            return Ok(());
        }
        debug!(count = reply.claimed.len(), "reclaimed orphaned stream entries");
        if reply.cursor == "0-0" {
            return Ok(());
        }
        cursor = reply.cursor;
    }
}

fn field(map: &std::collections::HashMap<String, redis::Value>, name: &str) -> Option<String> {
    map.get(name).and_then(|v| redis::from_redis_value::<String>(v).ok())
}

#[instrument(skip(holder, store, cfg, cancellation), fields(worker_idx, stream = %cfg.stream, group = %cfg.group))]
async fn read_loop(
    worker_idx: usize,
    holder: Arc<ClientHolder>,
    store: ObjectStore,
    cfg: WebpWorkerConfig,
    cancellation: CancellationToken,
) {
    loop {
        if cancellation.is_cancelled() {
            debug!(worker_idx, "conversion worker stopping, cancellation requested");
            return;
        }

        let options = StreamReadOptions::default()
            .group(&cfg.group, &cfg.consumer)
            .count(1)
            .block(cfg.block_timeout_ms as usize);

        let reply = {
            let mut conn = holder.conn();
            tokio::select! {
                result = conn.xread_options(&[&cfg.stream], &[">"], &options) => result,
                _ = cancellation.cancelled() => {
                    debug!(worker_idx, "conversion worker stopping mid-read");
                    return;
                }
            }
        };

        let reply: redis::streams::StreamReadReply = match reply {
            Ok(reply) => reply,
            Err(err) => {
                warn!(worker_idx, error = %err, "XREADGROUP failed, retrying");
                continue;
            }
        };

        for stream_key in reply.keys {
            for stream_id in stream_key.ids {
                handle_message(worker_idx, &holder, &store, &cfg, stream_id).await;
            }
        }
    }
}

/// Acks `id` regardless of outcome, the way the original's `defer XAck`
/// does, so a malformed or permanently-failing message never blocks the
/// pending-entries list.
#[instrument(skip(holder, store, cfg, stream_id), fields(worker_idx, id = %stream_id.id))]
async fn handle_message(
    worker_idx: usize,
    holder: &Arc<ClientHolder>,
    store: &ObjectStore,
    cfg: &WebpWorkerConfig,
    stream_id: redis::streams::StreamId,
) {
    let id = stream_id.id.clone();

    let ack = |id: String| {
        let holder = holder.clone();
        let cfg = cfg.clone();
        async move {
            let mut conn = holder.conn();
            let result: redis::RedisResult<i64> = conn.xack(&cfg.stream, &cfg.group, &[id.as_str()]).await;
            if let Err(err) = result {
                warn!(error = %err, id = %id, "XACK failed");
            }
        }
    };

    let Some(raw_payload) = field(&stream_id.map, "payload") else {
        warn!(worker_idx, id = %id, "stream entry missing payload field, dropping");
        ack(id).await;
        return;
    };
    let attempt: u32 = field(&stream_id.map, "attempt").and_then(|s| s.parse().ok()).unwrap_or(0);

    let entry = StreamEntry::retry(raw_payload.clone(), attempt);
    let job = match entry.job() {
        Ok(job) => job,
        Err(err) => {
            error!(worker_idx, id = %id, error = %err, "malformed conversion job payload, dropping");
            ack(id).await;
            return;
        }
    };

    match process(store, &job).await {
        Ok(()) => {
            debug!(worker_idx, id = %id, attempt, key = %job.object_key, "conversion succeeded");
            ack(id).await;
        }
        Err(err) => {
            if attempt + 1 >= cfg.max_attempts {
                error!(worker_idx, id = %id, attempt, error = %err, "conversion retries exhausted, dropping");
                ack(id).await;
                return;
            }
            let next_attempt = attempt + 1;
            let backoff = Duration::from_millis(cfg.backoff_base_ms.saturating_mul(1u64 << attempt.min(32)));
            warn!(worker_idx, id = %id, attempt, error = %err, backoff_ms = backoff.as_millis() as u64, "conversion failed, scheduling retry");

            ack(id).await;
            schedule_retry(holder.clone(), cfg.clone(), raw_payload, next_attempt, backoff);
        }
    }
}

/// Re-enqueues the job after `backoff`, detached from the handling task's
/// lifetime (the original uses `time.AfterFunc` against a background
/// context for the same reason: the retry must survive past this
/// particular read-loop iteration).
fn schedule_retry(
    holder: Arc<ClientHolder>,
    cfg: WebpWorkerConfig,
    raw_payload: String,
    attempt: u32,
    backoff: Duration,
) {
    tokio::spawn(async move {
        tokio::time::sleep(backoff).await;
        let mut conn = holder.conn();
        let result: redis::RedisResult<String> = conn
            .xadd_maxlen(
                &cfg.stream,
                StreamMaxlen::Approx(cfg.max_len.max(0) as usize),
                "*",
                &[("payload", raw_payload.as_str()), ("attempt", attempt.to_string().as_str())],
            )
            .await;
        if let Err(err) = result {
            error!(error = %err, attempt, "failed to re-enqueue retried conversion job");
        }
    });
}

/// Downloads the original, converts it to WebP, and uploads the result
/// with no success hook (the conversion pipeline is terminal).
async fn process(store: &ObjectStore, job: &ConversionJob) -> Result<(), EngineError> {
    let (bytes, _content_type) = store.download(&job.object_key).await?;
    let webp_bytes = converter::convert_to_webp(&bytes, &job.ext)?;
    store.upload_with_hook(
        job.target_key(),
        "image/webp".to_string(),
        webp_bytes,
        None,
        CancellationToken::new(),
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_lookup_finds_named_entry() {
        let mut map = std::collections::HashMap::new();
        map.insert("payload".to_string(), redis::Value::Nil);
        assert!(field(&map, "missing").is_none());
    }
}
