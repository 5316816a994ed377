//! Component G — the two small Redis-backed caches the use-case layer
//! leans on: a namespaced metadata cache, and an identifier cache that
//! hands out opaque, resolvable handles for storage keys.

use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::Utc;
use rand::Rng;
use sha2::{Digest, Sha256};
use tracing::{debug, instrument};

use crate::error::EngineError;
use crate::holder::ClientHolder;

/// Namespaced key/value cache over plain `GET`/`SET EX`/`DEL`.
#[derive(Clone)]
pub struct MetadataCache {
    holder: Arc<ClientHolder>,
    namespace: String,
}

impl MetadataCache {
    pub fn new(holder: Arc<ClientHolder>, namespace: String) -> MetadataCache {
        MetadataCache { holder, namespace }
    }

    fn namespaced(&self, key: &str) -> String {
        format!("{}:{}", self.namespace, key)
    }

    #[instrument(skip(self), fields(namespace = %self.namespace, key = %key))]
    pub async fn get(&self, key: &str) -> Result<Option<String>, EngineError> {
        let mut conn = self.holder.conn();
        let cmd = redis::cmd("GET").arg(self.namespaced(key)).clone();
        let value: Option<String> = conn.query(&cmd).await?;
        Ok(value)
    }

    #[instrument(skip(self, value), fields(namespace = %self.namespace, key = %key))]
    pub async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), EngineError> {
        let mut conn = self.holder.conn();
        let cmd = redis::cmd("SET")
            .arg(self.namespaced(key))
            .arg(value)
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .clone();
        let _: () = conn.query(&cmd).await?;
        debug!("metadata cache entry stored");
        Ok(())
    }

    #[instrument(skip(self), fields(namespace = %self.namespace, key = %key))]
    pub async fn remove(&self, key: &str) -> Result<(), EngineError> {
        let mut conn = self.holder.conn();
        let cmd = redis::cmd("DEL").arg(self.namespaced(key)).clone();
        let _: () = conn.query(&cmd).await?;
        Ok(())
    }

    /// Deletes every one of `keys` under this namespace via a pipeline, the
    /// way the original's bulk `Flush` does.
    #[instrument(skip(self, keys), fields(namespace = %self.namespace, count = keys.len()))]
    pub async fn flush(&self, keys: &[String]) -> Result<(), EngineError> {
        if keys.is_empty() {
            return Ok(());
        }
        let mut pipe = redis::pipe();
        for key in keys {
            pipe.cmd("DEL").arg(self.namespaced(key));
        }
        let mut conn = self.holder.conn();
        let _: Vec<i64> = redis_pipe_query(&mut conn, &pipe).await?;
        Ok(())
    }
}

async fn redis_pipe_query<T: redis::FromRedisValue>(
    conn: &mut crate::holder::RedisConn,
    pipe: &redis::Pipeline,
) -> Result<T, EngineError> {
    match conn {
        crate::holder::RedisConn::Single(c) => Ok(pipe.query_async(c).await?),
        crate::holder::RedisConn::Cluster(c) => Ok(pipe.query_async(c).await?),
    }
}

/// Hands out an opaque, TTL-bound handle for a storage key, and resolves it
/// back. Grounded on the original's identifier-cache manager, with SHA-256
/// standing in for its SHA-1 hash (see DESIGN.md).
#[derive(Clone)]
pub struct IdentifierCache {
    holder: Arc<ClientHolder>,
}

const IDENTIFIER_PREFIX: &str = "MH:Image:";

impl IdentifierCache {
    pub fn new(holder: Arc<ClientHolder>) -> IdentifierCache {
        IdentifierCache { holder }
    }

    /// Generates a hash of the current timestamp plus a random nonce,
    /// stores `MH:Image:<hash> -> image_key` with the given TTL, and
    /// returns the hash.
    #[instrument(skip(self, image_key))]
    pub async fn create(&self, image_key: &str, ttl: Duration) -> Result<String, EngineError> {
        let nonce: u64 = rand::thread_rng().gen();
        let seed = format!("{}{}", Utc::now().timestamp_nanos_opt().unwrap_or_default(), nonce);
        let digest = Sha256::digest(seed.as_bytes());
        let hash = URL_SAFE_NO_PAD.encode(digest);

        let mut conn = self.holder.conn();
        let cmd = redis::cmd("SET")
            .arg(format!("{IDENTIFIER_PREFIX}{hash}"))
            .arg(image_key)
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .clone();
        let _: () = conn.query(&cmd).await?;
        debug!(hash = %hash, "identifier issued");
        Ok(hash)
    }

    /// Resolves a previously-issued hash back to its storage key, if it
    /// hasn't expired.
    #[instrument(skip(self))]
    pub async fn resolve(&self, hash: &str) -> Result<Option<String>, EngineError> {
        let mut conn = self.holder.conn();
        let cmd = redis::cmd("GET").arg(format!("{IDENTIFIER_PREFIX}{hash}")).clone();
        let value: Option<String> = conn.query(&cmd).await?;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifier_prefix_matches_spec_key_format() {
        assert_eq!(IDENTIFIER_PREFIX, "MH:Image:");
    }
}
