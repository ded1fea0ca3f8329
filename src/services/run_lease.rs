//! Per-exam lease that keeps two analysis runs from interleaving writes.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use crate::core::redis::RedisHandle;

type HeldSet = Arc<Mutex<HashSet<String>>>;

fn remove_held(held: &HeldSet, exam_id: &str) {
    match held.lock() {
        Ok(mut held) => held.remove(exam_id),
        Err(poisoned) => poisoned.into_inner().remove(exam_id),
    };
}

async fn unlock_redis(redis: &RedisHandle, exam_id: &str, owner: &str) {
    match redis.unlock(&lease_key(exam_id), owner).await {
        Ok(true) => {}
        Ok(false) => {
            tracing::warn!(exam_id, "Analysis lease expired before release");
        }
        Err(err) => {
            tracing::error!(exam_id, error = %err, "Failed to release analysis lease");
        }
    }
}

enum Hold {
    Local(HeldSet),
    Redis { redis: RedisHandle, owner: String },
    Released,
}

/// Held for the duration of one run. Dropping the token releases the lease,
/// so a run abandoned mid-way never leaves its exam locked.
pub(crate) struct LeaseToken {
    exam_id: String,
    hold: Hold,
}

impl LeaseToken {
    /// Releases now, waiting for the Redis unlock to finish.
    pub(crate) async fn release(mut self) {
        match std::mem::replace(&mut self.hold, Hold::Released) {
            Hold::Local(held) => remove_held(&held, &self.exam_id),
            Hold::Redis { redis, owner } => unlock_redis(&redis, &self.exam_id, &owner).await,
            Hold::Released => {}
        }
    }
}

impl Drop for LeaseToken {
    fn drop(&mut self) {
        match std::mem::replace(&mut self.hold, Hold::Released) {
            Hold::Local(held) => remove_held(&held, &self.exam_id),
            Hold::Redis { redis, owner } => match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    let exam_id = self.exam_id.clone();
                    handle.spawn(async move { unlock_redis(&redis, &exam_id, &owner).await });
                }
                Err(_) => {
                    tracing::warn!(exam_id = %self.exam_id, "No runtime to release analysis lease; it expires with its TTL");
                }
            },
            Hold::Released => {}
        }
    }
}

pub(crate) fn lease_key(exam_id: &str) -> String {
    format!("analysis-lease:{exam_id}")
}

/// `acquire` returns `None` while another run holds the exam.
#[async_trait]
pub(crate) trait RunLease: Send + Sync {
    async fn acquire(&self, exam_id: &str) -> anyhow::Result<Option<LeaseToken>>;
}

#[derive(Default)]
pub(crate) struct LocalRunLease {
    held: HeldSet,
}

impl LocalRunLease {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn try_insert(&self, exam_id: &str) -> bool {
        match self.held.lock() {
            Ok(mut held) => held.insert(exam_id.to_string()),
            Err(poisoned) => poisoned.into_inner().insert(exam_id.to_string()),
        }
    }
}

#[async_trait]
impl RunLease for LocalRunLease {
    async fn acquire(&self, exam_id: &str) -> anyhow::Result<Option<LeaseToken>> {
        if !self.try_insert(exam_id) {
            return Ok(None);
        }

        Ok(Some(LeaseToken { exam_id: exam_id.to_string(), hold: Hold::Local(self.held.clone()) }))
    }
}

/// Redis-backed lease shared across instances. Falls back to the in-process
/// set whenever no Redis connection is available.
pub(crate) struct RedisRunLease {
    redis: RedisHandle,
    ttl: Duration,
    local: LocalRunLease,
}

impl RedisRunLease {
    pub(crate) fn new(redis: RedisHandle, ttl: Duration) -> Self {
        Self { redis, ttl, local: LocalRunLease::new() }
    }
}

#[async_trait]
impl RunLease for RedisRunLease {
    async fn acquire(&self, exam_id: &str) -> anyhow::Result<Option<LeaseToken>> {
        let owner = Uuid::new_v4().to_string();

        match self.redis.try_lock(&lease_key(exam_id), &owner, self.ttl).await? {
            Some(true) => Ok(Some(LeaseToken {
                exam_id: exam_id.to_string(),
                hold: Hold::Redis { redis: self.redis.clone(), owner },
            })),
            Some(false) => Ok(None),
            None => {
                tracing::debug!(exam_id, "Redis unavailable, using in-process analysis lease");
                self.local.acquire(exam_id).await
            }
        }
    }
}
