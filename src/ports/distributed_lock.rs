//! DistributedLock port - Keyed claims shared by every relay instance.
//!
//! ## Why Idempotency Matters
//!
//! The same bus message can reach more than one backend instance, and
//! occasionally reach one instance twice. Writing to a browser socket is
//! not idempotent, so every delivery attempt is gated on a claim keyed by
//! `(project, event id)` before the write happens.
//!
//! A lock here has dedup semantics: once acquired, the key stays
//! *consumed* after `unlock` until its TTL expires, and `lock` keeps
//! answering `false` for it in the meantime.

use async_trait::async_trait;

/// Errors surfaced by lock adapters.
#[derive(Debug, thiserror::Error)]
pub enum LockError {
    /// Lock backend could not be reached or rejected the command
    #[error("Lock backend unavailable: {0}")]
    Unavailable(String),
}

/// Result of [`DistributedLock::try_claim`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// This caller owns the side effect guarded by the key.
    Claimed,
    /// Someone else already claimed the key inside its validity window.
    AlreadyClaimed,
}

impl ClaimOutcome {
    pub fn is_claimed(self) -> bool {
        self == ClaimOutcome::Claimed
    }
}

/// Port for distributed mutual exclusion / idempotency keyed by string.
#[async_trait]
pub trait DistributedLock: Send + Sync {
    /// Try to acquire `key`.
    ///
    /// Returns `Ok(false)` without error when the key is already held or
    /// consumed.
    async fn lock(&self, key: &str) -> Result<bool, LockError>;

    /// Release a previously acquired key.
    ///
    /// Best effort: safe to call after the key's TTL already expired.
    async fn unlock(&self, key: &str) -> Result<(), LockError>;

    /// Claim `key` for a one-shot side effect.
    ///
    /// Acquires and immediately releases the key. The claim is not a
    /// critical section; the write it guards happens after the release.
    async fn try_claim(&self, key: &str) -> Result<ClaimOutcome, LockError> {
        if !self.lock(key).await? {
            return Ok(ClaimOutcome::AlreadyClaimed);
        }

        if let Err(e) = self.unlock(key).await {
            tracing::warn!(key = %key, error = %e, "Failed to release delivery claim");
        }

        Ok(ClaimOutcome::Claimed)
    }
}
