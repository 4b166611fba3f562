#![allow(async_fn_in_trait)]

use serde::Serialize;

use crate::error::AppError;

/// Result of one attempt at binding a free code to a requester.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimOutcome {
    Claimed(String),
    /// No code is free.
    Exhausted,
    /// The write lost a race, either for the candidate codes or for the
    /// requester key itself. Another writer made progress in the meantime,
    /// so the caller re-reads and tries again.
    Contended,
}

/// Backing storage for one invite pool.
pub trait InviteStore: Send + Sync {
    /// Code already bound to `key`, if any.
    async fn find_assignment(&self, key: &str) -> Result<Option<String>, AppError>;

    /// Pick a code with no assignment and no usage and bind it to `key`.
    /// Must never bind a second code to `key` or a second key to a code.
    async fn try_claim(&self, key: &str, meta: Option<&str>) -> Result<ClaimOutcome, AppError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
    pub code: String,
    pub newly_assigned: bool,
}

/// First-available allocator with at most one code per requester key.
pub struct InviteAllocator<S> {
    store: S,
    label: &'static str,
}

impl<S: InviteStore> InviteAllocator<S> {
    pub fn new(store: S, label: &'static str) -> Self {
        Self { store, label }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Return the code bound to `key`, binding a free one first if needed.
    /// `Ok(None)` means the pool is exhausted.
    pub async fn assign(
        &self,
        key: &str,
        meta: Option<&str>,
    ) -> Result<Option<Assignment>, AppError> {
        let key = key.trim();
        if key.is_empty() {
            return Err(AppError::validation("requester key is required"));
        }

        // Every Contended round means another claim landed, so the loop ends
        // once the key is bound or the pool runs dry.
        let mut attempt = 0u32;
        loop {
            if let Some(code) = self.store.find_assignment(key).await? {
                return Ok(Some(Assignment {
                    code,
                    newly_assigned: false,
                }));
            }

            attempt += 1;
            match self.store.try_claim(key, meta).await? {
                ClaimOutcome::Claimed(code) => {
                    tracing::info!(pool = self.label, key, code = %code, attempt, "invite code assigned");
                    return Ok(Some(Assignment {
                        code,
                        newly_assigned: true,
                    }));
                }
                ClaimOutcome::Exhausted => {
                    tracing::warn!(pool = self.label, key, "invite pool exhausted");
                    return Ok(None);
                }
                ClaimOutcome::Contended => {
                    tracing::debug!(pool = self.label, key, attempt, "invite claim contended, retrying");
                }
            }
        }
    }
}
