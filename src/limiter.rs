use crate::{
    config::LimiterConfig,
    error::{RateLimitError, Result},
    store::{CounterStore, InitOutcome},
    utils::{deny_reason, rate_limit_key},
};

/// Outcome of an admission check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// The request may proceed; `remaining` is the quota left in the
    /// current window.
    Allow { remaining: u64 },
    /// The request is rejected with a human-readable reason naming the
    /// client's role.
    Deny { reason: String },
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow { .. })
    }
}

/// Stateless admission logic over an injected counter store.
///
/// The limiter holds no locks and caches nothing across requests; the
/// store's atomic primitives are the only synchronization. The stored count
/// is advanced first and compared against the quota afterwards, so the
/// per-key read-decide-increment sequence cannot over-admit under
/// concurrency. A denied request does advance the count past the limit;
/// remaining-quota arithmetic saturates.
pub struct RateLimiter {
    config: LimiterConfig,
    store: Box<dyn CounterStore>,
}

impl RateLimiter {
    /// Create a new limiter with the given counter store implementation.
    pub fn new(config: LimiterConfig, store: Box<dyn CounterStore>) -> Self {
        Self { config, store }
    }

    pub fn config(&self) -> &LimiterConfig {
        &self.config
    }

    /// Decide whether a request from `client_id` may proceed.
    ///
    /// A missing role resolves to the configured default role; a role absent
    /// from the quota table is limited like an unauthenticated client. The
    /// request that starts a window is always admitted and counts as the
    /// first of that window.
    pub async fn admit(&self, client_id: &str, role: Option<&str>) -> Result<Decision> {
        if client_id.is_empty() {
            return Err(RateLimitError::Service(
                "client id must not be empty".to_string(),
            ));
        }

        let role = role.unwrap_or(&self.config.default_role);
        let limit = self.config.quota_for(role);
        let key = rate_limit_key(client_id);
        let window = self.config.window();

        // Two passes: the entry observed by `get` may expire before the
        // matching `increment` lands, in which case the request belongs to
        // a fresh window and the sequence starts over.
        for _ in 0..2 {
            if self.store.get(&key).await?.is_none() {
                match self.store.initialize(&key, window).await? {
                    InitOutcome::Created => {
                        return Ok(Decision::Allow {
                            remaining: limit.saturating_sub(1),
                        });
                    }
                    // Lost the init race; this request is counted against
                    // the window that beat us, never a second counter.
                    InitOutcome::AlreadyExists => {}
                }
            }

            match self.store.increment(&key).await? {
                Some(count) if count > limit => {
                    return Ok(Decision::Deny {
                        reason: deny_reason(role),
                    });
                }
                Some(count) => {
                    return Ok(Decision::Allow {
                        remaining: limit - count,
                    });
                }
                None => continue,
            }
        }

        // The window expired twice mid-sequence; treat this request as the
        // first of whichever window exists now.
        self.store.initialize(&key, window).await?;
        Ok(Decision::Allow {
            remaining: limit.saturating_sub(1),
        })
    }

    /// Health check for the limiter
    pub async fn health_check(&self) -> Result<()> {
        self.store.health_check().await
    }
}
