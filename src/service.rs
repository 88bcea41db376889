use std::sync::Arc;
use tracing::warn;

use crate::{
    config::FailureMode,
    error::{RateLimitError, Result},
    limiter::{Decision, RateLimiter},
    metrics::Metrics,
};

/// Admission service wrapping the limiter with metrics and the configured
/// store-failure policy.
///
/// The core limiter propagates store failures as errors; this layer is the
/// one place the fail-open/fail-closed choice is applied. Under fail-closed
/// the error reaches the edge unchanged, so a store outage stays
/// distinguishable from a quota denial.
pub struct AdmissionService {
    limiter: Arc<RateLimiter>,
    metrics: Arc<Metrics>,
}

impl AdmissionService {
    /// Create a new admission service
    pub fn new(limiter: RateLimiter, metrics: Arc<Metrics>) -> Self {
        Self {
            limiter: Arc::new(limiter),
            metrics,
        }
    }

    /// Check one request against the client's quota.
    pub async fn check(&self, client_id: &str, role: Option<&str>) -> Result<Decision> {
        let timer = self.metrics.start_request_timer();

        let role_label = role
            .unwrap_or(&self.limiter.config().default_role)
            .to_string();
        self.metrics.record_admit_request(&role_label);

        let result = self.limiter.admit(client_id, role).await;
        drop(timer);

        match result {
            Ok(decision) => {
                match &decision {
                    Decision::Allow { .. } => self.metrics.record_allowed(&role_label),
                    Decision::Deny { .. } => self.metrics.record_denied(&role_label),
                }
                Ok(decision)
            }
            Err(e @ (RateLimitError::StoreUnavailable(_) | RateLimitError::Redis(_))) => {
                self.metrics.record_store_error();
                match self.limiter.config().failure_mode {
                    FailureMode::FailOpen => {
                        warn!("counter store failed, admitting request (fail-open): {}", e);
                        self.metrics.record_fail_open_admission();
                        Ok(Decision::Allow { remaining: 0 })
                    }
                    FailureMode::FailClosed => Err(e),
                }
            }
            Err(e) => Err(e),
        }
    }

    /// Health check for the service
    pub async fn health_check(&self) -> Result<()> {
        self.limiter.health_check().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::LimiterConfig,
        store::{CounterEntry, CounterStore, InitOutcome, MemoryCounterStore},
    };
    use async_trait::async_trait;
    use std::time::Duration;

    /// Store whose backing medium is always unreachable.
    struct UnreachableStore;

    #[async_trait]
    impl CounterStore for UnreachableStore {
        async fn get(&self, _key: &str) -> crate::error::Result<Option<CounterEntry>> {
            Err(RateLimitError::StoreUnavailable("connection refused".into()))
        }

        async fn initialize(
            &self,
            _key: &str,
            _window: Duration,
        ) -> crate::error::Result<InitOutcome> {
            Err(RateLimitError::StoreUnavailable("connection refused".into()))
        }

        async fn increment(&self, _key: &str) -> crate::error::Result<Option<u64>> {
            Err(RateLimitError::StoreUnavailable("connection refused".into()))
        }

        async fn health_check(&self) -> crate::error::Result<()> {
            Err(RateLimitError::StoreUnavailable("connection refused".into()))
        }
    }

    fn service_with(config: LimiterConfig, store: Box<dyn CounterStore>) -> AdmissionService {
        let limiter = RateLimiter::new(config, store);
        AdmissionService::new(limiter, Arc::new(Metrics::new().unwrap()))
    }

    #[tokio::test]
    async fn test_check_allows_and_denies() {
        let service = service_with(
            LimiterConfig::default(),
            Box::new(MemoryCounterStore::default()),
        );

        assert!(service.check("c1", None).await.unwrap().is_allowed());
        assert!(!service.check("c1", None).await.unwrap().is_allowed());
    }

    #[tokio::test]
    async fn test_fail_closed_surfaces_store_error() {
        let service = service_with(LimiterConfig::default(), Box::new(UnreachableStore));

        let result = service.check("c1", Some("gold")).await;
        assert!(matches!(result, Err(RateLimitError::StoreUnavailable(_))));
    }

    #[tokio::test]
    async fn test_fail_open_admits_on_store_error() {
        let config = LimiterConfig {
            failure_mode: FailureMode::FailOpen,
            ..Default::default()
        };
        let service = service_with(config, Box::new(UnreachableStore));

        let decision = service.check("c1", Some("gold")).await.unwrap();
        assert!(decision.is_allowed());
    }

    #[tokio::test]
    async fn test_fail_open_does_not_mask_validation_errors() {
        let config = LimiterConfig {
            failure_mode: FailureMode::FailOpen,
            ..Default::default()
        };
        let service = service_with(config, Box::new(MemoryCounterStore::default()));

        let result = service.check("", Some("gold")).await;
        assert!(matches!(result, Err(RateLimitError::Service(_))));
    }

    #[tokio::test]
    async fn test_health_check_reports_store_failure() {
        let service = service_with(LimiterConfig::default(), Box::new(UnreachableStore));
        assert!(service.health_check().await.is_err());
    }
}
