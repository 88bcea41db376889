use rolegate::{
    config::{load_config_from_yaml, LimiterConfig},
    limiter::{Decision, RateLimiter},
    metrics::Metrics,
    service::AdmissionService,
    store::MemoryCounterStore,
};
use std::{sync::Arc, time::Duration};
use tokio::time::sleep;

fn limiter_with(config: LimiterConfig) -> RateLimiter {
    RateLimiter::new(config, Box::new(MemoryCounterStore::default()))
}

#[tokio::test]
async fn test_quota_per_role() {
    let limiter = limiter_with(LimiterConfig::default());

    for (role, quota) in [("gold", 10), ("silver", 5), ("bronze", 2), ("unauthenticated", 1)] {
        let client = format!("client-{}", role);

        for i in 0..quota {
            let decision = limiter.admit(&client, Some(role)).await.unwrap();
            assert!(
                decision.is_allowed(),
                "{} request {} of {} should be allowed",
                role,
                i + 1,
                quota
            );
        }

        match limiter.admit(&client, Some(role)).await.unwrap() {
            Decision::Deny { reason } => {
                assert!(reason.contains(role), "reason should name the role: {}", reason)
            }
            other => panic!("{} request over quota not denied: {:?}", role, other),
        }
    }
}

#[tokio::test]
async fn test_denied_client_stays_denied_within_window() {
    let limiter = limiter_with(LimiterConfig::default());

    limiter.admit("c1", Some("bronze")).await.unwrap();
    limiter.admit("c1", Some("bronze")).await.unwrap();

    for _ in 0..5 {
        assert!(!limiter.admit("c1", Some("bronze")).await.unwrap().is_allowed());
    }
}

#[tokio::test]
async fn test_window_elapse_resets_count() {
    let config = LimiterConfig {
        window_secs: 1,
        ..Default::default()
    };
    let limiter = limiter_with(config);

    assert!(limiter.admit("c1", Some("bronze")).await.unwrap().is_allowed());
    assert!(limiter.admit("c1", Some("bronze")).await.unwrap().is_allowed());
    assert!(!limiter.admit("c1", Some("bronze")).await.unwrap().is_allowed());

    sleep(Duration::from_millis(1200)).await;

    // New window: the effective count restarts at 1.
    let decision = limiter.admit("c1", Some("bronze")).await.unwrap();
    assert_eq!(decision, Decision::Allow { remaining: 1 });
}

#[tokio::test]
async fn test_unknown_role_matches_unauthenticated() {
    let limiter = limiter_with(LimiterConfig::default());

    // Quota 1, like an unauthenticated client.
    assert!(limiter.admit("c1", Some("wizard")).await.unwrap().is_allowed());
    assert!(!limiter.admit("c1", Some("wizard")).await.unwrap().is_allowed());

    // The unrecognized label still appears in the deny reason.
    limiter.admit("c2", Some("wizard")).await.unwrap();
    match limiter.admit("c2", Some("wizard")).await.unwrap() {
        Decision::Deny { reason } => assert!(reason.contains("wizard")),
        other => panic!("expected deny, got {:?}", other),
    }
}

#[tokio::test]
async fn test_missing_role_uses_default_role() {
    let config = LimiterConfig {
        default_role: "bronze".to_string(),
        ..Default::default()
    };
    let limiter = limiter_with(config);

    assert!(limiter.admit("c1", None).await.unwrap().is_allowed());
    assert!(limiter.admit("c1", None).await.unwrap().is_allowed());
    match limiter.admit("c1", None).await.unwrap() {
        Decision::Deny { reason } => assert!(reason.contains("bronze")),
        other => panic!("expected deny, got {:?}", other),
    }
}

#[tokio::test]
async fn test_clients_do_not_share_windows() {
    let limiter = limiter_with(LimiterConfig::default());

    limiter.admit("c1", None).await.unwrap();
    assert!(!limiter.admit("c1", None).await.unwrap().is_allowed());

    // A different client is untouched by c1's exhausted window.
    assert!(limiter.admit("c2", None).await.unwrap().is_allowed());
}

#[tokio::test]
async fn test_concurrent_first_requests_single_window() {
    let limiter = Arc::new(limiter_with(LimiterConfig::default()));

    let mut handles = Vec::new();
    for _ in 0..50 {
        let limiter = Arc::clone(&limiter);
        handles.push(tokio::spawn(async move {
            limiter.admit("fresh-client", Some("silver")).await.unwrap()
        }));
    }

    let mut allowed = 0;
    let mut denied = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Decision::Allow { .. } => allowed += 1,
            Decision::Deny { .. } => denied += 1,
        }
    }

    // Exactly one logical window, zero over-admission.
    assert_eq!(allowed, 5);
    assert_eq!(denied, 45);
}

#[tokio::test]
async fn test_yaml_config_end_to_end() {
    let yaml = r#"
window_secs: 60
quotas:
  reviewer: 3
  unauthenticated: 1
"#;
    let config = load_config_from_yaml(yaml).unwrap();
    let limiter = limiter_with(config);

    for _ in 0..3 {
        assert!(limiter.admit("c1", Some("reviewer")).await.unwrap().is_allowed());
    }
    assert!(!limiter.admit("c1", Some("reviewer")).await.unwrap().is_allowed());

    // Roles outside the custom table get the unauthenticated quota.
    assert!(limiter.admit("c2", Some("gold")).await.unwrap().is_allowed());
    assert!(!limiter.admit("c2", Some("gold")).await.unwrap().is_allowed());
}

#[tokio::test]
async fn test_service_decisions_match_limiter() {
    let limiter = limiter_with(LimiterConfig::default());
    let service = AdmissionService::new(limiter, Arc::new(Metrics::new().unwrap()));

    assert!(service.check("c1", Some("bronze")).await.unwrap().is_allowed());
    assert!(service.check("c1", Some("bronze")).await.unwrap().is_allowed());

    match service.check("c1", Some("bronze")).await.unwrap() {
        Decision::Deny { reason } => assert!(reason.contains("bronze")),
        other => panic!("expected deny, got {:?}", other),
    }
}
