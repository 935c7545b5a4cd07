//! Failure injection against the execution engine.

use resilience_core::breaker::CircuitState;
use resilience_core::errors::{DependencyError, ErrorKind, ExecutionError};
use resilience_core::executor::ExecuteOptions;
use resilience_core::failover::FailoverStrategy;
use resilience_core::ResilientExecutor;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

mod common;

#[tokio::test]
async fn test_attempt_timeout_counts_as_failure() {
    let mut config = common::engine_config(FailoverStrategy::RetryThenFailover, &[("primary", 0)]);
    config.breaker.failure_threshold = 2;
    config.retry.max_attempts = 2;
    let executor = ResilientExecutor::new(config).unwrap();

    let err = executor
        .execute(
            ExecuteOptions::new("store").attempt_timeout(Duration::from_millis(20)),
            |_| async {
                tokio::time::sleep(Duration::from_millis(200)).await;
                Ok(Value::from(1))
            },
        )
        .await
        .unwrap_err();

    match &err {
        ExecutionError::FailoverExhausted { attempts, source, .. } => {
            assert_eq!(*attempts, 2);
            assert_eq!(source.kind, ErrorKind::Timeout);
        }
        other => panic!("expected FailoverExhausted, got {}", other),
    }

    // Both timed-out attempts were qualifying failures.
    assert_eq!(executor.summary().breakers[0].state, CircuitState::Open);
}

#[tokio::test]
async fn test_all_endpoints_down_exhausts_failover() {
    let mut config = common::engine_config(
        FailoverStrategy::RetryThenFailover,
        &[("primary", 0), ("secondary", 1)],
    );
    config.retry.max_attempts = 2;
    let executor = ResilientExecutor::new(config).unwrap();

    let calls = Arc::new(AtomicU32::new(0));
    let calls_op = calls.clone();
    let err = executor
        .execute(ExecuteOptions::new("store"), move |_| {
            let calls = calls_op.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<Value, _>(DependencyError::network("connection reset"))
            }
        })
        .await
        .unwrap_err();

    match err {
        ExecutionError::FailoverExhausted { attempts, .. } => assert_eq!(attempts, 4),
        other => panic!("expected FailoverExhausted, got {}", other),
    }
    assert_eq!(
        calls.load(Ordering::SeqCst),
        4,
        "full retry budget against each of the two endpoints"
    );
    assert_eq!(executor.summary().counters.failovers, 1);
}

#[tokio::test]
async fn test_fallback_served_after_exhaustion() {
    let mut config = common::engine_config(FailoverStrategy::RetryThenFailover, &[("primary", 0)]);
    config.retry.max_attempts = 2;
    let executor = ResilientExecutor::new(config).unwrap();

    let value = executor
        .execute(
            ExecuteOptions::new("store").fallback(|| Value::from("stale copy")),
            |_| async { Err::<Value, _>(DependencyError::unavailable("down")) },
        )
        .await
        .unwrap();

    assert_eq!(value, Value::from("stale copy"));
    assert_eq!(executor.summary().counters.fallbacks, 1);
}

#[tokio::test]
async fn test_immediate_strategy_switches_on_first_failure() {
    let executor = ResilientExecutor::new(common::engine_config(
        FailoverStrategy::Immediate,
        &[("primary", 0), ("secondary", 1)],
    ))
    .unwrap();

    let value = executor
        .execute(ExecuteOptions::new("store"), |endpoint| async move {
            if endpoint.id() == "primary" {
                Err(DependencyError::unavailable("primary down"))
            } else {
                Ok(Value::from("from secondary"))
            }
        })
        .await
        .unwrap();

    assert_eq!(value, Value::from("from secondary"));
    let summary = executor.summary();
    assert_eq!(summary.counters.failovers, 1);
    assert_eq!(summary.dependencies[0].active_endpoint, "secondary");
}

#[tokio::test]
async fn test_probe_restores_endpoint_after_recovery() {
    let mut config = common::engine_config(
        FailoverStrategy::RetryThenFailover,
        &[("primary", 0), ("secondary", 1)],
    );
    config.retry.max_attempts = 1;
    config.dependencies[0].unhealthy_threshold = 1;
    config.health_check.enabled = true;
    config.health_check.interval_ms = 20;
    config.health_check.timeout_ms = 50;
    let executor = ResilientExecutor::new(config).unwrap();

    let primary_up = Arc::new(AtomicBool::new(false));
    let operation = {
        let primary_up = primary_up.clone();
        move |endpoint: Arc<resilience_core::failover::Endpoint>| {
            let primary_up = primary_up.clone();
            async move {
                if endpoint.id() == "primary" && !primary_up.load(Ordering::SeqCst) {
                    Err(DependencyError::unavailable("primary down"))
                } else {
                    Ok(Value::from(endpoint.id().to_string()))
                }
            }
        }
    };

    // The first call knocks primary out and lands on secondary.
    let value = executor
        .execute(ExecuteOptions::new("store"), operation.clone())
        .await
        .unwrap();
    assert_eq!(value, Value::from("secondary"));

    // While primary is unhealthy, traffic keeps going to secondary.
    let value = executor
        .execute(ExecuteOptions::new("store"), operation.clone())
        .await
        .unwrap();
    assert_eq!(value, Value::from("secondary"));

    // Primary comes back; its probe reports success and restores it.
    let probe_up = primary_up.clone();
    executor
        .register_health_probe("store", "primary", move || {
            let up = probe_up.clone();
            async move {
                if up.load(Ordering::SeqCst) {
                    Ok(())
                } else {
                    Err(DependencyError::unavailable("probe refused"))
                }
            }
        })
        .unwrap();

    primary_up.store(true, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(150)).await;

    let value = executor
        .execute(ExecuteOptions::new("store"), operation)
        .await
        .unwrap();
    assert_eq!(value, Value::from("primary"), "priority returns to the recovered endpoint");

    executor.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_stops_probe_timers() {
    let mut config = common::engine_config(FailoverStrategy::RetryThenFailover, &[("primary", 0)]);
    config.health_check.enabled = true;
    config.health_check.interval_ms = 10;
    config.health_check.timeout_ms = 20;
    let executor = ResilientExecutor::new(config).unwrap();

    let probes = Arc::new(AtomicU32::new(0));
    let probes_inner = probes.clone();
    executor
        .register_health_probe("store", "primary", move || {
            probes_inner.fetch_add(1, Ordering::SeqCst);
            async { Ok(()) }
        })
        .unwrap();

    tokio::time::sleep(Duration::from_millis(60)).await;
    executor.shutdown().await;

    let after_shutdown = probes.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(
        probes.load(Ordering::SeqCst),
        after_shutdown,
        "no probe may fire after shutdown"
    );
}

#[tokio::test]
async fn test_coalesced_failure_shared_by_all_waiters() {
    let executor = Arc::new(
        ResilientExecutor::new(common::engine_config(
            FailoverStrategy::RetryThenFailover,
            &[("primary", 0)],
        ))
        .unwrap(),
    );

    let calls = Arc::new(AtomicU32::new(0));
    let mut handles = Vec::new();
    for _ in 0..8 {
        let executor = executor.clone();
        let calls = calls.clone();
        handles.push(tokio::spawn(async move {
            executor
                .get_cached_or_execute("user:1", ExecuteOptions::new("store"), move |_| {
                    let calls = calls.clone();
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(30)).await;
                        Err::<Value, _>(DependencyError::new(
                            ErrorKind::InvalidInput,
                            "malformed query",
                        ))
                    }
                })
                .await
        }));
    }

    for handle in handles {
        let err = handle.await.unwrap().unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidInput);
    }
    assert_eq!(
        calls.load(Ordering::SeqCst),
        1,
        "one underlying call, its terminal error fanned out"
    );

    // Nothing was cached; a later caller recomputes.
    assert_eq!(executor.cache().get("user:1"), None);
}

#[tokio::test]
async fn test_unhealthy_endpoint_skipped_by_cascade() {
    let mut config = common::engine_config(
        FailoverStrategy::Cascade,
        &[("a", 1), ("b", 2), ("c", 3)],
    );
    config.dependencies[0].unhealthy_threshold = 1;
    let executor = ResilientExecutor::new(config).unwrap();

    // First call: "a" fails and is marked unhealthy, "b" answers.
    let calls_to_a = Arc::new(AtomicU32::new(0));
    let calls_a = calls_to_a.clone();
    let operation = move |endpoint: Arc<resilience_core::failover::Endpoint>| {
        let calls_to_a = calls_a.clone();
        async move {
            match endpoint.id() {
                "a" => {
                    calls_to_a.fetch_add(1, Ordering::SeqCst);
                    Err(DependencyError::unavailable("a down"))
                }
                other => Ok(Value::from(other.to_string())),
            }
        }
    };

    let value = executor
        .execute(ExecuteOptions::new("store"), operation.clone())
        .await
        .unwrap();
    assert_eq!(value, Value::from("b"));

    // Second call: "a" is out of the cascade entirely.
    let value = executor
        .execute(ExecuteOptions::new("store"), operation)
        .await
        .unwrap();
    assert_eq!(value, Value::from("b"));
    assert_eq!(calls_to_a.load(Ordering::SeqCst), 1, "unhealthy endpoint is not attempted");
}
