//! Integration tests for the generation controller behind the service:
//! idempotence, in-flight deduplication and the concurrency ceiling.
//!
//! Run with: cargo test --test generation_integration

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{
    request_json, service_with_backend, unique_campaign, wait_until, CountingCompiler,
    FlakyCompiler, GatedCompiler,
};
use domain::models::{GenerationOptions, GenerationRequest};
use mailcraft_api::services::{BatchItem, ControllerSettings, GenerationError};
use tokio_test::assert_ok;

fn request(campaign: &str) -> GenerationRequest {
    serde_json::from_value(request_json(campaign)).unwrap()
}

#[tokio::test]
async fn test_identical_requests_share_one_render() {
    let compiler = Arc::new(CountingCompiler::new(Duration::ZERO));
    let service = service_with_backend(compiler.clone(), ControllerSettings::default());
    let request = request(&unique_campaign());

    let first = service
        .generate_complete(&request, GenerationOptions::default())
        .await
        .unwrap();
    let second = service
        .generate_complete(&request, GenerationOptions::default())
        .await
        .unwrap();

    assert_eq!(compiler.calls(), 1);
    assert!(!first.cached);
    assert!(second.cached);
    assert_eq!(first.fingerprint, second.fingerprint);
    assert_eq!(first.template.id, second.template.id);
}

#[tokio::test]
async fn test_concurrent_identical_requests_run_once() {
    let compiler = Arc::new(CountingCompiler::new(Duration::from_millis(200)));
    let service = service_with_backend(compiler.clone(), ControllerSettings::default());
    let request = request(&unique_campaign());

    let mut handles = Vec::new();
    for _ in 0..4 {
        let service = Arc::clone(&service);
        let request = request.clone();
        handles.push(tokio::spawn(async move {
            service
                .generate_complete(&request, GenerationOptions::default())
                .await
        }));
    }

    let mut fingerprints = Vec::new();
    let mut cached = 0;
    for handle in handles {
        let outcome = handle.await.unwrap().unwrap();
        if outcome.cached {
            cached += 1;
        }
        fingerprints.push(outcome.fingerprint);
    }

    assert_eq!(compiler.calls(), 1);
    assert_eq!(cached, 3);
    assert!(fingerprints.windows(2).all(|w| w[0] == w[1]));
    assert_eq!(service.controller().in_flight_count(), 0);
}

#[tokio::test]
async fn test_ceiling_rejects_extra_generation() {
    let compiler = Arc::new(GatedCompiler::new());
    let service = service_with_backend(
        compiler.clone(),
        ControllerSettings {
            max_concurrent: 5,
            ..ControllerSettings::default()
        },
    );

    let mut handles = Vec::new();
    for _ in 0..5 {
        let service = Arc::clone(&service);
        let request = request(&unique_campaign());
        handles.push(tokio::spawn(async move {
            service
                .generate_complete(&request, GenerationOptions::default())
                .await
        }));
    }
    assert!(wait_until(|| service.controller().in_flight_count() == 5).await);

    let rejected = service
        .generate_complete(&request(&unique_campaign()), GenerationOptions::default())
        .await;
    match rejected {
        Err(GenerationError::MaxConcurrentGenerationsExceeded { limit }) => assert_eq!(limit, 5),
        other => panic!("expected ceiling rejection, got {:?}", other.map(|o| o.fingerprint)),
    }

    compiler.release();
    for handle in handles {
        assert_ok!(handle.await.unwrap());
    }
    assert_eq!(service.controller().in_flight_count(), 0);
}

#[tokio::test]
async fn test_cache_time_does_not_change_fingerprint() {
    let compiler = Arc::new(CountingCompiler::new(Duration::ZERO));
    let service = service_with_backend(compiler.clone(), ControllerSettings::default());
    let request = request(&unique_campaign());

    let short = GenerationOptions {
        cache_time_secs: Some(60),
        ..GenerationOptions::default()
    };
    let long = GenerationOptions {
        cache_time_secs: Some(86_400),
        ..GenerationOptions::default()
    };

    let first = service.generate_complete(&request, short).await.unwrap();
    let second = service.generate_complete(&request, long).await.unwrap();

    assert_eq!(first.fingerprint, second.fingerprint);
    assert!(second.cached);
    assert_eq!(compiler.calls(), 1);
}

#[tokio::test]
async fn test_failed_generation_releases_claim() {
    let service = service_with_backend(Arc::new(FlakyCompiler::new()), ControllerSettings::default());
    let request = request(&unique_campaign());

    let failed = service
        .generate_complete(&request, GenerationOptions::default())
        .await;
    assert_eq!(failed.unwrap_err().code(), "COMPILE_FAILED");
    assert_eq!(service.controller().in_flight_count(), 0);

    let retried = service
        .generate_complete(&request, GenerationOptions::default())
        .await
        .unwrap();
    assert!(!retried.cached);

    let stats = service.cache_stats().await;
    assert_eq!(stats.generations, 1);
    assert_eq!(stats.store.entries, 1);
}

#[tokio::test]
async fn test_batch_items_are_independent() {
    let compiler = Arc::new(CountingCompiler::new(Duration::from_millis(20)));
    let service = service_with_backend(compiler.clone(), ControllerSettings::default());

    let mut missing_cta = request(&unique_campaign());
    if let Some(content) = missing_cta.content_context.as_mut() {
        content.calls_to_action.clear();
    }

    let items = vec![
        BatchItem {
            id: "first".to_string(),
            request: request(&unique_campaign()),
            options: None,
        },
        BatchItem {
            id: "no-cta".to_string(),
            request: missing_cta,
            options: None,
        },
        BatchItem {
            id: "third".to_string(),
            request: request(&unique_campaign()),
            options: Some(GenerationOptions {
                render_html: false,
                ..GenerationOptions::default()
            }),
        },
    ];

    let results = service.generate_batch(items).await;
    let ids: Vec<&str> = results.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["first", "no-cta", "third"]);

    assert!(results[0].is_ok());
    assert_eq!(
        results[1].error.as_ref().map(|e| e.code.as_str()),
        Some("MISSING_PRIMARY_CTA")
    );
    let third = results[2].outcome.as_ref().unwrap();
    assert!(third.email.is_none());

    // Only the first item reaches the compiler
    assert_eq!(compiler.calls(), 1);
}

#[tokio::test]
async fn test_sweep_reports_remaining_entries() {
    let service = service_with_backend(
        Arc::new(CountingCompiler::new(Duration::ZERO)),
        ControllerSettings::default(),
    );
    service
        .generate_complete(&request(&unique_campaign()), GenerationOptions::default())
        .await
        .unwrap();

    let report = service.optimize_cache().await;
    assert_eq!(report.evicted(), 0);
    assert_eq!(report.remaining, 1);
}
