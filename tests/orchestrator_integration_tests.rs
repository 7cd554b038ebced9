//! End-to-end pipeline tests over scripted mock backends: cache bypass,
//! breaker-driven failover, quota rejection, validation fallback, and the
//! terminal failure payloads.

mod common;

use common::{handle, orchestrator, Script};
use model_relay::models::{ErrorKind, Task, TaskType, Tier};
use std::time::Duration;

fn task(task_type: TaskType, prompt: &str) -> Task {
    Task::new(task_type, "user-1", prompt)
}

#[tokio::test]
async fn cache_hit_bypasses_rate_limiter_and_backends() {
    let (orchestrator, handles, _) = orchestrator(Script::Succeed { tokens_used: 100 });
    let task = task(TaskType::CodeReview, "Review the retry loop");

    let first = orchestrator.process(&task).await;
    assert!(first.success);
    assert!(!first.from_cache);
    let backend = first.backend_used.clone().unwrap();
    assert_eq!(handle(&handles, &backend).calls(), 1);

    // Detached cache write needs a beat to land.
    tokio::time::sleep(Duration::from_millis(20)).await;

    let second = orchestrator.process(&task).await;
    assert!(second.success);
    assert!(second.from_cache);
    assert!(second.backend_used.is_none());
    assert_eq!(second.payload, first.payload);

    // No second backend call, and no quota consumed by the hit.
    assert_eq!(handle(&handles, &backend).calls(), 1);
    let report = orchestrator.limiter().quota("user-1", Tier::Free);
    assert_eq!(report.used_minute, 1);
}

#[tokio::test]
async fn failing_primary_falls_back_within_one_request() {
    let (orchestrator, handles, _) = orchestrator(Script::Succeed { tokens_used: 10 });
    handle(&handles, "gpt-4o").set_failing(true);

    let result = orchestrator
        .process(&task(TaskType::StrategyAudit, "Audit our Q3 strategy").without_cache())
        .await;

    assert!(result.success);
    assert_eq!(result.backend_used.as_deref(), Some("claude-3-sonnet"));
    assert_eq!(handle(&handles, "gpt-4o").calls(), 1);
    assert_eq!(handle(&handles, "claude-3-sonnet").calls(), 1);
}

#[tokio::test]
async fn breaker_opens_after_threshold_and_stops_calls() {
    let (orchestrator, handles, _) = orchestrator(Script::Succeed { tokens_used: 10 });
    handle(&handles, "gpt-4o").set_failing(true);

    // Default threshold is 5 consecutive failures.
    for i in 0..5 {
        let result = orchestrator
            .process(&task(TaskType::CodeReview, &format!("diff {i}")).without_cache())
            .await;
        assert!(result.success, "fallback should absorb each failure");
    }
    assert_eq!(handle(&handles, "gpt-4o").calls(), 5);

    // Sixth request: the open breaker removes gpt-4o before any call.
    let result = orchestrator
        .process(&task(TaskType::CodeReview, "diff 6").without_cache())
        .await;
    assert!(result.success);
    assert_eq!(result.backend_used.as_deref(), Some("claude-3-sonnet"));
    assert_eq!(handle(&handles, "gpt-4o").calls(), 5);
}

#[tokio::test]
async fn free_tier_eleventh_request_is_rate_limited() {
    let (orchestrator, handles, _) = orchestrator(Script::Succeed { tokens_used: 1 });

    for i in 0..10 {
        let result = orchestrator
            .process(&task(TaskType::CodeReview, &format!("diff {i}")).without_cache())
            .await;
        assert!(result.success, "request {i} should be admitted");
    }

    let calls_before: u64 = handles.iter().map(|h| h.calls()).sum();
    let rejected = orchestrator
        .process(&task(TaskType::CodeReview, "diff 11").without_cache())
        .await;

    assert!(!rejected.success);
    assert_eq!(rejected.error_kind, Some(ErrorKind::RateLimited));
    assert!(rejected.retry_after.unwrap() > Duration::ZERO);
    // Rejection happens before routing: no backend contacted.
    let calls_after: u64 = handles.iter().map(|h| h.calls()).sum();
    assert_eq!(calls_before, calls_after);
}

#[tokio::test]
async fn higher_tier_outlasts_free_quota() {
    let (orchestrator, _, _) = orchestrator(Script::Succeed { tokens_used: 1 });

    for i in 0..15 {
        let result = orchestrator
            .process(
                &task(TaskType::CodeReview, &format!("diff {i}"))
                    .with_tier(Tier::Pro)
                    .without_cache(),
            )
            .await;
        assert!(result.success, "pro tier request {i} should be admitted");
    }
}

#[tokio::test]
async fn invalid_content_is_never_surfaced() {
    let (orchestrator, handles, _) = orchestrator(Script::SucceedInvalid);

    let result = orchestrator
        .process(&task(TaskType::CodeReview, "Review this").without_cache())
        .await;

    assert!(!result.success);
    assert_eq!(result.error_kind, Some(ErrorKind::AllBackendsFailed));
    let text = result.payload.unwrap().text;
    assert!(!text.to_lowercase().contains("as an ai"));
    assert!(text.contains("temporarily unavailable"));
    // Every candidate was tried once and rejected by validation.
    for h in &handles {
        assert_eq!(h.calls(), 1, "{} should be tried once", h.id());
    }
}

#[tokio::test]
async fn total_outage_yields_unavailable_before_any_call() {
    let (orchestrator, handles, _) = orchestrator(Script::Succeed { tokens_used: 1 });
    for h in &handles {
        for _ in 0..5 {
            orchestrator.breakers().report_failure(h.id(), "outage");
        }
    }

    let result = orchestrator
        .process(&task(TaskType::EthicalAssessment, "Assess this plan").without_cache())
        .await;

    assert!(!result.success);
    assert_eq!(result.error_kind, Some(ErrorKind::AllBackendsUnavailable));
    assert!(result.payload.unwrap().text.contains("temporarily unavailable"));
    for h in &handles {
        assert_eq!(h.calls(), 0);
    }
}

#[tokio::test(start_paused = true)]
async fn hung_backends_time_out_and_exhaust_to_fallback() {
    let (orchestrator, handles, _) = orchestrator(Script::Hang);

    let result = orchestrator
        .process(&task(TaskType::CodeReview, "Review this").without_cache())
        .await;

    assert!(!result.success);
    assert_eq!(result.error_kind, Some(ErrorKind::AllBackendsFailed));
    for h in &handles {
        assert_eq!(h.calls(), 1);
    }
    // Timeouts count as breaker failures.
    let snapshot = orchestrator.breakers().snapshot("gpt-4o").unwrap();
    assert_eq!(snapshot.consecutive_failures, 1);
}

#[tokio::test]
async fn successful_call_records_token_spend() {
    let (orchestrator, _, _) = orchestrator(Script::Succeed { tokens_used: 321 });

    let result = orchestrator
        .process(&task(TaskType::CreativeIdeation, "Brainstorm names").without_cache())
        .await;
    assert!(result.success);

    let report = orchestrator.limiter().quota("user-1", Tier::Free);
    assert_eq!(report.tokens_used_today, 321);
    assert_eq!(report.tokens_remaining_today, 50_000 - 321);
}

#[tokio::test]
async fn rejected_request_consumes_no_tokens() {
    let (orchestrator, _, _) = orchestrator(Script::Fail);

    let result = orchestrator
        .process(&task(TaskType::CodeReview, "Review this").without_cache())
        .await;
    assert!(!result.success);

    let report = orchestrator.limiter().quota("user-1", Tier::Free);
    // The request window was consumed at admission, but no tokens.
    assert_eq!(report.used_minute, 1);
    assert_eq!(report.tokens_used_today, 0);
}

#[tokio::test]
async fn cache_invalidation_forces_fresh_backend_call() {
    let (orchestrator, handles, _) = orchestrator(Script::Succeed { tokens_used: 5 });
    let task = task(TaskType::DocumentSynthesis, "Summarize the meeting notes");

    let first = orchestrator.process(&task).await;
    let backend = first.backend_used.clone().unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    let removed = orchestrator.cache().invalidate("ai_cache:document_synthesis:*").await;
    assert_eq!(removed, 1);

    let again = orchestrator.process(&task).await;
    assert!(!again.from_cache);
    assert_eq!(handle(&handles, &backend).calls(), 2);
}
