//! End-to-end controller scenarios against simulated collaborators on virtual time

mod mocks;

use std::time::Duration;

use batch_orchestrator::config::OrchestratorConfig;
use batch_orchestrator::models::{Actor, JobMetadata, RunConclusion, RunStatus, WorkItem};
use batch_orchestrator::orchestration::{partition, BatchOutcome, CancellationSignal};
use batch_orchestrator::{Batch, OrchestratorError, TimingConfig};

use mocks::{start_time, Harness, RunBehavior, SimulatedHost, SimulatedSurface};

fn config() -> OrchestratorConfig {
    let mut config = OrchestratorConfig::default();
    config.github.owner = "acme".to_string();
    config.github.repo = "migrations".to_string();
    config.orchestration.run_id = 4242;
    config.orchestration.issue_number = 7;
    config
}

fn batches(repos: usize, batch_size: usize) -> Vec<Batch> {
    let items: Vec<WorkItem> = (1..=repos)
        .map(|i| WorkItem::new(format!("https://github.com/source-org/repo-{i}")))
        .collect();
    let metadata = JobMetadata {
        migration_type: "production".to_string(),
        source_organization: "source-org".to_string(),
        target_organization: "target-org".to_string(),
        target_instance: "production".to_string(),
        ..JobMetadata::default()
    };
    partition(&items, batch_size, &metadata).unwrap()
}

fn at(seconds: i64) -> chrono::DateTime<chrono::Utc> {
    start_time() + chrono::Duration::seconds(seconds)
}

#[tokio::test]
async fn test_all_batches_complete_in_order() {
    let harness = Harness::new(|executor| executor);
    let batches = batches(4, 2);

    let report = harness.controller(&config()).run(&batches).await.unwrap();

    assert_eq!(harness.executor.dispatched_batches(), vec![1, 2]);
    assert_eq!(report.succeeded(), 2);
    assert_eq!(report.failed(), 0);
    assert!(!report.was_cancelled());

    assert_eq!(harness.surface.posted_matching("Batch 1 of 2 Starting").len(), 1);
    assert_eq!(harness.surface.posted_matching("Batch 1 of 2 Complete").len(), 1);
    assert_eq!(harness.surface.posted_matching("Batch 2 of 2 Complete").len(), 1);

    let last = harness.surface.posted_matching("Batch 2 of 2 Complete");
    assert!(last[0].contains("**Status:** SUCCESS"));
    assert!(last[0].contains("This was the final batch"));

    // Grace periods are the only 20s waits
    let delays = harness
        .clock
        .sleeps()
        .iter()
        .filter(|d| **d == Duration::from_secs(20))
        .count();
    assert_eq!(delays, 2, "one grace period per dispatched batch");
}

#[tokio::test]
async fn test_completion_reported_once_with_failure_conclusion() {
    let harness = Harness::new(|executor| {
        executor.with_behavior(
            1,
            RunBehavior::Completes {
                appear_after: Duration::from_secs(5),
                run_for: Duration::from_secs(120),
                conclusion: RunConclusion::Failure,
            },
        )
    });
    let batches = batches(2, 2);

    let report = harness.controller(&config()).run(&batches).await.unwrap();

    let completions = harness.surface.posted_matching("Complete");
    assert_eq!(completions.len(), 1);
    assert!(completions[0].contains("**Status:** FAILURE"));
    assert_eq!(report.failed(), 1);
    assert!(matches!(
        report.record_for(1).map(|r| &r.outcome),
        Some(BatchOutcome::Completed {
            conclusion: RunConclusion::Failure,
            ..
        })
    ));
}

#[tokio::test]
async fn test_run_that_never_appears_is_abandoned() {
    let harness = Harness::new(|executor| executor.with_behavior(1, RunBehavior::NeverAppears));
    let batches = batches(4, 2);

    let report = harness.controller(&config()).run(&batches).await.unwrap();

    let record = report.record_for(1).unwrap();
    assert_eq!(record.outcome, BatchOutcome::Abandoned);
    // Grace period plus eleven poll ticks
    assert_eq!(record.elapsed_seconds, 20 + 11 * 30);

    let unknown = harness.surface.posted_matching("Status Unknown");
    assert_eq!(unknown.len(), 1);
    assert!(unknown[0].contains(batches[0].correlation_token.as_str()));
    assert!(unknown[0].contains("Continuing to next batch"));

    // The orchestration keeps going
    assert_eq!(harness.executor.dispatched_batches(), vec![1, 2]);
    assert!(report.record_for(2).unwrap().outcome.is_success());
    assert_eq!(report.unknown(), 1);
}

#[tokio::test]
async fn test_listing_failures_count_as_not_found() {
    let harness = Harness::new(|executor| executor.with_failing_listing());
    let batches = batches(1, 5);

    let report = harness.controller(&config()).run(&batches).await.unwrap();

    assert_eq!(report.record_for(1).unwrap().outcome, BatchOutcome::Abandoned);
}

#[tokio::test]
async fn test_dispatch_failure_moves_to_next_batch() {
    let harness = Harness::new(|executor| {
        executor.with_behavior(1, RunBehavior::RejectDispatch { status: 500 })
    });
    let batches = batches(6, 3);

    let report = harness.controller(&config()).run(&batches).await.unwrap();

    match &report.record_for(1).unwrap().outcome {
        BatchOutcome::DispatchFailed { status, error } => {
            assert_eq!(*status, Some(500));
            assert!(error.contains("HTTP 500"));
        }
        other => panic!("unexpected outcome: {other:?}"),
    }

    let failures = harness.surface.posted_matching("Failed to Dispatch Batch 1");
    assert_eq!(failures.len(), 1);
    assert!(failures[0].contains("HTTP 500"));

    assert_eq!(harness.executor.dispatched_batches(), vec![2]);
    assert!(report.record_for(2).unwrap().outcome.is_success());
    assert_eq!(report.failed(), 1);
}

#[tokio::test]
async fn test_cancel_command_stops_before_next_batch() {
    let harness = Harness::new(|executor| {
        executor.with_behavior(1, RunBehavior::succeeds_after(Duration::from_secs(60)))
    });
    // 7 repositories in batches of 3: sizes 3, 3, 1
    let batches = batches(7, 3);
    assert_eq!(batches.iter().map(Batch::len).collect::<Vec<_>>(), vec![3, 3, 1]);

    // Batch 1 completes on the second tick (t=80s); the command lands during the inter-batch delay
    harness
        .surface
        .comment_at(at(95), Actor::user("octocat"), "/cancel-migration");

    let report = harness.controller(&config()).run(&batches).await.unwrap();

    assert_eq!(harness.executor.dispatched_batches(), vec![1]);
    let stop = report.stop.as_ref().unwrap();
    assert_eq!(stop.stopped_at_batch, 2);
    assert_eq!(stop.completed_batches, 1);
    assert_eq!(stop.remaining_batches, 2);
    assert!(!stop.during_batch);
    assert_eq!(
        stop.signal,
        CancellationSignal::RequestedByCommand {
            author: "octocat".to_string()
        }
    );

    let notices = harness.surface.posted_matching("Migration Cancelled");
    assert_eq!(notices.len(), 1);
    assert!(notices[0].contains("**Stopped at:** Batch 2 of 3"));
    assert!(notices[0].contains("| ✅ Completed batches | 1 |"));
    assert!(notices[0].contains("| ⏭️ Remaining batches | 2 |"));

    // Batch 1 already finished; nothing is left to cancel
    assert!(harness.executor.cancelled_runs().is_empty());
}

#[tokio::test]
async fn test_command_in_prose_or_from_bots_is_ignored() {
    let harness = Harness::new(|executor| executor);
    let batches = batches(4, 2);

    harness.surface.comment_at(
        at(60),
        Actor::user("octocat"),
        "please don't /cancel-migration yet, batch 2 has the big repos",
    );
    harness.surface.comment_at(
        at(90),
        Actor::bot("migration-helper[bot]"),
        "/cancel-migration",
    );
    // Left over from an earlier orchestration on the same issue
    harness.surface.comment_at(
        start_time() - chrono::Duration::hours(2),
        Actor::user("octocat"),
        "/cancel-migration",
    );

    let report = harness.controller(&config()).run(&batches).await.unwrap();

    assert!(!report.was_cancelled());
    assert_eq!(harness.executor.dispatched_batches(), vec![1, 2]);
    assert_eq!(report.succeeded(), 2);
}

#[tokio::test]
async fn test_host_cancellation_during_batch_cancels_live_run() {
    let harness = Harness::new(|executor| {
        executor
            .with_behavior(
                1,
                RunBehavior::RunsForever {
                    appear_after: Duration::from_secs(5),
                },
            )
            .with_foreign_run("Nightly build", RunStatus::InProgress)
    });
    harness.host.cancel_at(at(100));
    let batches = batches(4, 2);

    let report = harness.controller(&config()).run(&batches).await.unwrap();

    let stop = report.stop.as_ref().unwrap();
    assert_eq!(stop.signal, CancellationSignal::RequestedByHostCancel);
    assert_eq!(stop.stopped_at_batch, 1);
    assert_eq!(stop.completed_batches, 0);
    assert_eq!(stop.remaining_batches, 2);
    assert!(stop.during_batch);
    assert!(report.records.is_empty());

    // Only the batch's own run, once, never the unrelated one
    let run_id = harness.executor.run_id_for(1).unwrap();
    assert_eq!(harness.executor.cancelled_runs(), vec![run_id]);
    assert_eq!(
        harness
            .surface
            .posted_matching("Migration Cancelled During Batch 1")
            .len(),
        1
    );
}

#[tokio::test]
async fn test_cancel_command_during_batch_stops_tracked_run() {
    let harness = Harness::new(|executor| {
        executor.with_behavior(
            1,
            RunBehavior::RunsForever {
                appear_after: Duration::from_secs(5),
            },
        )
    });
    // Seen by the check on poll 5, at t=140s
    harness
        .surface
        .comment_at(at(100), Actor::user("octocat"), "/cancel-migration");
    let batches = batches(4, 2);

    let report = harness.controller(&config()).run(&batches).await.unwrap();

    let stop = report.stop.as_ref().unwrap();
    assert_eq!(
        stop.signal,
        CancellationSignal::RequestedByCommand {
            author: "octocat".to_string()
        }
    );
    assert!(stop.during_batch);
    assert_eq!(stop.stopped_at_batch, 1);
    assert!(report.record_for(1).is_none());
    assert_eq!(harness.executor.dispatched_batches(), vec![1]);

    let run_id = harness.executor.run_id_for(1).unwrap();
    assert_eq!(harness.executor.cancelled_runs(), vec![run_id]);

    let notices = harness
        .surface
        .posted_matching("Migration Cancelled During Batch 1");
    assert_eq!(notices.len(), 1);
    assert!(notices[0].contains("@octocat"));
}

#[tokio::test]
async fn test_cancel_before_next_batch_also_stops_timed_out_run() {
    let mut config = config();
    config.timing.max_poll_attempts = 4;
    let harness = Harness::new(|executor| {
        executor.with_behavior(
            1,
            RunBehavior::RunsForever {
                appear_after: Duration::from_secs(5),
            },
        )
    });
    // Batch 1 times out at t=140s; the request arrives before batch 2 starts
    harness
        .surface
        .comment_at(at(150), Actor::user("octocat"), "/cancel-migration");
    let batches = batches(4, 2);

    let report = harness.controller(&config).run(&batches).await.unwrap();

    assert!(matches!(
        report.record_for(1).unwrap().outcome,
        BatchOutcome::TimedOut { run_url: Some(_) }
    ));
    let run_id = harness.executor.run_id_for(1).unwrap();
    assert_eq!(harness.executor.cancelled_runs(), vec![run_id]);
    assert_eq!(report.stop.as_ref().unwrap().stopped_at_batch, 2);
}

#[tokio::test]
async fn test_poll_ceiling_times_out_batch() {
    let mut config = config();
    config.timing.max_poll_attempts = 12;
    let harness = Harness::new(|executor| {
        executor.with_behavior(
            1,
            RunBehavior::RunsForever {
                appear_after: Duration::from_secs(5),
            },
        )
    });
    let batches = batches(2, 1);

    let report = harness.controller(&config).run(&batches).await.unwrap();

    let record = report.record_for(1).unwrap();
    assert!(matches!(record.outcome, BatchOutcome::TimedOut { run_url: Some(_) }));
    assert_eq!(record.elapsed_seconds, 20 + 12 * 30);

    let timeouts = harness.surface.posted_matching("Batch 1 Timed Out");
    assert_eq!(timeouts.len(), 1);
    assert!(timeouts[0].contains("Proceeding to batch 2"));
    assert_eq!(harness.executor.dispatched_batches(), vec![1, 2]);
}

#[tokio::test]
async fn test_long_batch_posts_heartbeats_and_still_processing_notice() {
    let harness = Harness::new(|executor| {
        executor.with_behavior(1, RunBehavior::succeeds_after(Duration::from_secs(3_700)))
    });
    let batches = batches(1, 5);

    let report = harness.controller(&config()).run(&batches).await.unwrap();

    assert_eq!(report.succeeded(), 1);
    let notices = harness.surface.posted_matching("Still Processing");
    assert_eq!(notices.len(), 1);
    assert!(notices[0].contains("**Elapsed time:** 60 minutes"));
    assert!(notices[0].contains("**Status:** workflow in_progress"));

    // One short heartbeat every 20 polls until the run completes at poll 123
    let heartbeats = harness.surface.posted_matching("still running");
    assert_eq!(heartbeats.len(), 6);
    assert_eq!(
        heartbeats[0],
        "⏱️ Batch 1 of 1 still running... (10 minutes, workflow in_progress)"
    );
    assert!(heartbeats[5].contains("(60 minutes,"));
}

#[tokio::test]
async fn test_notification_failures_do_not_stop_orchestration() {
    let harness = Harness::new(|executor| executor);
    let surface = SimulatedSurface::new(harness.clock.clone()).with_failing_posts();
    let harness = harness.with_surface(surface);
    let batches = batches(3, 1);

    let report = harness.controller(&config()).run(&batches).await.unwrap();

    assert_eq!(report.succeeded(), 3);
    assert!(harness.surface.posted().is_empty());
}

#[tokio::test]
async fn test_cancellation_check_errors_count_as_not_cancelled() {
    let harness = Harness::new(|executor| executor);
    let host = SimulatedHost::new(harness.clock.clone()).with_failures();
    let harness = harness.with_host(host);
    let batches = batches(2, 1);

    let report = harness.controller(&config()).run(&batches).await.unwrap();

    assert!(!report.was_cancelled());
    assert_eq!(report.succeeded(), 2);
}

#[tokio::test]
async fn test_invalid_timing_is_rejected_before_dispatch() {
    let mut config = config();
    config.timing = TimingConfig {
        poll_interval_seconds: 0,
        ..TimingConfig::default()
    };
    let harness = Harness::new(|executor| executor);

    let result = harness.controller(&config).run(&batches(2, 1)).await;

    assert!(matches!(result, Err(OrchestratorError::FatalConfig(_))));
    assert!(harness.executor.dispatched_batches().is_empty());
}

#[tokio::test]
async fn test_out_of_order_batches_are_rejected() {
    let harness = Harness::new(|executor| executor);
    let mut batches = batches(4, 2);
    batches.reverse();

    let result = harness.controller(&config()).run(&batches).await;

    assert!(matches!(result, Err(OrchestratorError::InvalidInput(_))));
    assert!(harness.executor.dispatched_batches().is_empty());
}

#[tokio::test]
async fn test_empty_batch_list_is_a_no_op() {
    let harness = Harness::new(|executor| executor);

    let report = harness.controller(&config()).run(&[]).await.unwrap();

    assert_eq!(report.total_batches, 0);
    assert!(report.records.is_empty());
    assert!(harness.surface.posted().is_empty());
}
