//! Engine behaviour with scripted fetchers and spiders

use crate::support::{RecordingSpider, Script, ScriptedFetch};
use feedcrawl::state::Stage;
use feedcrawl::{Engine, EngineConfig, RunSummary};
use std::sync::Arc;
use std::time::Duration;

fn seeds(count: usize) -> Vec<String> {
    (0..count).map(|i| format!("seed-{}", i)).collect()
}

fn assert_balanced(summary: &RunSummary) {
    for stage in [Stage::Request, Stage::Response, Stage::Item] {
        let snapshot = summary.stage(stage);
        assert_eq!(
            snapshot.total,
            snapshot.success + snapshot.fail,
            "{} counter not drained: {:?}",
            stage,
            snapshot
        );
    }
}

async fn run(
    spider: RecordingSpider,
    fetcher: Arc<ScriptedFetch>,
    config: EngineConfig,
) -> (RunSummary, Engine<RecordingSpider>) {
    let mut engine = Engine::new(spider, fetcher, config).unwrap();
    let summary = tokio::time::timeout(Duration::from_secs(30), engine.run())
        .await
        .expect("run did not terminate")
        .unwrap();
    (summary, engine)
}

#[tokio::test]
async fn test_three_seeds_all_succeed() {
    let fetcher = ScriptedFetch::new(Script::Respond(200));
    let config = EngineConfig::new(seeds(3));

    let (summary, engine) = run(RecordingSpider::default(), Arc::clone(&fetcher), config).await;

    for stage in [Stage::Request, Stage::Response, Stage::Item] {
        let snapshot = summary.stage(stage);
        assert_eq!(snapshot.total, 3, "{} total", stage);
        assert_eq!(snapshot.success, 3, "{} success", stage);
        assert_eq!(snapshot.fail, 0, "{} fail", stage);
    }
    assert_eq!(
        engine.spider().delivered(),
        vec!["seed-0", "seed-1", "seed-2"]
    );
    assert_eq!(fetcher.calls(), 3);
}

#[tokio::test]
async fn test_always_failing_fetch_exhausts_retries() {
    let fetcher = ScriptedFetch::new(Script::AlwaysFail);
    let config = EngineConfig::new(["only"]).with_max_retries(3);

    let (summary, engine) = run(RecordingSpider::default(), Arc::clone(&fetcher), config).await;

    // max_retries + 1 real attempts
    assert_eq!(fetcher.attempts("only"), 4);

    // plus one final dispatch that sees the exhausted budget
    assert_eq!(summary.requests.total, 5);
    assert_eq!(summary.requests.fail, 5);
    assert_eq!(summary.requests.success, 0);
    assert_eq!(summary.responses.total, 0);
    assert_balanced(&summary);

    let retry_counts = engine.spider().filter_retry_counts.lock().unwrap().clone();
    assert_eq!(retry_counts, vec![0, 1, 2, 3, 4]);
}

#[tokio::test]
async fn test_zero_retries_means_one_attempt() {
    let fetcher = ScriptedFetch::new(Script::AlwaysFail);
    let config = EngineConfig::new(["only"]).with_max_retries(0);

    let (summary, _) = run(RecordingSpider::default(), Arc::clone(&fetcher), config).await;

    assert_eq!(fetcher.calls(), 1);
    assert_eq!(summary.requests.total, 2);
    assert_eq!(summary.requests.fail, 2);
}

#[tokio::test]
async fn test_filtered_request_never_fetched() {
    let fetcher = ScriptedFetch::new(Script::Respond(200));
    let spider = RecordingSpider {
        reject_requests: true,
        ..RecordingSpider::default()
    };

    let (summary, _) = run(spider, Arc::clone(&fetcher), EngineConfig::new(seeds(2))).await;

    assert_eq!(fetcher.calls(), 0);
    assert_eq!(summary.requests.total, 2);
    assert_eq!(summary.requests.success, 2);
    assert_eq!(summary.responses.total, 0);
    assert_eq!(summary.items.total, 0);
}

#[tokio::test]
async fn test_parse_failure_is_not_retried() {
    let fetcher = ScriptedFetch::new(Script::Respond(200));
    let spider = RecordingSpider {
        fail_parse: true,
        ..RecordingSpider::default()
    };

    let (summary, engine) = run(spider, Arc::clone(&fetcher), EngineConfig::new(seeds(2))).await;

    assert_eq!(fetcher.calls(), 2);
    assert_eq!(summary.requests.success, 2);
    assert_eq!(summary.responses.total, 2);
    assert_eq!(summary.responses.fail, 2);
    assert_eq!(summary.items.total, 0);
    assert!(engine.spider().delivered().is_empty());
}

#[tokio::test]
async fn test_rejected_status_is_dropped_as_success() {
    let fetcher = ScriptedFetch::new(Script::Respond(404));

    let (summary, engine) = run(
        RecordingSpider::default(),
        Arc::clone(&fetcher),
        EngineConfig::new(["missing"]),
    )
    .await;

    assert_eq!(fetcher.calls(), 1);
    assert_eq!(summary.responses.total, 1);
    assert_eq!(summary.responses.success, 1);
    assert_eq!(summary.items.total, 0);
    assert!(engine.spider().delivered().is_empty());
}

#[tokio::test]
async fn test_sink_recovers_after_failures() {
    let fetcher = ScriptedFetch::new(Script::Respond(200));
    let spider = RecordingSpider {
        sink_failures: 2,
        ..RecordingSpider::default()
    };
    let config = EngineConfig::new(["only"]).with_max_retries(3);

    let (summary, engine) = run(spider, fetcher, config).await;

    assert_eq!(summary.items.total, 3);
    assert_eq!(summary.items.success, 1);
    assert_eq!(summary.items.fail, 2);
    assert_eq!(engine.spider().delivered(), vec!["only"]);
}

#[tokio::test]
async fn test_sink_failing_forever_drops_item() {
    let fetcher = ScriptedFetch::new(Script::Respond(200));
    let spider = RecordingSpider {
        sink_failures: usize::MAX,
        ..RecordingSpider::default()
    };
    let config = EngineConfig::new(["only"]).with_max_retries(2);

    let (summary, engine) = run(spider, fetcher, config).await;

    assert_eq!(engine.spider().sink_calls(), 3);
    assert_eq!(summary.items.total, 4);
    assert_eq!(summary.items.fail, 4);
    assert!(engine.spider().delivered().is_empty());
    assert_balanced(&summary);
}

#[tokio::test]
async fn test_fetch_concurrency_cap() {
    let fetcher = ScriptedFetch::new(Script::Slow(Duration::from_millis(50)));
    let config = EngineConfig::new(seeds(10))
        .with_fetch_concurrency(2)
        .with_worker_threads(4);

    let (summary, _) = run(RecordingSpider::default(), Arc::clone(&fetcher), config).await;

    assert_eq!(fetcher.calls(), 10);
    assert!(
        fetcher.max_in_flight() <= 2,
        "saw {} concurrent fetches",
        fetcher.max_in_flight()
    );
    assert_eq!(summary.items.success, 10);
}

#[tokio::test]
async fn test_parse_can_schedule_requests() {
    let fetcher = ScriptedFetch::new(Script::Respond(200));
    let spider = RecordingSpider {
        follow_ups: vec!["a".to_string(), "b".to_string()],
        ..RecordingSpider::default()
    };

    let (summary, engine) = run(spider, Arc::clone(&fetcher), EngineConfig::new(seeds(2))).await;

    assert_eq!(summary.requests.total, 6);
    assert_eq!(summary.responses.total, 6);
    assert_eq!(summary.items.success, 6);
    assert_eq!(fetcher.attempts("seed-1/b"), 1);
    assert!(engine
        .spider()
        .delivered()
        .contains(&"seed-0/a".to_string()));
}

#[tokio::test]
async fn test_mixed_outcomes_stay_balanced() {
    let fetcher = ScriptedFetch::new(Script::FailMatching("bad"));
    let config = EngineConfig::new(["good-1", "bad-1", "good-2", "bad-2"]).with_max_retries(1);

    let (summary, engine) = run(RecordingSpider::default(), Arc::clone(&fetcher), config).await;

    assert_balanced(&summary);
    assert_eq!(fetcher.attempts("bad-1"), 2);
    assert_eq!(fetcher.attempts("good-2"), 1);
    assert_eq!(engine.spider().delivered(), vec!["good-1", "good-2"]);
}

#[tokio::test]
async fn test_pacing_interval_between_requests() {
    let fetcher = ScriptedFetch::new(Script::Respond(200));
    let config = EngineConfig::new(seeds(4)).with_pacing_interval(Duration::from_millis(60));

    let started = std::time::Instant::now();
    let (summary, _) = run(RecordingSpider::default(), fetcher, config).await;

    assert!(started.elapsed() >= Duration::from_millis(180));
    assert_eq!(summary.items.success, 4);
}

#[tokio::test]
async fn test_engine_runs_again_from_zero() {
    let fetcher = ScriptedFetch::new(Script::Respond(200));
    let config = EngineConfig::new(seeds(2));
    let mut engine = Engine::new(RecordingSpider::default(), fetcher.clone(), config).unwrap();

    let first = engine.run().await.unwrap();
    let second = engine.run().await.unwrap();

    assert_eq!(first.requests, second.requests);
    assert_eq!(second.items.total, 2);
    assert_eq!(fetcher.calls(), 4);
    assert_eq!(engine.spider().delivered().len(), 4);
}

#[tokio::test]
async fn test_panicking_sink_still_finishes() {
    let fetcher = ScriptedFetch::new(Script::Respond(200));
    let spider = RecordingSpider {
        panic_in_sink: true,
        ..RecordingSpider::default()
    };

    let (summary, engine) = run(spider, fetcher, EngineConfig::new(seeds(2))).await;

    assert_eq!(summary.items.total, 2);
    assert_eq!(summary.items.fail, 2);
    assert_eq!(engine.spider().sink_calls(), 2);
    assert!(engine.spider().delivered().is_empty());
    assert_balanced(&summary);
}

#[tokio::test]
async fn test_items_flow_while_requests_wait_for_pacing() {
    let fetcher = ScriptedFetch::new(Script::Respond(200));
    let config = EngineConfig::new(seeds(2)).with_pacing_interval(Duration::from_millis(500));

    let (summary, engine) = run(RecordingSpider::default(), Arc::clone(&fetcher), config).await;

    assert_eq!(summary.items.success, 2);
    let first_delivered = engine.spider().delivered_at.lock().unwrap()["seed-0"];
    let second_fetched = fetcher.fetched_at("seed-1").unwrap();
    assert!(
        first_delivered < second_fetched,
        "seed-0 was delivered {:?} after seed-1 was fetched",
        first_delivered - second_fetched
    );
}
