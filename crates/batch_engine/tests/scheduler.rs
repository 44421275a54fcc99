mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use batch_engine::{
    AttemptStatus, CancellationController, DownloadManager, EngineConfig, EngineError,
    FnProgressSink, JobScheduler, MemorySink, OrderedLogAggregator, OutcomeStatus,
};
use common::{cuit_rows, http, ok, row, transport_error, ScriptedExecutor, StaticTransport};
use pretty_assertions::assert_eq;
use serde_json::json;
use tempfile::TempDir;

struct Harness {
    scheduler: JobScheduler,
    sink: MemorySink,
    progress: Arc<Mutex<Vec<(usize, usize)>>>,
    root: TempDir,
}

fn harness(config: EngineConfig, transport: Arc<StaticTransport>) -> Harness {
    let root = TempDir::new().unwrap();
    let config = EngineConfig {
        downloads_root: root.path().to_path_buf(),
        ..config
    };
    let sink = MemorySink::new();
    let logs = OrderedLogAggregator::new(Arc::new(sink.clone()));
    let downloads = Arc::new(DownloadManager::new(root.path(), transport));
    let progress = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&progress);
    let scheduler = JobScheduler::new(config, logs, downloads)
        .unwrap()
        .with_progress_sink(Arc::new(FnProgressSink(move |completed: usize, total: usize| {
            seen.lock().unwrap().push((completed, total));
        })));
    Harness {
        scheduler,
        sink,
        progress,
        root,
    }
}

fn workers(max_workers: usize) -> EngineConfig {
    EngineConfig {
        max_workers,
        ..EngineConfig::default()
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn ten_rows_on_four_workers_all_complete_in_order() {
    let h = harness(workers(4), StaticTransport::new(&[]));
    let executor = Arc::new(ScriptedExecutor::new().with_delay(Duration::from_millis(20)));

    let report = h.scheduler.run(cuit_rows(10), executor.clone()).await;

    assert_eq!(report.outcomes.len(), 10);
    assert!(!report.cancelled);
    assert!(report
        .outcomes
        .iter()
        .all(|o| o.status == OutcomeStatus::Success && o.attempts == 1));
    let labels: Vec<_> = report.outcomes.iter().map(|o| o.label.clone()).collect();
    let expected: Vec<_> = (0..10).map(|i| format!("2000000000{i}")).collect();
    assert_eq!(labels, expected);

    let progress = h.progress.lock().unwrap().clone();
    let expected: Vec<_> = (0..=10).map(|c| (c, 10)).collect();
    assert_eq!(progress, expected);

    assert!(executor.peak_concurrency() <= 4);
    assert!(executor.peak_concurrency() > 1);
}

#[tokio::test]
async fn retry_budget_bounds_attempts() {
    let h = harness(workers(2), StaticTransport::new(&[]));
    let rows = vec![
        row(0, &[("cuit", "A"), ("retry", "3")]),
        row(1, &[("cuit", "B"), ("retry", "0")]),
        row(2, &[("cuit", "C"), ("retry", "2")]),
    ];
    let executor = Arc::new(
        ScriptedExecutor::new()
            .script(
                "A",
                vec![
                    http(500, json!({ "message": "boom" })),
                    transport_error(),
                    ok(json!({ "success": true })),
                ],
            )
            .script("B", vec![http(503, json!({}))])
            .script(
                "C",
                vec![
                    ok(json!({ "success": false, "message": "bad credentials" })),
                    ok(json!({ "success": false, "message": "bad credentials" })),
                ],
            ),
    );

    let report = h.scheduler.run(rows, executor.clone()).await;

    let a = report.find("A").unwrap();
    assert_eq!(a.status, OutcomeStatus::Success);
    assert_eq!(a.attempts, 3);
    assert_eq!(executor.calls_for("A"), 3);

    let b = report.find("B").unwrap();
    assert_eq!(b.status, OutcomeStatus::Failed);
    assert_eq!(b.attempts, 1);
    assert_eq!(b.http_status(), Some(503));

    let c = report.find("C").unwrap();
    assert_eq!(c.status, OutcomeStatus::Failed);
    assert_eq!(c.attempts, 2);
    let last = c.final_attempt.as_ref().unwrap();
    assert_eq!(last.status, AttemptStatus::ApiError);
    assert!(c.error.as_deref().unwrap().contains("bad credentials"));
}

#[tokio::test]
async fn cancellation_stops_new_rows_and_further_attempts() {
    let cancel = CancellationController::new();
    let h = harness(workers(1), StaticTransport::new(&[]));
    let scheduler = h.scheduler.with_cancellation(cancel.clone());
    let rows: Vec<_> = (0..5)
        .map(|i| row(i, &[("cuit", &format!("R{i}")), ("retry", "3")]))
        .collect();
    let executor = Arc::new(
        ScriptedExecutor::new()
            .with_delay(Duration::from_millis(30))
            .cancel_on_call(cancel.clone())
            .script("R0", vec![transport_error(), transport_error(), transport_error()]),
    );

    let report = scheduler.run(rows, executor.clone()).await;

    assert!(report.cancelled);
    assert_eq!(executor.calls(), vec!["R0".to_string()]);
    assert_eq!(report.outcomes.len(), 5);

    let first = &report.outcomes[0];
    assert_eq!(first.status, OutcomeStatus::Cancelled);
    assert_eq!(first.attempts, 1);
    for skipped in &report.outcomes[1..] {
        assert_eq!(skipped.status, OutcomeStatus::Cancelled);
        assert_eq!(skipped.attempts, 0);
    }

    let progress = h.progress.lock().unwrap().clone();
    assert!(progress.windows(2).all(|w| w[0].0 <= w[1].0));
    assert_eq!(progress.last(), Some(&(1, 5)));
}

#[tokio::test]
async fn cancel_during_retry_delay_prevents_next_attempt() {
    let cancel = CancellationController::new();
    let config = EngineConfig {
        retry_delay: Duration::from_millis(500),
        ..workers(1)
    };
    let h = harness(config, StaticTransport::new(&[]));
    let scheduler = h.scheduler.with_cancellation(cancel.clone());
    let executor = Arc::new(ScriptedExecutor::new().script(
        "R0",
        vec![transport_error(), transport_error(), transport_error()],
    ));

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.request_cancel();
    });
    let started = std::time::Instant::now();
    let report = scheduler
        .run(vec![row(0, &[("cuit", "R0"), ("retry", "3")])], executor.clone())
        .await;

    assert_eq!(executor.calls_for("R0"), 1);
    let outcome = report.find("R0").unwrap();
    assert_eq!(outcome.status, OutcomeStatus::Cancelled);
    assert_eq!(outcome.attempts, 1);
    assert!(started.elapsed() < Duration::from_millis(450));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_row_logs_stay_contiguous() {
    let h = harness(workers(5), StaticTransport::new(&[]));
    let executor = Arc::new(ScriptedExecutor::new().with_delay(Duration::from_millis(10)));

    h.scheduler.run(cuit_rows(5), executor).await;

    let mut blocks: Vec<(String, Vec<String>)> = Vec::new();
    for line in h.sink.lines() {
        if let Some(label) = line.strip_prefix("ROW: ") {
            blocks.push((label.to_string(), Vec::new()));
        } else if !line.chars().all(|c| c == '-') {
            blocks.last_mut().unwrap().1.push(line);
        }
    }

    assert_eq!(blocks.len(), 5);
    for (label, lines) in &blocks {
        assert_eq!(lines.len(), 3, "{label}: {lines:?}");
        assert!(lines[0].contains("REQUEST (1/1)") && lines[0].contains(label.as_str()));
        assert!(lines[1].contains("RESPONSE: HTTP 200"));
        assert!(lines[2].contains("Result: success"));
    }
}

#[tokio::test]
async fn request_log_shows_the_redacted_body_sent() {
    let h = harness(workers(1), StaticTransport::new(&[]));
    let executor = Arc::new(
        ScriptedExecutor::new().with_body(json!({ "cuit": "R0", "clave": "secret" })),
    );

    h.scheduler
        .run(
            vec![row(0, &[("cuit", "R0"), ("clave", "secret"), ("procesar", "si")])],
            executor,
        )
        .await;

    let lines = h.sink.lines();
    let request = lines.iter().find(|l| l.contains("REQUEST (1/1)")).unwrap();
    assert!(request.ends_with(r#"{"cuit":"R0","clave":"***"}"#), "{request}");
    assert!(!lines.iter().any(|l| l.contains("secret") || l.contains("procesar")));
}

#[tokio::test]
async fn panicking_row_is_recorded_and_pool_continues() {
    let h = harness(workers(2), StaticTransport::new(&[]));
    let executor = Arc::new(ScriptedExecutor::new().panic_on("20000000001"));

    let report = h.scheduler.run(cuit_rows(4), executor.clone()).await;

    assert_eq!(report.outcomes.len(), 4);
    let crashed = report.find("20000000001").unwrap();
    assert_eq!(crashed.status, OutcomeStatus::Crashed);
    assert!(crashed.error.as_deref().unwrap().contains("panicked"));
    assert_eq!(report.summary().succeeded, 3);
    assert_eq!(h.progress.lock().unwrap().last(), Some(&(4, 4)));
    assert!(h.sink.lines().contains(&"ROW: 20000000001".to_string()));
}

#[tokio::test]
async fn rows_missing_required_fields_are_invalid() {
    let config = EngineConfig {
        required_fields: vec!["cuit".to_string(), "clave".to_string()],
        ..workers(1)
    };
    let h = harness(config, StaticTransport::new(&[]));
    let rows = vec![
        row(0, &[("cuit", "A"), ("clave", "secret")]),
        row(1, &[("cuit", "B"), ("clave", " ")]),
    ];
    let executor = Arc::new(ScriptedExecutor::new());

    let report = h.scheduler.run(rows, executor.clone()).await;

    assert_eq!(executor.calls(), vec!["A".to_string()]);
    let invalid = report.find("B").unwrap();
    assert_eq!(invalid.status, OutcomeStatus::Invalid);
    assert_eq!(invalid.attempts, 0);
    assert!(invalid.error.as_deref().unwrap().contains("clave"));
    assert!(!h.sink.lines().iter().any(|l| l.contains("secret")));
    assert_eq!(h.progress.lock().unwrap().last(), Some(&(2, 2)));
}

#[tokio::test]
async fn successful_rows_download_their_artifacts() {
    let url = "https://minio.example/bucket/constancia.pdf";
    let h = harness(
        EngineConfig {
            module_name: "sct".to_string(),
            ..workers(1)
        },
        StaticTransport::new(&[(url, b"%PDF")]),
    );
    let root = h.root.path().to_path_buf();
    let executor = Arc::new(
        ScriptedExecutor::new().script(
            "20111111112",
            vec![ok(json!({ "success": true, "archivo": url, "missing": "https://minio.example/nope.pdf" }))],
        ),
    );

    let report = h
        .scheduler
        .run(vec![row(0, &[("cuit", "20111111112")])], executor)
        .await;

    let outcome = report.find("20111111112").unwrap();
    assert_eq!(outcome.status, OutcomeStatus::Success);
    assert_eq!(outcome.links.len(), 2);
    assert_eq!(outcome.downloads_ok(), 1);
    assert_eq!(outcome.download_errors().len(), 1);
    let dir = root.join("sct").join("20111111112");
    assert_eq!(outcome.download_dir.as_deref(), Some(dir.as_path()));
    assert_eq!(std::fs::read(dir.join("constancia.pdf")).unwrap(), b"%PDF");
    assert!(h.sink.lines().iter().any(|l| l.contains("Downloads completed: 1/2")));
}

#[tokio::test]
async fn unusable_download_root_keeps_the_api_outcome() {
    let url = "https://minio.example/bucket/constancia.pdf";
    let temp = TempDir::new().unwrap();
    let blocker = temp.path().join("not-a-dir");
    std::fs::write(&blocker, "file").unwrap();

    let sink = MemorySink::new();
    let logs = OrderedLogAggregator::new(Arc::new(sink.clone()));
    let downloads = Arc::new(DownloadManager::new(
        &blocker,
        StaticTransport::new(&[(url, b"%PDF")]),
    ));
    let config = EngineConfig {
        downloads_root: blocker.clone(),
        ..workers(1)
    };
    let scheduler = JobScheduler::new(config, logs, downloads).unwrap();
    let executor = Arc::new(
        ScriptedExecutor::new().script("R0", vec![ok(json!({ "success": true, "archivo": url }))]),
    );

    let report = scheduler.run(vec![row(0, &[("cuit", "R0")])], executor).await;

    let outcome = report.find("R0").unwrap();
    assert_eq!(outcome.status, OutcomeStatus::Success);
    assert_eq!(outcome.attempts, 1);
    assert_eq!(outcome.links.len(), 1);
    assert!(outcome.download_results.is_empty());
    assert_eq!(outcome.download_dir, None);
    assert!(outcome.directory_error.is_some());
    assert!(sink
        .lines()
        .iter()
        .any(|l| l.contains("Downloads skipped for this row.")));
    assert_eq!(std::fs::read(&blocker).unwrap(), b"file");
}

#[test]
fn zero_workers_is_rejected() {
    let sink = MemorySink::new();
    let logs = OrderedLogAggregator::new(Arc::new(sink));
    let downloads = Arc::new(DownloadManager::new("downloads", StaticTransport::new(&[])));
    let result = JobScheduler::new(workers(0), logs, downloads);
    assert!(matches!(result, Err(EngineError::InvalidWorkers { value: 0 })));
}
