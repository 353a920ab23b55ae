/// End-to-end runs of the two-phase executor against stub transports.
///
/// Run with: cargo test --test pipeline -- --nocapture
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use futures::{future::BoxFuture, stream, StreamExt};
use tch::Tensor;

use axum::{http::StatusCode, routing::post, Router};

use jet_image_tagger::{
    client::INFER_ROUTE, request::scores_from_tensor, source, Error, Event, EventSource,
    ImageEncoder, InferenceClient, JetCluster, LabelList, Outcome, OutputLog, Particle,
    RemoteClient, Result, ResultRanker, RunSummary, TwoPhaseExecutor,
};

const COLLECTION: &str = "slimmedJetsAK8";

/// Returns fixed scores and checks the request it was given.
struct FixedScores {
    scores: Vec<f32>,
    calls: AtomicUsize,
}

impl InferenceClient for FixedScores {
    fn name(&self) -> &str {
        "fixed"
    }

    fn submit(&self, input: Tensor) -> BoxFuture<'_, Result<Tensor>> {
        Box::pin(async move {
            assert_eq!(input.size(), vec![1, 224, 224, 3]);
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            Ok(Tensor::from_slice(&self.scores))
        })
    }
}

/// Scores the image by its total intensity, so each event gets a distinct top label.
struct IntensityClient;

impl InferenceClient for IntensityClient {
    fn name(&self) -> &str {
        "intensity"
    }

    fn submit(&self, input: Tensor) -> BoxFuture<'_, Result<Tensor>> {
        Box::pin(async move {
            let total: f32 = scores_from_tensor(&input)?.iter().sum::<f32>() / 3.0;
            let mut scores = vec![0.0f32; 3];
            let idx = if total > 0.25 { 2 } else if total > 0.15 { 1 } else { 0 };
            scores[idx] = 1.0;
            Ok(Tensor::from_slice(&scores))
        })
    }
}

struct Refused;

impl InferenceClient for Refused {
    fn name(&self) -> &str {
        "refused"
    }

    fn submit(&self, _input: Tensor) -> BoxFuture<'_, Result<Tensor>> {
        Box::pin(async { Err(Error::Transport("connection refused".into())) })
    }
}

struct NeverAnswers;

impl InferenceClient for NeverAnswers {
    fn name(&self) -> &str {
        "never"
    }

    fn submit(&self, _input: Tensor) -> BoxFuture<'_, Result<Tensor>> {
        Box::pin(futures::future::pending())
    }
}

fn setup(dir: &tempfile::TempDir, timeout: Duration) -> TwoPhaseExecutor {
    let labels_path = dir.path().join("labels.txt");
    std::fs::write(&labels_path, "top\nqcd\nhiggs\n").unwrap();
    let labels = LabelList::load(&labels_path).unwrap();
    let output = OutputLog::open(dir.path().join("timing.csv")).unwrap();
    TwoPhaseExecutor::new(
        ImageEncoder::new(224, 3),
        ResultRanker::new(2),
        Arc::new(labels),
        Arc::new(output),
        COLLECTION,
        timeout,
    )
}

fn event_with_constituent_pt(id: u64, pt: f64) -> Event {
    let jet = JetCluster::new(100.0, 0.5, 3.0, vec![Particle::new(pt, 0.6, -3.1)]);
    Event {
        id,
        collections: HashMap::from([(COLLECTION.to_string(), vec![jet])]),
    }
}

fn output_lines(dir: &tempfile::TempDir) -> Vec<String> {
    std::fs::read_to_string(dir.path().join("timing.csv"))
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect()
}

#[tokio::test]
async fn completed_event_logs_six_field_line() {
    let dir = tempfile::tempdir().unwrap();
    let exec = setup(&dir, Duration::from_secs(5));
    let client = FixedScores {
        scores: vec![0.7, 0.2, 0.1],
        calls: AtomicUsize::new(0),
    };

    let outcome = exec
        .process(&event_with_constituent_pt(1, 10.0), &client)
        .await
        .unwrap();
    let Outcome::Done { ranked, record, .. } = outcome else {
        panic!("event should complete");
    };
    assert_eq!(ranked.pairs(), vec![("top", 0.7), ("qcd", 0.2)]);
    assert_eq!(client.calls.load(Ordering::SeqCst), 1);

    let lines = output_lines(&dir);
    assert_eq!(lines.len(), 1);
    let fields: Vec<&str> = lines[0].split(',').collect();
    assert_eq!(fields.len(), 6);
    let stamps: Vec<i64> = fields[..4].iter().map(|f| f.parse().unwrap()).collect();
    assert!(stamps.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(stamps[0], record.prepare_start);
    assert_eq!(fields[4], "top");
    assert_eq!(fields[5], "0.7");
}

#[tokio::test]
async fn event_without_jets_still_classified() {
    let dir = tempfile::tempdir().unwrap();
    let exec = setup(&dir, Duration::from_secs(5));
    let client = FixedScores {
        scores: vec![0.1, 0.3, 0.6],
        calls: AtomicUsize::new(0),
    };
    let empty = Event {
        id: 9,
        ..Default::default()
    };
    let outcome = exec.process(&empty, &client).await.unwrap();
    assert!(outcome.is_done());
    assert!(output_lines(&dir)[0].ends_with(",higgs,0.6"));
}

#[tokio::test]
async fn transport_error_skips_logging() {
    let dir = tempfile::tempdir().unwrap();
    let exec = setup(&dir, Duration::from_secs(5));
    let outcome = exec
        .process(&event_with_constituent_pt(2, 10.0), &Refused)
        .await
        .unwrap();
    match outcome {
        Outcome::Failed { event_id, reason } => {
            assert_eq!(event_id, 2);
            assert!(matches!(reason, Error::Transport(_)));
        }
        Outcome::Done { .. } => panic!("refused transport cannot complete"),
    }
    assert!(output_lines(&dir).is_empty());
}

#[tokio::test]
async fn unanswered_request_times_out() {
    let dir = tempfile::tempdir().unwrap();
    let exec = setup(&dir, Duration::from_millis(50));
    let outcome = exec
        .process(&event_with_constituent_pt(3, 10.0), &NeverAnswers)
        .await
        .unwrap();
    assert!(matches!(
        outcome,
        Outcome::Failed {
            reason: Error::Timeout(_),
            ..
        }
    ));
    assert!(output_lines(&dir).is_empty());
}

#[tokio::test]
async fn concurrent_events_do_not_mix_records() {
    let dir = tempfile::tempdir().unwrap();
    let exec = setup(&dir, Duration::from_secs(5));
    let events: Vec<Event> = (0..30)
        .map(|i| {
            let pt = [10.0, 20.0, 30.0][i % 3];
            event_with_constituent_pt(i as u64, pt)
        })
        .collect();

    let outcomes: Vec<Outcome> = stream::iter(events.iter())
        .map(|ev| exec.process(ev, &IntensityClient))
        .buffer_unordered(8)
        .map(|r| r.unwrap())
        .collect()
        .await;

    assert_eq!(outcomes.len(), 30);
    let expected = ["top", "qcd", "higgs"];
    for outcome in &outcomes {
        let Outcome::Done { event_id, record, .. } = outcome else {
            panic!("all events should complete");
        };
        assert_eq!(record.top_label, expected[*event_id as usize % 3]);
    }

    let lines = output_lines(&dir);
    assert_eq!(lines.len(), 30);
    assert!(lines.iter().all(|l| l.split(',').count() == 6));
}

#[tokio::test]
async fn events_read_from_jsonl_file() {
    let dir = tempfile::tempdir().unwrap();
    let exec = setup(&dir, Duration::from_secs(5));
    let path = dir.path().join("events.jsonl");
    let body: Vec<String> = (0..3)
        .map(|i| serde_json::to_string(&event_with_constituent_pt(i, 10.0)).unwrap())
        .collect();
    std::fs::write(&path, body.join("\n")).unwrap();

    let client = FixedScores {
        scores: vec![0.2, 0.5],
        calls: AtomicUsize::new(0),
    };
    for event in EventSource::open(&path).unwrap() {
        let event = event.unwrap();
        assert!(exec.process(&event, &client).await.unwrap().is_done());
    }
    let lines = output_lines(&dir);
    assert_eq!(lines.len(), 3);
    assert!(lines.iter().all(|l| l.ends_with(",qcd,0.5")));
}

#[tokio::test]
async fn max_events_caps_logged_lines() {
    let dir = tempfile::tempdir().unwrap();
    let exec = setup(&dir, Duration::from_secs(5));
    let first = dir.path().join("first.jsonl");
    let second = dir.path().join("second.jsonl");
    let lines = |ids: std::ops::Range<u64>| {
        ids.map(|i| serde_json::to_string(&event_with_constituent_pt(i, 10.0)).unwrap())
            .collect::<Vec<_>>()
            .join("\n")
    };
    std::fs::write(&first, lines(0..3)).unwrap();
    std::fs::write(&second, lines(3..8)).unwrap();

    let client = FixedScores {
        scores: vec![0.7, 0.2, 0.1],
        calls: AtomicUsize::new(0),
    };
    let events = source::open_all(&[&first, &second]).unwrap();
    let summary = exec.run(events, &client, 2, Some(5)).await.unwrap();

    assert_eq!(summary, RunSummary { done: 5, failed: 0 });
    assert_eq!(client.calls.load(Ordering::SeqCst), 5);
    assert_eq!(output_lines(&dir).len(), 5);
}

#[tokio::test]
async fn run_without_limit_reads_every_file() {
    let dir = tempfile::tempdir().unwrap();
    let exec = setup(&dir, Duration::from_secs(5));
    let paths: Vec<_> = (0..3)
        .map(|i| {
            let p = dir.path().join(format!("events_{i}.jsonl"));
            std::fs::write(&p, serde_json::to_string(&event_with_constituent_pt(i, 10.0)).unwrap())
                .unwrap();
            p
        })
        .collect();
    let client = FixedScores {
        scores: vec![0.7, 0.2, 0.1],
        calls: AtomicUsize::new(0),
    };
    let events = source::open_all(paths.as_slice()).unwrap();
    let summary = exec.run(events, &client, 1, None).await.unwrap();
    assert_eq!(summary.done, 3);
    assert_eq!(output_lines(&dir).len(), 3);
}

#[tokio::test]
async fn remote_server_error_fails_event_without_logging() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let app = Router::new().route(
        INFER_ROUTE,
        post(|| async { StatusCode::INTERNAL_SERVER_ERROR }),
    );
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let dir = tempfile::tempdir().unwrap();
    let exec = setup(&dir, Duration::from_secs(5));
    let client = RemoteClient::new("127.0.0.1", port, Duration::from_secs(5)).unwrap();
    let outcome = exec
        .process(&event_with_constituent_pt(4, 10.0), &client)
        .await
        .unwrap();
    assert!(matches!(
        outcome,
        Outcome::Failed {
            event_id: 4,
            reason: Error::Transport(_)
        }
    ));
    assert!(output_lines(&dir).is_empty());
}
