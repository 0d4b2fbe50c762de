use ccusage_agent::models::UsageRecord;
use ccusage_agent::reporter::{ReportError, ReportOutcome, Reporter, BATCH_SIZE};
use ccusage_agent::state::StateStore;
use mockito::{Matcher, Server};
use serde_json::{json, Value};
use std::fs;
use tempfile::TempDir;

const API_KEY: &str = "test-key";

fn records(count: usize) -> Vec<UsageRecord> {
    (0..count)
        .map(|i| UsageRecord {
            input_tokens: i as u64 + 1,
            output_tokens: 2,
            total_tokens: i as u64 + 3,
            cache_create_tokens: 0,
            cache_read_tokens: 0,
            session_id: Some("session-1".to_string()),
            model: Some("claude-sonnet-4-20250514".to_string()),
            timestamp: 1_717_200_000 + i as i64,
            record_id: format!("/logs/s.jsonl:msg_{i}:req_{i}"),
        })
        .collect()
}

fn persisted_ids(state: &StateStore) -> Vec<String> {
    let raw: Value = serde_json::from_str(&fs::read_to_string(state.path()).unwrap()).unwrap();
    raw["reportedRecords"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn sends_wire_format_with_auth_headers() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/api/usage/report")
        .match_header("authorization", "Bearer test-key")
        .match_header("content-type", "application/json")
        .match_header("user-agent", Matcher::Regex("^ccusage-agent/".to_string()))
        .match_body(Matcher::Json(json!({
            "records": [{
                "input_tokens": 1,
                "output_tokens": 2,
                "total_tokens": 3,
                "cache_create_tokens": 0,
                "cache_read_tokens": 0,
                "session_id": "session-1",
                "model": "claude-sonnet-4-20250514",
                "timestamp": 1_717_200_000
            }]
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"inserted":1,"skipped":0}"#)
        .expect(1)
        .create_async()
        .await;

    let temp = TempDir::new().unwrap();
    let mut state = StateStore::empty(temp.path().join("state.json"));
    let reporter = Reporter::new(&format!("{}/", server.url()), API_KEY, false).unwrap();

    let outcome = reporter.report(&records(1), &mut state).await;

    mock.assert_async().await;
    assert!(outcome.is_success());
    assert_eq!(outcome.summary().inserted, 1);
    assert!(state.is_reported("/logs/s.jsonl:msg_0:req_0"));
}

#[tokio::test]
async fn splits_into_sequential_batches() {
    let mut server = Server::new_async().await;
    let mut mocks = Vec::new();
    for (first, size) in [(1, 500), (501, 500), (1001, 200)] {
        mocks.push(
            server
                .mock("POST", "/api/usage/report")
                .match_body(Matcher::Regex(format!(r#"\{{"input_tokens":{first},"#)))
                .with_status(200)
                .with_body(format!(r#"{{"inserted":{size},"skipped":0}}"#))
                .expect(1)
                .create_async()
                .await,
        );
    }

    let temp = TempDir::new().unwrap();
    let mut state = StateStore::empty(temp.path().join("state.json"));
    let reporter = Reporter::new(&server.url(), API_KEY, false).unwrap();

    let outcome = reporter.report(&records(1200), &mut state).await;

    for mock in &mocks {
        mock.assert_async().await;
    }
    let ReportOutcome::Success(summary) = outcome else {
        panic!("expected success");
    };
    assert_eq!(summary.batches_sent, 3);
    assert_eq!(summary.records_sent, 1200);
    assert_eq!(summary.inserted, 1200);
    assert_eq!(state.len(), 1200);
    assert_eq!(persisted_ids(&state).len(), 1200);
}

#[tokio::test]
async fn failed_batch_stops_the_run() {
    let mut server = Server::new_async().await;
    let first = server
        .mock("POST", "/api/usage/report")
        .match_body(Matcher::Regex(r#"\{"input_tokens":1,"#.to_string()))
        .with_status(200)
        .with_body(r#"{"inserted":500,"skipped":0}"#)
        .expect(1)
        .create_async()
        .await;
    let second = server
        .mock("POST", "/api/usage/report")
        .match_body(Matcher::Regex(r#"\{"input_tokens":501,"#.to_string()))
        .with_status(500)
        .with_body("database unavailable")
        .expect(1)
        .create_async()
        .await;
    let third = server
        .mock("POST", "/api/usage/report")
        .match_body(Matcher::Regex(r#"\{"input_tokens":1001,"#.to_string()))
        .with_status(200)
        .with_body(r#"{"inserted":200}"#)
        .expect(0)
        .create_async()
        .await;

    let temp = TempDir::new().unwrap();
    let mut state = StateStore::empty(temp.path().join("state.json"));
    let reporter = Reporter::new(&server.url(), API_KEY, false).unwrap();
    let records = records(1200);

    let outcome = reporter.report(&records, &mut state).await;

    first.assert_async().await;
    second.assert_async().await;
    third.assert_async().await;

    let ReportOutcome::PartialFailure {
        summary,
        pending,
        error,
    } = outcome
    else {
        panic!("expected partial failure");
    };
    assert_eq!(summary.batches_sent, 1);
    assert_eq!(summary.records_sent, BATCH_SIZE);
    assert_eq!(pending, 700);
    assert!(matches!(error, ReportError::Status { status, .. } if status.as_u16() == 500));

    assert_eq!(state.len(), BATCH_SIZE);
    assert!(state.is_reported(&records[499].record_id));
    assert!(!state.is_reported(&records[500].record_id));

    let persisted = persisted_ids(&state);
    assert_eq!(persisted.len(), BATCH_SIZE);
    assert_eq!(persisted[0], records[0].record_id);
}

#[tokio::test]
async fn missing_counts_default_to_batch_size() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("POST", "/api/usage/report")
        .with_status(201)
        .with_body("{}")
        .create_async()
        .await;

    let temp = TempDir::new().unwrap();
    let mut state = StateStore::empty(temp.path().join("state.json"));
    let reporter = Reporter::new(&server.url(), API_KEY, false).unwrap();

    let outcome = reporter.report(&records(3), &mut state).await;

    assert!(outcome.is_success());
    assert_eq!(outcome.summary().inserted, 3);
    assert_eq!(outcome.summary().skipped, 0);
}

#[tokio::test]
async fn non_object_body_is_a_failure() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("POST", "/api/usage/report")
        .with_status(200)
        .with_body("[1, 2, 3]")
        .create_async()
        .await;

    let temp = TempDir::new().unwrap();
    let mut state = StateStore::empty(temp.path().join("state.json"));
    let reporter = Reporter::new(&server.url(), API_KEY, false).unwrap();

    let outcome = reporter.report(&records(2), &mut state).await;

    assert!(matches!(
        outcome,
        ReportOutcome::PartialFailure {
            error: ReportError::UnexpectedShape,
            pending: 2,
            ..
        }
    ));
    assert!(state.is_empty());
}

#[tokio::test]
async fn unparseable_body_is_a_failure() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("POST", "/api/usage/report")
        .with_status(200)
        .with_body("<html>ok</html>")
        .create_async()
        .await;

    let temp = TempDir::new().unwrap();
    let mut state = StateStore::empty(temp.path().join("state.json"));
    let reporter = Reporter::new(&server.url(), API_KEY, false).unwrap();

    let outcome = reporter.report(&records(2), &mut state).await;

    assert!(matches!(
        outcome,
        ReportOutcome::PartialFailure {
            error: ReportError::Decode(_),
            ..
        }
    ));
    assert!(state.is_empty());
    assert!(!state.path().exists());
}

#[tokio::test]
async fn unreachable_server_is_a_transport_failure() {
    let temp = TempDir::new().unwrap();
    let mut state = StateStore::empty(temp.path().join("state.json"));
    let reporter = Reporter::new("http://127.0.0.1:1", API_KEY, false).unwrap();

    let outcome = reporter.report(&records(1), &mut state).await;

    assert!(matches!(
        outcome,
        ReportOutcome::PartialFailure {
            error: ReportError::Transport(_),
            ..
        }
    ));
    assert!(state.is_empty());
}

#[tokio::test]
async fn empty_record_list_makes_no_request() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/api/usage/report")
        .expect(0)
        .create_async()
        .await;

    let temp = TempDir::new().unwrap();
    let mut state = StateStore::empty(temp.path().join("state.json"));
    let reporter = Reporter::new(&server.url(), API_KEY, false).unwrap();

    let outcome = reporter.report(&[], &mut state).await;

    mock.assert_async().await;
    assert!(outcome.is_success());
    assert_eq!(outcome.summary().batches_sent, 0);
}

#[tokio::test]
async fn odd_counts_in_a_2xx_object_still_commit_the_batch() {
    for body in [
        r#"{"inserted":"1"}"#,
        r#"{"inserted":1.0}"#,
        r#"{"skipped":-1}"#,
        r#"{"inserted":null}"#,
    ] {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/usage/report")
            .with_status(200)
            .with_body(body)
            .create_async()
            .await;

        let temp = TempDir::new().unwrap();
        let mut state = StateStore::empty(temp.path().join("state.json"));
        let reporter = Reporter::new(&server.url(), API_KEY, false).unwrap();

        let outcome = reporter.report(&records(1), &mut state).await;

        assert!(outcome.is_success(), "{body}");
        assert_eq!(outcome.summary().inserted, 1, "{body}");
        assert_eq!(outcome.summary().skipped, 0, "{body}");
        assert!(state.is_reported("/logs/s.jsonl:msg_0:req_0"), "{body}");
        assert_eq!(persisted_ids(&state).len(), 1, "{body}");
    }
}
