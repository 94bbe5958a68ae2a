//! Tests for the workflow engine client.

use super::*;
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn sse(events: &[&str]) -> String {
    events.iter().map(|e| format!("data: {}\n\n", e)).collect()
}

fn engine(server: &MockServer) -> HttpWorkflowEngine {
    HttpWorkflowEngine::new(server.uri(), Duration::from_secs(5)).unwrap()
}

async fn collect(stream: WorkflowEventStream) -> Vec<Result<WorkflowEvent, JobError>> {
    stream.collect().await
}

#[test]
fn test_parse_sse_line_event() {
    let line = r#"data: {"type":"WORKFLOW","executionId":"e1","data":{"state":"FULFILLED","outputs":{"count":5}}}"#;
    match parse_sse_line(line) {
        SseLine::Event(event) => {
            assert!(event.is_fulfilled());
            assert_eq!(event.execution_id.as_deref(), Some("e1"));
            assert_eq!(event.data.outputs, Some(json!({"count": 5})));
        }
        other => panic!("unexpected: {:?}", other),
    }
}

#[test]
fn test_parse_sse_line_done_and_noise() {
    assert_eq!(parse_sse_line("data: [DONE]"), SseLine::Done);
    assert_eq!(parse_sse_line(""), SseLine::Skip);
    assert_eq!(parse_sse_line(": keep-alive"), SseLine::Skip);
    assert_eq!(parse_sse_line("event: message"), SseLine::Skip);
    assert_eq!(parse_sse_line("data: not json"), SseLine::Skip);
}

#[test]
fn test_event_without_data_defaults() {
    let event: WorkflowEvent = serde_json::from_str(r#"{"type":"NODE"}"#).unwrap();
    assert_eq!(event.data, WorkflowEventData::default());
    assert!(!event.is_fulfilled());
    assert!(event.error_message().is_none());
}

#[test]
fn test_error_message_shapes() {
    let plain: WorkflowEvent =
        serde_json::from_str(r#"{"type":"NODE","data":{"error":"boom"}}"#).unwrap();
    assert_eq!(plain.error_message().as_deref(), Some("boom"));

    let object: WorkflowEvent =
        serde_json::from_str(r#"{"type":"NODE","data":{"error":{"message":"bad input"}}}"#)
            .unwrap();
    assert_eq!(object.error_message().as_deref(), Some("bad input"));

    let null: WorkflowEvent =
        serde_json::from_str(r#"{"type":"NODE","data":{"error":null}}"#).unwrap();
    assert!(null.error_message().is_none());
}

#[test]
fn test_rejected_requires_workflow_type() {
    let node: WorkflowEvent =
        serde_json::from_str(r#"{"type":"NODE","data":{"state":"REJECTED"}}"#).unwrap();
    assert!(!node.is_rejected());

    let workflow: WorkflowEvent =
        serde_json::from_str(r#"{"type":"WORKFLOW","data":{"state":"REJECTED"}}"#).unwrap();
    assert!(workflow.is_rejected());
}

#[tokio::test]
async fn test_execute_stream_posts_and_yields_events() {
    let server = MockServer::start().await;
    let body = sse(&[
        r#"{"type":"WORKFLOW","executionId":"exec-1","data":{"state":"INITIATED"}}"#,
        r#"{"type":"NODE","executionId":"exec-1","data":{"state":"FULFILLED"}}"#,
        r#"{"type":"WORKFLOW","executionId":"exec-1","data":{"state":"FULFILLED","outputs":{"count":5}}}"#,
    ]);

    Mock::given(method("POST"))
        .and(path("/api/workflows/daily-report/execute"))
        .and(header("authorization", "Bearer key-1"))
        .and(body_json(json!({"inputs": {}, "stream": true})))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .expect(1)
        .mount(&server)
        .await;

    let stream = engine(&server)
        .with_api_key("key-1")
        .execute_stream("daily-report", json!({}))
        .await
        .unwrap();
    let events = collect(stream).await;

    assert_eq!(events.len(), 3);
    let last = events[2].as_ref().unwrap();
    assert!(last.is_fulfilled());
    assert_eq!(last.data.outputs, Some(json!({"count": 5})));
}

#[tokio::test]
async fn test_execute_stream_stops_at_done() {
    let server = MockServer::start().await;
    let mut body = sse(&[r#"{"type":"NODE","data":{}}"#, "[DONE]"]);
    body.push_str(&sse(&[r#"{"type":"WORKFLOW","data":{"state":"FULFILLED"}}"#]));

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&server)
        .await;

    let stream = engine(&server).execute_stream("wf", json!({})).await.unwrap();
    let events = collect(stream).await;
    assert_eq!(events.len(), 1);
}

#[tokio::test]
async fn test_execute_stream_trailing_line_without_newline() {
    let server = MockServer::start().await;
    let body = r#"data: {"type":"WORKFLOW","data":{"state":"FULFILLED"}}"#;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&server)
        .await;

    let stream = engine(&server).execute_stream("wf", json!({})).await.unwrap();
    let events = collect(stream).await;
    assert_eq!(events.len(), 1);
    assert!(events[0].as_ref().unwrap().is_fulfilled());
}

#[tokio::test]
async fn test_execute_stream_upstream_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(404).set_body_json(json!({"error": {"message": "no such workflow"}})),
        )
        .mount(&server)
        .await;

    let result = engine(&server).execute_stream("missing", json!({})).await;
    match result {
        Err(JobError::Upstream { status, message }) => {
            assert_eq!(status, 404);
            assert_eq!(message, "no such workflow");
        }
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("expected an upstream error"),
    }
}

#[tokio::test]
async fn test_execute_url_keeps_base_path() {
    let engine = HttpWorkflowEngine::new("http://engine.local/prefix/", Duration::from_secs(1)).unwrap();
    let url = engine.execute_url("nightly sync").unwrap();
    assert_eq!(
        url.as_str(),
        "http://engine.local/prefix/api/workflows/nightly%20sync/execute"
    );
}

#[tokio::test]
async fn test_connection_refused_is_network_error() {
    let engine = HttpWorkflowEngine::new("http://127.0.0.1:1", Duration::from_secs(1)).unwrap();
    let result = engine.execute_stream("wf", json!({})).await;
    assert!(matches!(result, Err(JobError::Network(_))));
}

#[test]
fn test_line_buffer_keeps_split_characters() {
    let line = "data: café\n".as_bytes();
    let split = line.iter().position(|b| *b == 0xC3).unwrap() + 1;

    let mut buffer = LineBuffer::default();
    buffer.extend(&line[..split]);
    assert_eq!(buffer.next_line(), None);
    buffer.extend(&line[split..]);
    assert_eq!(buffer.next_line().as_deref(), Some("data: café"));
    assert_eq!(buffer.finish(), "");
}

/// Serve one chunked event stream, writing `chunks` with a pause between them.
async fn serve_chunked(chunks: Vec<Vec<u8>>) -> String {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();

        let mut request = Vec::new();
        let mut buf = [0u8; 1024];
        loop {
            let n = socket.read(&mut buf).await.unwrap();
            request.extend_from_slice(&buf[..n]);
            let text = String::from_utf8_lossy(&request).to_string();
            if let Some(end) = text.find("\r\n\r\n") {
                let length = text
                    .lines()
                    .filter_map(|l| l.split_once(':'))
                    .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
                    .and_then(|(_, value)| value.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if request.len() >= end + 4 + length {
                    break;
                }
            }
            if n == 0 {
                break;
            }
        }

        socket
            .write_all(b"HTTP/1.1 200 OK\r\ncontent-type: text/event-stream\r\ntransfer-encoding: chunked\r\n\r\n")
            .await
            .unwrap();
        for chunk in chunks {
            socket
                .write_all(format!("{:x}\r\n", chunk.len()).as_bytes())
                .await
                .unwrap();
            socket.write_all(&chunk).await.unwrap();
            socket.write_all(b"\r\n").await.unwrap();
            socket.flush().await.unwrap();
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        socket.write_all(b"0\r\n\r\n").await.unwrap();
        socket.flush().await.unwrap();
    });

    format!("http://{}", addr)
}

#[tokio::test]
async fn test_execute_stream_multibyte_split_across_chunks() {
    let body = "data: {\"type\":\"WORKFLOW\",\"data\":{\"state\":\"FULFILLED\",\"outputs\":{\"city\":\"café\"}}}\n\n";
    let bytes = body.as_bytes();
    let split = bytes.iter().position(|b| *b == 0xC3).unwrap() + 1;
    let base_url = serve_chunked(vec![bytes[..split].to_vec(), bytes[split..].to_vec()]).await;

    let engine = HttpWorkflowEngine::new(base_url, Duration::from_secs(5)).unwrap();
    let stream = engine.execute_stream("wf", json!({})).await.unwrap();
    let events = collect(stream).await;

    assert_eq!(events.len(), 1);
    let event = events[0].as_ref().unwrap();
    assert!(event.is_fulfilled());
    assert_eq!(event.data.outputs, Some(json!({"city": "café"})));
}
