//! End-to-end batch sessions against an in-process fake recognize endpoint.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc::UnboundedReceiver;
use vocap::{
    Config, ErrorKind, MockFrameSource, Mode, SessionController, SessionEvent, SessionState,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Minimal HTTP/1.1 responder: reads one full request (headers + body per
/// Content-Length), replies with the given status and JSON body, closes.
async fn spawn_recognize_endpoint(
    status_line: &'static str,
    body: String,
    hits: Arc<AtomicUsize>,
) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else {
                break;
            };
            hits.fetch_add(1, Ordering::SeqCst);

            // Read until the end of headers.
            let mut request = Vec::new();
            let mut chunk = [0u8; 4096];
            let header_end = loop {
                let n = match stream.read(&mut chunk).await {
                    Ok(0) | Err(_) => break None,
                    Ok(n) => n,
                };
                request.extend_from_slice(&chunk[..n]);
                if let Some(pos) = request.windows(4).position(|w| w == b"\r\n\r\n") {
                    break Some(pos + 4);
                }
            };
            let Some(header_end) = header_end else {
                continue;
            };

            // Drain the body so the client finishes its upload cleanly.
            let headers = String::from_utf8_lossy(&request[..header_end]).to_lowercase();
            let content_length = headers
                .lines()
                .find_map(|line| line.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            let mut body_read = request.len() - header_end;
            while body_read < content_length {
                let n = match stream.read(&mut chunk).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => n,
                };
                body_read += n;
            }

            let response = format!(
                "{}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status_line,
                body.len(),
                body
            );
            let _ = stream.write_all(response.as_bytes()).await;
            let _ = stream.shutdown().await;
        }
    });

    format!("http://{}/recognize", addr)
}

fn batch_config(batch_endpoint: String) -> Config {
    let mut config = Config::default();
    config.recognition.batch_endpoint = batch_endpoint;
    config.recognition.appkey = "test-appkey".to_string();
    config.recognition.token = "test-token".to_string();
    config
}

fn collect(rx: &mut UnboundedReceiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut events = Vec::new();
    while let Ok(ev) = rx.try_recv() {
        events.push(ev);
    }
    events
}

// Scenario D: batch capture, one adapter invocation, final result echoing
// the endpoint's response.
#[tokio::test]
async fn batch_session_invokes_adapter_once_with_the_container() {
    init_tracing();
    let hits = Arc::new(AtomicUsize::new(0));
    let endpoint = spawn_recognize_endpoint(
        "HTTP/1.1 200 OK",
        r#"{"text":"the quick brown fox"}"#.to_string(),
        Arc::clone(&hits),
    )
    .await;
    let config = batch_config(endpoint);

    // ~3 seconds of 16kHz mono PCM in 100ms frames.
    let source = MockFrameSource::new().with_frames(vec![vec![0u8; 3200]; 30]);
    let (mut controller, mut rx) = SessionController::new(config, Box::new(source));

    controller.start(Mode::Batch).await.unwrap();
    controller.stop().await.unwrap();
    assert_eq!(controller.state(), SessionState::Completed);
    assert_eq!(hits.load(Ordering::SeqCst), 1, "exactly one upload");

    let events = collect(&mut rx);
    let container = events
        .iter()
        .find_map(|ev| match ev {
            SessionEvent::ContainerReady(c) => Some(c),
            _ => None,
        })
        .expect("container event");
    assert_eq!(container.payload_len(), 30 * 3200);

    let final_text = events
        .iter()
        .find_map(|ev| match ev {
            SessionEvent::FinalResult(text) => Some(text.as_str()),
            _ => None,
        })
        .expect("final result event");
    assert_eq!(final_text, "the quick brown fox");
    assert!(matches!(events.last(), Some(SessionEvent::Stopped)));
}

#[tokio::test]
async fn batch_upstream_failure_surfaces_as_recognition_error() {
    init_tracing();
    let hits = Arc::new(AtomicUsize::new(0));
    let endpoint = spawn_recognize_endpoint(
        "HTTP/1.1 502 Bad Gateway",
        r#"{"error":"engine unavailable"}"#.to_string(),
        Arc::clone(&hits),
    )
    .await;
    let config = batch_config(endpoint);

    let source = MockFrameSource::new().with_frames(vec![vec![0u8; 3200]; 3]);
    let (mut controller, mut rx) = SessionController::new(config, Box::new(source));

    controller.start(Mode::Batch).await.unwrap();
    controller.stop().await.unwrap();
    // One attempt, no retry.
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    let events = collect(&mut rx);
    let detail = events
        .iter()
        .find_map(|ev| match ev {
            SessionEvent::Error {
                kind: ErrorKind::Recognition,
                detail,
            } => Some(detail.as_str()),
            _ => None,
        })
        .expect("recognition error event");
    assert!(detail.contains("502"), "detail carries upstream status: {detail}");
    assert!(
        !events
            .iter()
            .any(|ev| matches!(ev, SessionEvent::FinalResult(_))),
        "no final result on upstream failure"
    );
    // The container itself was still produced before the upload.
    assert!(
        events
            .iter()
            .any(|ev| matches!(ev, SessionEvent::ContainerReady(_)))
    );
}
