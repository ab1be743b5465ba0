use std::{
    io::Read,
    net::TcpListener,
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use liftkb::{
    application::ChatOrchestrator,
    domain::{ChatMessage, DomainError},
    infrastructure::OllamaChatClient,
};

/// Accepts one connection, reads the request and never answers.
fn silent_server(hold: Duration) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    thread::spawn(move || {
        if let Ok((mut stream, _)) = listener.accept() {
            let mut buf = [0u8; 4096];
            let _ = stream.read(&mut buf);
            thread::sleep(hold);
        }
    });
    format!("http://{addr}/api/chat")
}

#[test]
fn silent_completion_service_times_out_within_the_limit() {
    let endpoint = silent_server(Duration::from_secs(5));
    let client = OllamaChatClient::new(endpoint, "phi3");
    let limit = Duration::from_millis(300);
    let chat = ChatOrchestrator::new(Arc::new(client), limit);

    let started = Instant::now();
    let err = chat
        .respond(&[ChatMessage::user("elevator stuck on floor 3")], None)
        .unwrap_err();

    assert!(
        matches!(err, DomainError::UpstreamTimeout(d) if d == limit),
        "unexpected error: {err}"
    );
    assert!(!err.is_client_error());
    assert!(started.elapsed() < Duration::from_secs(4));
}

#[test]
fn unreachable_completion_service_is_an_upstream_error() {
    // bind then drop to get a port nobody listens on
    let port = TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();
    let client = OllamaChatClient::new(format!("http://127.0.0.1:{port}/api/chat"), "phi3");
    let chat = ChatOrchestrator::new(Arc::new(client), Duration::from_secs(2));

    let err = chat
        .respond(&[ChatMessage::user("noise in car")], None)
        .unwrap_err();
    assert!(matches!(err, DomainError::Upstream(_)), "unexpected error: {err}");
}
