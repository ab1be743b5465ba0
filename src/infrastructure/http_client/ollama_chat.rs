use std::{
    error::Error as StdError,
    io,
    time::{Duration, Instant},
};

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::{
    application::services::CompletionBackend,
    domain::{ChatMessage, CompletionError},
};

#[derive(Serialize)]
struct ChatPayload<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
}

/// Completion backend speaking the Ollama `/api/chat` protocol.
pub struct OllamaChatClient {
    endpoint: String,
    model: String,
    agent: ureq::Agent,
}

impl OllamaChatClient {
    pub fn new(endpoint: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            model: model.into(),
            agent: ureq::AgentBuilder::new().build(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn classify_transport(
        err: ureq::Transport,
        started: Instant,
        timeout: Duration,
    ) -> CompletionError {
        if started.elapsed() >= timeout || chain_timed_out(&err) {
            CompletionError::Timeout(timeout)
        } else {
            CompletionError::Transport(err.to_string())
        }
    }
}

impl CompletionBackend for OllamaChatClient {
    fn complete(
        &self,
        messages: &[ChatMessage],
        timeout: Duration,
    ) -> Result<String, CompletionError> {
        let payload = ChatPayload {
            model: &self.model,
            messages,
            stream: false,
        };

        let started = Instant::now();
        let response = match self
            .agent
            .post(&self.endpoint)
            .timeout(timeout)
            .send_json(&payload)
        {
            Ok(response) => response,
            Err(ureq::Error::Status(code, response)) => {
                let body = response.into_string().unwrap_or_default();
                return Err(CompletionError::Status { code, body });
            }
            Err(ureq::Error::Transport(transport)) => {
                return Err(Self::classify_transport(transport, started, timeout));
            }
        };

        let json: Value = response.into_json().map_err(|err| {
            if is_timeout_kind(err.kind()) || started.elapsed() >= timeout {
                CompletionError::Timeout(timeout)
            } else {
                CompletionError::InvalidResponse(format!("failed to decode reply: {err}"))
            }
        })?;

        debug!(
            model = %self.model,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "completion received"
        );

        json.get("message")
            .and_then(|m| m.get("content"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| {
                CompletionError::InvalidResponse("reply is missing message.content".into())
            })
    }

    fn name(&self) -> &str {
        "ollama"
    }
}

fn is_timeout_kind(kind: io::ErrorKind) -> bool {
    matches!(kind, io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock)
}

fn chain_timed_out(err: &(dyn StdError + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(e) = current {
        if let Some(io_err) = e.downcast_ref::<io::Error>() {
            if is_timeout_kind(io_err.kind()) {
                return true;
            }
        }
        current = e.source();
    }
    false
}

#[cfg(test)]
mod tests {
    use std::{
        io::{Read, Write},
        net::TcpListener,
        thread,
    };

    use super::*;

    fn serve_once(status_line: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut buf = [0u8; 8192];
            let _ = stream.read(&mut buf);
            let response = format!(
                "{status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            stream.write_all(response.as_bytes()).unwrap();
        });
        format!("http://{addr}/api/chat")
    }

    #[test]
    fn reads_message_content() {
        let url = serve_once(
            "HTTP/1.1 200 OK",
            r#"{"message":{"role":"assistant","content":"Diagnosis: worn rollers"}}"#,
        );
        let client = OllamaChatClient::new(url, "phi3");
        let reply = client
            .complete(&[ChatMessage::user("noise")], Duration::from_secs(5))
            .unwrap();
        assert_eq!(reply, "Diagnosis: worn rollers");
    }

    #[test]
    fn non_success_status_is_reported_with_body() {
        let url = serve_once("HTTP/1.1 404 Not Found", r#"{"error":"model not found"}"#);
        let client = OllamaChatClient::new(url, "missing");
        let err = client
            .complete(&[ChatMessage::user("noise")], Duration::from_secs(5))
            .unwrap_err();
        assert!(matches!(
            err,
            CompletionError::Status { code: 404, ref body } if body.contains("model not found")
        ));
    }

    #[test]
    fn missing_content_is_invalid() {
        let url = serve_once("HTTP/1.1 200 OK", r#"{"done":true}"#);
        let client = OllamaChatClient::new(url, "phi3");
        let err = client
            .complete(&[ChatMessage::user("noise")], Duration::from_secs(5))
            .unwrap_err();
        assert!(matches!(err, CompletionError::InvalidResponse(_)));
    }
}
