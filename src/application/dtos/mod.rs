use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::domain::{ChatMessage, DomainError, ExpertLogRecord, RecordSource};

/// Keys that only ever appear in chat transcripts, never in an expert log.
pub const CONVERSATIONAL_KEYS: &[&str] = &[
    "user_query",
    "ai_response",
    "user_message",
    "assistant_reply",
    "messages",
    "response",
    "role",
];

/// Canonical expert-log payload accepted by `/store_log`.
///
/// Fields default to empty so that a missing field surfaces as a validation
/// error naming it rather than a generic decode failure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreLogRequest {
    #[serde(default)]
    pub elevator_id: String,
    #[serde(default)]
    pub problem: String,
    #[serde(default)]
    pub cause: String,
    #[serde(default)]
    pub steps: String,
    #[serde(default)]
    pub expert_id: String,
    #[serde(default)]
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl StoreLogRequest {
    pub fn source(&self) -> RecordSource {
        self.source
            .as_deref()
            .map(RecordSource::parse)
            .unwrap_or_default()
    }
}

/// Why an ingestion payload was acknowledged without being stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeflectionReason {
    ConversationalKey(String),
    NonExpertSource(String),
}

impl fmt::Display for DeflectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeflectionReason::ConversationalKey(key) => {
                write!(f, "payload carries conversational key `{key}`")
            }
            DeflectionReason::NonExpertSource(source) => {
                write!(f, "payload source `{source}` is not an expert")
            }
        }
    }
}

/// Structural classification of a raw ingestion body.
#[derive(Debug, Clone)]
pub enum IngestPayload {
    ExpertLog(StoreLogRequest),
    Deflected(DeflectionReason),
}

impl IngestPayload {
    pub fn classify(value: Value) -> Result<Self, DomainError> {
        let Some(object) = value.as_object() else {
            return Err(DomainError::validation("payload must be a JSON object"));
        };

        if let Some(key) = CONVERSATIONAL_KEYS
            .iter()
            .find(|key| object.contains_key(**key))
        {
            return Ok(IngestPayload::Deflected(DeflectionReason::ConversationalKey(
                (*key).to_string(),
            )));
        }

        let request: StoreLogRequest = serde_json::from_value(value)
            .map_err(|err| DomainError::validation(format!("invalid input data: {err}")))?;

        Ok(request.into())
    }
}

/// Only requests whose `source` is absent or `expert` become expert logs.
impl From<StoreLogRequest> for IngestPayload {
    fn from(request: StoreLogRequest) -> Self {
        match request.source() {
            RecordSource::Expert => IngestPayload::ExpertLog(request),
            _ => IngestPayload::Deflected(DeflectionReason::NonExpertSource(
                request.source.unwrap_or_default(),
            )),
        }
    }
}

/// Result of an `add` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddOutcome {
    Stored { id: Uuid },
    Deflected { reason: DeflectionReason },
}

impl AddOutcome {
    pub fn id(&self) -> Option<Uuid> {
        match self {
            AddOutcome::Stored { id } => Some(*id),
            AddOutcome::Deflected { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreLogResponse {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogListResponse {
    pub logs: Vec<ExpertLogRecord>,
}

/// Search input shared by the HTTP query string and library callers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchRequest {
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub elevator_id: Option<String>,
    #[serde(default, alias = "n_results")]
    pub top_k: Option<usize>,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Self::default()
        }
    }

    pub fn elevator(mut self, elevator_id: impl Into<String>) -> Self {
        self.elevator_id = Some(elevator_id.into());
        self
    }

    pub fn top_k(mut self, top_k: usize) -> Self {
        self.top_k = Some(top_k);
        self
    }
}

/// One shaped search hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultView {
    pub elevator_id: String,
    pub problem: String,
    pub cause: String,
    pub steps: String,
    pub expert_id: String,
    /// Distance rendered with four decimals; lower is closer.
    pub distance: String,
    pub refined_query: String,
    pub full_document: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub query: String,
    pub refined_query: String,
    pub results: Vec<ResultView>,
}

/// Retrieved knowledge handed to the chat path.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChatContext {
    Text(String),
    Matches(Vec<ResultView>),
}

impl ChatContext {
    pub fn is_empty(&self) -> bool {
        match self {
            ChatContext::Text(text) => text.trim().is_empty(),
            ChatContext::Matches(matches) => matches.is_empty(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub context: Option<ChatContext>,
    /// Run a retrieval on the latest user turn when no context is supplied.
    #[serde(default)]
    pub ground: bool,
    #[serde(default)]
    pub elevator_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatReply {
    pub response: String,
}

/// Health/readiness report for diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatusResponse {
    pub status: String,
    pub documents: usize,
    pub persistent: bool,
    pub embedding_model: String,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn expert_shape_is_accepted() {
        let payload = IngestPayload::classify(json!({
            "elevator_id": "E1",
            "problem": "door won't close",
            "cause": "sensor fault",
            "steps": "clean sensor",
            "expert_id": "x1",
            "timestamp": "2024-01-01T00:00:00Z"
        }))
        .unwrap();

        let IngestPayload::ExpertLog(request) = payload else {
            panic!("expected an expert log");
        };
        assert_eq!(request.elevator_id, "E1");
        assert_eq!(request.source(), RecordSource::Expert);
    }

    #[test]
    fn chat_artifacts_are_deflected() {
        let payload = IngestPayload::classify(json!({
            "expert_id": "TECH-007",
            "elevator_id": "All",
            "user_query": "lift is stuck",
            "ai_response": "--- Match 1 ---",
            "status": "completed",
            "timestamp": "2024-01-01T00:00:00Z",
            "log_id": "abc"
        }))
        .unwrap();

        assert!(matches!(
            payload,
            IngestPayload::Deflected(DeflectionReason::ConversationalKey(ref key)) if key == "user_query"
        ));
    }

    #[test]
    fn non_expert_source_is_deflected() {
        let payload = IngestPayload::classify(json!({
            "elevator_id": "E1",
            "problem": "p",
            "cause": "c",
            "steps": "s",
            "expert_id": "x1",
            "timestamp": "2024-01-01T00:00:00Z",
            "source": "chat"
        }))
        .unwrap();

        assert!(matches!(
            payload,
            IngestPayload::Deflected(DeflectionReason::NonExpertSource(_))
        ));
    }

    #[test]
    fn non_object_body_is_a_validation_error() {
        let err = IngestPayload::classify(json!(["not", "an", "object"])).unwrap_err();
        assert!(err.is_client_error());
    }

    #[test]
    fn chat_context_accepts_text_or_matches() {
        let text: ChatContext = serde_json::from_value(json!("manual excerpt")).unwrap();
        assert!(matches!(text, ChatContext::Text(_)));

        let matches: ChatContext = serde_json::from_value(json!([{
            "elevator_id": "E1",
            "problem": "p",
            "cause": "c",
            "steps": "s",
            "expert_id": "x1",
            "distance": "0.1000",
            "refined_query": "q",
            "full_document": "d"
        }]))
        .unwrap();
        assert!(matches!(matches, ChatContext::Matches(ref m) if m.len() == 1));
    }

    #[test]
    fn search_request_accepts_n_results_alias() {
        let request: SearchRequest =
            serde_json::from_value(json!({"query": "noise", "n_results": 5})).unwrap();
        assert_eq!(request.top_k, Some(5));
    }
}
