use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Where a record came from. Only `Expert` records are knowledge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordSource {
    Expert,
    /// Technician/assistant conversation artifacts.
    Chat,
    Other(String),
}

impl RecordSource {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "expert" => RecordSource::Expert,
            "chat" | "ai" | "assistant" | "technician_chat" => RecordSource::Chat,
            other => RecordSource::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            RecordSource::Expert => "expert",
            RecordSource::Chat => "chat",
            RecordSource::Other(other) => other,
        }
    }

    pub fn is_expert(&self) -> bool {
        matches!(self, RecordSource::Expert)
    }
}

impl Default for RecordSource {
    fn default() -> Self {
        RecordSource::Expert
    }
}

/// The unit of knowledge: one fault/fix write-up authored by an expert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpertLogRecord {
    pub id: Uuid,
    pub elevator_id: String,
    pub problem: String,
    pub cause: String,
    pub steps: String,
    pub expert_id: String,
    pub timestamp: String,
    pub source: RecordSource,
    /// Text that gets embedded; always `document_content(..)` of the fields above.
    pub document: String,
}

impl ExpertLogRecord {
    pub fn new(
        elevator_id: impl Into<String>,
        problem: impl Into<String>,
        cause: impl Into<String>,
        steps: impl Into<String>,
        expert_id: impl Into<String>,
        timestamp: impl Into<String>,
        source: RecordSource,
    ) -> Self {
        let elevator_id = elevator_id.into();
        let problem = problem.into();
        let cause = cause.into();
        let steps = steps.into();
        let document = document_content(&elevator_id, &problem, &cause, &steps);

        Self {
            id: Uuid::new_v4(),
            elevator_id,
            problem,
            cause,
            steps,
            expert_id: expert_id.into(),
            timestamp: timestamp.into(),
            source,
            document,
        }
    }

    /// Rebuilds the embedded text from the structured fields.
    pub fn regenerate_document(&self) -> String {
        document_content(&self.elevator_id, &self.problem, &self.cause, &self.steps)
    }
}

pub fn document_content(elevator_id: &str, problem: &str, cause: &str, steps: &str) -> String {
    format!(
        "Elevator ID: {elevator_id}. Problem: {problem}. Root Cause: {cause}. Fixing Steps: {steps}."
    )
}

/// A single equality constraint over record metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldPredicate {
    ExpertId(String),
    ElevatorId(String),
    Source(RecordSource),
}

impl FieldPredicate {
    pub fn matches(&self, record: &ExpertLogRecord) -> bool {
        match self {
            FieldPredicate::ExpertId(id) => &record.expert_id == id,
            FieldPredicate::ElevatorId(id) => &record.elevator_id == id,
            FieldPredicate::Source(source) => &record.source == source,
        }
    }
}

/// Conjunction of predicates; an empty filter matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogFilter {
    predicates: Vec<FieldPredicate>,
}

impl LogFilter {
    pub fn any() -> Self {
        Self::default()
    }

    pub fn by_expert(expert_id: impl Into<String>) -> Self {
        Self::any().and(FieldPredicate::ExpertId(expert_id.into()))
    }

    pub fn and(mut self, predicate: FieldPredicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    /// Adds an elevator constraint unless `elevator_id` is absent or blank.
    pub fn with_elevator(self, elevator_id: Option<&str>) -> Self {
        match elevator_id.map(str::trim).filter(|id| !id.is_empty()) {
            Some(id) => self.and(FieldPredicate::ElevatorId(id.to_string())),
            None => self,
        }
    }

    pub fn expert_only(self) -> Self {
        self.and(FieldPredicate::Source(RecordSource::Expert))
    }

    pub fn predicates(&self) -> &[FieldPredicate] {
        &self.predicates
    }

    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    pub fn matches(&self, record: &ExpertLogRecord) -> bool {
        self.predicates.iter().all(|p| p.matches(record))
    }
}

/// Vector representation of a record's document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEmbedding {
    pub model: String,
    pub vector: Vec<f32>,
}

impl LogEmbedding {
    pub fn new(model: impl Into<String>, vector: Vec<f32>) -> Self {
        Self {
            model: model.into(),
            vector,
        }
    }

    pub fn dims(&self) -> usize {
        self.vector.len()
    }
}

/// A stored record paired with its vector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexedLog {
    pub record: ExpertLogRecord,
    pub embedding: LogEmbedding,
}

/// A nearest-neighbour match; lower distance means closer.
#[derive(Debug, Clone)]
pub struct IndexHit {
    pub record: ExpertLogRecord,
    pub distance: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}
