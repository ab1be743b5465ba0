use std::sync::Arc;

use chrono::{DateTime, NaiveDateTime};
use tracing::{debug, info};

use crate::{
    application::dtos::{AddOutcome, IngestPayload, StoreLogRequest},
    domain::{
        DomainError, ExpertLogRecord, IndexedLog, LogEmbedding, LogFilter, RecordSource,
    },
};

use super::{EmbeddingEngine, VectorIndex};

const MAX_FIELD_CHARS: usize = 8_000;

/// Append-only collection of expert logs backed by a vector index.
pub struct KnowledgeStore {
    embedder: Arc<dyn EmbeddingEngine>,
    index: Arc<dyn VectorIndex>,
    embedding_model: String,
}

impl KnowledgeStore {
    pub fn new(
        embedder: Arc<dyn EmbeddingEngine>,
        index: Arc<dyn VectorIndex>,
        embedding_model: impl Into<String>,
    ) -> Self {
        Self {
            embedder,
            index,
            embedding_model: embedding_model.into(),
        }
    }

    /// Stores an expert log, or acknowledges a misrouted chat payload without storing it.
    pub fn add(&self, payload: impl Into<IngestPayload>) -> Result<AddOutcome, DomainError> {
        let request = match payload.into() {
            IngestPayload::ExpertLog(request) => request,
            IngestPayload::Deflected(reason) => {
                info!(%reason, "AI chat not stored");
                return Ok(AddOutcome::Deflected { reason });
            }
        };

        Self::validate(&request)?;

        let record = ExpertLogRecord::new(
            request.elevator_id,
            request.problem,
            request.cause,
            request.steps,
            request.expert_id,
            request.timestamp,
            RecordSource::Expert,
        );

        let vector = self
            .embedder
            .embed(&self.embedding_model, &record.document)
            .map_err(DomainError::embedding)?;
        let entry = IndexedLog {
            embedding: LogEmbedding::new(&self.embedding_model, vector),
            record,
        };

        self.index.insert(&entry).map_err(DomainError::store)?;

        info!(
            id = %entry.record.id,
            elevator_id = %entry.record.elevator_id,
            expert_id = %entry.record.expert_id,
            "stored expert log"
        );

        Ok(AddOutcome::Stored {
            id: entry.record.id,
        })
    }

    /// Exact-match lookup by author and optional elevator; chat artifacts never appear.
    pub fn get_by_expert(
        &self,
        expert_id: &str,
        elevator_id: Option<&str>,
    ) -> Result<Vec<ExpertLogRecord>, DomainError> {
        let filter = LogFilter::by_expert(expert_id)
            .with_elevator(elevator_id)
            .expert_only();

        let records = self.index.get(&filter).map_err(DomainError::search)?;
        debug!(
            expert_id,
            elevator_id = elevator_id.unwrap_or("None"),
            count = records.len(),
            "retrieved expert logs"
        );

        Ok(records)
    }

    /// Every record in the index, chat artifacts included.
    pub fn all(&self) -> Result<Vec<ExpertLogRecord>, DomainError> {
        self.index.get(&LogFilter::any()).map_err(DomainError::search)
    }

    pub fn count(&self) -> Result<usize, DomainError> {
        self.index.count().map_err(DomainError::search)
    }

    pub fn embedding_model(&self) -> &str {
        &self.embedding_model
    }

    fn validate(request: &StoreLogRequest) -> Result<(), DomainError> {
        let fields = [
            ("elevator_id", &request.elevator_id),
            ("problem", &request.problem),
            ("cause", &request.cause),
            ("steps", &request.steps),
            ("expert_id", &request.expert_id),
            ("timestamp", &request.timestamp),
        ];

        for (name, value) in fields {
            if value.trim().is_empty() {
                return Err(DomainError::validation(format!("{name} is required")));
            }
            if value.chars().count() > MAX_FIELD_CHARS {
                return Err(DomainError::validation(format!(
                    "{name} cannot exceed {MAX_FIELD_CHARS} characters"
                )));
            }
        }

        if !is_iso8601(request.timestamp.trim()) {
            return Err(DomainError::validation(format!(
                "timestamp `{}` is not an ISO-8601 date-time",
                request.timestamp
            )));
        }

        Ok(())
    }
}

fn is_iso8601(raw: &str) -> bool {
    DateTime::parse_from_rfc3339(raw).is_ok()
        || NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f").is_ok()
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::{
        application::dtos::DeflectionReason,
        domain::{IndexError, IndexHit},
        infrastructure::{InMemoryVectorIndex, SimpleEmbedEngine},
    };

    const MODEL: &str = "liftkb/simple-hash";

    fn store_with(index: Arc<dyn VectorIndex>) -> KnowledgeStore {
        KnowledgeStore::new(Arc::new(SimpleEmbedEngine::new(MODEL, 64)), index, MODEL)
    }

    fn request(expert: &str, elevator: &str) -> StoreLogRequest {
        StoreLogRequest {
            elevator_id: elevator.into(),
            problem: "door won't close".into(),
            cause: "sensor fault".into(),
            steps: "clean sensor; realign".into(),
            expert_id: expert.into(),
            timestamp: "2024-01-01T00:00:00Z".into(),
            source: None,
        }
    }

    struct RejectingIndex;

    impl VectorIndex for RejectingIndex {
        fn insert(&self, _entry: &IndexedLog) -> Result<(), IndexError> {
            Err(IndexError::Backend("collection is read-only".into()))
        }

        fn query(
            &self,
            _embedding: &LogEmbedding,
            _top_k: usize,
            _filter: &LogFilter,
        ) -> Result<Vec<IndexHit>, IndexError> {
            Ok(Vec::new())
        }

        fn get(&self, _filter: &LogFilter) -> Result<Vec<ExpertLogRecord>, IndexError> {
            Ok(Vec::new())
        }

        fn count(&self) -> Result<usize, IndexError> {
            Ok(0)
        }

        fn flush(&self) -> Result<(), IndexError> {
            Ok(())
        }
    }

    #[test]
    fn add_then_get_round_trips_fields() {
        let store = store_with(Arc::new(InMemoryVectorIndex::new()));
        let outcome = store.add(request("x1", "E1")).unwrap();
        let id = outcome.id().expect("stored");

        let logs = store.get_by_expert("x1", None).unwrap();
        assert_eq!(logs.len(), 1);
        let log = &logs[0];
        assert_eq!(log.id, id);
        assert_eq!(log.elevator_id, "E1");
        assert_eq!(log.problem, "door won't close");
        assert_eq!(log.cause, "sensor fault");
        assert_eq!(log.steps, "clean sensor; realign");
        assert_eq!(log.timestamp, "2024-01-01T00:00:00Z");
        assert_eq!(log.document, log.regenerate_document());
    }

    #[test]
    fn every_add_increments_count_by_one() {
        let store = store_with(Arc::new(InMemoryVectorIndex::new()));
        for n in 1..=3 {
            store.add(request("x1", "E1")).unwrap();
            assert_eq!(store.count().unwrap(), n);
        }
    }

    #[test]
    fn missing_field_is_a_validation_error() {
        let store = store_with(Arc::new(InMemoryVectorIndex::new()));
        let mut bad = request("x1", "E1");
        bad.cause = "   ".into();

        let err = store.add(bad).unwrap_err();
        assert!(matches!(err, DomainError::Validation(ref msg) if msg.contains("cause")));
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn malformed_timestamp_is_rejected() {
        let store = store_with(Arc::new(InMemoryVectorIndex::new()));
        let mut bad = request("x1", "E1");
        bad.timestamp = "yesterday".into();
        assert!(store.add(bad).unwrap_err().is_client_error());

        let mut naive = request("x1", "E1");
        naive.timestamp = "2024-05-02T10:11:12.345678".into();
        assert!(store.add(naive).is_ok());
    }

    #[test]
    fn index_rejection_surfaces_as_store_error_with_message() {
        let store = store_with(Arc::new(RejectingIndex));
        let err = store.add(request("x1", "E1")).unwrap_err();
        assert!(matches!(err, DomainError::Store(_)));
        assert!(err.to_string().contains("collection is read-only"));
    }

    #[test]
    fn conversational_payload_is_deflected_without_storing() {
        let store = store_with(Arc::new(InMemoryVectorIndex::new()));
        let payload = IngestPayload::classify(json!({
            "expert_id": "TECH-007",
            "user_query": "lift stuck",
            "ai_response": "check brake",
            "timestamp": "2024-01-01T00:00:00Z"
        }))
        .unwrap();

        let outcome = store.add(payload).unwrap();
        assert!(matches!(
            outcome,
            AddOutcome::Deflected {
                reason: DeflectionReason::ConversationalKey(_)
            }
        ));
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn typed_request_with_chat_source_is_not_stored() {
        let store = store_with(Arc::new(InMemoryVectorIndex::new()));
        let mut chat = request("x1", "E1");
        chat.source = Some("chat".into());

        let outcome = store.add(chat).unwrap();
        assert!(matches!(
            outcome,
            AddOutcome::Deflected {
                reason: DeflectionReason::NonExpertSource(ref source)
            } if source == "chat"
        ));
        assert_eq!(store.count().unwrap(), 0);

        let mut expert = request("x1", "E1");
        expert.source = Some("Expert".into());
        assert!(store.add(expert).unwrap().id().is_some());
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn get_by_expert_filters_and_hides_chat_artifacts() {
        let index = Arc::new(InMemoryVectorIndex::new());
        let store = store_with(index.clone());
        store.add(request("x1", "E1")).unwrap();
        store.add(request("x1", "E2")).unwrap();
        store.add(request("x2", "E1")).unwrap();

        let artifact = ExpertLogRecord::new(
            "E1",
            "lift stuck",
            "n/a",
            "n/a",
            "x1",
            "2024-01-01T00:00:00Z",
            RecordSource::Chat,
        );
        index
            .insert(&IndexedLog {
                embedding: LogEmbedding::new(MODEL, vec![1.0; 64]),
                record: artifact,
            })
            .unwrap();

        let logs = store.get_by_expert("x1", Some("E1")).unwrap();
        assert_eq!(logs.len(), 1);
        assert!(logs
            .iter()
            .all(|l| l.expert_id == "x1" && l.elevator_id == "E1" && l.source.is_expert()));

        assert_eq!(store.get_by_expert("x1", None).unwrap().len(), 2);
        assert!(store.get_by_expert("nobody", None).unwrap().is_empty());
        assert_eq!(store.all().unwrap().len(), 4);
    }

    #[test]
    fn concurrent_adds_do_not_conflict() {
        let store = Arc::new(store_with(Arc::new(InMemoryVectorIndex::new())));
        let handles: Vec<_> = (0..8)
            .map(|n| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    std::thread::sleep(Duration::from_millis(1));
                    store.add(request(&format!("x{n}"), "E1")).unwrap()
                })
            })
            .collect();

        for handle in handles {
            assert!(handle.join().unwrap().id().is_some());
        }
        assert_eq!(store.count().unwrap(), 8);
    }
}
