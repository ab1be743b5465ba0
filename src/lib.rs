use std::{
    net::SocketAddr,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{anyhow, Context, Result};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod interfaces;
pub mod settings;

use application::services::{
    latest_user_turn, ChatOrchestrator, CompletionBackend, EmbeddingEngine, KnowledgeStore,
    QueryNormalizer, RetrievalService, VectorIndex,
};
use application::{
    AddOutcome, ChatContext, ChatReply, ChatRequest, HealthStatusResponse, IngestPayload,
    SearchRequest,
};
use domain::{DomainError, ExpertLogRecord, LogFilter};
#[cfg(feature = "fastembed-engine")]
use infrastructure::FastEmbedEngine;
use infrastructure::{InMemoryVectorIndex, OllamaChatClient, SimpleEmbedEngine, SledVectorIndex};
use interfaces::http::{self, AppState};
use settings::{AppConfig, EmbeddingBackend};

/// Per-entry tally of a bulk load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub stored: usize,
    pub deflected: usize,
    pub failed: usize,
}

/// The knowledge base: index, store, retrieval and chat behind one handle.
///
/// Open it once with [`KnowledgeBase::open`], share it behind an `Arc`, and
/// call [`KnowledgeBase::shutdown`] before the process exits.
pub struct KnowledgeBase {
    index: Arc<dyn VectorIndex>,
    store: KnowledgeStore,
    retrieval: RetrievalService,
    chat: ChatOrchestrator,
    persistent: bool,
    data_dir: Option<PathBuf>,
}

impl KnowledgeBase {
    /// Opens (or creates) the durable index under `<data_dir>/store`.
    ///
    /// When the durable index cannot be opened the knowledge base falls back
    /// to an in-memory index; the fallback is logged because everything
    /// stored afterwards is lost on restart.
    pub fn open(data_dir: impl AsRef<Path>, config: &AppConfig) -> Result<Self> {
        let store_path = data_dir.as_ref().join("store");

        let (index, persistent): (Arc<dyn VectorIndex>, bool) =
            match SledVectorIndex::open(&store_path) {
                Ok(index) => (Arc::new(index), true),
                Err(err) => {
                    warn!(
                        path = %store_path.display(),
                        error = %err,
                        "durable index unavailable; falling back to in-memory index, data will not survive a restart"
                    );
                    (Arc::new(InMemoryVectorIndex::new()), false)
                }
            };

        let (embedder, model) =
            init_embedder(&config.embedding).context("failed to initialise embedding backend")?;
        let completion: Arc<dyn CompletionBackend> = Arc::new(OllamaChatClient::new(
            config.chat.endpoint.clone(),
            config.chat.model.clone(),
        ));

        let mut kb = Self::from_parts(embedder, model, index, completion, config);
        kb.persistent = persistent;
        kb.data_dir = Some(data_dir.as_ref().to_path_buf());

        let documents = kb.store.count().map_err(|err| anyhow!(err))?;
        info!(
            path = %store_path.display(),
            persistent,
            documents,
            "knowledge base initialised"
        );

        Ok(kb)
    }

    /// Wires a knowledge base from explicit adapters. The result reports itself as non-persistent.
    pub fn from_parts(
        embedder: Arc<dyn EmbeddingEngine>,
        embedding_model: impl Into<String>,
        index: Arc<dyn VectorIndex>,
        completion: Arc<dyn CompletionBackend>,
        config: &AppConfig,
    ) -> Self {
        let embedding_model = embedding_model.into();
        let store = KnowledgeStore::new(Arc::clone(&embedder), Arc::clone(&index), &embedding_model);
        let retrieval = RetrievalService::new(
            QueryNormalizer::default(),
            embedder,
            Arc::clone(&index),
            embedding_model,
        )
        .with_default_top_k(config.retrieval.default_top_k);
        let chat = ChatOrchestrator::new(completion, config.chat.timeout());

        Self {
            index,
            store,
            retrieval,
            chat,
            persistent: false,
            data_dir: None,
        }
    }

    pub fn store(&self) -> &KnowledgeStore {
        &self.store
    }

    pub fn retrieval(&self) -> &RetrievalService {
        &self.retrieval
    }

    pub fn chat(&self) -> &ChatOrchestrator {
        &self.chat
    }

    pub fn is_persistent(&self) -> bool {
        self.persistent
    }

    pub fn data_dir(&self) -> Option<&Path> {
        self.data_dir.as_deref()
    }

    /// Runs a chat turn, retrieving context from the latest user message when asked to.
    pub fn converse(&self, request: ChatRequest) -> Result<ChatReply, DomainError> {
        let context = match request.context {
            Some(context) => Some(context),
            None if request.ground => match latest_user_turn(&request.messages) {
                Some(turn) => {
                    let search = SearchRequest {
                        query: turn.to_string(),
                        elevator_id: request.elevator_id.clone(),
                        top_k: None,
                    };
                    Some(ChatContext::Matches(self.retrieval.search(search)?.results))
                }
                None => None,
            },
            None => None,
        };

        self.chat.respond(&request.messages, context.as_ref())
    }

    /// Stores each entry through the normal ingestion path.
    ///
    /// Object entries missing `expert_id` or `timestamp` get `default_expert`
    /// and `now`. A failing entry is counted and does not stop the load.
    pub fn seed(
        &self,
        entries: impl IntoIterator<Item = Value>,
        default_expert: &str,
        now: &str,
    ) -> SeedReport {
        let mut report = SeedReport::default();
        for (position, mut entry) in entries.into_iter().enumerate() {
            if let Some(object) = entry.as_object_mut() {
                object
                    .entry("expert_id")
                    .or_insert_with(|| Value::String(default_expert.to_string()));
                object
                    .entry("timestamp")
                    .or_insert_with(|| Value::String(now.to_string()));
            }

            match IngestPayload::classify(entry).and_then(|payload| self.store.add(payload)) {
                Ok(AddOutcome::Stored { id }) => {
                    report.stored += 1;
                    debug!(position, %id, "seeded");
                }
                Ok(AddOutcome::Deflected { reason }) => {
                    report.deflected += 1;
                    info!(position, %reason, "seed entry skipped");
                }
                Err(err) => {
                    report.failed += 1;
                    warn!(position, error = %err, "seed entry rejected");
                }
            }
        }
        report
    }

    /// Every stored record, narrowed by the optional expert and elevator.
    pub fn dump(
        &self,
        expert_id: Option<&str>,
        elevator_id: Option<&str>,
    ) -> Result<Vec<ExpertLogRecord>, DomainError> {
        let filter = match expert_id.filter(|e| !e.trim().is_empty()) {
            Some(expert) => LogFilter::by_expert(expert),
            None => LogFilter::any(),
        }
        .with_elevator(elevator_id);

        Ok(self
            .store
            .all()?
            .into_iter()
            .filter(|record| filter.matches(record))
            .collect())
    }

    pub fn health(&self) -> Result<HealthStatusResponse, DomainError> {
        Ok(HealthStatusResponse {
            status: "healthy".into(),
            documents: self.store.count()?,
            persistent: self.persistent,
            embedding_model: self.store.embedding_model().to_string(),
        })
    }

    /// Flushes the index to disk.
    pub fn shutdown(&self) -> Result<(), DomainError> {
        self.index.flush().map_err(DomainError::store)?;
        info!("knowledge base flushed");
        Ok(())
    }
}

fn init_embedder(backend: &EmbeddingBackend) -> Result<(Arc<dyn EmbeddingEngine>, String)> {
    match backend {
        EmbeddingBackend::Simple { model, dimensions } => {
            let engine = SimpleEmbedEngine::try_new(model.clone(), *dimensions)?;
            Ok((Arc::new(engine), model.clone()))
        }
        #[cfg(feature = "fastembed-engine")]
        EmbeddingBackend::FastEmbed { model } => {
            let engine = FastEmbedEngine::try_new(model)?;
            Ok((Arc::new(engine), model.clone()))
        }
    }
}

/// Opens the knowledge base and serves HTTP until Ctrl+C.
pub async fn run_service(data_dir: PathBuf, config: AppConfig) -> Result<()> {
    info!("Starting liftkb service v{}", env!("CARGO_PKG_VERSION"));

    let open_config = config.clone();
    let kb = tokio::task::spawn_blocking(move || KnowledgeBase::open(data_dir, &open_config))
        .await
        .context("failed to spawn initialization task")??;
    let kb = Arc::new(kb);

    let addr: SocketAddr = config
        .service
        .bind_addr()
        .parse()
        .with_context(|| format!("invalid bind address {}", config.service.bind_addr()))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    info!(%addr, "liftkb listening");

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown requested");
        }
        signal.cancel();
    });

    http::serve(listener, AppState::new(Arc::clone(&kb)), shutdown)
        .await
        .context("HTTP server failed")?;

    kb.shutdown().map_err(|err| anyhow!(err))?;
    Ok(())
}

/// Installs the stderr subscriber once; filter from `LIFTKB_LOG` (default `info`).
pub fn init_tracing() {
    static INIT: std::sync::OnceLock<()> = std::sync::OnceLock::new();

    let _ = INIT.get_or_init(|| {
        let filter = std::env::var("LIFTKB_LOG").unwrap_or_else(|_| "info".into());
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .compact()
            .try_init();
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unusable_data_dir_falls_back_to_memory() {
        let dir = tempfile::tempdir().unwrap();
        // a regular file where the store directory should go
        std::fs::write(dir.path().join("store"), b"not a directory").unwrap();

        let kb = KnowledgeBase::open(dir.path(), &AppConfig::default()).unwrap();
        assert!(!kb.is_persistent());
        assert_eq!(kb.health().unwrap().documents, 0);
    }

    #[test]
    fn open_creates_a_durable_store() {
        let dir = tempfile::tempdir().unwrap();
        let kb = KnowledgeBase::open(dir.path(), &AppConfig::default()).unwrap();
        assert!(kb.is_persistent());
        assert_eq!(kb.data_dir(), Some(dir.path()));
        kb.shutdown().unwrap();
    }

    const NOW: &str = "2025-03-01T08:00:00+00:00";

    fn seeded(dir: &Path) -> (KnowledgeBase, SeedReport) {
        let kb = KnowledgeBase::open(dir, &AppConfig::default()).unwrap();
        let entries = vec![
            serde_json::json!({
                "elevator_id": "E1",
                "problem": "door won't close",
                "cause": "sensor fault",
                "steps": "clean sensor"
            }),
            serde_json::json!({
                "elevator_id": "E2",
                "problem": "car vibration",
                "cause": "worn rollers",
                "steps": "replace rollers",
                "expert_id": "x9",
                "timestamp": "2024-01-01T00:00:00Z"
            }),
            serde_json::json!({"user_query": "lift stuck", "ai_response": "check brake"}),
            serde_json::json!({"elevator_id": "E3", "problem": "no cause given"}),
            serde_json::json!("not an object"),
        ];
        let report = kb.seed(entries, "expert_seed", NOW);
        (kb, report)
    }

    #[test]
    fn seed_fills_defaults_and_tallies_each_entry() {
        let dir = tempfile::tempdir().unwrap();
        let (kb, report) = seeded(dir.path());

        assert_eq!(
            report,
            SeedReport {
                stored: 2,
                deflected: 1,
                failed: 2
            }
        );
        assert_eq!(kb.store().count().unwrap(), 2);

        let defaulted = kb.store().get_by_expert("expert_seed", None).unwrap();
        assert_eq!(defaulted.len(), 1);
        assert_eq!(defaulted[0].elevator_id, "E1");
        assert_eq!(defaulted[0].timestamp, NOW);

        let explicit = kb.store().get_by_expert("x9", None).unwrap();
        assert_eq!(explicit[0].timestamp, "2024-01-01T00:00:00Z");
    }

    #[test]
    fn dump_narrows_by_expert_and_elevator() {
        let dir = tempfile::tempdir().unwrap();
        let (kb, _) = seeded(dir.path());

        assert_eq!(kb.dump(None, None).unwrap().len(), 2);
        assert_eq!(kb.dump(Some("x9"), None).unwrap().len(), 1);
        assert_eq!(kb.dump(None, Some("E1")).unwrap()[0].expert_id, "expert_seed");
        assert!(kb.dump(Some("x9"), Some("E1")).unwrap().is_empty());
        assert_eq!(kb.dump(Some(" "), Some("")).unwrap().len(), 2);
    }

    #[test]
    fn dump_of_an_empty_store_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let kb = KnowledgeBase::open(dir.path(), &AppConfig::default()).unwrap();
        assert!(kb.dump(None, None).unwrap().is_empty());
    }
}
