//! Infrastructure layer wiring concrete adapters (embeddings, index, completion client).

pub mod embeddings;
pub mod http_client;
pub mod storage;

#[cfg(feature = "fastembed-engine")]
pub use embeddings::FastEmbedEngine;
pub use embeddings::SimpleEmbedEngine;
pub use http_client::OllamaChatClient;
pub use storage::{InMemoryVectorIndex, SledVectorIndex};
