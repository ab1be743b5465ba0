//! Blocking HTTP client for the external chat completion service.

mod ollama_chat;

pub use ollama_chat::OllamaChatClient;

/// Default Ollama chat endpoint.
pub const DEFAULT_CHAT_ENDPOINT: &str = "http://127.0.0.1:11434/api/chat";

/// Default chat model.
pub const DEFAULT_CHAT_MODEL: &str = "phi3";
