//! Application layer wiring DTOs and services for the knowledge base.

pub mod dtos;
pub mod services;

pub use dtos::{
    AddOutcome, ChatContext, ChatReply, ChatRequest, DeflectionReason, HealthStatusResponse,
    IngestPayload, LogListResponse, ResultView, SearchRequest, SearchResponse, StoreLogRequest,
    StoreLogResponse,
};
pub use services::{ChatOrchestrator, KnowledgeStore, QueryNormalizer, RetrievalService};
