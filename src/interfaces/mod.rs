//! Interfaces exposing the knowledge base to external clients.

pub mod http;
