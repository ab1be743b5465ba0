use std::{fmt::Write as _, sync::Arc, time::Duration};

use tracing::{debug, error};

use crate::{
    application::dtos::{ChatContext, ChatReply, ResultView},
    domain::{ChatMessage, ChatRole, CompletionError, DomainError},
};

use super::CompletionBackend;

pub const DEFAULT_CHAT_TIMEOUT: Duration = Duration::from_secs(60);

pub const SYSTEM_INSTRUCTION: &str = "\
You are an expert elevator maintenance assistant helping field technicians.
Answer primarily from the expert knowledge supplied in the context.
When the context contains fixing steps, expand them into a numbered, itemized list.
When no context is supplied, say so plainly and do not invent unrelated remedies.
Always answer with exactly these sections:
Diagnosis: <most likely fault and why>
Fixing Steps: <numbered steps>
Safety Note: <lockout, isolation and PPE precautions relevant to the job>";

const NO_CONTEXT_NOTE: &str =
    "No expert knowledge was retrieved for this conversation. Keep the diagnosis general.";

/// Frames a technician conversation with the system instruction and retrieved knowledge.
pub struct ChatOrchestrator {
    backend: Arc<dyn CompletionBackend>,
    timeout: Duration,
}

impl ChatOrchestrator {
    pub fn new(backend: Arc<dyn CompletionBackend>, timeout: Duration) -> Self {
        Self {
            backend,
            timeout: timeout.max(Duration::from_millis(1)),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn respond(
        &self,
        conversation: &[ChatMessage],
        context: Option<&ChatContext>,
    ) -> Result<ChatReply, DomainError> {
        if conversation.is_empty() {
            return Err(DomainError::validation("messages cannot be empty"));
        }
        if conversation.iter().all(|m| m.content.trim().is_empty()) {
            return Err(DomainError::validation("messages cannot all be blank"));
        }

        let framed = frame(conversation, context);
        debug!(
            backend = self.backend.name(),
            turns = framed.len(),
            "sending chat to completion service"
        );

        let reply = self
            .backend
            .complete(&framed, self.timeout)
            .map_err(|err| {
                error!(backend = self.backend.name(), error = %err, "chat failed");
                DomainError::upstream(err)
            })?;

        if reply.trim().is_empty() {
            return Err(DomainError::upstream(CompletionError::InvalidResponse(
                "empty reply".into(),
            )));
        }

        Ok(ChatReply { response: reply })
    }
}

/// The latest user turn, used to ground a conversation with a retrieval.
pub fn latest_user_turn(conversation: &[ChatMessage]) -> Option<&str> {
    conversation
        .iter()
        .rev()
        .find(|m| m.role == ChatRole::User && !m.content.trim().is_empty())
        .map(|m| m.content.as_str())
}

fn frame(conversation: &[ChatMessage], context: Option<&ChatContext>) -> Vec<ChatMessage> {
    let mut framed = Vec::with_capacity(conversation.len() + 2);
    framed.push(ChatMessage::system(SYSTEM_INSTRUCTION));

    let context_message = match context.filter(|c| !c.is_empty()) {
        Some(ChatContext::Text(text)) => {
            format!("Expert knowledge context:\n{}", text.trim())
        }
        Some(ChatContext::Matches(matches)) => render_matches(matches),
        None => NO_CONTEXT_NOTE.to_string(),
    };
    framed.push(ChatMessage::system(context_message));

    framed.extend(conversation.iter().cloned());
    framed
}

fn render_matches(matches: &[ResultView]) -> String {
    let mut out = String::from("Expert knowledge context:");
    for (i, m) in matches.iter().enumerate() {
        let _ = write!(
            out,
            "\n\n--- Match {} (Elevator: {}, Distance: {}) ---\nProblem: {}\nCause: {}\nSteps: {}",
            i + 1,
            m.elevator_id,
            m.distance,
            m.problem,
            m.cause,
            m.steps
        );
    }
    out
}
