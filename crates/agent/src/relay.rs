//! The per-message relay pipeline.
//!
//! For each plain text message:
//!
//! 1. **Load** the user's most recent turns from the history store
//! 2. **Assemble** them oldest-first into a single prompt
//! 3. **Generate** one completion; any failure becomes the fallback reply
//! 4. **Persist** the user turn and the reply that will actually be sent
//! 5. **Return** the reply text to the channel
//!
//! Storage failures never reach the model: the user gets the apology reply.

use crate::assembler::ContextAssembler;
use crate::command::Inbound;
use relaymind_config::{AppConfig, DEFAULT_FALLBACK_REPLY};
use relaymind_core::error::HistoryError;
use relaymind_core::history::{DEFAULT_HISTORY_LIMIT, HistoryStore};
use relaymind_core::inference::{GenerationParams, InferenceBackend, InferenceRequest};
use relaymind_core::message::{Role, UserId};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, trace, warn};

pub const START_GREETING: &str = "🤖 Hello! I'm your AI assistant. Send me a message and I'll remember our conversation. Use /clear to forget it.";
pub const CLEAR_ACK: &str = "🗑️ Chat history cleared!";
pub const STORAGE_APOLOGY: &str =
    "Sorry, I couldn't access our conversation history. Please try again.";
pub const UNKNOWN_COMMAND_HINT: &str = "Unknown command. Try /start or /clear.";

/// How a text message was answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The model's reply was sent and stored.
    Generated,
    /// Inference failed; the fallback was sent and stored.
    Fallback,
    /// The history store failed; the apology was sent.
    StorageFailed,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Generated => "generated",
            Outcome::Fallback => "fallback",
            Outcome::StorageFailed => "storage_failed",
        }
    }
}

/// A reply together with how it was produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exchange {
    pub reply: String,
    pub outcome: Outcome,
}

/// Connects one history store to one inference backend.
pub struct Relay {
    history: Arc<dyn HistoryStore>,
    backend: Arc<dyn InferenceBackend>,
    assembler: ContextAssembler,
    model: String,
    params: GenerationParams,
    history_limit: usize,
    fallback_reply: String,
}

impl Relay {
    pub fn new(
        history: Arc<dyn HistoryStore>,
        backend: Arc<dyn InferenceBackend>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            history,
            backend,
            assembler: ContextAssembler::default(),
            model: model.into(),
            params: GenerationParams::default(),
            history_limit: DEFAULT_HISTORY_LIMIT,
            fallback_reply: DEFAULT_FALLBACK_REPLY.into(),
        }
    }

    /// Build a relay with every setting taken from the loaded config.
    pub fn from_config(
        config: &AppConfig,
        history: Arc<dyn HistoryStore>,
        backend: Arc<dyn InferenceBackend>,
    ) -> Self {
        Self::new(history, backend, config.inference.model.clone())
            .with_assembler(ContextAssembler::new(config.assistant.system_prompt.clone()))
            .with_params(config.inference.generation_params())
            .with_history_limit(config.history_limit)
            .with_fallback_reply(config.assistant.fallback_reply.clone())
    }

    pub fn with_assembler(mut self, assembler: ContextAssembler) -> Self {
        self.assembler = assembler;
        self
    }

    pub fn with_params(mut self, params: GenerationParams) -> Self {
        self.params = params;
        self
    }

    /// Number of prior turns fed back to the model.
    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    pub fn with_fallback_reply(mut self, reply: impl Into<String>) -> Self {
        self.fallback_reply = reply.into();
        self
    }

    pub fn history(&self) -> &Arc<dyn HistoryStore> {
        &self.history
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Route any inbound text: commands get their fixed replies, everything
    /// else goes through the conversation pipeline.
    pub async fn dispatch(&self, user_id: UserId, text: &str) -> String {
        match Inbound::parse(text) {
            Inbound::Start => self.on_start_command().to_string(),
            Inbound::Clear => self.on_clear_command(user_id).await,
            Inbound::Unknown(command) => {
                debug!(user_id = %user_id, command, "Unknown command");
                UNKNOWN_COMMAND_HINT.to_string()
            }
            Inbound::Text(text) => self.on_text_message(user_id, text).await,
        }
    }

    pub fn on_start_command(&self) -> &'static str {
        START_GREETING
    }

    /// Answer one plain text message.
    pub async fn on_text_message(&self, user_id: UserId, text: &str) -> String {
        self.handle_text(user_id, text).await.reply
    }

    /// Same as `on_text_message`, also reporting which path produced the reply.
    pub async fn handle_text(&self, user_id: UserId, text: &str) -> Exchange {
        let started = Instant::now();

        let recent = match self.history.recent(user_id, self.history_limit).await {
            Ok(turns) => turns,
            Err(e) => {
                error!(user_id = %user_id, "History load failed: {e}");
                return self.finish(
                    user_id,
                    started,
                    0,
                    STORAGE_APOLOGY.into(),
                    Outcome::StorageFailed,
                );
            }
        };
        let turns = recent.len();

        let prompt = self.assembler.assemble_from_recent(recent, text);
        trace!(user_id = %user_id, %prompt, "Assembled prompt");

        let request = InferenceRequest {
            model: self.model.clone(),
            prompt,
            params: self.params.clone(),
        };

        let (reply, outcome) = match self.backend.generate(request).await {
            Ok(generated) => (generated, Outcome::Generated),
            Err(e) => {
                warn!(
                    user_id = %user_id,
                    backend = %self.backend.name(),
                    "Inference failed, sending fallback: {e}"
                );
                (self.fallback_reply.clone(), Outcome::Fallback)
            }
        };

        if let Err(e) = self.persist_exchange(user_id, text, &reply).await {
            error!(user_id = %user_id, "Persisting exchange failed: {e}");
            return self.finish(
                user_id,
                started,
                turns,
                STORAGE_APOLOGY.into(),
                Outcome::StorageFailed,
            );
        }

        self.finish(user_id, started, turns, reply, outcome)
    }

    /// Forget everything stored for one user.
    pub async fn on_clear_command(&self, user_id: UserId) -> String {
        match self.history.clear(user_id).await {
            Ok(()) => {
                info!(user_id = %user_id, "History cleared");
                CLEAR_ACK.to_string()
            }
            Err(e) => {
                error!(user_id = %user_id, "History clear failed: {e}");
                STORAGE_APOLOGY.to_string()
            }
        }
    }

    async fn persist_exchange(
        &self,
        user_id: UserId,
        text: &str,
        reply: &str,
    ) -> Result<(), HistoryError> {
        self.history.append(user_id, Role::User, text).await?;
        self.history.append(user_id, Role::Assistant, reply).await?;
        Ok(())
    }

    fn finish(
        &self,
        user_id: UserId,
        started: Instant,
        turns: usize,
        reply: String,
        outcome: Outcome,
    ) -> Exchange {
        info!(
            user_id = %user_id,
            turns,
            outcome = outcome.as_str(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Message handled"
        );
        Exchange { reply, outcome }
    }
}
