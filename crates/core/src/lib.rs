//! # RelayMind Core
//!
//! Domain types, traits, and error definitions for the RelayMind
//! conversational relay. This crate has **no I/O dependencies**: it defines the
//! model that the storage, inference, and channel crates implement against.
//!
//! ## Seams
//!
//! - [`HistoryStore`] — per-user append-only turn log
//! - [`InferenceBackend`] — one stateless text-generation call
//! - [`Channel`] — chat platform adapter

pub mod error;
pub mod message;
pub mod history;
pub mod inference;
pub mod channel;

// Re-export key types at crate root for ergonomics
pub use error::{Error, Result};
pub use message::{Role, Turn, UserId};
pub use history::{HistoryStore, DEFAULT_HISTORY_LIMIT};
pub use inference::{GenerationParams, InferenceBackend, InferenceRequest};
pub use channel::{Channel, ChannelId, ChannelMessage};
