//! Chat channel implementations for RelayMind.
//!
//! Each channel connects to a chat platform and relays messages to/from
//! the relay. Channels are trait-based and platform-agnostic.
//!
//! Available channels:
//! - **CLI** — Interactive terminal chat (stdin/stdout)
//! - **Telegram** — Telegram Bot API via long polling

pub mod cli;
pub mod telegram;

pub use cli::{CliChannel, LOCAL_USER_ID};
pub use telegram::{TelegramChannel, TelegramConfig};
