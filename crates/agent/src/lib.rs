//! The conversation relay — the heart of RelayMind.
//!
//! Each inbound text message goes through **Load → Assemble → Generate →
//! Persist**:
//!
//! 1. **Load** the sender's recent turns from the history store
//! 2. **Assemble** system prompt, prior turns and the new message into one prompt
//! 3. **Generate** a reply with the configured inference backend
//! 4. **Persist** both turns and hand the reply back to the channel
//!
//! Commands (`/start`, `/clear`) are answered without touching the model.

pub mod assembler;
pub mod command;
pub mod relay;

pub use assembler::ContextAssembler;
pub use command::Inbound;
pub use relay::{
    CLEAR_ACK, Exchange, Outcome, Relay, START_GREETING, STORAGE_APOLOGY, UNKNOWN_COMMAND_HINT,
};
