//! Context assembly — turns a history window and a new message into one prompt.
//!
//! The prompt has three fixed regions:
//!
//! 1. **System** instruction
//! 2. **Previous conversation** rendered as `role: content` lines, oldest first
//! 3. **Current turn**: the new user message followed by an open `assistant:`
//!
//! Assembly is deterministic and performs no truncation; the caller decides how
//! many turns to pass in.

use relaymind_config::DEFAULT_SYSTEM_PROMPT;
use relaymind_core::message::{Role, Turn};

const HISTORY_HEADER: &str = "Previous conversation:";

/// Builds single-string prompts for a completion-style endpoint.
#[derive(Debug, Clone)]
pub struct ContextAssembler {
    system_prompt: String,
}

impl Default for ContextAssembler {
    fn default() -> Self {
        Self::new(DEFAULT_SYSTEM_PROMPT)
    }
}

impl ContextAssembler {
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
        }
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    /// Assemble from turns already in chronological (oldest-first) order.
    pub fn assemble(&self, history: &[Turn], user_message: &str) -> String {
        let mut prompt = String::with_capacity(
            self.system_prompt.len()
                + user_message.len()
                + history.iter().map(|t| t.content.len() + 12).sum::<usize>()
                + 64,
        );

        prompt.push_str(self.system_prompt.trim_end());
        prompt.push_str("\n\n");
        prompt.push_str(HISTORY_HEADER);
        prompt.push('\n');
        for turn in history {
            prompt.push_str(&turn.render());
            prompt.push('\n');
        }
        prompt.push('\n');

        prompt.push_str(Role::User.as_str());
        prompt.push_str(": ");
        prompt.push_str(user_message);
        prompt.push('\n');
        prompt.push_str(Role::Assistant.as_str());
        prompt.push(':');
        prompt
    }

    /// Assemble from a store read, which arrives newest first.
    pub fn assemble_from_recent(&self, mut recent: Vec<Turn>, user_message: &str) -> String {
        recent.reverse();
        self.assemble(&recent, user_message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relaymind_core::message::UserId;

    fn turn(role: Role, content: &str) -> Turn {
        Turn::new(UserId(1), role, content)
    }

    #[test]
    fn first_message_has_empty_history_region() {
        let prompt = ContextAssembler::default().assemble(&[], "Hello");
        assert_eq!(
            prompt,
            format!("{DEFAULT_SYSTEM_PROMPT}\n\nPrevious conversation:\n\nuser: Hello\nassistant:")
        );
    }

    #[test]
    fn history_rendered_in_order() {
        let history = vec![
            turn(Role::User, "My name is Ada."),
            turn(Role::Assistant, "Nice to meet you, Ada!"),
        ];
        let prompt = ContextAssembler::new("Be brief.").assemble(&history, "What's my name?");
        assert_eq!(
            prompt,
            "Be brief.\n\n\
             Previous conversation:\n\
             user: My name is Ada.\n\
             assistant: Nice to meet you, Ada!\n\
             \n\
             user: What's my name?\n\
             assistant:"
        );
    }

    #[test]
    fn recent_window_is_reversed_before_rendering() {
        // Store order: newest first
        let recent = vec![turn(Role::Assistant, "second"), turn(Role::User, "first")];
        let prompt = ContextAssembler::new("S").assemble_from_recent(recent, "third");
        let first = prompt.find("user: first").unwrap();
        let second = prompt.find("assistant: second").unwrap();
        let third = prompt.find("user: third").unwrap();
        assert!(first < second && second < third);
    }

    #[test]
    fn prompt_ends_with_open_assistant_turn() {
        let prompt = ContextAssembler::default().assemble(&[], "anything");
        assert!(prompt.ends_with("user: anything\nassistant:"));
    }

    #[test]
    fn trailing_whitespace_in_system_prompt_is_dropped() {
        let prompt = ContextAssembler::new("System.\n\n\n").assemble(&[], "hi");
        assert!(prompt.starts_with("System.\n\nPrevious conversation:"));
    }
}
