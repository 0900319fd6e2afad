//! CLI channel — interactive terminal chat.
//!
//! Reads lines from stdin and prints replies to stdout. Every line is sent as
//! one fixed local user, so the terminal shares history like any other user.
//! Used for `relaymind chat`.

use async_trait::async_trait;
use relaymind_core::channel::{Channel, ChannelId, ChannelMessage};
use relaymind_core::error::ChannelError;
use relaymind_core::message::UserId;
use tokio::io::{self, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

/// History partition used for terminal chats unless overridden.
pub const LOCAL_USER_ID: UserId = UserId(0);

const CHAT_ID: &str = "cli_session";

/// Interactive CLI channel for terminal-based chat.
pub struct CliChannel {
    id: ChannelId,
    user_id: UserId,
}

impl CliChannel {
    pub fn new(user_id: UserId) -> Self {
        Self {
            id: ChannelId("cli".into()),
            user_id,
        }
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }
}

impl Default for CliChannel {
    fn default() -> Self {
        Self::new(LOCAL_USER_ID)
    }
}

fn is_exit(line: &str) -> bool {
    matches!(line, "exit" | "quit" | "/exit" | "/quit" | ":q")
}

#[async_trait]
impl Channel for CliChannel {
    fn name(&self) -> &str {
        "cli"
    }

    fn id(&self) -> &ChannelId {
        &self.id
    }

    async fn start(
        &self,
    ) -> Result<mpsc::Receiver<Result<ChannelMessage, ChannelError>>, ChannelError> {
        let (tx, rx) = mpsc::channel(32);
        let channel_id = self.id.clone();
        let user_id = self.user_id;

        tokio::spawn(async move {
            let stdin = io::stdin();
            let reader = BufReader::new(stdin);
            let mut lines = reader.lines();

            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let line = line.trim().to_string();
                        if line.is_empty() {
                            continue;
                        }

                        if is_exit(&line) {
                            break;
                        }

                        let msg = ChannelMessage {
                            channel_id: channel_id.clone(),
                            sender_id: user_id,
                            sender_name: Some("you".into()),
                            content: line,
                            chat_id: CHAT_ID.into(),
                            message_id: None,
                        };

                        if tx.send(Ok(msg)).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => break, // EOF (Ctrl+D)
                    Err(e) => {
                        let _ = tx.send(Err(ChannelError::ConnectionLost(e.to_string()))).await;
                        break;
                    }
                }
            }
        });

        Ok(rx)
    }

    async fn send(
        &self,
        _chat_id: &str,
        content: &str,
        _reply_to: Option<&str>,
    ) -> Result<(), ChannelError> {
        println!("{content}\n");
        Ok(())
    }

    fn is_allowed(&self, _sender_id: UserId) -> bool {
        true // local terminal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_channel_properties() {
        let ch = CliChannel::default();
        assert_eq!(ch.name(), "cli");
        assert_eq!(ch.id().0, "cli");
        assert_eq!(ch.user_id(), LOCAL_USER_ID);
        assert!(ch.is_allowed(UserId(12345)));
    }

    #[test]
    fn custom_user_id() {
        assert_eq!(CliChannel::new(UserId(77)).user_id(), UserId(77));
    }

    #[test]
    fn exit_words() {
        for word in ["exit", "quit", "/exit", "/quit", ":q"] {
            assert!(is_exit(word));
        }
        assert!(!is_exit("/clear"));
        assert!(!is_exit("exit now"));
    }
}
