//! Telegram channel adapter.
//!
//! Built on `teloxide`: long polling through its `Polling` update listener,
//! `send_message` for replies, `send_chat_action(Typing)` while the relay
//! works and `get_me` for health checks.

use async_trait::async_trait;
use futures::StreamExt;
use relaymind_config::TelegramSettings;
use relaymind_core::channel::{Channel, ChannelId, ChannelMessage};
use relaymind_core::error::ChannelError;
use relaymind_core::message::UserId;
use std::time::Duration;
use teloxide::payloads::SendMessageSetters;
use teloxide::requests::Requester;
use teloxide::types::{
    AllowedUpdate, ChatAction, ChatId, MessageId, Recipient, ReplyParameters, Update, UpdateKind,
};
use teloxide::update_listeners::{AsUpdateStream, Polling, UpdateListener};
use teloxide::{ApiError, Bot, RequestError};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

pub const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// Longest text Telegram accepts in one message.
pub const MAX_MESSAGE_CHARS: usize = 4096;

/// Telegram channel configuration.
#[derive(Clone)]
pub struct TelegramConfig {
    /// Bot token from @BotFather.
    pub bot_token: String,
    /// Allowed numeric user IDs. Empty or ["*"] = allow all.
    pub allowed_users: Vec<String>,
    /// Long-poll timeout passed to `getUpdates`.
    pub poll_timeout_secs: u64,
    /// Bot API root, overridable for local testing.
    pub api_base: String,
}

impl From<&TelegramSettings> for TelegramConfig {
    fn from(settings: &TelegramSettings) -> Self {
        Self {
            bot_token: settings.bot_token.clone(),
            allowed_users: settings.allowed_users.clone(),
            poll_timeout_secs: settings.poll_timeout_secs,
            api_base: TELEGRAM_API_BASE.into(),
        }
    }
}

impl std::fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("bot_token", &"[REDACTED]")
            .field("allowed_users", &self.allowed_users)
            .field("poll_timeout_secs", &self.poll_timeout_secs)
            .field("api_base", &self.api_base)
            .finish()
    }
}

/// Convert one update into a channel message. Updates without a text message
/// or without a human sender are skipped.
pub fn parse_update(channel_id: &ChannelId, update: &Update) -> Option<ChannelMessage> {
    let UpdateKind::Message(message) = &update.kind else {
        return None;
    };
    let text = message.text()?;
    let from = update.from()?;
    if from.is_bot {
        return None;
    }

    Some(ChannelMessage {
        channel_id: channel_id.clone(),
        sender_id: UserId(i64::try_from(from.id.0).ok()?),
        sender_name: from
            .username
            .clone()
            .or_else(|| Some(from.first_name.clone()).filter(|n| !n.is_empty())),
        content: text.to_string(),
        chat_id: message.chat.id.0.to_string(),
        message_id: Some(message.id.0.to_string()),
    })
}

/// Split a reply into chunks Telegram will accept, preferring line breaks.
pub fn split_message(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut chunks = Vec::new();
    let mut rest = text;

    while !rest.is_empty() {
        let Some((hard_cut, _)) = rest.char_indices().nth(max_chars) else {
            chunks.push(rest.to_string());
            break;
        };

        // Break after the last newline in the window, unless that would
        // leave a tiny chunk.
        let cut = match rest[..hard_cut].rfind('\n') {
            Some(nl) if rest[..nl].chars().count() >= max_chars / 2 => nl + 1,
            _ => hard_cut,
        };

        chunks.push(rest[..cut].to_string());
        rest = &rest[cut..];
    }

    chunks
}

/// `chat_id` is numeric for users and groups, `@name` for public channels.
fn recipient(chat_id: &str) -> Recipient {
    match chat_id.parse::<i64>() {
        Ok(id) => Recipient::Id(ChatId(id)),
        Err(_) => Recipient::ChannelUsername(chat_id.to_string()),
    }
}

/// A rejected token never recovers by retrying.
fn is_fatal(error: &RequestError) -> bool {
    matches!(
        error,
        RequestError::Api(ApiError::InvalidToken)
    )
}

/// What `getMe` reports about the bot account.
#[derive(Debug, Clone)]
pub struct BotIdentity {
    pub id: u64,
    pub username: Option<String>,
}

/// Telegram channel adapter.
pub struct TelegramChannel {
    config: TelegramConfig,
    channel_id: ChannelId,
    bot: Bot,
    shutdown: watch::Sender<bool>,
}

impl TelegramChannel {
    pub fn new(config: TelegramConfig) -> Result<Self, ChannelError> {
        if config.bot_token.trim().is_empty() {
            return Err(ChannelError::NotConfigured("telegram bot token is empty".into()));
        }

        // The HTTP timeout has to outlast the long poll.
        let client = teloxide::net::default_reqwest_settings()
            .timeout(Duration::from_secs(config.poll_timeout_secs + 15))
            .build()
            .map_err(|e| ChannelError::NotConfigured(format!("HTTP client: {e}")))?;
        let api_url = config
            .api_base
            .parse()
            .map_err(|e| ChannelError::NotConfigured(format!("api_base '{}': {e}", config.api_base)))?;
        let bot = Bot::with_client(config.bot_token.trim(), client).set_api_url(api_url);

        let (shutdown, _) = watch::channel(false);
        Ok(Self {
            config,
            channel_id: ChannelId("telegram".into()),
            bot,
            shutdown,
        })
    }

    /// Ask Telegram who we are.
    pub async fn get_me(&self) -> Result<BotIdentity, ChannelError> {
        let me = self.bot.get_me().await.map_err(|e| {
            if is_fatal(&e) {
                ChannelError::NotConfigured(format!("getMe: {e}"))
            } else {
                ChannelError::ConnectionLost(format!("getMe: {e}"))
            }
        })?;
        Ok(BotIdentity {
            id: me.user.id.0,
            username: me.user.username.clone(),
        })
    }

    fn delivery_failed(error: RequestError) -> ChannelError {
        ChannelError::DeliveryFailed {
            channel: "telegram".into(),
            reason: error.to_string(),
        }
    }
}

async fn poll_updates(
    bot: Bot,
    channel_id: ChannelId,
    poll_timeout_secs: u64,
    tx: mpsc::Sender<Result<ChannelMessage, ChannelError>>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut listener = Polling::builder(bot)
        .timeout(Duration::from_secs(poll_timeout_secs))
        .allowed_updates(vec![AllowedUpdate::Message])
        .build();
    let stop = listener.stop_token();
    let updates = listener.as_stream();
    tokio::pin!(updates);

    // After a stop request the listener finishes its current request and
    // acknowledges what it delivered; keep draining until it ends.
    let mut stopping = false;
    loop {
        tokio::select! {
            changed = shutdown.changed(), if !stopping => {
                if changed.is_err() || *shutdown.borrow() {
                    stopping = true;
                    stop.stop();
                }
            }
            next = updates.next() => match next {
                None => break,
                Some(Ok(update)) => {
                    let Some(msg) = parse_update(&channel_id, &update) else {
                        debug!(update_id = update.id.0, "Skipping non-text update");
                        continue;
                    };
                    if tx.send(Ok(msg)).await.is_err() {
                        return;
                    }
                }
                Some(Err(e)) if is_fatal(&e) => {
                    error!("Telegram rejected the bot token: {e}");
                    let _ = tx
                        .send(Err(ChannelError::NotConfigured(format!("getUpdates: {e}"))))
                        .await;
                    return;
                }
                Some(Err(e)) => warn!("getUpdates failed: {e}"),
            },
        }
    }

    info!("Telegram polling stopped");
}

#[async_trait]
impl Channel for TelegramChannel {
    fn name(&self) -> &str {
        "telegram"
    }

    fn id(&self) -> &ChannelId {
        &self.channel_id
    }

    async fn start(
        &self,
    ) -> Result<mpsc::Receiver<Result<ChannelMessage, ChannelError>>, ChannelError> {
        info!(
            poll_timeout_secs = self.config.poll_timeout_secs,
            "Telegram channel starting (long polling)"
        );
        let (tx, rx) = mpsc::channel(64);
        self.shutdown.send_replace(false);

        tokio::spawn(poll_updates(
            self.bot.clone(),
            self.channel_id.clone(),
            self.config.poll_timeout_secs,
            tx,
            self.shutdown.subscribe(),
        ));
        Ok(rx)
    }

    async fn send(
        &self,
        chat_id: &str,
        content: &str,
        reply_to: Option<&str>,
    ) -> Result<(), ChannelError> {
        let chunks = split_message(content, MAX_MESSAGE_CHARS);
        debug!(chat_id = %chat_id, chunks = chunks.len(), "Telegram send");

        let reply_to = reply_to.and_then(|r| r.parse::<i32>().ok()).map(MessageId);
        for (i, chunk) in chunks.into_iter().enumerate() {
            let request = self.bot.send_message(recipient(chat_id), chunk);
            let request = match reply_to {
                Some(id) if i == 0 => request.reply_parameters(ReplyParameters::new(id)),
                _ => request,
            };
            request.await.map_err(Self::delivery_failed)?;
        }
        Ok(())
    }

    async fn send_typing(&self, chat_id: &str) -> Result<(), ChannelError> {
        self.bot
            .send_chat_action(recipient(chat_id), ChatAction::Typing)
            .await
            .map(|_| ())
            .map_err(Self::delivery_failed)
    }

    fn is_allowed(&self, sender_id: UserId) -> bool {
        let allowed = &self.config.allowed_users;
        if allowed.is_empty() || allowed.iter().any(|u| u == "*") {
            return true;
        }
        let id = sender_id.to_string();
        allowed.iter().any(|u| u.trim() == id)
    }

    async fn stop(&self) -> Result<(), ChannelError> {
        info!("Telegram channel stopping");
        self.shutdown.send_replace(true);
        Ok(())
    }

    async fn health_check(&self) -> Result<bool, ChannelError> {
        let me = self.get_me().await?;
        debug!(bot_id = me.id, username = ?me.username, "getMe ok");
        Ok(true)
    }
}
