//! `relaymind serve` — Telegram bot runtime.

use std::future::Future;
use std::sync::Arc;

use relaymind_agent::Relay;
use relaymind_channels::{TelegramChannel, TelegramConfig};
use relaymind_core::channel::{Channel, ChannelMessage};
use relaymind_core::error::ChannelError;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config()?;
    config.require_bot_token()?;

    let history = Arc::new(super::open_history(&config).await?);
    let backend = relaymind_providers::build_from_config(&config.inference)
        .map_err(|e| format!("Failed to build inference backend: {e}"))?;
    let relay = Arc::new(Relay::from_config(&config, history.clone(), backend));

    let channel = Arc::new(TelegramChannel::new(TelegramConfig::from(&config.telegram))?);
    match channel.get_me().await {
        Ok(me) => info!(
            bot = me.username.as_deref().unwrap_or("unknown"),
            "Connected to Telegram"
        ),
        Err(e) => warn!("Could not verify bot token with getMe: {e}"),
    }

    println!("🤖 RelayMind — serving Telegram");
    println!("   Model:    {}", config.inference.model);
    println!("   History:  {}", config.database_path().display());
    println!("   Window:   {} turns", config.history_limit);
    println!("   Press Ctrl+C to stop.");

    let rx = channel.start().await?;
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Cannot listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };
    let result = run_dispatch(channel, relay, rx, shutdown).await;

    history.close().await;
    result?;
    println!("👋 RelayMind stopped");
    Ok(())
}

/// Hand each allowed message to its own task until `shutdown` resolves or
/// the channel ends, then wait for every in-flight message to be answered
/// and stored.
///
/// A `NotConfigured` error from the channel ends the loop and is returned
/// once the drain completes.
pub(crate) async fn run_dispatch<C, S>(
    channel: Arc<C>,
    relay: Arc<Relay>,
    mut rx: mpsc::Receiver<Result<ChannelMessage, ChannelError>>,
    shutdown: S,
) -> Result<(), ChannelError>
where
    C: Channel + 'static,
    S: Future<Output = ()>,
{
    let mut handlers = JoinSet::new();
    let mut fatal = None;
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Shutdown requested");
                break;
            }
            next = rx.recv() => match next {
                Some(Ok(msg)) => {
                    if !channel.is_allowed(msg.sender_id) {
                        warn!(user_id = %msg.sender_id, "Sender not on the allowlist, ignoring");
                        continue;
                    }
                    handlers.spawn(handle_message(relay.clone(), channel.clone(), msg));
                }
                Some(Err(e @ ChannelError::NotConfigured(_))) => {
                    error!("{} channel cannot continue: {e}", channel.name());
                    fatal = Some(e);
                    break;
                }
                Some(Err(e)) => warn!("Channel error: {e}"),
                None => {
                    info!("{} channel closed", channel.name());
                    break;
                }
            },
            // Reap finished handlers so the set does not grow unbounded.
            Some(joined) = handlers.join_next(), if !handlers.is_empty() => {
                if let Err(e) = joined {
                    error!("Message handler panicked: {e}");
                }
            }
        }
    }

    if let Err(e) = channel.stop().await {
        warn!("Channel did not stop cleanly: {e}");
    }

    // Every accepted message is answered and stored before returning.
    if !handlers.is_empty() {
        info!(in_flight = handlers.len(), "Waiting for in-flight messages");
    }
    while let Some(joined) = handlers.join_next().await {
        if let Err(e) = joined {
            error!("Message handler panicked: {e}");
        }
    }

    match fatal {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

async fn handle_message<C: Channel>(relay: Arc<Relay>, channel: Arc<C>, msg: ChannelMessage) {
    if let Err(e) = channel.send_typing(&msg.chat_id).await {
        debug!(chat_id = %msg.chat_id, "Typing indicator failed: {e}");
    }

    let reply = relay.dispatch(msg.sender_id, &msg.content).await;

    if let Err(e) = channel
        .send(&msg.chat_id, &reply, msg.message_id.as_deref())
        .await
    {
        error!(chat_id = %msg.chat_id, user_id = %msg.sender_id, "Reply delivery failed: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use relaymind_core::channel::ChannelId;
    use relaymind_core::error::InferenceError;
    use relaymind_core::history::HistoryStore;
    use relaymind_core::inference::{InferenceBackend, InferenceRequest};
    use relaymind_core::message::UserId;
    use relaymind_memory::InMemoryHistory;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Records replies instead of delivering them.
    struct RecordingChannel {
        id: ChannelId,
        allowed: Option<UserId>,
        sent: Mutex<Vec<(String, String)>>,
        stopped: Mutex<bool>,
    }

    impl RecordingChannel {
        fn new(allowed: Option<UserId>) -> Self {
            Self {
                id: ChannelId("test".into()),
                allowed,
                sent: Mutex::new(Vec::new()),
                stopped: Mutex::new(false),
            }
        }

        fn sent(&self) -> Vec<(String, String)> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Channel for RecordingChannel {
        fn name(&self) -> &str {
            "test"
        }

        fn id(&self) -> &ChannelId {
            &self.id
        }

        async fn start(
            &self,
        ) -> Result<mpsc::Receiver<Result<ChannelMessage, ChannelError>>, ChannelError> {
            let (_tx, rx) = mpsc::channel(1);
            Ok(rx)
        }

        async fn send(
            &self,
            chat_id: &str,
            content: &str,
            _reply_to: Option<&str>,
        ) -> Result<(), ChannelError> {
            self.sent
                .lock()
                .unwrap()
                .push((chat_id.to_string(), content.to_string()));
            Ok(())
        }

        fn is_allowed(&self, sender_id: UserId) -> bool {
            self.allowed.is_none_or(|id| id == sender_id)
        }

        async fn stop(&self) -> Result<(), ChannelError> {
            *self.stopped.lock().unwrap() = true;
            Ok(())
        }
    }

    /// Answers after a fixed delay.
    struct SlowBackend(Duration);

    #[async_trait]
    impl InferenceBackend for SlowBackend {
        fn name(&self) -> &str {
            "slow"
        }

        async fn generate(&self, _request: InferenceRequest) -> Result<String, InferenceError> {
            tokio::time::sleep(self.0).await;
            Ok("done".into())
        }
    }

    fn text(user: i64, content: &str) -> ChannelMessage {
        ChannelMessage {
            channel_id: ChannelId("test".into()),
            sender_id: UserId(user),
            sender_name: None,
            content: content.into(),
            chat_id: user.to_string(),
            message_id: None,
        }
    }

    fn relay_with(delay: Duration) -> (Arc<Relay>, Arc<InMemoryHistory>) {
        let history = Arc::new(InMemoryHistory::new());
        let relay = Relay::new(history.clone(), Arc::new(SlowBackend(delay)), "test-model");
        (Arc::new(relay), history)
    }

    #[tokio::test]
    async fn shutdown_waits_for_in_flight_messages() {
        let (relay, history) = relay_with(Duration::from_millis(300));
        let channel = Arc::new(RecordingChannel::new(None));
        let (tx, rx) = mpsc::channel(4);
        tx.send(Ok(text(7, "hello"))).await.unwrap();

        let shutdown = tokio::time::sleep(Duration::from_millis(50));
        run_dispatch(channel.clone(), relay, rx, shutdown).await.unwrap();

        assert_eq!(history.count(UserId(7)).await.unwrap(), 2);
        assert_eq!(channel.sent(), vec![("7".to_string(), "done".to_string())]);
        assert!(*channel.stopped.lock().unwrap());
        drop(tx);
    }

    #[tokio::test]
    async fn rejected_token_is_returned_after_draining() {
        let (relay, history) = relay_with(Duration::from_millis(100));
        let channel = Arc::new(RecordingChannel::new(None));
        let (tx, rx) = mpsc::channel(4);
        tx.send(Ok(text(3, "hi"))).await.unwrap();
        tx.send(Err(ChannelError::NotConfigured("getUpdates: Unauthorized".into())))
            .await
            .unwrap();

        let result = run_dispatch(channel.clone(), relay, rx, std::future::pending()).await;

        assert!(matches!(result, Err(ChannelError::NotConfigured(_))));
        assert_eq!(history.count(UserId(3)).await.unwrap(), 2);
        assert!(*channel.stopped.lock().unwrap());
    }

    #[tokio::test]
    async fn closed_channel_ends_cleanly_and_skips_disallowed_senders() {
        let (relay, history) = relay_with(Duration::ZERO);
        let channel = Arc::new(RecordingChannel::new(Some(UserId(1))));
        let (tx, rx) = mpsc::channel(4);
        tx.send(Ok(text(2, "not allowed"))).await.unwrap();
        tx.send(Ok(text(1, "allowed"))).await.unwrap();
        tx.send(Err(ChannelError::ConnectionLost("blip".into())))
            .await
            .unwrap();
        drop(tx);

        run_dispatch(channel.clone(), relay, rx, std::future::pending())
            .await
            .unwrap();

        assert_eq!(history.count(UserId(2)).await.unwrap(), 0);
        assert_eq!(history.count(UserId(1)).await.unwrap(), 2);
        assert_eq!(channel.sent().len(), 1);
    }
}
