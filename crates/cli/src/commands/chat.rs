//! `relaymind chat` — Talk to the relay from the terminal.

use std::io::Write;
use std::sync::Arc;

use relaymind_agent::Relay;
use relaymind_channels::CliChannel;
use relaymind_core::channel::Channel;
use relaymind_core::history::HistoryStore;
use relaymind_core::message::UserId;
use relaymind_memory::InMemoryHistory;

pub async fn run(ephemeral: bool, user_id: i64) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config()?;
    let user_id = UserId(user_id);

    let history: Arc<dyn HistoryStore> = if ephemeral {
        Arc::new(InMemoryHistory::new())
    } else {
        Arc::new(super::open_history(&config).await?)
    };
    let stored = history.count(user_id).await?;

    let backend = relaymind_providers::build_from_config(&config.inference)
        .map_err(|e| format!("Failed to build inference backend: {e}"))?;
    let relay = Relay::from_config(&config, history.clone(), backend);

    println!();
    println!("  ╔══════════════════════════════════════════════╗");
    println!("  ║          RelayMind — Terminal Chat           ║");
    println!("  ╚══════════════════════════════════════════════╝");
    println!();
    println!("  Model:     {}", config.inference.model);
    if ephemeral {
        println!("  History:   in memory (ephemeral)");
    } else {
        println!("  History:   {}", config.database_path().display());
    }
    println!("  User:      {user_id} ({stored} stored turns)");
    if config.inference.api_key.is_empty() {
        println!("  API key:   none (anonymous requests are heavily rate-limited)");
    }
    println!();
    println!("  /clear forgets this conversation. Type 'exit' or Ctrl+D to quit.");
    println!();

    let channel = CliChannel::new(user_id);
    let mut rx = channel.start().await.map_err(|e| format!("Channel error: {e}"))?;

    prompt()?;
    while let Some(result) = rx.recv().await {
        match result {
            Ok(msg) => {
                eprint!("  ...");
                let reply = relay.dispatch(msg.sender_id, &msg.content).await;
                eprint!("\r     \r");
                channel.send(&msg.chat_id, &format!("  Bot > {reply}"), None).await?;
            }
            Err(e) => {
                eprintln!("  Input error: {e}");
                break;
            }
        }
        prompt()?;
    }

    println!();
    Ok(())
}

fn prompt() -> std::io::Result<()> {
    print!("  You > ");
    std::io::stdout().flush()
}
