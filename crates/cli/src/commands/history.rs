//! `relaymind history` — Inspect or clear stored conversations.

use relaymind_core::history::HistoryStore;
use relaymind_core::message::UserId;

pub async fn show(user_id: i64, limit: usize) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config()?;
    let history = super::open_history(&config).await?;
    let user_id = UserId(user_id);

    let total = history.count(user_id).await?;
    let mut turns = history.recent(user_id, limit).await?;
    turns.reverse();

    println!("💬 History for user {user_id} ({} of {total} turns)", turns.len());
    println!("=========================================");
    if turns.is_empty() {
        println!("   (empty)");
    }
    for turn in &turns {
        println!(
            "  [{}] {}",
            turn.timestamp.format("%Y-%m-%d %H:%M:%S"),
            turn.render()
        );
    }

    history.close().await;
    Ok(())
}

pub async fn clear(user_id: i64) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config()?;
    let history = super::open_history(&config).await?;
    let user_id = UserId(user_id);

    let removed = history.count(user_id).await?;
    history.clear(user_id).await?;
    println!("🗑️  Cleared {removed} turns for user {user_id}");

    history.close().await;
    Ok(())
}
