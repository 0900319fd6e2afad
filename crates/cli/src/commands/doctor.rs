//! `relaymind doctor` — Diagnose configuration and storage.

use relaymind_channels::{TelegramChannel, TelegramConfig};
use relaymind_config::AppConfig;
use relaymind_core::channel::Channel;
use relaymind_core::history::HistoryStore;
use relaymind_memory::SqliteHistory;
use std::path::Path;

/// What the doctor found at the configured database path.
#[derive(Debug, PartialEq)]
enum DatabaseStatus {
    /// No file yet; `serve` or `chat` creates it on first use.
    Missing,
    Usable,
    Broken(String),
}

/// Inspect the history database without creating it.
async fn check_database(path: &Path) -> DatabaseStatus {
    if !path.exists() {
        return DatabaseStatus::Missing;
    }

    let history = match SqliteHistory::open(path).await {
        Ok(history) => history,
        Err(e) => return DatabaseStatus::Broken(format!("cannot open: {e}")),
    };
    let status = match history.count(relaymind_channels::LOCAL_USER_ID).await {
        Ok(_) => DatabaseStatus::Usable,
        Err(e) => DatabaseStatus::Broken(format!("query failed: {e}")),
    };
    history.close().await;
    status
}

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    println!("🩺 RelayMind Doctor — System Diagnostics");
    println!("========================================\n");

    let mut issues = 0;

    // Config
    let config_path = AppConfig::config_path();
    if !config_path.exists() {
        println!("  ⚠️  No config file at {} — using defaults", config_path.display());
        println!("      (run `relaymind config init` to create one)");
    }
    let config = match AppConfig::load() {
        Ok(config) => {
            println!("  ✅ Config valid");
            config
        }
        Err(e) => {
            println!("  ❌ Config invalid: {e}");
            println!("\n  ⚠️  Cannot continue without a valid config.");
            return Ok(());
        }
    };

    // Bot token
    match config.require_bot_token() {
        Ok(_) => {
            println!("  ✅ Telegram bot token configured");
            let channel = TelegramChannel::new(TelegramConfig::from(&config.telegram))?;
            match channel.health_check().await {
                Ok(_) => println!("  ✅ Telegram accepted the bot token"),
                Err(e) => {
                    println!("  ❌ Telegram check failed: {e}");
                    issues += 1;
                }
            }
        }
        Err(e) => {
            println!("  ❌ {e}");
            issues += 1;
        }
    }

    // Inference
    if config.inference.api_key.is_empty() {
        println!("  ⚠️  No Hugging Face API key — requests will be anonymous");
    } else {
        println!("  ✅ Hugging Face API key configured");
    }
    println!("     Model: {}", config.inference.model);

    // Database
    let db_path = config.database_path();
    match check_database(&db_path).await {
        DatabaseStatus::Missing => {
            println!("  ⚠️  History database not created yet ({})", db_path.display());
        }
        DatabaseStatus::Usable => {
            println!("  ✅ History database usable at {}", db_path.display());
        }
        DatabaseStatus::Broken(e) => {
            println!("  ❌ History database {}: {e}", db_path.display());
            issues += 1;
        }
    }

    // Summary
    println!();
    if issues == 0 {
        println!("  🎉 All checks passed!");
    } else {
        println!("  ⚠️  {issues} issue(s) found. See above for details.");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_database_is_not_created() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("chat_history.db");

        assert_eq!(check_database(&path).await, DatabaseStatus::Missing);
        assert!(!path.exists());
        assert!(!path.parent().unwrap().exists());
    }

    #[tokio::test]
    async fn existing_database_is_usable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chat_history.db");
        SqliteHistory::open(&path).await.unwrap().close().await;

        assert_eq!(check_database(&path).await, DatabaseStatus::Usable);
    }

    #[tokio::test]
    async fn non_database_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chat_history.db");
        std::fs::write(&path, "this is not a database, just plain text padding it out").unwrap();

        assert!(matches!(check_database(&path).await, DatabaseStatus::Broken(_)));
    }
}
