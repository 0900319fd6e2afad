pub mod chat;
pub mod config_cmd;
pub mod doctor;
pub mod history;
pub mod serve;

use relaymind_config::AppConfig;
use relaymind_memory::SqliteHistory;

/// Load config, reporting failures the way every command does.
pub fn load_config() -> Result<AppConfig, Box<dyn std::error::Error>> {
    Ok(AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?)
}

/// Open the configured SQLite history file.
pub async fn open_history(config: &AppConfig) -> Result<SqliteHistory, Box<dyn std::error::Error>> {
    let path = config.database_path();
    let history = SqliteHistory::open(&path)
        .await
        .map_err(|e| format!("Failed to open history database {}: {e}", path.display()))?;
    Ok(history)
}
