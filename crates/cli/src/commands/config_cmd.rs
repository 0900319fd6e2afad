//! `relaymind config` — Configuration file helpers.

use relaymind_config::AppConfig;

pub fn init() -> Result<(), Box<dyn std::error::Error>> {
    let path = AppConfig::config_path();
    if path.exists() {
        println!("   Config already exists at {}", path.display());
        return Ok(());
    }

    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    std::fs::write(&path, AppConfig::default_toml())?;
    println!("   ✅ Wrote default config to {}", path.display());
    println!("   Set TELEGRAM_BOT_TOKEN (and optionally HUGGINGFACE_API_KEY) before `relaymind serve`.");
    Ok(())
}

pub fn path() {
    println!("{}", AppConfig::config_path().display());
}
