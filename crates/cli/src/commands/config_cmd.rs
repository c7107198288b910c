//! `salesdesk config` — Configuration management commands.

use salesdesk_config::AppConfig;
use std::path::Path;

pub async fn show(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(config_path)?;

    println!("   File:        {}", super::resolve_path(config_path).display());
    println!();
    // Debug output redacts API keys
    println!("{config:#?}");
    println!();
    if !config.has_api_key() {
        println!("   ⚠️  No model API key set (SALESDESK_API_KEY or OPENAI_API_KEY)");
    }
    if config.guardrail.enabled
        && (config.guardrail.api_key.is_none() || config.guardrail.project_id.is_none())
    {
        println!("   ⚠️  Guardrail credentials missing; answers will not be validated");
    }
    Ok(())
}

pub async fn init(config_path: Option<&Path>, force: bool) -> Result<(), Box<dyn std::error::Error>> {
    let path = super::resolve_path(config_path);
    write_default(&path, force)?;
    println!("✅ Wrote default config to {}", path.display());
    Ok(())
}

fn write_default(path: &Path, force: bool) -> Result<(), Box<dyn std::error::Error>> {
    if path.exists() && !force {
        return Err(format!(
            "{} already exists (use --force to overwrite)",
            path.display()
        )
        .into());
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, AppConfig::default_toml())?;
    Ok(())
}
