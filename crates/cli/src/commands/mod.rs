pub mod chat;
pub mod config_cmd;
pub mod tools;

use salesdesk_config::AppConfig;
use salesdesk_crm::CrmStore;
use std::path::{Path, PathBuf};

/// The explicit `--config` path, or the default location.
pub fn resolve_path(path: Option<&Path>) -> PathBuf {
    path.map(Path::to_path_buf).unwrap_or_else(AppConfig::config_path)
}

pub fn load_config(path: Option<&Path>) -> Result<AppConfig, Box<dyn std::error::Error>> {
    let path = resolve_path(path);
    AppConfig::load_with_env(&path).map_err(|e| format!("Failed to load config: {e}").into())
}

/// The seeded demo store, pinned to `[crm].reference_date` when set.
pub fn open_store(config: &AppConfig) -> Result<CrmStore, Box<dyn std::error::Error>> {
    let store = match config.crm.reference_date {
        Some(date) => CrmStore::seeded_as_of(date)?,
        None => CrmStore::seeded()?,
    };
    Ok(store)
}
