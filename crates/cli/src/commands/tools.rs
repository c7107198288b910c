//! `salesdesk tools` — List the CRM tool catalog.

use std::path::Path;
use std::sync::Arc;

pub async fn run(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(config_path)?;
    let store = Arc::new(super::open_store(&config)?);
    let catalog = salesdesk_tools::default_catalog(store);

    println!("🔧 {} tools available", catalog.len());
    println!();
    for tool in catalog.iter() {
        println!("  {:<30} [{}]", tool.name(), tool.effect());
        println!("      {}", tool.description());
    }

    Ok(())
}
