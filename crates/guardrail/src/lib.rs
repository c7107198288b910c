//! Response validation backends for SalesDesk.
//!
//! All backends implement the `salesdesk_core::Guardrail` trait.
//! `build_from_config` returns `None` when validation is not configured;
//! the agent treats that as an always-pass verdict.

pub mod http;

pub use http::HttpGuardrail;

use salesdesk_config::GuardrailConfig;
use salesdesk_core::Guardrail;
use std::sync::Arc;

/// Construct the configured validation backend, if any.
pub fn build_from_config(config: &GuardrailConfig) -> Option<Arc<dyn Guardrail>> {
    if !config.enabled {
        tracing::info!("Response validation disabled by configuration");
        return None;
    }

    let (Some(api_key), Some(project_id)) = (&config.api_key, &config.project_id) else {
        tracing::info!("No guardrail credentials configured, validation disabled");
        return None;
    };

    match HttpGuardrail::new(
        &config.api_url,
        api_key,
        project_id,
        std::time::Duration::from_secs(config.timeout_secs),
    ) {
        Ok(guardrail) => Some(Arc::new(guardrail)),
        Err(e) => {
            tracing::warn!(error = %e, "Could not build guardrail client, validation disabled");
            None
        }
    }
}
