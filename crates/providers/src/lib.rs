//! Language-model backend implementations for SalesDesk.
//!
//! All providers implement the `salesdesk_core::Provider` trait.
//! `build_from_config` selects and constructs the configured backend.

pub mod openai_compat;

pub use openai_compat::OpenAiCompatProvider;

use salesdesk_config::ModelConfig;
use salesdesk_core::{Provider, ProviderError};
use std::sync::Arc;

/// Construct the model backend described by `config`.
///
/// Fails with `NotConfigured` when no API key is available.
pub fn build_from_config(config: &ModelConfig) -> Result<Arc<dyn Provider>, ProviderError> {
    let api_key = config.api_key.as_deref().ok_or_else(|| {
        ProviderError::NotConfigured(
            "no API key (set SALESDESK_API_KEY or OPENAI_API_KEY, or model.api_key)".into(),
        )
    })?;

    match config.provider.as_str() {
        "openai" => {
            let provider = OpenAiCompatProvider::new(
                "openai",
                &config.api_url,
                api_key,
                std::time::Duration::from_secs(config.timeout_secs),
            )?;
            tracing::debug!(url = %config.api_url, model = %config.model, "Model backend configured");
            Ok(Arc::new(provider))
        }
        other => Err(ProviderError::NotConfigured(format!(
            "unsupported provider '{other}'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_key_is_not_configured() {
        let config = ModelConfig::default();
        let err = build_from_config(&config).err().unwrap();
        assert!(matches!(err, ProviderError::NotConfigured(_)));
    }

    #[test]
    fn openai_backend_builds_with_key() {
        let config = ModelConfig {
            api_key: Some("sk-test".into()),
            ..ModelConfig::default()
        };
        let provider = build_from_config(&config).unwrap();
        assert_eq!(provider.name(), "openai");
    }

    #[test]
    fn unknown_provider_rejected() {
        let config = ModelConfig {
            provider: "carrier-pigeon".into(),
            api_key: Some("k".into()),
            ..ModelConfig::default()
        };
        assert!(build_from_config(&config).is_err());
    }
}
