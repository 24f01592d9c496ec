use async_trait::async_trait;
use axum::{extract::State, routing::get, Json, Router};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::core::shared::error::TriageError;
use crate::core::shared::state::AppState;

/// Runtime switches for the decision stage. Stored as a singleton document and
/// re-read at the start of every decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TriageConfig {
    pub auto_close_enabled: bool,
    pub confidence_threshold: f64,
    pub sla_hours: u32,
}

impl Default for TriageConfig {
    fn default() -> Self {
        Self {
            auto_close_enabled: false,
            confidence_threshold: 0.8,
            sla_hours: 24,
        }
    }
}

impl TriageConfig {
    pub fn validate(&self) -> Result<(), TriageError> {
        if !self.confidence_threshold.is_finite()
            || !(0.0..=1.0).contains(&self.confidence_threshold)
        {
            return Err(TriageError::Configuration(format!(
                "confidence_threshold must be within [0, 1], got {}",
                self.confidence_threshold
            )));
        }
        if self.sla_hours == 0 {
            return Err(TriageError::Configuration(
                "sla_hours must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TriageConfigUpdate {
    pub auto_close_enabled: Option<bool>,
    pub confidence_threshold: Option<f64>,
    pub sla_hours: Option<u32>,
}

impl TriageConfigUpdate {
    pub fn apply(self, mut config: TriageConfig) -> TriageConfig {
        if let Some(enabled) = self.auto_close_enabled {
            config.auto_close_enabled = enabled;
        }
        if let Some(threshold) = self.confidence_threshold {
            config.confidence_threshold = threshold;
        }
        if let Some(hours) = self.sla_hours {
            config.sla_hours = hours;
        }
        config
    }
}

#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Returns the stored config, creating the default document if none exists.
    /// A document that fails to parse or validate yields `Configuration`.
    async fn get_or_create_default(&self) -> Result<TriageConfig, TriageError>;

    async fn put(&self, config: TriageConfig) -> Result<TriageConfig, TriageError>;
}

/// Keeps the config as a raw JSON document, the way a document store would.
#[derive(Default)]
pub struct InMemoryConfigStore {
    document: RwLock<Option<serde_json::Value>>,
}

impl InMemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn put_document(&self, document: serde_json::Value) {
        *self.document.write().await = Some(document);
    }
}

#[async_trait]
impl ConfigStore for InMemoryConfigStore {
    async fn get_or_create_default(&self) -> Result<TriageConfig, TriageError> {
        let mut document = self.document.write().await;
        let Some(raw) = document.as_ref() else {
            let config = TriageConfig::default();
            let raw = serde_json::to_value(&config)
                .map_err(|e| TriageError::Configuration(e.to_string()))?;
            *document = Some(raw);
            info!("Created default triage config");
            return Ok(config);
        };

        let config: TriageConfig = serde_json::from_value(raw.clone())
            .map_err(|e| TriageError::Configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    async fn put(&self, config: TriageConfig) -> Result<TriageConfig, TriageError> {
        config.validate()?;
        let raw =
            serde_json::to_value(&config).map_err(|e| TriageError::Configuration(e.to_string()))?;
        *self.document.write().await = Some(raw);
        Ok(config)
    }
}

pub async fn get_config(
    State(state): State<Arc<AppState>>,
) -> Result<Json<TriageConfig>, TriageError> {
    let config = state.stores.config.get_or_create_default().await?;
    Ok(Json(config))
}

pub async fn update_config(
    State(state): State<Arc<AppState>>,
    Json(update): Json<TriageConfigUpdate>,
) -> Result<Json<TriageConfig>, TriageError> {
    let current = match state.stores.config.get_or_create_default().await {
        Ok(config) => config,
        Err(TriageError::Configuration(msg)) => {
            warn!("Replacing malformed triage config: {}", msg);
            TriageConfig::default()
        }
        Err(e) => return Err(e),
    };

    let updated = update.apply(current);
    updated
        .validate()
        .map_err(|e| TriageError::Validation(e.to_string()))?;
    let saved = state.stores.config.put(updated).await?;
    info!(
        "Triage config updated: auto_close={} threshold={} sla_hours={}",
        saved.auto_close_enabled, saved.confidence_threshold, saved.sla_hours
    );
    Ok(Json(saved))
}

pub fn configure_config_routes() -> Router<Arc<AppState>> {
    Router::new().route("/api/config", get(get_config).put(update_config))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_default_created_lazily() {
        let store = InMemoryConfigStore::new();
        let config = store.get_or_create_default().await.unwrap();
        assert_eq!(config, TriageConfig::default());
        assert!(!config.auto_close_enabled);
        assert_eq!(config.confidence_threshold, 0.8);
        assert_eq!(config.sla_hours, 24);
    }

    #[tokio::test]
    async fn test_partial_document_fills_defaults() {
        let store = InMemoryConfigStore::new();
        store
            .put_document(serde_json::json!({ "auto_close_enabled": true }))
            .await;
        let config = store.get_or_create_default().await.unwrap();
        assert!(config.auto_close_enabled);
        assert_eq!(config.confidence_threshold, 0.8);
    }

    #[tokio::test]
    async fn test_malformed_document_is_configuration_error() {
        let store = InMemoryConfigStore::new();
        store
            .put_document(serde_json::json!({ "confidence_threshold": "high" }))
            .await;
        assert!(matches!(
            store.get_or_create_default().await,
            Err(TriageError::Configuration(_))
        ));

        store
            .put_document(serde_json::json!({ "confidence_threshold": 1.5 }))
            .await;
        assert!(matches!(
            store.get_or_create_default().await,
            Err(TriageError::Configuration(_))
        ));
    }

    #[test]
    fn test_update_only_touches_given_fields() {
        let update = TriageConfigUpdate {
            confidence_threshold: Some(0.6),
            ..TriageConfigUpdate::default()
        };
        let config = update.apply(TriageConfig::default());
        assert_eq!(config.confidence_threshold, 0.6);
        assert!(!config.auto_close_enabled);
        assert_eq!(config.sla_hours, 24);
    }
}
