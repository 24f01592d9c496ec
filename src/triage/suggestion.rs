use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::core::shared::error::StoreError;
use crate::tickets::TicketCategory;

pub const PROMPT_VERSION: &str = "1.0";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub provider: String,
    pub model: String,
    pub prompt_version: String,
    pub latency_ms: u64,
}

/// Output of one triage run. Only `auto_closed` changes after creation; a
/// re-triage writes a new suggestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    pub id: Uuid,
    pub ticket_id: Uuid,
    pub predicted_category: TicketCategory,
    pub article_ids: Vec<Uuid>,
    pub draft_reply: String,
    pub confidence: f64,
    pub auto_closed: bool,
    pub model_info: ModelInfo,
    pub created_at: DateTime<Utc>,
}

impl Suggestion {
    pub fn new(
        ticket_id: Uuid,
        predicted_category: TicketCategory,
        article_ids: Vec<Uuid>,
        draft_reply: String,
        confidence: f64,
        model_info: ModelInfo,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            ticket_id,
            predicted_category,
            article_ids,
            draft_reply,
            confidence: confidence.clamp(0.0, 1.0),
            auto_closed: false,
            model_info,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SuggestionPatch {
    pub auto_closed: Option<bool>,
}

#[async_trait]
pub trait SuggestionStore: Send + Sync {
    async fn create(&self, suggestion: Suggestion) -> Result<Suggestion, StoreError>;

    async fn update(&self, id: Uuid, patch: SuggestionPatch) -> Result<Suggestion, StoreError>;

    async fn find_latest_for_ticket(&self, ticket_id: Uuid)
        -> Result<Option<Suggestion>, StoreError>;

    async fn list(&self) -> Result<Vec<Suggestion>, StoreError>;
}

#[derive(Default)]
pub struct InMemorySuggestionStore {
    suggestions: RwLock<Vec<Suggestion>>,
}

impl InMemorySuggestionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SuggestionStore for InMemorySuggestionStore {
    async fn create(&self, suggestion: Suggestion) -> Result<Suggestion, StoreError> {
        self.suggestions.write().await.push(suggestion.clone());
        Ok(suggestion)
    }

    async fn update(&self, id: Uuid, patch: SuggestionPatch) -> Result<Suggestion, StoreError> {
        let mut suggestions = self.suggestions.write().await;
        let suggestion = suggestions
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| StoreError::NotFound(format!("suggestion {id}")))?;
        if let Some(auto_closed) = patch.auto_closed {
            suggestion.auto_closed = auto_closed;
        }
        Ok(suggestion.clone())
    }

    async fn find_latest_for_ticket(
        &self,
        ticket_id: Uuid,
    ) -> Result<Option<Suggestion>, StoreError> {
        let suggestions = self.suggestions.read().await;
        // Later inserts win on identical timestamps.
        Ok(suggestions
            .iter()
            .filter(|s| s.ticket_id == ticket_id)
            .fold(None::<&Suggestion>, |latest, s| match latest {
                Some(l) if l.created_at > s.created_at => Some(l),
                _ => Some(s),
            })
            .cloned())
    }

    async fn list(&self) -> Result<Vec<Suggestion>, StoreError> {
        Ok(self.suggestions.read().await.clone())
    }
}
