pub mod classifier;
pub mod decision;
pub mod dispatch;
pub mod drafter;
pub mod followup;
pub mod orchestrator;
pub mod plan;
pub mod retriever;
pub mod stats;
pub mod suggestion;

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::core::config::LlmConfig;
use crate::core::shared::error::TriageError;
use crate::core::shared::state::AppState;
use crate::kb::Article;
use crate::llm::LLMProvider;

pub use classifier::{Classification, Classifier, KeywordClassifier, LlmClassifier};
pub use decision::{Decision, DecisionEngine, DecisionOutcome, HandoffReason};
pub use dispatch::{
    select_dispatcher, spawn_workers, ImmediateDispatcher, InMemoryJobQueue, JobQueue,
    QueuedDispatcher, TriageJob, WorkDispatcher,
};
pub use drafter::{Draft, Drafter, LlmDrafter, TemplateDrafter};
pub use followup::{FollowUpScheduler, FollowUpStore, InMemoryFollowUpStore, PendingFollowUp};
pub use orchestrator::TriagePipeline;
pub use suggestion::{InMemorySuggestionStore, Suggestion, SuggestionStore};

/// Scores are kept to two decimals so threshold comparisons behave.
pub(crate) fn round_score(score: f64) -> f64 {
    (score * 100.0).round() / 100.0
}

/// Classifier and drafter for the configured mode.
pub fn build_stages(llm: &LlmConfig) -> (Arc<dyn Classifier>, Arc<dyn Drafter>) {
    if llm.stub_mode {
        info!("Triage running in stub mode (keyword classifier, template drafter)");
        return (
            Arc::new(KeywordClassifier::new()),
            Arc::new(TemplateDrafter::new()),
        );
    }

    let provider = llm_provider(llm);
    if provider.is_none() {
        warn!("STUB_MODE is off but no LLM_URL is configured; triage runs will fail");
    }
    (
        Arc::new(LlmClassifier::new(provider.clone())),
        Arc::new(LlmDrafter::new(provider)),
    )
}

#[cfg(feature = "llm")]
fn llm_provider(llm: &LlmConfig) -> Option<Arc<dyn LLMProvider>> {
    let url = llm.url.clone()?;
    info!("Triage using LLM at {} ({})", url, llm.model);
    Some(Arc::new(crate::llm::OpenAIClient::new(
        llm.api_key.clone(),
        Some(url),
        llm.model.clone(),
    )))
}

#[cfg(not(feature = "llm"))]
fn llm_provider(_llm: &LlmConfig) -> Option<Arc<dyn LLMProvider>> {
    None
}

#[derive(Debug, Deserialize)]
pub struct TriageRequest {
    pub ticket_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct SuggestionView {
    #[serde(flatten)]
    pub suggestion: Suggestion,
    pub articles: Vec<Article>,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub triage: stats::TriageStats,
    pub categories: Vec<stats::CategoryStats>,
}

/// Runs triage synchronously; used for explicit re-triage.
pub async fn run_triage(
    State(state): State<Arc<AppState>>,
    Json(req): Json<TriageRequest>,
) -> Result<Json<Suggestion>, TriageError> {
    let suggestion = state.pipeline.triage_ticket(req.ticket_id).await?;
    Ok(Json(suggestion))
}

pub async fn get_suggestion(
    State(state): State<Arc<AppState>>,
    Path(ticket_id): Path<Uuid>,
) -> Result<Json<SuggestionView>, TriageError> {
    let suggestion = state
        .stores
        .suggestions
        .find_latest_for_ticket(ticket_id)
        .await?
        .ok_or_else(|| TriageError::NotFound(format!("suggestion for ticket {ticket_id}")))?;

    let mut articles = Vec::with_capacity(suggestion.article_ids.len());
    for id in &suggestion.article_ids {
        if let Some(article) = state.stores.articles.get(*id).await? {
            articles.push(article);
        }
    }

    Ok(Json(SuggestionView {
        suggestion,
        articles,
    }))
}

pub async fn get_stats(
    State(state): State<Arc<AppState>>,
) -> Result<Json<StatsResponse>, TriageError> {
    let suggestions = state.stores.suggestions.list().await?;
    Ok(Json(StatsResponse {
        triage: stats::triage_stats(&suggestions),
        categories: stats::category_stats(&suggestions),
    }))
}

pub fn configure_agent_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/agent/triage", post(run_triage))
        .route("/api/agent/suggestion/:ticket_id", get(get_suggestion))
        .route("/api/agent/stats", get(get_stats))
}
