pub mod store;

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use log::{debug, error};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

use crate::core::shared::error::{TriageError, PipelineStage};
use crate::core::shared::state::AppState;
use crate::tickets::{TicketCategory, TicketStatus};
use crate::triage::decision::HandoffReason;
use crate::triage::plan::{Complexity, ExecutionPlan};
use crate::triage::retriever::RetrievalStrategy;

pub use store::{AuditStore, InMemoryAuditStore};

/// Who performed an audited action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
    System,
    User(Uuid),
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::System => f.write_str("system"),
            Self::User(id) => write!(f, "{id}"),
        }
    }
}

impl Serialize for Actor {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Actor {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        if raw == "system" {
            return Ok(Self::System);
        }
        Uuid::parse_str(&raw)
            .map(Self::User)
            .map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    AgentTriageStarted,
    ExecutionPlanCreated,
    ClassificationStarted,
    AgentClassified,
    KbRetrievalStarted,
    KbRetrieved,
    DraftGenerationStarted,
    DraftGenerated,
    DecisionEvaluationStarted,
    AutoClosed,
    AssignedToHuman,
    DecisionSkipped,
    AgentTriageCompleted,
    AgentTriageFailed,
    SatisfactionCheck,
    SatisfactionCheckFailed,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AgentTriageStarted => "AGENT_TRIAGE_STARTED",
            Self::ExecutionPlanCreated => "EXECUTION_PLAN_CREATED",
            Self::ClassificationStarted => "CLASSIFICATION_STARTED",
            Self::AgentClassified => "AGENT_CLASSIFIED",
            Self::KbRetrievalStarted => "KB_RETRIEVAL_STARTED",
            Self::KbRetrieved => "KB_RETRIEVED",
            Self::DraftGenerationStarted => "DRAFT_GENERATION_STARTED",
            Self::DraftGenerated => "DRAFT_GENERATED",
            Self::DecisionEvaluationStarted => "DECISION_EVALUATION_STARTED",
            Self::AutoClosed => "AUTO_CLOSED",
            Self::AssignedToHuman => "ASSIGNED_TO_HUMAN",
            Self::DecisionSkipped => "DECISION_SKIPPED",
            Self::AgentTriageCompleted => "AGENT_TRIAGE_COMPLETED",
            Self::AgentTriageFailed => "AGENT_TRIAGE_FAILED",
            Self::SatisfactionCheck => "SATISFACTION_CHECK",
            Self::SatisfactionCheckFailed => "SATISFACTION_CHECK_FAILED",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One audited step. The variant is the action name, its fields the metadata
/// that action always carries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", content = "meta", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditEvent {
    AgentTriageStarted {
        trace_id: Uuid,
        planner_steps: Vec<String>,
    },
    ExecutionPlanCreated {
        plan: ExecutionPlan,
        ticket_length: usize,
        has_attachments: bool,
    },
    ClassificationStarted {
        text_length: usize,
        original_category: TicketCategory,
    },
    AgentClassified {
        predicted_category: TicketCategory,
        confidence: f64,
        original_category: TicketCategory,
        category_changed: bool,
        latency_ms: u64,
    },
    KbRetrievalStarted {
        search_query: String,
        predicted_category: TicketCategory,
    },
    KbRetrieved {
        articles_found: usize,
        article_ids: Vec<Uuid>,
        search_method: RetrievalStrategy,
        latency_ms: u64,
        average_score: f64,
    },
    DraftGenerationStarted {
        article_count: usize,
        ticket_complexity: Complexity,
    },
    DraftGenerated {
        draft_length: usize,
        citations_count: usize,
        latency_ms: u64,
        readability_score: f64,
    },
    DecisionEvaluationStarted {
        confidence: f64,
        threshold: f64,
        auto_close_enabled: bool,
    },
    AutoClosed {
        confidence: f64,
        threshold: f64,
        reply_length: usize,
    },
    AssignedToHuman {
        reason: HandoffReason,
        confidence: f64,
        threshold: f64,
        requires_human_review: bool,
    },
    DecisionSkipped {
        current_status: TicketStatus,
    },
    AgentTriageCompleted {
        suggestion_id: Uuid,
        total_latency_ms: u64,
        final_status: TicketStatus,
        auto_resolved: bool,
    },
    AgentTriageFailed {
        error: String,
        stage: Option<PipelineStage>,
    },
    SatisfactionCheck {
        ticket_status: TicketStatus,
        hours_open: i64,
    },
    SatisfactionCheckFailed {
        error: String,
    },
}

impl AuditEvent {
    pub fn action(&self) -> AuditAction {
        match self {
            Self::AgentTriageStarted { .. } => AuditAction::AgentTriageStarted,
            Self::ExecutionPlanCreated { .. } => AuditAction::ExecutionPlanCreated,
            Self::ClassificationStarted { .. } => AuditAction::ClassificationStarted,
            Self::AgentClassified { .. } => AuditAction::AgentClassified,
            Self::KbRetrievalStarted { .. } => AuditAction::KbRetrievalStarted,
            Self::KbRetrieved { .. } => AuditAction::KbRetrieved,
            Self::DraftGenerationStarted { .. } => AuditAction::DraftGenerationStarted,
            Self::DraftGenerated { .. } => AuditAction::DraftGenerated,
            Self::DecisionEvaluationStarted { .. } => AuditAction::DecisionEvaluationStarted,
            Self::AutoClosed { .. } => AuditAction::AutoClosed,
            Self::AssignedToHuman { .. } => AuditAction::AssignedToHuman,
            Self::DecisionSkipped { .. } => AuditAction::DecisionSkipped,
            Self::AgentTriageCompleted { .. } => AuditAction::AgentTriageCompleted,
            Self::AgentTriageFailed { .. } => AuditAction::AgentTriageFailed,
            Self::SatisfactionCheck { .. } => AuditAction::SatisfactionCheck,
            Self::SatisfactionCheckFailed { .. } => AuditAction::SatisfactionCheckFailed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: Uuid,
    pub ticket_id: Uuid,
    pub trace_id: Uuid,
    pub actor: Actor,
    #[serde(flatten)]
    pub event: AuditEvent,
    pub timestamp: DateTime<Utc>,
}

impl AuditLogEntry {
    pub fn new(ticket_id: Uuid, trace_id: Uuid, event: AuditEvent) -> Self {
        Self {
            id: Uuid::new_v4(),
            ticket_id,
            trace_id,
            actor: Actor::System,
            event,
            timestamp: Utc::now(),
        }
    }

    pub fn with_actor(mut self, actor: Actor) -> Self {
        self.actor = actor;
        self
    }

    pub fn action(&self) -> AuditAction {
        self.event.action()
    }
}

/// Append-only writer for the triage trail. Write failures are logged and
/// swallowed so that auditing can never fail a triage run.
#[derive(Clone)]
pub struct AuditLogger {
    store: Arc<dyn AuditStore>,
}

impl AuditLogger {
    pub fn new(store: Arc<dyn AuditStore>) -> Self {
        Self { store }
    }

    pub async fn log(&self, entry: AuditLogEntry) {
        debug!(
            "AUDIT: action={} ticket={} trace={} actor={}",
            entry.action(),
            entry.ticket_id,
            entry.trace_id,
            entry.actor
        );

        if let Err(e) = self.store.append(entry.clone()).await {
            let err = TriageError::AuditWrite(e.to_string());
            error!(
                "Failed to log action {} for ticket {}: {}",
                entry.action(),
                entry.ticket_id,
                err
            );
        }
    }

    pub async fn system(&self, ticket_id: Uuid, trace_id: Uuid, event: AuditEvent) {
        self.log(AuditLogEntry::new(ticket_id, trace_id, event)).await;
    }
}

pub async fn get_ticket_audit(
    State(state): State<Arc<AppState>>,
    Path(ticket_id): Path<Uuid>,
) -> Result<Json<Vec<AuditLogEntry>>, TriageError> {
    let entries = state.stores.audit.find_for_ticket(ticket_id).await?;
    Ok(Json(entries))
}

pub fn configure_audit_routes() -> Router<Arc<AppState>> {
    Router::new().route("/api/audit/tickets/:ticket_id", get(get_ticket_audit))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::shared::error::StoreError;
    use async_trait::async_trait;

    struct FailingAuditStore;

    #[async_trait]
    impl AuditStore for FailingAuditStore {
        async fn append(&self, _entry: AuditLogEntry) -> Result<(), StoreError> {
            Err(StoreError::Backend("disk full".to_string()))
        }

        async fn find_for_ticket(&self, _ticket_id: Uuid) -> Result<Vec<AuditLogEntry>, StoreError> {
            Ok(Vec::new())
        }

        async fn find_by_trace(&self, _trace_id: Uuid) -> Result<Vec<AuditLogEntry>, StoreError> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn test_entry_serializes_action_and_meta() {
        let entry = AuditLogEntry::new(
            Uuid::nil(),
            Uuid::nil(),
            AuditEvent::AssignedToHuman {
                reason: HandoffReason::LowConfidence,
                confidence: 0.5,
                threshold: 0.8,
                requires_human_review: true,
            },
        );

        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["action"], "ASSIGNED_TO_HUMAN");
        assert_eq!(json["meta"]["reason"], "low_confidence");
        assert_eq!(json["actor"], "system");

        let back: AuditLogEntry = serde_json::from_value(json).unwrap();
        assert_eq!(back, entry);
    }

    #[test]
    fn test_action_names_match_serialized_tags() {
        let event = AuditEvent::SatisfactionCheckFailed {
            error: "boom".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["action"], event.action().as_str());
    }

    #[test]
    fn test_user_actor_round_trips() {
        let id = Uuid::new_v4();
        let json = serde_json::to_string(&Actor::User(id)).unwrap();
        assert_eq!(serde_json::from_str::<Actor>(&json).unwrap(), Actor::User(id));
    }

    #[tokio::test]
    async fn test_logger_swallows_write_failures() {
        let logger = AuditLogger::new(Arc::new(FailingAuditStore));
        logger
            .system(
                Uuid::new_v4(),
                Uuid::new_v4(),
                AuditEvent::SatisfactionCheckFailed {
                    error: "x".to_string(),
                },
            )
            .await;
    }
}
