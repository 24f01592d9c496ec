use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use super::followup::FollowUpScheduler;
use super::suggestion::{Suggestion, SuggestionPatch, SuggestionStore};
use crate::audit::{AuditEvent, AuditLogger};
use crate::core::config::{ConfigStore, TriageConfig};
use crate::core::shared::error::{StoreError, TriageError};
use crate::tickets::{Reply, Ticket, TicketPatch, TicketStatus, TicketStore};

const MAX_UPDATE_ATTEMPTS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandoffReason {
    AutoCloseDisabled,
    LowConfidence,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    AutoClosed,
    AssignedToHuman(HandoffReason),
    /// Someone else changed the ticket status first; their outcome stands.
    Skipped,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DecisionOutcome {
    pub decision: Decision,
    pub ticket: Ticket,
}

impl DecisionOutcome {
    pub fn auto_resolved(&self) -> bool {
        self.decision == Decision::AutoClosed
    }
}

pub struct DecisionEngine {
    tickets: Arc<dyn TicketStore>,
    suggestions: Arc<dyn SuggestionStore>,
    config: Arc<dyn ConfigStore>,
    audit: AuditLogger,
    follow_ups: FollowUpScheduler,
}

impl DecisionEngine {
    pub fn new(
        tickets: Arc<dyn TicketStore>,
        suggestions: Arc<dyn SuggestionStore>,
        config: Arc<dyn ConfigStore>,
        audit: AuditLogger,
        follow_ups: FollowUpScheduler,
    ) -> Self {
        Self {
            tickets,
            suggestions,
            config,
            audit,
            follow_ups,
        }
    }

    async fn load_config(&self) -> Result<TriageConfig, TriageError> {
        match self.config.get_or_create_default().await {
            Ok(config) => Ok(config),
            Err(TriageError::Configuration(msg)) => {
                warn!("Malformed triage config, using defaults: {}", msg);
                Ok(TriageConfig::default())
            }
            Err(e) => Err(TriageError::Decision(e.to_string())),
        }
    }

    /// Resolves or hands off `ticket`, which must be the snapshot the pipeline
    /// loaded. The write is conditional on that snapshot's version.
    pub async fn decide(
        &self,
        trace_id: Uuid,
        ticket: &Ticket,
        suggestion: &mut Suggestion,
    ) -> Result<DecisionOutcome, TriageError> {
        let config = self.load_config().await?;

        self.audit
            .system(
                ticket.id,
                trace_id,
                AuditEvent::DecisionEvaluationStarted {
                    confidence: suggestion.confidence,
                    threshold: config.confidence_threshold,
                    auto_close_enabled: config.auto_close_enabled,
                },
            )
            .await;

        let should_close =
            config.auto_close_enabled && suggestion.confidence >= config.confidence_threshold;

        let patch = if should_close {
            TicketPatch::status(TicketStatus::Resolved)
                .with_suggestion(suggestion.id)
                .with_reply(Reply::system(suggestion.draft_reply.clone()))
        } else {
            TicketPatch::status(TicketStatus::WaitingHuman).with_suggestion(suggestion.id)
        };

        let updated = match self.apply_patch(ticket, patch).await? {
            Some(updated) => updated,
            None => {
                return self.skip(trace_id, ticket).await;
            }
        };

        if should_close {
            self.suggestions
                .update(
                    suggestion.id,
                    SuggestionPatch {
                        auto_closed: Some(true),
                    },
                )
                .await
                .map_err(|e| TriageError::Decision(e.to_string()))?;
            suggestion.auto_closed = true;

            self.audit
                .system(
                    ticket.id,
                    trace_id,
                    AuditEvent::AutoClosed {
                        confidence: suggestion.confidence,
                        threshold: config.confidence_threshold,
                        reply_length: suggestion.draft_reply.chars().count(),
                    },
                )
                .await;

            if let Err(e) = self.follow_ups.schedule(ticket.id).await {
                warn!(
                    "Failed to schedule satisfaction check for ticket {}: {}",
                    ticket.id, e
                );
            }

            info!(
                "Ticket {} auto-closed with confidence {}",
                ticket.id, suggestion.confidence
            );
            return Ok(DecisionOutcome {
                decision: Decision::AutoClosed,
                ticket: updated,
            });
        }

        let reason = if config.auto_close_enabled {
            HandoffReason::LowConfidence
        } else {
            HandoffReason::AutoCloseDisabled
        };

        // A re-triage that hands off supersedes any earlier auto-close.
        if let Err(e) = self.follow_ups.cancel(ticket.id).await {
            warn!(
                "Failed to cancel satisfaction check for ticket {}: {}",
                ticket.id, e
            );
        }

        self.audit
            .system(
                ticket.id,
                trace_id,
                AuditEvent::AssignedToHuman {
                    reason,
                    confidence: suggestion.confidence,
                    threshold: config.confidence_threshold,
                    requires_human_review: true,
                },
            )
            .await;

        info!("Ticket {} assigned to human ({:?})", ticket.id, reason);
        Ok(DecisionOutcome {
            decision: Decision::AssignedToHuman(reason),
            ticket: updated,
        })
    }

    /// Compare-and-set on the ticket version. `None` means a human acted on the
    /// ticket under us and the decision must not be applied.
    async fn apply_patch(
        &self,
        snapshot: &Ticket,
        patch: TicketPatch,
    ) -> Result<Option<Ticket>, TriageError> {
        let mut expected = snapshot.version;

        for attempt in 1..=MAX_UPDATE_ATTEMPTS {
            match self
                .tickets
                .update(snapshot.id, patch.clone(), Some(expected))
                .await
            {
                Ok(ticket) => return Ok(Some(ticket)),
                Err(StoreError::Conflict { actual, .. }) => {
                    let current = self
                        .tickets
                        .get(snapshot.id)
                        .await
                        .map_err(|e| TriageError::Decision(e.to_string()))?
                        .ok_or_else(|| {
                            TriageError::Decision(format!("ticket {} disappeared", snapshot.id))
                        })?;

                    if human_intervened(snapshot, &current) {
                        return Ok(None);
                    }
                    warn!(
                        "Version conflict on ticket {} (attempt {}, now at {})",
                        snapshot.id, attempt, actual
                    );
                    expected = current.version;
                }
                Err(e) => return Err(TriageError::Decision(e.to_string())),
            }
        }

        Err(TriageError::Decision(format!(
            "ticket {} kept changing after {} attempts",
            snapshot.id, MAX_UPDATE_ATTEMPTS
        )))
    }

    async fn skip(&self, trace_id: Uuid, snapshot: &Ticket) -> Result<DecisionOutcome, TriageError> {
        let current = self
            .tickets
            .get(snapshot.id)
            .await
            .map_err(|e| TriageError::Decision(e.to_string()))?
            .ok_or_else(|| TriageError::Decision(format!("ticket {} disappeared", snapshot.id)))?;

        info!(
            "Skipping decision for ticket {}: a human acted first (status {})",
            snapshot.id, current.status
        );
        self.audit
            .system(
                snapshot.id,
                trace_id,
                AuditEvent::DecisionSkipped {
                    current_status: current.status,
                },
            )
            .await;

        Ok(DecisionOutcome {
            decision: Decision::Skipped,
            ticket: current,
        })
    }
}

/// A status change or a new authored reply since `snapshot` is a human outcome.
/// Replies without an author are the assistant's own.
fn human_intervened(snapshot: &Ticket, current: &Ticket) -> bool {
    current.status != snapshot.status
        || current
            .replies
            .iter()
            .skip(snapshot.replies.len())
            .any(|reply| reply.author_id.is_some())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{AuditAction, AuditStore, InMemoryAuditStore};
    use crate::core::config::InMemoryConfigStore;
    use crate::tickets::{InMemoryTicketStore, TicketCategory};
    use crate::triage::followup::InMemoryFollowUpStore;
    use crate::triage::suggestion::{InMemorySuggestionStore, ModelInfo};
    use std::time::Duration;

    struct Fixture {
        tickets: Arc<InMemoryTicketStore>,
        suggestions: Arc<InMemorySuggestionStore>,
        config: Arc<InMemoryConfigStore>,
        audit: Arc<InMemoryAuditStore>,
        follow_ups: FollowUpScheduler,
        engine: DecisionEngine,
    }

    fn fixture() -> Fixture {
        let tickets = Arc::new(InMemoryTicketStore::new());
        let suggestions = Arc::new(InMemorySuggestionStore::new());
        let config = Arc::new(InMemoryConfigStore::new());
        let audit = Arc::new(InMemoryAuditStore::new());
        let logger = AuditLogger::new(audit.clone());
        let follow_ups = FollowUpScheduler::new(
            Arc::new(InMemoryFollowUpStore::new()),
            tickets.clone(),
            logger.clone(),
            Duration::from_secs(3600),
        );
        let engine = DecisionEngine::new(
            tickets.clone(),
            suggestions.clone(),
            config.clone(),
            logger,
            follow_ups.clone(),
        );
        Fixture {
            tickets,
            suggestions,
            config,
            audit,
            follow_ups,
            engine,
        }
    }

    async fn setup(f: &Fixture, confidence: f64) -> (Ticket, Suggestion) {
        let ticket = f
            .tickets
            .insert(Ticket::new("t", "d", TicketCategory::Billing, Uuid::nil()))
            .await
            .unwrap();
        let suggestion = f
            .suggestions
            .create(Suggestion::new(
                ticket.id,
                TicketCategory::Billing,
                Vec::new(),
                "Here is your answer".to_string(),
                confidence,
                ModelInfo {
                    provider: "stub".to_string(),
                    model: "deterministic-v1".to_string(),
                    prompt_version: "1.0".to_string(),
                    latency_ms: 1,
                },
            ))
            .await
            .unwrap();
        (ticket, suggestion)
    }

    async fn enable_auto_close(f: &Fixture) {
        f.config
            .put(TriageConfig {
                auto_close_enabled: true,
                ..TriageConfig::default()
            })
            .await
            .unwrap();
    }

    async fn actions(f: &Fixture, ticket_id: Uuid) -> Vec<AuditAction> {
        f.audit
            .find_for_ticket(ticket_id)
            .await
            .unwrap()
            .iter()
            .map(|e| e.action())
            .collect()
    }

    #[tokio::test]
    async fn test_disabled_auto_close_hands_off() {
        let f = fixture();
        let (ticket, mut suggestion) = setup(&f, 0.95).await;

        let outcome = f
            .engine
            .decide(Uuid::new_v4(), &ticket, &mut suggestion)
            .await
            .unwrap();

        assert_eq!(
            outcome.decision,
            Decision::AssignedToHuman(HandoffReason::AutoCloseDisabled)
        );
        assert_eq!(outcome.ticket.status, TicketStatus::WaitingHuman);
        assert_eq!(outcome.ticket.agent_suggestion_id, Some(suggestion.id));
        assert!(!suggestion.auto_closed);
        assert_eq!(
            actions(&f, ticket.id).await,
            vec![
                AuditAction::DecisionEvaluationStarted,
                AuditAction::AssignedToHuman
            ]
        );
    }

    #[tokio::test]
    async fn test_threshold_is_inclusive() {
        let f = fixture();
        enable_auto_close(&f).await;

        let (low, mut low_suggestion) = setup(&f, 0.79).await;
        let outcome = f
            .engine
            .decide(Uuid::new_v4(), &low, &mut low_suggestion)
            .await
            .unwrap();
        assert_eq!(
            outcome.decision,
            Decision::AssignedToHuman(HandoffReason::LowConfidence)
        );

        let (high, mut high_suggestion) = setup(&f, 0.80).await;
        let outcome = f
            .engine
            .decide(Uuid::new_v4(), &high, &mut high_suggestion)
            .await
            .unwrap();
        assert_eq!(outcome.decision, Decision::AutoClosed);
        assert_eq!(outcome.ticket.status, TicketStatus::Resolved);
        assert!(high_suggestion.auto_closed);
    }

    #[tokio::test]
    async fn test_auto_close_appends_system_reply_and_schedules_follow_up() {
        let f = fixture();
        enable_auto_close(&f).await;
        let (ticket, mut suggestion) = setup(&f, 0.9).await;

        let outcome = f
            .engine
            .decide(Uuid::new_v4(), &ticket, &mut suggestion)
            .await
            .unwrap();

        let reply = outcome.ticket.replies.last().unwrap();
        assert!(reply.is_agent);
        assert!(reply.author_id.is_none());
        assert_eq!(reply.content, "Here is your answer");

        let stored = f
            .suggestions
            .find_latest_for_ticket(ticket.id)
            .await
            .unwrap()
            .unwrap();
        assert!(stored.auto_closed);

        let pending = f.follow_ups.pending().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].ticket_id, ticket.id);
    }

    #[tokio::test]
    async fn test_malformed_config_falls_back_to_defaults() {
        let f = fixture();
        f.config
            .put_document(serde_json::json!({ "confidence_threshold": "oops" }))
            .await;
        let (ticket, mut suggestion) = setup(&f, 0.99).await;

        let outcome = f
            .engine
            .decide(Uuid::new_v4(), &ticket, &mut suggestion)
            .await
            .unwrap();
        assert_eq!(
            outcome.decision,
            Decision::AssignedToHuman(HandoffReason::AutoCloseDisabled)
        );
    }

    #[tokio::test]
    async fn test_human_resolution_is_not_overridden() {
        let f = fixture();
        let (snapshot, mut suggestion) = setup(&f, 0.5).await;

        // A human replies after the pipeline loaded its snapshot.
        f.tickets
            .update(snapshot.id, TicketPatch::status(TicketStatus::Resolved), None)
            .await
            .unwrap();

        let outcome = f
            .engine
            .decide(Uuid::new_v4(), &snapshot, &mut suggestion)
            .await
            .unwrap();

        assert_eq!(outcome.decision, Decision::Skipped);
        assert_eq!(outcome.ticket.status, TicketStatus::Resolved);
        let stored = f.tickets.get(snapshot.id).await.unwrap().unwrap();
        assert_eq!(stored.status, TicketStatus::Resolved);
        assert!(stored.agent_suggestion_id.is_none());
        assert_eq!(
            actions(&f, snapshot.id).await,
            vec![
                AuditAction::DecisionEvaluationStarted,
                AuditAction::DecisionSkipped
            ]
        );
    }

    #[tokio::test]
    async fn test_reply_on_resolved_ticket_is_not_overridden() {
        let f = fixture();
        let (ticket, mut suggestion) = setup(&f, 0.5).await;
        let snapshot = f
            .tickets
            .update(ticket.id, TicketPatch::status(TicketStatus::Resolved), None)
            .await
            .unwrap();

        // The status stays resolved; only the reply list grows.
        f.tickets
            .update(
                snapshot.id,
                TicketPatch::status(TicketStatus::Resolved)
                    .with_reply(Reply::from_user(Uuid::new_v4(), "Still broken", false)),
                None,
            )
            .await
            .unwrap();

        let outcome = f
            .engine
            .decide(Uuid::new_v4(), &snapshot, &mut suggestion)
            .await
            .unwrap();

        assert_eq!(outcome.decision, Decision::Skipped);
        let stored = f.tickets.get(snapshot.id).await.unwrap().unwrap();
        assert_eq!(stored.status, TicketStatus::Resolved);
        assert_eq!(stored.replies.len(), 1);
        assert!(stored.agent_suggestion_id.is_none());
    }

    #[test]
    fn test_system_reply_is_not_human_intervention() {
        let snapshot = Ticket::new("t", "d", TicketCategory::Other, Uuid::nil());
        let mut current = snapshot.clone();
        current.replies.push(Reply::system("draft"));
        assert!(!human_intervened(&snapshot, &current));

        current
            .replies
            .push(Reply::from_user(Uuid::new_v4(), "thanks", false));
        assert!(human_intervened(&snapshot, &current));
    }

    #[tokio::test]
    async fn test_unrelated_change_is_retried() {
        let f = fixture();
        let (snapshot, mut suggestion) = setup(&f, 0.5).await;

        f.tickets
            .update(
                snapshot.id,
                TicketPatch {
                    assignee_id: Some(Uuid::new_v4()),
                    ..TicketPatch::default()
                },
                None,
            )
            .await
            .unwrap();

        let outcome = f
            .engine
            .decide(Uuid::new_v4(), &snapshot, &mut suggestion)
            .await
            .unwrap();

        assert_eq!(outcome.ticket.status, TicketStatus::WaitingHuman);
        assert!(outcome.ticket.assignee_id.is_some());
    }
}
