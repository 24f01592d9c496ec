use log::{error, info};
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

use super::classifier::{Classification, Classifier};
use super::decision::DecisionEngine;
use super::drafter::{readability_score, Draft, Drafter};
use super::followup::FollowUpScheduler;
use super::plan::{planner_steps, Complexity, ExecutionPlan};
use super::retriever::{Retrieval, Retriever};
use super::suggestion::{ModelInfo, Suggestion, SuggestionStore, PROMPT_VERSION};
use crate::audit::{AuditEvent, AuditLogger};
use crate::core::shared::error::{PipelineStage, TriageError};
use crate::core::shared::state::Stores;
use crate::tickets::{Ticket, TicketStore};

const SEARCH_PREVIEW_CHARS: usize = 100;

/// Runs classification, retrieval, drafting and the decision for one ticket,
/// writing every step to the audit trail under a single trace id.
pub struct TriagePipeline {
    tickets: Arc<dyn TicketStore>,
    suggestions: Arc<dyn SuggestionStore>,
    classifier: Arc<dyn Classifier>,
    retriever: Retriever,
    drafter: Arc<dyn Drafter>,
    decision: DecisionEngine,
    audit: AuditLogger,
}

impl TriagePipeline {
    pub fn new(
        stores: &Stores,
        classifier: Arc<dyn Classifier>,
        drafter: Arc<dyn Drafter>,
        follow_ups: FollowUpScheduler,
    ) -> Self {
        let audit = AuditLogger::new(stores.audit.clone());
        Self {
            tickets: stores.tickets.clone(),
            suggestions: stores.suggestions.clone(),
            classifier,
            retriever: Retriever::new(stores.articles.clone()),
            drafter,
            decision: DecisionEngine::new(
                stores.tickets.clone(),
                stores.suggestions.clone(),
                stores.config.clone(),
                audit.clone(),
                follow_ups,
            ),
            audit,
        }
    }

    pub async fn triage_ticket(&self, ticket_id: Uuid) -> Result<Suggestion, TriageError> {
        let trace_id = Uuid::new_v4();
        let started = Instant::now();
        info!("Starting triage for ticket {} (trace {})", ticket_id, trace_id);

        self.audit
            .system(
                ticket_id,
                trace_id,
                AuditEvent::AgentTriageStarted {
                    trace_id,
                    planner_steps: planner_steps(),
                },
            )
            .await;

        match self.run(ticket_id, trace_id, started).await {
            Ok(suggestion) => Ok(suggestion),
            Err(e) => {
                error!("Triage failed for ticket {}: {}", ticket_id, e);
                let stage = match &e {
                    TriageError::Upstream { stage, .. } => Some(*stage),
                    _ => None,
                };
                self.audit
                    .system(
                        ticket_id,
                        trace_id,
                        AuditEvent::AgentTriageFailed {
                            error: e.truncated_detail(),
                            stage,
                        },
                    )
                    .await;
                Err(e)
            }
        }
    }

    async fn run(
        &self,
        ticket_id: Uuid,
        trace_id: Uuid,
        started: Instant,
    ) -> Result<Suggestion, TriageError> {
        let ticket = self
            .tickets
            .get(ticket_id)
            .await?
            .ok_or_else(|| TriageError::NotFound(format!("ticket {ticket_id}")))?;

        let plan = ExecutionPlan::for_ticket(&ticket);
        self.audit
            .system(
                ticket_id,
                trace_id,
                AuditEvent::ExecutionPlanCreated {
                    plan: plan.clone(),
                    ticket_length: ticket.description.chars().count(),
                    has_attachments: !ticket.attachment_urls.is_empty(),
                },
            )
            .await;

        let classification = self.classify(trace_id, &ticket).await?;
        let retrieval = self.retrieve(trace_id, &ticket, &classification).await?;
        let draft = self
            .draft(trace_id, &ticket, &retrieval, plan.complexity)
            .await?;

        let mut suggestion = self
            .suggestions
            .create(Suggestion::new(
                ticket_id,
                classification.predicted_category,
                retrieval.article_ids(),
                draft.draft_reply,
                classification.confidence,
                ModelInfo {
                    provider: self.drafter.provider_name().to_string(),
                    model: self.drafter.model_name().to_string(),
                    prompt_version: PROMPT_VERSION.to_string(),
                    latency_ms: elapsed_ms(started),
                },
            ))
            .await?;

        let outcome = self
            .decision
            .decide(trace_id, &ticket, &mut suggestion)
            .await?;

        self.audit
            .system(
                ticket_id,
                trace_id,
                AuditEvent::AgentTriageCompleted {
                    suggestion_id: suggestion.id,
                    total_latency_ms: elapsed_ms(started),
                    final_status: outcome.ticket.status,
                    auto_resolved: outcome.auto_resolved(),
                },
            )
            .await;

        info!(
            "Triage completed for ticket {}: {} ({:.2}), status {}",
            ticket_id, suggestion.predicted_category, suggestion.confidence, outcome.ticket.status
        );
        Ok(suggestion)
    }

    async fn classify(
        &self,
        trace_id: Uuid,
        ticket: &Ticket,
    ) -> Result<Classification, TriageError> {
        let text = ticket.triage_text();
        self.audit
            .system(
                ticket.id,
                trace_id,
                AuditEvent::ClassificationStarted {
                    text_length: text.chars().count(),
                    original_category: ticket.category,
                },
            )
            .await;

        let started = Instant::now();
        let classification = self
            .classifier
            .classify(&text)
            .await
            .map_err(|e| at_stage(PipelineStage::Classification, e))?;

        self.audit
            .system(
                ticket.id,
                trace_id,
                AuditEvent::AgentClassified {
                    predicted_category: classification.predicted_category,
                    confidence: classification.confidence,
                    original_category: ticket.category,
                    category_changed: classification.predicted_category != ticket.category,
                    latency_ms: elapsed_ms(started),
                },
            )
            .await;

        Ok(classification)
    }

    async fn retrieve(
        &self,
        trace_id: Uuid,
        ticket: &Ticket,
        classification: &Classification,
    ) -> Result<Retrieval, TriageError> {
        let preview: String = ticket
            .triage_text()
            .chars()
            .take(SEARCH_PREVIEW_CHARS)
            .collect();
        self.audit
            .system(
                ticket.id,
                trace_id,
                AuditEvent::KbRetrievalStarted {
                    search_query: format!("{preview}..."),
                    predicted_category: classification.predicted_category,
                },
            )
            .await;

        let started = Instant::now();
        let retrieval = self
            .retriever
            .retrieve(ticket, classification)
            .await
            .map_err(|e| TriageError::upstream(PipelineStage::Retrieval, e))?;

        self.audit
            .system(
                ticket.id,
                trace_id,
                AuditEvent::KbRetrieved {
                    articles_found: retrieval.articles.len(),
                    article_ids: retrieval.article_ids(),
                    search_method: retrieval.strategy,
                    latency_ms: elapsed_ms(started),
                    average_score: retrieval.average_score(),
                },
            )
            .await;

        Ok(retrieval)
    }

    async fn draft(
        &self,
        trace_id: Uuid,
        ticket: &Ticket,
        retrieval: &Retrieval,
        complexity: Complexity,
    ) -> Result<Draft, TriageError> {
        self.audit
            .system(
                ticket.id,
                trace_id,
                AuditEvent::DraftGenerationStarted {
                    article_count: retrieval.articles.len(),
                    ticket_complexity: complexity,
                },
            )
            .await;

        let started = Instant::now();
        let draft = self
            .drafter
            .draft(&ticket.triage_text(), &retrieval.articles)
            .await
            .map_err(|e| at_stage(PipelineStage::Drafting, e))?;

        self.audit
            .system(
                ticket.id,
                trace_id,
                AuditEvent::DraftGenerated {
                    draft_length: draft.draft_reply.chars().count(),
                    citations_count: draft.citations.len(),
                    latency_ms: elapsed_ms(started),
                    readability_score: readability_score(&draft.draft_reply),
                },
            )
            .await;

        Ok(draft)
    }
}

fn at_stage(stage: PipelineStage, err: TriageError) -> TriageError {
    match err {
        TriageError::Upstream { .. } => err,
        other => TriageError::upstream(stage, other),
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
