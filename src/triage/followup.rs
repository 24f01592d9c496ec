use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, error, info};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::audit::{AuditEvent, AuditLogger};
use crate::core::shared::error::StoreError;
use crate::tickets::{TicketStatus, TicketStore};

/// A satisfaction check waiting to fire. One per ticket; scheduling again
/// replaces the earlier one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingFollowUp {
    pub ticket_id: Uuid,
    pub due_at: DateTime<Utc>,
    pub scheduled_at: DateTime<Utc>,
}

#[async_trait]
pub trait FollowUpStore: Send + Sync {
    async fn put(&self, follow_up: PendingFollowUp) -> Result<(), StoreError>;

    async fn remove(&self, ticket_id: Uuid) -> Result<Option<PendingFollowUp>, StoreError>;

    /// Follow-ups with `due_at <= now`, earliest first.
    async fn due(&self, now: DateTime<Utc>) -> Result<Vec<PendingFollowUp>, StoreError>;

    async fn pending(&self) -> Result<Vec<PendingFollowUp>, StoreError>;
}

#[derive(Default)]
pub struct InMemoryFollowUpStore {
    follow_ups: RwLock<HashMap<Uuid, PendingFollowUp>>,
}

impl InMemoryFollowUpStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FollowUpStore for InMemoryFollowUpStore {
    async fn put(&self, follow_up: PendingFollowUp) -> Result<(), StoreError> {
        self.follow_ups
            .write()
            .await
            .insert(follow_up.ticket_id, follow_up);
        Ok(())
    }

    async fn remove(&self, ticket_id: Uuid) -> Result<Option<PendingFollowUp>, StoreError> {
        Ok(self.follow_ups.write().await.remove(&ticket_id))
    }

    async fn due(&self, now: DateTime<Utc>) -> Result<Vec<PendingFollowUp>, StoreError> {
        let follow_ups = self.follow_ups.read().await;
        let mut due: Vec<PendingFollowUp> = follow_ups
            .values()
            .filter(|f| f.due_at <= now)
            .cloned()
            .collect();
        due.sort_by_key(|f| f.due_at);
        Ok(due)
    }

    async fn pending(&self) -> Result<Vec<PendingFollowUp>, StoreError> {
        let mut pending: Vec<PendingFollowUp> =
            self.follow_ups.read().await.values().cloned().collect();
        pending.sort_by_key(|f| f.due_at);
        Ok(pending)
    }
}

/// Deferred satisfaction checks for auto-resolved tickets. Pending checks live
/// in a [`FollowUpStore`] and are fired by a polling loop, so a restarted
/// process picks up whatever the previous one left behind.
#[derive(Clone)]
pub struct FollowUpScheduler {
    store: Arc<dyn FollowUpStore>,
    tickets: Arc<dyn TicketStore>,
    audit: AuditLogger,
    delay: Duration,
}

impl FollowUpScheduler {
    pub fn new(
        store: Arc<dyn FollowUpStore>,
        tickets: Arc<dyn TicketStore>,
        audit: AuditLogger,
        delay: Duration,
    ) -> Self {
        Self {
            store,
            tickets,
            audit,
            delay,
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub async fn schedule(&self, ticket_id: Uuid) -> Result<PendingFollowUp, StoreError> {
        let now = Utc::now();
        let delay = chrono::Duration::from_std(self.delay)
            .map_err(|e| StoreError::Backend(format!("invalid follow-up delay: {e}")))?;
        let follow_up = PendingFollowUp {
            ticket_id,
            due_at: now + delay,
            scheduled_at: now,
        };
        self.store.put(follow_up.clone()).await?;
        info!(
            "Satisfaction check for ticket {} scheduled at {}",
            ticket_id, follow_up.due_at
        );
        Ok(follow_up)
    }

    pub async fn cancel(&self, ticket_id: Uuid) -> Result<bool, StoreError> {
        let removed = self.store.remove(ticket_id).await?.is_some();
        if removed {
            debug!("Cancelled satisfaction check for ticket {}", ticket_id);
        }
        Ok(removed)
    }

    pub async fn pending(&self) -> Result<Vec<PendingFollowUp>, StoreError> {
        self.store.pending().await
    }

    /// Fires every follow-up due at `now`. Returns how many were fired.
    pub async fn run_due(&self, now: DateTime<Utc>) -> Result<usize, StoreError> {
        let due = self.store.due(now).await?;
        let mut fired = 0;
        for follow_up in due {
            // Claim before checking so a concurrent poller cannot fire it twice.
            if self.store.remove(follow_up.ticket_id).await?.is_none() {
                continue;
            }
            self.check_satisfaction(follow_up.ticket_id).await;
            fired += 1;
        }
        Ok(fired)
    }

    /// Emits `SATISFACTION_CHECK` if the ticket is still resolved. Idempotent
    /// apart from the audit entry itself.
    pub async fn check_satisfaction(&self, ticket_id: Uuid) {
        let trace_id = Uuid::new_v4();
        match self.tickets.get(ticket_id).await {
            Ok(Some(ticket)) if ticket.status == TicketStatus::Resolved => {
                let minutes_open = (Utc::now() - ticket.created_at).num_minutes();
                let hours_open = (minutes_open as f64 / 60.0).round() as i64;
                self.audit
                    .system(
                        ticket_id,
                        trace_id,
                        AuditEvent::SatisfactionCheck {
                            ticket_status: ticket.status,
                            hours_open,
                        },
                    )
                    .await;
            }
            Ok(Some(ticket)) => {
                debug!(
                    "Skipping satisfaction check for ticket {} in status {}",
                    ticket_id, ticket.status
                );
            }
            Ok(None) => {
                debug!("Skipping satisfaction check for missing ticket {}", ticket_id);
            }
            Err(e) => {
                error!("Satisfaction check failed for ticket {}: {}", ticket_id, e);
                self.audit
                    .system(
                        ticket_id,
                        trace_id,
                        AuditEvent::SatisfactionCheckFailed {
                            error: e.to_string(),
                        },
                    )
                    .await;
            }
        }
    }

    pub fn start(&self, poll_interval: Duration) -> JoinHandle<()> {
        info!(
            "Starting follow-up scheduler (poll every {}s)",
            poll_interval.as_secs()
        );
        let scheduler = self.clone();

        tokio::spawn(async move {
            match scheduler.pending().await {
                Ok(pending) if !pending.is_empty() => {
                    info!("Re-armed {} pending satisfaction checks", pending.len());
                }
                Ok(_) => {}
                Err(e) => error!("Failed to read pending follow-ups: {}", e),
            }

            let mut interval = tokio::time::interval(poll_interval);
            loop {
                interval.tick().await;

                if let Err(e) = scheduler.run_due(Utc::now()).await {
                    error!("Error running due follow-ups: {}", e);
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{AuditAction, AuditStore, InMemoryAuditStore};
    use crate::tickets::{InMemoryTicketStore, Ticket, TicketCategory, TicketPatch};

    struct Fixture {
        tickets: Arc<InMemoryTicketStore>,
        audit: Arc<InMemoryAuditStore>,
        scheduler: FollowUpScheduler,
    }

    fn fixture() -> Fixture {
        let tickets = Arc::new(InMemoryTicketStore::new());
        let audit = Arc::new(InMemoryAuditStore::new());
        let scheduler = FollowUpScheduler::new(
            Arc::new(InMemoryFollowUpStore::new()),
            tickets.clone(),
            AuditLogger::new(audit.clone()),
            Duration::from_secs(24 * 3600),
        );
        Fixture {
            tickets,
            audit,
            scheduler,
        }
    }

    async fn resolved_ticket(tickets: &InMemoryTicketStore) -> Ticket {
        let ticket = tickets
            .insert(Ticket::new("t", "d", TicketCategory::Other, Uuid::nil()))
            .await
            .unwrap();
        tickets
            .update(ticket.id, TicketPatch::status(TicketStatus::Resolved), None)
            .await
            .unwrap()
    }

    async fn actions(audit: &InMemoryAuditStore, ticket_id: Uuid) -> Vec<AuditAction> {
        audit
            .find_for_ticket(ticket_id)
            .await
            .unwrap()
            .iter()
            .map(|e| e.action())
            .collect()
    }

    #[tokio::test]
    async fn test_not_due_before_delay() {
        let f = fixture();
        let ticket = resolved_ticket(&f.tickets).await;
        f.scheduler.schedule(ticket.id).await.unwrap();

        let fired = f
            .scheduler
            .run_due(Utc::now() + chrono::Duration::hours(23))
            .await
            .unwrap();
        assert_eq!(fired, 0);
        assert_eq!(f.scheduler.pending().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_fires_once_for_resolved_ticket() {
        let f = fixture();
        let ticket = resolved_ticket(&f.tickets).await;
        f.scheduler.schedule(ticket.id).await.unwrap();

        let later = Utc::now() + chrono::Duration::hours(25);
        assert_eq!(f.scheduler.run_due(later).await.unwrap(), 1);
        assert_eq!(f.scheduler.run_due(later).await.unwrap(), 0);

        assert_eq!(
            actions(&f.audit, ticket.id).await,
            vec![AuditAction::SatisfactionCheck]
        );
    }

    #[tokio::test]
    async fn test_reopened_ticket_is_skipped() {
        let f = fixture();
        let ticket = resolved_ticket(&f.tickets).await;
        f.scheduler.schedule(ticket.id).await.unwrap();
        f.tickets
            .update(ticket.id, TicketPatch::status(TicketStatus::Open), None)
            .await
            .unwrap();

        f.scheduler
            .run_due(Utc::now() + chrono::Duration::hours(25))
            .await
            .unwrap();
        assert!(actions(&f.audit, ticket.id).await.is_empty());
    }

    #[tokio::test]
    async fn test_deleted_ticket_is_skipped() {
        let f = fixture();
        let ticket = resolved_ticket(&f.tickets).await;
        f.scheduler.schedule(ticket.id).await.unwrap();
        f.tickets.remove(ticket.id).await;

        f.scheduler
            .run_due(Utc::now() + chrono::Duration::hours(25))
            .await
            .unwrap();
        assert!(actions(&f.audit, ticket.id).await.is_empty());
    }

    #[tokio::test]
    async fn test_cancel_removes_pending() {
        let f = fixture();
        let ticket = resolved_ticket(&f.tickets).await;
        f.scheduler.schedule(ticket.id).await.unwrap();

        assert!(f.scheduler.cancel(ticket.id).await.unwrap());
        assert!(!f.scheduler.cancel(ticket.id).await.unwrap());
        assert_eq!(
            f.scheduler
                .run_due(Utc::now() + chrono::Duration::hours(25))
                .await
                .unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn test_store_survives_scheduler_restart() {
        let f = fixture();
        let store: Arc<dyn FollowUpStore> = Arc::new(InMemoryFollowUpStore::new());
        let first = FollowUpScheduler::new(
            store.clone(),
            f.tickets.clone(),
            AuditLogger::new(f.audit.clone()),
            Duration::from_secs(3600),
        );
        let ticket = resolved_ticket(&f.tickets).await;
        first.schedule(ticket.id).await.unwrap();
        drop(first);

        let second = FollowUpScheduler::new(
            store,
            f.tickets.clone(),
            AuditLogger::new(f.audit.clone()),
            Duration::from_secs(3600),
        );
        assert_eq!(
            second
                .run_due(Utc::now() + chrono::Duration::hours(2))
                .await
                .unwrap(),
            1
        );
        assert_eq!(
            actions(&f.audit, ticket.id).await,
            vec![AuditAction::SatisfactionCheck]
        );
    }
}
