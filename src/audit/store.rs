use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::AuditLogEntry;
use crate::core::shared::error::StoreError;

#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn append(&self, entry: AuditLogEntry) -> Result<(), StoreError>;

    /// Entries for one ticket, oldest first.
    async fn find_for_ticket(&self, ticket_id: Uuid) -> Result<Vec<AuditLogEntry>, StoreError>;

    async fn find_by_trace(&self, trace_id: Uuid) -> Result<Vec<AuditLogEntry>, StoreError>;
}

#[derive(Default)]
pub struct InMemoryAuditStore {
    entries: RwLock<Vec<AuditLogEntry>>,
}

impl InMemoryAuditStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuditStore for InMemoryAuditStore {
    async fn append(&self, entry: AuditLogEntry) -> Result<(), StoreError> {
        self.entries.write().await.push(entry);
        Ok(())
    }

    async fn find_for_ticket(&self, ticket_id: Uuid) -> Result<Vec<AuditLogEntry>, StoreError> {
        let entries = self.entries.read().await;
        let mut found: Vec<AuditLogEntry> = entries
            .iter()
            .filter(|e| e.ticket_id == ticket_id)
            .cloned()
            .collect();
        // Stable: equal timestamps keep append order.
        found.sort_by_key(|e| e.timestamp);
        Ok(found)
    }

    async fn find_by_trace(&self, trace_id: Uuid) -> Result<Vec<AuditLogEntry>, StoreError> {
        let entries = self.entries.read().await;
        let mut found: Vec<AuditLogEntry> = entries
            .iter()
            .filter(|e| e.trace_id == trace_id)
            .cloned()
            .collect();
        found.sort_by_key(|e| e.timestamp);
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{AuditAction, AuditEvent};

    fn failed(ticket_id: Uuid, trace_id: Uuid, error: &str) -> AuditLogEntry {
        AuditLogEntry::new(
            ticket_id,
            trace_id,
            AuditEvent::SatisfactionCheckFailed {
                error: error.to_string(),
            },
        )
    }

    #[tokio::test]
    async fn test_find_for_ticket_is_chronological() {
        let store = InMemoryAuditStore::new();
        let ticket_id = Uuid::new_v4();
        let trace_id = Uuid::new_v4();

        let mut late = failed(ticket_id, trace_id, "late");
        late.timestamp = late.timestamp + chrono::Duration::seconds(5);
        store.append(late).await.unwrap();
        store.append(failed(ticket_id, trace_id, "early")).await.unwrap();
        store
            .append(failed(Uuid::new_v4(), trace_id, "other ticket"))
            .await
            .unwrap();

        let entries = store.find_for_ticket(ticket_id).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert!(matches!(
            &entries[0].event,
            AuditEvent::SatisfactionCheckFailed { error } if error == "early"
        ));
        assert_eq!(entries[1].action(), AuditAction::SatisfactionCheckFailed);
    }

    #[tokio::test]
    async fn test_find_by_trace_spans_tickets() {
        let store = InMemoryAuditStore::new();
        let trace_id = Uuid::new_v4();
        store.append(failed(Uuid::new_v4(), trace_id, "a")).await.unwrap();
        store.append(failed(Uuid::new_v4(), trace_id, "b")).await.unwrap();
        store
            .append(failed(Uuid::new_v4(), Uuid::new_v4(), "c"))
            .await
            .unwrap();

        assert_eq!(store.find_by_trace(trace_id).await.unwrap().len(), 2);
    }
}
