use async_trait::async_trait;
use chrono::Utc;
use log::trace;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{Reply, Ticket, TicketPatch, TicketStatus};
use crate::core::shared::error::StoreError;

#[async_trait]
pub trait TicketStore: Send + Sync {
    async fn insert(&self, ticket: Ticket) -> Result<Ticket, StoreError>;

    async fn get(&self, id: Uuid) -> Result<Option<Ticket>, StoreError>;

    /// Tickets matching the optional filters, newest first.
    async fn list(
        &self,
        status: Option<TicketStatus>,
        created_by: Option<Uuid>,
    ) -> Result<Vec<Ticket>, StoreError>;

    /// Applies `patch` atomically. With `expected_version` set the update only
    /// succeeds if the stored ticket still has that version.
    async fn update(
        &self,
        id: Uuid,
        patch: TicketPatch,
        expected_version: Option<u64>,
    ) -> Result<Ticket, StoreError>;

    async fn append_reply(&self, id: Uuid, reply: Reply) -> Result<Ticket, StoreError>;
}

#[derive(Default)]
pub struct InMemoryTicketStore {
    tickets: RwLock<HashMap<Uuid, Ticket>>,
}

impl InMemoryTicketStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn remove(&self, id: Uuid) -> Option<Ticket> {
        self.tickets.write().await.remove(&id)
    }
}

#[async_trait]
impl TicketStore for InMemoryTicketStore {
    async fn insert(&self, mut ticket: Ticket) -> Result<Ticket, StoreError> {
        ticket.version = 0;
        let mut tickets = self.tickets.write().await;
        tickets.insert(ticket.id, ticket.clone());
        Ok(ticket)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Ticket>, StoreError> {
        Ok(self.tickets.read().await.get(&id).cloned())
    }

    async fn list(
        &self,
        status: Option<TicketStatus>,
        created_by: Option<Uuid>,
    ) -> Result<Vec<Ticket>, StoreError> {
        let tickets = self.tickets.read().await;
        let mut matching: Vec<Ticket> = tickets
            .values()
            .filter(|t| status.map_or(true, |s| t.status == s))
            .filter(|t| created_by.map_or(true, |id| t.created_by == id))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(matching)
    }

    async fn update(
        &self,
        id: Uuid,
        patch: TicketPatch,
        expected_version: Option<u64>,
    ) -> Result<Ticket, StoreError> {
        let mut tickets = self.tickets.write().await;
        let ticket = tickets
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("ticket {id}")))?;

        if let Some(expected) = expected_version {
            if ticket.version != expected {
                return Err(StoreError::Conflict {
                    id: id.to_string(),
                    expected,
                    actual: ticket.version,
                });
            }
        }

        patch.apply(ticket);
        ticket.version += 1;
        ticket.updated_at = Utc::now();
        trace!("Ticket {} now at version {}", id, ticket.version);

        Ok(ticket.clone())
    }

    async fn append_reply(&self, id: Uuid, reply: Reply) -> Result<Ticket, StoreError> {
        self.update(id, TicketPatch::default().with_reply(reply), None)
            .await
    }
}
