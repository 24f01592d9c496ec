pub mod store;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use chrono::{DateTime, Utc};
use log::{error, info};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

use crate::core::shared::error::TriageError;
use crate::core::shared::state::AppState;

pub use store::{InMemoryTicketStore, TicketStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketCategory {
    Billing,
    Tech,
    Shipping,
    #[default]
    Other,
}

impl TicketCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Billing => "billing",
            Self::Tech => "tech",
            Self::Shipping => "shipping",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for TicketCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TicketCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "billing" => Ok(Self::Billing),
            "tech" => Ok(Self::Tech),
            "shipping" => Ok(Self::Shipping),
            "other" => Ok(Self::Other),
            other => Err(format!("unknown ticket category: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    #[default]
    Open,
    Triaged,
    WaitingHuman,
    Resolved,
    Closed,
}

impl TicketStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Triaged => "triaged",
            Self::WaitingHuman => "waiting_human",
            Self::Resolved => "resolved",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    /// `None` for replies written by the triage assistant.
    pub author_id: Option<Uuid>,
    pub content: String,
    pub is_agent: bool,
    pub created_at: DateTime<Utc>,
}

impl Reply {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            author_id: None,
            content: content.into(),
            is_agent: true,
            created_at: Utc::now(),
        }
    }

    pub fn from_user(author_id: Uuid, content: impl Into<String>, is_agent: bool) -> Self {
        Self {
            author_id: Some(author_id),
            content: content.into(),
            is_agent,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub category: TicketCategory,
    pub status: TicketStatus,
    pub created_by: Uuid,
    pub assignee_id: Option<Uuid>,
    pub agent_suggestion_id: Option<Uuid>,
    pub attachment_urls: Vec<String>,
    pub replies: Vec<Reply>,
    /// Bumped by the store on every mutation; used for compare-and-set updates.
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Ticket {
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        category: TicketCategory,
        created_by: Uuid,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            description: description.into(),
            category,
            status: TicketStatus::Open,
            created_by,
            assignee_id: None,
            agent_suggestion_id: None,
            attachment_urls: Vec::new(),
            replies: Vec::new(),
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_attachments(mut self, urls: Vec<String>) -> Self {
        self.attachment_urls = urls;
        self
    }

    /// Text fed to classification, retrieval and drafting.
    pub fn triage_text(&self) -> String {
        format!("{} {}", self.title, self.description)
    }
}

/// Partial update applied atomically by a [`TicketStore`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TicketPatch {
    pub status: Option<TicketStatus>,
    pub assignee_id: Option<Uuid>,
    pub agent_suggestion_id: Option<Uuid>,
    pub reply: Option<Reply>,
}

impl TicketPatch {
    pub fn status(status: TicketStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn with_suggestion(mut self, suggestion_id: Uuid) -> Self {
        self.agent_suggestion_id = Some(suggestion_id);
        self
    }

    pub fn with_reply(mut self, reply: Reply) -> Self {
        self.reply = Some(reply);
        self
    }

    pub(crate) fn apply(self, ticket: &mut Ticket) {
        if let Some(status) = self.status {
            ticket.status = status;
        }
        if let Some(assignee_id) = self.assignee_id {
            ticket.assignee_id = Some(assignee_id);
        }
        if let Some(suggestion_id) = self.agent_suggestion_id {
            ticket.agent_suggestion_id = Some(suggestion_id);
        }
        if let Some(reply) = self.reply {
            ticket.replies.push(reply);
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateTicketRequest {
    pub title: String,
    pub description: String,
    pub category: Option<TicketCategory>,
    pub attachment_urls: Option<Vec<String>>,
    pub created_by: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct CreateReplyRequest {
    pub content: String,
    pub author_id: Uuid,
    pub is_agent: Option<bool>,
}

/// `my=true` narrows the list to tickets created by `user_id`.
#[derive(Debug, Default, Deserialize)]
pub struct TicketQuery {
    pub status: Option<TicketStatus>,
    pub my: Option<bool>,
    pub user_id: Option<Uuid>,
}

impl TicketQuery {
    fn created_by(&self) -> Result<Option<Uuid>, TriageError> {
        if !self.my.unwrap_or(false) {
            return Ok(None);
        }
        self.user_id
            .map(Some)
            .ok_or_else(|| TriageError::Validation("my=true requires user_id".to_string()))
    }
}

#[derive(Debug, Deserialize)]
pub struct AssignTicketRequest {
    pub assignee_id: Uuid,
}

pub async fn create_ticket(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateTicketRequest>,
) -> Result<(StatusCode, Json<Ticket>), TriageError> {
    if req.title.trim().is_empty() || req.description.trim().is_empty() {
        return Err(TriageError::Validation(
            "title and description are required".to_string(),
        ));
    }

    let ticket = Ticket::new(
        req.title,
        req.description,
        req.category.unwrap_or_default(),
        req.created_by.unwrap_or_else(Uuid::nil),
    )
    .with_attachments(req.attachment_urls.unwrap_or_default());

    let ticket = state.stores.tickets.insert(ticket).await?;
    info!("Created ticket {}", ticket.id);

    // Triage runs out of band; creation never waits on the pipeline.
    if let Err(e) = state.dispatcher.dispatch(ticket.id).await {
        error!("Failed to dispatch triage for ticket {}: {}", ticket.id, e);
    }

    Ok((StatusCode::CREATED, Json(ticket)))
}

pub async fn list_tickets(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TicketQuery>,
) -> Result<Json<Vec<Ticket>>, TriageError> {
    let created_by = query.created_by()?;
    let tickets = state.stores.tickets.list(query.status, created_by).await?;
    Ok(Json(tickets))
}

pub async fn get_ticket(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Ticket>, TriageError> {
    state
        .stores
        .tickets
        .get(id)
        .await?
        .map(Json)
        .ok_or_else(|| TriageError::NotFound(format!("ticket {id}")))
}

/// Any human reply resolves the ticket.
pub async fn add_reply(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<CreateReplyRequest>,
) -> Result<Json<Ticket>, TriageError> {
    if req.content.trim().is_empty() {
        return Err(TriageError::Validation("content is required".to_string()));
    }

    let reply = Reply::from_user(req.author_id, req.content, req.is_agent.unwrap_or(false));
    let patch = TicketPatch::status(TicketStatus::Resolved).with_reply(reply);
    let ticket = state.stores.tickets.update(id, patch, None).await?;

    Ok(Json(ticket))
}

pub async fn assign_ticket(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<AssignTicketRequest>,
) -> Result<Json<Ticket>, TriageError> {
    let patch = TicketPatch {
        assignee_id: Some(req.assignee_id),
        ..TicketPatch::default()
    };
    let ticket = state.stores.tickets.update(id, patch, None).await?;

    Ok(Json(ticket))
}

pub fn configure_tickets_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/tickets", get(list_tickets).post(create_ticket))
        .route("/api/tickets/:id", get(get_ticket))
        .route("/api/tickets/:id/replies", post(add_reply))
        .route("/api/tickets/:id/assign", put(assign_ticket))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_round_trips_through_str() {
        for category in [
            TicketCategory::Billing,
            TicketCategory::Tech,
            TicketCategory::Shipping,
            TicketCategory::Other,
        ] {
            assert_eq!(category.as_str().parse::<TicketCategory>(), Ok(category));
        }
        assert!("hardware".parse::<TicketCategory>().is_err());
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&TicketStatus::WaitingHuman).unwrap();
        assert_eq!(json, "\"waiting_human\"");
    }

    #[test]
    fn test_patch_appends_reply_and_sets_status() {
        let mut ticket = Ticket::new("t", "d", TicketCategory::Other, Uuid::new_v4());
        let suggestion_id = Uuid::new_v4();

        TicketPatch::status(TicketStatus::Resolved)
            .with_suggestion(suggestion_id)
            .with_reply(Reply::system("done"))
            .apply(&mut ticket);

        assert_eq!(ticket.status, TicketStatus::Resolved);
        assert_eq!(ticket.agent_suggestion_id, Some(suggestion_id));
        assert_eq!(ticket.replies.len(), 1);
        assert!(ticket.replies[0].author_id.is_none());
        assert!(ticket.replies[0].is_agent);
    }

    #[test]
    fn test_my_filter_needs_user_id() {
        let query = TicketQuery {
            my: Some(true),
            ..TicketQuery::default()
        };
        assert!(matches!(query.created_by(), Err(TriageError::Validation(_))));

        let user = Uuid::new_v4();
        let query = TicketQuery {
            my: Some(true),
            user_id: Some(user),
            ..TicketQuery::default()
        };
        assert_eq!(query.created_by().unwrap(), Some(user));

        let query = TicketQuery {
            user_id: Some(user),
            ..TicketQuery::default()
        };
        assert_eq!(query.created_by().unwrap(), None);
    }

    #[test]
    fn test_triage_text_joins_title_and_description() {
        let ticket = Ticket::new("Refund", "charged twice", TicketCategory::Other, Uuid::nil());
        assert_eq!(ticket.triage_text(), "Refund charged twice");
    }
}
