use std::sync::Arc;
use std::time::Instant;

use crate::audit::{AuditStore, InMemoryAuditStore};
use crate::core::config::{AppConfig, ConfigStore, InMemoryConfigStore};
use crate::kb::{ArticleStore, InMemoryArticleStore};
use crate::tickets::{InMemoryTicketStore, TicketStore};
use crate::triage::followup::{FollowUpScheduler, FollowUpStore, InMemoryFollowUpStore};
use crate::triage::suggestion::{InMemorySuggestionStore, SuggestionStore};
use crate::triage::{TriagePipeline, WorkDispatcher};

/// Store handles shared by the HTTP layer and the triage pipeline.
#[derive(Clone)]
pub struct Stores {
    pub tickets: Arc<dyn TicketStore>,
    pub articles: Arc<dyn ArticleStore>,
    pub suggestions: Arc<dyn SuggestionStore>,
    pub audit: Arc<dyn AuditStore>,
    pub config: Arc<dyn ConfigStore>,
    pub follow_ups: Arc<dyn FollowUpStore>,
}

impl Stores {
    pub fn in_memory() -> Self {
        Self {
            tickets: Arc::new(InMemoryTicketStore::new()),
            articles: Arc::new(InMemoryArticleStore::new()),
            suggestions: Arc::new(InMemorySuggestionStore::new()),
            audit: Arc::new(InMemoryAuditStore::new()),
            config: Arc::new(InMemoryConfigStore::new()),
            follow_ups: Arc::new(InMemoryFollowUpStore::new()),
        }
    }
}

pub struct AppState {
    pub config: AppConfig,
    pub stores: Stores,
    pub pipeline: Arc<TriagePipeline>,
    pub dispatcher: Arc<dyn WorkDispatcher>,
    pub follow_ups: FollowUpScheduler,
    pub started_at: Instant,
}
