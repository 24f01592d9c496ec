//! Application initialization: logging, stores, pipeline and background services

use log::{info, warn};
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;

use crate::audit::AuditLogger;
use crate::core::config::AppConfig;
use crate::core::shared::state::{AppState, Stores};
use crate::kb::seed::seed_knowledge_base;
use crate::kb::InMemoryArticleStore;
use crate::triage::{build_stages, select_dispatcher, FollowUpScheduler, TriagePipeline};

pub fn init_logging() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
}

/// In-memory stores, with the sample articles loaded when `seed_kb` is set.
pub async fn init_stores(config: &AppConfig) -> Stores {
    let articles = Arc::new(InMemoryArticleStore::new());
    if config.seed_kb {
        if let Err(e) = seed_knowledge_base(&articles).await {
            warn!("Failed to seed knowledge base: {}", e);
        }
    }

    Stores {
        articles,
        ..Stores::in_memory()
    }
}

/// Wires the pipeline and picks a dispatcher. The returned handles are the
/// queue workers, if any.
pub async fn create_app_state(
    config: AppConfig,
    stores: Stores,
) -> (Arc<AppState>, Vec<JoinHandle<()>>) {
    let follow_ups = FollowUpScheduler::new(
        stores.follow_ups.clone(),
        stores.tickets.clone(),
        AuditLogger::new(stores.audit.clone()),
        config.follow_up.delay,
    );

    let (classifier, drafter) = build_stages(&config.llm);
    let pipeline = Arc::new(TriagePipeline::new(
        &stores,
        classifier,
        drafter,
        follow_ups.clone(),
    ));

    let (dispatcher, workers) = select_dispatcher(&config.queue, pipeline.clone()).await;
    info!("Triage dispatcher: {}", dispatcher.kind());

    let state = Arc::new(AppState {
        config,
        stores,
        pipeline,
        dispatcher,
        follow_ups,
        started_at: Instant::now(),
    });
    (state, workers)
}

pub fn start_background_services(app_state: &AppState) -> JoinHandle<()> {
    app_state
        .follow_ups
        .start(app_state.config.follow_up.poll_interval)
}
