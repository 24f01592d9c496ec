//! API Router
//!
//! Combines the endpoints of every module into one router.

use axum::{routing::get, Router};
use std::sync::Arc;

use crate::core::shared::state::AppState;

pub fn configure_api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/health", get(crate::main_module::health_check))
        // ===== Tickets =====
        .merge(crate::tickets::configure_tickets_routes())
        // ===== Triage agent =====
        .merge(crate::triage::configure_agent_routes())
        // ===== Audit trail =====
        .merge(crate::audit::configure_audit_routes())
        // ===== Triage config =====
        .merge(crate::core::config::configure_config_routes())
        // ===== Knowledge base =====
        .merge(crate::kb::configure_kb_routes())
}
