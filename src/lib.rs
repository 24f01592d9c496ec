pub mod api_router;
pub mod audit;
pub mod core;
pub mod kb;
pub mod llm;
pub mod main_module;
pub mod tickets;
pub mod triage;

pub use crate::core::config::AppConfig;
pub use crate::core::shared::error::{StoreError, TriageError};
pub use crate::core::shared::state::{AppState, Stores};
