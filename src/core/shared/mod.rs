pub mod error;
pub mod state;

pub use error::{PipelineStage, StoreError, TriageError};
pub use state::{AppState, Stores};
