//! Job model, state machine, and store.

pub mod model;
pub mod store;

pub use model::{AnalyzeRequest, JobRecord, JobState, JobView, PRIMARY_FETCH_PROGRESS, SubTask};
pub use store::JobStore;
