pub mod identity;
pub mod mapping;
mod models;
mod orchestrator;
mod service;
mod session;
mod traits;


pub use models::*;
pub use orchestrator::SyncOrchestrator;
pub use service::{
    PositionsReport, PreviewAction, PreviewItem, ReconciliationReport, ReconciliationService,
    SyncOptions,
};
pub use session::{BrokerSessionService, BROKER_NAME};
pub use traits::*;
