//! Pipeline Module - Orchestration & Lifecycle
//!
//! ## Structure
//! - `shutdown.rs` - ShutdownCoordinator, PipelineState, bounded joins
//! - `orchestrator.rs` - consumer loop, source selection, Pipeline

pub mod orchestrator;
pub mod shutdown;


pub use orchestrator::{
    run_consumer, select_source, ConsumerSettings, ConsumerStats, Pipeline, RunSummary,
};
pub use shutdown::{PipelineState, ShutdownCoordinator, ShutdownSignal};
