//! Core types and abstractions for the task orchestrator.
//!
//! This crate provides the foundational types, traits, and error handling
//! used across all orchestrator components: the dynamic `Value` payload
//! type, the domain model (`Task`, `Workflow`, `Step`, `ExecutionContext`,
//! `AgentRecord`, `StateVersion`, `Checkpoint`, `Message`), the seam traits
//! (`Agent`, `StateStore`, `CheckpointStore`), and configuration.

pub mod cancellation;
pub mod config;
pub mod error;
pub mod id;
pub mod traits;
pub mod types;
pub mod value;

pub use cancellation::CancellationFlag;
pub use config::OrchestratorConfig;
pub use error::{OrchError, Result};
pub use id::OrchId;
pub use traits::{Agent, CheckpointStore, HealthReport, StateStore};
pub use types::*;
pub use value::{Map, Value};

/// Re-export of the commonly used types, for a single `use orch_core::prelude::*;`.
pub mod prelude {
    pub use crate::cancellation::CancellationFlag;
    pub use crate::config::OrchestratorConfig;
    pub use crate::error::{OrchError, Result};
    pub use crate::id::OrchId;
    pub use crate::traits::{Agent, CheckpointStore, HealthReport, StateStore};
    pub use crate::types::*;
    pub use crate::value::{Map, Value};
}
