//! provision - scaffold, publish and deploy a Hono edge worker in one resumable run

pub mod cli;
pub mod core;
pub mod execution;
pub mod host;
pub mod persistence;
pub mod process;
pub mod steps;

// Re-export commonly used types
pub use core::{
    PipelineContext, ProvisionConfig, ProvisionError, RecoveryMode, RunResult, RunStatus, Step,
    StepFailure, StepState,
};
pub use execution::{ExecutionEngine, ExecutionEvent};
pub use host::{GitHubClient, SourceHost};
pub use process::{CommandRunner, TokioCommandRunner};
pub use steps::standard_catalog;
