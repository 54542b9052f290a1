//! Core domain models for provisioning
//!
//! This module defines the step abstraction, the per-run context, run
//! state, configuration, the error taxonomy and the file templates.

pub mod config;
pub mod context;
pub mod error;
pub mod state;
pub mod step;
pub mod template;

pub use config::{Credentials, ProvisionConfig, RecoveryMode, Secret, Settings};
pub use context::*;
pub use error::*;
pub use state::*;
pub use step::*;
