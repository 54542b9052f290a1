//! Step abstraction

use crate::core::{config::ConfigError, context::PipelineContext, error::ProvisionError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A single unit of the provisioning sequence
///
/// The engine calls [`Step::is_satisfied`] first and only runs
/// [`Step::execute`] when the effect is not already in place. A check may
/// record values in the context (for example the URL of a repository that
/// already exists) so later steps see the same values a fresh run produces.
#[async_trait]
pub trait Step: Send + Sync {
    /// Human-readable step name, used in events and failure reports
    fn name(&self) -> &'static str;

    /// Has the effect of this step already been applied?
    async fn is_satisfied(&self, ctx: &mut PipelineContext) -> Result<bool, ProvisionError>;

    /// Apply the effect
    async fn execute(&self, ctx: &mut PipelineContext) -> Result<(), ProvisionError>;

    /// Undo the effect of a completed `execute`
    async fn compensate(&self, ctx: &mut PipelineContext) -> Result<(), ProvisionError> {
        let _ = ctx;
        Ok(())
    }

    /// Whether `compensate` does anything
    fn has_compensation(&self) -> bool {
        false
    }

    /// Backoff for transient failures; `None` means a single attempt
    fn retry_policy(&self) -> Option<RetryPolicy> {
        None
    }
}

/// Exponential backoff settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 500,
            max_delay_ms: 10_000,
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Delay before retry number `retry` (1-based)
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1) as i32;
        let millis = self.initial_delay_ms as f64 * self.multiplier.powi(exponent);
        let capped = millis.min(self.max_delay_ms as f64);
        Duration::from_millis(capped as u64)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.multiplier < 1.0 {
            return Err(ConfigError::Invalid(
                "retry.multiplier must be at least 1.0".to_string(),
            ));
        }
        if self.max_delay_ms < self.initial_delay_ms {
            return Err(ConfigError::Invalid(
                "retry.max_delay_ms must not be below retry.initial_delay_ms".to_string(),
            ));
        }
        Ok(())
    }
}
