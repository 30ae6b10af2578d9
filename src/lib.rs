//! tfconverge - Terraform module convergence verification
//!
//! Drives a module through an ordered list of variable variants against one
//! shared state, proving after each apply that a re-plan is empty, and tears
//! the state down exactly once at the end.

pub mod cache;
pub mod engine;
pub mod output;
pub mod scenario;
pub mod sequencer;
pub mod session;
pub mod summary;
pub mod verify;

mod error;

pub use engine::terraform::{TerraformEngine, TerraformError};
pub use engine::{CommandOutput, Engine, EngineConfig, EngineError, EngineOptions, Variables};
pub use error::TfConvergeError;
pub use scenario::{ConfigError, Scenario, Variant};
pub use sequencer::{
    ScenarioError, ScenarioOutcome, ScenarioReport, SequenceState, VariantFailure, VariantReport,
    VariantSequencer, run_scenarios,
};
pub use session::{Operation, ProvisioningSession, StepError};
pub use summary::{ChangeSummary, ParseError};
