use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::engine::{Engine, EngineError, EngineOptions, Variables};
use crate::summary::{ChangeSummary, ParseError};
use crate::verify;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Init,
    Plan,
    Apply,
    Verify,
    Destroy,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Init => "init",
            Operation::Plan => "plan",
            Operation::Apply => "apply",
            Operation::Verify => "verify",
            Operation::Destroy => "destroy",
        };
        f.write_str(name)
    }
}

/// Failure of a single step. Every variant aborts the scenario; none is retried.
#[derive(Debug, Error)]
pub enum StepError {
    #[error("init failed: {0}")]
    Init(#[source] EngineError),

    #[error("plan failed: {0}")]
    Plan(#[source] EngineError),

    #[error("apply failed: {0}")]
    Apply(#[source] EngineError),

    #[error("destroy failed: {0}")]
    Destroy(#[source] EngineError),

    #[error("unreadable {operation} output: {source}")]
    Parse {
        operation: Operation,
        #[source]
        source: ParseError,
    },

    /// The engine ran cleanly but a re-plan still reports pending changes.
    #[error("not converged: {summary} still pending after apply")]
    Convergence { summary: ChangeSummary },

    #[error("unexpected {operation} result: expected {expected}, got {actual}")]
    UnexpectedChanges {
        operation: Operation,
        expected: ChangeSummary,
        actual: ChangeSummary,
    },

    #[error("scenario task aborted: {0}")]
    Aborted(String),
}

impl StepError {
    pub fn operation(&self) -> Option<Operation> {
        match self {
            StepError::Init(_) => Some(Operation::Init),
            StepError::Plan(_) => Some(Operation::Plan),
            StepError::Apply(_) => Some(Operation::Apply),
            StepError::Destroy(_) => Some(Operation::Destroy),
            StepError::Parse { operation, .. } => Some(*operation),
            StepError::Convergence { .. } => Some(Operation::Verify),
            StepError::UnexpectedChanges { operation, .. } => Some(*operation),
            StepError::Aborted(_) => None,
        }
    }

    /// The offending counts, for failures that carry them.
    pub fn summary(&self) -> Option<ChangeSummary> {
        match self {
            StepError::Convergence { summary } => Some(*summary),
            StepError::UnexpectedChanges { actual, .. } => Some(*actual),
            _ => None,
        }
    }
}

/// Handle binding one module directory and its current variables to an engine.
///
/// A session is owned by exactly one scenario. Its methods take `&self` for
/// reads and `&mut self` only to replace variables, so calls against the same
/// session are sequential by construction.
pub struct ProvisioningSession {
    engine: Arc<dyn Engine>,
    options: EngineOptions,
}

impl ProvisioningSession {
    pub fn new(engine: Arc<dyn Engine>, module_dir: impl Into<PathBuf>, variables: Variables) -> Self {
        Self {
            engine,
            options: EngineOptions {
                module_dir: module_dir.into(),
                variables,
                ..Default::default()
            },
        }
    }

    pub fn with_upgrade(mut self, upgrade: bool) -> Self {
        self.options.upgrade = upgrade;
        self
    }

    pub fn with_env(mut self, env: BTreeMap<String, String>) -> Self {
        self.options.env = env;
        self
    }

    pub fn with_var_files(mut self, var_files: Vec<PathBuf>) -> Self {
        self.options.var_files = var_files;
        self
    }

    pub fn module_dir(&self) -> &Path {
        &self.options.module_dir
    }

    pub fn variables(&self) -> &Variables {
        &self.options.variables
    }

    pub fn upgrade(&self) -> bool {
        self.options.upgrade
    }

    /// Replaces the variable set wholesale; nothing from the previous set survives.
    pub fn set_variables(&mut self, variables: Variables) {
        self.options.variables = variables;
    }

    pub async fn init(&self) -> Result<String, StepError> {
        info!(dir = %self.module_dir().display(), upgrade = self.upgrade(), "init");
        let output = self
            .engine
            .init(&self.options)
            .await
            .map_err(StepError::Init)?;
        Ok(output.stdout)
    }

    /// Dry run against current state. Never mutates state.
    pub async fn plan(&self) -> Result<String, StepError> {
        info!(dir = %self.module_dir().display(), "plan");
        let output = self
            .engine
            .plan(&self.options)
            .await
            .map_err(StepError::Plan)?;
        Ok(output.stdout)
    }

    pub async fn apply(&self) -> Result<String, StepError> {
        info!(dir = %self.module_dir().display(), "apply");
        let output = self
            .engine
            .apply(&self.options)
            .await
            .map_err(StepError::Apply)?;
        Ok(output.stdout)
    }

    pub async fn destroy(&self) -> Result<String, StepError> {
        info!(dir = %self.module_dir().display(), "destroy");
        let output = self
            .engine
            .destroy(&self.options)
            .await
            .map_err(StepError::Destroy)?;
        Ok(output.stdout)
    }

    pub async fn init_and_plan(&self) -> Result<String, StepError> {
        self.init().await?;
        self.plan().await
    }

    /// Applies, then proves convergence. Returns the apply output.
    pub async fn apply_and_idempotent(&self) -> Result<String, StepError> {
        let output = self.apply().await?;
        verify::verify(self).await?;
        Ok(output)
    }

    pub async fn init_and_apply_and_idempotent(&self) -> Result<String, StepError> {
        self.init().await?;
        self.apply_and_idempotent().await
    }
}

impl fmt::Debug for ProvisioningSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProvisioningSession")
            .field("engine", &self.engine.name())
            .field("options", &self.options)
            .finish()
    }
}
