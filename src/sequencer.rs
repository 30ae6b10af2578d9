//! Drives a scenario's variants, in order, through one shared session.
//!
//! ```text
//! Pending -> Running(0) -> Converged(0) -> Running(1) -> ... -> Done
//!                 \______________\______________________________-> Failed
//! ```
//!
//! Teardown runs exactly once after the loop, whichever way it ended,
//! including a panic inside the engine.

use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt;
use serde::Serialize;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::engine::Engine;
use crate::scenario::{Scenario, Variant};
use crate::session::{Operation, ProvisioningSession, StepError};
use crate::summary::{self, ChangeSummary};
use crate::verify;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SequenceState {
    Pending,
    Running(usize),
    Converged(usize),
    Done,
    Failed,
}

impl fmt::Display for SequenceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SequenceState::Pending => f.write_str("pending"),
            SequenceState::Running(i) => write!(f, "running({})", i),
            SequenceState::Converged(i) => write!(f, "converged({})", i),
            SequenceState::Done => f.write_str("done"),
            SequenceState::Failed => f.write_str("failed"),
        }
    }
}

/// What one variant did. Plan and apply counts are informational unless
/// the variant declared an expectation for them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VariantReport {
    pub label: String,
    pub planned: Option<ChangeSummary>,
    pub applied: Option<ChangeSummary>,
    /// `None` when verification was skipped for this variant.
    pub verified: Option<ChangeSummary>,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScenarioReport {
    pub scenario: String,
    pub variants: Vec<VariantReport>,
    pub elapsed_ms: u64,
}

#[derive(Debug)]
pub struct VariantFailure {
    /// `None` when the scenario failed before its first variant (init).
    pub variant: Option<String>,
    pub error: StepError,
}

/// A failed scenario. The root cause and any teardown failure are kept
/// side by side so that neither masks the other.
#[derive(Debug)]
pub struct ScenarioError {
    pub scenario: String,
    /// Variants that converged before the failure.
    pub completed: Vec<VariantReport>,
    pub failure: Option<VariantFailure>,
    pub teardown: Option<StepError>,
}

impl ScenarioError {
    pub fn failed_variant(&self) -> Option<&str> {
        self.failure.as_ref().and_then(|f| f.variant.as_deref())
    }

    pub fn operation(&self) -> Option<Operation> {
        match &self.failure {
            Some(failure) => failure.error.operation(),
            None => self.teardown.as_ref().and_then(StepError::operation),
        }
    }

    /// Non-zero counts for convergence and expectation failures.
    pub fn summary(&self) -> Option<ChangeSummary> {
        self.failure.as_ref().and_then(|f| f.error.summary())
    }

    fn aborted(scenario: String, reason: String) -> Self {
        Self {
            scenario,
            completed: Vec::new(),
            failure: Some(VariantFailure {
                variant: None,
                error: StepError::Aborted(reason),
            }),
            teardown: None,
        }
    }
}

impl fmt::Display for ScenarioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scenario '{}' failed", self.scenario)?;
        if let Some(failure) = &self.failure {
            if let Some(variant) = &failure.variant {
                write!(f, " at variant '{}'", variant)?;
            }
            write!(f, ": {}", failure.error)?;
        }
        if let Some(teardown) = &self.teardown {
            let sep = if self.failure.is_some() { "; teardown also failed" } else { ": teardown" };
            write!(f, "{}: {}", sep, teardown)?;
        }
        Ok(())
    }
}

impl std::error::Error for ScenarioError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.failure {
            Some(failure) => Some(&failure.error),
            None => self
                .teardown
                .as_ref()
                .map(|e| e as &(dyn std::error::Error + 'static)),
        }
    }
}

pub type ScenarioOutcome = Result<ScenarioReport, ScenarioError>;

pub struct VariantSequencer<'a> {
    scenario: &'a Scenario,
    engine: Arc<dyn Engine>,
    state: SequenceState,
    // Index of the variant in flight, for reporting a panic.
    active: Option<usize>,
}

impl<'a> VariantSequencer<'a> {
    pub fn new(scenario: &'a Scenario, engine: Arc<dyn Engine>) -> Self {
        Self {
            scenario,
            engine,
            state: SequenceState::Pending,
            active: None,
        }
    }

    pub fn state(&self) -> SequenceState {
        self.state
    }

    pub async fn run(&mut self) -> ScenarioOutcome {
        let started = Instant::now();
        let scenario = self.scenario;

        let mut session = ProvisioningSession::new(
            self.engine.clone(),
            scenario.module_dir(),
            scenario.first_variant().variables.clone(),
        )
        .with_upgrade(scenario.upgrade())
        .with_env(scenario.env().clone())
        .with_var_files(scenario.var_files().to_vec());

        let mut completed = Vec::with_capacity(scenario.variants().len());
        let driven = AssertUnwindSafe(self.drive(&mut session, &mut completed))
            .catch_unwind()
            .await;
        let result = match driven {
            Ok(result) => result,
            Err(payload) => {
                let reason = panic_message(&*payload);
                warn!(scenario = scenario.name(), %reason, "scenario panicked");
                Err(VariantFailure {
                    variant: self
                        .active
                        .and_then(|index| scenario.variants().get(index))
                        .map(|variant| variant.label.clone()),
                    error: StepError::Aborted(reason),
                })
            }
        };

        match &result {
            Ok(()) => self.transition(SequenceState::Done),
            Err(_) => self.transition(SequenceState::Failed),
        }

        let teardown = match session.destroy().await {
            Ok(_) => None,
            Err(err) => {
                warn!(scenario = scenario.name(), error = %err, "teardown failed");
                Some(err)
            }
        };

        let failure = result.err();
        if failure.is_none() && teardown.is_none() {
            let report = ScenarioReport {
                scenario: scenario.name().to_string(),
                variants: completed,
                elapsed_ms: millis(started),
            };
            info!(scenario = scenario.name(), elapsed_ms = report.elapsed_ms, "scenario passed");
            return Ok(report);
        }

        Err(ScenarioError {
            scenario: scenario.name().to_string(),
            completed,
            failure,
            teardown,
        })
    }

    async fn drive(
        &mut self,
        session: &mut ProvisioningSession,
        completed: &mut Vec<VariantReport>,
    ) -> Result<(), VariantFailure> {
        let scenario = self.scenario;

        self.transition(SequenceState::Running(0));
        session.init().await.map_err(|error| VariantFailure {
            variant: None,
            error,
        })?;

        for (index, variant) in scenario.variants().iter().enumerate() {
            if index > 0 {
                self.transition(SequenceState::Running(index));
            }
            self.active = Some(index);
            let report = run_variant(session, variant)
                .await
                .map_err(|error| {
                    warn!(
                        scenario = scenario.name(),
                        variant = %variant.label,
                        operation = ?error.operation(),
                        error = %error,
                        "variant failed"
                    );
                    VariantFailure {
                        variant: Some(variant.label.clone()),
                        error,
                    }
                })?;
            completed.push(report);
            self.active = None;
            self.transition(SequenceState::Converged(index));
        }
        Ok(())
    }

    fn transition(&mut self, next: SequenceState) {
        debug!(scenario = self.scenario.name(), from = %self.state, to = %next, "transition");
        self.state = next;
    }
}

async fn run_variant(
    session: &mut ProvisioningSession,
    variant: &Variant,
) -> Result<VariantReport, StepError> {
    let started = Instant::now();
    info!(variant = %variant.label, "applying variant");
    session.set_variables(variant.variables.clone());

    // Pre-apply plan is a sanity dry run; prior state may legitimately differ.
    let plan_output = session.plan().await?;
    let planned = match variant.expect_plan {
        Some(expected) => Some(verify::expect_summary(Operation::Plan, &plan_output, expected)?),
        None => best_effort(Operation::Plan, &plan_output),
    };

    let apply_output = session.apply().await?;
    let applied = match variant.expect_apply {
        Some(expected) => Some(verify::expect_summary(Operation::Apply, &apply_output, expected)?),
        None => best_effort(Operation::Apply, &apply_output),
    };

    let verified = if variant.verify {
        Some(verify::verify(session).await?)
    } else {
        info!(variant = %variant.label, "verification skipped");
        None
    };

    Ok(VariantReport {
        label: variant.label.clone(),
        planned,
        applied,
        verified,
        elapsed_ms: millis(started),
    })
}

fn best_effort(operation: Operation, output: &str) -> Option<ChangeSummary> {
    match summary::parse(output) {
        Ok(summary) => Some(summary),
        Err(err) => {
            warn!(%operation, error = %err, "no change summary in output");
            None
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("panicked: {}", message)
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("panicked: {}", message)
    } else {
        "panicked".to_string()
    }
}

fn millis(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// Runs independent scenarios concurrently, at most `jobs` at a time.
///
/// Outcomes come back in the order the scenarios were given.
pub async fn run_scenarios(
    scenarios: Vec<Scenario>,
    engine: Arc<dyn Engine>,
    jobs: usize,
) -> Vec<ScenarioOutcome> {
    let permits = Arc::new(Semaphore::new(jobs.max(1)));

    let handles: Vec<_> = scenarios
        .into_iter()
        .map(|scenario| {
            let name = scenario.name().to_string();
            let engine = engine.clone();
            let permits = permits.clone();
            let handle = tokio::spawn(async move {
                let _permit = permits.acquire_owned().await;
                let mut sequencer = VariantSequencer::new(&scenario, engine);
                sequencer.run().await
            });
            (name, handle)
        })
        .collect();

    let mut outcomes = Vec::with_capacity(handles.len());
    for (name, handle) in handles {
        let outcome = match handle.await {
            Ok(outcome) => outcome,
            Err(err) => Err(ScenarioError::aborted(name, err.to_string())),
        };
        outcomes.push(outcome);
    }
    outcomes
}
