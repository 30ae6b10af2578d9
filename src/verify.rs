//! Idempotency verification.
//!
//! An apply that exits cleanly proves nothing about convergence. The only
//! accepted evidence is a follow-up plan reporting zero pending changes.

use tracing::{info, warn};

use crate::session::{Operation, ProvisioningSession, StepError};
use crate::summary::{self, ChangeSummary};

/// Re-plans `session` and fails unless the plan reports `{0, 0, 0}`.
pub async fn verify(session: &ProvisioningSession) -> Result<ChangeSummary, StepError> {
    let output = session.plan().await?;
    let summary = summary::parse(&output).map_err(|source| StepError::Parse {
        operation: Operation::Verify,
        source,
    })?;

    if !summary.is_converged() {
        warn!(
            dir = %session.module_dir().display(),
            add = summary.add,
            change = summary.change,
            destroy = summary.destroy,
            "plan after apply is not empty"
        );
        return Err(StepError::Convergence { summary });
    }

    info!(dir = %session.module_dir().display(), "converged");
    Ok(summary)
}

/// Parses `output` strictly and compares it against `expected`.
pub fn expect_summary(
    operation: Operation,
    output: &str,
    expected: ChangeSummary,
) -> Result<ChangeSummary, StepError> {
    let actual =
        summary::parse(output).map_err(|source| StepError::Parse { operation, source })?;
    if actual != expected {
        return Err(StepError::UnexpectedChanges {
            operation,
            expected,
            actual,
        });
    }
    Ok(actual)
}
