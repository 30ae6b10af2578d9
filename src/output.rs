use serde::Serialize;
use tabled::settings::Style;
use tabled::{Table, Tabled};
use termtree::Tree;

use crate::scenario::Scenario;
use crate::sequencer::{ScenarioOutcome, VariantReport};
use crate::session::Operation;
use crate::summary::ChangeSummary;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReportFormat {
    #[default]
    Table,
    Tree,
    Json,
}

/// Flat, serializable view of one scenario outcome.
#[derive(Debug, Serialize)]
pub struct ScenarioRecord<'a> {
    pub scenario: &'a str,
    pub passed: bool,
    pub variants: &'a [VariantReport],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_variant: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation: Option<Operation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending: Option<ChangeSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub teardown_error: Option<String>,
}

impl<'a> ScenarioRecord<'a> {
    pub fn from_outcome(outcome: &'a ScenarioOutcome) -> Self {
        match outcome {
            Ok(report) => Self {
                scenario: &report.scenario,
                passed: true,
                variants: &report.variants,
                failed_variant: None,
                operation: None,
                pending: None,
                error: None,
                teardown_error: None,
            },
            Err(err) => Self {
                scenario: &err.scenario,
                passed: false,
                variants: &err.completed,
                failed_variant: err.failed_variant(),
                operation: err.operation(),
                pending: err.summary(),
                error: err.failure.as_ref().map(|f| f.error.to_string()),
                teardown_error: err.teardown.as_ref().map(ToString::to_string),
            },
        }
    }
}

#[derive(Tabled)]
struct Row {
    #[tabled(rename = "Scenario")]
    scenario: String,
    #[tabled(rename = "Result")]
    result: String,
    #[tabled(rename = "Converged")]
    converged: usize,
    #[tabled(rename = "Failed variant")]
    failed_variant: String,
    #[tabled(rename = "Operation")]
    operation: String,
    #[tabled(rename = "Pending (add/change/destroy)")]
    pending: String,
    #[tabled(rename = "Teardown")]
    teardown: String,
}

pub fn render(outcomes: &[ScenarioOutcome], format: ReportFormat) -> Result<String, serde_json::Error> {
    match format {
        ReportFormat::Table => Ok(render_table(outcomes)),
        ReportFormat::Tree => Ok(render_tree(outcomes)),
        ReportFormat::Json => render_json(outcomes),
    }
}

pub fn render_table(outcomes: &[ScenarioOutcome]) -> String {
    let rows: Vec<Row> = outcomes
        .iter()
        .map(ScenarioRecord::from_outcome)
        .map(|record| Row {
            scenario: record.scenario.to_string(),
            result: if record.passed { "PASS" } else { "FAIL" }.to_string(),
            converged: record.variants.len(),
            failed_variant: record.failed_variant.unwrap_or("-").to_string(),
            operation: record
                .operation
                .map_or_else(|| "-".to_string(), |op| op.to_string()),
            pending: record
                .pending
                .map_or_else(|| "-".to_string(), |s| format!("{}/{}/{}", s.add, s.change, s.destroy)),
            teardown: if record.teardown_error.is_some() { "FAILED" } else { "ok" }.to_string(),
        })
        .collect();

    let mut table = Table::new(rows);
    table.with(Style::rounded());
    table.to_string()
}

pub fn render_tree(outcomes: &[ScenarioOutcome]) -> String {
    let mut root = Tree::new("scenarios".to_string());

    for outcome in outcomes {
        let record = ScenarioRecord::from_outcome(outcome);
        let status = if record.passed { "PASS" } else { "FAIL" };
        let mut node = Tree::new(format!("{} [{}]", record.scenario, status));

        for variant in record.variants {
            node.push(Tree::new(describe_variant(variant)));
        }
        if let Some(error) = &record.error {
            let at = record.failed_variant.unwrap_or("(setup)");
            node.push(Tree::new(format!("{}: {}", at, error)));
        }
        if let Some(teardown) = &record.teardown_error {
            node.push(Tree::new(format!("teardown: {}", teardown)));
        }
        root.push(node);
    }

    root.to_string()
}

fn describe_variant(variant: &VariantReport) -> String {
    let applied = variant
        .applied
        .map_or_else(|| "apply summary unavailable".to_string(), |s| format!("applied {}", s));
    let verified = if variant.verified.is_some() {
        "converged"
    } else {
        "verification skipped"
    };
    format!("{}: {}, {}", variant.label, applied, verified)
}

pub fn render_json(outcomes: &[ScenarioOutcome]) -> Result<String, serde_json::Error> {
    let records: Vec<ScenarioRecord<'_>> = outcomes.iter().map(ScenarioRecord::from_outcome).collect();
    serde_json::to_string_pretty(&records)
}

/// Scenario and variant layout for a dry validation.
pub fn render_scenarios(scenarios: &[Scenario]) -> String {
    let mut root = Tree::new(format!("{} scenario(s)", scenarios.len()));

    for scenario in scenarios {
        let upgrade = if scenario.upgrade() { ", upgrade" } else { "" };
        let mut node = Tree::new(format!(
            "{} ({}{})",
            scenario.name(),
            scenario.module_dir().display(),
            upgrade
        ));
        for variant in scenario.variants() {
            let vars = serde_json::to_string(&variant.variables).unwrap_or_default();
            let verify = if variant.verify { "" } else { " [no verify]" };
            node.push(Tree::new(format!("{} {}{}", variant.label, vars, verify)));
        }
        root.push(node);
    }

    root.to_string()
}
