//! Change-count extraction from provisioning engine output.
//!
//! Understands the human-readable summary lines printed by `plan`, `apply`
//! and `destroy`, the `No changes.` and output-only plan messages, and the
//! `change_summary` messages emitted in `-json` mode. Output is scanned as a whole and the
//! last summary wins, so log noise around it is ignored.

use std::fmt;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use thiserror::Error;

static ANSI_ESCAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\x1b\[[0-9;]*[A-Za-z]").expect("valid ANSI regex"));

static PLAN_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"Plan:\s+(?:(\S+) to import,\s+)?(\S+) to add,\s+(\S+) to change,\s+(\S+) to destroy",
    )
    .expect("valid plan regex")
});

static APPLY_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"Apply complete! Resources:\s+(?:(\S+) imported,\s+)?(\S+) added,\s+(\S+) changed,\s+(\S+) destroyed",
    )
    .expect("valid apply regex")
});

static DESTROY_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Destroy complete! Resources:\s+(\S+) destroyed").expect("valid destroy regex")
});

static NO_CHANGES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"No changes\.").expect("valid no-changes regex"));

// Output-only plans print neither a `Plan:` line nor `No changes.`.
static OUTPUT_CHANGES_ONLY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"You can apply this plan to save these new output values")
        .expect("valid output-changes regex")
});

/// Resource counts reported by a single plan or apply.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChangeSummary {
    pub add: u32,
    pub change: u32,
    pub destroy: u32,
}

impl ChangeSummary {
    pub const ZERO: ChangeSummary = ChangeSummary {
        add: 0,
        change: 0,
        destroy: 0,
    };

    pub fn new(add: u32, change: u32, destroy: u32) -> Self {
        Self {
            add,
            change,
            destroy,
        }
    }

    /// True when nothing is pending, i.e. the module reached a fixed point.
    pub fn is_converged(&self) -> bool {
        *self == Self::ZERO
    }

    pub fn total(&self) -> u64 {
        u64::from(self.add) + u64::from(self.change) + u64::from(self.destroy)
    }
}

impl fmt::Display for ChangeSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} to add, {} to change, {} to destroy",
            self.add, self.change, self.destroy
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("no change summary found in engine output")]
    NoSummary,

    #[error("invalid {field} count '{value}' in summary: {line}")]
    InvalidCount {
        field: &'static str,
        value: String,
        line: String,
    },
}

#[derive(Debug, Deserialize)]
struct JsonMessage {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    changes: Option<JsonChanges>,
}

#[derive(Debug, Deserialize)]
struct JsonChanges {
    add: serde_json::Value,
    change: serde_json::Value,
    remove: serde_json::Value,
}

type Candidate = (usize, Result<ChangeSummary, ParseError>);

/// Extracts the last change summary found in `output`.
pub fn parse(output: &str) -> Result<ChangeSummary, ParseError> {
    let text = ANSI_ESCAPE.replace_all(output, "");

    let mut last: Option<Candidate> = None;
    let mut offer = |candidate: Candidate| {
        if last.as_ref().is_none_or(|(end, _)| candidate.0 >= *end) {
            last = Some(candidate);
        }
    };

    for caps in PLAN_LINE.captures_iter(&text) {
        offer((caps_end(&caps), three_counts(&caps, ["add", "change", "destroy"])));
    }
    for caps in APPLY_LINE.captures_iter(&text) {
        offer((caps_end(&caps), three_counts(&caps, ["added", "changed", "destroyed"])));
    }
    for caps in DESTROY_LINE.captures_iter(&text) {
        let line = caps[0].to_string();
        let destroyed = count("destroyed", &caps[1], &line).map(|d| ChangeSummary::new(0, 0, d));
        offer((caps_end(&caps), destroyed));
    }
    for m in NO_CHANGES.find_iter(&text).chain(OUTPUT_CHANGES_ONLY.find_iter(&text)) {
        offer((m.end(), Ok(ChangeSummary::ZERO)));
    }

    let mut offset = 0;
    for line in text.split_inclusive('\n') {
        offset += line.len();
        if let Some(summary) = json_change_summary(line.trim()) {
            offer((offset, summary));
        }
    }

    match last {
        Some((_, summary)) => summary,
        None => Err(ParseError::NoSummary),
    }
}

fn caps_end(caps: &Captures<'_>) -> usize {
    caps.get(0).map_or(0, |m| m.end())
}

// Groups 2..=4 hold the counts; group 1 is the optional import count.
fn three_counts(caps: &Captures<'_>, fields: [&'static str; 3]) -> Result<ChangeSummary, ParseError> {
    let line = caps[0].to_string();
    Ok(ChangeSummary {
        add: count(fields[0], &caps[2], &line)?,
        change: count(fields[1], &caps[3], &line)?,
        destroy: count(fields[2], &caps[4], &line)?,
    })
}

fn count(field: &'static str, raw: &str, line: &str) -> Result<u32, ParseError> {
    raw.parse::<u32>().map_err(|_| ParseError::InvalidCount {
        field,
        value: raw.to_string(),
        line: line.to_string(),
    })
}

fn json_change_summary(line: &str) -> Option<Result<ChangeSummary, ParseError>> {
    if !line.starts_with('{') || !line.contains("change_summary") {
        return None;
    }
    let message: JsonMessage = serde_json::from_str(line).ok()?;
    if message.kind != "change_summary" {
        return None;
    }
    let changes = message.changes?;
    Some(json_counts(&changes, line))
}

fn json_counts(changes: &JsonChanges, line: &str) -> Result<ChangeSummary, ParseError> {
    let field = |name: &'static str, value: &serde_json::Value| {
        value
            .as_u64()
            .and_then(|v| u32::try_from(v).ok())
            .ok_or_else(|| ParseError::InvalidCount {
                field: name,
                value: value.to_string(),
                line: line.to_string(),
            })
    };

    Ok(ChangeSummary {
        add: field("add", &changes.add)?,
        change: field("change", &changes.change)?,
        destroy: field("remove", &changes.remove)?,
    })
}
