use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::engine::Variables;
use crate::summary::ChangeSummary;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid TOML scenario file: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid JSON scenario file: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported scenario file format: {} (expected .toml or .json)", .0.display())]
    UnsupportedFormat(PathBuf),
    #[error("no scenarios defined")]
    NoScenarios,
    #[error("scenario '{0}' has no variants")]
    EmptyScenario(String),
    #[error("duplicate scenario name: '{0}'")]
    DuplicateScenario(String),
    #[error("scenario '{scenario}' declares variant '{label}' more than once")]
    DuplicateVariant { scenario: String, label: String },
    #[error("scenarios '{first}' and '{second}' share module directory {}", .dir.display())]
    SharedModuleDir {
        first: String,
        second: String,
        dir: PathBuf,
    },
    #[error("unknown scenario: '{0}'")]
    UnknownScenario(String),
}

/// One named set of input variables, applied against a shared session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Variant {
    pub label: String,
    #[serde(default, rename = "vars")]
    pub variables: Variables,
    /// When false the variant is applied but not re-planned.
    #[serde(default = "default_verify")]
    pub verify: bool,
    /// Exact counts the pre-apply plan must report. Unchecked when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expect_plan: Option<ChangeSummary>,
    /// Exact counts the apply output must report. Unchecked when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expect_apply: Option<ChangeSummary>,
}

fn default_verify() -> bool {
    true
}

impl Variant {
    pub fn new(label: impl Into<String>, variables: Variables) -> Self {
        Self {
            label: label.into(),
            variables,
            verify: true,
            expect_plan: None,
            expect_apply: None,
        }
    }

    pub fn skip_verify(mut self) -> Self {
        self.verify = false;
        self
    }

    pub fn expect_plan(mut self, summary: ChangeSummary) -> Self {
        self.expect_plan = Some(summary);
        self
    }

    pub fn expect_apply(mut self, summary: ChangeSummary) -> Self {
        self.expect_apply = Some(summary);
        self
    }
}

/// An ordered, non-empty list of variants driven through one module directory.
#[derive(Debug, Clone, PartialEq)]
pub struct Scenario {
    name: String,
    module_dir: PathBuf,
    upgrade: bool,
    env: BTreeMap<String, String>,
    var_files: Vec<PathBuf>,
    variants: Vec<Variant>,
}

impl Scenario {
    pub fn new(
        name: impl Into<String>,
        module_dir: impl Into<PathBuf>,
        variants: Vec<Variant>,
    ) -> Result<Self, ConfigError> {
        let name = name.into();
        if variants.is_empty() {
            return Err(ConfigError::EmptyScenario(name));
        }
        let mut seen = HashSet::new();
        for variant in &variants {
            if !seen.insert(variant.label.as_str()) {
                return Err(ConfigError::DuplicateVariant {
                    scenario: name,
                    label: variant.label.clone(),
                });
            }
        }
        Ok(Self {
            name,
            module_dir: module_dir.into(),
            upgrade: false,
            env: BTreeMap::new(),
            var_files: Vec::new(),
            variants,
        })
    }

    pub fn with_upgrade(mut self, upgrade: bool) -> Self {
        self.upgrade = upgrade;
        self
    }

    pub fn with_env(mut self, env: BTreeMap<String, String>) -> Self {
        self.env = env;
        self
    }

    pub fn with_var_files(mut self, var_files: Vec<PathBuf>) -> Self {
        self.var_files = var_files;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn module_dir(&self) -> &Path {
        &self.module_dir
    }

    pub fn upgrade(&self) -> bool {
        self.upgrade
    }

    pub fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    pub fn var_files(&self) -> &[PathBuf] {
        &self.var_files
    }

    pub fn variants(&self) -> &[Variant] {
        &self.variants
    }

    /// Guaranteed by construction.
    pub fn first_variant(&self) -> &Variant {
        &self.variants[0]
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ScenarioFile {
    #[serde(default)]
    scenario: Vec<ScenarioConfig>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ScenarioConfig {
    name: String,
    module_dir: PathBuf,
    #[serde(default)]
    upgrade: bool,
    #[serde(default)]
    env: BTreeMap<String, String>,
    #[serde(default)]
    var_files: Vec<PathBuf>,
    #[serde(default)]
    variant: Vec<Variant>,
}

/// Loads and validates a `.toml` or `.json` scenario file.
///
/// Relative module directories and var files resolve against the file's
/// own directory.
pub fn load(path: &Path) -> Result<Vec<Scenario>, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let base = path.parent().unwrap_or_else(|| Path::new(""));

    let file: ScenarioFile = match path.extension().and_then(|e| e.to_str()) {
        Some("toml") => toml::from_str(&content)?,
        Some("json") => serde_json::from_str(&content)?,
        _ => return Err(ConfigError::UnsupportedFormat(path.to_path_buf())),
    };
    from_configs(file.scenario, base)
}

/// Parses scenario definitions from TOML text.
pub fn from_toml(content: &str, base: &Path) -> Result<Vec<Scenario>, ConfigError> {
    let file: ScenarioFile = toml::from_str(content)?;
    from_configs(file.scenario, base)
}

fn from_configs(configs: Vec<ScenarioConfig>, base: &Path) -> Result<Vec<Scenario>, ConfigError> {
    if configs.is_empty() {
        return Err(ConfigError::NoScenarios);
    }

    let mut scenarios = Vec::with_capacity(configs.len());
    for config in configs {
        let var_files = config
            .var_files
            .iter()
            .map(|file| base.join(file))
            .collect();
        let scenario = Scenario::new(config.name, base.join(&config.module_dir), config.variant)?
            .with_upgrade(config.upgrade)
            .with_env(config.env)
            .with_var_files(var_files);
        scenarios.push(scenario);
    }

    check_disjoint(&scenarios)?;
    Ok(scenarios)
}

/// Scenarios may run in parallel only because each owns its module
/// directory and therefore its state.
fn check_disjoint(scenarios: &[Scenario]) -> Result<(), ConfigError> {
    let mut names = HashSet::new();
    let mut dirs: HashMap<&Path, &str> = HashMap::new();

    for scenario in scenarios {
        if !names.insert(scenario.name()) {
            return Err(ConfigError::DuplicateScenario(scenario.name().to_string()));
        }
        if let Some(first) = dirs.insert(scenario.module_dir(), scenario.name()) {
            return Err(ConfigError::SharedModuleDir {
                first: first.to_string(),
                second: scenario.name().to_string(),
                dir: scenario.module_dir().to_path_buf(),
            });
        }
    }
    Ok(())
}

/// Keeps only the named scenarios, in file order. An empty filter keeps all.
pub fn select(scenarios: Vec<Scenario>, only: &[String]) -> Result<Vec<Scenario>, ConfigError> {
    if only.is_empty() {
        return Ok(scenarios);
    }
    if let Some(missing) = only
        .iter()
        .find(|name| !scenarios.iter().any(|s| s.name() == name.as_str()))
    {
        return Err(ConfigError::UnknownScenario(missing.clone()));
    }
    Ok(scenarios
        .into_iter()
        .filter(|s| only.iter().any(|name| name == s.name()))
        .collect())
}
