pub mod terraform;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

/// Input variables handed to the engine, keyed by variable name.
pub type Variables = BTreeMap<String, serde_json::Value>;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("unknown engine: {0}")]
    UnknownEngine(String),
    #[error("terraform error: {0}")]
    Terraform(String),
}

/// Everything an engine needs to run one command against a module.
#[derive(Clone, Default, PartialEq)]
pub struct EngineOptions {
    pub module_dir: PathBuf,
    pub variables: Variables,
    pub var_files: Vec<PathBuf>,
    pub upgrade: bool,
    pub env: BTreeMap<String, String>,
}

// NOTE: env commonly carries cloud credentials
impl std::fmt::Debug for EngineOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let env: BTreeMap<&str, &str> = self
            .env
            .keys()
            .map(|k| (k.as_str(), "[REDACTED]"))
            .collect();
        f.debug_struct("EngineOptions")
            .field("module_dir", &self.module_dir)
            .field("variables", &self.variables)
            .field("var_files", &self.var_files)
            .field("upgrade", &self.upgrade)
            .field("env", &env)
            .finish()
    }
}

/// Captured output of a command that exited successfully.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn new(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }
}

/// The provisioning engine: a black box computing and applying resource diffs.
///
/// Every call blocks until the underlying command finishes. A non-zero exit
/// is reported as an error; implementations never retry.
#[async_trait]
pub trait Engine: Send + Sync {
    fn name(&self) -> &str;
    async fn init(&self, options: &EngineOptions) -> Result<CommandOutput, EngineError>;
    async fn plan(&self, options: &EngineOptions) -> Result<CommandOutput, EngineError>;
    async fn apply(&self, options: &EngineOptions) -> Result<CommandOutput, EngineError>;
    async fn destroy(&self, options: &EngineOptions) -> Result<CommandOutput, EngineError>;
}

#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    /// Overrides the engine's default binary name.
    pub binary: Option<PathBuf>,
    pub plugin_cache: Option<PathBuf>,
}

pub fn get_engine(name: &str, config: EngineConfig) -> Result<Arc<dyn Engine>, EngineError> {
    let binary = match name {
        "terraform" => config.binary.unwrap_or_else(|| PathBuf::from("terraform")),
        "tofu" | "opentofu" => config.binary.unwrap_or_else(|| PathBuf::from("tofu")),
        other => return Err(EngineError::UnknownEngine(other.to_string())),
    };
    Ok(Arc::new(
        terraform::TerraformEngine::with_binary(binary).with_plugin_cache(config.plugin_cache),
    ))
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_engine_terraform() {
        let engine = get_engine("terraform", EngineConfig::default()).unwrap();
        assert_eq!(engine.name(), "terraform");
    }

    #[test]
    fn test_get_engine_tofu() {
        let engine = get_engine("tofu", EngineConfig::default()).unwrap();
        assert_eq!(engine.name(), "tofu");
    }

    #[test]
    fn test_get_engine_unknown() {
        let result = get_engine("pulumi", EngineConfig::default());
        match result {
            Err(EngineError::UnknownEngine(name)) => assert_eq!(name, "pulumi"),
            _ => panic!("expected UnknownEngine error"),
        }
    }

    #[test]
    fn test_options_debug_redacts_env_values() {
        let mut options = EngineOptions::default();
        options
            .env
            .insert("AWS_SECRET_ACCESS_KEY".to_string(), "super_secret_value".to_string());
        let debug_output = format!("{:?}", options);

        assert!(debug_output.contains("AWS_SECRET_ACCESS_KEY"));
        assert!(debug_output.contains("[REDACTED]"));
        assert!(
            !debug_output.contains("super_secret_value"),
            "Debug output must NOT contain environment values"
        );
    }
}
