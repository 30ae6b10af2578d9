mod command;
mod error;

pub use command::{Subcommand, build_args, format_var};
pub use error::TerraformError;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::info;

use super::{CommandOutput, Engine, EngineError, EngineOptions};

/// Engine backed by the `terraform` CLI, or any binary sharing its
/// interface such as OpenTofu's `tofu`.
#[derive(Debug, Clone)]
pub struct TerraformEngine {
    name: String,
    binary: PathBuf,
    plugin_cache: Option<PathBuf>,
}

impl TerraformEngine {
    pub fn new() -> Self {
        Self::with_binary("terraform")
    }

    pub fn with_binary(binary: impl Into<PathBuf>) -> Self {
        let binary = binary.into();
        let name = binary
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "terraform".to_string());
        Self {
            name,
            binary,
            plugin_cache: None,
        }
    }

    /// Sets `TF_PLUGIN_CACHE_DIR` for every command.
    pub fn with_plugin_cache(mut self, dir: Option<PathBuf>) -> Self {
        self.plugin_cache = dir;
        self
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    async fn run(
        &self,
        subcommand: Subcommand,
        options: &EngineOptions,
    ) -> Result<CommandOutput, TerraformError> {
        info!(
            engine = %self.name,
            command = subcommand.as_str(),
            dir = %options.module_dir.display(),
            "running"
        );
        command::execute(
            &self.binary,
            subcommand,
            options,
            self.plugin_cache.as_ref(),
        )
        .await
    }
}

impl Default for TerraformEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Engine for TerraformEngine {
    fn name(&self) -> &str {
        &self.name
    }

    async fn init(&self, options: &EngineOptions) -> Result<CommandOutput, EngineError> {
        Ok(self.run(Subcommand::Init, options).await?)
    }

    async fn plan(&self, options: &EngineOptions) -> Result<CommandOutput, EngineError> {
        Ok(self.run(Subcommand::Plan, options).await?)
    }

    async fn apply(&self, options: &EngineOptions) -> Result<CommandOutput, EngineError> {
        Ok(self.run(Subcommand::Apply, options).await?)
    }

    async fn destroy(&self, options: &EngineOptions) -> Result<CommandOutput, EngineError> {
        Ok(self.run(Subcommand::Destroy, options).await?)
    }
}
