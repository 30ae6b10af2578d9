use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while driving the terraform (or tofu) binary.
///
/// SECURITY: messages must NEVER include environment values passed to the child process.
#[derive(Debug, Error)]
pub enum TerraformError {
    /// The module directory does not exist or is not a directory
    #[error("module directory not found: {}", .0.display())]
    ModuleDirNotFound(PathBuf),

    /// The binary could not be started (missing from PATH, not executable, ...)
    #[error("failed to run '{binary}': {source}")]
    Spawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    /// The plugin cache directory could not be created
    #[error("plugin cache '{}' unavailable: {source}", .path.display())]
    PluginCache {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The command ran but exited unsuccessfully
    #[error("{command} exited with {status}: {detail}")]
    Exit {
        command: &'static str,
        status: String,
        detail: String,
    },
}

impl From<TerraformError> for crate::engine::EngineError {
    fn from(err: TerraformError) -> Self {
        crate::engine::EngineError::Terraform(err.to_string())
    }
}
