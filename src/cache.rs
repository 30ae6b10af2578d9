//! Provider plugin cache location.
//!
//! Terraform does not guarantee the plugin cache is safe for concurrent
//! `init` calls, so the cache is opt-in and callers running scenarios in
//! parallel should leave it off.

use std::path::PathBuf;

pub const PLUGIN_CACHE_ENV: &str = "TF_PLUGIN_CACHE_DIR";

/// `TF_PLUGIN_CACHE_DIR` when set, otherwise the per-user default.
pub fn plugin_cache_dir() -> Option<PathBuf> {
    match std::env::var_os(PLUGIN_CACHE_ENV) {
        Some(dir) if !dir.is_empty() => Some(PathBuf::from(dir)),
        _ => default_plugin_cache_dir(),
    }
}

/// `$XDG_CACHE_HOME/tfconverge/plugin-cache` or the platform equivalent.
pub fn default_plugin_cache_dir() -> Option<PathBuf> {
    dirs::cache_dir().map(|dir| dir.join("tfconverge").join("plugin-cache"))
}
