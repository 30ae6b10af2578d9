use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;
use tracing::debug;

use super::TerraformError;
use crate::engine::{CommandOutput, EngineOptions};

const DETAIL_LINES: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subcommand {
    Init,
    Plan,
    Apply,
    Destroy,
}

impl Subcommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            Subcommand::Init => "init",
            Subcommand::Plan => "plan",
            Subcommand::Apply => "apply",
            Subcommand::Destroy => "destroy",
        }
    }
}

pub fn build_args(subcommand: Subcommand, options: &EngineOptions) -> Vec<String> {
    let mut args = vec![subcommand.as_str().to_string(), "-input=false".to_string()];

    match subcommand {
        Subcommand::Init => {
            args.push("-no-color".to_string());
            if options.upgrade {
                args.push("-upgrade".to_string());
            }
            return args;
        }
        Subcommand::Plan => args.push("-lock=false".to_string()),
        Subcommand::Apply | Subcommand::Destroy => args.push("-auto-approve".to_string()),
    }
    args.push("-no-color".to_string());

    // -var-file first so that explicit -var values take precedence
    for file in &options.var_files {
        args.push(format!("-var-file={}", file.display()));
    }
    for (key, value) in &options.variables {
        args.push("-var".to_string());
        args.push(format_var(key, value));
    }
    args
}

/// Renders `key=value` for `-var`. Non-string values use JSON syntax, which
/// the engine accepts as an HCL expression.
pub fn format_var(key: &str, value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => format!("{}={}", key, s),
        other => format!("{}={}", key, other),
    }
}

pub async fn execute(
    binary: &Path,
    subcommand: Subcommand,
    options: &EngineOptions,
    plugin_cache: Option<&PathBuf>,
) -> Result<CommandOutput, TerraformError> {
    if !options.module_dir.is_dir() {
        return Err(TerraformError::ModuleDirNotFound(options.module_dir.clone()));
    }

    let args = build_args(subcommand, options);
    debug!(binary = %binary.display(), ?args, dir = %options.module_dir.display(), "executing");

    let mut command = Command::new(binary);
    command
        .args(&args)
        .current_dir(&options.module_dir)
        .env("TF_IN_AUTOMATION", "1")
        .env("TF_INPUT", "0")
        .envs(&options.env)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    if let Some(cache) = plugin_cache {
        tokio::fs::create_dir_all(cache)
            .await
            .map_err(|source| TerraformError::PluginCache {
                path: cache.clone(),
                source,
            })?;
        command.env("TF_PLUGIN_CACHE_DIR", cache);
    }

    let output = command
        .output()
        .await
        .map_err(|source| TerraformError::Spawn {
            binary: binary.display().to_string(),
            source,
        })?;

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

    if !output.status.success() {
        let detail = if stderr.trim().is_empty() {
            tail(&stdout, DETAIL_LINES)
        } else {
            tail(&stderr, DETAIL_LINES)
        };
        return Err(TerraformError::Exit {
            command: subcommand.as_str(),
            status: output.status.to_string(),
            detail,
        });
    }

    Ok(CommandOutput { stdout, stderr })
}

fn tail(text: &str, lines: usize) -> String {
    let all: Vec<&str> = text.trim().lines().collect();
    let start = all.len().saturating_sub(lines);
    all[start..].join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn options_with_vars() -> EngineOptions {
        let mut options = EngineOptions::default();
        options
            .variables
            .insert("nat_gateway_mode".to_string(), json!("one_per_az"));
        options
            .variables
            .insert("module_enabled".to_string(), json!(false));
        options
    }

    #[test]
    fn test_init_args_without_upgrade() {
        let args = build_args(Subcommand::Init, &options_with_vars());
        assert_eq!(args, vec!["init", "-input=false", "-no-color"]);
    }

    #[test]
    fn test_init_args_with_upgrade_skip_vars() {
        let mut options = options_with_vars();
        options.upgrade = true;
        let args = build_args(Subcommand::Init, &options);
        assert_eq!(args, vec!["init", "-input=false", "-no-color", "-upgrade"]);
    }

    #[test]
    fn test_plan_args_include_sorted_vars() {
        let args = build_args(Subcommand::Plan, &options_with_vars());
        assert_eq!(
            args,
            vec![
                "plan",
                "-input=false",
                "-lock=false",
                "-no-color",
                "-var",
                "module_enabled=false",
                "-var",
                "nat_gateway_mode=one_per_az",
            ]
        );
    }

    #[test]
    fn test_apply_and_destroy_auto_approve() {
        for subcommand in [Subcommand::Apply, Subcommand::Destroy] {
            let args = build_args(subcommand, &EngineOptions::default());
            assert_eq!(args[0], subcommand.as_str());
            assert!(args.contains(&"-auto-approve".to_string()));
            assert!(!args.contains(&"-lock=false".to_string()));
        }
    }

    #[test]
    fn test_var_files_precede_vars() {
        let mut options = options_with_vars();
        options.var_files.push(PathBuf::from("fixtures/eu-west-1.tfvars"));
        let args = build_args(Subcommand::Apply, &options);

        let file_pos = args
            .iter()
            .position(|a| a == "-var-file=fixtures/eu-west-1.tfvars")
            .unwrap();
        let var_pos = args.iter().position(|a| a == "-var").unwrap();
        assert!(file_pos < var_pos);
    }

    #[test]
    fn test_format_var_scalars() {
        assert_eq!(format_var("mode", &json!("single")), "mode=single");
        assert_eq!(format_var("count", &json!(3)), "count=3");
        assert_eq!(format_var("enabled", &json!(true)), "enabled=true");
        assert_eq!(format_var("name", &json!(null)), "name=null");
    }

    #[test]
    fn test_format_var_structured() {
        assert_eq!(
            format_var("azs", &json!(["eu-west-1a", "eu-west-1b"])),
            r#"azs=["eu-west-1a","eu-west-1b"]"#
        );
        assert_eq!(
            format_var("tags", &json!({"Environment": "test"})),
            r#"tags={"Environment":"test"}"#
        );
    }

    #[test]
    fn test_tail_keeps_last_lines() {
        let text = "one\ntwo\nthree\nfour\n";
        assert_eq!(tail(text, 2), "three\nfour");
        assert_eq!(tail(text, 10), "one\ntwo\nthree\nfour");
        assert_eq!(tail("", 3), "");
    }
}
