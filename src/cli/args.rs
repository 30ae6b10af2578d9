use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand, ValueEnum};

use tfconverge::output::ReportFormat;

#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Log verbosity: info by default, -v debug, -vv debug for dependencies too; RUST_LOG wins
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Drive every scenario through its variants and verify convergence
    Run(RunArgs),
    /// Load and check a scenario file without running anything
    Validate(ValidateArgs),
    /// Extract the change summary from saved plan or apply output
    Summary(SummaryArgs),
}

#[derive(clap::Args, Debug)]
pub struct RunArgs {
    /// Scenario file (.toml or .json)
    pub file: PathBuf,

    /// Scenarios to run concurrently
    #[arg(short, long, env = "TFCONVERGE_JOBS", default_value_t = 1)]
    pub jobs: usize,

    /// Run only the named scenario (repeatable)
    #[arg(long = "only", value_name = "SCENARIO")]
    pub only: Vec<String>,

    /// Provisioning engine: terraform, tofu or opentofu
    #[arg(long, env = "TFCONVERGE_ENGINE", default_value = "terraform")]
    pub engine: String,

    /// Engine binary, overriding the engine's default name
    #[arg(long, env = "TFCONVERGE_TERRAFORM_BIN")]
    pub terraform_bin: Option<PathBuf>,

    /// Share a provider plugin cache between scenarios
    #[arg(long)]
    pub plugin_cache: bool,

    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    pub format: OutputFormat,
}

#[derive(clap::Args, Debug)]
pub struct ValidateArgs {
    pub file: PathBuf,
}

#[derive(clap::Args, Debug)]
pub struct SummaryArgs {
    /// File holding engine output; reads stdin when omitted
    pub file: Option<PathBuf>,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Table,
    Tree,
    Json,
}

impl From<OutputFormat> for ReportFormat {
    fn from(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Table => ReportFormat::Table,
            OutputFormat::Tree => ReportFormat::Tree,
            OutputFormat::Json => ReportFormat::Json,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use serial_test::serial;

    fn run_args(cli: Cli) -> RunArgs {
        match cli.command {
            Command::Run(args) => args,
            other => panic!("Expected Run command, got {:?}", other),
        }
    }

    #[test]
    #[serial]
    fn test_run_defaults() {
        let jobs_backup = std::env::var("TFCONVERGE_JOBS").ok();
        let bin_backup = std::env::var("TFCONVERGE_TERRAFORM_BIN").ok();
        let engine_backup = std::env::var("TFCONVERGE_ENGINE").ok();
        unsafe {
            std::env::remove_var("TFCONVERGE_JOBS");
            std::env::remove_var("TFCONVERGE_TERRAFORM_BIN");
            std::env::remove_var("TFCONVERGE_ENGINE");
        }

        let cli = Cli::parse_from(["tfconverge", "run", "scenarios.toml"]);

        unsafe {
            if let Some(jobs) = jobs_backup {
                std::env::set_var("TFCONVERGE_JOBS", jobs);
            }
            if let Some(bin) = bin_backup {
                std::env::set_var("TFCONVERGE_TERRAFORM_BIN", bin);
            }
            if let Some(engine) = engine_backup {
                std::env::set_var("TFCONVERGE_ENGINE", engine);
            }
        }

        assert_eq!(cli.verbose, 0);
        let args = run_args(cli);
        assert_eq!(args.file, PathBuf::from("scenarios.toml"));
        assert_eq!(args.jobs, 1);
        assert!(args.only.is_empty());
        assert_eq!(args.engine, "terraform");
        assert!(args.terraform_bin.is_none());
        assert!(!args.plugin_cache);
        assert_eq!(args.format, OutputFormat::Table);
    }

    #[test]
    fn test_run_flags() {
        let cli = Cli::parse_from([
            "tfconverge",
            "-vv",
            "run",
            "test/scenarios.toml",
            "--jobs=4",
            "--only",
            "complete",
            "--only",
            "unit-minimal",
            "--engine",
            "tofu",
            "--terraform-bin=/usr/local/bin/tofu",
            "--plugin-cache",
            "--format",
            "json",
        ]);

        assert_eq!(cli.verbose, 2);
        let args = run_args(cli);
        assert_eq!(args.jobs, 4);
        assert_eq!(args.only, vec!["complete", "unit-minimal"]);
        assert_eq!(args.engine, "tofu");
        assert_eq!(args.terraform_bin, Some(PathBuf::from("/usr/local/bin/tofu")));
        assert!(args.plugin_cache);
        assert_eq!(args.format, OutputFormat::Json);
    }

    #[test]
    #[serial]
    fn test_jobs_from_env_var_fallback() {
        let backup = std::env::var("TFCONVERGE_JOBS").ok();

        unsafe {
            std::env::set_var("TFCONVERGE_JOBS", "8");
        }

        let cli = Cli::parse_from(["tfconverge", "run", "scenarios.toml"]);

        unsafe {
            match backup {
                Some(jobs) => std::env::set_var("TFCONVERGE_JOBS", jobs),
                None => std::env::remove_var("TFCONVERGE_JOBS"),
            }
        }

        assert_eq!(run_args(cli).jobs, 8);
    }

    #[test]
    #[serial]
    fn test_cli_flag_takes_precedence_over_env() {
        let backup = std::env::var("TFCONVERGE_TERRAFORM_BIN").ok();

        unsafe {
            std::env::set_var("TFCONVERGE_TERRAFORM_BIN", "/env/terraform");
        }

        let cli = Cli::parse_from([
            "tfconverge",
            "run",
            "scenarios.toml",
            "--terraform-bin=/cli/terraform",
        ]);

        unsafe {
            match backup {
                Some(bin) => std::env::set_var("TFCONVERGE_TERRAFORM_BIN", bin),
                None => std::env::remove_var("TFCONVERGE_TERRAFORM_BIN"),
            }
        }

        assert_eq!(
            run_args(cli).terraform_bin,
            Some(PathBuf::from("/cli/terraform"))
        );
    }

    #[test]
    fn test_validate_command() {
        let cli = Cli::parse_from(["tfconverge", "validate", "scenarios.json"]);
        match cli.command {
            Command::Validate(args) => assert_eq!(args.file, PathBuf::from("scenarios.json")),
            other => panic!("Expected Validate command, got {:?}", other),
        }
    }

    #[test]
    fn test_summary_reads_stdin_without_file() {
        let cli = Cli::parse_from(["tfconverge", "summary"]);
        match cli.command {
            Command::Summary(args) => assert!(args.file.is_none()),
            other => panic!("Expected Summary command, got {:?}", other),
        }
    }

    #[test]
    fn test_run_requires_file() {
        assert!(Cli::try_parse_from(["tfconverge", "run"]).is_err());
    }

    #[test]
    fn test_output_format_conversion() {
        assert_eq!(ReportFormat::from(OutputFormat::Tree), ReportFormat::Tree);
        assert_eq!(ReportFormat::from(OutputFormat::Json), ReportFormat::Json);
    }
}
