mod cli;

use std::io::Read;

use clap::Parser;
use color_eyre::eyre::Result;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Command, RunArgs, SummaryArgs, ValidateArgs};
use tfconverge::{EngineConfig, TfConvergeError, cache, engine, output, scenario, sequencer, summary};

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(cli.verbose)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Run(args) => run(args).await?,
        Command::Validate(args) => validate(args)?,
        Command::Summary(args) => print_summary(args)?,
    }

    Ok(())
}

fn default_filter(verbose: u8) -> &'static str {
    match verbose {
        0 => "tfconverge=info",
        1 => "tfconverge=debug",
        _ => "debug",
    }
}

async fn run(args: RunArgs) -> Result<(), TfConvergeError> {
    let scenarios = scenario::select(scenario::load(&args.file)?, &args.only)?;

    let plugin_cache = if args.plugin_cache {
        if args.jobs > 1 {
            tracing::warn!("plugin cache is shared by concurrent scenarios");
        }
        cache::plugin_cache_dir()
    } else {
        None
    };

    let engine = engine::get_engine(
        &args.engine,
        EngineConfig {
            binary: args.terraform_bin,
            plugin_cache,
        },
    )?;

    let total = scenarios.len();
    tracing::info!(engine = engine.name(), scenarios = total, jobs = args.jobs, "starting");

    let outcomes = sequencer::run_scenarios(scenarios, engine, args.jobs).await;
    println!("{}", output::render(&outcomes, args.format.into())?);

    let failed = outcomes.iter().filter(|outcome| outcome.is_err()).count();
    if failed > 0 {
        return Err(TfConvergeError::ScenariosFailed { failed, total });
    }
    Ok(())
}

fn validate(args: ValidateArgs) -> Result<(), TfConvergeError> {
    let scenarios = scenario::load(&args.file)?;
    println!("{}", output::render_scenarios(&scenarios));
    Ok(())
}

fn print_summary(args: SummaryArgs) -> Result<(), TfConvergeError> {
    let text = match args.file {
        Some(path) => std::fs::read_to_string(path)?,
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };
    let summary = summary::parse(&text)?;
    println!("{}", serde_json::to_string(&summary)?);
    Ok(())
}
