mod cli;
mod config;
mod engine;
mod error;
mod log;
mod orchestrator;
mod path;

use anyhow::Result;
use clap::Parser;
use cli::Cli;
use colored::Colorize;
use config::Config;
use crate::log::{ConsoleSink, SessionLog};
use orchestrator::{Orchestrator, EXIT_CONFIG_ERROR};
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() {
    match run().await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            std::process::exit(EXIT_CONFIG_ERROR);
        }
    }
}

async fn run() -> Result<i32> {
    // The start instant names the session log file
    let started = chrono::Local::now();

    let mut cli = Cli::parse();

    let config = Config::load()?;

    // Handle profile-only flags (print and exit)
    if cli.list_profiles {
        let profiles = config.list_profiles();
        if profiles.is_empty() {
            println!("No profiles configured");
            println!("\nCreate profiles in: {}", Config::config_path()?.display());
        } else {
            println!("Available profiles:");
            for name in profiles {
                println!("  {}", name);
            }
        }
        return Ok(orchestrator::EXIT_SUCCESS);
    }

    if let Some(ref profile_name) = cli.show_profile {
        match config.show_profile(profile_name) {
            Some(output) => {
                println!("{}", output);
                return Ok(orchestrator::EXIT_SUCCESS);
            }
            None => anyhow::bail!("Profile '{}' not found", profile_name),
        }
    }

    // Merge profile with CLI args if --profile is set
    if let Some(ref profile_name) = cli.profile {
        let profile = config
            .get_profile(profile_name)
            .ok_or_else(|| anyhow::anyhow!("Profile '{}' not found", profile_name))?;
        cli.apply_profile(profile)?;
    }

    cli.validate()?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.log_level().as_str()));

    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();

    let (Some(source), Some(destination)) = (cli.source.as_ref(), cli.destination.as_ref()) else {
        anyhow::bail!("Source and destination folders are required (or use --profile)");
    };

    let log = SessionLog::open(&cli.log_dir(), &started, ConsoleSink::new(cli.console_mode()))?;

    let kind = cli.engine_kind();
    let engine = engine::build(kind, cli.rsync_path.as_deref());
    tracing::debug!("Using {} engine", kind);

    let orchestrator = Orchestrator::new(engine.as_ref(), &log, cli.dry_run, &cli.exclude);
    tracing::debug!("Engine options: {:?}", orchestrator.options());

    let outcome = orchestrator.run(source, destination).await;
    for pass in &outcome.passes {
        tracing::debug!(
            "{} pass: success={} exit code {:?}",
            pass.direction,
            pass.result.success,
            pass.result.exit_code
        );
    }
    Ok(outcome.exit_code())
}
