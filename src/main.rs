mod cli;
mod commands;
mod components;
mod config;
mod progress;
mod runner;
mod snapshot;
mod ui;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command};
use config::Config;
use intelligence::EngineOptions;
use std::io;
use std::path::PathBuf;

/// Global context for the application
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
    pub json: bool,
    pub config: Config,
    /// Resolved snapshot path
    pub snapshot: PathBuf,
    pub engine: EngineOptions,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .format_timestamp(None)
        .init();

    if let Command::Completions { shell } = cli.command {
        let mut cmd = Cli::command();
        generate(shell, &mut cmd, "veritech", &mut io::stdout());
        return Ok(());
    }

    // Doctor reports a broken config itself instead of failing here
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) if matches!(cli.command, Command::Doctor) => {
            log::warn!("{e:#}");
            Config::default()
        }
        Err(e) => return Err(e),
    };

    let ctx = Context {
        verbose: cli.verbose,
        quiet: cli.quiet,
        json: cli.json,
        snapshot: config.snapshot_path(cli.snapshot.as_deref()),
        engine: config.engine_options(cli.jobs, cli.timeout),
        config,
    };
    log::debug!(
        "Using snapshot {} ({} jobs, timeout {:?})",
        ctx.snapshot.display(),
        ctx.engine.jobs,
        ctx.engine.command_timeout
    );

    match cli.command {
        Command::Graph => commands::graph::run(&ctx),
        Command::Infer { write } => commands::infer::run(&ctx, write),
        Command::Sync {
            entity,
            no_infer,
            write,
        } => commands::sync::run(&ctx, entity.as_deref(), no_infer, write),
        Command::Action {
            name,
            entity,
            context,
            write,
        } => commands::action::run(&ctx, &name, &entity, context.as_deref(), write),
        Command::Doctor => commands::doctor::run(&ctx),
        Command::Completions { .. } => Ok(()),
    }
}
