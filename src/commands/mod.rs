mod build;
mod clean;
mod render;
mod routes;

use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::build::{Engine, Overrides};
use crate::cache::ContentCache;
use crate::cli::{Command, SiteArgs};
use crate::config::resolve_site_root;
use crate::utils::log_status;

pub fn run(command: Command) -> Result<()> {
    match command {
        Command::Build(args) => build::run_build_command(args),
        Command::Clean(args) => clean::run_clean_command(args),
        Command::Render(args) => render::run_render_command(args),
        Command::Routes(args) => routes::run_routes_command(args),
    }
}

/// `--source` when given, else the nearest ancestor holding `_config.yml`,
/// else the current directory.
fn site_root(args: &SiteArgs) -> Result<PathBuf> {
    let current = env::current_dir().context("failed to determine current directory")?;
    resolve_site_root(args.source.as_deref(), &current)
}

fn overrides(args: &SiteArgs, incremental: bool) -> Overrides {
    Overrides {
        destination: args.destination.clone(),
        incremental,
        drafts: args.drafts,
    }
}

fn open_engine(args: &SiteArgs, incremental: bool) -> Result<Engine> {
    let root = site_root(args)?;
    log_status(args.verbose, "STEP", format!("site root {}", root.display()));
    let engine = Engine::load(
        &root,
        overrides(args, incremental),
        ContentCache::from_env(),
        args.verbose,
    )?;
    if !args.verbose {
        for warning in &engine.snapshot().site.warnings {
            eprintln!("warning: {warning}");
        }
    }
    Ok(engine)
}
