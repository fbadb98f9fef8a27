//! udm CLI — fetch the dependency tree declared in `dependencies.json`.

mod commands;

use std::path::{Path, PathBuf};
use std::process;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use udm_registry::{ResolverConfig, CONFIG_FILE};

#[derive(Parser)]
#[command(name = "udm", version, about = "Fetch versioned dependencies into a local cache")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Config file (default: ./udm.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Root manifest (default: ./dependencies.json)
    #[arg(long, global = true)]
    manifest: Option<PathBuf>,

    /// Cache directory (default: ./dependencies)
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,

    /// Base URL of the hosting service
    #[arg(long, global = true)]
    host: Option<String>,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve and fetch every dependency in the manifest (default)
    Install,
    /// List package versions present in the cache
    Cached,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = run(cli);
    if let Err(e) = result {
        eprintln!("error: {e:#}");
        process::exit(1);
    }
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let cwd = std::env::current_dir()?;
    let config = load_config(&cwd, &cli)?;

    match cli.command.unwrap_or(Commands::Install) {
        Commands::Install => {
            let manifest_path = cli
                .manifest
                .unwrap_or_else(|| cwd.join(&config.manifest_file));
            commands::install::run(&cwd, &config, &manifest_path)
        }
        Commands::Cached => commands::cached::run(&cwd, &config),
    }
}

/// Read the config file, then apply command-line overrides.
fn load_config(cwd: &Path, cli: &Cli) -> anyhow::Result<ResolverConfig> {
    let path = match &cli.config {
        Some(path) => {
            if !path.is_file() {
                anyhow::bail!("config file {} not found", path.display());
            }
            path.clone()
        }
        None => cwd.join(CONFIG_FILE),
    };
    let mut config = ResolverConfig::load_or_default(&path)
        .with_context(|| format!("loading {}", path.display()))?;

    if let Some(cache_dir) = &cli.cache_dir {
        config.cache_dir = cache_dir.clone();
    }
    if let Some(host) = &cli.host {
        config.host = host.clone();
    }
    Ok(config)
}
