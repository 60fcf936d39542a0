use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use spindle_runner::{ConfigLoadError, HostRunner, SpindleConfig, init_logging};
use tracing::info;

#[derive(Parser)]
#[command(version = env!("VERSION_STRING"), about, long_about = None)]
pub struct Cli {
    /// Enables debug logging (-dd for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    debug: u8,

    /// Config file to use instead of the default location
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory to load scripts from
    #[arg(short, long)]
    scripts: Option<PathBuf>,

    /// Stop once no task is waiting on a delay
    #[arg(long)]
    exit_when_idle: bool,

    /// Also write logs to the data directory
    #[arg(long)]
    log_file: bool,

    /// Write an example config and exit
    #[arg(long)]
    init: bool,
}

impl Cli {
    fn default_filter(&self) -> &'static str {
        match self.debug {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<(SpindleConfig, Option<PathBuf>)> {
    if let Some(path) = &cli.config {
        let config = SpindleConfig::load_from(path)
            .with_context(|| format!("Could not load config {}", path.display()))?;
        return Ok((config, Some(path.clone())));
    }

    let path = SpindleConfig::config_path();
    match SpindleConfig::load_from(&path) {
        Ok(config) => Ok((config, Some(path))),
        Err(ConfigLoadError::NotFound) => Ok((SpindleConfig::default(), None)),
        Err(e) => Err(e).with_context(|| format!("Could not load config {}", path.display())),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.init {
        let path = cli.config.clone().unwrap_or_else(SpindleConfig::config_path);
        if path.exists() {
            anyhow::bail!("Config already exists at {}", path.display());
        }
        SpindleConfig::write_example(&path)?;
        eprintln!("Config file created at: {}", path.display());
        return Ok(());
    }

    let (config, config_path) = load_config(&cli)?;

    let _guard = init_logging(
        "spindle",
        cli.log_file || config.logging.file,
        cli.default_filter(),
    )
    .context("Failed to initialize logging")?;

    match &config_path {
        Some(path) => info!("Using config {}", path.display()),
        None => info!("No config found, using defaults (run with --init to create one)"),
    }

    let mut builder = HostRunner::builder().with_config(config);
    if let Some(dir) = cli.scripts {
        builder = builder.script_dir(dir);
    }
    if cli.exit_when_idle {
        builder = builder.exit_when_idle(true);
    }

    info!("Starting spindle host...");
    let summary = builder.build()?.run().await;
    summary.print_final();

    Ok(())
}
