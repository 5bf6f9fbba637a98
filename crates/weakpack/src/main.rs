use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use log::debug;
use weakpack::{Bundler, Config, config::OutputConfig, plugins};

/// Bundle a JavaScript entry module and everything it imports into one file
#[derive(Parser, Debug)]
#[command(name = "weakpack", author, version, about, long_about = None)]
struct Cli {
    /// Configuration file, layered on top of user and project configuration
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Entry module, relative to the context directory
    #[arg(short, long)]
    entry: Option<PathBuf>,

    /// Directory module ids are relative to
    #[arg(long)]
    context: Option<PathBuf>,

    /// Directory to write assets to
    #[arg(long)]
    output_path: Option<PathBuf>,

    /// Bundle file name; `[contenthash]` is replaced by a digest of the bundle
    #[arg(long)]
    output_filename: Option<String>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn overrides(&self) -> Config {
        Config {
            entry: self.entry.clone(),
            context: self.context.clone(),
            output: OutputConfig {
                path: self.output_path.clone(),
                filename: self.output_filename.clone(),
            },
            ..Config::default()
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = Config::load(cli.config.as_deref())
        .context("failed to load configuration")?
        .merge(cli.overrides());
    debug!("Effective configuration: {config:?}");

    let options = config.into_options()?;
    let plugins = plugins::from_config(&options.plugins)?;
    let bundler = Bundler::new(options, plugins)?;
    bundler.bundle().await.context("build failed")?;
    Ok(())
}
