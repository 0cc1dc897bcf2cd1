mod cmd;
mod progress;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, CommandFactory, Parser, Subcommand};
use shuck::unpack::RuntimeKind;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "shuck")]
#[command(about = "Unpack a container image and report on its contents")]
#[command(version)]
struct Cli {
    /// Verbose diagnostics on stderr (RUST_LOG overrides)
    #[arg(long, global = true)]
    debug: bool,

    #[command(flatten)]
    analyze: AnalyzeArgs,

    #[command(subcommand)]
    command: Option<Commands>,

    /// Image name or path to a tar archive (shorthand for `shuck analyze <image>`)
    image: Option<String>,
}

#[derive(Args, Clone, Debug, Default)]
pub struct AnalyzeArgs {
    /// Output as JSON (optionally to a file)
    #[arg(long, global = true, num_args = 0..=1, default_missing_value = "-", value_name = "FILE")]
    pub json: Option<String>,

    /// Include every file and directory path in the report
    #[arg(long, global = true)]
    pub verbose: bool,

    /// Configuration file (default: ./shuck.json, then ~/.config/shuck/config.json)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Number of largest files to report (0 = all)
    #[arg(long, global = true, value_name = "N")]
    pub top_files: Option<usize>,

    /// Number of largest directories to report (0 = all)
    #[arg(long, global = true, value_name = "N")]
    pub top_dirs: Option<usize>,

    /// Runtime used to save named images (docker, podman, containerd)
    #[arg(long, global = true, default_value_t = RuntimeKind::Docker)]
    pub runtime: RuntimeKind,

    /// Keep the unpacked tree and print its location
    #[arg(long, global = true)]
    pub keep: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Unpack an image and analyze its filesystem
    Analyze {
        /// Image name or path to a tar archive
        image: String,
    },

    /// Manage the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Write the default configuration
    Init {
        /// Destination (default: ~/.config/shuck/config.json)
        path: Option<PathBuf>,
    },

    /// Print the effective configuration as JSON
    Show,
}

fn init_logging(debug: bool) {
    let env_filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if debug {
        EnvFilter::new("warn,shuck=debug")
    } else {
        EnvFilter::new("warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.debug);
    debug!(debug = cli.debug, "logging initialized");

    // Resolve: `shuck <image>` is shorthand for `shuck analyze <image>`
    match cli.command {
        Some(Commands::Analyze { image }) => cmd::analyze::run(&image, &cli.analyze).await,
        Some(Commands::Config { action }) => match action {
            ConfigAction::Init { path } => cmd::config::init(path.as_deref()),
            ConfigAction::Show => cmd::config::show(cli.analyze.config.as_deref()),
        },
        None => match cli.image {
            Some(image) => cmd::analyze::run(&image, &cli.analyze).await,
            None => {
                Cli::command().print_help()?;
                Ok(())
            }
        },
    }
}
