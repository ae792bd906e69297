//! Entry point for the `klishd` binary.

use std::path::PathBuf;

use clap::Parser;
use klish_daemon::Config;

#[derive(Parser, Debug)]
#[command(name = "klishd", version, about = "Modal CLI daemon")]
struct Cli {
    /// Configuration file.
    #[arg(long, short = 'f')]
    config: Option<PathBuf>,

    /// Listen socket path (overrides the config file).
    #[arg(long, short = 'S')]
    socket: Option<PathBuf>,

    /// Scheme file (JSON); may repeat, overrides the config file.
    #[arg(long, short = 's')]
    scheme: Vec<PathBuf>,

    /// Start view (overrides the config file).
    #[arg(long)]
    start_view: Option<String>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(socket) = cli.socket {
        config.socket = socket;
    }
    if !cli.scheme.is_empty() {
        config.scheme = cli.scheme;
    }
    if let Some(start_view) = cli.start_view {
        config.start_view = start_view;
    }
    if config.scheme.is_empty() {
        anyhow::bail!("no scheme files configured");
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(klish_daemon::run(config))
}
