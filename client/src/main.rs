//! Entry point for the `klish` binary: the interactive (or scripted)
//! client for a running `klishd`.

use std::io::IsTerminal;
use std::io::Read;
use std::path::PathBuf;

use clap::Parser;
use klish_client::ClientSession;
use klish_client::run_commands;
use klish_client::run_interactive;

#[derive(Parser, Debug)]
#[command(name = "klish", version, about = "Interactive client for klishd")]
struct Cli {
    /// Daemon socket path.
    #[arg(long, short = 'S', default_value = "/tmp/klish-unix.sock")]
    socket: PathBuf,

    /// Execute the given command line and exit; may repeat.
    #[arg(long = "command", short = 'c')]
    commands: Vec<String>,

    /// Parse and plan without running non-permanent actions.
    #[arg(long)]
    dry_run: bool,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let retcode = runtime.block_on(run_main(cli))?;
    // The wire carries a single byte; the exit code does too.
    std::process::exit(retcode & 0xff)
}

async fn run_main(cli: Cli) -> anyhow::Result<i32> {
    let mut session = ClientSession::connect(&cli.socket).await.map_err(|e| {
        anyhow::anyhow!("can't connect to {}: {e}", cli.socket.display())
    })?;

    if !cli.commands.is_empty() {
        return run_commands(&mut session, &cli.commands, cli.dry_run).await;
    }
    if std::io::stdin().is_terminal() {
        return run_interactive(&mut session, cli.dry_run).await;
    }
    // Script on stdin: one command per line.
    let mut script = String::new();
    std::io::stdin().read_to_string(&mut script)?;
    let lines: Vec<String> = script.lines().map(str::to_string).collect();
    run_commands(&mut session, &lines, cli.dry_run).await
}
