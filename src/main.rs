use std::process::ExitCode;

use clap::{ArgAction, Parser};
use houseq::commands::{configure, query, Commands, QueryArgs};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None, disable_help_flag = true)]
struct Cli {
    #[command(subcommand)]
    cmd: Option<Commands>,

    #[command(flatten)]
    args: QueryArgs,

    /// Print help
    #[arg(long, action = ArgAction::Help)]
    help: Option<bool>,
}

fn init_logging(debug: bool) {
    let default = if debug { "houseq=debug" } else { "warn" };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.args.debug);

    let result = match cli.cmd {
        Some(Commands::Configure(args)) => configure(args).map(|_| true),
        None => query(cli.args).await,
    };

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("{}", e);
            ExitCode::FAILURE
        }
    }
}
