//! Polyflow CLI — translate one workflow IR into Nextflow, CWL or WDL.

use clap::Parser;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "polyflow",
    version,
    about = "Translate tool and workflow IR into Nextflow, CWL and WDL"
)]
struct Cli {
    #[command(subcommand)]
    command: polyflow::cli::Commands,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("polyflow=info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(e) = polyflow::cli::dispatch(cli.command) {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}
