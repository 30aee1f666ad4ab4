//! Tejer CLI — infrastructure composition engine.

use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "tejer",
    version,
    about = "Infrastructure composition engine: typed cross-stack references, dependency-ordered synthesis"
)]
struct Cli {
    #[command(subcommand)]
    command: tejer::cli::Commands,
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = tejer::cli::dispatch(cli.command) {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}
