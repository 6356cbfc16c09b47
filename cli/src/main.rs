//! Thin binary entry point. Parses arguments, then hands off to
//! [`conveyor_cli::run::run_main`] — everything below that call returns a
//! typed error; `anyhow` is used only here, at main's edge, to format a
//! fatal error for the terminal and set the process exit code.

use clap::Parser;
use conveyor_cli::cli::Cli;
use conveyor_cli::run::run_main;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(err) = run_main(cli).await {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
