// src/main.rs — dockersmith entry point

use clap::Parser;

use dockersmith::cli::{self, Cli};
use dockersmith::core::cancel::cancel_pair;
use dockersmith::core::types::TerminalReason;
use dockersmith::infra::config::Config;
use dockersmith::infra::logger;

#[tokio::main]
async fn main() {
    // Respects DOCKERSMITH_LOG / RUST_LOG
    logger::init_logging("warn");

    match run().await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    }
}

async fn run() -> anyhow::Result<i32> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    cli::run::apply_overrides(&cli, &mut config);

    let (cancel_handle, cancel) = cancel_pair();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\n[cancel] stopping after the current step...");
            cancel_handle.cancel();
        }
    });

    let outcome = cli::run::run_generate(&cli, &config, cancel).await?;
    print!("{}", cli::run::render(&outcome, cli.json)?);
    if cli.json {
        println!();
    }

    Ok(match outcome.result.reason {
        TerminalReason::Succeeded => 0,
        TerminalReason::Cancelled => 130,
        _ => 1,
    })
}
