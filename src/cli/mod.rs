// src/cli/mod.rs — CLI definition (clap derive)

pub mod progress;
pub mod run;

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "dockersmith",
    about = "Generate, build and validate a Dockerfile for a script",
    version
)]
pub struct Cli {
    /// Script to containerize (.py, .js, .sh, ...)
    pub script: PathBuf,

    /// Example invocation used to validate the image, e.g. "python app.py --n 3"
    #[arg(short, long)]
    pub example: Option<String>,

    /// Output directory for the Dockerfile and build context
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Spending ceiling in USD for generation calls
    #[arg(short, long)]
    pub budget: Option<f64>,

    /// Maximum generate-build-validate cycles
    #[arg(long)]
    pub max_attempts: Option<u32>,

    /// Require the example invocation itself to succeed
    #[arg(long)]
    pub strict: bool,

    /// Text the example run must print (implies --strict)
    #[arg(long)]
    pub expected_output: Option<String>,

    /// Chat model to generate with
    #[arg(short, long)]
    pub model: Option<String>,

    /// API key (defaults to the configured environment variable)
    #[arg(long)]
    pub api_key: Option<String>,

    /// Config file path
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Print the result as JSON on stdout
    #[arg(long)]
    pub json: bool,

    /// Suppress progress output
    #[arg(short, long)]
    pub quiet: bool,
}
