//! pydiff CLI
//!
//! Compares two Python files at the bytecode level.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgAction, Parser};
use pydiff::{DiffConfig, Error};
use tracing::Level;

#[derive(Debug, Parser)]
#[command(name = "pydiff", version)]
#[command(about = "Diff two Python files at the bytecode level", long_about = None)]
struct Cli {
    /// Original file
    file_a: PathBuf,
    /// Changed file
    file_b: PathBuf,
    /// Lines of context around each change
    #[arg(short = 'U', long, default_value_t = pydiff::DEFAULT_CONTEXT)]
    context: usize,
    /// More log output on stderr; repeat for more
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = DiffConfig {
        context: cli.context,
    };
    match pydiff::diff_bytecode_of_files(&cli.file_a, &cli.file_b, &config) {
        Ok(diff) => {
            if !diff.is_empty() {
                println!("{diff}");
            }
            ExitCode::SUCCESS
        }
        Err(Error::Syntax(error)) => {
            tracing::info!(message = %error.message, "syntax error");
            eprint!("{}", error.diagnostic());
            ExitCode::from(1)
        }
        Err(error) => {
            let error = anyhow::Error::new(error).context(format!(
                "comparing {} with {}",
                cli.file_a.display(),
                cli.file_b.display()
            ));
            eprintln!("error: {error:#}");
            ExitCode::from(2)
        }
    }
}
