//! Entry point: wires up logging, reads an instruction script from a
//! file argument or stdin, and drives the engine.

use std::fs::File;
use std::io::{self, BufReader};
use std::path::PathBuf;
use std::process::ExitCode;

use repcrec::cli;
use repcrec::Engine;

fn main() -> ExitCode {
    tracing_subscriber::fmt().with_target(false).init();

    let mut engine = Engine::with_defaults();
    let stdout = io::stdout();

    let result = match std::env::args().nth(1).map(PathBuf::from) {
        Some(path) => match File::open(&path) {
            Ok(file) => cli::run(&mut engine, BufReader::new(file), stdout.lock()),
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "failed to open input file");
                return ExitCode::FAILURE;
            }
        },
        None => cli::run(&mut engine, io::stdin().lock(), stdout.lock()),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "protocol violation, aborting");
            ExitCode::FAILURE
        }
    }
}
