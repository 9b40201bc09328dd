use std::process::ExitCode;

use clap::Parser;
use csv_semicolon::{ConvertCsvInput, process_csv};
use tracing_subscriber::EnvFilter;

pub fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match process_csv(&ConvertCsvInput::parse()) {
        Ok(_) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "conversion failed");
            ExitCode::FAILURE
        }
    }
}
