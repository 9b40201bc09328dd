pub mod converter;
pub mod delimiter;
pub mod error;
pub mod utils;

use clap::Parser;
use std::path::{Path, PathBuf};

use crate::{
    converter::{ConversionSummary, DelimiterConverter},
    error::ConvertError,
    utils::default_destination,
};

/// Source used when none is given on the command line
pub const DEFAULT_SOURCE: &str = "input.csv";

/// Input for the csv-semicolon program
#[derive(Parser)]
#[command(about = "Rewrites a comma-delimited csv file with a semicolon delimiter")]
pub struct ConvertCsvInput {
    /// The comma-delimited csv file to read
    #[arg(default_value = DEFAULT_SOURCE)]
    source: PathBuf,
    /// Where to write the semicolon-delimited csv. Defaults to `<source stem>_converted.<ext>`
    /// next to the source
    destination: Option<PathBuf>,
}

impl ConvertCsvInput {
    pub fn new(source: impl Into<PathBuf>, destination: Option<PathBuf>) -> Self {
        Self {
            source: source.into(),
            destination,
        }
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn destination(&self) -> PathBuf {
        self.destination
            .clone()
            .unwrap_or_else(|| default_destination(&self.source))
    }
}

/// Converts the source csv into the destination and prints a completion notice to stdout.
///
/// # Errors
///
/// Any [`ConvertError`] raised while opening, reading or writing. No notice is printed then.
pub fn process_csv(input: &ConvertCsvInput) -> Result<ConversionSummary, ConvertError> {
    let summary = DelimiterConverter::default().convert_file(input.source(), &input.destination())?;
    println!("Conversion complete!");

    Ok(summary)
}
