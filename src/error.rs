use std::{io, path::PathBuf};

use thiserror::Error;

/// Errors that can stop a conversion run
#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("Source file not found: {}", path.display())]
    SourceNotFound { path: PathBuf },
    #[error("Access denied: {}", path.display())]
    AccessDenied {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to open source file {}: {source}", path.display())]
    OpenSource {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to create destination file {}: {source}", path.display())]
    CreateDestination {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Invalid UTF-8 in record {record} (line {line}), field {field}")]
    Decode { line: u64, record: u64, field: usize },
    #[error("Failed to read record: {0}")]
    Read(#[source] io::Error),
    #[error("Failed to write record: {0}")]
    Write(#[source] io::Error),
    #[error("Malformed csv: {0}")]
    Malformed(#[source] csv::Error),
}

impl ConvertError {
    /// Maps a failure to open the source file
    pub fn from_source_open(path: PathBuf, err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => Self::SourceNotFound { path },
            io::ErrorKind::PermissionDenied => Self::AccessDenied { path, source: err },
            _ => Self::OpenSource { path, source: err },
        }
    }

    /// Maps a failure to create the destination file
    pub fn from_destination_create(path: PathBuf, err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::PermissionDenied => Self::AccessDenied { path, source: err },
            _ => Self::CreateDestination { path, source: err },
        }
    }

    /// Maps an error returned by `csv::Reader`
    pub fn from_read(err: csv::Error) -> Self {
        if let csv::ErrorKind::Utf8 { pos, err: utf8 } = err.kind() {
            return Self::Decode {
                line: pos.as_ref().map_or(0, |pos| pos.line()),
                record: pos.as_ref().map_or(0, |pos| pos.record()),
                field: utf8.field(),
            };
        }

        match io_error(err) {
            Ok(err) => Self::Read(err),
            Err(err) => Self::Malformed(err),
        }
    }

    /// Maps an error returned by `csv::Writer`
    pub fn from_write(err: csv::Error) -> Self {
        match io_error(err) {
            Ok(err) => Self::Write(err),
            Err(err) => Self::Malformed(err),
        }
    }
}

/// Unwraps the `io::Error` inside a csv error, handing back any other kind untouched
fn io_error(err: csv::Error) -> Result<io::Error, csv::Error> {
    if !err.is_io_error() {
        return Err(err);
    }
    match err.into_kind() {
        csv::ErrorKind::Io(err) => Ok(err),
        kind => unreachable!("is_io_error but kind is {kind:?}"),
    }
}
