use std::path::{Path, PathBuf};

use crate::delimiter::Delimiter;

/// Builds a reader that yields every line as a record, header included, and accepts rows of any
/// width
pub fn csv_reader<R: std::io::Read>(r: R, delimiter: Delimiter) -> csv::Reader<R> {
    csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(delimiter.as_byte())
        .from_reader(r)
}

/// What [`csv_writer`] ends every record with
pub const RECORD_TERMINATOR: &[u8] = b"\r\n";

/// Builds a writer that quotes only when needed and ends records with CRLF
pub fn csv_writer<W: std::io::Write>(w: W, delimiter: Delimiter) -> csv::Writer<W> {
    csv::WriterBuilder::new()
        .flexible(true)
        .delimiter(delimiter.as_byte())
        .quote_style(csv::QuoteStyle::Necessary)
        .terminator(csv::Terminator::CRLF)
        .from_writer(w)
}

/// `dir/name.ext` -> `dir/name_converted.ext`
pub fn default_destination(source: &Path) -> PathBuf {
    let mut name = source.file_stem().unwrap_or_default().to_os_string();
    name.push("_converted");
    if let Some(ext) = source.extension() {
        name.push(".");
        name.push(ext);
    }
    source.with_file_name(name)
}
