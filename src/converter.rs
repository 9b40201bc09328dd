use std::{
    fs::File,
    io::{self, Write},
    path::Path,
};

use tracing::{debug, info, trace};

use crate::{
    delimiter::Delimiter,
    error::ConvertError,
    utils::{RECORD_TERMINATOR, csv_reader, csv_writer},
};

/// What a finished conversion wrote
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConversionSummary {
    pub records: u64,
    pub fields: u64,
}

/// Rewrites csv records from one delimiter to another, leaving field contents untouched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelimiterConverter {
    pub input: Delimiter,
    pub output: Delimiter,
}

impl Default for DelimiterConverter {
    fn default() -> Self {
        Self {
            input: Delimiter::Comma,
            output: Delimiter::Semicolon,
        }
    }
}

impl DelimiterConverter {
    /// The converter going the other way
    pub fn reversed(&self) -> Self {
        Self {
            input: self.output,
            output: self.input,
        }
    }

    /// Converts every record from `r` into `w`, in order, and flushes `w`.
    ///
    /// The source is read in full before the first record is written. Blank lines come out as
    /// bare terminators and a leading UTF-8 BOM stays at the front of the first field.
    ///
    /// # Errors
    ///
    /// Fails on the first record that can't be read (I/O or invalid UTF-8) or written. Records
    /// written before the failure stay in `w`.
    pub fn convert_stream<R, W>(&self, mut r: R, w: W) -> Result<ConversionSummary, ConvertError>
    where
        R: io::Read,
        W: io::Write,
    {
        let mut buf = Vec::new();
        r.read_to_end(&mut buf).map_err(ConvertError::Read)?;

        let (mut bom, data) = match buf.strip_prefix(UTF8_BOM) {
            Some(rest) => (true, rest),
            None => (false, buf.as_slice()),
        };
        if bom {
            debug!("source starts with a UTF-8 BOM");
        }

        let mut rdr = csv_reader(data, self.input);
        let mut wtr = csv_writer(w, self.output);

        let mut record = csv::StringRecord::new();
        let mut summary = ConversionSummary::default();
        // offset right after the previous record's content, before its terminator
        let mut content_end = None;

        while rdr.read_record(&mut record).map_err(ConvertError::from_read)? {
            let from = content_end.unwrap_or(0);
            let content_start = from + data[from..].iter().take_while(is_terminator).count();
            let blank = blank_lines(&data[from..content_start], content_end.is_some());
            write_blank_lines(&mut wtr, blank, &mut bom, &mut summary)?;

            let end = rdr.position().byte() as usize;
            let trailing = data[..end].iter().rev().take_while(is_terminator).count();
            content_end = Some(content_start.max(end - trailing));

            trace!(record = summary.records, fields = record.len(), "converting record");
            if std::mem::take(&mut bom) {
                wtr.write_record(&prepend_bom(&record))
                    .map_err(ConvertError::from_write)?;
            } else {
                wtr.write_record(&record).map_err(ConvertError::from_write)?;
            }

            summary.records += 1;
            summary.fields += record.len() as u64;
        }

        let from = content_end.unwrap_or(0);
        let blank = blank_lines(&data[from..], content_end.is_some());
        write_blank_lines(&mut wtr, blank, &mut bom, &mut summary)?;
        if bom {
            // nothing but the BOM: it is the only field of the only row
            write_blank_lines(&mut wtr, 1, &mut bom, &mut summary)?;
        }
        wtr.flush().map_err(ConvertError::Write)?;

        Ok(summary)
    }

    /// Converts the file at `source` into `destination`, creating or truncating it.
    ///
    /// The source is opened first, so a missing source never leaves an empty destination behind.
    ///
    /// # Errors
    ///
    /// See [`ConvertError`]. Nothing is retried and a partially written destination is kept.
    pub fn convert_file(
        &self,
        source: &Path,
        destination: &Path,
    ) -> Result<ConversionSummary, ConvertError> {
        info!(
            source = %source.display(),
            destination = %destination.display(),
            "converting {} to {}",
            self.input,
            self.output
        );

        let src = File::open(source)
            .map_err(|err| ConvertError::from_source_open(source.to_path_buf(), err))?;
        debug!(source = %source.display(), "opened source");

        let dst = File::create(destination)
            .map_err(|err| ConvertError::from_destination_create(destination.to_path_buf(), err))?;
        debug!(destination = %destination.display(), "created destination");

        let summary = self.convert_stream(src, dst)?;
        info!(
            records = summary.records,
            fields = summary.fields,
            "conversion finished"
        );

        Ok(summary)
    }
}

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

fn is_terminator(b: &&u8) -> bool {
    matches!(**b, b'\r' | b'\n')
}

/// Rows with no fields hidden in a run of terminator bytes. `\r\n`, `\r` and `\n` each end one
/// line, and the first one after a record is that record's own terminator.
fn blank_lines(gap: &[u8], after_record: bool) -> u64 {
    let mut breaks: u64 = 0;
    let mut prev = 0;
    for &b in gap {
        if b == b'\r' || (b == b'\n' && prev != b'\r') {
            breaks += 1;
        }
        prev = b;
    }

    if after_record {
        breaks.saturating_sub(1)
    } else {
        breaks
    }
}

/// Writes `count` empty rows. A pending BOM turns the first of them into a one-field row.
fn write_blank_lines<W: io::Write>(
    wtr: &mut csv::Writer<W>,
    count: u64,
    bom: &mut bool,
    summary: &mut ConversionSummary,
) -> Result<(), ConvertError> {
    for _ in 0..count {
        if std::mem::take(bom) {
            wtr.write_record(["\u{feff}"])
                .map_err(ConvertError::from_write)?;
            summary.fields += 1;
        } else {
            // the csv writer would quote an empty record as `""`
            wtr.flush().map_err(ConvertError::Write)?;
            wtr.get_mut()
                .write_all(RECORD_TERMINATOR)
                .map_err(ConvertError::Write)?;
        }
        summary.records += 1;
    }

    Ok(())
}

fn prepend_bom(record: &csv::StringRecord) -> csv::StringRecord {
    record
        .iter()
        .enumerate()
        .map(|(i, field)| {
            if i == 0 {
                format!("\u{feff}{field}")
            } else {
                field.to_string()
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn convert(input: &str) -> (String, ConversionSummary) {
        let mut output = Vec::new();
        let summary = DelimiterConverter::default()
            .convert_stream(input.as_bytes(), &mut output)
            .unwrap();
        (String::from_utf8(output).unwrap(), summary)
    }

    #[test]
    fn test_simple_rows() {
        let (output, summary) = convert("a,b,c\nd,e,f\n");

        assert_eq!(output, "a;b;c\r\nd;e;f\r\n");
        assert_eq!(summary, ConversionSummary { records: 2, fields: 6 });
    }

    #[test]
    fn test_quoted_comma_field_is_unquoted() {
        let (output, _) = convert("a,b,c\n\"x,y\",z\n");

        assert_eq!(output, "a;b;c\r\nx,y;z\r\n");
    }

    #[test]
    fn test_fields_needing_quotes() {
        let (output, summary) = convert("\"a;b\",\"say \"\"hi\"\"\",\"two\nlines\"\n");

        assert_eq!(output, "\"a;b\";\"say \"\"hi\"\"\";\"two\nlines\"\r\n");
        assert_eq!(summary, ConversionSummary { records: 1, fields: 3 });
    }

    #[test]
    fn test_whitespace_is_kept() {
        let (output, _) = convert(" a , b \n");

        assert_eq!(output, " a ; b \r\n");
    }

    #[test]
    fn test_ragged_rows() {
        let (output, summary) = convert("a\nb,c\nd,e,f,g\n");

        assert_eq!(output, "a\r\nb;c\r\nd;e;f;g\r\n");
        assert_eq!(summary, ConversionSummary { records: 3, fields: 7 });
    }

    #[test]
    fn test_empty_fields() {
        let (output, summary) = convert("a,,c\n,\n");

        assert_eq!(output, "a;;c\r\n;\r\n");
        assert_eq!(summary, ConversionSummary { records: 2, fields: 5 });
    }

    #[test]
    fn test_crlf_and_missing_trailing_newline() {
        let (output, summary) = convert("a,b\r\nc,d");

        assert_eq!(output, "a;b\r\nc;d\r\n");
        assert_eq!(summary.records, 2);
    }

    #[test]
    fn test_empty_input() {
        let (output, summary) = convert("");

        assert!(output.is_empty());
        assert_eq!(summary, ConversionSummary::default());
    }

    #[test]
    fn test_blank_line_between_records() {
        let (output, summary) = convert("a,b\n\nc,d\n");

        assert_eq!(output, "a;b\r\n\r\nc;d\r\n");
        assert_eq!(summary, ConversionSummary { records: 3, fields: 4 });
    }

    #[test]
    fn test_leading_and_trailing_blank_lines() {
        let (output, summary) = convert("\n\na,b\n\n");

        assert_eq!(output, "\r\n\r\na;b\r\n\r\n");
        assert_eq!(summary, ConversionSummary { records: 4, fields: 2 });
    }

    #[test]
    fn test_crlf_blank_lines() {
        let (output, summary) = convert("a,b\r\n\r\n\r\nc,d\r\n");

        assert_eq!(output, "a;b\r\n\r\n\r\nc;d\r\n");
        assert_eq!(summary.records, 4);
    }

    #[test]
    fn test_only_blank_lines() {
        let (output, summary) = convert("\n\n\n");

        assert_eq!(output, "\r\n\r\n\r\n");
        assert_eq!(summary, ConversionSummary { records: 3, fields: 0 });
    }

    #[test]
    fn test_blank_line_inside_quoted_field() {
        let (output, summary) = convert("\"x\n\ny\",z\n");

        assert_eq!(output, "\"x\n\ny\";z\r\n");
        assert_eq!(summary, ConversionSummary { records: 1, fields: 2 });
    }

    #[test]
    fn test_bom_stays_in_first_field() {
        let (output, summary) = convert("\u{feff}h1,h2\n1,2\n");

        assert_eq!(output, "\u{feff}h1;h2\r\n1;2\r\n");
        assert_eq!(summary, ConversionSummary { records: 2, fields: 4 });
    }

    #[test]
    fn test_bom_field_quoted_with_its_content() {
        let (output, _) = convert("\u{feff}a;b,c\n");

        assert_eq!(output, "\"\u{feff}a;b\";c\r\n");
    }

    #[test]
    fn test_bom_before_blank_line() {
        let (output, summary) = convert("\u{feff}\na\n");

        assert_eq!(output, "\u{feff}\r\na\r\n");
        assert_eq!(summary, ConversionSummary { records: 2, fields: 2 });
    }

    #[test]
    fn test_bom_only() {
        let (output, summary) = convert("\u{feff}");

        assert_eq!(output, "\u{feff}\r\n");
        assert_eq!(summary, ConversionSummary { records: 1, fields: 1 });
    }

    #[test]
    fn test_reversed() {
        let converter = DelimiterConverter::default().reversed();
        assert_eq!(converter.input, Delimiter::Semicolon);
        assert_eq!(converter.output, Delimiter::Comma);

        let mut output = Vec::new();
        converter
            .convert_stream("x,y;z\r\n".as_bytes(), &mut output)
            .unwrap();

        assert_eq!(str::from_utf8(&output).unwrap(), "\"x,y\",z\r\n");
    }

    #[test]
    fn test_invalid_utf8_fails() {
        let mut output = Vec::new();
        let err = DelimiterConverter::default()
            .convert_stream(&b"a,b\nc,\xff\xfe\n"[..], &mut output)
            .unwrap_err();

        assert!(matches!(err, ConvertError::Decode { field: 1, .. }));
    }

    #[test]
    fn test_write_failure() {
        struct FullDisk;

        impl io::Write for FullDisk {
            fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
                Err(io::Error::other("disk full"))
            }

            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        let err = DelimiterConverter::default()
            .convert_stream("a,b\n".as_bytes(), FullDisk)
            .unwrap_err();

        assert!(matches!(err, ConvertError::Write(_)));
    }
}
