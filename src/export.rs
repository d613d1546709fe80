// 📤 Export - the output sink every source writes into
//
// Sources hand over finished PricedRecords. Export formats them, writes the
// header in front of the first line and re-encodes into the target charset.

use anyhow::{Context, Result};
use encoding_rs::Encoding;
use std::io::{BufWriter, Write};

use crate::error::ImportError;
use crate::record::{format_header, PricedRecord};

/// Output encodings accepted by `output_encoding` (utf8 = no conversion)
pub const ENCODINGS: [&str; 3] = ["utf8", "iso-8859-1", "windows-1252"];

/// RecordSink - append-only destination for PricedRecords
pub trait RecordSink {
    fn write_record(&mut self, record: &PricedRecord) -> Result<()>;

    /// Push buffered lines down; called at the end of every source run
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Charset - how output text is turned into bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Charset {
    Utf8,
    /// Strict ISO-8859-1: one byte per char up to U+00FF
    Latin1,
    Legacy(&'static Encoding),
}

impl Charset {
    /// Encode `text`; unrepresentable characters become `&#N;`
    pub fn encode(&self, text: &str) -> Vec<u8> {
        match self {
            Charset::Utf8 => text.as_bytes().to_vec(),
            Charset::Latin1 => {
                let mut bytes = Vec::with_capacity(text.len());
                for c in text.chars() {
                    match u8::try_from(u32::from(c)) {
                        Ok(byte) => bytes.push(byte),
                        Err(_) => bytes.extend_from_slice(format!("&#{};", u32::from(c)).as_bytes()),
                    }
                }
                bytes
            }
            Charset::Legacy(encoding) => encoding.encode(text).0.into_owned(),
        }
    }
}

/// Resolve an encoding label from the configuration
///
/// encoding_rs maps the `iso-8859-1` label onto windows-1252, which would
/// emit C1 control bytes for characters like €, so latin1 is handled here.
pub fn resolve_encoding(label: &str) -> std::result::Result<Charset, ImportError> {
    let label = label.trim();
    if label.is_empty() || label.eq_ignore_ascii_case("utf8") || label.eq_ignore_ascii_case("utf-8") {
        return Ok(Charset::Utf8);
    }
    if !ENCODINGS.iter().any(|known| known.eq_ignore_ascii_case(label)) {
        return Err(ImportError::UnknownEncoding(label.to_string()));
    }
    if label.eq_ignore_ascii_case("iso-8859-1") {
        return Ok(Charset::Latin1);
    }
    Encoding::for_label(label.as_bytes())
        .map(Charset::Legacy)
        .ok_or_else(|| ImportError::UnknownEncoding(label.to_string()))
}

// ============================================================================
// FILE EXPORT
// ============================================================================

/// Export - formatted, optionally re-encoded lines into any writer
///
/// Characters the target charset cannot represent become HTML numeric
/// character references (`&#937;`).
pub struct Export<W: Write> {
    writer: BufWriter<W>,
    charset: Charset,
    written: usize,
}

impl<W: Write> Export<W> {
    pub fn new(writer: W, encoding: &str) -> std::result::Result<Self, ImportError> {
        Ok(Export {
            writer: BufWriter::new(writer),
            charset: resolve_encoding(encoding)?,
            written: 0,
        })
    }

    /// Records written so far
    pub fn written(&self) -> usize {
        self.written
    }

    fn write_text(&mut self, text: &str) -> Result<()> {
        let written = match self.charset {
            Charset::Utf8 => self.writer.write_all(text.as_bytes()),
            charset => self.writer.write_all(&charset.encode(text)),
        };
        written.context("Failed to write output")
    }

    /// Flush and hand back the inner writer
    pub fn into_inner(self) -> Result<W> {
        self.writer
            .into_inner()
            .map_err(|err| anyhow::anyhow!("Failed to flush output: {}", err.error()))
    }
}

impl<W: Write> RecordSink for Export<W> {
    fn write_record(&mut self, record: &PricedRecord) -> Result<()> {
        if self.written == 0 {
            self.write_text(&format_header())?;
        }
        self.write_text(&record.format_line())?;
        self.written += 1;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.writer.flush().context("Failed to flush output")
    }
}

// ============================================================================
// IN-MEMORY SINK
// ============================================================================

/// Collects records instead of writing them
#[derive(Debug, Default)]
pub struct MemorySink {
    pub records: Vec<PricedRecord>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RecordSink for MemorySink {
    fn write_record(&mut self, record: &PricedRecord) -> Result<()> {
        self.records.push(record.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_once_before_first_record() {
        let mut export = Export::new(Vec::new(), "utf8").unwrap();
        export.write_record(&PricedRecord::new("A1", "One", 1.0, 2.0)).unwrap();
        export.write_record(&PricedRecord::new("A2", "Two", 1.0, 2.0)).unwrap();
        assert_eq!(export.written(), 2);

        let text = String::from_utf8(export.into_inner().unwrap()).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("\"Id\""));
        assert!(lines[1].starts_with("\"A1\""));
        assert!(lines[2].starts_with("\"A2\""));
    }

    #[test]
    fn test_no_records_no_header() {
        let export = Export::new(Vec::new(), "").unwrap();
        assert!(export.into_inner().unwrap().is_empty());
    }

    #[test]
    fn test_latin1_output() {
        let mut export = Export::new(Vec::new(), "iso-8859-1").unwrap();
        export.write_record(&PricedRecord::new("1", "Gerät Ω", 1.0, 1.0)).unwrap();

        let bytes = export.into_inner().unwrap();
        // ä is a single byte in latin1, Ω falls back to a character reference
        assert!(bytes.windows(4).any(|w| w == b"Ger\xe4"));
        assert!(bytes.windows(6).any(|w| w == b"&#937;"));
    }

    #[test]
    fn test_latin1_escapes_euro() {
        let mut export = Export::new(Vec::new(), "iso-8859-1").unwrap();
        export.write_record(&PricedRecord::new("1", "Preis €", 1.0, 1.0)).unwrap();

        let bytes = export.into_inner().unwrap();
        assert!(!bytes.contains(&0x80));
        assert!(bytes.windows(7).any(|w| w == b"&#8364;"));
    }

    #[test]
    fn test_windows_1252_keeps_euro() {
        assert_eq!(resolve_encoding("windows-1252").unwrap().encode("€ä"), vec![0x80, 0xe4]);
        assert_eq!(resolve_encoding("iso-8859-1").unwrap(), Charset::Latin1);
    }

    #[test]
    fn test_unknown_encoding() {
        assert!(matches!(
            Export::new(Vec::new(), "ebcdic"),
            Err(ImportError::UnknownEncoding(_))
        ));
        assert_eq!(resolve_encoding("UTF-8").unwrap(), Charset::Utf8);
    }

    #[test]
    fn test_memory_sink() {
        let mut sink = MemorySink::new();
        sink.write_record(&PricedRecord::new("1", "x", 1.0, 1.0)).unwrap();
        sink.flush().unwrap();
        assert_eq!(sink.records.len(), 1);
    }
}
