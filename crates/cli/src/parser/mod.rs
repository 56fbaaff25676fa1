use crate::service::ServiceError;
use std::path::Path;

mod docx;
mod sqlite;

/// Turns an uploaded file into one or more texts to chunk
pub trait DocumentParser: Send + Sync {
    fn parse(&self, filename: &str, bytes: &[u8]) -> Result<Vec<String>, ServiceError>;
}

/// Formats decoded in-process, dispatched on the file extension.
///
/// Text and Markdown are decoded as lossy UTF-8. CSV must be well formed and is re-emitted
/// record by record. A DOCX yields its paragraphs joined by newlines. A SQLite database
/// yields one CSV text per table (header plus the first 1000 rows).
#[derive(Debug, Default, Clone, Copy)]
pub struct BuiltinParser;

impl BuiltinParser {
    pub const EXTENSIONS: &'static [&'static str] = &[
        "txt", "md", "markdown", "csv", "docx", "db", "sqlite", "sqlite3",
    ];
}

impl DocumentParser for BuiltinParser {
    fn parse(&self, filename: &str, bytes: &[u8]) -> Result<Vec<String>, ServiceError> {
        let ext = extension_of(filename);
        let texts = match ext.as_str() {
            "txt" | "md" | "markdown" => vec![String::from_utf8_lossy(bytes).into_owned()],
            "csv" => vec![normalize_csv(bytes)?],
            "docx" => docx::parse_docx(bytes)?,
            "db" | "sqlite" | "sqlite3" => sqlite::parse_sqlite(bytes)?,
            _ => return Err(ServiceError::UnsupportedFile(ext)),
        };
        log::debug!(
            "Parsed {filename} ({} bytes, .{ext}) into {} texts",
            bytes.len(),
            texts.len()
        );
        Ok(texts)
    }
}

/// Lower-cased extension, or the whole lower-cased name when there is no dot
fn extension_of(filename: &str) -> String {
    Path::new(filename)
        .extension()
        .map_or_else(|| filename.to_string(), |ext| ext.to_string_lossy().into_owned())
        .to_ascii_lowercase()
}

fn normalize_csv(bytes: &[u8]) -> Result<String, ServiceError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .from_reader(bytes);

    let mut records = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| ServiceError::Parse(format!("csv: {e}")))?;
        records.push(record.iter().map(str::to_string).collect());
    }
    write_csv(&records)
}

/// Render rows as CSV with `\n` record terminators
fn write_csv(records: &[Vec<String>]) -> Result<String, ServiceError> {
    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());
    for record in records {
        writer
            .write_record(record)
            .map_err(|e| ServiceError::Internal(format!("Failed to write CSV: {e}")))?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| ServiceError::Internal(format!("Failed to flush CSV: {e}")))?;
    String::from_utf8(bytes).map_err(|e| ServiceError::Internal(format!("CSV is not UTF-8: {e}")))
}
