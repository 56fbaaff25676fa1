use super::write_csv;
use crate::service::ServiceError;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};
use std::io::Write;

const MAX_ROWS_PER_TABLE: usize = 1000;

fn parse_error(error: rusqlite::Error) -> ServiceError {
    ServiceError::Parse(format!("sqlite: {error}"))
}

/// One CSV text per table, in creation order
pub(super) fn parse_sqlite(bytes: &[u8]) -> Result<Vec<String>, ServiceError> {
    let mut staged = tempfile::NamedTempFile::new()
        .map_err(|e| ServiceError::Internal(format!("Failed to stage database: {e}")))?;
    staged
        .write_all(bytes)
        .and_then(|()| staged.flush())
        .map_err(|e| ServiceError::Internal(format!("Failed to stage database: {e}")))?;

    let conn = Connection::open_with_flags(
        staged.path(),
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .map_err(parse_error)?;

    let tables = {
        let mut stmt = conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY rowid")
            .map_err(parse_error)?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(parse_error)?;
        names
            .collect::<rusqlite::Result<Vec<String>>>()
            .map_err(parse_error)?
    };

    tables.iter().map(|table| dump_table(&conn, table)).collect()
}

fn dump_table(conn: &Connection, table: &str) -> Result<String, ServiceError> {
    let sql = format!(
        "SELECT * FROM \"{}\" LIMIT {MAX_ROWS_PER_TABLE}",
        table.replace('"', "\"\"")
    );
    let mut stmt = conn.prepare(&sql).map_err(parse_error)?;
    let header: Vec<String> = stmt
        .column_names()
        .into_iter()
        .map(str::to_string)
        .collect();
    let width = header.len();

    let mut records = vec![header];
    let mut rows = stmt.query([]).map_err(parse_error)?;
    while let Some(row) = rows.next().map_err(parse_error)? {
        let mut record = Vec::with_capacity(width);
        for column in 0..width {
            record.push(render(row.get_ref(column).map_err(parse_error)?));
        }
        records.push(record);
    }

    write_csv(&records)
}

fn render(value: ValueRef<'_>) -> String {
    match value {
        ValueRef::Null => String::new(),
        ValueRef::Integer(v) => v.to_string(),
        ValueRef::Real(v) => format!("{v:?}"),
        ValueRef::Text(bytes) => String::from_utf8_lossy(bytes).into_owned(),
        ValueRef::Blob(bytes) => format!("<blob {} bytes>", bytes.len()),
    }
}
