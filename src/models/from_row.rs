use rusqlite::{types::Type, Row};
use serde::de::DeserializeOwned;

pub trait FromSqliteRow: Sized {
    fn from_row(row: &Row) -> rusqlite::Result<Self>;
}

fn decode<T: DeserializeOwned>(index: usize, raw: &str) -> rusqlite::Result<T> {
    serde_json::from_str(raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(e)))
}

/// Reads a TEXT column holding JSON.
pub fn json_column<T: DeserializeOwned>(row: &Row, column: &str) -> rusqlite::Result<T> {
    let index = row.as_ref().column_index(column)?;
    let raw: String = row.get(index)?;
    decode(index, &raw)
}

/// Reads a TEXT column through `parse`. Unknown values are a conversion
/// error rather than a silent default.
pub fn text_enum_column<T>(
    row: &Row,
    column: &str,
    parse: impl FnOnce(&str) -> Option<T>,
) -> rusqlite::Result<T> {
    let index = row.as_ref().column_index(column)?;
    let raw: String = row.get(index)?;
    parse(&raw).ok_or_else(|| {
        let message = format!("unknown {} `{}`", column, raw);
        rusqlite::Error::FromSqlConversionFailure(index, Type::Text, message.into())
    })
}

/// Like [`json_column`] for a nullable column.
pub fn optional_json_column<T: DeserializeOwned>(
    row: &Row,
    column: &str,
) -> rusqlite::Result<Option<T>> {
    let index = row.as_ref().column_index(column)?;
    let raw: Option<String> = row.get(index)?;
    raw.map(|raw| decode(index, &raw)).transpose()
}
