//! Property list field access.

use crate::core::error::{StoreError, StoreResult};
use plist::{Dictionary, Value};
use std::io::Cursor;

/// Parse XML or binary plist bytes.
pub(crate) fn parse_plist(raw: &[u8]) -> StoreResult<Value> {
    Value::from_reader(Cursor::new(raw))
        .map_err(|e| StoreError::invalid_input(format!("malformed property list: {e}")))
}

/// The top-level dictionary.
pub(crate) fn dict<'a>(value: &'a Value, what: &str) -> StoreResult<&'a Dictionary> {
    value
        .as_dictionary()
        .ok_or_else(|| StoreError::invalid_input(format!("{what} is not a dictionary")))
}

pub(crate) fn optional_string(fields: &Dictionary, key: &str) -> Option<String> {
    fields
        .get(key)
        .and_then(Value::as_string)
        .map(str::to_string)
}

pub(crate) fn required_string(fields: &Dictionary, key: &str) -> StoreResult<String> {
    optional_string(fields, key)
        .ok_or_else(|| StoreError::invalid_input(format!("missing string field {key}")))
}

pub(crate) fn optional_data(fields: &Dictionary, key: &str) -> Option<Vec<u8>> {
    fields.get(key).and_then(Value::as_data).map(<[u8]>::to_vec)
}

pub(crate) fn required_data(fields: &Dictionary, key: &str) -> StoreResult<Vec<u8>> {
    optional_data(fields, key)
        .ok_or_else(|| StoreError::invalid_input(format!("missing data field {key}")))
}
