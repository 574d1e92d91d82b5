//! Cursor pagination
//!
//! Listing responses carry their continuation token as either `cursor` or
//! `next_cursor`. Both are normalized here; an absent, null or empty token
//! means there are no more pages.

use serde_json::Value;
use tracing::debug;

use crate::fetcher::{FetcherError, FetcherResult};

/// Upper bound on pages followed by one listing walk
pub const MAX_PAGES: usize = 10_000;

/// Continuation token of a listing response, if another page exists
pub fn next_cursor(response: &Value) -> Option<String> {
    ["cursor", "next_cursor"]
        .iter()
        .filter_map(|field| response.get(field))
        .find_map(|value| value.as_str())
        .filter(|cursor| !cursor.is_empty())
        .map(str::to_string)
}

/// Rewrite the response so the continuation token always sits under `cursor`
///
/// `cursor` becomes a string when another page exists and `null` otherwise.
pub fn normalize_cursor(response: &mut Value) {
    let cursor = next_cursor(response);
    if let Some(object) = response.as_object_mut() {
        object.insert(
            "cursor".to_string(),
            cursor.map_or(Value::Null, Value::String),
        );
    }
}

/// One page of a listing endpoint
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    /// Items under the listing's collection field
    pub items: Vec<Value>,
    /// Token for the next page; `None` on the last page
    pub cursor: Option<String>,
}

impl Page {
    /// Split a listing response into items and cursor
    ///
    /// A missing collection field reads as an empty page.
    ///
    /// # Errors
    /// Returns [`FetcherError::Parse`] if the collection field is not an array.
    pub fn from_response(mut response: Value, items_field: &str) -> FetcherResult<Self> {
        let cursor = next_cursor(&response);

        let items = match response.get_mut(items_field).map(Value::take) {
            Some(Value::Array(items)) => items,
            Some(Value::Null) | None => {
                debug!(items_field, "Listing response has no items");
                Vec::new()
            }
            Some(other) => {
                return Err(FetcherError::Parse(format!(
                    "expected '{items_field}' to be an array, got {}",
                    json_kind(&other)
                )));
            }
        };

        Ok(Self { items, cursor })
    }

    /// Check if this is the final page
    pub fn is_last(&self) -> bool {
        self.cursor.is_none() || self.items.is_empty()
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
