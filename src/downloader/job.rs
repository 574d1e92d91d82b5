//! Collection job structures and status tracking

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::downloader::config::LIST_PAGE_LIMIT;
use crate::fetcher::environment::api_path;
use crate::fetcher::query::QueryParams;
use crate::fetcher::{FetcherError, FetcherResult, RequestDescriptor};

/// What to collect: a listing endpoint walked by cursor, then one detail
/// request per listed key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionJob {
    /// Job name; also identifies the checkpoint
    pub name: String,
    /// Full listing path, e.g. `/trade-api/v2/markets`
    pub list_path: String,
    /// Extra listing filters (page size and cursor are added per request)
    pub list_params: QueryParams,
    /// Collection field of each listing page
    pub items_field: String,
    /// Field holding each item's unique key
    pub key_field: String,
    /// Detail path prefix; the detail path is `{detail_prefix}/{key}`
    pub detail_prefix: String,
    /// Field to unwrap from each detail response, if any
    pub detail_field: Option<String>,
    /// Listing page size
    pub page_limit: u32,
}

impl CollectionJob {
    /// Every market, optionally filtered by status (`open`, `closed`, `settled`)
    pub fn markets(status: Option<&str>) -> Self {
        let list_params = status
            .map(|s| vec![("status".to_string(), s.to_string())])
            .unwrap_or_default();
        Self {
            name: match status {
                Some(status) => format!("markets-{status}"),
                None => "markets".to_string(),
            },
            list_path: api_path("/markets"),
            list_params,
            items_field: "markets".to_string(),
            key_field: "ticker".to_string(),
            detail_prefix: api_path("/markets"),
            detail_field: Some("market".to_string()),
            page_limit: LIST_PAGE_LIMIT,
        }
    }

    /// Every event, optionally filtered by status
    pub fn events(status: Option<&str>) -> Self {
        let list_params = status
            .map(|s| vec![("status".to_string(), s.to_string())])
            .unwrap_or_default();
        Self {
            name: match status {
                Some(status) => format!("events-{status}"),
                None => "events".to_string(),
            },
            list_path: api_path("/events"),
            list_params,
            items_field: "events".to_string(),
            key_field: "event_ticker".to_string(),
            detail_prefix: api_path("/events"),
            detail_field: Some("event".to_string()),
            page_limit: 200,
        }
    }

    pub fn with_page_limit(mut self, limit: u32) -> Self {
        self.page_limit = limit;
        self
    }

    /// Validate job parameters
    pub fn validate(&self) -> Result<(), String> {
        if self.name.is_empty() {
            return Err("Job name cannot be empty".to_string());
        }
        if self.items_field.is_empty() || self.key_field.is_empty() {
            return Err("Items and key fields cannot be empty".to_string());
        }
        if !self.list_path.starts_with('/') || !self.detail_prefix.starts_with('/') {
            return Err("Paths must start with '/'".to_string());
        }
        if self.page_limit == 0 {
            return Err("Page limit must be at least 1".to_string());
        }
        Ok(())
    }

    /// Listing request for the page at `cursor` (first page when `None`)
    pub fn list_request(&self, cursor: Option<&str>) -> RequestDescriptor {
        let mut query = self.list_params.clone();
        query.push(("limit".to_string(), self.page_limit.to_string()));
        if let Some(cursor) = cursor {
            query.push(("cursor".to_string(), cursor.to_string()));
        }
        RequestDescriptor::get(self.list_path.clone()).with_query(query)
    }

    /// Detail request for one key
    ///
    /// # Errors
    /// Rejects keys that would change the request path.
    pub fn detail_request(&self, key: &str) -> FetcherResult<RequestDescriptor> {
        if key.is_empty() || key.contains(['/', '?', '#']) {
            return Err(FetcherError::InvalidRequest(format!(
                "invalid {} '{key}'",
                self.key_field
            )));
        }
        Ok(RequestDescriptor::get(format!("{}/{key}", self.detail_prefix)))
    }

    /// Key of a listed item
    pub fn key_of<'a>(&self, item: &'a Value) -> Option<&'a str> {
        item.get(&self.key_field)
            .and_then(Value::as_str)
            .filter(|key| !key.is_empty())
    }

    /// Record to store for a detail response
    pub fn extract_record(&self, response: Value) -> Value {
        match &self.detail_field {
            Some(field) => crate::fetcher::batch::unwrap_field(response, field),
            None => response,
        }
    }
}

/// Counters for a running collection
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct JobProgress {
    /// Listing pages fetched
    pub pages: usize,
    /// Unique keys in the listing
    pub listed: usize,
    /// Keys already in the checkpoint when the run started
    pub resumed: usize,
    /// Records held (resumed plus fetched this run)
    pub records: usize,
    /// Keys that failed this run
    pub failed: usize,
    /// Failures since the last success
    pub consecutive_errors: u32,
}

impl JobProgress {
    /// Keys settled either way
    pub fn processed(&self) -> usize {
        self.records + self.failed
    }

    /// Share of listed keys settled (0.0 to 100.0)
    pub fn percentage(&self) -> Option<f64> {
        if self.listed == 0 {
            return None;
        }
        Some((self.processed() as f64 / self.listed as f64 * 100.0).min(100.0))
    }

    /// Count a failure; returns the consecutive count
    pub fn record_failure(&mut self) -> u32 {
        self.consecutive_errors += 1;
        self.consecutive_errors
    }

    /// Reset the consecutive failure count
    pub fn record_success(&mut self) {
        self.consecutive_errors = 0;
    }
}
