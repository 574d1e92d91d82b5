//! Query filters for the listing endpoints
//!
//! Unset fields are omitted from the query string entirely rather than sent
//! empty.

/// Query parameters as sent on the wire
pub type QueryParams = Vec<(String, String)>;

fn push<T: ToString>(params: &mut QueryParams, key: &str, value: Option<T>) {
    if let Some(value) = value {
        params.push((key.to_string(), value.to_string()));
    }
}

/// Filters for `GET /markets`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MarketsFilter {
    pub status: Option<String>,
    pub event_ticker: Option<String>,
    pub series_ticker: Option<String>,
    pub limit: Option<u32>,
    pub cursor: Option<String>,
}

impl MarketsFilter {
    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_cursor(mut self, cursor: impl Into<String>) -> Self {
        self.cursor = Some(cursor.into());
        self
    }

    pub fn to_params(&self) -> QueryParams {
        let mut params = QueryParams::new();
        push(&mut params, "status", self.status.as_deref());
        push(&mut params, "event_ticker", self.event_ticker.as_deref());
        push(&mut params, "series_ticker", self.series_ticker.as_deref());
        push(&mut params, "limit", self.limit);
        push(&mut params, "cursor", self.cursor.as_deref());
        params
    }
}

/// Filters for `GET /markets/trades`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TradesFilter {
    pub ticker: Option<String>,
    pub limit: Option<u32>,
    pub cursor: Option<String>,
    /// Upper bound, unix seconds
    pub max_ts: Option<i64>,
    /// Lower bound, unix seconds
    pub min_ts: Option<i64>,
}

impl TradesFilter {
    pub fn for_ticker(ticker: impl Into<String>) -> Self {
        Self {
            ticker: Some(ticker.into()),
            ..Self::default()
        }
    }

    pub fn to_params(&self) -> QueryParams {
        let mut params = QueryParams::new();
        push(&mut params, "ticker", self.ticker.as_deref());
        push(&mut params, "limit", self.limit);
        push(&mut params, "cursor", self.cursor.as_deref());
        push(&mut params, "max_ts", self.max_ts);
        push(&mut params, "min_ts", self.min_ts);
        params
    }
}

/// Filters for `GET /events`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventsFilter {
    /// Comma separated: unopened, open, closed, settled
    pub status: Option<String>,
    pub series_ticker: Option<String>,
    pub with_nested_markets: bool,
    /// 1..=200
    pub limit: u32,
    pub cursor: Option<String>,
}

impl Default for EventsFilter {
    fn default() -> Self {
        Self {
            status: None,
            series_ticker: None,
            with_nested_markets: true,
            limit: 100,
            cursor: None,
        }
    }
}

impl EventsFilter {
    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    pub fn with_cursor(mut self, cursor: impl Into<String>) -> Self {
        self.cursor = Some(cursor.into());
        self
    }

    pub fn to_params(&self) -> QueryParams {
        let mut params = QueryParams::new();
        push(&mut params, "status", self.status.as_deref());
        push(&mut params, "series_ticker", self.series_ticker.as_deref());
        push(&mut params, "with_nested_markets", Some(self.with_nested_markets));
        push(&mut params, "limit", Some(self.limit));
        push(&mut params, "cursor", self.cursor.as_deref());
        params
    }
}
