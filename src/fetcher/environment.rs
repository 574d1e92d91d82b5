//! Exchange environments and their base URLs

use std::fmt;
use std::str::FromStr;

/// Versioned REST path prefix
pub const API_PREFIX: &str = "/trade-api/v2";

/// WebSocket endpoint path; also the path signed for the upgrade request
pub const WS_PATH: &str = "/trade-api/ws/v2";

/// Exchange environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Environment {
    /// Demo exchange with play money
    #[default]
    Demo,
    /// Production exchange
    Prod,
}

impl Environment {
    /// REST base URL (scheme + host, no path)
    pub fn http_base_url(&self) -> &'static str {
        match self {
            Self::Demo => "https://demo-api.kalshi.co",
            Self::Prod => "https://api.elections.kalshi.com",
        }
    }

    /// WebSocket base URL (scheme + host, no path)
    pub fn ws_base_url(&self) -> &'static str {
        match self {
            Self::Demo => "wss://demo-api.kalshi.co",
            Self::Prod => "wss://api.elections.kalshi.com",
        }
    }

    /// Full WebSocket endpoint URL
    pub fn ws_url(&self) -> String {
        format!("{}{}", self.ws_base_url(), WS_PATH)
    }

    /// Lower-case name used on the command line and in logs
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Demo => "demo",
            Self::Prod => "prod",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "demo" => Ok(Self::Demo),
            "prod" | "production" => Ok(Self::Prod),
            other => Err(format!(
                "unknown environment '{other}', expected 'demo' or 'prod'"
            )),
        }
    }
}

/// Join the REST prefix with an endpoint suffix: `api_path("/markets")`
pub fn api_path(suffix: &str) -> String {
    format!("{API_PREFIX}{suffix}")
}
