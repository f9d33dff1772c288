use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tickerflow::{
    Category, FilingRecord, Snapshot, SnapshotRequest, TickerKey, merge::FilingQuery,
};

/// Client request frame. The optional `id` is echoed back on the matching response, since
/// responses on one connection may complete out of order.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RequestEnvelope {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(flatten)]
    pub request: ClientRequest,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientRequest {
    /// `{"type":"snapshot","ticker":"AAPL","categories":["options"],"force_refresh":false}`
    Snapshot(SnapshotRequest),
    /// `{"type":"invalidate","ticker":"AAPL","category":"options"}`, or every category when
    /// `category` is null or absent.
    Invalidate {
        ticker: TickerKey,
        #[serde(default)]
        category: Option<Category>,
    },
    /// `{"type":"filings","ticker":"AAPL","query":{"holders":"hedge_funds_only"}}`
    Filings {
        ticker: TickerKey,
        #[serde(default)]
        query: FilingQuery,
    },
    /// `{"type":"institution_filings","cik":"0001067983"}`
    InstitutionFilings {
        cik: String,
        #[serde(default)]
        force_refresh: bool,
    },
}

impl ClientRequest {
    pub fn kind(&self) -> &'static str {
        match self {
            ClientRequest::Snapshot(_) => "snapshot",
            ClientRequest::Invalidate { .. } => "invalidate",
            ClientRequest::Filings { .. } => "filings",
            ClientRequest::InstitutionFilings { .. } => "institution_filings",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponseEnvelope {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(flatten)]
    pub response: ServerResponse,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerResponse {
    Welcome {
        message: String,
        timestamp: DateTime<Utc>,
    },
    Snapshot(Snapshot),
    Invalidated {
        ticker: TickerKey,
        category: Option<Category>,
        removed: bool,
    },
    Filings {
        key: String,
        filings: Vec<FilingRecord>,
    },
    Error {
        message: String,
    },
}

impl ServerResponse {
    pub fn error(error: impl std::fmt::Display) -> Self {
        Self::Error {
            message: error.to_string(),
        }
    }
}
