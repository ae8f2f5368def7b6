use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::BridgeError;

/// Events pushed from the bridge to subscribers.
///
/// Wire shape: `{"event": "<name>", "data": {...}}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    /// Heartbeat carrying the bridge's wall-clock time.
    #[serde(rename = "date")]
    Date { date: DateTime<Utc> },

    /// Latest controller status text, verbatim.
    #[serde(rename = "statusData")]
    StatusData {
        #[serde(rename = "statusData")]
        status_data: String,
    },
}

impl ServerEvent {
    pub fn date(date: DateTime<Utc>) -> Self {
        Self::Date { date }
    }

    pub fn status(status_data: impl Into<String>) -> Self {
        Self::StatusData {
            status_data: status_data.into(),
        }
    }

    /// Wire name of the event.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Date { .. } => "date",
            Self::StatusData { .. } => "statusData",
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Events received from subscribers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    /// A single typed character for the output sink.
    #[serde(rename = "client_data")]
    ClientData { letter: char },
}

impl ClientEvent {
    /// Parse and validate one subscriber frame.
    ///
    /// Anything other than a `client_data` event whose `letter` is exactly one
    /// character is rejected.
    pub fn parse(raw: &str) -> Result<Self, BridgeError> {
        serde_json::from_str(raw).map_err(|e| BridgeError::MalformedPayload(e.to_string()))
    }
}
