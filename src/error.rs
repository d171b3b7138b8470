use thiserror::Error as ThisError;

#[derive(ThisError, Debug)]
pub enum WeatherLinkError {
    /// Error reported by the hub in the `error` field of a response envelope.
    #[error("WeatherLink API error {code}: {message}")]
    Api { code: i64, message: String },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("response contained neither data nor error")]
    MissingData,

    #[error("failed to decode {context}: {reason}")]
    Decode { context: String, reason: String },

    #[error("unknown condition data structure type: {0}")]
    UnknownConditionType(i64),

    #[error("unknown {measurement} unit: {key}")]
    UnknownUnit { measurement: String, key: String },

    #[error("peer address of the hub is not available")]
    MissingPeerAddress,

    #[error("invalid real-time broadcast lease: {0}")]
    InvalidLease(String),

    #[error("broadcast connection lost: {0}")]
    ConnectionLost(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),
}

impl WeatherLinkError {
    pub(crate) fn decode(context: impl Into<String>, reason: impl ToString) -> Self {
        Self::Decode {
            context: context.into(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, WeatherLinkError>;
