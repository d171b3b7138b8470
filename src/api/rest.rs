//! Client for the hub's local HTTP API.

use super::WeatherLinkApi;
use super::conditions::{CurrentConditions, ParseMode};
use crate::error::{Result, WeatherLinkError};
use async_trait::async_trait;
use log::debug;
use serde::Deserialize;
use serde_json::Value;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tokio::sync::Mutex;

pub const EP_CURRENT_CONDITIONS: &str = "/v1/current_conditions";
pub const EP_REAL_TIME: &str = "/v1/real_time";

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    code: i64,
    message: String,
}

/// `{"data": ..., "error": ...}` wrapper around every response.
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    error: Option<ApiErrorBody>,
}

impl Envelope {
    fn into_data(self) -> Result<Value> {
        if let Some(error) = self.error {
            return Err(WeatherLinkError::Api {
                code: error.code,
                message: error.message,
            });
        }

        match self.data {
            Some(data) if !data.is_null() => Ok(data),
            _ => Err(WeatherLinkError::MissingData),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RealTimeBody {
    broadcast_port: u16,
    duration: f64,
}

/// A granted real-time broadcast lease.
#[derive(Debug, Clone, PartialEq)]
pub struct RealTimeBroadcast {
    /// Address the broadcast datagrams originate from. Taken from the peer
    /// of the HTTP connection, the hub does not report it.
    pub addr: IpAddr,
    pub broadcast_port: u16,
    /// Granted lease duration in seconds.
    pub duration: f64,
}

pub struct WeatherLinkRest {
    client: reqwest::Client,
    base_url: String,
    // The hub cannot serve two requests at once.
    lock: Mutex<()>,
}

impl WeatherLinkRest {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, base_url))
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Issue a GET request and return the response data with the peer address.
    ///
    /// The lock is held until the body has been read.
    async fn get(&self, path: &str, query: &[(&str, String)]) -> Result<(Value, Option<SocketAddr>)> {
        let _guard = self.lock.lock().await;

        let url = format!("{}{}", self.base_url, path);
        debug!("GET {} {:?}", url, query);
        let response = self.client.get(&url).query(query).send().await?;
        let remote_addr = response.remote_addr();
        let envelope: Envelope = response.json().await?;

        Ok((envelope.into_data()?, remote_addr))
    }

    /// Fetch current conditions, rejecting any malformed condition record.
    pub async fn current_conditions_strict(&self) -> Result<CurrentConditions> {
        let (data, _) = self.get(EP_CURRENT_CONDITIONS, &[]).await?;
        CurrentConditions::from_json(&data, ParseMode::Strict)
    }
}

#[async_trait]
impl WeatherLinkApi for WeatherLinkRest {
    async fn current_conditions(&self) -> Result<CurrentConditions> {
        let (data, _) = self.get(EP_CURRENT_CONDITIONS, &[]).await?;
        CurrentConditions::from_json(&data, ParseMode::Lenient)
    }

    async fn real_time(&self, duration: Duration) -> Result<RealTimeBroadcast> {
        let query = [("duration", duration.as_secs().to_string())];
        let (data, remote_addr) = self.get(EP_REAL_TIME, &query).await?;
        let remote_addr = remote_addr.ok_or(WeatherLinkError::MissingPeerAddress)?;
        let body: RealTimeBody = serde_json::from_value(data)?;

        Ok(RealTimeBroadcast {
            addr: remote_addr.ip(),
            broadcast_port: body.broadcast_port,
            duration: body.duration,
        })
    }
}
