use crate::error::{Result, WeatherLinkError};
use crate::units::{Measurement, UnitConfig, UnitSystemPreference};
use log::warn;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use strum::IntoEnumIterator;

pub const DEFAULT_UPDATE_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Load environment variables from .env file with robust parsing.
/// Handles values with spaces without requiring quotes.
pub fn load_dotenv() {
    let env_path = Path::new(".env");
    if !env_path.exists() {
        return;
    }

    let content = match fs::read_to_string(env_path) {
        Ok(c) => c,
        Err(_) => return,
    };

    for (key, value) in parse_dotenv(&content) {
        // Only set if not already set (env vars take precedence)
        if std::env::var(key).is_err() {
            // SAFETY: called from main before the runtime spawns any threads
            unsafe { std::env::set_var(key, value) };
        }
    }
}

fn parse_dotenv(content: &str) -> Vec<(&str, &str)> {
    let mut vars = Vec::new();
    for line in content.lines() {
        let line = line.trim();

        // Skip empty lines and comments
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if let Some((key, value)) = line.split_once('=') {
            let mut value = value.trim();

            // Remove surrounding quotes if present
            if value.len() >= 2
                && ((value.starts_with('"') && value.ends_with('"'))
                    || (value.starts_with('\'') && value.ends_with('\'')))
            {
                value = &value[1..value.len() - 1];
            }
            vars.push((key.trim(), value));
        }
    }
    vars
}

/// Turn a user-entered host into a base URL.
///
/// `weatherlink.local/` becomes `http://weatherlink.local`; a URL with a
/// scheme is only stripped of its trailing slashes.
pub fn normalize_host(host: &str) -> String {
    let host = host.trim().trim_end_matches('/');
    if host.contains("://") {
        host.to_string()
    } else {
        format!("http://{host}")
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parse_seconds(value: &str) -> Option<Duration> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
        .filter(|duration| !duration.is_zero())
}

/// Options persisted by the host application.
///
/// Stored as one flat JSON object holding the unit entries of
/// [`UnitConfig::to_value`] next to `update_interval` and `host`.
#[derive(Debug, Clone, PartialEq)]
pub struct Options {
    pub host: Option<String>,
    pub update_interval: Duration,
    pub units: UnitConfig,
}

impl Options {
    pub fn new(preference: UnitSystemPreference) -> Self {
        Self {
            host: None,
            update_interval: DEFAULT_UPDATE_INTERVAL,
            units: UnitConfig::default_for(preference),
        }
    }

    /// Never fails: bad entries fall back to their defaults.
    pub fn from_value(value: &Value, preference: UnitSystemPreference) -> Self {
        let has_units = Measurement::iter().any(|m| value.get(m.config_key()).is_some());
        let units = UnitConfig::load(has_units.then_some(value), preference);

        let update_interval = match value.get("update_interval") {
            None | Some(Value::Null) => DEFAULT_UPDATE_INTERVAL,
            Some(raw) => match raw
                .as_f64()
                .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
                .filter(|duration| !duration.is_zero())
            {
                Some(interval) => interval,
                None => {
                    warn!("Invalid update_interval {}, using default", raw);
                    DEFAULT_UPDATE_INTERVAL
                }
            },
        };

        let host = value.get("host").and_then(Value::as_str).map(str::to_string);

        Self {
            host,
            update_interval,
            units,
        }
    }

    pub fn to_value(&self) -> Value {
        let mut value = self.units.to_value();
        if let Value::Object(map) = &mut value {
            map.insert(
                "update_interval".to_string(),
                Value::from(self.update_interval.as_secs_f64()),
            );
            if let Some(host) = &self.host {
                map.insert("host".to_string(), Value::from(host.clone()));
            }
        }
        value
    }

    pub fn load(path: &Path, preference: UnitSystemPreference) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let value: Value = serde_json::from_str(&content)?;
        if !value.is_object() {
            return Err(WeatherLinkError::InvalidConfig(format!(
                "{} does not contain a JSON object",
                path.display()
            )));
        }
        Ok(Self::from_value(&value, preference))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(&self.to_value())?;
        fs::write(path, content)?;
        Ok(())
    }
}

/// Process configuration read from the environment.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub host: Option<String>,
    /// `None` leaves the persisted or default interval in place.
    pub update_interval: Option<Duration>,
    pub broadcast: bool,
    pub unit_system: UnitSystemPreference,
    pub options_path: Option<PathBuf>,
    pub request_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: None,
            update_interval: None,
            broadcast: true,
            unit_system: UnitSystemPreference::Metric,
            options_path: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(host) = lookup("WEATHERLINK_HOST")
            && !host.trim().is_empty()
        {
            config.host = Some(host);
        }
        if let Some(interval) = lookup("WEATHERLINK_UPDATE_INTERVAL") {
            match parse_seconds(&interval) {
                Some(interval) => config.update_interval = Some(interval),
                None => warn!("Ignoring invalid WEATHERLINK_UPDATE_INTERVAL={}", interval),
            }
        }
        if let Some(broadcast) = lookup("WEATHERLINK_BROADCAST")
            && let Some(b) = parse_bool(&broadcast)
        {
            config.broadcast = b;
        }
        if let Some(system) = lookup("WEATHERLINK_UNIT_SYSTEM") {
            match system.parse() {
                Ok(system) => config.unit_system = system,
                Err(_) => warn!("Ignoring unknown WEATHERLINK_UNIT_SYSTEM={}", system),
            }
        }
        if let Some(path) = lookup("WEATHERLINK_OPTIONS") {
            config.options_path = Some(PathBuf::from(path));
        }
        if let Some(timeout) = lookup("WEATHERLINK_REQUEST_TIMEOUT")
            && let Some(t) = parse_seconds(&timeout)
        {
            config.request_timeout = t;
        }

        config
    }

    /// Persisted options with the environment applied on top.
    pub fn options(&self) -> Result<Options> {
        let mut options = match &self.options_path {
            Some(path) if path.exists() => Options::load(path, self.unit_system)?,
            _ => Options::new(self.unit_system),
        };

        if let Some(host) = &self.host {
            options.host = Some(host.clone());
        }
        if let Some(interval) = self.update_interval {
            options.update_interval = interval;
        }
        Ok(options)
    }
}
