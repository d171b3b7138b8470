//! WeatherLink bridge library.
//!
//! Talks to the local API of Davis WeatherLink Live and AirLink hubs and
//! keeps a live, normalised snapshot of their current conditions. Polling
//! and the UDP real-time broadcast feed the same snapshot.

pub mod api;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod notifier;
pub mod sensors;
pub mod units;
pub mod weather;

pub use api::{CurrentConditions, DeviceType, WeatherLinkApi, WeatherLinkRest};
pub use config::{Config, Options};
pub use coordinator::{CoordinatorSettings, UpdateCoordinator};
pub use error::{Result, WeatherLinkError};
pub use notifier::{SubscriptionId, UpdateSource};
pub use units::{UnitConfig, UnitSystemPreference};
pub use weather::{WeatherCondition, WeatherSummary};
