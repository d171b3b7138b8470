//! Local API of WeatherLink Live and AirLink hubs.

pub mod broadcast;
pub mod conditions;
pub mod json;
pub mod rest;

#[cfg(test)]
pub(crate) mod testing;

pub use broadcast::{
    BroadcastListener, LeaseRenewer, ListenerOptions, QueueFullPolicy, UpdateQueue,
    WeatherLinkBroadcast,
};
pub use conditions::{
    AirQualityCondition, CollectorSize, Condition, ConditionRecord, ConditionType, Conditions,
    CurrentConditions, DeviceType, IssCondition, LssBarCondition, LssTempHumCondition,
    MoistureCondition, ParseMode, ReceiverState,
};
pub use rest::{RealTimeBroadcast, WeatherLinkRest};

use crate::error::Result;
use async_trait::async_trait;
use std::time::Duration;

/// Requests the coordinator and the broadcast lease need from a hub.
#[async_trait]
pub trait WeatherLinkApi: Send + Sync {
    /// Current conditions. Malformed condition records are skipped.
    async fn current_conditions(&self) -> Result<CurrentConditions>;

    /// Request a real-time broadcast lease for `duration`.
    async fn real_time(&self, duration: Duration) -> Result<RealTimeBroadcast>;
}
