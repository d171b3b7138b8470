use super::ConditionType;
use super::condition::{Condition, update_fields};
use crate::api::json::{self, JsonObject};
use crate::error::Result;
use serde::{Deserialize, Serialize};

/// Barometer built into the hub. All values in hPa.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LssBarCondition {
    pub lsid: Option<u64>,
    /// Reading adjusted for elevation.
    pub bar_sea_level: Option<f64>,
    /// Current 3 hour trend.
    pub bar_trend: Option<f64>,
    /// Raw sensor reading.
    pub bar_absolute: Option<f64>,
}

impl Condition for LssBarCondition {
    const TYPE: ConditionType = ConditionType::LssBar;

    fn decode(mut data: JsonObject) -> Result<Self> {
        json::require_keys(&data, "LssBarCondition", &["bar_sea_level", "bar_absolute"])?;
        json::keys_to_hpa(&mut data, &["bar_sea_level", "bar_trend", "bar_absolute"])?;
        json::decode_record(data, "LssBarCondition")
    }

    fn update_from(&mut self, other: &Self) {
        update_fields!(self, other; lsid, bar_sea_level, bar_trend, bar_absolute);
    }

    fn lsid(&self) -> Option<u64> {
        self.lsid
    }
}

/// Indoor temperature and humidity sensor built into the hub.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LssTempHumCondition {
    pub lsid: Option<u64>,
    pub temp_in: Option<f64>,
    pub hum_in: Option<f64>,
    pub dew_point_in: Option<f64>,
    pub heat_index_in: Option<f64>,
}

impl Condition for LssTempHumCondition {
    const TYPE: ConditionType = ConditionType::LssTempHum;

    fn decode(mut data: JsonObject) -> Result<Self> {
        json::require_keys(
            &data,
            "LssTempHumCondition",
            &["temp_in", "hum_in", "dew_point_in", "heat_index_in"],
        )?;
        json::keys_to_celsius(&mut data, &["temp_in", "dew_point_in", "heat_index_in"])?;
        json::decode_record(data, "LssTempHumCondition")
    }

    fn update_from(&mut self, other: &Self) {
        update_fields!(self, other; lsid, temp_in, hum_in, dew_point_in, heat_index_in);
    }

    fn lsid(&self) -> Option<u64> {
        self.lsid
    }
}
