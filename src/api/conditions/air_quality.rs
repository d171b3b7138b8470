use super::ConditionType;
use super::condition::{Condition, update_fields};
use crate::api::json::{self, JsonObject};
use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const REQUIRED_KEYS: &[&str] = &[
    "temp",
    "hum",
    "dew_point",
    "wet_bulb",
    "heat_index",
    "pm_1_last",
    "pm_2p5_last",
    "pm_10_last",
    "pm_1",
    "pm_2p5",
    "pm_10",
    "pm_2p5_last_1_hour",
    "pm_2p5_last_3_hours",
    "pm_2p5_last_24_hours",
    "pm_2p5_nowcast",
    "pm_10_last_1_hour",
    "pm_10_last_3_hours",
    "pm_10_last_24_hours",
    "pm_10_nowcast",
    "last_report_time",
    "pct_pm_data_last_1_hour",
    "pct_pm_data_last_3_hours",
    "pct_pm_data_last_24_hours",
    "pct_pm_data_nowcast",
];

const PERCENT_KEYS: &[&str] = &[
    "pct_pm_data_last_1_hour",
    "pct_pm_data_last_3_hours",
    "pct_pm_data_last_24_hours",
    "pct_pm_data_nowcast",
];

/// AirLink particulate matter sensor.
///
/// PM concentrations are in µg/m³ using atmospheric calibration. The
/// `pct_pm_data_*` fields give the share of data available for the matching
/// average, rounded down to the nearest percent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AirQualityCondition {
    pub lsid: Option<u64>,

    pub temp: Option<f64>,
    pub hum: Option<f64>,
    pub dew_point: Option<f64>,
    pub wet_bulb: Option<f64>,
    pub heat_index: Option<f64>,

    /// Most recent valid readings.
    pub pm_1_last: Option<f64>,
    pub pm_2p5_last: Option<f64>,
    pub pm_10_last: Option<f64>,

    /// Averages over the last minute.
    pub pm_1: Option<f64>,
    pub pm_2p5: Option<f64>,
    pub pm_10: Option<f64>,

    pub pm_2p5_last_1_hour: Option<f64>,
    pub pm_2p5_last_3_hours: Option<f64>,
    pub pm_2p5_last_24_hours: Option<f64>,
    /// Weighted average over the last 12 hours.
    pub pm_2p5_nowcast: Option<f64>,

    pub pm_10_last_1_hour: Option<f64>,
    pub pm_10_last_3_hours: Option<f64>,
    pub pm_10_last_24_hours: Option<f64>,
    pub pm_10_nowcast: Option<f64>,

    /// Time of the last valid sensor reading, or time since boot when the
    /// clock has not been synchronised.
    #[serde(with = "chrono::serde::ts_seconds_option")]
    pub last_report_time: Option<DateTime<Utc>>,

    pub pct_pm_data_last_1_hour: Option<u8>,
    pub pct_pm_data_last_3_hours: Option<u8>,
    pub pct_pm_data_last_24_hours: Option<u8>,
    pub pct_pm_data_nowcast: Option<u8>,
}

impl Condition for AirQualityCondition {
    const TYPE: ConditionType = ConditionType::AirQuality;

    fn decode(mut data: JsonObject) -> Result<Self> {
        json::require_keys(&data, "AirQualityCondition", REQUIRED_KEYS)?;
        json::keys_to_celsius(&mut data, &["temp", "dew_point", "wet_bulb", "heat_index"])?;
        json::keys_to_integer(&mut data, PERCENT_KEYS)?;
        json::decode_record(data, "AirQualityCondition")
    }

    fn update_from(&mut self, other: &Self) {
        update_fields!(self, other;
            lsid, temp, hum, dew_point, wet_bulb, heat_index,
            pm_1_last, pm_2p5_last, pm_10_last,
            pm_1, pm_2p5, pm_10,
            pm_2p5_last_1_hour, pm_2p5_last_3_hours, pm_2p5_last_24_hours, pm_2p5_nowcast,
            pm_10_last_1_hour, pm_10_last_3_hours, pm_10_last_24_hours, pm_10_nowcast,
            last_report_time,
            pct_pm_data_last_1_hour, pct_pm_data_last_3_hours,
            pct_pm_data_last_24_hours, pct_pm_data_nowcast,
        );
    }

    fn lsid(&self) -> Option<u64> {
        self.lsid
    }
}
