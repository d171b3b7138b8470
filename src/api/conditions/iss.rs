use super::ConditionType;
use super::condition::{Condition, ReceiverState, update_fields};
use crate::api::json::{self, JsonObject};
use crate::error::{Result, WeatherLinkError};
use chrono::{DateTime, Utc};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use strum::{Display, FromRepr};

/// Rain collector type. The discriminant is the hub's wire code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display, FromRepr)]
#[repr(u8)]
pub enum CollectorSize {
    /// 0.01"
    Inches001 = 1,
    /// 0.2 mm
    Millimeter02 = 2,
    /// 0.1 mm
    Millimeter01 = 3,
    /// 0.001"
    Inches0001 = 4,
}

impl CollectorSize {
    /// Millimetres of rain per hardware count.
    pub fn mm_per_count(self) -> f64 {
        match self {
            Self::Millimeter01 => 0.1,
            Self::Millimeter02 => 0.2,
            Self::Inches001 => 0.254,
            Self::Inches0001 => 0.0254,
        }
    }

    pub fn to_mm(self, counts: f64) -> f64 {
        counts * self.mm_per_count()
    }

    fn from_value(value: Option<&Value>) -> Result<Self> {
        let code = value
            .and_then(Value::as_u64)
            .ok_or_else(|| WeatherLinkError::decode("rain_size", "expected a collector size code"))?;
        u8::try_from(code)
            .ok()
            .and_then(Self::from_repr)
            .ok_or_else(|| WeatherLinkError::decode("rain_size", format!("unknown collector size code {code}")))
    }

    fn deserialize_code<'de, D>(deserializer: D) -> std::result::Result<Option<Self>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<u8>::deserialize(deserializer)?
            .map(|code| {
                Self::from_repr(code)
                    .ok_or_else(|| D::Error::custom(format!("unknown collector size code {code}")))
            })
            .transpose()
    }
}

const REQUIRED_KEYS: &[&str] = &[
    "txid",
    "rain_size",
    "rain_rate_last",
    "rainfall_daily",
    "rainfall_monthly",
    "rainfall_year",
];

const RAIN_ALIASES: &[(&str, &[&str])] = &[
    ("rainfall_last_15_min", &["rain_15_min"]),
    ("rainfall_last_60_min", &["rain_60_min"]),
    ("rainfall_last_24_hr", &["rain_24_hr"]),
];

const RAIN_COUNT_KEYS: &[&str] = &[
    "rain_rate_last",
    "rain_rate_hi",
    "rainfall_last_15_min",
    "rain_rate_hi_last_15_min",
    "rainfall_last_60_min",
    "rainfall_last_24_hr",
    "rain_storm",
    "rainfall_daily",
    "rainfall_monthly",
    "rainfall_year",
    "rain_storm_last",
];

const TEMPERATURE_KEYS: &[&str] = &[
    "temp",
    "dew_point",
    "wet_bulb",
    "heat_index",
    "wind_chill",
    "thw_index",
    "thsw_index",
];

const WIND_SPEED_KEYS: &[&str] = &[
    "wind_speed_last",
    "wind_speed_avg_last_1_min",
    "wind_speed_avg_last_2_min",
    "wind_speed_hi_last_2_min",
    "wind_speed_avg_last_10_min",
    "wind_speed_hi_last_10_min",
];

const WIND_DIRECTION_KEYS: &[&str] = &[
    "wind_dir_last",
    "wind_dir_scalar_avg_last_1_min",
    "wind_dir_scalar_avg_last_2_min",
    "wind_dir_at_hi_speed_last_2_min",
    "wind_dir_scalar_avg_last_10_min",
    "wind_dir_at_hi_speed_last_10_min",
];

/// Outdoor Integrated Sensor Suite.
///
/// Temperatures are in °C, wind speeds in km/h and rain values in mm
/// (rates in mm/h). Every rain value is paired with the raw `*_counts`
/// reported by the hardware.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IssCondition {
    pub lsid: Option<u64>,
    /// Transmitter ID.
    pub txid: Option<u8>,
    #[serde(deserialize_with = "CollectorSize::deserialize_code")]
    pub rain_size: Option<CollectorSize>,
    #[serde(deserialize_with = "ReceiverState::deserialize_code")]
    pub rx_state: Option<ReceiverState>,

    pub temp: Option<f64>,
    /// Relative humidity in %.
    pub hum: Option<f64>,
    pub dew_point: Option<f64>,
    pub wet_bulb: Option<f64>,
    pub heat_index: Option<f64>,
    pub wind_chill: Option<f64>,
    pub thw_index: Option<f64>,
    pub thsw_index: Option<f64>,

    pub wind_speed_last: Option<f64>,
    /// Degrees.
    pub wind_dir_last: Option<u16>,
    pub wind_speed_avg_last_1_min: Option<f64>,
    pub wind_dir_scalar_avg_last_1_min: Option<u16>,
    pub wind_speed_avg_last_2_min: Option<f64>,
    pub wind_dir_scalar_avg_last_2_min: Option<u16>,
    pub wind_speed_hi_last_2_min: Option<f64>,
    pub wind_dir_at_hi_speed_last_2_min: Option<u16>,
    pub wind_speed_avg_last_10_min: Option<f64>,
    pub wind_dir_scalar_avg_last_10_min: Option<u16>,
    pub wind_speed_hi_last_10_min: Option<f64>,
    pub wind_dir_at_hi_speed_last_10_min: Option<u16>,

    pub rain_rate_last: Option<f64>,
    pub rain_rate_last_counts: Option<i64>,
    pub rain_rate_hi: Option<f64>,
    pub rain_rate_hi_counts: Option<i64>,
    pub rain_rate_hi_last_15_min: Option<f64>,
    pub rain_rate_hi_last_15_min_counts: Option<i64>,

    pub rainfall_last_15_min: Option<f64>,
    pub rainfall_last_15_min_counts: Option<i64>,
    pub rainfall_last_60_min: Option<f64>,
    pub rainfall_last_60_min_counts: Option<i64>,
    pub rainfall_last_24_hr: Option<f64>,
    pub rainfall_last_24_hr_counts: Option<i64>,
    /// Since local midnight.
    pub rainfall_daily: Option<f64>,
    pub rainfall_daily_counts: Option<i64>,
    pub rainfall_monthly: Option<f64>,
    pub rainfall_monthly_counts: Option<i64>,
    /// Since the first of the user-chosen month.
    pub rainfall_year: Option<f64>,
    pub rainfall_year_counts: Option<i64>,

    /// Rain since the last 24 hour break in rain.
    pub rain_storm: Option<f64>,
    pub rain_storm_counts: Option<i64>,
    #[serde(with = "chrono::serde::ts_seconds_option")]
    pub rain_storm_start_at: Option<DateTime<Utc>>,
    pub rain_storm_last: Option<f64>,
    pub rain_storm_last_counts: Option<i64>,
    #[serde(with = "chrono::serde::ts_seconds_option")]
    pub rain_storm_last_start_at: Option<DateTime<Utc>>,
    #[serde(with = "chrono::serde::ts_seconds_option")]
    pub rain_storm_last_end_at: Option<DateTime<Utc>>,

    /// W/m².
    pub solar_rad: Option<f64>,
    pub uv_index: Option<f64>,
    pub trans_battery_flag: Option<u8>,
}

/// Replace each present rain count with its value in mm and keep the raw
/// count under `{key}_counts`. Absent keys stay absent.
fn keys_counts_to_mm(d: &mut JsonObject, collector: CollectorSize, keys: &[&str]) -> Result<()> {
    json::keys_to_integer(d, keys)?;

    for &key in keys {
        let Some(counts) = d.get(key).filter(|value| !value.is_null()).cloned() else {
            continue;
        };

        let mm = counts
            .as_f64()
            .map(|counts| collector.to_mm(counts))
            .ok_or_else(|| WeatherLinkError::decode(key, format!("expected a count, got {counts}")))?;
        d.insert(format!("{key}_counts"), counts);
        d.insert(key.to_string(), Value::from(mm));
    }
    Ok(())
}

impl Condition for IssCondition {
    const TYPE: ConditionType = ConditionType::Iss;

    fn decode(mut data: JsonObject) -> Result<Self> {
        json::require_keys(&data, "IssCondition", REQUIRED_KEYS)?;
        json::keys_from_aliases(&mut data, RAIN_ALIASES);

        let collector = CollectorSize::from_value(data.get("rain_size"))?;
        keys_counts_to_mm(&mut data, collector, RAIN_COUNT_KEYS)?;

        json::keys_to_celsius(&mut data, TEMPERATURE_KEYS)?;
        json::keys_to_kph(&mut data, WIND_SPEED_KEYS)?;
        json::keys_to_integer(&mut data, WIND_DIRECTION_KEYS)?;

        json::decode_record(data, "IssCondition")
    }

    fn update_from(&mut self, other: &Self) {
        update_fields!(self, other;
            lsid, txid, rain_size, rx_state,
            temp, hum, dew_point, wet_bulb, heat_index, wind_chill, thw_index, thsw_index,
            wind_speed_last, wind_dir_last,
            wind_speed_avg_last_1_min, wind_dir_scalar_avg_last_1_min,
            wind_speed_avg_last_2_min, wind_dir_scalar_avg_last_2_min,
            wind_speed_hi_last_2_min, wind_dir_at_hi_speed_last_2_min,
            wind_speed_avg_last_10_min, wind_dir_scalar_avg_last_10_min,
            wind_speed_hi_last_10_min, wind_dir_at_hi_speed_last_10_min,
            rain_rate_last, rain_rate_last_counts,
            rain_rate_hi, rain_rate_hi_counts,
            rain_rate_hi_last_15_min, rain_rate_hi_last_15_min_counts,
            rainfall_last_15_min, rainfall_last_15_min_counts,
            rainfall_last_60_min, rainfall_last_60_min_counts,
            rainfall_last_24_hr, rainfall_last_24_hr_counts,
            rainfall_daily, rainfall_daily_counts,
            rainfall_monthly, rainfall_monthly_counts,
            rainfall_year, rainfall_year_counts,
            rain_storm, rain_storm_counts, rain_storm_start_at,
            rain_storm_last, rain_storm_last_counts,
            rain_storm_last_start_at, rain_storm_last_end_at,
            solar_rad, uv_index, trans_battery_flag,
        );
    }

    fn lsid(&self) -> Option<u64> {
        self.lsid
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn decode(value: Value) -> Result<IssCondition> {
        match value {
            Value::Object(map) => IssCondition::decode(map),
            other => panic!("not an object: {other}"),
        }
    }

    fn minimal() -> Value {
        json!({
            "lsid": 1,
            "txid": 1,
            "rain_size": 2,
            "rain_rate_last": 0,
            "rainfall_daily": 10,
            "rainfall_monthly": 276,
            "rainfall_year": 276,
        })
    }

    #[test]
    fn test_rain_counts_to_mm() {
        let iss = decode(minimal()).unwrap();

        assert_eq!(iss.rain_size, Some(CollectorSize::Millimeter02));
        assert_eq!(iss.rainfall_daily, Some(2.0));
        assert_eq!(iss.rainfall_daily_counts, Some(10));
        assert_eq!(iss.rainfall_monthly, Some(55.2));
        assert_eq!(iss.rainfall_monthly_counts, Some(276));
    }

    #[test]
    fn test_zero_counts_convert_and_absent_counts_stay_absent() {
        let iss = decode(minimal()).unwrap();

        assert_eq!(iss.rain_rate_last, Some(0.0));
        assert_eq!(iss.rain_rate_last_counts, Some(0));
        assert_eq!(iss.rain_storm, None);
        assert_eq!(iss.rain_storm_counts, None);
    }

    #[test]
    fn test_collector_sizes() {
        assert_eq!(CollectorSize::from_repr(3).unwrap().to_mm(10.0), 1.0);
        assert_eq!(CollectorSize::from_repr(1).unwrap().mm_per_count(), 0.254);
        assert_eq!(CollectorSize::from_repr(4).unwrap().mm_per_count(), 0.0254);
        assert!(CollectorSize::from_repr(5).is_none());
    }

    #[test]
    fn test_unknown_collector_size_is_an_error() {
        let mut value = minimal();
        value["rain_size"] = json!(9);
        assert!(decode(value).is_err());
    }

    #[test]
    fn test_unknown_receiver_state_is_an_error() {
        let mut value = minimal();
        value["rx_state"] = json!(7);
        assert!(decode(value).is_err());

        let mut value = minimal();
        value["rx_state"] = json!(1);
        assert_eq!(decode(value).unwrap().rx_state, Some(ReceiverState::Synched));
    }

    #[test]
    fn test_missing_required_key_is_an_error() {
        let mut value = minimal();
        value.as_object_mut().unwrap().remove("rainfall_year");
        assert!(decode(value).is_err());
    }

    #[test]
    fn test_rain_aliases() {
        let mut value = minimal();
        value["rain_15_min"] = json!(5);
        value["rain_60_min"] = json!(6);
        value["rainfall_last_60_min"] = json!(1);

        let iss = decode(value).unwrap();
        assert_eq!(iss.rainfall_last_15_min_counts, Some(5));
        assert_eq!(iss.rainfall_last_15_min, Some(1.0));
        assert_eq!(iss.rainfall_last_60_min_counts, Some(1));
    }

    #[test]
    fn test_unit_conversion_and_timestamps() {
        let mut value = minimal();
        value["temp"] = json!(26.6);
        value["wind_speed_last"] = json!(5.0);
        value["wind_dir_last"] = json!(254.0);
        value["rain_storm_last_start_at"] = json!(1610489461);
        value["rain_storm_start_at"] = Value::Null;

        let iss = decode(value).unwrap();
        assert_eq!(iss.temp, Some(-3.0));
        assert_eq!(iss.wind_speed_last, Some(8.047));
        assert_eq!(iss.wind_dir_last, Some(254));
        assert_eq!(
            iss.rain_storm_last_start_at,
            DateTime::from_timestamp(1610489461, 0)
        );
        assert_eq!(iss.rain_storm_start_at, None);
    }

    #[test]
    fn test_update_from_keeps_unrelated_fields() {
        let mut stored = decode(minimal()).unwrap();
        stored.temp = Some(12.5);
        stored.wind_speed_last = Some(3.0);

        let partial = IssCondition {
            wind_speed_last: Some(9.5),
            ..Default::default()
        };
        stored.update_from(&partial);

        assert_eq!(stored.wind_speed_last, Some(9.5));
        assert_eq!(stored.temp, Some(12.5));
        assert_eq!(stored.rainfall_daily, Some(2.0));
        assert_eq!(stored.lsid, Some(1));
    }
}
