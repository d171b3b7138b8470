//! Coarse weather summary of an ISS station.

use crate::api::{ConditionType, Conditions, IssCondition};
use crate::sensors::ConditionGated;
use crate::units::UnitConfig;
use serde::Serialize;
use strum::Display;

/// Rain rate (mm/h) above which it counts as raining.
const RAIN_THRESHOLD: f64 = 0.25;
/// Rain rate (mm/h) above which it counts as pouring.
const POURING_THRESHOLD: f64 = 4.0;
/// Two-minute average wind speed (km/h) above which it counts as windy.
const WINDY_THRESHOLD: f64 = 20.0;
/// Solar radiation (W/m²) above which it counts as sunny.
const SUNNY_THRESHOLD: f64 = 500.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
pub enum WeatherCondition {
    #[strum(serialize = "snowy")]
    #[serde(rename = "snowy")]
    Snowy,
    #[strum(serialize = "snowy-rainy")]
    #[serde(rename = "snowy-rainy")]
    SnowyRainy,
    #[strum(serialize = "pouring")]
    #[serde(rename = "pouring")]
    Pouring,
    #[strum(serialize = "rainy")]
    #[serde(rename = "rainy")]
    Rainy,
    #[strum(serialize = "windy")]
    #[serde(rename = "windy")]
    Windy,
    #[strum(serialize = "clear-night")]
    #[serde(rename = "clear-night")]
    ClearNight,
    #[strum(serialize = "sunny")]
    #[serde(rename = "sunny")]
    Sunny,
    #[strum(serialize = "partlycloudy")]
    #[serde(rename = "partlycloudy")]
    PartlyCloudy,
}

/// Display-ready weather values.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeatherReport {
    pub condition: WeatherCondition,
    pub temperature: Option<f64>,
    pub temperature_unit: &'static str,
    pub humidity: Option<f64>,
    pub pressure: Option<f64>,
    pub pressure_unit: &'static str,
    pub wind_speed: Option<f64>,
    pub wind_speed_unit: &'static str,
    pub wind_bearing: Option<u16>,
}

/// Weather view over a conditions snapshot. Values are canonical metric.
#[derive(Debug, Clone, Copy)]
pub struct WeatherSummary<'a> {
    conditions: &'a Conditions,
}

impl<'a> WeatherSummary<'a> {
    pub fn new(conditions: &'a Conditions) -> Self {
        Self { conditions }
    }

    fn iss(&self) -> Option<&'a IssCondition> {
        self.conditions.iss()
    }

    pub fn temperature(&self) -> Option<f64> {
        self.iss()?.temp
    }

    pub fn humidity(&self) -> Option<f64> {
        self.iss()?.hum
    }

    /// Sea-level pressure. Only known if the hub has a barometer.
    pub fn pressure(&self) -> Option<f64> {
        self.conditions.lss_bar()?.bar_sea_level
    }

    pub fn wind_speed(&self) -> Option<f64> {
        self.iss()?.wind_speed_avg_last_2_min
    }

    pub fn wind_bearing(&self) -> Option<u16> {
        self.iss()?.wind_dir_scalar_avg_last_2_min
    }

    /// `is_night` comes from the caller, the station has no notion of it.
    pub fn condition(&self, is_night: bool) -> Option<WeatherCondition> {
        let iss = self.iss()?;

        let rain_rate = iss.rain_rate_hi.unwrap_or(0.0);
        if rain_rate > RAIN_THRESHOLD {
            let condition = match iss.temp {
                Some(temp) if temp <= 0.0 => WeatherCondition::Snowy,
                Some(temp) if temp < 5.0 => WeatherCondition::SnowyRainy,
                _ if rain_rate > POURING_THRESHOLD => WeatherCondition::Pouring,
                _ => WeatherCondition::Rainy,
            };
            return Some(condition);
        }

        if iss.wind_speed_avg_last_2_min.unwrap_or(0.0) > WINDY_THRESHOLD {
            return Some(WeatherCondition::Windy);
        }
        if is_night {
            return Some(WeatherCondition::ClearNight);
        }
        if iss.solar_rad.unwrap_or(0.0) > SUNNY_THRESHOLD {
            return Some(WeatherCondition::Sunny);
        }
        Some(WeatherCondition::PartlyCloudy)
    }

    /// Convert everything into the configured units.
    pub fn report(&self, units: &UnitConfig, is_night: bool) -> Option<WeatherReport> {
        Some(WeatherReport {
            condition: self.condition(is_night)?,
            temperature: units.temperature.convert_optional(self.temperature()),
            temperature_unit: units.temperature.unit_of_measurement(),
            humidity: self.humidity(),
            pressure: units.pressure.convert_optional(self.pressure()),
            pressure_unit: units.pressure.unit_of_measurement(),
            wind_speed: units.wind_speed.convert_optional(self.wind_speed()),
            wind_speed_unit: units.wind_speed.unit_of_measurement(),
            wind_bearing: self.wind_bearing(),
        })
    }
}

impl ConditionGated for WeatherSummary<'_> {
    fn required_conditions(&self) -> &[ConditionType] {
        &[ConditionType::Iss]
    }
}
