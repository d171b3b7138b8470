//! Sensor values derived from a conditions snapshot.
//!
//! Every sensor is described by a static [`SensorDescriptor`]. A descriptor
//! names the condition records it depends on and how to read its canonical
//! value; the display unit is applied when the state is read.

use crate::api::{ConditionType, Conditions};
use crate::units::{Measurement, UnitConfig, round_to};
use serde::Serialize;

/// Something that can only be shown when certain condition records exist.
pub trait ConditionGated {
    fn required_conditions(&self) -> &[ConditionType];

    fn is_available(&self, conditions: &Conditions) -> bool {
        conditions.contains_all(self.required_conditions())
    }
}

/// How a sensor's value is presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorUnit {
    /// Converted into whatever unit is configured for the measurement.
    Measurement(Measurement),
    /// Always shown as-is, with a fixed label and precision.
    Fixed {
        unit_of_measurement: Option<&'static str>,
        ndigits: Option<i32>,
    },
}

const PERCENT: SensorUnit = SensorUnit::Fixed {
    unit_of_measurement: Some("%"),
    ndigits: Some(1),
};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SensorState {
    pub value: f64,
    pub unit_of_measurement: Option<&'static str>,
}

pub struct SensorDescriptor {
    pub key: &'static str,
    pub name: &'static str,
    pub unit: SensorUnit,
    pub required: &'static [ConditionType],
    /// Reads the canonical value. `None` if the hub did not report it.
    pub read: fn(&Conditions) -> Option<f64>,
}

impl SensorDescriptor {
    /// Raw canonical value, before unit conversion and rounding.
    pub fn value(&self, conditions: &Conditions) -> Option<f64> {
        (self.read)(conditions)
    }

    /// Converted and rounded value with its unit label.
    pub fn state(&self, conditions: &Conditions, units: &UnitConfig) -> Option<SensorState> {
        let value = self.value(conditions)?;
        let state = match self.unit {
            SensorUnit::Measurement(measurement) => {
                let unit = units.by_measurement(measurement);
                SensorState {
                    value: unit.convert(value),
                    unit_of_measurement: Some(unit.unit_of_measurement()),
                }
            }
            SensorUnit::Fixed {
                unit_of_measurement,
                ndigits,
            } => SensorState {
                value: round_to(value, ndigits),
                unit_of_measurement,
            },
        };
        Some(state)
    }
}

impl ConditionGated for SensorDescriptor {
    fn required_conditions(&self) -> &[ConditionType] {
        self.required
    }
}

impl std::fmt::Debug for SensorDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SensorDescriptor")
            .field("key", &self.key)
            .field("name", &self.name)
            .field("unit", &self.unit)
            .field("required", &self.required)
            .finish_non_exhaustive()
    }
}

const ISS: &[ConditionType] = &[ConditionType::Iss];
const LSS_BAR: &[ConditionType] = &[ConditionType::LssBar];
const LSS_TEMP_HUM: &[ConditionType] = &[ConditionType::LssTempHum];
const MOISTURE: &[ConditionType] = &[ConditionType::Moisture];
const AIR_QUALITY: &[ConditionType] = &[ConditionType::AirQuality];

pub static SENSORS: &[SensorDescriptor] = &[
    SensorDescriptor {
        key: "pressure",
        name: "Pressure",
        unit: SensorUnit::Measurement(Measurement::Pressure),
        required: LSS_BAR,
        read: |c| c.lss_bar()?.bar_sea_level,
    },
    SensorDescriptor {
        key: "inside_temperature",
        name: "Inside temperature",
        unit: SensorUnit::Measurement(Measurement::Temperature),
        required: LSS_TEMP_HUM,
        read: |c| c.lss_temp_hum()?.temp_in,
    },
    SensorDescriptor {
        key: "inside_humidity",
        name: "Inside humidity",
        unit: PERCENT,
        required: LSS_TEMP_HUM,
        read: |c| c.lss_temp_hum()?.hum_in,
    },
    SensorDescriptor {
        key: "temperature",
        name: "Temperature",
        unit: SensorUnit::Measurement(Measurement::Temperature),
        required: ISS,
        read: |c| c.iss()?.temp,
    },
    SensorDescriptor {
        key: "thsw_index",
        name: "THSW index",
        unit: SensorUnit::Measurement(Measurement::Temperature),
        required: ISS,
        read: |c| c.iss()?.thsw_index,
    },
    SensorDescriptor {
        key: "humidity",
        name: "Humidity",
        unit: PERCENT,
        required: ISS,
        read: |c| c.iss()?.hum,
    },
    SensorDescriptor {
        key: "wind_speed",
        name: "Wind speed",
        unit: SensorUnit::Measurement(Measurement::WindSpeed),
        required: ISS,
        read: |c| c.iss()?.wind_speed_avg_last_2_min,
    },
    SensorDescriptor {
        key: "wind_max_speed",
        name: "Wind max speed",
        unit: SensorUnit::Measurement(Measurement::WindSpeed),
        required: ISS,
        read: |c| c.iss()?.wind_speed_hi_last_2_min,
    },
    SensorDescriptor {
        key: "wind_bearing",
        name: "Wind bearing",
        unit: SensorUnit::Fixed {
            unit_of_measurement: Some("°"),
            ndigits: Some(0),
        },
        required: ISS,
        read: |c| c.iss()?.wind_dir_scalar_avg_last_2_min.map(f64::from),
    },
    SensorDescriptor {
        key: "solar_rad",
        name: "Solar rad",
        unit: SensorUnit::Fixed {
            unit_of_measurement: Some("W/m²"),
            ndigits: Some(0),
        },
        required: ISS,
        read: |c| c.iss()?.solar_rad,
    },
    SensorDescriptor {
        key: "uv_index",
        name: "UV index",
        unit: SensorUnit::Fixed {
            unit_of_measurement: None,
            ndigits: Some(1),
        },
        required: ISS,
        read: |c| c.iss()?.uv_index,
    },
    SensorDescriptor {
        key: "rain_rate",
        name: "Rain rate",
        unit: SensorUnit::Measurement(Measurement::RainRate),
        required: ISS,
        read: |c| c.iss()?.rain_rate_last,
    },
    SensorDescriptor {
        key: "rainfall",
        name: "Rainfall",
        unit: SensorUnit::Measurement(Measurement::Rainfall),
        required: ISS,
        read: |c| c.iss()?.rainfall_daily,
    },
    SensorDescriptor {
        key: "rainstorm",
        name: "Rainstorm",
        unit: SensorUnit::Measurement(Measurement::Rainfall),
        required: ISS,
        read: |c| c.iss()?.rain_storm,
    },
    SensorDescriptor {
        key: "air_quality_temperature",
        name: "Temperature",
        unit: SensorUnit::Measurement(Measurement::Temperature),
        required: AIR_QUALITY,
        read: |c| c.air_quality()?.temp,
    },
    SensorDescriptor {
        key: "air_quality_humidity",
        name: "Humidity",
        unit: PERCENT,
        required: AIR_QUALITY,
        read: |c| c.air_quality()?.hum,
    },
    SensorDescriptor {
        key: "pm_1",
        name: "PM 1.0",
        unit: SensorUnit::Measurement(Measurement::Pm),
        required: AIR_QUALITY,
        read: |c| c.air_quality()?.pm_1,
    },
    SensorDescriptor {
        key: "pm_2p5",
        name: "PM 2.5",
        unit: SensorUnit::Measurement(Measurement::Pm),
        required: AIR_QUALITY,
        read: |c| c.air_quality()?.pm_2p5_nowcast,
    },
    SensorDescriptor {
        key: "pm_10",
        name: "PM 10.0",
        unit: SensorUnit::Measurement(Measurement::Pm),
        required: AIR_QUALITY,
        read: |c| c.air_quality()?.pm_10_nowcast,
    },
    SensorDescriptor {
        key: "soil_temperature_1",
        name: "Soil temperature 1",
        unit: SensorUnit::Measurement(Measurement::Temperature),
        required: MOISTURE,
        read: |c| c.moisture()?.soil_temperature(1),
    },
    SensorDescriptor {
        key: "soil_temperature_2",
        name: "Soil temperature 2",
        unit: SensorUnit::Measurement(Measurement::Temperature),
        required: MOISTURE,
        read: |c| c.moisture()?.soil_temperature(2),
    },
    SensorDescriptor {
        key: "soil_temperature_3",
        name: "Soil temperature 3",
        unit: SensorUnit::Measurement(Measurement::Temperature),
        required: MOISTURE,
        read: |c| c.moisture()?.soil_temperature(3),
    },
    SensorDescriptor {
        key: "soil_temperature_4",
        name: "Soil temperature 4",
        unit: SensorUnit::Measurement(Measurement::Temperature),
        required: MOISTURE,
        read: |c| c.moisture()?.soil_temperature(4),
    },
    // Soil moisture is reported in centibar, leaf wetness on a 0-15 scale.
    SensorDescriptor {
        key: "soil_moisture_1",
        name: "Soil moisture 1",
        unit: SensorUnit::Fixed {
            unit_of_measurement: Some("cb"),
            ndigits: Some(0),
        },
        required: MOISTURE,
        read: |c| c.moisture()?.soil_moisture(1),
    },
    SensorDescriptor {
        key: "soil_moisture_2",
        name: "Soil moisture 2",
        unit: SensorUnit::Fixed {
            unit_of_measurement: Some("cb"),
            ndigits: Some(0),
        },
        required: MOISTURE,
        read: |c| c.moisture()?.soil_moisture(2),
    },
    SensorDescriptor {
        key: "soil_moisture_3",
        name: "Soil moisture 3",
        unit: SensorUnit::Fixed {
            unit_of_measurement: Some("cb"),
            ndigits: Some(0),
        },
        required: MOISTURE,
        read: |c| c.moisture()?.soil_moisture(3),
    },
    SensorDescriptor {
        key: "soil_moisture_4",
        name: "Soil moisture 4",
        unit: SensorUnit::Fixed {
            unit_of_measurement: Some("cb"),
            ndigits: Some(0),
        },
        required: MOISTURE,
        read: |c| c.moisture()?.soil_moisture(4),
    },
    SensorDescriptor {
        key: "leaf_wetness_1",
        name: "Leaf wetness 1",
        unit: SensorUnit::Fixed {
            unit_of_measurement: None,
            ndigits: Some(1),
        },
        required: MOISTURE,
        read: |c| c.moisture()?.leaf_wetness(1),
    },
    SensorDescriptor {
        key: "leaf_wetness_2",
        name: "Leaf wetness 2",
        unit: SensorUnit::Fixed {
            unit_of_measurement: None,
            ndigits: Some(1),
        },
        required: MOISTURE,
        read: |c| c.moisture()?.leaf_wetness(2),
    },
];

/// Sensors whose condition records are all present in `conditions`.
pub fn available(conditions: &Conditions) -> impl Iterator<Item = &'static SensorDescriptor> + '_ {
    SENSORS
        .iter()
        .filter(move |sensor| sensor.is_available(conditions))
}

/// Look up a sensor by key.
pub fn by_key(key: &str) -> Option<&'static SensorDescriptor> {
    SENSORS.iter().find(|sensor| sensor.key == key)
}
