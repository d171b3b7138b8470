//! Display units for the physical quantities reported by the hub.
//!
//! Decoded condition records always hold canonical metric values (°C, hPa,
//! km/h, µg/m³, mm/h, mm). Conversion into the user's preferred unit and
//! rounding to the configured precision happen at read time through a
//! [`UnitConfig`].

use crate::error::{Result, WeatherLinkError};
use log::warn;
use serde::Deserialize;
use serde_json::{Map, Value};
use strum::{Display, EnumIter, EnumString, IntoEnumIterator};

/// Transform applied to a canonical value before rounding.
#[derive(Debug, Clone, Copy)]
pub enum Factor {
    /// Multiply by a constant.
    Scale(f64),
    /// Arbitrary mapping, e.g. an affine temperature conversion.
    Map(fn(f64) -> f64),
}

/// Static description of one selectable unit.
#[derive(Debug)]
pub struct UnitInfo {
    /// Persisted key, e.g. `"CELSIUS"`.
    pub key: &'static str,
    /// Label shown next to the value, e.g. `"°C"`.
    pub unit_of_measurement: &'static str,
    pub default_ndigits: Option<i32>,
    pub factor: Option<Factor>,
}

impl UnitInfo {
    /// Convert a canonical value into this unit without rounding.
    pub fn convert(&self, value: f64) -> f64 {
        match self.factor {
            None => value,
            Some(Factor::Scale(factor)) => value * factor,
            Some(Factor::Map(map)) => map(value),
        }
    }
}

fn celsius_to_fahrenheit(c: f64) -> f64 {
    (c * 9.0 / 5.0) + 32.0
}

fn celsius_to_kelvin(c: f64) -> f64 {
    c + 273.15
}

// The first entry of every table is the quantity's default unit.

static TEMPERATURE_UNITS: [UnitInfo; 3] = [
    UnitInfo {
        key: "CELSIUS",
        unit_of_measurement: "°C",
        default_ndigits: Some(1),
        factor: None,
    },
    UnitInfo {
        key: "FAHRENHEIT",
        unit_of_measurement: "°F",
        default_ndigits: Some(0),
        factor: Some(Factor::Map(celsius_to_fahrenheit)),
    },
    UnitInfo {
        key: "KELVIN",
        unit_of_measurement: "K",
        default_ndigits: Some(1),
        factor: Some(Factor::Map(celsius_to_kelvin)),
    },
];

static PRESSURE_UNITS: [UnitInfo; 4] = [
    UnitInfo {
        key: "HPA",
        unit_of_measurement: "hPa",
        default_ndigits: Some(0),
        factor: None,
    },
    UnitInfo {
        key: "PSI",
        unit_of_measurement: "psi",
        default_ndigits: Some(2),
        factor: Some(Factor::Scale(0.0145)),
    },
    UnitInfo {
        key: "IN_HG",
        unit_of_measurement: "inHg",
        default_ndigits: Some(2),
        factor: Some(Factor::Scale(0.0295)),
    },
    UnitInfo {
        key: "MM_HG",
        unit_of_measurement: "mmHg",
        default_ndigits: Some(0),
        factor: Some(Factor::Scale(0.75)),
    },
];

static WIND_SPEED_UNITS: [UnitInfo; 5] = [
    UnitInfo {
        key: "KMH",
        unit_of_measurement: "km/h",
        default_ndigits: Some(1),
        factor: None,
    },
    UnitInfo {
        key: "MPS",
        unit_of_measurement: "m/s",
        default_ndigits: Some(1),
        factor: Some(Factor::Scale(1.0 / 3.6)),
    },
    UnitInfo {
        key: "MPH",
        unit_of_measurement: "mph",
        default_ndigits: Some(1),
        factor: Some(Factor::Scale(0.621)),
    },
    UnitInfo {
        key: "KNOTS",
        unit_of_measurement: "kn",
        default_ndigits: Some(1),
        factor: Some(Factor::Scale(1.0 / 1.852)),
    },
    UnitInfo {
        key: "FTPS",
        unit_of_measurement: "ft/s",
        default_ndigits: Some(1),
        factor: Some(Factor::Scale(0.911)),
    },
];

static PM_UNITS: [UnitInfo; 1] = [UnitInfo {
    key: "UG_PER_M3",
    unit_of_measurement: "µg/m³",
    default_ndigits: Some(2),
    factor: None,
}];

static RAIN_RATE_UNITS: [UnitInfo; 2] = [
    UnitInfo {
        key: "MMH",
        unit_of_measurement: "mm/h",
        default_ndigits: Some(1),
        factor: None,
    },
    UnitInfo {
        key: "INH",
        unit_of_measurement: "in/h",
        default_ndigits: Some(2),
        factor: Some(Factor::Scale(1.0 / 25.4)),
    },
];

static RAINFALL_UNITS: [UnitInfo; 2] = [
    UnitInfo {
        key: "MM",
        unit_of_measurement: "mm",
        default_ndigits: Some(1),
        factor: None,
    },
    UnitInfo {
        key: "IN",
        unit_of_measurement: "in",
        default_ndigits: Some(2),
        factor: Some(Factor::Scale(1.0 / 25.4)),
    },
];

/// A convertible physical quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
pub enum Measurement {
    Temperature,
    Pressure,
    WindSpeed,
    Pm,
    RainRate,
    Rainfall,
}

impl Measurement {
    /// Key under which the quantity's unit is persisted.
    pub fn config_key(self) -> &'static str {
        match self {
            Measurement::Temperature => "temperature",
            Measurement::Pressure => "pressure",
            Measurement::WindSpeed => "wind_speed",
            Measurement::Pm => "pm",
            Measurement::RainRate => "rain_rate",
            Measurement::Rainfall => "rainfall",
        }
    }

    pub fn units(self) -> &'static [UnitInfo] {
        match self {
            Measurement::Temperature => &TEMPERATURE_UNITS,
            Measurement::Pressure => &PRESSURE_UNITS,
            Measurement::WindSpeed => &WIND_SPEED_UNITS,
            Measurement::Pm => &PM_UNITS,
            Measurement::RainRate => &RAIN_RATE_UNITS,
            Measurement::Rainfall => &RAINFALL_UNITS,
        }
    }

    pub fn default_unit(self) -> &'static UnitInfo {
        &self.units()[0]
    }

    /// Look up a unit by its persisted key.
    pub fn unit_by_key(self, key: &str) -> Result<&'static UnitInfo> {
        self.units()
            .iter()
            .find(|unit| unit.key == key)
            .ok_or_else(|| self.unknown_unit(key))
    }

    /// Look up a unit by its display label.
    pub fn unit_by_symbol(self, symbol: &str) -> Result<&'static UnitInfo> {
        self.units()
            .iter()
            .find(|unit| unit.unit_of_measurement == symbol)
            .ok_or_else(|| self.unknown_unit(symbol))
    }

    fn unknown_unit(self, key: &str) -> WeatherLinkError {
        WeatherLinkError::UnknownUnit {
            measurement: self.to_string(),
            key: key.to_string(),
        }
    }
}

/// Round `value` to `ndigits` decimal digits. `None` leaves it untouched.
pub fn round_to(value: f64, ndigits: Option<i32>) -> f64 {
    match ndigits {
        None => value,
        Some(ndigits) => {
            let scale = 10f64.powi(ndigits);
            (value * scale).round() / scale
        }
    }
}

/// A selected unit together with its display precision.
#[derive(Debug, Clone, Copy)]
pub struct Unit {
    info: &'static UnitInfo,
    ndigits: Option<i32>,
}

impl Unit {
    pub fn new(info: &'static UnitInfo, ndigits: Option<i32>) -> Self {
        Self { info, ndigits }
    }

    /// Use the unit with its default precision.
    pub fn from_unit_info(info: &'static UnitInfo) -> Self {
        Self::new(info, info.default_ndigits)
    }

    pub fn info(&self) -> &'static UnitInfo {
        self.info
    }

    pub fn ndigits(&self) -> Option<i32> {
        self.ndigits
    }

    pub fn unit_of_measurement(&self) -> &'static str {
        self.info.unit_of_measurement
    }

    /// Convert a canonical value and round it to the configured precision.
    pub fn convert(&self, value: f64) -> f64 {
        round_to(self.info.convert(value), self.ndigits)
    }

    pub fn convert_optional(&self, value: Option<f64>) -> Option<f64> {
        value.map(|v| self.convert(v))
    }
}

impl PartialEq for Unit {
    fn eq(&self, other: &Self) -> bool {
        self.info.key == other.info.key
            && self.info.unit_of_measurement == other.info.unit_of_measurement
            && self.ndigits == other.ndigits
    }
}

/// Which unit family to fall back to when nothing is persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum UnitSystemPreference {
    #[default]
    Metric,
    Imperial,
}

#[derive(Debug, Deserialize)]
struct PersistedUnit {
    key: String,
    #[serde(default)]
    ndigits: Option<i32>,
}

/// One chosen unit per measurement.
#[derive(Debug, Clone, PartialEq)]
pub struct UnitConfig {
    pub temperature: Unit,
    pub pressure: Unit,
    pub wind_speed: Unit,
    pub pm: Unit,
    pub rain_rate: Unit,
    pub rainfall: Unit,
}

impl UnitConfig {
    pub fn default_metric() -> Self {
        Self {
            temperature: Unit::from_unit_info(Measurement::Temperature.default_unit()),
            pressure: Unit::from_unit_info(Measurement::Pressure.default_unit()),
            wind_speed: Unit::from_unit_info(Measurement::WindSpeed.default_unit()),
            pm: Unit::from_unit_info(Measurement::Pm.default_unit()),
            rain_rate: Unit::from_unit_info(Measurement::RainRate.default_unit()),
            rainfall: Unit::from_unit_info(Measurement::Rainfall.default_unit()),
        }
    }

    pub fn default_imperial() -> Self {
        Self {
            temperature: Unit::from_unit_info(&TEMPERATURE_UNITS[1]),
            pressure: Unit::from_unit_info(&PRESSURE_UNITS[1]),
            wind_speed: Unit::from_unit_info(&WIND_SPEED_UNITS[2]),
            pm: Unit::from_unit_info(&PM_UNITS[0]),
            rain_rate: Unit::from_unit_info(&RAIN_RATE_UNITS[1]),
            rainfall: Unit::from_unit_info(&RAINFALL_UNITS[1]),
        }
    }

    pub fn default_for(preference: UnitSystemPreference) -> Self {
        match preference {
            UnitSystemPreference::Metric => Self::default_metric(),
            UnitSystemPreference::Imperial => Self::default_imperial(),
        }
    }

    pub fn by_measurement(&self, measurement: Measurement) -> &Unit {
        match measurement {
            Measurement::Temperature => &self.temperature,
            Measurement::Pressure => &self.pressure,
            Measurement::WindSpeed => &self.wind_speed,
            Measurement::Pm => &self.pm,
            Measurement::RainRate => &self.rain_rate,
            Measurement::Rainfall => &self.rainfall,
        }
    }

    fn by_measurement_mut(&mut self, measurement: Measurement) -> &mut Unit {
        match measurement {
            Measurement::Temperature => &mut self.temperature,
            Measurement::Pressure => &mut self.pressure,
            Measurement::WindSpeed => &mut self.wind_speed,
            Measurement::Pm => &mut self.pm,
            Measurement::RainRate => &mut self.rain_rate,
            Measurement::Rainfall => &mut self.rainfall,
        }
    }

    /// Serialize into the persisted layout:
    /// `{"temperature": {"key": "CELSIUS", "ndigits": 1}, ...}`.
    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        for measurement in Measurement::iter() {
            let unit = self.by_measurement(measurement);
            map.insert(
                measurement.config_key().to_string(),
                serde_json::json!({ "key": unit.info().key, "ndigits": unit.ndigits() }),
            );
        }
        Value::Object(map)
    }

    /// Load from the persisted layout.
    ///
    /// Missing or unrecognised entries fall back to that measurement's
    /// default unit; the remaining entries are still honoured.
    pub fn from_value(value: &Value) -> Self {
        let mut config = Self::default_metric();
        for measurement in Measurement::iter() {
            let entry = value.get(measurement.config_key());
            *config.by_measurement_mut(measurement) = unit_from_entry(measurement, entry);
        }
        config
    }

    /// Load persisted units if there are any, otherwise use the defaults of
    /// the given unit system.
    pub fn load(value: Option<&Value>, preference: UnitSystemPreference) -> Self {
        match value {
            Some(value @ Value::Object(_)) => Self::from_value(value),
            Some(other) => {
                warn!(
                    "ignoring persisted unit config that is not an object: {}",
                    other
                );
                Self::default_for(preference)
            }
            None => Self::default_for(preference),
        }
    }
}

impl Default for UnitConfig {
    fn default() -> Self {
        Self::default_metric()
    }
}

fn unit_from_entry(measurement: Measurement, entry: Option<&Value>) -> Unit {
    let default = Unit::from_unit_info(measurement.default_unit());
    let Some(entry) = entry else {
        warn!(
            "no {} unit configured, using {}",
            measurement,
            default.unit_of_measurement()
        );
        return default;
    };

    let parsed = serde_json::from_value::<PersistedUnit>(entry.clone())
        .map_err(WeatherLinkError::from)
        .and_then(|persisted| {
            let info = measurement.unit_by_key(&persisted.key)?;
            Ok(Unit::new(info, persisted.ndigits))
        });

    match parsed {
        Ok(unit) => unit,
        Err(e) => {
            warn!(
                "invalid {} unit config {}: {}, using {}",
                measurement,
                entry,
                e,
                default.unit_of_measurement()
            );
            default
        }
    }
}
