//! Condition records and the current-conditions snapshot.

mod air_quality;
mod condition;
mod iss;
mod lss;
mod moisture;

#[cfg(test)]
pub(crate) mod fixtures;

pub use air_quality::AirQualityCondition;
pub use condition::{Condition, ReceiverState};
pub use iss::{CollectorSize, IssCondition};
pub use lss::{LssBarCondition, LssTempHumCondition};
pub use moisture::MoistureCondition;

use crate::api::json::{self, JsonObject};
use crate::error::{Result, WeatherLinkError};
use chrono::{DateTime, Utc};
use log::warn;
use serde::{Serialize, Serializer};
use serde_json::Value;
use strum::{Display, EnumCount, EnumIter, FromRepr};

const STRUCTURE_TYPE_KEY: &str = "data_structure_type";

/// Discriminator of a raw condition record (`data_structure_type`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, EnumCount, FromRepr)]
#[repr(u8)]
pub enum ConditionType {
    Iss = 1,
    Moisture = 2,
    LssBar = 3,
    LssTempHum = 4,
    /// Sent by AirLink.
    AirQuality = 6,
}

impl ConditionType {
    fn slot(self) -> usize {
        match self {
            Self::Iss => 0,
            Self::Moisture => 1,
            Self::LssBar => 2,
            Self::LssTempHum => 3,
            Self::AirQuality => 4,
        }
    }

    pub fn from_code(code: i64) -> Result<Self> {
        u8::try_from(code)
            .ok()
            .and_then(Self::from_repr)
            .ok_or(WeatherLinkError::UnknownConditionType(code))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
pub enum DeviceType {
    WeatherLink,
    AirLink,
}

impl DeviceType {
    pub fn supports_real_time_api(self) -> bool {
        self != Self::AirLink
    }

    pub fn model_name(self) -> &'static str {
        match self {
            Self::WeatherLink => "WeatherLink Live",
            Self::AirLink => "AirLink",
        }
    }
}

/// One decoded condition record. Serialized with a `type` field naming the variant.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConditionRecord {
    Iss(IssCondition),
    Moisture(MoistureCondition),
    LssBar(LssBarCondition),
    LssTempHum(LssTempHumCondition),
    AirQuality(AirQualityCondition),
}

impl ConditionRecord {
    /// Decode a raw record, selecting the variant by its discriminator.
    pub fn from_json(mut data: JsonObject) -> Result<Self> {
        let code = data
            .remove(STRUCTURE_TYPE_KEY)
            .and_then(|value| value.as_i64())
            .ok_or_else(|| WeatherLinkError::decode(STRUCTURE_TYPE_KEY, "missing or not an integer"))?;

        match ConditionType::from_code(code)? {
            ConditionType::Iss => IssCondition::decode(data).map(Self::Iss),
            ConditionType::Moisture => MoistureCondition::decode(data).map(Self::Moisture),
            ConditionType::LssBar => LssBarCondition::decode(data).map(Self::LssBar),
            ConditionType::LssTempHum => LssTempHumCondition::decode(data).map(Self::LssTempHum),
            ConditionType::AirQuality => AirQualityCondition::decode(data).map(Self::AirQuality),
        }
    }

    pub fn condition_type(&self) -> ConditionType {
        match self {
            Self::Iss(_) => IssCondition::TYPE,
            Self::Moisture(_) => MoistureCondition::TYPE,
            Self::LssBar(_) => LssBarCondition::TYPE,
            Self::LssTempHum(_) => LssTempHumCondition::TYPE,
            Self::AirQuality(_) => AirQualityCondition::TYPE,
        }
    }

    pub fn lsid(&self) -> Option<u64> {
        match self {
            Self::Iss(c) => c.lsid(),
            Self::Moisture(c) => c.lsid(),
            Self::LssBar(c) => c.lsid(),
            Self::LssTempHum(c) => c.lsid(),
            Self::AirQuality(c) => c.lsid(),
        }
    }

    /// Field-level merge of a record of the same type. A record of a
    /// different type replaces `self`.
    pub fn update_from(&mut self, other: &ConditionRecord) {
        match (self, other) {
            (Self::Iss(a), Self::Iss(b)) => a.update_from(b),
            (Self::Moisture(a), Self::Moisture(b)) => a.update_from(b),
            (Self::LssBar(a), Self::LssBar(b)) => a.update_from(b),
            (Self::LssTempHum(a), Self::LssTempHum(b)) => a.update_from(b),
            (Self::AirQuality(a), Self::AirQuality(b)) => a.update_from(b),
            (this, other) => *this = other.clone(),
        }
    }
}

/// Access to one record type inside [`Conditions`], and wrapping it back
/// into a [`ConditionRecord`].
pub trait ConditionAccess: Condition {
    fn from_record(record: &ConditionRecord) -> Option<&Self>;
}

macro_rules! condition_access {
    ($($variant:ident => $ty:ty),+ $(,)?) => {
        $(
            impl ConditionAccess for $ty {
                fn from_record(record: &ConditionRecord) -> Option<&Self> {
                    match record {
                        ConditionRecord::$variant(c) => Some(c),
                        _ => None,
                    }
                }
            }

            impl From<$ty> for ConditionRecord {
                fn from(condition: $ty) -> Self {
                    ConditionRecord::$variant(condition)
                }
            }
        )+
    };
}

condition_access! {
    Iss => IssCondition,
    Moisture => MoistureCondition,
    LssBar => LssBarCondition,
    LssTempHum => LssTempHumCondition,
    AirQuality => AirQualityCondition,
}

/// Condition records keyed by type. Holds at most one record per type.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Conditions {
    slots: [Option<ConditionRecord>; ConditionType::COUNT],
}

impl Conditions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, condition_type: ConditionType) -> Option<&ConditionRecord> {
        self.slots[condition_type.slot()].as_ref()
    }

    pub fn get_as<T: ConditionAccess>(&self) -> Option<&T> {
        self.get(T::TYPE).and_then(T::from_record)
    }

    pub fn contains(&self, condition_type: ConditionType) -> bool {
        self.slots[condition_type.slot()].is_some()
    }

    pub fn contains_all(&self, condition_types: &[ConditionType]) -> bool {
        condition_types.iter().all(|ty| self.contains(*ty))
    }

    /// Store `record`, returning the record of the same type it replaced.
    pub fn insert(&mut self, record: ConditionRecord) -> Option<ConditionRecord> {
        self.slots[record.condition_type().slot()].replace(record)
    }

    /// Merge `record` into the stored record of the same type, or insert it
    /// whole if there is none yet.
    pub fn merge(&mut self, record: ConditionRecord) {
        match &mut self.slots[record.condition_type().slot()] {
            Some(existing) => existing.update_from(&record),
            slot @ None => *slot = Some(record),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &ConditionRecord> {
        self.slots.iter().flatten()
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }

    pub fn iss(&self) -> Option<&IssCondition> {
        self.get_as()
    }

    pub fn moisture(&self) -> Option<&MoistureCondition> {
        self.get_as()
    }

    pub fn lss_bar(&self) -> Option<&LssBarCondition> {
        self.get_as()
    }

    pub fn lss_temp_hum(&self) -> Option<&LssTempHumCondition> {
        self.get_as()
    }

    pub fn air_quality(&self) -> Option<&AirQualityCondition> {
        self.get_as()
    }
}

impl Serialize for Conditions {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}

/// How to react to a condition record that fails to decode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ParseMode {
    /// Log the record and skip it.
    #[default]
    Lenient,
    /// Abort the whole parse.
    Strict,
}

/// Current conditions reported by one hub.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CurrentConditions {
    /// Device serial number.
    pub did: String,
    /// Time the response was generated. Counts seconds since boot when the
    /// hub has not synchronised its clock.
    #[serde(with = "chrono::serde::ts_seconds")]
    pub ts: DateTime<Utc>,
    /// Only sent by AirLink.
    pub name: Option<String>,
    pub conditions: Conditions,
}

impl CurrentConditions {
    pub fn from_json(data: &Value, mode: ParseMode) -> Result<Self> {
        let data = data
            .as_object()
            .ok_or_else(|| WeatherLinkError::decode("CurrentConditions", "expected an object"))?;

        let did = data
            .get("did")
            .and_then(Value::as_str)
            .ok_or_else(|| WeatherLinkError::decode("CurrentConditions", "missing field `did`"))?
            .to_string();
        let ts = data
            .get("ts")
            .and_then(Value::as_i64)
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .ok_or_else(|| WeatherLinkError::decode("CurrentConditions", "missing or invalid field `ts`"))?;
        let name = data.get("name").and_then(Value::as_str).map(str::to_string);
        let raw_conditions = data
            .get("conditions")
            .and_then(Value::as_array)
            .ok_or_else(|| WeatherLinkError::decode("CurrentConditions", "missing field `conditions`"))?;

        let mut conditions = Conditions::new();
        for (index, raw) in flatten_conditions(raw_conditions).into_iter().enumerate() {
            let decoded = match raw {
                Ok(record) => {
                    let raw = Value::Object(record.clone());
                    ConditionRecord::from_json(record).map_err(|e| (raw, e))
                }
                Err(failure) => Err(failure),
            };

            match decoded {
                Ok(record) => {
                    conditions.insert(record);
                }
                Err((_, e)) if mode == ParseMode::Strict => return Err(e),
                Err((raw, e)) => {
                    warn!("Skipping condition record at index {}: {} ({})", index, e, raw);
                }
            }
        }

        Ok(Self {
            did,
            ts,
            name,
            conditions,
        })
    }

    pub fn device_type(&self) -> DeviceType {
        match self.name {
            Some(_) => DeviceType::AirLink,
            None => DeviceType::WeatherLink,
        }
    }

    pub fn device_name(&self) -> String {
        match self.name.as_deref() {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => format!("{} {}", self.device_type(), self.did),
        }
    }

    /// Merge a partial update into this snapshot.
    ///
    /// Records are merged field by field and records of a type not seen
    /// before are added. The timestamp advances to the newer of the two.
    pub fn update_from(&mut self, other: CurrentConditions) {
        for record in other.conditions.slots.into_iter().flatten() {
            self.conditions.merge(record);
        }
        if other.ts > self.ts {
            self.ts = other.ts;
        }
    }
}

type RawCondition = std::result::Result<JsonObject, (Value, WeatherLinkError)>;

/// Group raw records by discriminator, merging duplicates so that the first
/// non-null value of each field wins. Records that cannot be grouped are
/// returned as failures in their original position.
fn flatten_conditions(raw_conditions: &[Value]) -> Vec<RawCondition> {
    let mut flattened: Vec<(Option<i64>, RawCondition)> = Vec::with_capacity(raw_conditions.len());

    for raw in raw_conditions {
        let Some(record) = raw.as_object() else {
            let error = WeatherLinkError::decode("condition", "expected an object");
            flattened.push((None, Err((raw.clone(), error))));
            continue;
        };
        let Some(code) = record.get(STRUCTURE_TYPE_KEY).and_then(Value::as_i64) else {
            let error = WeatherLinkError::decode(STRUCTURE_TYPE_KEY, "missing or not an integer");
            flattened.push((None, Err((raw.clone(), error))));
            continue;
        };

        let existing = flattened.iter_mut().find_map(|(existing_code, existing)| match existing {
            Ok(existing) if *existing_code == Some(code) => Some(existing),
            _ => None,
        });
        match existing {
            Some(existing) => json::update_where_none(existing, record),
            None => flattened.push((Some(code), Ok(record.clone()))),
        }
    }

    flattened.into_iter().map(|(_, raw)| raw).collect()
}
