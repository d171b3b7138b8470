use super::ConditionType;
use super::condition::{Condition, ReceiverState, update_fields};
use crate::api::json::{self, JsonObject};
use crate::error::Result;
use serde::{Deserialize, Serialize};

/// Soil and leaf station. Probe slots that are not connected stay `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MoistureCondition {
    pub lsid: Option<u64>,
    pub txid: Option<u8>,
    #[serde(deserialize_with = "ReceiverState::deserialize_code")]
    pub rx_state: Option<ReceiverState>,

    /// Soil temperature slots in °C.
    pub temp_1: Option<f64>,
    pub temp_2: Option<f64>,
    pub temp_3: Option<f64>,
    pub temp_4: Option<f64>,

    /// Soil moisture slots in |cb|.
    pub moist_soil_1: Option<f64>,
    pub moist_soil_2: Option<f64>,
    pub moist_soil_3: Option<f64>,
    pub moist_soil_4: Option<f64>,

    pub wet_leaf_1: Option<f64>,
    pub wet_leaf_2: Option<f64>,

    pub trans_battery_flag: Option<u8>,
}

impl MoistureCondition {
    pub fn soil_temperature(&self, slot: usize) -> Option<f64> {
        match slot {
            1 => self.temp_1,
            2 => self.temp_2,
            3 => self.temp_3,
            4 => self.temp_4,
            _ => None,
        }
    }

    pub fn soil_moisture(&self, slot: usize) -> Option<f64> {
        match slot {
            1 => self.moist_soil_1,
            2 => self.moist_soil_2,
            3 => self.moist_soil_3,
            4 => self.moist_soil_4,
            _ => None,
        }
    }

    pub fn leaf_wetness(&self, slot: usize) -> Option<f64> {
        match slot {
            1 => self.wet_leaf_1,
            2 => self.wet_leaf_2,
            _ => None,
        }
    }
}

impl Condition for MoistureCondition {
    const TYPE: ConditionType = ConditionType::Moisture;

    fn decode(mut data: JsonObject) -> Result<Self> {
        json::require_keys(&data, "MoistureCondition", &["txid"])?;
        json::keys_to_celsius(&mut data, &["temp_1", "temp_2", "temp_3", "temp_4"])?;
        json::decode_record(data, "MoistureCondition")
    }

    fn update_from(&mut self, other: &Self) {
        update_fields!(self, other;
            lsid, txid, rx_state,
            temp_1, temp_2, temp_3, temp_4,
            moist_soil_1, moist_soil_2, moist_soil_3, moist_soil_4,
            wet_leaf_1, wet_leaf_2,
            trans_battery_flag,
        );
    }

    fn lsid(&self) -> Option<u64> {
        self.lsid
    }
}
