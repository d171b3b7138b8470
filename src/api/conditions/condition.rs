use super::ConditionType;
use crate::api::json::JsonObject;
use crate::error::Result;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use strum::{Display, FromRepr};

/// Radio receiver state of a wireless transmitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display, FromRepr)]
#[repr(u8)]
pub enum ReceiverState {
    /// Transmitter has been acquired and is actively being received.
    Tracking = 0,
    /// Transmitter has been acquired, but 1-14 packets in a row were missed.
    Synched = 1,
    /// Transmitter not acquired yet, or lost after 15 or more missed packets.
    Scanning = 2,
}

impl ReceiverState {
    pub(crate) fn deserialize_code<'de, D>(deserializer: D) -> std::result::Result<Option<Self>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<u8>::deserialize(deserializer)?
            .map(|code| {
                Self::from_repr(code)
                    .ok_or_else(|| D::Error::custom(format!("unknown receiver state code {code}")))
            })
            .transpose()
    }
}

/// Behaviour shared by the five condition record types.
pub trait Condition: Sized {
    const TYPE: ConditionType;

    /// Decode a raw record whose discriminator has already been removed.
    ///
    /// Errors are returned as-is; the snapshot parser decides whether a
    /// failed record aborts the parse or is skipped.
    fn decode(data: JsonObject) -> Result<Self>;

    /// Overwrite every field of `self` for which `other` holds a value.
    fn update_from(&mut self, other: &Self);

    fn lsid(&self) -> Option<u64>;
}

/// Copies the listed fields from `$src` into `$dst` when they are set.
macro_rules! update_fields {
    ($dst:expr, $src:expr; $($field:ident),+ $(,)?) => {
        $(
            if $src.$field.is_some() {
                $dst.$field = $src.$field.clone();
            }
        )+
    };
}

pub(crate) use update_fields;
