use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::types::CharacteristicType;

/// Value format of a characteristic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    Bool,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Int,
    Float,
    String,
    Tlv8,
    Data,
    #[serde(other)]
    Unknown,
}

/// Characteristic permission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Permission {
    /// Paired read
    #[serde(rename = "pr")]
    PairedRead,
    /// Paired write
    #[serde(rename = "pw")]
    PairedWrite,
    /// Event notifications
    #[serde(rename = "ev")]
    Events,
    /// Additional authorization
    #[serde(rename = "aa")]
    AdditionalAuthorization,
    /// Timed write
    #[serde(rename = "tw")]
    TimedWrite,
    /// Hidden from the user
    #[serde(rename = "hd")]
    Hidden,
    /// Write response
    #[serde(rename = "wr")]
    WriteResponse,
    #[serde(other)]
    Unknown,
}

/// One characteristic of a service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Characteristic {
    pub iid: u64,
    #[serde(rename = "type")]
    pub characteristic_type: CharacteristicType,
    pub format: Format,
    /// Current value; absent for write-only characteristics
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default)]
    pub perms: Vec<Permission>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_step: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_len: Option<u64>,
    #[serde(
        default,
        rename = "valid-values",
        skip_serializing_if = "Option::is_none"
    )]
    pub valid_values: Option<Vec<i64>>,
}

impl Characteristic {
    #[must_use]
    pub fn has_permission(&self, permission: Permission) -> bool {
        self.perms.contains(&permission)
    }

    #[must_use]
    pub fn is_readable(&self) -> bool {
        self.has_permission(Permission::PairedRead)
    }

    #[must_use]
    pub fn is_writable(&self) -> bool {
        self.has_permission(Permission::PairedWrite)
    }

    #[must_use]
    pub fn supports_events(&self) -> bool {
        self.has_permission(Permission::Events)
    }
}

/// Address of a characteristic: accessory id and instance id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CharacteristicId {
    pub aid: u64,
    pub iid: u64,
}

impl CharacteristicId {
    #[must_use]
    pub fn new(aid: u64, iid: u64) -> Self {
        Self { aid, iid }
    }
}

impl fmt::Display for CharacteristicId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.aid, self.iid)
    }
}

impl FromStr for CharacteristicId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (aid, iid) = s
            .split_once('.')
            .ok_or_else(|| format!("expected aid.iid, got {s:?}"))?;
        Ok(Self {
            aid: aid.parse().map_err(|_| format!("invalid aid in {s:?}"))?,
            iid: iid.parse().map_err(|_| format!("invalid iid in {s:?}"))?,
        })
    }
}

/// A value or status reported for one characteristic
///
/// Used by read responses, multi-status write responses and event pushes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacteristicValue {
    pub aid: u64,
    pub iid: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    /// HAP status code; absent means success
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<i32>,
}

impl CharacteristicValue {
    #[must_use]
    pub fn id(&self) -> CharacteristicId {
        CharacteristicId::new(self.aid, self.iid)
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_none_or(|s| s == 0)
    }
}

/// One entry of a `PUT /characteristics` body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacteristicWrite {
    pub aid: u64,
    pub iid: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    /// Enable or disable event notifications
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ev: Option<bool>,
}

impl CharacteristicWrite {
    #[must_use]
    pub fn value(id: CharacteristicId, value: Value) -> Self {
        Self {
            aid: id.aid,
            iid: id.iid,
            value: Some(value),
            ev: None,
        }
    }

    #[must_use]
    pub fn events(id: CharacteristicId, enable: bool) -> Self {
        Self {
            aid: id.aid,
            iid: id.iid,
            value: None,
            ev: Some(enable),
        }
    }

    #[must_use]
    pub fn id(&self) -> CharacteristicId {
        CharacteristicId::new(self.aid, self.iid)
    }
}

/// `{"characteristics": [...]}` envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacteristicsPayload<T> {
    pub characteristics: Vec<T>,
}

impl<T> CharacteristicsPayload<T> {
    #[must_use]
    pub fn new(characteristics: Vec<T>) -> Self {
        Self { characteristics }
    }
}
