//! HAP service and characteristic type identifiers
//!
//! Apple-defined types live on the base UUID `-0000-1000-8000-0026BB765291` and are
//! kept in short form (`"25"`); anything else keeps its full upper-case UUID.

use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

const APPLE_BASE_SUFFIX: &str = "-0000-1000-8000-0026BB765291";

fn normalize(raw: &str) -> String {
    let upper = raw.trim().to_ascii_uppercase();
    match upper.strip_suffix(APPLE_BASE_SUFFIX) {
        Some(prefix) if prefix.len() == 8 && prefix.bytes().all(|b| b.is_ascii_hexdigit()) => {
            let short = prefix.trim_start_matches('0');
            if short.is_empty() { "0" } else { short }.to_string()
        }
        _ => upper,
    }
}

macro_rules! hap_type {
    ($(#[$doc:meta])* $name:ident { $($(#[$cdoc:meta])* $constant:ident = $code:literal,)* }) => {
        $(#[$doc])*
        #[derive(Clone, PartialEq, Eq, Hash)]
        pub struct $name(Cow<'static, str>);

        impl $name {
            $($(#[$cdoc])* pub const $constant: Self = Self(Cow::Borrowed($code));)*

            /// Parse a short or full UUID
            #[must_use]
            pub fn new(raw: &str) -> Self {
                Self(Cow::Owned(normalize(raw)))
            }

            /// Short form for Apple types, full UUID otherwise
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.0)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let raw = String::deserialize(deserializer)?;
                Ok(Self::new(&raw))
            }
        }
    };
}

hap_type!(
    /// Service type
    ServiceType {
        ACCESSORY_INFORMATION = "3E",
        PROTOCOL_INFORMATION = "A2",
        FAN = "40",
        GARAGE_DOOR_OPENER = "41",
        LIGHTBULB = "43",
        LOCK_MECHANISM = "45",
        OUTLET = "47",
        SWITCH = "49",
        THERMOSTAT = "4A",
        AIR_QUALITY_SENSOR = "8D",
        CONTACT_SENSOR = "80",
        HUMIDITY_SENSOR = "82",
        LEAK_SENSOR = "83",
        LIGHT_SENSOR = "84",
        MOTION_SENSOR = "85",
        OCCUPANCY_SENSOR = "86",
        SMOKE_SENSOR = "87",
        TEMPERATURE_SENSOR = "8A",
        BATTERY = "96",
    }
);

hap_type!(
    /// Characteristic type
    CharacteristicType {
        /// Write-only trigger that makes the accessory identify itself
        IDENTIFY = "14",
        MANUFACTURER = "20",
        MODEL = "21",
        NAME = "23",
        SERIAL_NUMBER = "30",
        VERSION = "37",
        FIRMWARE_REVISION = "52",
        HARDWARE_REVISION = "53",
        ON = "25",
        BRIGHTNESS = "8",
        HUE = "13",
        SATURATION = "2F",
        CURRENT_TEMPERATURE = "11",
        TARGET_TEMPERATURE = "35",
        CURRENT_RELATIVE_HUMIDITY = "10",
        MOTION_DETECTED = "22",
        CONTACT_SENSOR_STATE = "6A",
        BATTERY_LEVEL = "68",
        STATUS_LOW_BATTERY = "79",
        STATUS_ACTIVE = "75",
    }
);
