use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::characteristic::{Characteristic, CharacteristicId};
use super::types::{CharacteristicType, ServiceType};

/// A service and its characteristics, in the order the accessory declared them
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Service {
    pub iid: u64,
    #[serde(rename = "type")]
    pub service_type: ServiceType,
    #[serde(default)]
    pub primary: bool,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub linked: Vec<u64>,
    #[serde(default)]
    pub characteristics: Vec<Characteristic>,
}

impl Service {
    #[must_use]
    pub fn find_characteristic(&self, characteristic_type: &CharacteristicType) -> Option<&Characteristic> {
        self.characteristics
            .iter()
            .find(|c| &c.characteristic_type == characteristic_type)
    }
}

/// One accessory behind the connection (bridges expose several)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Accessory {
    pub aid: u64,
    #[serde(default)]
    pub services: Vec<Service>,
}

impl Accessory {
    fn info_string(&self, characteristic_type: &CharacteristicType) -> Option<&str> {
        self.find_characteristic_by_type(&ServiceType::ACCESSORY_INFORMATION, characteristic_type)?
            .value
            .as_ref()?
            .as_str()
    }

    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.info_string(&CharacteristicType::NAME)
    }

    #[must_use]
    pub fn model(&self) -> Option<&str> {
        self.info_string(&CharacteristicType::MODEL)
    }

    #[must_use]
    pub fn manufacturer(&self) -> Option<&str> {
        self.info_string(&CharacteristicType::MANUFACTURER)
    }

    #[must_use]
    pub fn serial_number(&self) -> Option<&str> {
        self.info_string(&CharacteristicType::SERIAL_NUMBER)
    }

    #[must_use]
    pub fn firmware_revision(&self) -> Option<&str> {
        self.info_string(&CharacteristicType::FIRMWARE_REVISION)
    }

    #[must_use]
    pub fn version(&self) -> Option<&str> {
        self.info_string(&CharacteristicType::VERSION)
    }

    /// First characteristic of the given type inside the first service of the given type
    #[must_use]
    pub fn find_characteristic_by_type(
        &self,
        service_type: &ServiceType,
        characteristic_type: &CharacteristicType,
    ) -> Option<&Characteristic> {
        self.services
            .iter()
            .find(|s| &s.service_type == service_type)?
            .find_characteristic(characteristic_type)
    }

    #[must_use]
    pub fn find_characteristic(&self, iid: u64) -> Option<&Characteristic> {
        self.services
            .iter()
            .flat_map(|s| &s.characteristics)
            .find(|c| c.iid == iid)
    }

    fn find_characteristic_mut(&mut self, iid: u64) -> Option<&mut Characteristic> {
        self.services
            .iter_mut()
            .flat_map(|s| &mut s.characteristics)
            .find(|c| c.iid == iid)
    }

    fn characteristics(&self) -> impl Iterator<Item = &Characteristic> {
        self.services.iter().flat_map(|s| &s.characteristics)
    }
}

/// Everything `GET /accessories` reported
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceReportedInfo {
    pub accessories: Vec<Accessory>,
}

impl DeviceReportedInfo {
    /// Decode a `GET /accessories` body
    ///
    /// # Errors
    ///
    /// Returns the JSON error if the body is not an accessory database.
    pub fn from_json(body: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(body)
    }

    #[must_use]
    pub fn find_accessory(&self, aid: u64) -> Option<&Accessory> {
        self.accessories.iter().find(|a| a.aid == aid)
    }

    #[must_use]
    pub fn find_characteristic(&self, id: CharacteristicId) -> Option<&Characteristic> {
        self.find_accessory(id.aid)?.find_characteristic(id.iid)
    }

    /// Store a new value; returns whether the characteristic exists
    pub fn set_value(&mut self, id: CharacteristicId, value: Value) -> bool {
        let characteristic = self
            .accessories
            .iter_mut()
            .find(|a| a.aid == id.aid)
            .and_then(|a| a.find_characteristic_mut(id.iid));
        match characteristic {
            Some(c) => {
                c.value = Some(value);
                true
            }
            None => false,
        }
    }

    /// Readable characteristics in declared order
    #[must_use]
    pub fn readable_ids(&self) -> Vec<CharacteristicId> {
        self.ids_where(Characteristic::is_readable)
    }

    /// Characteristics supporting event notifications, in declared order
    #[must_use]
    pub fn event_ids(&self) -> Vec<CharacteristicId> {
        self.ids_where(Characteristic::supports_events)
    }

    fn ids_where(&self, predicate: impl Fn(&Characteristic) -> bool) -> Vec<CharacteristicId> {
        self.accessories
            .iter()
            .flat_map(|a| {
                a.characteristics()
                    .filter(|c| predicate(c))
                    .map(move |c| CharacteristicId::new(a.aid, c.iid))
            })
            .collect()
    }
}
