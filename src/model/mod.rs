//! Accessory database as reported by `GET /accessories`, plus the characteristic
//! read/write payloads exchanged on `/characteristics`

mod accessory;
mod characteristic;
mod status;
mod types;


pub use accessory::{Accessory, DeviceReportedInfo, Service};
pub use characteristic::{
    Characteristic, CharacteristicId, CharacteristicValue, CharacteristicWrite,
    CharacteristicsPayload, Format, Permission,
};
pub use status::HapStatus;
pub use types::{CharacteristicType, ServiceType};
