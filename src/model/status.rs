use std::fmt;

/// Per-characteristic status reported in multi-status responses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum HapStatus {
    Success = 0,
    InsufficientPrivileges = -70401,
    ServiceCommunicationFailure = -70402,
    ResourceBusy = -70403,
    /// Write to a read-only characteristic
    ReadOnlyCharacteristic = -70404,
    /// Read from a write-only characteristic
    WriteOnlyCharacteristic = -70405,
    NotificationNotSupported = -70406,
    OutOfResource = -70407,
    OperationTimedOut = -70408,
    ResourceDoesNotExist = -70409,
    InvalidValueInRequest = -70410,
    InsufficientAuthorization = -70411,
    NotAllowedInCurrentState = -70412,
}

impl HapStatus {
    /// Map a wire code to a known status
    #[must_use]
    pub fn from_code(code: i32) -> Option<Self> {
        Some(match code {
            0 => Self::Success,
            -70401 => Self::InsufficientPrivileges,
            -70402 => Self::ServiceCommunicationFailure,
            -70403 => Self::ResourceBusy,
            -70404 => Self::ReadOnlyCharacteristic,
            -70405 => Self::WriteOnlyCharacteristic,
            -70406 => Self::NotificationNotSupported,
            -70407 => Self::OutOfResource,
            -70408 => Self::OperationTimedOut,
            -70409 => Self::ResourceDoesNotExist,
            -70410 => Self::InvalidValueInRequest,
            -70411 => Self::InsufficientAuthorization,
            -70412 => Self::NotAllowedInCurrentState,
            _ => return None,
        })
    }

    #[must_use]
    pub fn code(self) -> i32 {
        self as i32
    }

    #[must_use]
    pub fn is_success(self) -> bool {
        self == Self::Success
    }
}

impl fmt::Display for HapStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?} ({})", self.code())
    }
}
