//! Error types for the tuner plugin wire layouts.

use thiserror::Error;

/// Errors raised while building or reading a fixed-layout command record.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// DiSEqC message does not fit into the command record.
    #[error("DiSEqC command too long: {len} bytes (max: {max})")]
    OversizedCommand { len: usize, max: usize },

    /// Buffer is shorter than the fixed record size.
    #[error("Incomplete record: expected {expected} bytes, got {actual}")]
    IncompleteRecord { expected: usize, actual: usize },

    /// A numeric field holds a value outside its enumeration.
    #[error("Invalid {field} value: {value}")]
    InvalidValue { field: &'static str, value: i32 },
}

/// Status codes reported back by the device driver.
///
/// The driver returns an HRESULT-like code; zero means the command was accepted
/// and anything else is a rejection whose exact value is only logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceStatus(pub i32);

impl DeviceStatus {
    /// Command accepted.
    pub const OK: DeviceStatus = DeviceStatus(0);

    /// Returns true if the driver accepted the command.
    pub fn is_success(self) -> bool {
        self.0 == 0
    }
}

impl From<i32> for DeviceStatus {
    fn from(value: i32) -> Self {
        DeviceStatus(value)
    }
}

impl std::fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{:08x}", self.0 as u32)
    }
}
