//! Device capability contracts and the devices implementing them.
//!
//! A device composes only the capabilities it has: the Genpix tuner is a
//! [`CustomTuner`] and [`DiseqcController`], the MD plugin a
//! [`ConditionalAccessProvider`]. Hardware access goes through the narrow
//! [`CommandTransport`] and [`DecodeFilter`] sinks.

pub mod card_config;
mod genpix;
mod md_plugin;

use log::warn;
use thiserror::Error;
use tvcard_protocol::{
    CaPmtCommand, CaPmtListManagementAction, ChannelDescriptor, DeviceStatus, ProtocolError,
    ServiceChannel, Tone22k, ToneBurst,
};

use crate::ca::{SlotError, StoreError};
use crate::ts_analyzer::{CatTable, PmtTable};

pub use genpix::{GenpixDevice, SignalStatus};
pub use md_plugin::MdPluginDevice;

/// Size of the instance buffer passed with every property request.
pub const INSTANCE_SIZE: usize = 32;

/// Property IDs of the Genpix BDA extension property set.
pub mod property {
    pub const TUNE: u32 = 0;
    pub const DISEQC: u32 = 1;
    pub const SIGNAL_STATUS: u32 = 2;
}

/// Errors reported by devices.
#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("Device not initialised or interface not open")]
    NotInitialised,

    #[error("Interface is already open")]
    AlreadyOpen,

    #[error("Operation not supported by this device")]
    Unsupported,

    #[error("Device is disabled by configuration")]
    Disabled,

    #[error("Device is not configured: {0}")]
    NotConfigured(String),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("No free decrypt slot")]
    NoFreeSlot,

    #[error("Command {0:?} is not supported")]
    UnsupportedCommand(CaPmtCommand),

    #[error("Command rejected, status = {0}")]
    Rejected(DeviceStatus),

    #[error("Configuration store error: {0}")]
    Store(#[from] StoreError),
}

impl From<SlotError> for DeviceError {
    fn from(e: SlotError) -> Self {
        match e {
            SlotError::NoFreeSlot => DeviceError::NoFreeSlot,
            SlotError::UnsupportedCommand(command) => DeviceError::UnsupportedCommand(command),
        }
    }
}

/// Which directions a property supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PropertySupport {
    pub get: bool,
    pub set: bool,
}

/// Opaque sink for fixed-size binary commands (a driver property set).
pub trait CommandTransport {
    /// Ask which directions `property` supports.
    fn query_supported(&self, property: u32) -> Result<PropertySupport, DeviceStatus>;

    /// Send `data` to `property`. A non-zero status means the command was rejected.
    fn set_property(&self, property: u32, instance: &[u8; INSTANCE_SIZE], data: &[u8])
        -> DeviceStatus;

    /// Read `property` into `data`.
    fn get_property(
        &self,
        _property: u32,
        _instance: &[u8; INSTANCE_SIZE],
        _data: &mut [u8],
    ) -> DeviceStatus {
        warn!("This transport does not support reading properties.");
        DeviceStatus(E_NOTIMPL)
    }
}

/// HRESULT returned for unimplemented operations.
pub const E_NOTIMPL: i32 = 0x8000_4001_u32 as i32;

/// Devices with their own tuning method.
pub trait CustomTuner {
    fn tune(&self, channel: &ChannelDescriptor) -> Result<(), DeviceError>;
}

/// Devices that can drive DiSEqC switches.
pub trait DiseqcController {
    /// Send a tone/data burst. `ToneBurst::None` succeeds without sending.
    fn set_tone_state(&self, burst: ToneBurst, tone: Tone22k) -> Result<(), DeviceError>;

    /// Send a raw DiSEqC command. An empty command succeeds without sending.
    fn send_diseqc_command(&self, command: &[u8]) -> Result<(), DeviceError>;

    /// Read the reply to a previous command.
    fn read_diseqc_response(&self) -> Result<Vec<u8>, DeviceError> {
        warn!("This device does not support reading DiSEqC responses.");
        Err(DeviceError::Unsupported)
    }
}

/// Devices that can decrypt services.
pub trait ConditionalAccessProvider {
    fn open_interface(&self) -> Result<(), DeviceError>;

    fn close_interface(&self) -> Result<(), DeviceError>;

    /// Reset the interface. Returns true if the caller must rebuild its
    /// capture graph for the reset to take effect.
    fn reset_interface(&self) -> Result<bool, DeviceError>;

    fn is_interface_ready(&self) -> bool;

    /// Start, update or stop decrypting a service.
    ///
    /// A missing PMT or CAT is not an error: there is nothing to decrypt yet.
    fn send_ca_command(
        &self,
        channel: &ServiceChannel,
        list_action: CaPmtListManagementAction,
        command: CaPmtCommand,
        pmt: Option<&PmtTable>,
        cat: Option<&CatTable>,
    ) -> Result<(), DeviceError>;
}

/// MD-API decode filter of one decrypt slot.
pub trait DecodeFilter {
    /// Point the filter at its plugin configuration directory.
    fn set_plugins_directory(&self, directory: &str) -> Result<(), DeviceError>;

    /// Whether [`DecodeFilter::change_channel_ex`] is available.
    fn supports_extended(&self) -> bool {
        false
    }

    /// Start decrypting the service described by an 804-byte program record.
    fn change_channel(&self, program: &[u8]) -> Result<(), DeviceError>;

    /// As [`DecodeFilter::change_channel`], plus a 128-byte PID list record.
    fn change_channel_ex(&self, _program: &[u8], _pids: &[u8]) -> Result<(), DeviceError> {
        Err(DeviceError::Unsupported)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_error_conversion() {
        assert!(matches!(
            DeviceError::from(SlotError::NoFreeSlot),
            DeviceError::NoFreeSlot
        ));
        assert!(matches!(
            DeviceError::from(SlotError::UnsupportedCommand(CaPmtCommand::Query)),
            DeviceError::UnsupportedCommand(CaPmtCommand::Query)
        ));
    }

    #[test]
    fn test_rejected_message() {
        let e = DeviceError::Rejected(DeviceStatus(E_NOTIMPL));
        assert_eq!(e.to_string(), "Command rejected, status = 0x80004001");
    }
}
