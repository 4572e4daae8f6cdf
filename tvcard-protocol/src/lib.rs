//! Wire layouts shared by the tvcard tuning and conditional-access plugins.
//!
//! This crate defines the fixed-size records handed to tuner drivers and
//! softCAM decoders, plus the data model they are built from.
//!
//! # Records
//!
//! | Record                | Size      | Consumer                       |
//! |-----------------------|-----------|--------------------------------|
//! | Tuning/DiSEqC command | 68 bytes  | Genpix BDA property set        |
//! | Program record        | 804 bytes | MD-API `ChangeChannelTP82`     |
//! | PID list record       | 128 bytes | MD-API `ChangeChannelTP82_Ex`  |
//!
//! # Example
//!
//! ```rust
//! use tvcard_protocol::{encode_tuning_command, DiseqcMessage, TuningCommand, TUNING_COMMAND_SIZE};
//!
//! let cmd = TuningCommand {
//!     diseqc: DiseqcMessage::new(&[0xE0, 0x10, 0x38, 0xF0]).unwrap(),
//!     force_high_voltage: true,
//!     ..TuningCommand::default()
//! };
//! let encoded = encode_tuning_command(&cmd);
//! assert_eq!(encoded.len(), TUNING_COMMAND_SIZE);
//! ```

pub mod codec;
pub mod error;
pub mod types;

pub use codec::{
    decode_tuning_command, encode_pid_list_record, encode_program_record, encode_tuning_command,
    PID_LIST_RECORD_SIZE, PROGRAM_RECORD_SIZE, TUNING_COMMAND_SIZE,
};
pub use error::{DeviceStatus, ProtocolError};
pub use types::{
    service_type, BoundedVec, CaPmtCommand, CaPmtListManagementAction, CaSystemEntry,
    CaSystemTable, ChannelDescriptor, DiseqcMessage, FecRate, Modulation, PidList, Polarisation,
    ProgramDecodeRequest, ServiceChannel, SwitchPort, Tone22k, ToneBurst, TuningCommand,
    MAX_CA_SYSTEMS, MAX_DECODE_PIDS, MAX_DISEQC_MESSAGE_LENGTH,
};
