//! Data model shared by the tuning and conditional-access paths.

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

/// Maximum DiSEqC message length accepted by the tuning command record.
pub const MAX_DISEQC_MESSAGE_LENGTH: usize = 8;

/// Maximum number of CA systems in a program record.
pub const MAX_CA_SYSTEMS: usize = 32;

/// Maximum number of PIDs in a PID-to-decode record.
pub const MAX_DECODE_PIDS: usize = 63;

/// Declares a C-style enum with fixed `i32` values plus the conversions used
/// when writing it into (and reading it back from) a binary record.
macro_rules! numeric_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident = $value:expr, )+
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[repr(i32)]
        pub enum $name {
            $( $(#[$vmeta])* $variant = $value, )+
        }

        impl TryFrom<i32> for $name {
            type Error = ProtocolError;

            fn try_from(value: i32) -> Result<Self, ProtocolError> {
                match value {
                    $( v if v == $value => Ok($name::$variant), )+
                    _ => Err(ProtocolError::InvalidValue {
                        field: stringify!($name),
                        value,
                    }),
                }
            }
        }

        impl From<$name> for i32 {
            fn from(value: $name) -> Self {
                value as i32
            }
        }
    };
}

numeric_enum! {
    /// LNB polarisation (BDA `Polarisation`).
    pub enum Polarisation {
        NotSet = -1,
        NotDefined = 0,
        /// Linear horizontal.
        LinearH = 1,
        /// Linear vertical.
        LinearV = 2,
        /// Circular left.
        CircularL = 3,
        /// Circular right.
        CircularR = 4,
    }
}

numeric_enum! {
    /// Modulation scheme (BDA `ModulationType`).
    pub enum Modulation {
        NotSet = -1,
        NotDefined = 0,
        Qam16 = 1,
        Qam32 = 2,
        Qam64 = 3,
        Qam80 = 4,
        Qam96 = 5,
        Qam112 = 6,
        Qam128 = 7,
        Qam160 = 8,
        Qam192 = 9,
        Qam224 = 10,
        Qam256 = 11,
        Qam320 = 12,
        Qam384 = 13,
        Qam448 = 14,
        Qam512 = 15,
        Qam640 = 16,
        Qam768 = 17,
        Qam896 = 18,
        Qam1024 = 19,
        Qpsk = 20,
        Bpsk = 21,
        Oqpsk = 22,
        Vsb8 = 23,
        Vsb16 = 24,
        AnalogAmplitude = 25,
        AnalogFrequency = 26,
        Psk8 = 27,
        Rf = 28,
        Apsk16 = 29,
        Apsk32 = 30,
        /// DVB-S2 QPSK (non backwards compatible).
        NbcQpsk = 31,
        /// DVB-S2 8 PSK (non backwards compatible).
        Nbc8Psk = 32,
        DirectTv = 33,
    }
}

numeric_enum! {
    /// Inner FEC code rate (BDA `BinaryConvolutionCodeRate`).
    pub enum FecRate {
        NotSet = -1,
        NotDefined = 0,
        Rate1_2 = 1,
        Rate2_3 = 2,
        Rate3_4 = 3,
        Rate3_5 = 4,
        Rate4_5 = 5,
        Rate5_6 = 6,
        Rate5_11 = 7,
        Rate7_8 = 8,
        Rate1_4 = 9,
        Rate1_3 = 10,
        Rate2_5 = 11,
        Rate6_7 = 12,
        Rate8_9 = 13,
        Rate9_10 = 14,
    }
}

numeric_enum! {
    /// Switch port selector understood by Genpix drivers.
    pub enum SwitchPort {
        None = 0,
        // DiSEqC 1.0
        PortA = 1,
        PortB = 2,
        PortC = 3,
        PortD = 4,
        // Simple DiSEqC
        ToneBurst = 5,
        DataBurst = 6,
        // Legacy Dish Network switches
        Sw21PortA = 7,
        Sw21PortB = 8,
        Sw42PortA = 9,
        Sw42PortB = 10,
        Sw44PortB = 11,
        Sw64PortAOdd = 12,
        Sw64PortAEven = 13,
        Sw64PortBOdd = 14,
        Sw64PortBEven = 15,
        Sw64PortCOdd = 16,
        Sw64PortCEven = 17,
        TwinLnbSatA = 18,
        TwinLnbSatB = 19,
        QuadLnbSatB = 20,
    }
}

numeric_enum! {
    /// CA PMT command (EN 50221 `ca_pmt_cmd_id`).
    pub enum CaPmtCommand {
        OkDescrambling = 1,
        OkMmi = 2,
        Query = 3,
        NotSelected = 4,
    }
}

numeric_enum! {
    /// CA PMT list management (EN 50221 `ca_pmt_list_management`).
    pub enum CaPmtListManagementAction {
        More = 0,
        First = 1,
        Last = 2,
        Only = 3,
        Add = 4,
        Update = 5,
    }
}

impl CaPmtListManagementAction {
    /// Returns true for the first (or only) service of a new list.
    pub fn starts_list(self) -> bool {
        matches!(
            self,
            CaPmtListManagementAction::First | CaPmtListManagementAction::Only
        )
    }
}

/// Tone/data burst ("simple DiSEqC") state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ToneBurst {
    None,
    ToneBurst,
    DataBurst,
}

/// Legacy 22 kHz tone state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Tone22k {
    Off,
    On,
    Auto,
}

/// DVB service type written into the program record.
pub mod service_type {
    /// Digital television service.
    pub const DIGITAL_TELEVISION: u8 = 0x01;
    /// Digital radio sound service.
    pub const DIGITAL_RADIO: u8 = 0x02;
}

/// Satellite channel tuning parameters.
///
/// Frequencies are in kHz, the symbol rate in ks/s.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelDescriptor {
    pub frequency_khz: u32,
    pub symbol_rate: u32,
    pub polarisation: Polarisation,
    pub modulation: Modulation,
    pub inner_fec: FecRate,
    /// LNB low band local oscillator frequency.
    pub lnb_low_lof_khz: u32,
    /// LNB high band local oscillator frequency.
    pub lnb_high_lof_khz: u32,
    /// LNB band switch frequency (0 = single band LNB).
    pub lnb_switch_khz: u32,
}

impl ChannelDescriptor {
    /// Create a channel on a universal Ku-band LNB (9.75/10.6 GHz, switch at 11.7 GHz).
    pub fn universal(
        frequency_khz: u32,
        symbol_rate: u32,
        polarisation: Polarisation,
    ) -> Self {
        Self {
            frequency_khz,
            symbol_rate,
            polarisation,
            modulation: Modulation::NotSet,
            inner_fec: FecRate::NotSet,
            lnb_low_lof_khz: 9_750_000,
            lnb_high_lof_khz: 10_600_000,
            lnb_switch_khz: 11_700_000,
        }
    }
}

/// DiSEqC message carried inside a tuning command.
///
/// A zero declared length asks the driver to send a tone or data burst
/// instead, selected by the first buffer byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DiseqcMessage {
    len: u8,
    bytes: [u8; MAX_DISEQC_MESSAGE_LENGTH],
}

impl DiseqcMessage {
    /// Create a message from raw bytes.
    pub fn new(data: &[u8]) -> Result<Self, ProtocolError> {
        if data.len() > MAX_DISEQC_MESSAGE_LENGTH {
            return Err(ProtocolError::OversizedCommand {
                len: data.len(),
                max: MAX_DISEQC_MESSAGE_LENGTH,
            });
        }
        let mut bytes = [0u8; MAX_DISEQC_MESSAGE_LENGTH];
        bytes[..data.len()].copy_from_slice(data);
        Ok(Self {
            len: data.len() as u8,
            bytes,
        })
    }

    /// Create a zero-length message whose first byte selects the burst type.
    pub fn burst(selector: u8) -> Self {
        let mut bytes = [0u8; MAX_DISEQC_MESSAGE_LENGTH];
        bytes[0] = selector;
        Self { len: 0, bytes }
    }

    /// Declared message length.
    pub fn len(&self) -> usize {
        self.len as usize
    }

    /// Returns true if the declared length is zero.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The declared message bytes.
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }

    /// The full message buffer, including bytes past the declared length.
    pub fn raw(&self) -> &[u8; MAX_DISEQC_MESSAGE_LENGTH] {
        &self.bytes
    }
}

/// Fixed-layout tuning/DiSEqC command record.
///
/// All frequencies are in MHz. The signal fields are only filled in by the
/// driver on the response path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TuningCommand {
    pub frequency_mhz: u32,
    pub lnb_low_lof_mhz: u32,
    pub lnb_high_lof_mhz: u32,
    pub lnb_switch_mhz: u32,
    pub symbol_rate: u32,
    pub polarisation: Polarisation,
    pub modulation: Modulation,
    pub inner_fec: FecRate,
    pub switch_port: SwitchPort,
    /// Send count minus one (0 = send once).
    pub diseqc_repeats: u32,
    pub diseqc: DiseqcMessage,
    pub force_high_voltage: bool,
    pub signal_strength: u32,
    pub signal_quality: u32,
    pub signal_locked: bool,
}

impl Default for TuningCommand {
    fn default() -> Self {
        Self {
            frequency_mhz: 0,
            lnb_low_lof_mhz: 0,
            lnb_high_lof_mhz: 0,
            lnb_switch_mhz: 0,
            symbol_rate: 0,
            polarisation: Polarisation::NotDefined,
            modulation: Modulation::NotDefined,
            inner_fec: FecRate::NotDefined,
            switch_port: SwitchPort::None,
            diseqc_repeats: 0,
            diseqc: DiseqcMessage::default(),
            force_high_voltage: false,
            signal_strength: 0,
            signal_quality: 0,
            signal_locked: false,
        }
    }
}

/// Fixed-capacity list that refuses to grow past `N` entries.
#[derive(Clone, Copy)]
pub struct BoundedVec<T: Copy + Default, const N: usize> {
    items: [T; N],
    len: usize,
}

impl<T: Copy + Default, const N: usize> BoundedVec<T, N> {
    /// Create an empty list.
    pub fn new() -> Self {
        Self {
            items: [T::default(); N],
            len: 0,
        }
    }

    /// Append an item. When the list is full the item is handed back.
    pub fn push(&mut self, item: T) -> Result<(), T> {
        if self.len == N {
            return Err(item);
        }
        self.items[self.len] = item;
        self.len += 1;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_full(&self) -> bool {
        self.len == N
    }

    /// Fixed capacity.
    pub const fn capacity(&self) -> usize {
        N
    }

    pub fn clear(&mut self) {
        self.len = 0;
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.as_slice().get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        let len = self.len;
        self.items[..len].get_mut(index)
    }

    pub fn as_slice(&self) -> &[T] {
        &self.items[..self.len]
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.as_slice().iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, T> {
        let len = self.len;
        self.items[..len].iter_mut()
    }
}

impl<T: Copy + Default, const N: usize> Default for BoundedVec<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Copy + Default + PartialEq, const N: usize> PartialEq for BoundedVec<T, N> {
    fn eq(&self, other: &Self) -> bool {
        self.as_slice() == other.as_slice()
    }
}

impl<T: Copy + Default + Eq, const N: usize> Eq for BoundedVec<T, N> {}

impl<T: Copy + Default + std::fmt::Debug, const N: usize> std::fmt::Debug for BoundedVec<T, N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.as_slice()).finish()
    }
}

impl<T: Copy + Default + Serialize, const N: usize> Serialize for BoundedVec<T, N> {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.as_slice())
    }
}

impl<'a, T: Copy + Default, const N: usize> IntoIterator for &'a BoundedVec<T, N> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// One conditional-access system option for a service.
///
/// A zero PID means "not present": EMM-only entries come from the CAT and
/// have no ECM PID.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CaSystemEntry {
    pub ca_type: u16,
    pub ecm_pid: u16,
    pub emm_pid: u16,
    pub provider_id: u32,
}

/// CA systems for one service (protocol limit: 32).
pub type CaSystemTable = BoundedVec<CaSystemEntry, MAX_CA_SYSTEMS>;

/// PIDs the decoder should descramble (protocol limit: 63).
pub type PidList = BoundedVec<u16, MAX_DECODE_PIDS>;

/// Service identity used on the conditional-access path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceChannel {
    pub name: Option<String>,
    pub provider: Option<String>,
    pub transport_stream_id: u16,
    pub service_id: u16,
    pub pmt_pid: u16,
    pub is_tv: bool,
}

/// Everything the softCAM decoder needs to descramble one service.
///
/// Single-PID fields use zero for "not found".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProgramDecodeRequest {
    pub name: String,
    pub provider: String,
    pub country: String,
    pub frequency_khz: u32,
    pub symbol_rate: u16,
    pub transport_stream_id: u16,
    pub service_id: u16,
    pub pmt_pid: u16,
    pub pcr_pid: u16,
    pub video_pid: u16,
    pub audio_pid: u16,
    pub ac3_audio_pid: u16,
    pub teletext_pid: u16,
    /// Primary ECM PID handed to the decoder.
    pub ecm_pid: u16,
    pub service_type: u8,
    pub ca_systems: CaSystemTable,
    /// Index of the preferred entry in `ca_systems`, if configuration chose one.
    pub ca_index: Option<u8>,
    /// PIDs for decoders supporting the extended PID-list call.
    pub pids: PidList,
}

impl ProgramDecodeRequest {
    /// Create an empty request for a service.
    pub fn new(service_id: u16, pcr_pid: u16) -> Self {
        Self {
            service_id,
            pcr_pid,
            ..Self::default()
        }
    }

    /// Apply the identifying fields of a service channel.
    pub fn apply_channel(&mut self, channel: &ServiceChannel) {
        if let Some(name) = &channel.name {
            self.name = name.clone();
        }
        if let Some(provider) = &channel.provider {
            self.provider = provider.clone();
        }
        self.transport_stream_id = channel.transport_stream_id;
        self.pmt_pid = channel.pmt_pid;
        self.service_type = if channel.is_tv {
            service_type::DIGITAL_TELEVISION
        } else {
            service_type::DIGITAL_RADIO
        };
    }

    /// The preferred CA system, falling back to the first entry.
    pub fn preferred_ca_system(&self) -> Option<&CaSystemEntry> {
        self.ca_systems.get(self.ca_index.unwrap_or(0) as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enum_values() {
        assert_eq!(i32::from(Modulation::Qpsk), 20);
        assert_eq!(i32::from(Modulation::Psk8), 27);
        assert_eq!(i32::from(Polarisation::CircularR), 4);
        assert_eq!(Modulation::try_from(22).unwrap(), Modulation::Oqpsk);
        assert_eq!(FecRate::try_from(-1).unwrap(), FecRate::NotSet);
        assert!(matches!(
            SwitchPort::try_from(21),
            Err(ProtocolError::InvalidValue { field: "SwitchPort", value: 21 })
        ));
    }

    #[test]
    fn test_diseqc_message() {
        let msg = DiseqcMessage::new(&[0xE0, 0x10, 0x38, 0xF0]).unwrap();
        assert_eq!(msg.len(), 4);
        assert_eq!(msg.as_slice(), &[0xE0, 0x10, 0x38, 0xF0]);

        let err = DiseqcMessage::new(&[0u8; 9]).unwrap_err();
        assert_eq!(err, ProtocolError::OversizedCommand { len: 9, max: 8 });

        let burst = DiseqcMessage::burst(1);
        assert!(burst.is_empty());
        assert_eq!(burst.raw()[0], 1);
    }

    #[test]
    fn test_bounded_vec_rejects_when_full() {
        let mut list: BoundedVec<u16, 2> = BoundedVec::new();
        assert_eq!(list.push(1), Ok(()));
        assert_eq!(list.push(2), Ok(()));
        assert!(list.is_full());
        assert_eq!(list.push(3), Err(3));
        assert_eq!(list.as_slice(), &[1, 2]);
        assert_eq!(list.capacity(), 2);
    }

    #[test]
    fn test_list_action_starts_list() {
        assert!(CaPmtListManagementAction::First.starts_list());
        assert!(CaPmtListManagementAction::Only.starts_list());
        assert!(!CaPmtListManagementAction::Add.starts_list());
    }

    #[test]
    fn test_apply_channel() {
        let mut request = ProgramDecodeRequest::new(0x1234, 0x100);
        request.apply_channel(&ServiceChannel {
            name: Some("Das Erste".to_string()),
            provider: None,
            transport_stream_id: 1101,
            service_id: 0x1234,
            pmt_pid: 0x64,
            is_tv: false,
        });
        assert_eq!(request.name, "Das Erste");
        assert_eq!(request.provider, "");
        assert_eq!(request.pmt_pid, 0x64);
        assert_eq!(request.service_type, service_type::DIGITAL_RADIO);
    }
}
