//! Tuning command construction.
//!
//! The builder performs no I/O; it only fills in [`TuningCommand`] values
//! for a transport to send.

use log::debug;
use tvcard_protocol::{
    ChannelDescriptor, DiseqcMessage, ProtocolError, SwitchPort, ToneBurst, TuningCommand,
};

use super::lnb::{khz_to_mhz, ChannelLnb, LnbParameterSource};
use super::modulation::{self, ModulationRemap};

/// Burst selector understood by the driver for a zero-length DiSEqC message.
pub mod burst_selector {
    /// Simple DiSEqC "A" (unmodulated tone burst).
    pub const TONE_BURST: u8 = 0;
    /// Simple DiSEqC "B" (modulated data burst).
    pub const DATA_BURST: u8 = 1;
}

/// Builds tuning, burst and raw DiSEqC commands for one device type.
#[derive(Debug, Clone)]
pub struct TuningCommandBuilder<L = ChannelLnb> {
    lnb: L,
    remap: ModulationRemap,
    diseqc_repeats: u32,
}

impl Default for TuningCommandBuilder<ChannelLnb> {
    fn default() -> Self {
        Self::new(ChannelLnb)
    }
}

impl<L: LnbParameterSource> TuningCommandBuilder<L> {
    /// Create a builder with no modulation substitution and single transmission.
    pub fn new(lnb: L) -> Self {
        Self {
            lnb,
            remap: modulation::identity,
            diseqc_repeats: 0,
        }
    }

    /// Use a device-specific modulation substitution.
    pub fn with_modulation_remap(mut self, remap: ModulationRemap) -> Self {
        self.remap = remap;
        self
    }

    /// Repeat DiSEqC transmissions (0 = send once).
    pub fn with_diseqc_repeats(mut self, repeats: u32) -> Self {
        self.diseqc_repeats = repeats;
        self
    }

    pub fn diseqc_repeats(&self) -> u32 {
        self.diseqc_repeats
    }

    /// Build the command that tunes `channel`.
    ///
    /// Both LNB oscillator fields carry the oscillator of the channel's band,
    /// so the driver never switches band on its own.
    pub fn tune(&self, channel: &ChannelDescriptor) -> TuningCommand {
        let lnb = self.lnb.lnb_settings(channel);
        let lof_mhz = khz_to_mhz(lnb.lof_khz);

        let command = TuningCommand {
            frequency_mhz: khz_to_mhz(channel.frequency_khz),
            lnb_low_lof_mhz: lof_mhz,
            lnb_high_lof_mhz: lof_mhz,
            lnb_switch_mhz: khz_to_mhz(lnb.switch_khz),
            symbol_rate: channel.symbol_rate,
            polarisation: lnb.polarisation,
            modulation: (self.remap)(channel.modulation),
            inner_fec: channel.inner_fec,
            switch_port: SwitchPort::None,
            diseqc_repeats: self.diseqc_repeats,
            ..TuningCommand::default()
        };

        debug!(
            "Tune command: {} MHz, LOF {} MHz, switch {} MHz, {} ks/s, {:?}/{:?}/{:?}",
            command.frequency_mhz,
            lof_mhz,
            command.lnb_switch_mhz,
            command.symbol_rate,
            command.polarisation,
            command.modulation,
            command.inner_fec
        );
        command
    }

    /// Build a tone/data burst command. Returns `None` when no burst is wanted.
    pub fn tone_burst(&self, state: ToneBurst) -> Option<TuningCommand> {
        let selector = match state {
            ToneBurst::None => return None,
            ToneBurst::ToneBurst => burst_selector::TONE_BURST,
            ToneBurst::DataBurst => burst_selector::DATA_BURST,
        };

        // Bursts are always sent once.
        Some(TuningCommand {
            diseqc_repeats: 0,
            diseqc: DiseqcMessage::burst(selector),
            force_high_voltage: false,
            ..TuningCommand::default()
        })
    }

    /// Build a raw DiSEqC command.
    ///
    /// An empty command yields `Ok(None)`: there is nothing to send.
    pub fn diseqc(&self, bytes: &[u8]) -> Result<Option<TuningCommand>, ProtocolError> {
        if bytes.is_empty() {
            return Ok(None);
        }

        let diseqc = DiseqcMessage::new(bytes)?;
        Ok(Some(TuningCommand {
            diseqc_repeats: self.diseqc_repeats,
            diseqc,
            force_high_voltage: true,
            ..TuningCommand::default()
        }))
    }
}
