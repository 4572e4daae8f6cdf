//! LNB local oscillator selection.

use tvcard_protocol::{ChannelDescriptor, Polarisation};

/// LNB settings for one channel, frequencies in kHz.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LnbSettings {
    /// Local oscillator frequency of the band the channel sits in.
    pub lof_khz: u32,
    pub switch_khz: u32,
    pub polarisation: Polarisation,
}

/// Source of LNB tuning parameters for a channel.
///
/// Installations with unusual LNBs (C-band, bandstacked, per-satellite
/// overrides) plug their own lookup in here.
pub trait LnbParameterSource {
    fn lnb_settings(&self, channel: &ChannelDescriptor) -> LnbSettings;
}

/// Reads the LNB parameters carried by the channel itself.
///
/// The high band oscillator is selected when the LNB has a switch frequency
/// and the channel is at or above it.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChannelLnb;

impl LnbParameterSource for ChannelLnb {
    fn lnb_settings(&self, channel: &ChannelDescriptor) -> LnbSettings {
        let high_band =
            channel.lnb_switch_khz != 0 && channel.frequency_khz >= channel.lnb_switch_khz;
        LnbSettings {
            lof_khz: if high_band {
                channel.lnb_high_lof_khz
            } else {
                channel.lnb_low_lof_khz
            },
            switch_khz: channel.lnb_switch_khz,
            polarisation: channel.polarisation,
        }
    }
}

impl<F> LnbParameterSource for F
where
    F: Fn(&ChannelDescriptor) -> LnbSettings,
{
    fn lnb_settings(&self, channel: &ChannelDescriptor) -> LnbSettings {
        self(channel)
    }
}

/// Convert kHz to MHz, truncating.
pub fn khz_to_mhz(khz: u32) -> u32 {
    khz / 1000
}
