//! Genpix SkyWalker DVB-S tuner.
//!
//! Tuning and DiSEqC both go through one vendor property set that takes the
//! same 68-byte command record.

use log::debug;
use tvcard_protocol::{
    decode_tuning_command, encode_tuning_command, ChannelDescriptor, Tone22k, ToneBurst,
    TuningCommand, TUNING_COMMAND_SIZE,
};

use crate::dump::hex_dump;
use crate::tuning::{modulation, ChannelLnb, LnbParameterSource, TuningCommandBuilder};

use super::{property, CommandTransport, CustomTuner, DeviceError, DiseqcController, INSTANCE_SIZE};

/// Signal state reported by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalStatus {
    pub strength: u32,
    pub quality: u32,
    pub locked: bool,
}

/// A Genpix tuner behind a command transport.
#[derive(Debug)]
pub struct GenpixDevice<T, L = ChannelLnb> {
    transport: T,
    builder: TuningCommandBuilder<L>,
    instance: [u8; INSTANCE_SIZE],
}

impl<T: CommandTransport> GenpixDevice<T, ChannelLnb> {
    /// Probe the transport for the Genpix DiSEqC property.
    pub fn initialise(transport: T) -> Result<Self, DeviceError> {
        Self::with_lnb(transport, ChannelLnb)
    }
}

impl<T: CommandTransport, L: LnbParameterSource> GenpixDevice<T, L> {
    /// Probe the transport, using `lnb` for LNB parameters.
    pub fn with_lnb(transport: T, lnb: L) -> Result<Self, DeviceError> {
        debug!("Genpix: initialising device");

        match transport.query_supported(property::DISEQC) {
            Ok(support) if support.set => {}
            Ok(_) => {
                debug!("Genpix: device does not support the Genpix property set");
                return Err(DeviceError::Unsupported);
            }
            Err(status) => {
                debug!("Genpix: property query failed, status = {}", status);
                return Err(DeviceError::Unsupported);
            }
        }

        debug!("Genpix: supported device detected");
        Ok(Self {
            transport,
            builder: TuningCommandBuilder::new(lnb).with_modulation_remap(modulation::genpix),
            instance: [0u8; INSTANCE_SIZE],
        })
    }

    /// Repeat DiSEqC transmissions (0 = send once).
    pub fn with_diseqc_repeats(mut self, repeats: u32) -> Self {
        self.builder = self.builder.with_diseqc_repeats(repeats);
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Read signal strength, quality and lock state.
    pub fn signal_status(&self) -> Result<SignalStatus, DeviceError> {
        let mut buf = [0u8; TUNING_COMMAND_SIZE];
        let status = self
            .transport
            .get_property(property::SIGNAL_STATUS, &self.instance, &mut buf);
        if !status.is_success() {
            debug!("Genpix: signal status failed, status = {}", status);
            return Err(DeviceError::Rejected(status));
        }

        let reply = decode_tuning_command(&buf)?;
        Ok(SignalStatus {
            strength: reply.signal_strength,
            quality: reply.signal_quality,
            locked: reply.signal_locked,
        })
    }

    fn send(&self, property: u32, command: &TuningCommand) -> Result<(), DeviceError> {
        let buf = encode_tuning_command(command);
        debug!("Genpix: property {} command\n{}", property, hex_dump(&buf));

        let status = self.transport.set_property(property, &self.instance, &buf);
        if status.is_success() {
            debug!("Genpix: result = success");
            Ok(())
        } else {
            debug!("Genpix: result = failure, status = {}", status);
            Err(DeviceError::Rejected(status))
        }
    }
}

impl<T: CommandTransport, L: LnbParameterSource> CustomTuner for GenpixDevice<T, L> {
    fn tune(&self, channel: &ChannelDescriptor) -> Result<(), DeviceError> {
        debug!("Genpix: tune to channel");
        let command = self.builder.tune(channel);
        self.send(property::TUNE, &command)
    }
}

impl<T: CommandTransport, L: LnbParameterSource> DiseqcController for GenpixDevice<T, L> {
    /// The 22 kHz tone cannot be set directly; the LNB switch frequency of
    /// the tune command controls it.
    fn set_tone_state(&self, burst: ToneBurst, tone: Tone22k) -> Result<(), DeviceError> {
        debug!("Genpix: set tone state, burst = {:?}, 22 kHz = {:?}", burst, tone);
        match self.builder.tone_burst(burst) {
            Some(command) => self.send(property::DISEQC, &command),
            None => Ok(()),
        }
    }

    fn send_diseqc_command(&self, command: &[u8]) -> Result<(), DeviceError> {
        debug!("Genpix: send DiSEqC command");
        match self.builder.diseqc(command) {
            Ok(Some(command)) => self.send(property::DISEQC, &command),
            Ok(None) => {
                debug!("Genpix: command not supplied");
                Ok(())
            }
            Err(e) => {
                debug!("Genpix: {}", e);
                Err(e.into())
            }
        }
    }
}
