//! Device-specific modulation substitution.

use tvcard_protocol::Modulation;

/// Maps the modulation stored in channel details to the value a driver
/// expects. Must be pure.
pub type ModulationRemap = fn(Modulation) -> Modulation;

/// Pass every modulation through unchanged.
pub fn identity(modulation: Modulation) -> Modulation {
    modulation
}

/// Genpix driver mapping.
///
/// Channel details store turbo FEC schemes under otherwise unused values;
/// the driver expects them under its own aliases:
///
/// | Stored   | Sent    | Meaning          |
/// |----------|---------|------------------|
/// | not set  | QPSK    | DVB-S QPSK       |
/// | O-QPSK   | 16 QAM  | turbo FEC QPSK   |
/// | 80 QAM   | 8 PSK   | turbo FEC 8 PSK  |
pub fn genpix(modulation: Modulation) -> Modulation {
    match modulation {
        Modulation::NotSet => Modulation::Qpsk,
        Modulation::Oqpsk => Modulation::Qam16,
        Modulation::Qam80 => Modulation::Psk8,
        other => other,
    }
}
