//! Codec for the fixed-layout records handed to tuner drivers.
//!
//! Tuning/DiSEqC command (68 bytes, little-endian):
//! ```text
//! +------+------+------+--------+--------+-----+-----+-----+------+
//! | Freq | LOF  | LOF  | Switch | Symbol | Pol | Mod | FEC | Port |
//! | MHz  | low  | high | MHz    | ks/s   |     |     |     |      |
//! +------+------+------+--------+--------+-----+-----+-----+------+
//! | Repeats | Len | Message[8] | HighV | Strength | Quality | Lock |
//! +---------+-----+------------+-------+----------+---------+------+
//! ```
//!
//! MD-API program record (804 bytes) and PID list record (128 bytes) follow
//! the sequential x86 layout expected by softCAM plugins.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::ProtocolError;
use crate::types::*;

/// Tuning/DiSEqC command record size.
pub const TUNING_COMMAND_SIZE: usize = 68;

/// MD-API program record size.
pub const PROGRAM_RECORD_SIZE: usize = 804;

/// MD-API PID-to-decode record size.
pub const PID_LIST_RECORD_SIZE: usize = 128;

/// Number of PID filter slots in the program record (never used, always zero).
const PID_FILTER_SLOTS: usize = 32;

/// Size of one PID filter slot.
const PID_FILTER_SIZE: usize = 8;

/// Fixed string widths in the program record.
const NAME_SIZE: usize = 30;
const CA_COUNTRY_SIZE: usize = 5;
const EXTERN_BUFFER_SIZE: usize = 16;

/// Encode a tuning/DiSEqC command into its 68-byte record.
pub fn encode_tuning_command(cmd: &TuningCommand) -> Bytes {
    let mut buf = BytesMut::with_capacity(TUNING_COMMAND_SIZE);

    buf.put_u32_le(cmd.frequency_mhz);
    buf.put_u32_le(cmd.lnb_low_lof_mhz);
    buf.put_u32_le(cmd.lnb_high_lof_mhz);
    buf.put_u32_le(cmd.lnb_switch_mhz);
    buf.put_u32_le(cmd.symbol_rate);
    buf.put_i32_le(cmd.polarisation.into());
    buf.put_i32_le(cmd.modulation.into());
    buf.put_i32_le(cmd.inner_fec.into());
    buf.put_i32_le(cmd.switch_port.into());
    buf.put_u32_le(cmd.diseqc_repeats);
    buf.put_u32_le(cmd.diseqc.len() as u32);
    buf.put_slice(cmd.diseqc.raw());
    put_bool32(&mut buf, cmd.force_high_voltage);
    buf.put_u32_le(cmd.signal_strength);
    buf.put_u32_le(cmd.signal_quality);
    put_bool32(&mut buf, cmd.signal_locked);

    debug_assert_eq!(buf.len(), TUNING_COMMAND_SIZE);
    buf.freeze()
}

/// Decode a tuning/DiSEqC command record (used to read the response path).
pub fn decode_tuning_command(data: &[u8]) -> Result<TuningCommand, ProtocolError> {
    if data.len() < TUNING_COMMAND_SIZE {
        return Err(ProtocolError::IncompleteRecord {
            expected: TUNING_COMMAND_SIZE,
            actual: data.len(),
        });
    }

    let mut buf = &data[..TUNING_COMMAND_SIZE];
    let frequency_mhz = buf.get_u32_le();
    let lnb_low_lof_mhz = buf.get_u32_le();
    let lnb_high_lof_mhz = buf.get_u32_le();
    let lnb_switch_mhz = buf.get_u32_le();
    let symbol_rate = buf.get_u32_le();
    let polarisation = Polarisation::try_from(buf.get_i32_le())?;
    let modulation = Modulation::try_from(buf.get_i32_le())?;
    let inner_fec = FecRate::try_from(buf.get_i32_le())?;
    let switch_port = SwitchPort::try_from(buf.get_i32_le())?;
    let diseqc_repeats = buf.get_u32_le();

    let diseqc_len = buf.get_u32_le() as usize;
    let mut message = [0u8; MAX_DISEQC_MESSAGE_LENGTH];
    buf.copy_to_slice(&mut message);
    let diseqc = if diseqc_len == 0 {
        DiseqcMessage::burst(message[0])
    } else {
        DiseqcMessage::new(message.get(..diseqc_len).ok_or(
            ProtocolError::OversizedCommand {
                len: diseqc_len,
                max: MAX_DISEQC_MESSAGE_LENGTH,
            },
        )?)?
    };

    let force_high_voltage = buf.get_u32_le() != 0;
    let signal_strength = buf.get_u32_le();
    let signal_quality = buf.get_u32_le();
    let signal_locked = buf.get_u32_le() != 0;

    Ok(TuningCommand {
        frequency_mhz,
        lnb_low_lof_mhz,
        lnb_high_lof_mhz,
        lnb_switch_mhz,
        symbol_rate,
        polarisation,
        modulation,
        inner_fec,
        switch_port,
        diseqc_repeats,
        diseqc,
        force_high_voltage,
        signal_strength,
        signal_quality,
        signal_locked,
    })
}

/// Encode a decode request into the 804-byte MD-API program record.
pub fn encode_program_record(req: &ProgramDecodeRequest) -> Bytes {
    let mut buf = BytesMut::with_capacity(PROGRAM_RECORD_SIZE);

    put_fixed_string(&mut buf, &req.name, NAME_SIZE);
    put_fixed_string(&mut buf, &req.provider, NAME_SIZE);
    put_fixed_string(&mut buf, &req.country, NAME_SIZE);
    buf.put_u16_le(0); // padding

    buf.put_u32_le(req.frequency_khz);
    buf.put_u8(0); // programme type
    buf.put_u8(0); // voltage
    buf.put_u8(0); // AFC
    buf.put_u8(0); // DiSEqC
    buf.put_u16_le(req.symbol_rate);
    buf.put_u16_le(0); // QAM
    buf.put_u16_le(0); // FEC
    buf.put_u8(0); // norm
    buf.put_u8(0); // padding

    buf.put_u16_le(req.transport_stream_id);
    buf.put_u16_le(req.video_pid);
    buf.put_u16_le(req.audio_pid);
    buf.put_u16_le(req.teletext_pid);
    buf.put_u16_le(req.pmt_pid);
    buf.put_u16_le(req.pcr_pid);
    buf.put_u16_le(req.ecm_pid);
    buf.put_u16_le(req.service_id);
    buf.put_u16_le(req.ac3_audio_pid);

    buf.put_u8(0); // analog TV standard
    buf.put_u8(req.service_type);
    buf.put_u8(req.ca_index.unwrap_or(0));
    buf.put_u8(0); // padding

    buf.put_u16_le(0); // temporary audio PID
    buf.put_u16_le(0); // PID filter count
    buf.put_bytes(0, PID_FILTER_SLOTS * PID_FILTER_SIZE);

    buf.put_u16_le(req.ca_systems.len() as u16);
    for i in 0..MAX_CA_SYSTEMS {
        let entry = req.ca_systems.get(i).copied().unwrap_or_default();
        buf.put_u16_le(entry.ca_type);
        buf.put_u16_le(entry.ecm_pid);
        buf.put_u16_le(entry.emm_pid);
        buf.put_u16_le(0); // padding
        buf.put_u32_le(entry.provider_id);
    }

    buf.put_bytes(0, CA_COUNTRY_SIZE);
    buf.put_u8(0); // marker
    buf.put_u16_le(0); // link transponder
    buf.put_u16_le(0); // link service ID
    buf.put_u8(0); // dynamic
    buf.put_bytes(0, EXTERN_BUFFER_SIZE);
    buf.put_u8(0); // padding

    debug_assert_eq!(buf.len(), PROGRAM_RECORD_SIZE);
    buf.freeze()
}

/// Encode the PID list of a decode request into the 128-byte MD-API record.
pub fn encode_pid_list_record(pids: &PidList) -> Bytes {
    let mut buf = BytesMut::with_capacity(PID_LIST_RECORD_SIZE);
    for i in 0..MAX_DECODE_PIDS {
        buf.put_u16_le(pids.get(i).copied().unwrap_or(0));
    }
    buf.put_u16_le(pids.len() as u16);

    debug_assert_eq!(buf.len(), PID_LIST_RECORD_SIZE);
    buf.freeze()
}

/// Write a Win32 `BOOL`.
fn put_bool32(buf: &mut BytesMut, value: bool) {
    buf.put_u32_le(if value { 1 } else { 0 });
}

/// Write a NUL-terminated ANSI string into a fixed-width field.
///
/// Characters outside ASCII are replaced with `?`; the text is truncated so
/// the terminator always fits.
fn put_fixed_string(buf: &mut BytesMut, s: &str, size: usize) {
    let mut written = 0;
    for ch in s.chars().take(size - 1) {
        buf.put_u8(if ch.is_ascii() { ch as u8 } else { b'?' });
        written += 1;
    }
    buf.put_bytes(0, size - written);
}
