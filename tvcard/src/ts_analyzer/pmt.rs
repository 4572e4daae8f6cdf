//! PMT (Program Map Table) parsing.
//!
//! The PMT lists the elementary streams of one service together with the
//! conditional access descriptors that point at its ECM PIDs.

use bytes::Buf;

use super::descriptors::{parse_descriptor_loop, Descriptor};
use super::psi::PsiSection;
use super::{descriptor_tag, table_id};

const PID_MASK: u16 = 0x1FFF;

/// Read a 12-bit length and the descriptor loop it covers.
fn take_descriptors(reader: &mut &[u8]) -> Option<Vec<Descriptor>> {
    let length = usize::from(reader.get_u16() & 0x0FFF);
    let descriptors = parse_descriptor_loop(reader.get(..length)?);
    reader.advance(length);
    Some(descriptors)
}

/// One elementary stream of the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PmtStream {
    pub stream_type: u8,
    pub elementary_pid: u16,
    /// ES info descriptors.
    pub descriptors: Vec<Descriptor>,
}

impl PmtStream {
    /// Tag of the first descriptor that identifies the stream content.
    pub fn primary_descriptor_tag(&self) -> Option<u8> {
        self.descriptors
            .iter()
            .map(|d| d.tag)
            .find(|&tag| descriptor_tag::identifies_stream(tag))
    }

    /// CA descriptors attached to this stream.
    pub fn ca_descriptors(&self) -> impl Iterator<Item = &Descriptor> {
        self.descriptors
            .iter()
            .filter(|d| d.tag == descriptor_tag::CONDITIONAL_ACCESS)
    }
}

/// Program map of one service.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PmtTable {
    /// Service ID.
    pub program_number: u16,
    pub version_number: u8,
    pub pcr_pid: u16,
    /// Descriptors applying to the whole service.
    pub program_info: Vec<Descriptor>,
    pub streams: Vec<PmtStream>,
}

impl PmtTable {
    /// Parse a PMT from a PSI section.
    pub fn parse(section: &PsiSection) -> Result<Self, &'static str> {
        if section.header.table_id != table_id::PMT {
            return Err("Not a PMT section");
        }

        let mut reader = section.data;
        if reader.remaining() < 4 {
            return Err("PMT data too short");
        }
        let pcr_pid = reader.get_u16() & PID_MASK;
        let program_info = take_descriptors(&mut reader)
            .ok_or("Invalid program info length")?;

        let mut streams = Vec::new();
        while reader.remaining() >= 5 {
            let stream_type = reader.get_u8();
            let elementary_pid = reader.get_u16() & PID_MASK;
            let descriptors = take_descriptors(&mut reader).ok_or("Invalid ES info length")?;
            streams.push(PmtStream {
                stream_type,
                elementary_pid,
                descriptors,
            });
        }

        Ok(PmtTable {
            program_number: section.header.table_id_extension,
            version_number: section.header.version_number,
            pcr_pid,
            program_info,
            streams,
        })
    }

    /// Program-level CA descriptors.
    pub fn program_ca_descriptors(&self) -> impl Iterator<Item = &Descriptor> {
        self.program_info
            .iter()
            .filter(|d| d.tag == descriptor_tag::CONDITIONAL_ACCESS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ts_analyzer::psi::build_section;
    use crate::ts_analyzer::stream_type;

    #[test]
    fn test_parse_pmt() {
        let payload = [
            // PCR PID = 0x0100
            0xE1, 0x00,
            // Program info: one CA descriptor
            0xF0, 0x06, 0x09, 0x04, 0x17, 0x02, 0xE6, 0x01,
            // Stream 1: MPEG-2 video, PID 0x0100, no descriptors
            0x02, 0xE1, 0x00, 0xF0, 0x00,
            // Stream 2: private data, PID 0x0102, ISO 639 then AC-3 descriptor
            0x06, 0xE1, 0x02, 0xF0, 0x08,
            0x0A, 0x04, b'd', b'e', b'u', 0x00,
            0x6A, 0x00,
            // Stream 3: private data, PID 0x0103, CA descriptor only
            0x06, 0xE1, 0x03, 0xF0, 0x06,
            0x09, 0x04, 0x05, 0x00, 0xE5, 0x00,
        ];
        let raw = build_section(table_id::PMT, 0x2B66, &payload);
        let section = PsiSection::parse_verified(&raw).unwrap();
        let pmt = PmtTable::parse(&section).unwrap();

        assert_eq!(pmt.program_number, 0x2B66);
        assert_eq!(pmt.pcr_pid, 0x0100);
        assert_eq!(pmt.program_ca_descriptors().count(), 1);
        assert_eq!(pmt.streams.len(), 3);

        assert_eq!(pmt.streams[0].stream_type, stream_type::MPEG2_VIDEO);
        assert_eq!(pmt.streams[0].primary_descriptor_tag(), None);

        assert_eq!(pmt.streams[1].elementary_pid, 0x0102);
        assert_eq!(pmt.streams[1].primary_descriptor_tag(), Some(descriptor_tag::AC3));

        assert_eq!(pmt.streams[2].primary_descriptor_tag(), None);
        assert_eq!(pmt.streams[2].ca_descriptors().count(), 1);
    }

    #[test]
    fn test_parse_rejects_other_tables() {
        let raw = build_section(table_id::CAT, 0xFFFF, &[]);
        let section = PsiSection::parse(&raw).unwrap();
        assert_eq!(PmtTable::parse(&section).unwrap_err(), "Not a PMT section");
    }

    #[test]
    fn test_parse_rejects_overlong_es_info() {
        let payload = [0xE1, 0x00, 0xF0, 0x00, 0x02, 0xE1, 0x00, 0xF0, 0x10, 0x00];
        let raw = build_section(table_id::PMT, 1, &payload);
        let section = PsiSection::parse(&raw).unwrap();
        assert_eq!(PmtTable::parse(&section).unwrap_err(), "Invalid ES info length");
    }
}
