//! PSI (Program Specific Information) section parsing.
//!
//! Handles the common section header and the trailing CRC.

use bytes::Buf;

/// Header fields shared by PSI tables. Short-form sections only carry the
/// first three.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PsiHeader {
    pub table_id: u8,
    pub section_syntax_indicator: bool,
    /// Bytes following the length field, CRC included.
    pub section_length: u16,
    /// Program number for a PMT.
    pub table_id_extension: u16,
    pub version_number: u8,
    pub current_next_indicator: bool,
    pub section_number: u8,
    pub last_section_number: u8,
}

/// A parsed PSI section borrowing its payload from the raw buffer.
#[derive(Debug, Clone)]
pub struct PsiSection<'a> {
    pub header: PsiHeader,
    /// Section payload (after the header, before the CRC).
    pub data: &'a [u8],
    pub crc32: u32,
}

impl<'a> PsiSection<'a> {
    /// Parse a section starting at its table ID byte.
    ///
    /// Bytes after the section (stuffing, further sections) are ignored.
    pub fn parse(data: &'a [u8]) -> Result<Self, &'static str> {
        let mut reader = data;
        if reader.remaining() < 3 {
            return Err("Section too short for header");
        }

        let table_id = reader.get_u8();
        let flags_and_length = reader.get_u16();
        let syntax = flags_and_length & 0x8000 != 0;
        let section_length = flags_and_length & 0x0FFF;
        if section_length < 4 {
            return Err("Section length too small");
        }
        let end = 3 + usize::from(section_length);
        if data.len() < end {
            return Err("Incomplete section data");
        }

        let mut header = PsiHeader {
            table_id,
            section_syntax_indicator: syntax,
            section_length,
            table_id_extension: 0,
            version_number: 0,
            current_next_indicator: true,
            section_number: 0,
            last_section_number: 0,
        };
        if syntax {
            if end < 12 {
                return Err("Section too short for extended header");
            }
            header.table_id_extension = reader.get_u16();
            let version = reader.get_u8();
            header.version_number = (version >> 1) & 0x1F;
            header.current_next_indicator = version & 0x01 != 0;
            header.section_number = reader.get_u8();
            header.last_section_number = reader.get_u8();
        }

        let payload_start = data.len() - reader.remaining();
        let crc_start = end - 4;
        let crc32 = (&data[crc_start..end]).get_u32();

        Ok(PsiSection {
            header,
            data: &data[payload_start..crc_start],
            crc32,
        })
    }

    /// Parse a section and reject it when its CRC does not match.
    pub fn parse_verified(data: &'a [u8]) -> Result<Self, &'static str> {
        let section = Self::parse(data)?;
        if !section.verify_crc(data) {
            return Err("CRC mismatch");
        }
        Ok(section)
    }

    /// Check the stored CRC against the section bytes it was parsed from.
    pub fn verify_crc(&self, raw: &[u8]) -> bool {
        raw.get(..self.total_length() - 4)
            .is_some_and(|covered| crc32_mpeg2(covered) == self.crc32)
    }

    /// Header, payload and CRC.
    pub fn total_length(&self) -> usize {
        3 + usize::from(self.header.section_length)
    }
}

/// CRC-32/MPEG-2: polynomial 0x04C11DB7, initial value all ones, no reflection.
pub fn crc32_mpeg2(data: &[u8]) -> u32 {
    static TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut n = 0;
        while n < 256 {
            let mut crc = (n as u32) << 24;
            let mut j = 0;
            while j < 8 {
                if crc & 0x8000_0000 != 0 {
                    crc = (crc << 1) ^ 0x04C1_1DB7;
                } else {
                    crc <<= 1;
                }
                j += 1;
            }
            table[n] = crc;
            n += 1;
        }
        table
    };

    data.iter().fold(0xFFFF_FFFFu32, |crc, &byte| {
        (crc << 8) ^ TABLE[((crc >> 24) ^ byte as u32) as usize]
    })
}

/// Build a long-form section around a payload, appending a valid CRC.
#[cfg(test)]
pub(crate) fn build_section(table_id: u8, table_id_extension: u16, payload: &[u8]) -> Vec<u8> {
    let section_length = 5 + payload.len() + 4;
    let mut section = vec![
        table_id,
        0xB0 | ((section_length >> 8) as u8 & 0x0F),
        section_length as u8,
        (table_id_extension >> 8) as u8,
        table_id_extension as u8,
        0xC1, // version 0, current
        0x00,
        0x00,
    ];
    section.extend_from_slice(payload);
    let crc = crc32_mpeg2(&section);
    section.extend_from_slice(&crc.to_be_bytes());
    section
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crc32_empty() {
        assert_eq!(crc32_mpeg2(&[]), 0xFFFF_FFFF);
    }

    #[test]
    fn test_crc32_known_pat() {
        // PAT with a single program 1 -> PMT PID 0x0100.
        let pat = [
            0x00, 0xB0, 0x0D, 0x00, 0x01, 0xC1, 0x00, 0x00, 0x00, 0x01, 0xE1, 0x00,
        ];
        let mut section = pat.to_vec();
        section.extend_from_slice(&crc32_mpeg2(&pat).to_be_bytes());
        assert_eq!(crc32_mpeg2(&section), 0);
    }

    #[test]
    fn test_parse_long_section() {
        let raw = build_section(0x02, 0x1234, &[0xE1, 0x00, 0xF0, 0x00]);
        let section = PsiSection::parse_verified(&raw).unwrap();

        assert_eq!(section.header.table_id, 0x02);
        assert!(section.header.section_syntax_indicator);
        assert_eq!(section.header.table_id_extension, 0x1234);
        assert!(section.header.current_next_indicator);
        assert_eq!(section.data, &[0xE1, 0x00, 0xF0, 0x00]);
        assert_eq!(section.total_length(), raw.len());
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert_eq!(PsiSection::parse(&[0x02]).unwrap_err(), "Section too short for header");
        assert_eq!(
            PsiSection::parse(&[0x02, 0xB0, 0x20, 0x00]).unwrap_err(),
            "Incomplete section data"
        );

        let mut raw = build_section(0x01, 0xFFFF, &[]);
        let last = raw.len() - 1;
        raw[last] ^= 0xFF;
        assert_eq!(PsiSection::parse_verified(&raw).unwrap_err(), "CRC mismatch");
    }
}
