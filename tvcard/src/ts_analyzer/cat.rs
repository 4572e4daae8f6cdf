//! CAT (Conditional Access Table) parsing.

use super::descriptors::{parse_descriptor_loop, Descriptor};
use super::psi::PsiSection;
use super::{descriptor_tag, table_id};

/// Parsed CAT. Its CA descriptors point at EMM PIDs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatTable {
    pub version_number: u8,
    pub descriptors: Vec<Descriptor>,
}

impl CatTable {
    /// Parse a CAT from a PSI section.
    pub fn parse(section: &PsiSection) -> Result<Self, &'static str> {
        if section.header.table_id != table_id::CAT {
            return Err("Not a CAT section");
        }

        Ok(CatTable {
            version_number: section.header.version_number,
            descriptors: parse_descriptor_loop(section.data),
        })
    }

    /// CA descriptors in the table.
    pub fn ca_descriptors(&self) -> impl Iterator<Item = &Descriptor> {
        self.descriptors
            .iter()
            .filter(|d| d.tag == descriptor_tag::CONDITIONAL_ACCESS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ts_analyzer::psi::build_section;

    #[test]
    fn test_parse_cat() {
        let payload = [
            0x09, 0x04, 0x05, 0x00, 0xE7, 0x00, // Viaccess EMM 0x0700
            0x09, 0x04, 0x17, 0x02, 0xE7, 0x10, // Betacrypt EMM 0x0710
        ];
        let raw = build_section(table_id::CAT, 0xFFFF, &payload);
        let section = PsiSection::parse_verified(&raw).unwrap();
        let cat = CatTable::parse(&section).unwrap();

        assert_eq!(cat.ca_descriptors().count(), 2);
        assert_eq!(cat.descriptors[1].data, vec![0x17, 0x02, 0xE7, 0x10]);
    }

    #[test]
    fn test_empty_cat() {
        let raw = build_section(table_id::CAT, 0xFFFF, &[]);
        let section = PsiSection::parse(&raw).unwrap();
        let cat = CatTable::parse(&section).unwrap();
        assert!(cat.descriptors.is_empty());
    }
}
