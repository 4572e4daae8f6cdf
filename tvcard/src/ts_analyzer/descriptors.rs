//! Descriptor parsing for PSI tables.
//!
//! Only the conditional access descriptor is decoded in full; the rest are
//! kept as raw tag/data pairs so streams can be classified by tag.

use super::descriptor_tag;

/// A raw descriptor from a descriptor loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Descriptor {
    pub tag: u8,
    /// Descriptor body (without tag and length bytes).
    pub data: Vec<u8>,
}

impl Descriptor {
    /// Re-serialise the descriptor including its two header bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut raw = Vec::with_capacity(self.data.len() + 2);
        raw.push(self.tag);
        raw.push(self.data.len() as u8);
        raw.extend_from_slice(&self.data);
        raw
    }
}

/// Parse descriptors from a descriptor loop.
///
/// A truncated trailing descriptor ends the loop.
pub fn parse_descriptor_loop(data: &[u8]) -> Vec<Descriptor> {
    let mut descriptors = Vec::new();
    let mut offset = 0;

    while offset + 2 <= data.len() {
        let tag = data[offset];
        let length = data[offset + 1] as usize;
        offset += 2;

        if offset + length > data.len() {
            break;
        }

        descriptors.push(Descriptor {
            tag,
            data: data[offset..offset + length].to_vec(),
        });
        offset += length;
    }

    descriptors
}

/// Viaccess private data tag carrying the provider ID.
const VIACCESS_PROVIDER_TAG: u8 = 0x14;

/// Conditional access descriptor (0x09).
///
/// Besides the CA PID in the descriptor header, some CA systems list
/// further PIDs in their private data, each with its own provider ID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaDescriptor {
    pub ca_system_id: u16,
    /// PID to provider ID, in discovery order. The first entry is the
    /// descriptor's own CA PID; a PID never appears twice.
    pub pids: Vec<(u16, u32)>,
}

impl CaDescriptor {
    /// Decode a conditional access descriptor.
    pub fn decode(descriptor: &Descriptor) -> Result<Self, &'static str> {
        if descriptor.tag != descriptor_tag::CONDITIONAL_ACCESS {
            return Err("Not a CA descriptor");
        }
        let data = &descriptor.data;
        if data.len() < 4 {
            return Err("CA descriptor too short");
        }

        let ca_system_id = ((data[0] as u16) << 8) | data[1] as u16;
        let ca_pid = ((data[2] as u16 & 0x1F) << 8) | data[3] as u16;
        let private_data = &data[4..];

        let mut cad = CaDescriptor {
            ca_system_id,
            pids: Vec::new(),
        };

        match ca_system_id & 0xFF00 {
            // Seca/Mediaguard: extra (PID, provider) pairs.
            0x0100 => {
                cad.insert(ca_pid, 0);
                for entry in private_data.chunks_exact(4) {
                    let pid = ((entry[0] as u16 & 0x1F) << 8) | entry[1] as u16;
                    let provider = ((entry[2] as u32) << 8) | entry[3] as u32;
                    cad.insert(pid, provider);
                }
            }
            // Viaccess: provider in a TLV list.
            0x0500 => {
                let provider = viaccess_provider(private_data)?;
                cad.insert(ca_pid, provider.unwrap_or(0));
            }
            _ => cad.insert(ca_pid, 0),
        }

        Ok(cad)
    }

    /// The descriptor's own CA PID.
    pub fn ca_pid(&self) -> u16 {
        self.pids.first().map(|&(pid, _)| pid).unwrap_or(0)
    }

    fn insert(&mut self, pid: u16, provider: u32) {
        if !self.pids.iter().any(|&(p, _)| p == pid) {
            self.pids.push((pid, provider));
        }
    }
}

/// Find the first provider TLV in Viaccess private data.
fn viaccess_provider(mut data: &[u8]) -> Result<Option<u32>, &'static str> {
    while data.len() >= 2 {
        let tag = data[0];
        let length = data[1] as usize;
        if data.len() < 2 + length {
            return Err("Truncated Viaccess private data");
        }
        let value = &data[2..2 + length];
        if tag == VIACCESS_PROVIDER_TAG && length >= 3 {
            let provider =
                ((value[0] as u32) << 16) | ((value[1] as u32) << 8) | value[2] as u32;
            return Ok(Some(provider & 0xFF_FFF0));
        }
        data = &data[2 + length..];
    }
    Ok(None)
}
