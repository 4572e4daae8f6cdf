//! ECM and EMM PID discovery.

use std::collections::HashSet;

use log::debug;
use tvcard_protocol::{CaSystemEntry, CaSystemTable, ProgramDecodeRequest};

use crate::dump::hex_dump;
use crate::ts_analyzer::{CaDescriptor, CatTable, Descriptor, PmtTable};

use super::Registration;

/// Collect the CA systems of a service into `request.ca_systems`.
///
/// ECM PIDs come from the PMT, program level first, then per stream; a PID
/// seen before is skipped and the first one becomes the request's default
/// ECM PID. EMM PIDs from the CAT are linked to an existing entry with the
/// same CA type and provider, or else added as EMM-only entries.
pub fn register_ecm_and_emm_pids(
    pmt: &PmtTable,
    cat: &CatTable,
    request: &mut ProgramDecodeRequest,
) -> Registration {
    debug!("Registering ECM and EMM details");
    request.ca_systems.clear();

    let mut collector = EcmCollector {
        table: &mut request.ca_systems,
        seen: HashSet::new(),
        default_ecm_pid: None,
        truncated: false,
        discovered: 0,
    };

    debug!("PMT program CA descriptors...");
    for descriptor in pmt.program_ca_descriptors() {
        collector.add_descriptor(descriptor);
    }

    debug!("PMT elementary stream CA descriptors...");
    for stream in &pmt.streams {
        for descriptor in stream.ca_descriptors() {
            collector.add_descriptor(descriptor);
        }
    }

    let default_ecm_pid = collector.default_ecm_pid;
    let mut truncated = collector.truncated;
    let mut discovered = collector.discovered;

    debug!("CAT CA descriptors...");
    for descriptor in cat.ca_descriptors() {
        let Some(cad) = decode_or_dump(descriptor) else {
            continue;
        };
        for &(pid, provider) in &cad.pids {
            discovered += 1;
            debug!(
                "EMM #{} CA system ID = 0x{:x}, PID = 0x{:x}, provider = 0x{:x}",
                discovered, cad.ca_system_id, pid, provider
            );

            let linked = request
                .ca_systems
                .iter_mut()
                .find(|e| e.ca_type == cad.ca_system_id && e.provider_id == provider);
            if let Some(entry) = linked {
                debug!("  linking to ECM 0x{:x}", entry.ecm_pid);
                entry.emm_pid = pid;
                continue;
            }

            let entry = CaSystemEntry {
                ca_type: cad.ca_system_id,
                ecm_pid: 0,
                emm_pid: pid,
                provider_id: provider,
            };
            if request.ca_systems.push(entry).is_ok() {
                debug!("  adding");
            } else {
                truncated = true;
            }
        }
    }

    if let Some(pid) = default_ecm_pid {
        request.ecm_pid = pid;
    }
    if truncated {
        debug!("CA system table full, unable to register all PIDs");
    }

    Registration {
        count: request.ca_systems.len(),
        truncated,
    }
}

/// Adds ECM entries while remembering which PIDs were already seen.
struct EcmCollector<'a> {
    table: &'a mut CaSystemTable,
    seen: HashSet<u16>,
    default_ecm_pid: Option<u16>,
    truncated: bool,
    discovered: usize,
}

impl EcmCollector<'_> {
    fn add_descriptor(&mut self, descriptor: &Descriptor) {
        let Some(cad) = decode_or_dump(descriptor) else {
            return;
        };

        for &(pid, provider) in &cad.pids {
            self.discovered += 1;
            debug!(
                "ECM #{} CA system ID = 0x{:x}, PID = 0x{:x}, provider = 0x{:x}",
                self.discovered, cad.ca_system_id, pid, provider
            );

            if self.seen.contains(&pid) {
                debug!("  already seen");
                continue;
            }

            let entry = CaSystemEntry {
                ca_type: cad.ca_system_id,
                ecm_pid: pid,
                emm_pid: 0,
                provider_id: provider,
            };
            if self.table.push(entry).is_err() {
                self.truncated = true;
                continue;
            }

            debug!("  adding");
            self.seen.insert(pid);
            self.default_ecm_pid.get_or_insert(pid);
        }
    }
}

fn decode_or_dump(descriptor: &Descriptor) -> Option<CaDescriptor> {
    match CaDescriptor::decode(descriptor) {
        Ok(cad) => Some(cad),
        Err(e) => {
            debug!("Invalid CA descriptor: {}\n{}", e, hex_dump(&descriptor.to_bytes()));
            None
        }
    }
}
