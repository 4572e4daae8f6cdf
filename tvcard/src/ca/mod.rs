//! Conditional-access PID resolution.
//!
//! Turns a parsed PMT and CAT into a [`ProgramDecodeRequest`]: elementary
//! stream PIDs, a deduplicated CA system table, and the preferred CA system
//! chosen from the preference store.

mod ca_systems;
mod pids;
pub mod preference;
pub mod slots;
pub mod store;

use log::debug;
use tvcard_protocol::{ProgramDecodeRequest, ServiceChannel};

use crate::ts_analyzer::{CatTable, PmtTable};

pub use ca_systems::register_ecm_and_emm_pids;
pub use pids::{classify_stream, register_video_and_audio_pids, StreamCategory};
pub use preference::set_preferred_ca_system_index;
pub use slots::{SlotDecision, SlotError, SlotState, SlotTable};
pub use store::{
    MemoryPreferenceStore, PreferenceConfig, PreferenceStore, StoreError, TomlPreferenceStore,
    PREFERENCES_FILE,
};

/// Outcome of filling a bounded list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Registration {
    /// Entries in the list afterwards.
    pub count: usize,
    /// Something was discovered but did not fit.
    pub truncated: bool,
}

/// A resolved decode request together with its registration outcomes.
#[derive(Debug, Clone)]
pub struct ResolvedProgram {
    pub request: ProgramDecodeRequest,
    pub streams: Registration,
    pub ca_systems: Registration,
    /// The preferred CA system came from configuration.
    pub preference_found: bool,
}

/// Build the decode request for a service.
pub fn resolve_program(
    channel: &ServiceChannel,
    pmt: &PmtTable,
    cat: &CatTable,
    store: &dyn PreferenceStore,
) -> ResolvedProgram {
    let mut request = ProgramDecodeRequest::default();
    let streams = register_video_and_audio_pids(pmt, &mut request);
    request.apply_channel(channel);

    debug!(
        "TSID = {0} (0x{0:x}), SID = {1} (0x{1:x}), PMT PID = {2} (0x{2:x}), PCR PID = {3} (0x{3:x}), \
         service type = {4}, video PID = {5} (0x{5:x}), audio PID = {6} (0x{6:x}), \
         AC3 PID = {7} (0x{7:x}), teletext PID = {8} (0x{8:x})",
        request.transport_stream_id,
        request.service_id,
        request.pmt_pid,
        request.pcr_pid,
        request.service_type,
        request.video_pid,
        request.audio_pid,
        request.ac3_audio_pid,
        request.teletext_pid
    );

    let ca_systems = register_ecm_and_emm_pids(pmt, cat, &mut request);
    let preference_found = set_preferred_ca_system_index(store, &mut request);

    debug!(
        "ECM PID = {0} (0x{0:x}), CA system count = {1}, CA index = {2:?}",
        request.ecm_pid,
        request.ca_systems.len(),
        request.ca_index
    );
    for (i, entry) in request.ca_systems.iter().enumerate() {
        debug!(
            "#{} CA type = 0x{:x}, ECM PID = 0x{:x}, EMM PID = 0x{:x}, provider = 0x{:x}",
            i + 1,
            entry.ca_type,
            entry.ecm_pid,
            entry.emm_pid,
            entry.provider_id
        );
    }

    ResolvedProgram {
        request,
        streams,
        ca_systems,
        preference_found,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ts_analyzer::{descriptor_tag, stream_type, Descriptor, PmtStream};
    use super::store::{ChannelPreference, ProviderPreference};
    use tvcard_protocol::service_type;

    fn ca(ca_system_id: u16, pid: u16) -> Descriptor {
        Descriptor {
            tag: descriptor_tag::CONDITIONAL_ACCESS,
            data: vec![(ca_system_id >> 8) as u8, ca_system_id as u8, 0xE0 | (pid >> 8) as u8, pid as u8],
        }
    }

    fn fixture() -> (ServiceChannel, PmtTable, CatTable) {
        let channel = ServiceChannel {
            name: Some("Sky Cinema".to_string()),
            provider: Some("Sky".to_string()),
            transport_stream_id: 4,
            service_id: 0x000A,
            pmt_pid: 0x0064,
            is_tv: true,
        };
        let pmt = PmtTable {
            program_number: 0x000A,
            version_number: 3,
            pcr_pid: 0x00FF,
            program_info: vec![ca(0x1702, 0x1FF0), ca(0x1833, 0x1FF1)],
            streams: vec![
                PmtStream {
                    stream_type: stream_type::MPEG2_VIDEO,
                    elementary_pid: 0x00FF,
                    descriptors: vec![],
                },
                PmtStream {
                    stream_type: stream_type::MPEG1_AUDIO,
                    elementary_pid: 0x0100,
                    descriptors: vec![ca(0x1702, 0x1FF0)],
                },
            ],
        };
        let cat = CatTable {
            version_number: 0,
            descriptors: vec![ca(0x1833, 0x1FF8)],
        };
        (channel, pmt, cat)
    }

    #[test]
    fn test_resolve_program() {
        let (channel, pmt, cat) = fixture();
        let store = MemoryPreferenceStore::new(Some(PreferenceConfig {
            channels: vec![ChannelPreference {
                tsid: 4,
                sid: 0x000A,
                pmt_pid: 0x0064,
                ecm_pid: 0x1FF1,
                ..Default::default()
            }],
            providers: vec![ProviderPreference { id: 0 }],
            ..Default::default()
        }));

        let resolved = resolve_program(&channel, &pmt, &cat, &store);
        let request = &resolved.request;

        assert!(resolved.preference_found);
        assert_eq!(resolved.streams, Registration { count: 2, truncated: false });
        assert_eq!(resolved.ca_systems, Registration { count: 2, truncated: false });
        assert_eq!(request.name, "Sky Cinema");
        assert_eq!(request.service_type, service_type::DIGITAL_TELEVISION);
        assert_eq!(request.video_pid, 0x00FF);
        assert_eq!(request.audio_pid, 0x0100);
        assert_eq!(request.ca_index, Some(1));
        assert_eq!(request.ecm_pid, 0x1FF1);
        assert_eq!(request.ca_systems.as_slice()[1].emm_pid, 0x1FF8);
    }

    #[test]
    fn test_resolve_without_configuration_uses_first_ecm() {
        let (channel, pmt, cat) = fixture();
        let resolved = resolve_program(&channel, &pmt, &cat, &MemoryPreferenceStore::default());

        assert!(!resolved.preference_found);
        assert_eq!(resolved.request.ca_index, None);
        assert_eq!(resolved.request.ecm_pid, 0x1FF0);
    }
}
