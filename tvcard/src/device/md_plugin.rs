//! MD-API softCAM plugin.
//!
//! Each decode slot is one MD-API filter with its own plugin directory
//! (`<name><slot index>`). A slot descrambles one service at a time.

use std::path::Path;

use log::{debug, warn};
use parking_lot::Mutex;
use tvcard_protocol::{
    encode_pid_list_record, encode_program_record, CaPmtCommand, CaPmtListManagementAction,
    ServiceChannel,
};

use crate::ca::{
    resolve_program, PreferenceStore, ResolvedProgram, SlotDecision, SlotState, SlotTable,
};
use crate::ts_analyzer::{CatTable, PmtTable};

use super::card_config::{self, CARDS_FILE};
use super::{ConditionalAccessProvider, DecodeFilter, DeviceError};

#[derive(Debug)]
struct Interface {
    open: bool,
    slots: SlotTable,
}

/// Conditional access through MD-API decode filters.
#[derive(Debug)]
pub struct MdPluginDevice<F, S> {
    filters: Vec<F>,
    store: S,
    interface: Mutex<Interface>,
}

impl<F: DecodeFilter, S: PreferenceStore> MdPluginDevice<F, S> {
    /// Use `filters` as decode slots, pointing each at `<prefix><index>`.
    pub fn new(prefix: &str, filters: Vec<F>, store: S) -> Result<Self, DeviceError> {
        if filters.is_empty() {
            debug!("MD plugin: plugin is not enabled");
            return Err(DeviceError::Disabled);
        }

        for (i, filter) in filters.iter().enumerate() {
            filter.set_plugins_directory(&format!("{}{}", prefix, i))?;
        }

        debug!("MD plugin: plugin is enabled for {} decoding slot(s)", filters.len());
        let slots = SlotTable::new(filters.len());
        Ok(Self {
            filters,
            store,
            interface: Mutex::new(Interface { open: false, slots }),
        })
    }

    /// Set up the plugin for the tuner at `device_path`.
    ///
    /// `config_dir` holds `cards.toml`; without it there is no plugin. The
    /// tuner's card entry decides how many filters `make_filter` creates.
    pub fn initialise(
        config_dir: &Path,
        device_path: &str,
        filter_name: &str,
        store: S,
        make_filter: impl FnMut(usize) -> F,
    ) -> Result<Self, DeviceError> {
        debug!("MD plugin: initialising device");

        if device_path.is_empty() {
            return Err(DeviceError::NotConfigured(
                "tuner device path is not set".to_string(),
            ));
        }
        if !config_dir.is_dir() {
            debug!("MD plugin: plugin not configured");
            return Err(DeviceError::NotConfigured(format!(
                "{} does not exist",
                config_dir.display()
            )));
        }

        let card = card_config::lookup_or_create(
            &config_dir.join(CARDS_FILE),
            device_path,
            filter_name,
        )?;
        let filters = (0..card.slot_count).map(make_filter).collect();
        Self::new(&card.name, filters, store)
    }

    pub fn slot_count(&self) -> usize {
        self.filters.len()
    }

    pub fn slot_state(&self, index: usize) -> Option<SlotState> {
        self.interface.lock().slots.state(index)
    }

    pub fn filters(&self) -> &[F] {
        &self.filters
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

impl<F: DecodeFilter, S: PreferenceStore> ConditionalAccessProvider for MdPluginDevice<F, S> {
    fn open_interface(&self) -> Result<(), DeviceError> {
        debug!("MD plugin: open conditional access interface");
        let mut interface = self.interface.lock();
        if interface.open {
            debug!("MD plugin: interface is already open");
            return Err(DeviceError::AlreadyOpen);
        }
        interface.open = true;
        Ok(())
    }

    fn close_interface(&self) -> Result<(), DeviceError> {
        debug!("MD plugin: close conditional access interface");
        self.interface.lock().open = false;
        Ok(())
    }

    /// The filters can only be reset by rebuilding the graph.
    fn reset_interface(&self) -> Result<bool, DeviceError> {
        debug!("MD plugin: reset conditional access interface");
        Ok(true)
    }

    fn is_interface_ready(&self) -> bool {
        let interface = self.interface.lock();
        interface.open && !interface.slots.is_empty()
    }

    fn send_ca_command(
        &self,
        channel: &ServiceChannel,
        list_action: CaPmtListManagementAction,
        command: CaPmtCommand,
        pmt: Option<&PmtTable>,
        cat: Option<&CatTable>,
    ) -> Result<(), DeviceError> {
        debug!(
            "MD plugin: send conditional access command, list action = {:?}, command = {:?}",
            list_action, command
        );

        check_command(&self.interface.lock(), command)?;
        let Some(pmt) = pmt else {
            debug!("MD plugin: PMT not supplied");
            return Ok(());
        };
        let Some(cat) = cat else {
            debug!("MD plugin: CAT not supplied");
            return Ok(());
        };

        let Some(claim) = self.claim_slot(channel.service_id, list_action, command)? else {
            return Ok(());
        };
        let resolved = resolve_program(channel, pmt, cat, &self.store);
        self.change_channel(claim, channel.service_id, &resolved)
    }
}

/// A slot reserved for a service, with the state to restore if the filter
/// rejects it.
#[derive(Debug, Clone, Copy)]
struct SlotClaim {
    index: usize,
    previous: SlotState,
}

fn check_command(interface: &Interface, command: CaPmtCommand) -> Result<(), DeviceError> {
    if !interface.open {
        debug!("MD plugin: interface not opened");
        return Err(DeviceError::NotInitialised);
    }
    if matches!(command, CaPmtCommand::OkMmi | CaPmtCommand::Query) {
        debug!("MD plugin: command type {:?} is not supported", command);
        return Err(DeviceError::UnsupportedCommand(command));
    }
    Ok(())
}

impl<F: DecodeFilter, S: PreferenceStore> MdPluginDevice<F, S> {
    /// Send a program that was already resolved, e.g. one the caller also
    /// prints. Slot handling is the same as
    /// [`ConditionalAccessProvider::send_ca_command`].
    pub fn send_resolved(
        &self,
        channel: &ServiceChannel,
        list_action: CaPmtListManagementAction,
        command: CaPmtCommand,
        resolved: &ResolvedProgram,
    ) -> Result<(), DeviceError> {
        debug!(
            "MD plugin: send resolved program, list action = {:?}, command = {:?}",
            list_action, command
        );
        check_command(&self.interface.lock(), command)?;
        match self.claim_slot(channel.service_id, list_action, command)? {
            Some(claim) => self.change_channel(claim, channel.service_id, resolved),
            None => Ok(()),
        }
    }

    /// Pick the slot for a command and reserve it for `service_id`, so a
    /// concurrent command cannot take it while the filter is called.
    fn claim_slot(
        &self,
        service_id: u16,
        list_action: CaPmtListManagementAction,
        command: CaPmtCommand,
    ) -> Result<Option<SlotClaim>, DeviceError> {
        let mut interface = self.interface.lock();
        check_command(&interface, command)?;

        let index = match interface.slots.select(service_id, list_action, command) {
            Ok(SlotDecision::Decrypt(index)) => index,
            Ok(SlotDecision::Stopped(index)) => {
                debug!("MD plugin: slot {} stopped decrypting", index);
                return Ok(None);
            }
            Ok(SlotDecision::NotDecrypting) => return Ok(None),
            Err(e) => {
                debug!("MD plugin: {}", e);
                return Err(e.into());
            }
        };
        let previous = interface.slots.state(index).ok_or(DeviceError::NoFreeSlot)?;
        interface.slots.mark_decrypting(index, service_id);
        Ok(Some(SlotClaim { index, previous }))
    }

    /// Hand the program to the claimed slot's filter. The interface lock is
    /// only taken again to undo the claim on failure.
    fn change_channel(
        &self,
        claim: SlotClaim,
        service_id: u16,
        resolved: &ResolvedProgram,
    ) -> Result<(), DeviceError> {
        if resolved.streams.truncated {
            warn!("MD plugin: too many elementary streams, some PIDs will not be decrypted");
        }
        if resolved.ca_systems.truncated {
            warn!("MD plugin: too many CA systems, some ECM/EMM PIDs were dropped");
        }

        let result = match self.filters.get(claim.index) {
            Some(filter) => {
                let program = encode_program_record(&resolved.request);
                if filter.supports_extended() {
                    let pids = encode_pid_list_record(&resolved.request.pids);
                    filter.change_channel_ex(&program, &pids)
                } else {
                    filter.change_channel(&program)
                }
            }
            None => Err(DeviceError::NoFreeSlot),
        };

        match result {
            Ok(()) => {
                debug!("MD plugin: slot {} decrypting service 0x{:x}", claim.index, service_id);
                Ok(())
            }
            Err(e) => {
                debug!("MD plugin: failed to change channel, {}", e);
                self.interface.lock().slots.restore(claim.index, claim.previous);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, OnceLock, Weak};

    use crate::ca::{MemoryPreferenceStore, PreferenceConfig, StoreError};
    use crate::ts_analyzer::{descriptor_tag, stream_type, Descriptor, PmtStream};
    use tvcard_protocol::{DeviceStatus, PID_LIST_RECORD_SIZE, PROGRAM_RECORD_SIZE};
    use CaPmtCommand::*;
    use CaPmtListManagementAction::*;

    #[derive(Debug, Default)]
    struct MockFilter {
        extended: bool,
        fail: bool,
        directory: Mutex<Option<String>>,
        calls: Mutex<Vec<(usize, usize)>>,
    }

    impl DecodeFilter for MockFilter {
        fn set_plugins_directory(&self, directory: &str) -> Result<(), DeviceError> {
            *self.directory.lock() = Some(directory.to_string());
            Ok(())
        }

        fn supports_extended(&self) -> bool {
            self.extended
        }

        fn change_channel(&self, program: &[u8]) -> Result<(), DeviceError> {
            self.calls.lock().push((program.len(), 0));
            if self.fail {
                return Err(DeviceError::Rejected(DeviceStatus(-1)));
            }
            Ok(())
        }

        fn change_channel_ex(&self, program: &[u8], pids: &[u8]) -> Result<(), DeviceError> {
            self.calls.lock().push((program.len(), pids.len()));
            Ok(())
        }
    }

    fn channel(service_id: u16) -> ServiceChannel {
        ServiceChannel {
            name: Some("Test".to_string()),
            provider: None,
            transport_stream_id: 1,
            service_id,
            pmt_pid: 0x100,
            is_tv: true,
        }
    }

    fn tables() -> (PmtTable, CatTable) {
        let pmt = PmtTable {
            program_number: 1,
            version_number: 0,
            pcr_pid: 0x101,
            program_info: vec![Descriptor {
                tag: descriptor_tag::CONDITIONAL_ACCESS,
                data: vec![0x06, 0x04, 0xE1, 0x10],
            }],
            streams: vec![PmtStream {
                stream_type: stream_type::MPEG2_VIDEO,
                elementary_pid: 0x101,
                descriptors: vec![],
            }],
        };
        (pmt, CatTable::default())
    }

    fn device(filters: Vec<MockFilter>) -> MdPluginDevice<MockFilter, MemoryPreferenceStore> {
        let device = MdPluginDevice::new("SkyWalker", filters, MemoryPreferenceStore::default()).unwrap();
        device.open_interface().unwrap();
        device
    }

    #[test]
    fn test_new_sets_plugin_directories() {
        let device = device(vec![MockFilter::default(), MockFilter::default()]);
        let dirs: Vec<Option<String>> = device.filters().iter().map(|f| f.directory.lock().clone()).collect();
        assert_eq!(dirs, vec![Some("SkyWalker0".to_string()), Some("SkyWalker1".to_string())]);
        assert!(device.is_interface_ready());
        assert!(device.reset_interface().unwrap());
    }

    #[test]
    fn test_no_filters_is_disabled() {
        assert!(matches!(
            MdPluginDevice::<MockFilter, _>::new("x", vec![], MemoryPreferenceStore::default()),
            Err(DeviceError::Disabled)
        ));
    }

    #[test]
    fn test_interface_must_be_open() {
        let device = MdPluginDevice::new("x", vec![MockFilter::default()], MemoryPreferenceStore::default()).unwrap();
        let (pmt, cat) = tables();
        assert!(!device.is_interface_ready());
        assert!(matches!(
            device.send_ca_command(&channel(1), Only, OkDescrambling, Some(&pmt), Some(&cat)),
            Err(DeviceError::NotInitialised)
        ));

        device.open_interface().unwrap();
        assert!(matches!(device.open_interface(), Err(DeviceError::AlreadyOpen)));
        device.close_interface().unwrap();
        assert!(!device.is_interface_ready());
    }

    #[test]
    fn test_missing_tables_are_noop() {
        let device = device(vec![MockFilter::default()]);
        let (pmt, _) = tables();
        device.send_ca_command(&channel(1), Only, OkDescrambling, None, None).unwrap();
        device.send_ca_command(&channel(1), Only, OkDescrambling, Some(&pmt), None).unwrap();
        assert!(device.filters()[0].calls.lock().is_empty());
        assert_eq!(device.slot_state(0), Some(SlotState::Free));
    }

    #[test]
    fn test_unsupported_command_checked_first() {
        let device = device(vec![MockFilter::default()]);
        assert!(matches!(
            device.send_ca_command(&channel(1), Only, Query, None, None),
            Err(DeviceError::UnsupportedCommand(Query))
        ));
    }

    #[test]
    fn test_decrypt_and_slot_exhaustion() {
        let device = device(vec![MockFilter::default()]);
        let (pmt, cat) = tables();

        device.send_ca_command(&channel(0xA), Only, OkDescrambling, Some(&pmt), Some(&cat)).unwrap();
        assert_eq!(device.slot_state(0), Some(SlotState::Decrypting(0xA)));
        assert_eq!(device.filters()[0].calls.lock().as_slice(), &[(PROGRAM_RECORD_SIZE, 0)]);

        assert!(matches!(
            device.send_ca_command(&channel(0xB), More, OkDescrambling, Some(&pmt), Some(&cat)),
            Err(DeviceError::NoFreeSlot)
        ));
        device.send_ca_command(&channel(0xC), More, NotSelected, Some(&pmt), Some(&cat)).unwrap();
        assert_eq!(device.slot_state(0), Some(SlotState::Decrypting(0xA)));

        device.send_ca_command(&channel(0xA), Update, NotSelected, Some(&pmt), Some(&cat)).unwrap();
        assert_eq!(device.slot_state(0), Some(SlotState::Free));
    }

    #[test]
    fn test_extended_filter_gets_pid_list() {
        let device = device(vec![MockFilter {
            extended: true,
            ..Default::default()
        }]);
        let (pmt, cat) = tables();
        device.send_ca_command(&channel(1), First, OkDescrambling, Some(&pmt), Some(&cat)).unwrap();
        assert_eq!(
            device.filters()[0].calls.lock().as_slice(),
            &[(PROGRAM_RECORD_SIZE, PID_LIST_RECORD_SIZE)]
        );
    }

    #[test]
    fn test_failed_change_keeps_slot_free() {
        let device = device(vec![MockFilter {
            fail: true,
            ..Default::default()
        }]);
        let (pmt, cat) = tables();
        assert!(matches!(
            device.send_ca_command(&channel(1), Only, OkDescrambling, Some(&pmt), Some(&cat)),
            Err(DeviceError::Rejected(_))
        ));
        assert_eq!(device.slot_state(0), Some(SlotState::Free));
    }

    /// Reads the slot table from inside `load`, which deadlocks if the
    /// interface lock is held while the program is resolved.
    #[derive(Default)]
    struct ReentrantStore {
        device: OnceLock<Weak<MdPluginDevice<MockFilter, ReentrantStore>>>,
        seen: Mutex<Vec<Option<SlotState>>>,
    }

    impl PreferenceStore for ReentrantStore {
        fn load(&self) -> Result<Option<PreferenceConfig>, StoreError> {
            if let Some(device) = self.device.get().and_then(Weak::upgrade) {
                self.seen.lock().push(device.slot_state(0));
            }
            Ok(None)
        }

        fn save(&self, _config: &PreferenceConfig) -> Result<(), StoreError> {
            Ok(())
        }
    }

    #[test]
    fn test_program_resolved_outside_interface_lock() {
        let device = Arc::new(
            MdPluginDevice::new("x", vec![MockFilter::default()], ReentrantStore::default()).unwrap(),
        );
        assert!(device.store().device.set(Arc::downgrade(&device)).is_ok());
        device.open_interface().unwrap();
        let (pmt, cat) = tables();

        device.send_ca_command(&channel(7), Only, OkDescrambling, Some(&pmt), Some(&cat)).unwrap();
        // The slot is already reserved while the store is read.
        assert_eq!(device.store().seen.lock().as_slice(), &[Some(SlotState::Decrypting(7))]);
        assert_eq!(device.slot_state(0), Some(SlotState::Decrypting(7)));
    }

    #[test]
    fn test_send_resolved_skips_store() {
        let device = device(vec![MockFilter::default()]);
        let (pmt, cat) = tables();
        let other = MemoryPreferenceStore::default();
        let resolved = resolve_program(&channel(3), &pmt, &cat, &other);

        device.send_resolved(&channel(3), Only, OkDescrambling, &resolved).unwrap();
        assert_eq!(device.slot_state(0), Some(SlotState::Decrypting(3)));
        assert_eq!(device.filters()[0].calls.lock().as_slice(), &[(PROGRAM_RECORD_SIZE, 0)]);
        assert!(device.store().load().unwrap().is_none());

        device.close_interface().unwrap();
        assert!(matches!(
            device.send_resolved(&channel(3), Only, OkDescrambling, &resolved),
            Err(DeviceError::NotInitialised)
        ));
    }

    #[test]
    fn test_failed_update_keeps_previous_service() {
        let device = device(vec![MockFilter {
            fail: true,
            ..Default::default()
        }]);
        let (pmt, cat) = tables();
        device.interface.lock().slots.mark_decrypting(0, 0xA);

        assert!(device
            .send_ca_command(&channel(0xA), Update, OkDescrambling, Some(&pmt), Some(&cat))
            .is_err());
        assert_eq!(device.slot_state(0), Some(SlotState::Decrypting(0xA)));
    }

    #[test]
    fn test_initialise_from_card_config() {
        let dir = tempfile::tempdir().unwrap();
        fs_write(
            &dir.path().join(CARDS_FILE),
            "[[cards]]\nname = \"Dish\"\ndevice_path = \"tuner0\"\nenable_mdapi = 2\n",
        );

        let device = MdPluginDevice::initialise(
            dir.path(),
            "tuner0",
            "SkyWalker",
            MemoryPreferenceStore::default(),
            |_| MockFilter::default(),
        )
        .unwrap();
        assert_eq!(device.slot_count(), 2);
        assert_eq!(device.filters()[1].directory.lock().as_deref(), Some("Dish1"));

        let disabled = MdPluginDevice::initialise(
            &dir.path().join("missing"),
            "tuner0",
            "SkyWalker",
            MemoryPreferenceStore::default(),
            |_| MockFilter::default(),
        );
        assert!(matches!(disabled, Err(DeviceError::NotConfigured(_))));
    }

    fn fs_write(path: &Path, contents: &str) {
        std::fs::write(path, contents).unwrap();
    }
}
