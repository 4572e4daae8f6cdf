//! Preferred CA system selection.
//!
//! Preferences are looked up through an ordered list of strategies, each a
//! pure function of the configuration and the request. The first strategy
//! that matches decides.

use std::collections::HashSet;

use log::{debug, info};
use tvcard_protocol::ProgramDecodeRequest;

use super::store::{
    CaTypePreference, ChannelPreference, PreferenceConfig, PreferenceStore, ProviderPreference,
    StoreError,
};

/// A configuration entry matching one of the request's CA systems.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreferenceMatch {
    /// Index into `ca_systems`.
    pub index: usize,
    /// EMM PID override from a channel entry.
    pub emm_pid: Option<u16>,
}

/// A preference lookup strategy.
pub type Strategy = fn(&PreferenceConfig, &ProgramDecodeRequest) -> Option<PreferenceMatch>;

/// Lookup strategies, most specific first.
pub const STRATEGIES: [(&str, Strategy); 3] = [
    ("channel", match_channel),
    ("provider", match_provider),
    ("CA type", match_ca_type),
];

/// Channel entry for this service whose ECM PID is one of the CA systems.
pub fn match_channel(
    config: &PreferenceConfig,
    request: &ProgramDecodeRequest,
) -> Option<PreferenceMatch> {
    config
        .channels
        .iter()
        .filter(|c| {
            c.tsid == request.transport_stream_id
                && c.sid == request.service_id
                && c.pmt_pid == request.pmt_pid
        })
        .find_map(|c| {
            let index = request.ca_systems.iter().position(|e| e.ecm_pid == c.ecm_pid)?;
            Some(PreferenceMatch {
                index,
                emm_pid: c.emm_pid,
            })
        })
}

/// First configured provider present among the CA systems.
pub fn match_provider(
    config: &PreferenceConfig,
    request: &ProgramDecodeRequest,
) -> Option<PreferenceMatch> {
    config.providers.iter().find_map(|p| {
        let index = request.ca_systems.iter().position(|e| e.provider_id == p.id)?;
        Some(PreferenceMatch {
            index,
            emm_pid: None,
        })
    })
}

/// First configured CA type present among the CA systems.
pub fn match_ca_type(
    config: &PreferenceConfig,
    request: &ProgramDecodeRequest,
) -> Option<PreferenceMatch> {
    config.ca_types.iter().find_map(|t| {
        let index = request.ca_systems.iter().position(|e| e.ca_type == t.id)?;
        Some(PreferenceMatch {
            index,
            emm_pid: None,
        })
    })
}

/// Run the strategies in order. Returns the name of the level that matched.
pub fn resolve(
    config: &PreferenceConfig,
    request: &ProgramDecodeRequest,
) -> Option<(&'static str, PreferenceMatch)> {
    STRATEGIES
        .iter()
        .find_map(|&(level, strategy)| strategy(config, request).map(|m| (level, m)))
}

/// Make the matched CA system the preferred one.
pub fn apply_match(request: &mut ProgramDecodeRequest, m: PreferenceMatch) {
    let Some(entry) = request.ca_systems.get_mut(m.index) else {
        return;
    };
    if let Some(emm_pid) = m.emm_pid {
        entry.emm_pid = emm_pid;
    }
    request.ecm_pid = entry.ecm_pid;
    request.ca_index = Some(m.index as u8);
}

/// Append configuration stubs for a service nothing matched.
///
/// Adds one channel entry (its comment lists the candidate ECM PIDs) plus
/// one entry per distinct provider and CA type of the request.
pub fn fill_out(config: &mut PreferenceConfig, request: &ProgramDecodeRequest) {
    let candidates: Vec<String> = request
        .ca_systems
        .iter()
        .filter(|e| e.ecm_pid != 0)
        .map(|e| e.ecm_pid.to_string())
        .collect();

    config.channels.push(ChannelPreference {
        tsid: request.transport_stream_id,
        sid: request.service_id,
        pmt_pid: request.pmt_pid,
        ecm_pid: request.ecm_pid,
        emm_pid: None,
        comment: Some(format!(
            "Channel \"{}\", possible ECM PID values = {{{}}}.",
            request.name,
            candidates.join(", ")
        )),
    });

    let mut providers = HashSet::new();
    let mut ca_types = HashSet::new();
    for entry in &request.ca_systems {
        if providers.insert(entry.provider_id) {
            config.providers.push(ProviderPreference {
                id: entry.provider_id,
            });
        }
        if ca_types.insert(entry.ca_type) {
            config.ca_types.push(CaTypePreference { id: entry.ca_type });
        }
    }
}

/// Choose the preferred CA system of `request` from the store.
///
/// Store failures are logged and treated as "no configuration"; the request
/// then keeps its default ECM PID. Returns true if configuration matched.
pub fn set_preferred_ca_system_index(
    store: &dyn PreferenceStore,
    request: &mut ProgramDecodeRequest,
) -> bool {
    debug!("Identifying primary ECM PID");
    match try_set_preferred(store, request) {
        Ok(found) => found,
        Err(e) => {
            debug!("Failed to load or update CA preferences: {}", e);
            false
        }
    }
}

fn try_set_preferred(
    store: &dyn PreferenceStore,
    request: &mut ProgramDecodeRequest,
) -> Result<bool, StoreError> {
    let loaded = store.load()?;
    let mut config = loaded.clone().unwrap_or_default();

    if loaded.is_some() {
        if let Some((level, m)) = resolve(&config, request) {
            debug!("Found {} configuration", level);
            apply_match(request, m);
            return Ok(true);
        }
    }

    debug!("No CA preference configuration found");
    match config.fill_out {
        None => {
            config.fill_out = Some(false);
            store.save(&config)?;
        }
        Some(true) => {
            info!("Adding preference stubs for service 0x{:x}", request.service_id);
            fill_out(&mut config, request);
            store.save(&config)?;
        }
        Some(false) => {}
    }
    Ok(false)
}
