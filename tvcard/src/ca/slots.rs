//! Decode slot assignment.
//!
//! Each slot of a softCAM plugin decrypts at most one service at a time.

use log::debug;
use thiserror::Error;
use tvcard_protocol::{CaPmtCommand, CaPmtListManagementAction};

/// State of one decode slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SlotState {
    #[default]
    Free,
    Decrypting(u16),
}

/// What the caller should do after a slot was selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotDecision {
    /// Send the service to this slot, then call [`SlotTable::mark_decrypting`].
    Decrypt(usize),
    /// The slot stopped decrypting the service.
    Stopped(usize),
    /// Asked to stop a service no slot was decrypting.
    NotDecrypting,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotError {
    #[error("No free decrypt slot")]
    NoFreeSlot,

    #[error("Command {0:?} is not supported")]
    UnsupportedCommand(CaPmtCommand),
}

/// Slot table of one device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotTable {
    slots: Vec<SlotState>,
}

impl SlotTable {
    pub fn new(count: usize) -> Self {
        Self {
            slots: vec![SlotState::Free; count],
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn state(&self, index: usize) -> Option<SlotState> {
        self.slots.get(index).copied()
    }

    /// Pick the slot a CA command applies to.
    ///
    /// Starting the first (or only) service of a list frees every slot and
    /// uses slot 0. Otherwise a slot already decrypting the service is reused
    /// before the first free one.
    pub fn select(
        &mut self,
        service_id: u16,
        list_action: CaPmtListManagementAction,
        command: CaPmtCommand,
    ) -> Result<SlotDecision, SlotError> {
        match command {
            CaPmtCommand::OkMmi | CaPmtCommand::Query => {
                Err(SlotError::UnsupportedCommand(command))
            }
            CaPmtCommand::OkDescrambling if list_action.starts_list() => {
                debug!("Freeing all slots");
                self.reset();
                if self.slots.is_empty() {
                    return Err(SlotError::NoFreeSlot);
                }
                Ok(SlotDecision::Decrypt(0))
            }
            CaPmtCommand::OkDescrambling => {
                if let Some(index) = self.find(service_id) {
                    debug!("Updating slot {} decrypting service 0x{:x}", index, service_id);
                    return Ok(SlotDecision::Decrypt(index));
                }
                self.slots
                    .iter()
                    .position(|s| *s == SlotState::Free)
                    .map(SlotDecision::Decrypt)
                    .ok_or(SlotError::NoFreeSlot)
            }
            CaPmtCommand::NotSelected => match self.find(service_id) {
                Some(index) => {
                    self.slots[index] = SlotState::Free;
                    Ok(SlotDecision::Stopped(index))
                }
                None => {
                    debug!(
                        "Received \"not selected\" for service 0x{:x} that is not being decrypted",
                        service_id
                    );
                    Ok(SlotDecision::NotDecrypting)
                }
            },
        }
    }

    /// Record that `index` now decrypts `service_id`.
    pub fn mark_decrypting(&mut self, index: usize, service_id: u16) {
        if let Some(slot) = self.slots.get_mut(index) {
            *slot = SlotState::Decrypting(service_id);
        }
    }

    /// Put a slot back into `state`, undoing a failed claim.
    pub fn restore(&mut self, index: usize, state: SlotState) {
        if let Some(slot) = self.slots.get_mut(index) {
            *slot = state;
        }
    }

    /// Free every slot.
    pub fn reset(&mut self) {
        self.slots.iter_mut().for_each(|s| *s = SlotState::Free);
    }

    fn find(&self, service_id: u16) -> Option<usize> {
        self.slots
            .iter()
            .position(|s| *s == SlotState::Decrypting(service_id))
    }
}
