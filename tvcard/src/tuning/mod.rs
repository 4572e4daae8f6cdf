//! Satellite tuning command construction.

mod builder;
mod lnb;
pub mod modulation;

pub use builder::{burst_selector, TuningCommandBuilder};
pub use lnb::{khz_to_mhz, ChannelLnb, LnbParameterSource, LnbSettings};
pub use modulation::ModulationRemap;
