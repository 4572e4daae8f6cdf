//! DiSEqC tuning and softCAM conditional access for DVB-S tuners.
//!
//! - [`tuning`] builds Genpix tuning and DiSEqC commands from channel parameters.
//! - [`ts_analyzer`] parses PMT and CAT sections and their CA descriptors.
//! - [`ca`] resolves a service's elementary stream and ECM/EMM PIDs into a
//!   decode request and picks the preferred CA system.
//! - [`device`] defines device capabilities and implements the Genpix tuner
//!   and the MD-API plugin on top of them.

pub mod ca;
pub mod config;
pub mod device;
pub mod dump;
pub mod logging;
pub mod ts_analyzer;
pub mod tuning;
