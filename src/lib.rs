#![cfg_attr(not(test), no_std)]

// This mod MUST go first, so that the others see its macros.
pub(crate) mod fmt;

pub mod backoff;
pub mod cellular;
pub(crate) mod command;
pub mod config;
pub mod error;
pub mod framer;
pub mod gps;
pub mod hex;
mod module_timing;
pub mod modules;
pub mod power;
pub mod registration;
pub mod uart;
pub mod utilities;

#[cfg(test)]
mod test_helpers;

pub use cellular::{Cellular, Phase, DOWNLOAD_BUFFER_SIZE, TX_BUFFER_SIZE};
pub use config::{CellularConfig, Events, Identity, NoPin, Policy};
pub use error::Error;
pub use gps::GpsInfo;
pub use modules::SimcomVersion;
pub use uart::RxQueue;
pub use utilities::{CellsData, RssiData};
