//! A library for monitoring and controlling Heatmiser Wi-Fi thermostats
//! (DT/DT-E/PRT/PRT-E/PRTHW/TM1) over their binary TCP protocol.
//!
//! This crate provides three layers:
//!
//! 1. **Protocol Implementation**: frame construction and parsing with the
//!    device's 16-bit checksum ([`protocol`]), the model-dependent decoder
//!    for the device's internal state block ([`dcb`]) and the encoder from
//!    named settings to wire write items ([`settings`]).
//!
//! 2. **Synchronous Client**: [`sync_client::HeatmiserWifi`], a blocking
//!    TCP client that reads decoded status snapshots and applies setting
//!    writes, bounded by a configurable timeout.
//!
//! 3. **Polling Daemon**: [`poll::Poller`], an unattended loop that
//!    classifies *why* heating and hot water are in their current state
//!    (schedule, hold, holiday, manual override), detects changes between
//!    successive snapshots and feeds a [`store::Store`] collaborator. The
//!    weekly-schedule predictor it relies on is exposed in [`schedule`].
//!
//! ## Quick Start
//!
//! ```no_run
//! use heatmiser_wifi_lib::{protocol::Pin, sync_client::HeatmiserWifi};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let pin = Pin::try_from(1234)?;
//!     let mut client = HeatmiserWifi::new("192.168.1.100", pin);
//!
//!     let status = client.read_status()?;
//!     println!(
//!         "{} firmware {}: room temperature {:?}",
//!         status.product.model, status.product.firmware, status.temperatures.internal
//!     );
//!
//!     Ok(())
//! }
//! ```

pub mod dcb;
pub mod error;
pub mod poll;
pub mod protocol;
pub mod schedule;
pub mod settings;
pub mod store;
pub mod sync_client;

pub use error::{Error, Result};
