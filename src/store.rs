//! The storage collaborator interface the polling daemon feeds.
//!
//! Persistence itself lives outside this crate; the daemon only promises to
//! call these methods once per device per cycle, with no transactional
//! coupling across devices.

use chrono::NaiveDateTime;

use crate::dcb::{
    ComfortEntry, Holiday, Product, Program, ProgramMode, RunMode, TimerEntry, Units,
};
use crate::poll::{HeatingCause, WaterCause};

/// Device identity and configuration snapshot, pushed every cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct SettingsUpdate {
    pub product: Product,
    pub enabled: bool,
    pub runmode: Option<RunMode>,
    pub units: Option<Units>,
    pub holiday: Holiday,
    pub program_mode: ProgramMode,
}

/// One temperature log sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LogEntry {
    /// Device clock at the time of the read.
    pub time: NaiveDateTime,
    /// Reading of the sensor the device controls on.
    pub indoor: Option<f64>,
    /// The device's current heating target.
    pub heat_target: Option<u8>,
    /// What the comfort program says the target should be.
    pub comfort_target: Option<u8>,
}

/// A semantic state change detected between two polling cycles.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PollEvent {
    /// The heating output switched.
    Heating { on: bool, temperature: Option<f64> },
    /// Why the device is heating, or to what, changed.
    HeatingTarget { cause: HeatingCause, target: u8 },
    /// The hot water state or the reason for it changed.
    HotWater { cause: WaterCause, on: bool },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EventRecord {
    /// Device clock at the time of the observation.
    pub time: NaiveDateTime,
    pub event: PollEvent,
}

/// Receives the daemon's per-cycle output. Implementations must tolerate
/// one call of each kind per device per cycle.
pub trait Store {
    type Error: std::error::Error + Send + Sync + 'static;

    fn settings_update(&mut self, device: &str, update: &SettingsUpdate)
        -> Result<(), Self::Error>;

    fn comfort_update(
        &mut self,
        device: &str,
        program: &Program<ComfortEntry>,
    ) -> Result<(), Self::Error>;

    fn timer_update(&mut self, device: &str, program: &Program<TimerEntry>)
        -> Result<(), Self::Error>;

    fn log_insert(&mut self, device: &str, entry: &LogEntry) -> Result<(), Self::Error>;

    fn event_insert(&mut self, device: &str, record: &EventRecord) -> Result<(), Self::Error>;
}
