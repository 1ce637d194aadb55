//! A console `Store` for daemon mode: log samples go to stdout, reference
//! updates to the trace log. Events are already reported by the poller's
//! own summary lines.

use heatmiser_wifi_lib::dcb::{ComfortEntry, Program, TimerEntry};
use heatmiser_wifi_lib::store::{EventRecord, LogEntry, SettingsUpdate, Store};
use log::trace;
use std::convert::Infallible;

#[derive(Debug, Default)]
pub struct ConsoleStore;

impl Store for ConsoleStore {
    type Error = Infallible;

    fn settings_update(
        &mut self,
        device: &str,
        update: &SettingsUpdate,
    ) -> Result<(), Self::Error> {
        trace!("{device}: settings {update:?}");
        Ok(())
    }

    fn comfort_update(
        &mut self,
        device: &str,
        program: &Program<ComfortEntry>,
    ) -> Result<(), Self::Error> {
        trace!("{device}: comfort program {} day(s)", program.day_count());
        Ok(())
    }

    fn timer_update(
        &mut self,
        device: &str,
        program: &Program<TimerEntry>,
    ) -> Result<(), Self::Error> {
        trace!("{device}: timer program {} day(s)", program.day_count());
        Ok(())
    }

    fn log_insert(&mut self, device: &str, entry: &LogEntry) -> Result<(), Self::Error> {
        let indoor = entry
            .indoor
            .map(|t| format!("{t:.1}"))
            .unwrap_or_else(|| "-".to_string());
        let target = entry
            .heat_target
            .map(|t| t.to_string())
            .unwrap_or_else(|| "-".to_string());
        let comfort = entry
            .comfort_target
            .map(|t| t.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{} {} indoor {} °C, target {} °C, scheduled {} °C",
            entry.time.format("%Y-%m-%d %H:%M:%S"),
            device,
            indoor,
            target,
            comfort
        );
        Ok(())
    }

    fn event_insert(&mut self, device: &str, record: &EventRecord) -> Result<(), Self::Error> {
        trace!("{device}: event {:?} at {}", record.event, record.time);
        Ok(())
    }
}
