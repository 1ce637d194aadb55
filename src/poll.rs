//! The unattended polling loop: read a status snapshot, work out *why* the
//! heating and hot water are in their current state, detect changes against
//! the previous snapshot and hand the results to the storage collaborator.
//!
//! Classification compares the device's target against the schedule
//! predictor, so a target that happens to equal the scheduled one reads as
//! schedule-driven and anything else as a manual override, with holds,
//! holidays and frost protection taking precedence.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{NaiveDateTime, Timelike};

use crate::dcb::{RunMode, Status};
use crate::error::Error;
use crate::schedule;
use crate::store::{EventRecord, LogEntry, PollEvent, SettingsUpdate, Store};
use crate::sync_client::HeatmiserWifi;

/// Why the heating is at its current target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeatingCause {
    /// Device disabled.
    Off,
    /// Holiday, away or frost-protection run mode.
    Holiday,
    /// A temporary override with a countdown is active.
    Hold,
    /// The target matches the scheduled comfort level.
    Comfort,
    /// Pre-heating ahead of a scheduled rise.
    OptimumStart,
    /// None of the above: a manual adjustment.
    Manual,
}

impl std::fmt::Display for HeatingCause {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let name = match self {
            HeatingCause::Off => "off",
            HeatingCause::Holiday => "holiday",
            HeatingCause::Hold => "hold",
            HeatingCause::Comfort => "comfort",
            HeatingCause::OptimumStart => "optimum-start",
            HeatingCause::Manual => "manual",
        };
        f.write_str(name)
    }
}

/// Why the hot water is in its current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaterCause {
    /// Device disabled.
    Off,
    /// The state matches the timer program's prediction.
    Timer,
    /// The state differs from the prediction: a manual override or boost.
    Override,
}

impl std::fmt::Display for WaterCause {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let name = match self {
            WaterCause::Off => "off",
            WaterCause::Timer => "timer",
            WaterCause::Override => "override",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeatingState {
    pub cause: HeatingCause,
    pub target: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaterState {
    pub cause: WaterCause,
    pub on: bool,
}

/// One classified snapshot. Facets a model does not have are absent, so a
/// TM1 never produces heating events. The previous cycle's observation is
/// carried explicitly between cycles rather than hidden in the loop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation {
    pub time: NaiveDateTime,
    pub heating_on: Option<bool>,
    pub heating: Option<HeatingState>,
    pub water: Option<WaterState>,
}

/// Classifies a status snapshot, attributing the heating and hot water
/// state to a cause. Evaluated in precedence order: disabled, then
/// holiday/frost, then hold, then the schedule comparison.
pub fn classify(status: &Status) -> Observation {
    let heating = status.heating.as_ref().map(|heating| {
        if !status.enabled {
            return HeatingState {
                cause: HeatingCause::Off,
                target: 0,
            };
        }
        let frost = status.frostprotect.as_ref();
        if status.runmode == Some(RunMode::Frost) || status.away || status.holiday.enabled {
            return HeatingState {
                cause: HeatingCause::Holiday,
                target: frost.filter(|f| f.enabled).map(|f| f.target).unwrap_or(0),
            };
        }
        if heating.hold_minutes > 0 {
            return HeatingState {
                cause: HeatingCause::Hold,
                target: heating.target,
            };
        }
        let prediction = status.comfort.as_ref().map(|program| {
            schedule::comfort_at(
                program,
                status.program_mode,
                frost.map(|f| f.target).unwrap_or(0),
                status.time,
            )
        });
        let cause = match prediction {
            Some(prediction) if heating.target == prediction.current => HeatingCause::Comfort,
            Some(prediction)
                if prediction.next.is_some_and(|next| {
                    heating.target == next.target && next.target > prediction.current
                }) =>
            {
                HeatingCause::OptimumStart
            }
            _ => HeatingCause::Manual,
        };
        HeatingState {
            cause,
            target: heating.target,
        }
    });

    let water = status.hotwater.as_ref().map(|hotwater| {
        if !status.enabled {
            return WaterState {
                cause: WaterCause::Off,
                on: hotwater.on,
            };
        }
        let predicted = status
            .timer
            .as_ref()
            .map(|program| schedule::timer_state(program, status.program_mode, status.time))
            .unwrap_or(false);
        WaterState {
            cause: if predicted == hotwater.on {
                WaterCause::Timer
            } else {
                WaterCause::Override
            },
            on: hotwater.on,
        }
    });

    Observation {
        time: status.time,
        heating_on: status.heating.as_ref().map(|h| h.on),
        heating,
        water,
    }
}

/// Compares an observation against the previous one and emits one event per
/// changed facet. With no previous observation every present facet emits.
pub fn detect_changes(
    previous: Option<&Observation>,
    current: &Observation,
    temperature: Option<f64>,
) -> Vec<PollEvent> {
    let mut events = Vec::new();
    if let Some(on) = current.heating_on {
        if previous.and_then(|p| p.heating_on) != Some(on) {
            events.push(PollEvent::Heating { on, temperature });
        }
    }
    if let Some(heating) = current.heating {
        if previous.and_then(|p| p.heating) != Some(heating) {
            events.push(PollEvent::HeatingTarget {
                cause: heating.cause,
                target: heating.target,
            });
        }
    }
    if let Some(water) = current.water {
        if previous.and_then(|p| p.water) != Some(water) {
            events.push(PollEvent::HotWater {
                cause: water.cause,
                on: water.on,
            });
        }
    }
    events
}

/// How long to sleep so the next wake lands on schedule. When the interval
/// divides 24 hours evenly, wake times align to interval multiples from
/// midnight; otherwise the interval is used as-is.
pub fn sleep_duration(interval: Duration, now: NaiveDateTime) -> Duration {
    const DAY_SECS: u64 = 24 * 60 * 60;
    let secs = interval.as_secs();
    if secs == 0 || DAY_SECS % secs != 0 {
        return interval;
    }
    let since_midnight = u64::from(now.time().num_seconds_from_midnight());
    let next = (since_midnight / secs + 1) * secs;
    Duration::from_secs(next - since_midnight)
}

/// Drives the polling cycle for one device: the client, the store handle
/// and the previous observation all live here, so distinct devices share
/// no mutable state and their cycles may run on separate threads.
pub struct Poller<S: Store> {
    client: HeatmiserWifi,
    store: S,
    device: String,
    interval: Duration,
    previous: Option<Observation>,
}

impl<S: Store> Poller<S> {
    pub fn new(client: HeatmiserWifi, store: S, interval: Duration) -> Self {
        let device = client.host().to_string();
        Poller {
            client,
            store,
            device,
            interval,
            previous: None,
        }
    }

    /// Runs one `Read → Decode → Classify → DetectChanges → Emit` pass.
    pub fn cycle(&mut self) -> Result<(), Error> {
        let status = self.client.read_status()?;
        let observation = classify(&status);
        let temperature = status.indoor_temperature();
        let events = detect_changes(self.previous.as_ref(), &observation, temperature);

        self.emit(&status, &observation, &events, temperature);

        log::debug!(
            "{}: heating {} hot water {}",
            self.device,
            observation
                .heating
                .map(|h| format!("{} (cause {})", h.target, h.cause))
                .unwrap_or_else(|| "n/a".to_string()),
            observation
                .water
                .map(|w| format!("{} (cause {})", if w.on { "on" } else { "off" }, w.cause))
                .unwrap_or_else(|| "n/a".to_string()),
        );

        self.previous = Some(observation);
        Ok(())
    }

    fn emit(
        &mut self,
        status: &Status,
        observation: &Observation,
        events: &[PollEvent],
        temperature: Option<f64>,
    ) {
        let device = &self.device;
        let settings = SettingsUpdate {
            product: status.product,
            enabled: status.enabled,
            runmode: status.runmode,
            units: status.config.as_ref().map(|c| c.units),
            holiday: status.holiday,
            program_mode: status.program_mode,
        };
        if let Err(e) = self.store.settings_update(device, &settings) {
            log::error!("{device}: settings update failed: {e}");
        }
        if let Some(program) = &status.comfort {
            if let Err(e) = self.store.comfort_update(device, program) {
                log::error!("{device}: comfort update failed: {e}");
            }
        }
        if let Some(program) = &status.timer {
            if let Err(e) = self.store.timer_update(device, program) {
                log::error!("{device}: timer update failed: {e}");
            }
        }

        let comfort_target = status.comfort.as_ref().map(|program| {
            schedule::comfort_at(
                program,
                status.program_mode,
                status.frostprotect.as_ref().map(|f| f.target).unwrap_or(0),
                status.time,
            )
            .current
        });
        let entry = LogEntry {
            time: status.time,
            indoor: temperature,
            heat_target: status.heating.as_ref().map(|h| h.target),
            comfort_target,
        };
        if let Err(e) = self.store.log_insert(device, &entry) {
            log::error!("{device}: log insert failed: {e}");
        }

        for event in events {
            let record = EventRecord {
                time: observation.time,
                event: *event,
            };
            if let Err(e) = self.store.event_insert(device, &record) {
                log::error!("{device}: event insert failed: {e}");
            }
            log::info!("{device}: {}", describe(event));
        }
    }

    /// Polls until `running` clears. Transport and protocol failures are
    /// reported and the loop carries on with the next cycle; validation
    /// errors are bugs and propagate out.
    pub fn run(&mut self, running: &AtomicBool) -> Result<(), Error> {
        while running.load(Ordering::SeqCst) {
            match self.cycle() {
                Ok(()) => {}
                Err(e) if e.is_recoverable() => {
                    log::error!("{}: poll cycle failed: {e}", self.device);
                }
                Err(e) => return Err(e),
            }
            // The shutdown flag is only observed between cycles, never
            // mid-command; sleeping in slices keeps shutdown prompt.
            let mut remaining = sleep_duration(self.interval, chrono::Local::now().naive_local());
            while !remaining.is_zero() && running.load(Ordering::SeqCst) {
                let nap = remaining.min(Duration::from_millis(500));
                std::thread::sleep(nap);
                remaining -= nap;
            }
        }
        Ok(())
    }
}

fn describe(event: &PollEvent) -> String {
    match event {
        PollEvent::Heating { on, temperature } => match temperature {
            Some(t) => format!(
                "heating {} at {t:.1} degrees",
                if *on { "on" } else { "off" }
            ),
            None => format!("heating {}", if *on { "on" } else { "off" }),
        },
        PollEvent::HeatingTarget { cause, target } => {
            format!("heating target {target} ({cause})")
        }
        PollEvent::HotWater { cause, on } => {
            format!("hot water {} ({cause})", if *on { "on" } else { "off" })
        }
    }
}
