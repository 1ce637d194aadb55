//! Predicts what the weekly programs say a device should be doing at a
//! given moment, and when that next changes.
//!
//! Both lookups share one pattern: fold the timestamp's weekday to a
//! program day index (two days in five-day/weekend mode, seven otherwise),
//! then scan that day's time-ordered entries.

use chrono::{Datelike, NaiveDateTime, Weekday};

use crate::dcb::{ComfortEntry, Program, ProgramMode, TimerEntry};

/// An upcoming scheduled transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NextTarget {
    pub target: u8,
    pub at: NaiveDateTime,
}

impl NextTarget {
    /// Time remaining until the transition.
    pub fn time_until(&self, now: NaiveDateTime) -> chrono::Duration {
        self.at - now
    }
}

/// What the comfort program asks for at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComfortPrediction {
    /// Currently scheduled target temperature.
    pub current: u8,
    /// Next transition; `None` only when the program has no entries at all.
    pub next: Option<NextTarget>,
}

fn day_index(mode: ProgramMode, weekday: Weekday) -> usize {
    match mode {
        ProgramMode::SevenDay => weekday.num_days_from_monday() as usize,
        ProgramMode::FiveTwo => match weekday {
            Weekday::Sat | Weekday::Sun => 1,
            _ => 0,
        },
    }
}

fn day_entries<E>(program: &Program<E>, mode: ProgramMode, weekday: Weekday) -> &[E] {
    program
        .days
        .get(day_index(mode, weekday))
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

/// Looks up the currently scheduled comfort target and the next transition.
///
/// The current target is the last entry at or before `when`'s time of day,
/// falling back to the previous day's final entry, and finally to the frost
/// protection target when the program is empty. The next transition scans
/// forward across day boundaries, wrapping through the week.
pub fn comfort_at(
    program: &Program<ComfortEntry>,
    mode: ProgramMode,
    frost_target: u8,
    when: NaiveDateTime,
) -> ComfortPrediction {
    let tod = when.time();

    let current = day_entries(program, mode, when.weekday())
        .iter()
        .rev()
        .find(|entry| entry.time <= tod)
        .or_else(|| day_entries(program, mode, when.weekday().pred()).last())
        .map(|entry| entry.target)
        .unwrap_or(frost_target);

    let mut next = day_entries(program, mode, when.weekday())
        .iter()
        .find(|entry| entry.time > tod)
        .map(|entry| NextTarget {
            target: entry.target,
            at: when.date().and_time(entry.time),
        });
    if next.is_none() {
        for days_ahead in 1..=7 {
            let date = when.date() + chrono::Duration::days(days_ahead);
            if let Some(entry) = day_entries(program, mode, date.weekday()).first() {
                next = Some(NextTarget {
                    target: entry.target,
                    at: date.and_time(entry.time),
                });
                break;
            }
        }
    }

    ComfortPrediction { current, next }
}

/// Whether the hot water timer program calls for the water to be on at
/// `when`. Intervals are inclusive of their start and exclusive of their
/// end; outside every interval the answer is off.
pub fn timer_state(program: &Program<TimerEntry>, mode: ProgramMode, when: NaiveDateTime) -> bool {
    let tod = when.time();
    day_entries(program, mode, when.weekday())
        .iter()
        .any(|entry| entry.on <= tod && tod < entry.off)
}
