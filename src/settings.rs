//! Encoder from named settings to wire write items.
//!
//! A write request is a list of [`Setting`] values plus a reference
//! [`Status`] — the status supplies the model and the active schedule mode,
//! which decide whether each setting is applicable and where the program
//! regions live. Settings that do not apply to the model are rejected, not
//! silently ignored, and read-only configuration is refused at the
//! name-resolution boundary.

use chrono::{Datelike, NaiveDateTime, Timelike};

use crate::dcb::{
    self, ComfortEntry, Model, Program, ProgramEntry, RunMode, Status, TimerEntry,
    ENTRIES_PER_DAY,
};
use crate::error::ValidationError;
use crate::protocol::WriteItem;

/// Hot water override written to the device. `Auto` returns control to the
/// timer program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HotWaterState {
    Auto,
    On,
    Off,
}

impl HotWaterState {
    fn encode(self) -> u8 {
        match self {
            HotWaterState::Auto => 0,
            HotWaterState::On => 1,
            HotWaterState::Off => 2,
        }
    }
}

/// A writable device setting.
#[derive(Debug, Clone, PartialEq)]
pub enum Setting {
    Enabled(bool),
    KeyLock(bool),
    RunMode(RunMode),
    Away(bool),
    FrostTarget(u8),
    Target(u8),
    /// Temporary override: heat to `target` for `minutes`.
    Hold { target: u8, minutes: u16 },
    Holiday { until: NaiveDateTime, enabled: bool },
    /// Sets the device clock; seconds are not writable.
    Clock(NaiveDateTime),
    HotWater(HotWaterState),
    Boost(u16),
    Comfort(Program<ComfortEntry>),
    Timer(Program<TimerEntry>),
}

impl Setting {
    fn field(&self) -> &'static str {
        match self {
            Setting::Enabled(_) => "enabled",
            Setting::KeyLock(_) => "keylock",
            Setting::RunMode(_) => "runmode",
            Setting::Away(_) => "away",
            Setting::FrostTarget(_) => "frost-target",
            Setting::Target(_) => "target",
            Setting::Hold { .. } => "hold",
            Setting::Holiday { .. } => "holiday",
            Setting::Clock(_) => "clock",
            Setting::HotWater(_) => "hotwater",
            Setting::Boost(_) => "boost",
            Setting::Comfort(_) => "comfort",
            Setting::Timer(_) => "timer",
        }
    }

    fn applicable(&self, model: Model) -> bool {
        let layout = model.layout();
        match self {
            Setting::RunMode(_)
            | Setting::FrostTarget(_)
            | Setting::Target(_)
            | Setting::Hold { .. } => layout.heating,
            Setting::HotWater(_) | Setting::Boost(_) | Setting::Timer(_) => layout.hotwater,
            Setting::Comfort(_) => layout.comfort,
            _ => true,
        }
    }

    /// Resolves a textual `name`/`value` pair to a setting.
    ///
    /// Known-but-read-only names (basic configuration such as units or
    /// calibration) yield [`ValidationError::ReadOnlyField`]; unknown names
    /// yield [`ValidationError::UnknownField`].
    pub fn parse(name: &str, value: &str) -> Result<Setting, ValidationError> {
        match name {
            "enabled" => Ok(Setting::Enabled(parse_bool("enabled", value)?)),
            "keylock" => Ok(Setting::KeyLock(parse_bool("keylock", value)?)),
            "away" => Ok(Setting::Away(parse_bool("away", value)?)),
            "runmode" => match value {
                "heating" => Ok(Setting::RunMode(RunMode::Heating)),
                "frost" => Ok(Setting::RunMode(RunMode::Frost)),
                _ => Err(invalid("runmode", value)),
            },
            "frost-target" => Ok(Setting::FrostTarget(parse_number("frost-target", value)?)),
            "target" => Ok(Setting::Target(parse_number("target", value)?)),
            "hotwater" => match value {
                "auto" => Ok(Setting::HotWater(HotWaterState::Auto)),
                "on" => Ok(Setting::HotWater(HotWaterState::On)),
                "off" => Ok(Setting::HotWater(HotWaterState::Off)),
                _ => Err(invalid("hotwater", value)),
            },
            "boost" => Ok(Setting::Boost(parse_number("boost", value)?)),
            _ => {
                if let Some(&field) = READ_ONLY_FIELDS.iter().find(|&&field| field == name) {
                    Err(ValidationError::ReadOnlyField { field })
                } else {
                    Err(ValidationError::UnknownField(name.to_string()))
                }
            }
        }
    }
}

/// Basic configuration only changeable at the device itself.
const READ_ONLY_FIELDS: [&str; 9] = [
    "units",
    "differential",
    "calibration",
    "sensor",
    "program-mode",
    "optimum-start",
    "output-delay",
    "key-limit",
    "rate-of-change",
];

fn invalid(field: &'static str, value: &str) -> ValidationError {
    ValidationError::InvalidValue {
        field,
        value: value.to_string(),
    }
}

fn parse_bool(field: &'static str, value: &str) -> Result<bool, ValidationError> {
    match value {
        "on" | "true" | "1" | "yes" => Ok(true),
        "off" | "false" | "0" | "no" => Ok(false),
        _ => Err(invalid(field, value)),
    }
}

fn parse_number<T: std::str::FromStr>(
    field: &'static str,
    value: &str,
) -> Result<T, ValidationError> {
    value.parse().map_err(|_| invalid(field, value))
}

const TARGET_MIN: u8 = 5;
const TARGET_MAX: u8 = 35;
const FROST_MIN: u8 = 5;
const FROST_MAX: u8 = 17;
/// Holds and boosts run for at most 99 hours 59 minutes.
const MINUTES_MAX: u16 = 5999;

fn check_range(
    field: &'static str,
    value: i64,
    min: i64,
    max: i64,
) -> Result<(), ValidationError> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(ValidationError::OutOfRange {
            field,
            value,
            min,
            max,
        })
    }
}

fn date_bytes(field: &'static str, when: NaiveDateTime) -> Result<[u8; 5], ValidationError> {
    let year = when.year();
    check_range(field, i64::from(year), 2000, 2255)?;
    Ok([
        (year - 2000) as u8,
        when.month() as u8,
        when.day() as u8,
        when.hour() as u8,
        when.minute() as u8,
    ])
}

fn encode_program<E: ProgramEntry>(
    program: &Program<E>,
    status: &Status,
    offset: usize,
) -> Result<WriteItem, ValidationError> {
    let expected = status.program_mode.day_count();
    if program.day_count() != expected {
        return Err(ValidationError::ProgramDayCount {
            expected,
            actual: program.day_count(),
        });
    }
    let mut bytes = Vec::with_capacity(program.day_count() * ENTRIES_PER_DAY * E::WIRE_LEN);
    for day in &program.days {
        if day.len() > ENTRIES_PER_DAY {
            return Err(ValidationError::TooManyEntries {
                max: ENTRIES_PER_DAY,
                actual: day.len(),
            });
        }
        if day.windows(2).any(|w| w[0].start_time() > w[1].start_time()) {
            return Err(ValidationError::UnorderedEntries);
        }
        for slot in 0..ENTRIES_PER_DAY {
            bytes.extend_from_slice(&E::encode(day.get(slot)));
        }
    }
    Ok(WriteItem::bytes(offset as u16, bytes))
}

/// Converts a list of settings into the ordered write items for the device
/// described by `status`.
///
/// # Errors
///
/// `ValidationError` if any setting is not applicable to the model, a value
/// is out of range, or a program's day count does not match the active
/// schedule mode.
pub fn to_write_items(
    status: &Status,
    settings: &[Setting],
) -> Result<Vec<WriteItem>, ValidationError> {
    let model = status.product.model;
    let layout = model.layout();
    let mut items = Vec::with_capacity(settings.len());
    for setting in settings {
        if !setting.applicable(model) {
            return Err(ValidationError::NotApplicable {
                field: setting.field(),
                model,
            });
        }
        match setting {
            Setting::Enabled(on) => items.push(WriteItem::byte(dcb::OFS_ENABLED as u16, u8::from(*on))),
            Setting::KeyLock(on) => items.push(WriteItem::byte(dcb::OFS_KEYLOCK as u16, u8::from(*on))),
            Setting::RunMode(mode) => items.push(WriteItem::byte(
                dcb::OFS_RUNMODE as u16,
                match mode {
                    RunMode::Heating => 0,
                    RunMode::Frost => 1,
                },
            )),
            Setting::Away(away) => items.push(WriteItem::byte(dcb::OFS_AWAY as u16, u8::from(*away))),
            Setting::FrostTarget(target) => {
                check_range(
                    "frost-target",
                    i64::from(*target),
                    i64::from(FROST_MIN),
                    i64::from(FROST_MAX),
                )?;
                items.push(WriteItem::byte(dcb::OFS_FROST_TARGET as u16, *target));
            }
            Setting::Target(target) => {
                check_range(
                    "target",
                    i64::from(*target),
                    i64::from(TARGET_MIN),
                    i64::from(TARGET_MAX),
                )?;
                items.push(WriteItem::byte(dcb::OFS_HEAT_TARGET as u16, *target));
            }
            Setting::Hold { target, minutes } => {
                check_range(
                    "hold target",
                    i64::from(*target),
                    i64::from(TARGET_MIN),
                    i64::from(TARGET_MAX),
                )?;
                check_range("hold minutes", i64::from(*minutes), 0, i64::from(MINUTES_MAX))?;
                items.push(WriteItem::word(dcb::OFS_HOLD_MINUTES as u16, *minutes));
                items.push(WriteItem::byte(dcb::OFS_HEAT_TARGET as u16, *target));
            }
            Setting::Holiday { until, enabled } => {
                let mut bytes = date_bytes("holiday", *until)?.to_vec();
                bytes.push(u8::from(*enabled));
                items.push(WriteItem::bytes(dcb::OFS_HOLIDAY as u16, bytes));
            }
            Setting::Clock(when) => {
                // Five bytes only: the seconds byte is not writable.
                items.push(WriteItem::bytes(
                    dcb::OFS_CLOCK as u16,
                    date_bytes("clock", *when)?.to_vec(),
                ));
            }
            Setting::HotWater(state) => {
                items.push(WriteItem::byte(dcb::OFS_HOTWATER_STATE as u16, state.encode()));
            }
            Setting::Boost(minutes) => {
                check_range("boost", i64::from(*minutes), 0, i64::from(MINUTES_MAX))?;
                items.push(WriteItem::word(dcb::OFS_BOOST_MINUTES as u16, *minutes));
            }
            Setting::Comfort(program) => {
                let offset = layout
                    .comfort_offset(status.program_mode)
                    .expect("applicability checked above");
                items.push(encode_program(program, status, offset)?);
            }
            Setting::Timer(program) => {
                let offset = layout
                    .timer_offset(status.program_mode)
                    .expect("applicability checked above");
                items.push(encode_program(program, status, offset)?);
            }
        }
    }
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dcb::tests::dcb_template;
    use assert_matches::assert_matches;
    use chrono::NaiveTime;

    fn status(model_code: u8, seven_day: bool) -> Status {
        Status::decode(&dcb_template(model_code, seven_day)).unwrap()
    }

    fn entry(hour: u32, minute: u32, target: u8) -> ComfortEntry {
        ComfortEntry {
            time: NaiveTime::from_hms_opt(hour, minute, 0).unwrap(),
            target,
        }
    }

    #[test]
    fn enabled_and_keylock_offsets() {
        let items = to_write_items(
            &status(2, false),
            &[Setting::Enabled(true), Setting::KeyLock(false)],
        )
        .unwrap();
        assert_eq!(items, vec![WriteItem::byte(21, 1), WriteItem::byte(22, 0)]);
    }

    #[test]
    fn hold_writes_minutes_then_target() {
        let items = to_write_items(
            &status(2, false),
            &[Setting::Hold {
                target: 22,
                minutes: 90,
            }],
        )
        .unwrap();
        assert_eq!(items, vec![WriteItem::word(38, 90), WriteItem::byte(41, 22)]);
    }

    #[test]
    fn clock_write_skips_seconds() {
        let when = chrono::NaiveDate::from_ymd_opt(2024, 6, 3)
            .unwrap()
            .and_hms_opt(9, 15, 42)
            .unwrap();
        let items = to_write_items(&status(2, false), &[Setting::Clock(when)]).unwrap();
        assert_eq!(items, vec![WriteItem::bytes(42, vec![24, 6, 3, 9, 15])]);
    }

    #[test]
    fn holiday_write_carries_enable_flag() {
        let until = chrono::NaiveDate::from_ymd_opt(2025, 1, 2)
            .unwrap()
            .and_hms_opt(12, 30, 59)
            .unwrap();
        let items = to_write_items(
            &status(2, false),
            &[Setting::Holiday {
                until,
                enabled: true,
            }],
        )
        .unwrap();
        assert_eq!(items, vec![WriteItem::bytes(25, vec![25, 1, 2, 12, 30, 1])]);
    }

    #[test]
    fn hotwater_rejected_on_heating_only_model() {
        assert_matches!(
            to_write_items(&status(2, false), &[Setting::HotWater(HotWaterState::On)]),
            Err(ValidationError::NotApplicable {
                field: "hotwater",
                model: Model::Prt
            })
        );
    }

    #[test]
    fn heating_settings_rejected_on_timer_model() {
        assert_matches!(
            to_write_items(&status(5, false), &[Setting::Target(21)]),
            Err(ValidationError::NotApplicable {
                field: "target",
                model: Model::Tm1
            })
        );
    }

    #[test]
    fn target_range_enforced() {
        assert_matches!(
            to_write_items(&status(2, false), &[Setting::Target(40)]),
            Err(ValidationError::OutOfRange { field: "target", value: 40, .. })
        );
    }

    #[test]
    fn comfort_program_day_count_must_match_mode() {
        let program = Program {
            days: vec![vec![entry(7, 0, 20)]; 7],
        };
        assert_matches!(
            to_write_items(&status(2, false), &[Setting::Comfort(program)]),
            Err(ValidationError::ProgramDayCount {
                expected: 2,
                actual: 7
            })
        );
    }

    #[test]
    fn comfort_program_pads_short_days_with_sentinel() {
        let program = Program {
            days: vec![vec![entry(7, 0, 20), entry(22, 0, 16)], vec![]],
        };
        let items = to_write_items(&status(2, false), &[Setting::Comfort(program)]).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].offset, 48);
        assert_eq!(items[0].bytes.len(), 24);
        assert_eq!(&items[0].bytes[..6], &[7, 0, 20, 22, 0, 16]);
        // Remaining weekday slots and the whole weekend day are sentinels.
        assert_eq!(&items[0].bytes[6..9], &[24, 0, 16]);
        assert_eq!(items[0].bytes[12], 24);
    }

    #[test]
    fn comfort_program_writes_to_seven_day_offset() {
        let program = Program {
            days: vec![vec![entry(7, 0, 20)]; 7],
        };
        let items = to_write_items(&status(2, true), &[Setting::Comfort(program)]).unwrap();
        assert_eq!(items[0].offset, 72);
        assert_eq!(items[0].bytes.len(), 84);
    }

    #[test]
    fn unordered_day_rejected() {
        let program = Program {
            days: vec![vec![entry(22, 0, 16), entry(7, 0, 20)], vec![]],
        };
        assert_matches!(
            to_write_items(&status(2, false), &[Setting::Comfort(program)]),
            Err(ValidationError::UnorderedEntries)
        );
    }

    #[test]
    fn parse_resolves_names() {
        assert_eq!(Setting::parse("enabled", "on").unwrap(), Setting::Enabled(true));
        assert_eq!(
            Setting::parse("runmode", "frost").unwrap(),
            Setting::RunMode(RunMode::Frost)
        );
        assert_eq!(Setting::parse("target", "21").unwrap(), Setting::Target(21));
        assert_eq!(
            Setting::parse("hotwater", "auto").unwrap(),
            Setting::HotWater(HotWaterState::Auto)
        );
    }

    #[test]
    fn parse_rejects_read_only_fields() {
        assert_matches!(
            Setting::parse("calibration", "3"),
            Err(ValidationError::ReadOnlyField { field: "calibration" })
        );
        assert_matches!(
            Setting::parse("program-mode", "1"),
            Err(ValidationError::ReadOnlyField { .. })
        );
    }

    #[test]
    fn parse_rejects_unknown_field() {
        assert_matches!(
            Setting::parse("nonsense", "1"),
            Err(ValidationError::UnknownField(_))
        );
    }

    #[test]
    fn parse_rejects_bad_value() {
        assert_matches!(
            Setting::parse("enabled", "maybe"),
            Err(ValidationError::InvalidValue { field: "enabled", .. })
        );
    }
}
