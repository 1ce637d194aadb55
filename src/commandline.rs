use clap::{Parser, Subcommand};
use clap_verbosity_flag::{Verbosity, WarnLevel};
use heatmiser_wifi_lib::protocol as proto;
use std::time::Duration;

fn parse_pin(s: &str) -> Result<proto::Pin, String> {
    let value = s
        .parse::<u16>()
        .map_err(|e| format!("Invalid access code format: {e}"))?;
    proto::Pin::try_from(value).map_err(|e| e.to_string())
}

fn parse_temperature(s: &str) -> Result<u8, String> {
    s.parse::<u8>()
        .map_err(|e| format!("Invalid temperature value format: {e}"))
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum CliCommands {
    /// Read and display the decoded device status.
    Status {
        /// The thermostat to query, as "host" or "host:port".
        host: String,

        /// Print the status as JSON instead of text.
        #[arg(long)]
        json: bool,
    },

    /// Run in daemon mode: continuously poll one or more thermostats,
    /// classify why heating and hot water are in their current state and
    /// report state changes. Stops cleanly on Ctrl-C.
    #[clap(verbatim_doc_comment)]
    Daemon {
        /// Interval between polls (e.g. "30s", "1min"). When the interval
        /// divides 24 hours evenly, polls align to multiples of it.
        #[arg(value_parser = humantime::parse_duration, short = 'i', long, default_value = "1min", verbatim_doc_comment)]
        poll_interval: Duration,

        /// Thermostats to poll, each as "host" or "host:port".
        #[arg(required = true)]
        hosts: Vec<String>,
    },

    /// Write a single named setting, e.g. "set <HOST> target 21" or
    /// "set <HOST> hotwater off". Read-only configuration is rejected.
    #[clap(verbatim_doc_comment)]
    Set {
        /// The thermostat to write to, as "host" or "host:port".
        host: String,

        /// Setting name: enabled, keylock, runmode, away, frost-target,
        /// target, hotwater or boost.
        #[arg(verbatim_doc_comment)]
        field: String,

        /// The new value.
        value: String,
    },

    /// Hold a temperature for a while, overriding the schedule.
    Hold {
        /// The thermostat to write to, as "host" or "host:port".
        host: String,

        /// Target temperature in whole degrees.
        #[arg(value_parser = parse_temperature)]
        temperature: u8,

        /// How long to hold it (e.g. "90min", "2h"), in whole minutes.
        #[arg(value_parser = humantime::parse_duration)]
        duration: Duration,
    },

    /// Synchronise the device clock with this machine's local time.
    SetTime {
        /// The thermostat to write to, as "host" or "host:port".
        host: String,
    },
}

const fn about_text() -> &'static str {
    "Heatmiser Wi-Fi thermostat CLI - read status, change settings and run a polling daemon."
}

#[derive(Parser, Debug)]
#[command(name="hmtherm", author, version, about=about_text(), long_about = None, propagate_version = true)]
pub struct CliArgs {
    /// Configure verbosity of logging output.
    /// -v for info, -vv for debug, -vvv for trace. Default is off.
    #[command(flatten)]
    pub verbose: Verbosity<WarnLevel>,

    #[command(subcommand)]
    pub command: CliCommands,

    /// The device's 4-digit access code (PIN).
    #[arg(global = true, long, default_value = "0", value_parser = parse_pin)]
    pub pin: proto::Pin,

    /// Socket timeout for connect, send and receive operations.
    /// Examples: "5s", "500ms".
    #[arg(global = true, long, default_value = "5s", value_parser = humantime::parse_duration, verbatim_doc_comment)]
    pub timeout: Duration,
}
