//! Heatmiser Wi-Fi thermostat CLI
//!
//! A command-line interface (CLI) application for monitoring and
//! controlling Heatmiser Wi-Fi thermostats (DT/DT-E/PRT/PRT-E/PRTHW/TM1)
//! over their binary TCP protocol.
//!
//! This tool allows users to:
//! - Read and display the full decoded device status, as text or JSON.
//! - Change writable settings (target, run mode, hot water, key lock, ...).
//! - Apply a temporary temperature hold.
//! - Synchronise the device clock.
//! - Run in a continuous daemon mode that polls one or more thermostats,
//!   classifies why heating and hot water are in their current state and
//!   reports state changes.
//!
//! The CLI leverages the `heatmiser_wifi_lib` crate for protocol
//! definitions and client operations.

use anyhow::{bail, Context, Result};
use clap::Parser;
use flexi_logger::{Logger, LoggerHandle};
use heatmiser_wifi_lib::dcb::Status;
use heatmiser_wifi_lib::poll::Poller;
use heatmiser_wifi_lib::protocol::Pin;
use heatmiser_wifi_lib::settings::Setting;
use heatmiser_wifi_lib::sync_client::HeatmiserWifi;
use log::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::{panic, time::Duration};

mod commandline;
mod console;

fn logging_init(loglevel: LevelFilter) -> LoggerHandle {
    let log_handle = Logger::try_with_env_or_str(loglevel.as_str())
        .expect("Cannot init logging")
        .start()
        .expect("Cannot start logging");

    panic::set_hook(Box::new(|panic_info| {
        let (filename, line, column) = panic_info
            .location()
            .map(|loc| (loc.file(), loc.line(), loc.column()))
            .unwrap_or(("<unknown_file>", 0, 0));

        let cause_str = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            *s
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.as_str()
        } else {
            "<unknown_panic_cause>"
        };

        error!(
            target: "panic",
            "Thread '{}' panicked at '{}': {}:{} - Cause: {}",
            std::thread::current().name().unwrap_or("<unnamed>"),
            filename,
            line,
            column,
            cause_str
        );
    }));
    log_handle
}

/// Splits "host" or "host:port" into its parts.
fn parse_host(spec: &str) -> Result<(String, Option<u16>)> {
    match spec.rsplit_once(':') {
        Some((host, port)) => {
            let port = port
                .parse::<u16>()
                .with_context(|| format!("Invalid port in device address '{spec}'"))?;
            Ok((host.to_string(), Some(port)))
        }
        None => Ok((spec.to_string(), None)),
    }
}

fn create_client(spec: &str, pin: Pin, timeout: Duration) -> Result<HeatmiserWifi> {
    let (host, port) = parse_host(spec)?;
    let mut client = HeatmiserWifi::new(host, pin);
    if let Some(port) = port {
        client.set_port(port);
    }
    client.set_timeout(timeout);
    Ok(client)
}

fn format_optional_temperature(value: Option<f64>) -> String {
    value
        .map(|t| format!("{t:.1} °C"))
        .unwrap_or_else(|| "-".to_string())
}

fn print_status(status: &Status) {
    println!(
        "Product: {} ({}), firmware {}",
        status.product.model, status.product.vendor, status.product.firmware
    );
    println!("Device time: {}", status.time.format("%Y-%m-%d %H:%M:%S"));
    println!(
        "Power: {}, key lock {}",
        if status.enabled { "on" } else { "off" },
        if status.keylock { "on" } else { "off" }
    );
    if let Some(runmode) = status.runmode {
        println!("Run mode: {runmode}");
    }
    match (status.holiday.enabled, status.holiday.until) {
        (true, Some(until)) => println!("Holiday until {}", until.format("%Y-%m-%d %H:%M")),
        _ => println!("Holiday: off"),
    }
    println!(
        "Temperatures: internal {}, remote {}, floor {}",
        format_optional_temperature(status.temperatures.internal),
        format_optional_temperature(status.temperatures.remote),
        format_optional_temperature(status.temperatures.floor),
    );
    if let Some(heating) = &status.heating {
        let hold = if heating.hold_minutes > 0 {
            format!(", hold {} min remaining", heating.hold_minutes)
        } else {
            String::new()
        };
        println!(
            "Heating: {}, target {} °C{}",
            if heating.on { "on" } else { "off" },
            heating.target,
            hold
        );
    }
    if let Some(frost) = &status.frostprotect {
        println!(
            "Frost protection: {}, target {} °C",
            if frost.enabled { "on" } else { "off" },
            frost.target
        );
    }
    if let Some(floor) = &status.floorlimit {
        println!(
            "Floor limit: {} °C ({}{})",
            floor.limit,
            if floor.enabled { "enabled" } else { "disabled" },
            if floor.limiting { ", limiting now" } else { "" }
        );
    }
    if let Some(hotwater) = &status.hotwater {
        let boost = if hotwater.boost_minutes > 0 {
            format!(", boost {} min remaining", hotwater.boost_minutes)
        } else {
            String::new()
        };
        println!(
            "Hot water: {}{}",
            if hotwater.on { "on" } else { "off" },
            boost
        );
    }
    println!("Schedule mode: {}", status.program_mode);
    if let Some(code) = status.error_code {
        println!("Device error code: {code:#04x}");
    }
}

fn handle_daemon(
    hosts: &[String],
    pin: Pin,
    timeout: Duration,
    poll_interval: Duration,
) -> Result<()> {
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
        trace!("Received Ctrl-C");
    })
    .expect("Error setting Ctrl-C handler");

    info!(
        "Starting daemon: {} device(s), poll interval {poll_interval:?}",
        hosts.len()
    );

    let mut handles = Vec::with_capacity(hosts.len());
    for host in hosts {
        let client = create_client(host, pin, timeout)?;
        let mut poller = Poller::new(client, console::ConsoleStore, poll_interval);
        let running = running.clone();
        let handle = std::thread::Builder::new()
            .name(host.clone())
            .spawn(move || poller.run(&running))
            .with_context(|| format!("Cannot spawn polling thread for {host}"))?;
        handles.push((host.clone(), handle));
    }

    let mut failed = false;
    for (host, handle) in handles {
        match handle.join() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                error!("{host}: polling loop aborted: {e}");
                failed = true;
            }
            Err(_) => {
                error!("{host}: polling thread panicked");
                failed = true;
            }
        }
    }
    if failed {
        bail!("One or more polling loops aborted");
    }
    info!("Stopping...");
    Ok(())
}

fn main() -> Result<()> {
    let args = commandline::CliArgs::parse();

    let _log_handle = logging_init(args.verbose.log_level_filter());
    info!(
        "Heatmiser CLI started. Log level: {}",
        args.verbose.log_level_filter()
    );

    match &args.command {
        commandline::CliCommands::Status { host, json } => {
            info!("Executing: Read Status from {host}");
            let mut client = create_client(host, args.pin, args.timeout)?;
            let status = client
                .read_status()
                .with_context(|| format!("Cannot read status from {host}"))?;
            if *json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&status).context("Cannot serialise status")?
                );
            } else {
                print_status(&status);
            }
        }
        commandline::CliCommands::Daemon {
            poll_interval,
            hosts,
        } => {
            handle_daemon(hosts, args.pin, args.timeout, *poll_interval)?;
        }
        commandline::CliCommands::Set { host, field, value } => {
            info!("Executing: Set {field}={value} on {host}");
            let setting = Setting::parse(field, value)?;
            let mut client = create_client(host, args.pin, args.timeout)?;
            client
                .update(&[setting])
                .with_context(|| format!("Cannot write {field} to {host}"))?;
            println!("{field} set to {value} successfully.");
        }
        commandline::CliCommands::Hold {
            host,
            temperature,
            duration,
        } => {
            let minutes = u16::try_from(duration.as_secs() / 60).unwrap_or(u16::MAX);
            info!("Executing: Hold {temperature} °C for {minutes} min on {host}");
            let mut client = create_client(host, args.pin, args.timeout)?;
            client
                .update(&[Setting::Hold {
                    target: *temperature,
                    minutes,
                }])
                .with_context(|| format!("Cannot apply hold to {host}"))?;
            println!("Holding {temperature} °C for {minutes} minute(s).");
        }
        commandline::CliCommands::SetTime { host } => {
            let now = chrono::Local::now().naive_local();
            info!("Executing: Set device clock on {host} to {now}");
            let mut client = create_client(host, args.pin, args.timeout)?;
            client
                .update(&[Setting::Clock(now)])
                .with_context(|| format!("Cannot set clock on {host}"))?;
            println!("Device clock set to {}.", now.format("%Y-%m-%d %H:%M"));
        }
    }

    Ok(())
}
