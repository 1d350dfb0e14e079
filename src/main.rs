//! SunSpec CLI
//!
//! A command-line interface (CLI) application for reading SunSpec models from
//! solar inverters, e.g. SolarEdge, via Modbus TCP.
//!
//! This tool allows users to:
//! - Read the common model (identity) and the inverter model (measurements).
//! - Read only the current AC power.
//! - Run in a continuous daemon mode to poll the inverter model and either
//!   print it to the console or publish it to an MQTT broker.
//!
//! The CLI leverages the `sunspec_lib` crate for register maps and client operations.

use anyhow::{Context, Result};
use clap::Parser;
use flexi_logger::{Logger, LoggerHandle};
use log::*;
use std::convert::Infallible;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::{panic, time::Duration};
use sunspec_lib::{
    client::{SunSpecClient, TcpTransport},
    mapping::{Record, RecordSink},
    models,
};

mod commandline;
mod mqtt;

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

/// Renders one `name  value` line per field, names padded to 16 columns.
fn format_record(record: &Record) -> String {
    record
        .iter()
        .map(|(name, value)| format!("{name:16}  {value}\n"))
        .collect()
}

/// Prints records to stdout, followed by an empty line.
struct ConsoleSink;

impl RecordSink for ConsoleSink {
    type Error = Infallible;

    fn publish(&mut self, record: &Record) -> Result<(), Infallible> {
        println!("{}", format_record(record));
        Ok(())
    }
}

macro_rules! print_model {
    ($client:expr, $read:ident, $what:literal) => {
        let record = $client
            .$read()
            .with_context(|| concat!("Cannot read ", $what))?;
        println!("{}", format_record(&record));
    };
}

fn connect(address: &str, unit_id: u8, timeout: Duration) -> Result<SunSpecClient<TcpTransport>> {
    info!("Attempting to connect via TCP to {address} (unit {unit_id})...");
    let transport = TcpTransport::connect(address, timeout)
        .with_context(|| format!("Failed to connect to Modbus TCP device at {address}"))?;
    Ok(SunSpecClient::new(transport, unit_id))
}

/// Sleeps for `duration` or until `running` is cleared.
fn sleep_while_running(running: &AtomicBool, duration: Duration) {
    const SLICE: Duration = Duration::from_millis(250);
    let mut remaining = duration;
    while !remaining.is_zero() && running.load(Ordering::SeqCst) {
        let step = remaining.min(SLICE);
        std::thread::sleep(step);
        remaining -= step;
    }
}

/// One daemon cycle: fresh connection, inverter model, disconnect.
fn poll_inverter(args: &commandline::CliArgs) -> Result<Record> {
    let mut client = connect(&args.address, args.unit_id, args.timeout)?;
    let record = client
        .read_inverter()
        .with_context(|| "Cannot read inverter model")?;
    trace!("Inverter model: {record:?}");
    Ok(record)
}

fn run_daemon<S>(
    running: &AtomicBool,
    args: &commandline::CliArgs,
    poll_interval: Duration,
    sink: &mut S,
) where
    S: RecordSink,
    S::Error: Into<anyhow::Error>,
{
    while running.load(Ordering::SeqCst) {
        debug!("Daemon: Reading inverter model...");
        match poll_inverter(args) {
            Ok(record) => {
                if let Err(error) = sink.publish(&record) {
                    error!("Cannot publish record: {:#}", error.into());
                }
            }
            Err(error) => error!("Polling failed: {error:#}"),
        }
        sleep_while_running(running, args.delay.max(poll_interval));
    }
    info!("Daemon stopped");
}

fn main() -> Result<()> {
    let args = commandline::CliArgs::parse();

    let _log_handle = logging_init(args.verbose.log_level_filter());
    info!(
        "SunSpec CLI started. Log level: {}",
        args.verbose.log_level_filter()
    );

    models::validate_builtin_maps().with_context(|| "Built-in register maps are invalid")?;

    match &args.command {
        commandline::CliCommands::Daemon {
            poll_interval,
            output,
        } => {
            info!("Starting daemon mode: output={output:?}, interval={poll_interval:?}");
            let running = Arc::new(AtomicBool::new(true));
            let r = running.clone();
            ctrlc::set_handler(move || {
                r.store(false, Ordering::SeqCst);
                trace!("Received Ctrl-C")
            })
            .with_context(|| "Error setting Ctrl-C handler")?;

            match output {
                commandline::DaemonOutput::Console => {
                    run_daemon(&running, &args, *poll_interval, &mut ConsoleSink);
                }
                commandline::DaemonOutput::Mqtt { config_file } => {
                    let config = mqtt::MqttConfig::load(config_file)?;
                    let mut publisher = mqtt::MqttPublisher::connect(config)?;
                    run_daemon(&running, &args, *poll_interval, &mut publisher);
                    info!("Stopping...");
                    publisher.disconnect()?;
                }
            }
        }
        commandline::CliCommands::Read => {
            info!("Executing: Read Common and Inverter Model");
            let mut client = connect(&args.address, args.unit_id, args.timeout)?;
            print_model!(client, read_common, "common model");
            std::thread::sleep(args.delay);
            print_model!(client, read_inverter, "inverter model");
        }
        commandline::CliCommands::ReadCommon => {
            info!("Executing: Read Common Model");
            let mut client = connect(&args.address, args.unit_id, args.timeout)?;
            print_model!(client, read_common, "common model");
        }
        commandline::CliCommands::ReadInverter => {
            info!("Executing: Read Inverter Model");
            let mut client = connect(&args.address, args.unit_id, args.timeout)?;
            print_model!(client, read_inverter, "inverter model");
        }
        commandline::CliCommands::ReadAcPower => {
            info!("Executing: Read AC Power");
            let mut client = connect(&args.address, args.unit_id, args.timeout)?;
            print_model!(client, read_ac_power, "AC power");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sunspec_lib::models::AC_POWER_MODEL;
    use sunspec_lib::registers::Registers;

    #[test]
    fn records_are_aligned() {
        let octets = [0x4d, 0x5f, 0xff, 0xff];
        let regs = Registers::new(40083, &octets).unwrap();
        let record = sunspec_lib::mapping::resolve(&regs, &AC_POWER_MODEL).unwrap();
        assert_eq!(format_record(&record), "I_AC_Power        1980.7 W\n");
    }

    #[test]
    fn sleep_stops_when_cleared() {
        let running = AtomicBool::new(false);
        let started = std::time::Instant::now();
        sleep_while_running(&running, Duration::from_secs(60));
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
