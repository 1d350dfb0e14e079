use crate::mqtt::MqttConfig;
use clap::{Parser, Subcommand};
use clap_verbosity_flag::{Verbosity, WarnLevel};
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

/// Modbus TCP port of SolarEdge inverters.
pub const DEFAULT_PORT: u16 = 1502;

/// Appends [`DEFAULT_PORT`] to addresses without a port.
fn parse_address(s: &str) -> Result<String, String> {
    if s.is_empty() {
        return Err("Address must not be empty".to_string());
    }
    if s.parse::<SocketAddr>().is_ok() {
        return Ok(s.to_string());
    }
    if let Ok(ip) = s.trim_matches(&['[', ']'][..]).parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, DEFAULT_PORT).to_string());
    }
    match s.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() => {
            port.parse::<u16>()
                .map_err(|e| format!("Invalid port '{port}': {e}"))?;
            Ok(s.to_string())
        }
        Some(_) => Err(format!("Missing host in address '{s}'")),
        None => Ok(format!("{s}:{DEFAULT_PORT}")),
    }
}

fn parse_unit_id(s: &str) -> Result<u8, String> {
    clap_num::maybe_hex::<u8>(s).map_err(|e| format!("Invalid unit id format: {e}"))
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum DaemonOutput {
    /// Continuously read the inverter model and print it to the standard output (console).
    Console,
    /// Continuously read the inverter model and publish it to an MQTT broker.
    Mqtt {
        /// The configuration file for the MQTT broker
        #[arg(long, default_value_t = MqttConfig::DEFAULT_CONFIG_FILE.to_string())]
        config_file: String,
    },
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum CliCommands {
    /// Run in daemon mode: poll the inverter model at a specified interval.
    /// Every cycle uses a fresh connection. Failed cycles are logged and skipped.
    /// Output can be directed to stdout or an MQTT broker.
    #[clap(verbatim_doc_comment)]
    Daemon {
        /// Interval between two cycles (e.g., "10s", "1m")
        #[arg(value_parser = humantime::parse_duration, short, long, default_value = "60s", verbatim_doc_comment)]
        poll_interval: Duration,

        /// Specifies the output.
        #[command(subcommand)]
        output: DaemonOutput,
    },

    /// Read and display the common model and the inverter model.
    /// Fails if the device does not identify as SunSpec ("SunS").
    #[clap(verbatim_doc_comment)]
    Read,

    /// Read and display the common model: manufacturer, model, version and serial number.
    ReadCommon,

    /// Read and display the inverter model: power, frequency, energy, temperature and status.
    ReadInverter,

    /// Read and display the current AC power only.
    ReadAcPower,
}

const fn about_text() -> &'static str {
    "SunSpec CLI - Read SunSpec models from solar inverters via Modbus TCP."
}

#[derive(Parser, Debug)]
#[command(name="sunspec", author, version, about=about_text(), long_about = None, propagate_version = true)]
pub struct CliArgs {
    /// Configure verbosity of logging output.
    /// -v for info, -vv for debug, -vvv for trace. Default is warnings only.
    #[command(flatten)]
    pub verbose: Verbosity<WarnLevel>,

    /// The IP address or hostname of the Modbus TCP device, with optional port.
    /// Examples: "192.168.1.100", "inverter.local:1502".
    /// The port defaults to 1502.
    #[arg(value_parser = parse_address, verbatim_doc_comment)]
    pub address: String,

    /// The Modbus unit id of the inverter.
    /// Can be specified in decimal or hexadecimal (e.g., "0x01").
    #[arg(short, long, default_value_t = 1, value_parser = parse_unit_id, verbatim_doc_comment)]
    pub unit_id: u8,

    #[command(subcommand)]
    pub command: CliCommands,

    /// Modbus I/O timeout for connect, read and write operations.
    /// Examples: "1s", "500ms".
    #[arg(global = true, long, default_value = "5s", value_parser = humantime::parse_duration, verbatim_doc_comment)]
    pub timeout: Duration,

    /// Minimum delay between multiple Modbus requests sent to the same device.
    /// Examples: "50ms", "100ms".
    #[arg(global = true, long, default_value = "50ms", value_parser = humantime::parse_duration, verbatim_doc_comment)]
    pub delay: Duration,
}
