use anyhow::{bail, Context, Result};
use log::*;
use paho_mqtt as mqtt;
use serde::Deserialize;
use std::fs::File;
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use sunspec_lib::mapping::{Record, RecordSink};
use sunspec_lib::value::Decimal;

/// Reported as `dbg_version` in form payloads.
const VERSION: &str = concat!(env!("CARGO_PKG_NAME"), "-", env!("CARGO_PKG_VERSION"));

const MQTT_APPENDIX_AVAILABILITY: &str = "availability";

/// Encoding of a published record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadFormat {
    /// `application/x-www-form-urlencoded` summary of the inverter model.
    #[default]
    Form,
    /// The whole record as a JSON object.
    Json,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MqttConfig {
    #[serde(default = "default_url")]
    pub url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    #[serde(default = "default_topic")]
    pub topic: String,
    #[serde(default = "default_device_id")]
    pub device_id: String,
    /// Quality of service code to use
    #[serde(default)]
    qos: u8,
    #[serde(default)]
    pub format: PayloadFormat,
    #[serde(default = "default_keep_alive", with = "humantime_serde")]
    pub keep_alive: Duration,
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

fn default_url() -> String {
    String::from("tcp://test.mosquitto.org:1883")
}

fn default_topic() -> String {
    String::from("myhome/infra/solar/xwwwform")
}

fn default_device_id() -> String {
    String::from("EUI48:11:22:33:44:55:66")
}

fn default_keep_alive() -> Duration {
    Duration::from_secs(20)
}

fn default_timeout() -> Duration {
    Duration::from_secs(5)
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            username: None,
            password: None,
            topic: default_topic(),
            device_id: default_device_id(),
            qos: 0,
            format: PayloadFormat::default(),
            keep_alive: default_keep_alive(),
            timeout: default_timeout(),
        }
    }
}

impl MqttConfig {
    pub const DEFAULT_CONFIG_FILE: &'static str = "mqtt.yaml";

    pub const ENV_URL: &'static str = "SUNSPEC_MQTT_URL";
    pub const ENV_TOPIC: &'static str = "SUNSPEC_MQTT_TOPIC";
    pub const ENV_DEVICE_ID: &'static str = "SUNSPEC_DEVICE_ID";

    /// Loads the configuration and applies environment overrides.
    ///
    /// A missing default file falls back to the built-in defaults, any other
    /// missing file is an error.
    pub fn load(config_file: &str) -> Result<Self> {
        let path = Path::new(config_file);
        let config = if !path.exists() && config_file == Self::DEFAULT_CONFIG_FILE {
            info!("No {config_file} found, using default MQTT configuration");
            Self::default()
        } else {
            debug!("Loading MQTT config file from {path:?}");
            let file = File::open(path)
                .with_context(|| format!("Cannot open MQTT config file {path:?}"))?;
            serde_yaml::from_reader(file)
                .with_context(|| format!("Cannot parse MQTT config file {path:?}"))?
        };
        let config = config.with_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(url) = lookup(Self::ENV_URL) {
            self.url = url;
        }
        if let Some(topic) = lookup(Self::ENV_TOPIC) {
            self.topic = topic;
        }
        if let Some(device_id) = lookup(Self::ENV_DEVICE_ID) {
            self.device_id = device_id;
        }
        self
    }

    fn validate(&self) -> Result<()> {
        if self.qos > 2 {
            bail!("Invalid MQTT qos {}, must be 0, 1 or 2", self.qos);
        }
        if self.topic.is_empty() {
            bail!("MQTT topic must not be empty");
        }
        Ok(())
    }

    pub fn qos(&self) -> i32 {
        i32::from(self.qos)
    }

    pub fn availability_topic(&self) -> String {
        format!("{}/{MQTT_APPENDIX_AVAILABILITY}", self.topic)
    }
}

fn decimal(record: &Record, name: &str) -> Result<Decimal> {
    record
        .get(name)
        .and_then(|value| value.as_decimal())
        .with_context(|| format!("Record has no numeric {name}"))
}

fn text(record: &Record, name: &str) -> Result<String> {
    record
        .get(name)
        .map(ToString::to_string)
        .with_context(|| format!("Record has no {name}"))
}

/// Builds the form encoded summary of an inverter model record.
pub fn form_payload(record: &Record, device_id: &str, timestamp: u64) -> Result<String> {
    Ok(format!(
        "device_id={device_id}&\
         s_act_energy_wh={}&\
         s_inst_power_w={}&\
         s_temperature={}&\
         s_status={}:{}&\
         dbg_uptime={timestamp}&\
         dbg_version={VERSION}",
        decimal(record, "I_AC_Energy_WH")?.trunc(),
        decimal(record, "I_AC_Power")?.trunc(),
        decimal(record, "I_Temp_Sink")?,
        text(record, "I_Status")?,
        text(record, "I_Status_Vendor")?,
    ))
}

pub fn json_payload(record: &Record) -> Result<String> {
    serde_json::to_string(record).with_context(|| "Cannot serialize record")
}

/// Publishes records to an MQTT broker and maintains its availability topic.
pub struct MqttPublisher {
    client: mqtt::Client,
    config: MqttConfig,
}

impl MqttPublisher {
    pub fn connect(config: MqttConfig) -> Result<Self> {
        trace!("MQTT config: {config:?}");
        let mut client =
            mqtt::Client::new(config.url.clone()).with_context(|| "Error creating mqtt client")?;
        client.set_timeout(config.timeout);

        let last_will =
            mqtt::Message::new_retained(config.availability_topic(), "offline", config.qos());
        let mut conn_builder = mqtt::ConnectOptionsBuilder::new();
        let mut conn_builder = conn_builder
            .keep_alive_interval(config.keep_alive)
            .clean_session(true)
            .will_message(last_will);
        if let Some(user_name) = &config.username {
            conn_builder = conn_builder.user_name(user_name)
        }
        if let Some(password) = &config.password {
            conn_builder = conn_builder.password(password.as_str())
        }
        let conn_ops = conn_builder.finalize();

        info!("Connecting to MQTT broker {}", config.url);
        client
            .connect(conn_ops)
            .with_context(|| format!("Mqtt client unable to connect to {}", config.url))?;

        let publisher = Self { client, config };
        publisher.go_online()?;
        Ok(publisher)
    }

    fn go_online(&self) -> Result<()> {
        let msg = mqtt::Message::new_retained(
            self.config.availability_topic(),
            "online",
            self.config.qos(),
        );
        self.client
            .publish(msg)
            .with_context(|| "Cannot publish mqtt message")
    }

    fn go_offline(&self) -> Result<()> {
        let msg = mqtt::Message::new_retained(
            self.config.availability_topic(),
            "offline",
            self.config.qos(),
        );
        self.client
            .publish(msg)
            .with_context(|| "Cannot publish mqtt message")
    }

    /// Marks the device offline and disconnects from the broker.
    pub fn disconnect(self) -> Result<()> {
        self.go_offline()?;
        self.client
            .disconnect(None)
            .with_context(|| "Error disconnect mqtt client")
    }
}

impl RecordSink for MqttPublisher {
    type Error = anyhow::Error;

    fn publish(&mut self, record: &Record) -> Result<()> {
        let payload = match self.config.format {
            PayloadFormat::Form => {
                let timestamp = SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .map(|since| since.as_secs())
                    .unwrap_or_default();
                form_payload(record, &self.config.device_id, timestamp)?
            }
            PayloadFormat::Json => json_payload(record)?,
        };
        debug!("Publishing to {}: {payload}", self.config.topic);
        let msg = mqtt::Message::new(self.config.topic.as_str(), payload, self.config.qos());
        self.client
            .publish(msg)
            .with_context(|| "Cannot publish mqtt message")
    }
}
