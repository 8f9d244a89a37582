use crate::common::RELAY_COUNT;
use anyhow::Context;
use log::LevelFilter;
use serde::{de, Deserialize, Deserializer};
use std::time::Duration;

#[derive(Debug, PartialEq)]
pub enum LogTarget {
    Stderr,
    Syslog,
}

#[derive(Deserialize)]
pub struct Config {
    #[serde(default = "default_device_address")]
    pub device_address: String,
    #[serde(
        default = "default_connection_timeout",
        deserialize_with = "deserialize_duration_from_str"
    )]
    pub device_connection_timeout: Duration,
    #[serde(
        default = "default_request_timeout",
        deserialize_with = "deserialize_duration_from_str"
    )]
    pub device_request_timeout: Duration,
    #[serde(
        default = "default_poll_interval",
        deserialize_with = "deserialize_duration_from_str"
    )]
    pub sensor_poll_interval: Duration,
    #[serde(
        default = "default_relay_names",
        deserialize_with = "deserialize_relay_names"
    )]
    pub relay_names: [String; RELAY_COUNT],
    #[serde(
        default = "default_log_level",
        deserialize_with = "deserialize_level_filter_from_str"
    )]
    pub log_level: LevelFilter,
    #[serde(
        default = "default_log_target",
        deserialize_with = "deserialize_log_target_from_str"
    )]
    pub log_target: LogTarget,
}

fn default_device_address() -> String {
    "http://192.168.17.127".to_string()
}

fn default_connection_timeout() -> Duration {
    Duration::from_secs(3)
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(5)
}

fn default_relay_names() -> [String; RELAY_COUNT] {
    [
        "Water Pump".to_string(),
        "Air Pump".to_string(),
        "Light 1".to_string(),
        "Light 2".to_string(),
    ]
}

fn default_log_level() -> LevelFilter {
    LevelFilter::Info
}

fn default_log_target() -> LogTarget {
    LogTarget::Stderr
}

fn deserialize_duration_from_str<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    let duration = parse_duration::parse(s.as_str()).map_err(de::Error::custom)?;
    if duration.is_zero() {
        return Err(de::Error::custom("duration must be greater than zero"));
    }
    Ok(duration)
}

fn deserialize_relay_names<'de, D>(deserializer: D) -> Result<[String; RELAY_COUNT], D::Error>
where
    D: Deserializer<'de>,
{
    let names: Vec<String> = Deserialize::deserialize(deserializer)?;
    let count = names.len();
    names.try_into().map_err(|_| {
        de::Error::custom(format!(
            "relay_names must hold {} names, got {}",
            RELAY_COUNT, count
        ))
    })
}

fn deserialize_level_filter_from_str<'de, D>(deserializer: D) -> Result<LevelFilter, D::Error>
where
    D: Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    match s.to_lowercase().as_str() {
        "off" => Ok(LevelFilter::Off),
        "error" => Ok(LevelFilter::Error),
        "warn" => Ok(LevelFilter::Warn),
        "info" => Ok(LevelFilter::Info),
        "debug" => Ok(LevelFilter::Debug),
        "trace" => Ok(LevelFilter::Trace),
        _ => Err(de::Error::custom("Unknown level filter")),
    }
}

fn deserialize_log_target_from_str<'de, D>(deserializer: D) -> Result<LogTarget, D::Error>
where
    D: Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    match s.to_lowercase().as_str() {
        "stderr" => Ok(LogTarget::Stderr),
        "syslog" => Ok(LogTarget::Syslog),
        _ => Err(de::Error::custom("Unknown log target")),
    }
}

impl Config {
    pub fn read_from_file(path: &str) -> anyhow::Result<Config> {
        let mut settings = config::Config::default();
        settings
            .merge(config::File::with_name(path))
            .with_context(|| format!("Config::read_from_file(): open file {}", path))?;

        Self::from_settings(settings)
    }

    #[cfg(test)]
    pub fn read_from_str(toml: &str) -> anyhow::Result<Config> {
        let mut settings = config::Config::default();
        settings
            .merge(config::File::from_str(toml, config::FileFormat::Toml))
            .with_context(|| "Config::read_from_str(): parse")?;

        Self::from_settings(settings)
    }

    fn from_settings(settings: config::Config) -> anyhow::Result<Config> {
        let config: Config = settings
            .get("main")
            .with_context(|| "Config::read_from_file(): deserialize")?;

        check_device_address(&config.device_address)?;

        Ok(config)
    }

    pub fn override_device_address(&mut self, address: &str) -> anyhow::Result<()> {
        check_device_address(address)?;
        self.device_address = address.to_string();
        Ok(())
    }
}

fn check_device_address(address: &str) -> anyhow::Result<()> {
    if !address.starts_with("http://") {
        anyhow::bail!("device_address must be an http:// url (value: {}).", address);
    }
    Ok(())
}
