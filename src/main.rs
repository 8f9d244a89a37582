mod app;
mod common;
mod config;
mod console;
mod dashboard;
mod device_client;

use anyhow::anyhow;
use log::info;

extern crate serde;
#[macro_use]
extern crate clap;

use crate::app::App;
use crate::config::{Config, LogTarget};
use crate::console::{quit_on_ctrl_c, read_commands};
use crate::dashboard::Dashboard;
use crate::device_client::{poll_sensor, DeviceClient};
use syslog::Facility;
use tokio::sync::mpsc::unbounded_channel;

// Where the deb package installs `src/agri_dash.toml`.
const DEFAULT_CONFIG_PATH: &str = "/etc/agri_dash.toml";

fn init_logging(config: &Config) -> anyhow::Result<()> {
    match config.log_target {
        LogTarget::Syslog => syslog::init(Facility::LOG_USER, config.log_level, None)
            .map_err(|e| anyhow!("syslog init failed ({})", e)),
        LogTarget::Stderr => env_logger::Builder::new()
            .filter_level(config.log_level)
            .try_init()
            .map_err(|e| anyhow!("logger init failed ({})", e)),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let matches = clap_app!(AgriDash =>
        (version: crate_version!())
        (about: "Console dashboard for a greenhouse relay controller")
        (@arg CONFIG: -c --config +takes_value "Sets a custom config file")
        (@arg ADDRESS: -a --address +takes_value "Overrides the device address"))
    .get_matches();

    let path_to_config = matches
        .value_of("CONFIG")
        .unwrap_or(DEFAULT_CONFIG_PATH);

    let mut config = Config::read_from_file(path_to_config)?;
    if let Some(address) = matches.value_of("ADDRESS") {
        config.override_device_address(address)?;
    }

    init_logging(&config)?;
    info!("agri-dash {} using {}", crate_version!(), config.device_address);

    let (sender, receiver) = unbounded_channel();
    let device = DeviceClient::new(&config);

    let poller = tokio::spawn(poll_sensor(
        device.clone(),
        config.sensor_poll_interval,
        sender.clone(),
    ));
    let console_sender = sender.clone();
    std::thread::spawn(move || read_commands(std::io::stdin().lock(), console_sender));
    let interrupt = tokio::spawn(quit_on_ctrl_c(sender.clone()));

    println!("{}", console::HELP);
    App::new(Dashboard::new(config.relay_names), device, sender)
        .run(receiver)
        .await;

    poller.abort();
    interrupt.abort();

    Ok(())
}
