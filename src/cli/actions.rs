use anyhow::Result;
use clap::ArgMatches;
use std::sync::Arc;

use super::{
    config::SimulatorConfig,
    csv::{export_csv_file, import_csv_file, reload_csv_file},
};
use crate::api::modbus::{LoggingHook, SharedRegisterMap, TransportConfig};

/// Merge `--config` with the individual flags. Flags win over the file.
pub fn config_from_matches(matches: &ArgMatches) -> Result<SimulatorConfig> {
    let mut config = match matches.get_one::<String>("config") {
        Some(path) => {
            log::info!("Loading configuration from {path}");
            SimulatorConfig::from_file(path)?
        }
        None => SimulatorConfig::default(),
    };

    match matches.get_one::<String>("mode").map(String::as_str) {
        Some("tcp") if !matches!(config.transport, TransportConfig::Tcp { .. }) => {
            config.transport = TransportConfig::default();
        }
        Some("rtu") if !matches!(config.transport, TransportConfig::Rtu { .. }) => {
            config.transport = TransportConfig::Rtu {
                port_name: String::new(),
                baud_rate: 9600,
            };
        }
        _ => {}
    }

    match &mut config.transport {
        TransportConfig::Tcp { host, port } => {
            if let Some(value) = matches.get_one::<String>("host") {
                *host = value.clone();
            }
            if let Some(value) = matches.get_one::<u16>("tcp-port") {
                *port = *value;
            }
        }
        TransportConfig::Rtu {
            port_name,
            baud_rate,
        } => {
            if let Some(value) = matches.get_one::<String>("serial-port") {
                *port_name = value.clone();
            }
            if let Some(value) = matches.get_one::<u32>("baudrate") {
                *baud_rate = *value;
            }
        }
    }

    if let Some(unit_id) = matches.get_one::<u8>("unit-id") {
        config.unit_id = *unit_id;
    }
    if let Some(interval) = matches.get_one::<u64>("poll-interval-ms") {
        config.poll_interval_ms = Some(*interval);
    }
    if let Some(path) = matches.get_one::<String>("map") {
        let map = import_csv_file(path)?;
        log::info!("Imported {} register map entries from {path}", map.len());
        config.set_register_map(&map);
    }

    Ok(config)
}

/// Re-import `path` into the live map. A bad file leaves the map untouched.
pub fn reload_map(path: &str, map: &SharedRegisterMap) -> bool {
    match reload_csv_file(path, map) {
        Ok(count) => {
            log::info!("Reloaded {count} register map entries from {path}");
            true
        }
        Err(err) => {
            log::warn!("Keeping current register map, reload of {path} failed: {err:#}");
            false
        }
    }
}

/// Reload the `--map` file every time the process receives SIGHUP.
#[cfg(unix)]
fn spawn_reload_on_hangup(path: String, map: SharedRegisterMap) -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangups = signal(SignalKind::hangup())?;
    let task_path = path.clone();
    tokio::spawn(async move {
        while hangups.recv().await.is_some() {
            log::info!("SIGHUP received, reloading {task_path}");
            reload_map(&task_path, &map);
        }
    });
    log::info!("Send SIGHUP to reload the register map from {path}");
    Ok(())
}

/// Run the emulator until Ctrl-C, or export the map when `--export` is given.
///
/// On Unix a `--map` file is reloaded in place on SIGHUP.
pub async fn run(matches: &ArgMatches) -> Result<()> {
    let config = config_from_matches(matches)?;

    if let Some(path) = matches.get_one::<String>("export") {
        let map = config.register_map()?;
        export_csv_file(path, &map)?;
        log::info!("Exported {} register map entries to {path}", map.len());
        return Ok(());
    }

    let builder = config.builder()?.add_hook(Arc::new(LoggingHook));
    let simulator = builder.start().await?;
    log::info!(
        "Serving {} register map entries",
        simulator.register_map().len()
    );

    #[cfg(unix)]
    {
        if let Some(path) = matches.get_one::<String>("map") {
            spawn_reload_on_hangup(path.clone(), simulator.register_map())?;
        }
    }

    let control = simulator.control();
    ctrlc::set_handler(move || {
        log::info!("Ctrl-C received, stopping");
        control.stop();
    })?;

    simulator.wait().await
}
