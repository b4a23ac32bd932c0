pub mod handlers;
pub mod rtu;
pub mod tcp;
pub mod traits;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::task::JoinHandle;

pub use crate::protocol::register::{
    ByteOrder, DataType, FunctionCode, RegisterMap, RegisterMapEntry, SharedRegisterMap,
    ValueRange,
};
pub use handlers::{FlumeEventHook, ServerControl};
pub use rtu::{handle_rtu_frame, RtuReply, SerialReader};
pub use tcp::{handle_connection, TcpServer};
pub use traits::{HookChain, LoggingHook, ServerEvent, ServerHook, TransportKind};

use crate::api::utils::open_serial_port;
use traits::notify;

/// Where the simulator listens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportConfig {
    Tcp { host: String, port: u16 },
    Rtu { port_name: String, baud_rate: u32 },
}

impl TransportConfig {
    pub fn kind(&self) -> TransportKind {
        match self {
            Self::Tcp { .. } => TransportKind::Tcp,
            Self::Rtu { .. } => TransportKind::Rtu,
        }
    }

    /// Accept poll interval for TCP, serial read timeout for RTU.
    pub fn default_poll_interval_ms(&self) -> u64 {
        match self {
            Self::Tcp { .. } => 1000,
            Self::Rtu { .. } => 100,
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self::Tcp {
            host: "0.0.0.0".to_string(),
            port: 502,
        }
    }
}

/// Builder for a running simulator.
///
/// # Example
///
/// ```no_run
/// use modsim::api::modbus::{LoggingHook, SimulatorBuilder};
/// use std::sync::Arc;
///
/// # async fn run() -> anyhow::Result<()> {
/// let simulator = SimulatorBuilder::new_tcp("127.0.0.1", 1502)
///     .with_unit_id(1)
///     .add_hook(Arc::new(LoggingHook))
///     .start()
///     .await?;
/// simulator.shutdown().await?;
/// # Ok(())
/// # }
/// ```
pub struct SimulatorBuilder {
    transport: TransportConfig,
    unit_id: u8,
    poll_interval_ms: Option<u64>,
    map: SharedRegisterMap,
    hooks: Vec<Arc<dyn ServerHook>>,
}

impl SimulatorBuilder {
    pub fn new(transport: TransportConfig) -> Self {
        Self {
            transport,
            unit_id: 1,
            poll_interval_ms: None,
            map: SharedRegisterMap::default(),
            hooks: Vec::new(),
        }
    }

    pub fn new_tcp(host: &str, port: u16) -> Self {
        Self::new(TransportConfig::Tcp {
            host: host.to_string(),
            port,
        })
    }

    pub fn new_rtu(port_name: &str) -> Self {
        Self::new(TransportConfig::Rtu {
            port_name: port_name.to_string(),
            baud_rate: 9600,
        })
    }

    /// Unit id answered in RTU mode. TCP requests are served whatever
    /// unit id they carry.
    pub fn with_unit_id(mut self, unit_id: u8) -> Self {
        self.unit_id = unit_id;
        self
    }

    /// Set the baud rate (RTU only).
    pub fn with_baud_rate(mut self, baud: u32) -> Self {
        if let TransportConfig::Rtu { baud_rate, .. } = &mut self.transport {
            *baud_rate = baud;
        }
        self
    }

    /// Set how often the serving loop re-checks its stop flag, in
    /// milliseconds. Defaults to 1000 for TCP and 100 for RTU.
    pub fn with_poll_interval(mut self, interval_ms: u64) -> Self {
        self.poll_interval_ms = Some(interval_ms);
        self
    }

    /// Serve values from `map`. Pass a [`SharedRegisterMap`] clone to keep
    /// editing the map while the simulator runs.
    pub fn with_register_map(mut self, map: impl Into<SharedRegisterMap>) -> Self {
        self.map = map.into();
        self
    }

    /// Add a hook to the chain. Hooks run in the order they were added.
    pub fn add_hook(mut self, hook: Arc<dyn ServerHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(
            self.poll_interval_ms
                .unwrap_or_else(|| self.transport.default_poll_interval_ms())
                .max(1),
        )
    }

    /// Bind the listener or open the serial port, then serve in the
    /// background. Binding and opening failures are returned here.
    pub async fn start(self) -> Result<Simulator> {
        let poll_interval = self.poll_interval();
        let hooks: HookChain = Arc::from(self.hooks);
        let control = ServerControl::new();
        let kind = self.transport.kind();

        let (local_addr, task) = match self.transport {
            TransportConfig::Tcp { host, port } => {
                let server = TcpServer::bind(
                    &format!("{host}:{port}"),
                    self.map.clone(),
                    hooks,
                    poll_interval,
                )
                .await?;
                let local_addr = server.local_addr()?;
                let task = tokio::spawn(server.serve(control.clone()));
                (Some(local_addr), task)
            }
            TransportConfig::Rtu {
                port_name,
                baud_rate,
            } => {
                let port = open_serial_port(&port_name, baud_rate, poll_interval)?;
                let map = self.map.clone();
                let unit_id = self.unit_id;
                let task_control = control.clone();
                let task = tokio::task::spawn_blocking(move || {
                    notify(
                        &hooks,
                        ServerEvent::Listening {
                            transport: TransportKind::Rtu,
                            endpoint: format!("{port_name} @ {baud_rate} baud, unit {unit_id}"),
                        },
                    );
                    let result = SerialReader::new(port, unit_id).run(&map, &hooks, &task_control);
                    notify(
                        &hooks,
                        ServerEvent::Stopped {
                            transport: TransportKind::Rtu,
                        },
                    );
                    result
                });
                (None, task)
            }
        };

        Ok(Simulator {
            kind,
            control,
            map: self.map,
            local_addr,
            task,
        })
    }
}

/// Handle to a running simulator.
pub struct Simulator {
    kind: TransportKind,
    control: ServerControl,
    map: SharedRegisterMap,
    local_addr: Option<SocketAddr>,
    task: JoinHandle<Result<()>>,
}

impl Simulator {
    pub fn transport(&self) -> TransportKind {
        self.kind
    }

    pub fn control(&self) -> ServerControl {
        self.control.clone()
    }

    /// The live register map; edits apply to the next request.
    pub fn register_map(&self) -> SharedRegisterMap {
        self.map.clone()
    }

    /// Bound TCP address, `None` for RTU.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub fn stop(&self) {
        self.control.stop();
    }

    /// Wait until the server stops (after [`Simulator::stop`] or a fatal
    /// transport error).
    pub async fn wait(self) -> Result<()> {
        self.task
            .await
            .with_context(|| format!("{} server task failed", self.kind))?
    }

    pub async fn shutdown(self) -> Result<()> {
        self.stop();
        self.wait().await
    }
}
