pub mod modbus;
pub mod utils;

pub use modbus::{
    LoggingHook, ServerControl, ServerEvent, ServerHook, Simulator, SimulatorBuilder,
    TransportConfig,
};
