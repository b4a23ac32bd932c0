//! modsim: Modbus TCP/RTU slave emulator
//!
//! Serves the four Modbus read functions (coils, discrete inputs, holding
//! registers, input registers) from a register map whose entries synthesize
//! a fresh random value for every request. The map can be edited while a
//! server is running; each request sees one consistent snapshot.
//!
//! The `api` module holds the embeddable server builder, `protocol` the wire
//! codecs and the register map model, and `cli` the configuration and CSV
//! exchange used by the `modsim` binary.

pub mod api;
#[doc(hidden)]
pub mod boot;
pub mod cli;
pub mod protocol;
#[doc(hidden)]
pub mod utils;

pub use api::*;
