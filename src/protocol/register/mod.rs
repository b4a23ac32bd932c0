//! Register map data model and value synthesis.

mod map;
mod synth;
mod types;

pub use map::{RegisterMap, SharedRegisterMap};
pub use synth::{value_at, values_in_range};
pub use types::{ByteOrder, DataType, FunctionCode, RegisterMapEntry, ValueRange};
