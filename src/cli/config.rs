use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::{
    api::modbus::{SimulatorBuilder, TransportConfig},
    protocol::register::{
        ByteOrder, DataType, FunctionCode, RegisterMap, RegisterMapEntry, ValueRange,
    },
};

/// One register map entry as written in the JSON configuration.
///
/// `address` follows the display convention (`40001` is the first holding
/// register).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryConfig {
    pub function: FunctionCode,
    pub address: u32,
    pub data_type: DataType,
    #[serde(default)]
    pub byte_order: ByteOrder,
    #[serde(default)]
    pub value_from: f64,
    #[serde(default)]
    pub value_to: f64,
}

impl EntryConfig {
    pub fn to_entry(&self) -> Result<RegisterMapEntry> {
        RegisterMapEntry::from_display(
            self.function,
            self.address,
            self.data_type,
            self.byte_order,
            ValueRange::new(self.value_from, self.value_to),
        )
    }

    pub fn from_entry(entry: &RegisterMapEntry) -> Self {
        let range = entry.range();
        Self {
            function: entry.function(),
            address: entry.display_address(),
            data_type: entry.data_type(),
            byte_order: entry.byte_order(),
            value_from: range.min,
            value_to: range.max,
        }
    }
}

/// Root configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulatorConfig {
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default = "default_unit_id")]
    pub unit_id: u8,
    /// Falls back to the transport's default when absent.
    #[serde(default)]
    pub poll_interval_ms: Option<u64>,
    #[serde(default)]
    pub entries: Vec<EntryConfig>,
}

fn default_unit_id() -> u8 {
    1
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            transport: TransportConfig::default(),
            unit_id: default_unit_id(),
            poll_interval_ms: None,
            entries: Vec::new(),
        }
    }
}

impl SimulatorConfig {
    /// Parse configuration from a JSON string
    pub fn from_json(json_str: &str) -> Result<Self> {
        Ok(serde_json::from_str(json_str)?)
    }

    /// Read configuration from a file
    pub fn from_file(file_path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(file_path)
            .with_context(|| format!("Failed to read config file {file_path}"))?;
        Self::from_json(&content).with_context(|| format!("Invalid config file {file_path}"))
    }

    /// Convert to a JSON string
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Validate every entry, in order.
    pub fn register_map(&self) -> Result<RegisterMap> {
        self.entries
            .iter()
            .enumerate()
            .map(|(index, entry)| {
                entry
                    .to_entry()
                    .with_context(|| format!("Invalid register map entry #{}", index + 1))
            })
            .collect()
    }

    pub fn set_register_map(&mut self, map: &RegisterMap) {
        self.entries = map.iter().map(EntryConfig::from_entry).collect();
    }

    pub fn builder(&self) -> Result<SimulatorBuilder> {
        let mut builder = SimulatorBuilder::new(self.transport.clone())
            .with_unit_id(self.unit_id)
            .with_register_map(self.register_map()?);
        if let Some(interval) = self.poll_interval_ms {
            builder = builder.with_poll_interval(interval);
        }
        Ok(builder)
    }
}
