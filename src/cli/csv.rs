//! Register map exchange in the CSV layout used by the map editor:
//!
//! ```text
//! Function,Address,Data Type,Byte Order,No.Addresses,Value From,Value To
//! 03,40001,32-bit float,3412,2,10.0,20.0
//! ```
//!
//! Addresses use the 1-based display convention of each function.

use anyhow::{anyhow, Context, Result};
use csv::{ReaderBuilder, WriterBuilder};
use serde::{Deserialize, Serialize};
use std::{
    io::{Read, Write},
    path::Path,
};

use crate::protocol::register::{
    ByteOrder, DataType, FunctionCode, RegisterMap, RegisterMapEntry, SharedRegisterMap,
    ValueRange,
};

#[derive(Debug, Serialize, Deserialize)]
struct CsvRecord {
    #[serde(rename = "Function")]
    function: String,
    #[serde(rename = "Address")]
    address: u32,
    #[serde(rename = "Data Type")]
    data_type: String,
    #[serde(rename = "Byte Order", default)]
    byte_order: String,
    #[serde(rename = "No.Addresses")]
    addresses: u16,
    #[serde(rename = "Value From")]
    value_from: Option<f64>,
    #[serde(rename = "Value To")]
    value_to: Option<f64>,
}

impl CsvRecord {
    fn into_entry(self) -> Result<RegisterMapEntry> {
        let function: FunctionCode = self.function.parse()?;
        let data_type: DataType = self
            .data_type
            .trim()
            .parse()
            .map_err(|_| anyhow!("Unknown data type '{}'", self.data_type))?;
        let byte_order = match self.byte_order.trim() {
            "" => ByteOrder::default(),
            order => order
                .parse()
                .map_err(|_| anyhow!("Unknown byte order '{order}'"))?,
        };
        if self.addresses != data_type.word_count() {
            return Err(anyhow!(
                "No.Addresses is {} but '{data_type}' occupies {}",
                self.addresses,
                data_type.word_count()
            ));
        }

        let range = match (self.value_from, self.value_to) {
            (Some(min), Some(max)) => ValueRange::new(min, max),
            (None, None) if !data_type.is_numeric() => ValueRange::default(),
            _ => return Err(anyhow!("Value From and Value To are required")),
        };

        RegisterMapEntry::from_display(function, self.address, data_type, byte_order, range)
    }

    fn from_entry(entry: &RegisterMapEntry) -> Self {
        let range = entry.range();
        Self {
            function: entry.function().to_string(),
            address: entry.display_address(),
            data_type: entry.data_type().to_string(),
            byte_order: entry.byte_order().to_string(),
            addresses: entry.word_count(),
            value_from: Some(range.min),
            value_to: Some(range.max),
        }
    }
}

/// Parse a whole CSV document. Nothing is returned unless every row is valid.
pub fn import_csv<R: Read>(reader: R) -> Result<RegisterMap> {
    let mut reader = ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);

    let mut map = RegisterMap::new();
    for (index, record) in reader.deserialize::<CsvRecord>().enumerate() {
        let row = index + 1;
        let entry = record
            .with_context(|| format!("Malformed CSV row {row}"))?
            .into_entry()
            .with_context(|| format!("Invalid register map entry in CSV row {row}"))?;
        map.push(entry);
    }
    Ok(map)
}

/// Write the map with a header row, entries in insertion order.
pub fn export_csv<W: Write>(writer: W, map: &RegisterMap) -> Result<()> {
    let mut writer = WriterBuilder::new().from_writer(writer);
    for entry in map.iter() {
        writer.serialize(CsvRecord::from_entry(entry))?;
    }
    if map.is_empty() {
        writer.write_record([
            "Function",
            "Address",
            "Data Type",
            "Byte Order",
            "No.Addresses",
            "Value From",
            "Value To",
        ])?;
    }
    writer.flush()?;
    Ok(())
}

pub fn import_csv_file(path: impl AsRef<Path>) -> Result<RegisterMap> {
    let path = path.as_ref();
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open register map {}", path.display()))?;
    import_csv(file).with_context(|| format!("Failed to import {}", path.display()))
}

/// Replace the live map with the file contents in one step. On error the
/// map is left untouched.
pub fn reload_csv_file(path: impl AsRef<Path>, map: &SharedRegisterMap) -> Result<usize> {
    let imported = import_csv_file(path)?;
    let count = imported.len();
    map.replace_all(imported);
    Ok(count)
}

pub fn export_csv_file(path: impl AsRef<Path>, map: &RegisterMap) -> Result<()> {
    let path = path.as_ref();
    let file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    export_csv(file, map).with_context(|| format!("Failed to export {}", path.display()))
}
