use anyhow::{anyhow, Result};
use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use strum::{Display, EnumIter, EnumString};

/// Read function codes served by the emulator. Each one owns a separate
/// zero-based address space.
#[repr(u8)]
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    TryFromPrimitive,
    IntoPrimitive,
    EnumIter,
)]
#[serde(rename_all = "snake_case")]
pub enum FunctionCode {
    ReadCoils = 1,
    ReadDiscreteInputs = 2,
    ReadHoldingRegisters = 3,
    ReadInputRegisters = 4,
}

impl FunctionCode {
    /// Bit-addressed functions answer with packed bits instead of words.
    pub fn is_bit_access(self) -> bool {
        matches!(self, Self::ReadCoils | Self::ReadDiscreteInputs)
    }

    /// Largest quantity a single request may ask for.
    pub fn max_quantity(self) -> u16 {
        if self.is_bit_access() {
            2000
        } else {
            125
        }
    }

    /// Base of the 1-based display address convention used by the map
    /// editor and the CSV exchange format.
    pub fn display_base(self) -> u32 {
        match self {
            Self::ReadCoils => 0,
            Self::ReadDiscreteInputs => 10000,
            Self::ReadHoldingRegisters => 40000,
            Self::ReadInputRegisters => 30000,
        }
    }

    /// Convert a displayed address (e.g. `40001`) into the zero-based offset.
    pub fn offset_from_display(self, displayed: u32) -> Result<u16> {
        let offset = i64::from(displayed) - i64::from(self.display_base()) - 1;
        u16::try_from(offset).map_err(|_| {
            anyhow!(
                "Address {displayed} is outside the {} range (expected {}..={})",
                self,
                self.display_base() + 1,
                self.display_base() + 65536
            )
        })
    }

    pub fn display_from_offset(self, offset: u16) -> u32 {
        self.display_base() + u32::from(offset) + 1
    }
}

impl fmt::Display for FunctionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}", u8::from(*self))
    }
}

impl FromStr for FunctionCode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let code = s
            .trim()
            .parse::<u8>()
            .map_err(|err| anyhow!("Invalid function code '{s}': {err}"))?;
        Self::try_from(code).map_err(|_| anyhow!("Unsupported function code: {code:02}"))
    }
}

/// How an entry's value is represented on the wire.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[strum(ascii_case_insensitive)]
pub enum DataType {
    #[strum(to_string = "Boolean", serialize = "bool")]
    #[serde(rename = "Boolean", alias = "bool")]
    Boolean,
    #[strum(to_string = "32-bit float", serialize = "float32")]
    #[serde(rename = "32-bit float", alias = "float32")]
    Float32,
    #[strum(to_string = "16-bit signed integer", serialize = "int16")]
    #[serde(rename = "16-bit signed integer", alias = "int16")]
    Int16Signed,
    #[strum(to_string = "16-bit unsigned integer", serialize = "uint16")]
    #[serde(rename = "16-bit unsigned integer", alias = "uint16")]
    Int16Unsigned,
}

impl DataType {
    /// Number of consecutive addresses one value occupies.
    pub fn word_count(self) -> u16 {
        match self {
            Self::Float32 => 2,
            Self::Boolean | Self::Int16Signed | Self::Int16Unsigned => 1,
        }
    }

    pub fn is_numeric(self) -> bool {
        !matches!(self, Self::Boolean)
    }
}

/// Word/byte permutation applied when a 32-bit value is split into two
/// registers. Named after the position of the big-endian bytes `b0..b3`.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
)]
pub enum ByteOrder {
    #[default]
    #[strum(serialize = "1234")]
    #[serde(rename = "1234")]
    Abcd,
    #[strum(serialize = "2143")]
    #[serde(rename = "2143")]
    Badc,
    #[strum(serialize = "3412")]
    #[serde(rename = "3412")]
    Cdab,
    #[strum(serialize = "4321")]
    #[serde(rename = "4321")]
    Dcba,
}

impl ByteOrder {
    /// Split big-endian bytes into two register words.
    pub fn arrange(self, b: [u8; 4]) -> [u16; 2] {
        let word = |hi: u8, lo: u8| u16::from_be_bytes([hi, lo]);
        match self {
            Self::Abcd => [word(b[0], b[1]), word(b[2], b[3])],
            Self::Badc => [word(b[1], b[0]), word(b[3], b[2])],
            Self::Cdab => [word(b[2], b[3]), word(b[0], b[1])],
            Self::Dcba => [word(b[3], b[2]), word(b[1], b[0])],
        }
    }
}

/// Inclusive bounds for random synthesis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValueRange {
    pub min: f64,
    pub max: f64,
}

impl ValueRange {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// A degenerate range that always yields `value`.
    pub fn fixed(value: f64) -> Self {
        Self::new(value, value)
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

impl Default for ValueRange {
    fn default() -> Self {
        Self::fixed(0.0)
    }
}

/// One configured address range and the rule used to synthesize its values.
///
/// Entries are validated on construction, so the codec and the synthesizer
/// never see an impossible combination afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegisterMapEntry {
    function: FunctionCode,
    offset: u16,
    data_type: DataType,
    byte_order: ByteOrder,
    range: ValueRange,
}

impl RegisterMapEntry {
    pub fn new(
        function: FunctionCode,
        offset: u16,
        data_type: DataType,
        byte_order: ByteOrder,
        range: ValueRange,
    ) -> Result<Self> {
        if function.is_bit_access() && data_type != DataType::Boolean {
            return Err(anyhow!(
                "Function {function} only serves Boolean entries, got '{data_type}'"
            ));
        }
        if !function.is_bit_access() && !data_type.is_numeric() {
            return Err(anyhow!(
                "Function {function} requires a numeric data type, got '{data_type}'"
            ));
        }
        if data_type.is_numeric() {
            if !range.min.is_finite() || !range.max.is_finite() {
                return Err(anyhow!(
                    "Value range must be finite, got [{}, {}]",
                    range.min,
                    range.max
                ));
            }
            if range.min > range.max {
                return Err(anyhow!(
                    "Value range is inverted: from {} is greater than to {}",
                    range.min,
                    range.max
                ));
            }
            if !(range.max - range.min).is_finite() {
                return Err(anyhow!(
                    "Value range [{}, {}] is too wide to sample from",
                    range.min,
                    range.max
                ));
            }
            let f32_max = f64::from(f32::MAX);
            if data_type == DataType::Float32
                && (range.min.abs() > f32_max || range.max.abs() > f32_max)
            {
                return Err(anyhow!(
                    "Value range [{}, {}] does not fit a 32-bit float",
                    range.min,
                    range.max
                ));
            }
        }
        if u32::from(offset) + u32::from(data_type.word_count()) > 0x1_0000 {
            return Err(anyhow!(
                "Entry at offset {offset} spans past the end of the address space"
            ));
        }

        Ok(Self {
            function,
            offset,
            data_type,
            byte_order,
            range,
        })
    }

    /// Build an entry from the 1-based display address convention.
    pub fn from_display(
        function: FunctionCode,
        displayed_address: u32,
        data_type: DataType,
        byte_order: ByteOrder,
        range: ValueRange,
    ) -> Result<Self> {
        let offset = function.offset_from_display(displayed_address)?;
        Self::new(function, offset, data_type, byte_order, range)
    }

    /// Shorthand for a coil or discrete input entry.
    pub fn boolean(function: FunctionCode, offset: u16) -> Result<Self> {
        Self::new(
            function,
            offset,
            DataType::Boolean,
            ByteOrder::default(),
            ValueRange::default(),
        )
    }

    pub fn function(&self) -> FunctionCode {
        self.function
    }

    pub fn offset(&self) -> u16 {
        self.offset
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn byte_order(&self) -> ByteOrder {
        self.byte_order
    }

    pub fn range(&self) -> ValueRange {
        self.range
    }

    pub fn word_count(&self) -> u16 {
        self.data_type.word_count()
    }

    pub fn display_address(&self) -> u32 {
        self.function.display_from_offset(self.offset)
    }

    /// True when `address` of `function` falls inside `[offset, offset + wordCount)`.
    pub fn covers(&self, function: FunctionCode, address: u16) -> bool {
        let start = u32::from(self.offset);
        let address = u32::from(address);
        self.function == function
            && address >= start
            && address < start + u32::from(self.word_count())
    }
}
