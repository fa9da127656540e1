//! # Tagged Values
//!
//! The open-ended set of request parameters and response values.
//!
//! Each value is written as a one-byte [`TypeCode`] followed by its body. The
//! codes for scalar kinds follow the Hadoop object-writable ordering so that a
//! capture from a real peer lines up with this table.
//!
//! ## Invariants
//! - **Recursion Safety**: Nested arrays are bounded by `MAX_DEPTH`.
//! - **Allocation Safety**: Decoded counts never pre-allocate past the bytes that remain.

use crate::Decoder;
use crate::Encoder;
use crate::Error;
use crate::Result;

/// The maximum nesting depth for values before failing.
pub const MAX_DEPTH: usize = 64;

/// Registry of value kinds understood on the wire.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeCode {
    Bool = 0x01,
    Byte = 0x02,
    Short = 0x04,
    Int = 0x05,
    Long = 0x06,
    Float = 0x07,
    Double = 0x08,
    Null = 0x09,
    Text = 0x0A,
    Bytes = 0x0B,
    BytesArray = 0x0C,
    Array = 0x10,

    // Row records
    Get = 0x20,
    Put = 0x21,
    RowResult = 0x22,
}

impl TypeCode {
    /// Returns the TypeCode for a given byte, or `None` if unregistered.
    pub fn from_u8(b: u8) -> Option<Self> {
        match b {
            0x01 => Some(TypeCode::Bool),
            0x02 => Some(TypeCode::Byte),
            0x04 => Some(TypeCode::Short),
            0x05 => Some(TypeCode::Int),
            0x06 => Some(TypeCode::Long),
            0x07 => Some(TypeCode::Float),
            0x08 => Some(TypeCode::Double),
            0x09 => Some(TypeCode::Null),
            0x0A => Some(TypeCode::Text),
            0x0B => Some(TypeCode::Bytes),
            0x0C => Some(TypeCode::BytesArray),
            0x10 => Some(TypeCode::Array),
            0x20 => Some(TypeCode::Get),
            0x21 => Some(TypeCode::Put),
            0x22 => Some(TypeCode::RowResult),
            _ => None,
        }
    }
}

/// A single versioned cell of a row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cell {
    pub family: Vec<u8>,
    pub qualifier: Vec<u8>,
    pub timestamp: i64,
    pub value: Vec<u8>,
}

impl Cell {
    pub fn new(family: impl Into<Vec<u8>>, qualifier: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            family: family.into(),
            qualifier: qualifier.into(),
            timestamp: i64::MAX,
            value: value.into(),
        }
    }

    /// Pins the cell to an explicit timestamp instead of "latest".
    pub fn at(mut self, timestamp: i64) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// A row lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Get {
    pub row: Vec<u8>,
    pub families: Vec<Vec<u8>>,
    pub max_versions: i32,
}

impl Get {
    pub fn new(row: impl Into<Vec<u8>>) -> Self {
        Self { row: row.into(), families: Vec::new(), max_versions: 1 }
    }

    /// Restricts the lookup to one column family. May be called repeatedly.
    pub fn family(mut self, family: impl Into<Vec<u8>>) -> Self {
        self.families.push(family.into());
        self
    }

    pub fn max_versions(mut self, n: i32) -> Self {
        self.max_versions = n;
        self
    }
}

/// A row mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Put {
    pub row: Vec<u8>,
    pub cells: Vec<Cell>,
}

impl Put {
    pub fn new(row: impl Into<Vec<u8>>) -> Self {
        Self { row: row.into(), cells: Vec::new() }
    }

    pub fn cell(mut self, cell: Cell) -> Self {
        self.cells.push(cell);
        self
    }
}

/// The cells returned for one row. An empty `cells` list means no such row.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RowResult {
    pub row: Vec<u8>,
    pub cells: Vec<Cell>,
}

impl RowResult {
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Returns the value of the first cell matching `family:qualifier`.
    pub fn value(&self, family: &[u8], qualifier: &[u8]) -> Option<&[u8]> {
        self.cells
            .iter()
            .find(|c| c.family == family && c.qualifier == qualifier)
            .map(|c| c.value.as_slice())
    }
}

/// A dynamically typed wire value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Text(String),
    Bytes(Vec<u8>),
    BytesArray(Vec<Vec<u8>>),
    Array(Vec<Value>),
    Get(Get),
    Put(Put),
    RowResult(RowResult),
}

impl Value {
    pub fn type_code(&self) -> TypeCode {
        match self {
            Value::Null => TypeCode::Null,
            Value::Bool(_) => TypeCode::Bool,
            Value::Byte(_) => TypeCode::Byte,
            Value::Short(_) => TypeCode::Short,
            Value::Int(_) => TypeCode::Int,
            Value::Long(_) => TypeCode::Long,
            Value::Float(_) => TypeCode::Float,
            Value::Double(_) => TypeCode::Double,
            Value::Text(_) => TypeCode::Text,
            Value::Bytes(_) => TypeCode::Bytes,
            Value::BytesArray(_) => TypeCode::BytesArray,
            Value::Array(_) => TypeCode::Array,
            Value::Get(_) => TypeCode::Get,
            Value::Put(_) => TypeCode::Put,
            Value::RowResult(_) => TypeCode::RowResult,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Widens any integral kind to i64.
    pub fn as_long(&self) -> Option<i64> {
        match self {
            Value::Byte(v) => Some(*v as i64),
            Value::Short(v) => Some(*v as i64),
            Value::Int(v) => Some(*v as i64),
            Value::Long(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self { Value::Text(v.to_string()) }
}

impl From<String> for Value {
    fn from(v: String) -> Self { Value::Text(v) }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self { Value::Bool(v) }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self { Value::Int(v) }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self { Value::Long(v) }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self { Value::Bytes(v) }
}

impl From<Get> for Value {
    fn from(v: Get) -> Self { Value::Get(v) }
}

impl From<Put> for Value {
    fn from(v: Put) -> Self { Value::Put(v) }
}

// ============================================================================
//  ENCODING
// ============================================================================

/// Encodes a tagged value into the encoder stream.
///
/// # Errors
/// Returns `Error::RecursionLimitExceeded` if arrays nest deeper than `MAX_DEPTH`.
pub fn encode_value(enc: &mut Encoder, val: &Value) -> Result<()> {
    encode_value_impl(enc, val, 0)
}

fn encode_value_impl(enc: &mut Encoder, val: &Value, depth: usize) -> Result<()> {
    if depth > MAX_DEPTH {
        return Err(Error::RecursionLimitExceeded);
    }

    enc.u8(val.type_code() as u8);
    match val {
        Value::Null => {},
        Value::Bool(b) => enc.bool(*b),
        Value::Byte(v) => enc.i8(*v),
        Value::Short(v) => enc.i16(*v),
        Value::Int(v) => enc.i32(*v),
        Value::Long(v) => enc.i64(*v),
        Value::Float(v) => enc.f32(*v),
        Value::Double(v) => enc.f64(*v),
        Value::Text(s) => enc.text(s)?,
        Value::Bytes(b) => enc.byte_array(b)?,
        Value::BytesArray(items) => {
            enc.count(items.len())?;
            for item in items {
                enc.byte_array(item)?;
            }
        },
        Value::Array(items) => {
            enc.count(items.len())?;
            for item in items {
                encode_value_impl(enc, item, depth + 1)?;
            }
        },
        Value::Get(get) => {
            enc.byte_array(&get.row)?;
            enc.i32(get.max_versions);
            enc.count(get.families.len())?;
            for family in &get.families {
                enc.byte_array(family)?;
            }
        },
        Value::Put(put) => {
            enc.byte_array(&put.row)?;
            encode_cells(enc, &put.cells)?;
        },
        Value::RowResult(result) => {
            enc.byte_array(&result.row)?;
            encode_cells(enc, &result.cells)?;
        },
    }
    Ok(())
}

fn encode_cells(enc: &mut Encoder, cells: &[Cell]) -> Result<()> {
    enc.count(cells.len())?;
    for cell in cells {
        enc.byte_array(&cell.family)?;
        enc.byte_array(&cell.qualifier)?;
        enc.i64(cell.timestamp);
        enc.byte_array(&cell.value)?;
    }
    Ok(())
}

// ============================================================================
//  DECODING
// ============================================================================

/// Decodes one tagged value from the decoder.
///
/// # Errors
/// - `Error::UnknownTypeCode` if the leading byte is not registered.
/// - `Error::RecursionLimitExceeded` if arrays nest deeper than `MAX_DEPTH`.
pub fn decode_value(dec: &mut Decoder) -> Result<Value> {
    decode_value_impl(dec, 0)
}

fn decode_value_impl(dec: &mut Decoder, depth: usize) -> Result<Value> {
    if depth > MAX_DEPTH {
        return Err(Error::RecursionLimitExceeded);
    }

    let code = dec.u8()?;
    let Some(tc) = TypeCode::from_u8(code) else {
        return Err(Error::UnknownTypeCode(code));
    };

    let val = match tc {
        TypeCode::Null => Value::Null,
        TypeCode::Bool => Value::Bool(dec.bool()?),
        TypeCode::Byte => Value::Byte(dec.i8()?),
        TypeCode::Short => Value::Short(dec.i16()?),
        TypeCode::Int => Value::Int(dec.i32()?),
        TypeCode::Long => Value::Long(dec.i64()?),
        TypeCode::Float => Value::Float(dec.f32()?),
        TypeCode::Double => Value::Double(dec.f64()?),
        TypeCode::Text => Value::Text(dec.text()?.to_string()),
        TypeCode::Bytes => Value::Bytes(dec.byte_array()?.to_vec()),
        TypeCode::BytesArray => {
            let n = dec.count()?;
            let mut items = Vec::with_capacity(n.min(dec.remaining()));
            for _ in 0..n {
                items.push(dec.byte_array()?.to_vec());
            }
            Value::BytesArray(items)
        },
        TypeCode::Array => {
            let n = dec.count()?;
            let mut items = Vec::with_capacity(n.min(dec.remaining()));
            for _ in 0..n {
                items.push(decode_value_impl(dec, depth + 1)?);
            }
            Value::Array(items)
        },
        TypeCode::Get => {
            let row = dec.byte_array()?.to_vec();
            let max_versions = dec.i32()?;
            let n = dec.count()?;
            let mut families = Vec::with_capacity(n.min(dec.remaining()));
            for _ in 0..n {
                families.push(dec.byte_array()?.to_vec());
            }
            Value::Get(Get { row, families, max_versions })
        },
        TypeCode::Put => {
            let row = dec.byte_array()?.to_vec();
            let cells = decode_cells(dec)?;
            Value::Put(Put { row, cells })
        },
        TypeCode::RowResult => {
            let row = dec.byte_array()?.to_vec();
            let cells = decode_cells(dec)?;
            Value::RowResult(RowResult { row, cells })
        },
    };
    Ok(val)
}

fn decode_cells(dec: &mut Decoder) -> Result<Vec<Cell>> {
    let n = dec.count()?;
    let mut cells = Vec::with_capacity(n.min(dec.remaining()));
    for _ in 0..n {
        let family = dec.byte_array()?.to_vec();
        let qualifier = dec.byte_array()?.to_vec();
        let timestamp = dec.i64()?;
        let value = dec.byte_array()?.to_vec();
        cells.push(Cell { family, qualifier, timestamp, value });
    }
    Ok(cells)
}
