//! Type tags and host-side values crossing the sandbox boundary
//!
//! Host numerics travel as `f64` and are narrowed to fixed-width cells on
//! store. Narrowing truncates toward zero, then wraps with two's-complement
//! semantics, matching the store instructions of the underlying sandbox.
//! All cells are little-endian.

use std::fmt;

use crate::error::{BridgeError, BridgeResult};

/// Numeric lane of a typed view cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumKind {
    Signed,
    Unsigned,
    Float,
}

impl fmt::Display for NumKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NumKind::Signed => write!(f, "signed"),
            NumKind::Unsigned => write!(f, "unsigned"),
            NumKind::Float => write!(f, "float"),
        }
    }
}

/// Element type of a typed view: width (1, 4 or 8 bytes) plus lane.
///
/// Float lanes exist only at widths 4 and 8; every other width/lane
/// combination is rejected with `InvalidWidth`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElemType {
    I8,
    U8,
    I32,
    U32,
    F32,
    I64,
    U64,
    F64,
}

impl ElemType {
    pub fn width(self) -> usize {
        match self {
            ElemType::I8 | ElemType::U8 => 1,
            ElemType::I32 | ElemType::U32 | ElemType::F32 => 4,
            ElemType::I64 | ElemType::U64 | ElemType::F64 => 8,
        }
    }

    pub fn from_parts(width: usize, kind: NumKind) -> BridgeResult<Self> {
        match (width, kind) {
            (1, NumKind::Signed) => Ok(ElemType::I8),
            (1, NumKind::Unsigned) => Ok(ElemType::U8),
            (4, NumKind::Signed) => Ok(ElemType::I32),
            (4, NumKind::Unsigned) => Ok(ElemType::U32),
            (4, NumKind::Float) => Ok(ElemType::F32),
            (8, NumKind::Signed) => Ok(ElemType::I64),
            (8, NumKind::Unsigned) => Ok(ElemType::U64),
            (8, NumKind::Float) => Ok(ElemType::F64),
            _ => Err(BridgeError::InvalidWidth { width, kind }),
        }
    }

    /// Write one host numeric into a cell of exactly `self.width()` bytes.
    pub(crate) fn store(self, cell: &mut [u8], value: f64) {
        match self {
            ElemType::I8 | ElemType::U8 => cell[0] = value as i64 as u8,
            ElemType::I32 | ElemType::U32 => {
                cell.copy_from_slice(&(value as i64 as u32).to_le_bytes())
            }
            ElemType::F32 => cell.copy_from_slice(&(value as f32).to_le_bytes()),
            ElemType::I64 | ElemType::U64 => {
                cell.copy_from_slice(&(value as i64 as u64).to_le_bytes())
            }
            ElemType::F64 => cell.copy_from_slice(&value.to_le_bytes()),
        }
    }

    /// Read one cell of exactly `self.width()` bytes back as a host numeric.
    pub(crate) fn load(self, cell: &[u8]) -> f64 {
        match self {
            ElemType::I8 => cell[0] as i8 as f64,
            ElemType::U8 => cell[0] as f64,
            ElemType::I32 => {
                i32::from_le_bytes(cell.try_into().expect("cell width")) as f64
            }
            ElemType::U32 => {
                u32::from_le_bytes(cell.try_into().expect("cell width")) as f64
            }
            ElemType::F32 => {
                f32::from_le_bytes(cell.try_into().expect("cell width")) as f64
            }
            ElemType::I64 => {
                i64::from_le_bytes(cell.try_into().expect("cell width")) as f64
            }
            ElemType::U64 => {
                u64::from_le_bytes(cell.try_into().expect("cell width")) as f64
            }
            ElemType::F64 => f64::from_le_bytes(cell.try_into().expect("cell width")),
        }
    }
}

/// Declared interpretation of a value or buffer crossing the boundary.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TypeTag {
    /// Raw numeric, passed and returned by value. No memory involved.
    Number,
    /// NUL-terminated UTF-8 in linear memory; crosses as an offset.
    Text,
    /// Contiguous element buffer at the given element type; crosses as an
    /// offset. The element count is call-site knowledge.
    Array(ElemType),
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeTag::Number => write!(f, "number"),
            TypeTag::Text => write!(f, "text"),
            TypeTag::Array(elem) => write!(f, "array({:?})", elem),
        }
    }
}

/// A host-side value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Unit,
    Number(f64),
    Text(String),
    /// Array payload for an `Array`-tagged argument; the element type comes
    /// from the tag.
    Array(Vec<f64>),
    /// A raw pointer into linear memory, surfaced when only the caller knows
    /// how to interpret the pointee (array returns).
    Offset(u32),
}

impl Value {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_offset(&self) -> Option<u32> {
        match self {
            Value::Offset(offset) => Some(*offset),
            _ => None,
        }
    }

    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Value::Unit => "unit",
            Value::Number(_) => "number",
            Value::Text(_) => "text",
            Value::Array(_) => "array",
            Value::Offset(_) => "offset",
        }
    }
}
