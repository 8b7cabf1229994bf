use std::fmt;

use serde::{Deserialize, Serialize};

/// A decoded attribute value as handed over by the transport.
///
/// The transport owns the wire encoding; by the time a value reaches
/// this crate it is already one of these shapes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum AttributeValue {
    Bool(bool),
    Int(i64),
    Uint(u64),
    Float(f64),
    /// 16-bit bitmap (zone status, alarm masks).
    Bitmap16(u16),
    Text(String),
    Bytes(Vec<u8>),
}

impl AttributeValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            Self::Int(i) => Some(*i != 0),
            Self::Uint(u) => Some(*u != 0),
            Self::Bitmap16(bits) => Some(*bits != 0),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::Uint(u) => Some(*u),
            Self::Int(i) => u64::try_from(*i).ok(),
            Self::Bitmap16(bits) => Some(u64::from(*bits)),
            Self::Bool(b) => Some(u64::from(*b)),
            _ => None,
        }
    }

    /// Interpret the value as a 16-bit bitmap, if it fits.
    pub fn as_bitmap16(&self) -> Option<u16> {
        match self {
            Self::Bitmap16(bits) => Some(*bits),
            other => other.as_u64().and_then(|v| u16::try_from(v).ok()),
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Uint(u) => write!(f, "{u}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Bitmap16(bits) => write!(f, "0b{bits:016b}"),
            Self::Text(s) => write!(f, "{s}"),
            Self::Bytes(bytes) => {
                for b in bytes {
                    write!(f, "{b:02x}")?;
                }
                Ok(())
            }
        }
    }
}
