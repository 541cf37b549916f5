use chrono::NaiveDateTime;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Values that can be bound into a statement parameter or read back from a
/// row cell.
///
/// The same enum is used on both sides of the driver boundary so helper code
/// never needs to branch on driver-specific types:
/// ```rust
/// use sql_workpool::SqlValue;
///
/// let params = vec![
///     SqlValue::Int64(1),
///     SqlValue::Text("alice".into()),
///     SqlValue::Bool(true),
/// ];
/// # let _ = params;
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// Boolean value (bound as 0/1)
    Bool(bool),
    /// Signed 8-bit integer
    Int8(i8),
    /// Unsigned 8-bit integer
    UInt8(u8),
    /// Signed 16-bit integer
    Int16(i16),
    /// Unsigned 16-bit integer
    UInt16(u16),
    /// Signed 32-bit integer
    Int32(i32),
    /// Unsigned 32-bit integer
    UInt32(u32),
    /// Signed 64-bit integer
    Int64(i64),
    /// Unsigned 64-bit integer
    UInt64(u64),
    /// 32-bit floating point
    Float(f32),
    /// 64-bit floating point
    Double(f64),
    /// Text/string value
    Text(String),
    /// Binary data
    Blob(Vec<u8>),
    /// Timestamp value
    Timestamp(NaiveDateTime),
    /// NULL value
    Null,
}

impl SqlValue {
    /// Check if this value is NULL
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Human-readable form used when substituting `?` placeholders for
    /// diagnostics. Never used for execution.
    #[must_use]
    pub fn display_form(&self) -> String {
        match self {
            Self::Bool(b) => u8::from(*b).to_string(),
            Self::Int8(v) => v.to_string(),
            Self::UInt8(v) => v.to_string(),
            Self::Int16(v) => v.to_string(),
            Self::UInt16(v) => v.to_string(),
            Self::Int32(v) => v.to_string(),
            Self::UInt32(v) => v.to_string(),
            Self::Int64(v) => v.to_string(),
            Self::UInt64(v) => v.to_string(),
            Self::Float(v) => v.to_string(),
            Self::Double(v) => v.to_string(),
            Self::Text(s) => s.clone(),
            Self::Blob(_) => "BINARY".to_string(),
            Self::Timestamp(dt) => dt.format("%F %T%.f").to_string(),
            Self::Null => "NULL".to_string(),
        }
    }
}

impl From<bool> for SqlValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i8> for SqlValue {
    fn from(value: i8) -> Self {
        Self::Int8(value)
    }
}

impl From<u8> for SqlValue {
    fn from(value: u8) -> Self {
        Self::UInt8(value)
    }
}

impl From<i16> for SqlValue {
    fn from(value: i16) -> Self {
        Self::Int16(value)
    }
}

impl From<u16> for SqlValue {
    fn from(value: u16) -> Self {
        Self::UInt16(value)
    }
}

impl From<i32> for SqlValue {
    fn from(value: i32) -> Self {
        Self::Int32(value)
    }
}

impl From<u32> for SqlValue {
    fn from(value: u32) -> Self {
        Self::UInt32(value)
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        Self::Int64(value)
    }
}

impl From<u64> for SqlValue {
    fn from(value: u64) -> Self {
        Self::UInt64(value)
    }
}

impl From<f32> for SqlValue {
    fn from(value: f32) -> Self {
        Self::Float(value)
    }
}

impl From<f64> for SqlValue {
    fn from(value: f64) -> Self {
        Self::Double(value)
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<Vec<u8>> for SqlValue {
    fn from(value: Vec<u8>) -> Self {
        Self::Blob(value)
    }
}

impl From<&[u8]> for SqlValue {
    fn from(value: &[u8]) -> Self {
        Self::Blob(value.to_vec())
    }
}

impl From<NaiveDateTime> for SqlValue {
    fn from(value: NaiveDateTime) -> Self {
        Self::Timestamp(value)
    }
}

/// Which execution modes a connection serves.
///
/// A connection only prepares (and may only execute) statements whose
/// declared kind intersects its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum, Serialize, Deserialize)]
pub enum ConnectionKind {
    /// Serves blocking callers on the calling thread
    Sync,
    /// Serves deferred/awaited callers on a dedicated worker thread
    Async,
    /// Serves both modes
    Both,
}

impl ConnectionKind {
    /// Whether a statement declared with `other` may run on a connection of
    /// kind `self`.
    #[must_use]
    pub fn intersects(self, other: ConnectionKind) -> bool {
        match (self, other) {
            (Self::Both, _) | (_, Self::Both) => true,
            (a, b) => a == b,
        }
    }
}

/// Declared argument type of one statement parameter in the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SqlArgType {
    Bool,
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Float,
    Double,
    String,
    Binary,
    Timestamp,
}
