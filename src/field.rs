use chrono::NaiveDateTime;
use tracing::error;

use crate::error::DbPoolError;
use crate::types::SqlValue;

/// Column type as reported by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Null,
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
    Decimal,
    Date,
    /// Strings and blobs travel as raw bytes.
    Binary,
}

/// Per-column metadata of a result set, immutable once the result is built.
#[derive(Debug, Clone)]
pub struct FieldMetadata {
    /// Owning table, when the driver reports it.
    pub table: String,
    /// Column name in the owning table.
    pub name: String,
    /// Display alias selected by the query.
    pub alias: String,
    /// Driver-reported type name, for diagnostics.
    pub type_name: String,
    /// Column position in the row.
    pub index: u32,
    pub field_type: FieldType,
    /// Whether cells hold native values (prepared/binary protocol) or their
    /// string form (text protocol).
    pub binary: bool,
}

enum Num {
    I(i64),
    U(u64),
    F(f64),
}

/// Typed accessor over one cell of a materialized row. Owns nothing; borrows
/// from the result set that produced it.
///
/// Numeric getters apply checked narrowing: a value that does not round-trip
/// through the requested type fails the accessor instead of truncating.
/// NULL decodes to the type's default.
#[derive(Clone, Copy)]
pub struct Field<'a> {
    value: &'a SqlValue,
    meta: &'a FieldMetadata,
}

macro_rules! int_getters {
    ($(($name:ident, $ty:ty)),+ $(,)?) => {
        $(
        /// # Errors
        /// Fails when the value cannot be represented without truncation.
        pub fn $name(&self) -> Result<$ty, DbPoolError> {
            match self.numeric_source()? {
                None => Ok(0),
                Some(Num::I(v)) => {
                    <$ty>::try_from(v).map_err(|_| self.conversion_error(stringify!($name)))
                }
                Some(Num::U(v)) => {
                    <$ty>::try_from(v).map_err(|_| self.conversion_error(stringify!($name)))
                }
                Some(Num::F(v)) => {
                    let narrowed = v as $ty;
                    if narrowed as f64 == v {
                        Ok(narrowed)
                    } else {
                        Err(self.conversion_error(stringify!($name)))
                    }
                }
            }
        }
        )+
    };
}

impl<'a> Field<'a> {
    pub(crate) fn new(value: &'a SqlValue, meta: &'a FieldMetadata) -> Self {
        Self { value, meta }
    }

    #[must_use]
    pub fn is_null(&self) -> bool {
        self.value.is_null()
    }

    #[must_use]
    pub fn metadata(&self) -> &FieldMetadata {
        self.meta
    }

    #[must_use]
    pub fn value(&self) -> &SqlValue {
        self.value
    }

    int_getters![
        (get_u8, u8),
        (get_i8, i8),
        (get_u16, u16),
        (get_i16, i16),
        (get_u32, u32),
        (get_i32, i32),
        (get_u64, u64),
        (get_i64, i64),
    ];

    /// # Errors
    /// Fails when the value cannot be represented without truncation.
    pub fn get_bool(&self) -> Result<bool, DbPoolError> {
        Ok(self.get_u8()? == 1)
    }

    /// # Errors
    /// Fails when the value does not survive the round trip through `f32`.
    pub fn get_f32(&self) -> Result<f32, DbPoolError> {
        match self.numeric_source()? {
            None => Ok(0.0),
            Some(Num::I(v)) => {
                let narrowed = v as f32;
                if narrowed as i64 == v {
                    Ok(narrowed)
                } else {
                    Err(self.conversion_error("get_f32"))
                }
            }
            Some(Num::U(v)) => {
                let narrowed = v as f32;
                if narrowed as u64 == v {
                    Ok(narrowed)
                } else {
                    Err(self.conversion_error("get_f32"))
                }
            }
            Some(Num::F(v)) => {
                let narrowed = v as f32;
                if f64::from(narrowed) == v {
                    Ok(narrowed)
                } else {
                    Err(self.conversion_error("get_f32"))
                }
            }
        }
    }

    /// # Errors
    /// Fails when the value does not survive the round trip through `f64`.
    pub fn get_f64(&self) -> Result<f64, DbPoolError> {
        match self.numeric_source()? {
            None => Ok(0.0),
            Some(Num::I(v)) => {
                let widened = v as f64;
                if widened as i64 == v {
                    Ok(widened)
                } else {
                    Err(self.conversion_error("get_f64"))
                }
            }
            Some(Num::U(v)) => {
                let widened = v as f64;
                if widened as u64 == v {
                    Ok(widened)
                } else {
                    Err(self.conversion_error("get_f64"))
                }
            }
            Some(Num::F(v)) => Ok(v),
        }
    }

    /// String view of a text cell. NULL decodes to the empty string.
    ///
    /// # Errors
    /// Fails for numeric and blob cells.
    pub fn get_str(&self) -> Result<&'a str, DbPoolError> {
        match self.value {
            SqlValue::Null => Ok(""),
            SqlValue::Text(s) => Ok(s),
            _ => Err(self.conversion_error("get_str")),
        }
    }

    /// Owned copy of [`get_str`](Self::get_str).
    ///
    /// # Errors
    /// Fails for numeric and blob cells.
    pub fn get_string(&self) -> Result<String, DbPoolError> {
        self.get_str().map(ToOwned::to_owned)
    }

    /// Raw bytes of a blob or text cell. NULL decodes to an empty slice.
    ///
    /// # Errors
    /// Fails for numeric cells.
    pub fn get_blob(&self) -> Result<&'a [u8], DbPoolError> {
        match self.value {
            SqlValue::Null => Ok(&[]),
            SqlValue::Blob(bytes) => Ok(bytes),
            SqlValue::Text(s) => Ok(s.as_bytes()),
            _ => Err(self.conversion_error("get_blob")),
        }
    }

    /// # Errors
    /// Fails for NULL and for text that matches neither
    /// `YYYY-MM-DD HH:MM:SS` nor `YYYY-MM-DD HH:MM:SS.fff`.
    pub fn get_datetime(&self) -> Result<NaiveDateTime, DbPoolError> {
        match self.value {
            SqlValue::Timestamp(dt) => Ok(*dt),
            SqlValue::Text(s) => {
                if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
                    return Ok(dt);
                }
                if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
                    return Ok(dt);
                }
                Err(self.conversion_error("get_datetime"))
            }
            _ => Err(self.conversion_error("get_datetime")),
        }
    }

    fn numeric_source(&self) -> Result<Option<Num>, DbPoolError> {
        match self.value {
            SqlValue::Null => Ok(None),
            SqlValue::Bool(b) => Ok(Some(Num::U(u64::from(*b)))),
            SqlValue::Int8(v) => Ok(Some(Num::I(i64::from(*v)))),
            SqlValue::Int16(v) => Ok(Some(Num::I(i64::from(*v)))),
            SqlValue::Int32(v) => Ok(Some(Num::I(i64::from(*v)))),
            SqlValue::Int64(v) => Ok(Some(Num::I(*v))),
            SqlValue::UInt8(v) => Ok(Some(Num::U(u64::from(*v)))),
            SqlValue::UInt16(v) => Ok(Some(Num::U(u64::from(*v)))),
            SqlValue::UInt32(v) => Ok(Some(Num::U(u64::from(*v)))),
            SqlValue::UInt64(v) => Ok(Some(Num::U(*v))),
            SqlValue::Float(v) => Ok(Some(Num::F(f64::from(*v)))),
            SqlValue::Double(v) => Ok(Some(Num::F(*v))),
            // Text protocol: cells arrive in string form and are parsed on
            // access.
            SqlValue::Text(s) => {
                if let Ok(v) = s.parse::<i64>() {
                    Ok(Some(Num::I(v)))
                } else if let Ok(v) = s.parse::<u64>() {
                    Ok(Some(Num::U(v)))
                } else if let Ok(v) = s.parse::<f64>() {
                    Ok(Some(Num::F(v)))
                } else {
                    Err(self.conversion_error("numeric"))
                }
            }
            SqlValue::Blob(_) | SqlValue::Timestamp(_) => Err(self.conversion_error("numeric")),
        }
    }

    fn conversion_error(&self, getter: &str) -> DbPoolError {
        error!(
            "{getter}: field {} ({}.{} as {}, type {}) cannot be read without truncation; use the matching getter",
            self.meta.index, self.meta.table, self.meta.name, self.meta.alias, self.meta.type_name
        );
        DbPoolError::FieldDecode(format!(
            "{getter} on field {} ({}) of type {}",
            self.meta.index, self.meta.alias, self.meta.type_name
        ))
    }
}

impl std::fmt::Debug for Field<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Field")
            .field("alias", &self.meta.alias)
            .field("value", self.value)
            .finish()
    }
}
