//! Bundled SQLite driver over `rusqlite`.

use rusqlite::types::ValueRef;
use rusqlite::{Connection, params_from_iter};

use crate::config::ConnectInfo;
use crate::error::ErrorClass;
use crate::field::{FieldMetadata, FieldType};
use crate::types::SqlValue;

use super::{Driver, DriverConnection, DriverError, RawResult};

/// SQLite driver. Consumes only `ConnectInfo::database` (a file path or
/// `:memory:`); column metadata carries no owning-table name because the
/// plain statement API does not expose one.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDriver;

pub struct SqliteConnection {
    conn: Connection,
}

impl Driver for SqliteDriver {
    type Conn = SqliteConnection;

    fn connect(&self, info: &ConnectInfo) -> Result<Self::Conn, DriverError> {
        let conn = if info.database == ":memory:" {
            Connection::open_in_memory()
        } else {
            Connection::open(&info.database)
        }
        .map_err(map_native_error)?;
        Ok(SqliteConnection { conn })
    }

    fn thread_safe(&self) -> bool {
        // The bundled library is compiled with SQLITE_THREADSAFE=1.
        true
    }
}

impl DriverConnection for SqliteConnection {
    fn execute(&mut self, sql: &str) -> Result<u64, DriverError> {
        self.conn.execute_batch(sql).map_err(map_native_error)?;
        Ok(self.conn.changes())
    }

    fn query(&mut self, sql: &str) -> Result<RawResult, DriverError> {
        let mut stmt = self.conn.prepare(sql).map_err(map_native_error)?;
        run_query(&mut stmt, &[], false)
    }

    fn prepare(&mut self, sql: &str) -> Result<usize, DriverError> {
        let stmt = self.conn.prepare_cached(sql).map_err(map_native_error)?;
        Ok(stmt.parameter_count())
    }

    fn execute_prepared(&mut self, sql: &str, params: &[SqlValue]) -> Result<u64, DriverError> {
        let mut stmt = self.conn.prepare_cached(sql).map_err(map_native_error)?;
        let values: Vec<rusqlite::types::Value> = params.iter().map(to_sqlite_value).collect();
        let affected = stmt
            .execute(params_from_iter(values))
            .map_err(map_native_error)?;
        Ok(affected as u64)
    }

    fn query_prepared(&mut self, sql: &str, params: &[SqlValue]) -> Result<RawResult, DriverError> {
        let mut stmt = self.conn.prepare_cached(sql).map_err(map_native_error)?;
        run_query(&mut stmt, params, true)
    }

    fn ping(&mut self) -> Result<(), DriverError> {
        self.conn
            .query_row("SELECT 1", [], |_| Ok(()))
            .map_err(map_native_error)
    }

    fn server_version(&self) -> String {
        format!("SQLite {}", rusqlite::version())
    }
}

/// Run one statement and materialize every row.
///
/// With `binary` set, cells keep their native representation (prepared
/// protocol); otherwise every cell is converted to its string form (text
/// protocol). The column type is recorded from the first non-null cell seen,
/// before any conversion.
fn run_query(
    stmt: &mut rusqlite::Statement<'_>,
    params: &[SqlValue],
    binary: bool,
) -> Result<RawResult, DriverError> {
    let names: Vec<String> = stmt
        .column_names()
        .iter()
        .map(ToString::to_string)
        .collect();
    let column_count = names.len();
    let mut column_types: Vec<Option<(FieldType, &'static str)>> = vec![None; column_count];

    let values: Vec<rusqlite::types::Value> = params.iter().map(to_sqlite_value).collect();
    let mut rows = stmt
        .query(params_from_iter(values))
        .map_err(map_native_error)?;

    let mut out = Vec::new();
    while let Some(row) = rows.next().map_err(map_native_error)? {
        let mut cells = Vec::with_capacity(column_count);
        for (index, column_type) in column_types.iter_mut().enumerate() {
            let cell = row.get_ref(index).map_err(map_native_error)?;
            match cell {
                ValueRef::Null => cells.push(SqlValue::Null),
                ValueRef::Integer(v) => {
                    column_type.get_or_insert((FieldType::Int64, "INTEGER"));
                    cells.push(if binary {
                        SqlValue::Int64(v)
                    } else {
                        SqlValue::Text(v.to_string())
                    });
                }
                ValueRef::Real(v) => {
                    column_type.get_or_insert((FieldType::Double, "REAL"));
                    cells.push(if binary {
                        SqlValue::Double(v)
                    } else {
                        SqlValue::Text(v.to_string())
                    });
                }
                ValueRef::Text(bytes) => {
                    column_type.get_or_insert((FieldType::Binary, "TEXT"));
                    cells.push(SqlValue::Text(String::from_utf8_lossy(bytes).into_owned()));
                }
                ValueRef::Blob(bytes) => {
                    column_type.get_or_insert((FieldType::Binary, "BLOB"));
                    cells.push(SqlValue::Blob(bytes.to_vec()));
                }
            }
        }
        out.push(cells);
    }

    let affected = out.len() as u64;
    let columns = names
        .into_iter()
        .zip(column_types)
        .enumerate()
        .map(|(index, (name, column_type))| {
            let (field_type, type_name) = column_type.unwrap_or((FieldType::Null, "NULL"));
            FieldMetadata {
                table: String::new(),
                name: name.clone(),
                alias: name,
                type_name: type_name.to_string(),
                index: index as u32,
                field_type,
                binary,
            }
        })
        .collect();

    Ok(RawResult {
        columns,
        rows: out,
        affected,
    })
}

fn to_sqlite_value(value: &SqlValue) -> rusqlite::types::Value {
    use rusqlite::types::Value;
    match value {
        SqlValue::Bool(b) => Value::Integer(i64::from(*b)),
        SqlValue::Int8(v) => Value::Integer(i64::from(*v)),
        SqlValue::UInt8(v) => Value::Integer(i64::from(*v)),
        SqlValue::Int16(v) => Value::Integer(i64::from(*v)),
        SqlValue::UInt16(v) => Value::Integer(i64::from(*v)),
        SqlValue::Int32(v) => Value::Integer(i64::from(*v)),
        SqlValue::UInt32(v) => Value::Integer(i64::from(*v)),
        SqlValue::Int64(v) => Value::Integer(*v),
        // SQLite has no unsigned 64-bit storage class; values past i64::MAX
        // travel as decimal text.
        SqlValue::UInt64(v) => match i64::try_from(*v) {
            Ok(v) => Value::Integer(v),
            Err(_) => Value::Text(v.to_string()),
        },
        SqlValue::Float(v) => Value::Real(f64::from(*v)),
        SqlValue::Double(v) => Value::Real(*v),
        SqlValue::Text(s) => Value::Text(s.clone()),
        SqlValue::Blob(bytes) => Value::Blob(bytes.clone()),
        SqlValue::Timestamp(dt) => Value::Text(dt.format("%F %T%.f").to_string()),
        SqlValue::Null => Value::Null,
    }
}

fn map_native_error(err: rusqlite::Error) -> DriverError {
    match err {
        rusqlite::Error::SqliteFailure(native, message) => {
            let message = message.unwrap_or_else(|| native.to_string());
            DriverError::new(
                classify(native.code, &message),
                native.extended_code,
                message,
            )
        }
        other => DriverError::new(ErrorClass::Unclassified, -1, other.to_string()),
    }
}

fn classify(code: rusqlite::ErrorCode, message: &str) -> ErrorClass {
    use rusqlite::ErrorCode;

    // Schema drift surfaces as generic errors; the message is the only
    // reliable signal.
    let lowered = message.to_ascii_lowercase();
    if lowered.contains("no such table")
        || lowered.contains("no such column")
        || lowered.contains("syntax error")
    {
        return ErrorClass::SchemaDefect;
    }

    match code {
        ErrorCode::SystemIoFailure | ErrorCode::CannotOpen | ErrorCode::NotADatabase => {
            ErrorClass::ConnectionLoss
        }
        ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked => ErrorClass::Contention,
        ErrorCode::ConstraintViolation
        | ErrorCode::TypeMismatch
        | ErrorCode::ParameterOutOfRange
        | ErrorCode::TooBig => ErrorClass::MalformedQuery,
        _ => ErrorClass::Unclassified,
    }
}
