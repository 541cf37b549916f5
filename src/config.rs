use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Connection parameters shared by every connection a pool opens.
///
/// Deserializable so applications can load it straight from their config
/// file. The bundled SQLite driver only consumes `database` (a file path or
/// `:memory:`); a networked driver would consume all five fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectInfo {
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
    pub database: String,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub port: u16,
}

impl ConnectInfo {
    /// Connection info for an in-memory database, handy in tests.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::with_database(":memory:")
    }

    /// Connection info addressing `database` with everything else defaulted.
    #[must_use]
    pub fn with_database(database: impl Into<String>) -> Self {
        Self {
            user: String::new(),
            password: String::new(),
            database: database.into(),
            host: String::new(),
            port: 0,
        }
    }
}

/// Bounds for the reconnect state machine a connection enters when the
/// driver reports connection loss.
///
/// Once `max_attempts` consecutive reopen attempts fail the process aborts;
/// a connection is never left spinning on a dead handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconnectPolicy {
    /// Reopen attempts before giving up.
    pub max_attempts: u32,
    /// Sleep between failed attempts.
    pub delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay: Duration::from_secs(3),
        }
    }
}
