//! Redis-backed cache store shared by every worker process.
//!
//! The client connects lazily and holds one blocking connection. A
//! connection that fails an I/O operation is dropped and re-established on
//! the next call, so a restarted server is picked up without restarting the
//! process.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use redis::{Client, Connection, ConnectionAddr, ConnectionInfo, RedisConnectionInfo, RedisError};
use tracing::debug;

use crate::error::StoreError;
use crate::store::CacheStore;

/// Keys fetched per `SCAN` step when clearing a prefix.
const SCAN_BATCH: usize = 500;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedisConfig {
    pub host: String,
    pub port: u16,
    pub db: i64,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Connect, read and write timeout.
    pub timeout: Duration,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 6379,
            db: 0,
            username: None,
            password: None,
            timeout: Duration::from_secs(5),
        }
    }
}

impl RedisConfig {
    fn connection_info(&self) -> ConnectionInfo {
        ConnectionInfo {
            addr: ConnectionAddr::Tcp(self.host.clone(), self.port),
            redis: RedisConnectionInfo {
                db: self.db,
                username: self.username.clone(),
                password: self.password.clone(),
                ..Default::default()
            },
        }
    }
}

pub struct RedisStore {
    client: Client,
    timeout: Duration,
    connection: Mutex<Option<Connection>>,
}

impl RedisStore {
    /// Validates the configuration without connecting.
    pub fn new(config: &RedisConfig) -> Result<Self, StoreError> {
        let client = Client::open(config.connection_info()).map_err(command_error)?;
        Ok(Self {
            client,
            timeout: config.timeout,
            connection: Mutex::new(None),
        })
    }

    fn connect(&self) -> Result<Connection, StoreError> {
        let connection = self
            .client
            .get_connection_with_timeout(self.timeout)
            .map_err(|err| StoreError::Unreachable(err.to_string()))?;
        connection
            .set_read_timeout(Some(self.timeout))
            .and_then(|()| connection.set_write_timeout(Some(self.timeout)))
            .map_err(command_error)?;
        Ok(connection)
    }

    /// Run `op` on the shared connection, opening it first if needed.
    fn with_connection<T>(
        &self,
        op: impl FnOnce(&mut Connection) -> Result<T, RedisError>,
    ) -> Result<T, StoreError> {
        let mut slot = self.connection.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_none() {
            *slot = Some(self.connect()?);
        }
        let Some(connection) = slot.as_mut() else {
            return Err(StoreError::Unreachable("no connection".to_string()));
        };

        op(connection).map_err(|err| {
            if err.is_io_error() || err.is_connection_dropped() {
                debug!(error = %err, "dropping redis connection");
                *slot = None;
                StoreError::Unreachable(err.to_string())
            } else {
                command_error(err)
            }
        })
    }
}

impl CacheStore for RedisStore {
    fn ping(&self) -> Result<(), StoreError> {
        self.with_connection(|conn| redis::cmd("PING").query::<String>(conn))
            .map(|_| ())
    }

    fn get(&self, key: &str) -> Result<Option<i64>, StoreError> {
        self.with_connection(|conn| redis::cmd("GET").arg(key).query(conn))
    }

    fn set_with_ttl(&self, key: &str, value: i64, ttl: Duration) -> Result<(), StoreError> {
        let seconds = ttl.as_secs().max(1);
        self.with_connection(|conn| {
            redis::cmd("SET")
                .arg(key)
                .arg(value)
                .arg("EX")
                .arg(seconds)
                .query(conn)
        })
    }

    fn delete_prefix(&self, prefix: &str) -> Result<usize, StoreError> {
        let pattern = format!("{}*", escape_glob(prefix));
        self.with_connection(|conn| {
            let mut removed = 0;
            let mut cursor: u64 = 0;
            loop {
                let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                    .arg(cursor)
                    .arg("MATCH")
                    .arg(&pattern)
                    .arg("COUNT")
                    .arg(SCAN_BATCH)
                    .query(conn)?;
                if !keys.is_empty() {
                    removed += redis::cmd("DEL").arg(&keys).query::<usize>(conn)?;
                }
                if next == 0 {
                    return Ok(removed);
                }
                cursor = next;
            }
        })
    }
}

fn command_error(err: RedisError) -> StoreError {
    StoreError::Command(err.to_string())
}

/// Escape glob metacharacters so `prefix` matches literally in `SCAN MATCH`.
fn escape_glob(prefix: &str) -> String {
    let mut escaped = String::with_capacity(prefix.len());
    for c in prefix.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
