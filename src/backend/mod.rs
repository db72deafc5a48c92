//! Database backend subsystem.
//!
//! # Data Flow
//! ```text
//! HealthProber ──probe(backend, descriptor)──▶ Driver
//! Worker ──connect(target)──▶ Driver ──▶ Connection
//! Worker ──run(connection, workload, slot, target)──▶ Driver
//!                                                     │
//!                          DatabaseDriver dispatches on BackendClass
//!                              ├── mysql.rs    (sqlx MySQL)
//!                              ├── postgres.rs (sqlx PostgreSQL)
//!                              └── mongo.rs    (mongodb driver)
//! ```
//!
//! # Design Decisions
//! - The orchestrator only sees the `Driver` trait; tests plug in fakes
//! - Backend selection is one `match` on a closed enum, not string keys
//! - Every driver error is classified as connection-lost or not; workers
//!   reconnect only on the former

pub mod mongo;
pub mod mysql;
pub mod postgres;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::health::ProbeOutcome;
use crate::target::{BackendClass, Target, Workload};

/// Errors returned by backend drivers.
#[derive(Debug, Error)]
pub enum DriverError {
    /// Could not establish a connection.
    #[error("connect failed: {0}")]
    Connect(String),

    /// The connection broke; the worker must reconnect.
    #[error("connection lost: {0}")]
    ConnectionLost(String),

    /// A query or command failed; the connection is still usable.
    #[error("query failed: {0}")]
    Query(String),

    /// The operation did not complete in time.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// A connection handle of one backend was handed to another.
    #[error("connection is for {actual}, target is {expected}")]
    BackendMismatch {
        expected: BackendClass,
        actual: BackendClass,
    },
}

impl DriverError {
    pub fn is_connection_lost(&self) -> bool {
        matches!(
            self,
            DriverError::ConnectionLost(_) | DriverError::Timeout(_) | DriverError::BackendMismatch { .. }
        )
    }
}

impl From<sqlx::Error> for DriverError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolClosed
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::WorkerCrashed
            | sqlx::Error::Protocol(_) => DriverError::ConnectionLost(e.to_string()),
            other => DriverError::Query(other.to_string()),
        }
    }
}

impl From<::mongodb::error::Error> for DriverError {
    fn from(e: ::mongodb::error::Error) -> Self {
        use ::mongodb::error::ErrorKind;
        match *e.kind {
            ErrorKind::Io(_) | ErrorKind::ServerSelection { .. } | ErrorKind::ConnectionPoolCleared { .. } => {
                DriverError::ConnectionLost(e.to_string())
            }
            _ => DriverError::Query(e.to_string()),
        }
    }
}

/// Connect, probe and workload dispatch for database targets.
#[async_trait]
pub trait Driver: Send + Sync + 'static {
    /// Connection held by one worker for its lifetime.
    type Connection: Send + 'static;

    /// Connect and ping once. Must not panic; timeouts are applied by the caller.
    async fn probe(&self, backend: BackendClass, descriptor: &str) -> ProbeOutcome;

    /// Open a dedicated connection for one worker slot.
    async fn connect(&self, target: &Target) -> Result<Self::Connection, DriverError>;

    /// Run one iteration of a workload.
    async fn run(
        &self,
        connection: &mut Self::Connection,
        workload: Workload,
        slot: usize,
        target: &Target,
    ) -> Result<(), DriverError>;
}

/// A live connection to one of the supported databases.
pub enum Connection {
    MySql(sqlx::MySqlConnection),
    Postgres(sqlx::PgConnection),
    MongoDb(::mongodb::Database),
}

impl Connection {
    pub fn backend(&self) -> BackendClass {
        match self {
            Connection::MySql(_) => BackendClass::MySql,
            Connection::Postgres(_) => BackendClass::Postgres,
            Connection::MongoDb(_) => BackendClass::MongoDb,
        }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Connection({})", self.backend())
    }
}

/// Production driver for MySQL, PostgreSQL and MongoDB.
#[derive(Debug, Clone, Default)]
pub struct DatabaseDriver;

impl DatabaseDriver {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Driver for DatabaseDriver {
    type Connection = Connection;

    async fn probe(&self, backend: BackendClass, descriptor: &str) -> ProbeOutcome {
        match backend {
            BackendClass::MySql => mysql::probe(descriptor).await,
            BackendClass::Postgres => postgres::probe(descriptor).await,
            BackendClass::MongoDb => mongo::probe(descriptor).await,
        }
    }

    async fn connect(&self, target: &Target) -> Result<Connection, DriverError> {
        match target.backend {
            BackendClass::MySql => mysql::connect(&target.connection_string)
                .await
                .map(Connection::MySql),
            BackendClass::Postgres => postgres::connect(&target.connection_string)
                .await
                .map(Connection::Postgres),
            BackendClass::MongoDb => mongo::connect(target).await.map(Connection::MongoDb),
        }
    }

    async fn run(
        &self,
        connection: &mut Connection,
        workload: Workload,
        slot: usize,
        target: &Target,
    ) -> Result<(), DriverError> {
        match connection {
            Connection::MySql(conn) if target.backend == BackendClass::MySql => {
                mysql::run(conn, workload, slot).await
            }
            Connection::Postgres(conn) if target.backend == BackendClass::Postgres => {
                postgres::run(conn, workload, slot).await
            }
            Connection::MongoDb(db) if target.backend == BackendClass::MongoDb => {
                mongo::run(db, workload, slot).await
            }
            other => Err(DriverError::BackendMismatch {
                expected: target.backend,
                actual: other.backend(),
            }),
        }
    }
}
