//! Target definitions.
//!
//! # Data Flow
//! ```text
//! config store (raw field map)
//!     → record.rs (TargetRecord, string fields as stored)
//!     → Target::try_from (semantic checks)
//!     → Target (validated, immutable, shared via Arc)
//! ```
//!
//! # Design Decisions
//! - The orchestrator only reads targets; the store owner creates and deletes them
//! - A malformed record never poisons other records
//! - Backend class is a closed enum, no string matching past parsing

pub mod record;

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use record::{MalformedTarget, TargetRecord};

/// Unique identifier of a target (e.g. `mysql-1`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TargetId(pub String);

impl TargetId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TargetId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Supported database kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendClass {
    #[serde(rename = "mysql")]
    MySql,
    Postgres,
    #[serde(rename = "mongodb")]
    MongoDb,
}

impl BackendClass {
    pub const ALL: [BackendClass; 3] = [BackendClass::MySql, BackendClass::Postgres, BackendClass::MongoDb];

    pub fn as_str(&self) -> &'static str {
        match self {
            BackendClass::MySql => "mysql",
            BackendClass::Postgres => "postgres",
            BackendClass::MongoDb => "mongodb",
        }
    }
}

impl fmt::Display for BackendClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mysql" => Ok(BackendClass::MySql),
            "postgres" | "postgresql" => Ok(BackendClass::Postgres),
            "mongodb" | "mongo" => Ok(BackendClass::MongoDb),
            other => Err(format!("unknown backend class '{}'", other)),
        }
    }
}

/// One of the four workload switches exposed by the control panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Workload {
    /// Random repository read, upsert into the test table.
    Repositories,
    /// Random pull request read, upsert into the test table.
    Pulls,
    /// Pull listing for a random repository.
    RepositoryPulls,
    /// Pull requests created in the last three months.
    RecentPulls,
}

impl Workload {
    pub fn as_str(&self) -> &'static str {
        match self {
            Workload::Repositories => "switch1",
            Workload::Pulls => "switch2",
            Workload::RepositoryPulls => "switch3",
            Workload::RecentPulls => "switch4",
        }
    }
}

/// Named booleans selecting which workloads a worker runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadFlags {
    pub switch1: bool,
    pub switch2: bool,
    pub switch3: bool,
    pub switch4: bool,
}

impl WorkloadFlags {
    /// Enabled workloads in switch order.
    pub fn enabled(&self) -> Vec<Workload> {
        let mut out = Vec::with_capacity(4);
        if self.switch1 {
            out.push(Workload::Repositories);
        }
        if self.switch2 {
            out.push(Workload::Pulls);
        }
        if self.switch3 {
            out.push(Workload::RepositoryPulls);
        }
        if self.switch4 {
            out.push(Workload::RecentPulls);
        }
        out
    }

    pub fn any(&self) -> bool {
        self.switch1 || self.switch2 || self.switch3 || self.switch4
    }
}

/// A validated target definition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Target {
    pub id: TargetId,
    pub backend: BackendClass,
    /// Opaque connection descriptor (DSN or URI).
    pub connection_string: String,
    /// Database name, required for MongoDB.
    pub database: Option<String>,
    pub enabled: bool,
    /// Desired number of concurrent workers.
    pub connections: usize,
    pub workloads: WorkloadFlags,
    /// Delay between worker iterations in milliseconds.
    pub sleep_ms: u64,
    /// Display order in the control panel.
    pub position: i64,
}

impl Target {
    pub fn inter_iteration_delay(&self) -> Duration {
        Duration::from_millis(self.sleep_ms)
    }

    /// Connection string with any password masked, for logs.
    pub fn redacted_descriptor(&self) -> String {
        redact(&self.connection_string)
    }
}

/// Mask the password component of a URL-shaped descriptor.
///
/// MySQL DSNs in `user:pass@tcp(host)/db` form are not URLs; the credentials
/// prefix is masked by hand for those.
pub fn redact(descriptor: &str) -> String {
    if let Ok(mut parsed) = url::Url::parse(descriptor) {
        if parsed.password().is_some() && parsed.set_password(Some("****")).is_ok() {
            return parsed.to_string();
        }
        if parsed.has_host() {
            return descriptor.to_string();
        }
    }
    match descriptor.split_once('@') {
        Some((creds, rest)) => match creds.split_once(':') {
            Some((user, _)) => format!("{}:****@{}", user, rest),
            None => descriptor.to_string(),
        },
        None => descriptor.to_string(),
    }
}
