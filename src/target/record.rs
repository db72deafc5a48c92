//! Raw target records as held by the config store.
//!
//! The store keeps one flat string map per target, the same shape the control
//! panel writes. Parsing into [`Target`] happens here so every store backend
//! shares the same validation.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::target::{BackendClass, Target, TargetId, WorkloadFlags};

pub const FIELD_ID: &str = "id";
pub const FIELD_BACKEND: &str = "backend";
pub const FIELD_CONNECTION_STRING: &str = "connection_string";
pub const FIELD_DATABASE: &str = "database";
pub const FIELD_ENABLED: &str = "enabled";
pub const FIELD_CONNECTIONS: &str = "connections";
pub const FIELD_SLEEP_MS: &str = "sleep_ms";
pub const FIELD_POSITION: &str = "position";
pub const FIELD_CONNECTION_STATUS: &str = "connection_status";

const DEFAULT_SLEEP_MS: u64 = 100;

/// A target record that could not be turned into a [`Target`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("malformed target '{id}': {reason}")]
pub struct MalformedTarget {
    /// Record id, or `<unknown>` when the id itself is missing.
    pub id: String,
    pub reason: String,
}

/// Flat string field map for one target.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TargetRecord {
    pub fields: BTreeMap<String, String>,
}

impl TargetRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style field setter.
    pub fn with(mut self, key: &str, value: impl ToString) -> Self {
        self.fields.insert(key.to_string(), value.to_string());
        self
    }

    pub fn set(&mut self, key: &str, value: impl ToString) {
        self.fields.insert(key.to_string(), value.to_string());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    pub fn id(&self) -> Option<&str> {
        self.get(FIELD_ID).filter(|id| !id.trim().is_empty())
    }

    /// Backend class, if present and recognised.
    pub fn backend(&self) -> Option<BackendClass> {
        self.get(FIELD_BACKEND).and_then(|b| b.parse().ok())
    }

    fn malformed(&self, reason: impl Into<String>) -> MalformedTarget {
        MalformedTarget {
            id: self.id().unwrap_or("<unknown>").to_string(),
            reason: reason.into(),
        }
    }

    fn parse_bool(&self, key: &str, default: bool) -> Result<bool, MalformedTarget> {
        match self.get(key).map(str::trim) {
            None | Some("") => Ok(default),
            Some(v) => match v.to_ascii_lowercase().as_str() {
                "true" | "1" | "on" => Ok(true),
                "false" | "0" | "off" => Ok(false),
                _ => Err(self.malformed(format!("field '{}' is not a boolean: '{}'", key, v))),
            },
        }
    }

    fn parse_non_negative(&self, key: &str, default: u64) -> Result<u64, MalformedTarget> {
        match self.get(key).map(str::trim) {
            None | Some("") => Ok(default),
            Some(v) => {
                let n: i64 = v
                    .parse()
                    .map_err(|_| self.malformed(format!("field '{}' is not an integer: '{}'", key, v)))?;
                if n < 0 {
                    return Err(self.malformed(format!("field '{}' must be >= 0, got {}", key, n)));
                }
                Ok(n as u64)
            }
        }
    }
}

impl TryFrom<&TargetRecord> for Target {
    type Error = MalformedTarget;

    fn try_from(record: &TargetRecord) -> Result<Self, Self::Error> {
        let id = record
            .id()
            .ok_or_else(|| record.malformed("missing id"))?
            .to_string();

        let backend: BackendClass = record
            .get(FIELD_BACKEND)
            .ok_or_else(|| record.malformed("missing backend"))?
            .parse()
            .map_err(|e: String| record.malformed(e))?;

        let connection_string = record
            .get(FIELD_CONNECTION_STRING)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| record.malformed("missing connection_string"))?
            .to_string();

        let database = record
            .get(FIELD_DATABASE)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        if backend == BackendClass::MongoDb && database.is_none() {
            return Err(record.malformed("mongodb targets require a database"));
        }

        let workloads = WorkloadFlags {
            switch1: record.parse_bool("switch1", false)?,
            switch2: record.parse_bool("switch2", false)?,
            switch3: record.parse_bool("switch3", false)?,
            switch4: record.parse_bool("switch4", false)?,
        };

        let position = match record.get(FIELD_POSITION).map(str::trim) {
            None | Some("") => 0,
            Some(v) => v
                .parse()
                .map_err(|_| record.malformed(format!("field 'position' is not an integer: '{}'", v)))?,
        };

        Ok(Target {
            id: TargetId(id),
            backend,
            connection_string,
            database,
            enabled: record.parse_bool(FIELD_ENABLED, false)?,
            connections: record.parse_non_negative(FIELD_CONNECTIONS, 0)? as usize,
            workloads,
            sleep_ms: record.parse_non_negative(FIELD_SLEEP_MS, DEFAULT_SLEEP_MS)?,
            position,
        })
    }
}

impl From<&Target> for TargetRecord {
    fn from(target: &Target) -> Self {
        let mut record = TargetRecord::new()
            .with(FIELD_ID, &target.id)
            .with(FIELD_BACKEND, target.backend)
            .with(FIELD_CONNECTION_STRING, &target.connection_string)
            .with(FIELD_ENABLED, target.enabled)
            .with(FIELD_CONNECTIONS, target.connections)
            .with("switch1", target.workloads.switch1)
            .with("switch2", target.workloads.switch2)
            .with("switch3", target.workloads.switch3)
            .with("switch4", target.workloads.switch4)
            .with(FIELD_SLEEP_MS, target.sleep_ms)
            .with(FIELD_POSITION, target.position);
        if let Some(db) = &target.database {
            record.set(FIELD_DATABASE, db);
        }
        record
    }
}
