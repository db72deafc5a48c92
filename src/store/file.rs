//! TOML file config store.
//!
//! The file holds one `[[targets]]` table per target:
//!
//! ```toml
//! [[targets]]
//! id = "mysql-1"
//! backend = "mysql"
//! connection_string = "root:password@tcp(127.0.0.1:3306)/github"
//! enabled = true
//! connections = 4
//! switch1 = true
//! sleep_ms = 100
//! ```
//!
//! The file is re-read on every call, so edits are picked up by the next
//! registry refresh. Values of any TOML scalar type are accepted and kept as
//! strings; typing happens when records are parsed into targets.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use dashmap::DashMap;

use crate::store::{ConfigStore, StoreError};
use crate::target::{BackendClass, TargetId, TargetRecord};

/// Config store reading target tables from a TOML file.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    /// Status write-back stays in memory; writing the file would re-trigger the watcher.
    statuses: DashMap<TargetId, String>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            statuses: DashMap::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Last status reported for a target.
    pub fn status(&self, id: &TargetId) -> Option<String> {
        self.statuses.get(id).map(|s| s.clone())
    }

    async fn read_all(&self) -> Result<Vec<TargetRecord>, StoreError> {
        let content = tokio::fs::read_to_string(&self.path).await?;
        parse_records(&content)
    }
}

/// Parse the targets file into raw records.
///
/// Non-table entries are skipped with a warning; whether a table is a valid
/// target is decided later, per record.
pub fn parse_records(content: &str) -> Result<Vec<TargetRecord>, StoreError> {
    let doc: toml::Table = toml::from_str(content).map_err(|e| StoreError::Parse(e.to_string()))?;

    let Some(entries) = doc.get("targets") else {
        return Ok(Vec::new());
    };
    let entries = entries
        .as_array()
        .ok_or_else(|| StoreError::Parse("'targets' must be an array of tables".into()))?;

    let mut records = Vec::with_capacity(entries.len());
    for (index, entry) in entries.iter().enumerate() {
        let Some(table) = entry.as_table() else {
            tracing::warn!(index, "Skipping non-table entry in targets file");
            continue;
        };
        let mut record = TargetRecord::new();
        for (key, value) in table {
            match scalar_to_string(value) {
                Some(v) => record.set(key, v),
                None => tracing::warn!(index, key = %key, "Ignoring non-scalar target field"),
            }
        }
        records.push(record);
    }
    Ok(records)
}

fn scalar_to_string(value: &toml::Value) -> Option<String> {
    match value {
        toml::Value::String(s) => Some(s.clone()),
        toml::Value::Integer(i) => Some(i.to_string()),
        toml::Value::Float(f) => Some(f.to_string()),
        toml::Value::Boolean(b) => Some(b.to_string()),
        toml::Value::Datetime(d) => Some(d.to_string()),
        toml::Value::Array(_) | toml::Value::Table(_) => None,
    }
}

#[async_trait]
impl ConfigStore for FileStore {
    async fn list_targets(&self, backend: BackendClass) -> Result<Vec<TargetRecord>, StoreError> {
        Ok(self
            .read_all()
            .await?
            .into_iter()
            .filter(|r| r.backend() == Some(backend))
            .collect())
    }

    async fn get_target(&self, id: &TargetId) -> Result<Option<TargetRecord>, StoreError> {
        Ok(self
            .read_all()
            .await?
            .into_iter()
            .find(|r| r.id() == Some(id.as_str())))
    }

    async fn report_status(&self, id: &TargetId, status: &str) -> Result<(), StoreError> {
        tracing::debug!(target_id = %id, status = %status, "Target status updated");
        self.statuses.insert(id.clone(), status.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::Target;

    const SAMPLE: &str = r#"
[[targets]]
id = "mysql-1"
backend = "mysql"
connection_string = "root:pw@tcp(127.0.0.1:3306)/github"
enabled = true
connections = 3
switch1 = true

[[targets]]
id = "pg-1"
backend = "postgres"
connection_string = "postgres://app:pw@127.0.0.1/github"
connections = "2"
sleep_ms = 0
"#;

    #[test]
    fn test_parse_records_stringifies_scalars() {
        let records = parse_records(SAMPLE).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].get("connections"), Some("3"));
        assert_eq!(records[0].get("enabled"), Some("true"));
        assert_eq!(records[1].get("connections"), Some("2"));

        let pg = Target::try_from(&records[1]).unwrap();
        assert_eq!(pg.connections, 2);
        assert_eq!(pg.sleep_ms, 0);
        assert!(!pg.enabled);
    }

    #[test]
    fn test_empty_file_has_no_targets() {
        assert!(parse_records("").unwrap().is_empty());
    }

    #[test]
    fn test_invalid_toml_is_parse_error() {
        assert!(matches!(parse_records("[[targets]\nid="), Err(StoreError::Parse(_))));
    }

    #[tokio::test]
    async fn test_file_store_reads_on_each_call() {
        let path = std::env::temp_dir().join(format!("loadgen-targets-{}.toml", fastrand::u64(..)));
        tokio::fs::write(&path, SAMPLE).await.unwrap();

        let store = FileStore::new(&path);
        assert_eq!(store.list_targets(BackendClass::MySql).await.unwrap().len(), 1);
        assert!(store.get_target(&"pg-1".into()).await.unwrap().is_some());

        tokio::fs::write(&path, "").await.unwrap();
        assert!(store.list_targets(BackendClass::MySql).await.unwrap().is_empty());

        let _ = tokio::fs::remove_file(&path).await;
    }

    #[tokio::test]
    async fn test_missing_file_is_io_error() {
        let store = FileStore::new("/nonexistent/loadgen/targets.toml");
        assert!(matches!(
            store.list_targets(BackendClass::MySql).await,
            Err(StoreError::Io(_))
        ));
    }
}
