//! MySQL driver.
//!
//! Accepts either a `mysql://` URL or the `user:pass@tcp(host:port)/db`
//! DSN form stored by the control panel.

use sqlx::{Connection, MySqlConnection};

use crate::backend::DriverError;
use crate::health::ProbeOutcome;
use crate::target::Workload;

/// Convert a stored descriptor into a URL sqlx understands.
pub fn connection_url(descriptor: &str) -> Result<String, String> {
    let descriptor = descriptor.trim();
    if descriptor.starts_with("mysql://") || descriptor.starts_with("mariadb://") {
        return Ok(descriptor.to_string());
    }

    let (creds, rest) = descriptor.rsplit_once('@').unwrap_or(("", descriptor));
    let rest = rest
        .strip_prefix("tcp(")
        .ok_or_else(|| format!("unsupported MySQL descriptor (expected tcp(host:port)): {}", crate::target::redact(descriptor)))?;
    let (addr, path) = rest
        .split_once(')')
        .ok_or_else(|| "unterminated tcp( in MySQL descriptor".to_string())?;
    let (host, port) = match addr.rsplit_once(':') {
        Some((h, p)) => (h, Some(p.parse::<u16>().map_err(|_| format!("invalid MySQL port '{}'", p))?)),
        None => (addr, None),
    };

    let mut url = url::Url::parse("mysql://localhost").map_err(|e| e.to_string())?;
    url.set_host(Some(host)).map_err(|e| e.to_string())?;
    url.set_port(port).map_err(|_| "cannot set MySQL port".to_string())?;
    if !creds.is_empty() {
        let (user, pass) = creds.split_once(':').unwrap_or((creds, ""));
        url.set_username(user).map_err(|_| "cannot set MySQL user".to_string())?;
        if !pass.is_empty() {
            url.set_password(Some(pass)).map_err(|_| "cannot set MySQL password".to_string())?;
        }
    }
    // DSN options such as parseTime have no sqlx equivalent.
    let db = path.split('?').next().unwrap_or(path);
    url.set_path(db);
    Ok(url.to_string())
}

fn is_unknown_database(e: &sqlx::Error) -> bool {
    match e {
        sqlx::Error::Database(db) => db.message().contains("Unknown database"),
        _ => false,
    }
}

pub async fn probe(descriptor: &str) -> ProbeOutcome {
    let url = match connection_url(descriptor) {
        Ok(url) => url,
        Err(e) => return ProbeOutcome::Unhealthy(e),
    };
    match MySqlConnection::connect(&url).await {
        Ok(mut conn) => {
            let ping = conn.ping().await;
            let _ = conn.close().await;
            match ping {
                Ok(()) => ProbeOutcome::Healthy,
                Err(e) => ProbeOutcome::Unhealthy(e.to_string()),
            }
        }
        Err(e) if is_unknown_database(&e) => ProbeOutcome::SchemaMissing,
        Err(e) => ProbeOutcome::Unhealthy(e.to_string()),
    }
}

pub async fn connect(descriptor: &str) -> Result<MySqlConnection, DriverError> {
    let url = connection_url(descriptor).map_err(DriverError::Connect)?;
    MySqlConnection::connect(&url)
        .await
        .map_err(|e| DriverError::Connect(e.to_string()))
}

pub async fn run(conn: &mut MySqlConnection, workload: Workload, slot: usize) -> Result<(), DriverError> {
    match workload {
        Workload::Repositories => repositories(conn, slot).await,
        Workload::Pulls => pulls(conn, slot).await,
        Workload::RepositoryPulls if slot % 2 == 1 => repository_pulls(conn).await,
        Workload::RecentPulls if slot % 2 == 1 => recent_pulls(conn).await,
        Workload::RepositoryPulls | Workload::RecentPulls => Ok(()),
    }
}

async fn random_id(conn: &mut MySqlConnection, query: &str) -> Result<Option<i64>, DriverError> {
    let ids: Vec<i64> = sqlx::query_scalar(query).fetch_all(&mut *conn).await?;
    if ids.is_empty() {
        return Ok(None);
    }
    Ok(Some(ids[fastrand::usize(..ids.len())]))
}

async fn repositories(conn: &mut MySqlConnection, slot: usize) -> Result<(), DriverError> {
    let Some(id) = random_id(conn, "SELECT DISTINCT id FROM repositories").await? else {
        return Ok(());
    };
    let data: Option<String> = sqlx::query_scalar("SELECT CAST(data AS CHAR) FROM repositories WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    let Some(data) = data else {
        return Ok(());
    };

    sqlx::query("INSERT INTO repositoriesTest (id, data) VALUES (?, ?) ON DUPLICATE KEY UPDATE data = VALUES(data)")
        .bind(id)
        .bind(&data)
        .execute(&mut *conn)
        .await?;

    // Odd slots clean up so the test table does not grow without bound.
    if slot % 2 == 1 {
        sqlx::query("DELETE FROM repositoriesTest WHERE id = ?")
            .bind(id)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

async fn pulls(conn: &mut MySqlConnection, slot: usize) -> Result<(), DriverError> {
    let Some(id) = random_id(conn, "SELECT DISTINCT id FROM pulls").await? else {
        return Ok(());
    };
    let row: Option<(String, String)> =
        sqlx::query_as("SELECT repo, CAST(data AS CHAR) FROM pulls WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;
    let Some((repo, data)) = row else {
        return Ok(());
    };

    sqlx::query("INSERT INTO pullsTest (id, repo, data) VALUES (?, ?, ?) ON DUPLICATE KEY UPDATE data = VALUES(data)")
        .bind(id)
        .bind(&repo)
        .bind(&data)
        .execute(&mut *conn)
        .await?;

    sqlx::query("INSERT INTO pulls (id, repo, data) VALUES (?, ?, ?) ON DUPLICATE KEY UPDATE data = VALUES(data)")
        .bind(id)
        .bind(&repo)
        .bind(&data)
        .execute(&mut *conn)
        .await?;

    if slot % 2 == 1 {
        sqlx::query("DELETE FROM pullsTest WHERE id = ?")
            .bind(id)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

async fn repository_pulls(conn: &mut MySqlConnection) -> Result<(), DriverError> {
    let repo: Option<String> = sqlx::query_scalar(
        "SELECT repo FROM (SELECT DISTINCT repo FROM pulls) AS uniq_repos ORDER BY RAND() LIMIT 1",
    )
    .fetch_optional(&mut *conn)
    .await?;
    let Some(repo) = repo else {
        return Ok(());
    };

    let _: Vec<String> = sqlx::query_scalar("SELECT CAST(data AS CHAR) FROM pulls WHERE repo = ? ORDER BY id ASC LIMIT 10")
        .bind(&repo)
        .fetch_all(&mut *conn)
        .await?;
    Ok(())
}

async fn recent_pulls(conn: &mut MySqlConnection) -> Result<(), DriverError> {
    let _: Vec<String> = sqlx::query_scalar(
        "SELECT CAST(data AS CHAR) FROM pulls \
         WHERE STR_TO_DATE(JSON_UNQUOTE(JSON_EXTRACT(data, '$.created_at')), '%Y-%m-%dT%H:%i:%sZ') >= NOW() - INTERVAL 3 MONTH \
         LIMIT 10",
    )
    .fetch_all(&mut *conn)
    .await?;
    Ok(())
}
