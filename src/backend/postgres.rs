//! PostgreSQL driver.
//!
//! Workload tables live in the `github` schema; `data` is JSON and is
//! read back as text.

use sqlx::{Connection, PgConnection};

use crate::backend::DriverError;
use crate::health::ProbeOutcome;
use crate::target::Workload;

/// SQLSTATE for "database does not exist".
const INVALID_CATALOG_NAME: &str = "3D000";

fn is_missing_database(e: &sqlx::Error) -> bool {
    match e {
        sqlx::Error::Database(db) => {
            db.code().as_deref() == Some(INVALID_CATALOG_NAME) || db.message().contains("does not exist")
        }
        _ => false,
    }
}

pub async fn probe(descriptor: &str) -> ProbeOutcome {
    match PgConnection::connect(descriptor.trim()).await {
        Ok(mut conn) => {
            let ping = conn.ping().await;
            let _ = conn.close().await;
            match ping {
                Ok(()) => ProbeOutcome::Healthy,
                Err(e) => ProbeOutcome::Unhealthy(e.to_string()),
            }
        }
        Err(e) if is_missing_database(&e) => ProbeOutcome::SchemaMissing,
        Err(e) => ProbeOutcome::Unhealthy(e.to_string()),
    }
}

pub async fn connect(descriptor: &str) -> Result<PgConnection, DriverError> {
    PgConnection::connect(descriptor.trim())
        .await
        .map_err(|e| DriverError::Connect(e.to_string()))
}

pub async fn run(conn: &mut PgConnection, workload: Workload, slot: usize) -> Result<(), DriverError> {
    match workload {
        Workload::Repositories => repositories(conn, slot).await,
        Workload::Pulls => pulls(conn, slot).await,
        // Read-only scans run on even slots here, odd slots on MySQL.
        Workload::RepositoryPulls if slot % 2 == 0 => repository_pulls(conn).await,
        Workload::RecentPulls if slot % 2 == 0 => recent_pulls(conn).await,
        Workload::RepositoryPulls | Workload::RecentPulls => Ok(()),
    }
}

async fn random_id(conn: &mut PgConnection, query: &str) -> Result<Option<i64>, DriverError> {
    let ids: Vec<i64> = sqlx::query_scalar(query).fetch_all(&mut *conn).await?;
    if ids.is_empty() {
        return Ok(None);
    }
    Ok(Some(ids[fastrand::usize(..ids.len())]))
}

async fn repositories(conn: &mut PgConnection, slot: usize) -> Result<(), DriverError> {
    let Some(id) = random_id(conn, "SELECT DISTINCT id::bigint FROM github.repositories").await? else {
        return Ok(());
    };
    let data: Option<String> = sqlx::query_scalar("SELECT data::text FROM github.repositories WHERE id = $1")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    let Some(data) = data else {
        return Ok(());
    };

    sqlx::query(
        "INSERT INTO github.repositories_test (id, data) VALUES ($1, $2::jsonb) \
         ON CONFLICT (id) DO UPDATE SET data = EXCLUDED.data",
    )
    .bind(id)
    .bind(&data)
    .execute(&mut *conn)
    .await?;

    if slot % 2 == 1 {
        sqlx::query("DELETE FROM github.repositories_test WHERE id = $1")
            .bind(id)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

async fn pulls(conn: &mut PgConnection, slot: usize) -> Result<(), DriverError> {
    let Some(id) = random_id(conn, "SELECT DISTINCT id::bigint FROM github.pulls").await? else {
        return Ok(());
    };
    let row: Option<(String, String)> =
        sqlx::query_as("SELECT repo, data::text FROM github.pulls WHERE id = $1 LIMIT 1")
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;
    let Some((repo, data)) = row else {
        return Ok(());
    };

    sqlx::query(
        "INSERT INTO github.pulls_test (id, repo, data) VALUES ($1, $2, $3::jsonb) \
         ON CONFLICT (id, repo) DO UPDATE SET data = EXCLUDED.data",
    )
    .bind(id)
    .bind(&repo)
    .bind(&data)
    .execute(&mut *conn)
    .await?;

    sqlx::query(
        "INSERT INTO github.pulls (id, repo, data) VALUES ($1, $2, $3::jsonb) \
         ON CONFLICT (id, repo) DO UPDATE SET data = EXCLUDED.data",
    )
    .bind(id)
    .bind(&repo)
    .bind(&data)
    .execute(&mut *conn)
    .await?;

    if slot % 2 == 1 {
        sqlx::query("DELETE FROM github.pulls_test WHERE id = $1")
            .bind(id)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

async fn repository_pulls(conn: &mut PgConnection) -> Result<(), DriverError> {
    let repo: Option<String> = sqlx::query_scalar(
        "SELECT repo FROM (SELECT DISTINCT repo FROM github.pulls) AS uniq_repos ORDER BY RANDOM() LIMIT 1",
    )
    .fetch_optional(&mut *conn)
    .await?;
    let Some(repo) = repo else {
        return Ok(());
    };

    let _: Vec<String> =
        sqlx::query_scalar("SELECT data::text FROM github.pulls WHERE repo = $1 ORDER BY id ASC LIMIT 10")
            .bind(&repo)
            .fetch_all(&mut *conn)
            .await?;
    Ok(())
}

async fn recent_pulls(conn: &mut PgConnection) -> Result<(), DriverError> {
    let _: Vec<String> = sqlx::query_scalar(
        "SELECT data::text FROM github.pulls \
         WHERE to_timestamp((data->>'created_at')::text, 'YYYY-MM-DD\"T\"HH24:MI:SS\"Z\"') >= NOW() - INTERVAL '3 months' \
         LIMIT 10",
    )
    .fetch_all(&mut *conn)
    .await?;
    Ok(())
}
