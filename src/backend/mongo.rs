//! MongoDB driver.
//!
//! Each worker gets its own client. The target's `database` field names the
//! database; collections mirror the SQL tables.

use std::time::{Duration, SystemTime};

use futures_util::TryStreamExt;
use ::mongodb::bson::{doc, Bson, DateTime, Document};
use ::mongodb::options::ClientOptions;
use ::mongodb::{Client, Collection, Database};

use crate::backend::DriverError;
use crate::health::ProbeOutcome;
use crate::target::{Target, Workload};

const SERVER_SELECTION_TIMEOUT: Duration = Duration::from_secs(5);
const RECENT_WINDOW: Duration = Duration::from_secs(90 * 24 * 60 * 60);
const SCAN_LIMIT: i64 = 100;

async fn client(descriptor: &str) -> Result<Client, ::mongodb::error::Error> {
    let mut options = ClientOptions::parse(descriptor.trim()).await?;
    options.server_selection_timeout = Some(SERVER_SELECTION_TIMEOUT);
    options.connect_timeout = Some(SERVER_SELECTION_TIMEOUT);
    options.app_name = Some("load-generator".to_string());
    Client::with_options(options)
}

pub async fn probe(descriptor: &str) -> ProbeOutcome {
    let client = match client(descriptor).await {
        Ok(client) => client,
        Err(e) => return ProbeOutcome::Unhealthy(e.to_string()),
    };
    let outcome = match client.database("admin").run_command(doc! { "ping": 1 }).await {
        Ok(_) => ProbeOutcome::Healthy,
        Err(e) => ProbeOutcome::Unhealthy(e.to_string()),
    };
    client.shutdown().await;
    outcome
}

pub async fn connect(target: &Target) -> Result<Database, DriverError> {
    let database = target
        .database
        .as_deref()
        .ok_or_else(|| DriverError::Connect("MongoDB target has no database".to_string()))?;
    let client = client(&target.connection_string)
        .await
        .map_err(|e| DriverError::Connect(e.to_string()))?;
    let db = client.database(database);
    db.run_command(doc! { "ping": 1 })
        .await
        .map_err(|e| DriverError::Connect(e.to_string()))?;
    Ok(db)
}

pub async fn run(db: &mut Database, workload: Workload, slot: usize) -> Result<(), DriverError> {
    match workload {
        Workload::Repositories => repositories(db).await,
        Workload::Pulls => pulls(db, slot).await,
        Workload::RepositoryPulls => copy_recent_batches(db).await,
        Workload::RecentPulls => recent_pulls(db).await,
    }
}

fn is_duplicate_key(e: &::mongodb::error::Error) -> bool {
    e.to_string().contains("E11000")
}

/// Insert, tolerating duplicate-key errors.
async fn insert_one(coll: &Collection<Document>, document: &Document) -> Result<(), DriverError> {
    match coll.insert_one(document).await {
        Ok(_) => Ok(()),
        Err(e) if is_duplicate_key(&e) => Ok(()),
        Err(e) => Err(e.into()),
    }
}

async fn insert_many(coll: &Collection<Document>, documents: &[Document]) -> Result<(), DriverError> {
    if documents.is_empty() {
        return Ok(());
    }
    match coll.insert_many(documents).await {
        Ok(_) => Ok(()),
        Err(e) if is_duplicate_key(&e) => Ok(()),
        Err(e) => Err(e.into()),
    }
}

async fn upsert_one(coll: &Collection<Document>, document: &Document) -> Result<(), DriverError> {
    let Some(id) = document.get("_id").cloned() else {
        return insert_one(coll, document).await;
    };
    let mut fields = document.clone();
    fields.remove("_id");
    coll.update_one(doc! { "_id": id }, doc! { "$set": fields })
        .upsert(true)
        .await?;
    Ok(())
}

async fn random_document(coll: &Collection<Document>) -> Result<Option<Document>, DriverError> {
    let mut cursor = coll.aggregate(vec![doc! { "$sample": { "size": 1 } }]).await?;
    Ok(cursor.try_next().await?)
}

fn as_even(value: &Bson) -> bool {
    match value {
        Bson::Int32(v) => v % 2 == 0,
        Bson::Int64(v) => v % 2 == 0,
        Bson::Double(v) => (*v as i64) % 2 == 0,
        _ => false,
    }
}

async fn repositories(db: &Database) -> Result<(), DriverError> {
    let repos = db.collection::<Document>("repositories");
    let ids = repos.distinct("id", doc! {}).await?;
    if !ids.is_empty() {
        let id = ids[fastrand::usize(..ids.len())].clone();
        if let Some(repo) = repos.find_one(doc! { "id": id.clone() }).await? {
            let test = db.collection::<Document>("repositoriesTest");
            if as_even(&id) {
                upsert_one(&test, &repo).await?;
            } else {
                insert_one(&test, &repo).await?;
            }
            test.delete_many(doc! { "id": id }).await?;
        }
    }

    random_document(&db.collection::<Document>("pulls")).await?;
    Ok(())
}

async fn pulls(db: &Database, slot: usize) -> Result<(), DriverError> {
    let Some(pull) = random_document(&db.collection::<Document>("pulls")).await? else {
        return Ok(());
    };
    if let Some(repo) = pull.get("repo") {
        db.collection::<Document>("repositories")
            .find_one(doc! { "name": repo.clone() })
            .await?;
    }

    let test = db.collection::<Document>("pullsTest");
    if slot % 2 == 0 {
        upsert_one(&test, &pull).await?;
    } else {
        insert_one(&test, &pull).await?;
    }
    if let Some(id) = pull.get("id") {
        test.delete_many(doc! { "id": id.clone() }).await?;
    }
    Ok(())
}

/// Copy a batch of documents into the test collection and delete them again.
async fn copy_batch(db: &Database, source: &str, test: &str) -> Result<(), DriverError> {
    let documents: Vec<Document> = db
        .collection::<Document>(source)
        .find(doc! {})
        .limit(SCAN_LIMIT)
        .await?
        .try_collect()
        .await?;
    if documents.is_empty() {
        return Ok(());
    }

    let ids: Vec<Bson> = documents.iter().filter_map(|d| d.get("id").cloned()).collect();
    let test = db.collection::<Document>(test);
    insert_many(&test, &documents).await?;
    test.delete_many(doc! { "id": { "$in": ids } }).await?;
    Ok(())
}

async fn copy_recent_batches(db: &Database) -> Result<(), DriverError> {
    copy_batch(db, "pulls", "pullsTest").await?;
    copy_batch(db, "repositories", "repositoriesTest").await
}

async fn recent_pulls(db: &Database) -> Result<(), DriverError> {
    let _: Vec<Document> = db
        .collection::<Document>("repositories")
        .find(doc! { "stargazerscount": { "$gt": 10 } })
        .sort(doc! { "stargazerscount": -1 })
        .limit(10)
        .await?
        .try_collect()
        .await?;

    let cutoff = DateTime::from_system_time(SystemTime::now() - RECENT_WINDOW);
    let recent: Vec<Document> = db
        .collection::<Document>("pulls")
        .find(doc! { "createdat": { "$gt": cutoff } })
        .limit(10)
        .await?
        .try_collect()
        .await?;
    if recent.is_empty() {
        return Ok(());
    }

    let test = db.collection::<Document>("pullsTest");
    insert_many(&test, &recent).await?;
    test.delete_many(doc! { "createdat": { "$lt": cutoff } }).await?;
    Ok(())
}
