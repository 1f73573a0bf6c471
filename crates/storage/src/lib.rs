use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    Pool, Row, Sqlite,
};
use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
    str::FromStr,
    sync::Arc,
    time::Duration,
};
use tokio::sync::Mutex;

use shared::{
    domain::{ChannelId, MessageId, UserId},
    draft::{Draft, DraftKey, DraftStore, DraftUpdate, FieldValue, PublishedRef},
};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Draft store over a SQLite pool. Clones share the pool and the writer lock.
#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
    // A deferred transaction that reads before writing cannot upgrade its
    // lock while another connection holds one, and SQLite answers that with
    // an immediate SQLITE_BUSY. Writers therefore go through one at a time.
    write_lock: Arc<Mutex<()>>,
}

/// One row of the operator listing.
#[derive(Debug, Clone)]
pub struct DraftSummary {
    pub key: DraftKey,
    pub status: Option<String>,
    pub field_count: usize,
    pub published: bool,
    pub updated_at: DateTime<Utc>,
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .busy_timeout(BUSY_TIMEOUT);
        // Every connection to an in-memory database sees its own empty
        // database, so those pools are pinned to a single long-lived connection.
        let pool_options = if is_in_memory(database_url) {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };
        let pool = pool_options.connect_with(connect_options).await?;

        let storage = Self {
            pool,
            write_lock: Arc::new(Mutex::new(())),
        };
        storage.ensure_schema().await?;
        Ok(storage)
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS drafts (
                owner_id             INTEGER NOT NULL,
                flow                 TEXT NOT NULL,
                status               TEXT,
                fields_json          TEXT NOT NULL DEFAULT '{}',
                published_channel_id INTEGER,
                published_message_id INTEGER,
                updated_at           TEXT NOT NULL,
                PRIMARY KEY (owner_id, flow)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("failed to ensure drafts table exists")?;
        Ok(())
    }

    pub async fn load_draft(&self, key: &DraftKey) -> Result<Option<Draft>> {
        let row = sqlx::query(
            "SELECT owner_id, flow, status, fields_json, published_channel_id, published_message_id, updated_at
             FROM drafts WHERE owner_id = ? AND flow = ?",
        )
        .bind(key.owner.0)
        .bind(&key.flow)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("failed to load draft {}/{}", key.owner, key.flow))?;

        row.map(|row| draft_from_row(&row)).transpose()
    }

    /// Read-modify-write of one draft inside a transaction; returns the
    /// canonical entity as stored.
    pub async fn apply_update(&self, key: &DraftKey, update: DraftUpdate) -> Result<Draft> {
        let _writer = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;

        let existing = sqlx::query(
            "SELECT owner_id, flow, status, fields_json, published_channel_id, published_message_id, updated_at
             FROM drafts WHERE owner_id = ? AND flow = ?",
        )
        .bind(key.owner.0)
        .bind(&key.flow)
        .fetch_optional(&mut *tx)
        .await?;

        let mut draft = match existing {
            Some(row) => draft_from_row(&row)?,
            None => Draft {
                key: key.clone(),
                status: None,
                fields: BTreeMap::new(),
                published: None,
                updated_at: Utc::now(),
            },
        };
        update.apply_to(&mut draft);
        draft.updated_at = Utc::now();

        let fields_json =
            serde_json::to_string(&draft.fields).context("failed to encode draft fields")?;
        sqlx::query(
            "INSERT INTO drafts (owner_id, flow, status, fields_json, published_channel_id, published_message_id, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(owner_id, flow) DO UPDATE SET
                status=excluded.status,
                fields_json=excluded.fields_json,
                published_channel_id=excluded.published_channel_id,
                published_message_id=excluded.published_message_id,
                updated_at=excluded.updated_at",
        )
        .bind(key.owner.0)
        .bind(&key.flow)
        .bind(draft.status.as_deref())
        .bind(fields_json)
        .bind(draft.published.map(|published| published.channel_id.0))
        .bind(draft.published.map(|published| published.message_id.0))
        .bind(draft.updated_at)
        .execute(&mut *tx)
        .await
        .with_context(|| format!("failed to write draft {}/{}", key.owner, key.flow))?;

        tx.commit().await?;
        Ok(draft)
    }

    pub async fn list_drafts(&self) -> Result<Vec<DraftSummary>> {
        let rows = sqlx::query(
            "SELECT owner_id, flow, status, fields_json, published_channel_id, published_message_id, updated_at
             FROM drafts ORDER BY updated_at DESC, owner_id ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let draft = draft_from_row(row)?;
                Ok(DraftSummary {
                    field_count: draft.fields.len(),
                    published: draft.published.is_some(),
                    status: draft.status,
                    updated_at: draft.updated_at,
                    key: draft.key,
                })
            })
            .collect()
    }

    pub async fn delete_draft(&self, key: &DraftKey) -> Result<bool> {
        let _writer = self.write_lock.lock().await;
        let result = sqlx::query("DELETE FROM drafts WHERE owner_id = ? AND flow = ?")
            .bind(key.owner.0)
            .bind(&key.flow)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl DraftStore for Storage {
    async fn get(&self, key: &DraftKey) -> Result<Option<Draft>> {
        self.load_draft(key).await
    }

    async fn upsert(&self, key: &DraftKey, update: DraftUpdate) -> Result<Draft> {
        self.apply_update(key, update).await
    }
}

fn draft_from_row(row: &SqliteRow) -> Result<Draft> {
    let fields_json: String = row.try_get("fields_json")?;
    let fields: BTreeMap<String, FieldValue> =
        serde_json::from_str(&fields_json).context("corrupt draft fields")?;

    let published_channel: Option<i64> = row.try_get("published_channel_id")?;
    let published_message: Option<i64> = row.try_get("published_message_id")?;
    let published = match (published_channel, published_message) {
        (Some(channel_id), Some(message_id)) => Some(PublishedRef {
            channel_id: ChannelId(channel_id),
            message_id: MessageId(message_id),
        }),
        _ => None,
    };

    Ok(Draft {
        key: DraftKey {
            owner: UserId(row.try_get("owner_id")?),
            flow: row.try_get("flow")?,
        },
        status: row.try_get("status")?,
        fields,
        published,
        updated_at: row.try_get("updated_at")?,
    })
}

/// Turns an operator-supplied path or url into a sqlite url and creates the
/// parent directory of file databases.
pub fn prepare_database_url(raw_database_url: &str) -> Result<String> {
    let database_url = normalize_database_url(raw_database_url)?;
    ensure_sqlite_parent_dir_exists(&database_url)?;
    Ok(database_url)
}

pub fn is_in_memory(database_url: &str) -> bool {
    database_url.contains(":memory:") || database_url.contains("mode=memory")
}

fn normalize_database_url(raw_database_url: &str) -> Result<String> {
    let raw_database_url = raw_database_url.trim();

    if raw_database_url.is_empty() {
        bail!("database url is empty");
    }

    if is_in_memory(raw_database_url) || raw_database_url.contains("://") {
        return Ok(raw_database_url.to_string());
    }

    let path = raw_database_url
        .strip_prefix("sqlite:")
        .unwrap_or(raw_database_url);
    Ok(format!("sqlite://{}", path.replace('\\', "/")))
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if is_in_memory(database_url) || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
