use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shelfguard_core::{ContentHash, NewUpload, StatusUpdate, UploadRecord, UploadStatus};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use uuid::Uuid;

use crate::repository::{ensure_transition, UploadRepository};

const MAX_CONNECTIONS: u32 = 5;
const CONNECTION_TIMEOUT_SECS: u64 = 30;

const UPLOAD_COLUMNS: &str = r#"
    id, original_filename, file_extension, size_bytes, content_hash,
    quarantine_path, final_path, status, title, author, duplicate_of,
    duplicate_reason, error_message, created_at, decided_at, updated_at
"#;

/// Open a connection pool.
pub async fn connect(database_url: &str) -> Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(MAX_CONNECTIONS)
        .acquire_timeout(Duration::from_secs(CONNECTION_TIMEOUT_SECS))
        .connect(database_url)
        .await
        .context("Failed to connect to database")
}

/// Apply pending schema migrations.
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("../../migrations")
        .run(pool)
        .await
        .context("Failed to run migrations")
}

#[derive(sqlx::FromRow)]
struct UploadRow {
    id: Uuid,
    original_filename: String,
    file_extension: String,
    size_bytes: i64,
    content_hash: Option<String>,
    quarantine_path: Option<String>,
    final_path: Option<String>,
    status: String,
    title: Option<String>,
    author: Option<String>,
    duplicate_of: Option<Uuid>,
    duplicate_reason: Option<String>,
    error_message: Option<String>,
    created_at: DateTime<Utc>,
    decided_at: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<UploadRow> for UploadRecord {
    type Error = anyhow::Error;

    fn try_from(row: UploadRow) -> Result<Self> {
        Ok(UploadRecord {
            id: row.id,
            original_filename: row.original_filename,
            file_extension: row.file_extension,
            size_bytes: u64::try_from(row.size_bytes).context("Negative size_bytes")?,
            content_hash: row.content_hash.as_deref().map(str::parse).transpose()?,
            quarantine_path: row.quarantine_path.map(PathBuf::from),
            final_path: row.final_path.map(PathBuf::from),
            status: row.status.parse()?,
            title: row.title,
            author: row.author,
            duplicate_of: row.duplicate_of,
            duplicate_reason: row.duplicate_reason,
            error_message: row.error_message,
            created_at: row.created_at,
            decided_at: row.decided_at,
            updated_at: row.updated_at,
        })
    }
}

fn status_strings(statuses: &[UploadStatus]) -> Vec<String> {
    statuses.iter().map(|s| s.to_string()).collect()
}

fn path_string(path: Option<&PathBuf>) -> Option<String> {
    path.map(|p| p.to_string_lossy().into_owned())
}

fn into_records(rows: Vec<UploadRow>) -> Result<Vec<UploadRecord>> {
    rows.into_iter().map(UploadRecord::try_from).collect()
}

/// PostgreSQL-backed [`UploadRepository`]
#[derive(Clone)]
pub struct PgUploadRepository {
    pool: PgPool,
}

impl PgUploadRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UploadRepository for PgUploadRepository {
    #[tracing::instrument(skip(self, upload), fields(upload_id = %upload.id))]
    async fn insert(&self, upload: NewUpload) -> Result<UploadRecord> {
        let record = upload.into_record();
        let row = sqlx::query_as::<Postgres, UploadRow>(&format!(
            r#"
            INSERT INTO uploads (
                id, original_filename, file_extension, size_bytes, content_hash,
                quarantine_path, status, title, author, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $10)
            RETURNING {}
            "#,
            UPLOAD_COLUMNS
        ))
        .bind(record.id)
        .bind(&record.original_filename)
        .bind(&record.file_extension)
        .bind(i64::try_from(record.size_bytes).context("size_bytes out of range")?)
        .bind(record.content_hash.as_ref().map(|h| h.to_string()))
        .bind(path_string(record.quarantine_path.as_ref()))
        .bind(record.status.to_string())
        .bind(&record.title)
        .bind(&record.author)
        .bind(record.created_at)
        .fetch_one(&self.pool)
        .await
        .context("Failed to insert upload")?;

        row.try_into()
    }

    #[tracing::instrument(skip(self))]
    async fn get(&self, id: Uuid) -> Result<Option<UploadRecord>> {
        let row = sqlx::query_as::<Postgres, UploadRow>(&format!(
            "SELECT {} FROM uploads WHERE id = $1",
            UPLOAD_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch upload")?;

        row.map(UploadRecord::try_from).transpose()
    }

    #[tracing::instrument(skip(self), fields(hash = %hash.short()))]
    async fn get_by_hash(&self, hash: &ContentHash) -> Result<Option<UploadRecord>> {
        let row = sqlx::query_as::<Postgres, UploadRow>(&format!(
            "SELECT {} FROM uploads WHERE content_hash = $1 AND status = 'moved' LIMIT 1",
            UPLOAD_COLUMNS
        ))
        .bind(hash.as_str())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to look up upload by hash")?;

        row.map(UploadRecord::try_from).transpose()
    }

    #[tracing::instrument(skip(self))]
    async fn list_by_status_older_than(
        &self,
        statuses: &[UploadStatus],
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<UploadRecord>> {
        let rows = sqlx::query_as::<Postgres, UploadRow>(&format!(
            r#"
            SELECT {} FROM uploads
            WHERE status = ANY($1) AND created_at < $2
            ORDER BY created_at ASC, id ASC
            "#,
            UPLOAD_COLUMNS
        ))
        .bind(status_strings(statuses))
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list aged uploads")?;

        into_records(rows)
    }

    #[tracing::instrument(skip(self))]
    async fn list_by_status(&self, statuses: &[UploadStatus]) -> Result<Vec<UploadRecord>> {
        let rows = sqlx::query_as::<Postgres, UploadRow>(&format!(
            r#"
            SELECT {} FROM uploads
            WHERE status = ANY($1)
            ORDER BY created_at ASC, id ASC
            "#,
            UPLOAD_COLUMNS
        ))
        .bind(status_strings(statuses))
        .fetch_all(&self.pool)
        .await
        .context("Failed to list uploads by status")?;

        into_records(rows)
    }

    #[tracing::instrument(skip(self, update))]
    async fn update_status(
        &self,
        id: Uuid,
        from: UploadStatus,
        to: UploadStatus,
        update: StatusUpdate,
    ) -> Result<bool> {
        ensure_transition(from, to)?;

        let result = sqlx::query(
            r#"
            UPDATE uploads SET
                status = $3,
                quarantine_path = CASE WHEN $4 THEN NULL ELSE quarantine_path END,
                final_path = COALESCE(final_path, $5),
                content_hash = COALESCE(content_hash, $6),
                duplicate_of = COALESCE($7, duplicate_of),
                duplicate_reason = COALESCE($8, duplicate_reason),
                error_message = COALESCE($9, error_message),
                decided_at = NOW(),
                updated_at = NOW()
            WHERE id = $1 AND status = $2
            "#,
        )
        .bind(id)
        .bind(from.to_string())
        .bind(to.to_string())
        .bind(update.clear_quarantine_path)
        .bind(path_string(update.final_path.as_ref()))
        .bind(update.content_hash.as_ref().map(|h| h.to_string()))
        .bind(update.duplicate_of)
        .bind(update.duplicate_reason)
        .bind(update.error_message)
        .execute(&self.pool)
        .await
        .context("Failed to update upload status")?;

        Ok(result.rows_affected() == 1)
    }

    #[tracing::instrument(skip(self, hash))]
    async fn set_content_hash(&self, id: Uuid, hash: &ContentHash) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE uploads SET content_hash = $2, updated_at = NOW()
            WHERE id = $1 AND content_hash IS NULL
            "#,
        )
        .bind(id)
        .bind(hash.as_str())
        .execute(&self.pool)
        .await
        .context("Failed to set content hash")?;

        Ok(result.rows_affected() == 1)
    }

    #[tracing::instrument(skip(self))]
    async fn total_size_by_status(&self, statuses: &[UploadStatus]) -> Result<u64> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(size_bytes), 0)::BIGINT FROM uploads WHERE status = ANY($1)",
        )
        .bind(status_strings(statuses))
        .fetch_one(&self.pool)
        .await
        .context("Failed to sum upload sizes")?;

        Ok(u64::try_from(total).unwrap_or(0))
    }

    #[tracing::instrument(skip(self))]
    async fn find_by_title_author(
        &self,
        title: &str,
        author: &str,
        statuses: &[UploadStatus],
        exclude: Uuid,
    ) -> Result<Option<UploadRecord>> {
        let row = sqlx::query_as::<Postgres, UploadRow>(&format!(
            r#"
            SELECT {} FROM uploads
            WHERE id <> $3
              AND status = ANY($4)
              AND lower(btrim(regexp_replace(title, '\s+', ' ', 'g'))) = $1
              AND lower(btrim(regexp_replace(author, '\s+', ' ', 'g'))) = $2
            ORDER BY created_at ASC
            LIMIT 1
            "#,
            UPLOAD_COLUMNS
        ))
        .bind(title)
        .bind(author)
        .bind(exclude)
        .bind(status_strings(statuses))
        .fetch_optional(&self.pool)
        .await
        .context("Failed to look up title/author conflict")?;

        row.map(UploadRecord::try_from).transpose()
    }

    #[tracing::instrument(skip(self))]
    async fn count_by_status(&self) -> Result<BTreeMap<UploadStatus, u64>> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT status, COUNT(*)::BIGINT FROM uploads GROUP BY status")
                .fetch_all(&self.pool)
                .await
                .context("Failed to count uploads by status")?;

        rows.into_iter()
            .map(|(status, count)| Ok((status.parse()?, u64::try_from(count).unwrap_or(0))))
            .collect()
    }
}
