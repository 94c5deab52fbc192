//! SQLite storage implementation.
//!
//! A file-based storage backend using SQLite. Good for:
//! - Local development and the CLI
//! - Single-server deployments
//! - Testing with persistent data
//!
//! Batch safety rests on two constraints: `UNIQUE(batch_id, owner_id)` on
//! `quotes` and `PRIMARY KEY(quote_id, file_path)` on `quote_files`. Both are
//! written with `ON CONFLICT DO NOTHING` and the winner is read back, so
//! concurrent attaches never need a read-then-write.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqlitePool, SqlitePoolOptions};
use sqlx::{FromRow, Sqlite};
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

use crate::error::{ExtractionError, Result};
use crate::traits::store::{CorrectionStore, ProfileStore, QuoteStore};
use crate::types::{
    profile::{CorrectionField, CorrectionRule, SourceProfile},
    quote::{AttachedFile, Quote, QuoteLineItem, QuoteWithItems, SubjectFields},
    result::Premiums,
};

const QUOTE_COLUMNS: &str = "id, batch_id, owner_id, subject_name, subject_asset, created_at";
const ITEM_COLUMNS: &str = "id, quote_id, profile_id, company, plan, tranche_3, tranche_5, tranche_10, liability, dealer_workshop, replacement_months, found_pages, notes, file_path, content_hash";

/// SQLite-based quote store.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Create a new SQLite store with the given connection URL.
    ///
    /// # Example URLs
    /// - `sqlite://quotes.db?mode=rwc` - File-based database, created if missing
    /// - `sqlite::memory:` - In-memory database (use [`SqliteStore::in_memory`])
    pub async fn new(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(ExtractionError::storage)?
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(10));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(ExtractionError::storage)?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Create an in-memory SQLite store (for testing).
    ///
    /// Uses a single connection: every connection to `:memory:` would
    /// otherwise see its own empty database.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(ExtractionError::storage)?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(ExtractionError::storage)?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Run database migrations.
    async fn run_migrations(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS quotes (
                id TEXT PRIMARY KEY,
                batch_id TEXT,
                owner_id TEXT NOT NULL,
                subject_name TEXT NOT NULL DEFAULT '',
                subject_asset TEXT NOT NULL DEFAULT '',
                created_at TEXT NOT NULL,
                UNIQUE (batch_id, owner_id)
            );

            CREATE INDEX IF NOT EXISTS idx_quotes_owner_created ON quotes(owner_id, created_at);
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(ExtractionError::storage)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS quote_files (
                quote_id TEXT NOT NULL,
                file_path TEXT NOT NULL,
                content_hash TEXT NOT NULL,
                subject_name TEXT NOT NULL DEFAULT '',
                subject_asset TEXT NOT NULL DEFAULT '',
                PRIMARY KEY (quote_id, file_path)
            );

            CREATE TABLE IF NOT EXISTS quote_line_items (
                id TEXT PRIMARY KEY,
                quote_id TEXT NOT NULL,
                profile_id TEXT,
                company TEXT NOT NULL,
                plan TEXT NOT NULL,
                tranche_3 REAL,
                tranche_5 REAL,
                tranche_10 REAL,
                liability TEXT NOT NULL DEFAULT '',
                dealer_workshop INTEGER NOT NULL DEFAULT 0,
                replacement_months INTEGER,
                found_pages TEXT NOT NULL DEFAULT '[]',
                notes TEXT NOT NULL DEFAULT '',
                file_path TEXT NOT NULL,
                content_hash TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_line_items_quote ON quote_line_items(quote_id);
            CREATE INDEX IF NOT EXISTS idx_line_items_content_hash ON quote_line_items(content_hash);
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(ExtractionError::storage)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS source_profiles (
                id TEXT PRIMARY KEY,
                owner_id TEXT NOT NULL,
                name TEXT NOT NULL,
                page_spec TEXT NOT NULL DEFAULT '',
                instructions TEXT NOT NULL DEFAULT ''
            );

            CREATE TABLE IF NOT EXISTS correction_rules (
                id TEXT PRIMARY KEY,
                profile_id TEXT NOT NULL,
                owner_id TEXT NOT NULL,
                field TEXT NOT NULL,
                wrong_value TEXT NOT NULL,
                corrected_value TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_correction_rules_profile ON correction_rules(profile_id);
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(ExtractionError::storage)?;

        Ok(())
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn fetch_quote(&self, id: Uuid) -> Result<Option<Quote>> {
        let row = sqlx::query_as::<_, QuoteRow>(&format!(
            "SELECT {QUOTE_COLUMNS} FROM quotes WHERE id = ?"
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(ExtractionError::storage)?;

        row.map(QuoteRow::into_quote).transpose()
    }

    async fn fetch_items(&self, quote_id: Uuid) -> Result<Vec<QuoteLineItem>> {
        let rows = sqlx::query_as::<_, LineItemRow>(&format!(
            "SELECT {ITEM_COLUMNS} FROM quote_line_items WHERE quote_id = ? ORDER BY rowid"
        ))
        .bind(quote_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(ExtractionError::storage)?;

        rows.into_iter().map(LineItemRow::into_line_item).collect()
    }
}

async fn insert_quote_row<'e, E>(executor: E, quote: &Quote) -> Result<()>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO quotes (id, batch_id, owner_id, subject_name, subject_asset, created_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(quote.id.to_string())
    .bind(&quote.batch_id)
    .bind(quote.owner_id.to_string())
    .bind(&quote.subject_name)
    .bind(&quote.subject_asset)
    .bind(timestamp(quote.created_at))
    .execute(executor)
    .await
    .map_err(ExtractionError::storage)?;

    Ok(())
}

/// Claim `file` on the quote and insert its items. Returns false, inserting
/// nothing, when the file is already attached.
async fn insert_file_items(
    conn: &mut SqliteConnection,
    quote_id: Uuid,
    file: &AttachedFile,
    items: &[QuoteLineItem],
) -> Result<bool> {
    let claimed = sqlx::query(
        r#"
        INSERT INTO quote_files (quote_id, file_path, content_hash, subject_name, subject_asset)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(quote_id, file_path) DO NOTHING
        "#,
    )
    .bind(quote_id.to_string())
    .bind(&file.file_path)
    .bind(&file.content_hash)
    .bind(&file.subject.name)
    .bind(&file.subject.asset)
    .execute(&mut *conn)
    .await
    .map_err(ExtractionError::storage)?;

    if claimed.rows_affected() == 0 {
        return Ok(false);
    }

    for item in items {
        sqlx::query(&format!(
            "INSERT INTO quote_line_items ({ITEM_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(item.id.to_string())
        .bind(quote_id.to_string())
        .bind(item.profile_id.map(|id| id.to_string()))
        .bind(&item.company)
        .bind(&item.plan)
        .bind(item.premiums.tranche_3)
        .bind(item.premiums.tranche_5)
        .bind(item.premiums.tranche_10)
        .bind(&item.liability)
        .bind(item.dealer_workshop as i64)
        .bind(item.replacement_months.map(i64::from))
        .bind(found_pages_json(item)?)
        .bind(&item.notes)
        .bind(&item.file_path)
        .bind(&item.content_hash)
        .execute(&mut *conn)
        .await
        .map_err(ExtractionError::storage)?;
    }

    Ok(true)
}

/// Timestamps are stored at full precision and fixed width, so they read
/// back equal and string comparison orders them.
fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)
        .map_err(|e| ExtractionError::storage(format!("Invalid date: {e}")))?
        .with_timezone(&Utc))
}

fn parse_uuid(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).map_err(|e| ExtractionError::storage(format!("Invalid id {raw}: {e}")))
}

// Row types for sqlx queries
#[derive(Debug, FromRow)]
struct QuoteRow {
    id: String,
    batch_id: Option<String>,
    owner_id: String,
    subject_name: String,
    subject_asset: String,
    created_at: String,
}

impl QuoteRow {
    fn into_quote(self) -> Result<Quote> {
        Ok(Quote {
            id: parse_uuid(&self.id)?,
            batch_id: self.batch_id,
            owner_id: parse_uuid(&self.owner_id)?,
            subject_name: self.subject_name,
            subject_asset: self.subject_asset,
            created_at: parse_timestamp(&self.created_at)?,
        })
    }
}

#[derive(Debug, FromRow)]
struct LineItemRow {
    id: String,
    quote_id: String,
    profile_id: Option<String>,
    company: String,
    plan: String,
    tranche_3: Option<f64>,
    tranche_5: Option<f64>,
    tranche_10: Option<f64>,
    liability: String,
    dealer_workshop: i64,
    replacement_months: Option<i64>,
    found_pages: String,
    notes: String,
    file_path: String,
    content_hash: String,
}

impl LineItemRow {
    fn into_line_item(self) -> Result<QuoteLineItem> {
        let found_pages: Vec<u32> = serde_json::from_str(&self.found_pages)
            .map_err(|e| ExtractionError::storage(format!("Invalid found_pages JSON: {e}")))?;

        Ok(QuoteLineItem {
            id: parse_uuid(&self.id)?,
            quote_id: parse_uuid(&self.quote_id)?,
            profile_id: self.profile_id.as_deref().map(parse_uuid).transpose()?,
            company: self.company,
            plan: self.plan,
            premiums: Premiums {
                tranche_3: self.tranche_3,
                tranche_5: self.tranche_5,
                tranche_10: self.tranche_10,
            },
            liability: self.liability,
            dealer_workshop: self.dealer_workshop != 0,
            replacement_months: self.replacement_months.map(|m| m as u32),
            found_pages,
            notes: self.notes,
            file_path: self.file_path,
            content_hash: self.content_hash,
        })
    }
}

#[derive(Debug, FromRow)]
struct ProfileRow {
    id: String,
    owner_id: String,
    name: String,
    page_spec: String,
    instructions: String,
}

impl ProfileRow {
    fn into_profile(self) -> Result<SourceProfile> {
        Ok(SourceProfile {
            id: parse_uuid(&self.id)?,
            owner_id: parse_uuid(&self.owner_id)?,
            name: self.name,
            page_spec: self.page_spec,
            instructions: self.instructions,
        })
    }
}

#[derive(Debug, FromRow)]
struct RuleRow {
    id: String,
    profile_id: String,
    owner_id: String,
    field: String,
    wrong_value: String,
    corrected_value: String,
    created_at: String,
}

impl RuleRow {
    fn into_rule(self) -> Result<CorrectionRule> {
        let field = CorrectionField::from_str(&self.field).map_err(ExtractionError::storage)?;
        Ok(CorrectionRule {
            id: parse_uuid(&self.id)?,
            profile_id: parse_uuid(&self.profile_id)?,
            owner_id: parse_uuid(&self.owner_id)?,
            field,
            wrong_value: self.wrong_value,
            corrected_value: self.corrected_value,
            created_at: parse_timestamp(&self.created_at)?,
        })
    }
}

fn found_pages_json(item: &QuoteLineItem) -> Result<String> {
    serde_json::to_string(&item.found_pages).map_err(ExtractionError::storage)
}

#[async_trait]
impl QuoteStore for SqliteStore {
    async fn find_or_create_batch_quote(&self, candidate: &Quote) -> Result<Quote> {
        let batch_id = candidate
            .batch_id
            .as_deref()
            .ok_or_else(|| ExtractionError::storage("batch quote requires a batch id"))?;

        sqlx::query(
            r#"
            INSERT INTO quotes (id, batch_id, owner_id, subject_name, subject_asset, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(batch_id, owner_id) DO NOTHING
            "#,
        )
        .bind(candidate.id.to_string())
        .bind(batch_id)
        .bind(candidate.owner_id.to_string())
        .bind(&candidate.subject_name)
        .bind(&candidate.subject_asset)
        .bind(timestamp(candidate.created_at))
        .execute(&self.pool)
        .await
        .map_err(ExtractionError::storage)?;

        let row = sqlx::query_as::<_, QuoteRow>(&format!(
            "SELECT {QUOTE_COLUMNS} FROM quotes WHERE batch_id = ? AND owner_id = ?"
        ))
        .bind(batch_id)
        .bind(candidate.owner_id.to_string())
        .fetch_one(&self.pool)
        .await
        .map_err(ExtractionError::storage)?;

        row.into_quote()
    }

    async fn insert_quote(&self, quote: &Quote) -> Result<()> {
        insert_quote_row(&self.pool, quote).await
    }

    async fn insert_quote_with_items(
        &self,
        quote: &Quote,
        file: &AttachedFile,
        items: &[QuoteLineItem],
    ) -> Result<()> {
        if quote.batch_id.is_some() {
            return Err(ExtractionError::storage("standalone quote must not have a batch id"));
        }

        let mut tx = self.pool.begin().await.map_err(ExtractionError::storage)?;
        insert_quote_row(&mut *tx, quote).await?;
        insert_file_items(&mut tx, quote.id, file, items).await?;
        tx.commit().await.map_err(ExtractionError::storage)?;
        Ok(())
    }

    async fn fill_missing_subject(&self, quote_id: Uuid, subject: &SubjectFields) -> Result<Quote> {
        sqlx::query(
            r#"
            UPDATE quotes SET
                subject_name = CASE WHEN TRIM(subject_name) = '' THEN ? ELSE subject_name END,
                subject_asset = CASE WHEN TRIM(subject_asset) = '' THEN ? ELSE subject_asset END
            WHERE id = ?
            "#,
        )
        .bind(subject.name.trim())
        .bind(subject.asset.trim())
        .bind(quote_id.to_string())
        .execute(&self.pool)
        .await
        .map_err(ExtractionError::storage)?;

        self.fetch_quote(quote_id)
            .await?
            .ok_or_else(|| ExtractionError::NotFound {
                entity: "quote",
                id: quote_id.to_string(),
            })
    }

    async fn attach_items(
        &self,
        quote_id: Uuid,
        file: &AttachedFile,
        items: &[QuoteLineItem],
    ) -> Result<bool> {
        let mut tx = self.pool.begin().await.map_err(ExtractionError::storage)?;
        if !insert_file_items(&mut tx, quote_id, file, items).await? {
            tx.rollback().await.map_err(ExtractionError::storage)?;
            return Ok(false);
        }
        tx.commit().await.map_err(ExtractionError::storage)?;
        Ok(true)
    }

    async fn get_quote(&self, id: Uuid) -> Result<Option<QuoteWithItems>> {
        let Some(quote) = self.fetch_quote(id).await? else {
            return Ok(None);
        };
        let items = self.fetch_items(id).await?;
        Ok(Some(QuoteWithItems { quote, items }))
    }

    async fn list_quotes(&self, owner_id: Uuid) -> Result<Vec<Quote>> {
        let rows = sqlx::query_as::<_, QuoteRow>(&format!(
            "SELECT {QUOTE_COLUMNS} FROM quotes WHERE owner_id = ? ORDER BY created_at DESC"
        ))
        .bind(owner_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(ExtractionError::storage)?;

        rows.into_iter().map(QuoteRow::into_quote).collect()
    }

    async fn find_recent_by_content_hash(
        &self,
        owner_id: Uuid,
        content_hash: &str,
        since: DateTime<Utc>,
    ) -> Result<Option<QuoteWithItems>> {
        let row = sqlx::query_as::<_, QuoteRow>(
            r#"
            SELECT q.id, q.batch_id, q.owner_id, q.subject_name, q.subject_asset, q.created_at
            FROM quotes q
            WHERE q.owner_id = ?
              AND q.created_at >= ?
              AND EXISTS (
                  SELECT 1 FROM quote_line_items i
                  WHERE i.quote_id = q.id AND i.content_hash = ?
              )
            ORDER BY q.created_at DESC
            LIMIT 1
            "#,
        )
        .bind(owner_id.to_string())
        .bind(timestamp(since))
        .bind(content_hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(ExtractionError::storage)?;

        let Some(row) = row else {
            return Ok(None);
        };
        let quote = row.into_quote()?;
        let items = self.fetch_items(quote.id).await?;
        Ok(Some(QuoteWithItems { quote, items }))
    }

    async fn attached_subject(
        &self,
        quote_id: Uuid,
        file_path: &str,
    ) -> Result<Option<SubjectFields>> {
        let row: Option<(String, String)> = sqlx::query_as(
            "SELECT subject_name, subject_asset FROM quote_files WHERE quote_id = ? AND file_path = ?",
        )
        .bind(quote_id.to_string())
        .bind(file_path)
        .fetch_optional(&self.pool)
        .await
        .map_err(ExtractionError::storage)?;

        Ok(row.map(|(name, asset)| SubjectFields { name, asset }))
    }

    async fn get_line_item(&self, id: Uuid) -> Result<Option<QuoteLineItem>> {
        let row = sqlx::query_as::<_, LineItemRow>(&format!(
            "SELECT {ITEM_COLUMNS} FROM quote_line_items WHERE id = ?"
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(ExtractionError::storage)?;

        row.map(LineItemRow::into_line_item).transpose()
    }

    async fn update_line_item(&self, item: &QuoteLineItem) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE quote_line_items SET
                company = ?, plan = ?, tranche_3 = ?, tranche_5 = ?, tranche_10 = ?,
                liability = ?, dealer_workshop = ?, replacement_months = ?,
                found_pages = ?, notes = ?
            WHERE id = ?
            "#,
        )
        .bind(&item.company)
        .bind(&item.plan)
        .bind(item.premiums.tranche_3)
        .bind(item.premiums.tranche_5)
        .bind(item.premiums.tranche_10)
        .bind(&item.liability)
        .bind(item.dealer_workshop as i64)
        .bind(item.replacement_months.map(i64::from))
        .bind(found_pages_json(item)?)
        .bind(&item.notes)
        .bind(item.id.to_string())
        .execute(&self.pool)
        .await
        .map_err(ExtractionError::storage)?;

        if result.rows_affected() == 0 {
            return Err(ExtractionError::NotFound {
                entity: "line item",
                id: item.id.to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ProfileStore for SqliteStore {
    async fn get_profile(&self, id: Uuid) -> Result<Option<SourceProfile>> {
        let row = sqlx::query_as::<_, ProfileRow>(
            "SELECT id, owner_id, name, page_spec, instructions FROM source_profiles WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(ExtractionError::storage)?;

        row.map(ProfileRow::into_profile).transpose()
    }

    async fn list_profiles(&self, owner_id: Uuid) -> Result<Vec<SourceProfile>> {
        let rows = sqlx::query_as::<_, ProfileRow>(
            "SELECT id, owner_id, name, page_spec, instructions FROM source_profiles WHERE owner_id = ? ORDER BY name",
        )
        .bind(owner_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(ExtractionError::storage)?;

        rows.into_iter().map(ProfileRow::into_profile).collect()
    }

    async fn upsert_profile(&self, profile: &SourceProfile) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO source_profiles (id, owner_id, name, page_spec, instructions)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                owner_id = excluded.owner_id,
                name = excluded.name,
                page_spec = excluded.page_spec,
                instructions = excluded.instructions
            "#,
        )
        .bind(profile.id.to_string())
        .bind(profile.owner_id.to_string())
        .bind(&profile.name)
        .bind(&profile.page_spec)
        .bind(&profile.instructions)
        .execute(&self.pool)
        .await
        .map_err(ExtractionError::storage)?;

        Ok(())
    }

    async fn update_page_spec(&self, id: Uuid, page_spec: &str) -> Result<()> {
        let result = sqlx::query("UPDATE source_profiles SET page_spec = ? WHERE id = ?")
            .bind(page_spec)
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(ExtractionError::storage)?;

        if result.rows_affected() == 0 {
            return Err(ExtractionError::NotFound {
                entity: "profile",
                id: id.to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl CorrectionStore for SqliteStore {
    async fn add_rule(&self, rule: &CorrectionRule) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO correction_rules (id, profile_id, owner_id, field, wrong_value, corrected_value, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(rule.id.to_string())
        .bind(rule.profile_id.to_string())
        .bind(rule.owner_id.to_string())
        .bind(rule.field.as_str())
        .bind(&rule.wrong_value)
        .bind(&rule.corrected_value)
        .bind(timestamp(rule.created_at))
        .execute(&self.pool)
        .await
        .map_err(ExtractionError::storage)?;

        Ok(())
    }

    async fn rules_for_profile(&self, profile_id: Uuid) -> Result<Vec<CorrectionRule>> {
        let rows = sqlx::query_as::<_, RuleRow>(
            r#"
            SELECT id, profile_id, owner_id, field, wrong_value, corrected_value, created_at
            FROM correction_rules
            WHERE profile_id = ?
            ORDER BY created_at, rowid
            "#,
        )
        .bind(profile_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(ExtractionError::storage)?;

        rows.into_iter().map(RuleRow::into_rule).collect()
    }
}
