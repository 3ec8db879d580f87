//! PostgreSQL-backed progress storage.
//!
//! Processed documents live in `<schema>.processed_entities`, one row per
//! (step, stage, document). Inserts are idempotent, so recording a document
//! twice is harmless. Preferred over the JSON file when several operators
//! share a migration or the host has no durable local disk.

use std::collections::BTreeSet;

use async_trait::async_trait;
use ferry_core::progress::ProgressStore;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::debug;

use crate::error::Result;

/// Progress store in PostgreSQL
pub struct PgProgress {
    pool: PgPool,
    schema: String,
}

impl PgProgress {
    /// Wrap an existing pool. Call [`init_schema`](Self::init_schema) before use.
    pub fn new(pool: PgPool, schema: impl Into<String>) -> ferry_core::Result<Self> {
        let schema = schema.into();
        validate_identifier(&schema)?;
        Ok(Self { pool, schema })
    }

    /// Connect and create the progress table if needed
    pub async fn connect(url: &str, schema: &str) -> Result<Self> {
        let pool = PgPoolOptions::new().max_connections(2).connect(url).await?;
        let progress = Self::new(pool, schema)?;
        progress.init_schema().await?;
        Ok(progress)
    }

    /// Create the schema and table
    pub async fn init_schema(&self) -> Result<()> {
        sqlx::query(&format!("CREATE SCHEMA IF NOT EXISTS {}", self.schema))
            .execute(&self.pool)
            .await?;
        sqlx::query(&create_table_sql(&self.schema))
            .execute(&self.pool)
            .await?;
        debug!(schema = %self.schema, "Progress schema ready");
        Ok(())
    }
}

fn create_table_sql(schema: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {}.processed_entities (
            step TEXT NOT NULL,
            stage TEXT NOT NULL,
            document TEXT NOT NULL,
            processed_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            PRIMARY KEY (step, stage, document)
        )",
        schema
    )
}

fn select_sql(schema: &str) -> String {
    format!(
        "SELECT document FROM {}.processed_entities WHERE step = $1 AND stage = $2",
        schema
    )
}

fn insert_sql(schema: &str) -> String {
    format!(
        "INSERT INTO {}.processed_entities (step, stage, document) VALUES ($1, $2, $3)
         ON CONFLICT (step, stage, document) DO NOTHING",
        schema
    )
}

/// Schema names are interpolated into SQL, so only plain identifiers are allowed
fn validate_identifier(name: &str) -> ferry_core::Result<()> {
    let mut chars = name.chars();
    let valid = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(ferry_core::Error::ConfigInvalid {
            message: format!("invalid progress schema name '{}'", name),
        })
    }
}

fn progress_error(e: sqlx::Error) -> ferry_core::Error {
    ferry_core::Error::Progress {
        message: e.to_string(),
    }
}

#[async_trait]
impl ProgressStore for PgProgress {
    async fn processed_entities(
        &self,
        step: &str,
        stage: &str,
    ) -> ferry_core::Result<BTreeSet<String>> {
        let rows: Vec<String> = sqlx::query_scalar(&select_sql(&self.schema))
            .bind(step)
            .bind(stage)
            .fetch_all(&self.pool)
            .await
            .map_err(progress_error)?;
        Ok(rows.into_iter().collect())
    }

    async fn add_processed_entity(
        &self,
        step: &str,
        stage: &str,
        document: &str,
    ) -> ferry_core::Result<()> {
        sqlx::query(&insert_sql(&self.schema))
            .bind(step)
            .bind(stage)
            .bind(document)
            .execute(&self.pool)
            .await
            .map_err(progress_error)?;
        Ok(())
    }

    fn backend_type(&self) -> &'static str {
        "postgres"
    }
}
