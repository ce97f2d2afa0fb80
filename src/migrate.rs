use anyhow::Result;
use sqlx::SqlitePool;

/// Create the entity tables. Idempotent; safe to run on every startup.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sources (
            id TEXT PRIMARY KEY,
            kind TEXT NOT NULL,
            path TEXT NOT NULL,
            state TEXT NOT NULL DEFAULT 'requested',
            parent_id TEXT,
            parameters_json TEXT NOT NULL DEFAULT '{}',
            created_at INTEGER NOT NULL,
            FOREIGN KEY (parent_id) REFERENCES sources(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS suites (
            id TEXT PRIMARY KEY,
            source_id TEXT NOT NULL,
            label TEXT NOT NULL,
            tests_json TEXT NOT NULL DEFAULT '[]',
            created_at INTEGER NOT NULL,
            UNIQUE(source_id, label),
            FOREIGN KEY (source_id) REFERENCES sources(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS serialized_suites (
            id TEXT PRIMARY KEY,
            suite_id TEXT NOT NULL,
            parameters_json TEXT NOT NULL DEFAULT '{}',
            state TEXT NOT NULL DEFAULT 'requested',
            failure_reason TEXT,
            failure_message TEXT,
            created_at INTEGER NOT NULL,
            FOREIGN KEY (suite_id) REFERENCES suites(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_sources_parent_id ON sources(parent_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_suites_source_id ON suites(source_id)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_serialized_suites_suite_id ON serialized_suites(suite_id)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_serialized_suites_state ON serialized_suites(state)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
