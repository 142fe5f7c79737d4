use anyhow::Result;
use sqlx::SqlitePool;

pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    // Cached top-N similarity rows, replaced wholesale per source.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS similarity_cache (
            source_id TEXT NOT NULL,
            target_id TEXT NOT NULL,
            composite_score REAL NOT NULL,
            breakdown TEXT NOT NULL,
            computed_at INTEGER NOT NULL,
            PRIMARY KEY (source_id, target_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Per-artifact embedding vectors, tagged with the model that produced
    // them. A row whose model differs from the active provider is a miss.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS artifact_embeddings (
            artifact_id TEXT PRIMARY KEY,
            vector BLOB NOT NULL,
            model_name TEXT NOT NULL,
            dimension INTEGER NOT NULL,
            computed_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Content-hash-keyed cache for the remote provider. `format` is
    // 'f32le' for the binary encoding or 'json' for legacy rows.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS embedding_text_cache (
            cache_key TEXT PRIMARY KEY,
            model_name TEXT NOT NULL,
            vector BLOB NOT NULL,
            format TEXT NOT NULL DEFAULT 'f32le',
            computed_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // FTS5 virtual table used as the candidate prefilter.
    // FTS5 CREATE is not idempotent natively, so we check first.
    let fts_exists: bool = sqlx::query_scalar(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='artifacts_fts'",
    )
    .fetch_one(pool)
    .await?;

    if !fts_exists {
        sqlx::query(
            r#"
            CREATE VIRTUAL TABLE artifacts_fts USING fts5(
                artifact_id UNINDEXED,
                text
            )
            "#,
        )
        .execute(pool)
        .await?;
    }

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_similarity_cache_target ON similarity_cache(target_id)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_similarity_cache_score \
         ON similarity_cache(source_id, composite_score DESC)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
