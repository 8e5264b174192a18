use anyhow::Result;
use sqlx::SqlitePool;

/// Create the triple table and its lookup indexes. Idempotent.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS triples (
            subject TEXT NOT NULL,
            predicate TEXT NOT NULL,
            object TEXT NOT NULL,
            UNIQUE(subject, predicate, object)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_triples_predicate ON triples(predicate)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_triples_object ON triples(object)")
        .execute(pool)
        .await?;

    Ok(())
}
