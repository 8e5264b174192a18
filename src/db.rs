use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// File name of the SQLite database inside a store directory.
pub const STORE_DB_FILE: &str = "triples.sqlite";

pub fn store_db_path(store_dir: &Path) -> PathBuf {
    store_dir.join(STORE_DB_FILE)
}

pub async fn connect(store_dir: &Path) -> Result<SqlitePool> {
    std::fs::create_dir_all(store_dir)
        .with_context(|| format!("Failed to create store directory: {}", store_dir.display()))?;
    let db_path = store_db_path(store_dir);

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .with_context(|| format!("Failed to open triple store: {}", db_path.display()))?;

    Ok(pool)
}
