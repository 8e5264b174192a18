//! Triple store.
//!
//! A store is a directory holding one SQLite database with a single
//! `triples` table. Turtle is read with `oxttl`; terms are stored in their
//! N-Triples form and the table is unique over all three columns, so loading
//! is set-like: loading the same Turtle file twice leaves the store unchanged.
//!
//! Blank nodes get fresh labels on every parse, so triples that mention one
//! are added again on each load.

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use std::path::Path;

use crate::config::Config;
use crate::db;
use crate::migrate;
use crate::rdf::parse_turtle;
use oxrdf::Triple;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    /// Statements read from the Turtle file.
    pub parsed: usize,
    /// Statements that were not already in the store.
    pub inserted: u64,
    /// Store size after loading.
    pub total: i64,
}

/// Open (creating if needed) the store in `store_dir`.
pub async fn open(store_dir: &Path) -> Result<SqlitePool> {
    let pool = db::connect(store_dir).await?;
    migrate::run_migrations(&pool).await?;
    Ok(pool)
}

/// Insert triples in one transaction. Returns how many were new.
pub async fn insert_triples(pool: &SqlitePool, triples: &[Triple]) -> Result<u64> {
    let mut tx = pool.begin().await?;
    let mut inserted = 0u64;

    for triple in triples {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO triples (subject, predicate, object) VALUES (?, ?, ?)",
        )
        .bind(triple.subject.to_string())
        .bind(triple.predicate.to_string())
        .bind(triple.object.to_string())
        .execute(&mut *tx)
        .await?;
        inserted += result.rows_affected();
    }

    tx.commit().await?;
    Ok(inserted)
}

pub async fn triple_count(pool: &SqlitePool) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM triples")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

/// Load a Turtle file into the store in `store_dir`.
pub async fn load_turtle(store_dir: &Path, path: &Path) -> Result<LoadReport> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read Turtle file: {}", path.display()))?;
    let triples = parse_turtle(&text)
        .with_context(|| format!("Failed to parse Turtle file: {}", path.display()))?;

    let pool = open(store_dir).await?;
    let inserted = insert_triples(&pool, &triples).await?;
    let total = triple_count(&pool).await?;
    pool.close().await;

    tracing::info!(
        parsed = triples.len(),
        inserted,
        total,
        store = %store_dir.display(),
        "loaded triples"
    );
    Ok(LoadReport {
        parsed: triples.len(),
        inserted,
        total,
    })
}

/// Count the triples held by the store in `store_dir`.
pub async fn count_triples(store_dir: &Path) -> Result<i64> {
    let pool = open(store_dir).await?;
    let count = triple_count(&pool).await?;
    pool.close().await;
    Ok(count)
}

pub async fn run_load(config: &Config, input: &Path) -> Result<LoadReport> {
    load_turtle(&config.store.dir, input).await
}
