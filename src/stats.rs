//! Graph statistics.
//!
//! Summarizes a built graph document: entity counts, distinct topics and
//! mentions, reply structure, and (when a store exists) how many triples it
//! holds. Used by `cgraph stats` to sanity-check a pipeline run.

use anyhow::{Context, Result};
use serde_json::Value;
use std::collections::BTreeSet;
use std::path::Path;

use crate::config::Config;
use crate::db;
use crate::rdf::{normalize_ids, ref_id};
use crate::store;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GraphStats {
    pub graph_id: String,
    pub community: String,
    pub posts: usize,
    pub users: usize,
    pub links: usize,
    pub topics: usize,
    pub mentions: usize,
    pub replies: usize,
    /// Replies whose target post is not in the document.
    pub dangling_replies: usize,
    pub pinned: usize,
    pub earliest: Option<String>,
    pub latest: Option<String>,
}

/// Compute statistics for a graph document.
pub fn graph_stats(doc: &Value) -> GraphStats {
    let doc = normalize_ids(doc.clone());
    let empty = serde_json::Map::new();
    let posts = doc.get("posts").and_then(Value::as_object).unwrap_or(&empty);

    let mut topics = BTreeSet::new();
    let mut mentions = BTreeSet::new();
    let mut replies = 0;
    let mut dangling = 0;
    let mut pinned = 0;
    let mut created: Vec<&str> = Vec::new();

    for post in posts.values() {
        for t in strings(post.get("topics")) {
            topics.insert(t);
        }
        for m in strings(post.get("mentions")) {
            mentions.insert(m);
        }
        if let Some(target) = post.get("reply_to").and_then(ref_id) {
            replies += 1;
            if !posts.contains_key(&target) {
                dangling += 1;
            }
        }
        if post.get("pinned").and_then(Value::as_bool) == Some(true) {
            pinned += 1;
        }
        if let Some(c) = post.get("created").and_then(Value::as_str) {
            created.push(c);
        }
    }
    created.sort_unstable();

    let count = |key: &str| doc.get(key).and_then(Value::as_object).map_or(0, |m| m.len());
    let text = |key: &str| {
        doc.get(key)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };

    GraphStats {
        graph_id: text("id"),
        community: doc.get("community").and_then(ref_id).unwrap_or_default(),
        posts: posts.len(),
        users: count("users"),
        links: count("links"),
        topics: topics.len(),
        mentions: mentions.len(),
        replies,
        dangling_replies: dangling,
        pinned,
        earliest: created.first().map(|s| s.to_string()),
        latest: created.last().map(|s| s.to_string()),
    }
}

fn strings(value: Option<&Value>) -> impl Iterator<Item = String> + '_ {
    value
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|v| v.as_str().map(str::to_string))
}

/// Run the stats command: read the graph document and print a summary.
pub async fn run_stats(config: &Config, input: &Path) -> Result<GraphStats> {
    let raw = std::fs::read_to_string(input)
        .with_context(|| format!("Failed to read graph document: {}", input.display()))?;
    let doc: Value = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse graph document: {}", input.display()))?;
    let stats = graph_stats(&doc);

    println!("Chat Graph: Stats");
    println!("=================");
    println!();
    println!("  Document:    {}", input.display());
    println!("  Size:        {}", format_bytes(raw.len() as u64));
    println!("  Graph:       {}", stats.graph_id);
    println!("  Community:   {}", stats.community);
    println!();
    println!("  Posts:       {}", stats.posts);
    println!("  Users:       {}", stats.users);
    println!("  Links:       {}", stats.links);
    println!("  Topics:      {}", stats.topics);
    println!("  Mentions:    {}", stats.mentions);
    println!(
        "  Replies:     {} ({} to posts outside the window)",
        stats.replies, stats.dangling_replies
    );
    println!("  Pinned:      {}", stats.pinned);
    if let (Some(first), Some(last)) = (&stats.earliest, &stats.latest) {
        println!("  Window:      {} .. {}", first, last);
    }

    if db::store_db_path(&config.store.dir).exists() {
        let triples = store::count_triples(&config.store.dir).await?;
        println!();
        println!("  Store:       {}", config.store.dir.display());
        println!("  Triples:     {}", triples);
    }
    println!();

    Ok(stats)
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
