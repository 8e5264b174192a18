//! Graph folding.
//!
//! Folds the canonical record stream into one [`GraphDocument`]. The fold
//! state lives in [`GraphBuilder`]: the target chat id (fixed by the first
//! record), the community, and insertion-ordered maps of users, links and
//! posts. [`GraphBuilder::absorb`] is the transition function and reports
//! what it did with each record as a [`FoldStep`].
//!
//! Bad fields degrade: an unusable link or a negative forward count is
//! dropped from the post and counted, and the post is kept. A record whose
//! identifiers cannot be built at all is rejected on its own and the fold
//! moves on. A stream with no usable record at all fails the whole build
//! with [`BuildError::NoRecords`].
//!
//! ```text
//! records ──▶ absorb ──▶ absorb ──▶ … ──▶ finish ──▶ GraphDocument
//!              │
//!              ├─ Appended / Replaced
//!              ├─ SkippedForeignChat
//!              └─ Rejected(ModelError)
//! ```

use anyhow::{Context, Result};
use std::io::BufRead;
use std::path::Path;
use thiserror::Error;

use crate::config::Config;
use crate::entities::parse_entities;
use crate::export::export_graph;
use crate::ids::{community_id, graph_id, normalize_url, ordered_dedup, post_id, user_id};
use crate::models::{
    is_absolute_link, CanonicalRecord, Community, GraphDocument, Link, ModelError, OrderedMap,
    Post, PostDraft, UserAccount,
};

/// Run-level build failure.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("no messages found for the target community")]
    NoRecords,
    #[error("invalid graph document: {0}")]
    Model(#[from] ModelError),
}

/// Outcome of feeding one record to the builder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FoldStep {
    /// A new post was added.
    Appended,
    /// A post with the same id already existed; its value was replaced in place.
    Replaced,
    /// The record belongs to a different chat than the first one seen.
    SkippedForeignChat,
    /// The record could not be turned into valid graph entities.
    Rejected(ModelError),
}

/// Fold accumulator.
#[derive(Debug, Default)]
pub struct GraphBuilder {
    target_chat_id: Option<String>,
    community: Option<Community>,
    users: OrderedMap<UserAccount>,
    links: OrderedMap<Link>,
    posts: OrderedMap<Post>,
    skipped_foreign: u64,
    rejected: u64,
    degraded: u64,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// The chat id this run is locked to, once a record has been seen.
    pub fn target_chat_id(&self) -> Option<&str> {
        self.target_chat_id.as_deref()
    }

    pub fn skipped_foreign(&self) -> u64 {
        self.skipped_foreign
    }

    pub fn rejected(&self) -> u64 {
        self.rejected
    }

    /// Fields dropped from otherwise accepted records.
    pub fn degraded(&self) -> u64 {
        self.degraded
    }

    pub fn absorb(&mut self, record: &CanonicalRecord) -> FoldStep {
        let chat_id = match self.target_chat_id.clone() {
            Some(target) if target != record.chat_id => {
                self.skipped_foreign += 1;
                return FoldStep::SkippedForeignChat;
            }
            Some(target) => target,
            None => {
                let community = match Community::new(community_id(&record.chat_id)) {
                    Ok(c) => c,
                    Err(e) => return self.reject(record, e),
                };
                self.target_chat_id = Some(record.chat_id.clone());
                self.community = Some(community);
                record.chat_id.clone()
            }
        };

        match self.absorb_post(&chat_id, record) {
            Ok(true) => FoldStep::Appended,
            Ok(false) => FoldStep::Replaced,
            Err(e) => self.reject(record, e),
        }
    }

    fn reject(&mut self, record: &CanonicalRecord, error: ModelError) -> FoldStep {
        tracing::warn!(
            chat_id = %record.chat_id,
            message_id = record.message_id,
            %error,
            "rejecting record"
        );
        self.rejected += 1;
        FoldStep::Rejected(error)
    }

    fn absorb_post(&mut self, chat_id: &str, record: &CanonicalRecord) -> Result<bool, ModelError> {
        let container = self
            .community
            .as_ref()
            .map(|c| c.id.clone())
            .unwrap_or_else(|| community_id(chat_id));

        let refs = parse_entities(&record.text, &record.entities);
        let text_links = self.usable_links(record, record.urls.iter());
        let entity_links = self.usable_links(record, refs.urls.iter());
        let all_urls = ordered_dedup(text_links.into_iter().chain(entity_links.iter().cloned()));

        let forwards = match record.forwards {
            Some(n) if n < 0 => {
                tracing::debug!(
                    message_id = record.message_id,
                    forwards = n,
                    "dropping negative forward count"
                );
                self.degraded += 1;
                None
            }
            other => other,
        };

        // Everything is validated before touching the shared maps, so a
        // rejected record leaves no users or links behind.
        let creator_id = record.from_user_id.map(user_id);
        let draft = PostDraft {
            id: post_id(chat_id, record.message_id),
            content: record.text.clone(),
            created: record.created_at.clone(),
            has_creator: creator_id.clone(),
            has_container: container,
            reply_to: record
                .reply_to_message_id
                .map(|target| post_id(chat_id, target)),
            links_to: all_urls.clone(),
            forwards,
            pinned: record.pinned,
            topics: refs.topics,
            mentions: refs.mentions,
            entity_links,
        };
        let post = Post::new(draft)?;
        let creator = creator_id.map(UserAccount::new).transpose()?;
        let links = all_urls
            .into_iter()
            .map(Link::new)
            .collect::<Result<Vec<_>, _>>()?;

        if let Some(user) = creator {
            self.users.entry(user.id.clone()).or_insert(user);
        }
        for link in links {
            self.links.entry(link.id.clone()).or_insert(link);
        }

        let key = post.id.clone();
        Ok(self.posts.insert(key, post).is_none())
    }

    /// Normalize and deduplicate URLs, dropping any that are still not
    /// absolute (for example a bare `https://`).
    fn usable_links<'a>(
        &mut self,
        record: &CanonicalRecord,
        urls: impl Iterator<Item = &'a String>,
    ) -> Vec<String> {
        let mut kept = Vec::new();
        for url in ordered_dedup(urls.map(|u| normalize_url(u))) {
            if is_absolute_link(&url) {
                kept.push(url);
            } else {
                tracing::debug!(message_id = record.message_id, %url, "dropping unusable link");
                self.degraded += 1;
            }
        }
        kept
    }

    /// Close the fold.
    pub fn finish(self) -> Result<GraphDocument, BuildError> {
        let (Some(chat_id), Some(community)) = (self.target_chat_id, self.community) else {
            return Err(BuildError::NoRecords);
        };
        if self.posts.is_empty() {
            return Err(BuildError::NoRecords);
        }
        Ok(GraphDocument::new(
            graph_id(&chat_id),
            community,
            self.users,
            self.links,
            self.posts,
        )?)
    }
}

/// Fold a record sequence into a graph document.
pub fn build_graph<'a, I>(records: I) -> Result<GraphDocument, BuildError>
where
    I: IntoIterator<Item = &'a CanonicalRecord>,
{
    let mut builder = GraphBuilder::new();
    for record in records {
        builder.absorb(record);
    }
    builder.finish()
}

/// Counts reported by a build run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildReport {
    pub records: u64,
    pub malformed: u64,
    pub skipped_foreign: u64,
    pub rejected: u64,
    pub degraded: u64,
    pub posts: usize,
    pub users: usize,
    pub links: usize,
}

/// Parse canonical JSON lines and fold them, skipping unparseable lines.
pub fn build_from_lines<R: BufRead>(reader: R) -> Result<(GraphDocument, BuildReport)> {
    let mut builder = GraphBuilder::new();
    let mut report = BuildReport::default();

    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<CanonicalRecord>(&line) {
            Ok(record) => {
                report.records += 1;
                builder.absorb(&record);
            }
            Err(e) => {
                tracing::warn!(line = line_no + 1, error = %e, "skipping malformed canonical record");
                report.malformed += 1;
            }
        }
    }

    report.skipped_foreign = builder.skipped_foreign();
    report.rejected = builder.rejected();
    report.degraded = builder.degraded();
    let doc = builder.finish()?;
    report.posts = doc.posts.len();
    report.users = doc.users.len();
    report.links = doc.links.len();
    Ok((doc, report))
}

/// Read canonical records from `input` and write the graph document to `output`.
///
/// Nothing is written when the build fails.
pub fn run_build(_config: &Config, input: &Path, output: &Path) -> Result<BuildReport> {
    let file = std::fs::File::open(input)
        .with_context(|| format!("Failed to open canonical messages: {}", input.display()))?;
    let (doc, report) = build_from_lines(std::io::BufReader::new(file))
        .with_context(|| format!("build failed for {}", input.display()))?;

    export_graph(&doc, output)?;

    tracing::info!(
        graph = %doc.id,
        posts = report.posts,
        users = report.users,
        links = report.links,
        skipped_foreign = report.skipped_foreign,
        degraded = report.degraded,
        "built graph document"
    );
    Ok(report)
}
