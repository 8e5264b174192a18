//! Raw message extraction.
//!
//! Pulls the last N days of messages for one chat from a [`MessageSource`]
//! and writes them as JSON lines for `cgraph canonicalize`. The built-in
//! source reads a JSON-lines message export from disk; other sources (a live
//! client, an archive service) plug in through the same trait.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use serde_json::Value;
use std::io::BufRead;
use std::path::{Path, PathBuf};

use crate::canonicalize::extract_chat_id;
use crate::config::Config;
use crate::export::write_atomic;

/// The chat to extract, as given on the command line or in config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityRef {
    /// Marked chat id such as `-1001234567890`.
    ChatId(String),
    /// Public username, without the leading `@`.
    Username(String),
    /// Private invite link hash (`t.me/+<hash>` or `t.me/joinchat/<hash>`).
    Invite(String),
}

impl EntityRef {
    pub fn parse(raw: &str) -> Result<Self> {
        let s = raw.trim();
        let s = s
            .strip_prefix("https://")
            .or_else(|| s.strip_prefix("http://"))
            .unwrap_or(s);
        let s = s.strip_prefix("t.me/").unwrap_or(s);

        if let Some(hash) = s.strip_prefix('+').or_else(|| s.strip_prefix("joinchat/")) {
            if hash.is_empty() {
                bail!("invite link '{}' has no hash", raw);
            }
            return Ok(EntityRef::Invite(hash.to_string()));
        }
        if s.parse::<i64>().is_ok() {
            return Ok(EntityRef::ChatId(s.to_string()));
        }

        let name = s.trim_start_matches('@').trim_end_matches('/');
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            bail!("'{}' is not a chat id, username, or invite link", raw);
        }
        Ok(EntityRef::Username(name.to_string()))
    }
}

impl std::fmt::Display for EntityRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityRef::ChatId(id) => write!(f, "{}", id),
            EntityRef::Username(name) => write!(f, "@{}", name),
            EntityRef::Invite(hash) => write!(f, "t.me/+{}", hash),
        }
    }
}

/// Something that can list the raw messages of a chat.
#[async_trait]
pub trait MessageSource: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Raw messages of `entity` posted at or after `since`, oldest first
    /// where the source knows the order.
    async fn fetch(&self, entity: &EntityRef, since: DateTime<Utc>) -> Result<Vec<Value>>;
}

/// Reads messages from a JSON-lines export on disk.
pub struct DumpFileSource {
    path: PathBuf,
}

impl DumpFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl MessageSource for DumpFileSource {
    fn name(&self) -> &str {
        "dump"
    }

    async fn fetch(&self, entity: &EntityRef, since: DateTime<Utc>) -> Result<Vec<Value>> {
        let file = std::fs::File::open(&self.path)
            .with_context(|| format!("Failed to open message dump: {}", self.path.display()))?;

        let chat_filter = match entity {
            EntityRef::ChatId(id) => Some(id.as_str()),
            other => {
                tracing::warn!(
                    entity = %other,
                    "message dump cannot resolve usernames or invite links; keeping all chats"
                );
                None
            }
        };

        let mut out = Vec::new();
        for (line_no, line) in std::io::BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let msg: Value = match serde_json::from_str(&line) {
                Ok(v) => v,
                Err(e) => {
                    tracing::warn!(line = line_no + 1, error = %e, "skipping malformed dump line");
                    continue;
                }
            };

            match msg.get("date").and_then(message_time) {
                Some(ts) if ts >= since => {}
                _ => continue,
            }
            if let Some(wanted) = chat_filter {
                let chat = msg.get("peer_id").and_then(extract_chat_id);
                if chat.as_deref() != Some(wanted) {
                    continue;
                }
            }
            out.push(msg);
        }
        Ok(out)
    }
}

/// Parse a raw message timestamp: RFC 3339, `YYYY-MM-DD HH:MM:SS+HH:MM`, or
/// Unix seconds.
pub fn message_time(value: &Value) -> Option<DateTime<Utc>> {
    if let Some(secs) = value.as_i64() {
        return DateTime::from_timestamp(secs, 0);
    }
    let s = value.as_str()?.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Some(ts.with_timezone(&Utc));
    }
    if let Ok(ts) = DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%:z") {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Fetch the window from `source` and write it to `output` as JSON lines.
pub async fn extract_to_file(
    source: &dyn MessageSource,
    entity: &EntityRef,
    since: DateTime<Utc>,
    output: &Path,
) -> Result<usize> {
    let messages = source
        .fetch(entity, since)
        .await
        .with_context(|| format!("source '{}' failed for {}", source.name(), entity))?;

    let mut out = String::new();
    for msg in &messages {
        out.push_str(&serde_json::to_string(msg)?);
        out.push('\n');
    }
    write_atomic(output, out.as_bytes())?;

    tracing::info!(
        source = source.name(),
        entity = %entity,
        messages = messages.len(),
        output = %output.display(),
        "extracted messages"
    );
    Ok(messages.len())
}

/// `cgraph extract`: CLI flags override the `[extract]` config section.
pub async fn run_extract(
    config: &Config,
    entity: Option<&str>,
    days: Option<i64>,
    output: &Path,
) -> Result<usize> {
    let entity = match entity.or(config.extract.entity.as_deref()) {
        Some(e) => EntityRef::parse(e)?,
        None => bail!("No chat given. Pass --entity or set extract.entity in config."),
    };
    let days = days.unwrap_or(config.extract.window_days);
    if days < 1 {
        bail!("--days must be >= 1");
    }
    let dump = match &config.extract.dump {
        Some(path) => path,
        None => bail!("No message source configured. Set extract.dump in config."),
    };

    let since = match Duration::try_days(days).and_then(|d| Utc::now().checked_sub_signed(d)) {
        Some(since) => since,
        None => bail!("--days {} is out of range", days),
    };
    let source = DumpFileSource::new(dump);
    extract_to_file(&source, &entity, since, output).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_entity_parse() {
        assert_eq!(
            EntityRef::parse("-1001234").unwrap(),
            EntityRef::ChatId("-1001234".into())
        );
        assert_eq!(
            EntityRef::parse("@some_chan").unwrap(),
            EntityRef::Username("some_chan".into())
        );
        assert_eq!(
            EntityRef::parse("https://t.me/some_chan").unwrap(),
            EntityRef::Username("some_chan".into())
        );
        assert_eq!(
            EntityRef::parse("t.me/+AbC123").unwrap(),
            EntityRef::Invite("AbC123".into())
        );
        assert_eq!(
            EntityRef::parse("https://t.me/joinchat/XyZ").unwrap(),
            EntityRef::Invite("XyZ".into())
        );
        assert!(EntityRef::parse("").is_err());
        assert!(EntityRef::parse("not a chat").is_err());
    }

    #[test]
    fn test_message_time_formats() {
        let expected = DateTime::parse_from_rfc3339("2024-05-01T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(message_time(&json!("2024-05-01T10:00:00+00:00")), Some(expected));
        assert_eq!(message_time(&json!("2024-05-01 12:00:00+02:00")), Some(expected));
        assert_eq!(message_time(&json!(1714557600)), Some(expected));
        assert_eq!(message_time(&json!("yesterday")), None);
    }

    #[tokio::test]
    async fn test_dump_source_filters_window_and_chat() {
        let tmp = TempDir::new().unwrap();
        let dump = tmp.path().join("dump.jsonl");
        let now = Utc::now();
        let recent = (now - Duration::days(1)).to_rfc3339();
        let old = (now - Duration::days(30)).to_rfc3339();
        let lines = [
            json!({"id": 1, "peer_id": {"channel_id": 555}, "date": recent}),
            json!({"id": 2, "peer_id": {"channel_id": 555}, "date": old}),
            json!({"id": 3, "peer_id": {"channel_id": 777}, "date": recent}),
            json!({"id": 4, "peer_id": {"channel_id": 555}}),
        ];
        let mut text: String = lines.iter().map(|l| format!("{}\n", l)).collect();
        text.push_str("{broken\n");
        std::fs::write(&dump, text).unwrap();

        let source = DumpFileSource::new(&dump);
        let since = now - Duration::days(7);

        let got = source
            .fetch(&EntityRef::ChatId("-100555".into()), since)
            .await
            .unwrap();
        let ids: Vec<i64> = got.iter().filter_map(|m| m["id"].as_i64()).collect();
        assert_eq!(ids, vec![1]);

        let got = source
            .fetch(&EntityRef::Username("anything".into()), since)
            .await
            .unwrap();
        let ids: Vec<i64> = got.iter().filter_map(|m| m["id"].as_i64()).collect();
        assert_eq!(ids, vec![1, 3]);
    }

    #[tokio::test]
    async fn test_run_extract_writes_lines() {
        let tmp = TempDir::new().unwrap();
        let dump = tmp.path().join("dump.jsonl");
        let recent = (Utc::now() - Duration::hours(2)).to_rfc3339();
        std::fs::write(
            &dump,
            format!(
                "{}\n",
                json!({"id": 9, "peer_id": {"channel_id": 1}, "date": recent})
            ),
        )
        .unwrap();

        let mut config = Config::minimal();
        config.extract.dump = Some(dump);
        let output = tmp.path().join("out/raw.jsonl");

        let n = run_extract(&config, Some("-1001"), None, &output).await.unwrap();
        assert_eq!(n, 1);
        let written = std::fs::read_to_string(&output).unwrap();
        assert_eq!(written.lines().count(), 1);

        assert!(run_extract(&config, None, None, &output).await.is_err());
    }

    #[tokio::test]
    async fn test_run_extract_rejects_huge_window() {
        let tmp = TempDir::new().unwrap();
        let dump = tmp.path().join("dump.jsonl");
        std::fs::write(&dump, "").unwrap();

        let mut config = Config::minimal();
        config.extract.dump = Some(dump);
        let output = tmp.path().join("raw.jsonl");

        for days in [i64::MAX, 200_000_000] {
            let err = run_extract(&config, Some("-1001"), Some(days), &output)
                .await
                .unwrap_err();
            assert!(err.to_string().contains("out of range"), "{}", err);
        }
        assert!(!output.exists());
    }
}
