//! Raw message → canonical record.
//!
//! The platform's message dump is a loose key-value structure. This module
//! pulls out the handful of fields the graph needs and gives them a fixed
//! shape. Each record is handled on its own; no state is carried between
//! records.
//!
//! A record is dropped only when its chat id, message id, or timestamp cannot
//! be resolved. Every other field is best-effort and falls back to null or
//! empty.

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use regex::Regex;
use serde_json::{Map, Value};
use std::io::BufRead;
use std::path::Path;
use std::sync::LazyLock;
use thiserror::Error;

use crate::config::Config;
use crate::export::write_atomic;
use crate::models::{CanonicalRecord, EntitySpan};

static URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)https?://[^\s<>()\[\]{}"']+"#).expect("URL pattern is valid")
});

/// Why a raw record produced no canonical record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DropReason {
    #[error("no resolvable chat id")]
    MissingChatId,
    #[error("no message id")]
    MissingMessageId,
    #[error("no resolvable timestamp")]
    MissingTimestamp,
}

#[derive(Debug, Clone, Default)]
pub struct CanonicalizeOptions {
    pub public_username: Option<String>,
}

impl CanonicalizeOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            public_username: config.canonicalize.public_username.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CanonicalizeStats {
    pub read: u64,
    pub written: u64,
    pub malformed: u64,
    pub missing_chat_id: u64,
    pub missing_message_id: u64,
    pub missing_timestamp: u64,
}

impl CanonicalizeStats {
    pub fn dropped(&self) -> u64 {
        self.malformed + self.missing_chat_id + self.missing_message_id + self.missing_timestamp
    }

    fn count_drop(&mut self, reason: DropReason) {
        match reason {
            DropReason::MissingChatId => self.missing_chat_id += 1,
            DropReason::MissingMessageId => self.missing_message_id += 1,
            DropReason::MissingTimestamp => self.missing_timestamp += 1,
        }
    }
}

/// Canonicalize one raw record.
pub fn canonicalize_record(
    raw: &Value,
    options: &CanonicalizeOptions,
) -> Result<CanonicalRecord, DropReason> {
    let chat_id = raw
        .get("peer_id")
        .and_then(extract_chat_id)
        .ok_or(DropReason::MissingChatId)?;
    let message_id = raw
        .get("id")
        .and_then(as_int)
        .ok_or(DropReason::MissingMessageId)?;
    let created_at = raw
        .get("date")
        .and_then(normalize_timestamp)
        .ok_or(DropReason::MissingTimestamp)?;

    let text = raw
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let from_user_id = raw
        .get("from_id")
        .and_then(|f| f.get("user_id"))
        .and_then(as_int);
    let reply_to_message_id = raw
        .get("reply_to")
        .and_then(|r| r.get("reply_to_msg_id"))
        .and_then(as_int);

    let permalink = options.public_username.as_deref().map(|name| {
        format!(
            "https://t.me/{}/{}",
            name.trim_start_matches('@'),
            message_id
        )
    });

    let urls = extract_urls(&text);
    let entities = raw
        .get("entities")
        .and_then(Value::as_array)
        .map(|list| simplify_entities(list))
        .unwrap_or_default();

    Ok(CanonicalRecord {
        chat_id,
        message_id,
        created_at,
        text,
        from_user_id,
        reply_to_message_id,
        permalink,
        urls,
        forwards: raw.get("forwards").and_then(as_int),
        pinned: raw.get("pinned").and_then(truthy),
        entities,
    })
}

/// Resolve the chat id from a peer reference.
///
/// Channels get the `-100` supergroup marker, small groups a `-` marker, and
/// direct user peers pass through unchanged.
pub fn extract_chat_id(peer: &Value) -> Option<String> {
    let peer = peer.as_object()?;
    if let Some(id) = peer.get("channel_id") {
        return numeric_text(id).map(|id| format!("-100{}", id));
    }
    if let Some(id) = peer.get("chat_id") {
        return numeric_text(id).map(|id| format!("-{}", id));
    }
    if let Some(id) = peer.get("user_id") {
        return numeric_text(id);
    }
    None
}

/// Find `http://` / `https://` URLs in free text, in order of appearance.
pub fn extract_urls(text: &str) -> Vec<String> {
    URL_RE
        .find_iter(text)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Reduce raw annotation objects to [`EntitySpan`]s. Non-object entries are skipped.
pub fn simplify_entities(entities: &[Value]) -> Vec<EntitySpan> {
    entities
        .iter()
        .filter_map(Value::as_object)
        .map(simplify_entity)
        .collect()
}

fn simplify_entity(entity: &Map<String, Value>) -> EntitySpan {
    EntitySpan {
        kind: entity.get("_").and_then(Value::as_str).map(str::to_string),
        offset: entity.get("offset").and_then(as_int),
        length: entity.get("length").and_then(as_int),
        url: entity.get("url").and_then(Value::as_str).map(str::to_string),
        user_id: entity.get("user_id").and_then(as_int),
    }
}

/// Pre-formatted strings pass through untouched; numbers are Unix seconds.
fn normalize_timestamp(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => {
            let dt: DateTime<Utc> = if let Some(secs) = n.as_i64() {
                Utc.timestamp_opt(secs, 0).single()?
            } else {
                let secs = n.as_f64()?;
                if !secs.is_finite() {
                    return None;
                }
                let whole = secs.floor();
                let nanos = ((secs - whole) * 1e9).round() as u32;
                Utc.timestamp_opt(whole as i64, nanos.min(999_999_999)).single()?
            };
            Some(dt.to_rfc3339_opts(SecondsFormat::AutoSi, false))
        }
        _ => None,
    }
}

fn as_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && f.fract() == 0.0)
                .map(|f| f as i64)
        }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn numeric_text(value: &Value) -> Option<String> {
    match value {
        Value::Number(n) if n.is_i64() || n.is_u64() => Some(n.to_string()),
        Value::String(s) => {
            let s = s.trim();
            (!s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())).then(|| s.to_string())
        }
        _ => None,
    }
}

fn truthy(value: &Value) -> Option<bool> {
    match value {
        Value::Null => None,
        Value::Bool(b) => Some(*b),
        Value::Number(n) => Some(n.as_f64().is_some_and(|f| f != 0.0)),
        Value::String(s) => Some(!s.is_empty()),
        Value::Array(a) => Some(!a.is_empty()),
        Value::Object(o) => Some(!o.is_empty()),
    }
}

/// Canonicalize a JSON-lines stream.
///
/// Blank lines are ignored; lines that are not valid JSON count as
/// malformed and are skipped.
pub fn canonicalize_lines<R: BufRead>(
    reader: R,
    options: &CanonicalizeOptions,
) -> Result<(Vec<CanonicalRecord>, CanonicalizeStats)> {
    let mut stats = CanonicalizeStats::default();
    let mut records = Vec::new();

    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        stats.read += 1;

        let raw: Value = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(line = line_no + 1, error = %e, "skipping malformed raw record");
                stats.malformed += 1;
                continue;
            }
        };

        match canonicalize_record(&raw, options) {
            Ok(record) => {
                records.push(record);
                stats.written += 1;
            }
            Err(reason) => {
                tracing::debug!(line = line_no + 1, %reason, "dropping raw record");
                stats.count_drop(reason);
            }
        }
    }

    Ok((records, stats))
}

/// Read raw records from `input` and write canonical JSON lines to `output`.
pub fn run_canonicalize(config: &Config, input: &Path, output: &Path) -> Result<CanonicalizeStats> {
    let file = std::fs::File::open(input)
        .with_context(|| format!("Failed to open raw messages: {}", input.display()))?;
    let options = CanonicalizeOptions::from_config(config);
    let (records, stats) = canonicalize_lines(std::io::BufReader::new(file), &options)
        .with_context(|| format!("Failed to read raw messages: {}", input.display()))?;

    let mut out = String::new();
    for record in &records {
        out.push_str(&serde_json::to_string(record)?);
        out.push('\n');
    }
    write_atomic(output, out.as_bytes())?;

    tracing::info!(
        read = stats.read,
        written = stats.written,
        dropped = stats.dropped(),
        output = %output.display(),
        "canonicalized messages"
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn opts() -> CanonicalizeOptions {
        CanonicalizeOptions::default()
    }

    fn raw_message() -> Value {
        json!({
            "_": "Message",
            "id": 17,
            "peer_id": {"_": "PeerChannel", "channel_id": 555},
            "date": "2024-05-01 10:00:00+00:00",
            "message": "see https://Example.co and (http://x.org/a)",
            "from_id": {"_": "PeerUser", "user_id": 42},
            "reply_to": {"_": "MessageReplyHeader", "reply_to_msg_id": 3},
            "forwards": 2,
            "pinned": false,
            "entities": [
                {"_": "MessageEntityUrl", "offset": 4, "length": 18},
                "garbage",
                {"_": "MessageEntityTextUrl", "offset": 0, "length": 3, "url": "https://t.me/x"}
            ]
        })
    }

    #[test]
    fn test_full_record() {
        let rec = canonicalize_record(&raw_message(), &opts()).unwrap();
        assert_eq!(rec.chat_id, "-100555");
        assert_eq!(rec.message_id, 17);
        assert_eq!(rec.created_at, "2024-05-01 10:00:00+00:00");
        assert_eq!(rec.from_user_id, Some(42));
        assert_eq!(rec.reply_to_message_id, Some(3));
        assert_eq!(rec.urls, vec!["https://Example.co", "http://x.org/a"]);
        assert_eq!(rec.forwards, Some(2));
        assert_eq!(rec.pinned, Some(false));
        assert_eq!(rec.permalink, None);
        assert_eq!(rec.entities.len(), 2);
        assert_eq!(rec.entities[1].url.as_deref(), Some("https://t.me/x"));
        assert_eq!(rec.entities[0].url, None);
    }

    #[test]
    fn test_chat_id_shapes() {
        assert_eq!(
            extract_chat_id(&json!({"channel_id": 12})).as_deref(),
            Some("-10012")
        );
        assert_eq!(extract_chat_id(&json!({"chat_id": 34})).as_deref(), Some("-34"));
        assert_eq!(extract_chat_id(&json!({"user_id": "56"})).as_deref(), Some("56"));
        assert_eq!(extract_chat_id(&json!({"other": 1})), None);
        assert_eq!(extract_chat_id(&json!("PeerChannel(1)")), None);
        assert_eq!(extract_chat_id(&json!({"channel_id": null})), None);
    }

    #[test]
    fn test_drop_reasons() {
        let mut raw = raw_message();
        raw.as_object_mut().unwrap().remove("peer_id");
        assert_eq!(
            canonicalize_record(&raw, &opts()),
            Err(DropReason::MissingChatId)
        );

        let mut raw = raw_message();
        raw["id"] = Value::Null;
        assert_eq!(
            canonicalize_record(&raw, &opts()),
            Err(DropReason::MissingMessageId)
        );

        let mut raw = raw_message();
        raw["date"] = json!({"not": "a date"});
        assert_eq!(
            canonicalize_record(&raw, &opts()),
            Err(DropReason::MissingTimestamp)
        );
    }

    #[test]
    fn test_defaults_for_missing_fields() {
        let raw = json!({"id": 1, "peer_id": {"chat_id": 9}, "date": "2024-01-01T00:00:00+00:00"});
        let rec = canonicalize_record(&raw, &opts()).unwrap();
        assert_eq!(rec.text, "");
        assert_eq!(rec.from_user_id, None);
        assert_eq!(rec.reply_to_message_id, None);
        assert!(rec.urls.is_empty());
        assert!(rec.entities.is_empty());
        assert_eq!(rec.forwards, None);
        assert_eq!(rec.pinned, None);
    }

    #[test]
    fn test_numeric_timestamp_is_utc() {
        let raw = json!({"id": 1, "peer_id": {"user_id": 9}, "date": 1714557600});
        let rec = canonicalize_record(&raw, &opts()).unwrap();
        assert_eq!(rec.created_at, "2024-05-01T10:00:00+00:00");
    }

    #[test]
    fn test_permalink_with_username() {
        let options = CanonicalizeOptions {
            public_username: Some("@rustlang".into()),
        };
        let rec = canonicalize_record(&raw_message(), &options).unwrap();
        assert_eq!(rec.permalink.as_deref(), Some("https://t.me/rustlang/17"));
    }

    #[test]
    fn test_extract_urls_stops_at_brackets_and_quotes() {
        let urls = extract_urls("a \"HTTPS://foo.bar/x\" b <http://q.r> [https://s.t/u]");
        assert_eq!(urls, vec!["HTTPS://foo.bar/x", "http://q.r", "https://s.t/u"]);
        assert!(extract_urls("no links, just example.com").is_empty());
    }

    #[test]
    fn test_pinned_truthiness() {
        let mut raw = raw_message();
        raw["pinned"] = json!(1);
        assert_eq!(canonicalize_record(&raw, &opts()).unwrap().pinned, Some(true));
        raw["pinned"] = Value::Null;
        assert_eq!(canonicalize_record(&raw, &opts()).unwrap().pinned, None);
    }

    #[test]
    fn test_canonicalize_lines_counts() {
        let input = format!(
            "{}\n\nnot json\n{}\n",
            raw_message(),
            json!({"id": 2, "date": "x"})
        );
        let (records, stats) = canonicalize_lines(input.as_bytes(), &opts()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(stats.read, 3);
        assert_eq!(stats.written, 1);
        assert_eq!(stats.malformed, 1);
        assert_eq!(stats.missing_chat_id, 1);
        assert_eq!(stats.dropped(), 2);
    }

    #[test]
    fn test_output_field_order() {
        let rec = canonicalize_record(&raw_message(), &opts()).unwrap();
        let line = serde_json::to_string(&rec).unwrap();
        let keys = [
            "\"chat_id\"",
            "\"message_id\"",
            "\"created_at\"",
            "\"text\"",
            "\"from_user_id\"",
            "\"reply_to_message_id\"",
            "\"permalink\"",
            "\"urls\"",
            "\"forwards\"",
            "\"pinned\"",
            "\"entities\"",
        ];
        let positions: Vec<usize> = keys.iter().map(|k| line.find(k).unwrap()).collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]), "{}", line);
    }
}
