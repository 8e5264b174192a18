//! Entity-span parsing.
//!
//! Turns a record's annotation spans into three independent lists: hashtag
//! topics, mentions, and URLs carried by URL-type spans.
//!
//! Span offsets and lengths count UTF-16 code units. Rust strings are UTF-8,
//! so slicing goes through a UTF-16 view of the text. A span whose bounds
//! fall inside a surrogate pair yields nothing rather than a mangled string.

use crate::ids::{hashtag_topic_id, mention_id, ordered_dedup};
use crate::models::EntitySpan;

pub const HASHTAG: &str = "MessageEntityHashtag";
pub const MENTION: &str = "MessageEntityMention";
pub const URL: &str = "MessageEntityUrl";
pub const TEXT_URL: &str = "MessageEntityTextUrl";

/// Identifiers and URLs derived from one record's spans, each deduplicated
/// in first-occurrence order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntityRefs {
    pub topics: Vec<String>,
    pub mentions: Vec<String>,
    /// Raw URLs, not yet normalized.
    pub urls: Vec<String>,
}

/// Slice `text` by UTF-16 code units.
///
/// The end is clamped to the text length. Returns `None` for an empty or
/// out-of-range span, or one that splits a surrogate pair.
pub fn utf16_slice(text: &str, offset: i64, length: i64) -> Option<String> {
    if offset < 0 || length <= 0 {
        return None;
    }
    let units: Vec<u16> = text.encode_utf16().collect();
    let start = usize::try_from(offset).ok()?;
    if start >= units.len() {
        return None;
    }
    let end = start
        .saturating_add(usize::try_from(length).ok()?)
        .min(units.len());
    String::from_utf16(&units[start..end]).ok()
}

pub fn parse_entities(text: &str, spans: &[EntitySpan]) -> EntityRefs {
    let mut topics = Vec::new();
    let mut mentions = Vec::new();
    let mut urls = Vec::new();

    for span in spans {
        let snippet = match (span.offset, span.length) {
            (Some(offset), Some(length)) => utf16_slice(text, offset, length),
            _ => None,
        };

        match span.kind.as_deref() {
            Some(HASHTAG) => {
                if let Some(s) = &snippet {
                    let tag = s.trim_start_matches('#');
                    if !tag.is_empty() {
                        topics.push(hashtag_topic_id(tag));
                    }
                }
            }
            Some(MENTION) => {
                if let Some(s) = &snippet {
                    let handle = s.trim_start_matches('@');
                    if !handle.is_empty() {
                        mentions.push(mention_id(handle));
                    }
                }
            }
            Some(URL) => {
                if let Some(s) = snippet {
                    urls.push(s);
                }
            }
            Some(TEXT_URL) => {
                if let Some(url) = span.url.as_deref().filter(|u| !u.is_empty()) {
                    urls.push(url.to_string());
                }
            }
            _ => {}
        }
    }

    EntityRefs {
        topics: ordered_dedup(topics),
        mentions: ordered_dedup(mentions),
        urls: ordered_dedup(urls),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span(kind: &str, offset: i64, length: i64) -> EntitySpan {
        EntitySpan {
            kind: Some(kind.to_string()),
            offset: Some(offset),
            length: Some(length),
            ..Default::default()
        }
    }

    #[test]
    fn test_hashtag_scenario() {
        let refs = parse_entities("great #infra talk", &[span(HASHTAG, 6, 6)]);
        assert_eq!(refs.topics, vec!["tg:tag/hashtag/infra"]);
        assert!(refs.mentions.is_empty());
        assert!(refs.urls.is_empty());
    }

    #[test]
    fn test_mention_strips_at() {
        let refs = parse_entities("ping @alice now", &[span(MENTION, 5, 6)]);
        assert_eq!(refs.mentions, vec!["tg:mention/alice"]);
    }

    #[test]
    fn test_offsets_are_utf16_units() {
        // 🚀 is one scalar but two UTF-16 units, so "#rust" starts at unit 3.
        let text = "🚀 #rust";
        let refs = parse_entities(text, &[span(HASHTAG, 3, 5)]);
        assert_eq!(refs.topics, vec!["tg:tag/hashtag/rust"]);
    }

    #[test]
    fn test_split_surrogate_yields_nothing() {
        assert_eq!(utf16_slice("🚀x", 1, 2), None);
        assert_eq!(utf16_slice("🚀x", 0, 2).as_deref(), Some("🚀"));
    }

    #[test]
    fn test_slice_bounds() {
        assert_eq!(utf16_slice("abc", 1, 10).as_deref(), Some("bc"));
        assert_eq!(utf16_slice("abc", 3, 1), None);
        assert_eq!(utf16_slice("abc", -1, 1), None);
        assert_eq!(utf16_slice("abc", 0, 0), None);
    }

    #[test]
    fn test_url_spans() {
        let mut text_url = span(TEXT_URL, 0, 4);
        text_url.url = Some("https://docs.rs".into());
        let refs = parse_entities(
            "docs at Fly.io",
            &[span(URL, 8, 6), text_url, span(URL, 8, 6)],
        );
        assert_eq!(refs.urls, vec!["Fly.io", "https://docs.rs"]);
    }

    #[test]
    fn test_dedup_within_record() {
        let refs = parse_entities(
            "#a #a #b",
            &[span(HASHTAG, 0, 2), span(HASHTAG, 3, 2), span(HASHTAG, 6, 2)],
        );
        assert_eq!(refs.topics, vec!["tg:tag/hashtag/a", "tg:tag/hashtag/b"]);
    }

    #[test]
    fn test_unknown_and_incomplete_spans_ignored() {
        let mut no_len = span(HASHTAG, 0, 1);
        no_len.length = None;
        let refs = parse_entities(
            "#x **bold**",
            &[no_len, span("MessageEntityBold", 3, 8), span(HASHTAG, 0, 1)],
        );
        assert_eq!(refs, EntityRefs::default());
    }
}
