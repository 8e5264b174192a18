//! Identifier construction.
//!
//! Every node in the graph is addressed by a `tg:`-prefixed CURIE built from
//! the platform's own identifiers, except links, which are addressed by their
//! normalized URL. All functions here are pure: the same input always yields
//! the same identifier, which is what makes repeated runs byte-identical.

/// Prefix shared by every non-link identifier.
pub const TG_PREFIX: &str = "tg:";

/// Window label baked into the graph identifier.
pub const WINDOW_LABEL: &str = "last7d";

pub fn community_id(chat_id: &str) -> String {
    format!("tg:community/{}", chat_id)
}

pub fn user_id(user_id: i64) -> String {
    format!("tg:user/{}", user_id)
}

pub fn post_id(chat_id: &str, message_id: i64) -> String {
    format!("tg:post/{}/{}", chat_id, message_id)
}

pub fn hashtag_topic_id(tag: &str) -> String {
    format!("tg:tag/hashtag/{}", tag)
}

pub fn mention_id(handle: &str) -> String {
    format!("tg:mention/{}", handle)
}

pub fn graph_id(chat_id: &str) -> String {
    format!("tg:graph/{}/{}", chat_id, WINDOW_LABEL)
}

/// Normalize a URL-like string into an absolute URL.
///
/// The platform flags bare domains such as `Fly.io` as URLs. Without a
/// scheme those would later be read as CURIEs by the RDF writer, so anything
/// lacking `://` gets an `https://` prefix. Already-absolute URLs are
/// returned as-is (after trimming surrounding whitespace), which makes the
/// function idempotent.
pub fn normalize_url(url: &str) -> String {
    let url = url.trim();
    if url.is_empty() || url.contains("://") {
        return url.to_string();
    }
    format!("https://{}", url)
}

/// Deduplicate while keeping the first occurrence of each value.
///
/// Empty strings are discarded.
pub fn ordered_dedup<I>(items: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for item in items {
        if item.is_empty() || !seen.insert(item.clone()) {
            continue;
        }
        out.push(item);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_shapes() {
        assert_eq!(community_id("-100555"), "tg:community/-100555");
        assert_eq!(user_id(42), "tg:user/42");
        assert_eq!(post_id("-100555", 7), "tg:post/-100555/7");
        assert_eq!(hashtag_topic_id("infra"), "tg:tag/hashtag/infra");
        assert_eq!(mention_id("alice"), "tg:mention/alice");
        assert_eq!(graph_id("-100555"), "tg:graph/-100555/last7d");
    }

    #[test]
    fn test_normalize_url_absolute_is_noop() {
        assert_eq!(normalize_url("https://Example.co"), "https://Example.co");
        assert_eq!(normalize_url("ftp://host/x"), "ftp://host/x");
    }

    #[test]
    fn test_normalize_url_bare_domain() {
        assert_eq!(normalize_url("Fly.io"), "https://Fly.io");
        assert_eq!(normalize_url("  gitcoin.co/x "), "https://gitcoin.co/x");
    }

    #[test]
    fn test_normalize_url_idempotent() {
        for raw in ["Fly.io", "http://a.b", " c.d ", "", "https://x.y/z?q=1"] {
            let once = normalize_url(raw);
            assert_eq!(normalize_url(&once), once, "not idempotent for {:?}", raw);
        }
        assert_eq!(normalize_url(""), "");
    }

    #[test]
    fn test_ordered_dedup_keeps_first_and_drops_empty() {
        let out = ordered_dedup(
            ["b", "a", "", "b", "c", "a"]
                .into_iter()
                .map(String::from),
        );
        assert_eq!(out, vec!["b", "a", "c"]);
    }
}
