//! Core data models used throughout chat-graph.
//!
//! Two families live here: the flat [`CanonicalRecord`] that the
//! canonicalizer writes and the builder reads, and the graph entities
//! ([`Community`], [`UserAccount`], [`Link`], [`Post`], [`GraphDocument`])
//! produced by the fold. Graph entities are plain value structs; each one is
//! created through a single validating constructor and never mutated after
//! the fold completes.

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

// ─── Canonical records ──────────────────────────────────────────────

/// One normalized message.
///
/// Field order matters: it is the order of keys in the canonical JSON lines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalRecord {
    pub chat_id: String,
    pub message_id: i64,
    pub created_at: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub text: String,
    #[serde(default)]
    pub from_user_id: Option<i64>,
    #[serde(default)]
    pub reply_to_message_id: Option<i64>,
    #[serde(default)]
    pub permalink: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub urls: Vec<String>,
    #[serde(default)]
    pub forwards: Option<i64>,
    #[serde(default)]
    pub pinned: Option<bool>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub entities: Vec<EntitySpan>,
}

/// Treat an explicit `null` like a missing key.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// A simplified text annotation.
///
/// `offset` and `length` are UTF-16 code unit positions, exactly as the
/// platform reports them.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EntitySpan {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub offset: Option<i64>,
    #[serde(default)]
    pub length: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,
}

// ─── Graph entities ─────────────────────────────────────────────────

/// Violations caught by the graph entity constructors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    #[error("{kind} identifier '{value}' must start with '{expected}'")]
    InvalidId {
        kind: &'static str,
        value: String,
        expected: &'static str,
    },
    #[error("{kind} identifier '{value}' has nothing after its prefix")]
    EmptyId { kind: &'static str, value: String },
    #[error("link '{0}' is not an absolute URL")]
    RelativeLink(String),
    #[error("forward count must be >= 0, got {0}")]
    NegativeForwards(i64),
}

fn check_id(kind: &'static str, value: &str, expected: &'static str) -> Result<(), ModelError> {
    match value.strip_prefix(expected) {
        None => Err(ModelError::InvalidId {
            kind,
            value: value.to_string(),
            expected,
        }),
        Some("") => Err(ModelError::EmptyId {
            kind,
            value: value.to_string(),
        }),
        Some(_) => Ok(()),
    }
}

/// `scheme://rest` with both parts non-empty.
pub fn is_absolute_link(url: &str) -> bool {
    matches!(url.split_once("://"), Some((scheme, rest)) if !scheme.is_empty() && !rest.is_empty())
}

fn check_link(url: &str) -> Result<(), ModelError> {
    if is_absolute_link(url) {
        Ok(())
    } else {
        Err(ModelError::RelativeLink(url.to_string()))
    }
}

/// The chat, channel or group a run is about.
///
/// Serialized as its bare identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Community {
    pub id: String,
}

impl Community {
    pub fn new(id: String) -> Result<Self, ModelError> {
        check_id("community", &id, "tg:community/")?;
        Ok(Self { id })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserAccount {
    pub id: String,
}

impl UserAccount {
    pub fn new(id: String) -> Result<Self, ModelError> {
        check_id("user", &id, "tg:user/")?;
        Ok(Self { id })
    }
}

/// An outbound link. The normalized URL is its own identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Link {
    pub id: String,
}

impl Link {
    pub fn new(url: String) -> Result<Self, ModelError> {
        check_link(&url)?;
        Ok(Self { id: url })
    }
}

/// Unvalidated post attributes, handed to [`Post::new`].
#[derive(Debug, Clone, Default)]
pub struct PostDraft {
    pub id: String,
    pub content: String,
    pub created: String,
    pub has_creator: Option<String>,
    pub has_container: String,
    pub reply_to: Option<String>,
    pub links_to: Vec<String>,
    pub forwards: Option<i64>,
    pub pinned: Option<bool>,
    pub topics: Vec<String>,
    pub mentions: Vec<String>,
    pub entity_links: Vec<String>,
}

/// One message as a graph node.
///
/// List attributes are `None` rather than empty: "no hashtags in this
/// message" and "an empty list" are not distinguished downstream, and the
/// serialized document simply omits the key.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Post {
    pub id: String,
    pub content: String,
    pub created: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_creator: Option<String>,
    pub has_container: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub links_to: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub forwards: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pinned: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topics: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mentions: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_links: Option<Vec<String>>,
}

fn non_empty(items: Vec<String>) -> Option<Vec<String>> {
    if items.is_empty() {
        None
    } else {
        Some(items)
    }
}

impl Post {
    pub fn new(draft: PostDraft) -> Result<Self, ModelError> {
        check_id("post", &draft.id, "tg:post/")?;
        check_id("community", &draft.has_container, "tg:community/")?;
        if let Some(creator) = &draft.has_creator {
            check_id("user", creator, "tg:user/")?;
        }
        if let Some(target) = &draft.reply_to {
            check_id("post", target, "tg:post/")?;
        }
        for url in draft.links_to.iter().chain(draft.entity_links.iter()) {
            check_link(url)?;
        }
        for topic in &draft.topics {
            check_id("topic", topic, "tg:tag/hashtag/")?;
        }
        for mention in &draft.mentions {
            check_id("mention", mention, "tg:mention/")?;
        }
        if let Some(n) = draft.forwards {
            if n < 0 {
                return Err(ModelError::NegativeForwards(n));
            }
        }

        Ok(Self {
            id: draft.id,
            content: draft.content,
            created: draft.created,
            has_creator: draft.has_creator,
            has_container: draft.has_container,
            reply_to: draft.reply_to,
            links_to: non_empty(draft.links_to),
            forwards: draft.forwards,
            pinned: draft.pinned,
            topics: non_empty(draft.topics),
            mentions: non_empty(draft.mentions),
            entity_links: non_empty(draft.entity_links),
        })
    }
}

/// The single output of a build run.
#[derive(Debug, Clone, Serialize)]
pub struct GraphDocument {
    pub id: String,
    pub community: Community,
    pub users: OrderedMap<UserAccount>,
    pub links: OrderedMap<Link>,
    pub posts: OrderedMap<Post>,
}

impl GraphDocument {
    pub fn new(
        id: String,
        community: Community,
        users: OrderedMap<UserAccount>,
        links: OrderedMap<Link>,
        posts: OrderedMap<Post>,
    ) -> Result<Self, ModelError> {
        check_id("graph", &id, "tg:graph/")?;
        Ok(Self {
            id,
            community,
            users,
            links,
            posts,
        })
    }
}

/// String-keyed map that iterates and serializes in insertion order.
///
/// Re-inserting an existing key replaces the value but keeps the original
/// position.
pub type OrderedMap<V> = IndexMap<String, V>;

#[cfg(test)]
mod tests {
    use super::*;

    fn draft() -> PostDraft {
        PostDraft {
            id: "tg:post/-100555/1".into(),
            content: "hello".into(),
            created: "2024-05-01T10:00:00+00:00".into(),
            has_container: "tg:community/-100555".into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_post_empty_lists_become_none() {
        let post = Post::new(draft()).unwrap();
        assert!(post.links_to.is_none());
        assert!(post.topics.is_none());
        assert!(post.mentions.is_none());
        assert!(post.entity_links.is_none());

        let json = serde_json::to_value(&post).unwrap();
        assert!(json.get("topics").is_none());
        assert!(json.get("has_creator").is_none());
        assert_eq!(json["has_container"], "tg:community/-100555");
    }

    #[test]
    fn test_post_rejects_bad_reply_id() {
        let mut d = draft();
        d.reply_to = Some("post/1".into());
        let err = Post::new(d).unwrap_err();
        assert!(matches!(err, ModelError::InvalidId { kind: "post", .. }));
    }

    #[test]
    fn test_post_rejects_negative_forwards() {
        let mut d = draft();
        d.forwards = Some(-3);
        assert_eq!(Post::new(d).unwrap_err(), ModelError::NegativeForwards(-3));
    }

    #[test]
    fn test_link_requires_scheme() {
        assert!(Link::new("https://example.com".into()).is_ok());
        assert!(matches!(
            Link::new("example.com".into()),
            Err(ModelError::RelativeLink(_))
        ));
        assert!(Link::new("https://".into()).is_err());
    }

    #[test]
    fn test_empty_id_after_prefix() {
        assert!(matches!(
            UserAccount::new("tg:user/".into()),
            Err(ModelError::EmptyId { .. })
        ));
    }

    #[test]
    fn test_community_serializes_as_string() {
        let c = Community::new("tg:community/-1".into()).unwrap();
        assert_eq!(serde_json::to_string(&c).unwrap(), "\"tg:community/-1\"");
    }

    #[test]
    fn test_ordered_map_keeps_first_position_on_replace() {
        let mut m = OrderedMap::new();
        assert_eq!(m.insert("b".to_string(), 1), None);
        assert_eq!(m.insert("a".to_string(), 2), None);
        assert_eq!(m.insert("b".to_string(), 3), Some(1));
        let pairs: Vec<_> = m.iter().map(|(k, v)| (k.as_str(), *v)).collect();
        assert_eq!(pairs, vec![("b", 3), ("a", 2)]);
        assert_eq!(
            serde_json::to_string(&m).unwrap(),
            r#"{"b":3,"a":2}"#
        );
    }

    #[test]
    fn test_canonical_record_defaults() {
        let rec: CanonicalRecord = serde_json::from_str(
            r#"{"chat_id":"-1","message_id":5,"created_at":"2024-01-01T00:00:00+00:00"}"#,
        )
        .unwrap();
        assert_eq!(rec.text, "");
        assert!(rec.urls.is_empty());
        assert!(rec.entities.is_empty());
        assert_eq!(rec.from_user_id, None);
    }

    #[test]
    fn test_canonical_record_null_fields_become_empty() {
        let rec: CanonicalRecord = serde_json::from_str(
            r#"{"chat_id":"-1","message_id":5,"created_at":"2024-01-01T00:00:00+00:00",
                "text":null,"urls":null,"entities":null,"from_user_id":null}"#,
        )
        .unwrap();
        assert_eq!(rec.text, "");
        assert!(rec.urls.is_empty());
        assert!(rec.entities.is_empty());
        assert_eq!(rec.from_user_id, None);
    }

    #[test]
    fn test_is_absolute_link() {
        assert!(is_absolute_link("https://example.com"));
        assert!(!is_absolute_link("https://"));
        assert!(!is_absolute_link("example.com"));
        assert!(!is_absolute_link("://host"));
    }

    #[test]
    fn test_entity_span_skips_absent_optionals() {
        let span = EntitySpan {
            kind: Some("MessageEntityHashtag".into()),
            offset: Some(0),
            length: Some(4),
            ..Default::default()
        };
        assert_eq!(
            serde_json::to_string(&span).unwrap(),
            r#"{"type":"MessageEntityHashtag","offset":0,"length":4}"#
        );
    }
}
