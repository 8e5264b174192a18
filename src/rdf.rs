//! Graph document → RDF (Turtle).
//!
//! The graph document JSON is first normalized ([`normalize_ids`]) and then
//! mapped onto a fixed SIOC-based vocabulary. `tg:` CURIEs are expanded
//! against the `tg` namespace; links are already absolute URLs and are used
//! as IRIs directly. Terms are `oxrdf` values; Turtle is written and read with
//! `oxttl`.

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat};
use oxrdf::vocab::{rdf, xsd};
use oxrdf::{Literal, NamedNode, Term, Triple};
use oxttl::{TurtleParser, TurtleSerializer};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::path::Path;

use crate::config::Config;
use crate::export::write_atomic;

pub const TG_NS: &str = "https://example.org/telegram/";
pub const SIOC_NS: &str = "http://rdfs.org/sioc/ns#";
pub const DCTERMS_NS: &str = "http://purl.org/dc/terms/";
pub const SCHEMA_NS: &str = "http://schema.org/";
pub const XSD_NS: &str = "http://www.w3.org/2001/XMLSchema#";

/// Prefixes declared at the top of every Turtle file.
const PREFIXES: [(&str, &str); 5] = [
    ("dcterms", DCTERMS_NS),
    ("schema", SCHEMA_NS),
    ("sioc", SIOC_NS),
    ("tg", TG_NS),
    ("xsd", XSD_NS),
];

// ─── Normalization ──────────────────────────────────────────────────

/// Collapse `{"id": "<value>"}` wrappers found under `id` keys.
///
/// Up to two wrapper levels are unwrapped; anything else is left alone.
pub fn normalize_ids(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| {
                    let v = if k == "id" { unwrap_id(v) } else { normalize_ids(v) };
                    (k, v)
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(normalize_ids).collect()),
        other => other,
    }
}

fn unwrap_id(value: Value) -> Value {
    fn single_id(v: &Value) -> Option<&Value> {
        match v {
            Value::Object(map) if map.len() == 1 => map.get("id"),
            _ => None,
        }
    }
    let unwrapped = match single_id(&value) {
        Some(Value::String(s)) => Some(s.clone()),
        Some(inner) => match single_id(inner) {
            Some(Value::String(s)) => Some(s.clone()),
            _ => None,
        },
        None => None,
    };
    match unwrapped {
        Some(s) => Value::String(s),
        None => value,
    }
}

// ─── Mapping ────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct DocumentView {
    id: String,
    community: Value,
    #[serde(default)]
    users: Map<String, Value>,
    #[serde(default)]
    links: Map<String, Value>,
    #[serde(default)]
    posts: Map<String, Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PostView {
    id: Option<String>,
    content: Option<String>,
    created: Option<String>,
    has_creator: Option<String>,
    has_container: Option<String>,
    reply_to: Option<String>,
    links_to: Vec<String>,
    forwards: Option<i64>,
    pinned: Option<bool>,
    topics: Vec<String>,
    mentions: Vec<String>,
    entity_links: Vec<String>,
}

/// Accept either a bare id string or an `{"id": ...}` object.
pub fn ref_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Object(map) => map.get("id").and_then(Value::as_str).map(str::to_string),
        _ => None,
    }
}

/// Expand a `tg:` CURIE into a full IRI; anything else is already an IRI.
pub fn expand_id(id: &str) -> String {
    match id.strip_prefix(crate::ids::TG_PREFIX) {
        Some(rest) => format!("{}{}", TG_NS, rest),
        None => id.to_string(),
    }
}

/// `xsd:dateTime` literal if the timestamp parses, plain literal otherwise.
fn created_literal(created: &str) -> Literal {
    let parsed = DateTime::parse_from_rfc3339(created)
        .or_else(|_| DateTime::parse_from_str(created, "%Y-%m-%d %H:%M:%S%:z"))
        .or_else(|_| DateTime::parse_from_str(created, "%Y-%m-%d %H:%M:%S%.f%:z"));
    match parsed {
        Ok(dt) => Literal::new_typed_literal(
            dt.to_rfc3339_opts(SecondsFormat::AutoSi, false),
            xsd::DATE_TIME,
        ),
        Err(_) => Literal::new_simple_literal(created),
    }
}

/// Collects triples in emission order, once each.
struct TripleSink {
    seen: HashSet<Triple>,
    triples: Vec<Triple>,
    invalid: usize,
}

impl TripleSink {
    fn new() -> Self {
        Self {
            seen: HashSet::new(),
            triples: Vec::new(),
            invalid: 0,
        }
    }

    /// Ids that are not valid IRIs (a URL with a space in it, say) are
    /// counted and skipped along with every triple that mentions them.
    fn node(&mut self, id: &str) -> Option<NamedNode> {
        match NamedNode::new(expand_id(id)) {
            Ok(node) => Some(node),
            Err(e) => {
                tracing::warn!(id, error = %e, "skipping identifier that is not a valid IRI");
                self.invalid += 1;
                None
            }
        }
    }

    fn add(&mut self, subject: &str, predicate: NamedNode, object: impl Into<Term>) {
        let Some(subject) = self.node(subject) else {
            return;
        };
        let triple = Triple::new(subject, predicate, object);
        if self.seen.insert(triple.clone()) {
            self.triples.push(triple);
        }
    }

    fn link(&mut self, subject: &str, predicate: NamedNode, target: &str) {
        if let Some(object) = self.node(target) {
            self.add(subject, predicate, object);
        }
    }

    fn class(&mut self, subject: &str, class: NamedNode) {
        self.add(subject, rdf::TYPE.into_owned(), class);
    }
}

fn term(ns: &str, local: &str) -> NamedNode {
    NamedNode::new_unchecked(format!("{}{}", ns, local))
}

fn sioc(local: &str) -> NamedNode {
    term(SIOC_NS, local)
}

fn tg(local: &str) -> NamedNode {
    term(TG_NS, local)
}

/// Map a graph document (as JSON) to RDF triples, without duplicates.
pub fn graph_triples(doc: &Value) -> Result<Vec<Triple>> {
    let doc: DocumentView = serde_json::from_value(normalize_ids(doc.clone()))
        .context("graph document does not match the expected shape")?;
    let community = ref_id(&doc.community)
        .context("graph document has no community identifier")?;

    let mut sink = TripleSink::new();

    sink.class(&doc.id, tg("GraphDocument"));
    sink.link(&doc.id, tg("community"), &community);

    let users: Vec<String> = doc
        .users
        .iter()
        .map(|(key, v)| ref_id(v).unwrap_or_else(|| key.clone()))
        .collect();
    let links: Vec<String> = doc
        .links
        .iter()
        .map(|(key, v)| ref_id(v).unwrap_or_else(|| key.clone()))
        .collect();
    let mut posts = Vec::with_capacity(doc.posts.len());
    for (key, value) in &doc.posts {
        let post: PostView = serde_json::from_value(value.clone())
            .with_context(|| format!("post '{}' does not match the expected shape", key))?;
        let id = post.id.clone().unwrap_or_else(|| key.clone());
        posts.push((id, post));
    }

    for user in &users {
        sink.link(&doc.id, tg("users"), user);
    }
    for link in &links {
        sink.link(&doc.id, tg("links"), link);
    }
    for (id, _) in &posts {
        sink.link(&doc.id, tg("posts"), id);
    }

    sink.class(&community, sioc("Community"));
    for user in &users {
        sink.class(user, sioc("UserAccount"));
    }
    for link in &links {
        sink.class(link, term(SCHEMA_NS, "URL"));
    }

    for (id, post) in &posts {
        sink.class(id, sioc("Post"));
        if let Some(content) = &post.content {
            sink.add(id, sioc("content"), Literal::new_simple_literal(content));
        }
        if let Some(created) = &post.created {
            sink.add(id, term(DCTERMS_NS, "created"), created_literal(created));
        }
        if let Some(creator) = &post.has_creator {
            sink.link(id, sioc("has_creator"), creator);
        }
        if let Some(container) = &post.has_container {
            sink.link(id, sioc("has_container"), container);
        }
        if let Some(target) = &post.reply_to {
            sink.link(id, sioc("reply_of"), target);
        }
        for url in post.links_to.iter().chain(post.entity_links.iter()) {
            sink.link(id, sioc("links_to"), url);
        }
        if let Some(n) = post.forwards {
            sink.add(id, tg("forwards"), Literal::from(n));
        }
        if let Some(pinned) = post.pinned {
            sink.add(id, tg("pinned"), Literal::from(pinned));
        }
        for topic in &post.topics {
            sink.link(id, sioc("topic"), topic);
        }
        for mention in &post.mentions {
            sink.link(id, tg("mentions"), mention);
        }
    }

    if sink.invalid > 0 {
        tracing::warn!(skipped = sink.invalid, "some identifiers were not valid IRIs");
    }
    Ok(sink.triples)
}

/// Serialize triples as Turtle with the standard prefixes.
pub fn write_turtle(triples: &[Triple]) -> Result<String> {
    let mut serializer = TurtleSerializer::new();
    for (prefix, ns) in PREFIXES {
        serializer = serializer.with_prefix(prefix, ns)?;
    }
    let mut writer = serializer.for_writer(Vec::new());
    for triple in triples {
        writer.serialize_triple(triple)?;
    }
    let bytes = writer.finish()?;
    String::from_utf8(bytes).context("Turtle output is not UTF-8")
}

/// Serialized Turtle plus the number of triples it holds.
#[derive(Debug, Clone)]
pub struct Turtle {
    pub text: String,
    pub triples: usize,
}

pub fn to_turtle(doc: &Value) -> Result<Turtle> {
    let triples = graph_triples(doc)?;
    Ok(Turtle {
        text: write_turtle(&triples)?,
        triples: triples.len(),
    })
}

/// Read a graph document JSON file and write it as Turtle.
pub fn run_rdf(_config: &Config, input: &Path, output: &Path) -> Result<usize> {
    let raw = std::fs::read_to_string(input)
        .with_context(|| format!("Failed to read graph document: {}", input.display()))?;
    let doc: Value = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse graph document: {}", input.display()))?;

    let turtle = to_turtle(&doc)?;
    write_atomic(output, turtle.text.as_bytes())?;

    tracing::info!(triples = turtle.triples, output = %output.display(), "wrote RDF");
    Ok(turtle.triples)
}

/// Parse a Turtle document into triples, in document order.
pub fn parse_turtle(text: &str) -> Result<Vec<Triple>> {
    TurtleParser::new()
        .for_reader(text.as_bytes())
        .map(|triple| triple.context("invalid Turtle"))
        .collect()
}
