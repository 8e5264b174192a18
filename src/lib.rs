//! # Chat Graph
//!
//! Turns a rolling window of one Telegram chat into a SIOC knowledge graph.
//!
//! The pipeline is a chain of file-to-file stages. Each stage reads the
//! previous stage's output, writes its own atomically, and can be run on its
//! own from the `cgraph` CLI.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌─────────┐   ┌─────────┐   ┌──────────┐
//! │ Extract  │──▶│ Canonicalize │──▶│  Build  │──▶│   RDF   │──▶│  Store   │
//! │ raw JSONL│   │ canon. JSONL │   │  graph  │   │ Turtle  │   │ SQLite   │
//! └──────────┘   └──────────────┘   └─────────┘   └─────────┘   └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! cgraph extract --entity -1001234567890   # last 7 days from the dump
//! cgraph run                               # canonicalize → build → rdf → load
//! cgraph count                             # triples in the store
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Canonical records and graph entities |
//! | [`ids`] | Identifier construction and URL normalization |
//! | [`extract`] | Message sources and raw extraction |
//! | [`canonicalize`] | Raw message to canonical record |
//! | [`entities`] | UTF-16 entity span resolution |
//! | [`graph`] | Folding records into a graph document |
//! | [`export`] | Atomic file output |
//! | [`rdf`] | Turtle writing and reading |
//! | [`store`] | Triple store loading and counting |
//! | [`stats`] | Graph document summaries |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod canonicalize;
pub mod config;
pub mod db;
pub mod entities;
pub mod export;
pub mod extract;
pub mod graph;
pub mod ids;
pub mod migrate;
pub mod models;
pub mod rdf;
pub mod stats;
pub mod store;
