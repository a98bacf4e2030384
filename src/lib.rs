//! # Lectern
//!
//! Knowledge indexing and retrieval for a hands-free voice cooking assistant.
//!
//! Lectern ingests PDF documents into a chunked, embedded SQLite store and
//! serves similarity search over an in-memory versioned vector index. During
//! a live assistant session it aggregates speech recognition events into a
//! transcript and, when an utterance warrants it, retrieves matching passages
//! to ground the assistant's next answer.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌──────────┐
//! │   PDF    │──▶│   Pipeline   │──▶│  SQLite  │
//! │ uploads  │   │ chunk+embed  │   │ +vectors │
//! └──────────┘   └──────────────┘   └────┬─────┘
//!                                        │ load
//!                                        ▼
//! ┌──────────┐   ┌──────────────┐   ┌──────────┐
//! │   ASR    │──▶│   Session    │──▶│ Versioned│
//! │  events  │   │  loop+gate   │◀──│  index   │
//! └──────────┘   └──────────────┘   └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! lectern init                         # create store
//! lectern ingest ./cookbooks           # ingest PDFs
//! lectern search "resting the dough"   # rank chunks
//! lectern serve                        # start HTTP server
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`error`] | Crate error taxonomy |
//! | [`extract`] | PDF text extraction and normalization |
//! | [`chunk`] | Text chunking |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`ingest`] | Document ingestion pipeline |
//! | [`store`] | Versioned vector index over SQLite |
//! | [`retrieval`] | Retrieval gate and context injection |
//! | [`transcript`] | Speech event aggregation |
//! | [`session`] | Live session event loop |
//! | [`search`] | CLI search |
//! | [`status`] | CLI store overview |
//! | [`server`] | Document management HTTP server |
//! | [`db`] | Database connection |

pub mod chunk;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod ingest;
pub mod models;
pub mod retrieval;
pub mod search;
pub mod server;
pub mod session;
pub mod status;
pub mod store;
pub mod transcript;
