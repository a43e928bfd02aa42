//! # citedocs
//!
//! A document question-answering service: upload documents, have them
//! chunked and embedded, and ask questions answered from the indexed
//! content with citations back to the source chunks.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────────────────┐   ┌──────────┐
//! │  Upload  │──▶│  Pipeline              │──▶│  SQLite   │
//! │ txt/pdf/ │   │ extract→chunk→embed   │   │ + vector  │
//! │  docx    │   │        →commit        │   │   blobs   │
//! └──────────┘   └───────────┬───────────┘   └────┬─────┘
//!                            │ publish            │ reload
//!                            ▼                    ▼
//!                      ┌───────────────────────────────┐
//!                      │  VectorIndex (in-memory)       │
//!                      └───────────┬───────────────────┘
//!                                  │ search
//!                 ┌────────────────┴──────────────┐
//!                 ▼                               ▼
//!          ┌──────────┐                    ┌──────────┐
//!          │   CLI    │                    │   HTTP   │
//!          │(citedocs)│                    │  (axum)  │
//!          └──────────┘                    └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! citedocs init                        # create database
//! citedocs ingest ./notes/paper.pdf    # ingest a local file
//! citedocs query "what is the main finding?"
//! citedocs serve                       # start HTTP server
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`error`] | Error taxonomy |
//! | [`models`] | Core data types |
//! | [`extract`] | Text extraction from uploaded bytes |
//! | [`chunk`] | Overlapping text chunking |
//! | [`embedding`] | Embedding provider abstraction and retry policy |
//! | [`index`] | In-memory vector index |
//! | [`store`] | SQLite persistence |
//! | [`retrieve`] | Ranked retrieval over the index |
//! | [`generate`] | Cited answer generation |
//! | [`pipeline`] | Ingest and query orchestration |
//! | [`server`] | HTTP API |

pub mod chunk;
pub mod config;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod generate;
pub mod index;
pub mod models;
pub mod pipeline;
pub mod retrieve;
pub mod server;
pub mod store;
