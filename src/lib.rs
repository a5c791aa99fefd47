//! # docqa
//!
//! Document question-answering retrieval: builds a searchable corpus from
//! local folders and blob stores, then answers queries with a fusion of
//! keyword and vector search.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────────────┐   ┌─────────────┐
//! │   Sources    │──▶│   CorpusBuilder      │──▶│  Artifacts  │
//! │ Local/Azure/ │   │ extract→chunk→embed  │   │ chunks.json │
//! │     S3       │   │ →index, URL catalog  │   │ index.bin … │
//! └──────────────┘   └──────────────────────┘   └──────┬──────┘
//!                                                      │ load once
//!                                                      ▼
//!                                            ┌──────────────────┐
//!                                            │   QueryService   │
//!                                            │ keyword + vector │
//!                                            │     → fusion     │
//!                                            └──────────────────┘
//! ```
//!
//! The retrieval algorithms live in the pure `docqa-core` crate; this crate
//! adds configuration, I/O, providers and the CLI.
//!
//! ## Quick Start
//!
//! ```bash
//! docqa prepare                 # raw documents → processed .txt
//! docqa sources                 # what would be indexed
//! docqa build                   # build and persist the corpus
//! docqa check                   # validate the artifacts
//! docqa search "budget 2024"
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`logging`] | `tracing` subscriber setup |
//! | [`sources`] | Source descriptors and discovery |
//! | [`connector_fs`] | Local filesystem walker |
//! | [`connector_azure`] | Azure Blob container (SAS) |
//! | [`connector_s3`] | Amazon S3 bucket (SigV4) |
//! | [`extract`] | Per-format text extraction |
//! | [`embedding`] | Embedding providers |
//! | [`catalog`] | URL catalog loading |
//! | [`builder`] | Corpus construction |
//! | [`store`] | Artifact persistence |
//! | [`progress`] | Build progress reporting |
//! | [`prepare`] | Raw document preparation |
//! | [`commands`] | CLI command implementations |

pub mod builder;
pub mod catalog;
pub mod commands;
pub mod config;
pub mod connector_azure;
pub mod connector_fs;
pub mod connector_s3;
pub mod embedding;
pub mod extract;
pub mod logging;
pub mod prepare;
pub mod progress;
pub mod sources;
pub mod store;
