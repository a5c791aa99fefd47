//! # docqa core
//!
//! Pure retrieval logic for docqa: data models, recursive text splitting,
//! URL catalog association, the vector index abstraction with a flat L2
//! implementation, keyword and vector retrievers, result fusion and the
//! query service.
//!
//! This crate performs no filesystem or network I/O. Source discovery,
//! text extraction, embedding providers and artifact persistence live in
//! the `docqa` app crate.

pub mod answer;
pub mod catalog;
pub mod chunk;
pub mod corpus;
pub mod embedding;
pub mod error;
pub mod fusion;
pub mod index;
pub mod models;
pub mod query;
pub mod search;

pub use error::{Error, Result};
