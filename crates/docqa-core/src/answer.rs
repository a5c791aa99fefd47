//! Boundary to the answer-generation collaborator.
//!
//! The core hands a query and its ranked results to an [`AnswerGenerator`];
//! how the answer is produced and rendered is up to the implementation.
//! [`render_context`] gives implementations the canonical context block.

use std::fmt::Write;

use async_trait::async_trait;

use crate::models::{RetrievalResult, FALLBACK_CATEGORY};

/// Turns a query plus supporting results into free text.
#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    async fn generate(&self, query: &str, results: &[RetrievalResult]) -> anyhow::Result<String>;
}

/// Render results as the context block handed to a language model.
///
/// One paragraph per result: title, URL when known, category and the
/// supporting extract.
pub fn render_context(results: &[RetrievalResult]) -> String {
    let mut out = String::new();
    for (i, r) in results.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        let _ = writeln!(out, "Document: {}", r.title);
        if let Some(url) = &r.url {
            let _ = writeln!(out, "URL: {url}");
        }
        let _ = writeln!(
            out,
            "Category: {}",
            r.category.as_deref().unwrap_or(FALLBACK_CATEGORY)
        );
        let _ = writeln!(out, "Extract: {}", r.extract.trim());
    }
    out
}
