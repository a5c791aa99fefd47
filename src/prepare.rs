//! Raw document preparation (`docqa prepare`).
//!
//! Walks `extraction.documents_dir`, extracts every file and writes the
//! text to `processed_dir/<relative dir>/<stem>.txt`, mirroring the folder
//! structure. Each output starts with a small header:
//!
//! ```text
//! SOURCE: finance/Budget Report.pdf
//! TITLE: Budget Report.pdf
//! URL: https://intranet/budget        (when the catalog matches)
//! CATEGORY: Finance                   (when the catalog matches)
//! EXTRACTED_AT: 2024-03-01 12:00:00
//! ---
//!
//! <text>
//! ```
//!
//! URLs come from the best-effort catalog matcher. The processed folder is
//! what a `[sources.local]` root normally points at.

use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use docqa_core::catalog::{file_stem, UrlCatalog};

use crate::connector_fs::walk_files;
use crate::extract::{extension, TextExtractor};

/// Counters printed at the end of a preparation pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PrepareReport {
    /// Files found.
    pub total: usize,
    /// Files whose text could be extracted.
    pub extracted: usize,
    /// Files written to the processed folder.
    pub written: usize,
    /// Files that received a catalog URL.
    pub with_url: usize,
    /// File count per lower-cased extension (`""` when none).
    pub formats: BTreeMap<String, usize>,
}

impl PrepareReport {
    /// Written files as a percentage of files found.
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.written as f64 / self.total as f64 * 100.0
        }
    }

    pub fn print(&self) {
        println!("prepare");
        println!("  documents found: {}", self.total);
        println!("  extracted: {}", self.extracted);
        println!("  written: {}", self.written);
        println!("  with url: {}", self.with_url);
        println!("  success rate: {:.1}%", self.success_rate());
        println!("  formats:");
        for (ext, count) in &self.formats {
            let label = if ext.is_empty() { "(none)" } else { ext.as_str() };
            println!("    {}: {}", label, count);
        }
    }
}

/// Extract everything under `documents_dir` into `processed_dir`.
///
/// Per-file failures are logged and counted; only I/O errors on the
/// output folder abort the pass.
pub fn prepare_documents(
    documents_dir: &Path,
    processed_dir: &Path,
    extractor: &dyn TextExtractor,
    catalog: Option<&UrlCatalog>,
) -> Result<PrepareReport> {
    let files = walk_files(documents_dir, &["**/*".to_string()], &[], false)?;
    let mut report = PrepareReport::default();

    for file in files {
        report.total += 1;
        let name = file.file_name().to_string();
        *report
            .formats
            .entry(extension(&name).unwrap_or_default())
            .or_insert(0) += 1;

        let bytes = match fs::read(&file.path) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(file = %file.relative, error = %e, "failed to read document");
                continue;
            }
        };
        let text = match extractor.extract(&name, &bytes) {
            Ok(text) if !text.trim().is_empty() => text,
            Ok(_) => {
                tracing::warn!(file = %file.relative, "no text extracted");
                continue;
            }
            Err(e) => {
                tracing::warn!(file = %file.relative, error = %e, "extraction failed");
                continue;
            }
        };
        report.extracted += 1;

        let stem = file_stem(&name);
        let url_match = catalog.and_then(|c| c.best_effort(stem));
        if url_match.is_some() {
            report.with_url += 1;
        } else if catalog.is_some() {
            tracing::debug!(file = %file.relative, "no catalog URL found");
        }

        let mut header = format!("SOURCE: {}\nTITLE: {}\n", file.relative, name);
        if let Some(m) = &url_match {
            header.push_str(&format!("URL: {}\nCATEGORY: {}\n", m.url, m.category));
        }
        header.push_str(&format!(
            "EXTRACTED_AT: {}\n---\n\n",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
        ));

        let out_dir: PathBuf = match file.relative_dir() {
            Some(dir) => processed_dir.join(dir),
            None => processed_dir.to_path_buf(),
        };
        fs::create_dir_all(&out_dir)
            .with_context(|| format!("Failed to create {}", out_dir.display()))?;
        let out_path = out_dir.join(format!("{stem}.txt"));
        fs::write(&out_path, header + &text)
            .with_context(|| format!("Failed to write {}", out_path.display()))?;

        tracing::debug!(file = %file.relative, out = %out_path.display(), "document prepared");
        report.written += 1;
    }

    tracing::info!(
        total = report.total,
        written = report.written,
        "preparation finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::FormatExtractor;
    use tempfile::TempDir;

    #[test]
    fn test_prepare_mirrors_folders_and_adds_urls() {
        let docs = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        fs::create_dir_all(docs.path().join("finance")).unwrap();
        fs::write(docs.path().join("finance/Budget Report.txt"), "Quarterly budget.").unwrap();
        fs::write(docs.path().join("notes.txt"), "Loose notes.").unwrap();
        fs::write(docs.path().join("empty.txt"), "   ").unwrap();
        fs::write(docs.path().join("binary.xyz"), [0u8, 1, 2]).unwrap();

        let (catalog, _) = UrlCatalog::from_json(
            r#"[{"name": "Budget Report.pdf", "url": "https://intra/budget", "category": "Finance"}]"#,
            "catalog",
        )
        .unwrap();

        let report = prepare_documents(
            docs.path(),
            out.path(),
            &FormatExtractor::default(),
            Some(&catalog),
        )
        .unwrap();

        assert_eq!(report.total, 4);
        assert_eq!(report.extracted, 2);
        assert_eq!(report.written, 2);
        assert_eq!(report.with_url, 1);
        assert_eq!(report.formats.get("txt"), Some(&3));
        assert_eq!(report.formats.get("xyz"), Some(&1));
        assert!((report.success_rate() - 50.0).abs() < 1e-9);

        let budget = fs::read_to_string(out.path().join("finance/Budget Report.txt")).unwrap();
        assert!(budget.starts_with("SOURCE: finance/Budget Report.txt\nTITLE: Budget Report.txt\n"));
        assert!(budget.contains("URL: https://intra/budget\nCATEGORY: Finance\n"));
        assert!(budget.ends_with("---\n\nQuarterly budget."));

        let notes = fs::read_to_string(out.path().join("notes.txt")).unwrap();
        assert!(!notes.contains("URL:"));
    }

    #[test]
    fn test_empty_report_rate() {
        assert_eq!(PrepareReport::default().success_rate(), 0.0);
    }
}
