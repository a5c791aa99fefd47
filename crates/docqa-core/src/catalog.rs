//! URL catalog and filename-based URL association.
//!
//! The catalog is an externally maintained list of `{name, url, category}`
//! records. Two association strategies are offered:
//!
//! - [`UrlCatalog::associate`]: exact, case-insensitive, whitespace-trimmed
//!   filename equality. Used once over the complete metadata array at the
//!   end of a corpus build.
//! - [`UrlCatalog::best_effort`]: exact stem match or substring containment
//!   in either direction, scored against a fixed floor. Used only when
//!   preparing raw extracted text, never for corpus metadata.

use std::collections::HashMap;

use serde::Deserialize;

use crate::models::ChunkMetadata;

/// Score of an exact best-effort match.
pub const EXACT_MATCH_SCORE: f64 = 1.0;
/// Score of a substring-containment match.
pub const PARTIAL_MATCH_SCORE: f64 = 0.85;
/// A candidate must score strictly above this to be accepted.
pub const MATCH_FLOOR: f64 = 0.7;

/// One raw catalog record. Accepts both English and French field names.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct CatalogEntry {
    #[serde(default, alias = "Nom")]
    pub name: Option<String>,
    #[serde(default, alias = "URL")]
    pub url: Option<String>,
    #[serde(default, alias = "Categorie")]
    pub category: Option<String>,
}

/// A resolved catalog target.
#[derive(Debug, Clone, PartialEq)]
pub struct UrlTarget {
    pub name: String,
    pub url: String,
    pub category: String,
}

/// Result of a best-effort lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct UrlMatch {
    pub url: String,
    pub category: String,
    pub score: f64,
}

/// Problems found while building a catalog. Not fatal.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CatalogReport {
    /// Records without a name or a URL.
    pub incomplete: usize,
    /// Names seen more than once; only the first record is kept.
    pub duplicates: Vec<String>,
}

/// Filename-keyed URL catalog. Entry order is catalog order.
#[derive(Debug, Clone, Default)]
pub struct UrlCatalog {
    targets: Vec<UrlTarget>,
    by_key: HashMap<String, usize>,
}

impl UrlCatalog {
    /// Build a catalog from raw records.
    ///
    /// Records missing a name or URL are skipped. When a name occurs twice
    /// (after normalization) the first record wins. Missing categories
    /// default to `default_category`.
    pub fn from_entries(entries: Vec<CatalogEntry>, default_category: &str) -> (Self, CatalogReport) {
        let mut catalog = Self::default();
        let mut report = CatalogReport::default();

        for entry in entries {
            let (name, url) = match (entry.name, entry.url) {
                (Some(n), Some(u)) if !n.trim().is_empty() && !u.trim().is_empty() => (n, u),
                _ => {
                    report.incomplete += 1;
                    continue;
                }
            };
            let key = normalize(&name);
            if catalog.by_key.contains_key(&key) {
                report.duplicates.push(name);
                continue;
            }
            let category = entry
                .category
                .filter(|c| !c.trim().is_empty())
                .unwrap_or_else(|| default_category.to_string());
            catalog.by_key.insert(key, catalog.targets.len());
            catalog.targets.push(UrlTarget {
                name: name.trim().to_string(),
                url: url.trim().to_string(),
                category,
            });
        }

        (catalog, report)
    }

    /// Parse a JSON array of records and build a catalog from it.
    pub fn from_json(json: &str, default_category: &str) -> serde_json::Result<(Self, CatalogReport)> {
        let entries: Vec<CatalogEntry> = serde_json::from_str(json)?;
        Ok(Self::from_entries(entries, default_category))
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn targets(&self) -> &[UrlTarget] {
        &self.targets
    }

    /// Exact lookup of a file name (case-insensitive, trimmed).
    pub fn lookup(&self, file_name: &str) -> Option<&UrlTarget> {
        self.by_key
            .get(&normalize(file_name))
            .map(|&i| &self.targets[i])
    }

    /// Attach `url` and `url_category` to every metadata entry whose source
    /// base name exactly matches a catalog name. Unmatched entries are left
    /// untouched. Returns the number of entries enriched.
    pub fn associate(&self, metadata: &mut [ChunkMetadata]) -> usize {
        let mut matched = 0;
        for meta in metadata.iter_mut() {
            if let Some(target) = self.lookup(base_name(&meta.source)) {
                meta.url = Some(target.url.clone());
                meta.url_category = Some(target.category.clone());
                matched += 1;
            }
        }
        matched
    }

    /// Loose association for a document stem.
    ///
    /// The stem is compared against full catalog names, extension included,
    /// so a catalog listing `Report.pdf` matches the stem `Report` through
    /// containment rather than equality. An exact match returns
    /// immediately with score 1.0. Otherwise the first entry whose stem
    /// contains, or is contained in, `stem` scores 0.85; later candidates
    /// only replace it with a strictly higher score, so catalog order breaks
    /// ties. Nothing above the floor yields `None`.
    pub fn best_effort(&self, stem: &str) -> Option<UrlMatch> {
        let needle = normalize(stem);
        if needle.is_empty() {
            return None;
        }

        let mut best: Option<UrlMatch> = None;
        let mut best_score = MATCH_FLOOR;

        for target in &self.targets {
            let candidate = normalize(&target.name);
            if candidate.is_empty() {
                continue;
            }
            if candidate == needle {
                return Some(UrlMatch {
                    url: target.url.clone(),
                    category: target.category.clone(),
                    score: EXACT_MATCH_SCORE,
                });
            }
            if (candidate.contains(&needle) || needle.contains(&candidate))
                && PARTIAL_MATCH_SCORE > best_score
            {
                best_score = PARTIAL_MATCH_SCORE;
                best = Some(UrlMatch {
                    url: target.url.clone(),
                    category: target.category.clone(),
                    score: PARTIAL_MATCH_SCORE,
                });
            }
        }

        best
    }
}

/// Last path component of `source`, accepting both `/` and `\` separators.
pub fn base_name(source: &str) -> &str {
    source.rsplit(['/', '\\']).next().unwrap_or(source)
}

/// File name without its final extension.
pub fn file_stem(name: &str) -> &str {
    let base = base_name(name);
    match base.rfind('.') {
        Some(0) | None => base,
        Some(i) => &base[..i],
    }
}

fn normalize(s: &str) -> String {
    s.trim().to_lowercase()
}
