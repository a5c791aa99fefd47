//! Merge keyword and vector result lists into one ranked list.
//!
//! Results are grouped by [`RetrievalResult::dedup_key`] (URL, else title).
//! A key found by both retrievers scores
//! `KEYWORD_WEIGHT * keyword + VECTOR_WEIGHT * vector`; a key found by only
//! one keeps its original score.

use std::collections::HashMap;

use crate::models::RetrievalResult;
use crate::search::sort_by_score_desc;

/// Weight of the keyword score for keys present in both lists.
pub const KEYWORD_WEIGHT: f64 = 0.6;
/// Weight of the vector score for keys present in both lists.
pub const VECTOR_WEIGHT: f64 = 0.4;

/// Fuse two result lists. The caller truncates to its `top_k`.
///
/// Within one list a later result with an already-seen key replaces the
/// earlier one in place. The union is ordered vector keys first, then
/// keyword-only keys, before a stable descending sort on score.
pub fn fuse(
    vector_results: Vec<RetrievalResult>,
    keyword_results: Vec<RetrievalResult>,
) -> Vec<RetrievalResult> {
    let vector = dedup_last_wins(vector_results);
    let mut keyword = dedup_last_wins(keyword_results);

    let mut keyword_pos: HashMap<String, usize> = keyword
        .iter()
        .enumerate()
        .map(|(i, r)| (r.dedup_key().to_string(), i))
        .collect();

    let mut fused = Vec::with_capacity(vector.len() + keyword.len());
    let mut taken = vec![false; keyword.len()];

    for v in vector {
        match keyword_pos.remove(v.dedup_key()) {
            Some(i) => {
                taken[i] = true;
                fused.push(merge(v, &keyword[i]));
            }
            None => fused.push(v),
        }
    }
    for (i, k) in keyword.drain(..).enumerate() {
        if !taken[i] {
            fused.push(k);
        }
    }

    sort_by_score_desc(&mut fused);
    fused
}

fn merge(vector: RetrievalResult, keyword: &RetrievalResult) -> RetrievalResult {
    RetrievalResult {
        score: KEYWORD_WEIGHT * keyword.score + VECTOR_WEIGHT * vector.score,
        extract: if vector.extract.is_empty() {
            keyword.extract.clone()
        } else {
            vector.extract
        },
        url: vector.url.or_else(|| keyword.url.clone()),
        category: vector.category.or_else(|| keyword.category.clone()),
        title: vector.title,
    }
}

fn dedup_last_wins(results: Vec<RetrievalResult>) -> Vec<RetrievalResult> {
    let mut pos: HashMap<String, usize> = HashMap::new();
    let mut out: Vec<RetrievalResult> = Vec::with_capacity(results.len());
    for r in results {
        match pos.get(r.dedup_key()) {
            Some(&i) => out[i] = r,
            None => {
                pos.insert(r.dedup_key().to_string(), out.len());
                out.push(r);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(title: &str, score: f64, url: Option<&str>) -> RetrievalResult {
        RetrievalResult {
            title: title.into(),
            extract: format!("{title} text"),
            score,
            url: url.map(String::from),
            category: None,
        }
    }

    #[test]
    fn test_weighted_score() {
        let fused = fuse(vec![result("doc1", 0.5, None)], vec![result("doc1", 1.0, None)]);
        assert_eq!(fused.len(), 1);
        assert!((fused[0].score - 0.8).abs() < 1e-12);
    }

    #[test]
    fn test_single_source_passthrough() {
        let fused = fuse(
            vec![result("vec-only", 0.3, None)],
            vec![result("kw-only", 0.8, None)],
        );
        assert_eq!(fused.len(), 2);
        assert_eq!(fused[0].title, "kw-only");
        assert_eq!(fused[0].score, 0.8);
        assert_eq!(fused[1].score, 0.3);
    }

    #[test]
    fn test_dedup_by_url_then_title() {
        let fused = fuse(
            vec![
                result("Chunk A", 0.9, Some("https://x/doc")),
                result("Other", 0.1, None),
            ],
            vec![result("Chunk B", 1.0, Some("https://x/doc"))],
        );
        let with_url: Vec<_> = fused
            .iter()
            .filter(|r| r.url.as_deref() == Some("https://x/doc"))
            .collect();
        assert_eq!(with_url.len(), 1);
        assert_eq!(with_url[0].title, "Chunk A");
        assert!((with_url[0].score - (0.6 + 0.36)).abs() < 1e-12);
    }

    #[test]
    fn test_merge_fills_url_and_category_from_keyword() {
        let mut kw = result("doc", 1.0, None);
        kw.category = Some("Finance".into());
        let mut v = result("doc", 0.5, None);
        v.extract = String::new();
        let fused = fuse(vec![v], vec![kw]);
        assert_eq!(fused[0].category.as_deref(), Some("Finance"));
        assert_eq!(fused[0].extract, "doc text");
    }

    #[test]
    fn test_within_set_last_duplicate_wins() {
        let fused = fuse(
            vec![result("doc", 0.9, None), result("doc", 0.2, None)],
            vec![],
        );
        assert_eq!(fused.len(), 1);
        assert_eq!(fused[0].score, 0.2);
    }

    #[test]
    fn test_stable_ties() {
        let fused = fuse(
            vec![result("v1", 0.5, None), result("v2", 0.5, None)],
            vec![result("k1", 0.5, None)],
        );
        let titles: Vec<&str> = fused.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["v1", "v2", "k1"]);
    }
}
