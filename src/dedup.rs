//! Three-pass deduplication: exact DOI, exact normalized title, fuzzy title.
//!
//! Each pass only removes rows; surviving records are never edited. Ties always
//! go to the record that comes first in the input order, so a fixed input order
//! gives a fixed result.

use crate::error::Result;
use crate::funnel::{Checkpoint, FunnelCounters};
use crate::normalize::normalize_title_for_exact_match;
use crate::record::UnifiedRecord;
use std::collections::HashSet;
use tracing::info;

/// Pass 1: keep the first record per non-empty DOI. Records without a DOI pass
/// through untouched and keep their position.
pub fn dedup_by_doi(records: Vec<UnifiedRecord>) -> Vec<UnifiedRecord> {
    let mut seen: HashSet<String> = HashSet::new();
    records
        .into_iter()
        .filter(|r| r.doi.is_empty() || seen.insert(r.doi.clone()))
        .collect()
}

/// Pass 2: keep the first record per non-empty normalized title. Records whose
/// title normalizes to nothing are never treated as duplicates.
pub fn dedup_by_title(records: Vec<UnifiedRecord>) -> Vec<UnifiedRecord> {
    let mut seen: HashSet<String> = HashSet::new();
    records
        .into_iter()
        .filter(|r| {
            let key = normalize_title_for_exact_match(Some(&r.title));
            key.is_empty() || seen.insert(key)
        })
        .collect()
}

/// Similarity of two titles on a 0-100 scale, case-insensitive.
pub fn title_similarity(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.to_lowercase().chars().collect();
    let b: Vec<char> = b.to_lowercase().chars().collect();
    indel_ratio(&a, &b)
}

/// `100 * (1 - indel / (len_a + len_b))`, where indel counts the insertions
/// and deletions turning `a` into `b`. Substitutions cost two edits.
fn indel_ratio(a: &[char], b: &[char]) -> f64 {
    let total = a.len() + b.len();
    if total == 0 {
        return 100.0;
    }
    let indel = total - 2 * lcs_len(a, b);
    100.0 * (1.0 - indel as f64 / total as f64)
}

/// Longest common subsequence length, one DP row at a time.
fn lcs_len(a: &[char], b: &[char]) -> usize {
    let mut prev = vec![0usize; b.len() + 1];
    let mut row = vec![0usize; b.len() + 1];
    for ca in a {
        for (j, cb) in b.iter().enumerate() {
            row[j + 1] = if ca == cb {
                prev[j] + 1
            } else {
                prev[j + 1].max(row[j])
            };
        }
        std::mem::swap(&mut prev, &mut row);
    }
    prev[b.len()]
}

/// Pass 3: drop a record when an earlier surviving record's title is at least
/// `threshold` similar. All pairs are compared, so this is O(n²) in the number
/// of titled records. Untitled records are never compared and always survive.
pub fn dedup_fuzzy_title(records: Vec<UnifiedRecord>, threshold: f64) -> Vec<UnifiedRecord> {
    let mut kept_titles: Vec<Vec<char>> = Vec::new();
    let mut survivors = Vec::with_capacity(records.len());

    for record in records {
        if record.title.is_empty() {
            survivors.push(record);
            continue;
        }

        let title: Vec<char> = record.title.to_lowercase().chars().collect();
        let duplicate = kept_titles
            .iter()
            .any(|kept| indel_ratio(kept, &title) >= threshold);

        if !duplicate {
            kept_titles.push(title);
            survivors.push(record);
        }
    }

    survivors
}

/// Runs the three passes in their fixed order and records a checkpoint after each.
#[derive(Debug, Clone)]
pub struct Deduplicator {
    fuzzy_threshold: f64,
}

impl Deduplicator {
    pub fn new(fuzzy_threshold: f64) -> Self {
        Self { fuzzy_threshold }
    }

    pub fn run(
        &self,
        records: Vec<UnifiedRecord>,
        funnel: &mut FunnelCounters,
    ) -> Result<Vec<UnifiedRecord>> {
        let input = records.len();

        let records = dedup_by_doi(records);
        info!(removed = input - records.len(), remaining = records.len(), "DOI dedup");
        funnel.record(Checkpoint::AfterDoiDedup, records.len())?;

        let before = records.len();
        let records = dedup_by_title(records);
        info!(removed = before - records.len(), remaining = records.len(), "Title dedup");
        funnel.record(Checkpoint::AfterTitleDedup, records.len())?;

        let before = records.len();
        let records = dedup_fuzzy_title(records, self.fuzzy_threshold);
        info!(
            removed = before - records.len(),
            remaining = records.len(),
            threshold = self.fuzzy_threshold,
            "Fuzzy title dedup"
        );
        funnel.record(Checkpoint::AfterFuzzyDedup, records.len())?;

        Ok(records)
    }
}

impl Default for Deduplicator {
    fn default() -> Self {
        Self::new(crate::config::FUZZY_TITLE_THRESHOLD)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FUZZY_TITLE_THRESHOLD;
    use proptest::prelude::*;

    fn rec(source: &str, title: &str, doi: &str) -> UnifiedRecord {
        UnifiedRecord {
            source: source.to_string(),
            title: title.to_string(),
            doi: doi.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_doi_first_seen_wins_and_empty_doi_survives() {
        let records = vec![
            rec("openalex", "Paper A", "10.1/x"),
            rec("crossref", "Paper A (crossref copy)", "10.1/x"),
            rec("gscholar", "Paper without DOI", ""),
        ];
        let out = dedup_by_doi(records);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].source, "openalex");
        assert_eq!(out[1].title, "Paper without DOI");
    }

    #[test]
    fn test_doi_pass_keeps_every_doi_less_record() {
        let records = vec![
            rec("a", "Same", ""),
            rec("b", "Same", ""),
            rec("c", "", ""),
        ];
        assert_eq!(dedup_by_doi(records).len(), 3);
    }

    #[test]
    fn test_title_pass_collapses_case_and_punctuation_variants() {
        let records = vec![
            rec("a", "Early School Leaving in Europe", ""),
            rec("b", "early   school-leaving  in europe!!", ""),
        ];
        let out = dedup_by_title(records);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].source, "a");
    }

    #[test]
    fn test_title_pass_never_matches_empty_titles() {
        let mut first = rec("a", "", "");
        first.abstract_text = "Identical abstract".to_string();
        let second = first.clone();
        let punctuation_only = rec("c", "???", "");

        let out = dedup_by_title(vec![first, second, punctuation_only.clone(), punctuation_only]);
        assert_eq!(out.len(), 4);
    }

    #[test]
    fn test_title_similarity_scale() {
        assert_eq!(title_similarity("Same Title", "same title"), 100.0);
        let score = title_similarity(
            "Youth NEET transitions in Southern Europe: evidence from labour force surveys",
            "Youth NEET transition in Southern Europe: evidence from labour force surveys",
        );
        assert!(score > 99.0 && score < 99.5, "score was {}", score);

        // One inserted word: 2 * 53 / 110
        let score = title_similarity(
            "Youth unemployment and NEET status in Southern Europe",
            "The youth unemployment and NEET status in Southern Europe",
        );
        assert!((score - 96.36).abs() < 0.01, "score was {}", score);

        assert_eq!(title_similarity("", ""), 100.0);
        assert_eq!(title_similarity("abc", ""), 0.0);
    }

    #[test]
    fn test_substitution_costs_two_edits() {
        // "kitten" -> "sitting": LCS 4, indel 5 over 13 characters
        let score = title_similarity("kitten", "sitting");
        assert!((score - 100.0 * 8.0 / 13.0).abs() < 1e-9, "score was {}", score);
    }

    #[test]
    fn test_fuzzy_removes_title_with_leading_article() {
        let records = vec![
            rec("a", "Youth unemployment and NEET status in Southern Europe", ""),
            rec("b", "The youth unemployment and NEET status in Southern Europe", ""),
        ];
        let out = dedup_fuzzy_title(records, FUZZY_TITLE_THRESHOLD);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].source, "a");
    }

    #[test]
    fn test_fuzzy_removes_later_near_duplicate() {
        let records = vec![
            rec(
                "a",
                "Youth NEET transitions in Southern Europe: evidence from labour force surveys",
                "",
            ),
            rec(
                "b",
                "Youth NEET transition in Southern Europe: evidence from labour force surveys",
                "",
            ),
        ];
        let out = dedup_fuzzy_title(records, FUZZY_TITLE_THRESHOLD);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].source, "a");
    }

    #[test]
    fn test_fuzzy_keeps_moderately_similar_titles() {
        // ~89.7 similar
        let records = vec![
            rec("a", "Youth guarantee outcomes in Italy and Greece", ""),
            rec("b", "Youth guarantee results in Italy and Greece", ""),
        ];
        assert_eq!(dedup_fuzzy_title(records, FUZZY_TITLE_THRESHOLD).len(), 2);
    }

    #[test]
    fn test_fuzzy_never_compares_untitled_records() {
        let records = vec![rec("a", "", "10.1/a"), rec("b", "", "10.1/b")];
        assert_eq!(dedup_fuzzy_title(records, FUZZY_TITLE_THRESHOLD).len(), 2);
    }

    #[test]
    fn test_fuzzy_compares_only_against_survivors() {
        // b is a near-duplicate of a and is removed; c is close to b but not to a,
        // so it must survive.
        let a = "Vocational training pathways in Portugal and Spain";
        let b = "Vocational training pathways in Portugal and Spai";
        let c = "Vocational training pathways in Portugal and Spa";
        assert!(title_similarity(a, b) >= 98.5);
        assert!(title_similarity(b, c) >= 98.5);
        assert!(title_similarity(a, c) < 98.5);

        let records = vec![rec("a", a, ""), rec("b", b, ""), rec("c", c, "")];
        let out = dedup_fuzzy_title(records, 98.5);
        let sources: Vec<&str> = out.iter().map(|r| r.source.as_str()).collect();
        assert_eq!(sources, vec!["a", "c"]);
    }

    #[test]
    fn test_run_records_monotonic_checkpoints() {
        let records = vec![
            rec("a", "Apprenticeship reform and youth labour markets in Germany", "10.5/q"),
            rec("b", "Apprenticeship reform and youth labour markets in Germany", "10.5/Q2"),
            rec("c", "Apprenticeship reforms and youth labour market in Germany", ""),
            rec("d", "Something else entirely", "10.5/q"),
        ];
        let mut funnel = FunnelCounters::new();
        let out = Deduplicator::default()
            .run(records, &mut funnel)
            .expect("dedup");

        assert_eq!(out.len(), 1);
        assert_eq!(funnel.get(Checkpoint::AfterDoiDedup), Some(3));
        assert_eq!(funnel.get(Checkpoint::AfterTitleDedup), Some(2));
        assert_eq!(funnel.get(Checkpoint::AfterFuzzyDedup), Some(1));
    }

    fn arb_record() -> impl Strategy<Value = UnifiedRecord> {
        (
            prop::sample::select(vec!["", "10.1/a", "10.1/b", "10.1/c"]),
            prop::sample::select(vec![
                "",
                "Youth unemployment in Spain",
                "youth unemployment in spain!",
                "Youth unemployment in Spai",
                "Dropout and NEET status",
            ]),
        )
            .prop_map(|(doi, title)| rec("p", title, doi))
    }

    proptest! {
        #[test]
        fn prop_doi_pass_idempotent(records in prop::collection::vec(arb_record(), 0..30)) {
            let once = dedup_by_doi(records);
            let twice = dedup_by_doi(once.clone());
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn prop_passes_never_increase_count(records in prop::collection::vec(arb_record(), 0..30)) {
            let mut funnel = FunnelCounters::new();
            funnel.record(Checkpoint::AfterNonemptyFilter, records.len()).expect("write");
            Deduplicator::default().run(records, &mut funnel).expect("dedup");

            let counts: Vec<usize> = [
                Checkpoint::AfterNonemptyFilter,
                Checkpoint::AfterDoiDedup,
                Checkpoint::AfterTitleDedup,
                Checkpoint::AfterFuzzyDedup,
            ]
            .iter()
            .filter_map(|c| funnel.get(*c))
            .collect();
            prop_assert_eq!(counts.len(), 4);
            prop_assert!(counts.windows(2).all(|w| w[0] >= w[1]));
        }
    }
}
