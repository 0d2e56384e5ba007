//! Repair of near-miss label strings against the canonical taxonomy.
//!
//! Scores are integers 0-100 derived from Levenshtein distance over the raw
//! strings, so a label that differs only in case scores just under 100 and is
//! reported as a fuzzy match rather than exact.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock};

use narrascope_core::{Level, MatchKind, Taxonomy};
use tracing::debug;

/// Outcome of matching one candidate string.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    pub matched: Option<String>,
    pub score: f64,
    pub kind: MatchKind,
}

/// Matcher over one taxonomy level. Holds no per-document state.
pub struct FuzzyMatcher {
    level: Level,
    threshold: u32,
    labels: Vec<String>,
    exact: HashSet<String>,
}

impl FuzzyMatcher {
    pub fn new(taxonomy: &Taxonomy, level: Level, threshold: u32) -> Self {
        let labels: Vec<String> = taxonomy
            .labels(level)
            .into_iter()
            .map(str::to_string)
            .collect();
        let exact = labels.iter().cloned().collect();
        Self {
            level,
            threshold,
            labels,
            exact,
        }
    }

    pub fn level(&self) -> Level {
        self.level
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    /// Match `candidate` against every label at this level. `context` (the
    /// parent category or narrative) is only used for logging.
    pub fn best_match(&self, candidate: &str, context: &str) -> MatchResult {
        if self.exact.contains(candidate) {
            return MatchResult {
                matched: Some(candidate.to_string()),
                score: 100.0,
                kind: MatchKind::Exact,
            };
        }

        let best = self
            .labels
            .iter()
            .map(|label| (label, similarity(candidate, label)))
            .fold(None::<(&String, u32)>, |best, (label, score)| match best {
                Some((_, top)) if top >= score => best,
                _ => Some((label, score)),
            });

        match best {
            Some((label, score)) if score >= self.threshold => {
                debug!(
                    level = %self.level,
                    context,
                    candidate,
                    matched = %label,
                    score,
                    "fuzzy label match"
                );
                MatchResult {
                    matched: Some(label.clone()),
                    score: f64::from(score),
                    kind: MatchKind::Fuzzy,
                }
            }
            best => {
                let score = best.map_or(0, |(_, s)| s);
                debug!(level = %self.level, context, candidate, score, "label unmatched");
                MatchResult {
                    matched: None,
                    score: f64::from(score),
                    kind: MatchKind::Unmatched,
                }
            }
        }
    }
}

/// `100 * (1 - distance / longer_len)`, floored. Identical strings score 100;
/// any difference scores below it.
pub fn similarity(a: &str, b: &str) -> u32 {
    let longest = a.chars().count().max(b.chars().count());
    if longest == 0 {
        return 100;
    }
    let distance = strsim::levenshtein(a, b).min(longest);
    (100 * (longest - distance) / longest) as u32
}

/// Matchers keyed by (level, threshold), built once per key and shared by
/// every document in the run.
pub struct MatcherRegistry {
    taxonomy: Arc<Taxonomy>,
    matchers: RwLock<HashMap<(Level, u32), Arc<FuzzyMatcher>>>,
}

impl MatcherRegistry {
    pub fn new(taxonomy: Arc<Taxonomy>) -> Self {
        Self {
            taxonomy,
            matchers: RwLock::new(HashMap::new()),
        }
    }

    /// Shared matcher for `(level, threshold)`, built on first request.
    /// Later lookups only take the read lock.
    pub fn get(&self, level: Level, threshold: u32) -> Arc<FuzzyMatcher> {
        let key = (level, threshold);
        {
            let matchers = self.matchers.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(matcher) = matchers.get(&key) {
                return matcher.clone();
            }
        }
        let mut matchers = self.matchers.write().unwrap_or_else(PoisonError::into_inner);
        matchers
            .entry(key)
            .or_insert_with(|| Arc::new(FuzzyMatcher::new(&self.taxonomy, level, threshold)))
            .clone()
    }

    pub fn len(&self) -> usize {
        self.matchers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn taxonomy() -> Taxonomy {
        Taxonomy::from_json_str(
            r#"{
                "URW": {
                    "URW: Blaming the war on others": ["URW: Blaming the war on others: The West are the aggressors"],
                    "abcdefghij": []
                }
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn exact_match_scores_100() {
        let m = FuzzyMatcher::new(&taxonomy(), Level::Narrative, 70);
        let r = m.best_match("URW: Blaming the war on others", "URW");
        assert_eq!(r.kind, MatchKind::Exact);
        assert_eq!(r.score, 100.0);
        assert_eq!(r.matched.as_deref(), Some("URW: Blaming the war on others"));
    }

    #[test]
    fn case_difference_is_fuzzy_below_100() {
        let m = FuzzyMatcher::new(&taxonomy(), Level::Narrative, 70);
        let r = m.best_match("urw: blaming the war on others", "URW");
        assert_eq!(r.kind, MatchKind::Fuzzy);
        assert!(r.score < 100.0);
        assert!(r.score >= 70.0);
        assert_eq!(r.matched.as_deref(), Some("URW: Blaming the war on others"));
    }

    #[test]
    fn threshold_is_inclusive() {
        // Three substitutions over ten characters: exactly 70.
        assert_eq!(similarity("abcdefgXYZ", "abcdefghij"), 70);
        let at = FuzzyMatcher::new(&taxonomy(), Level::Narrative, 70);
        let r = at.best_match("abcdefgXYZ", "URW");
        assert_eq!(r.kind, MatchKind::Fuzzy);
        assert_eq!(r.score, 70.0);
        assert_eq!(r.matched.as_deref(), Some("abcdefghij"));

        let above = FuzzyMatcher::new(&taxonomy(), Level::Narrative, 71);
        let r = above.best_match("abcdefgXYZ", "URW");
        assert_eq!(r.kind, MatchKind::Unmatched);
        assert_eq!(r.matched, None);
        assert_eq!(r.score, 70.0);
    }

    #[test]
    fn levels_are_separate() {
        let m = FuzzyMatcher::new(&taxonomy(), Level::Subnarrative, 70);
        let r = m.best_match("abcdefghij", "URW");
        assert_ne!(r.kind, MatchKind::Exact);
    }

    #[test]
    fn registry_reuses_matchers() {
        let registry = MatcherRegistry::new(Arc::new(taxonomy()));
        let a = registry.get(Level::Narrative, 70);
        let b = registry.get(Level::Narrative, 70);
        assert!(Arc::ptr_eq(&a, &b));
        let _c = registry.get(Level::Narrative, 80);
        let _d = registry.get(Level::Subnarrative, 70);
        assert_eq!(registry.len(), 3);
    }
}
