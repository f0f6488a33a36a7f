//! Exact and approximate membership of a normalized token in a term set.

use std::collections::{HashMap, HashSet};

use rayon::prelude::*;

/// Candidate sets at least this large are scanned in parallel
pub const PARALLEL_SCAN_MIN: usize = 2048;

/// Similarity threshold for approximate matching
///
/// Only values strictly between 0 and 1 enable approximate matching; 1 means
/// exact-only, and 0, NaN or anything out of range disable it as well
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Threshold(f64);

impl Threshold {
    pub const EXACT: Self = Self(1.0);

    pub fn new(value: f64) -> Self {
        Self(value)
    }

    /// `None` selects exact matching
    pub fn from_option(value: Option<f64>) -> Self {
        value.map_or(Self::EXACT, Self::new)
    }

    pub fn value(self) -> f64 {
        self.0
    }

    pub fn is_approximate(self) -> bool {
        self.0 > 0.0 && self.0 < 1.0
    }
}

impl Default for Threshold {
    fn default() -> Self {
        Self::EXACT
    }
}

impl From<f64> for Threshold {
    fn from(value: f64) -> Self {
        Self(value)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchOutcome {
    pub matched: bool,
    pub matched_term: Option<String>,
}

impl MatchOutcome {
    fn hit(term: &str) -> Self {
        Self {
            matched: true,
            matched_term: Some(term.to_string()),
        }
    }
}

/// Check `token` against every candidate set
///
/// Exact membership is tried across all sets before any approximate
/// comparison, so an exact hit always wins. An approximate hit needs a
/// similarity strictly greater than the threshold
pub fn matches(token: &str, candidates: &[&HashSet<String>], threshold: Threshold) -> MatchOutcome {
    if let Some(term) = candidates.iter().find_map(|set| set.get(token)) {
        return MatchOutcome::hit(term);
    }
    if !threshold.is_approximate() {
        return MatchOutcome::default();
    }

    let token: Vec<char> = token.chars().collect();
    for set in candidates {
        let found = if set.len() >= PARALLEL_SCAN_MIN {
            set.par_iter().find_any(|term| is_similar(&token, term, threshold))
        } else {
            set.iter().find(|term| is_similar(&token, term, threshold))
        };
        if let Some(term) = found {
            tracing::trace!(term = %term, threshold = threshold.value(), "approximate match");
            return MatchOutcome::hit(term);
        }
    }
    MatchOutcome::default()
}

fn is_similar(token: &[char], term: &str, threshold: Threshold) -> bool {
    let term_len = term.chars().count();
    // The ratio can never exceed 2 * min / total.
    if length_bound(token.len(), term_len) <= threshold.value() {
        return false;
    }
    let term: Vec<char> = term.chars().collect();
    char_ratio(token, &term) > threshold.value()
}

fn length_bound(a: usize, b: usize) -> f64 {
    if a + b == 0 {
        return 1.0;
    }
    2.0 * a.min(b) as f64 / (a + b) as f64
}

/// Ratcliff/Obershelp similarity over characters: `2 * M / T`, where `M` is
/// the total size of the matching blocks and `T` the combined length.
/// Two empty strings are identical
pub fn similarity(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    char_ratio(&a, &b)
}

fn char_ratio(a: &[char], b: &[char]) -> f64 {
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    2.0 * matching_characters(a, b) as f64 / total as f64
}

/// Sum of matching block sizes: take the longest common block, then recurse
/// on what lies to its left and to its right
fn matching_characters(a: &[char], b: &[char]) -> usize {
    let mut b2j: HashMap<char, Vec<usize>> = HashMap::new();
    for (j, c) in b.iter().enumerate() {
        b2j.entry(*c).or_default().push(j);
    }

    let mut matched = 0;
    let mut queue = vec![(0, a.len(), 0, b.len())];
    while let Some((alo, ahi, blo, bhi)) = queue.pop() {
        let (i, j, k) = longest_match(a, &b2j, alo, ahi, blo, bhi);
        if k == 0 {
            continue;
        }
        matched += k;
        if alo < i && blo < j {
            queue.push((alo, i, blo, j));
        }
        if i + k < ahi && j + k < bhi {
            queue.push((i + k, ahi, j + k, bhi));
        }
    }
    matched
}

/// Longest block `a[i..i+k] == b[j..j+k]` inside the given windows. Ties go
/// to the smallest `i`, then the smallest `j`
fn longest_match(
    a: &[char],
    b2j: &HashMap<char, Vec<usize>>,
    alo: usize,
    ahi: usize,
    blo: usize,
    bhi: usize,
) -> (usize, usize, usize) {
    let (mut best_i, mut best_j, mut best_k) = (alo, blo, 0);
    // j2len[j]: length of the block ending at a[i - 1], b[j]
    let mut j2len: HashMap<usize, usize> = HashMap::new();
    for (i, c) in a.iter().enumerate().take(ahi).skip(alo) {
        let mut next: HashMap<usize, usize> = HashMap::new();
        for &j in b2j.get(c).map(Vec::as_slice).unwrap_or_default() {
            if j < blo {
                continue;
            }
            if j >= bhi {
                break;
            }
            let k = j.checked_sub(1).and_then(|p| j2len.get(&p)).copied().unwrap_or(0) + 1;
            next.insert(j, k);
            if k > best_k {
                best_i = i + 1 - k;
                best_j = j + 1 - k;
                best_k = k;
            }
        }
        j2len = next;
    }
    (best_i, best_j, best_k)
}
