//! Per-language disallowed-term sets.
//!
//! Terms are normalized once when loaded, so lookups compare normalized
//! query tokens against normalized entries directly. Language sets are fixed
//! after loading; the custom-term set grows for the lifetime of the lexicon.

use std::borrow::Borrow;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, PoisonError, RwLock};

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::{FilterError, Result};
use crate::normalizer::Normalizer;

lazy_static! {
    static ref LANGUAGE_CODE: Regex = Regex::new(r"^[a-z]{2}$").unwrap();
    // `ru.bdw`, `en.txt`
    static ref LEXICON_FILE: Regex = Regex::new(r"^([a-z]{2})\.(?:bdw|txt)$").unwrap();
}

/// Two lower-case ASCII letters
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LanguageCode(String);

impl LanguageCode {
    pub fn parse(code: &str) -> Result<Self> {
        if LANGUAGE_CODE.is_match(code) {
            Ok(Self(code.to_string()))
        } else {
            Err(FilterError::UnsupportedLanguage(code.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LanguageCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for LanguageCode {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl AsRef<str> for LanguageCode {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for LanguageCode {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Terms from a lexicon source: one per line, trimmed, blank lines skipped
pub fn parse_lexicon(text: &str) -> impl Iterator<Item = &str> {
    text.lines().map(str::trim).filter(|line| !line.is_empty())
}

pub struct Lexicon {
    normalizer: Arc<Normalizer>,
    languages: BTreeMap<LanguageCode, HashSet<String>>,
    /// Copy-on-write: readers clone the `Arc` and never hold the lock
    custom: RwLock<Arc<HashSet<String>>>,
}

impl Lexicon {
    pub fn new(normalizer: Arc<Normalizer>) -> Self {
        Self {
            normalizer,
            languages: BTreeMap::new(),
            custom: RwLock::default(),
        }
    }

    /// Lexicon with every `<code>.bdw` / `<code>.txt` file found in `dir`
    pub fn from_dir(normalizer: Arc<Normalizer>, dir: &Path) -> Result<Self> {
        let mut lexicon = Self::new(normalizer);
        lexicon.load_dir(dir)?;
        Ok(lexicon)
    }

    pub fn normalizer(&self) -> &Normalizer {
        &self.normalizer
    }

    /// Normalize `terms` into the set for `code`, creating it if needed
    /// Returns: size of that language's set afterwards
    pub fn load<I, S>(&mut self, code: &str, terms: I) -> Result<usize>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let code = LanguageCode::parse(code)?;
        let normalized = self.normalize_terms(terms);
        let set = self.languages.entry(code.clone()).or_default();
        set.extend(normalized);
        tracing::info!(language = %code, terms = set.len(), "loaded lexicon");
        Ok(set.len())
    }

    /// Load one language from source text in the lexicon file format
    pub fn load_source(&mut self, code: &str, text: &str) -> Result<usize> {
        self.load(code, parse_lexicon(text))
    }

    /// Load every lexicon file in `dir`. Returns the number of files loaded
    pub fn load_dir(&mut self, dir: &Path) -> Result<usize> {
        let entries = fs::read_dir(dir).map_err(|e| FilterError::io(dir, e))?;
        let mut paths = Vec::new();
        for entry in entries {
            paths.push(entry.map_err(|e| FilterError::io(dir, e))?.path());
        }
        paths.sort();

        let mut loaded = 0;
        for path in paths {
            if !path.is_file() {
                continue;
            }
            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
            let Some(caps) = LEXICON_FILE.captures(name) else {
                tracing::warn!(path = %path.display(), "skipping file that is not a lexicon");
                continue;
            };
            let bytes = fs::read(&path).map_err(|e| FilterError::io(&path, e))?;
            let text = String::from_utf8(bytes)
                .map_err(|e| FilterError::malformed(path.display().to_string(), e.to_string()))?;
            self.load_source(&caps[1], &text)?;
            loaded += 1;
        }

        if loaded == 0 {
            tracing::warn!(dir = %dir.display(), "no lexicon files found");
        }
        Ok(loaded)
    }

    /// Normalize and add run-time terms. Returns how many were new
    pub fn add_custom_terms<I, S>(&self, terms: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let normalized = self.normalize_terms(terms);
        let mut custom = self.custom.write().unwrap_or_else(PoisonError::into_inner);
        // copies the set only while an earlier snapshot is still alive
        let set = Arc::make_mut(&mut custom);
        let added = normalized.into_iter().filter(|t| set.insert(t.clone())).count();
        tracing::debug!(added, total = set.len(), "added custom terms");
        added
    }

    /// Snapshot of the custom terms, unaffected by later additions
    pub fn custom_terms(&self) -> Arc<HashSet<String>> {
        Arc::clone(&self.custom.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn language_terms(&self, code: &str) -> Option<&HashSet<String>> {
        self.languages.get(code)
    }

    /// Union of the requested languages' terms and the custom terms present now
    ///
    /// Fails on a language that was never loaded rather than skipping it.
    pub fn all_terms(&self, languages: &[LanguageCode]) -> Result<HashSet<String>> {
        let mut terms = HashSet::new();
        for code in languages {
            let set = self
                .languages
                .get(code)
                .ok_or_else(|| FilterError::UnsupportedLanguage(code.to_string()))?;
            terms.extend(set.iter().cloned());
        }
        terms.extend(self.custom_terms().iter().cloned());
        Ok(terms)
    }

    /// Loaded language codes, sorted
    pub fn supported_languages(&self) -> Vec<LanguageCode> {
        self.languages.keys().cloned().collect()
    }

    pub fn supports(&self, code: &str) -> bool {
        self.languages.contains_key(code)
    }

    /// Whether `term`, once normalized, is in any language or the custom set
    pub fn contains(&self, term: &str) -> bool {
        let term = self.normalizer.normalize(term);
        self.languages.values().any(|set| set.contains(&term)) || self.custom_terms().contains(&term)
    }

    pub fn term_count(&self, code: &str) -> usize {
        self.languages.get(code).map_or(0, HashSet::len)
    }

    fn normalize_terms<I, S>(&self, terms: I) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        terms
            .into_iter()
            .filter_map(|raw| {
                let term = self.normalizer.normalize(raw.as_ref());
                if term.is_empty() {
                    return None;
                }
                if term.contains(' ') {
                    // Matching is per token, so only exact phrase lookups can hit it.
                    tracing::debug!(term = raw.as_ref(), "term normalizes to several tokens");
                }
                Some(term)
            })
            .collect()
    }
}

impl fmt::Debug for Lexicon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts: BTreeMap<&str, usize> = self.languages.iter().map(|(k, v)| (k.as_str(), v.len())).collect();
        f.debug_struct("Lexicon")
            .field("languages", &counts)
            .field("custom", &self.custom_terms().len())
            .finish()
    }
}
