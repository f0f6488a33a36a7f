//! The public filtering engine.

use std::collections::HashSet;
use std::ops::Range;
use std::sync::Arc;

use rayon::prelude::*;

use crate::config::FilterConfig;
use crate::error::{FilterError, Result};
use crate::lexicon::{LanguageCode, Lexicon};
use crate::matcher::{self, Threshold};
use crate::normalizer::{self, Normalizer};
use crate::tables::ConfusableTables;

/// Language selected when none is requested
pub const DEFAULT_LANGUAGE: &str = "ru";

/// Result of one filter call. The mode is chosen by whether a mask
/// character was supplied
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Whether any token matched
    Detected(bool),
    /// The input with every matched span masked
    Redacted(String),
}

/// A matched token, the lexicon term it hit and the original text it spans
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detection {
    pub token: String,
    pub term: String,
    pub span: Range<usize>,
}

/// Defaults applied by [`ProfanityFilter::filter`]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FilterOptions {
    pub threshold: Option<f64>,
    pub mask_char: Option<char>,
}

/// Detects and redacts lexicon terms in text
///
/// Language selection is fixed at construction. Custom terms can be added at
/// any time through a shared reference; every other operation is a read, so
/// one filter can serve many threads
#[derive(Debug)]
pub struct ProfanityFilter {
    lexicon: Lexicon,
    languages: Vec<LanguageCode>,
    active_terms: HashSet<String>,
    defaults: FilterOptions,
}

impl ProfanityFilter {
    /// Filter over `languages`, every loaded language with `use_all`, or
    /// [`DEFAULT_LANGUAGE`] when neither is given
    pub fn new(lexicon: Lexicon, languages: Option<&[&str]>, use_all: bool) -> Result<Self> {
        Self::with_baseline(lexicon, languages, use_all, DEFAULT_LANGUAGE)
    }

    pub fn with_baseline(lexicon: Lexicon, languages: Option<&[&str]>, use_all: bool, baseline: &str) -> Result<Self> {
        let requested = languages.unwrap_or_default();
        let mut selected = Vec::with_capacity(requested.len());
        for code in requested {
            let code = resolve_language(&lexicon, code)?;
            if !selected.contains(&code) {
                selected.push(code);
            }
        }
        if use_all {
            selected = lexicon.supported_languages();
        } else if selected.is_empty() {
            selected.push(resolve_language(&lexicon, baseline)?);
        }

        // Custom terms added later are read per call.
        let active_terms = lexicon.all_terms(&selected)?;
        tracing::info!(
            languages = ?selected.iter().map(LanguageCode::as_str).collect::<Vec<_>>(),
            terms = active_terms.len(),
            "profanity filter ready"
        );

        Ok(Self {
            lexicon,
            languages: selected,
            active_terms,
            defaults: FilterOptions::default(),
        })
    }

    /// Load tables, lexicons and language selection as configured
    pub fn from_config(config: &FilterConfig) -> Result<Self> {
        let tables = match &config.tables_dir {
            Some(dir) => ConfusableTables::from_dir(dir)?,
            None => ConfusableTables::builtin()?,
        };
        let normalizer = Arc::new(Normalizer::new(Arc::new(tables))?);
        let lexicon = Lexicon::from_dir(normalizer, &config.lexicon_dir)?;
        let languages: Vec<&str> = config.languages.iter().map(String::as_str).collect();
        let filter = Self::with_baseline(lexicon, Some(languages.as_slice()), config.all_languages, &config.default_language)?;
        Ok(filter.with_defaults(FilterOptions {
            threshold: config.threshold,
            mask_char: config.mask_char,
        }))
    }

    pub fn with_defaults(mut self, defaults: FilterOptions) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn defaults(&self) -> FilterOptions {
        self.defaults
    }

    /// Add custom terms. Returns how many were new
    pub fn add_words<I, S>(&self, terms: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.lexicon.add_custom_terms(terms)
    }

    /// Check `text` against the active languages and the custom terms
    ///
    /// Without `mask_char` this reports whether anything matched. With it,
    /// the original text comes back with each matched span replaced by the
    /// mask repeated once per original character
    pub fn filter_text(&self, text: &str, threshold: Option<f64>, mask_char: Option<char>) -> Verdict {
        let threshold = Threshold::from_option(threshold);
        match mask_char {
            None => Verdict::Detected(!self.scan(text, threshold, true).is_empty()),
            Some(mask) => {
                let spans = self.scan(text, threshold, false).into_iter().map(|d| d.span);
                Verdict::Redacted(redact(text, spans, mask))
            }
        }
    }

    /// [`filter_text`](Self::filter_text) with the configured defaults
    pub fn filter(&self, text: &str) -> Verdict {
        self.filter_text(text, self.defaults.threshold, self.defaults.mask_char)
    }

    pub fn filter_bytes(&self, bytes: &[u8], threshold: Option<f64>, mask_char: Option<char>) -> Result<Verdict> {
        Ok(self.filter_text(normalizer::decode(bytes)?, threshold, mask_char))
    }

    /// Filter many texts in parallel. Verdicts come back in input order
    pub fn filter_batch<S>(&self, texts: &[S], threshold: Option<f64>, mask_char: Option<char>) -> Vec<Verdict>
    where
        S: AsRef<str> + Sync,
    {
        texts
            .par_iter()
            .map(|text| self.filter_text(text.as_ref(), threshold, mask_char))
            .collect()
    }

    /// Every matching token, in text order
    pub fn find_matches(&self, text: &str, threshold: Option<f64>) -> Vec<Detection> {
        self.scan(text, Threshold::from_option(threshold), false)
    }

    pub fn supported_languages(&self) -> Vec<LanguageCode> {
        self.lexicon.supported_languages()
    }

    pub fn active_languages(&self) -> &[LanguageCode] {
        &self.languages
    }

    pub fn lexicon(&self) -> &Lexicon {
        &self.lexicon
    }

    pub fn normalizer(&self) -> &Normalizer {
        self.lexicon.normalizer()
    }

    fn scan(&self, text: &str, threshold: Threshold, first_only: bool) -> Vec<Detection> {
        let custom = self.lexicon.custom_terms();
        let candidates = [&self.active_terms, custom.as_ref()];

        let mut found = Vec::new();
        for token in self.lexicon.normalizer().tokens(text) {
            let outcome = matcher::matches(&token.text, &candidates, threshold);
            if let Some(term) = outcome.matched_term {
                tracing::debug!(token = %token.text, term = %term, "matched");
                found.push(Detection {
                    token: token.text,
                    term,
                    span: token.span,
                });
                if first_only {
                    break;
                }
            }
        }
        found
    }
}

fn resolve_language(lexicon: &Lexicon, code: &str) -> Result<LanguageCode> {
    let code = LanguageCode::parse(code)?;
    if lexicon.supports(code.as_str()) {
        Ok(code)
    } else {
        Err(FilterError::UnsupportedLanguage(code.to_string()))
    }
}

/// Replace each span with `mask`, once per character it covers. Overlapping
/// or touching spans are merged first
fn redact<I>(text: &str, spans: I, mask: char) -> String
where
    I: IntoIterator<Item = Range<usize>>,
{
    let mut spans: Vec<Range<usize>> = spans.into_iter().collect();
    spans.sort_by_key(|span| span.start);

    let mut merged: Vec<Range<usize>> = Vec::with_capacity(spans.len());
    for span in spans {
        match merged.last_mut() {
            Some(last) if span.start <= last.end => last.end = last.end.max(span.end),
            _ => merged.push(span),
        }
    }

    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;
    for span in merged {
        out.push_str(&text[cursor..span.start]);
        out.extend(std::iter::repeat_n(mask, text[span.clone()].chars().count()));
        cursor = span.end;
    }
    out.push_str(&text[cursor..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn lexicon() -> Lexicon {
        let mut lexicon = Lexicon::new(Arc::new(Normalizer::builtin().unwrap()));
        lexicon.load_source("en", "bad\nbadword\nidiot\n").unwrap();
        lexicon.load_source("ru", "дурак\n").unwrap();
        lexicon
    }

    fn english() -> ProfanityFilter {
        ProfanityFilter::new(lexicon(), Some(&["en"]), false).unwrap()
    }

    #[test]
    fn test_exact_detection() {
        let filter = english();
        assert_eq!(filter.filter_text("this is bad", Some(1.0), None), Verdict::Detected(true));
        assert_eq!(filter.filter_text("this is fine", None, None), Verdict::Detected(false));
        assert_eq!(filter.filter_text("", None, None), Verdict::Detected(false));
    }

    #[test]
    fn test_confusable_detection() {
        let filter = english();
        assert_eq!(filter.normalizer().normalize("b4d w0rd"), "bad word");
        assert_eq!(filter.filter_text("b4d w0rd", None, None), Verdict::Detected(true));
        assert_eq!(filter.filter_text("B.A.D", None, None), Verdict::Detected(true));
        assert_eq!(filter.filter_text("bаd", None, None), Verdict::Detected(true));
        assert_eq!(filter.filter_text("ÍDÏÖT", None, None), Verdict::Detected(true));
    }

    #[test]
    fn test_approximate_detection() {
        let filter = english();
        assert_eq!(filter.filter_text("idoit", None, None), Verdict::Detected(false));
        assert_eq!(filter.filter_text("idoit", Some(0.7), None), Verdict::Detected(true));
        assert_eq!(filter.filter_text("idoit", Some(0.8), None), Verdict::Detected(false));
        assert_eq!(filter.filter_text("idoit", Some(0.0), None), Verdict::Detected(false));
    }

    #[test]
    fn test_redaction_masks_original_span() {
        let filter = english();
        assert_eq!(
            filter.filter_text("Badword!", None, Some('*')),
            Verdict::Redacted("*******!".to_string())
        );
        assert_eq!(
            filter.filter_text("You are an Idiot, friend.", None, Some('#')),
            Verdict::Redacted("You are an #####, friend.".to_string())
        );
        assert_eq!(
            filter.filter_text("b.a.d  news", None, Some('*')),
            Verdict::Redacted("*****  news".to_string())
        );
    }

    #[test]
    fn test_redaction_counts_characters() {
        let filter = ProfanityFilter::new(lexicon(), Some(&["ru"]), false).unwrap();
        assert_eq!(
            filter.filter_text("ты ДУРАК.", None, Some('*')),
            Verdict::Redacted("ты *****.".to_string())
        );
    }

    #[test]
    fn test_redaction_without_match_returns_text() {
        let filter = english();
        assert_eq!(
            filter.filter_text("Nothing  to\tsee", None, Some('*')),
            Verdict::Redacted("Nothing  to\tsee".to_string())
        );
    }

    #[test]
    fn test_redact_merges_overlapping_spans() {
        assert_eq!(redact("abcdef", [1..3, 2..5], '*'), "a****f");
        assert_eq!(redact("abcdef", [3..4, 0..1], '-'), "-bc-ef");
        assert_eq!(redact("äbc", [0..2], '*'), "*bc");
    }

    #[test]
    fn test_custom_words() {
        let filter = english();
        assert_eq!(filter.filter_text("zzzterm", Some(1.0), None), Verdict::Detected(false));
        assert_eq!(filter.add_words(["zzzterm"]), 1);
        assert_eq!(filter.filter_text("zzzterm", Some(1.0), None), Verdict::Detected(true));
        assert_eq!(filter.filter_text("ZZZ7ERM", None, None), Verdict::Detected(true));
    }

    #[test]
    fn test_active_terms_cover_selected_languages_only() {
        let lexicon = lexicon();
        lexicon.add_custom_terms(["zzzterm"]);
        let filter = ProfanityFilter::new(lexicon, Some(&["en"]), false).unwrap();
        let n = filter.normalizer();
        assert!(filter.active_terms.contains(&n.normalize("idiot")));
        assert!(filter.active_terms.contains("zzzterm"));
        assert!(!filter.active_terms.contains(&n.normalize("дурак")));
        assert_eq!(filter.filter_text("zzzterm", None, None), Verdict::Detected(true));
    }

    #[test]
    fn test_unsupported_language() {
        for code in ["de", "english", "EN"] {
            let result = ProfanityFilter::new(lexicon(), Some(&[code]), false);
            assert!(matches!(result, Err(FilterError::UnsupportedLanguage(_))), "{code}");
        }
    }

    #[test]
    fn test_language_selection() {
        let baseline = ProfanityFilter::new(lexicon(), None, false).unwrap();
        assert_eq!(baseline.active_languages(), ["ru".parse::<LanguageCode>().unwrap()]);
        assert_eq!(baseline.filter_text("bad", None, None), Verdict::Detected(false));
        assert_eq!(baseline.filter_text("дурак", None, None), Verdict::Detected(true));

        let empty = ProfanityFilter::new(lexicon(), Some(&[]), false).unwrap();
        assert_eq!(empty.active_languages().len(), 1);

        let all = ProfanityFilter::new(lexicon(), None, true).unwrap();
        assert_eq!(all.active_languages().len(), 2);
        assert_eq!(all.filter_text("bad дурак", None, None), Verdict::Detected(true));

        let en = english();
        assert_eq!(en.filter_text("дурак", None, None), Verdict::Detected(false));
        assert_eq!(en.supported_languages().len(), 2);
    }

    #[test]
    fn test_missing_baseline_language() {
        let mut lexicon = Lexicon::new(Arc::new(Normalizer::builtin().unwrap()));
        lexicon.load_source("en", "bad").unwrap();
        let result = ProfanityFilter::new(lexicon, None, false);
        assert!(matches!(result, Err(FilterError::UnsupportedLanguage(c)) if c == "ru"));
    }

    #[test]
    fn test_find_matches_reports_spans() {
        let filter = english();
        let text = "bad and b4d";
        let found = filter.find_matches(text, None);
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].span, 0..3);
        assert_eq!(&text[found[1].span.clone()], "b4d");
        let bad = filter.normalizer().normalize("bad");
        assert!(found.iter().all(|d| d.term == bad && d.token == bad));
    }

    #[test]
    fn test_filter_uses_defaults() {
        let filter = english().with_defaults(FilterOptions {
            threshold: Some(0.7),
            mask_char: Some('*'),
        });
        assert_eq!(filter.filter("an idoit"), Verdict::Redacted("an *****".to_string()));
        assert_eq!(english().filter("bad"), Verdict::Detected(true));
    }

    #[test]
    fn test_filter_bytes() {
        let filter = english();
        assert_eq!(filter.filter_bytes(b"so bad", None, None).unwrap(), Verdict::Detected(true));
        let result = filter.filter_bytes(&[0x62, 0x61, 0xff], None, None);
        assert!(matches!(result, Err(FilterError::InvalidInput(_))));
    }

    #[test]
    fn test_filter_batch_keeps_order() {
        let filter = english();
        let texts = ["fine", "bad", "also fine", "idiot"];
        let verdicts = filter.filter_batch(&texts, None, None);
        assert_eq!(
            verdicts,
            vec![
                Verdict::Detected(false),
                Verdict::Detected(true),
                Verdict::Detected(false),
                Verdict::Detected(true),
            ]
        );
    }

    #[test]
    fn test_concurrent_reads_and_writes() {
        let filter = Arc::new(english());
        let readers: Vec<_> = (0..4)
            .map(|_| {
                let filter = Arc::clone(&filter);
                thread::spawn(move || {
                    for _ in 0..50 {
                        assert_eq!(filter.filter_text("so bad", None, None), Verdict::Detected(true));
                    }
                })
            })
            .collect();
        let writer = {
            let filter = Arc::clone(&filter);
            thread::spawn(move || filter.add_words(["qqqword"]))
        };
        assert_eq!(writer.join().unwrap(), 1);
        for reader in readers {
            reader.join().unwrap();
        }
        assert_eq!(filter.filter_text("qqqword", None, None), Verdict::Detected(true));
    }

    #[test]
    fn test_batch_with_large_lexicon_while_adding_words() {
        let mut lexicon = Lexicon::new(Arc::new(Normalizer::builtin().unwrap()));
        let terms: Vec<String> = (0..matcher::PARALLEL_SCAN_MIN + 500).map(|i| format!("qx{i}qx")).collect();
        lexicon.load("en", &terms).unwrap();
        let filter = Arc::new(ProfanityFilter::new(lexicon, Some(&["en"]), false).unwrap());

        let writer = {
            let filter = Arc::clone(&filter);
            thread::spawn(move || {
                for i in 0..200 {
                    filter.add_words([format!("added{i}")]);
                }
            })
        };
        let texts: Vec<String> = (0..64).map(|i| format!("plain words {i} here")).collect();
        for _ in 0..5 {
            let verdicts = filter.filter_batch(&texts, Some(0.9), None);
            assert!(verdicts.iter().all(|v| *v == Verdict::Detected(false)));
        }
        writer.join().unwrap();
        assert_eq!(filter.filter_text("added199", None, None), Verdict::Detected(true));
    }

    #[test]
    fn test_from_config() {
        let dir = tempfile::tempdir().unwrap();
        let lexicons = dir.path().join("lexicons");
        std::fs::create_dir(&lexicons).unwrap();
        std::fs::write(lexicons.join("en.bdw"), "bad\n").unwrap();
        std::fs::write(lexicons.join("ru.bdw"), "дурак\n").unwrap();
        let path = dir.path().join("filter.toml");
        std::fs::write(&path, "lexicon_dir = \"lexicons\"\nlanguages = [\"en\"]\nmask_char = \"*\"\n").unwrap();

        let config = FilterConfig::load(&path).unwrap();
        let filter = ProfanityFilter::from_config(&config).unwrap();
        assert_eq!(filter.active_languages(), ["en".parse::<LanguageCode>().unwrap()]);
        assert_eq!(filter.filter("not bad"), Verdict::Redacted("not ***".to_string()));
    }
}
