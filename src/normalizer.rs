//! Canonicalizes text into comparable tokens.
//!
//! The pipeline runs in a fixed order:
//! 1. compatibility decomposition
//! 2. drop combining marks
//! 3. lowercase
//! 4. confusable substitution (unicode look-alikes, leetspeak)
//! 5. drop everything that is neither alphanumeric nor whitespace
//! 6. split on whitespace runs (collapse + trim), recompose each token
//! 7. Latin -> Cyrillic, then Cyrillic -> Latin
//! 8. homoglyph -> group representative
//!
//! Recomposition waits until punctuation is gone so that `x.y` and `xy`
//! compose the same way. Transliteration ends on the Latin side, so the
//! canonical form of a mixed-script word is plain Latin wherever the tables
//! allow it.
//!
//! Every output character keeps the byte span of the input it came from, so
//! a token can be traced back to the original text for redaction.

use std::collections::BTreeSet;
use std::ops::Range;
use std::sync::Arc;

use unicode_normalization::char::{compose, decompose_compatible, is_combining_mark};

use crate::error::{FilterError, Result};
use crate::tables::{ConfusableTables, Direction, HomoglyphGroups};

#[derive(Debug, Clone, Copy)]
struct Spanned {
    ch: char,
    start: usize,
    end: usize,
}

/// A normalized token and the byte range of the original text it covers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub text: String,
    pub span: Range<usize>,
}

/// Deterministic text canonicalizer
///
/// `normalize(normalize(x)) == normalize(x)` holds for every input; the
/// constructor refuses tables that would break it
#[derive(Debug, Clone)]
pub struct Normalizer {
    tables: Arc<ConfusableTables>,
    /// Homoglyph groups re-expressed in post-transliteration characters
    homoglyphs: HomoglyphGroups,
}

impl Normalizer {
    pub fn new(tables: Arc<ConfusableTables>) -> Result<Self> {
        let mut normalizer = Self {
            tables,
            homoglyphs: HomoglyphGroups::default(),
        };
        normalizer.check_stable_fold()?;
        normalizer.homoglyphs = normalizer.project_homoglyphs();
        Ok(normalizer)
    }

    /// Normalizer over the bundled tables
    pub fn builtin() -> Result<Self> {
        Self::new(Arc::new(ConfusableTables::builtin()?))
    }

    pub fn tables(&self) -> &ConfusableTables {
        &self.tables
    }

    pub fn normalize(&self, text: &str) -> String {
        let tokens: Vec<String> = self.tokens(text).into_iter().map(|t| t.text).collect();
        tokens.join(" ")
    }

    pub fn normalize_bytes(&self, bytes: &[u8]) -> Result<String> {
        Ok(self.normalize(decode(bytes)?))
    }

    /// Normalized tokens in input order, each with its original span
    pub fn tokens(&self, text: &str) -> Vec<Token> {
        self.fold_scripts(text)
            .into_iter()
            .map(|chars| {
                let start = chars.iter().map(|s| s.start).min().unwrap_or(0);
                let end = chars.iter().map(|s| s.end).max().unwrap_or(start);
                let text = chars.iter().map(|s| self.homoglyphs.canonical_of(s.ch)).collect();
                Token {
                    text,
                    span: start..end,
                }
            })
            .collect()
    }

    /// Steps 1 through 7
    fn fold_scripts(&self, text: &str) -> Vec<Vec<Spanned>> {
        let chars = decompose_without_marks(text);
        let chars = lowercase(chars);
        let chars = chars.into_iter().map(|s| Spanned {
            ch: self.tables.canonical_of(s.ch),
            ..s
        });
        let chars = chars.filter(|s| s.ch.is_alphanumeric() || s.ch.is_whitespace());

        let transliteration = self.tables.transliteration();
        split_whitespace(chars)
            .into_iter()
            .map(|token| {
                recompose(token)
                    .into_iter()
                    .map(|s| {
                        let cyrillic = transliteration.transliterate(s.ch, Direction::FromLatin);
                        Spanned {
                            ch: transliteration.transliterate(cyrillic, Direction::ToLatin),
                            ..s
                        }
                    })
                    .collect()
            })
            .collect()
    }

    /// Steps 1 through 7 on a lone character, when they yield exactly one
    fn fold_char(&self, ch: char) -> Option<char> {
        let mut buf = [0u8; 4];
        match self.fold_scripts(ch.encode_utf8(&mut buf)).as_slice() {
            [token] => match token.as_slice() {
                [only] => Some(only.ch),
                _ => None,
            },
            _ => None,
        }
    }

    /// Every table character must fold onto a character that folds to itself,
    /// otherwise a second normalization pass would move it again
    fn check_stable_fold(&self) -> Result<()> {
        for ch in self.tables.characters() {
            if let Some(folded) = self.fold_char(ch) {
                if self.fold_char(folded) != Some(folded) {
                    return Err(FilterError::malformed(
                        "confusable tables",
                        format!("`{ch}` folds to `{folded}`, which does not fold to itself"),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Homoglyph lookup happens after transliteration, so groups are moved
    /// into that alphabet first. Each representative is then a fixed point
    fn project_homoglyphs(&self) -> HomoglyphGroups {
        HomoglyphGroups::from_sets(self.tables.homoglyphs().iter().map(|group| {
            group
                .members()
                .filter_map(|c| self.fold_char(c))
                .collect::<BTreeSet<char>>()
        }))
    }
}

pub(crate) fn decode(bytes: &[u8]) -> Result<&str> {
    std::str::from_utf8(bytes).map_err(|e| FilterError::InvalidInput(format!("text is not valid UTF-8: {e}")))
}

/// Compatibility decomposition with combining marks dropped
fn decompose_without_marks(text: &str) -> Vec<Spanned> {
    let mut out = Vec::with_capacity(text.len());
    for (start, ch) in text.char_indices() {
        let end = start + ch.len_utf8();
        decompose_compatible(ch, |d| {
            if !is_combining_mark(d) {
                out.push(Spanned { ch: d, start, end });
            }
        });
    }
    out
}

/// Canonical composition. With marks gone every character is a starter, so a
/// character can only ever compose with the one right before it
fn recompose(chars: Vec<Spanned>) -> Vec<Spanned> {
    let mut out: Vec<Spanned> = Vec::with_capacity(chars.len());
    for s in chars {
        if let Some(last) = out.last_mut() {
            if let Some(composed) = compose(last.ch, s.ch) {
                last.ch = composed;
                last.end = s.end;
                continue;
            }
        }
        out.push(s);
    }
    out
}

fn lowercase(chars: Vec<Spanned>) -> Vec<Spanned> {
    chars
        .into_iter()
        .flat_map(|s| s.ch.to_lowercase().map(move |ch| Spanned { ch, ..s }))
        .collect()
}

fn split_whitespace<I>(chars: I) -> Vec<Vec<Spanned>>
where
    I: IntoIterator<Item = Spanned>,
{
    let mut tokens = Vec::new();
    let mut current = Vec::new();
    for s in chars {
        if s.ch.is_whitespace() {
            if !current.is_empty() {
                tokens.push(std::mem::take(&mut current));
            }
        } else {
            current.push(s);
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}
