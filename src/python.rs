//! Python extension module.

use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

use pyo3::create_exception;
use pyo3::exceptions::{PyException, PyIOError, PyValueError};
use pyo3::prelude::*;

use crate::error::FilterError;
use crate::filter::{ProfanityFilter, Verdict};
use crate::lexicon::Lexicon;
use crate::normalizer::Normalizer;

create_exception!(rust_badwords, NotSupportedLanguage, PyException, "This language is not supported");

/// Shared normalizer for the module-level `normalize` (built once, reused)
static NORMALIZER: OnceLock<Normalizer> = OnceLock::new();

impl From<FilterError> for PyErr {
    fn from(err: FilterError) -> Self {
        match err {
            FilterError::UnsupportedLanguage(_) => NotSupportedLanguage::new_err(err.to_string()),
            FilterError::Io { .. } => PyIOError::new_err(err.to_string()),
            FilterError::MalformedResource { .. } | FilterError::InvalidInput(_) => PyValueError::new_err(err.to_string()),
        }
    }
}

/// `bool` in detection mode, `str` in redaction mode
#[derive(IntoPyObject)]
enum PyVerdict {
    Detected(bool),
    Redacted(String),
}

impl From<Verdict> for PyVerdict {
    fn from(verdict: Verdict) -> Self {
        match verdict {
            Verdict::Detected(found) => Self::Detected(found),
            Verdict::Redacted(text) => Self::Redacted(text),
        }
    }
}

#[pyclass(name = "ProfanityFilter", frozen)]
struct PyProfanityFilter {
    inner: ProfanityFilter,
}

#[pymethods]
impl PyProfanityFilter {
    #[new]
    #[pyo3(signature = (lexicon_dir, languages=None, all_languages=false))]
    fn new(lexicon_dir: PathBuf, languages: Option<Vec<String>>, all_languages: bool) -> PyResult<Self> {
        let normalizer = Arc::new(Normalizer::builtin()?);
        let lexicon = Lexicon::from_dir(normalizer, &lexicon_dir)?;
        let codes: Option<Vec<&str>> = languages
            .as_ref()
            .map(|langs| langs.iter().map(String::as_str).collect());
        let inner = ProfanityFilter::new(lexicon, codes.as_deref(), all_languages)?;
        Ok(Self { inner })
    }

    /// Add custom words; returns how many were new
    fn add_words(&self, words: Vec<String>) -> usize {
        self.inner.add_words(words)
    }

    /// True/False, or the masked text when `replace_character` is given
    #[pyo3(signature = (text, match_threshold=None, replace_character=None))]
    fn filter_text(&self, text: String, match_threshold: Option<f64>, replace_character: Option<char>) -> PyVerdict {
        self.inner.filter_text(&text, match_threshold, replace_character).into()
    }

    fn get_all_languages(&self) -> Vec<String> {
        self.inner.supported_languages().into_iter().map(|c| c.to_string()).collect()
    }

    fn active_languages(&self) -> Vec<String> {
        self.inner.active_languages().iter().map(|c| c.to_string()).collect()
    }
}

fn builtin_normalizer() -> PyResult<&'static Normalizer> {
    if let Some(normalizer) = NORMALIZER.get() {
        return Ok(normalizer);
    }
    let normalizer = Normalizer::builtin()?;
    Ok(NORMALIZER.get_or_init(|| normalizer))
}

/// Normalize text with the bundled confusable tables
#[pyfunction]
fn normalize(text: String) -> PyResult<String> {
    Ok(builtin_normalizer()?.normalize(&text))
}

#[pymodule]
fn rust_badwords(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(normalize, m)?)?;
    m.add_class::<PyProfanityFilter>()?;
    m.add("NotSupportedLanguage", m.py().get_type::<NotSupportedLanguage>())?;
    Ok(())
}
