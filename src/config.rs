use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{FilterError, Result};
use crate::filter::DEFAULT_LANGUAGE;

/// Filter settings, usually read from a TOML file
///
/// ```toml
/// lexicon_dir = "resource/lexicons"
/// languages = ["en", "ru"]
/// threshold = 0.85
/// mask_char = "*"
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FilterConfig {
    #[serde(default = "FilterConfig::default_lexicon_dir")]
    pub lexicon_dir: PathBuf,
    #[serde(default)]
    pub languages: Vec<String>,
    #[serde(default)]
    pub all_languages: bool,
    /// Used when `languages` is empty and `all_languages` is off
    #[serde(default = "FilterConfig::default_language")]
    pub default_language: String,
    #[serde(default)]
    pub threshold: Option<f64>,
    #[serde(default)]
    pub mask_char: Option<char>,
    /// Directory with replacement confusable tables; bundled tables otherwise
    #[serde(default)]
    pub tables_dir: Option<PathBuf>,
}

impl FilterConfig {
    fn default_lexicon_dir() -> PathBuf {
        PathBuf::from("resource/lexicons")
    }

    fn default_language() -> String {
        DEFAULT_LANGUAGE.to_string()
    }

    /// Read a config file. Relative directories are resolved against the
    /// file's own directory
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| FilterError::io(path, e))?;
        let mut config = Self::parse(&path.display().to_string(), &text)?;
        if let Some(root) = path.parent() {
            config.resolve_paths(root);
        }
        tracing::info!(path = %path.display(), "loaded filter config");
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        Self::parse("filter config", text)
    }

    fn parse(resource: &str, text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| FilterError::malformed(resource, e.to_string()))
    }

    fn resolve_paths(&mut self, root: &Path) {
        self.lexicon_dir = absolutize(root, &self.lexicon_dir);
        self.tables_dir = self.tables_dir.as_deref().map(|dir| absolutize(root, dir));
    }
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            lexicon_dir: Self::default_lexicon_dir(),
            languages: Vec::new(),
            all_languages: false,
            default_language: Self::default_language(),
            threshold: None,
            mask_char: None,
            tables_dir: None,
        }
    }
}

fn absolutize(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}
