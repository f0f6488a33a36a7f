use std::path::PathBuf;

/// Errors surfaced by table loading, lexicon loading and filtering
#[derive(Debug, thiserror::Error)]
pub enum FilterError {
    /// Language code is malformed or has no backing lexicon data
    #[error("This language is not supported: `{0}`")]
    UnsupportedLanguage(String),

    /// A lexicon, mapping table or config file failed to parse or contradicts itself
    #[error("malformed resource `{resource}`: {reason}")]
    MalformedResource { resource: String, reason: String },

    /// Text that cannot be decoded
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl FilterError {
    pub(crate) fn malformed(resource: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedResource {
            resource: resource.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, FilterError>;
