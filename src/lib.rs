//! Lexical profanity filtering that sees through Unicode disguises.
//!
//! Text is folded into a canonical form (compatibility forms, diacritics,
//! case, leetspeak, punctuation insertion, Cyrillic/Latin look-alikes) and
//! each token is matched exactly or by similarity ratio against per-language
//! word lists.
//!
//! ```
//! use std::sync::Arc;
//! use rust_badwords::{Lexicon, Normalizer, ProfanityFilter, Verdict};
//!
//! let normalizer = Arc::new(Normalizer::builtin()?);
//! let mut lexicon = Lexicon::new(normalizer);
//! lexicon.load_source("en", "badword\n")?;
//!
//! let filter = ProfanityFilter::new(lexicon, Some(&["en"]), false)?;
//! assert_eq!(filter.filter_text("B4dw0rd!", None, None), Verdict::Detected(true));
//! assert_eq!(
//!     filter.filter_text("Badword!", None, Some('*')),
//!     Verdict::Redacted("*******!".to_string())
//! );
//! # Ok::<(), rust_badwords::FilterError>(())
//! ```

pub mod config;
pub mod error;
pub mod filter;
pub mod lexicon;
pub mod matcher;
pub mod normalizer;
pub mod tables;

#[cfg(feature = "python")]
mod python;

pub use config::FilterConfig;
pub use error::{FilterError, Result};
pub use filter::{DEFAULT_LANGUAGE, Detection, FilterOptions, ProfanityFilter, Verdict};
pub use lexicon::{LanguageCode, Lexicon, parse_lexicon};
pub use matcher::{MatchOutcome, Threshold, matches, similarity};
pub use normalizer::{Normalizer, Token};
pub use tables::{ConfusableTables, Direction, HomoglyphGroup, TableSources};
