//! Static confusable data: per-character canonical substitutions (unicode
//! look-alikes plus leetspeak), homoglyph groups, and Cyrillic/Latin
//! transliteration.
//!
//! Tables are immutable once built. Contradictory source data is rejected
//! while loading, never resolved at lookup time.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::fs;
use std::marker::PhantomData;
use std::path::Path;

use serde::Deserialize;
use serde::de::{DeserializeOwned, Deserializer, MapAccess, Visitor};

use crate::error::{FilterError, Result};

/// Bumped whenever the bundled data files change shape or content
pub const TABLES_VERSION: u32 = 1;

pub const UNICODE_MAPPINGS_FILE: &str = "unicode_mappings.json";
pub const HOMOGLYPHS_FILE: &str = "homoglyphs.json";
pub const CHARACTER_FREQUENCY_FILE: &str = "character_frequency.json";
pub const TRANSLITERATION_FILE: &str = "transliteration.json";

/// Raw JSON text of the four tables
#[derive(Debug, Clone, Copy)]
pub struct TableSources<'a> {
    pub unicode_mappings: &'a str,
    pub homoglyphs: &'a str,
    pub character_frequency: &'a str,
    pub transliteration: &'a str,
}

impl TableSources<'static> {
    /// Data bundled with the crate
    pub fn builtin() -> Self {
        Self {
            unicode_mappings: include_str!("../resource/unicode_mappings.json"),
            homoglyphs: include_str!("../resource/homoglyphs.json"),
            character_frequency: include_str!("../resource/character_frequency.json"),
            transliteration: include_str!("../resource/transliteration.json"),
        }
    }
}

// =============================================================================
// Source parsing
// =============================================================================

/// A JSON object read as ordered entries so that a repeated key reaches
/// validation instead of overwriting the earlier one
struct Entries<V>(Vec<(String, V)>);

impl<'de, V: Deserialize<'de>> Deserialize<'de> for Entries<V> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct EntriesVisitor<V>(PhantomData<V>);

        impl<'de, V: Deserialize<'de>> Visitor<'de> for EntriesVisitor<V> {
            type Value = Entries<V>;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a JSON object")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> std::result::Result<Self::Value, A::Error> {
                let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some(entry) = map.next_entry::<String, V>()? {
                    entries.push(entry);
                }
                Ok(Entries(entries))
            }
        }

        deserializer.deserialize_map(EntriesVisitor(PhantomData))
    }
}

#[derive(Deserialize)]
struct TransliterationSource {
    cyrillic_to_latin: Entries<String>,
}

fn parse_json<T: DeserializeOwned>(resource: &str, text: &str) -> Result<T> {
    serde_json::from_str(text).map_err(|e| FilterError::malformed(resource, e.to_string()))
}

fn single_char(resource: &str, s: &str) -> Result<char> {
    let mut chars = s.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Ok(c),
        _ => Err(FilterError::malformed(
            resource,
            format!("`{s}` is not a single character"),
        )),
    }
}

// =============================================================================
// Tables
// =============================================================================

/// Character -> canonical character. Every key has exactly one value
#[derive(Debug, Clone, Default)]
pub struct ConfusableTable {
    map: HashMap<char, char>,
}

impl ConfusableTable {
    fn insert(&mut self, resource: &str, from: char, to: char) -> Result<()> {
        match self.map.insert(from, to) {
            Some(previous) if previous != to => Err(FilterError::malformed(
                resource,
                format!("`{from}` maps to both `{previous}` and `{to}`"),
            )),
            _ => Ok(()),
        }
    }

    /// Canonical replacement, identity when `c` has no entry
    pub fn canonical_of(&self, c: char) -> char {
        self.map.get(&c).copied().unwrap_or(c)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (char, char)> + '_ {
        self.map.iter().map(|(k, v)| (*k, *v))
    }
}

/// Characters treated as interchangeable, with one canonical representative
///
/// The representative is the alphabetic member with the lowest code point
/// (lowest code point overall when no member is alphabetic), so it depends on
/// the group's contents only
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HomoglyphGroup {
    members: BTreeSet<char>,
    canonical: char,
}

impl HomoglyphGroup {
    fn new(members: BTreeSet<char>) -> Option<Self> {
        let canonical = members
            .iter()
            .copied()
            .find(|c| c.is_alphabetic())
            .or_else(|| members.first().copied())?;
        Some(Self { members, canonical })
    }

    pub fn canonical(&self) -> char {
        self.canonical
    }

    pub fn contains(&self, c: char) -> bool {
        self.members.contains(&c)
    }

    pub fn members(&self) -> impl Iterator<Item = char> + '_ {
        self.members.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }
}

/// Disjoint homoglyph groups with a character index
#[derive(Debug, Clone, Default)]
pub struct HomoglyphGroups {
    groups: Vec<HomoglyphGroup>,
    index: HashMap<char, usize>,
}

impl HomoglyphGroups {
    /// Build groups from possibly overlapping sets; overlapping sets merge
    /// into one equivalence class
    pub fn from_sets<I>(sets: I) -> Self
    where
        I: IntoIterator<Item = BTreeSet<char>>,
    {
        let mut merged: Vec<BTreeSet<char>> = Vec::new();
        let mut owner: HashMap<char, usize> = HashMap::new();

        for set in sets {
            let mut hits: BTreeSet<usize> = set.iter().filter_map(|c| owner.get(c).copied()).collect();
            let target = match hits.pop_first() {
                Some(target) => target,
                None => {
                    merged.push(BTreeSet::new());
                    merged.len() - 1
                }
            };
            for other in hits {
                let moved = std::mem::take(&mut merged[other]);
                for c in &moved {
                    owner.insert(*c, target);
                }
                merged[target].extend(moved);
            }
            for c in set {
                owner.insert(c, target);
                merged[target].insert(c);
            }
        }

        let mut groups: Vec<HomoglyphGroup> = merged.into_iter().filter_map(HomoglyphGroup::new).collect();
        groups.sort_by_key(|g| g.canonical);

        let index = groups
            .iter()
            .enumerate()
            .flat_map(|(i, g)| g.members().map(move |c| (c, i)))
            .collect();

        Self { groups, index }
    }

    pub fn group_of(&self, c: char) -> Option<&HomoglyphGroup> {
        self.index.get(&c).map(|&i| &self.groups[i])
    }

    /// Group representative, identity when `c` belongs to no group
    pub fn canonical_of(&self, c: char) -> char {
        self.group_of(c).map_or(c, HomoglyphGroup::canonical)
    }

    pub fn iter(&self) -> impl Iterator<Item = &HomoglyphGroup> {
        self.groups.iter()
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    ToLatin,
    FromLatin,
}

impl Direction {
    pub fn reverse(self) -> Self {
        match self {
            Self::ToLatin => Self::FromLatin,
            Self::FromLatin => Self::ToLatin,
        }
    }
}

/// Bijective Cyrillic <-> Latin letter mapping
///
/// The two alphabets are disjoint, so a character already in the target
/// script passes through unchanged and a round trip never oscillates
#[derive(Debug, Clone, Default)]
pub struct TransliterationTable {
    to_latin: HashMap<char, char>,
    from_latin: HashMap<char, char>,
}

impl TransliterationTable {
    fn from_pairs<I>(resource: &str, pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (char, char)>,
    {
        let mut table = Self::default();
        for (cyrillic, latin) in pairs {
            if let Some(previous) = table.to_latin.insert(cyrillic, latin) {
                if previous != latin {
                    return Err(FilterError::malformed(
                        resource,
                        format!("`{cyrillic}` transliterates to both `{previous}` and `{latin}`"),
                    ));
                }
            }
            if let Some(previous) = table.from_latin.insert(latin, cyrillic) {
                if previous != cyrillic {
                    return Err(FilterError::malformed(
                        resource,
                        format!("`{previous}` and `{cyrillic}` both transliterate to `{latin}`"),
                    ));
                }
            }
        }
        if let Some(c) = table.to_latin.keys().find(|c| table.from_latin.contains_key(c)) {
            return Err(FilterError::malformed(
                resource,
                format!("`{c}` appears on both sides of the transliteration"),
            ));
        }
        Ok(table)
    }

    pub fn transliterate(&self, c: char, direction: Direction) -> char {
        let map = match direction {
            Direction::ToLatin => &self.to_latin,
            Direction::FromLatin => &self.from_latin,
        };
        map.get(&c).copied().unwrap_or(c)
    }

    /// `(cyrillic, latin)` pairs
    pub fn pairs(&self) -> impl Iterator<Item = (char, char)> + '_ {
        self.to_latin.iter().map(|(c, l)| (*c, *l))
    }

    pub fn len(&self) -> usize {
        self.to_latin.len()
    }

    pub fn is_empty(&self) -> bool {
        self.to_latin.is_empty()
    }
}

/// All confusable data used by the normalizer
#[derive(Debug, Clone)]
pub struct ConfusableTables {
    confusables: ConfusableTable,
    homoglyphs: HomoglyphGroups,
    transliteration: TransliterationTable,
}

impl ConfusableTables {
    pub fn builtin() -> Result<Self> {
        Self::from_sources(TableSources::builtin())
    }

    /// Load the four table files from `dir`
    pub fn from_dir(dir: &Path) -> Result<Self> {
        let read = |name: &str| {
            let path = dir.join(name);
            fs::read_to_string(&path).map_err(|e| FilterError::io(path, e))
        };
        let unicode_mappings = read(UNICODE_MAPPINGS_FILE)?;
        let homoglyphs = read(HOMOGLYPHS_FILE)?;
        let character_frequency = read(CHARACTER_FREQUENCY_FILE)?;
        let transliteration = read(TRANSLITERATION_FILE)?;

        Self::from_sources(TableSources {
            unicode_mappings: &unicode_mappings,
            homoglyphs: &homoglyphs,
            character_frequency: &character_frequency,
            transliteration: &transliteration,
        })
    }

    pub fn from_sources(sources: TableSources<'_>) -> Result<Self> {
        let mut confusables = ConfusableTable::default();

        let categories: Entries<Entries<String>> = parse_json(UNICODE_MAPPINGS_FILE, sources.unicode_mappings)?;
        for (category, entries) in categories.0 {
            let resource = format!("{UNICODE_MAPPINGS_FILE}#{category}");
            for (from, to) in entries.0 {
                confusables.insert(&resource, single_char(&resource, &from)?, single_char(&resource, &to)?)?;
            }
        }

        // Leetspeak: each variant stands for its standard character.
        let frequency: Entries<Vec<String>> = parse_json(CHARACTER_FREQUENCY_FILE, sources.character_frequency)?;
        for (standard, variants) in frequency.0 {
            let standard = single_char(CHARACTER_FREQUENCY_FILE, &standard)?;
            for variant in variants {
                let variant = single_char(CHARACTER_FREQUENCY_FILE, &variant)?;
                confusables.insert(CHARACTER_FREQUENCY_FILE, variant, standard)?;
            }
        }

        let homoglyph_source: Entries<Vec<String>> = parse_json(HOMOGLYPHS_FILE, sources.homoglyphs)?;
        let mut sets = Vec::with_capacity(homoglyph_source.0.len());
        for (standard, variants) in homoglyph_source.0 {
            let mut set = BTreeSet::from([single_char(HOMOGLYPHS_FILE, &standard)?]);
            for variant in variants {
                set.insert(single_char(HOMOGLYPHS_FILE, &variant)?);
            }
            sets.push(set);
        }
        let homoglyphs = HomoglyphGroups::from_sets(sets);

        let source: TransliterationSource = parse_json(TRANSLITERATION_FILE, sources.transliteration)?;
        let pairs = source
            .cyrillic_to_latin
            .0
            .iter()
            .map(|(c, l)| Ok((single_char(TRANSLITERATION_FILE, c)?, single_char(TRANSLITERATION_FILE, l)?)))
            .collect::<Result<Vec<_>>>()?;
        let transliteration = TransliterationTable::from_pairs(TRANSLITERATION_FILE, pairs)?;

        tracing::debug!(
            version = TABLES_VERSION,
            confusables = confusables.len(),
            homoglyph_groups = homoglyphs.len(),
            transliterations = transliteration.len(),
            "loaded confusable tables"
        );

        Ok(Self {
            confusables,
            homoglyphs,
            transliteration,
        })
    }

    pub fn canonical_of(&self, c: char) -> char {
        self.confusables.canonical_of(c)
    }

    pub fn homoglyph_group_of(&self, c: char) -> Option<&HomoglyphGroup> {
        self.homoglyphs.group_of(c)
    }

    pub fn transliterate(&self, c: char, direction: Direction) -> char {
        self.transliteration.transliterate(c, direction)
    }

    pub fn confusables(&self) -> &ConfusableTable {
        &self.confusables
    }

    pub fn homoglyphs(&self) -> &HomoglyphGroups {
        &self.homoglyphs
    }

    pub fn transliteration(&self) -> &TransliterationTable {
        &self.transliteration
    }

    /// Every character mentioned anywhere in the tables
    pub(crate) fn characters(&self) -> BTreeSet<char> {
        let mut chars = BTreeSet::new();
        for (from, to) in self.confusables.iter() {
            chars.insert(from);
            chars.insert(to);
        }
        for group in self.homoglyphs.iter() {
            chars.extend(group.members());
        }
        for (cyrillic, latin) in self.transliteration.pairs() {
            chars.insert(cyrillic);
            chars.insert(latin);
        }
        chars
    }
}
