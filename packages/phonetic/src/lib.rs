#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Street and city name expansion and phonetic keys.
//!
//! Names are expanded symmetrically at index time and query time so that
//! "St. Clair Ave" and "saint clair avenue" produce the same phonetic key:
//!
//! 1. Lowercase
//! 2. Replace `&` with the language's conjunction
//! 3. Spell out numerals ("1337" -> "thirteen-thirty-seven")
//! 4. Strip an ignored leading prefix ("the", French "rue de la", ...)
//! 5. Expand abbreviations token by token
//!
//! The expanded name is then reduced with the phonex algorithm and split
//! into a one-letter bucket and a fixed-width numeric rank. Similar names
//! share a bucket and sort next to each other by rank, which lets the
//! reader binary-search a window of candidates.

mod distance;
mod en;
mod fr;
mod numerals;
mod phonex;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

pub use distance::damerau_levenshtein;
pub use phonex::{fold_diacritics, phonex};

/// Number of digits in a phonetic rank.
pub const RANK_WIDTH: u32 = 16;

/// Bucket used for names that reduce to an empty phonex code.
pub const EMPTY_BUCKET: char = '_';

static AMPERSAND_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*&\s*").expect("valid regex"));

/// Error returned when a language tag is not supported.
#[derive(Debug, thiserror::Error)]
#[error("Unsupported language: {0}")]
pub struct UnsupportedLanguage(pub String);

/// Languages with expansion rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    En,
    Fr,
}

impl Language {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::En => "en",
            Self::Fr => "fr",
        }
    }

    fn tables(self) -> &'static LanguageTables {
        match self {
            Self::En => &en::TABLES,
            Self::Fr => &fr::TABLES,
        }
    }

    fn spell_numerals(self, text: &str) -> String {
        match self {
            Self::En => en::spell_numerals(text),
            Self::Fr => fr::spell_numerals(text),
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Language {
    type Err = UnsupportedLanguage;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "en" => Ok(Self::En),
            "fr" => Ok(Self::Fr),
            other => Err(UnsupportedLanguage(other.to_string())),
        }
    }
}

type Abbreviations = BTreeMap<&'static str, &'static str>;

/// Per-language word tables.
pub(crate) struct LanguageTables {
    pub ampersand: &'static str,
    /// Titles, only expanded on the first token ("dr" -> "doctor").
    pub names: Abbreviations,
    pub streets: Abbreviations,
    pub directions: Abbreviations,
    /// Leading words that are removed before keying.
    pub ignored_prefixes: &'static [&'static str],
    /// Particles that may follow an ignored prefix and are removed with it.
    /// Longer particles come first.
    pub prefix_particles: &'static [&'static str],
}

impl LanguageTables {
    fn street_or_direction(&self, token: &str) -> Option<&'static str> {
        self.streets
            .get(token)
            .or_else(|| self.directions.get(token))
            .copied()
    }
}

/// A name split into its ignored prefix and the part used for keying.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpandedName {
    /// Removed prefix including its trailing separator, e.g. `"rue de la "`.
    pub prefix: String,
    pub name: String,
}

impl ExpandedName {
    /// Prefix and name joined back together.
    #[must_use]
    pub fn full(&self) -> String {
        format!("{}{}", self.prefix, self.name)
    }
}

/// Expands a street or city name for keying.
///
/// The result is lowercase, numerals are spelled out and abbreviations
/// are expanded. Any ignored prefix is split off into
/// [`ExpandedName::prefix`].
#[must_use]
pub fn expand(name: &str, language: Language) -> ExpandedName {
    let tables = language.tables();

    let lowered = name.to_lowercase();
    let conjoined = AMPERSAND_RE.replace_all(&lowered, format!(" {} ", tables.ampersand));
    let spelled = language.spell_numerals(&conjoined);
    let (prefix, rest) = split_prefix(&spelled, language);

    let tokens: Vec<&str> = rest
        .split_whitespace()
        .enumerate()
        .map(|(i, token)| {
            let token = token.strip_suffix('.').unwrap_or(token);
            let expanded = if i == 0 {
                tables
                    .names
                    .get(token)
                    .copied()
                    .or_else(|| tables.street_or_direction(token))
            } else {
                tables.street_or_direction(token)
            };
            expanded.unwrap_or(token)
        })
        .collect();

    ExpandedName {
        prefix,
        name: tokens.join(" "),
    }
}

/// Removes an ignored leading prefix (and any particle following it) from
/// an already lowercased name.
#[must_use]
pub fn strip_prefix(name: &str, language: Language) -> ExpandedName {
    let (prefix, name) = split_prefix(name, language);
    ExpandedName { prefix, name }
}

fn split_prefix(text: &str, language: Language) -> (String, String) {
    let tables = language.tables();
    let text = text.split_whitespace().collect::<Vec<_>>().join(" ");

    // The leading word may itself be abbreviated ("ch. de la ..." -> "chemin").
    let candidate = match text.split_once(' ') {
        Some((first, rest)) => {
            let first = first.strip_suffix('.').unwrap_or(first);
            let first = tables.street_or_direction(first).unwrap_or(first);
            format!("{first} {rest}")
        }
        None => text.clone(),
    };

    for prefix in tables.ignored_prefixes {
        let Some(rest) = candidate
            .strip_prefix(prefix)
            .and_then(|rest| rest.strip_prefix(' '))
        else {
            continue;
        };

        let mut removed = (*prefix).to_string();
        let mut remainder = rest;
        for particle in tables.prefix_particles {
            if let Some(after) = strip_particle(rest, particle) {
                removed.push(' ');
                removed.push_str(particle);
                remainder = after;
                break;
            }
        }
        if remainder.trim().is_empty() {
            break;
        }
        if !removed.ends_with('\'') {
            removed.push(' ');
        }

        return (removed, remainder.trim().to_string());
    }

    (String::new(), text)
}

fn strip_particle<'a>(text: &'a str, particle: &str) -> Option<&'a str> {
    let rest = text.strip_prefix(particle)?;
    if particle.ends_with('\'') {
        Some(rest)
    } else {
        rest.strip_prefix(' ')
    }
}

/// Phonetic key of a name: a bucket letter and a fixed-width rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PhoneticKey {
    pub bucket: char,
    pub rank: u64,
}

impl PhoneticKey {
    /// Splits a phonex code into bucket and rank. Digits beyond
    /// [`RANK_WIDTH`] are truncated, shorter codes are zero-padded.
    #[must_use]
    pub fn from_code(code: &str) -> Self {
        let mut chars = code.chars();
        let Some(bucket) = chars.next() else {
            return Self {
                bucket: EMPTY_BUCKET,
                rank: 0,
            };
        };

        let mut rank = 0_u64;
        let mut digits = chars.filter_map(|c| c.to_digit(10));
        for _ in 0..RANK_WIDTH {
            rank = rank * 10 + u64::from(digits.next().unwrap_or(0));
        }

        Self { bucket, rank }
    }

    /// Inclusive rank range considered a fuzzy match for this key.
    #[must_use]
    pub fn window(&self) -> (u64, u64) {
        fuzzy_window(self.rank)
    }
}

impl fmt::Display for PhoneticKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{:0width$}", self.bucket, self.rank, width = RANK_WIDTH as usize)
    }
}

/// Computes the phonetic key of a name.
///
/// `already_expanded` skips [`expand`]; `prefix_stripped` additionally
/// skips prefix removal for an already expanded name.
#[must_use]
pub fn phonetic_key(
    name: &str,
    language: Language,
    already_expanded: bool,
    prefix_stripped: bool,
) -> PhoneticKey {
    let keyed = if !already_expanded {
        expand(name, language).name
    } else if !prefix_stripped {
        strip_prefix(name, language).name
    } else {
        name.to_string()
    };

    PhoneticKey::from_code(&phonex(&keyed))
}

/// Inclusive rank interval `[rank, rank + 10^z - 1]`, where `z` is the
/// number of trailing zero digits of the fixed-width rank.
#[must_use]
pub fn fuzzy_window(rank: u64) -> (u64, u64) {
    let mut zeros = 0;
    let mut rest = rank;
    while zeros < RANK_WIDTH && rest % 10 == 0 {
        rest /= 10;
        zeros += 1;
    }

    (rank, rank.saturating_add(10_u64.pow(zeros) - 1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expands_street_abbreviations() {
        let expanded = expand("Main St", Language::En);
        assert_eq!(expanded.name, "main street");
        assert!(expanded.prefix.is_empty());
    }

    #[test]
    fn expands_title_only_on_first_token() {
        assert_eq!(expand("St. Clair Ave", Language::En).name, "saint clair avenue");
        assert_eq!(expand("Dr Martin St", Language::En).name, "doctor martin street");
        assert_eq!(expand("Lakeshore Dr", Language::En).name, "lakeshore drive");
    }

    #[test]
    fn spells_out_numerals() {
        assert_eq!(expand("1337 Road", Language::En).name, "thirteen-thirty-seven road");
        assert_eq!(expand("1st Ave", Language::En).name, "first avenue");
        assert_eq!(expand("42nd St", Language::En).name, "forty-second street");
    }

    #[test]
    fn replaces_ampersand() {
        assert_eq!(expand("Lewis&Clark Rd", Language::En).name, "lewis and clark road");
        assert_eq!(expand("Rue Pierre & Marie", Language::Fr).name, "pierre et marie");
    }

    #[test]
    fn strips_english_article() {
        let expanded = expand("The Queensway", Language::En);
        assert_eq!(expanded.prefix, "the ");
        assert_eq!(expanded.name, "queensway");
        assert_eq!(expanded.full(), "the queensway");
    }

    #[test]
    fn strips_french_street_type_and_particle() {
        let expanded = expand("Rue de la Montagne", Language::Fr);
        assert_eq!(expanded.prefix, "rue de la ");
        assert_eq!(expanded.name, "montagne");

        let expanded = expand("Rue d'Iberville", Language::Fr);
        assert_eq!(expanded.prefix, "rue d'");
        assert_eq!(expanded.name, "iberville");

        let expanded = expand("Ch. du Lac", Language::Fr);
        assert_eq!(expanded.prefix, "chemin du ");
        assert_eq!(expanded.name, "lac");
    }

    #[test]
    fn keeps_lone_prefix_word() {
        let expanded = expand("Rue Principale", Language::Fr);
        assert_eq!(expanded.name, "principale");

        let expanded = expand("Boulevard", Language::Fr);
        assert!(expanded.prefix.is_empty());
        assert_eq!(expanded.name, "boulevard");
    }

    #[test]
    fn similar_spellings_share_a_key() {
        let a = phonetic_key("Springfield", Language::En, false, false);
        let b = phonetic_key("Springfeld", Language::En, false, false);
        assert_eq!(a, b);
        assert_eq!(a.bucket, 'S');
        assert_eq!(a.rank, 1_651_300_000_000_000);
    }

    #[test]
    fn key_is_stable_across_expansion_modes() {
        let expanded = expand("Main St", Language::En);
        let from_raw = phonetic_key("Main St", Language::En, false, false);
        let from_expanded = phonetic_key(&expanded.full(), Language::En, true, false);
        let from_stripped = phonetic_key(&expanded.name, Language::En, true, true);
        assert_eq!(from_raw, from_expanded);
        assert_eq!(from_raw, from_stripped);
        assert_eq!(from_raw.to_string(), "M5236300000000000");
    }

    #[test]
    fn empty_name_gets_empty_bucket() {
        let key = phonetic_key("", Language::En, false, false);
        assert_eq!(key.bucket, EMPTY_BUCKET);
        assert_eq!(key.rank, 0);
        assert_eq!(key.window(), (0, 9_999_999_999_999_999));
    }

    #[test]
    fn fuzzy_window_widens_with_trailing_zeros() {
        assert_eq!(
            fuzzy_window(1_651_300_000_000_000),
            (1_651_300_000_000_000, 1_651_399_999_999_999)
        );
        assert_eq!(fuzzy_window(1_234_567_890_123_451), (1_234_567_890_123_451, 1_234_567_890_123_451));
    }

    #[test]
    fn key_truncates_long_codes() {
        let key = PhoneticKey::from_code("B12345678901234567");
        assert_eq!(key.rank, 1_234_567_890_123_456);
    }

    #[test]
    fn parses_language_tags() {
        assert_eq!("FR".parse::<Language>().ok(), Some(Language::Fr));
        assert_eq!(" en ".parse::<Language>().ok(), Some(Language::En));
        assert!("de".parse::<Language>().is_err());
    }
}
