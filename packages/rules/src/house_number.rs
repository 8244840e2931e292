//! House numbers and free-text street addresses.

use std::fmt;

use regex::Regex;

const FRACTION_GLYPHS: &[(char, &str)] = &[
    ('¼', "(1/4)"),
    ('½', "(1/2)"),
    ('¾', "(3/4)"),
    ('⅐', "(1/7)"),
    ('⅑', "(1/9)"),
    ('⅒', "(1/10)"),
    ('⅓', "(1/3)"),
    ('⅔', "(2/3)"),
    ('⅕', "(1/5)"),
    ('⅖', "(2/5)"),
    ('⅗', "(3/5)"),
    ('⅘', "(4/5)"),
    ('⅙', "(1/6)"),
    ('⅚', "(5/6)"),
    ('⅛', "(1/8)"),
    ('⅜', "(3/8)"),
    ('⅝', "(5/8)"),
    ('⅞', "(7/8)"),
];

/// Rewrites vulgar-fraction glyphs (`½`) as `(1/2)`.
#[must_use]
pub fn fold_fraction_glyphs(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match FRACTION_GLYPHS.iter().find(|(glyph, _)| *glyph == c) {
            Some((_, ascii)) => out.push_str(ascii),
            None => out.push(c),
        }
    }
    out
}

/// A civic number with an optional suffix (`A`, `1/2`, `.5`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct HouseNumber {
    pub number: u32,
    /// Uppercase; empty when absent.
    pub suffix: String,
}

impl HouseNumber {
    #[must_use]
    pub fn new(number: u32, suffix: impl Into<String>) -> Self {
        Self {
            number,
            suffix: suffix.into().to_uppercase(),
        }
    }

    pub(crate) fn parse_with(grammar: &Regex, raw: &str) -> Option<Self> {
        let folded = fold_fraction_glyphs(raw);
        let caps = grammar.captures(folded.trim())?;
        let number = caps.name("number")?.as_str().parse().ok()?;
        let suffix = caps.name("suffix").map_or("", |m| m.as_str());
        Some(Self::new(number, suffix))
    }
}

/// Canonical form: `1337`, `1337A`, `1337.5`, `1337 1/2`.
impl fmt::Display for HouseNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.suffix.starts_with(|c: char| c.is_ascii_digit()) {
            write!(f, "{} {}", self.number, self.suffix)
        } else {
            write!(f, "{}{}", self.number, self.suffix)
        }
    }
}

/// A free-text street address split into its parts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreetAddress {
    pub unit: String,
    pub number: HouseNumber,
    pub street: String,
}

impl StreetAddress {
    pub(crate) fn parse_with(grammar: &Regex, raw: &str) -> Option<Self> {
        let folded = fold_fraction_glyphs(raw);
        let caps = grammar.captures(folded.trim())?;
        let number = caps.name("number")?.as_str().parse().ok()?;
        let suffix = caps.name("suffix").map_or("", |m| m.as_str());
        let street = caps.name("street")?.as_str().trim();
        if street.is_empty() {
            return None;
        }

        Some(Self {
            unit: caps
                .name("unit")
                .map_or_else(String::new, |m| m.as_str().to_string()),
            number: HouseNumber::new(number, suffix),
            street: street.to_string(),
        })
    }
}
