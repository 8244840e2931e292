#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Country rule sets loaded from embedded TOML configs.
//!
//! Each `.toml` file in `packages/rules/rules/` is baked into the binary at
//! compile time via [`include_str!`]. A rule set provides the house-number
//! and street-address grammars of a country plus per-subdivision boundary
//! rules (which admin levels count as cities, which language names are
//! written in). Supporting a new country is a matter of adding a TOML file
//! and listing it below.

mod house_number;

use std::collections::{BTreeMap, BTreeSet};

use regex::{Regex, RegexBuilder};
use serde::Deserialize;
use street_index_phonetic::Language;

pub use house_number::{HouseNumber, StreetAddress, fold_fraction_glyphs};

/// Rule configs embedded at compile time.
const RULE_TOMLS: &[(&str, &str)] = &[("CA", include_str!("../rules/ca.toml"))];

/// Errors that can occur while loading a country rule set.
#[derive(Debug, thiserror::Error)]
pub enum RulesError {
    /// No rule set exists for the country.
    #[error("No rules for country: {0}")]
    UnknownCountry(String),

    /// The TOML config is malformed.
    #[error("Failed to parse rules for {country}: {source}")]
    Parse {
        country: String,
        source: toml::de::Error,
    },

    /// A grammar does not compile.
    #[error("Invalid {name} grammar: {source}")]
    Grammar {
        name: &'static str,
        source: regex::Error,
    },
}

/// Boundary rule in effect for one principal subdivision.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BoundaryRule {
    /// Admin levels treated as cities, outermost first.
    pub city_admin_levels: Vec<u8>,
    /// Language street and city names are written in.
    pub default_language: Language,
}

impl BoundaryRule {
    /// Nesting depth of a city admin level, if it is one.
    #[must_use]
    pub fn level_index(&self, admin_level: u8) -> Option<usize> {
        self.city_admin_levels.iter().position(|&l| l == admin_level)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
struct BoundaryRuleOverride {
    city_admin_levels: Option<Vec<u8>>,
    default_language: Option<Language>,
}

#[derive(Debug, Deserialize)]
struct BoundaryRulesDef {
    default: BoundaryRule,
    #[serde(default)]
    overrides: BTreeMap<String, BoundaryRuleOverride>,
}

#[derive(Debug, Deserialize)]
struct CountryRulesDef {
    country: String,
    house_number: String,
    street_address: String,
    boundary_kinds: Vec<String>,
    boundary_rules: BoundaryRulesDef,
}

/// A country's address grammars and boundary rules.
#[derive(Debug, Clone)]
pub struct CountryRules {
    country: String,
    house_number: Regex,
    street_address: Regex,
    boundary_kinds: Vec<String>,
    default_rule: BoundaryRule,
    resolved: BTreeMap<String, BoundaryRule>,
}

impl CountryRules {
    /// Loads the embedded rule set for an ISO 3166-1 alpha-2 code.
    ///
    /// # Errors
    ///
    /// Returns [`RulesError::UnknownCountry`] if no rule set is embedded for
    /// the country, or a parse error if the embedded config is malformed.
    pub fn for_country(country: &str) -> Result<Self, RulesError> {
        let country = country.trim().to_uppercase();
        let (_, toml_str) = RULE_TOMLS
            .iter()
            .find(|(code, _)| *code == country)
            .ok_or_else(|| RulesError::UnknownCountry(country.clone()))?;

        Self::parse(&country, toml_str)
    }

    fn parse(country: &str, toml_str: &str) -> Result<Self, RulesError> {
        let def: CountryRulesDef =
            toml::de::from_str(toml_str).map_err(|source| RulesError::Parse {
                country: country.to_string(),
                source,
            })?;

        let house_number = compile("house number", &def.house_number)?;
        let street_address = compile("street address", &def.street_address)?;

        let default_rule = def.boundary_rules.default;
        let resolved = def
            .boundary_rules
            .overrides
            .into_iter()
            .map(|(code, over)| {
                let rule = BoundaryRule {
                    city_admin_levels: over
                        .city_admin_levels
                        .unwrap_or_else(|| default_rule.city_admin_levels.clone()),
                    default_language: over
                        .default_language
                        .unwrap_or(default_rule.default_language),
                };
                (code, rule)
            })
            .collect();

        log::debug!("Loaded address rules for {}", def.country);

        Ok(Self {
            country: def.country,
            house_number,
            street_address,
            boundary_kinds: def.boundary_kinds,
            default_rule,
            resolved,
        })
    }

    /// ISO 3166-1 alpha-2 code of the country.
    #[must_use]
    pub fn country(&self) -> &str {
        &self.country
    }

    /// Boundary rule for a principal subdivision code such as `CA-QC`.
    /// Override fields replace the default ones; missing fields fall back.
    #[must_use]
    pub fn boundary_rule(&self, principal_code: &str) -> &BoundaryRule {
        self.resolved
            .get(principal_code)
            .unwrap_or(&self.default_rule)
    }

    /// Every admin level that is a city level for some subdivision.
    #[must_use]
    pub fn city_admin_levels(&self) -> BTreeSet<u8> {
        self.default_rule
            .city_admin_levels
            .iter()
            .chain(self.resolved.values().flat_map(|r| &r.city_admin_levels))
            .copied()
            .collect()
    }

    /// Whether the element's `ISO3166-2` tag names a subdivision of this
    /// country. Returns the full code.
    #[must_use]
    pub fn principal_code<'a>(&self, tags: &'a BTreeMap<String, String>) -> Option<&'a str> {
        let code = tags.get("ISO3166-2")?;
        let rest = code.strip_prefix(self.country.as_str())?;
        (rest.starts_with('-') && rest.len() > 1).then_some(code.as_str())
    }

    /// Admin level of a city boundary, if the tags describe one.
    #[must_use]
    pub fn city_level(&self, tags: &BTreeMap<String, String>) -> Option<u8> {
        if tags.get("type").map(String::as_str) != Some("boundary") {
            return None;
        }
        let kind = tags.get("boundary")?;
        if !self.boundary_kinds.iter().any(|k| k == kind) {
            return None;
        }
        let level: u8 = tags.get("admin_level")?.trim().parse().ok()?;
        self.city_admin_levels().contains(&level).then_some(level)
    }

    /// Parses a house number such as `1337`, `1337A` or `1337 1/2`.
    #[must_use]
    pub fn parse_house_number(&self, raw: &str) -> Option<HouseNumber> {
        HouseNumber::parse_with(&self.house_number, raw)
    }

    /// Parses a free-text street address such as `12-1337A Main Street`.
    #[must_use]
    pub fn parse_street_address(&self, raw: &str) -> Option<StreetAddress> {
        StreetAddress::parse_with(&self.street_address, raw)
    }
}

fn compile(name: &'static str, pattern: &str) -> Result<Regex, RulesError> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map_err(|source| RulesError::Grammar { name, source })
}

/// Country codes with an embedded rule set.
#[must_use]
pub fn supported_countries() -> Vec<&'static str> {
    RULE_TOMLS.iter().map(|(code, _)| *code).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ca() -> CountryRules {
        CountryRules::for_country("CA").unwrap()
    }

    fn tags(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn loads_all_embedded_rules() {
        for code in supported_countries() {
            let rules = CountryRules::for_country(code).unwrap();
            assert_eq!(rules.country(), code);
        }
    }

    #[test]
    fn unknown_country_is_an_error() {
        assert!(matches!(
            CountryRules::for_country("ZZ"),
            Err(RulesError::UnknownCountry(code)) if code == "ZZ"
        ));
    }

    #[test]
    fn overrides_merge_over_default() {
        let rules = ca();

        let on = rules.boundary_rule("CA-ON");
        assert_eq!(on.city_admin_levels, vec![6, 8]);
        assert_eq!(on.default_language, Language::En);

        let qc = rules.boundary_rule("CA-QC");
        assert_eq!(qc.city_admin_levels, vec![6, 8]);
        assert_eq!(qc.default_language, Language::Fr);

        let bc = rules.boundary_rule("CA-BC");
        assert_eq!(bc.city_admin_levels, vec![8]);
        assert_eq!(bc.default_language, Language::En);
        assert_eq!(bc.level_index(8), Some(0));
        assert_eq!(bc.level_index(6), None);
    }

    #[test]
    fn matches_principal_codes() {
        let rules = ca();
        assert_eq!(
            rules.principal_code(&tags(&[("ISO3166-2", "CA-ON")])),
            Some("CA-ON")
        );
        assert_eq!(rules.principal_code(&tags(&[("ISO3166-2", "CAT-1")])), None);
        assert_eq!(rules.principal_code(&tags(&[("ISO3166-2", "US-NY")])), None);
        assert_eq!(rules.principal_code(&tags(&[("name", "Ontario")])), None);
    }

    #[test]
    fn matches_city_boundaries() {
        let rules = ca();
        let city = tags(&[
            ("type", "boundary"),
            ("boundary", "administrative"),
            ("admin_level", "8"),
        ]);
        assert_eq!(rules.city_level(&city), Some(8));

        let lands = tags(&[
            ("type", "boundary"),
            ("boundary", "aboriginal_lands"),
            ("admin_level", "6"),
        ]);
        assert_eq!(rules.city_level(&lands), Some(6));

        let province = tags(&[
            ("type", "boundary"),
            ("boundary", "administrative"),
            ("admin_level", "4"),
        ]);
        assert_eq!(rules.city_level(&province), None);

        let park = tags(&[
            ("type", "boundary"),
            ("boundary", "national_park"),
            ("admin_level", "8"),
        ]);
        assert_eq!(rules.city_level(&park), None);
    }
}
