//! French word tables.
//!
//! French leads with the street type ("rue de la Montagne"), so the
//! common types are ignored prefixes rather than expansions.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::LanguageTables;
use crate::numerals::{self, NumberWords};

const UNITS: [&str; 20] = [
    "zéro",
    "un",
    "deux",
    "trois",
    "quatre",
    "cinq",
    "six",
    "sept",
    "huit",
    "neuf",
    "dix",
    "onze",
    "douze",
    "treize",
    "quatorze",
    "quinze",
    "seize",
    "dix-sept",
    "dix-huit",
    "dix-neuf",
];

const TENS: [&str; 7] = ["", "", "vingt", "trente", "quarante", "cinquante", "soixante"];

static NUMERAL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([0-9]{1,4})(ère|ème|eme|ere|er|re|e)?").expect("valid regex")
});

fn ordinalize(word: &str) -> String {
    let stem = word
        .strip_suffix("vingts")
        .map_or_else(|| word.to_string(), |s| format!("{s}vingt"));

    if let Some(s) = stem.strip_suffix("cinq") {
        format!("{s}cinquième")
    } else if let Some(s) = stem.strip_suffix("neuf") {
        format!("{s}neuvième")
    } else if let Some(s) = stem.strip_suffix('e') {
        format!("{s}ième")
    } else {
        format!("{stem}ième")
    }
}

pub struct French;

impl NumberWords for French {
    const ZERO_JOINER: &'static str = "et";

    fn cardinal(n: u32) -> String {
        let n = (n % 100) as usize;
        match n {
            0..=19 => UNITS[n].to_string(),
            20..=69 => {
                let tens = TENS[n / 10];
                match n % 10 {
                    0 => tens.to_string(),
                    1 => format!("{tens}-et-un"),
                    unit => format!("{tens}-{}", UNITS[unit]),
                }
            }
            71 => "soixante-et-onze".to_string(),
            70..=79 => format!("soixante-{}", UNITS[n - 60]),
            80 => "quatre-vingts".to_string(),
            _ => format!("quatre-vingt-{}", UNITS[n - 80]),
        }
    }

    fn ordinal(n: u32) -> String {
        ordinalize(&Self::cardinal(n))
    }

    fn standalone_ordinal(n: u32) -> String {
        if n == 1 {
            "première".to_string()
        } else {
            Self::ordinal(n)
        }
    }

    fn hundreds(head: u32, ordinal: bool) -> String {
        let word = match (ordinal, head) {
            (true, _) => "centième",
            (false, 1) => "cent",
            (false, _) => "cents",
        };
        if head == 1 {
            word.to_string()
        } else {
            format!("{}-{word}", Self::cardinal(head))
        }
    }

    fn thousands(head: u32, ordinal: bool) -> String {
        let word = if ordinal { "millième" } else { "mille" };
        if head == 1 {
            word.to_string()
        } else {
            format!("{}-{word}", Self::cardinal(head))
        }
    }
}

pub fn spell_numerals(text: &str) -> String {
    numerals::spell_all::<French>(text, &NUMERAL_RE)
}

pub static TABLES: LazyLock<LanguageTables> = LazyLock::new(|| LanguageTables {
    ampersand: "et",
    names: BTreeMap::from([("prof", "professeur"), ("dr", "docteur"), ("st", "saint"), ("ste", "sainte")]),
    streets: BTreeMap::from([
        ("allee", "allée"),
        ("arc", "arcade"),
        ("av", "avenue"),
        ("ave", "avenue"),
        ("avn", "avenue"),
        ("avnue", "avenue"),
        ("aut", "autoroute"),
        ("boul", "boulevard"),
        ("boulv", "boulevard"),
        ("blvd", "boulevard"),
        ("car", "carré"),
        ("carre", "carré"),
        ("ctr", "centre"),
        ("carref", "carrefour"),
        ("cer", "cercle"),
        ("ch", "chemin"),
        ("cot", "côte"),
        ("cote", "côte"),
        ("crois", "croissant"),
        ("cds", "cul-de-sac"),
        ("éch", "échangeur"),
        ("ech", "échangeur"),
        ("espl", "esplanade"),
        ("ile", "île"),
        ("imp", "impasse"),
        ("montee", "montée"),
        ("mont", "montée"),
        ("pl", "place"),
        ("plat", "plateau"),
        ("pt", "pointe"),
        ("rte", "route"),
        ("sent", "sentier"),
        ("tsse", "terrasse"),
        ("vo", "voie"),
    ]),
    directions: BTreeMap::from([("e", "est"), ("s", "sud"), ("o", "ouest"), ("n", "nord")]),
    ignored_prefixes: &[
        "avenue",
        "autoroute",
        "boulevard",
        "c",
        "carré",
        "carrefour",
        "centre",
        "cercle",
        "chemin",
        "côte",
        "cour",
        "cours",
        "croissant",
        "cul-de-sac",
        "échangeur",
        "esplanade",
        "île",
        "impasse",
        "montée",
        "parc",
        "passage",
        "place",
        "plateau",
        "pointe",
        "quai",
        "rang",
        "route",
        "rue",
        "ruelle",
        "sentier",
        "terrasse",
        "vale",
        "via",
        "village",
        "voie",
    ],
    prefix_particles: &["de la", "du la", "des", "de", "du", "d'"],
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_seventies_to_nineties() {
        assert_eq!(spell_numerals("71"), "soixante-et-onze");
        assert_eq!(spell_numerals("77"), "soixante-dix-sept");
        assert_eq!(spell_numerals("80"), "quatre-vingts");
        assert_eq!(spell_numerals("91"), "quatre-vingt-onze");
    }

    #[test]
    fn reads_numbers_in_pairs() {
        assert_eq!(spell_numerals("1337"), "treize-trente-sept");
        assert_eq!(spell_numerals("1905"), "dix-neuf-et-cinq");
        assert_eq!(spell_numerals("100"), "cent");
        assert_eq!(spell_numerals("1200"), "douze-cents");
        assert_eq!(spell_numerals("2000"), "deux-mille");
    }

    #[test]
    fn reads_ordinals() {
        assert_eq!(spell_numerals("1re"), "première");
        assert_eq!(spell_numerals("1er"), "première");
        assert_eq!(spell_numerals("3e"), "troisième");
        assert_eq!(spell_numerals("5ème"), "cinquième");
        assert_eq!(spell_numerals("80e"), "quatre-vingtième");
        assert_eq!(spell_numerals("99e"), "quatre-vingt-dix-neuvième");
        assert_eq!(spell_numerals("21e"), "vingt-et-unième");
    }
}
