#![allow(clippy::too_many_lines)]
//! English word tables.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::LanguageTables;
use crate::numerals::{self, NumberWords};

const UNITS: [&str; 20] = [
    "zero",
    "one",
    "two",
    "three",
    "four",
    "five",
    "six",
    "seven",
    "eight",
    "nine",
    "ten",
    "eleven",
    "twelve",
    "thirteen",
    "fourteen",
    "fifteen",
    "sixteen",
    "seventeen",
    "eighteen",
    "nineteen",
];

const UNIT_ORDINALS: [&str; 20] = [
    "zeroth",
    "first",
    "second",
    "third",
    "fourth",
    "fifth",
    "sixth",
    "seventh",
    "eighth",
    "ninth",
    "tenth",
    "eleventh",
    "twelfth",
    "thirteenth",
    "fourteenth",
    "fifteenth",
    "sixteenth",
    "seventeenth",
    "eighteenth",
    "nineteenth",
];

const TENS: [&str; 10] = [
    "", "", "twenty", "thirty", "forty", "fifty", "sixty", "seventy", "eighty", "ninety",
];

const TEN_ORDINALS: [&str; 10] = [
    "",
    "",
    "twentieth",
    "thirtieth",
    "fortieth",
    "fiftieth",
    "sixtieth",
    "seventieth",
    "eightieth",
    "ninetieth",
];

static NUMERAL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([0-9]{1,4})(st|nd|rd|th)?").expect("valid regex"));

pub struct English;

impl NumberWords for English {
    const ZERO_JOINER: &'static str = "oh";

    fn cardinal(n: u32) -> String {
        let n = (n % 100) as usize;
        if n < 20 {
            return UNITS[n].to_string();
        }
        match n % 10 {
            0 => TENS[n / 10].to_string(),
            unit => format!("{}-{}", TENS[n / 10], UNITS[unit]),
        }
    }

    fn ordinal(n: u32) -> String {
        let n = (n % 100) as usize;
        if n < 20 {
            return UNIT_ORDINALS[n].to_string();
        }
        match n % 10 {
            0 => TEN_ORDINALS[n / 10].to_string(),
            unit => format!("{}-{}", TENS[n / 10], UNIT_ORDINALS[unit]),
        }
    }

    fn hundreds(head: u32, ordinal: bool) -> String {
        let word = if ordinal { "hundredth" } else { "hundred" };
        format!("{}-{word}", Self::cardinal(head))
    }

    fn thousands(head: u32, ordinal: bool) -> String {
        let word = if ordinal { "thousandth" } else { "thousand" };
        format!("{}-{word}", Self::cardinal(head))
    }
}

pub fn spell_numerals(text: &str) -> String {
    numerals::spell_all::<English>(text, &NUMERAL_RE)
}

pub static TABLES: LazyLock<LanguageTables> = LazyLock::new(|| LanguageTables {
    ampersand: "and",
    names: BTreeMap::from([
        ("mr", "mister"),
        ("mrs", "missus"),
        ("ms", "miss"),
        ("esq", "esquire"),
        ("dr", "doctor"),
        ("st", "saint"),
    ]),
    streets: BTreeMap::from([
        ("aly", "alley"),
        ("ally", "alley"),
        ("arc", "arcade"),
        ("av", "avenue"),
        ("ave", "avenue"),
        ("avn", "avenue"),
        ("avnue", "avenue"),
        ("aut", "autoroute"),
        ("boul", "boulevard"),
        ("boulv", "boulevard"),
        ("blvd", "boulevard"),
        ("brnch", "branch"),
        ("br", "branch"),
        ("cr", "circuit"),
        ("circ", "circle"),
        ("circl", "circle"),
        ("crcl", "circle"),
        ("crcle", "circle"),
        ("cir", "circle"),
        ("cls", "close"),
        ("ct", "court"),
        ("ctr", "centre"),
        ("crsent", "crescent"),
        ("crsnt", "crescent"),
        ("cres", "crescent"),
        ("driv", "drive"),
        ("drv", "drive"),
        ("dr", "drive"),
        ("espl", "esplanade"),
        ("expy", "expressway"),
        ("exten", "extension"),
        ("fwy", "freeway"),
        ("fld", "field"),
        ("gardn", "garden"),
        ("grden", "garden"),
        ("grdn", "garden"),
        ("grnds", "grounds"),
        ("gdn", "garden"),
        ("gdns", "gardens"),
        ("gln", "glen"),
        ("grn", "green"),
        ("grv", "grove"),
        ("grov", "grove"),
        ("hts", "heights"),
        ("highwy", "highway"),
        ("hiway", "highway"),
        ("hiwy", "highway"),
        ("hway", "highway"),
        ("hwy", "highway"),
        ("hghlds", "highlands"),
        ("hl", "hill"),
        ("hls", "hills"),
        ("harbr", "harbour"),
        ("landng", "landing"),
        ("lmts", "limits"),
        ("lkout", "lookout"),
        ("ln", "lane"),
        ("mtn", "mountain"),
        ("orch", "orchard"),
        ("prk", "park"),
        ("parkwy", "parkway"),
        ("pkway", "parkway"),
        ("pky", "parkway"),
        ("pkwy", "parkway"),
        ("pth", "path"),
        ("pthwy", "pathway"),
        ("ptway", "pathway"),
        ("pl", "place"),
        ("pt", "point"),
        ("prvt", "private"),
        ("pvt", "private"),
        ("qy", "quay"),
        ("rd", "road"),
        ("rdpt", "rond-point"),
        ("rdg", "ridge"),
        ("rdge", "ridge"),
        ("rw", "row"),
        ("sdrd", "sideroad"),
        ("sidrd", "sideroad"),
        ("siderd", "sideroad"),
        ("sqr", "square"),
        ("sqre", "square"),
        ("squ", "square"),
        ("sq", "square"),
        ("subdiv", "subdivision"),
        ("str", "street"),
        ("strt", "street"),
        ("st", "street"),
        ("terr", "terrace"),
        ("ter", "terrace"),
        ("tline", "townline"),
        ("trl", "trail"),
        ("trnabt", "turnabout"),
        ("wy", "way"),
    ]),
    directions: BTreeMap::from([
        ("e", "east"),
        ("s", "south"),
        ("w", "west"),
        ("n", "north"),
        ("ne", "northeast"),
        ("nw", "northwest"),
        ("se", "southeast"),
        ("sw", "southwest"),
    ]),
    ignored_prefixes: &["the"],
    prefix_particles: &[],
});
