//! Spelling out house-style numerals ("1337" -> "thirteen-thirty-seven").
//!
//! Numbers are read the way street names are spoken: in pairs of two
//! digits, with round hundreds and round thousands read as such.

use regex::{Captures, Regex};

/// Number words of one language.
pub trait NumberWords {
    /// Joins a leading pair to a trailing pair below ten ("nineteen-oh-five").
    const ZERO_JOINER: &'static str;

    /// Cardinal for `0..100`.
    fn cardinal(n: u32) -> String;

    /// Ordinal for `0..100`.
    fn ordinal(n: u32) -> String;

    /// Ordinal for `0..100` when it is the whole number ("1st").
    fn standalone_ordinal(n: u32) -> String {
        Self::ordinal(n)
    }

    /// A leading pair followed by `00` ("twelve-hundred").
    fn hundreds(head: u32, ordinal: bool) -> String;

    /// A single digit followed by `000` ("two-thousand").
    fn thousands(head: u32, ordinal: bool) -> String;
}

/// Reads a run of up to four digits.
pub fn read_number<W: NumberWords>(digits: &str, ordinal: bool) -> String {
    let Ok(value) = digits.parse::<u32>() else {
        return digits.to_string();
    };

    if digits.len() == 4 && value % 1000 == 0 {
        return W::thousands(value / 1000, ordinal);
    }

    if digits.len() <= 2 {
        let mut out = String::new();
        if digits.len() == 2 && digits.starts_with('0') {
            out.push_str(W::ZERO_JOINER);
            out.push('-');
        }
        out.push_str(&if ordinal {
            W::standalone_ordinal(value)
        } else {
            W::cardinal(value)
        });
        return out;
    }

    let head = value / 100;
    let tail = value % 100;
    if tail == 0 {
        return W::hundreds(head, ordinal);
    }

    let mut out = W::cardinal(head);
    out.push('-');
    if tail < 10 {
        out.push_str(W::ZERO_JOINER);
        out.push('-');
    }
    out.push_str(&if ordinal {
        W::ordinal(tail)
    } else {
        W::cardinal(tail)
    });
    out
}

/// Replaces every `<digits><ordinal suffix?>` match of `pattern`.
///
/// `pattern` must capture the digits in group 1 and the optional ordinal
/// suffix in group 2.
pub fn spell_all<W: NumberWords>(text: &str, pattern: &Regex) -> String {
    pattern
        .replace_all(text, |caps: &Captures<'_>| {
            let digits = caps.get(1).map_or("", |m| m.as_str());
            read_number::<W>(digits, caps.get(2).is_some())
        })
        .into_owned()
}
