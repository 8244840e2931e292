//! Phonex reduction (Lait & Randell), a Soundex/Phonix hybrid.

const fn is_vowel(c: char) -> bool {
    matches!(c, 'A' | 'E' | 'H' | 'I' | 'O' | 'U' | 'W' | 'Y')
}

/// Folds common Latin diacritics to their ASCII base letters.
#[must_use]
pub fn fold_diacritics(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' | 'ā' | 'ă' | 'ą' => out.push('a'),
            'À' | 'Á' | 'Â' | 'Ã' | 'Ä' | 'Å' | 'Ā' | 'Ă' | 'Ą' => out.push('A'),
            'ç' | 'ć' | 'ĉ' | 'ċ' | 'č' => out.push('c'),
            'Ç' | 'Ć' | 'Ĉ' | 'Ċ' | 'Č' => out.push('C'),
            'ď' | 'đ' => out.push('d'),
            'Ď' | 'Đ' => out.push('D'),
            'è' | 'é' | 'ê' | 'ë' | 'ē' | 'ĕ' | 'ė' | 'ę' | 'ě' => out.push('e'),
            'È' | 'É' | 'Ê' | 'Ë' | 'Ē' | 'Ĕ' | 'Ė' | 'Ę' | 'Ě' => out.push('E'),
            'ĝ' | 'ğ' | 'ġ' | 'ģ' => out.push('g'),
            'Ĝ' | 'Ğ' | 'Ġ' | 'Ģ' => out.push('G'),
            'ì' | 'í' | 'î' | 'ï' | 'ĩ' | 'ī' | 'ĭ' | 'į' | 'ı' => out.push('i'),
            'Ì' | 'Í' | 'Î' | 'Ï' | 'Ĩ' | 'Ī' | 'Ĭ' | 'Į' | 'İ' => out.push('I'),
            'ł' | 'ĺ' | 'ļ' | 'ľ' => out.push('l'),
            'Ł' | 'Ĺ' | 'Ļ' | 'Ľ' => out.push('L'),
            'ñ' | 'ń' | 'ņ' | 'ň' => out.push('n'),
            'Ñ' | 'Ń' | 'Ņ' | 'Ň' => out.push('N'),
            'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ø' | 'ō' | 'ŏ' | 'ő' => out.push('o'),
            'Ò' | 'Ó' | 'Ô' | 'Õ' | 'Ö' | 'Ø' | 'Ō' | 'Ŏ' | 'Ő' => out.push('O'),
            'ŕ' | 'ŗ' | 'ř' => out.push('r'),
            'Ŕ' | 'Ŗ' | 'Ř' => out.push('R'),
            'ś' | 'ŝ' | 'ş' | 'š' => out.push('s'),
            'Ś' | 'Ŝ' | 'Ş' | 'Š' => out.push('S'),
            'ţ' | 'ť' => out.push('t'),
            'Ţ' | 'Ť' => out.push('T'),
            'ù' | 'ú' | 'û' | 'ü' | 'ũ' | 'ū' | 'ŭ' | 'ů' | 'ű' | 'ų' => out.push('u'),
            'Ù' | 'Ú' | 'Û' | 'Ü' | 'Ũ' | 'Ū' | 'Ŭ' | 'Ů' | 'Ű' | 'Ų' => out.push('U'),
            'ý' | 'ÿ' => out.push('y'),
            'Ý' | 'Ÿ' => out.push('Y'),
            'ź' | 'ż' | 'ž' => out.push('z'),
            'Ź' | 'Ż' | 'Ž' => out.push('Z'),
            'æ' => out.push_str("ae"),
            'Æ' => out.push_str("AE"),
            'œ' => out.push_str("oe"),
            'Œ' => out.push_str("OE"),
            'ß' => out.push_str("ss"),
            other => out.push(other),
        }
    }
    out
}

/// Reduces a name to its phonex code: one letter followed by digits.
///
/// Returns an empty string when the name has no letters.
#[must_use]
pub fn phonex(name: &str) -> String {
    let mut letters: Vec<char> = fold_diacritics(name)
        .to_ascii_uppercase()
        .chars()
        .filter(char::is_ascii_uppercase)
        .collect();

    while letters.last() == Some(&'S') {
        letters.pop();
    }

    if letters.starts_with(&['K', 'N']) || letters.starts_with(&['W', 'R']) {
        letters.remove(0);
    } else if letters.starts_with(&['P', 'H']) {
        letters.splice(0..2, ['F']);
    }

    if letters.first() == Some(&'H') {
        letters.remove(0);
    }

    let Some(first) = letters.first_mut() else {
        return String::new();
    };
    *first = match *first {
        c if is_vowel(c) => 'A',
        'P' => 'B',
        'V' => 'F',
        'K' | 'Q' => 'C',
        'J' => 'G',
        'Z' => 'S',
        c => c,
    };

    let mut code = String::with_capacity(letters.len());
    code.push(letters[0]);
    let mut last = letters[0];
    let len = letters.len();

    for i in 1..len {
        let letter = letters[i];
        let next = letters.get(i + 1).copied();
        let at_end = i == len - 1;
        let next_is_vowel = next.is_some_and(is_vowel);

        let value = match letter {
            'B' | 'P' | 'F' | 'V' => '1',
            'C' | 'S' | 'K' | 'G' | 'J' | 'Q' | 'X' | 'Z' => '2',
            'D' | 'T' if next != Some('C') => '3',
            'L' if next_is_vowel || at_end => '4',
            'M' | 'N' => {
                if matches!(next, Some('D' | 'G')) {
                    letters[i + 1] = letter;
                }
                '5'
            }
            'R' if next_is_vowel || at_end => '6',
            _ => '0',
        };

        if value != last && value != '0' {
            code.push(value);
            last = value;
        }
    }

    code
}
