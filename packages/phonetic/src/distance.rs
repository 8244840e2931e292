use std::collections::HashMap;

/// Damerau-Levenshtein edit distance (insertions, deletions,
/// substitutions and transpositions of adjacent characters).
#[must_use]
pub fn damerau_levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let (n, m) = (a.len(), b.len());
    if n == 0 {
        return m;
    }
    if m == 0 {
        return n;
    }

    let mut last_row: HashMap<char, usize> = HashMap::new();
    let max = n + m;
    let width = m + 2;
    let mut d = vec![0_usize; (n + 2) * width];
    let at = |i: usize, j: usize| i * width + j;

    d[at(0, 0)] = max;
    for i in 0..=n {
        d[at(i + 1, 0)] = max;
        d[at(i + 1, 1)] = i;
    }
    for j in 0..=m {
        d[at(0, j + 1)] = max;
        d[at(1, j + 1)] = j;
    }

    for i in 1..=n {
        let mut last_match_col = 0;
        for j in 1..=m {
            let k = last_row.get(&b[j - 1]).copied().unwrap_or(0);
            let l = last_match_col;
            let cost = if a[i - 1] == b[j - 1] {
                last_match_col = j;
                0
            } else {
                1
            };

            let substitution = d[at(i, j)] + cost;
            let insertion = d[at(i + 1, j)] + 1;
            let deletion = d[at(i, j + 1)] + 1;
            let transposition = d[at(k, l)] + (i - k - 1) + 1 + (j - l - 1);

            d[at(i + 1, j + 1)] = substitution
                .min(insertion)
                .min(deletion)
                .min(transposition);
        }
        last_row.insert(a[i - 1], i);
    }

    d[at(n + 1, m + 1)]
}
