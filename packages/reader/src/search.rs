//! Street and house number matching over loaded street tables.

use std::sync::Arc;

use street_index_models::{
    Address, AddressQuery, AddressResult, ElementRef, Interpolation, StreetRecord, StreetTable,
};
use street_index_phonetic::{damerau_levenshtein, expand, phonetic_key};

use crate::principal::Principal;

/// A match before ranking and location.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub result: AddressResult,
    /// Edit distance between the expanded query street and the street.
    pub distance: usize,
    /// Subdivision node the street table belongs to.
    pub node: usize,
    /// Range the number came from, for interpolated matches.
    pub interpolation: Option<Interpolation>,
}

struct Cursor<'a> {
    node: usize,
    ranks: &'a [u64],
    min_numbers: &'a [u32],
    max_numbers: &'a [u32],
    streets: &'a [StreetRecord],
    position: usize,
}

/// An empty `stored` or `wanted` field matches anything.
fn field_matches(stored: &str, wanted: &str) -> bool {
    stored.is_empty()
        || wanted.is_empty()
        || stored.to_lowercase().starts_with(&wanted.to_lowercase())
}

/// Finds every address matching `query` in `tables`, closest street name
/// first.
///
/// Streets are walked in rank order across all tables at once, one street
/// per table in turn, while their rank stays inside the fuzzy window of the
/// query street.
#[must_use]
pub fn match_address(
    principal: &Principal,
    query: &AddressQuery,
    tables: &[(usize, Arc<StreetTable>)],
) -> Vec<Candidate> {
    let language = principal.language;
    let expanded = expand(&query.street, language).full();
    let key = phonetic_key(&expanded, language, true, false);
    let (low, high) = key.window();

    let mut cursors: Vec<Cursor<'_>> = tables
        .iter()
        .filter_map(|(node, table)| {
            let group = table.group(key.bucket)?;
            Some(Cursor {
                node: *node,
                ranks: &group.ranks,
                min_numbers: &group.min_numbers,
                max_numbers: &group.max_numbers,
                streets: &group.streets,
                position: group.ranks.partition_point(|&rank| rank < low),
            })
        })
        .collect();

    let mut candidates = Vec::new();
    loop {
        let mut advanced = false;
        for cursor in &mut cursors {
            let i = cursor.position;
            if i >= cursor.ranks.len() || cursor.ranks[i] > high {
                continue;
            }
            cursor.position += 1;
            advanced = true;

            if !(cursor.min_numbers[i]..=cursor.max_numbers[i]).contains(&query.number) {
                continue;
            }
            let street = &cursor.streets[i];
            let distance = damerau_levenshtein(&expanded, &street.phonetic_name);
            match_street(principal, cursor.node, street, query, distance, &mut candidates);
        }
        if !advanced {
            break;
        }
    }

    candidates.sort_by_key(|c| c.distance);
    candidates
}

fn match_street(
    principal: &Principal,
    node: usize,
    street: &StreetRecord,
    query: &AddressQuery,
    distance: usize,
    out: &mut Vec<Candidate>,
) {
    let subdivision = &principal.node(node).name;
    let start = street.addresses.partition_point(|a| a.number < query.number);
    let exact: Vec<&Address> = street.addresses[start..]
        .iter()
        .take_while(|a| a.number == query.number)
        .collect();

    // Any address with the number hides the interpolations, even when the
    // unit or suffix filter rejects it.
    if !exact.is_empty() {
        let matching = exact.into_iter().filter(|a| {
            field_matches(&a.unit, &query.unit) && field_matches(&a.suffix, &query.suffix)
        });
        out.extend(matching.map(|address| Candidate {
            result: AddressResult {
                element: address.element,
                name: address.name.clone(),
                unit: address.unit.clone(),
                street_number: address.number,
                street_number_suffix: address.suffix.clone(),
                street_name: street.full_name.clone(),
                subdivision: subdivision.clone(),
                principal: principal.code.clone(),
                interpolated: false,
                location: None,
                city: None,
            },
            distance,
            node,
            interpolation: None,
        }));
        return;
    }

    let end = street.interpolations.partition_point(|i| i.start <= query.number);
    out.extend(
        street.interpolations[..end]
            .iter()
            .filter(|range| range.covers(query.number))
            .map(|range| Candidate {
                result: AddressResult {
                    element: ElementRef::way(range.way_id),
                    name: String::new(),
                    unit: query.unit.clone(),
                    street_number: query.number,
                    street_number_suffix: query.suffix.clone(),
                    street_name: street.full_name.clone(),
                    subdivision: subdivision.clone(),
                    principal: principal.code.clone(),
                    interpolated: true,
                    location: None,
                    city: None,
                },
                distance,
                node,
                interpolation: Some(*range),
            }),
    );
}
