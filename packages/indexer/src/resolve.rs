//! Containment resolution.
//!
//! Candidates are tested in order of ascending centroid distance to the
//! probe and the first one that contains it wins. Exact distance ties keep
//! list order. Boundary nesting and address resolution both go through
//! [`first_containing`].

use geo::{Centroid, Geometry, MultiPolygon, Point};
use street_index_map::geometry;

use crate::boundary::{Boundary, PrincipalBoundary};

/// Something with a centroid that can be ordered by distance.
pub trait Area {
    fn centroid(&self) -> Point<f64>;
}

impl Area for Boundary {
    fn centroid(&self) -> Point<f64> {
        self.centroid
    }
}

impl Area for PrincipalBoundary {
    fn centroid(&self) -> Point<f64> {
        self.root.centroid
    }
}

/// Candidate indices ordered by ascending distance from `point`.
#[must_use]
pub fn closest_first<T: Area>(candidates: &[T], point: Point<f64>) -> Vec<usize> {
    let mut order: Vec<(usize, f64)> = candidates
        .iter()
        .enumerate()
        .map(|(i, c)| (i, geometry::distance(c.centroid(), point)))
        .collect();
    order.sort_by(|a, b| a.1.total_cmp(&b.1));
    order.into_iter().map(|(i, _)| i).collect()
}

/// Index of the closest candidate for which `contains` holds.
pub fn first_containing<T: Area>(
    candidates: &[T],
    point: Point<f64>,
    contains: impl Fn(&T) -> bool,
) -> Option<usize> {
    closest_first(candidates, point)
        .into_iter()
        .find(|&i| contains(&candidates[i]))
}

/// The geometry being resolved.
#[derive(Debug, Clone)]
pub enum Probe {
    Point(Point<f64>),
    /// An area; every part must lie inside the container.
    Parts {
        centroid: Point<f64>,
        parts: MultiPolygon<f64>,
    },
}

impl Probe {
    /// Areas probe with their polygons, anything else with its centroid.
    #[must_use]
    pub fn from_geometry(geometry: &Geometry<f64>) -> Option<Self> {
        if let Some(parts) = geometry::polygonal(geometry) {
            let centroid = parts.centroid()?;
            return Some(Self::Parts { centroid, parts });
        }
        geometry::centroid(geometry).map(Self::Point)
    }

    #[must_use]
    pub const fn centroid(&self) -> Point<f64> {
        match self {
            Self::Point(point) => *point,
            Self::Parts { centroid, .. } => *centroid,
        }
    }

    #[must_use]
    pub fn inside(&self, container: &MultiPolygon<f64>) -> bool {
        match self {
            Self::Point(point) => geometry::contains_point(container, point),
            Self::Parts { parts, .. } => geometry::contains_parts(container, parts),
        }
    }
}

/// Where a probe landed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// Index into the principal list.
    pub principal: usize,
    /// Full ISO 3166-2 code of the principal subdivision.
    pub code: String,
    /// Child indices from the principal root down to the leaf.
    pub route: Vec<usize>,
    /// `/`-joined names from the root down to the leaf.
    pub path: String,
}

/// Finds the innermost subdivision containing `probe`.
///
/// Returns `None` when no principal subdivision contains it. An area that
/// no principal subdivision contains whole falls back to its centroid. A
/// probe inside a subdivision but outside all of its children resolves to
/// that subdivision.
#[must_use]
pub fn find_leaf_subdivision(principals: &[PrincipalBoundary], probe: &Probe) -> Option<Resolution> {
    let centroid = probe.centroid();
    let Some(principal) = first_containing(principals, centroid, |p| probe.inside(&p.root.shape)) else {
        // Areas cut by a principal border resolve by their centroid.
        return match probe {
            Probe::Parts { .. } => find_leaf_subdivision(principals, &Probe::Point(centroid)),
            Probe::Point(_) => None,
        };
    };

    let mut node = &principals[principal].root;
    let mut route = Vec::new();
    let mut names = vec![node.name.as_str()];
    while let Some(i) = first_containing(&node.children, centroid, |c| probe.inside(&c.shape)) {
        node = &node.children[i];
        route.push(i);
        names.push(node.name.as_str());
    }

    Some(Resolution {
        principal,
        code: principals[principal].code.clone(),
        route,
        path: names.join("/"),
    })
}
