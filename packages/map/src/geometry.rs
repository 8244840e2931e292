//! Geometry helpers shared by the indexer and the reader.
//!
//! Containment is tested per part: a multi-part shape is inside a
//! container only when every one of its parts lies inside some part of
//! the container.

use geo::{
    Centroid, Contains, Coord, Distance, Geometry, Haversine, LineString, MultiPolygon, Point,
    Polygon,
};

/// Great-circle distance in meters.
#[must_use]
pub fn distance(a: Point<f64>, b: Point<f64>) -> f64 {
    Haversine.distance(a, b)
}

/// Centroid of any geometry.
#[must_use]
pub fn centroid(geometry: &Geometry<f64>) -> Option<Point<f64>> {
    geometry.centroid()
}

/// The area part of a geometry. Lines and points have none.
#[must_use]
pub fn polygonal(geometry: &Geometry<f64>) -> Option<MultiPolygon<f64>> {
    match geometry {
        Geometry::Polygon(polygon) => Some(MultiPolygon::new(vec![polygon.clone()])),
        Geometry::MultiPolygon(parts) if !parts.0.is_empty() => Some(parts.clone()),
        _ => None,
    }
}

/// The line a geometry runs along: the line itself or a polygon's outer ring.
#[must_use]
pub fn linear(geometry: &Geometry<f64>) -> Option<LineString<f64>> {
    match geometry {
        Geometry::LineString(line) => Some(line.clone()),
        Geometry::Polygon(polygon) => Some(polygon.exterior().clone()),
        _ => None,
    }
}

#[must_use]
pub fn contains_point(container: &MultiPolygon<f64>, point: &Point<f64>) -> bool {
    container.0.iter().any(|part| part.contains(point))
}

/// Whether every part of `shape` lies within some part of `container`.
#[must_use]
pub fn contains_parts(container: &MultiPolygon<f64>, shape: &MultiPolygon<f64>) -> bool {
    !shape.0.is_empty()
        && shape
            .0
            .iter()
            .all(|part| container.0.iter().any(|outer| outer.contains(part)))
}

/// Shape of a way from its node coordinates. Closed ways with at least
/// four nodes are polygons, anything else with two or more is a line.
#[must_use]
pub fn way_shape(coords: Vec<Coord<f64>>) -> Option<Geometry<f64>> {
    match coords.len() {
        0 => None,
        1 => Some(Geometry::Point(Point::from(coords[0]))),
        n if n >= 4 && coords.first() == coords.last() => Some(Geometry::Polygon(Polygon::new(
            LineString::new(coords),
            vec![],
        ))),
        _ => Some(Geometry::LineString(LineString::new(coords))),
    }
}

/// Joins open node chains into closed rings by matching endpoints.
/// Chains that cannot be closed are dropped.
#[must_use]
pub fn join_rings(chains: Vec<Vec<i64>>) -> Vec<Vec<i64>> {
    let mut pending: Vec<Vec<i64>> = chains.into_iter().filter(|c| c.len() >= 2).collect();
    let mut rings = Vec::new();

    while let Some(mut ring) = pending.pop() {
        loop {
            let (Some(&head), Some(&tail)) = (ring.first(), ring.last()) else {
                break;
            };
            if head == tail && ring.len() >= 4 {
                rings.push(ring);
                break;
            }

            let Some(pos) = pending
                .iter()
                .position(|c| c.first() == Some(&tail) || c.last() == Some(&tail))
            else {
                log::trace!("Dropping unclosed ring starting at node {head}");
                break;
            };

            let mut next = pending.swap_remove(pos);
            if next.first() != Some(&tail) {
                next.reverse();
            }
            ring.extend(next.into_iter().skip(1));
        }
    }

    rings
}

/// Builds a multipolygon from outer and inner rings. Each inner ring is
/// attached to the first outer ring that contains it.
#[must_use]
pub fn assemble_multipolygon(
    outers: Vec<LineString<f64>>,
    inners: Vec<LineString<f64>>,
) -> MultiPolygon<f64> {
    let mut shells: Vec<(Polygon<f64>, Vec<LineString<f64>>)> = outers
        .into_iter()
        .map(|ring| (Polygon::new(ring, vec![]), vec![]))
        .collect();

    for hole in inners {
        let Some(probe) = hole.points().next() else {
            continue;
        };
        if let Some((_, holes)) = shells.iter_mut().find(|(shell, _)| shell.contains(&probe)) {
            holes.push(hole);
        }
    }

    MultiPolygon::new(
        shells
            .into_iter()
            .map(|(shell, holes)| Polygon::new(shell.exterior().clone(), holes))
            .collect(),
    )
}

/// Point at `fraction` of the great-circle length of a line.
#[must_use]
pub fn point_along(line: &LineString<f64>, fraction: f64) -> Option<Point<f64>> {
    let points: Vec<Point<f64>> = line.points().collect();
    let first = *points.first()?;

    let lengths: Vec<f64> = points.windows(2).map(|w| distance(w[0], w[1])).collect();
    let total: f64 = lengths.iter().sum();
    if total <= 0.0 {
        return Some(first);
    }

    let target = fraction.clamp(0.0, 1.0) * total;
    let mut walked = 0.0;
    for (pair, length) in points.windows(2).zip(&lengths) {
        if walked + length >= target {
            let t = if *length > 0.0 {
                (target - walked) / length
            } else {
                0.0
            };
            let (a, b) = (pair[0], pair[1]);
            return Some(Point::new(
                (b.x() - a.x()).mul_add(t, a.x()),
                (b.y() - a.y()).mul_add(t, a.y()),
            ));
        }
        walked += length;
    }

    points.last().copied()
}
