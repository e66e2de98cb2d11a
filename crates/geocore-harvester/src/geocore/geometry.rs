use super::types::Polygon;
use crate::stac::BoundingBox;

/// Round to two decimal places, half away from zero
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Closed five-point ring W,S -> E,S -> E,N -> W,N -> W,S of the rounded box
pub fn to_polygon(bbox: &BoundingBox) -> Polygon {
    let (w, s, e, n) = (
        round2(bbox.west),
        round2(bbox.south),
        round2(bbox.east),
        round2(bbox.north),
    );
    Polygon::new(vec![[w, s], [e, s], [e, n], [w, n], [w, s]])
}

/// `POLYGON((x y, ...))` over the same ring. Integral values keep their
/// trailing `.0`.
pub fn to_wkt(polygon: &Polygon) -> String {
    let points: Vec<String> = polygon
        .ring()
        .iter()
        .map(|[x, y]| format!("{:?} {:?}", x, y))
        .collect();
    format!("POLYGON(({}))", points.join(", "))
}
