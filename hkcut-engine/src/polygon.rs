//! 多边形集合运算接缝。布尔运算通过 [`PolygonSetOps`] 注入，默认实现基于 `geo`。

use geo::{Area, BooleanOps, Coord, LineString, MultiPolygon, Polygon};
use hkcut_core::document::{Part, Sheet};
use hkcut_core::geometry::{Bounds2D, EPSILON, Point2, Ring};
use serde::{Deserialize, Serialize};

/// 多边形布尔运算。实现方需保证结果环闭合且不自交。
pub trait PolygonSetOps {
    fn union(&self, a: &MultiPolygon<f64>, b: &MultiPolygon<f64>) -> MultiPolygon<f64>;
    fn difference(&self, a: &MultiPolygon<f64>, b: &MultiPolygon<f64>) -> MultiPolygon<f64>;
    fn intersection(&self, a: &MultiPolygon<f64>, b: &MultiPolygon<f64>) -> MultiPolygon<f64>;
}

/// `geo::BooleanOps` 的适配。
#[derive(Debug, Clone, Copy, Default)]
pub struct GeoBoolean;

impl PolygonSetOps for GeoBoolean {
    fn union(&self, a: &MultiPolygon<f64>, b: &MultiPolygon<f64>) -> MultiPolygon<f64> {
        if a.0.is_empty() {
            return b.clone();
        }
        if b.0.is_empty() {
            return a.clone();
        }
        a.union(b)
    }

    fn difference(&self, a: &MultiPolygon<f64>, b: &MultiPolygon<f64>) -> MultiPolygon<f64> {
        if a.0.is_empty() || b.0.is_empty() {
            return a.clone();
        }
        a.difference(b)
    }

    fn intersection(&self, a: &MultiPolygon<f64>, b: &MultiPolygon<f64>) -> MultiPolygon<f64> {
        if a.0.is_empty() || b.0.is_empty() {
            return MultiPolygon::new(Vec::new());
        }
        a.intersection(b)
    }
}

/// 带孔多边形，使用核心几何的 [`Ring`] 表示。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionPolygon {
    pub exterior: Ring,
    pub holes: Vec<Ring>,
}

impl RegionPolygon {
    pub fn area(&self) -> f64 {
        self.exterior.area() - self.holes.iter().map(Ring::area).sum::<f64>()
    }

    /// 点在内部或距边界不超过 ε。
    pub fn covers(&self, point: Point2) -> bool {
        let in_exterior =
            self.exterior.contains(point) || self.exterior.distance_to_boundary(point) <= EPSILON;
        in_exterior
            && self
                .holes
                .iter()
                .all(|hole| !hole.contains(point) || hole.distance_to_boundary(point) <= EPSILON)
    }

    /// 点在内部且距所有边界超过 ε。
    pub fn strictly_contains(&self, point: Point2) -> bool {
        self.exterior.contains(point)
            && self.exterior.distance_to_boundary(point) > EPSILON
            && self
                .holes
                .iter()
                .all(|hole| !hole.contains(point) && hole.distance_to_boundary(point) > EPSILON)
    }

    pub fn rings(&self) -> impl Iterator<Item = &Ring> + '_ {
        std::iter::once(&self.exterior).chain(self.holes.iter())
    }
}

pub fn ring_to_line_string(ring: &Ring) -> LineString<f64> {
    let mut coords: Vec<Coord<f64>> = ring
        .points()
        .iter()
        .map(|point| Coord {
            x: point.x(),
            y: point.y(),
        })
        .collect();
    if let Some(first) = coords.first().copied() {
        coords.push(first);
    }
    LineString::new(coords)
}

fn line_string_to_ring(line: &LineString<f64>) -> Ring {
    Ring::from_points(line.coords().map(|coord| Point2::new(coord.x, coord.y)))
}

pub fn ring_to_multipolygon(ring: &Ring) -> MultiPolygon<f64> {
    MultiPolygon::new(vec![Polygon::new(ring_to_line_string(ring), Vec::new())])
}

pub fn sheet_polygon(sheet: &Sheet) -> MultiPolygon<f64> {
    ring_to_multipolygon(&sheet.ring())
}

/// 零件材料区域：外轮廓并集减去内孔并集。
pub fn part_polygon(part: &Part, ops: &dyn PolygonSetOps) -> MultiPolygon<f64> {
    material(part.outer_rings(), part.hole_rings(), ops)
}

/// 零件材料的包络：圆弧材料一侧取外切折线，真实圆弧全部落在区域内。裁剪分离线时使用。
pub fn part_envelope(part: &Part, ops: &dyn PolygonSetOps) -> MultiPolygon<f64> {
    material(part.enclosing_outer_rings(), part.enclosing_hole_rings(), ops)
}

fn material(
    outer: impl Iterator<Item = Ring>,
    holes: impl Iterator<Item = Ring>,
    ops: &dyn PolygonSetOps,
) -> MultiPolygon<f64> {
    ops.difference(&union_rings(outer, ops), &union_rings(holes, ops))
}

fn union_rings(rings: impl Iterator<Item = Ring>, ops: &dyn PolygonSetOps) -> MultiPolygon<f64> {
    rings
        .map(|ring| ring_to_multipolygon(&ring))
        .fold(MultiPolygon::new(Vec::new()), |acc, next| ops.union(&acc, &next))
}

/// 转换为核心几何表示，丢弃退化环。
pub fn to_region_polygons(shape: &MultiPolygon<f64>) -> Vec<RegionPolygon> {
    shape
        .iter()
        .filter_map(|polygon| {
            let exterior = line_string_to_ring(polygon.exterior());
            if !exterior.is_valid() {
                return None;
            }
            let holes = polygon
                .interiors()
                .iter()
                .map(line_string_to_ring)
                .filter(Ring::is_valid)
                .collect();
            Some(RegionPolygon { exterior, holes })
        })
        .collect()
}

pub fn area(shape: &MultiPolygon<f64>) -> f64 {
    shape.unsigned_area()
}

pub fn bounds_of(polygons: &[RegionPolygon]) -> Bounds2D {
    let mut bounds = Bounds2D::empty();
    for polygon in polygons {
        bounds.include_bounds(&polygon.exterior.bounds());
    }
    bounds
}
