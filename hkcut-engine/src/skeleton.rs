use geo::MultiPolygon;
use hkcut_core::document::{Document, GeometryError, GeometryWarning, PartId};
use hkcut_core::geometry::{Bounds2D, EPSILON, Point2, Ring};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::polygon::{
    self, GeoBoolean, PolygonSetOps, RegionPolygon, part_polygon, sheet_polygon,
    to_region_polygons,
};

/// 余料区域：板料减去全部零件后的多边形集合。计算后不再变化。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkeletonRegion {
    polygons: Vec<RegionPolygon>,
}

impl SkeletonRegion {
    pub fn polygons(&self) -> &[RegionPolygon] {
        &self.polygons
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.polygons.is_empty()
    }

    pub fn area(&self) -> f64 {
        self.polygons.iter().map(RegionPolygon::area).sum()
    }

    /// 点位于余料内或其边界 ε 范围内。
    pub fn covers(&self, point: Point2) -> bool {
        self.polygons.iter().any(|polygon| polygon.covers(point))
    }

    /// 点位于余料内部且远离边界。
    pub fn contains(&self, point: Point2) -> bool {
        self.polygons
            .iter()
            .any(|polygon| polygon.strictly_contains(point))
    }

    pub fn rings(&self) -> impl Iterator<Item = &Ring> + '_ {
        self.polygons.iter().flat_map(RegionPolygon::rings)
    }

    pub fn bounds(&self) -> Bounds2D {
        polygon::bounds_of(&self.polygons)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Skeleton {
    pub region: SkeletonRegion,
    /// 零件重叠等非致命问题。
    pub warnings: Vec<GeometryWarning>,
}

/// 使用默认的 `geo` 布尔运算计算余料。
pub fn compute_skeleton(document: &Document) -> Result<Skeleton, GeometryError> {
    compute_skeleton_with(document, &GeoBoolean)
}

pub fn compute_skeleton_with(
    document: &Document,
    ops: &dyn PolygonSetOps,
) -> Result<Skeleton, GeometryError> {
    let sheet = document.require_sheet()?;
    let sheet_shape = sheet_polygon(sheet);

    let shapes: Vec<(PartId, Bounds2D, MultiPolygon<f64>)> = document
        .parts()
        .iter()
        .filter(|part| part.has_material())
        .map(|part| (part.id, part.bounds(), part_polygon(part, ops)))
        .collect();

    let mut warnings = Vec::new();
    for (i, (first, first_bounds, first_shape)) in shapes.iter().enumerate() {
        for (second, second_bounds, second_shape) in &shapes[i + 1..] {
            if !first_bounds.overlaps(second_bounds, 0.0) {
                continue;
            }
            let area = polygon::area(&ops.intersection(first_shape, second_shape));
            if area > EPSILON * EPSILON {
                warn!(first = %first, second = %second, area, "零件重叠");
                warnings.push(GeometryWarning::PartsOverlap {
                    first: *first,
                    second: *second,
                    area,
                });
            }
        }
    }

    let parts_union = shapes
        .iter()
        .fold(MultiPolygon::new(Vec::new()), |acc, (_, _, shape)| {
            ops.union(&acc, shape)
        });
    let remainder = ops.difference(&sheet_shape, &parts_union);

    let sheet_area = polygon::area(&sheet_shape);
    let union_area = polygon::area(&parts_union);
    let remainder_area = polygon::area(&remainder);
    let tolerance = EPSILON + sheet_area * 1e-9;
    if (sheet_area - union_area - remainder_area).abs() > tolerance {
        return Err(GeometryError::Boolean(format!(
            "skeleton area {remainder_area:.6} does not match sheet {sheet_area:.6} minus parts {union_area:.6}"
        )));
    }

    let region = SkeletonRegion {
        polygons: to_region_polygons(&remainder),
    };
    debug!(
        parts = shapes.len(),
        polygons = region.polygons.len(),
        area = region.area(),
        "余料区域计算完成"
    );
    Ok(Skeleton { region, warnings })
}
