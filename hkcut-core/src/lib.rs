pub mod geometry {
    use std::f64::consts::TAU;

    use glam::DVec2;
    use serde::{Deserialize, Serialize};

    /// 全局几何容差（英寸）。闭合判断、包含判断与相交判断统一使用该值。
    pub const EPSILON: f64 = 1e-4;
    /// 判定线段长度为零的阈值。
    pub const ZERO_LENGTH: f64 = 1e-9;
    /// 圆弧离散化的固定角度步长（度）。
    pub const ARC_STEP_DEGREES: f64 = 6.0;
    /// 圆弧离散化的最少分段数。
    pub const ARC_MIN_SEGMENTS: usize = 8;

    const ORIENTATION_EPS: f64 = 1e-12;

    /// 二维点，内部以 `glam::DVec2` 表示。单位为英寸。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Point2(pub DVec2);

    impl Point2 {
        #[inline]
        pub fn new(x: f64, y: f64) -> Self {
            Self(DVec2::new(x, y))
        }

        #[inline]
        pub fn from_vec(vec: DVec2) -> Self {
            Self(vec)
        }

        #[inline]
        pub fn x(self) -> f64 {
            self.0.x
        }

        #[inline]
        pub fn y(self) -> f64 {
            self.0.y
        }

        #[inline]
        pub fn translate(self, offset: Vector2) -> Self {
            Self(self.0 + offset.0)
        }

        #[inline]
        pub fn vector_to(self, other: Point2) -> Vector2 {
            Vector2(other.0 - self.0)
        }

        #[inline]
        pub fn distance(self, other: Point2) -> f64 {
            self.0.distance(other.0)
        }

        /// 在给定容差内判断两点重合。
        #[inline]
        pub fn approx_eq(self, other: Point2, tolerance: f64) -> bool {
            self.distance(other) <= tolerance
        }

        #[inline]
        pub fn as_vec2(self) -> DVec2 {
            self.0
        }
    }

    impl From<DVec2> for Point2 {
        fn from(value: DVec2) -> Self {
            Self(value)
        }
    }

    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Vector2(pub DVec2);

    impl Vector2 {
        #[inline]
        pub fn new(x: f64, y: f64) -> Self {
            Self(DVec2::new(x, y))
        }

        #[inline]
        pub fn length(self) -> f64 {
            self.0.length()
        }

        #[inline]
        pub fn x(self) -> f64 {
            self.0.x
        }

        #[inline]
        pub fn y(self) -> f64 {
            self.0.y
        }
    }

    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Bounds2D {
        min: Point2,
        max: Point2,
    }

    impl Bounds2D {
        #[inline]
        pub fn new(min: Point2, max: Point2) -> Self {
            Self { min, max }
        }

        #[inline]
        pub fn empty() -> Self {
            Self {
                min: Point2::new(f64::INFINITY, f64::INFINITY),
                max: Point2::new(f64::NEG_INFINITY, f64::NEG_INFINITY),
            }
        }

        #[inline]
        pub fn is_empty(&self) -> bool {
            self.min.x() > self.max.x() || self.min.y() > self.max.y()
        }

        #[inline]
        pub fn min(&self) -> Point2 {
            self.min
        }

        #[inline]
        pub fn max(&self) -> Point2 {
            self.max
        }

        #[inline]
        pub fn width(&self) -> f64 {
            self.max.x() - self.min.x()
        }

        #[inline]
        pub fn height(&self) -> f64 {
            self.max.y() - self.min.y()
        }

        pub fn include_point(&mut self, point: Point2) {
            if self.is_empty() {
                self.min = point;
                self.max = point;
                return;
            }
            let min_vec = self.min.as_vec2().min(point.as_vec2());
            let max_vec = self.max.as_vec2().max(point.as_vec2());
            self.min = Point2::from_vec(min_vec);
            self.max = Point2::from_vec(max_vec);
        }

        pub fn include_bounds(&mut self, other: &Bounds2D) {
            if other.is_empty() {
                return;
            }
            self.include_point(other.min);
            self.include_point(other.max);
        }

        /// 判断 `other` 是否落在当前范围内（各边放宽 `tolerance`）。
        pub fn contains_bounds(&self, other: &Bounds2D, tolerance: f64) -> bool {
            if other.is_empty() {
                return true;
            }
            other.min.x() >= self.min.x() - tolerance
                && other.min.y() >= self.min.y() - tolerance
                && other.max.x() <= self.max.x() + tolerance
                && other.max.y() <= self.max.y() + tolerance
        }

        /// 两个范围是否重叠（含容差）。
        pub fn overlaps(&self, other: &Bounds2D, tolerance: f64) -> bool {
            if self.is_empty() || other.is_empty() {
                return false;
            }
            self.min.x() <= other.max.x() + tolerance
                && other.min.x() <= self.max.x() + tolerance
                && self.min.y() <= other.max.y() + tolerance
                && other.min.y() <= self.max.y() + tolerance
        }

        #[inline]
        pub fn center(&self) -> Point2 {
            debug_assert!(!self.is_empty());
            let center = (self.min.as_vec2() + self.max.as_vec2()) * 0.5;
            Point2::from_vec(center)
        }
    }

    /// 圆弧旋转方向：`G2` 为顺时针，`G3` 为逆时针。
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    pub enum ArcDirection {
        Clockwise,
        CounterClockwise,
    }

    /// 单条切割段。圆弧保留原始参数以便精确回写。
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(tag = "kind", rename_all = "snake_case")]
    pub enum Segment {
        Line {
            start: Point2,
            end: Point2,
        },
        Arc {
            start: Point2,
            end: Point2,
            center: Point2,
            radius: f64,
            direction: ArcDirection,
        },
    }

    impl Segment {
        #[inline]
        pub fn line(start: Point2, end: Point2) -> Self {
            Segment::Line { start, end }
        }

        /// 以起点与圆心偏移（I/J）构造圆弧，半径取起点到圆心的距离。
        pub fn arc(start: Point2, end: Point2, center_offset: Vector2, direction: ArcDirection) -> Self {
            let center = start.translate(center_offset);
            Segment::Arc {
                start,
                end,
                center,
                radius: start.distance(center),
                direction,
            }
        }

        #[inline]
        pub fn start(&self) -> Point2 {
            match self {
                Segment::Line { start, .. } | Segment::Arc { start, .. } => *start,
            }
        }

        #[inline]
        pub fn end(&self) -> Point2 {
            match self {
                Segment::Line { end, .. } | Segment::Arc { end, .. } => *end,
            }
        }

        /// 圆弧的有向扫掠角（弧度，逆时针为正）。起终点重合时视为整圆。
        pub fn sweep(&self) -> f64 {
            match self {
                Segment::Line { .. } => 0.0,
                Segment::Arc {
                    start,
                    end,
                    center,
                    direction,
                    ..
                } => {
                    let a0 = center.vector_to(*start);
                    let a1 = center.vector_to(*end);
                    let a0 = a0.y().atan2(a0.x());
                    let mut a1 = a1.y().atan2(a1.x());
                    let full_circle = start.approx_eq(*end, ZERO_LENGTH);
                    match direction {
                        ArcDirection::Clockwise => {
                            if full_circle {
                                return -TAU;
                            }
                            while a1 > a0 {
                                a1 -= TAU;
                            }
                        }
                        ArcDirection::CounterClockwise => {
                            if full_circle {
                                return TAU;
                            }
                            while a1 < a0 {
                                a1 += TAU;
                            }
                        }
                    }
                    a1 - a0
                }
            }
        }

        pub fn length(&self) -> f64 {
            match self {
                Segment::Line { start, end } => start.distance(*end),
                Segment::Arc { radius, .. } => radius * self.sweep().abs(),
            }
        }

        #[inline]
        pub fn is_degenerate(&self) -> bool {
            self.length() < ZERO_LENGTH
        }

        /// 返回段的折线近似，包含起点与终点。圆弧按固定角度步长离散，顶点落在圆弧上。
        pub fn points(&self) -> Vec<Point2> {
            self.flatten(false)
        }

        /// 圆弧的外切折线：中间顶点取相邻切线的交点，整条折线位于圆弧背离圆心的一侧。
        /// 直线段与 [`Segment::points`] 相同。
        pub fn outer_points(&self) -> Vec<Point2> {
            self.flatten(true)
        }

        fn flatten(&self, circumscribed: bool) -> Vec<Point2> {
            match self {
                Segment::Line { start, end } => vec![*start, *end],
                Segment::Arc {
                    start,
                    end,
                    center,
                    radius,
                    ..
                } => {
                    let total = self.sweep();
                    let step = ARC_STEP_DEGREES.to_radians();
                    let count =
                        ((total.abs() / step + 1e-9).floor() as usize + 1).max(ARC_MIN_SEGMENTS);
                    let offset = center.vector_to(*start);
                    let a0 = offset.y().atan2(offset.x());
                    let delta = total / count as f64;
                    let at = |angle: f64, r: f64| {
                        Point2::new(center.x() + r * angle.cos(), center.y() + r * angle.sin())
                    };

                    let mut points = Vec::with_capacity(count + 2);
                    points.push(*start);
                    if circumscribed {
                        let r = radius / (delta * 0.5).cos();
                        for k in 0..count {
                            points.push(at(a0 + delta * (k as f64 + 0.5), r));
                        }
                    } else {
                        for k in 1..count {
                            points.push(at(a0 + delta * k as f64, *radius));
                        }
                    }
                    points.push(*end);
                    points
                }
            }
        }

        pub fn bounds(&self) -> Bounds2D {
            let mut bounds = Bounds2D::empty();
            for point in self.points() {
                bounds.include_point(point);
            }
            bounds
        }
    }

    /// 闭合多边形环。内部不重复存储闭合点。
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct Ring {
        points: Vec<Point2>,
    }

    impl Ring {
        /// 由折线点构造环：去除连续重复点及与首点重合的末点。
        pub fn from_points(points: impl IntoIterator<Item = Point2>) -> Self {
            let mut cleaned: Vec<Point2> = Vec::new();
            for point in points {
                match cleaned.last() {
                    Some(last) if last.approx_eq(point, ZERO_LENGTH) => {}
                    _ => cleaned.push(point),
                }
            }
            while cleaned.len() > 1 {
                let first = cleaned[0];
                match cleaned.last() {
                    Some(last) if last.approx_eq(first, EPSILON) => {
                        cleaned.pop();
                    }
                    _ => break,
                }
            }
            Self { points: cleaned }
        }

        /// 轴对齐矩形环（逆时针）。
        pub fn rectangle(min: Point2, max: Point2) -> Self {
            Self {
                points: vec![
                    min,
                    Point2::new(max.x(), min.y()),
                    max,
                    Point2::new(min.x(), max.y()),
                ],
            }
        }

        #[inline]
        pub fn points(&self) -> &[Point2] {
            &self.points
        }

        #[inline]
        pub fn len(&self) -> usize {
            self.points.len()
        }

        #[inline]
        pub fn is_empty(&self) -> bool {
            self.points.is_empty()
        }

        /// 按顺序迭代所有边，包括末点回到首点的闭合边。
        pub fn edges(&self) -> impl Iterator<Item = (Point2, Point2)> + '_ {
            let n = self.points.len();
            (0..n).map(move |i| (self.points[i], self.points[(i + 1) % n]))
        }

        /// 鞋带公式计算的有向面积，逆时针为正。
        pub fn signed_area(&self) -> f64 {
            self.edges()
                .map(|(a, b)| a.x() * b.y() - b.x() * a.y())
                .sum::<f64>()
                * 0.5
        }

        #[inline]
        pub fn area(&self) -> f64 {
            self.signed_area().abs()
        }

        /// 至少三个顶点且面积不可忽略时才构成材料边界。
        pub fn is_valid(&self) -> bool {
            self.points.len() >= 3 && self.area() > EPSILON * EPSILON
        }

        pub fn bounds(&self) -> Bounds2D {
            let mut bounds = Bounds2D::empty();
            for point in &self.points {
                bounds.include_point(*point);
            }
            bounds
        }

        /// 射线法点包含判断；边界上的点结果不确定，需结合 [`Ring::distance_to_boundary`]。
        pub fn contains(&self, point: Point2) -> bool {
            let mut inside = false;
            for (a, b) in self.edges() {
                if (a.y() > point.y()) != (b.y() > point.y()) {
                    let x = a.x() + (point.y() - a.y()) * (b.x() - a.x()) / (b.y() - a.y());
                    if point.x() < x {
                        inside = !inside;
                    }
                }
            }
            inside
        }

        pub fn distance_to_boundary(&self, point: Point2) -> f64 {
            self.edges()
                .map(|(a, b)| point_segment_distance(point, a, b))
                .fold(f64::INFINITY, f64::min)
        }

        /// 查找非相邻边之间的真相交，返回首个冲突的边序号对。
        pub fn self_intersection(&self) -> Option<(usize, usize)> {
            let n = self.points.len();
            if n < 4 {
                return None;
            }
            for i in 0..n {
                let (a1, a2) = (self.points[i], self.points[(i + 1) % n]);
                for j in (i + 2)..n {
                    if i == 0 && j == n - 1 {
                        continue;
                    }
                    let (b1, b2) = (self.points[j], self.points[(j + 1) % n]);
                    if segments_cross(a1, a2, b1, b2) {
                        return Some((i, j));
                    }
                }
            }
            None
        }
    }

    #[inline]
    fn orientation(a: Point2, b: Point2, c: Point2) -> f64 {
        let value = (b.x() - a.x()) * (c.y() - a.y()) - (b.y() - a.y()) * (c.x() - a.x());
        if value.abs() <= ORIENTATION_EPS {
            0.0
        } else {
            value
        }
    }

    /// 两条线段是否真相交（交点位于两者内部，不含端点接触与共线重叠）。
    pub fn segments_cross(a1: Point2, a2: Point2, b1: Point2, b2: Point2) -> bool {
        let o1 = orientation(a1, a2, b1);
        let o2 = orientation(a1, a2, b2);
        let o3 = orientation(b1, b2, a1);
        let o4 = orientation(b1, b2, a2);
        o1 * o2 < 0.0 && o3 * o4 < 0.0
    }

    pub fn point_segment_distance(point: Point2, a: Point2, b: Point2) -> f64 {
        let ab = b.as_vec2() - a.as_vec2();
        let len_sq = ab.length_squared();
        if len_sq <= f64::EPSILON {
            return point.distance(a);
        }
        let t = ((point.as_vec2() - a.as_vec2()).dot(ab) / len_sq).clamp(0.0, 1.0);
        point.as_vec2().distance(a.as_vec2() + ab * t)
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn arc_sweep_follows_direction() {
            let ccw = Segment::arc(
                Point2::new(1.0, 0.0),
                Point2::new(0.0, 1.0),
                Vector2::new(-1.0, 0.0),
                ArcDirection::CounterClockwise,
            );
            assert!((ccw.sweep() - std::f64::consts::FRAC_PI_2).abs() < 1e-12);

            let cw = Segment::arc(
                Point2::new(1.0, 0.0),
                Point2::new(0.0, 1.0),
                Vector2::new(-1.0, 0.0),
                ArcDirection::Clockwise,
            );
            assert!((cw.sweep() + 3.0 * std::f64::consts::FRAC_PI_2).abs() < 1e-12);
            assert!((cw.length() - 3.0 * std::f64::consts::FRAC_PI_2).abs() < 1e-12);
        }

        #[test]
        fn arc_with_coincident_endpoints_is_full_circle() {
            let circle = Segment::arc(
                Point2::new(2.0, 0.0),
                Point2::new(2.0, 0.0),
                Vector2::new(-2.0, 0.0),
                ArcDirection::CounterClockwise,
            );
            assert!(!circle.is_degenerate());
            assert!((circle.length() - TAU * 2.0).abs() < 1e-9);
            let ring = Ring::from_points(circle.points());
            assert!((ring.area() - std::f64::consts::PI * 4.0).abs() < 0.1);
        }

        #[test]
        fn arc_points_pin_endpoints_and_respect_step() {
            let arc = Segment::arc(
                Point2::new(1.0, 0.0),
                Point2::new(-1.0, 0.0),
                Vector2::new(-1.0, 0.0),
                ArcDirection::CounterClockwise,
            );
            let points = arc.points();
            assert_eq!(points.first().copied(), Some(Point2::new(1.0, 0.0)));
            assert_eq!(points.last().copied(), Some(Point2::new(-1.0, 0.0)));
            // 180° / 6° = 30 步，再加一段
            assert_eq!(points.len(), 32);
            for point in &points {
                assert!((point.distance(Point2::new(0.0, 0.0)) - 1.0).abs() < 1e-9);
            }
        }

        #[test]
        fn outer_points_keep_polyline_outside_the_arc() {
            let arc = Segment::arc(
                Point2::new(1.0, 0.0),
                Point2::new(-1.0, 0.0),
                Vector2::new(-1.0, 0.0),
                ArcDirection::Clockwise,
            );
            let outer = arc.outer_points();
            assert_eq!(outer.len(), arc.points().len() + 1);
            assert_eq!(outer.first().copied(), Some(Point2::new(1.0, 0.0)));
            assert_eq!(outer.last().copied(), Some(Point2::new(-1.0, 0.0)));
            let center = Point2::new(0.0, 0.0);
            for pair in outer.windows(2) {
                // 每条边都落在切线上，边上任一点到圆心的距离不小于半径
                for k in 0..=10 {
                    let t = k as f64 / 10.0;
                    let point = Point2::new(
                        pair[0].x() + (pair[1].x() - pair[0].x()) * t,
                        pair[0].y() + (pair[1].y() - pair[0].y()) * t,
                    );
                    assert!(point.distance(center) >= 1.0 - 1e-12, "{point:?}");
                }
            }
            assert!(outer.iter().all(|point| point.y() <= 1e-12));
        }

        #[test]
        fn short_arc_uses_minimum_segment_count() {
            let arc = Segment::arc(
                Point2::new(1.0, 0.0),
                Point2::new(10f64.to_radians().cos(), 10f64.to_radians().sin()),
                Vector2::new(-1.0, 0.0),
                ArcDirection::CounterClockwise,
            );
            assert_eq!(arc.points().len(), ARC_MIN_SEGMENTS + 1);
        }

        #[test]
        fn ring_drops_closing_point_and_computes_area() {
            let ring = Ring::from_points([
                Point2::new(0.0, 0.0),
                Point2::new(4.0, 0.0),
                Point2::new(4.0, 3.0),
                Point2::new(0.0, 3.0),
                Point2::new(0.0, 0.0),
            ]);
            assert_eq!(ring.len(), 4);
            assert!((ring.signed_area() - 12.0).abs() < 1e-12);
            assert!(ring.contains(Point2::new(2.0, 1.0)));
            assert!(!ring.contains(Point2::new(5.0, 1.0)));
            assert!((ring.distance_to_boundary(Point2::new(2.0, 1.0)) - 1.0).abs() < 1e-12);
        }

        #[test]
        fn bow_tie_ring_reports_self_intersection() {
            let bow_tie = Ring::from_points([
                Point2::new(0.0, 0.0),
                Point2::new(2.0, 2.0),
                Point2::new(2.0, 0.0),
                Point2::new(0.0, 2.0),
            ]);
            assert!(bow_tie.self_intersection().is_some());

            let square = Ring::rectangle(Point2::new(0.0, 0.0), Point2::new(1.0, 1.0));
            assert!(square.self_intersection().is_none());
        }

        #[test]
        fn touching_segments_are_not_crossings() {
            assert!(!segments_cross(
                Point2::new(0.0, 0.0),
                Point2::new(2.0, 0.0),
                Point2::new(1.0, 0.0),
                Point2::new(1.0, 1.0),
            ));
            assert!(segments_cross(
                Point2::new(0.0, 0.0),
                Point2::new(2.0, 0.0),
                Point2::new(1.0, -1.0),
                Point2::new(1.0, 1.0),
            ));
        }

        #[test]
        fn bounds_containment_uses_tolerance() {
            let sheet = Bounds2D::new(Point2::new(0.0, 0.0), Point2::new(48.0, 96.0));
            let inside = Bounds2D::new(Point2::new(-0.00005, 0.0), Point2::new(20.0, 40.0));
            let outside = Bounds2D::new(Point2::new(0.0, 0.0), Point2::new(48.5, 40.0));
            assert!(sheet.contains_bounds(&inside, EPSILON));
            assert!(!sheet.contains_bounds(&outside, EPSILON));
        }
    }
}

pub mod document {
    use std::fmt;
    use std::ops::Range;

    use serde::{Deserialize, Serialize};
    use thiserror::Error;

    use crate::geometry::{ArcDirection, Bounds2D, EPSILON, Point2, Ring, Segment};

    /// 零件标识：源文件中 `HKOST` 出现的序号（从 1 开始），重排后保持不变。
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
    pub struct PartId(u32);

    impl PartId {
        #[inline]
        pub fn new(raw: u32) -> Self {
            Self(raw)
        }

        #[inline]
        pub fn get(self) -> u32 {
            self.0
        }
    }

    impl fmt::Display for PartId {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{}", self.0)
        }
    }

    /// `HKOST` 头：零件放置偏移与元数据。`args` 保存全部原始参数。
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct PartHeader {
        pub id: PartId,
        pub offset: Point2,
        pub program_id: Option<u32>,
        pub tech: Option<u32>,
        pub args: Vec<f64>,
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "lowercase")]
    pub enum ContourKind {
        Outer,
        Hole,
    }

    impl ContourKind {
        /// `HKSTR` 第一个参数：0 为外轮廓，其余为内孔。
        pub fn from_code(code: f64) -> Self {
            if code == 0.0 {
                ContourKind::Outer
            } else {
                ContourKind::Hole
            }
        }
    }

    /// `HKSTR` 头：轮廓类型与起点坐标。
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct ContourHeader {
        pub kind: ContourKind,
        pub start: Point2,
        pub args: Vec<f64>,
    }

    /// `HKINI` 头：板料尺寸。
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct SheetHeader {
        pub width: f64,
        pub height: f64,
        pub args: Vec<f64>,
    }

    /// 程序块的结构化视图。变体集合封闭，新增种类时编译器会提示所有匹配点。
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(tag = "block", rename_all = "snake_case")]
    pub enum BlockKind {
        SheetInit(SheetHeader),
        PartStart(PartHeader),
        ContourStart(ContourHeader),
        CutOn,
        CutMove(Segment),
        ContourEnd,
        PartEnd,
        Other { text: String },
    }

    impl BlockKind {
        pub fn name(&self) -> &'static str {
            match self {
                BlockKind::SheetInit(_) => "HKINI",
                BlockKind::PartStart(_) => "HKOST",
                BlockKind::ContourStart(_) => "HKSTR",
                BlockKind::CutOn => "HKCUT",
                BlockKind::CutMove(_) => "MOVE",
                BlockKind::ContourEnd => "HKSTO",
                BlockKind::PartEnd => "HKPED",
                BlockKind::Other { .. } => "OTHER",
            }
        }
    }

    /// 块的原始文本。解析得到的块保存含行尾的原文；引擎注入的块由规范编码器生成。
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub enum BlockText {
        Verbatim(String),
        Synthetic,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct Block {
        pub kind: BlockKind,
        /// 行首的 `N` 序号。
        pub sequence: Option<u32>,
        /// 源文件行号（从 1 开始），合成块为 0。
        pub line: usize,
        pub text: BlockText,
    }

    impl Block {
        pub fn verbatim(kind: BlockKind, sequence: Option<u32>, line: usize, raw: impl Into<String>) -> Self {
            Self {
                kind,
                sequence,
                line,
                text: BlockText::Verbatim(raw.into()),
            }
        }

        pub fn synthetic(kind: BlockKind, sequence: Option<u32>) -> Self {
            Self {
                kind,
                sequence,
                line: 0,
                text: BlockText::Synthetic,
            }
        }

        #[inline]
        pub fn is_synthetic(&self) -> bool {
            matches!(self.text, BlockText::Synthetic)
        }

        #[inline]
        pub fn raw(&self) -> Option<&str> {
            match &self.text {
                BlockText::Verbatim(raw) => Some(raw),
                BlockText::Synthetic => None,
            }
        }
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
    pub enum LineEnding {
        #[default]
        Lf,
        CrLf,
    }

    impl LineEnding {
        #[inline]
        pub fn as_str(self) -> &'static str {
            match self {
                LineEnding::Lf => "\n",
                LineEnding::CrLf => "\r\n",
            }
        }
    }

    /// 解析后的程序：有序块序列，独占所有块。
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct Program {
        pub blocks: Vec<Block>,
        pub line_ending: LineEnding,
    }

    /// 板料矩形，单位英寸。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Sheet {
        pub origin: Point2,
        pub width: f64,
        pub height: f64,
    }

    impl Sheet {
        pub fn new(width: f64, height: f64) -> Self {
            Self {
                origin: Point2::new(0.0, 0.0),
                width,
                height,
            }
        }

        pub fn with_origin(origin: Point2, width: f64, height: f64) -> Self {
            Self {
                origin,
                width,
                height,
            }
        }

        pub fn bounds(&self) -> Bounds2D {
            Bounds2D::new(
                self.origin,
                Point2::new(self.origin.x() + self.width, self.origin.y() + self.height),
            )
        }

        pub fn ring(&self) -> Ring {
            let bounds = self.bounds();
            Ring::rectangle(bounds.min(), bounds.max())
        }

        pub fn is_valid(&self) -> bool {
            self.width > EPSILON && self.height > EPSILON
        }
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct Contour {
        pub kind: ContourKind,
        pub start: Point2,
        pub segments: Vec<Segment>,
        /// 首段起点与末段终点在容差内重合。
        pub closed: bool,
        /// `HKSTR` 所在行。
        pub line: usize,
    }

    impl Contour {
        /// 离散后的折线点，首点为轮廓起点。
        pub fn polyline(&self) -> Vec<Point2> {
            let mut points = vec![self.start];
            for segment in &self.segments {
                points.extend(segment.points().into_iter().skip(1));
            }
            points
        }

        /// 构成材料边界的环；点数不足或面积可忽略时返回 `None`。
        pub fn ring(&self) -> Option<Ring> {
            let ring = Ring::from_points(self.polyline());
            ring.is_valid().then_some(ring)
        }

        /// 包住全部材料的环：凸向非材料一侧的圆弧取外切折线，其余与 [`Contour::ring`] 相同。
        pub fn enclosing_ring(&self) -> Option<Ring> {
            let ring = self.ring()?;
            let material_left = (self.kind == ContourKind::Outer) == (ring.signed_area() > 0.0);
            let mut points = vec![self.start];
            for segment in &self.segments {
                let bulges = match segment {
                    Segment::Arc { direction, .. } => {
                        (*direction == ArcDirection::CounterClockwise) == material_left
                    }
                    Segment::Line { .. } => false,
                };
                let flattened = if bulges {
                    segment.outer_points()
                } else {
                    segment.points()
                };
                points.extend(flattened.into_iter().skip(1));
            }
            let enclosing = Ring::from_points(points);
            Some(if enclosing.is_valid() { enclosing } else { ring })
        }

        pub fn bounds(&self) -> Bounds2D {
            let mut bounds = Bounds2D::empty();
            for point in self.polyline() {
                bounds.include_point(point);
            }
            bounds
        }
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct Part {
        pub id: PartId,
        /// 在切割顺序中的位置（从 0 开始）。
        pub order: usize,
        pub program_id: Option<u32>,
        pub tech: Option<u32>,
        pub offset: Point2,
        pub contours: Vec<Contour>,
        /// 在块序列中的范围 `HKOST..=HKPED`（半开区间）。
        pub span: Range<usize>,
        /// `HKOST` 所在行，合成零件为 0。
        pub line: usize,
    }

    impl Part {
        pub fn bounds(&self) -> Bounds2D {
            let mut bounds = Bounds2D::empty();
            for contour in &self.contours {
                bounds.include_bounds(&contour.bounds());
            }
            bounds
        }

        pub fn outer_rings(&self) -> impl Iterator<Item = Ring> + '_ {
            self.rings_of(ContourKind::Outer)
        }

        pub fn hole_rings(&self) -> impl Iterator<Item = Ring> + '_ {
            self.rings_of(ContourKind::Hole)
        }

        fn rings_of(&self, kind: ContourKind) -> impl Iterator<Item = Ring> + '_ {
            self.contours
                .iter()
                .filter(move |contour| contour.kind == kind)
                .filter_map(Contour::ring)
        }

        /// 外轮廓的包络环，见 [`Contour::enclosing_ring`]。
        pub fn enclosing_outer_rings(&self) -> impl Iterator<Item = Ring> + '_ {
            self.enclosing_rings_of(ContourKind::Outer)
        }

        pub fn enclosing_hole_rings(&self) -> impl Iterator<Item = Ring> + '_ {
            self.enclosing_rings_of(ContourKind::Hole)
        }

        fn enclosing_rings_of(&self, kind: ContourKind) -> impl Iterator<Item = Ring> + '_ {
            self.contours
                .iter()
                .filter(move |contour| contour.kind == kind)
                .filter_map(Contour::enclosing_ring)
        }

        /// 是否带有实际材料（存在有效外轮廓）。分离线零件只有两点轮廓，不构成材料。
        pub fn has_material(&self) -> bool {
            self.outer_rings().next().is_some()
        }
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(tag = "kind", rename_all = "snake_case")]
    pub enum GeometryWarning {
        OpenContour { part: PartId, line: usize },
        PartsOverlap { first: PartId, second: PartId, area: f64 },
    }

    impl fmt::Display for GeometryWarning {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            match self {
                GeometryWarning::OpenContour { part, line } => {
                    write!(f, "part {part}: contour at line {line} is not closed")
                }
                GeometryWarning::PartsOverlap {
                    first,
                    second,
                    area,
                } => write!(f, "parts {first} and {second} overlap ({area:.4} sq in)"),
            }
        }
    }

    #[derive(Debug, Clone, PartialEq, Error)]
    pub enum GeometryError {
        #[error("part {part}: contour at line {line} has no cut segments")]
        EmptyContour { part: PartId, line: usize },
        #[error("part {part}: zero-length segment at line {line}")]
        DegenerateSegment { part: PartId, line: usize },
        #[error("part {part}: contour at line {line} intersects itself")]
        SelfIntersecting { part: PartId, line: usize },
        #[error("part {part} lies outside the sheet")]
        PartOutsideSheet { part: PartId, bounds: Bounds2D },
        #[error("sheet dimensions are missing (no HKINI header and no configured sheet)")]
        MissingSheet,
        #[error("invalid sheet dimensions {width} x {height}")]
        InvalidSheet { width: f64, height: f64 },
        #[error("malformed program at line {line}: {message}")]
        MalformedProgram { line: usize, message: String },
        #[error("polygon operation failed: {0}")]
        Boolean(String),
    }

    /// 文档模型：块序列 + 零件/轮廓/段结构 + 板料。
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct Document {
        blocks: Vec<Block>,
        line_ending: LineEnding,
        parts: Vec<Part>,
        sheet: Option<Sheet>,
        warnings: Vec<GeometryWarning>,
    }

    impl Document {
        /// 将块序列组装为零件结构并校验不变量。`sheet_override` 优先于 `HKINI` 头。
        pub fn build(program: Program, sheet_override: Option<Sheet>) -> Result<Self, GeometryError> {
            let Program {
                blocks,
                line_ending,
            } = program;
            let mut builder = ModelBuilder::default();
            for (index, block) in blocks.iter().enumerate() {
                builder.accept(index, block)?;
            }
            let (parts, header_sheet, warnings) = builder.finish()?;

            let sheet = sheet_override.or(header_sheet);
            if let Some(sheet) = &sheet {
                if !sheet.is_valid() {
                    return Err(GeometryError::InvalidSheet {
                        width: sheet.width,
                        height: sheet.height,
                    });
                }
                let sheet_bounds = sheet.bounds();
                for part in &parts {
                    let bounds = part.bounds();
                    if !sheet_bounds.contains_bounds(&bounds, EPSILON) {
                        return Err(GeometryError::PartOutsideSheet {
                            part: part.id,
                            bounds,
                        });
                    }
                }
            }

            Ok(Self {
                blocks,
                line_ending,
                parts,
                sheet,
                warnings,
            })
        }

        #[inline]
        pub fn blocks(&self) -> &[Block] {
            &self.blocks
        }

        #[inline]
        pub fn line_ending(&self) -> LineEnding {
            self.line_ending
        }

        /// 按切割顺序排列的零件。
        #[inline]
        pub fn parts(&self) -> &[Part] {
            &self.parts
        }

        pub fn part(&self, id: PartId) -> Option<&Part> {
            self.parts.iter().find(|part| part.id == id)
        }

        pub fn part_ids(&self) -> Vec<PartId> {
            self.parts.iter().map(|part| part.id).collect()
        }

        #[inline]
        pub fn sheet(&self) -> Option<&Sheet> {
            self.sheet.as_ref()
        }

        /// 需要板料的运算使用该方法，缺失时返回错误。
        pub fn require_sheet(&self) -> Result<&Sheet, GeometryError> {
            self.sheet.as_ref().ok_or(GeometryError::MissingSheet)
        }

        #[inline]
        pub fn warnings(&self) -> &[GeometryWarning] {
            &self.warnings
        }

        pub fn next_part_id(&self) -> PartId {
            let max = self.parts.iter().map(|part| part.id.get()).max().unwrap_or(0);
            PartId::new(max + 1)
        }

        /// 复制出程序视图，供重排或追加块后重新组装。
        pub fn to_program(&self) -> Program {
            Program {
                blocks: self.blocks.clone(),
                line_ending: self.line_ending,
            }
        }

        pub fn bounds(&self) -> Option<Bounds2D> {
            let mut bounds = Bounds2D::empty();
            for part in &self.parts {
                bounds.include_bounds(&part.bounds());
            }
            (!bounds.is_empty()).then_some(bounds)
        }
    }

    struct OpenPart {
        header: PartHeader,
        start_index: usize,
        line: usize,
        contours: Vec<Contour>,
        contour: Option<Contour>,
    }

    #[derive(Default)]
    struct ModelBuilder {
        parts: Vec<Part>,
        sheet: Option<Sheet>,
        warnings: Vec<GeometryWarning>,
        current: Option<OpenPart>,
    }

    impl ModelBuilder {
        fn accept(&mut self, index: usize, block: &Block) -> Result<(), GeometryError> {
            let line = block.line;
            match &block.kind {
                BlockKind::SheetInit(header) => {
                    self.sheet = Some(Sheet::new(header.width, header.height));
                }
                BlockKind::PartStart(header) => {
                    if let Some(open) = &self.current {
                        return Err(malformed(
                            line,
                            format!("HKOST while part {} is still open", open.header.id),
                        ));
                    }
                    self.current = Some(OpenPart {
                        header: header.clone(),
                        start_index: index,
                        line,
                        contours: Vec::new(),
                        contour: None,
                    });
                }
                BlockKind::ContourStart(header) => {
                    let open = self.open_part(line, "HKSTR")?;
                    if open.contour.is_some() {
                        return Err(malformed(line, "HKSTR while a contour is still open"));
                    }
                    open.contour = Some(Contour {
                        kind: header.kind,
                        start: header.start,
                        segments: Vec::new(),
                        closed: false,
                        line,
                    });
                }
                BlockKind::CutOn => {
                    let open = self.open_part(line, "HKCUT")?;
                    if open.contour.is_none() {
                        return Err(malformed(line, "HKCUT outside of a contour"));
                    }
                }
                BlockKind::CutMove(segment) => {
                    let open = self.open_part(line, "cut move")?;
                    let part_id = open.header.id;
                    let Some(contour) = open.contour.as_mut() else {
                        return Err(malformed(line, "cut move outside of a contour"));
                    };
                    if segment.is_degenerate() {
                        return Err(GeometryError::DegenerateSegment {
                            part: part_id,
                            line,
                        });
                    }
                    contour.segments.push(segment.clone());
                }
                BlockKind::ContourEnd => {
                    let Some(open) = self.current.as_mut() else {
                        return Err(malformed(line, "HKSTO without an open part"));
                    };
                    let part_id = open.header.id;
                    let Some(contour) = open.contour.take() else {
                        return Err(malformed(line, "HKSTO outside of a contour"));
                    };
                    let contour = close_contour(part_id, contour, &mut self.warnings)?;
                    open.contours.push(contour);
                }
                BlockKind::PartEnd => {
                    let Some(open) = self.current.take() else {
                        return Err(malformed(line, "HKPED without an open part"));
                    };
                    if open.contour.is_some() {
                        return Err(malformed(line, "HKPED while a contour is still open"));
                    }
                    let order = self.parts.len();
                    self.parts.push(Part {
                        id: open.header.id,
                        order,
                        program_id: open.header.program_id,
                        tech: open.header.tech,
                        offset: open.header.offset,
                        contours: open.contours,
                        span: open.start_index..index + 1,
                        line: open.line,
                    });
                }
                BlockKind::Other { .. } => {}
            }
            Ok(())
        }

        fn open_part(&mut self, line: usize, what: &str) -> Result<&mut OpenPart, GeometryError> {
            self.current
                .as_mut()
                .ok_or_else(|| malformed(line, format!("{what} without an open part")))
        }

        fn finish(
            self,
        ) -> Result<(Vec<Part>, Option<Sheet>, Vec<GeometryWarning>), GeometryError> {
            if let Some(open) = self.current {
                return Err(malformed(
                    open.line,
                    format!("part {} is never closed", open.header.id),
                ));
            }
            Ok((self.parts, self.sheet, self.warnings))
        }
    }

    fn close_contour(
        part: PartId,
        mut contour: Contour,
        warnings: &mut Vec<GeometryWarning>,
    ) -> Result<Contour, GeometryError> {
        let Some(last) = contour.segments.last() else {
            return Err(GeometryError::EmptyContour {
                part,
                line: contour.line,
            });
        };
        contour.closed = contour.start.approx_eq(last.end(), EPSILON);
        if let Some(ring) = contour.ring() {
            if !contour.closed {
                warnings.push(GeometryWarning::OpenContour {
                    part,
                    line: contour.line,
                });
            }
            if ring.self_intersection().is_some() {
                return Err(GeometryError::SelfIntersecting {
                    part,
                    line: contour.line,
                });
            }
        }
        Ok(contour)
    }

    fn malformed(line: usize, message: impl Into<String>) -> GeometryError {
        GeometryError::MalformedProgram {
            line,
            message: message.into(),
        }
    }

}
