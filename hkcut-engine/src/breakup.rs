//! 分离线生成：在余料上布置等距的水平/竖直切割线，裁剪到零件之外后作为合成零件追加。

use std::fmt;

use hkcut_core::document::{
    Block, BlockKind, ContourHeader, ContourKind, Document, GeometryError, PartHeader, Program,
};
use hkcut_core::geometry::{Point2, Ring, Segment};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::polygon::{GeoBoolean, RegionPolygon, part_envelope, to_region_polygons};
use crate::skeleton::Skeleton;

/// 输出坐标网格（4 位小数）。
const GRID: f64 = 1e4;
/// 交点参数去重容差。
const BREAK_MERGE: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakupParams {
    pub horizontal_count: usize,
    pub vertical_count: usize,
    pub tech_code: u32,
    pub program_id: u32,
    pub sequence_start: u32,
    pub sequence_step: u32,
}

impl Default for BreakupParams {
    fn default() -> Self {
        Self {
            horizontal_count: 3,
            vertical_count: 2,
            tech_code: 99,
            program_id: 990001,
            sequence_start: 900000,
            sequence_step: 10,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    Horizontal,
    Vertical,
}

impl Orientation {
    /// 线上参数 `t` 对应的点；水平线 `t` 为 X，竖直线 `t` 为 Y。
    fn point(self, coordinate: f64, t: f64) -> Point2 {
        match self {
            Orientation::Horizontal => Point2::new(t, coordinate),
            Orientation::Vertical => Point2::new(coordinate, t),
        }
    }

    /// 沿线方向与垂直方向的分量。
    fn split(self, point: Point2) -> (f64, f64) {
        match self {
            Orientation::Horizontal => (point.x(), point.y()),
            Orientation::Vertical => (point.y(), point.x()),
        }
    }

    fn axis(self) -> char {
        match self {
            Orientation::Horizontal => 'y',
            Orientation::Vertical => 'x',
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BreakupSegment {
    pub start: Point2,
    pub end: Point2,
}

impl BreakupSegment {
    pub fn length(&self) -> f64 {
        self.start.distance(self.end)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakupLine {
    pub orientation: Orientation,
    /// 水平线的 Y 或竖直线的 X。
    pub coordinate: f64,
    pub segments: Vec<BreakupSegment>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BreakupWarning {
    /// 整条线都落在零件内或余料之外。
    NoSkeleton {
        orientation: Orientation,
        coordinate: f64,
    },
    /// 量化到输出网格后长度为零的区间。
    DegenerateSegment {
        orientation: Orientation,
        coordinate: f64,
        from: f64,
        to: f64,
    },
}

impl fmt::Display for BreakupWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BreakupWarning::NoSkeleton {
                orientation,
                coordinate,
            } => write!(
                f,
                "breakup line {}={coordinate:.4} has no skeleton to cut",
                orientation.axis()
            ),
            BreakupWarning::DegenerateSegment {
                orientation,
                coordinate,
                from,
                to,
            } => write!(
                f,
                "breakup line {}={coordinate:.4}: dropped sub-grid segment [{from:.6}, {to:.6}]",
                orientation.axis()
            ),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BreakupPlan {
    pub lines: Vec<BreakupLine>,
    pub warnings: Vec<BreakupWarning>,
}

impl BreakupPlan {
    /// 按输出顺序（先水平线后竖直线）遍历所有保留的线段。
    pub fn segments(&self) -> impl Iterator<Item = &BreakupSegment> + '_ {
        self.lines.iter().flat_map(|line| line.segments.iter())
    }

    pub fn segment_count(&self) -> usize {
        self.lines.iter().map(|line| line.segments.len()).sum()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BreakupOutcome {
    pub document: Document,
    pub plan: BreakupPlan,
}

/// `count` 条等距线在 `[min, max]` 上的位置：`min + (max - min) * k / (count + 1)`。
pub fn line_positions(min: f64, max: f64, count: usize) -> Vec<f64> {
    let divisions = (count + 1) as f64;
    (1..=count)
        .map(|k| min + (max - min) * k as f64 / divisions)
        .collect()
}

/// 裁剪用的障碍信息：余料环、零件环与零件材料区域。
struct ClipContext<'a> {
    skeleton: &'a Skeleton,
    parts: Vec<RegionPolygon>,
}

impl ClipContext<'_> {
    fn rings(&self) -> impl Iterator<Item = &Ring> + '_ {
        self.skeleton
            .region
            .rings()
            .chain(self.parts.iter().flat_map(RegionPolygon::rings))
    }

    fn keeps(&self, point: Point2) -> bool {
        self.skeleton.region.covers(point)
            && !self.parts.iter().any(|part| part.strictly_contains(point))
    }
}

/// 计算分离线方案，不修改文档。
pub fn plan_breakup(
    document: &Document,
    skeleton: &Skeleton,
    params: &BreakupParams,
) -> Result<BreakupPlan, GeometryError> {
    let sheet = document.require_sheet()?;
    let bounds = sheet.bounds();
    let ops = GeoBoolean;
    let context = ClipContext {
        skeleton,
        parts: document
            .parts()
            .iter()
            .filter(|part| part.has_material())
            .flat_map(|part| to_region_polygons(&part_envelope(part, &ops)))
            .collect(),
    };

    let (min, max) = (bounds.min(), bounds.max());
    let mut plan = BreakupPlan::default();
    for y in line_positions(min.y(), max.y(), params.horizontal_count) {
        clip_line(&context, Orientation::Horizontal, y, min.x(), max.x(), &mut plan);
    }
    for x in line_positions(min.x(), max.x(), params.vertical_count) {
        clip_line(&context, Orientation::Vertical, x, min.y(), max.y(), &mut plan);
    }

    for warning in &plan.warnings {
        warn!(%warning, "分离线告警");
    }
    debug!(
        lines = plan.lines.len(),
        segments = plan.segment_count(),
        "分离线方案完成"
    );
    Ok(plan)
}

fn clip_line(
    context: &ClipContext<'_>,
    orientation: Orientation,
    coordinate: f64,
    lo: f64,
    hi: f64,
    plan: &mut BreakupPlan,
) {
    // 线位置先落到输出网格，保证导出坐标即为裁剪时使用的坐标
    let coordinate = round_to_grid(coordinate);
    let mut breaks = vec![lo, hi];
    for ring in context.rings() {
        for (a, b) in ring.edges() {
            crossings(orientation, coordinate, a, b, &mut breaks);
        }
    }
    breaks.retain(|t| *t >= lo && *t <= hi);
    breaks.sort_by(f64::total_cmp);
    breaks.dedup_by(|later, earlier| (*later - *earlier).abs() <= BREAK_MERGE);

    let mut kept: Vec<(f64, f64)> = Vec::new();
    for window in breaks.windows(2) {
        let (t0, t1) = (window[0], window[1]);
        if t1 - t0 <= BREAK_MERGE {
            continue;
        }
        let mid = orientation.point(coordinate, (t0 + t1) * 0.5);
        if !context.keeps(mid) {
            continue;
        }
        match kept.last_mut() {
            Some(last) if (last.1 - t0).abs() <= BREAK_MERGE => last.1 = t1,
            _ => kept.push((t0, t1)),
        }
    }

    let mut segments = Vec::new();
    for (from, to) in kept {
        let start = ceil_to_grid(from);
        let end = floor_to_grid(to);
        if end - start < 0.5 / GRID {
            plan.warnings.push(BreakupWarning::DegenerateSegment {
                orientation,
                coordinate,
                from,
                to,
            });
            continue;
        }
        segments.push(BreakupSegment {
            start: orientation.point(coordinate, start),
            end: orientation.point(coordinate, end),
        });
    }

    if segments.is_empty() {
        plan.warnings.push(BreakupWarning::NoSkeleton {
            orientation,
            coordinate,
        });
    }
    plan.lines.push(BreakupLine {
        orientation,
        coordinate,
        segments,
    });
}

/// 边 `a→b` 与线的交点参数。与线重合的边贡献两个端点。
fn crossings(orientation: Orientation, coordinate: f64, a: Point2, b: Point2, out: &mut Vec<f64>) {
    let (ta, sa) = orientation.split(a);
    let (tb, sb) = orientation.split(b);
    let da = sa - coordinate;
    let db = sb - coordinate;
    if da.abs() <= BREAK_MERGE && db.abs() <= BREAK_MERGE {
        out.push(ta);
        out.push(tb);
        return;
    }
    if da * db <= 0.0 {
        let t = ta + (tb - ta) * (da / (da - db));
        out.push(t);
    }
}

fn round_to_grid(value: f64) -> f64 {
    (value * GRID).round() / GRID
}

// 加 0.0 把 -0.0 归一为 0.0
fn ceil_to_grid(value: f64) -> f64 {
    (value * GRID - 1e-6).ceil() / GRID + 0.0
}

fn floor_to_grid(value: f64) -> f64 {
    (value * GRID + 1e-6).floor() / GRID + 0.0
}

/// 生成分离线并作为合成零件追加到最后一个零件之后。没有可切线段时文档保持不变。
pub fn generate_breakup(
    document: &Document,
    skeleton: &Skeleton,
    params: &BreakupParams,
) -> Result<BreakupOutcome, GeometryError> {
    let plan = plan_breakup(document, skeleton, params)?;
    if plan.segment_count() == 0 {
        warn!("没有可用的分离线段，文档未修改");
        return Ok(BreakupOutcome {
            document: document.clone(),
            plan,
        });
    }

    let sheet = *document.require_sheet()?;
    let synthetic = synthetic_part(document, &plan, params);
    let Program {
        mut blocks,
        line_ending,
    } = document.to_program();
    let insert_at = insertion_index(document);
    blocks.splice(insert_at..insert_at, synthetic);

    let rebuilt = Document::build(
        Program {
            blocks,
            line_ending,
        },
        Some(sheet),
    )?;
    info!(
        segments = plan.segment_count(),
        part = %document.next_part_id(),
        "已追加分离线零件"
    );
    Ok(BreakupOutcome {
        document: rebuilt,
        plan,
    })
}

/// 追加位置：最后一个零件之后；没有零件时放在程序结束指令之前。
fn insertion_index(document: &Document) -> usize {
    if let Some(last) = document.parts().last() {
        return last.span.end;
    }
    document
        .blocks()
        .iter()
        .position(|block| match &block.kind {
            BlockKind::Other { text } => is_program_end(text),
            _ => false,
        })
        .unwrap_or(document.blocks().len())
}

fn is_program_end(text: &str) -> bool {
    let upper = text.trim().to_ascii_uppercase();
    let body = match upper.strip_prefix('N') {
        Some(rest) => rest.trim_start_matches(|c: char| c.is_ascii_digit()).trim_start(),
        None => upper.as_str(),
    };
    body.starts_with("HKEND") || body.starts_with("M30") || body.starts_with("M02")
}

fn synthetic_part(document: &Document, plan: &BreakupPlan, params: &BreakupParams) -> Vec<Block> {
    let step = params.sequence_step;
    let mut sequence = params.sequence_start;
    let mut blocks = vec![Block::synthetic(
        BlockKind::PartStart(PartHeader {
            id: document.next_part_id(),
            offset: Point2::new(0.0, 0.0),
            program_id: Some(params.program_id),
            tech: Some(params.tech_code),
            args: vec![
                0.0,
                0.0,
                0.0,
                f64::from(params.program_id),
                f64::from(params.tech_code),
                0.0,
                0.0,
                0.0,
            ],
        }),
        Some(sequence),
    )];

    for segment in plan.segments() {
        sequence = sequence.saturating_add(step);
        blocks.push(Block::synthetic(
            BlockKind::ContourStart(ContourHeader {
                kind: ContourKind::Outer,
                start: segment.start,
                args: vec![
                    0.0,
                    1.0,
                    segment.start.x(),
                    segment.start.y(),
                    0.0,
                    0.0,
                    0.0,
                    0.0,
                ],
            }),
            Some(sequence),
        ));
        blocks.push(macro_block("HKPIE(0,0,0)"));
        blocks.push(macro_block("HKLEA(0,0,0)"));
        blocks.push(Block::synthetic(BlockKind::CutOn, None));
        blocks.push(Block::synthetic(
            BlockKind::CutMove(Segment::line(segment.start, segment.end)),
            None,
        ));
        blocks.push(Block::synthetic(BlockKind::ContourEnd, None));
    }

    sequence = sequence.saturating_add(step);
    blocks.push(Block::synthetic(BlockKind::PartEnd, Some(sequence)));
    blocks
}

fn macro_block(text: &str) -> Block {
    Block::synthetic(
        BlockKind::Other {
            text: text.to_string(),
        },
        None,
    )
}
