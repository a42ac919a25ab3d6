use std::path::{Path, PathBuf};

use hkcut_core::document::{Document, LineEnding};
use hkcut_core::geometry::{Bounds2D, Point2};
use hkcut_engine::command::{CommandBus, CommandContext, CommandRequest};
use hkcut_engine::{BreakupPlan, Orientation, Skeleton};
use serde::Serialize;
use tracing::info;

use crate::errors::FrontendError;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BoundsSummary {
    pub min: [f64; 2],
    pub max: [f64; 2],
}

impl BoundsSummary {
    fn from_bounds(bounds: &Bounds2D) -> Option<Self> {
        (!bounds.is_empty()).then(|| Self {
            min: [bounds.min().x(), bounds.min().y()],
            max: [bounds.max().x(), bounds.max().y()],
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SheetSummary {
    pub width: f64,
    pub height: f64,
    pub origin: [f64; 2],
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PartSummary {
    pub id: u32,
    pub order: usize,
    pub line: usize,
    pub program_id: Option<u32>,
    pub tech: Option<u32>,
    pub contours: usize,
    pub segments: usize,
    pub has_material: bool,
    pub bounds: Option<BoundsSummary>,
}

/// `summary` 子命令输出的 JSON 结构。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryReport {
    pub source: String,
    pub line_ending: &'static str,
    pub blocks: usize,
    pub sheet: Option<SheetSummary>,
    pub bounds: Option<BoundsSummary>,
    pub parts: Vec<PartSummary>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkeletonReport {
    pub polygons: usize,
    pub holes: usize,
    pub area: f64,
    pub bounds: Option<BoundsSummary>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineSummary {
    pub orientation: Orientation,
    pub coordinate: f64,
    pub intervals: Vec<[f64; 2]>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BreakupReport {
    pub output: PathBuf,
    pub segments: usize,
    pub lines: Vec<LineSummary>,
    pub warnings: Vec<String>,
}

pub fn summarize(source: &Path, document: &Document) -> SummaryReport {
    let parts = document
        .parts()
        .iter()
        .map(|part| PartSummary {
            id: part.id.get(),
            order: part.order,
            line: part.line,
            program_id: part.program_id,
            tech: part.tech,
            contours: part.contours.len(),
            segments: part
                .contours
                .iter()
                .map(|contour| contour.segments.len())
                .sum(),
            has_material: part.has_material(),
            bounds: BoundsSummary::from_bounds(&part.bounds()),
        })
        .collect();

    SummaryReport {
        source: source.display().to_string(),
        line_ending: match document.line_ending() {
            LineEnding::Lf => "lf",
            LineEnding::CrLf => "crlf",
        },
        blocks: document.blocks().len(),
        sheet: document.sheet().map(|sheet| SheetSummary {
            width: sheet.width,
            height: sheet.height,
            origin: [sheet.origin.x(), sheet.origin.y()],
        }),
        bounds: document
            .bounds()
            .and_then(|bounds| BoundsSummary::from_bounds(&bounds)),
        parts,
        warnings: document.warnings().iter().map(ToString::to_string).collect(),
    }
}

pub fn skeleton_report(skeleton: &Skeleton) -> SkeletonReport {
    let polygons = skeleton.region.polygons();
    SkeletonReport {
        polygons: polygons.len(),
        holes: polygons.iter().map(|polygon| polygon.holes.len()).sum(),
        area: skeleton.region.area(),
        bounds: BoundsSummary::from_bounds(&skeleton.region.bounds()),
        warnings: skeleton.warnings.iter().map(ToString::to_string).collect(),
    }
}

pub fn breakup_report(output: PathBuf, plan: &BreakupPlan) -> BreakupReport {
    let lines = plan
        .lines
        .iter()
        .map(|line| LineSummary {
            orientation: line.orientation,
            coordinate: line.coordinate,
            intervals: line
                .segments
                .iter()
                .map(|segment| match line.orientation {
                    Orientation::Horizontal => [segment.start.x(), segment.end.x()],
                    Orientation::Vertical => [segment.start.y(), segment.end.y()],
                })
                .collect(),
        })
        .collect();
    BreakupReport {
        output,
        segments: plan.segment_count(),
        lines,
        warnings: plan.warnings.iter().map(ToString::to_string).collect(),
    }
}

/// 以缩进 JSON 打印报告。
pub fn print_json<T: Serialize>(report: &T) -> Result<(), FrontendError> {
    println!("{}", serde_json::to_string_pretty(report)?);
    Ok(())
}

pub fn print_skeleton(report: &SkeletonReport) {
    println!(
        "余料区域：{} 个多边形，{} 个内孔，面积 {:.4}",
        report.polygons, report.holes, report.area
    );
    if let Some(bounds) = &report.bounds {
        println!("  - 包围盒 {} -> {}", format_pair(bounds.min), format_pair(bounds.max));
    }
    for warning in &report.warnings {
        println!("  - 告警：{warning}");
    }
}

pub fn print_breakup(report: &BreakupReport) {
    println!(
        "分离线：{} 条线，{} 段，已写入 {}",
        report.lines.len(),
        report.segments,
        report.output.display()
    );
    for line in &report.lines {
        let axis = match line.orientation {
            Orientation::Horizontal => "y",
            Orientation::Vertical => "x",
        };
        let intervals: Vec<String> = line
            .intervals
            .iter()
            .map(|[from, to]| format!("[{from:.4}, {to:.4}]"))
            .collect();
        let intervals = if intervals.is_empty() {
            "<无>".to_string()
        } else {
            intervals.join(" ")
        };
        println!("  - {axis}={:.4}: {intervals}", line.coordinate);
    }
    for warning in &report.warnings {
        println!("  - 告警：{warning}");
    }
}

/// 通过命令总线执行命令，成功时记录并返回消息。
pub fn dispatch_cli_command(
    bus: &CommandBus,
    name: &str,
    args: &[String],
    context: &mut CommandContext<'_>,
) -> Result<String, String> {
    let request = CommandRequest::new(name, args.iter().cloned());
    let response = bus.dispatch(&request, context);
    let message = response.message.unwrap_or_default();
    if response.success {
        info!(command = name, "{message}");
        Ok(message)
    } else {
        Err(message)
    }
}

fn format_pair([x, y]: [f64; 2]) -> String {
    format_point(Point2::new(x, y))
}

fn format_point(point: Point2) -> String {
    format!("({:.4}, {:.4})", point.x(), point.y())
}
