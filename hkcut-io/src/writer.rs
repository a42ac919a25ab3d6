use hkcut_core::document::{Block, BlockKind, BlockText, ContourKind, Document, LineEnding, Program};
use hkcut_core::geometry::{ArcDirection, Segment};

/// 导出文档。解析得到的块按原文输出，合成块用规范编码器生成并补行尾。
pub fn export(document: &Document) -> String {
    export_blocks(document.blocks(), document.line_ending())
}

pub fn export_program(program: &Program) -> String {
    export_blocks(&program.blocks, program.line_ending)
}

fn export_blocks(blocks: &[Block], line_ending: LineEnding) -> String {
    let mut out = String::new();
    for block in blocks {
        match &block.text {
            BlockText::Verbatim(raw) => out.push_str(raw),
            BlockText::Synthetic => {
                // 源文件末行没有换行时，合成块需另起一行
                if !out.is_empty() && !out.ends_with('\n') {
                    out.push_str(line_ending.as_str());
                }
                out.push_str(&encode_block(block));
                out.push_str(line_ending.as_str());
            }
        }
    }
    out
}

/// 块的规范文本（不含行尾），坐标保留 4 位小数。
pub fn encode_block(block: &Block) -> String {
    let body = encode_kind(&block.kind);
    match block.sequence {
        Some(sequence) => format!("N{sequence} {body}"),
        None => body,
    }
}

fn encode_kind(kind: &BlockKind) -> String {
    match kind {
        BlockKind::SheetInit(header) => format!(
            "HKINI(0,{},{})",
            fmt_coord(header.width),
            fmt_coord(header.height)
        ),
        BlockKind::PartStart(header) => format!(
            "HKOST({},{},0.0,{},{},0,0,0)",
            fmt_offset(header.offset.x()),
            fmt_offset(header.offset.y()),
            header.program_id.unwrap_or(0),
            header.tech.unwrap_or(0)
        ),
        BlockKind::ContourStart(header) => format!(
            "HKSTR({},1,{},{},0,0,0,0)",
            match header.kind {
                ContourKind::Outer => 0,
                ContourKind::Hole => 1,
            },
            fmt_coord(header.start.x()),
            fmt_coord(header.start.y())
        ),
        BlockKind::CutOn => "HKCUT(0,0,0)".to_string(),
        BlockKind::CutMove(segment) => encode_segment(segment),
        BlockKind::ContourEnd => "HKSTO(0,0,0)".to_string(),
        BlockKind::PartEnd => "HKPED(0,0,0)".to_string(),
        BlockKind::Other { text } => text.clone(),
    }
}

fn encode_segment(segment: &Segment) -> String {
    match segment {
        Segment::Line { end, .. } => {
            format!("G1 X{} Y{}", fmt_coord(end.x()), fmt_coord(end.y()))
        }
        Segment::Arc {
            start,
            end,
            center,
            direction,
            ..
        } => {
            let code = match direction {
                ArcDirection::Clockwise => "G2",
                ArcDirection::CounterClockwise => "G3",
            };
            let offset = start.vector_to(*center);
            format!(
                "{code} X{} Y{} I{} J{}",
                fmt_coord(end.x()),
                fmt_coord(end.y()),
                fmt_coord(offset.x()),
                fmt_coord(offset.y())
            )
        }
    }
}

/// 4 位小数，避免输出 `-0.0000`。
pub fn fmt_coord(value: f64) -> String {
    let value = if value.abs() < 0.000_05 { 0.0 } else { value };
    format!("{value:.4}")
}

fn fmt_offset(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{:.1}", value + 0.0)
    } else {
        fmt_coord(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hkcut_core::document::{ContourHeader, PartHeader, PartId};
    use hkcut_core::geometry::{Point2, Vector2};

    #[test]
    fn encodes_breakup_style_blocks() {
        let header = PartHeader {
            id: PartId::new(3),
            offset: Point2::new(0.0, 0.0),
            program_id: Some(990001),
            tech: Some(99),
            args: Vec::new(),
        };
        let start = Block::synthetic(BlockKind::PartStart(header), Some(900000));
        assert_eq!(
            encode_block(&start),
            "N900000 HKOST(0.0,0.0,0.0,990001,99,0,0,0)"
        );

        let contour = Block::synthetic(
            BlockKind::ContourStart(ContourHeader {
                kind: ContourKind::Outer,
                start: Point2::new(20.0, 24.0),
                args: Vec::new(),
            }),
            Some(900010),
        );
        assert_eq!(
            encode_block(&contour),
            "N900010 HKSTR(0,1,20.0000,24.0000,0,0,0,0)"
        );

        let cut = Block::synthetic(
            BlockKind::CutMove(Segment::line(Point2::new(20.0, 24.0), Point2::new(48.0, 24.0))),
            None,
        );
        assert_eq!(encode_block(&cut), "G1 X48.0000 Y24.0000");
    }

    #[test]
    fn arc_offsets_are_relative_to_start() {
        let arc = Segment::arc(
            Point2::new(10.0, 0.0),
            Point2::new(0.0, 10.0),
            Vector2::new(-10.0, 0.0),
            ArcDirection::CounterClockwise,
        );
        let block = Block::synthetic(BlockKind::CutMove(arc), None);
        assert_eq!(
            encode_block(&block),
            "G3 X0.0000 Y10.0000 I-10.0000 J0.0000"
        );
    }

    #[test]
    fn negative_zero_is_normalised() {
        assert_eq!(fmt_coord(-0.00001), "0.0000");
        assert_eq!(fmt_coord(-1.25), "-1.2500");
    }

    #[test]
    fn synthetic_block_after_unterminated_last_line_starts_a_new_line() {
        let program = Program {
            blocks: vec![
                Block::verbatim(BlockKind::PartEnd, None, 1, "HKPED(0,0,0)"),
                Block::synthetic(BlockKind::Other { text: "M30".into() }, None),
            ],
            line_ending: LineEnding::CrLf,
        };
        assert_eq!(export_program(&program), "HKPED(0,0,0)\r\nM30\r\n");
    }
}
