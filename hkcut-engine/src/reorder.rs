use std::collections::HashSet;
use std::ops::Range;

use hkcut_core::document::{Block, BlockKind, Document, PartId, Program};
use tracing::debug;

use crate::errors::ValidationError;

/// 按 `new_order` 重排零件。每个零件的完整块区间整体移动，零件之间的其它块留在原间隙位置。
pub fn reorder(document: &Document, new_order: &[PartId]) -> Result<Document, ValidationError> {
    validate_order(document, new_order)?;

    let parts = document.parts();
    let (Some(first), Some(last)) = (parts.first(), parts.last()) else {
        return Ok(document.clone());
    };
    let blocks = document.blocks();

    let mut reordered = Vec::with_capacity(blocks.len());
    reordered.extend_from_slice(&blocks[..first.span.start]);
    for (slot, id) in new_order.iter().enumerate() {
        let span = document
            .part(*id)
            .map(|part| part.span.clone())
            .ok_or(ValidationError::UnknownPart(*id))?;
        reordered.extend_from_slice(&blocks[span]);
        if let Some(next) = parts.get(slot + 1) {
            reordered.extend_from_slice(&blocks[parts[slot].span.end..next.span.start]);
        }
    }
    reordered.extend_from_slice(&blocks[last.span.end..]);

    let rebuilt = rebuild(document, reordered)?;
    debug!(order = ?new_order.iter().map(|id| id.get()).collect::<Vec<_>>(), "零件已重排");
    Ok(rebuilt)
}

/// 在零件 `part` 内重排轮廓。轮廓按其 `HKSTR` 在零件内的序号（从 1 开始）标识，
/// `HKSTR..=HKSTO` 区间整体移动，轮廓之间的其它块留在原位置。
pub fn reorder_contours(
    document: &Document,
    part: PartId,
    new_order: &[usize],
) -> Result<Document, ValidationError> {
    let target = document.part(part).ok_or(ValidationError::UnknownPart(part))?;
    let blocks = document.blocks();
    let spans = contour_spans(blocks, target.span.clone());
    validate_contour_order(part, spans.len(), new_order)?;

    let (Some(first), Some(last)) = (spans.first(), spans.last()) else {
        return Ok(document.clone());
    };
    let mut reordered = Vec::with_capacity(blocks.len());
    reordered.extend_from_slice(&blocks[..first.start]);
    for (slot, ordinal) in new_order.iter().enumerate() {
        reordered.extend_from_slice(&blocks[spans[ordinal - 1].clone()]);
        if let Some(next) = spans.get(slot + 1) {
            reordered.extend_from_slice(&blocks[spans[slot].end..next.start]);
        }
    }
    reordered.extend_from_slice(&blocks[last.end..]);

    let rebuilt = rebuild(document, reordered)?;
    debug!(part = part.get(), order = ?new_order, "轮廓已重排");
    Ok(rebuilt)
}

/// `new_order` 必须是 `1..=count` 上的一个排列。
pub fn validate_contour_order(
    part: PartId,
    count: usize,
    new_order: &[usize],
) -> Result<(), ValidationError> {
    let mut seen = HashSet::with_capacity(new_order.len());
    for &contour in new_order {
        if !(1..=count).contains(&contour) {
            return Err(ValidationError::UnknownContour { part, contour });
        }
        if !seen.insert(contour) {
            return Err(ValidationError::DuplicateContour { part, contour });
        }
    }
    if let Some(contour) = (1..=count).find(|contour| !seen.contains(contour)) {
        return Err(ValidationError::MissingContour { part, contour });
    }
    Ok(())
}

/// 零件块区间内每个 `HKSTR..=HKSTO` 的块范围（半开区间，文档内的绝对下标）。
fn contour_spans(blocks: &[Block], part_span: Range<usize>) -> Vec<Range<usize>> {
    let mut spans = Vec::new();
    let mut open = None;
    for index in part_span {
        match blocks[index].kind {
            BlockKind::ContourStart(_) => open = Some(index),
            BlockKind::ContourEnd => {
                if let Some(start) = open.take() {
                    spans.push(start..index + 1);
                }
            }
            _ => {}
        }
    }
    spans
}

fn rebuild(document: &Document, blocks: Vec<Block>) -> Result<Document, ValidationError> {
    let sheet = document.sheet().copied();
    let rebuilt = Document::build(
        Program {
            blocks,
            line_ending: document.line_ending(),
        },
        sheet,
    )?;
    Ok(rebuilt)
}

/// `new_order` 必须是当前零件集合上的一个排列。
pub fn validate_order(document: &Document, new_order: &[PartId]) -> Result<(), ValidationError> {
    let known: HashSet<PartId> = document.parts().iter().map(|part| part.id).collect();
    let mut seen = HashSet::with_capacity(new_order.len());
    for id in new_order {
        if !known.contains(id) {
            return Err(ValidationError::UnknownPart(*id));
        }
        if !seen.insert(*id) {
            return Err(ValidationError::DuplicatePart(*id));
        }
    }
    if let Some(missing) = document
        .parts()
        .iter()
        .map(|part| part.id)
        .find(|id| !seen.contains(id))
    {
        return Err(ValidationError::MissingPart(missing));
    }
    Ok(())
}
