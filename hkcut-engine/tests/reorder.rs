use std::fs;
use std::path::PathBuf;

use hkcut_core::document::{ContourKind, Document, PartId};
use hkcut_engine::{ValidationError, reorder, reorder_contours};
use hkcut_io::{export, parse};
use proptest::prelude::*;

fn fixture_text(name: &str) -> String {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/data")
        .join(name);
    fs::read_to_string(&path).unwrap_or_else(|err| panic!("读取 {} 失败: {err}", path.display()))
}

fn ids(raw: &[u32]) -> Vec<PartId> {
    raw.iter().copied().map(PartId::new).collect()
}

fn lines(text: &str, range: std::ops::RangeInclusive<usize>) -> String {
    text.split_inclusive('\n')
        .skip(range.start() - 1)
        .take(range.end() - range.start() + 1)
        .collect()
}

#[test]
fn reorder_moves_part_spans_and_keeps_gap_blocks() {
    let text = fixture_text("three_parts.mpf");
    let doc = parse(&text).expect("解析失败");
    let reordered = reorder(&doc, &ids(&[3, 1, 2])).expect("重排失败");

    assert_eq!(reordered.part_ids(), ids(&[3, 1, 2]));
    let orders: Vec<_> = reordered.parts().iter().map(|part| part.order).collect();
    assert_eq!(orders, vec![0, 1, 2]);

    let expected = [
        lines(&text, 1..=3),
        lines(&text, 34..=44),
        lines(&text, 15..=15),
        lines(&text, 4..=14),
        lines(&text, 33..=33),
        lines(&text, 16..=32),
        lines(&text, 45..=46),
    ]
    .concat();
    assert_eq!(export(&reordered), expected);
}

#[test]
fn reorder_preserves_every_block_verbatim() {
    let text = fixture_text("three_parts.mpf");
    let doc = parse(&text).expect("解析失败");
    let reordered = reorder(&doc, &ids(&[2, 3, 1])).expect("重排失败");

    let mut before: Vec<_> = doc.blocks().iter().map(|block| block.raw()).collect();
    let mut after: Vec<_> = reordered.blocks().iter().map(|block| block.raw()).collect();
    before.sort();
    after.sort();
    assert_eq!(before, after);

    let moved = reordered.part(PartId::new(1)).expect("零件 1");
    let original = doc.part(PartId::new(1)).expect("零件 1");
    assert_eq!(moved.contours, original.contours);
    assert_eq!(moved.program_id, Some(3001));
}

#[test]
fn identity_order_is_byte_identical() {
    let text = fixture_text("two_parts.mpf");
    let doc = parse(&text).expect("解析失败");
    let same = reorder(&doc, &doc.part_ids()).expect("重排失败");
    assert_eq!(export(&same), text);
}

#[test]
fn reorder_rejects_non_permutations() {
    let doc = parse(&fixture_text("three_parts.mpf")).expect("解析失败");

    assert_eq!(
        reorder(&doc, &ids(&[1, 2])).unwrap_err(),
        ValidationError::MissingPart(PartId::new(3))
    );
    assert_eq!(
        reorder(&doc, &ids(&[1, 2, 2])).unwrap_err(),
        ValidationError::DuplicatePart(PartId::new(2))
    );
    assert_eq!(
        reorder(&doc, &ids(&[1, 2, 4])).unwrap_err(),
        ValidationError::UnknownPart(PartId::new(4))
    );
    assert_eq!(
        reorder(&doc, &ids(&[3, 2, 1, 1])).unwrap_err(),
        ValidationError::DuplicatePart(PartId::new(1))
    );
    assert_eq!(
        reorder(&doc, &[]).unwrap_err(),
        ValidationError::MissingPart(PartId::new(1))
    );
}

#[test]
fn empty_document_accepts_empty_order() {
    let doc = parse("HKINI(0,10,10)\nM30\n").expect("解析失败");
    let same = reorder(&doc, &[]).expect("空重排");
    assert_eq!(same, doc);
}

#[test]
fn reorder_contours_moves_spans_within_the_part() {
    let text = fixture_text("plate_with_holes.mpf");
    let doc = parse(&text).expect("解析失败");
    let plate = PartId::new(1);
    let reordered = reorder_contours(&doc, plate, &[4, 1, 2, 3]).expect("重排失败");

    let expected = [
        lines(&text, 1..=3),
        lines(&text, 24..=30),
        lines(&text, 11..=11),
        lines(&text, 4..=10),
        lines(&text, 12..=18),
        lines(&text, 23..=23),
        lines(&text, 19..=22),
        lines(&text, 31..=42),
    ]
    .concat();
    assert_eq!(export(&reordered), expected);

    let part = reordered.part(plate).expect("零件 1");
    let kinds: Vec<_> = part.contours.iter().map(|contour| contour.kind).collect();
    assert_eq!(
        kinds,
        vec![
            ContourKind::Outer,
            ContourKind::Hole,
            ContourKind::Hole,
            ContourKind::Hole
        ]
    );
    assert_eq!(reordered.part_ids(), doc.part_ids());
    assert_eq!(reordered.parts()[1], doc.parts()[1]);
}

#[test]
fn reorder_contours_rejects_non_permutations() {
    let doc = parse(&fixture_text("plate_with_holes.mpf")).expect("解析失败");
    let plate = PartId::new(1);

    assert_eq!(
        reorder_contours(&doc, PartId::new(9), &[1]).unwrap_err(),
        ValidationError::UnknownPart(PartId::new(9))
    );
    assert_eq!(
        reorder_contours(&doc, plate, &[1, 2, 3, 5]).unwrap_err(),
        ValidationError::UnknownContour {
            part: plate,
            contour: 5
        }
    );
    assert_eq!(
        reorder_contours(&doc, plate, &[0, 1, 2, 3]).unwrap_err(),
        ValidationError::UnknownContour {
            part: plate,
            contour: 0
        }
    );
    assert_eq!(
        reorder_contours(&doc, plate, &[2, 2, 1, 3]).unwrap_err(),
        ValidationError::DuplicateContour {
            part: plate,
            contour: 2
        }
    );
    assert_eq!(
        reorder_contours(&doc, plate, &[4, 3, 1]).unwrap_err(),
        ValidationError::MissingContour {
            part: plate,
            contour: 2
        }
    );
}

#[test]
fn single_contour_part_accepts_identity_only() {
    let text = fixture_text("plate_with_holes.mpf");
    let doc = parse(&text).expect("解析失败");
    let same = reorder_contours(&doc, PartId::new(2), &[1]).expect("重排失败");
    assert_eq!(export(&same), text);
    assert!(reorder_contours(&doc, PartId::new(2), &[]).is_err());
}

fn permuted_document() -> impl Strategy<Value = (Document, Vec<PartId>)> {
    let doc = parse(&fixture_text("three_parts.mpf")).expect("解析失败");
    let original = doc.part_ids();
    Just(original)
        .prop_shuffle()
        .prop_map(move |order| (doc.clone(), order))
}

proptest! {
    #[test]
    fn reorder_then_restore_is_identity((doc, order) in permuted_document()) {
        let original_text = export(&doc);
        let shuffled = reorder(&doc, &order).expect("重排失败");
        prop_assert_eq!(shuffled.part_ids(), order);

        let restored = reorder(&shuffled, &doc.part_ids()).expect("还原失败");
        prop_assert_eq!(restored.part_ids(), doc.part_ids());
        prop_assert_eq!(export(&restored), original_text);
    }

    #[test]
    fn dropping_any_part_is_rejected(skip in 0usize..3) {
        let doc = parse(&fixture_text("three_parts.mpf")).expect("解析失败");
        let mut order = doc.part_ids();
        let removed = order.remove(skip);
        prop_assert_eq!(
            reorder(&doc, &order).unwrap_err(),
            ValidationError::MissingPart(removed)
        );
    }

    #[test]
    fn contour_reorder_then_inverse_is_identity(
        order in Just(vec![1usize, 2, 3, 4]).prop_shuffle()
    ) {
        let text = fixture_text("plate_with_holes.mpf");
        let doc = parse(&text).expect("解析失败");
        let plate = PartId::new(1);
        let shuffled = reorder_contours(&doc, plate, &order).expect("重排失败");

        // 新位置 i 上是原轮廓 order[i]，逆排列把它放回 order[i] - 1
        let mut inverse = vec![0usize; order.len()];
        for (position, original) in order.iter().enumerate() {
            inverse[original - 1] = position + 1;
        }
        let restored = reorder_contours(&shuffled, plate, &inverse).expect("还原失败");
        prop_assert_eq!(export(&restored), text);
        prop_assert_eq!(restored, doc);
    }
}
