
use std::fs;
use std::path::PathBuf;

use golden::assert_golden;
use hkcut_core::document::{BlockKind, ContourKind, GeometryError, PartId, Sheet};
use hkcut_core::geometry::{ArcDirection, Point2, Segment};
use hkcut_io::{
    IoError, LoadError, MpfFacade, ParseError, ProgramLoader, ProgramSaver, export, parse,
    parse_program,
};

fn fixture(name: &str) -> PathBuf {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests/data");
    path.push(name);
    path
}

fn fixture_text(name: &str) -> String {
    fs::read_to_string(fixture(name)).expect("读取测试数据失败")
}

#[test]
fn load_two_parts_matches_expected_document() {
    let loader = MpfFacade::new();
    let doc = loader.load(&fixture("two_parts.mpf")).expect("读取 MPF 失败");
    assert_golden("two_parts", &doc);
}

#[test]
fn export_of_unmodified_document_is_byte_identical() {
    for name in ["two_parts.mpf", "arc_hole.mpf"] {
        let text = fixture_text(name);
        let doc = parse(&text).expect("解析失败");
        assert_eq!(export(&doc), text, "{name} 往返输出不一致");
    }
}

#[test]
fn crlf_and_missing_final_newline_survive_round_trip() {
    let text = fixture_text("two_parts.mpf").replace('\n', "\r\n");
    let text = text.trim_end_matches("\r\n").to_string();
    let doc = parse(&text).expect("解析 CRLF 文本失败");
    assert_eq!(doc.parts().len(), 2);
    assert_eq!(export(&doc), text);
}

#[test]
fn load_arcs_holes_and_part_metadata() {
    let doc = parse(&fixture_text("arc_hole.mpf")).expect("解析失败");
    let sheet = doc.sheet().expect("缺少板料");
    assert_eq!((sheet.width, sheet.height), (60.0, 40.0));

    let parts = doc.parts();
    assert_eq!(parts.len(), 1);
    let part = &parts[0];
    assert_eq!(part.id, PartId::new(1));
    assert_eq!(part.program_id, Some(2001));
    assert_eq!(part.tech, Some(7));
    assert_eq!(part.offset, Point2::new(5.0, 2.5));

    let kinds: Vec<_> = part.contours.iter().map(|contour| contour.kind).collect();
    assert_eq!(kinds, vec![ContourKind::Hole, ContourKind::Outer]);

    match part.contours[0].segments.as_slice() {
        [Segment::Arc {
            center,
            radius,
            direction: ArcDirection::Clockwise,
            ..
        }] => {
            assert_eq!(*center, Point2::new(25.0, 15.0));
            assert!((radius - 5.0).abs() < 1e-9);
        }
        other => panic!("期望整圆内孔，实际 {other:?}"),
    }
    assert!(part.contours[0].closed);

    let outer = &part.contours[1];
    assert_eq!(outer.segments.len(), 5);
    assert!(outer.closed);
    assert!(matches!(
        outer.segments[1],
        Segment::Arc {
            direction: ArcDirection::CounterClockwise,
            ..
        }
    ));

    let bounds = part.bounds();
    assert!((bounds.min().x() - 10.0).abs() < 1e-9);
    assert!((bounds.min().y() - 5.0).abs() < 1e-9);
    assert!((bounds.max().x() - 50.0).abs() < 1e-9);
    assert!((bounds.max().y() - 30.0).abs() < 1e-9);
    assert!(part.has_material());
    assert!(doc.warnings().is_empty());
}

#[test]
fn rapid_moves_and_program_header_are_kept_as_other_blocks() {
    let doc = parse(&fixture_text("arc_hole.mpf")).expect("解析失败");
    let blocks = doc.blocks();
    assert!(matches!(&blocks[0].kind, BlockKind::Other { text } if text == "%_N_ARC_HOLE_MPF"));
    assert!(matches!(&blocks[3].kind, BlockKind::Other { text } if text == "N2 G0 X0 Y0"));
    assert_eq!(blocks[3].sequence, Some(2));
    assert_eq!(blocks[3].line, 4);
}

#[test]
fn sheet_override_replaces_header_dimensions() {
    let loader = MpfFacade::with_sheet(Some(Sheet::new(120.0, 60.0)));
    let doc = loader.load(&fixture("arc_hole.mpf")).expect("读取失败");
    let sheet = doc.sheet().expect("缺少板料");
    assert_eq!((sheet.width, sheet.height), (120.0, 60.0));
}

#[test]
fn save_writes_exported_text() {
    let dir = tempfile::tempdir().expect("创建临时目录失败");
    let target = dir.path().join("out.mpf");
    fs::write(&target, "stale").expect("写入旧文件失败");

    let facade = MpfFacade::new();
    let doc = facade.load(&fixture("two_parts.mpf")).expect("读取失败");
    facade.save(&doc, &target).expect("保存失败");

    let written = fs::read_to_string(&target).expect("读取输出失败");
    assert_eq!(written, fixture_text("two_parts.mpf"));
}

#[test]
fn missing_file_reports_read_error() {
    let loader = MpfFacade::new();
    let err = loader
        .load(&fixture("does_not_exist.mpf"))
        .expect_err("不存在的文件应当失败");
    assert!(matches!(err, IoError::ReadError { .. }));
}

#[test]
fn part_outside_sheet_is_a_geometry_error() {
    let text = fixture_text("two_parts.mpf").replace("HKINI(0,48,96,0,0,0)", "HKINI(0,40,96,0,0,0)");
    let err = parse(&text).expect_err("零件超出板料应当失败");
    assert!(matches!(
        err,
        LoadError::Geometry(GeometryError::PartOutsideSheet { part, .. }) if part == PartId::new(2)
    ));
}

#[test]
fn unterminated_part_is_rejected() {
    let text = fixture_text("two_parts.mpf").replace("N60 HKPED(0,0,0)\n", "");
    let err = parse_program(&text).expect_err("缺少 HKPED 应当失败");
    assert_eq!(err, ParseError::UnterminatedPart { open_line: 14 });
}

#[test]
fn nested_part_start_is_rejected_with_position() {
    let text = fixture_text("two_parts.mpf").replace("N30 HKPED(0,0,0)\n", "");
    let err = parse_program(&text).expect_err("嵌套 HKOST 应当失败");
    assert_eq!(
        err,
        ParseError::UnclosedPart {
            line: 13,
            column: 5,
            open_line: 3
        }
    );
}

#[test]
fn invalid_coordinate_in_file_reports_position() {
    let text = fixture_text("two_parts.mpf").replace("G1 X20.0 Y40.0", "G1 X20.0 Y4,0");
    let err = parse(&text).expect_err("非法数字应当失败");
    assert_eq!(
        err,
        LoadError::Parse(ParseError::InvalidNumber {
            line: 9,
            column: 10,
            field: "Y4,0".to_string()
        })
    );
}

#[test]
fn empty_input_is_an_empty_document() {
    let doc = parse("").expect("空输入应当成功");
    assert!(doc.parts().is_empty());
    assert!(doc.sheet().is_none());
    assert_eq!(export(&doc), "");
}
