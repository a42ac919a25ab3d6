use hkcut_core::document::{
    Block, BlockKind, ContourHeader, ContourKind, LineEnding, PartHeader, PartId, Program,
    SheetHeader,
};
use hkcut_core::geometry::{ArcDirection, Point2, Segment, Vector2};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("line {line}, column {column}: invalid number `{field}`")]
    InvalidNumber {
        line: usize,
        column: usize,
        field: String,
    },
    #[error("line {line}, column {column}: {message}")]
    Structure {
        line: usize,
        column: usize,
        message: String,
    },
    #[error("line {line}, column {column}: HKOST opens a new part while the part from line {open_line} is not closed by HKPED")]
    UnclosedPart {
        line: usize,
        column: usize,
        open_line: usize,
    },
    #[error("program ends while the part from line {open_line} is not closed by HKPED")]
    UnterminatedPart { open_line: usize },
}

impl ParseError {
    fn structure(line: usize, column: usize, message: impl Into<String>) -> Self {
        Self::Structure {
            line,
            column,
            message: message.into(),
        }
    }

    /// 出错的行号；文件提前结束时为未闭合零件的起始行。
    pub fn line(&self) -> usize {
        match self {
            ParseError::InvalidNumber { line, .. }
            | ParseError::Structure { line, .. }
            | ParseError::UnclosedPart { line, .. } => *line,
            ParseError::UnterminatedPart { open_line } => *open_line,
        }
    }
}

/// 将程序文本解析为块序列。单次线性扫描，不回溯；无法识别的行原样保留为 `Other`。
pub fn parse_program(source: &str) -> Result<Program, ParseError> {
    let parser = MpfParser::new(source);
    parser.parse()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Keyword {
    Ini,
    Ost,
    Str,
    Cut,
    Sto,
    Ped,
}

impl Keyword {
    const ALL: [(&'static str, Keyword); 6] = [
        ("HKINI", Keyword::Ini),
        ("HKOST", Keyword::Ost),
        ("HKSTR", Keyword::Str),
        ("HKCUT", Keyword::Cut),
        ("HKSTO", Keyword::Sto),
        ("HKPED", Keyword::Ped),
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Motion {
    Linear,
    Clockwise,
    CounterClockwise,
}

/// 行首识别结果：关键字、运动指令或其它。
enum LineHead {
    Keyword(Keyword),
    Motion(Motion),
    Other,
}

/// 解析游标：当前零件、当前轮廓、切割窗口以及模态坐标。
struct Cursor {
    /// 未闭合零件的 `HKOST` 行号。
    part: Option<usize>,
    contour_open: bool,
    cutting: bool,
    position: Point2,
    next_part: u32,
}

impl Default for Cursor {
    fn default() -> Self {
        Self {
            part: None,
            contour_open: false,
            cutting: false,
            position: Point2::new(0.0, 0.0),
            next_part: 1,
        }
    }
}

struct MpfParser<'a> {
    source: &'a str,
    cursor: Cursor,
}

/// 单行上下文，负责列号换算。
struct SourceLine<'a> {
    number: usize,
    raw: &'a str,
    body: &'a str,
}

impl<'a> SourceLine<'a> {
    fn new(number: usize, raw: &'a str) -> Self {
        let body = raw.trim_end_matches(['\n', '\r']);
        Self { number, raw, body }
    }

    /// 字节偏移换算为 1 起始的字符列号。
    fn column(&self, offset: usize) -> usize {
        self.body[..offset].chars().count() + 1
    }
}

impl<'a> MpfParser<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            cursor: Cursor::default(),
        }
    }

    fn parse(mut self) -> Result<Program, ParseError> {
        let line_ending = detect_line_ending(self.source);
        let mut blocks = Vec::new();
        for (index, raw) in self.source.split_inclusive('\n').enumerate() {
            let line = SourceLine::new(index + 1, raw);
            blocks.push(self.parse_line(&line)?);
        }
        if let Some(open_line) = self.cursor.part.take() {
            return Err(ParseError::UnterminatedPart { open_line });
        }
        debug!(
            blocks = blocks.len(),
            parts = self.cursor.next_part - 1,
            "MPF 块解析完成"
        );
        Ok(Program {
            blocks,
            line_ending,
        })
    }

    fn parse_line(&mut self, line: &SourceLine<'a>) -> Result<Block, ParseError> {
        let (sequence, head_offset) = split_sequence(line)?;
        let head = classify(&line.body[head_offset..]);

        let kind = match head {
            LineHead::Keyword(keyword) => self.parse_keyword(line, keyword, head_offset)?,
            LineHead::Motion(motion) if self.cursor.cutting => {
                BlockKind::CutMove(self.parse_motion(line, motion, head_offset)?)
            }
            LineHead::Motion(_) | LineHead::Other => BlockKind::Other {
                text: line.body.to_string(),
            },
        };
        Ok(Block::verbatim(kind, sequence, line.number, line.raw))
    }

    fn parse_keyword(
        &mut self,
        line: &SourceLine<'a>,
        keyword: Keyword,
        offset: usize,
    ) -> Result<BlockKind, ParseError> {
        let column = line.column(offset);
        let cursor = &mut self.cursor;
        match keyword {
            Keyword::Ini => {
                let args = parse_arguments(line, offset + 5, true)?;
                if args.len() < 3 {
                    return Err(ParseError::structure(
                        line.number,
                        column,
                        "HKINI 至少需要 3 个参数（板宽与板高）",
                    ));
                }
                Ok(BlockKind::SheetInit(SheetHeader {
                    width: args[1],
                    height: args[2],
                    args,
                }))
            }
            Keyword::Ost => {
                if let Some(open_line) = cursor.part {
                    return Err(ParseError::UnclosedPart {
                        line: line.number,
                        column,
                        open_line,
                    });
                }
                let args = parse_arguments(line, offset + 5, true)?;
                let id = PartId::new(cursor.next_part);
                cursor.next_part += 1;
                cursor.part = Some(line.number);
                Ok(BlockKind::PartStart(PartHeader {
                    id,
                    offset: Point2::new(arg_or(&args, 0, 0.0), arg_or(&args, 1, 0.0)),
                    program_id: args.get(3).and_then(|value| as_code(*value)),
                    tech: args.get(4).and_then(|value| as_code(*value)),
                    args,
                }))
            }
            Keyword::Str => {
                if cursor.part.is_none() {
                    return Err(ParseError::structure(
                        line.number,
                        column,
                        "HKSTR 不在零件内（缺少 HKOST）",
                    ));
                }
                if cursor.contour_open {
                    return Err(ParseError::structure(
                        line.number,
                        column,
                        "上一个轮廓尚未由 HKSTO 结束即出现 HKSTR",
                    ));
                }
                let args = parse_arguments(line, offset + 5, true)?;
                if args.len() < 4 {
                    return Err(ParseError::structure(
                        line.number,
                        column,
                        "HKSTR 缺少轮廓起点坐标（第 3、4 个参数）",
                    ));
                }
                let start = Point2::new(args[2], args[3]);
                cursor.contour_open = true;
                cursor.cutting = false;
                cursor.position = start;
                Ok(BlockKind::ContourStart(ContourHeader {
                    kind: ContourKind::from_code(args[0]),
                    start,
                    args,
                }))
            }
            Keyword::Cut => {
                if !cursor.contour_open {
                    return Err(ParseError::structure(
                        line.number,
                        column,
                        "HKCUT 不在轮廓内（缺少 HKSTR）",
                    ));
                }
                parse_arguments(line, offset + 5, false)?;
                cursor.cutting = true;
                Ok(BlockKind::CutOn)
            }
            Keyword::Sto => {
                if !cursor.contour_open {
                    return Err(ParseError::structure(
                        line.number,
                        column,
                        "HKSTO 没有对应的 HKSTR",
                    ));
                }
                parse_arguments(line, offset + 5, false)?;
                cursor.contour_open = false;
                cursor.cutting = false;
                Ok(BlockKind::ContourEnd)
            }
            Keyword::Ped => {
                if cursor.part.is_none() {
                    return Err(ParseError::structure(
                        line.number,
                        column,
                        "HKPED 没有对应的 HKOST",
                    ));
                }
                if cursor.contour_open {
                    return Err(ParseError::structure(
                        line.number,
                        column,
                        "轮廓未结束即出现 HKPED（缺少 HKSTO）",
                    ));
                }
                parse_arguments(line, offset + 5, false)?;
                cursor.part = None;
                Ok(BlockKind::PartEnd)
            }
        }
    }

    fn parse_motion(
        &mut self,
        line: &SourceLine<'a>,
        motion: Motion,
        offset: usize,
    ) -> Result<Segment, ParseError> {
        let words = parse_words(line, offset)?;
        let start = self.cursor.position;
        let segment = match motion {
            Motion::Linear => {
                let end = Point2::new(
                    words.x.unwrap_or(start.x()),
                    words.y.unwrap_or(start.y()),
                );
                Segment::line(start, end)
            }
            Motion::Clockwise | Motion::CounterClockwise => {
                let (Some(x), Some(y), Some(i), Some(j)) = (words.x, words.y, words.i, words.j)
                else {
                    return Err(ParseError::structure(
                        line.number,
                        line.column(offset),
                        "圆弧指令需要 X、Y、I、J 四个地址字",
                    ));
                };
                let direction = if motion == Motion::Clockwise {
                    ArcDirection::Clockwise
                } else {
                    ArcDirection::CounterClockwise
                };
                Segment::arc(start, Point2::new(x, y), Vector2::new(i, j), direction)
            }
        };
        self.cursor.position = segment.end();
        Ok(segment)
    }
}

fn detect_line_ending(source: &str) -> LineEnding {
    match source.find('\n') {
        Some(index) if index > 0 && source.as_bytes()[index - 1] == b'\r' => LineEnding::CrLf,
        _ => LineEnding::Lf,
    }
}

/// 跳过前导空白与可选的 `N` 序号，返回序号及正文起始偏移。
fn split_sequence(line: &SourceLine<'_>) -> Result<(Option<u32>, usize), ParseError> {
    let body = line.body;
    let start = body.len() - body.trim_start().len();
    let bytes = body.as_bytes();
    if start < bytes.len()
        && matches!(bytes[start], b'N' | b'n')
        && bytes.get(start + 1).is_some_and(u8::is_ascii_digit)
    {
        let digits_end = bytes[start + 1..]
            .iter()
            .position(|b| !b.is_ascii_digit())
            .map_or(bytes.len(), |pos| start + 1 + pos);
        let digits = &body[start + 1..digits_end];
        let sequence = digits.parse::<u32>().map_err(|_| ParseError::InvalidNumber {
            line: line.number,
            column: line.column(start),
            field: body[start..digits_end].to_string(),
        })?;
        let rest = &body[digits_end..];
        let head = digits_end + (rest.len() - rest.trim_start().len());
        return Ok((Some(sequence), head));
    }
    Ok((None, start))
}

fn classify(head: &str) -> LineHead {
    let upper = head.as_bytes();
    for (name, keyword) in Keyword::ALL {
        if starts_with_word(upper, name.as_bytes()) {
            return LineHead::Keyword(keyword);
        }
    }
    if matches!(upper.first(), Some(b'G' | b'g')) {
        let digits_end = upper[1..]
            .iter()
            .position(|b| !b.is_ascii_digit())
            .map_or(upper.len(), |pos| pos + 1);
        let motion = match &head[1..digits_end] {
            "1" | "01" => Some(Motion::Linear),
            "2" | "02" => Some(Motion::Clockwise),
            "3" | "03" => Some(Motion::CounterClockwise),
            _ => None,
        };
        if let Some(motion) = motion {
            return LineHead::Motion(motion);
        }
    }
    LineHead::Other
}

/// 大小写不敏感的前缀匹配，且关键字后不能紧跟字母数字（避免 `HKSTOP` 之类误判）。
fn starts_with_word(text: &[u8], word: &[u8]) -> bool {
    text.len() >= word.len()
        && text[..word.len()].eq_ignore_ascii_case(word)
        && !text
            .get(word.len())
            .is_some_and(|b| b.is_ascii_alphanumeric() || *b == b'_')
}

/// 解析关键字后的 `( ... )` 参数表。`required` 为假时允许省略括号。
fn parse_arguments(
    line: &SourceLine<'_>,
    after_keyword: usize,
    required: bool,
) -> Result<Vec<f64>, ParseError> {
    let body = line.body;
    let rest = &body[after_keyword..];
    let open = after_keyword + (rest.len() - rest.trim_start().len());
    if !body[open..].starts_with('(') {
        if required {
            return Err(ParseError::structure(
                line.number,
                line.column(open),
                "参数表缺少 `(`",
            ));
        }
        return Ok(Vec::new());
    }
    let Some(close_rel) = body[open..].find(')') else {
        return Err(ParseError::structure(
            line.number,
            line.column(open),
            "参数表缺少 `)`",
        ));
    };
    let inner_start = open + 1;
    let inner = &body[inner_start..open + close_rel];
    if inner.trim().is_empty() {
        return Ok(Vec::new());
    }

    let mut values = Vec::new();
    let mut field_start = inner_start;
    for field in inner.split(',') {
        let leading = field.len() - field.trim_start().len();
        let trimmed = field.trim();
        let value = parse_decimal(trimmed).ok_or_else(|| ParseError::InvalidNumber {
            line: line.number,
            column: line.column(field_start + leading),
            field: trimmed.to_string(),
        })?;
        values.push(value);
        field_start += field.len() + 1;
    }
    Ok(values)
}

#[derive(Default)]
struct MotionWords {
    x: Option<f64>,
    y: Option<f64>,
    i: Option<f64>,
    j: Option<f64>,
}

/// 解析运动行中的地址字（`X`/`Y`/`I`/`J`）。其余地址字不校验，`;` 之后为注释。
fn parse_words(line: &SourceLine<'_>, offset: usize) -> Result<MotionWords, ParseError> {
    let body = line.body;
    let end = body[offset..].find(';').map_or(body.len(), |pos| offset + pos);
    let bytes = body.as_bytes();
    let mut words = MotionWords::default();
    // 跳过 G 指令本身
    let mut pos = offset + 1;
    while pos < end && bytes[pos].is_ascii_digit() {
        pos += 1;
    }
    while pos < end {
        let byte = bytes[pos];
        if byte.is_ascii_whitespace() {
            pos += 1;
            continue;
        }
        if !byte.is_ascii_alphabetic() {
            pos += 1;
            continue;
        }
        let letter = byte.to_ascii_uppercase();
        let value_start = pos + 1;
        let mut value_end = value_start;
        while value_end < end
            && !bytes[value_end].is_ascii_whitespace()
            && !bytes[value_end].is_ascii_alphabetic()
        {
            value_end += 1;
        }
        let slot = match letter {
            b'X' => Some(&mut words.x),
            b'Y' => Some(&mut words.y),
            b'I' => Some(&mut words.i),
            b'J' => Some(&mut words.j),
            _ => None,
        };
        if let Some(slot) = slot {
            let field = &body[value_start..value_end];
            let value = parse_decimal(field).ok_or_else(|| ParseError::InvalidNumber {
                line: line.number,
                column: line.column(pos),
                field: body[pos..value_end].to_string(),
            })?;
            *slot = Some(value);
        }
        pos = value_end;
    }
    Ok(words)
}

/// 方言的数值格式：可带符号的十进制定点数，`[-+]?(\d+\.?\d*|\.\d+)`，不接受指数。
pub(crate) fn parse_decimal(field: &str) -> Option<f64> {
    let (negative, unsigned) = match field.as_bytes().first() {
        Some(b'-') => (true, &field[1..]),
        Some(b'+') => (false, &field[1..]),
        _ => (false, field),
    };
    let (int_part, frac_part) = match unsigned.split_once('.') {
        Some((int_part, frac_part)) => (int_part, Some(frac_part)),
        None => (unsigned, None),
    };
    let all_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    if !all_digits(int_part) || !frac_part.is_none_or(all_digits) {
        return None;
    }
    let frac_part = frac_part.unwrap_or("");
    if int_part.is_empty() && frac_part.is_empty() {
        return None;
    }
    let normalized = format!(
        "{}.{}",
        if int_part.is_empty() { "0" } else { int_part },
        if frac_part.is_empty() { "0" } else { frac_part }
    );
    let value = normalized.parse::<f64>().ok()?;
    Some(if negative { -value } else { value })
}

fn arg_or(args: &[f64], index: usize, default: f64) -> f64 {
    args.get(index).copied().unwrap_or(default)
}

/// 程序号、工艺号等整型代码。非负整数才有效。
fn as_code(value: f64) -> Option<u32> {
    (value >= 0.0 && value.fract() == 0.0 && value <= u32::MAX as f64).then_some(value as u32)
}
