use crate::error::{Result, TemplateError};
use crate::value::Value;

/// Set of bytes accepted by a `%[...]` directive.
#[derive(Clone, Copy, Default, PartialEq, Eq)]
pub struct ByteSet([u64; 4]);

impl ByteSet {
    pub fn insert(&mut self, byte: u8) {
        self.0[usize::from(byte >> 6)] |= 1 << (byte & 63);
    }

    pub fn contains(&self, byte: u8) -> bool {
        self.0[usize::from(byte >> 6)] & (1 << (byte & 63)) != 0
    }

    fn invert(&mut self) {
        for word in &mut self.0 {
            *word = !*word;
        }
    }
}

impl std::fmt::Debug for ByteSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let members: Vec<u8> = (0..=255u8).filter(|&b| self.contains(b)).collect();
        write!(f, "ByteSet(\"{}\")", members.escape_ascii())
    }
}

/// What a directive reads from the input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conversion {
    /// `%d`, `%i`: signed decimal.
    Int,
    /// `%u`: unsigned decimal.
    Uint,
    /// `%x`, `%X`: hexadecimal, optional `0x` prefix.
    Hex,
    /// `%f`, `%e`, `%g`: floating point.
    Float,
    /// `%s`: run of non-whitespace bytes.
    Str,
    /// `%c`: exactly `width` bytes (default one).
    Char,
    /// `%[...]`: run of bytes from a set.
    Set(ByteSet),
    /// `%n`: number of input bytes consumed so far.
    Count,
}

impl Conversion {
    fn skips_leading_space(self) -> bool {
        !matches!(self, Conversion::Char | Conversion::Set(_) | Conversion::Count)
    }
}

/// A `%` directive: conversion, discard flag (`%*`), and optional width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Directive {
    pub conversion: Conversion,
    pub discard: bool,
    pub width: Option<usize>,
}

impl Directive {
    /// The trailing marker appended by the match compiler.
    pub(crate) fn consumed_marker() -> Self {
        Self {
            conversion: Conversion::Count,
            discard: false,
            width: None,
        }
    }

    /// Match this directive at `pos`. Returns the value and the position
    /// after it, or `None` when the input does not fit.
    ///
    /// Numeric spans are converted even when discarding so that a value
    /// which overflows its type is rejected by both passes alike.
    fn apply(&self, input: &[u8], pos: usize) -> Option<(Option<Value>, usize)> {
        if self.conversion == Conversion::Count {
            let value = (!self.discard).then_some(Value::Uint(pos as u64));
            return Some((value, pos));
        }

        let start = if self.conversion.skips_leading_space() {
            skip_space(input, pos)
        } else {
            pos
        };
        let limit = self
            .width
            .map_or(input.len(), |w| start.saturating_add(w).min(input.len()));

        let end = match self.conversion {
            Conversion::Int => decimal_end(input, start, limit, true)?,
            Conversion::Uint => decimal_end(input, start, limit, false)?,
            Conversion::Hex => hex_end(input, start, limit)?,
            Conversion::Float => float_end(input, start, limit)?,
            Conversion::Str => run_end(input, start, limit, |b| !b.is_ascii_whitespace())?,
            Conversion::Set(set) => run_end(input, start, limit, |b| set.contains(b))?,
            Conversion::Char => {
                let end = start.checked_add(self.width.unwrap_or(1))?;
                if end > input.len() {
                    return None;
                }
                end
            }
            Conversion::Count => return Some((None, pos)),
        };

        let span = &input[start..end];
        let value = match self.conversion {
            Conversion::Int => Some(Value::Int(ascii(span).parse().ok()?)),
            Conversion::Uint => Some(Value::Uint(ascii(span).parse().ok()?)),
            Conversion::Hex => Some(Value::Uint(parse_hex(span)?)),
            Conversion::Float => Some(Value::Float(ascii(span).parse().ok()?)),
            _ if self.discard => None,
            _ => Some(Value::Str(String::from_utf8_lossy(span).into_owned())),
        };
        Some((value.filter(|_| !self.discard), end))
    }
}

/// One piece of a template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Bytes that must appear verbatim.
    Literal(Vec<u8>),
    /// Zero or more whitespace bytes.
    Space,
    Directive(Directive),
}

/// A parsed scan template: literals, whitespace, and capture directives.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Template {
    segments: Vec<Segment>,
}

impl Template {
    pub fn parse(text: &str) -> Result<Self> {
        Self::parse_bytes(text.as_bytes())
    }

    pub fn parse_bytes(text: &[u8]) -> Result<Self> {
        let mut segments = Vec::new();
        let mut literal = Vec::new();
        let mut i = 0;

        while i < text.len() {
            let byte = text[i];

            if byte.is_ascii_whitespace() {
                flush_literal(&mut literal, &mut segments);
                if segments.last() != Some(&Segment::Space) {
                    segments.push(Segment::Space);
                }
                while i < text.len() && text[i].is_ascii_whitespace() {
                    i += 1;
                }
                continue;
            }

            if byte != b'%' {
                literal.push(byte);
                i += 1;
                continue;
            }

            let position = i;
            i += 1;
            if text.get(i) == Some(&b'%') {
                literal.push(b'%');
                i += 1;
                continue;
            }

            let discard = text.get(i) == Some(&b'*');
            if discard {
                i += 1;
            }

            let digits_start = i;
            while text.get(i).is_some_and(u8::is_ascii_digit) {
                i += 1;
            }
            let width = ascii(&text[digits_start..i]).parse().ok();

            while matches!(text.get(i), Some(b'h' | b'l' | b'L' | b'z' | b'j' | b't')) {
                i += 1;
            }

            let conversion = match text.get(i) {
                None => return Err(TemplateError::UnterminatedDirective { position }),
                Some(b'd' | b'i') => Conversion::Int,
                Some(b'u') => Conversion::Uint,
                Some(b'x' | b'X') => Conversion::Hex,
                Some(b'f' | b'F' | b'e' | b'E' | b'g' | b'G') => Conversion::Float,
                Some(b's') => Conversion::Str,
                Some(b'c') => Conversion::Char,
                Some(b'n') => Conversion::Count,
                Some(b'[') => {
                    let (set, next) = parse_scanset(text, i + 1, position)?;
                    i = next - 1;
                    Conversion::Set(set)
                }
                Some(&other) => {
                    return Err(TemplateError::UnknownConversion {
                        conversion: char::from(other),
                        position,
                    })
                }
            };
            i += 1;

            flush_literal(&mut literal, &mut segments);
            segments.push(Segment::Directive(Directive {
                conversion,
                discard,
                width,
            }));
        }

        flush_literal(&mut literal, &mut segments);
        Ok(Self { segments })
    }

    pub(crate) fn from_segments(segments: Vec<Segment>) -> Self {
        Self { segments }
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Number of directives that store a value.
    pub fn capture_count(&self) -> usize {
        self.segments
            .iter()
            .filter(|s| matches!(s, Segment::Directive(d) if !d.discard))
            .count()
    }

    /// Copy of this template with every directive turned into a discard
    /// directive. Directives that already discard are left as they are.
    pub fn discarding(&self) -> Template {
        let segments = self
            .segments
            .iter()
            .map(|segment| match segment {
                Segment::Directive(d) if !d.discard => Segment::Directive(Directive {
                    discard: true,
                    ..*d
                }),
                other => other.clone(),
            })
            .collect();
        Template { segments }
    }

    /// Run the template over `input` and return the stored values.
    ///
    /// Like `sscanf`, scanning stops at the first segment that does not fit;
    /// values stored before that point are still returned.
    pub fn scan(&self, input: &[u8]) -> Vec<Value> {
        let mut values = Vec::with_capacity(self.capture_count());
        let mut pos = 0;

        for segment in &self.segments {
            match segment {
                Segment::Literal(bytes) => {
                    if !input[pos..].starts_with(bytes) {
                        break;
                    }
                    pos += bytes.len();
                }
                Segment::Space => pos = skip_space(input, pos),
                Segment::Directive(directive) => match directive.apply(input, pos) {
                    Some((value, next)) => {
                        values.extend(value);
                        pos = next;
                    }
                    None => break,
                },
            }
        }

        values
    }
}

impl std::str::FromStr for Template {
    type Err = TemplateError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

fn flush_literal(literal: &mut Vec<u8>, segments: &mut Vec<Segment>) {
    if !literal.is_empty() {
        segments.push(Segment::Literal(std::mem::take(literal)));
    }
}

/// Parse the body of `%[...]` starting just after the `[`. Returns the set
/// and the index one past the closing `]`.
fn parse_scanset(text: &[u8], mut i: usize, position: usize) -> Result<(ByteSet, usize)> {
    let mut set = ByteSet::default();
    let negated = text.get(i) == Some(&b'^');
    if negated {
        i += 1;
    }
    if text.get(i) == Some(&b']') {
        set.insert(b']');
        i += 1;
    }

    loop {
        match text.get(i) {
            None => return Err(TemplateError::UnterminatedScanset { position }),
            Some(b']') => break,
            Some(&low) => {
                let is_range = text.get(i + 1) == Some(&b'-')
                    && text.get(i + 2).is_some_and(|&b| b != b']');
                if is_range {
                    let high = text[i + 2];
                    for b in low.min(high)..=low.max(high) {
                        set.insert(b);
                    }
                    i += 3;
                } else {
                    set.insert(low);
                    i += 1;
                }
            }
        }
    }

    if negated {
        set.invert();
    }
    Ok((set, i + 1))
}

fn ascii(bytes: &[u8]) -> &str {
    std::str::from_utf8(bytes).unwrap_or("")
}

fn skip_space(input: &[u8], mut pos: usize) -> usize {
    while pos < input.len() && input[pos].is_ascii_whitespace() {
        pos += 1;
    }
    pos
}

fn digits_end(input: &[u8], mut pos: usize, limit: usize, hex: bool) -> usize {
    while pos < limit && (input[pos].is_ascii_digit() || (hex && input[pos].is_ascii_hexdigit())) {
        pos += 1;
    }
    pos
}

fn run_end(input: &[u8], start: usize, limit: usize, accept: impl Fn(u8) -> bool) -> Option<usize> {
    let mut end = start;
    while end < limit && accept(input[end]) {
        end += 1;
    }
    (end > start).then_some(end)
}

fn decimal_end(input: &[u8], start: usize, limit: usize, signed: bool) -> Option<usize> {
    let mut pos = start;
    if pos < limit && (input[pos] == b'+' || (signed && input[pos] == b'-')) {
        pos += 1;
    }
    let end = digits_end(input, pos, limit, false);
    (end > pos).then_some(end)
}

fn hex_end(input: &[u8], start: usize, limit: usize) -> Option<usize> {
    let mut pos = start;
    let has_prefix = pos + 2 < limit
        && input[pos] == b'0'
        && (input[pos + 1] | 0x20) == b'x'
        && input[pos + 2].is_ascii_hexdigit();
    if has_prefix {
        pos += 2;
    }
    let end = digits_end(input, pos, limit, true);
    (end > pos).then_some(end)
}

fn parse_hex(span: &[u8]) -> Option<u64> {
    let digits = match span {
        [b'0', x, rest @ ..] if (x | 0x20) == b'x' && !rest.is_empty() => rest,
        _ => span,
    };
    u64::from_str_radix(ascii(digits), 16).ok()
}

fn float_end(input: &[u8], start: usize, limit: usize) -> Option<usize> {
    let mut pos = start;
    if pos < limit && matches!(input[pos], b'+' | b'-') {
        pos += 1;
    }
    let int_end = digits_end(input, pos, limit, false);
    let mut digits = int_end - pos;
    pos = int_end;

    if pos < limit && input[pos] == b'.' {
        let frac_end = digits_end(input, pos + 1, limit, false);
        digits += frac_end - (pos + 1);
        pos = frac_end;
    }
    if digits == 0 {
        return None;
    }

    if pos < limit && (input[pos] | 0x20) == b'e' {
        let mut exp = pos + 1;
        if exp < limit && matches!(input[exp], b'+' | b'-') {
            exp += 1;
        }
        let exp_end = digits_end(input, exp, limit, false);
        if exp_end > exp {
            pos = exp_end;
        }
    }
    Some(pos)
}
