use crate::error::{Result, TemplateError};
use crate::value::Value;

/// Destination for formatted command bytes.
pub trait FormatSink {
    fn put(&mut self, bytes: &[u8]) -> Result<()>;
}

impl FormatSink for Vec<u8> {
    fn put(&mut self, bytes: &[u8]) -> Result<()> {
        self.extend_from_slice(bytes);
        Ok(())
    }
}

impl<S: FormatSink + ?Sized> FormatSink for &mut S {
    fn put(&mut self, bytes: &[u8]) -> Result<()> {
        (**self).put(bytes)
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct Spec {
    left: bool,
    zero: bool,
    plus: bool,
    space: bool,
    alternate: bool,
    width: usize,
    precision: Option<usize>,
}

/// Render `template` with `args` into `sink`, printf style.
///
/// Supported conversions are `%d %i %u %x %X %f %F %s %c %%` with the flags
/// `- 0 + space #`, a width and a `.precision`. Length modifiers are
/// accepted and ignored since every argument already carries its own type.
/// Every argument must be consumed. Returns the number of bytes written.
pub fn format_into<S: FormatSink + ?Sized>(
    template: &str,
    args: &[Value],
    sink: &mut S,
) -> Result<usize> {
    let text = template.as_bytes();
    let mut written = 0;
    let mut next_arg = 0;
    let mut literal_start = 0;
    let mut i = 0;

    while i < text.len() {
        if text[i] != b'%' {
            i += 1;
            continue;
        }

        written += emit(sink, &text[literal_start..i])?;
        let position = i;
        i += 1;

        if text.get(i) == Some(&b'%') {
            written += emit(sink, b"%")?;
            i += 1;
            literal_start = i;
            continue;
        }

        let mut spec = Spec::default();
        while let Some(&flag) = text.get(i) {
            match flag {
                b'-' => spec.left = true,
                b'0' => spec.zero = true,
                b'+' => spec.plus = true,
                b' ' => spec.space = true,
                b'#' => spec.alternate = true,
                _ => break,
            }
            i += 1;
        }

        let (width, next) = number(text, i);
        spec.width = width.unwrap_or(0);
        i = next;

        if text.get(i) == Some(&b'.') {
            let (precision, next) = number(text, i + 1);
            spec.precision = Some(precision.unwrap_or(0));
            i = next;
        }

        while matches!(
            text.get(i),
            Some(b'h' | b'l' | b'L' | b'z' | b'j' | b't' | b'q')
        ) {
            i += 1;
        }

        let conversion = *text
            .get(i)
            .ok_or(TemplateError::UnterminatedDirective { position })?;
        i += 1;
        literal_start = i;

        let index = next_arg;
        let arg = args
            .get(index)
            .ok_or(TemplateError::MissingArgument { index })?;
        next_arg += 1;

        let (prefix, body, numeric) = match conversion {
            b'd' | b'i' => {
                let (negative, magnitude) = signed(arg, index)?;
                let digits = with_precision(magnitude.to_string().into_bytes(), spec.precision);
                (sign_prefix(negative, &spec), digits, spec.precision.is_none())
            }
            b'u' => {
                let digits = unsigned(arg, index)?.to_string().into_bytes();
                (Vec::new(), with_precision(digits, spec.precision), spec.precision.is_none())
            }
            b'x' | b'X' => {
                let v = unsigned(arg, index)?;
                let mut digits = format!("{v:x}").into_bytes();
                let mut prefix = if spec.alternate && v != 0 {
                    b"0x".to_vec()
                } else {
                    Vec::new()
                };
                if conversion == b'X' {
                    digits.make_ascii_uppercase();
                    prefix.make_ascii_uppercase();
                }
                (prefix, with_precision(digits, spec.precision), spec.precision.is_none())
            }
            b'f' | b'F' => {
                let v = float(arg, index)?;
                let precision = spec.precision.unwrap_or(6);
                let mut digits = format!("{:.*}", precision, v.abs()).into_bytes();
                if spec.alternate && precision == 0 && v.is_finite() {
                    digits.push(b'.');
                }
                if conversion == b'F' {
                    digits.make_ascii_uppercase();
                }
                (
                    sign_prefix(v.is_sign_negative() && !v.is_nan(), &spec),
                    digits,
                    v.is_finite(),
                )
            }
            b's' => {
                let s = arg.as_str().ok_or(TemplateError::ArgumentType {
                    index,
                    expected: "string",
                    found: arg.kind(),
                })?;
                let bytes = s.as_bytes();
                let take = spec.precision.map_or(bytes.len(), |p| p.min(bytes.len()));
                (Vec::new(), bytes[..take].to_vec(), false)
            }
            b'c' => (Vec::new(), vec![character(arg, index)?], false),
            other => {
                return Err(TemplateError::UnknownConversion {
                    conversion: char::from(other),
                    position,
                })
            }
        };

        written += pad(sink, &spec, &prefix, &body, numeric)?;
    }

    written += emit(sink, &text[literal_start..])?;

    if next_arg < args.len() {
        return Err(TemplateError::ExtraArguments {
            used: next_arg,
            provided: args.len(),
        });
    }
    Ok(written)
}

/// Render `template` with `args` into a fresh byte vector.
pub fn format_bytes(template: &str, args: &[Value]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    format_into(template, args, &mut out)?;
    Ok(out)
}

fn emit<S: FormatSink + ?Sized>(sink: &mut S, bytes: &[u8]) -> Result<usize> {
    if !bytes.is_empty() {
        sink.put(bytes)?;
    }
    Ok(bytes.len())
}

fn number(text: &[u8], mut i: usize) -> (Option<usize>, usize) {
    let start = i;
    let mut value: usize = 0;
    while let Some(d) = text.get(i).filter(|b| b.is_ascii_digit()) {
        value = value.saturating_mul(10).saturating_add(usize::from(d - b'0'));
        i += 1;
    }
    ((i > start).then_some(value), i)
}

fn pad<S: FormatSink + ?Sized>(
    sink: &mut S,
    spec: &Spec,
    prefix: &[u8],
    body: &[u8],
    zero_allowed: bool,
) -> Result<usize> {
    let len = prefix.len() + body.len();
    let fill = spec.width.saturating_sub(len);
    let mut out = Vec::with_capacity(len + fill);

    if spec.left {
        out.extend_from_slice(prefix);
        out.extend_from_slice(body);
        out.resize(len + fill, b' ');
    } else if spec.zero && zero_allowed {
        out.extend_from_slice(prefix);
        out.resize(prefix.len() + fill, b'0');
        out.extend_from_slice(body);
    } else {
        out.resize(fill, b' ');
        out.extend_from_slice(prefix);
        out.extend_from_slice(body);
    }
    emit(sink, &out)
}

fn sign_prefix(negative: bool, spec: &Spec) -> Vec<u8> {
    if negative {
        b"-".to_vec()
    } else if spec.plus {
        b"+".to_vec()
    } else if spec.space {
        b" ".to_vec()
    } else {
        Vec::new()
    }
}

fn with_precision(digits: Vec<u8>, precision: Option<usize>) -> Vec<u8> {
    match precision {
        Some(0) if digits == b"0" => Vec::new(),
        Some(p) if p > digits.len() => {
            let mut padded = vec![b'0'; p - digits.len()];
            padded.extend_from_slice(&digits);
            padded
        }
        _ => digits,
    }
}

fn signed(arg: &Value, index: usize) -> Result<(bool, u64)> {
    match arg {
        Value::Int(v) => Ok((*v < 0, v.unsigned_abs())),
        Value::Uint(v) => Ok((false, *v)),
        other => Err(TemplateError::ArgumentType {
            index,
            expected: "integer",
            found: other.kind(),
        }),
    }
}

fn unsigned(arg: &Value, index: usize) -> Result<u64> {
    match arg {
        Value::Uint(v) => Ok(*v),
        Value::Int(v) if *v >= 0 => Ok(v.unsigned_abs()),
        other => Err(TemplateError::ArgumentType {
            index,
            expected: "unsigned integer",
            found: other.kind(),
        }),
    }
}

fn float(arg: &Value, index: usize) -> Result<f64> {
    match arg {
        Value::Float(v) => Ok(*v),
        Value::Int(v) => Ok(*v as f64),
        Value::Uint(v) => Ok(*v as f64),
        other => Err(TemplateError::ArgumentType {
            index,
            expected: "float",
            found: other.kind(),
        }),
    }
}

fn character(arg: &Value, index: usize) -> Result<u8> {
    let byte = match arg {
        Value::Uint(v) => u8::try_from(*v).ok(),
        Value::Int(v) => u8::try_from(*v).ok(),
        Value::Str(s) if s.len() == 1 => s.bytes().next(),
        _ => None,
    };
    byte.ok_or(TemplateError::ArgumentType {
        index,
        expected: "single byte",
        found: arg.kind(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args;

    fn render(template: &str, args: &[Value]) -> String {
        String::from_utf8(format_bytes(template, args).unwrap()).unwrap()
    }

    #[test]
    fn formats_integer_argument() {
        assert_eq!(render("AT+CMD=%d", &args![5]), "AT+CMD=5");
        assert_eq!(render("AT+X=%i,%u", &args![-7, 3u32]), "AT+X=-7,3");
    }

    #[test]
    fn plain_text_passes_through() {
        assert_eq!(render("AT", &[]), "AT");
        assert_eq!(render("100%%", &[]), "100%");
    }

    #[test]
    fn width_flags_and_precision() {
        assert_eq!(render("[%5d]", &args![42]), "[   42]");
        assert_eq!(render("[%-5d]", &args![42]), "[42   ]");
        assert_eq!(render("[%05d]", &args![-42]), "[-0042]");
        assert_eq!(render("[%+d]", &args![7]), "[+7]");
        assert_eq!(render("[% d]", &args![7]), "[ 7]");
        assert_eq!(render("[%.3d]", &args![7]), "[007]");
        assert_eq!(render("[%.0d]", &args![0]), "[]");
    }

    #[test]
    fn hex_and_alternate_form() {
        assert_eq!(render("%x", &args![255]), "ff");
        assert_eq!(render("%X", &args![255]), "FF");
        assert_eq!(render("%#x", &args![255]), "0xff");
        assert_eq!(render("%#06x", &args![255]), "0x00ff");
        assert_eq!(render("%#x", &args![0]), "0");
    }

    #[test]
    fn floats_default_to_six_places() {
        assert_eq!(render("%f", &args![1.5]), "1.500000");
        assert_eq!(render("%.2f", &args![-1.236]), "-1.24");
        assert_eq!(render("%08.3f", &args![3.14159]), "0003.142");
        assert_eq!(render("%.1f", &args![2]), "2.0");
    }

    #[test]
    fn strings_and_chars() {
        assert_eq!(
            render("AT+CGDCONT=1,\"%s\",\"%s\"", &args!["IP", "internet"]),
            "AT+CGDCONT=1,\"IP\",\"internet\""
        );
        assert_eq!(render("[%-6s]", &args!["ab"]), "[ab    ]");
        assert_eq!(render("[%.2s]", &args!["abcdef"]), "[ab]");
        assert_eq!(render("%c%c", &args!['A', 0x1Au8]), "A\u{1a}");
    }

    #[test]
    fn length_modifiers_are_ignored() {
        assert_eq!(render("%ld %hhu %lld", &args![1, 2u8, 3]), "1 2 3");
    }

    #[test]
    fn returns_byte_count() {
        let mut out = Vec::new();
        let n = format_into("AT+CMD=%d", &args![123], &mut out).unwrap();
        assert_eq!(n, out.len());
        assert_eq!(n, 10);
    }

    #[test]
    fn missing_argument_is_reported() {
        let err = format_bytes("AT+X=%d,%d", &args![1]).unwrap_err();
        assert_eq!(err, TemplateError::MissingArgument { index: 1 });
    }

    #[test]
    fn extra_arguments_are_reported() {
        let err = format_bytes("AT", &args![1]).unwrap_err();
        assert_eq!(err, TemplateError::ExtraArguments { used: 0, provided: 1 });
    }

    #[test]
    fn argument_kind_must_fit_directive() {
        let err = format_bytes("%d", &args!["five"]).unwrap_err();
        assert!(matches!(err, TemplateError::ArgumentType { index: 0, .. }));
        let err = format_bytes("%u", &args![-1]).unwrap_err();
        assert!(matches!(err, TemplateError::ArgumentType { index: 0, .. }));
        let err = format_bytes("%s", &args![1]).unwrap_err();
        assert!(matches!(err, TemplateError::ArgumentType { index: 0, .. }));
    }

    #[test]
    fn bad_directives_are_reported() {
        assert_eq!(
            format_bytes("AT%", &[]).unwrap_err(),
            TemplateError::UnterminatedDirective { position: 2 }
        );
        assert!(matches!(
            format_bytes("%e", &args![1.0]).unwrap_err(),
            TemplateError::UnknownConversion { conversion: 'e', .. }
        ));
    }

    struct Bounded {
        out: Vec<u8>,
        capacity: usize,
    }

    impl FormatSink for Bounded {
        fn put(&mut self, bytes: &[u8]) -> Result<()> {
            if self.out.len() + bytes.len() > self.capacity {
                return Err(TemplateError::Overflow {
                    capacity: self.capacity,
                });
            }
            self.out.extend_from_slice(bytes);
            Ok(())
        }
    }

    #[test]
    fn sink_errors_propagate() {
        let mut sink = Bounded {
            out: Vec::new(),
            capacity: 4,
        };
        let err = format_into("AT+CMD=%d", &args![1], &mut sink).unwrap_err();
        assert_eq!(err, TemplateError::Overflow { capacity: 4 });
    }
}
