//! Literal decoding and rendering for protocol source.
//!
//! Decoding turns number and string tokens into values with the target
//! language's semantics (underscore separators, radix prefixes, string
//! prefixes and escapes). Rendering produces the canonical literal spelling
//! used when a value is spliced back into source: `True`, `0.5`, `'text'`.

use tree_sitter::Node;

use crate::errors::{ScanError, ScanResult};
use crate::models::{Number, ParameterValue};
use crate::syntax::parser::node_text;

// ---------------------------------------------------------------------------
// Numbers
// ---------------------------------------------------------------------------

fn parse_radix(digits: &str, radix: u32) -> Option<i64> {
    if digits.is_empty() {
        return None;
    }
    i64::from_str_radix(digits, radix).ok()
}

/// Parse an integer or float token. Imaginary literals are not numbers here.
pub fn parse_number(text: &str) -> Option<Number> {
    let cleaned: String = text.chars().filter(|c| *c != '_').collect();
    if cleaned.ends_with(['j', 'J']) {
        return None;
    }
    let cleaned = cleaned.trim_end_matches(['l', 'L']);
    let lower = cleaned.to_ascii_lowercase();

    if let Some(hex) = lower.strip_prefix("0x") {
        return parse_radix(hex, 16).map(Number::Int);
    }
    if let Some(oct) = lower.strip_prefix("0o") {
        return parse_radix(oct, 8).map(Number::Int);
    }
    if let Some(bin) = lower.strip_prefix("0b") {
        return parse_radix(bin, 2).map(Number::Int);
    }
    if lower.contains(['.', 'e']) {
        return lower.parse::<f64>().ok().map(Number::Float);
    }
    lower.parse::<i64>().ok().map(Number::Int)
}

/// Shortest round-trip float spelling, as Python's `repr` prints it.
///
/// Switches to exponent notation when the decimal point falls more than 16
/// digits right or 4 digits left of the first significant digit.
pub fn format_float(value: f64) -> String {
    if value.is_nan() {
        return "nan".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "inf" } else { "-inf" }.to_string();
    }

    let sci = format!("{:e}", value.abs());
    let (mantissa, exponent) = sci.split_once('e').unwrap_or((sci.as_str(), "0"));
    let exponent: i32 = exponent.parse().unwrap_or(0);
    let digits: String = mantissa.chars().filter(|c| c.is_ascii_digit()).collect();
    let decpt = exponent + 1;
    let sign = if value.is_sign_negative() { "-" } else { "" };

    if decpt <= -4 || decpt > 16 {
        let (first, rest) = digits.split_at(1);
        let fraction = if rest.is_empty() {
            String::new()
        } else {
            format!(".{rest}")
        };
        let exp_sign = if exponent < 0 { '-' } else { '+' };
        return format!("{sign}{first}{fraction}e{exp_sign}{:02}", exponent.abs());
    }

    let body = if decpt <= 0 {
        format!("0.{}{digits}", "0".repeat((-decpt) as usize))
    } else if decpt as usize >= digits.len() {
        format!("{digits}{}.0", "0".repeat(decpt as usize - digits.len()))
    } else {
        let (whole, fraction) = digits.split_at(decpt as usize);
        format!("{whole}.{fraction}")
    };
    format!("{sign}{body}")
}

// ---------------------------------------------------------------------------
// Strings
// ---------------------------------------------------------------------------

fn read_hex(chars: &mut std::iter::Peekable<std::str::Chars<'_>>, count: usize) -> Option<char> {
    let mut code = 0u32;
    for _ in 0..count {
        let digit = chars.next()?.to_digit(16)?;
        code = code * 16 + digit;
    }
    char::from_u32(code)
}

/// Process backslash escapes of a non-raw string body.
///
/// Returns `None` for escapes that need a lookup table we do not carry
/// (`\N{...}`) or that encode invalid code points.
pub fn unescape(body: &str) -> Option<String> {
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let Some(next) = chars.next() else {
            out.push('\\');
            break;
        };
        match next {
            '\n' => {}
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
            }
            '\\' | '\'' | '"' => out.push(next),
            'a' => out.push('\u{07}'),
            'b' => out.push('\u{08}'),
            'f' => out.push('\u{0c}'),
            'n' => out.push('\n'),
            'r' => out.push('\r'),
            't' => out.push('\t'),
            'v' => out.push('\u{0b}'),
            'x' => out.push(read_hex(&mut chars, 2)?),
            'u' => out.push(read_hex(&mut chars, 4)?),
            'U' => out.push(read_hex(&mut chars, 8)?),
            '0'..='7' => {
                let mut code = next.to_digit(8)?;
                for _ in 0..2 {
                    match chars.peek().and_then(|d| d.to_digit(8)) {
                        Some(d) => {
                            code = code * 8 + d;
                            chars.next();
                        }
                        None => break,
                    }
                }
                out.push(char::from_u32(code)?);
            }
            'N' => return None,
            other => {
                out.push('\\');
                out.push(other);
            }
        }
    }
    Some(out)
}

/// Decode one string token including its prefix and quotes.
///
/// Bytes and formatted strings are not plain text constants and yield `None`.
pub fn decode_string_token(text: &str) -> Option<String> {
    let prefix_len = text
        .find(|c: char| c == '\'' || c == '"')
        .filter(|idx| *idx <= 3)?;
    let prefix = text[..prefix_len].to_ascii_lowercase();
    if prefix.contains(['b', 'f', 't']) {
        return None;
    }
    let raw = prefix.contains('r');

    let rest = &text[prefix_len..];
    let quote = ["\"\"\"", "'''", "\"", "'"]
        .into_iter()
        .find(|q| rest.starts_with(q) && rest.len() >= 2 * q.len() && rest.ends_with(q))?;
    let body = &rest[quote.len()..rest.len() - quote.len()];

    if raw {
        Some(body.to_string())
    } else {
        unescape(body)
    }
}

/// Value of a `string` or `concatenated_string` node.
pub fn string_literal(node: Node<'_>, source: &str) -> Option<String> {
    match node.kind() {
        "string" => {
            let mut cursor = node.walk();
            let interpolated = node
                .named_children(&mut cursor)
                .any(|child| child.kind() == "interpolation");
            if interpolated {
                return None;
            }
            decode_string_token(node_text(node, source)?)
        }
        "concatenated_string" => {
            let mut cursor = node.walk();
            let mut out = String::new();
            for part in node.named_children(&mut cursor) {
                if part.kind() == "comment" {
                    continue;
                }
                out.push_str(&string_literal(part, source)?);
            }
            Some(out)
        }
        _ => None,
    }
}

/// Quote a string the way Python's `repr` does.
pub fn quote_string(value: &str) -> String {
    let quote = if value.contains('\'') && !value.contains('"') {
        '"'
    } else {
        '\''
    };
    let mut out = String::with_capacity(value.len() + 2);
    out.push(quote);
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c if (c as u32) < 0x20 || c as u32 == 0x7f => {
                out.push_str(&format!("\\x{:02x}", c as u32));
            }
            c => out.push(c),
        }
    }
    out.push(quote);
    out
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

/// Source spelling of a numeric value.
pub fn render_number(value: Number) -> ScanResult<String> {
    match value {
        Number::Int(i) => Ok(i.to_string()),
        Number::Float(f) if f.is_finite() => Ok(format_float(f)),
        Number::Float(f) => Err(ScanError::Literal(format!(
            "non-finite float {f} has no literal form"
        ))),
    }
}

/// Source spelling of a parameter value.
pub fn render_literal(value: &ParameterValue) -> ScanResult<String> {
    match value {
        ParameterValue::None => Ok("None".to_string()),
        ParameterValue::Bool(true) => Ok("True".to_string()),
        ParameterValue::Bool(false) => Ok("False".to_string()),
        ParameterValue::Int(i) => render_number(Number::Int(*i)),
        ParameterValue::Float(f) => render_number(Number::Float(*f)),
        ParameterValue::Str(s) => Ok(quote_string(s)),
    }
}
