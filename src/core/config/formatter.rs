//! Placeholder syntax shared by configuration values and command lines.
//!
//! Supported forms:
//! - `{name}` and `{name:spec}` fields, with `{{` and `}}` as literal braces;
//! - `${VAR}` and `$VAR` environment references;
//! - `<ENV:VAR>` deferred environment markers.
//!
//! Format specs follow the `[[fill]align][0][width][.precision][type]` subset
//! with `align` in `<>^` and `type` in `d`, `s`, `f`.

use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::OnceLock;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum TemplateError {
    #[error("unbalanced '{brace}' at offset {offset}")]
    Unbalanced { brace: char, offset: usize },

    #[error("empty field at offset {0}")]
    EmptyField(usize),

    #[error("unsupported format spec '{0}'")]
    BadSpec(String),

    #[error("format spec '{spec}' cannot be applied to {value}")]
    SpecMismatch { spec: String, value: String },
}

/// Piece of a parsed template.
#[derive(Debug, Clone, PartialEq)]
pub enum Segment<'a> {
    Literal(String),
    Field {
        name: &'a str,
        spec: Option<&'a str>,
        raw: &'a str,
    },
}

impl Segment<'_> {
    /// Field text exactly as written, including braces.
    pub fn field_text(name: &str, spec: Option<&str>) -> String {
        match spec {
            Some(spec) => format!("{{{}:{}}}", name, spec),
            None => format!("{{{}}}", name),
        }
    }
}

/// Split a template into literal text and `{field}` segments.
pub fn parse_template(text: &str) -> Result<Vec<Segment<'_>>, TemplateError> {
    let bytes = text.as_bytes();
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut i = 0;
    let mut chunk_start = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'{' if bytes.get(i + 1) == Some(&b'{') => {
                literal.push_str(&text[chunk_start..i]);
                literal.push('{');
                i += 2;
                chunk_start = i;
            }
            b'}' if bytes.get(i + 1) == Some(&b'}') => {
                literal.push_str(&text[chunk_start..i]);
                literal.push('}');
                i += 2;
                chunk_start = i;
            }
            b'}' => {
                return Err(TemplateError::Unbalanced {
                    brace: '}',
                    offset: i,
                })
            }
            b'{' => {
                literal.push_str(&text[chunk_start..i]);
                let close = text[i + 1..]
                    .find(['{', '}'])
                    .map(|pos| pos + i + 1)
                    .filter(|pos| bytes[*pos] == b'}')
                    .ok_or(TemplateError::Unbalanced {
                        brace: '{',
                        offset: i,
                    })?;
                let raw = &text[i..=close];
                let body = &text[i + 1..close];
                if body.is_empty() {
                    return Err(TemplateError::EmptyField(i));
                }
                let (name, spec) = match body.split_once(':') {
                    Some((name, spec)) => (name, Some(spec)),
                    None => (body, None),
                };
                if !literal.is_empty() {
                    segments.push(Segment::Literal(std::mem::take(&mut literal)));
                }
                segments.push(Segment::Field { name, spec, raw });
                i = close + 1;
                chunk_start = i;
            }
            _ => i += 1,
        }
    }
    literal.push_str(&text[chunk_start..]);
    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }
    Ok(segments)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Align {
    Left,
    Right,
    Center,
}

/// Parsed `{name:spec}` format specification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatSpec {
    fill: char,
    align: Option<Align>,
    zero: bool,
    width: usize,
    precision: Option<usize>,
    kind: Option<char>,
}

impl FormatSpec {
    pub fn parse(spec: &str) -> Result<Self, TemplateError> {
        let bad = || TemplateError::BadSpec(spec.to_string());
        let chars: Vec<char> = spec.chars().collect();
        let align_of = |c: char| match c {
            '<' => Some(Align::Left),
            '>' => Some(Align::Right),
            '^' => Some(Align::Center),
            _ => None,
        };

        let mut parsed = FormatSpec {
            fill: ' ',
            align: None,
            zero: false,
            width: 0,
            precision: None,
            kind: None,
        };
        let mut i = 0;
        if chars.len() >= 2 && align_of(chars[1]).is_some() {
            parsed.fill = chars[0];
            parsed.align = align_of(chars[1]);
            i = 2;
        } else if let Some(align) = chars.first().and_then(|c| align_of(*c)) {
            parsed.align = Some(align);
            i = 1;
        }
        if chars.get(i) == Some(&'0') {
            parsed.zero = true;
            i += 1;
        }
        let width_start = i;
        while chars.get(i).is_some_and(|c| c.is_ascii_digit()) {
            i += 1;
        }
        if i > width_start {
            let digits: String = chars[width_start..i].iter().collect();
            parsed.width = digits.parse().map_err(|_| bad())?;
        }
        if chars.get(i) == Some(&'.') {
            i += 1;
            let precision_start = i;
            while chars.get(i).is_some_and(|c| c.is_ascii_digit()) {
                i += 1;
            }
            if i == precision_start {
                return Err(bad());
            }
            let digits: String = chars[precision_start..i].iter().collect();
            parsed.precision = Some(digits.parse().map_err(|_| bad())?);
        }
        match chars.get(i) {
            None => {}
            Some(c @ ('d' | 's' | 'f')) if i + 1 == chars.len() => parsed.kind = Some(*c),
            Some(_) => return Err(bad()),
        }
        Ok(parsed)
    }

    fn pad(&self, body: String, numeric: bool) -> String {
        let len = body.chars().count();
        if len >= self.width {
            return body;
        }
        let missing = self.width - len;
        if self.zero && self.align.is_none() && numeric {
            let (sign, digits) = match body.strip_prefix('-') {
                Some(rest) => ("-", rest.to_string()),
                None => ("", body),
            };
            return format!("{}{}{}", sign, "0".repeat(missing), digits);
        }
        let fill = if self.zero && self.align.is_none() {
            '0'
        } else {
            self.fill
        };
        let align = self
            .align
            .unwrap_or(if numeric { Align::Right } else { Align::Left });
        let repeat = |n: usize| fill.to_string().repeat(n);
        match align {
            Align::Left => format!("{}{}", body, repeat(missing)),
            Align::Right => format!("{}{}", repeat(missing), body),
            Align::Center => {
                let left = missing / 2;
                format!("{}{}{}", repeat(left), body, repeat(missing - left))
            }
        }
    }
}

/// Render a value the way it appears on a command line.
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

/// Render `value` according to an optional format spec.
pub fn format_value(value: &Value, spec: Option<&str>) -> Result<String, TemplateError> {
    let Some(spec_text) = spec.filter(|s| !s.is_empty()) else {
        return Ok(value_to_string(value));
    };
    let spec = FormatSpec::parse(spec_text)?;
    let mismatch = || TemplateError::SpecMismatch {
        spec: spec_text.to_string(),
        value: value.to_string(),
    };

    let as_int = || match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    let as_float = || match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };

    let (body, numeric) = match spec.kind {
        Some('d') => (as_int().ok_or_else(mismatch)?.to_string(), true),
        Some('f') => {
            let x = as_float().ok_or_else(mismatch)?;
            (format!("{:.*}", spec.precision.unwrap_or(6), x), true)
        }
        Some('s') => {
            let text = value_to_string(value);
            (truncate(text, spec.precision), false)
        }
        _ => match value {
            Value::Number(n) if spec.precision.is_some() && n.is_f64() => {
                let x = n.as_f64().ok_or_else(mismatch)?;
                (format!("{:.*}", spec.precision.unwrap_or(6), x), true)
            }
            Value::Number(n) => (n.to_string(), true),
            other => (truncate(value_to_string(other), spec.precision), false),
        },
    };
    if spec.zero && !numeric && spec.align.is_none() {
        return Err(mismatch());
    }
    Ok(spec.pad(body, numeric))
}

fn truncate(text: String, precision: Option<usize>) -> String {
    match precision {
        Some(p) => text.chars().take(p).collect(),
        None => text,
    }
}

fn env_reference() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\$(?:\{([A-Za-z_][A-Za-z0-9_]*)\}|([A-Za-z_][A-Za-z0-9_]*))")
            .expect("valid env reference regex")
    })
}

fn braced_env() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$\{([^}]+)\}").expect("valid braced env regex"))
}

/// Matches `<FILE:name>` markers, capturing the file name.
pub fn file_marker() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<FILE:([^>]+)>").expect("valid file marker regex"))
}

fn deferred_env() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<ENV:([^>]+)>").expect("valid deferred env regex"))
}

/// Substitute `${VAR}` and `$VAR` from `env`; unknown variables are left untouched.
pub fn expand_env(text: &str, env: &HashMap<String, String>) -> String {
    env_reference()
        .replace_all(text, |caps: &regex::Captures<'_>| {
            let name = caps
                .get(1)
                .or_else(|| caps.get(2))
                .map(|m| m.as_str())
                .unwrap_or_default();
            match env.get(name) {
                Some(value) => value.clone(),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

/// Rewrite `${VAR}` into the deferred marker `<ENV:VAR>`.
pub fn defer_env(text: &str) -> String {
    braced_env().replace_all(text, "<ENV:${1}>").into_owned()
}

/// Turn deferred markers back into shell references (`<ENV:VAR>` -> `$VAR`).
pub fn restore_deferred_env(text: &str) -> String {
    deferred_env().replace_all(text, "$$${1}").into_owned()
}

/// Names of all deferred markers in `text`.
pub fn deferred_env_names(text: &str) -> Vec<String> {
    deferred_env()
        .captures_iter(text)
        .map(|caps| caps[1].to_string())
        .collect()
}
