//! printf-style command templates, e.g. `"SOUR:VOLT %g"` or `"CH%d:COUP %s"`.
//!
//! Templates are parsed once, when a field is built, so that a malformed
//! template surfaces as a configuration error instead of on first use.

use core::fmt;

use snafu::ensure;

use crate::nom_parser::template::{parse_template, Conversion, Flags, Segment, Spec};
use crate::{InvalidConfigurationSnafu, InvalidValueSnafu, Result, Value};

/// A parsed command template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTemplate {
    source: String,
    segments: Vec<Segment>,
}

impl CommandTemplate {
    /// Parse `source`.
    /// # Errors
    /// Returns [`Error::InvalidConfiguration`](crate::Error::InvalidConfiguration)
    /// on an unsupported or truncated conversion specifier.
    pub fn parse(source: &str) -> Result<Self> {
        let segments = parse_template(source).map_err(|rest| {
            InvalidConfigurationSnafu {
                message: format!("bad conversion in command template {:?} at {:?}", source, rest),
            }
            .build()
        })?;
        Ok(Self {
            source: source.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Number of values the template consumes.
    pub fn specifier_count(&self) -> usize {
        self.specs().count()
    }

    /// The text of the first conversion specifier, e.g. `"%.3f"`.
    pub fn first_specifier(&self) -> Option<&str> {
        self.specs().next().map(|s| s.raw.as_str())
    }

    fn specs(&self) -> impl Iterator<Item = &Spec> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Spec(spec) => Some(spec),
            Segment::Literal(_) => None,
        })
    }

    /// Substitute `value` into the template. A [`Value::List`] fills the
    /// specifiers in order.
    pub fn format(&self, value: &Value) -> Result<String> {
        let count = self.specifier_count();
        let args: Vec<&Value> = match value {
            Value::List(items) if count != 1 || items.len() == 1 => items.iter().collect(),
            single => vec![single],
        };
        ensure!(
            args.len() == count,
            InvalidConfigurationSnafu {
                message: format!(
                    "command template {:?} takes {} value(s), got {}",
                    self.source,
                    count,
                    args.len()
                ),
            }
        );

        let mut out = String::with_capacity(self.source.len() + 8);
        let mut args = args.into_iter();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Spec(spec) => {
                    if let Some(arg) = args.next() {
                        out.push_str(&render(spec, arg)?);
                    }
                }
            }
        }
        Ok(out)
    }
}

impl fmt::Display for CommandTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

fn render(spec: &Spec, value: &Value) -> Result<String> {
    let flags = spec.flags;
    let (sign, body, numeric) = match spec.conversion {
        Conversion::Decimal => {
            let n = integer(spec, value)?;
            split_sign(n.to_string())
        }
        Conversion::Hex { upper } => {
            let n = integer(spec, value)?;
            let prefix = match (flags.alternate, upper) {
                (false, _) => "",
                (true, false) => "0x",
                (true, true) => "0X",
            };
            let digits = if upper {
                format!("{:X}", n.unsigned_abs())
            } else {
                format!("{:x}", n.unsigned_abs())
            };
            (sign_of(n < 0), format!("{}{}", prefix, digits), true)
        }
        Conversion::Octal => {
            let n = integer(spec, value)?;
            let prefix = if flags.alternate { "0o" } else { "" };
            (sign_of(n < 0), format!("{}{:o}", prefix, n.unsigned_abs()), true)
        }
        Conversion::Fixed { upper } => float(spec, value, |x| {
            format!("{:.*}", spec.precision.unwrap_or(6), x)
        }, upper)?,
        Conversion::Exponent { upper } => float(spec, value, |x| {
            exponent(x, spec.precision.unwrap_or(6), upper)
        }, upper)?,
        Conversion::General { upper } => float(spec, value, |x| {
            general(x, spec.precision.unwrap_or(6), flags.alternate, upper)
        }, upper)?,
        Conversion::Text => (String::new(), truncate(value.to_string(), spec.precision), false),
        Conversion::Repr => {
            let text = match value {
                Value::Str(s) => format!("'{}'", s),
                other => other.to_string(),
            };
            (String::new(), truncate(text, spec.precision), false)
        }
        Conversion::Char => {
            let c = match value {
                Value::Str(s) if s.chars().count() == 1 => s.clone(),
                Value::Int(i) => u32::try_from(*i)
                    .ok()
                    .and_then(char::from_u32)
                    .map(String::from)
                    .ok_or_else(|| invalid(spec, value))?,
                _ => return Err(invalid(spec, value)),
            };
            (String::new(), c, false)
        }
    };
    Ok(pad(flags, spec.width, with_sign(flags, sign, numeric), body, numeric))
}

fn invalid(spec: &Spec, value: &Value) -> crate::Error {
    InvalidValueSnafu {
        value: value.to_string(),
        reason: format!("can't be formatted with {}", spec.raw),
    }
    .build()
}

fn integer(spec: &Spec, value: &Value) -> Result<i64> {
    match value {
        Value::Bool(b) => Ok(i64::from(*b)),
        Value::Int(i) => Ok(*i),
        Value::Float(f) if f.is_finite() => Ok(f.trunc() as i64),
        _ => Err(invalid(spec, value)),
    }
}

fn float<F>(spec: &Spec, value: &Value, fmt: F, upper: bool) -> Result<(String, String, bool)>
where
    F: Fn(f64) -> String,
{
    let x = value.as_f64().ok_or_else(|| invalid(spec, value))?;
    if x.is_nan() {
        let text = if upper { "NAN" } else { "nan" };
        return Ok((String::new(), text.to_string(), true));
    }
    let text = if x.is_infinite() {
        let inf = if upper { "INF" } else { "inf" };
        if x < 0.0 {
            format!("-{}", inf)
        } else {
            inf.to_string()
        }
    } else {
        fmt(x)
    };
    let text = if upper { text.to_uppercase() } else { text };
    Ok(split_sign(text))
}

fn split_sign(text: String) -> (String, String, bool) {
    match text.strip_prefix('-') {
        Some(rest) => ("-".to_string(), rest.to_string(), true),
        None => (String::new(), text, true),
    }
}

fn sign_of(negative: bool) -> String {
    if negative {
        "-".to_string()
    } else {
        String::new()
    }
}

fn with_sign(flags: Flags, sign: String, numeric: bool) -> String {
    if !sign.is_empty() || !numeric {
        sign
    } else if flags.plus {
        "+".to_string()
    } else if flags.space {
        " ".to_string()
    } else {
        sign
    }
}

fn truncate(text: String, precision: Option<usize>) -> String {
    match precision {
        Some(p) => text.chars().take(p).collect(),
        None => text,
    }
}

fn pad(flags: Flags, width: Option<usize>, sign: String, body: String, numeric: bool) -> String {
    let len = sign.chars().count() + body.chars().count();
    let fill = width.unwrap_or(0).saturating_sub(len);
    if fill == 0 {
        return sign + &body;
    }
    if flags.left {
        format!("{}{}{}", sign, body, " ".repeat(fill))
    } else if flags.zero && numeric {
        format!("{}{}{}", sign, "0".repeat(fill), body)
    } else {
        format!("{}{}{}", " ".repeat(fill), sign, body)
    }
}

/// `1.500000e+01`: at least two exponent digits, always signed.
fn exponent(x: f64, precision: usize, upper: bool) -> String {
    let text = format!("{:.*e}", precision, x);
    let (mantissa, exp) = text.split_once('e').unwrap_or((text.as_str(), "0"));
    let exp: i32 = exp.parse().unwrap_or(0);
    let e = if upper { 'E' } else { 'e' };
    let sign = if exp < 0 { '-' } else { '+' };
    format!("{}{}{}{:02}", mantissa, e, sign, exp.abs())
}

fn general(x: f64, precision: usize, alternate: bool, upper: bool) -> String {
    let p = precision.max(1);
    let exp = if x == 0.0 {
        0
    } else {
        let text = format!("{:.*e}", p - 1, x);
        text.split_once('e')
            .and_then(|(_, e)| e.parse::<i32>().ok())
            .unwrap_or(0)
    };
    let text = if exp >= -4 && exp < p as i32 {
        format!("{:.*}", (p as i32 - 1 - exp) as usize, x)
    } else {
        exponent(x, p - 1, upper)
    };
    if alternate {
        return text;
    }
    match text.find(|c| c == 'e' || c == 'E') {
        Some(pos) => {
            let (mantissa, exp) = text.split_at(pos);
            format!("{}{}", strip_zeros(mantissa), exp)
        }
        None => strip_zeros(&text).to_string(),
    }
}

fn strip_zeros(text: &str) -> &str {
    if text.contains('.') {
        text.trim_end_matches('0').trim_end_matches('.')
    } else {
        text
    }
}
