//! This module defines the values exchanged with an instrument and the
//! domains of legal values a field may take.

use core::fmt;

use snafu::ensure;

use crate::{InvalidConfigurationSnafu, Result};

/// A scalar (or a list of scalars) read from or written to an instrument.
///
/// Equality is by value: numeric variants compare numerically, so
/// `Value::Int(1) == Value::Float(1.0)` and `Value::Bool(true) == Value::Int(1)`.
/// Text never equals a number, even if it looks like one.
#[derive(Debug, Clone)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
}

impl Value {
    /// The numeric value of `Bool`, `Int` and `Float`, `None` otherwise.
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Value::Bool(b) => Some(if b { 1.0 } else { 0.0 }),
            Value::Int(i) => Some(i as f64),
            Value::Float(f) => Some(f),
            Value::Str(_) | Value::List(_) => None,
        }
    }

    /// Integer conversion used for index lookups: floats are truncated,
    /// text must spell an integer.
    pub fn as_index(&self) -> Option<i64> {
        match self {
            Value::Bool(b) => Some(i64::from(*b)),
            Value::Int(i) => Some(*i),
            Value::Float(f) if f.is_finite() => Some(f.trunc() as i64),
            Value::Str(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        self.as_f64().is_some()
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => x == y,
                _ => false,
            },
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{}", u8::from(*b)),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Str(s) => f.write_str(s),
            Value::List(items) => {
                for (n, item) in items.iter().enumerate() {
                    if n > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{}", item)?;
                }
                Ok(())
            }
        }
    }
}

macro_rules! value_from {
    ($variant:ident: $($t:ty),*) => {
        $(impl From<$t> for Value {
            fn from(v: $t) -> Self {
                Value::$variant(v.into())
            }
        })*
    };
}

value_from!(Bool: bool);
value_from!(Int: i8, i16, i32, i64, u8, u16, u32);
value_from!(Float: f32, f64);
value_from!(Str: &str, String);

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::List(v.into_iter().map(Into::into).collect())
    }
}

/// Target kind when casting response tokens.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum Cast {
    #[default]
    Float,
    Int,
    /// Numeric parse first, then nonzero means true.
    Bool,
    Str,
}

/// The set of legal values for a field, optionally doubling as an
/// encode/decode table.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Domain {
    /// No restriction. Can't be used for mapping.
    #[default]
    Any,
    /// Integers `start, start + step, ...` up to but excluding `stop`.
    Range { start: i64, stop: i64, step: i64 },
    /// Ordered members; the position is the device code when mapping.
    Sequence(Vec<Value>),
    /// Key to device code pairs, in declaration order.
    Map(Vec<(Value, Value)>),
    /// Closed numeric interval. Can't be used for mapping.
    Interval { min: f64, max: f64 },
}

impl Domain {
    /// Contiguous range `start..stop`.
    pub fn range(range: core::ops::Range<i64>) -> Self {
        Domain::Range {
            start: range.start,
            stop: range.end,
            step: 1,
        }
    }

    /// Range with an explicit step.
    /// # Errors
    /// Returns [`Error::InvalidConfiguration`](crate::Error::InvalidConfiguration) if `step` is zero.
    pub fn stepped(start: i64, stop: i64, step: i64) -> Result<Self> {
        ensure!(
            step != 0,
            InvalidConfigurationSnafu {
                message: "range step must not be zero"
            }
        );
        Ok(Domain::Range { start, stop, step })
    }

    pub fn sequence<I>(members: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        Domain::Sequence(members.into_iter().map(Into::into).collect())
    }

    pub fn map<I, K, C>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, C)>,
        K: Into<Value>,
        C: Into<Value>,
    {
        Domain::Map(
            pairs
                .into_iter()
                .map(|(k, c)| (k.into(), c.into()))
                .collect(),
        )
    }

    pub fn interval(min: f64, max: f64) -> Self {
        Domain::Interval { min, max }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Domain::Any => "any",
            Domain::Range { .. } => "range",
            Domain::Sequence(_) => "sequence",
            Domain::Map(_) => "map",
            Domain::Interval { .. } => "interval",
        }
    }

    /// Check the domain can be used by a field.
    /// # Errors
    /// Returns [`Error::InvalidConfiguration`](crate::Error::InvalidConfiguration)
    /// for a range with a zero step.
    pub fn check(&self) -> Result<()> {
        if let Domain::Range { step, .. } = self {
            ensure!(
                *step != 0,
                InvalidConfigurationSnafu {
                    message: "range step must not be zero"
                }
            );
        }
        Ok(())
    }

    // Member count of a range. Computed in i128 so that ranges spanning the
    // whole i64 domain don't overflow.
    fn range_count(start: i64, stop: i64, step: i64) -> Option<i128> {
        let (start, stop, step) = (i128::from(start), i128::from(stop), i128::from(step));
        let (span, step) = match step {
            0 => return None,
            s if s > 0 => (stop - start, s),
            s => (start - stop, -s),
        };
        Some(if span <= 0 { 0 } else { (span + step - 1) / step })
    }

    /// Number of members of an enumerable domain.
    pub fn len(&self) -> Option<usize> {
        match self {
            Domain::Range { start, stop, step } => {
                usize::try_from(Self::range_count(*start, *stop, *step)?).ok()
            }
            Domain::Sequence(members) => Some(members.len()),
            Domain::Map(pairs) => Some(pairs.len()),
            Domain::Any | Domain::Interval { .. } => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == Some(0)
    }

    /// Membership test by value equality. Map domains test their keys.
    pub fn contains(&self, value: &Value) -> bool {
        match self {
            Domain::Any => true,
            Domain::Interval { min, max } => value
                .as_f64()
                .map_or(false, |v| *min <= v && v <= *max),
            _ => self.position(value).is_some(),
        }
    }

    /// Position of `value` in an enumerable domain.
    pub fn position(&self, value: &Value) -> Option<usize> {
        match self {
            Domain::Range { start, stop, step } => {
                let v = match value {
                    Value::Int(i) => *i,
                    other => {
                        let f = other.as_f64()?;
                        // 2^63 is exactly representable, i64::MAX is not
                        if f.fract() != 0.0 || f < -9_223_372_036_854_775_808.0 || f >= 9_223_372_036_854_775_808.0 {
                            return None;
                        }
                        f as i64
                    }
                };
                let count = Self::range_count(*start, *stop, *step)?;
                let offset = i128::from(v) - i128::from(*start);
                let step = i128::from(*step);
                if offset % step != 0 {
                    return None;
                }
                let index = offset / step;
                if (0..count).contains(&index) {
                    usize::try_from(index).ok()
                } else {
                    None
                }
            }
            Domain::Sequence(members) => members.iter().position(|m| m == value),
            Domain::Map(pairs) => pairs.iter().position(|(k, _)| k == value),
            Domain::Any | Domain::Interval { .. } => None,
        }
    }

    /// Member at `index` of an enumerable domain. Map domains yield keys.
    pub fn nth(&self, index: usize) -> Option<Value> {
        match self {
            Domain::Range { start, stop, step } => {
                let index = i128::try_from(index).ok()?;
                if index < Self::range_count(*start, *stop, *step)? {
                    let member = i128::from(*start) + i128::from(*step) * index;
                    i64::try_from(member).ok().map(Value::Int)
                } else {
                    None
                }
            }
            Domain::Sequence(members) => members.get(index).cloned(),
            Domain::Map(pairs) => pairs.get(index).map(|(k, _)| k.clone()),
            Domain::Any | Domain::Interval { .. } => None,
        }
    }

    /// Smallest and largest numeric member, used by the range validators.
    pub fn numeric_bounds(&self) -> Option<(f64, f64)> {
        let fold = |acc: Option<(f64, f64)>, v: f64| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        };
        match self {
            Domain::Interval { min, max } => Some((*min, *max)),
            Domain::Range { start, stop, step } => {
                let last = Self::range_count(*start, *stop, *step)?.checked_sub(1)?;
                if last < 0 {
                    return None;
                }
                let a = *start as f64;
                let b = (i128::from(*start) + i128::from(*step) * last) as f64;
                Some((a.min(b), a.max(b)))
            }
            Domain::Sequence(members) => members
                .iter()
                .filter_map(Value::as_f64)
                .fold(None, fold),
            Domain::Map(pairs) => pairs
                .iter()
                .filter_map(|(k, _)| k.as_f64())
                .fold(None, fold),
            Domain::Any => None,
        }
    }
}
