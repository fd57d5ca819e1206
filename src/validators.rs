//! Validators and the encode/decode layer between user values and device codes.
//!
//! A validator receives the value to be written and the field's [`Domain`]
//! and returns the value to use, or [`Error::InvalidValue`](crate::Error::InvalidValue).

use snafu::ensure;

use crate::{
    Domain, InvalidConfigurationSnafu, InvalidValueSnafu, Result, UnsupportedDomainSnafu, Value,
};

fn invalid_value(value: &Value, reason: impl Into<String>) -> crate::Error {
    InvalidValueSnafu {
        value: value.to_string(),
        reason,
    }
    .build()
}

fn number(value: &Value) -> Result<f64> {
    value
        .as_f64()
        .ok_or_else(|| invalid_value(value, "not a number"))
}

fn bounds(value: &Value, domain: &Domain) -> Result<(f64, f64)> {
    domain
        .numeric_bounds()
        .ok_or_else(|| invalid_value(value, format!("{} domain has no numeric bounds", domain.kind_name())))
}

/// Accepts everything. The default validator.
pub fn identity(value: Value, _domain: &Domain) -> Result<Value> {
    Ok(value)
}

/// The value must lie within the numeric bounds of the domain.
pub fn strict_range(value: Value, domain: &Domain) -> Result<Value> {
    let v = number(&value)?;
    let (min, max) = bounds(&value, domain)?;
    if min <= v && v <= max {
        Ok(value)
    } else {
        Err(invalid_value(&value, format!("not in range [{}, {}]", min, max)))
    }
}

/// Values outside the numeric bounds are clamped to the nearest bound.
pub fn truncated_range(value: Value, domain: &Domain) -> Result<Value> {
    let v = number(&value)?;
    let (min, max) = bounds(&value, domain)?;
    let clamped = if v < min {
        min
    } else if v > max {
        max
    } else {
        return Ok(value);
    };
    Ok(match value {
        Value::Int(_) if clamped.fract() == 0.0 => Value::Int(clamped as i64),
        _ => Value::Float(clamped),
    })
}

/// The value must be a member of the domain (a key for map domains).
pub fn strict_discrete_set(value: Value, domain: &Domain) -> Result<Value> {
    if domain.contains(&value) {
        Ok(value)
    } else {
        Err(invalid_value(
            &value,
            format!("not a member of the {} domain", domain.kind_name()),
        ))
    }
}

/// Rounds up to the smallest numeric member not below the value.
pub fn truncated_discrete_set(value: Value, domain: &Domain) -> Result<Value> {
    let v = number(&value)?;
    let members: Vec<Value> = match domain {
        Domain::Sequence(members) => members.clone(),
        Domain::Map(pairs) => pairs.iter().map(|(k, _)| k.clone()).collect(),
        Domain::Range { .. } => (0..domain.len().unwrap_or(0))
            .filter_map(|i| domain.nth(i))
            .collect(),
        _ => return Err(invalid_value(&value, format!("{} domain is not discrete", domain.kind_name()))),
    };
    members
        .into_iter()
        .filter(|m| m.as_f64().map_or(false, |m| m >= v))
        .min_by(|a, b| {
            let (a, b) = (a.as_f64().unwrap_or(f64::INFINITY), b.as_f64().unwrap_or(f64::INFINITY));
            a.total_cmp(&b)
        })
        .ok_or_else(|| invalid_value(&value, "above the largest member"))
}

/// Like [`strict_range`], and the value must also sit on a `step` grid
/// starting at the lower bound.
pub fn strict_discrete_range(step: f64) -> impl Fn(Value, &Domain) -> Result<Value> + Send + Sync {
    move |value: Value, domain: &Domain| {
        let value = strict_range(value, domain)?;
        let (min, _) = bounds(&value, domain)?;
        let steps = (number(&value)? - min) / step;
        if (steps - steps.round()).abs() <= 1e-9 * steps.abs().max(1.0) {
            Ok(value)
        } else {
            Err(invalid_value(&value, format!("not a multiple of {} from {}", step, min)))
        }
    }
}

/// Encode a user value as a device code: the member position for ranges
/// and sequences, the mapped code for maps.
pub fn encode(value: &Value, domain: &Domain) -> Result<Value> {
    match domain {
        Domain::Range { .. } | Domain::Sequence(_) => domain
            .position(value)
            .map(|i| Value::Int(i as i64))
            .ok_or_else(|| invalid_value(value, format!("not a member of the {} domain", domain.kind_name()))),
        Domain::Map(pairs) => pairs
            .iter()
            .find(|(k, _)| k == value)
            .map(|(_, code)| code.clone())
            .ok_or_else(|| invalid_value(value, "not a key of the map domain")),
        Domain::Any | Domain::Interval { .. } => UnsupportedDomainSnafu {
            domain: domain.kind_name(),
        }
        .fail(),
    }
}

/// A domain prepared for two-way mapping. For map domains the inverse
/// (code to key) table is built once, here.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueMap {
    domain: Domain,
    inverse: Vec<(Value, Value)>,
}

impl ValueMap {
    /// # Errors
    /// [`Error::UnsupportedDomain`](crate::Error::UnsupportedDomain) for domains without an
    /// encoding, [`Error::InvalidConfiguration`](crate::Error::InvalidConfiguration) when a
    /// map has duplicate keys or codes or a range has a zero step.
    pub fn new(domain: &Domain) -> Result<Self> {
        domain.check()?;
        let inverse = match domain {
            Domain::Range { .. } | Domain::Sequence(_) => Vec::new(),
            Domain::Map(pairs) => {
                let mut inverse: Vec<(Value, Value)> = Vec::with_capacity(pairs.len());
                for (n, (key, code)) in pairs.iter().enumerate() {
                    ensure!(
                        !pairs[..n].iter().any(|(k, _)| k == key),
                        InvalidConfigurationSnafu {
                            message: format!("duplicate key {} in value map", key),
                        }
                    );
                    ensure!(
                        !inverse.iter().any(|(c, _)| c == code),
                        InvalidConfigurationSnafu {
                            message: format!("value map is not invertible, code {} is used twice", code),
                        }
                    );
                    inverse.push((code.clone(), key.clone()));
                }
                inverse
            }
            Domain::Any | Domain::Interval { .. } => {
                return UnsupportedDomainSnafu {
                    domain: domain.kind_name(),
                }
                .fail()
            }
        };
        Ok(Self {
            domain: domain.clone(),
            inverse,
        })
    }

    pub fn domain(&self) -> &Domain {
        &self.domain
    }

    pub fn encode(&self, value: &Value) -> Result<Value> {
        encode(value, &self.domain)
    }

    /// Inverse of [`encode`](Self::encode).
    pub fn decode(&self, code: &Value) -> Result<Value> {
        match &self.domain {
            Domain::Map(_) => self
                .inverse
                .iter()
                .find(|(c, _)| c == code)
                .map(|(_, key)| key.clone())
                .ok_or_else(|| invalid_value(code, "unknown device code")),
            domain => code
                .as_index()
                .filter(|i| *i >= 0)
                .and_then(|i| domain.nth(i as usize))
                .ok_or_else(|| invalid_value(code, "no member at this index")),
        }
    }
}
