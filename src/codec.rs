//! Splitting instrument responses into typed values.
//!
//! Casting is best effort: a token that can't be cast to the requested
//! [`Cast`] is kept as [`Value::Str`] with its original text. Responses
//! often mix numbers and symbols (`"+1.0E+00,OVLD"`), so this is not an error.

use crate::nom_parser::number::{parse_number, Number};
use crate::{Cast, Value};

/// Split `response` on `separator` and cast every token.
///
/// ```
/// use scpi_fields::{split_values, Cast, Value};
/// let values = split_values("1,0,abc", ",", Cast::Bool);
/// assert_eq!(values, vec![Value::Bool(true), Value::Bool(false), Value::from("abc")]);
/// ```
pub fn split_values(response: &str, separator: &str, cast: Cast) -> Vec<Value> {
    let response = response.trim();
    if separator.is_empty() {
        return vec![cast_token(response, cast)];
    }
    response
        .split(separator)
        .map(|token| cast_token(token.trim(), cast))
        .collect()
}

/// Cast a single token, falling back to the token text.
pub fn cast_token(token: &str, cast: Cast) -> Value {
    let cast_value = match cast {
        Cast::Str => None,
        Cast::Float => parse_number(token).map(|n| Value::Float(n.as_f64())),
        Cast::Int => parse_number(token).and_then(|n| match n {
            Number::Int(i) => Some(Value::Int(i)),
            Number::Float(f) if f.is_finite() && f.fract() == 0.0 => Some(Value::Int(f as i64)),
            Number::Float(_) => None,
        }),
        // Never from the text itself: every non-empty string would be true.
        Cast::Bool => parse_number(token).map(|n| Value::Bool(n.as_f64() != 0.0)),
    };
    cast_value.unwrap_or_else(|| Value::Str(token.to_string()))
}

/// One value comes back as a bare scalar, anything else as a [`Value::List`].
pub fn unwrap_single(mut values: Vec<Value>) -> Value {
    if values.len() == 1 {
        values.remove(0)
    } else {
        Value::List(values)
    }
}
