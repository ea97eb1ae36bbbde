//! Structural output comparison.
//!
//! `compare(actual, expected)` requires exact type identity first (a `bool`
//! is not an `int`, a `tuple` is not a `list`), then dispatches on the
//! expected value's type:
//!
//! - scalars (`int`, `float`, `bool`, numpy scalars) and `str`: equality
//! - `list`/`tuple`: element-wise over the zipped prefix. The shorter side
//!   truncates the comparison, so `[1, 2, 3]` matches `[1, 2]`.
//! - `numpy.ndarray`: same shape and element-wise equal values
//! - `dict`: same key set, then the value under each key
//! - anything else: [`ComparisonError::Unsupported`]

use crate::error::ComparisonError;
use crate::value::Value;

/// Compare a produced value against the expected one.
pub fn compare(actual: &Value, expected: &Value) -> Result<bool, ComparisonError> {
    if actual.type_name() != expected.type_name() {
        return Err(ComparisonError::TypeMismatch {
            expected: expected.type_name().to_string(),
            actual: actual.type_name().to_string(),
        });
    }

    match (actual, expected) {
        (Value::Bool(_), _)
        | (Value::Int(_), _)
        | (Value::BigInt(_), _)
        | (Value::Float(_), _)
        | (Value::NumpyScalar { .. }, _)
        | (Value::Str(_), _) => Ok(actual == expected),

        (Value::List(a), Value::List(e)) | (Value::Tuple(a), Value::Tuple(e)) => {
            compare_zipped(a, e)
        }

        (
            Value::Array {
                shape: a_shape,
                items: a_items,
                ..
            },
            Value::Array {
                shape: e_shape,
                items: e_items,
                ..
            },
        ) => Ok(a_shape == e_shape
            && a_items.len() == e_items.len()
            && a_items.iter().zip(e_items).all(|(a, e)| numeric_eq(a, e))),

        (Value::Dict(a), Value::Dict(e)) => compare_dicts(a, e),

        _ => Err(ComparisonError::Unsupported(expected.type_name().to_string())),
    }
}

fn compare_zipped(actual: &[Value], expected: &[Value]) -> Result<bool, ComparisonError> {
    for (a, e) in actual.iter().zip(expected) {
        if !compare(a, e)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn compare_dicts(
    actual: &[(Value, Value)],
    expected: &[(Value, Value)],
) -> Result<bool, ComparisonError> {
    // Keys of one dict are distinct, so equal sizes plus containment is set equality
    if actual.len() != expected.len()
        || expected.iter().any(|(key, _)| lookup(actual, key).is_none())
    {
        return Ok(false);
    }
    for (key, expected_value) in expected {
        let Some(actual_value) = lookup(actual, key) else {
            return Ok(false);
        };
        if !compare(actual_value, expected_value)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn lookup<'a>(pairs: &'a [(Value, Value)], key: &Value) -> Option<&'a Value> {
    pairs.iter().find(|(k, _)| k == key).map(|(_, v)| v)
}

/// Exact integer view of an array element. `BigInt` never fits in `i64`.
#[derive(PartialEq)]
enum Integral<'a> {
    Small(i64),
    Big(&'a str),
}

fn integral(value: &Value) -> Option<Integral<'_>> {
    match value {
        Value::Bool(b) => Some(Integral::Small(i64::from(*b))),
        Value::Int(i) => Some(Integral::Small(*i)),
        Value::BigInt(digits) => Some(Integral::Big(digits)),
        Value::NumpyScalar { value, .. } => integral(value),
        _ => None,
    }
}

/// Element equality inside arrays compares numbers by value across dtypes.
/// Integer pairs compare exactly; only int/float pairs go through `f64`.
fn numeric_eq(a: &Value, e: &Value) -> bool {
    if let (Some(x), Some(y)) = (integral(a), integral(e)) {
        return x == y;
    }
    match (a.as_f64(), e.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == e,
    }
}
