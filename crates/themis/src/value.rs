//! Runtime values decoded from the sandbox worker.
//!
//! The worker encodes every value it hands back as a tagged JSON object
//! (`{"t": "int", "v": "42"}`). Numbers travel as their Python text so
//! arbitrary-precision ints and `nan`/`inf` floats survive the trip.

use std::fmt;

use serde::Deserialize;

/// A value produced by a snippet, decoded on the Rust side.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "Encoded")]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    /// An int outside the 64-bit range, kept as canonical decimal text
    BigInt(String),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Tuple(Vec<Value>),
    /// Key/value pairs in insertion order
    Dict(Vec<(Value, Value)>),
    /// A numpy `ndarray`, flattened in C order
    Array {
        dtype: String,
        shape: Vec<usize>,
        items: Vec<Value>,
    },
    /// A numpy scalar such as `numpy.float64`
    NumpyScalar { type_name: String, value: Box<Value> },
    /// Anything else; only its type and `repr` cross the process boundary
    Object { type_name: String, repr: String },
}

impl Value {
    /// Name of the runtime type, used for exact type identity checks.
    pub fn type_name(&self) -> &str {
        match self {
            Value::None => "NoneType",
            Value::Bool(_) => "bool",
            Value::Int(_) | Value::BigInt(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::List(_) => "list",
            Value::Tuple(_) => "tuple",
            Value::Dict(_) => "dict",
            Value::Array { .. } => "numpy.ndarray",
            Value::NumpyScalar { type_name, .. } | Value::Object { type_name, .. } => {
                type_name.as_str()
            }
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }

    /// Numeric view used by array equality, which ignores dtype differences
    /// the same way numpy does.
    pub(crate) fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Int(i) => Some(*i as f64),
            Value::BigInt(digits) => digits.parse().ok(),
            Value::Float(f) => Some(*f),
            Value::NumpyScalar { value, .. } => value.as_f64(),
            _ => None,
        }
    }

    /// Text shown to contestants: `str(value)` rather than `repr(value)`.
    pub fn to_text(&self) -> String {
        match self {
            Value::Str(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

/// Renders the value like Python's `repr`.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => write!(f, "None"),
            Value::Bool(true) => write!(f, "True"),
            Value::Bool(false) => write!(f, "False"),
            Value::Int(i) => write!(f, "{i}"),
            Value::BigInt(digits) => write!(f, "{digits}"),
            Value::Float(x) => write_float(f, *x),
            Value::Str(s) => write_str_repr(f, s),
            Value::List(items) => {
                write!(f, "[")?;
                write_joined(f, items)?;
                write!(f, "]")
            }
            Value::Tuple(items) => {
                write!(f, "(")?;
                write_joined(f, items)?;
                if items.len() == 1 {
                    write!(f, ",")?;
                }
                write!(f, ")")
            }
            Value::Dict(pairs) => {
                write!(f, "{{")?;
                for (i, (key, value)) in pairs.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{key}: {value}")?;
                }
                write!(f, "}}")
            }
            Value::Array { shape, items, .. } => {
                write!(f, "array(")?;
                write_nested(f, shape, items)?;
                write!(f, ")")
            }
            Value::NumpyScalar { value, .. } => write!(f, "{value}"),
            Value::Object { repr, .. } => write!(f, "{repr}"),
        }
    }
}

fn write_float(f: &mut fmt::Formatter<'_>, x: f64) -> fmt::Result {
    if x.is_nan() {
        write!(f, "nan")
    } else if x.is_infinite() {
        write!(f, "{}", if x > 0.0 { "inf" } else { "-inf" })
    } else {
        // Debug keeps the trailing `.0` on whole numbers, like Python
        write!(f, "{x:?}")
    }
}

fn write_str_repr(f: &mut fmt::Formatter<'_>, s: &str) -> fmt::Result {
    let quote = if s.contains('\'') && !s.contains('"') { '"' } else { '\'' };
    write!(f, "{quote}")?;
    for c in s.chars() {
        match c {
            '\\' => write!(f, "\\\\")?,
            '\n' => write!(f, "\\n")?,
            '\r' => write!(f, "\\r")?,
            '\t' => write!(f, "\\t")?,
            c if c == quote => write!(f, "\\{c}")?,
            c => write!(f, "{c}")?,
        }
    }
    write!(f, "{quote}")
}

fn write_joined(f: &mut fmt::Formatter<'_>, items: &[Value]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

fn write_nested(f: &mut fmt::Formatter<'_>, shape: &[usize], items: &[Value]) -> fmt::Result {
    match shape.split_first() {
        None => match items.first() {
            Some(item) => write!(f, "{item}"),
            None => write!(f, "[]"),
        },
        Some((_, [])) => {
            write!(f, "[")?;
            write_joined(f, items)?;
            write!(f, "]")
        }
        Some((&len, rest)) => {
            let stride: usize = rest.iter().product();
            write!(f, "[")?;
            for i in 0..len {
                if i > 0 {
                    write!(f, ", ")?;
                }
                let start = (i * stride).min(items.len());
                let end = (start + stride).min(items.len());
                write_nested(f, rest, &items[start..end])?;
            }
            write!(f, "]")
        }
    }
}

/// Wire form produced by the worker's encoder.
#[derive(Debug, Deserialize)]
#[serde(tag = "t", rename_all = "snake_case")]
enum Encoded {
    None,
    Bool {
        v: bool,
    },
    Int {
        v: String,
    },
    Float {
        v: String,
    },
    Str {
        v: String,
    },
    List {
        items: Vec<Value>,
    },
    Tuple {
        items: Vec<Value>,
    },
    Dict {
        items: Vec<(Value, Value)>,
    },
    Ndarray {
        dtype: String,
        shape: Vec<usize>,
        items: Vec<Value>,
    },
    NumpyScalar {
        #[serde(rename = "type")]
        type_name: String,
        v: Box<Value>,
    },
    Object {
        #[serde(rename = "type")]
        type_name: String,
        repr: String,
    },
}

impl TryFrom<Encoded> for Value {
    type Error = String;

    fn try_from(encoded: Encoded) -> Result<Self, Self::Error> {
        Ok(match encoded {
            Encoded::None => Value::None,
            Encoded::Bool { v } => Value::Bool(v),
            Encoded::Int { v } => parse_int(v)?,
            Encoded::Float { v } => Value::Float(
                v.parse()
                    .map_err(|_| format!("invalid float literal from worker: {v}"))?,
            ),
            Encoded::Str { v } => Value::Str(v),
            Encoded::List { items } => Value::List(items),
            Encoded::Tuple { items } => Value::Tuple(items),
            Encoded::Dict { items } => Value::Dict(items),
            Encoded::Ndarray {
                dtype,
                shape,
                items,
            } => Value::Array {
                dtype,
                shape,
                items,
            },
            Encoded::NumpyScalar { type_name, v } => Value::NumpyScalar {
                type_name,
                value: v,
            },
            Encoded::Object { type_name, repr } => Value::Object { type_name, repr },
        })
    }
}

fn parse_int(digits: String) -> Result<Value, String> {
    if let Ok(i) = digits.parse::<i64>() {
        return Ok(Value::Int(i));
    }
    let unsigned = digits.strip_prefix('-').unwrap_or(&digits);
    if !unsigned.is_empty() && unsigned.bytes().all(|b| b.is_ascii_digit()) {
        Ok(Value::BigInt(digits))
    } else {
        Err(format!("invalid int literal from worker: {digits}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(json: &str) -> Value {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_decode_scalars() {
        assert_eq!(decode(r#"{"t": "none"}"#), Value::None);
        assert_eq!(decode(r#"{"t": "bool", "v": true}"#), Value::Bool(true));
        assert_eq!(decode(r#"{"t": "int", "v": "-42"}"#), Value::Int(-42));
        assert_eq!(
            decode(r#"{"t": "int", "v": "123456789012345678901234567890"}"#),
            Value::BigInt("123456789012345678901234567890".into())
        );
        assert_eq!(decode(r#"{"t": "float", "v": "1e+16"}"#), Value::Float(1e16));
        assert!(matches!(decode(r#"{"t": "float", "v": "nan"}"#), Value::Float(x) if x.is_nan()));
        assert_eq!(
            decode(r#"{"t": "float", "v": "-inf"}"#),
            Value::Float(f64::NEG_INFINITY)
        );
        assert_eq!(decode(r#"{"t": "str", "v": "hi"}"#), Value::Str("hi".into()));
    }

    #[test]
    fn test_decode_containers() {
        let value = decode(
            r#"{"t": "dict", "items": [
                [{"t": "str", "v": "a"}, {"t": "list", "items": [{"t": "int", "v": "1"}]}],
                [{"t": "int", "v": "2"}, {"t": "tuple", "items": []}]
            ]}"#,
        );
        assert_eq!(
            value,
            Value::Dict(vec![
                (Value::Str("a".into()), Value::List(vec![Value::Int(1)])),
                (Value::Int(2), Value::Tuple(vec![])),
            ])
        );
    }

    #[test]
    fn test_decode_numpy() {
        let array = decode(
            r#"{"t": "ndarray", "dtype": "int64", "shape": [2, 2],
                "items": [{"t": "int", "v": "1"}, {"t": "int", "v": "2"},
                          {"t": "int", "v": "3"}, {"t": "int", "v": "4"}]}"#,
        );
        assert_eq!(array.type_name(), "numpy.ndarray");
        assert_eq!(array.to_string(), "array([[1, 2], [3, 4]])");

        let scalar = decode(
            r#"{"t": "numpy_scalar", "type": "numpy.float64", "v": {"t": "float", "v": "0.5"}}"#,
        );
        assert_eq!(scalar.type_name(), "numpy.float64");
        assert_eq!(scalar.as_f64(), Some(0.5));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(serde_json::from_str::<Value>(r#"{"t": "int", "v": "12a"}"#).is_err());
        assert!(serde_json::from_str::<Value>(r#"{"t": "float", "v": "abc"}"#).is_err());
        assert!(serde_json::from_str::<Value>(r#"{"t": "mystery"}"#).is_err());
    }

    #[test]
    fn test_python_repr() {
        let value = Value::Dict(vec![(
            Value::Str("k".into()),
            Value::List(vec![
                Value::Float(1.0),
                Value::Tuple(vec![Value::Bool(false)]),
                Value::None,
                Value::Str("it's".into()),
            ]),
        )]);
        assert_eq!(value.to_string(), r#"{'k': [1.0, (False,), None, "it's"]}"#);
        assert_eq!(Value::Float(0.1).to_string(), "0.1");
        assert_eq!(Value::Float(f64::NAN).to_string(), "nan");
    }

    #[test]
    fn test_to_text() {
        assert_eq!(Value::Str("plain".into()).to_text(), "plain");
        assert_eq!(
            Value::List(vec![Value::Str("a".into())]).to_text(),
            "['a']"
        );
        let object = Value::Object {
            type_name: "Node".into(),
            repr: "<Node object at 0x1>".into(),
        };
        assert_eq!(object.type_name(), "Node");
        assert_eq!(object.to_text(), "<Node object at 0x1>");
    }
}
