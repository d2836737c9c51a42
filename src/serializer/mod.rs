//! Result serialization: turn whatever a snippet returned into plain JSON.
//!
//! The interpreter reports its result as a [`PyValue`], a closed set of shapes
//! it knows how to describe plus an [`PyValue::Object`] catch-all. Text that
//! only Python can produce (mapping key `str()`, object `repr()`) comes from
//! the interpreter with the value. Serializing never fails: anything without a
//! JSON form becomes `{"type": "not serializable", "repr": ...}`.

use chrono::{NaiveDate, NaiveDateTime, Timelike};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Number, Value};

pub const DEFAULT_REPR_LIMIT: usize = 2000;

/// A value as reported by the interpreter, tagged by shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t", content = "v")]
pub enum PyValue {
    #[serde(rename = "none")]
    None,
    #[serde(rename = "bool")]
    Bool(bool),
    #[serde(rename = "int")]
    Int(i64),
    /// Integer outside `i64`, in decimal.
    #[serde(rename = "bigint")]
    BigInt(String),
    #[serde(rename = "float")]
    Float(f64),
    #[serde(rename = "str")]
    Str(String),
    #[serde(rename = "list")]
    List(Vec<PyValue>),
    #[serde(rename = "tuple")]
    Tuple(Vec<PyValue>),
    /// `(str(key), value)` pairs in iteration order.
    #[serde(rename = "dict")]
    Dict(Vec<(String, PyValue)>),
    #[serde(rename = "set")]
    Set(Vec<PyValue>),
    #[serde(rename = "frozenset")]
    FrozenSet(Vec<PyValue>),
    #[serde(rename = "date")]
    Date(NaiveDate),
    #[serde(rename = "datetime")]
    DateTime(PyDateTime),
    #[serde(rename = "object")]
    Object(PyObject),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PyDateTime {
    pub naive: NaiveDateTime,
    /// Offset from UTC in seconds, for aware values.
    #[serde(default)]
    pub utcoffset: Option<i32>,
}

/// Anything the interpreter could not describe structurally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PyObject {
    #[serde(rename = "type")]
    pub type_name: String,
    /// `None` when producing the repr raised.
    #[serde(default)]
    pub repr: Option<String>,
}

impl PyObject {
    pub fn new(type_name: impl Into<String>, repr: Option<String>) -> Self {
        Self { type_name: type_name.into(), repr }
    }
}

/// Decode JSON text with no nesting limit beyond what the producer allowed.
///
/// Deep values are decoded on a growable stack, so the interpreter's own
/// recursion limit stays the only bound on result depth.
pub fn from_json_str<T: DeserializeOwned>(text: &str) -> serde_json::Result<T> {
    let mut de = serde_json::Deserializer::from_str(text);
    de.disable_recursion_limit();
    let value = T::deserialize(serde_stacker::Deserializer::new(&mut de))?;
    de.end()?;
    Ok(value)
}

/// [`from_json_str`] for an already parsed tree.
pub fn from_json_value<T: DeserializeOwned>(value: Value) -> serde_json::Result<T> {
    T::deserialize(serde_stacker::Deserializer::new(value))
}

#[derive(Debug, Clone, Copy)]
pub struct ResultSerializer {
    repr_limit: usize,
}

impl Default for ResultSerializer {
    fn default() -> Self {
        Self { repr_limit: DEFAULT_REPR_LIMIT }
    }
}

/// Serialize with the default repr limit.
pub fn serialize(value: &PyValue) -> Value {
    ResultSerializer::default().serialize(value)
}

impl ResultSerializer {
    pub fn new(repr_limit: usize) -> Self {
        Self { repr_limit }
    }

    pub fn serialize(&self, value: &PyValue) -> Value {
        match value {
            PyValue::None => Value::Null,
            PyValue::Bool(b) => Value::Bool(*b),
            PyValue::Int(i) => Value::from(*i),
            PyValue::BigInt(digits) => match digits.parse::<u64>() {
                Ok(n) => Value::from(n),
                Err(_) => self.not_serializable(digits.clone()),
            },
            PyValue::Float(f) => match Number::from_f64(*f) {
                Some(n) => Value::Number(n),
                None => self.not_serializable(non_finite_repr(*f).into()),
            },
            PyValue::Str(s) => Value::String(s.clone()),
            PyValue::List(items) | PyValue::Tuple(items) => self.sequence(items),
            PyValue::Dict(pairs) => {
                let mut map = Map::new();
                for (key, item) in pairs {
                    // a colliding key keeps its first position and takes the later value
                    map.insert(key.clone(), self.serialize(item));
                }
                Value::Object(map)
            }
            PyValue::Set(items) | PyValue::FrozenSet(items) => self.sequence(items),
            PyValue::Date(date) => Value::String(date.format("%Y-%m-%d").to_string()),
            PyValue::DateTime(dt) => Value::String(datetime_isoformat(dt)),
            PyValue::Object(obj) => self.not_serializable(object_repr(obj)),
        }
    }

    fn sequence(&self, items: &[PyValue]) -> Value {
        Value::Array(items.iter().map(|item| self.serialize(item)).collect())
    }

    fn not_serializable(&self, repr: String) -> Value {
        let mut map = Map::new();
        map.insert("type".into(), Value::String("not serializable".into()));
        map.insert("repr".into(), Value::String(truncate(repr, self.repr_limit)));
        Value::Object(map)
    }
}

fn truncate(text: String, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text,
    }
}

fn object_repr(obj: &PyObject) -> String {
    obj.repr
        .clone()
        .unwrap_or_else(|| format!("<unrepresentable {} object>", obj.type_name))
}

fn non_finite_repr(f: f64) -> &'static str {
    if f.is_nan() {
        "nan"
    } else if f > 0.0 {
        "inf"
    } else {
        "-inf"
    }
}

/// `datetime.isoformat()`: microseconds only when non-zero, offset seconds only when present.
fn datetime_isoformat(dt: &PyDateTime) -> String {
    let naive = &dt.naive;
    let mut out = naive.format("%Y-%m-%dT%H:%M:%S").to_string();
    let micros = naive.nanosecond() / 1_000;
    if micros != 0 {
        out.push_str(&format!(".{micros:06}"));
    }
    if let Some(offset) = dt.utcoffset {
        let sign = if offset < 0 { '-' } else { '+' };
        let abs = offset.unsigned_abs();
        out.push_str(&format!("{sign}{:02}:{:02}", abs / 3600, (abs % 3600) / 60));
        if abs % 60 != 0 {
            out.push_str(&format!(":{:02}", abs % 60));
        }
    }
    out
}
