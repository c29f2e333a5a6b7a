use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt;

/// Largest integer exactly representable in an f64. Division by zero yields
/// this sentinel in all three evaluation backends.
pub const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

/// Type tag carried by every expression, computed at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ValueType {
    Null,
    Boolean,
    Number,
    String,
    Time,
    Set,
    Dataset,
}

impl ValueType {
    pub fn label(&self) -> &'static str {
        match self {
            ValueType::Null => "NULL",
            ValueType::Boolean => "BOOLEAN",
            ValueType::Number => "NUMBER",
            ValueType::String => "STRING",
            ValueType::Time => "TIME",
            ValueType::Set => "SET",
            ValueType::Dataset => "DATASET",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// A concrete runtime value. `Null` is the ambient null marker; a `Set`
/// holds deduplicated members and triggers pairwise cross-product
/// application of binary operators.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Boolean(bool),
    Number(f64),
    String(String),
    Time(DateTime<Utc>),
    Set(Vec<Value>),
}

impl Value {
    pub fn string(s: &str) -> Value {
        Value::String(s.to_string())
    }

    /// Build a set value, dropping duplicate members while preserving the
    /// first-seen order.
    pub fn set(members: Vec<Value>) -> Value {
        let mut deduped: Vec<Value> = Vec::with_capacity(members.len());
        for member in members {
            if !deduped.contains(&member) {
                deduped.push(member);
            }
        }
        Value::Set(deduped)
    }

    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Null => ValueType::Null,
            Value::Boolean(_) => ValueType::Boolean,
            Value::Number(_) => ValueType::Number,
            Value::String(_) => ValueType::String,
            Value::Time(_) => ValueType::Time,
            Value::Set(_) => ValueType::Set,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_time(&self) -> Option<DateTime<Utc>> {
        match self {
            Value::Time(t) => Some(*t),
            _ => None,
        }
    }

    /// Apply a scalar binary function with the ambient null and set rules:
    /// a null on either side short-circuits to null, and a set on either
    /// side applies the function pairwise over the cross product of the two
    /// member lists, deduplicating the results.
    pub fn cross_binary<F>(a: &Value, b: &Value, f: F) -> Value
    where
        F: Fn(&Value, &Value) -> Value,
    {
        match (a, b) {
            (Value::Null, _) | (_, Value::Null) => Value::Null,
            (Value::Set(xs), Value::Set(ys)) => {
                let mut members = Vec::with_capacity(xs.len() * ys.len());
                for x in xs {
                    for y in ys {
                        members.push(f(x, y));
                    }
                }
                Value::set(members)
            }
            (Value::Set(xs), y) => Value::set(xs.iter().map(|x| f(x, y)).collect()),
            (x, Value::Set(ys)) => Value::set(ys.iter().map(|y| f(x, y)).collect()),
            (x, y) => f(x, y),
        }
    }

    /// Apply a scalar unary function with the same null and set rules.
    pub fn map_unary<F>(v: &Value, f: F) -> Value
    where
        F: Fn(&Value) -> Value,
    {
        match v {
            Value::Null => Value::Null,
            Value::Set(xs) => Value::set(xs.iter().map(&f).collect()),
            x => f(x),
        }
    }

    /// Render this value as a literal in an embeddable scripting fragment.
    pub fn to_script_literal(&self) -> String {
        match self {
            Value::Null => "null".to_string(),
            Value::Boolean(b) => b.to_string(),
            Value::Number(n) => format_number(*n),
            Value::String(s) => {
                serde_json::to_string(s).unwrap_or_else(|_| "null".to_string())
            }
            Value::Time(t) => format!("new Date({})", t.timestamp_millis()),
            Value::Set(members) => {
                let rendered: Vec<String> =
                    members.iter().map(|m| m.to_script_literal()).collect();
                format!("[{}]", rendered.join(","))
            }
        }
    }
}

/// Render a number without a trailing `.0` for integral values.
pub fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e18 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

/// Variable bindings used by native evaluation; unbound references resolve
/// to the null marker.
#[derive(Debug, Clone, Default)]
pub struct Environment {
    bindings: HashMap<String, Value>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(mut self, name: &str, value: Value) -> Self {
        self.bindings.insert(name.to_string(), value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.bindings.get(name)
    }
}
