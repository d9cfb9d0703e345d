use serde::{Deserialize, Serialize};
use std::fmt;

/// The declared type of a variable-store entry or entry field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldType {
    Boolean,
    Number,
    Text,
}

/// A dynamic value shared between story variable tables, the variable
/// store, external function arguments and entry fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl Default for Value {
    fn default() -> Self {
        Self::Text(String::new())
    }
}

impl Value {
    /// Infers the store type of an engine value. A missing value is text.
    pub fn field_type_of(value: Option<&Value>) -> FieldType {
        match value {
            Some(Value::Bool(_)) => FieldType::Boolean,
            Some(Value::Number(_)) => FieldType::Number,
            Some(Value::Text(_)) | None => FieldType::Text,
        }
    }

    pub fn field_type(&self) -> FieldType {
        Self::field_type_of(Some(self))
    }

    /// Boolean view. Text is true only when it reads "true" in any case.
    pub fn as_bool(&self) -> bool {
        match self {
            Self::Bool(b) => *b,
            Self::Number(n) => *n != 0.0,
            Self::Text(s) => s.trim().eq_ignore_ascii_case("true"),
        }
    }

    /// Numeric view. Unparseable text is zero.
    pub fn as_number(&self) -> f64 {
        match self {
            Self::Bool(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            Self::Number(n) => *n,
            Self::Text(s) => s.trim().parse().unwrap_or(0.0),
        }
    }

    /// Integer view, truncating toward zero.
    pub fn as_int(&self) -> i64 {
        self.as_number() as i64
    }

    pub fn as_text(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{}", b),
            Self::Number(n) => write!(f, "{}", n),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Number(value as f64)
    }
}

impl From<usize> for Value {
    fn from(value: usize) -> Self {
        Self::Number(value as f64)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}
