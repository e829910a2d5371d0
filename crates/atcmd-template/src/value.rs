use serde::Serialize;

use crate::error::{Result, TemplateError};

/// A typed value passed to a formatting directive or produced by a capture.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Int(i64),
    Uint(u64),
    Float(f64),
    Str(String),
}

impl Value {
    /// Human-readable kind name used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Int(_) => "integer",
            Value::Uint(_) => "unsigned integer",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{v}"),
            Value::Uint(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Str(v) => f.write_str(v),
        }
    }
}

macro_rules! value_from {
    ($variant:ident as $target:ty: $($t:ty),*) => {
        $(impl From<$t> for Value {
            fn from(v: $t) -> Self {
                Value::$variant(v as $target)
            }
        })*
    };
}

value_from!(Int as i64: i8, i16, i32, i64, isize);
value_from!(Uint as u64: u8, u16, u32, u64, usize);
value_from!(Float as f64: f32, f64);

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<&String> for Value {
    fn from(v: &String) -> Self {
        Value::Str(v.clone())
    }
}

impl From<char> for Value {
    fn from(v: char) -> Self {
        Value::Str(v.to_string())
    }
}

/// Build an argument array for a formatting call.
///
/// ```
/// let args = atcmd_template::args![5, "apn", 1.5];
/// assert_eq!(args.len(), 3);
/// ```
#[macro_export]
macro_rules! args {
    ($($arg:expr),* $(,)?) => {
        [$($crate::Value::from($arg)),*]
    };
}

/// Conversion from a captured [`Value`] into a Rust type.
pub trait FromValue: Sized {
    /// Kind name reported when conversion fails.
    const EXPECTED: &'static str;

    fn from_value(value: &Value) -> Option<Self>;
}

macro_rules! from_value_int {
    ($($t:ty),*) => {
        $(impl FromValue for $t {
            const EXPECTED: &'static str = stringify!($t);

            fn from_value(value: &Value) -> Option<Self> {
                match value {
                    Value::Int(v) => <$t>::try_from(*v).ok(),
                    Value::Uint(v) => <$t>::try_from(*v).ok(),
                    _ => None,
                }
            }
        })*
    };
}

from_value_int!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);

impl FromValue for f64 {
    const EXPECTED: &'static str = "f64";

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Float(v) => Some(*v),
            Value::Int(v) => Some(*v as f64),
            Value::Uint(v) => Some(*v as f64),
            Value::Str(_) => None,
        }
    }
}

impl FromValue for f32 {
    const EXPECTED: &'static str = "f32";

    fn from_value(value: &Value) -> Option<Self> {
        f64::from_value(value).map(|v| v as f32)
    }
}

impl FromValue for String {
    const EXPECTED: &'static str = "string";

    fn from_value(value: &Value) -> Option<Self> {
        value.as_str().map(str::to_string)
    }
}

impl FromValue for Value {
    const EXPECTED: &'static str = "value";

    fn from_value(value: &Value) -> Option<Self> {
        Some(value.clone())
    }
}

/// Values captured by a match, in directive order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Captures {
    values: Vec<Value>,
}

impl Captures {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Value> {
        self.values.iter()
    }

    /// Append the values captured by one more line.
    pub fn extend(&mut self, values: impl IntoIterator<Item = Value>) {
        self.values.extend(values);
    }

    /// Convert capture `index` into `T`.
    pub fn get<T: FromValue>(&self, index: usize) -> Result<T> {
        let value = self
            .values
            .get(index)
            .ok_or(TemplateError::MissingCapture {
                index,
                len: self.values.len(),
            })?;
        T::from_value(value).ok_or(TemplateError::Capture {
            index,
            expected: T::EXPECTED,
            found: value.kind(),
        })
    }

    pub fn into_vec(self) -> Vec<Value> {
        self.values
    }
}

impl From<Vec<Value>> for Captures {
    fn from(values: Vec<Value>) -> Self {
        Self { values }
    }
}

impl IntoIterator for Captures {
    type Item = Value;
    type IntoIter = std::vec::IntoIter<Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.into_iter()
    }
}

impl std::ops::Index<usize> for Captures {
    type Output = Value;

    fn index(&self, index: usize) -> &Value {
        &self.values[index]
    }
}

/// Conversion from a full set of captures into a typed result.
pub trait FromCaptures: Sized {
    fn from_captures(captures: Captures) -> Result<Self>;
}

impl FromCaptures for Captures {
    fn from_captures(captures: Captures) -> Result<Self> {
        Ok(captures)
    }
}

impl FromCaptures for Vec<Value> {
    fn from_captures(captures: Captures) -> Result<Self> {
        Ok(captures.into_vec())
    }
}

macro_rules! from_captures_tuple {
    ($len:expr => $($name:ident $idx:tt),+) => {
        impl<$($name: FromValue),+> FromCaptures for ($($name,)+) {
            fn from_captures(captures: Captures) -> Result<Self> {
                if captures.len() != $len {
                    return Err(TemplateError::CaptureCount {
                        expected: $len,
                        found: captures.len(),
                    });
                }
                Ok(($(captures.get::<$name>($idx)?,)+))
            }
        }
    };
}

impl FromCaptures for () {
    fn from_captures(captures: Captures) -> Result<Self> {
        if captures.is_empty() {
            Ok(())
        } else {
            Err(TemplateError::CaptureCount {
                expected: 0,
                found: captures.len(),
            })
        }
    }
}

from_captures_tuple!(1 => A 0);
from_captures_tuple!(2 => A 0, B 1);
from_captures_tuple!(3 => A 0, B 1, C 2);
from_captures_tuple!(4 => A 0, B 1, C 2, D 3);
from_captures_tuple!(5 => A 0, B 1, C 2, D 3, E 4);
from_captures_tuple!(6 => A 0, B 1, C 2, D 3, E 4, F 5);
