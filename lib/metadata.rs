//! Typed metadata attached to loaded images.
//!
//! Loaders describe what they parsed out of an image's headers as a tree of
//! `Metadata` values. The store attached to a `BinaryView` is a
//! `Metadata::KeyValue`, queried with `Metadata::get`.

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// A single metadata value.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Metadata {
    Boolean(bool),
    UnsignedInteger(u64),
    SignedInteger(i64),
    Double(f64),
    String(String),
    Raw(Vec<u8>),
    Array(Vec<Metadata>),
    KeyValue(BTreeMap<String, Metadata>),
}

impl Metadata {
    /// Create an empty key-value store.
    pub fn store() -> Metadata {
        Metadata::KeyValue(BTreeMap::new())
    }

    /// Look up a key in a key-value store. Any other kind of value has no
    /// keys.
    pub fn get(&self, key: &str) -> Option<&Metadata> {
        match self {
            Metadata::KeyValue(map) => map.get(key),
            _ => None,
        }
    }

    /// Set a key in a key-value store, returning the previous value.
    ///
    /// Setting a key on anything but a key-value store is ignored and the
    /// value is handed back.
    pub fn set<S: Into<String>, M: Into<Metadata>>(&mut self, key: S, value: M) -> Option<Metadata> {
        match self {
            Metadata::KeyValue(map) => map.insert(key.into(), value.into()),
            _ => Some(value.into()),
        }
    }

    /// Builder-style `set`.
    pub fn with<S: Into<String>, M: Into<Metadata>>(mut self, key: S, value: M) -> Metadata {
        self.set(key, value);
        self
    }

    pub fn is_unsigned_integer(&self) -> bool {
        matches!(self, Metadata::UnsignedInteger(_))
    }

    pub fn is_key_value_store(&self) -> bool {
        matches!(self, Metadata::KeyValue(_))
    }

    /// The value of an unsigned integer, or `None` for any other kind.
    pub fn as_unsigned_integer(&self) -> Option<u64> {
        match self {
            Metadata::UnsignedInteger(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_signed_integer(&self) -> Option<i64> {
        match self {
            Metadata::SignedInteger(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Metadata::String(value) => Some(value),
            _ => None,
        }
    }

    /// Parse a metadata tree out of a JSON document.
    pub fn from_json_str(json: &str) -> Result<Metadata, serde_json::Error> {
        let value: Value = serde_json::from_str(json)?;
        Ok(Metadata::from(value))
    }
}

impl Default for Metadata {
    fn default() -> Metadata {
        Metadata::store()
    }
}

impl From<bool> for Metadata {
    fn from(value: bool) -> Metadata {
        Metadata::Boolean(value)
    }
}

impl From<u64> for Metadata {
    fn from(value: u64) -> Metadata {
        Metadata::UnsignedInteger(value)
    }
}

impl From<u32> for Metadata {
    fn from(value: u32) -> Metadata {
        Metadata::UnsignedInteger(value as u64)
    }
}

impl From<u16> for Metadata {
    fn from(value: u16) -> Metadata {
        Metadata::UnsignedInteger(value as u64)
    }
}

impl From<i64> for Metadata {
    fn from(value: i64) -> Metadata {
        Metadata::SignedInteger(value)
    }
}

impl From<f64> for Metadata {
    fn from(value: f64) -> Metadata {
        Metadata::Double(value)
    }
}

impl From<&str> for Metadata {
    fn from(value: &str) -> Metadata {
        Metadata::String(value.to_string())
    }
}

impl From<String> for Metadata {
    fn from(value: String) -> Metadata {
        Metadata::String(value)
    }
}

impl From<Vec<Metadata>> for Metadata {
    fn from(value: Vec<Metadata>) -> Metadata {
        Metadata::Array(value)
    }
}

/// JSON numbers which fit a `u64` become unsigned integers, other integers
/// become signed integers, and everything else becomes a double. Keys and
/// array elements holding `null` are left out, and a bare `null` becomes an
/// empty store.
impl From<Value> for Metadata {
    fn from(value: Value) -> Metadata {
        match value {
            Value::Null => Metadata::store(),
            Value::Bool(b) => Metadata::Boolean(b),
            Value::Number(number) => {
                if let Some(u) = number.as_u64() {
                    Metadata::UnsignedInteger(u)
                } else if let Some(i) = number.as_i64() {
                    Metadata::SignedInteger(i)
                } else {
                    Metadata::Double(number.as_f64().unwrap_or(f64::NAN))
                }
            }
            Value::String(s) => Metadata::String(s),
            Value::Array(values) => {
                Metadata::Array(
                    values
                        .into_iter()
                        .filter(|value| !value.is_null())
                        .map(Metadata::from)
                        .collect(),
                )
            }
            Value::Object(map) => Metadata::KeyValue(
                map.into_iter()
                    .filter(|(_, value)| !value.is_null())
                    .map(|(key, value)| (key, Metadata::from(value)))
                    .collect(),
            ),
        }
    }
}

impl fmt::Display for Metadata {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Metadata::Boolean(b) => write!(f, "{}", b),
            Metadata::UnsignedInteger(u) => write!(f, "0x{:x}", u),
            Metadata::SignedInteger(i) => write!(f, "{}", i),
            Metadata::Double(d) => write!(f, "{}", d),
            Metadata::String(s) => write!(f, "{:?}", s),
            Metadata::Raw(bytes) => write!(f, "<{} bytes>", bytes.len()),
            Metadata::Array(values) => {
                let values = values
                    .iter()
                    .map(|value| value.to_string())
                    .collect::<Vec<String>>();
                write!(f, "[{}]", values.join(", "))
            }
            Metadata::KeyValue(map) => {
                let entries = map
                    .iter()
                    .map(|(key, value)| format!("{}: {}", key, value))
                    .collect::<Vec<String>>();
                write!(f, "{{{}}}", entries.join(", "))
            }
        }
    }
}
