//! AMF0 value types

/// A decoded AMF0 value.
///
/// Objects and ECMA arrays keep their properties as ordered key/value pairs
/// rather than a map, so re-encoding a decoded value is byte-deterministic.
#[derive(Debug, Clone, PartialEq)]
pub enum Amf0Value {
    /// Null value (marker 0x05)
    Null,

    /// Undefined value (marker 0x06)
    Undefined,

    /// Boolean (marker 0x01)
    Boolean(bool),

    /// IEEE 754 double (marker 0x00)
    Number(f64),

    /// UTF-8 string (marker 0x02, or 0x0C when longer than u16::MAX)
    String(String),

    /// Anonymous object (marker 0x03), ordered properties
    Object(Vec<(String, Amf0Value)>),

    /// Associative array (marker 0x08), ordered properties
    EcmaArray(Vec<(String, Amf0Value)>),

    /// Dense array (marker 0x0A)
    StrictArray(Vec<Amf0Value>),

    /// Milliseconds since the Unix epoch (marker 0x0B); timezone is dropped
    Date(f64),
}

impl Amf0Value {
    /// Try to get this value as a string reference
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Amf0Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get this value as a number
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Amf0Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Try to get this value as a boolean
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Amf0Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Object or ECMA-array properties, in wire order
    pub fn pairs(&self) -> Option<&[(String, Amf0Value)]> {
        match self {
            Amf0Value::Object(pairs) | Amf0Value::EcmaArray(pairs) => Some(pairs),
            _ => None,
        }
    }

    /// Look up a property by key; first match wins
    pub fn get(&self, key: &str) -> Option<&Amf0Value> {
        self.pairs()?.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Look up a string property by key
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key)?.as_str()
    }

    /// Look up a numeric property by key
    pub fn get_number(&self, key: &str) -> Option<f64> {
        self.get(key)?.as_number()
    }

    /// Check if this value is null or undefined
    pub fn is_null_or_undefined(&self) -> bool {
        matches!(self, Amf0Value::Null | Amf0Value::Undefined)
    }
}

impl Default for Amf0Value {
    fn default() -> Self {
        Amf0Value::Null
    }
}

impl From<bool> for Amf0Value {
    fn from(v: bool) -> Self {
        Amf0Value::Boolean(v)
    }
}

impl From<f64> for Amf0Value {
    fn from(v: f64) -> Self {
        Amf0Value::Number(v)
    }
}

impl From<u32> for Amf0Value {
    fn from(v: u32) -> Self {
        Amf0Value::Number(v as f64)
    }
}

impl From<i32> for Amf0Value {
    fn from(v: i32) -> Self {
        Amf0Value::Number(v as f64)
    }
}

impl From<String> for Amf0Value {
    fn from(v: String) -> Self {
        Amf0Value::String(v)
    }
}

impl From<&str> for Amf0Value {
    fn from(v: &str) -> Self {
        Amf0Value::String(v.to_string())
    }
}

impl<V: Into<Amf0Value>> From<Vec<(String, V)>> for Amf0Value {
    fn from(v: Vec<(String, V)>) -> Self {
        Amf0Value::Object(v.into_iter().map(|(k, v)| (k, v.into())).collect())
    }
}
