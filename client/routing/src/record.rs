use std::collections::BTreeMap;

/// A record value as handed to us by the host collector, before string
/// normalisation: map keys and string leaves may still be raw byte strings.
#[derive(Clone, Debug, PartialEq)]
pub enum RawValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Bytes(Vec<u8>),
    Array(Vec<RawValue>),
    Map(BTreeMap<Vec<u8>, RawValue>),
}

/// A normalised record value: every key and string leaf is valid UTF-8.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Array(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Rendering used by key=value line formatting; JSON rendering goes
    /// through [`Value::to_json`] instead.
    pub fn render(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::String(s) => s.clone(),
            Value::Array(_) | Value::Map(_) => self.to_json().to_string(),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Array(items) => serde_json::Value::Array(items.iter().map(Value::to_json).collect()),
            Value::Map(map) => {
                let mut obj = serde_json::Map::new();
                for (k, v) in map {
                    obj.insert(k.clone(), v.to_json());
                }
                serde_json::Value::Object(obj)
            }
        }
    }
}

/// A normalised log record: a flat key -> value mapping with nested maps
/// for sub-structures such as `kubernetes`.
pub type Record = BTreeMap<String, Value>;

fn decode_key(raw: Vec<u8>) -> String {
    String::from_utf8(raw).unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned())
}

fn normalize_value(raw: RawValue) -> Value {
    match raw {
        RawValue::Null => Value::Null,
        RawValue::Bool(b) => Value::Bool(b),
        RawValue::Int(i) => Value::Int(i),
        RawValue::Float(f) => Value::Float(f),
        RawValue::Bytes(bytes) => Value::String(String::from_utf8_lossy(&bytes).into_owned()),
        RawValue::Array(items) => Value::Array(items.into_iter().map(normalize_value).collect()),
        RawValue::Map(map) => {
            Value::Map(map.into_iter().map(|(k, v)| (decode_key(k), normalize_value(v))).collect())
        }
    }
}

/// Coerces every key to a string and recursively decodes byte-string values
/// to UTF-8, substituting the replacement character for invalid sequences.
pub fn normalize(raw: BTreeMap<Vec<u8>, RawValue>) -> Record {
    raw.into_iter().map(|(k, v)| (decode_key(k), normalize_value(v))).collect()
}

/// Looks up a dotted path (already split into components) inside a record,
/// descending through nested maps.
pub fn get_path<'a>(record: &'a Record, path: &[String]) -> Option<&'a Value> {
    let (first, rest) = path.split_first()?;
    let mut current = record.get(first)?;
    for segment in rest {
        current = current.as_map()?.get(segment)?;
    }
    Some(current)
}
