use std::collections::BTreeMap;

/// A decoded field value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    UInt(u64),
    Float(f64),
    /// Raw `TIME8` value, nanoseconds.
    Time(i64),
    Str(String),
    Array(Vec<Value>),
    Record(Record),
}

impl Value {
    pub fn as_f64(&self) -> Option<f64> {
        #[allow(clippy::cast_precision_loss)]
        match self {
            Self::Int(v) | Self::Time(v) => Some(*v as f64),
            Self::UInt(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Integer view of this value. Unsigned values are reinterpreted
    /// bit for bit so that 64-bit identifiers survive.
    pub fn as_i64(&self) -> Option<i64> {
        #[allow(clippy::cast_possible_wrap)]
        match self {
            Self::Int(v) | Self::Time(v) => Some(*v),
            Self::UInt(v) => Some(*v as i64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Self::Array(values) => Some(values),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Self::Record(rec) => Some(rec),
            _ => None,
        }
    }

    pub fn is_scalar(&self) -> bool {
        !matches!(self, Self::Array(_) | Self::Record(_))
    }
}

/// A decoded record: its type name and named field values.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Record {
    pub rectype: String,
    pub fields: BTreeMap<String, Value>,
}

impl Record {
    pub fn new(rectype: impl Into<String>) -> Self {
        Self {
            rectype: rectype.into(),
            fields: BTreeMap::new(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn get_f64(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(Value::as_f64)
    }

    pub fn get_i64(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(Value::as_i64)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    /// Returns the nested records held by an array-of-records field.
    pub fn records(&self, name: &str) -> impl Iterator<Item = &Record> + '_ {
        self.get(name)
            .and_then(Value::as_array)
            .unwrap_or_default()
            .iter()
            .filter_map(Value::as_record)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.fields.insert(name.into(), value);
    }
}
