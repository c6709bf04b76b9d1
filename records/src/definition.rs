//! Record definitions as published by the service's `definition` API.

use crate::RecordError;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use std::{collections::BTreeMap, fmt, sync::Arc};

/// Type of a single record field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FieldType {
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Bitfield,
    Float,
    Double,
    Time8,
    String,
    /// A nested record type, decoded with its own definition.
    User(std::string::String),
}

impl FieldType {
    /// Returns the basic type for the service's numeric type code.
    pub fn from_code(code: u8) -> Option<Self> {
        let ftype = match code {
            0 => Self::Int8,
            1 => Self::Int16,
            2 => Self::Int32,
            3 => Self::Int64,
            4 => Self::UInt8,
            5 => Self::UInt16,
            6 => Self::UInt32,
            7 => Self::UInt64,
            8 => Self::Bitfield,
            9 => Self::Float,
            10 => Self::Double,
            11 => Self::Time8,
            12 => Self::String,
            _ => return None,
        };
        Some(ftype)
    }

    /// Size in bytes of one element, or `None` for user types.
    pub fn size(&self) -> Option<usize> {
        match self {
            Self::Int8 | Self::UInt8 | Self::String => Some(1),
            Self::Int16 | Self::UInt16 => Some(2),
            Self::Int32 | Self::UInt32 | Self::Float => Some(4),
            Self::Int64 | Self::UInt64 | Self::Double | Self::Time8 => Some(8),
            Self::Bitfield => Some(0),
            Self::User(_) => None,
        }
    }

    pub fn is_basic(&self) -> bool {
        !matches!(self, Self::User(_))
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Int8 => "INT8",
            Self::Int16 => "INT16",
            Self::Int32 => "INT32",
            Self::Int64 => "INT64",
            Self::UInt8 => "UINT8",
            Self::UInt16 => "UINT16",
            Self::UInt32 => "UINT32",
            Self::UInt64 => "UINT64",
            Self::Bitfield => "BITFIELD",
            Self::Float => "FLOAT",
            Self::Double => "DOUBLE",
            Self::Time8 => "TIME8",
            Self::String => "STRING",
            Self::User(name) => name,
        }
    }
}

impl From<std::string::String> for FieldType {
    fn from(name: std::string::String) -> Self {
        match name.as_str() {
            "INT8" => Self::Int8,
            "INT16" => Self::Int16,
            "INT32" => Self::Int32,
            "INT64" => Self::Int64,
            "UINT8" => Self::UInt8,
            "UINT16" => Self::UInt16,
            "UINT32" => Self::UInt32,
            "UINT64" => Self::UInt64,
            "BITFIELD" => Self::Bitfield,
            "FLOAT" => Self::Float,
            "DOUBLE" => Self::Double,
            "TIME8" => Self::Time8,
            "STRING" => Self::String,
            _ => Self::User(name),
        }
    }
}

impl From<FieldType> for std::string::String {
    fn from(ftype: FieldType) -> Self {
        ftype.name().to_owned()
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDef {
    #[serde(rename = "type")]
    pub ftype: FieldType,

    /// Offset from the start of record data, in bits.
    pub offset: u64,

    /// `1` for scalars, `>1` for fixed arrays, `<=0` for arrays
    /// running to the end of the record.
    pub elements: i64,

    #[serde(default)]
    pub flags: String,
}

impl FieldDef {
    pub fn byte_offset(&self) -> usize {
        (self.offset / 8) as usize
    }

    pub fn is_pointer(&self) -> bool {
        self.flags.contains("PTR")
    }

    pub fn is_little_endian(&self) -> bool {
        self.flags.contains("LE")
    }

    pub fn is_array(&self) -> bool {
        self.elements != 1
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct RecordDef {
    /// Size in bytes of a fixed-length instance of this record.
    pub datasize: usize,

    /// Field definitions keyed by name, metadata excluded.
    pub fields: BTreeMap<String, FieldDef>,
}

impl RecordDef {
    /// Parses the JSON object returned by the `definition` API.
    ///
    /// Keys prefixed with `__` are metadata; only `__datasize` is
    /// retained.
    pub fn from_json(rectype: &str, json: &Json) -> Result<Self, RecordError> {
        let obj = json
            .as_object()
            .ok_or_else(|| RecordError::Definition(rectype.to_owned()))?;
        let mut def = RecordDef::default();
        for (name, value) in obj {
            if name == "__datasize" {
                def.datasize = value.as_u64().unwrap_or_default() as usize;
            } else if !name.starts_with("__") {
                let field: FieldDef = serde_json::from_value(value.clone())
                    .map_err(|_| RecordError::Definition(format!("{rectype}.{name}")))?;
                def.fields.insert(name.clone(), field);
            }
        }
        Ok(def)
    }

    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.get(name)
    }
}

/// Anything that can resolve a record type name to its definition.
pub trait DefinitionSource {
    type Error: From<RecordError>;

    fn definition(&self, rectype: &str) -> Result<Arc<RecordDef>, Self::Error>;
}

/// Fixed, in-memory set of definitions.
#[derive(Debug, Clone, Default)]
pub struct StaticDefinitions {
    defs: BTreeMap<String, Arc<RecordDef>>,
}

impl StaticDefinitions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, rectype: impl Into<String>, def: RecordDef) {
        self.defs.insert(rectype.into(), Arc::new(def));
    }

    pub fn with(mut self, rectype: impl Into<String>, def: RecordDef) -> Self {
        self.insert(rectype, def);
        self
    }
}

impl DefinitionSource for StaticDefinitions {
    type Error = RecordError;

    fn definition(&self, rectype: &str) -> Result<Arc<RecordDef>, RecordError> {
        self.defs
            .get(rectype)
            .cloned()
            .ok_or_else(|| RecordError::Definition(rectype.to_owned()))
    }
}
