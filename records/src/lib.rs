//! SlideRule native record format.
//!
//! Stream services answer with `application/octet-stream` bodies made
//! of self-describing records. Framing is handled by [RecordStream];
//! the layout of each record type is published by the service as a
//! [RecordDef] and applied by [decode].
//!
//! # Example
//!
//! ```
//! use records::{decode, RawRecord, RecordDef, RecordStream, StaticDefinitions};
//! use serde_json::json;
//!
//! let def = RecordDef::from_json(
//!     "pair",
//!     &json!({
//!         "__datasize": 4,
//!         "a": { "type": "UINT16", "offset": 0, "elements": 1, "flags": "LE" },
//!         "b": { "type": "UINT16", "offset": 16, "elements": 1, "flags": "LE" },
//!     }),
//! )
//! .unwrap();
//! let defs = StaticDefinitions::new().with("pair", def);
//!
//! let raw = RawRecord { rectype: "pair".into(), data: vec![1, 0, 2, 0] };
//! let mut stream = RecordStream::new();
//! let records = stream.feed(&raw.to_bytes()).unwrap();
//! let rec = decode(&records[0].rectype, &records[0].data, &defs).unwrap();
//! assert_eq!(rec.get_i64("b"), Some(2));
//! ```

mod decode;
mod definition;
mod error;
mod stream;
mod value;

pub use crate::{
    decode::decode,
    definition::{DefinitionSource, FieldDef, FieldType, RecordDef, StaticDefinitions},
    error::RecordError,
    stream::{RawRecord, RecordStream, HEADER_SIZE, RECORD_VERSION},
    value::{Record, Value},
};
