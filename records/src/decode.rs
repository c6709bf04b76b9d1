use crate::{
    definition::{DefinitionSource, FieldDef, FieldType},
    Record, RecordError, Value,
};
use byteorder::{BigEndian as BE, ByteOrder, LittleEndian as LE};
use log::debug;

/// Decodes `data` as an instance of `rectype`.
///
/// Definitions for `rectype`, and for any nested user types, are
/// resolved through `defs`.
pub fn decode<S>(rectype: &str, data: &[u8], defs: &S) -> Result<Record, S::Error>
where
    S: DefinitionSource + ?Sized,
{
    let def = defs.definition(rectype)?;
    let mut rec = Record::new(rectype);

    for (name, field) in &def.fields {
        if field.is_pointer() {
            continue;
        }
        let value = match &field.ftype {
            FieldType::Bitfield => {
                debug!("skipping unsupported bitfield {rectype}.{name}");
                continue;
            }
            FieldType::User(subtype) => decode_user(rectype, name, field, subtype, data, defs)?,
            basic => decode_basic(rectype, name, field, basic, data)?,
        };
        rec.insert(name.clone(), value);
    }

    Ok(rec)
}

fn decode_basic(
    rectype: &str,
    name: &str,
    field: &FieldDef,
    ftype: &FieldType,
    data: &[u8],
) -> Result<Value, RecordError> {
    let truncated = || RecordError::Truncated {
        rectype: rectype.to_owned(),
        field: name.to_owned(),
    };
    let size = ftype.size().ok_or_else(truncated)?;
    let offset = field.byte_offset();
    let remaining = data.len().checked_sub(offset).ok_or_else(truncated)?;

    #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
    let elems = if field.elements <= 0 {
        remaining / size
    } else {
        field.elements as usize
    };
    let end = elems
        .checked_mul(size)
        .and_then(|len| len.checked_add(offset))
        .ok_or_else(truncated)?;
    let raw = data.get(offset..end).ok_or_else(truncated)?;

    if *ftype == FieldType::String {
        let terminated = raw.iter().position(|b| *b == 0).unwrap_or(raw.len());
        let text = &raw[..terminated];
        if !text.is_ascii() {
            return Err(RecordError::Utf8);
        }
        return Ok(Value::Str(String::from_utf8_lossy(text).into_owned()));
    }

    let read = |chunk: &[u8]| {
        if field.is_little_endian() {
            read_basic::<LE>(ftype, chunk)
        } else {
            read_basic::<BE>(ftype, chunk)
        }
    };

    if field.is_array() {
        Ok(Value::Array(raw.chunks_exact(size).map(read).collect()))
    } else {
        Ok(read(raw))
    }
}

fn decode_user<S>(
    rectype: &str,
    name: &str,
    field: &FieldDef,
    subtype: &str,
    data: &[u8],
    defs: &S,
) -> Result<Value, S::Error>
where
    S: DefinitionSource + ?Sized,
{
    let truncated = || RecordError::Truncated {
        rectype: rectype.to_owned(),
        field: name.to_owned(),
    };
    let mut offset = field.byte_offset();
    if offset > data.len() {
        return Err(truncated().into());
    }

    if !field.is_array() {
        return Ok(Value::Record(decode(subtype, &data[offset..], defs)?));
    }

    let datasize = defs.definition(subtype)?.datasize;
    #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
    let elems = match (field.elements, datasize) {
        (n, _) if n > 0 => n as usize,
        (_, 0) => 0,
        (_, size) => (data.len() - offset) / size,
    };

    let mut values = Vec::with_capacity(elems.min(data.len()));
    for _ in 0..elems {
        let rest = data.get(offset..).ok_or_else(truncated)?;
        values.push(Value::Record(decode(subtype, rest, defs)?));
        offset += datasize;
    }
    Ok(Value::Array(values))
}

/// Reads one basic element from the start of `buf`.
///
/// `buf` must hold at least `ftype.size()` bytes.
fn read_basic<B: ByteOrder>(ftype: &FieldType, buf: &[u8]) -> Value {
    match ftype {
        FieldType::Int8 => Value::Int(i64::from(buf[0] as i8)),
        FieldType::Int16 => Value::Int(i64::from(B::read_i16(buf))),
        FieldType::Int32 => Value::Int(i64::from(B::read_i32(buf))),
        FieldType::Int64 => Value::Int(B::read_i64(buf)),
        FieldType::UInt8 => Value::UInt(u64::from(buf[0])),
        FieldType::UInt16 => Value::UInt(u64::from(B::read_u16(buf))),
        FieldType::UInt32 => Value::UInt(u64::from(B::read_u32(buf))),
        FieldType::UInt64 => Value::UInt(B::read_u64(buf)),
        FieldType::Float => Value::Float(f64::from(B::read_f32(buf))),
        FieldType::Double => Value::Float(B::read_f64(buf)),
        #[allow(clippy::cast_possible_wrap)]
        FieldType::Time8 => Value::Time(B::read_u64(buf) as i64),
        FieldType::String | FieldType::Bitfield | FieldType::User(_) => {
            unreachable!("{ftype} is not a fixed-size numeric type")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::decode;
    use crate::{
        definition::{FieldDef, FieldType, RecordDef, StaticDefinitions},
        RecordError, Value,
    };
    use byteorder::{BigEndian as BE, LittleEndian as LE, WriteBytesExt};

    fn field(ftype: FieldType, offset_bytes: u64, elements: i64, flags: &str) -> FieldDef {
        FieldDef {
            ftype,
            offset: offset_bytes * 8,
            elements,
            flags: flags.to_owned(),
        }
    }

    /// `atl06rec.elevation`: extent_id u64, h_mean f64, rgt u16, gt u16, 20 bytes.
    fn elevation_def() -> RecordDef {
        let mut def = RecordDef {
            datasize: 20,
            ..Default::default()
        };
        def.fields
            .insert("extent_id".into(), field(FieldType::UInt64, 0, 1, "LE"));
        def.fields
            .insert("h_mean".into(), field(FieldType::Double, 8, 1, "LE"));
        def.fields
            .insert("rgt".into(), field(FieldType::UInt16, 16, 1, "LE"));
        def.fields
            .insert("gt".into(), field(FieldType::UInt16, 18, 1, "LE"));
        def
    }

    fn atl06_defs() -> StaticDefinitions {
        let mut parent = RecordDef::default();
        parent.fields.insert(
            "elevation".into(),
            field(FieldType::User("atl06rec.elevation".into()), 0, 0, "BATCH"),
        );
        StaticDefinitions::new()
            .with("atl06rec", parent)
            .with("atl06rec.elevation", elevation_def())
    }

    fn elevation_bytes(extent_id: u64, h_mean: f64, rgt: u16, gt: u16) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.write_u64::<LE>(extent_id).unwrap();
        buf.write_f64::<LE>(h_mean).unwrap();
        buf.write_u16::<LE>(rgt).unwrap();
        buf.write_u16::<LE>(gt).unwrap();
        buf
    }

    #[test]
    fn test_decode_variable_array_of_user_types() {
        let mut data = elevation_bytes(7, 10.0, 295, 10);
        data.extend(elevation_bytes(8, 12.0, 295, 20));
        let rec = decode("atl06rec", &data, &atl06_defs()).unwrap();
        let rows: Vec<_> = rec.records("elevation").collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get_i64("extent_id"), Some(7));
        assert_eq!(rows[1].get_f64("h_mean"), Some(12.0));
        assert_eq!(rows[1].get("gt"), Some(&Value::UInt(20)));
        assert_eq!(rows[1].rectype, "atl06rec.elevation");
    }

    #[test]
    fn test_decode_big_endian_scalars_and_strings() {
        let mut def = RecordDef::default();
        def.fields
            .insert("code".into(), field(FieldType::Int32, 0, 1, "BE"));
        def.fields
            .insert("level".into(), field(FieldType::Int32, 4, 1, "BE"));
        def.fields
            .insert("text".into(), field(FieldType::String, 8, 0, ""));
        let defs = StaticDefinitions::new().with("exceptrec", def);

        let mut data = Vec::new();
        data.write_i32::<BE>(-1).unwrap();
        data.write_i32::<BE>(2).unwrap();
        data.extend_from_slice(b"resource not found\0\0\0");

        let rec = decode("exceptrec", &data, &defs).unwrap();
        assert_eq!(rec.get("code"), Some(&Value::Int(-1)));
        assert_eq!(rec.get("level"), Some(&Value::Int(2)));
        assert_eq!(rec.get_str("text"), Some("resource not found"));
    }

    #[test]
    fn test_decode_fixed_array_and_skips() {
        let mut def = RecordDef::default();
        def.fields
            .insert("samples".into(), field(FieldType::Int16, 0, 3, "LE"));
        def.fields
            .insert("next".into(), field(FieldType::UInt64, 6, 1, "LE|PTR"));
        def.fields
            .insert("flags".into(), field(FieldType::Bitfield, 6, 1, ""));
        let defs = StaticDefinitions::new().with("arr", def);

        let mut data = Vec::new();
        for v in [-3_i16, 0, 9] {
            data.write_i16::<LE>(v).unwrap();
        }

        let rec = decode("arr", &data, &defs).unwrap();
        assert_eq!(
            rec.get("samples"),
            Some(&Value::Array(vec![
                Value::Int(-3),
                Value::Int(0),
                Value::Int(9)
            ]))
        );
        assert!(rec.get("next").is_none());
        assert!(rec.get("flags").is_none());
    }

    #[test]
    fn test_truncated_record_is_an_error() {
        let defs = StaticDefinitions::new().with("atl06rec.elevation", elevation_def());
        let data = elevation_bytes(1, 2.0, 3, 4);
        // Fields decode in name order; `gt` at byte 18 is the first past the end.
        let err = decode("atl06rec.elevation", &data[..12], &defs).unwrap_err();
        assert!(matches!(err, RecordError::Truncated { field, .. } if field == "gt"));
    }

    #[test]
    fn test_oversized_array_is_truncated() {
        let mut def = RecordDef::default();
        def.fields
            .insert("samples".into(), field(FieldType::Double, 4, i64::MAX, "LE"));
        let defs = StaticDefinitions::new().with("huge", def);
        let err = decode("huge", &[0; 16], &defs).unwrap_err();
        assert!(matches!(err, RecordError::Truncated { field, .. } if field == "samples"));
    }

    #[test]
    fn test_unknown_rectype() {
        let err = decode("nope", &[], &StaticDefinitions::new()).unwrap_err();
        assert!(matches!(err, RecordError::Definition(name) if name == "nope"));
    }
}
