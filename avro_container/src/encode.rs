// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

use crate::{
    AvroResult,
    error::Details,
    json,
    schema::{
        ArraySchema, EnumSchema, FixedSchema, MapSchema, Name, RecordSchema, ResolvedSchema,
        Schema, SchemaKind, UnionSchema, deref_schema,
    },
    types::{Value, ValueKind},
    util::{zig_i32, zig_i64},
};
use std::{
    borrow::{Borrow, Cow},
    collections::HashMap,
    fmt,
    io::Write,
};

/// Location of a value inside the datum being encoded, rendered like `$.field[2]["key"]`.
#[derive(Debug)]
pub(crate) struct ValuePath(String);

impl ValuePath {
    pub(crate) fn new() -> Self {
        Self("$".to_string())
    }

    /// Descend into a record field; returns the mark to [`truncate`](Self::truncate) back to.
    pub(crate) fn push_field(&mut self, name: &str) -> usize {
        let mark = self.0.len();
        self.0.push('.');
        self.0.push_str(name);
        mark
    }

    pub(crate) fn push_index(&mut self, index: usize) -> usize {
        let mark = self.0.len();
        self.0.push_str(&format!("[{index}]"));
        mark
    }

    pub(crate) fn push_key(&mut self, key: &str) -> usize {
        let mark = self.0.len();
        self.0.push_str(&format!("[{key:?}]"));
        mark
    }

    pub(crate) fn mark(&self) -> usize {
        self.0.len()
    }

    pub(crate) fn truncate(&mut self, mark: usize) {
        self.0.truncate(mark);
    }
}

impl fmt::Display for ValuePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Encode a `Value` into avro format, guided by `schema`.
///
/// The value must match the schema exactly; there is no implicit coercion between kinds (an
/// `Int` is not accepted for a `long`). Failures carry the path of the offending value.
pub fn encode<W: Write>(value: &Value, schema: &Schema, writer: &mut W) -> AvroResult<usize> {
    let rs = ResolvedSchema::try_from(schema)?;
    encode_internal(value, schema, rs.get_names(), &mut ValuePath::new(), writer)
}

pub fn encode_to_vec(value: &Value, schema: &Schema) -> AvroResult<Vec<u8>> {
    let mut buffer = Vec::new();
    encode(value, schema, &mut buffer)?;
    Ok(buffer)
}

pub(crate) fn encode_bytes<B: AsRef<[u8]> + ?Sized, W: Write>(
    s: &B,
    mut writer: W,
) -> AvroResult<usize> {
    let bytes = s.as_ref();
    let header = encode_long(bytes.len() as i64, &mut writer)?;
    writer
        .write_all(bytes)
        .map_err(Details::WriteBytes)?;
    Ok(header + bytes.len())
}

pub(crate) fn encode_long<W: Write>(i: i64, writer: W) -> AvroResult<usize> {
    zig_i64(i, writer)
}

pub(crate) fn encode_int<W: Write>(i: i32, writer: W) -> AvroResult<usize> {
    zig_i32(i, writer)
}

fn write_raw<W: Write>(bytes: &[u8], writer: &mut W) -> AvroResult<usize> {
    writer.write_all(bytes).map_err(Details::WriteBytes)?;
    Ok(bytes.len())
}

pub(crate) fn encode_internal<W: Write, S: Borrow<Schema>>(
    value: &Value,
    schema: &Schema,
    names: &HashMap<Name, S>,
    path: &mut ValuePath,
    writer: &mut W,
) -> AvroResult<usize> {
    let schema = deref_schema(schema, names)?;

    match (schema, value) {
        (Schema::Union(union), value) => encode_union(value, union, names, path, writer),
        (Schema::Null, Value::Null) => Ok(0),
        (Schema::Boolean, Value::Boolean(b)) => write_raw(&[u8::from(*b)], writer),
        (Schema::Int, Value::Int(i)) => encode_int(*i, writer),
        (Schema::Long, Value::Long(i)) => encode_long(*i, writer),
        (Schema::Float, Value::Float(x)) => write_raw(&x.to_le_bytes(), writer),
        (Schema::Double, Value::Double(x)) => write_raw(&x.to_le_bytes(), writer),
        (Schema::Bytes, Value::Bytes(bytes)) => encode_bytes(bytes, writer),
        (Schema::String, Value::String(s)) => encode_bytes(s, writer),
        (Schema::Fixed(FixedSchema { size, .. }), Value::Fixed(_, bytes)) => {
            if bytes.len() != *size {
                return Err(Details::FixedSize {
                    path: path.to_string(),
                    expected: *size,
                    found: bytes.len(),
                }
                .into());
            }
            write_raw(bytes, writer)
        }
        (Schema::Enum(EnumSchema { symbols, .. }), Value::Enum(_, symbol)) => {
            match symbols.iter().position(|s| s == symbol) {
                Some(index) => encode_int(index as i32, writer),
                None => Err(Details::EnumSymbol {
                    path: path.to_string(),
                    symbol: symbol.clone(),
                }
                .into()),
            }
        }
        (Schema::Array(ArraySchema { items: item_schema, .. }), Value::Array(items)) => {
            let mut written = 0;
            if !items.is_empty() {
                written += encode_long(items.len() as i64, &mut *writer)?;
                for (index, item) in items.iter().enumerate() {
                    let mark = path.push_index(index);
                    written += encode_internal(item, item_schema, names, path, &mut *writer)?;
                    path.truncate(mark);
                }
            }
            Ok(written + write_raw(&[0u8], writer)?)
        }
        (Schema::Map(MapSchema { types, .. }), Value::Map(items)) => {
            let mut written = 0;
            if !items.is_empty() {
                written += encode_long(items.len() as i64, &mut *writer)?;
                for (key, value) in items {
                    written += encode_bytes(key, &mut *writer)?;
                    let mark = path.push_key(key);
                    written += encode_internal(value, types, names, path, &mut *writer)?;
                    path.truncate(mark);
                }
            }
            Ok(written + write_raw(&[0u8], writer)?)
        }
        (Schema::Record(record), Value::Record(fields)) => {
            encode_record(fields, record, names, path, writer)
        }
        _ => Err(Details::EncodeValueAsSchema {
            path: path.to_string(),
            value_kind: ValueKind::from(value),
            schema_kind: SchemaKind::from(schema),
        }
        .into()),
    }
}

fn encode_record<W: Write, S: Borrow<Schema>>(
    value_fields: &[(String, Value)],
    record: &RecordSchema,
    names: &HashMap<Name, S>,
    path: &mut ValuePath,
    writer: &mut W,
) -> AvroResult<usize> {
    let lookup: HashMap<&str, &Value> = value_fields
        .iter()
        .map(|(name, value)| (name.as_str(), value))
        .collect();

    let mut written = 0;
    for field in &record.fields {
        let mark = path.push_field(&field.name);
        let value = match (lookup.get(field.name.as_str()), &field.default) {
            (Some(value), _) => Cow::Borrowed(*value),
            (None, Some(default)) => Cow::Owned(json::from_json_internal(
                default,
                &field.schema,
                names,
                path,
            )?),
            (None, None) => {
                path.truncate(mark);
                return Err(Details::MissingField {
                    path: path.to_string(),
                    field: field.name.clone(),
                }
                .into());
            }
        };
        written += encode_internal(&value, &field.schema, names, path, writer)?;
        path.truncate(mark);
    }
    Ok(written)
}

fn encode_union<W: Write, S: Borrow<Schema>>(
    value: &Value,
    union: &UnionSchema,
    names: &HashMap<Name, S>,
    path: &mut ValuePath,
    writer: &mut W,
) -> AvroResult<usize> {
    let variants = union.variants();

    if let Value::Union(index, inner) = value {
        let variant = variants.get(*index as usize).ok_or_else(|| Details::UnionIndex {
            path: path.to_string(),
            index: *index,
            num_variants: variants.len(),
        })?;
        let header = encode_long(i64::from(*index), &mut *writer)?;
        return Ok(header + encode_internal(inner, variant, names, path, writer)?);
    }

    let candidates: Vec<usize> = variants
        .iter()
        .enumerate()
        .filter(|(_, variant)| may_match(value, variant, names))
        .map(|(index, _)| index)
        .collect();

    match candidates.as_slice() {
        [] => {}
        [index] => {
            let header = encode_long(*index as i64, &mut *writer)?;
            return Ok(header + encode_internal(value, &variants[*index], names, path, writer)?);
        }
        several => {
            // Several records (or several enums) are told apart by trying them in order.
            let mut buffer = Vec::new();
            let mark = path.mark();
            for &index in several {
                buffer.clear();
                encode_long(index as i64, &mut buffer)?;
                if encode_internal(value, &variants[index], names, path, &mut buffer).is_ok() {
                    return write_raw(&buffer, writer);
                }
                path.truncate(mark);
            }
        }
    }

    Err(Details::UnionNoMatch {
        path: path.to_string(),
        value_kind: ValueKind::from(value),
    }
    .into())
}

/// Cheap structural check used to pick the union variant of a bare value.
fn may_match<S: Borrow<Schema>>(value: &Value, variant: &Schema, names: &HashMap<Name, S>) -> bool {
    let Ok(variant) = deref_schema(variant, names) else {
        return false;
    };
    match (value, variant) {
        (Value::Null, Schema::Null)
        | (Value::Boolean(_), Schema::Boolean)
        | (Value::Int(_), Schema::Int)
        | (Value::Long(_), Schema::Long)
        | (Value::Float(_), Schema::Float)
        | (Value::Double(_), Schema::Double)
        | (Value::Bytes(_), Schema::Bytes)
        | (Value::String(_), Schema::String)
        | (Value::Array(_), Schema::Array(_))
        | (Value::Map(_), Schema::Map(_))
        | (Value::Record(_), Schema::Record(_)) => true,
        (Value::Fixed(_, bytes), Schema::Fixed(FixedSchema { size, .. })) => bytes.len() == *size,
        (Value::Enum(_, symbol), Schema::Enum(EnumSchema { symbols, .. })) => {
            symbols.contains(symbol)
        }
        _ => false,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::{TestResult, error::ErrorKind};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_encode_empty_array() -> TestResult {
        let buf = encode_to_vec(&Value::Array(Vec::new()), &Schema::array(Schema::Int))?;
        assert_eq!(vec![0u8], buf);
        Ok(())
    }

    #[test]
    fn test_encode_empty_map() -> TestResult {
        let buf = encode_to_vec(&Value::Map(HashMap::new()), &Schema::map(Schema::Int))?;
        assert_eq!(vec![0u8], buf);
        Ok(())
    }

    #[test]
    fn test_encode_primitives() -> TestResult {
        assert_eq!(encode_to_vec(&Value::Long(-1), &Schema::Long)?, [0x01]);
        assert_eq!(encode_to_vec(&Value::Int(64), &Schema::Int)?, [0x80, 0x01]);
        assert_eq!(encode_to_vec(&Value::Boolean(true), &Schema::Boolean)?, [0x01]);
        assert_eq!(
            encode_to_vec(&Value::String("foo".into()), &Schema::String)?,
            [0x06, b'f', b'o', b'o']
        );
        assert_eq!(
            encode_to_vec(&Value::Float(1.0), &Schema::Float)?,
            1.0f32.to_le_bytes()
        );
        Ok(())
    }

    #[test]
    fn test_no_implicit_coercion() {
        let err = encode_to_vec(&Value::Int(1), &Schema::Long).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Encoding);
        assert!(matches!(
            err.details(),
            Details::EncodeValueAsSchema {
                value_kind: ValueKind::Int,
                schema_kind: SchemaKind::Long,
                ..
            }
        ));
    }

    #[test]
    fn test_recursive_definition_encode_record() -> TestResult {
        let schema = Schema::parse_str(
            r#"
            {
                "type":"record",
                "name":"TestStruct",
                "fields": [
                    {
                        "name":"a",
                        "type":{
                            "type":"record",
                            "name": "Inner",
                            "fields": [ {
                                "name":"z",
                                "type":"int"
                            }]
                        }
                    },
                    {
                        "name":"b",
                        "type":"Inner"
                    }
                ]
            }"#,
        )?;
        let inner = Value::record([("z", Value::Int(3))]);
        let outer = Value::record([("a", inner.clone()), ("b", inner)]);
        assert_eq!(encode_to_vec(&outer, &schema)?, [6, 6]);
        Ok(())
    }

    #[test]
    fn test_bare_value_picks_union_variant() -> TestResult {
        let schema = Schema::parse_str(r#"["null", "string", "long"]"#)?;
        assert_eq!(encode_to_vec(&Value::Null, &schema)?, [0]);
        assert_eq!(encode_to_vec(&Value::Long(1), &schema)?, [4, 2]);
        assert_eq!(
            encode_to_vec(&Value::Union(1, Box::new("a".into())), &schema)?,
            [2, 2, b'a']
        );

        let err = encode_to_vec(&Value::Double(1.0), &schema).unwrap_err();
        assert!(matches!(err.details(), Details::UnionNoMatch { .. }));

        let err = encode_to_vec(&Value::Union(7, Box::new(Value::Null)), &schema).unwrap_err();
        assert!(matches!(err.details(), Details::UnionIndex { index: 7, .. }));
        Ok(())
    }

    #[test]
    fn test_union_of_records_is_tried_in_order() -> TestResult {
        let schema = Schema::parse_str(
            r#"[
                {"type": "record", "name": "A", "fields": [{"name": "a", "type": "int"}]},
                {"type": "record", "name": "B", "fields": [{"name": "b", "type": "string"}]}
            ]"#,
        )?;
        let value = Value::record([("b", Value::from("x"))]);
        assert_eq!(encode_to_vec(&value, &schema)?, [2, 2, b'x']);
        Ok(())
    }

    #[test]
    fn test_missing_field_uses_default() -> TestResult {
        let schema = Schema::parse_str(
            r#"{"type": "record", "name": "R", "fields": [
                {"name": "a", "type": "long"},
                {"name": "b", "type": "string", "default": "hi"}
            ]}"#,
        )?;
        let buf = encode_to_vec(&Value::record([("a", Value::Long(1))]), &schema)?;
        assert_eq!(buf, [2, 4, b'h', b'i']);

        let err = encode_to_vec(&Value::record([("b", Value::from("x"))]), &schema).unwrap_err();
        assert!(matches!(
            err.details(),
            Details::MissingField { path, field } if path == "$" && field == "a"
        ));
        Ok(())
    }

    #[test]
    fn test_error_path_points_at_nested_value() -> TestResult {
        let schema = Schema::parse_str(
            r#"{"type": "record", "name": "R", "fields": [
                {"name": "tags", "type": {"type": "array", "items": {"type": "map", "values": "int"}}}
            ]}"#,
        )?;
        let bad = Value::Map(HashMap::from([("k".to_string(), Value::from("nope"))]));
        let value = Value::record([(
            "tags",
            Value::Array(vec![Value::Map(HashMap::new()), bad]),
        )]);
        let err = encode_to_vec(&value, &schema).unwrap_err();
        match err.details() {
            Details::EncodeValueAsSchema { path, .. } => assert_eq!(path, r#"$.tags[1]["k"]"#),
            other => panic!("Expected EncodeValueAsSchema, got {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn test_fixed_and_enum_are_checked() -> TestResult {
        let fixed = Schema::parse_str(r#"{"type": "fixed", "name": "F", "size": 2}"#)?;
        let err = encode_to_vec(&Value::Fixed(3, vec![1, 2, 3]), &fixed).unwrap_err();
        assert!(matches!(err.details(), Details::FixedSize { expected: 2, found: 3, .. }));

        let enm = Schema::parse_str(r#"{"type": "enum", "name": "E", "symbols": ["A", "B"]}"#)?;
        assert_eq!(encode_to_vec(&Value::Enum(0, "B".into()), &enm)?, [2]);
        let err = encode_to_vec(&Value::Enum(0, "C".into()), &enm).unwrap_err();
        assert!(matches!(err.details(), Details::EnumSymbol { symbol, .. } if symbol == "C"));
        Ok(())
    }
}
