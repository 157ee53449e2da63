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

//! Conversion between Avro [`Value`]s and JSON, and line-delimited JSON input.
//!
//! Bytes and fixed values follow the Avro JSON convention: every byte becomes the character with
//! the same code point (`U+0000` to `U+00FF`).
use crate::{
    AvroResult, Error,
    encode::ValuePath,
    error::Details,
    schema::{
        AnnotatedSchema, ArraySchema, EnumSchema, FixedSchema, MapSchema, Name, RecordSchema,
        ResolvedSchema, Schema, SchemaKind, UnionSchema, deref_schema,
    },
    types::Value,
};
use serde_json::{Map, Number, Value as JsonValue, json};
use std::{
    borrow::{Borrow, Cow},
    collections::{BTreeMap, HashMap},
    io::BufRead,
};

/// Convert a value to JSON.
///
/// Union values are written bare. Map entries are sorted by key. Non-finite floating point numbers
/// have no JSON representation and become `null`.
pub fn to_json(value: &Value) -> JsonValue {
    match value {
        Value::Null => JsonValue::Null,
        Value::Boolean(b) => JsonValue::Bool(*b),
        Value::Int(i) => JsonValue::from(*i),
        Value::Long(i) => JsonValue::from(*i),
        Value::Float(x) => float_to_json(f64::from(*x)),
        Value::Double(x) => float_to_json(*x),
        Value::Bytes(bytes) | Value::Fixed(_, bytes) => JsonValue::String(bytes_to_string(bytes)),
        Value::String(s) | Value::Enum(_, s) => JsonValue::String(s.clone()),
        Value::Union(_, inner) => to_json(inner),
        Value::Array(items) => JsonValue::Array(items.iter().map(to_json).collect()),
        Value::Map(items) => JsonValue::Object(
            items
                .iter()
                .collect::<BTreeMap<_, _>>()
                .into_iter()
                .map(|(key, value)| (key.clone(), to_json(value)))
                .collect(),
        ),
        Value::Record(fields) => JsonValue::Object(
            fields
                .iter()
                .map(|(name, value)| (name.clone(), to_json(value)))
                .collect(),
        ),
    }
}

fn float_to_json(x: f64) -> JsonValue {
    Number::from_f64(x).map_or(JsonValue::Null, JsonValue::Number)
}

fn bytes_to_string(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}

fn string_to_bytes(s: &str) -> Option<Vec<u8>> {
    s.chars().map(|c| u8::try_from(c).ok()).collect()
}

/// Convert JSON to a value of `schema`.
///
/// Union positions accept either the bare value, matched against the variants in order, or an
/// object with a single key naming the variant (`{"long": 1}`, `{"com.example.Point": {...}}`).
/// Record fields missing from the JSON object take their default.
pub fn from_json(json: &JsonValue, schema: &Schema) -> AvroResult<Value> {
    let rs = ResolvedSchema::try_from(schema)?;
    from_json_internal(json, schema, rs.get_names(), &mut ValuePath::new())
}

pub(crate) fn from_json_internal<S: Borrow<Schema>>(
    json: &JsonValue,
    schema: &Schema,
    names: &HashMap<Name, S>,
    path: &mut ValuePath,
) -> AvroResult<Value> {
    let schema = deref_schema(schema, names)?;
    let mismatch = |path: &ValuePath| -> Error {
        Details::FromJson {
            path: path.to_string(),
            schema_kind: SchemaKind::from(schema),
            json: json.to_string(),
        }
        .into()
    };

    let value = match (schema, json) {
        (Schema::Null, JsonValue::Null) => Value::Null,
        (Schema::Boolean, JsonValue::Bool(b)) => Value::Boolean(*b),
        (Schema::Int, JsonValue::Number(n)) => n
            .as_i64()
            .and_then(|i| i32::try_from(i).ok())
            .map(Value::Int)
            .ok_or_else(|| mismatch(path))?,
        (Schema::Long, JsonValue::Number(n)) => {
            n.as_i64().map(Value::Long).ok_or_else(|| mismatch(path))?
        }
        (Schema::Float, JsonValue::Number(n)) => n
            .as_f64()
            .map(|x| Value::Float(x as f32))
            .ok_or_else(|| mismatch(path))?,
        (Schema::Double, JsonValue::Number(n)) => {
            n.as_f64().map(Value::Double).ok_or_else(|| mismatch(path))?
        }
        (Schema::Bytes, JsonValue::String(s)) => {
            string_to_bytes(s).map(Value::Bytes).ok_or_else(|| mismatch(path))?
        }
        (Schema::String, JsonValue::String(s)) => Value::String(s.clone()),
        (Schema::Fixed(FixedSchema { size, .. }), JsonValue::String(s)) => match string_to_bytes(s)
        {
            Some(bytes) if bytes.len() == *size => Value::Fixed(*size, bytes),
            _ => return Err(mismatch(path)),
        },
        (Schema::Enum(EnumSchema { symbols, .. }), JsonValue::String(s)) => {
            match symbols.iter().position(|symbol| symbol == s) {
                Some(index) => Value::Enum(index as u32, s.clone()),
                None => return Err(mismatch(path)),
            }
        }
        (Schema::Array(ArraySchema { items, .. }), JsonValue::Array(elements)) => {
            let mut values = Vec::with_capacity(elements.len());
            for (index, element) in elements.iter().enumerate() {
                let mark = path.push_index(index);
                values.push(from_json_internal(element, items, names, path)?);
                path.truncate(mark);
            }
            Value::Array(values)
        }
        (Schema::Map(MapSchema { types, .. }), JsonValue::Object(entries)) => {
            let mut values = HashMap::with_capacity(entries.len());
            for (key, entry) in entries {
                let mark = path.push_key(key);
                values.insert(key.clone(), from_json_internal(entry, types, names, path)?);
                path.truncate(mark);
            }
            Value::Map(values)
        }
        (Schema::Record(record), JsonValue::Object(entries)) => {
            record_from_json(entries, record, names, path)?
        }
        (Schema::Union(union), json) => union_from_json(json, union, names, path)?,
        _ => return Err(mismatch(path)),
    };
    Ok(value)
}

fn record_from_json<S: Borrow<Schema>>(
    entries: &Map<String, JsonValue>,
    record: &RecordSchema,
    names: &HashMap<Name, S>,
    path: &mut ValuePath,
) -> AvroResult<Value> {
    let mut fields = Vec::with_capacity(record.fields.len());
    for field in &record.fields {
        let Some(json) = entries.get(&field.name).or(field.default.as_ref()) else {
            return Err(Details::MissingField {
                path: path.to_string(),
                field: field.name.clone(),
            }
            .into());
        };
        let mark = path.push_field(&field.name);
        fields.push((
            field.name.clone(),
            from_json_internal(json, &field.schema, names, path)?,
        ));
        path.truncate(mark);
    }
    Ok(Value::Record(fields))
}

fn union_from_json<S: Borrow<Schema>>(
    json: &JsonValue,
    union: &UnionSchema,
    names: &HashMap<Name, S>,
    path: &mut ValuePath,
) -> AvroResult<Value> {
    let variants = union.variants();

    if let JsonValue::Object(entries) = json
        && entries.len() == 1
        && let Some((branch, inner)) = entries.iter().next()
        && let Some(index) = variants.iter().position(|v| branch_name(v) == branch.as_str())
    {
        let value = from_json_internal(inner, &variants[index], names, path)?;
        return Ok(Value::Union(index as u32, Box::new(value)));
    }

    let mark = path.mark();
    for (index, variant) in variants.iter().enumerate() {
        if let Ok(value) = from_json_internal(json, variant, names, path) {
            return Ok(Value::Union(index as u32, Box::new(value)));
        }
        path.truncate(mark);
    }

    Err(Details::FromJson {
        path: path.to_string(),
        schema_kind: SchemaKind::Union,
        json: json.to_string(),
    }
    .into())
}

/// The key naming a union variant in the wrapped JSON form.
fn branch_name(schema: &Schema) -> Cow<'_, str> {
    match schema {
        Schema::Annotated(AnnotatedSchema { inner, .. }) => branch_name(inner),
        Schema::Null => Cow::Borrowed("null"),
        Schema::Boolean => Cow::Borrowed("boolean"),
        Schema::Int => Cow::Borrowed("int"),
        Schema::Long => Cow::Borrowed("long"),
        Schema::Float => Cow::Borrowed("float"),
        Schema::Double => Cow::Borrowed("double"),
        Schema::Bytes => Cow::Borrowed("bytes"),
        Schema::String => Cow::Borrowed("string"),
        Schema::Array(_) => Cow::Borrowed("array"),
        Schema::Map(_) => Cow::Borrowed("map"),
        Schema::Union(_) => Cow::Borrowed("union"),
        Schema::Ref { name }
        | Schema::Record(RecordSchema { name, .. })
        | Schema::Enum(EnumSchema { name, .. })
        | Schema::Fixed(FixedSchema { name, .. }) => Cow::Owned(name.fullname()),
    }
}

/// Iterator over the JSON documents of a line-delimited input, one per non-blank line.
///
/// After the first error the iterator is exhausted.
pub struct JsonLines<R> {
    reader: R,
    line: String,
    line_number: usize,
    wrap_values: bool,
    errored: bool,
}

impl<R: BufRead> JsonLines<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: String::new(),
            line_number: 0,
            wrap_values: false,
            errored: false,
        }
    }

    /// Yield every document as `{"value": <document>}`, for a schema that is a record with a
    /// single `value` field.
    pub fn wrap_values(mut self, wrap: bool) -> Self {
        self.wrap_values = wrap;
        self
    }

    fn read_next(&mut self) -> AvroResult<Option<JsonValue>> {
        loop {
            self.line.clear();
            self.line_number += 1;
            let read = self
                .reader
                .read_line(&mut self.line)
                .map_err(|source| Details::ReadLine {
                    line: self.line_number,
                    source,
                })?;
            if read == 0 {
                return Ok(None);
            }
            if self.line.trim().is_empty() {
                continue;
            }
            let document: JsonValue =
                serde_json::from_str(&self.line).map_err(|source| Details::ParseJsonLine {
                    line: self.line_number,
                    source,
                })?;
            return Ok(Some(if self.wrap_values {
                json!({ "value": document })
            } else {
                document
            }));
        }
    }
}

impl<R: BufRead> Iterator for JsonLines<R> {
    type Item = AvroResult<JsonValue>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.errored {
            return None;
        }
        match self.read_next() {
            Ok(document) => document.map(Ok),
            Err(e) => {
                self.errored = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{TestResult, error::ErrorKind};
    use pretty_assertions::assert_eq;

    const POINT: &str = r#"
    {
      "type": "record",
      "name": "Point",
      "namespace": "geo",
      "fields": [
        {"name": "x", "type": "int"},
        {"name": "y", "type": "int", "default": 0},
        {"name": "label", "type": ["null", "string"], "default": null},
        {"name": "tags", "type": {"type": "array", "items": "string"}, "default": []}
      ]
    }
    "#;

    #[test]
    fn test_to_json_scalars() {
        assert_eq!(to_json(&Value::Null), json!(null));
        assert_eq!(to_json(&Value::Int(-3)), json!(-3));
        assert_eq!(to_json(&Value::Double(1.5)), json!(1.5));
        assert_eq!(to_json(&Value::Double(f64::NAN)), json!(null));
        assert_eq!(to_json(&Value::Bytes(vec![0x61, 0xFF])), json!("a\u{FF}"));
        assert_eq!(to_json(&Value::Enum(1, "B".into())), json!("B"));
        assert_eq!(
            to_json(&Value::Union(1, Box::new(Value::Long(4)))),
            json!(4)
        );
    }

    #[test]
    fn test_to_json_sorts_map_keys() {
        let map = Value::Map(HashMap::from([
            ("b".to_string(), Value::Int(2)),
            ("a".to_string(), Value::Int(1)),
        ]));
        assert_eq!(to_json(&map).to_string(), r#"{"a":1,"b":2}"#);
    }

    #[test]
    fn test_to_json_keeps_field_order() {
        let record = Value::record([("z", Value::Int(1)), ("a", Value::Int(2))]);
        assert_eq!(to_json(&record).to_string(), r#"{"z":1,"a":2}"#);
    }

    #[test]
    fn test_from_json_record_with_defaults() -> TestResult {
        let schema = Schema::parse_str(POINT)?;
        let value = from_json(&json!({"x": 1, "label": "p"}), &schema)?;
        assert_eq!(
            value,
            Value::record([
                ("x", Value::Int(1)),
                ("y", Value::Int(0)),
                ("label", Value::Union(1, Box::new("p".into()))),
                ("tags", Value::Array(Vec::new())),
            ])
        );
        Ok(())
    }

    #[test]
    fn test_from_json_missing_field() -> TestResult {
        let schema = Schema::parse_str(POINT)?;
        let err = from_json(&json!({"y": 1}), &schema).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Encoding);
        assert!(err.to_string().contains("x"), "{err}");
        Ok(())
    }

    #[test]
    fn test_from_json_error_path() -> TestResult {
        let schema = Schema::parse_str(POINT)?;
        let err = from_json(&json!({"x": 1, "tags": ["a", 2]}), &schema).unwrap_err();
        match err.details() {
            Details::FromJson { path, schema_kind, .. } => {
                assert_eq!(path, "$.tags[1]");
                assert_eq!(*schema_kind, SchemaKind::String);
            }
            other => panic!("Unexpected error: {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn test_from_json_union_forms() -> TestResult {
        let schema = Schema::parse_str(r#"["null", "long", "string"]"#)?;
        assert_eq!(
            from_json(&json!(null), &schema)?,
            Value::Union(0, Box::new(Value::Null))
        );
        assert_eq!(
            from_json(&json!(7), &schema)?,
            Value::Union(1, Box::new(Value::Long(7)))
        );
        assert_eq!(
            from_json(&json!({"string": "x"}), &schema)?,
            Value::Union(2, Box::new("x".into()))
        );
        assert_eq!(
            from_json(&json!(true), &schema).map_err(|e| e.kind()).err(),
            Some(ErrorKind::Encoding)
        );
        Ok(())
    }

    #[test]
    fn test_from_json_named_union_branch() -> TestResult {
        let schema = Schema::parse_str(
            r#"["null", {"type": "fixed", "name": "md5", "namespace": "h", "size": 2}]"#,
        )?;
        assert_eq!(
            from_json(&json!({"h.md5": "\u{0}\u{FF}"}), &schema)?,
            Value::Union(1, Box::new(Value::Fixed(2, vec![0, 0xFF])))
        );
        Ok(())
    }

    #[test]
    fn test_from_json_bytes_out_of_range() -> TestResult {
        let err = from_json(&json!("\u{100}"), &Schema::Bytes).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Encoding);
        Ok(())
    }

    #[test]
    fn test_from_json_int_range() -> TestResult {
        assert_eq!(from_json(&json!(5), &Schema::Int)?, Value::Int(5));
        assert!(from_json(&json!(1u64 << 40), &Schema::Int).is_err());
        assert!(from_json(&json!(1.5), &Schema::Long).is_err());
        Ok(())
    }

    #[test]
    fn test_json_lines_skips_blank_lines() -> TestResult {
        let input = "{\"a\": 1}\n\n   \n[2]\n3";
        let docs = JsonLines::new(input.as_bytes()).collect::<AvroResult<Vec<_>>>()?;
        assert_eq!(docs, vec![json!({"a": 1}), json!([2]), json!(3)]);
        Ok(())
    }

    #[test]
    fn test_json_lines_wraps_values() -> TestResult {
        let docs = JsonLines::new("1\n\"a\"\n".as_bytes())
            .wrap_values(true)
            .collect::<AvroResult<Vec<_>>>()?;
        assert_eq!(docs, vec![json!({"value": 1}), json!({"value": "a"})]);
        Ok(())
    }

    #[test]
    fn test_json_lines_reports_line_and_stops() {
        let mut lines = JsonLines::new("1\n\n{oops\n2\n".as_bytes());
        assert!(matches!(lines.next(), Some(Ok(_))));
        let err = lines.next().and_then(Result::err);
        match err.as_ref().map(Error::details) {
            Some(Details::ParseJsonLine { line, .. }) => assert_eq!(*line, 3),
            other => panic!("Unexpected result: {other:?}"),
        }
        assert_eq!(err.map(|e| e.kind()), Some(ErrorKind::InvalidInput));
        assert!(lines.next().is_none());
    }
}
