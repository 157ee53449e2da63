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

use super::{
    Aliases, AnnotatedSchema, ArraySchema, Attributes, EnumSchema, FixedSchema, MapSchema, Name,
    Names, RecordField, RecordSchema, Schema, UnionSchema, is_valid_simple_name,
};
use crate::{AvroResult, Error, encode::ValuePath, error::Details, json};
use log::{debug, warn};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};

#[derive(Default)]
pub(crate) struct Parser {
    /// Every name defined so far. A record's name is registered before its fields are parsed
    /// so that a field can refer back to the record.
    known: HashSet<Name>,
    /// Completed named definitions, used to check field defaults that go through a reference.
    parsed: Names,
}

impl Parser {
    /// Create a `Schema` from a `serde_json::Value` representing a JSON Avro schema.
    pub(super) fn parse(
        &mut self,
        value: &Value,
        enclosing_namespace: Option<&str>,
    ) -> AvroResult<Schema> {
        match *value {
            Value::String(ref t) => self.parse_known_schema(t, enclosing_namespace),
            Value::Object(ref data) => self.parse_complex(data, enclosing_namespace),
            Value::Array(ref data) => self.parse_union(data, enclosing_namespace),
            _ => Err(Details::ParseSchemaFromValidJson.into()),
        }
    }

    /// Parse a string as a primitive type or a reference to a named type defined earlier.
    fn parse_known_schema(
        &mut self,
        name: &str,
        enclosing_namespace: Option<&str>,
    ) -> AvroResult<Schema> {
        match primitive(name) {
            Some(schema) => Ok(schema),
            None => self.fetch_schema_ref(name, enclosing_namespace),
        }
    }

    /// Resolve a type name against the enclosing namespace, falling back to the null namespace.
    fn fetch_schema_ref(
        &self,
        name: &str,
        enclosing_namespace: Option<&str>,
    ) -> AvroResult<Schema> {
        let unknown = || Error::from(Details::UnknownType(name.to_string()));
        let qualified =
            Name::with_enclosing_namespace(name, enclosing_namespace).map_err(|_| unknown())?;
        if self.known.contains(&qualified) {
            return Ok(Schema::Ref { name: qualified });
        }
        if enclosing_namespace.is_some() && !name.contains('.') {
            let unqualified = Name::new(name).map_err(|_| unknown())?;
            if self.known.contains(&unqualified) {
                return Ok(Schema::Ref { name: unqualified });
            }
        }
        Err(unknown())
    }

    /// Parse a `serde_json::Value` representing a complex Avro type into a `Schema`.
    fn parse_complex(
        &mut self,
        complex: &Map<String, Value>,
        enclosing_namespace: Option<&str>,
    ) -> AvroResult<Schema> {
        match complex.get("type") {
            Some(Value::String(t)) => match t.as_str() {
                "record" | "error" => self.parse_record(complex, enclosing_namespace),
                "enum" => self.parse_enum(complex, enclosing_namespace),
                "fixed" => self.parse_fixed(complex, enclosing_namespace),
                "array" => self.parse_array(complex, enclosing_namespace),
                "map" => self.parse_map(complex, enclosing_namespace),
                other => {
                    let schema = self.parse_known_schema(other, enclosing_namespace)?;
                    let attributes = custom_attributes(complex, &[]);
                    if attributes.is_empty() || schema.is_named() {
                        Ok(schema)
                    } else {
                        Ok(Schema::Annotated(AnnotatedSchema {
                            inner: Box::new(schema),
                            attributes,
                        }))
                    }
                }
            },
            Some(nested @ (Value::Object(_) | Value::Array(_))) => {
                self.parse(nested, enclosing_namespace)
            }
            Some(_) => Err(Details::ParseSchemaFromValidJson.into()),
            None => Err(Details::GetComplexTypeField.into()),
        }
    }

    fn parse_name(
        &mut self,
        complex: &Map<String, Value>,
        enclosing_namespace: Option<&str>,
    ) -> AvroResult<Name> {
        let name = complex
            .get("name")
            .and_then(Value::as_str)
            .ok_or(Details::GetNameField)?;
        let namespace = complex
            .get("namespace")
            .and_then(Value::as_str)
            .or(enclosing_namespace);
        let name = Name::with_enclosing_namespace(name, namespace)?;
        if !self.known.insert(name.clone()) {
            return Err(Details::NameCollision(name.fullname()).into());
        }
        Ok(name)
    }

    fn register_parsed_schema(&mut self, name: &Name, schema: &Schema) {
        self.parsed.insert(name.clone(), schema.clone());
    }

    /// Parse a `serde_json::Value` representing an Avro record type into a `Schema`.
    fn parse_record(
        &mut self,
        complex: &Map<String, Value>,
        enclosing_namespace: Option<&str>,
    ) -> AvroResult<Schema> {
        let name = self.parse_name(complex, enclosing_namespace)?;
        debug!("Going to parse record schema: {name:?}");

        let fields_json = complex
            .get("fields")
            .and_then(Value::as_array)
            .ok_or(Details::GetRecordFieldsJson)?;

        let mut fields = Vec::with_capacity(fields_json.len());
        let mut lookup = BTreeMap::new();
        for (position, field) in fields_json.iter().enumerate() {
            let field = field.as_object().ok_or(Details::GetRecordFieldsJson)?;
            let field = self.parse_field(field, position, name.namespace())?;
            if lookup.insert(field.name.clone(), position).is_some() {
                return Err(Details::FieldNameDuplicate(field.name).into());
            }
            fields.push(field);
        }

        let schema = Schema::Record(RecordSchema {
            name: name.clone(),
            aliases: aliases(complex),
            doc: doc(complex),
            fields,
            lookup,
            attributes: custom_attributes(
                complex,
                &["name", "namespace", "doc", "aliases", "fields"],
            ),
        });
        self.register_parsed_schema(&name, &schema);
        Ok(schema)
    }

    fn parse_field(
        &mut self,
        field: &Map<String, Value>,
        position: usize,
        enclosing_namespace: Option<&str>,
    ) -> AvroResult<RecordField> {
        let name = field
            .get("name")
            .and_then(Value::as_str)
            .ok_or(Details::GetNameField)?;
        if !is_valid_simple_name(name) {
            return Err(Details::InvalidFieldName(name.to_string()).into());
        }

        let schema = field
            .get("type")
            .ok_or(Details::GetComplexTypeField)
            .map_err(Error::from)
            .and_then(|t| self.parse(t, enclosing_namespace))?;

        let default = field.get("default").cloned();
        if let Some(ref default) = default {
            self.check_default(name, default, &schema)?;
        }

        Ok(RecordField {
            name: name.to_string(),
            doc: doc(field),
            aliases: aliases(field),
            default,
            schema,
            position,
            custom_attributes: custom_attributes(field, &["name", "doc", "aliases", "default"]),
        })
    }

    fn check_default(&self, field: &str, default: &Value, schema: &Schema) -> AvroResult<()> {
        json::from_json_internal(default, schema, &self.parsed, &mut ValuePath::new())
            .map(|_| ())
            .map_err(|source| {
                Details::FieldDefault {
                    field: field.to_string(),
                    source,
                }
                .into()
            })
    }

    /// Parse a `serde_json::Value` representing an Avro enum type into a `Schema`.
    fn parse_enum(
        &mut self,
        complex: &Map<String, Value>,
        enclosing_namespace: Option<&str>,
    ) -> AvroResult<Schema> {
        let name = self.parse_name(complex, enclosing_namespace)?;

        let symbols: Vec<String> = complex
            .get("symbols")
            .and_then(Value::as_array)
            .and_then(|symbols| {
                symbols
                    .iter()
                    .map(|symbol| symbol.as_str().map(str::to_string))
                    .collect::<Option<_>>()
            })
            .ok_or(Details::GetEnumSymbolsField)?;

        let mut existing_symbols: HashSet<&str> = HashSet::with_capacity(symbols.len());
        for symbol in &symbols {
            if !is_valid_simple_name(symbol) {
                return Err(Details::InvalidEnumSymbol(symbol.clone()).into());
            }
            if !existing_symbols.insert(symbol) {
                return Err(Details::EnumSymbolDuplicate(symbol.clone()).into());
            }
        }

        let default = match complex.get("default") {
            None => None,
            Some(Value::String(s)) if symbols.contains(s) => Some(s.clone()),
            Some(other) => {
                return Err(Details::EnumDefault {
                    symbol: other.to_string(),
                    symbols,
                }
                .into());
            }
        };

        let schema = Schema::Enum(EnumSchema {
            name: name.clone(),
            aliases: aliases(complex),
            doc: doc(complex),
            symbols,
            default,
            attributes: custom_attributes(
                complex,
                &["name", "namespace", "doc", "aliases", "symbols", "default"],
            ),
        });
        self.register_parsed_schema(&name, &schema);
        Ok(schema)
    }

    /// Parse a `serde_json::Value` representing an Avro fixed type into a `Schema`.
    fn parse_fixed(
        &mut self,
        complex: &Map<String, Value>,
        enclosing_namespace: Option<&str>,
    ) -> AvroResult<Schema> {
        let size = complex
            .get("size")
            .and_then(Value::as_u64)
            .and_then(|size| usize::try_from(size).ok())
            .ok_or(Details::GetFixedSizeField)?;
        let name = self.parse_name(complex, enclosing_namespace)?;

        let schema = Schema::Fixed(FixedSchema {
            name: name.clone(),
            aliases: aliases(complex),
            doc: doc(complex),
            size,
            attributes: custom_attributes(
                complex,
                &["name", "namespace", "doc", "aliases", "size"],
            ),
        });
        self.register_parsed_schema(&name, &schema);
        Ok(schema)
    }

    /// Parse a `serde_json::Value` representing an Avro array type into a `Schema`.
    fn parse_array(
        &mut self,
        complex: &Map<String, Value>,
        enclosing_namespace: Option<&str>,
    ) -> AvroResult<Schema> {
        let items = complex
            .get("items")
            .ok_or_else(|| Details::GetArrayItemsField.into())
            .and_then(|items| self.parse(items, enclosing_namespace))?;
        Ok(Schema::Array(ArraySchema {
            items: Box::new(items),
            attributes: custom_attributes(complex, &["items"]),
        }))
    }

    /// Parse a `serde_json::Value` representing an Avro map type into a `Schema`.
    fn parse_map(
        &mut self,
        complex: &Map<String, Value>,
        enclosing_namespace: Option<&str>,
    ) -> AvroResult<Schema> {
        let types = complex
            .get("values")
            .ok_or_else(|| Details::GetMapValuesField.into())
            .and_then(|types| self.parse(types, enclosing_namespace))?;
        Ok(Schema::Map(MapSchema {
            types: Box::new(types),
            attributes: custom_attributes(complex, &["values"]),
        }))
    }

    /// Parse a `serde_json::Value` representing an Avro union type into a `Schema`.
    fn parse_union(
        &mut self,
        items: &[Value],
        enclosing_namespace: Option<&str>,
    ) -> AvroResult<Schema> {
        let schemas = items
            .iter()
            .map(|v| self.parse(v, enclosing_namespace))
            .collect::<Result<Vec<_>, _>>()?;
        match schemas.len() {
            0 => warn!("Union schema without members! No value can be written with it."),
            1 => warn!("Union schema with just one member! Consider dropping the union!"),
            _ => {}
        }
        Ok(Schema::Union(UnionSchema::new(schemas)?))
    }
}

fn primitive(name: &str) -> Option<Schema> {
    Some(match name {
        "null" => Schema::Null,
        "boolean" => Schema::Boolean,
        "int" => Schema::Int,
        "long" => Schema::Long,
        "float" => Schema::Float,
        "double" => Schema::Double,
        "bytes" => Schema::Bytes,
        "string" => Schema::String,
        _ => return None,
    })
}

fn doc(complex: &Map<String, Value>) -> Option<String> {
    complex.get("doc").and_then(Value::as_str).map(str::to_string)
}

fn aliases(complex: &Map<String, Value>) -> Aliases {
    complex
        .get("aliases")
        .and_then(Value::as_array)
        .and_then(|aliases| {
            aliases
                .iter()
                .map(|alias| alias.as_str().map(str::to_string))
                .collect::<Option<_>>()
        })
}

/// Every key except `type` and the ones listed in `excluded`, kept verbatim.
fn custom_attributes(complex: &Map<String, Value>, excluded: &[&str]) -> Attributes {
    complex
        .iter()
        .filter(|(key, _)| key.as_str() != "type" && !excluded.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}
