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

//! Logic for parsing and interacting with schemas in Avro format.

mod name;
mod parser;
mod union;

pub use name::Name;
pub use union::UnionSchema;

pub(crate) use name::is_valid_simple_name;

use crate::{AvroResult, error::Details};
use parser::Parser;
use serde::{
    Serialize, Serializer,
    ser::{SerializeMap, SerializeSeq},
};
use serde_json::Value as JsonValue;
use std::{
    borrow::Borrow,
    collections::{BTreeMap, HashMap},
    io::Read,
};
use strum_macros::EnumDiscriminants;

/// Represents documentation for complex Avro schemas.
pub type Documentation = Option<String>;
/// Represents the aliases of a named schema or a record field.
pub type Aliases = Option<Vec<String>>;
/// Extra JSON attributes attached to a schema, kept verbatim.
pub type Attributes = BTreeMap<String, JsonValue>;
/// Lookup of named schema definitions by fullname.
pub type Names = HashMap<Name, Schema>;
/// Borrowed lookup of named schema definitions by fullname.
pub type NamesRef<'a> = HashMap<Name, &'a Schema>;

/// Represents any valid Avro schema
/// More information about Avro schemas can be found in the
/// [Avro Specification](https://avro.apache.org/docs/++version++/specification/#schema-declaration)
#[derive(Clone, Debug, PartialEq, EnumDiscriminants)]
#[strum_discriminants(name(SchemaKind), derive(Hash, Ord, PartialOrd))]
pub enum Schema {
    /// A `null` Avro schema.
    Null,
    /// A `boolean` Avro schema.
    Boolean,
    /// An `int` Avro schema.
    Int,
    /// A `long` Avro schema.
    Long,
    /// A `float` Avro schema.
    Float,
    /// A `double` Avro schema.
    Double,
    /// A `bytes` Avro schema.
    ///
    /// `Bytes` represents a sequence of 8-bit unsigned bytes.
    Bytes,
    /// A `string` Avro schema.
    ///
    /// `String` represents a unicode character sequence.
    String,
    /// An `array` Avro schema.
    ///
    /// All items will have the same schema.
    Array(ArraySchema),
    /// A `map` Avro schema.
    ///
    /// Keys are always a `Schema::String` and all values will have the same schema.
    Map(MapSchema),
    /// A `union` Avro schema.
    Union(UnionSchema),
    /// A `record` Avro schema.
    Record(RecordSchema),
    /// An `enum` Avro schema.
    Enum(EnumSchema),
    /// A `fixed` Avro schema.
    Fixed(FixedSchema),
    /// A reference to a named schema defined earlier in the same schema.
    Ref { name: Name },
    /// A primitive schema carrying extra attributes, such as a `logicalType`.
    ///
    /// The attributes are kept so the schema serializes back unchanged; the binary encoding is
    /// the one of the inner schema.
    Annotated(AnnotatedSchema),
}

#[derive(Clone, Debug, PartialEq)]
pub struct ArraySchema {
    pub items: Box<Schema>,
    pub attributes: Attributes,
}

#[derive(Clone, Debug, PartialEq)]
pub struct MapSchema {
    pub types: Box<Schema>,
    pub attributes: Attributes,
}

/// A description of a Record schema.
#[derive(Clone, Debug, PartialEq)]
pub struct RecordSchema {
    /// The name of the schema
    pub name: Name,
    /// The aliases of the schema
    pub aliases: Aliases,
    /// The documentation of the schema
    pub doc: Documentation,
    /// The set of fields of the schema
    pub fields: Vec<RecordField>,
    /// The `lookup` table maps field names to their position in the `Vec`
    /// of `fields`.
    pub lookup: BTreeMap<String, usize>,
    /// The custom attributes of the schema
    pub attributes: Attributes,
}

/// Represents a `field` in a `record` Avro schema.
#[derive(Clone, Debug, PartialEq)]
pub struct RecordField {
    /// Name of the field.
    pub name: String,
    /// Documentation of the field.
    pub doc: Documentation,
    /// Aliases of the field's name. They have no namespace.
    pub aliases: Aliases,
    /// Default value of the field, as written in the schema.
    ///
    /// Used when a record value lacks this field.
    pub default: Option<JsonValue>,
    /// Schema of the field.
    pub schema: Schema,
    /// Position of the field in the list of `field` of its parent `Schema`
    pub position: usize,
    /// A collection of all unknown fields in the record field, such as `order`.
    pub custom_attributes: Attributes,
}

/// A description of an Enum schema.
#[derive(Clone, Debug, PartialEq)]
pub struct EnumSchema {
    /// The name of the schema
    pub name: Name,
    /// The aliases of the schema
    pub aliases: Aliases,
    /// The documentation of the schema
    pub doc: Documentation,
    /// The set of symbols of the schema
    pub symbols: Vec<String>,
    /// An optional default symbol used for compatibility
    pub default: Option<String>,
    /// The custom attributes of the schema
    pub attributes: Attributes,
}

/// A description of a Fixed schema.
#[derive(Clone, Debug, PartialEq)]
pub struct FixedSchema {
    /// The name of the schema
    pub name: Name,
    /// The aliases of the schema
    pub aliases: Aliases,
    /// The documentation of the schema
    pub doc: Documentation,
    /// The size of the fixed schema
    pub size: usize,
    /// The custom attributes of the schema
    pub attributes: Attributes,
}

#[derive(Clone, Debug, PartialEq)]
pub struct AnnotatedSchema {
    pub inner: Box<Schema>,
    pub attributes: Attributes,
}

impl Schema {
    /// Create a `Schema` from a string representing a JSON Avro schema.
    pub fn parse_str(input: &str) -> AvroResult<Schema> {
        let value: JsonValue = serde_json::from_str(input).map_err(Details::ParseSchemaJson)?;
        Self::parse(&value)
    }

    /// Create a `Schema` from a reader which implements [`Read`].
    pub fn parse_reader(reader: &mut (impl Read + ?Sized)) -> AvroResult<Schema> {
        let mut buf = String::new();
        reader
            .read_to_string(&mut buf)
            .map_err(Details::ReadSchema)?;
        Self::parse_str(&buf)
    }

    /// Parses an Avro schema from JSON.
    pub fn parse(value: &JsonValue) -> AvroResult<Schema> {
        Parser::default().parse(value, None)
    }

    /// Serializes the schema to its JSON text, as stored in a container header.
    pub fn to_json_string(&self) -> AvroResult<String> {
        serde_json::to_string(self).map_err(|e| Details::ConvertSchemaToJson(e).into())
    }

    /// Returns the name of the schema if it has one.
    pub fn name(&self) -> Option<&Name> {
        match self {
            Schema::Ref { name }
            | Schema::Record(RecordSchema { name, .. })
            | Schema::Enum(EnumSchema { name, .. })
            | Schema::Fixed(FixedSchema { name, .. }) => Some(name),
            _ => None,
        }
    }

    /// Returns whether the schema represents a named type according to the avro specification
    pub fn is_named(&self) -> bool {
        self.name().is_some()
    }

    /// The schema without its annotation, if it has one.
    pub fn unannotated(&self) -> &Schema {
        match self {
            Schema::Annotated(AnnotatedSchema { inner, .. }) => inner,
            schema => schema,
        }
    }

    /// Returns the custom attributes (metadata) if the schema supports them.
    pub fn custom_attributes(&self) -> Option<&Attributes> {
        match self {
            Schema::Record(RecordSchema { attributes, .. })
            | Schema::Enum(EnumSchema { attributes, .. })
            | Schema::Fixed(FixedSchema { attributes, .. })
            | Schema::Array(ArraySchema { attributes, .. })
            | Schema::Map(MapSchema { attributes, .. })
            | Schema::Annotated(AnnotatedSchema { attributes, .. }) => Some(attributes),
            _ => None,
        }
    }

    /// Returns a `Schema::Map` with the given types.
    pub fn map(types: Schema) -> Self {
        Schema::Map(MapSchema {
            types: Box::new(types),
            attributes: Default::default(),
        })
    }

    /// Returns a `Schema::Array` with the given items.
    pub fn array(items: Schema) -> Self {
        Schema::Array(ArraySchema {
            items: Box::new(items),
            attributes: Default::default(),
        })
    }
}

impl RecordField {
    /// Whether the field carries a `default`.
    pub fn has_default(&self) -> bool {
        self.default.is_some()
    }
}

/// The named definitions of a schema, used to follow `Schema::Ref`s while encoding and
/// decoding.
#[derive(Debug)]
pub struct ResolvedSchema<'s> {
    names_ref: NamesRef<'s>,
}

impl<'s> ResolvedSchema<'s> {
    pub fn new(root: &'s Schema) -> AvroResult<Self> {
        let mut names_ref = HashMap::new();
        collect_names(root, &mut names_ref)?;
        Ok(Self { names_ref })
    }

    pub fn get_names(&self) -> &NamesRef<'s> {
        &self.names_ref
    }

    /// Clone the named definitions, for holders that outlive the borrowed schema.
    pub fn to_names(&self) -> Names {
        self.names_ref
            .iter()
            .map(|(name, schema)| (name.clone(), (*schema).clone()))
            .collect()
    }
}

impl<'s> TryFrom<&'s Schema> for ResolvedSchema<'s> {
    type Error = crate::Error;

    fn try_from(schema: &'s Schema) -> AvroResult<Self> {
        Self::new(schema)
    }
}

fn collect_names<'s>(schema: &'s Schema, names: &mut NamesRef<'s>) -> AvroResult<()> {
    match schema {
        Schema::Array(ArraySchema { items, .. }) => collect_names(items, names),
        Schema::Map(MapSchema { types, .. }) => collect_names(types, names),
        Schema::Union(union) => union
            .variants()
            .iter()
            .try_for_each(|variant| collect_names(variant, names)),
        Schema::Record(RecordSchema { name, fields, .. }) => {
            if names.insert(name.clone(), schema).is_some() {
                return Err(Details::NameCollision(name.fullname()).into());
            }
            fields
                .iter()
                .try_for_each(|field| collect_names(&field.schema, names))
        }
        Schema::Enum(EnumSchema { name, .. }) | Schema::Fixed(FixedSchema { name, .. }) => {
            if names.insert(name.clone(), schema).is_some() {
                return Err(Details::NameCollision(name.fullname()).into());
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

/// Follows references and annotations down to the schema that drives the binary encoding.
pub(crate) fn deref_schema<'a, S: Borrow<Schema>>(
    schema: &'a Schema,
    names: &'a HashMap<Name, S>,
) -> AvroResult<&'a Schema> {
    match schema {
        Schema::Ref { name } => names
            .get(name)
            .map(Borrow::borrow)
            .ok_or_else(|| Details::UnresolvedRef(name.fullname()).into()),
        Schema::Annotated(AnnotatedSchema { inner, .. }) => deref_schema(inner, names),
        schema => Ok(schema),
    }
}

fn serialize_name<M: SerializeMap>(map: &mut M, name: &Name) -> Result<(), M::Error> {
    if let Some(namespace) = name.namespace() {
        map.serialize_entry("namespace", namespace)?;
    }
    map.serialize_entry("name", name.name())
}

fn serialize_common<M: SerializeMap>(
    map: &mut M,
    aliases: &Aliases,
    doc: &Documentation,
    attributes: &Attributes,
) -> Result<(), M::Error> {
    if let Some(aliases) = aliases {
        map.serialize_entry("aliases", aliases)?;
    }
    if let Some(doc) = doc {
        map.serialize_entry("doc", doc)?;
    }
    for (key, value) in attributes {
        map.serialize_entry(key, value)?;
    }
    Ok(())
}

fn primitive_name(schema: &Schema) -> Option<&'static str> {
    Some(match schema {
        Schema::Null => "null",
        Schema::Boolean => "boolean",
        Schema::Int => "int",
        Schema::Long => "long",
        Schema::Float => "float",
        Schema::Double => "double",
        Schema::Bytes => "bytes",
        Schema::String => "string",
        _ => return None,
    })
}

impl Serialize for Schema {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if let Some(primitive) = primitive_name(self) {
            return serializer.serialize_str(primitive);
        }
        match self {
            Schema::Ref { name } => serializer.serialize_str(&name.fullname()),
            Schema::Array(ArraySchema { items, attributes }) => {
                let mut map = serializer.serialize_map(None)?;
                map.serialize_entry("type", "array")?;
                map.serialize_entry("items", items)?;
                serialize_common(&mut map, &None, &None, attributes)?;
                map.end()
            }
            Schema::Map(MapSchema { types, attributes }) => {
                let mut map = serializer.serialize_map(None)?;
                map.serialize_entry("type", "map")?;
                map.serialize_entry("values", types)?;
                serialize_common(&mut map, &None, &None, attributes)?;
                map.end()
            }
            Schema::Union(inner) => {
                let variants = inner.variants();
                let mut seq = serializer.serialize_seq(Some(variants.len()))?;
                for v in variants {
                    seq.serialize_element(v)?;
                }
                seq.end()
            }
            Schema::Record(RecordSchema {
                name,
                aliases,
                doc,
                fields,
                attributes,
                lookup: _lookup,
            }) => {
                let mut map = serializer.serialize_map(None)?;
                map.serialize_entry("type", "record")?;
                serialize_name(&mut map, name)?;
                serialize_common(&mut map, aliases, doc, attributes)?;
                map.serialize_entry("fields", fields)?;
                map.end()
            }
            Schema::Enum(EnumSchema {
                name,
                aliases,
                doc,
                symbols,
                default,
                attributes,
            }) => {
                let mut map = serializer.serialize_map(None)?;
                map.serialize_entry("type", "enum")?;
                serialize_name(&mut map, name)?;
                map.serialize_entry("symbols", symbols)?;
                if let Some(default) = default {
                    map.serialize_entry("default", default)?;
                }
                serialize_common(&mut map, aliases, doc, attributes)?;
                map.end()
            }
            Schema::Fixed(FixedSchema {
                name,
                aliases,
                doc,
                size,
                attributes,
            }) => {
                let mut map = serializer.serialize_map(None)?;
                map.serialize_entry("type", "fixed")?;
                serialize_name(&mut map, name)?;
                map.serialize_entry("size", size)?;
                serialize_common(&mut map, aliases, doc, attributes)?;
                map.end()
            }
            Schema::Annotated(AnnotatedSchema { inner, attributes }) => {
                let mut map = serializer.serialize_map(None)?;
                map.serialize_entry("type", inner)?;
                serialize_common(&mut map, &None, &None, attributes)?;
                map.end()
            }
            _ => unreachable!("primitive schemas are serialized as plain strings"),
        }
    }
}

impl Serialize for RecordField {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("name", &self.name)?;
        map.serialize_entry("type", &self.schema)?;

        if let Some(ref default) = self.default {
            map.serialize_entry("default", default)?;
        }
        serialize_common(&mut map, &self.aliases, &self.doc, &self.custom_attributes)?;

        map.end()
    }
}
