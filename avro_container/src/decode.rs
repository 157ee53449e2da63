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
    schema::{
        ArraySchema, EnumSchema, FixedSchema, MapSchema, Name, RecordSchema, ResolvedSchema,
        Schema, deref_schema,
    },
    types::Value,
    util::{checked_len, read_long, safe_len, zag_i32, zag_i64},
};
use std::{borrow::Borrow, collections::HashMap, io::Read};

#[inline]
fn decode_long<R: Read>(reader: &mut R) -> AvroResult<Value> {
    zag_i64(reader).map(Value::Long)
}

#[inline]
fn decode_int<R: Read>(reader: &mut R) -> AvroResult<Value> {
    zag_i32(reader).map(Value::Int)
}

#[inline]
fn decode_len<R: Read>(reader: &mut R) -> AvroResult<usize> {
    checked_len(read_long(reader)?)
}

/// Decode the length of a sequence.
///
/// Maps and arrays are 0-terminated, 0i64 is also encoded as 0 in Avro reading a length of 0 means
/// the end of the map or array.
fn decode_seq_len<R: Read>(reader: &mut R) -> AvroResult<usize> {
    let raw_len = read_long(reader)?;
    safe_len(
        usize::try_from(match raw_len.cmp(&0) {
            std::cmp::Ordering::Equal => return Ok(0),
            std::cmp::Ordering::Less => {
                // A negative count is followed by the byte size of the block.
                let _size = read_long(reader)?;
                raw_len.checked_neg().ok_or(Details::IntegerOverflow)?
            }
            std::cmp::Ordering::Greater => raw_len,
        })
        .map_err(|_| Details::NegativeLength(raw_len))?,
    )
}

fn decode_bytes<R: Read>(reader: &mut R) -> AvroResult<Vec<u8>> {
    let len = decode_len(reader)?;
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).map_err(Details::ReadBytes)?;
    Ok(buf)
}

/// Decode a `Value` from avro format given its `Schema`.
pub fn decode<R: Read>(schema: &Schema, reader: &mut R) -> AvroResult<Value> {
    let rs = ResolvedSchema::try_from(schema)?;
    decode_internal(schema, rs.get_names(), reader)
}

pub(crate) fn decode_internal<R: Read, S: Borrow<Schema>>(
    schema: &Schema,
    names: &HashMap<Name, S>,
    reader: &mut R,
) -> AvroResult<Value> {
    match deref_schema(schema, names)? {
        Schema::Null => Ok(Value::Null),
        Schema::Boolean => {
            let mut buf = [0u8; 1];
            reader.read_exact(&mut buf).map_err(Details::ReadBoolean)?;
            match buf[0] {
                0u8 => Ok(Value::Boolean(false)),
                1u8 => Ok(Value::Boolean(true)),
                other => Err(Details::BoolValue(other).into()),
            }
        }
        Schema::Int => decode_int(reader),
        Schema::Long => decode_long(reader),
        Schema::Float => {
            let mut buf = [0u8; std::mem::size_of::<f32>()];
            reader.read_exact(&mut buf).map_err(Details::ReadFloat)?;
            Ok(Value::Float(f32::from_le_bytes(buf)))
        }
        Schema::Double => {
            let mut buf = [0u8; std::mem::size_of::<f64>()];
            reader.read_exact(&mut buf).map_err(Details::ReadDouble)?;
            Ok(Value::Double(f64::from_le_bytes(buf)))
        }
        Schema::Bytes => decode_bytes(reader).map(Value::Bytes),
        Schema::String => {
            let bytes = decode_bytes(reader)?;
            String::from_utf8(bytes)
                .map(Value::String)
                .map_err(|e| Details::ConvertToUtf8(e).into())
        }
        Schema::Fixed(FixedSchema { size, .. }) => {
            let mut buf = vec![0u8; safe_len(*size)?];
            reader
                .read_exact(&mut buf)
                .map_err(|e| Details::ReadFixed(e, *size))?;
            Ok(Value::Fixed(*size, buf))
        }
        Schema::Enum(EnumSchema { symbols, .. }) => {
            let index = zag_i32(reader)?;
            usize::try_from(index)
                .ok()
                .and_then(|i| symbols.get(i))
                .map(|symbol| Value::Enum(index as u32, symbol.clone()))
                .ok_or_else(|| {
                    Details::GetEnumSymbolIndex {
                        index: i64::from(index),
                        num_symbols: symbols.len(),
                    }
                    .into()
                })
        }
        Schema::Union(union) => {
            let index = zag_i64(reader)?;
            let variants = union.variants();
            let variant = usize::try_from(index)
                .ok()
                .and_then(|i| variants.get(i))
                .ok_or(Details::GetUnionVariant {
                    index,
                    num_variants: variants.len(),
                })?;
            let value = decode_internal(variant, names, reader)?;
            Ok(Value::Union(index as u32, Box::new(value)))
        }
        Schema::Array(ArraySchema { items: inner, .. }) => {
            let mut items = Vec::new();

            loop {
                let len = decode_seq_len(reader)?;
                if len == 0 {
                    break;
                }

                items.reserve(len);
                for _ in 0..len {
                    items.push(decode_internal(inner, names, reader)?);
                }
            }

            Ok(Value::Array(items))
        }
        Schema::Map(MapSchema { types: inner, .. }) => {
            let mut items = HashMap::new();

            loop {
                let len = decode_seq_len(reader)?;
                if len == 0 {
                    break;
                }

                items.reserve(len);
                for _ in 0..len {
                    let key = decode_bytes(reader)?;
                    let key = String::from_utf8(key).map_err(Details::ConvertToUtf8)?;
                    let value = decode_internal(inner, names, reader)?;
                    items.insert(key, value);
                }
            }

            Ok(Value::Map(items))
        }
        Schema::Record(RecordSchema { fields, .. }) => {
            let mut items = Vec::with_capacity(fields.len());
            for field in fields {
                items.push((
                    field.name.clone(),
                    decode_internal(&field.schema, names, reader)?,
                ));
            }
            Ok(Value::Record(items))
        }
        Schema::Ref { name } => Err(Details::UnresolvedRef(name.fullname()).into()),
        Schema::Annotated(annotated) => decode_internal(&annotated.inner, names, reader),
    }
}
