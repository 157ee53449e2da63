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

//! Errors produced while reading, writing, encoding or decoding Avro data.
//!
//! Every failure is reported as an [`Error`], which wraps a boxed [`Details`] describing what went
//! wrong. [`Error::kind`] classifies the details into the coarse [`ErrorKind`] taxonomy that
//! callers usually branch on.

use crate::{schema::SchemaKind, types::ValueKind};
use std::{path::PathBuf, string::FromUtf8Error};

/// Errors encountered while handling Avro container files.
///
/// To inspect the error use [`details`](Self::details) or [`kind`](Self::kind).
#[derive(thiserror::Error, Debug)]
#[repr(transparent)]
#[error(transparent)]
pub struct Error {
    details: Box<Details>,
}

impl Error {
    pub fn new(details: Details) -> Self {
        Self {
            details: Box::new(details),
        }
    }

    pub fn details(&self) -> &Details {
        &self.details
    }

    pub fn into_details(self) -> Details {
        *self.details
    }

    /// The category this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        self.details.kind()
    }
}

impl From<Details> for Error {
    fn from(details: Details) -> Self {
        Self::new(details)
    }
}

/// Coarse classification of an [`Error`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The input is not an Avro container (bad magic, unreadable header, missing schema).
    InvalidContainer,
    /// The container names a codec which is not registered.
    UnknownCodec,
    /// A data block failed verification (sync marker, decompression, trailing bytes).
    CorruptBlock,
    /// The container ends in the middle of a block.
    CorruptContainer,
    /// A value does not conform to the schema it is written with.
    Encoding,
    /// Binary data could not be decoded with the schema.
    Decoding,
    /// A schema is malformed.
    SchemaParse,
    /// Malformed input to a conversion: metadata arguments, JSON lines, incompatible files.
    InvalidInput,
    /// The underlying byte source or sink failed.
    Io,
}

#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Details {
    #[error("Failed to read the container header: {0}")]
    ReadHeader(#[source] std::io::Error),

    #[error("Wrong magic in header, expected `Obj\\x01` but got {0:?}")]
    HeaderMagic([u8; 4]),

    #[error("Failed to decode the container metadata: {0}")]
    ReadHeaderMetadata(#[source] Error),

    #[error("No `avro.schema` in the container metadata")]
    GetAvroSchemaFromMap,

    #[error("The `avro.codec` metadata value is not valid utf-8")]
    CodecNameUtf8(#[source] std::str::Utf8Error),

    #[error("Failed to read the sync marker of the header: {0}")]
    ReadMarker(#[source] std::io::Error),

    #[error("Codec '{0}' is not registered")]
    UnknownCodec(String),

    #[error("Container truncated inside the header of block {block}: {source}")]
    ReadBlockHeader {
        block: usize,
        #[source]
        source: std::io::Error,
    },

    #[error("Block {block} declares a negative {field}: {value}")]
    NegativeBlockValue {
        block: usize,
        field: &'static str,
        value: i64,
    },

    #[error("Container truncated inside the payload of block {block} ({expected} bytes expected): {source}")]
    ReadBlockPayload {
        block: usize,
        expected: usize,
        #[source]
        source: std::io::Error,
    },

    #[error("Container truncated before the sync marker of block {block}: {source}")]
    ReadBlockMarker {
        block: usize,
        #[source]
        source: std::io::Error,
    },

    #[error("Sync marker of block {block} does not match the header marker")]
    SyncMarkerMismatch { block: usize },

    #[error("Block {block} has {remaining} undecoded bytes after its last record")]
    BlockTrailingBytes { block: usize, remaining: usize },

    #[error("Failed to compress a block with codec '{codec}': {reason}")]
    Compress { codec: String, reason: String },

    #[error("Failed to decompress a block with codec '{codec}': {reason}")]
    Decompress { codec: String, reason: String },

    #[error("Unable to allocate {desired} bytes (maximum allowed: {maximum})")]
    MemoryAllocation { desired: usize, maximum: usize },

    #[error("Failed to read variable integer bytes: {0}")]
    ReadVariableIntegerBytes(#[source] std::io::Error),

    #[error("Decoded integer out of range for i64")]
    IntegerOverflow,

    #[error("Decoded integer {1} out of range for i32: {0}")]
    ZagI32(#[source] std::num::TryFromIntError, i64),

    #[error("Invalid u8 for bool: {0}")]
    BoolValue(u8),

    #[error("Failed to read boolean bytes: {0}")]
    ReadBoolean(#[source] std::io::Error),

    #[error("Failed to read float: {0}")]
    ReadFloat(#[source] std::io::Error),

    #[error("Failed to read double: {0}")]
    ReadDouble(#[source] std::io::Error),

    #[error("Failed to read bytes: {0}")]
    ReadBytes(#[source] std::io::Error),

    #[error("Failed to read fixed number of bytes '{1}': {0}")]
    ReadFixed(#[source] std::io::Error, usize),

    #[error("Invalid utf-8 string")]
    ConvertToUtf8(#[source] FromUtf8Error),

    #[error("Negative length prefix: {0}")]
    NegativeLength(i64),

    #[error("Union index {index} out of bounds: {num_variants}")]
    GetUnionVariant { index: i64, num_variants: usize },

    #[error("Enum symbol index {index} out of bounds: {num_symbols}")]
    GetEnumSymbolIndex { index: i64, num_symbols: usize },

    #[error("Reference to unknown named schema '{0}'")]
    UnresolvedRef(String),

    #[error("Value of kind {value_kind:?} at `{path}` cannot be encoded as schema {schema_kind:?}")]
    EncodeValueAsSchema {
        path: String,
        value_kind: ValueKind,
        schema_kind: SchemaKind,
    },

    #[error("Missing required field '{field}' at `{path}`")]
    MissingField { path: String, field: String },

    #[error("Value of kind {value_kind:?} at `{path}` matches none of the union variants")]
    UnionNoMatch { path: String, value_kind: ValueKind },

    #[error("Union index {index} at `{path}` out of bounds: {num_variants}")]
    UnionIndex {
        path: String,
        index: u32,
        num_variants: usize,
    },

    #[error("Symbol '{symbol}' at `{path}` is not part of the enum")]
    EnumSymbol { path: String, symbol: String },

    #[error("Fixed value at `{path}` has {found} bytes, the schema requires {expected}")]
    FixedSize {
        path: String,
        expected: usize,
        found: usize,
    },

    #[error("JSON value at `{path}` cannot be converted to {schema_kind:?}: {json}")]
    FromJson {
        path: String,
        schema_kind: SchemaKind,
        json: String,
    },

    #[error("Failed to write bytes: {0}")]
    WriteBytes(#[source] std::io::Error),

    #[error("Failed to flush the underlying writer: {0}")]
    FlushWriter(#[source] std::io::Error),

    #[error("The writer has already been closed")]
    WriterClosed,

    #[error("Failed to serialize the schema to JSON: {0}")]
    ConvertSchemaToJson(#[source] serde_json::Error),

    #[error("Failed to parse schema from JSON: {0}")]
    ParseSchemaJson(#[source] serde_json::Error),

    #[error("Failed to read schema: {0}")]
    ReadSchema(#[source] std::io::Error),

    #[error("Must be a JSON string, object or array")]
    ParseSchemaFromValidJson,

    #[error("Unknown type: {0}")]
    UnknownType(String),

    #[error("No `type` in complex type")]
    GetComplexTypeField,

    #[error("No `name` field")]
    GetNameField,

    #[error("Invalid schema name {0}. It must match the regex '{1}'")]
    InvalidSchemaName(String, &'static str),

    #[error("Invalid namespace {0}. It must match the regex '{1}'")]
    InvalidNamespace(String, &'static str),

    #[error("Invalid field name {0}")]
    InvalidFieldName(String),

    #[error("Invalid enum symbol name {0}")]
    InvalidEnumSymbol(String),

    #[error("Duplicate enum symbol {0}")]
    EnumSymbolDuplicate(String),

    #[error("Duplicate field name {0}")]
    FieldNameDuplicate(String),

    #[error("Two named schemas are defined with the same fullname: {0}")]
    NameCollision(String),

    #[error("No `fields` in record")]
    GetRecordFieldsJson,

    #[error("No `symbols` field in enum")]
    GetEnumSymbolsField,

    #[error("Fixed schema has no valid `size`")]
    GetFixedSizeField,

    #[error("No `items` in array")]
    GetArrayItemsField,

    #[error("No `values` in map")]
    GetMapValuesField,

    #[error("Unions may not directly contain a union")]
    GetNestedUnion,

    #[error("Unions cannot contain duplicate types: {0}")]
    GetUnionDuplicate(String),

    #[error("Enum default '{symbol}' is not among the symbols {symbols:?}")]
    EnumDefault { symbol: String, symbols: Vec<String> },

    #[error("Default value of field '{field}' does not match its schema: {source}")]
    FieldDefault {
        field: String,
        #[source]
        source: Error,
    },

    #[error("Invalid metadata option: {0}")]
    InvalidMetadataArg(String),

    #[error("Failed to parse JSON on line {line}: {source}")]
    ParseJsonLine {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to read line {line}: {source}")]
    ReadLine {
        line: usize,
        #[source]
        source: std::io::Error,
    },

    #[error("Text export requires bytes records, got {0:?}")]
    TextRecordNotBytes(ValueKind),

    #[error("Cannot open {}: {source}", path.display())]
    OpenFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot create a temporary file next to {}: {source}", path.display())]
    CreateTempFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot replace {} with the recoded file: {source}", path.display())]
    PersistTempFile {
        path: PathBuf,
        #[source]
        source: tempfile::PersistError,
    },

    #[error("Concatenation requires at least one input")]
    ConcatNoInputs,

    #[error("The output {} is also one of the inputs", .0.display())]
    ConcatOutputIsInput(PathBuf),

    #[error("Input {index} has a different schema than the first input")]
    ConcatSchemaMismatch { index: usize },

    #[error("Input {index} uses codec '{found}', the first input uses '{expected}'")]
    ConcatCodecMismatch {
        index: usize,
        expected: String,
        found: String,
    },

    #[error("{error}; completing the container afterwards also failed: {close}")]
    CloseAfterError {
        error: Error,
        #[source]
        close: Error,
    },
}

impl Details {
    /// The category of these details.
    pub fn kind(&self) -> ErrorKind {
        use Details::*;
        match self {
            ReadHeader(_)
            | HeaderMagic(_)
            | ReadHeaderMetadata(_)
            | GetAvroSchemaFromMap
            | CodecNameUtf8(_)
            | ReadMarker(_) => ErrorKind::InvalidContainer,
            UnknownCodec(_) => ErrorKind::UnknownCodec,
            ReadBlockHeader { .. }
            | NegativeBlockValue { .. }
            | ReadBlockPayload { .. }
            | ReadBlockMarker { .. } => ErrorKind::CorruptContainer,
            SyncMarkerMismatch { .. } | BlockTrailingBytes { .. } | Decompress { .. } => {
                ErrorKind::CorruptBlock
            }
            MemoryAllocation { .. }
            | ReadVariableIntegerBytes(_)
            | IntegerOverflow
            | ZagI32(..)
            | BoolValue(_)
            | ReadBoolean(_)
            | ReadFloat(_)
            | ReadDouble(_)
            | ReadBytes(_)
            | ReadFixed(..)
            | ConvertToUtf8(_)
            | NegativeLength(_)
            | GetUnionVariant { .. }
            | GetEnumSymbolIndex { .. } => ErrorKind::Decoding,
            Compress { .. }
            | EncodeValueAsSchema { .. }
            | MissingField { .. }
            | UnionNoMatch { .. }
            | UnionIndex { .. }
            | EnumSymbol { .. }
            | FixedSize { .. }
            | FromJson { .. }
            | TextRecordNotBytes(_)
            | ConvertSchemaToJson(_) => ErrorKind::Encoding,
            UnresolvedRef(_)
            | ParseSchemaJson(_)
            | ReadSchema(_)
            | ParseSchemaFromValidJson
            | UnknownType(_)
            | GetComplexTypeField
            | GetNameField
            | InvalidSchemaName(..)
            | InvalidNamespace(..)
            | InvalidFieldName(_)
            | InvalidEnumSymbol(_)
            | EnumSymbolDuplicate(_)
            | FieldNameDuplicate(_)
            | NameCollision(_)
            | GetRecordFieldsJson
            | GetEnumSymbolsField
            | GetFixedSizeField
            | GetArrayItemsField
            | GetMapValuesField
            | GetNestedUnion
            | GetUnionDuplicate(_)
            | EnumDefault { .. }
            | FieldDefault { .. } => ErrorKind::SchemaParse,
            InvalidMetadataArg(_)
            | ParseJsonLine { .. }
            | ConcatNoInputs
            | ConcatOutputIsInput(_)
            | ConcatSchemaMismatch { .. }
            | ConcatCodecMismatch { .. } => ErrorKind::InvalidInput,
            WriteBytes(_)
            | FlushWriter(_)
            | WriterClosed
            | ReadLine { .. }
            | OpenFile { .. }
            | CreateTempFile { .. }
            | PersistTempFile { .. } => ErrorKind::Io,
            CloseAfterError { error, .. } => error.kind(),
        }
    }
}
