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
    codec::{BlockCodec, CodecRegistry},
    decode::{decode, decode_internal},
    error::Details,
    schema::{Names, ResolvedSchema, Schema},
    types::Value,
    util,
};
use log::debug;
use std::{
    collections::BTreeMap,
    io::{ErrorKind, Read},
    sync::Arc,
};

pub(crate) const MAGIC: [u8; 4] = [b'O', b'b', b'j', 1u8];
pub(crate) const SCHEMA_KEY: &str = "avro.schema";
pub(crate) const CODEC_KEY: &str = "avro.codec";

/// A data block as stored in a container: its record count and its still compressed payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawBlock {
    pub count: usize,
    pub data: Vec<u8>,
}

/// Internal Block reader.
pub(super) struct Block<R> {
    reader: R,
    /// Decompressed payload of the current block.
    buf: Vec<u8>,
    buf_idx: usize,
    /// Number of records of the current block not yet decoded.
    message_count: usize,
    /// Number of blocks loaded so far; the index of the next block.
    blocks_read: usize,
    pub(super) marker: [u8; 16],
    pub(super) codec_name: String,
    codec: Arc<dyn BlockCodec>,
    pub(super) writer_schema: Schema,
    names: Names,
    pub(super) metadata: BTreeMap<String, Vec<u8>>,
}

impl<R: Read> Block<R> {
    pub(super) fn new(reader: R, registry: &CodecRegistry) -> AvroResult<Block<R>> {
        let mut reader = reader;
        let mut buf = [0u8; 4];
        reader.read_exact(&mut buf).map_err(Details::ReadHeader)?;
        if buf != MAGIC {
            return Err(Details::HeaderMagic(buf).into());
        }

        let metadata = read_metadata(&mut reader)?;
        let writer_schema = read_writer_schema(&metadata)?;
        let names = ResolvedSchema::try_from(&writer_schema)?.to_names();
        let codec_name = read_codec_name(&metadata)?;
        let codec = registry.get(&codec_name)?;

        let mut marker = [0u8; 16];
        reader
            .read_exact(&mut marker)
            .map_err(Details::ReadMarker)?;

        debug!(
            "Read container header: codec '{codec_name}', {} metadata entries",
            metadata.len()
        );

        Ok(Block {
            reader,
            buf: Vec::new(),
            buf_idx: 0,
            message_count: 0,
            blocks_read: 0,
            marker,
            codec_name,
            codec,
            writer_schema,
            names,
            metadata,
        })
    }

    /// Read the next block without decompressing it, verifying its sync marker.
    ///
    /// Returns `Ok(None)` when the input ends cleanly before a new block.
    pub(super) fn read_raw_block(&mut self) -> AvroResult<Option<RawBlock>> {
        let block = self.blocks_read;
        let header_error = |source| Details::ReadBlockHeader { block, source };

        let Some(count) = util::read_long_or_eof(&mut self.reader).map_err(header_error)? else {
            return Ok(None);
        };
        let len = util::read_long_or_eof(&mut self.reader)
            .map_err(header_error)?
            .ok_or_else(|| header_error(ErrorKind::UnexpectedEof.into()))?;

        let count = usize::try_from(count).map_err(|_| Details::NegativeBlockValue {
            block,
            field: "record count",
            value: count,
        })?;
        let len = usize::try_from(len).map_err(|_| Details::NegativeBlockValue {
            block,
            field: "byte length",
            value: len,
        })?;

        let mut data = vec![0u8; util::safe_len(len)?];
        self.reader
            .read_exact(&mut data)
            .map_err(|source| Details::ReadBlockPayload {
                block,
                expected: len,
                source,
            })?;

        let mut marker = [0u8; 16];
        self.reader
            .read_exact(&mut marker)
            .map_err(|source| Details::ReadBlockMarker { block, source })?;
        if marker != self.marker {
            return Err(Details::SyncMarkerMismatch { block }.into());
        }

        self.blocks_read += 1;
        debug!("Read block {block}: {count} records in {len} bytes");
        Ok(Some(RawBlock { count, data }))
    }

    /// Load and decompress the next block. Leaves the block empty at the end of the input.
    fn read_block_next(&mut self) -> AvroResult<()> {
        assert!(self.is_empty(), "Expected self to be empty!");
        let Some(RawBlock { count, data }) = self.read_raw_block()? else {
            return Ok(());
        };
        self.buf = self.codec.decompress(&data)?;
        self.buf_idx = 0;
        self.message_count = count;
        self.check_fully_consumed()
    }

    fn check_fully_consumed(&self) -> AvroResult<()> {
        let remaining = self.buf.len() - self.buf_idx;
        if self.message_count == 0 && remaining != 0 {
            return Err(Details::BlockTrailingBytes {
                block: self.blocks_read - 1,
                remaining,
            }
            .into());
        }
        Ok(())
    }

    fn is_empty(&self) -> bool {
        self.message_count == 0
    }

    pub(super) fn read_next(&mut self) -> AvroResult<Option<Value>> {
        while self.is_empty() {
            let blocks_read = self.blocks_read;
            self.read_block_next()?;
            if self.blocks_read == blocks_read {
                return Ok(None);
            }
        }

        let mut block_bytes = &self.buf[self.buf_idx..];
        let b_original = block_bytes.len();
        let item = decode_internal(&self.writer_schema, &self.names, &mut block_bytes)?;
        self.buf_idx += b_original - block_bytes.len();
        self.message_count -= 1;
        self.check_fully_consumed()?;
        Ok(Some(item))
    }
}

fn read_metadata<R: Read>(reader: &mut R) -> AvroResult<BTreeMap<String, Vec<u8>>> {
    let meta_schema = Schema::map(Schema::Bytes);
    match decode(&meta_schema, reader).map_err(Details::ReadHeaderMetadata)? {
        Value::Map(metadata) => Ok(metadata
            .into_iter()
            .filter_map(|(key, value)| match value {
                Value::Bytes(bytes) => Some((key, bytes)),
                _ => None,
            })
            .collect()),
        _ => unreachable!("a map schema always decodes to a map"),
    }
}

fn read_writer_schema(metadata: &BTreeMap<String, Vec<u8>>) -> AvroResult<Schema> {
    let json: serde_json::Value = metadata
        .get(SCHEMA_KEY)
        .ok_or(Details::GetAvroSchemaFromMap)
        .map_err(crate::Error::from)
        .and_then(|bytes| {
            serde_json::from_slice(bytes).map_err(|e| Details::ParseSchemaJson(e).into())
        })?;
    Schema::parse(&json)
}

fn read_codec_name(metadata: &BTreeMap<String, Vec<u8>>) -> AvroResult<String> {
    match metadata.get(CODEC_KEY) {
        Some(bytes) => std::str::from_utf8(bytes)
            .map(str::to_string)
            .map_err(|e| Details::CodecNameUtf8(e).into()),
        None => Ok("null".to_string()),
    }
}
