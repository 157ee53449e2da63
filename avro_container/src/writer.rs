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

//! Logic handling writing in Avro format at user level.
use crate::{
    AvroResult, Error,
    codec::{BlockCodec, CodecRegistry},
    encode::{ValuePath, encode_bytes, encode_internal, encode_long, encode_to_vec},
    error::Details,
    json::from_json_internal,
    reader::{CODEC_KEY, MAGIC, SCHEMA_KEY},
    schema::{ResolvedSchema, Schema},
    types::Value,
};
use log::{debug, error, warn};
use serde_json::Value as JsonValue;
use std::{collections::BTreeMap, io::Write, sync::Arc};

/// Uncompressed size at which the buffered records are written out as a block.
pub const DEFAULT_SYNC_INTERVAL: usize = 16 * 1024;

/// A record that was skipped by a fail-safe [`Writer`].
#[derive(Debug)]
pub struct RecordError {
    /// Position of the record among all the records offered to the writer, starting at 0.
    pub index: usize,
    pub error: Error,
}

/// What a [`Writer`] did, returned by [`Writer::close`].
#[derive(Debug, Default)]
pub struct WriteSummary {
    pub records_written: usize,
    pub blocks_written: usize,
    /// The records skipped in fail-safe mode, in the order they were offered.
    pub errors: Vec<RecordError>,
}

/// Main interface for writing Avro Object Container Files.
///
/// The header is written as soon as the `Writer` is built. Records are encoded into an in-memory
/// block which is compressed and written out once it reaches the sync interval, on
/// [`flush`](Writer::flush), and on [`close`](Writer::close).
///
/// It is critical to call `close` (or `flush`) before the `Writer` is dropped. Though dropping will
/// attempt to flush the contents of the buffer, errors happening in the process can only be
/// logged.
pub struct Writer<'a, W: Write> {
    schema: &'a Schema,
    /// `None` once the writer has been closed.
    writer: Option<W>,
    resolved_schema: ResolvedSchema<'a>,
    codec_name: String,
    codec: Arc<dyn BlockCodec>,
    sync_interval: usize,
    buffer: Vec<u8>,
    num_values: usize,
    marker: [u8; 16],
    fail_safe: bool,
    records_offered: usize,
    records_written: usize,
    blocks_written: usize,
    errors: Vec<RecordError>,
}

#[bon::bon]
impl<'a, W: Write> Writer<'a, W> {
    /// Build a `Writer` and write the container header to `writer`.
    ///
    /// Fails with [`ErrorKind::UnknownCodec`](crate::error::ErrorKind::UnknownCodec) before
    /// anything is written when `codec` is not in the registry.
    #[builder]
    pub fn builder(
        schema: &'a Schema,
        writer: W,
        /// Name of the codec compressing the blocks.
        #[builder(default = "null".to_string(), into)]
        codec: String,
        /// Where `codec` is looked up. Defaults to the built-in codecs.
        registry: Option<&'a CodecRegistry>,
        /// Uncompressed block size that triggers a flush.
        #[builder(default = DEFAULT_SYNC_INTERVAL)]
        sync_interval: usize,
        /// Extra header metadata. `avro.schema` and `avro.codec` are always set by the writer.
        #[builder(default)]
        metadata: BTreeMap<String, Vec<u8>>,
        #[builder(default = generate_sync_marker())] marker: [u8; 16],
        /// Skip and report records that fail to encode instead of failing.
        #[builder(default = false)]
        fail_safe: bool,
    ) -> AvroResult<Self> {
        let registry = registry.unwrap_or_else(|| CodecRegistry::builtin());
        let codec_impl = registry.get(&codec)?;
        let resolved_schema = ResolvedSchema::try_from(schema)?;

        let mut writer = writer;
        let header = header(schema, &codec, metadata, &marker)?;
        writer.write_all(&header).map_err(Details::WriteBytes)?;
        debug!("Wrote container header with codec '{codec}'");

        Ok(Self {
            schema,
            writer: Some(writer),
            resolved_schema,
            codec_name: codec,
            codec: codec_impl,
            sync_interval,
            buffer: Vec::with_capacity(sync_interval),
            num_values: 0,
            marker,
            fail_safe,
            records_offered: 0,
            records_written: 0,
            blocks_written: 0,
            errors: Vec::new(),
        })
    }
}

impl<'a, W: Write> Writer<'a, W> {
    /// Creates a `Writer` given a `Schema` and something implementing the `io::Write` trait to
    /// write to.
    /// No compression codec will be used.
    pub fn new(schema: &'a Schema, writer: W) -> AvroResult<Self> {
        Self::builder().schema(schema).writer(writer).build()
    }

    /// Creates a `Writer` with the built-in codec named `codec`.
    pub fn with_codec(schema: &'a Schema, writer: W, codec: &str) -> AvroResult<Self> {
        Self::builder()
            .schema(schema)
            .writer(writer)
            .codec(codec)
            .build()
    }

    /// Get a reference to the `Schema` associated to a `Writer`.
    pub fn schema(&self) -> &'a Schema {
        self.schema
    }

    pub fn codec(&self) -> &str {
        &self.codec_name
    }

    pub fn sync_marker(&self) -> [u8; 16] {
        self.marker
    }

    /// Records skipped so far in fail-safe mode.
    pub fn errors(&self) -> &[RecordError] {
        &self.errors
    }

    /// Records written out in completed blocks so far.
    pub fn records_written(&self) -> usize {
        self.records_written
    }

    /// Append a value to the `Writer`.
    ///
    /// Returns the number of bytes written (it might be 0, see below).
    ///
    /// **NOTE**: This function is not guaranteed to perform any actual write, since it relies on
    /// internal buffering for performance reasons. If you want to be sure the value has been
    /// written, then call [`flush`](Writer::flush).
    pub fn append_value<T: Into<Value>>(&mut self, value: T) -> AvroResult<usize> {
        let avro = value.into();
        self.append_value_ref(&avro)
    }

    /// Append a value to the `Writer`, encoding it with the writer's schema.
    ///
    /// A value that does not match the schema leaves the buffered block untouched. In fail-safe
    /// mode the failure is recorded (see [`errors`](Writer::errors)) and `Ok(0)` is returned,
    /// otherwise the error is returned.
    pub fn append_value_ref(&mut self, value: &Value) -> AvroResult<usize> {
        if self.writer.is_none() {
            return Err(Details::WriterClosed.into());
        }

        let mark = self.buffer.len();
        if let Err(error) = encode_internal(
            value,
            self.schema,
            self.resolved_schema.get_names(),
            &mut ValuePath::new(),
            &mut self.buffer,
        ) {
            self.buffer.truncate(mark);
            return self.reject(error);
        }
        self.records_offered += 1;
        self.num_values += 1;

        if self.buffer.len() >= self.sync_interval {
            return self.flush();
        }

        Ok(0)
    }

    /// Append a JSON document, converted with [`from_json`](crate::json::from_json) semantics.
    ///
    /// A document that cannot be converted is handled like a value that fails to encode.
    pub fn append_json(&mut self, json: &JsonValue) -> AvroResult<usize> {
        match from_json_internal(
            json,
            self.schema,
            self.resolved_schema.get_names(),
            &mut ValuePath::new(),
        ) {
            Ok(value) => self.append_value_ref(&value),
            Err(error) => self.reject(error),
        }
    }

    fn reject(&mut self, error: Error) -> AvroResult<usize> {
        let index = self.records_offered;
        self.records_offered += 1;
        if !self.fail_safe {
            return Err(error);
        }
        warn!("Skipping record {index}: {error}");
        self.errors.push(RecordError { index, error });
        Ok(0)
    }

    /// Extend a `Writer` with an `Iterator` of values.
    ///
    /// Returns the number of bytes written.
    ///
    /// **NOTE**: This function forces the written data to be flushed (an implicit
    /// call to [`flush`](Writer::flush) is performed).
    pub fn extend<I, T: Into<Value>>(&mut self, values: I) -> AvroResult<usize>
    where
        I: IntoIterator<Item = T>,
    {
        let mut num_bytes = 0;
        for value in values {
            num_bytes += self.append_value(value)?;
        }
        num_bytes += self.flush()?;

        Ok(num_bytes)
    }

    /// Write the buffered records out as one block. Does nothing when no record is buffered.
    ///
    /// Returns the number of bytes written.
    pub fn flush(&mut self) -> AvroResult<usize> {
        if self.num_values == 0 {
            return Ok(0);
        }
        let compressed = self.codec.compress(&self.buffer)?;
        let num_bytes = self.write_block(self.num_values, &compressed)?;
        debug!(
            "Flushed block of {} records ({} bytes, {} compressed)",
            self.num_values,
            self.buffer.len(),
            compressed.len()
        );

        self.records_written += self.num_values;
        self.buffer.clear();
        self.num_values = 0;

        self.flush_sink()?;
        Ok(num_bytes)
    }

    /// Write a block that is already compressed with this writer's codec, after flushing the
    /// buffered records.
    ///
    /// The caller guarantees that `data` holds `count` records encoded with this writer's schema.
    pub fn append_raw_block(&mut self, count: usize, data: &[u8]) -> AvroResult<usize> {
        let mut num_bytes = self.flush()?;
        num_bytes += self.write_block(count, data)?;
        self.records_written += count;

        self.flush_sink()?;
        Ok(num_bytes)
    }

    fn flush_sink(&mut self) -> AvroResult<()> {
        let writer = self.writer.as_mut().ok_or(Details::WriterClosed)?;
        writer.flush().map_err(|e| Details::FlushWriter(e).into())
    }

    fn write_block(&mut self, count: usize, data: &[u8]) -> AvroResult<usize> {
        let writer = self.writer.as_mut().ok_or(Details::WriterClosed)?;

        let mut header = Vec::with_capacity(20);
        encode_long(count as i64, &mut header)?;
        encode_long(data.len() as i64, &mut header)?;

        writer.write_all(&header).map_err(Details::WriteBytes)?;
        writer.write_all(data).map_err(Details::WriteBytes)?;
        writer.write_all(&self.marker).map_err(Details::WriteBytes)?;

        self.blocks_written += 1;
        Ok(header.len() + data.len() + self.marker.len())
    }

    /// Flush the remaining records and release the sink.
    pub fn close(self) -> AvroResult<WriteSummary> {
        self.finish().map(|(_, summary)| summary)
    }

    /// Flush the remaining records, returning the sink along with the [`WriteSummary`].
    pub fn finish(mut self) -> AvroResult<(W, WriteSummary)> {
        self.flush()?;
        let mut writer = self.writer.take().ok_or(Details::WriterClosed)?;
        writer.flush().map_err(Details::FlushWriter)?;
        let summary = WriteSummary {
            records_written: self.records_written,
            blocks_written: self.blocks_written,
            errors: std::mem::take(&mut self.errors),
        };
        Ok((writer, summary))
    }

    /// Return what the `Writer` is writing to, consuming the `Writer` itself.
    ///
    /// **NOTE**: This function forces the written data to be flushed (an implicit
    /// call to [`flush`](Writer::flush) is performed).
    pub fn into_inner(mut self) -> AvroResult<W> {
        self.flush()?;
        self.writer.take().ok_or_else(|| Details::WriterClosed.into())
    }

    /// Gets a reference to the underlying writer.
    ///
    /// **NOTE**: There is likely data still in the buffer. To have all the data
    /// in the writer call [`flush`](Writer::flush) first.
    pub fn get_ref(&self) -> Option<&W> {
        self.writer.as_ref()
    }
}

impl<W: Write> Drop for Writer<'_, W> {
    /// Drop the writer, will try to flush and log any errors.
    fn drop(&mut self) {
        if self.writer.is_some()
            && let Err(e) = self.flush()
        {
            error!(
                "Failed to flush {} buffered records while dropping the writer: {e}",
                self.num_values
            );
        }
    }
}

/// Create an Avro header based on schema, codec, metadata and sync marker.
///
/// The metadata entries are written in key order.
fn header(
    schema: &Schema,
    codec: &str,
    mut metadata: BTreeMap<String, Vec<u8>>,
    marker: &[u8; 16],
) -> AvroResult<Vec<u8>> {
    let reserved = [
        (SCHEMA_KEY, schema.to_json_string()?.into_bytes()),
        (CODEC_KEY, codec.as_bytes().to_vec()),
    ];
    for (key, value) in reserved {
        if metadata.insert(key.to_string(), value).is_some() {
            debug!("Replacing the user supplied `{key}` metadata entry");
        }
    }

    let mut header = MAGIC.to_vec();
    encode_long(metadata.len() as i64, &mut header)?;
    for (key, value) in &metadata {
        encode_bytes(key, &mut header)?;
        encode_bytes(value, &mut header)?;
    }
    encode_long(0, &mut header)?;
    header.extend_from_slice(marker);
    Ok(header)
}

/// Encode a value into raw Avro data, without any container framing.
pub fn to_avro_datum<T: Into<Value>>(schema: &Schema, value: T) -> AvroResult<Vec<u8>> {
    encode_to_vec(&value.into(), schema)
}

fn generate_sync_marker() -> [u8; 16] {
    rand::random()
}
