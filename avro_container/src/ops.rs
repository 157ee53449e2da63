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

//! File level operations: import, export, recoding and concatenation of container files.
use crate::{
    AvroResult, Reader, Writer,
    codec::CodecRegistry,
    error::Details,
    json::to_json,
    schema::Schema,
    text::value_bytes,
    types::Value,
    writer::{DEFAULT_SYNC_INTERVAL, WriteSummary},
};
use log::{debug, error};
use serde_json::Value as JsonValue;
use std::{
    collections::BTreeMap,
    fs::{self, File},
    io::{BufReader, BufWriter, Read, Write},
    path::Path,
};

/// Settings of the containers written by [`write_records`] and [`write_file`].
#[derive(Debug, Clone)]
pub struct WriteOptions {
    pub codec: String,
    pub sync_interval: usize,
    /// Extra header metadata.
    pub metadata: BTreeMap<String, Vec<u8>>,
    /// Skip the records that do not match the schema instead of failing.
    pub fail_safe: bool,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            codec: "null".to_string(),
            sync_interval: DEFAULT_SYNC_INTERVAL,
            metadata: BTreeMap::new(),
            fail_safe: false,
        }
    }
}

impl WriteOptions {
    fn writer<'a, W: Write>(&self, schema: &'a Schema, sink: W) -> AvroResult<Writer<'a, W>> {
        Writer::builder()
            .schema(schema)
            .writer(sink)
            .codec(self.codec.clone())
            .sync_interval(self.sync_interval)
            .metadata(self.metadata.clone())
            .fail_safe(self.fail_safe)
            .build()
    }
}

/// Settings of [`recode`].
#[derive(Debug, Clone)]
pub struct RecodeOptions {
    /// Codec of the output. `None` keeps the codec of the input.
    pub codec: Option<String>,
    pub sync_interval: usize,
    /// Entries added to (or replacing) the metadata of the input.
    pub metadata: BTreeMap<String, Vec<u8>>,
}

impl Default for RecodeOptions {
    fn default() -> Self {
        Self {
            codec: None,
            sync_interval: DEFAULT_SYNC_INTERVAL,
            metadata: BTreeMap::new(),
        }
    }
}

/// Something a [`Writer`] can append as one record.
pub trait AppendRecord {
    fn append_to<W: Write>(self, writer: &mut Writer<'_, W>) -> AvroResult<usize>;
}

impl AppendRecord for Value {
    fn append_to<W: Write>(self, writer: &mut Writer<'_, W>) -> AvroResult<usize> {
        writer.append_value_ref(&self)
    }
}

impl AppendRecord for JsonValue {
    fn append_to<W: Write>(self, writer: &mut Writer<'_, W>) -> AvroResult<usize> {
        writer.append_json(&self)
    }
}

/// Names of the built-in codecs, sorted.
pub fn list_codecs() -> Vec<&'static str> {
    CodecRegistry::builtin().names()
}

/// Parse `KEY=VALUE` arguments into header metadata. The value is everything after the first `=`.
pub fn parse_metadata_args<I, S>(args: I) -> AvroResult<BTreeMap<String, Vec<u8>>>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    args.into_iter()
        .map(|arg| {
            let arg = arg.as_ref();
            match arg.split_once('=') {
                Some((key, value)) if !value.is_empty() => {
                    Ok((key.to_string(), value.as_bytes().to_vec()))
                }
                _ => Err(Details::InvalidMetadataArg(arg.to_string()).into()),
            }
        })
        .collect()
}

fn open(path: &Path) -> AvroResult<File> {
    File::open(path).map_err(|source| {
        Details::OpenFile {
            path: path.to_path_buf(),
            source,
        }
        .into()
    })
}

fn create(path: &Path) -> AvroResult<File> {
    File::create(path).map_err(|source| {
        Details::OpenFile {
            path: path.to_path_buf(),
            source,
        }
        .into()
    })
}

/// Open a container file: its schema and metadata are read right away, its records lazily.
pub fn read_file(path: impl AsRef<Path>) -> AvroResult<Reader<BufReader<File>>> {
    Reader::new(BufReader::new(open(path.as_ref())?))
}

/// Write `records` as a container to `sink`.
///
/// The container is completed even when a record or the input fails, so that the records
/// appended before the failure remain readable; the failure is then returned.
pub fn write_records<W, T, I>(
    sink: W,
    schema: &Schema,
    options: &WriteOptions,
    records: I,
) -> AvroResult<(W, WriteSummary)>
where
    W: Write,
    T: AppendRecord,
    I: IntoIterator<Item = AvroResult<T>>,
{
    let mut writer = options.writer(schema, sink)?;
    let result = records
        .into_iter()
        .try_for_each(|record| record?.append_to(&mut writer).map(|_| ()));

    match result {
        Ok(()) => writer.finish(),
        Err(error) => match writer.finish() {
            Ok(_) => Err(error),
            Err(close) => {
                error!("Failed to complete the container after an error: {close}");
                Err(Details::CloseAfterError { error, close }.into())
            }
        },
    }
}

/// Write `records` as a container to the file at `path`, replacing it.
pub fn write_file<T, I>(
    path: impl AsRef<Path>,
    schema: &Schema,
    options: &WriteOptions,
    records: I,
) -> AvroResult<WriteSummary>
where
    T: AppendRecord,
    I: IntoIterator<Item = AvroResult<T>>,
{
    let file = create(path.as_ref())?;
    write_records(BufWriter::new(file), schema, options, records).map(|(_, summary)| summary)
}

/// Copy the records of the container `input` into a new container with other settings.
///
/// The metadata of the input is carried over, updated with `options.metadata`.
pub fn recode<R: Read, W: Write>(
    input: R,
    output: W,
    options: &RecodeOptions,
) -> AvroResult<WriteSummary> {
    let reader = Reader::new(input)?;
    let schema = reader.schema().clone();
    let mut metadata = reader.metadata().clone();
    metadata.extend(options.metadata.clone());

    let write_options = WriteOptions {
        codec: options
            .codec
            .clone()
            .unwrap_or_else(|| reader.codec().to_string()),
        sync_interval: options.sync_interval,
        metadata,
        fail_safe: false,
    };
    debug!(
        "Recoding from codec '{}' to '{}'",
        reader.codec(),
        write_options.codec
    );
    write_records(output, &schema, &write_options, reader).map(|(_, summary)| summary)
}

/// [`recode`] between files.
///
/// When both paths name the same file, the output is written to a temporary file in the same
/// directory which then replaces the input. Otherwise a failure can leave a partial output.
pub fn recode_file(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    options: &RecodeOptions,
) -> AvroResult<WriteSummary> {
    let (input, output) = (input.as_ref(), output.as_ref());
    let source = BufReader::new(open(input)?);

    if !is_same_file(input, output) {
        return recode(source, BufWriter::new(create(output)?), options);
    }

    let dir = match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let staged = tempfile::NamedTempFile::new_in(dir).map_err(|source| Details::CreateTempFile {
        path: output.to_path_buf(),
        source,
    })?;
    let summary = recode(source, BufWriter::new(staged.as_file()), options)?;
    staged
        .persist(output)
        .map_err(|source| Details::PersistTempFile {
            path: output.to_path_buf(),
            source,
        })?;
    debug!("Replaced {} in place", output.display());
    Ok(summary)
}

fn is_same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Concatenate containers without recompressing their blocks.
///
/// Every input must have the same schema and codec as the first one. The output carries the
/// metadata of the first input under a new sync marker.
pub fn concat<R, I, W>(inputs: I, output: W) -> AvroResult<WriteSummary>
where
    R: Read,
    I: IntoIterator<Item = R>,
    W: Write,
{
    let mut inputs = inputs.into_iter();
    let first = Reader::new(inputs.next().ok_or(Details::ConcatNoInputs)?)?;
    let schema = first.schema().clone();
    let codec = first.codec().to_string();

    let mut writer = Writer::builder()
        .schema(&schema)
        .writer(output)
        .codec(codec.clone())
        .metadata(first.metadata().clone())
        .build()?;
    copy_blocks(first, &mut writer)?;

    for (index, input) in inputs.enumerate().map(|(i, input)| (i + 1, input)) {
        let reader = Reader::new(input)?;
        if reader.schema() != &schema {
            return Err(Details::ConcatSchemaMismatch { index }.into());
        }
        if reader.codec() != codec {
            return Err(Details::ConcatCodecMismatch {
                index,
                expected: codec,
                found: reader.codec().to_string(),
            }
            .into());
        }
        copy_blocks(reader, &mut writer)?;
    }

    writer.close()
}

/// [`concat`] between files.
///
/// The output must not be one of the inputs, since it is truncated before the inputs are read.
pub fn concat_files<P: AsRef<Path>>(
    inputs: &[P],
    output: impl AsRef<Path>,
) -> AvroResult<WriteSummary> {
    let output = output.as_ref();
    if let Some(input) = inputs.iter().find(|input| is_same_file(input.as_ref(), output)) {
        return Err(Details::ConcatOutputIsInput(input.as_ref().to_path_buf()).into());
    }
    let sources = inputs
        .iter()
        .map(|input| open(input.as_ref()).map(BufReader::new))
        .collect::<AvroResult<Vec<_>>>()?;
    concat(sources, BufWriter::new(create(output)?))
}

fn copy_blocks<R: Read, W: Write>(
    reader: Reader<R>,
    writer: &mut Writer<'_, W>,
) -> AvroResult<()> {
    for block in reader.raw_blocks() {
        let block = block?;
        writer.append_raw_block(block.count, &block.data)?;
    }
    Ok(())
}

/// Write every record of `reader` as one line of JSON. Returns the number of records.
pub fn json_export<R: Read, W: Write>(reader: Reader<R>, output: &mut W) -> AvroResult<usize> {
    let mut count = 0;
    for value in reader {
        let mut line = to_json(&value?).to_string();
        line.push('\n');
        output
            .write_all(line.as_bytes())
            .map_err(Details::WriteBytes)?;
        count += 1;
    }
    output.flush().map_err(Details::FlushWriter)?;
    Ok(count)
}

/// Write the bytes of every record of `reader`, as stored. Returns the number of records.
pub fn text_export<R: Read, W: Write>(reader: Reader<R>, output: &mut W) -> AvroResult<usize> {
    let mut count = 0;
    for value in reader {
        output
            .write_all(value_bytes(&value?)?)
            .map_err(Details::WriteBytes)?;
        count += 1;
    }
    output.flush().map_err(Details::FlushWriter)?;
    Ok(count)
}
