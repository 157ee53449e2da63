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

//! Logic handling reading from Avro format at user level.

mod block;

pub use block::RawBlock;
pub(crate) use block::{CODEC_KEY, MAGIC, SCHEMA_KEY};

use crate::{AvroResult, codec::CodecRegistry, decode::decode, schema::Schema, types::Value};
use block::Block;
use bon::bon;
use std::{collections::BTreeMap, io::Read};

/// Main interface for reading Avro Object Container Files.
///
/// The header (schema, metadata, codec and sync marker) is read when the `Reader` is built.
/// Records are then decoded lazily, one block at a time, as the `Reader` is iterated:
///
/// ```no_run
/// # use avro_container::Reader;
/// # use std::io::Cursor;
/// # let input = Cursor::new(Vec::<u8>::new());
/// for value in Reader::new(input).unwrap() {
///     match value {
///         Ok(v) => println!("{:?}", v),
///         Err(e) => println!("Error: {}", e),
///     };
/// }
/// ```
///
/// After the first error the iterator is exhausted.
pub struct Reader<R> {
    block: Block<R>,
    errored: bool,
}

#[bon]
impl<R: Read> Reader<R> {
    /// Creates a `Reader` resolving the codec through the built-in registry.
    ///
    /// **NOTE** The avro header is going to be read automatically upon creation of the `Reader`.
    pub fn new(reader: R) -> AvroResult<Reader<R>> {
        Reader::builder(reader).build()
    }

    /// Creates a `Reader` given something implementing the `io::Read` trait to read from.
    ///
    /// A `registry` can be given to read containers compressed with codecs that are not built in.
    ///
    /// **NOTE** The avro header is going to be read automatically upon creation of the `Reader`.
    #[builder(finish_fn = build)]
    pub fn builder<'r>(
        #[builder(start_fn)] reader: R,
        registry: Option<&'r CodecRegistry>,
    ) -> AvroResult<Reader<R>> {
        let registry = registry.unwrap_or_else(|| CodecRegistry::builtin());
        let block = Block::new(reader, registry)?;
        Ok(Reader {
            block,
            errored: false,
        })
    }

    /// Get a reference to the schema the file was written with.
    #[inline]
    pub fn schema(&self) -> &Schema {
        &self.block.writer_schema
    }

    /// The name of the codec the blocks are compressed with.
    #[inline]
    pub fn codec(&self) -> &str {
        &self.block.codec_name
    }

    /// Every metadata entry of the header, including the reserved `avro.*` keys.
    #[inline]
    pub fn metadata(&self) -> &BTreeMap<String, Vec<u8>> {
        &self.block.metadata
    }

    /// The metadata with its values decoded as (lossy) utf-8.
    pub fn metadata_str(&self) -> BTreeMap<String, String> {
        self.block
            .metadata
            .iter()
            .map(|(key, value)| (key.clone(), String::from_utf8_lossy(value).into_owned()))
            .collect()
    }

    /// The sync marker that terminates every block of this file.
    #[inline]
    pub fn sync_marker(&self) -> [u8; 16] {
        self.block.marker
    }

    /// Turn this reader into an iterator over the remaining blocks, still compressed.
    ///
    /// Records of a block that was already partially decoded are skipped.
    pub fn raw_blocks(self) -> RawBlocks<R> {
        RawBlocks {
            block: self.block,
            errored: self.errored,
        }
    }
}

impl<R: Read> Iterator for Reader<R> {
    type Item = AvroResult<Value>;

    fn next(&mut self) -> Option<Self::Item> {
        // to prevent keep on reading after the first error occurs
        if self.errored {
            return None;
        };
        match self.block.read_next() {
            Ok(opt) => opt.map(Ok),
            Err(e) => {
                self.errored = true;
                Some(Err(e))
            }
        }
    }
}

/// Iterator over the compressed blocks of a container, see [`Reader::raw_blocks`].
pub struct RawBlocks<R> {
    block: Block<R>,
    errored: bool,
}

impl<R: Read> RawBlocks<R> {
    pub fn codec(&self) -> &str {
        &self.block.codec_name
    }
}

impl<R: Read> Iterator for RawBlocks<R> {
    type Item = AvroResult<RawBlock>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.errored {
            return None;
        }
        match self.block.read_raw_block() {
            Ok(opt) => opt.map(Ok),
            Err(e) => {
                self.errored = true;
                Some(Err(e))
            }
        }
    }
}

/// Decode a `Value` encoded in Avro format given its `Schema` and anything implementing `io::Read`
/// to read from.
///
/// **NOTE** This function has a quite small niche of usage and does NOT take care of reading the
/// header and consecutive data blocks; use [`Reader`] if you don't know what you are doing,
/// instead.
pub fn from_avro_datum<R: Read>(writer_schema: &Schema, reader: &mut R) -> AvroResult<Value> {
    decode(writer_schema, reader)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        TestResult,
        codec::Codec,
        encode::{encode, encode_to_vec},
        error::{Details, ErrorKind},
        util::zig_i64,
    };
    use pretty_assertions::assert_eq;

    const SCHEMA: &str = r#"
    {
      "type": "record",
      "name": "test",
      "fields": [
        {
          "name": "a",
          "type": "long",
          "default": 42
        },
        {
          "name": "b",
          "type": "string"
        }
      ]
    }
    "#;

    const MARKER: [u8; 16] = [7; 16];

    fn record(a: i64, b: &str) -> Value {
        Value::record([("a", Value::Long(a)), ("b", Value::from(b))])
    }

    /// Assemble a container by hand: header, then one block per entry of `blocks`.
    fn container(codec: Option<&str>, blocks: &[&[Value]]) -> AvroResult<Vec<u8>> {
        let schema = Schema::parse_str(SCHEMA)?;
        let mut metadata = vec![(
            SCHEMA_KEY.to_string(),
            Value::Bytes(schema.to_json_string()?.into_bytes()),
        )];
        if let Some(codec) = codec {
            metadata.push((CODEC_KEY.to_string(), Value::Bytes(codec.as_bytes().to_vec())));
        }

        let mut out = MAGIC.to_vec();
        encode(
            &Value::Map(metadata.into_iter().collect()),
            &Schema::map(Schema::Bytes),
            &mut out,
        )?;
        out.extend_from_slice(&MARKER);

        for records in blocks {
            let mut payload = Vec::new();
            for r in *records {
                payload.extend(encode_to_vec(r, &schema)?);
            }
            zig_i64(records.len() as i64, &mut out)?;
            zig_i64(payload.len() as i64, &mut out)?;
            out.extend(payload);
            out.extend_from_slice(&MARKER);
        }
        Ok(out)
    }

    #[test]
    fn test_reader_iterator() -> TestResult {
        let input = container(None, &[&[record(27, "foo"), record(42, "bar")]])?;
        let reader = Reader::new(input.as_slice())?;
        assert_eq!(reader.codec(), "null");
        assert_eq!(reader.sync_marker(), MARKER);
        assert!(reader.metadata().contains_key(SCHEMA_KEY));

        let values = reader.collect::<AvroResult<Vec<_>>>()?;
        assert_eq!(values, vec![record(27, "foo"), record(42, "bar")]);
        Ok(())
    }

    #[test]
    fn test_reader_empty_and_multiple_blocks() -> TestResult {
        let input = container(Some("null"), &[&[record(1, "a")], &[], &[record(2, "b")]])?;
        let values = Reader::new(input.as_slice())?.collect::<AvroResult<Vec<_>>>()?;
        assert_eq!(values, vec![record(1, "a"), record(2, "b")]);

        let input = container(None, &[])?;
        assert_eq!(Reader::new(input.as_slice())?.count(), 0);
        Ok(())
    }

    #[test]
    fn test_reader_invalid_header() {
        let invalid = &[1, 2, 3, 4][..];
        let err = Reader::new(invalid).err().map(|e| e.into_details());
        assert!(matches!(err, Some(Details::HeaderMagic([1, 2, 3, 4]))));

        let truncated = &MAGIC[..2];
        let err = Reader::new(truncated).err().map(|e| e.kind());
        assert_eq!(err, Some(ErrorKind::InvalidContainer));
    }

    #[test]
    fn test_reader_missing_schema() -> TestResult {
        let mut input = MAGIC.to_vec();
        encode(
            &Value::Map(Default::default()),
            &Schema::map(Schema::Bytes),
            &mut input,
        )?;
        input.extend_from_slice(&MARKER);
        let err = Reader::new(input.as_slice()).err().map(|e| e.into_details());
        assert!(matches!(err, Some(Details::GetAvroSchemaFromMap)));
        Ok(())
    }

    #[test]
    fn test_reader_unknown_codec() -> TestResult {
        let input = container(Some("lz77"), &[&[record(1, "a")]])?;
        let err = Reader::new(input.as_slice()).err().map(|e| e.kind());
        assert_eq!(err, Some(ErrorKind::UnknownCodec));

        let mut registry = CodecRegistry::new();
        registry.register_fn("lz77", |i| Ok(i.to_vec()), |i| Ok(i.to_vec()));
        let reader = Reader::builder(input.as_slice())
            .registry(&registry)
            .build()?;
        assert_eq!(reader.count(), 1);
        Ok(())
    }

    #[test]
    fn test_reader_corrupt_marker_is_fused() -> TestResult {
        let mut input = container(None, &[&[record(1, "a")], &[record(2, "b")]])?;
        let last = input.len() - 1;
        input[last] ^= 0xFF;

        let mut reader = Reader::new(input.as_slice())?;
        assert_eq!(reader.next().transpose()?, Some(record(1, "a")));
        let err = reader.next().and_then(Result::err).map(|e| e.kind());
        assert_eq!(err, Some(ErrorKind::CorruptBlock));
        assert!(reader.next().is_none());
        Ok(())
    }

    #[test]
    fn test_reader_truncated_block() -> TestResult {
        let input = container(None, &[&[record(1, "a")], &[record(2, "b")]])?;
        for cut in [1, 5, 16] {
            let truncated = &input[..input.len() - cut];
            let results: Vec<_> = Reader::new(truncated)?.collect();
            assert_eq!(results.len(), 2, "cut {cut}");
            assert_eq!(
                results[1].as_ref().err().map(|e| e.kind()),
                Some(ErrorKind::CorruptContainer)
            );
        }
        Ok(())
    }

    #[test]
    fn test_reader_trailing_bytes_in_block() -> TestResult {
        let schema = Schema::parse_str(SCHEMA)?;
        let mut input = container(None, &[])?;
        let mut payload = encode_to_vec(&record(1, "a"), &schema)?;
        payload.push(0);
        zig_i64(1, &mut input)?;
        zig_i64(payload.len() as i64, &mut input)?;
        input.extend(payload);
        input.extend_from_slice(&MARKER);

        let results: Vec<_> = Reader::new(input.as_slice())?.collect();
        let err = results[0].as_ref().err().map(|e| e.details());
        assert!(matches!(
            err,
            Some(Details::BlockTrailingBytes { remaining: 1, .. })
        ));
        Ok(())
    }

    #[test]
    fn test_reader_negative_block_count() -> TestResult {
        let mut input = container(None, &[])?;
        zig_i64(-1, &mut input)?;
        zig_i64(0, &mut input)?;
        input.extend_from_slice(&MARKER);
        let err = Reader::new(input.as_slice())?
            .next()
            .and_then(Result::err)
            .map(|e| e.kind());
        assert_eq!(err, Some(ErrorKind::CorruptContainer));
        Ok(())
    }

    #[test]
    fn test_raw_blocks() -> TestResult {
        let input = container(Some("deflate"), &[])?;
        let reader = Reader::new(input.as_slice())?;
        assert_eq!(reader.codec(), Codec::Deflate(Default::default()).name());
        assert_eq!(reader.raw_blocks().count(), 0);

        let input = container(None, &[&[record(1, "a")], &[record(2, "b"), record(3, "c")]])?;
        let blocks = Reader::new(input.as_slice())?
            .raw_blocks()
            .collect::<AvroResult<Vec<_>>>()?;
        assert_eq!(
            blocks.iter().map(|b| b.count).collect::<Vec<_>>(),
            vec![1, 2]
        );
        Ok(())
    }

    #[test]
    fn test_metadata_is_passed_through() -> TestResult {
        let input = container(Some("null"), &[])?;
        let reader = Reader::new(input.as_slice())?;
        let metadata = reader.metadata_str();
        assert_eq!(metadata.get(CODEC_KEY).map(String::as_str), Some("null"));
        assert!(metadata[SCHEMA_KEY].contains("\"test\""));
        Ok(())
    }
}
