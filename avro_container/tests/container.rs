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

use avro_container::{
    AvroResult, CodecRegistry, ErrorKind, Reader, Writer,
    ops::{self, RecodeOptions, WriteOptions},
    schema::Schema,
    types::Value,
};
use pretty_assertions::assert_eq;
use proptest::prelude::*;

type TestResult = anyhow::Result<()>;

const EVENT_SCHEMA: &str = r#"
{
  "type": "record",
  "name": "Event",
  "namespace": "test",
  "fields": [
    {"name": "id", "type": "long"},
    {"name": "name", "type": "string"},
    {"name": "score", "type": ["null", "double"], "default": null},
    {"name": "tags", "type": {"type": "array", "items": "string"}},
    {"name": "payload", "type": "bytes"}
  ]
}
"#;

fn event(
    id: i64,
    name: String,
    score: Option<f64>,
    tags: Vec<String>,
    payload: Vec<u8>,
) -> Value {
    let score = match score {
        Some(score) => Value::Union(1, Box::new(Value::Double(score))),
        None => Value::Union(0, Box::new(Value::Null)),
    };
    Value::record([
        ("id", Value::Long(id)),
        ("name", Value::String(name)),
        ("score", score),
        (
            "tags",
            Value::Array(tags.into_iter().map(Value::String).collect()),
        ),
        ("payload", Value::Bytes(payload)),
    ])
}

fn arb_event() -> impl Strategy<Value = Value> {
    (
        any::<i64>(),
        ".{0,20}",
        proptest::option::of(-1e9f64..1e9f64),
        proptest::collection::vec("[a-z]{0,8}", 0..4),
        proptest::collection::vec(any::<u8>(), 0..64),
    )
        .prop_map(|(id, name, score, tags, payload)| event(id, name, score, tags, payload))
}

fn write(
    schema: &Schema,
    records: &[Value],
    codec: &str,
    sync_interval: usize,
) -> AvroResult<Vec<u8>> {
    let mut writer = Writer::builder()
        .schema(schema)
        .writer(Vec::new())
        .codec(codec)
        .sync_interval(sync_interval)
        .build()?;
    writer.extend(records.iter().cloned())?;
    writer.into_inner()
}

const READING_SCHEMA: &str = r#"
{
  "type": "record",
  "name": "Reading",
  "namespace": "test",
  "fields": [
    {"name": "sensor", "type": "int"},
    {"name": "value", "type": "float"},
    {"name": "valid", "type": "boolean"},
    {"name": "unit", "type": {"type": "enum", "name": "Unit", "symbols": ["C", "F", "K"]}},
    {"name": "checksum", "type": {"type": "fixed", "name": "Checksum", "size": 4}},
    {"name": "labels", "type": {"type": "map", "values": "long"}},
    {"name": "taken_at", "type": {"type": "long", "logicalType": "timestamp-millis"}},
    {
      "name": "origin",
      "type": [
        "null",
        {
          "type": "record",
          "name": "Point",
          "fields": [
            {"name": "x", "type": "double"},
            {"name": "y", "type": "double"}
          ]
        },
        {
          "type": "record",
          "name": "Place",
          "fields": [
            {"name": "name", "type": "string"},
            {"name": "at", "type": "Point"}
          ]
        }
      ]
    }
  ]
}
"#;

fn point(x: f64, y: f64) -> Value {
    Value::record([("x", Value::Double(x)), ("y", Value::Double(y))])
}

fn arb_origin() -> impl Strategy<Value = Value> {
    let coordinate = -1e6f64..1e6f64;
    prop_oneof![
        Just(Value::Union(0, Box::new(Value::Null))),
        (coordinate.clone(), coordinate.clone())
            .prop_map(|(x, y)| Value::Union(1, Box::new(point(x, y)))),
        ("[a-z]{1,12}", coordinate.clone(), coordinate).prop_map(|(name, x, y)| {
            let place = Value::record([("name", Value::String(name)), ("at", point(x, y))]);
            Value::Union(2, Box::new(place))
        }),
    ]
}

fn arb_reading() -> impl Strategy<Value = Value> {
    (
        any::<i32>(),
        -1e6f32..1e6f32,
        any::<bool>(),
        0u32..3,
        any::<[u8; 4]>(),
        proptest::collection::hash_map("[a-z]{1,6}", any::<i64>(), 0..4),
        any::<i64>(),
        arb_origin(),
    )
        .prop_map(
            |(sensor, value, valid, unit, checksum, labels, taken_at, origin)| {
                let unit_symbol = ["C", "F", "K"][unit as usize].to_string();
                let labels = labels
                    .into_iter()
                    .map(|(k, v)| (k, Value::Long(v)))
                    .collect();
                Value::record([
                    ("sensor", Value::Int(sensor)),
                    ("value", Value::Float(value)),
                    ("valid", Value::Boolean(valid)),
                    ("unit", Value::Enum(unit, unit_symbol)),
                    ("checksum", Value::Fixed(4, checksum.to_vec())),
                    ("labels", Value::Map(labels)),
                    ("taken_at", Value::Long(taken_at)),
                    ("origin", origin),
                ])
            },
        )
}

fn sync_marker_offsets(bytes: &[u8], marker: [u8; 16]) -> Vec<usize> {
    bytes
        .windows(16)
        .enumerate()
        .filter(|(_, window)| *window == marker)
        .map(|(offset, _)| offset)
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn records_survive_a_round_trip(
        records in proptest::collection::vec(arb_event(), 0..40),
        codec in proptest::sample::select(ops::list_codecs()),
        sync_interval in 1usize..512,
    ) {
        let schema = Schema::parse_str(EVENT_SCHEMA).unwrap();
        let bytes = write(&schema, &records, codec, sync_interval).unwrap();

        let reader = Reader::new(bytes.as_slice()).unwrap();
        prop_assert_eq!(reader.codec(), codec);
        prop_assert_eq!(reader.schema(), &schema);
        let read = reader.collect::<AvroResult<Vec<_>>>().unwrap();
        prop_assert_eq!(read, records);
    }

    #[test]
    fn named_and_complex_records_survive_a_round_trip(
        records in proptest::collection::vec(arb_reading(), 0..24),
        codec in proptest::sample::select(ops::list_codecs()),
        sync_interval in 1usize..256,
    ) {
        let schema = Schema::parse_str(READING_SCHEMA).unwrap();
        let bytes = write(&schema, &records, codec, sync_interval).unwrap();

        let reader = Reader::new(bytes.as_slice()).unwrap();
        prop_assert_eq!(reader.schema(), &schema);
        let read = reader.collect::<AvroResult<Vec<_>>>().unwrap();
        prop_assert_eq!(read, records);
    }
}

#[test]
fn small_sync_interval_writes_many_blocks() -> TestResult {
    let records: Vec<Value> = (0..1000).map(Value::Long).collect();
    let bytes = write(&Schema::Long, &records, "deflate", 64)?;

    let blocks = Reader::new(bytes.as_slice())?
        .raw_blocks()
        .collect::<AvroResult<Vec<_>>>()?;
    assert!(blocks.len() > 10, "only {} blocks", blocks.len());
    assert_eq!(blocks.iter().map(|b| b.count).sum::<usize>(), 1000);

    let read = Reader::new(bytes.as_slice())?.collect::<AvroResult<Vec<_>>>()?;
    assert_eq!(read, records);
    Ok(())
}

#[test]
fn empty_container_has_no_records() -> TestResult {
    let bytes = write(&Schema::Long, &[], "null", 64)?;
    let reader = Reader::new(bytes.as_slice())?;
    assert_eq!(reader.raw_blocks().count(), 0);
    Ok(())
}

#[test]
fn corrupt_sync_marker_fails_the_block() -> TestResult {
    let records: Vec<Value> = (0..3).map(Value::Long).collect();
    let mut bytes = write(&Schema::Long, &records, "null", 1)?;
    let marker = Reader::new(bytes.as_slice())?.sync_marker();

    // The header marker, then one marker per block.
    let offsets = sync_marker_offsets(&bytes, marker);
    assert_eq!(offsets.len(), 4);
    bytes[offsets[2]] ^= 0xFF;

    let mut reader = Reader::new(bytes.as_slice())?;
    assert_eq!(reader.next().transpose()?, Some(Value::Long(0)));
    let err = reader.next().and_then(Result::err).map(|e| e.kind());
    assert_eq!(err, Some(ErrorKind::CorruptBlock));
    assert!(reader.next().is_none());
    Ok(())
}

#[test]
fn truncated_block_is_a_corrupt_container() -> TestResult {
    let records: Vec<Value> = (0..3).map(Value::Long).collect();
    let bytes = write(&Schema::Long, &records, "null", 1)?;
    let truncated = &bytes[..bytes.len() - 5];

    let mut reader = Reader::new(truncated)?;
    assert_eq!(reader.next().transpose()?, Some(Value::Long(0)));
    assert_eq!(reader.next().transpose()?, Some(Value::Long(1)));
    let err = reader.next().and_then(Result::err).map(|e| e.kind());
    assert_eq!(err, Some(ErrorKind::CorruptContainer));
    Ok(())
}

#[test]
fn not_a_container() {
    let err = Reader::new(&b"PAR1\x00\x00"[..]).err().map(|e| e.kind());
    assert_eq!(err, Some(ErrorKind::InvalidContainer));
}

#[test]
fn fail_safe_skips_bad_records() -> TestResult {
    let schema = Schema::parse_str(EVENT_SCHEMA)?;
    let mut records: Vec<Value> = (0..5)
        .map(|i| event(i, format!("event {i}"), None, Vec::new(), Vec::new()))
        .collect();
    records[2] = Value::record([("id", Value::String("three".into()))]);

    let options = WriteOptions {
        codec: "deflate".to_string(),
        fail_safe: true,
        ..Default::default()
    };
    let (bytes, summary) = ops::write_records(
        Vec::new(),
        &schema,
        &options,
        records.iter().cloned().map(Ok),
    )?;
    assert_eq!(summary.records_written, 4);
    assert_eq!(summary.errors.len(), 1);
    assert_eq!(summary.errors[0].index, 2);
    assert_eq!(summary.errors[0].error.kind(), ErrorKind::Encoding);

    let read = Reader::new(bytes.as_slice())?.collect::<AvroResult<Vec<_>>>()?;
    records.remove(2);
    assert_eq!(read, records);
    Ok(())
}

#[test]
fn without_fail_safe_the_first_bad_record_aborts() -> TestResult {
    let records = [Value::Long(1), Value::Null, Value::Long(3)];
    let err = ops::write_records(
        Vec::new(),
        &Schema::Long,
        &WriteOptions::default(),
        records.into_iter().map(Ok),
    )
    .err()
    .map(|e| e.kind());
    assert_eq!(err, Some(ErrorKind::Encoding));
    Ok(())
}

#[test]
fn recode_null_to_deflate_between_files() -> TestResult {
    let dir = tempfile::tempdir()?;
    let input = dir.path().join("in.avro");
    let output = dir.path().join("out.avro");
    let records: Vec<Value> = (0..500)
        .map(|i| event(i, "same name".into(), Some(0.5), vec!["t".into()], vec![0; 32]))
        .collect();

    let schema = Schema::parse_str(EVENT_SCHEMA)?;
    ops::write_file(
        &input,
        &schema,
        &WriteOptions::default(),
        records.iter().cloned().map(Ok),
    )?;
    let options = RecodeOptions {
        codec: Some("deflate".to_string()),
        ..Default::default()
    };
    let summary = ops::recode_file(&input, &output, &options)?;
    assert_eq!(summary.records_written, 500);

    let reader = ops::read_file(&output)?;
    assert_eq!(reader.codec(), "deflate");
    assert_eq!(reader.schema(), &schema);
    assert_eq!(reader.collect::<AvroResult<Vec<_>>>()?, records);
    assert!(std::fs::metadata(&output)?.len() < std::fs::metadata(&input)?.len());
    Ok(())
}

#[test]
fn custom_codec_needs_its_registry() -> TestResult {
    let mut registry = CodecRegistry::new();
    registry.register_fn(
        "reversed",
        |data: &[u8]| Ok(data.iter().rev().copied().collect()),
        |data: &[u8]| Ok(data.iter().rev().copied().collect()),
    );

    let mut writer = Writer::builder()
        .schema(&Schema::String)
        .writer(Vec::new())
        .codec("reversed")
        .registry(&registry)
        .build()?;
    writer.append_value("hello")?;
    let bytes = writer.into_inner()?;

    let err = Reader::new(bytes.as_slice()).err().map(|e| e.kind());
    assert_eq!(err, Some(ErrorKind::UnknownCodec));

    let reader = Reader::builder(bytes.as_slice())
        .registry(&registry)
        .build()?;
    assert_eq!(reader.codec(), "reversed");
    assert_eq!(
        reader.collect::<AvroResult<Vec<_>>>()?,
        vec![Value::from("hello")]
    );
    Ok(())
}

#[test]
fn concat_keeps_every_record() -> TestResult {
    let first: Vec<Value> = (0..10).map(Value::Long).collect();
    let second: Vec<Value> = (10..25).map(Value::Long).collect();
    let a = write(&Schema::Long, &first, "deflate", 16)?;
    let b = write(&Schema::Long, &second, "deflate", 16)?;

    let mut output = Vec::new();
    ops::concat([a.as_slice(), b.as_slice()], &mut output)?;

    let reader = Reader::new(output.as_slice())?;
    let marker = reader.sync_marker();
    assert_ne!(marker, Reader::new(a.as_slice())?.sync_marker());
    let read = reader.collect::<AvroResult<Vec<_>>>()?;
    assert_eq!(read, (0..25).map(Value::Long).collect::<Vec<_>>());
    Ok(())
}
