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

//! Streaming reader, writer and codec engine for **[Apache Avro](https://avro.apache.org/)**
//! Object Container Files.
//!
//! A container file starts with a header (the magic `Obj\x01`, a metadata map holding the schema
//! and the codec name, and a random 16-byte sync marker) followed by blocks of records. Every
//! block is compressed on its own by the codec named in the header and ends with the sync marker.
//!
//! Records are handled through the generic [`Value`](types::Value) type:
//!
//! ```
//! use avro_container::{Reader, Schema, Writer, types::Value};
//!
//! # fn main() -> avro_container::AvroResult<()> {
//! let schema = Schema::parse_str(r#"
//!     {"type": "record", "name": "user", "fields": [
//!         {"name": "id", "type": "long"},
//!         {"name": "email", "type": ["null", "string"], "default": null}
//!     ]}
//! "#)?;
//!
//! let mut writer = Writer::with_codec(&schema, Vec::new(), "deflate")?;
//! writer.append_value(Value::record([("id", Value::Long(1))]))?;
//! let bytes = writer.into_inner()?;
//!
//! let reader = Reader::new(bytes.as_slice())?;
//! assert_eq!(reader.codec(), "deflate");
//! for record in reader {
//!     println!("{:?}", record?);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! The [`ops`] module builds the file level operations (JSON and text import/export, recoding,
//! concatenation) on top of [`Reader`] and [`Writer`].
//!
//! # Features
//!
//! The `null` and `deflate` codecs are always available.
//!
//! - `snappy` (default): enable support for the Snappy codec
//! - `zstandard`: enable support for the Zstandard codec
//! - `bzip`: enable support for the Bzip2 codec
//! - `xz`: enable support for the Xz codec
//!
//! # MSRV
//!
//! The current MSRV is 1.88.0.

mod codec;
mod decode;
mod encode;
mod reader;
mod writer;

pub mod error;
pub mod json;
pub mod ops;
pub mod schema;
pub mod text;
pub mod types;
pub mod util;

#[cfg(feature = "bzip")]
pub use codec::bzip::Bzip2Settings;
#[cfg(feature = "xz")]
pub use codec::xz::XzSettings;
#[cfg(feature = "zstandard")]
pub use codec::zstandard::ZstandardSettings;
pub use codec::{BlockCodec, Codec, CodecRegistry, DeflateSettings};
pub use decode::decode;
pub use encode::{encode, encode_to_vec};
pub use error::{Error, ErrorKind};
pub use reader::{RawBlock, RawBlocks, Reader, from_avro_datum};
pub use schema::Schema;
pub use writer::{
    DEFAULT_SYNC_INTERVAL, RecordError, WriteSummary, Writer, WriterBuilder, to_avro_datum,
};

/// A convenience type alias for `Result`s with `Error`s.
pub type AvroResult<T> = Result<T, Error>;

#[cfg(test)]
pub(crate) type TestResult = anyhow::Result<()>;
