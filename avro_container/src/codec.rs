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

//! Block compression codecs and the registry that resolves them by name.
//!
//! Every block of a container is compressed as a whole with the codec named in the header's
//! `avro.codec` entry. The built-in codecs are variants of [`Codec`]; any other implementation of
//! [`BlockCodec`] can be added to a [`CodecRegistry`] under a new name.

use crate::{
    AvroResult,
    error::Details,
    util::{DEFAULT_MAX_ALLOCATION_BYTES, max_allocation_bytes, safe_len},
};
use std::{
    collections::BTreeMap,
    fmt,
    sync::{Arc, OnceLock},
};
use strum::IntoEnumIterator;
use strum_macros::{EnumIter, EnumString, IntoStaticStr};

/// A compressor/decompressor pair working on whole blocks.
pub trait BlockCodec: Send + Sync {
    /// Compress the uncompressed payload of a block.
    fn compress(&self, input: &[u8]) -> AvroResult<Vec<u8>>;

    /// Restore the uncompressed payload of a block.
    fn decompress(&self, input: &[u8]) -> AvroResult<Vec<u8>>;
}

/// Settings for the `Deflate` codec.
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub struct DeflateSettings {
    compression_level: miniz_oxide::deflate::CompressionLevel,
}

impl DeflateSettings {
    pub fn new(compression_level: miniz_oxide::deflate::CompressionLevel) -> Self {
        DeflateSettings { compression_level }
    }

    fn compression_level(&self) -> u8 {
        self.compression_level as u8
    }
}

impl Default for DeflateSettings {
    /// Default compression level is `miniz_oxide::deflate::CompressionLevel::DefaultCompression`.
    fn default() -> Self {
        Self::new(miniz_oxide::deflate::CompressionLevel::DefaultCompression)
    }
}

/// The built-in compression codecs.
#[derive(Clone, Copy, Debug, Eq, PartialEq, EnumIter, EnumString, IntoStaticStr)]
#[strum(serialize_all = "kebab_case")]
pub enum Codec {
    /// The `Null` codec simply passes through data uncompressed.
    Null,
    /// The `Deflate` codec writes the data block using the deflate algorithm
    /// as specified in RFC 1951, and typically implemented using the zlib library.
    /// Note that this format (unlike the "zlib format" in RFC 1950) does not have a checksum.
    Deflate(DeflateSettings),
    #[cfg(feature = "snappy")]
    /// The `Snappy` codec uses Google's [Snappy](http://google.github.io/snappy/)
    /// compression library. Each compressed block is followed by the 4-byte, big-endian
    /// CRC32 checksum of the uncompressed data in the block.
    Snappy,
    #[cfg(feature = "zstandard")]
    /// The `Zstandard` codec uses Facebook's [Zstandard](https://facebook.github.io/zstd/)
    Zstandard(zstandard::ZstandardSettings),
    #[cfg(feature = "bzip")]
    /// The `BZip2` codec uses [BZip2](https://sourceware.org/bzip2/)
    /// compression library.
    Bzip2(bzip::Bzip2Settings),
    #[cfg(feature = "xz")]
    /// The `Xz` codec uses [Xz utils](https://tukaani.org/xz/)
    /// compression library.
    Xz(xz::XzSettings),
}

impl Codec {
    /// The name this codec is stored under in `avro.codec`.
    pub fn name(self) -> &'static str {
        self.into()
    }

    fn compress_error(self, reason: impl fmt::Display) -> crate::Error {
        Details::Compress {
            codec: self.name().to_string(),
            reason: reason.to_string(),
        }
        .into()
    }

    fn decompress_error(self, reason: impl fmt::Display) -> crate::Error {
        Details::Decompress {
            codec: self.name().to_string(),
            reason: reason.to_string(),
        }
        .into()
    }

    /// Drains a decompressing reader, refusing to grow past the allocation limit.
    #[cfg(any(feature = "zstandard", feature = "bzip", feature = "xz"))]
    fn read_limited(self, reader: impl std::io::Read) -> AvroResult<Vec<u8>> {
        use std::io::Read;

        let limit = max_allocation_bytes(DEFAULT_MAX_ALLOCATION_BYTES);
        let mut decoded = Vec::new();
        reader
            .take(limit as u64 + 1)
            .read_to_end(&mut decoded)
            .map_err(|e| self.decompress_error(e))?;
        safe_len(decoded.len())?;
        Ok(decoded)
    }
}

impl BlockCodec for Codec {
    fn compress(&self, input: &[u8]) -> AvroResult<Vec<u8>> {
        let codec = *self;
        match codec {
            Codec::Null => Ok(input.to_vec()),
            Codec::Deflate(settings) => Ok(miniz_oxide::deflate::compress_to_vec(
                input,
                settings.compression_level(),
            )),
            #[cfg(feature = "snappy")]
            Codec::Snappy => {
                let mut encoded: Vec<u8> = vec![0; snap::raw::max_compress_len(input.len())];
                let compressed_size = snap::raw::Encoder::new()
                    .compress(input, &mut encoded[..])
                    .map_err(|e| codec.compress_error(e))?;

                let checksum = crc32fast::hash(input).to_be_bytes();
                encoded.truncate(compressed_size);
                encoded.extend_from_slice(&checksum);
                Ok(encoded)
            }
            #[cfg(feature = "zstandard")]
            Codec::Zstandard(settings) => {
                zstd::stream::encode_all(input, i32::from(settings.compression_level))
                    .map_err(|e| codec.compress_error(e))
            }
            #[cfg(feature = "bzip")]
            Codec::Bzip2(settings) => {
                use std::io::Read;

                let mut encoder = bzip2::read::BzEncoder::new(input, settings.compression());
                let mut buffer = Vec::new();
                encoder
                    .read_to_end(&mut buffer)
                    .map_err(|e| codec.compress_error(e))?;
                Ok(buffer)
            }
            #[cfg(feature = "xz")]
            Codec::Xz(settings) => {
                use std::io::Read;

                let mut encoder =
                    xz2::read::XzEncoder::new(input, u32::from(settings.compression_level));
                let mut buffer = Vec::new();
                encoder
                    .read_to_end(&mut buffer)
                    .map_err(|e| codec.compress_error(e))?;
                Ok(buffer)
            }
        }
    }

    fn decompress(&self, input: &[u8]) -> AvroResult<Vec<u8>> {
        let codec = *self;
        match codec {
            Codec::Null => Ok(input.to_vec()),
            Codec::Deflate(_settings) => miniz_oxide::inflate::decompress_to_vec_with_limit(
                input,
                max_allocation_bytes(DEFAULT_MAX_ALLOCATION_BYTES),
            )
            .map_err(|e| codec.decompress_error(format_args!("{:?}", e.status))),
            #[cfg(feature = "snappy")]
            Codec::Snappy => {
                let Some(split) = input.len().checked_sub(4) else {
                    return Err(codec.decompress_error("block shorter than its CRC32 checksum"));
                };
                let (compressed, checksum) = input.split_at(split);
                let decompressed_size = snap::raw::decompress_len(compressed)
                    .map_err(|e| codec.decompress_error(e))?;
                let mut decoded = vec![0; safe_len(decompressed_size)?];
                snap::raw::Decoder::new()
                    .decompress(compressed, &mut decoded[..])
                    .map_err(|e| codec.decompress_error(e))?;

                let mut last_four: [u8; 4] = [0; 4];
                last_four.copy_from_slice(checksum);
                let expected: u32 = u32::from_be_bytes(last_four);
                let actual = crc32fast::hash(&decoded);

                if expected != actual {
                    return Err(codec.decompress_error(format_args!(
                        "bad CRC32 checksum, expected {expected:x} but got {actual:x}"
                    )));
                }
                Ok(decoded)
            }
            #[cfg(feature = "zstandard")]
            Codec::Zstandard(_settings) => {
                let decoder =
                    zstd::stream::read::Decoder::new(input).map_err(|e| codec.decompress_error(e))?;
                codec.read_limited(decoder)
            }
            #[cfg(feature = "bzip")]
            Codec::Bzip2(_) => codec.read_limited(bzip2::read::BzDecoder::new(input)),
            #[cfg(feature = "xz")]
            Codec::Xz(_) => codec.read_limited(xz2::read::XzDecoder::new(input)),
        }
    }
}

#[cfg(feature = "bzip")]
pub mod bzip {
    use bzip2::Compression;

    #[derive(Clone, Copy, Eq, PartialEq, Debug)]
    pub struct Bzip2Settings {
        pub compression_level: u8,
    }

    impl Bzip2Settings {
        pub fn new(compression_level: u8) -> Self {
            Self { compression_level }
        }

        pub(crate) fn compression(&self) -> Compression {
            Compression::new(u32::from(self.compression_level))
        }
    }

    impl Default for Bzip2Settings {
        fn default() -> Self {
            Bzip2Settings::new(Compression::best().level() as u8)
        }
    }
}

#[cfg(feature = "zstandard")]
pub mod zstandard {
    #[derive(Clone, Copy, Eq, PartialEq, Debug)]
    pub struct ZstandardSettings {
        pub compression_level: u8,
    }

    impl ZstandardSettings {
        pub fn new(compression_level: u8) -> Self {
            Self { compression_level }
        }
    }

    impl Default for ZstandardSettings {
        /// Level 0 lets zstd pick its own default.
        fn default() -> Self {
            Self::new(0)
        }
    }
}

#[cfg(feature = "xz")]
pub mod xz {
    #[derive(Clone, Copy, Eq, PartialEq, Debug)]
    pub struct XzSettings {
        pub compression_level: u8,
    }

    impl XzSettings {
        pub fn new(compression_level: u8) -> Self {
            Self { compression_level }
        }
    }

    impl Default for XzSettings {
        fn default() -> Self {
            XzSettings::new(9)
        }
    }
}

/// A [`BlockCodec`] made of two closures.
struct FnCodec<C, D> {
    compress: C,
    decompress: D,
}

impl<C, D> BlockCodec for FnCodec<C, D>
where
    C: Fn(&[u8]) -> AvroResult<Vec<u8>> + Send + Sync,
    D: Fn(&[u8]) -> AvroResult<Vec<u8>> + Send + Sync,
{
    fn compress(&self, input: &[u8]) -> AvroResult<Vec<u8>> {
        (self.compress)(input)
    }

    fn decompress(&self, input: &[u8]) -> AvroResult<Vec<u8>> {
        (self.decompress)(input)
    }
}

/// Maps codec names to their implementation.
///
/// The `null` codec is always present. Readers and writers resolve the codec name of a container
/// through a registry, so a name the registry does not know is rejected before any block is
/// read or written.
#[derive(Clone)]
pub struct CodecRegistry {
    codecs: BTreeMap<String, Arc<dyn BlockCodec>>,
}

impl CodecRegistry {
    /// A registry holding only the `null` codec.
    pub fn new() -> Self {
        let mut registry = Self {
            codecs: BTreeMap::new(),
        };
        registry.register(Codec::Null.name(), Codec::Null);
        registry
    }

    /// A registry holding every codec compiled into this crate, with default settings.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        for codec in Codec::iter() {
            registry.register(codec.name(), codec);
        }
        registry
    }

    /// The process-wide registry of built-in codecs.
    pub fn builtin() -> &'static CodecRegistry {
        static BUILTIN: OnceLock<CodecRegistry> = OnceLock::new();
        BUILTIN.get_or_init(CodecRegistry::with_builtin)
    }

    /// Add `codec` under `name`, replacing any codec previously registered with that name.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        codec: impl BlockCodec + 'static,
    ) -> &mut Self {
        self.codecs.insert(name.into(), Arc::new(codec));
        self
    }

    /// Add a codec given as a pair of functions.
    pub fn register_fn<C, D>(
        &mut self,
        name: impl Into<String>,
        compress: C,
        decompress: D,
    ) -> &mut Self
    where
        C: Fn(&[u8]) -> AvroResult<Vec<u8>> + Send + Sync + 'static,
        D: Fn(&[u8]) -> AvroResult<Vec<u8>> + Send + Sync + 'static,
    {
        self.register(
            name,
            FnCodec {
                compress,
                decompress,
            },
        )
    }

    /// Look up the codec registered under `name`.
    pub fn get(&self, name: &str) -> AvroResult<Arc<dyn BlockCodec>> {
        self.codecs
            .get(name)
            .cloned()
            .ok_or_else(|| Details::UnknownCodec(name.to_string()).into())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.codecs.contains_key(name)
    }

    /// The registered codec names, sorted.
    pub fn names(&self) -> Vec<&str> {
        self.codecs.keys().map(String::as_str).collect()
    }
}

impl fmt::Debug for CodecRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.codecs.keys()).finish()
    }
}
