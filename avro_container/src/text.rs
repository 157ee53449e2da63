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

//! Raw text lines as Avro `bytes` records.
use crate::{AvroResult, error::Details, schema::Schema, types::Value};
use std::io::BufRead;

/// The schema of a file imported from text: every record is one line.
pub fn text_schema() -> Schema {
    Schema::Bytes
}

/// Iterator over the lines of `reader` as [`Value::Bytes`], each including its line terminator.
///
/// No decoding is done, so any byte sequence is accepted. The last line may lack a terminator.
pub struct TextLines<R> {
    reader: R,
    line_number: usize,
    errored: bool,
}

impl<R: BufRead> TextLines<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line_number: 0,
            errored: false,
        }
    }
}

impl<R: BufRead> Iterator for TextLines<R> {
    type Item = AvroResult<Value>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.errored {
            return None;
        }
        self.line_number += 1;
        let mut line = Vec::new();
        match self.reader.read_until(b'\n', &mut line) {
            Ok(0) => None,
            Ok(_) => Some(Ok(Value::Bytes(line))),
            Err(source) => {
                self.errored = true;
                Some(Err(Details::ReadLine {
                    line: self.line_number,
                    source,
                }
                .into()))
            }
        }
    }
}

/// The bytes to export for a record of a text file.
pub fn value_bytes(value: &Value) -> AvroResult<&[u8]> {
    match value.unwrap_union() {
        Value::Bytes(bytes) => Ok(bytes),
        other => Err(Details::TextRecordNotBytes(other.into()).into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{TestResult, error::ErrorKind};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_lines_keep_terminators() -> TestResult {
        let input: &[u8] = b"one\r\ntwo\n\nlast";
        let lines = TextLines::new(input).collect::<AvroResult<Vec<_>>>()?;
        assert_eq!(
            lines,
            vec![
                Value::Bytes(b"one\r\n".to_vec()),
                Value::Bytes(b"two\n".to_vec()),
                Value::Bytes(b"\n".to_vec()),
                Value::Bytes(b"last".to_vec()),
            ]
        );
        Ok(())
    }

    #[test]
    fn test_lines_are_not_decoded() -> TestResult {
        let input: &[u8] = &[0xFF, 0xFE, b'\n'];
        let lines = TextLines::new(input).collect::<AvroResult<Vec<_>>>()?;
        assert_eq!(lines, vec![Value::Bytes(vec![0xFF, 0xFE, b'\n'])]);
        Ok(())
    }

    #[test]
    fn test_value_bytes() -> TestResult {
        assert_eq!(value_bytes(&Value::Bytes(b"x\n".to_vec()))?, b"x\n");
        let err = value_bytes(&Value::Long(1)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Encoding);
        Ok(())
    }
}
