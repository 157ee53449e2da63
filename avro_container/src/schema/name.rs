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

use crate::{AvroResult, error::Details};
use regex_lite::Regex;
use std::{
    fmt::{self, Debug, Formatter},
    sync::OnceLock,
};

const NAME_PATTERN: &str = r"^[A-Za-z_][A-Za-z0-9_]*$";
const NAMESPACE_PATTERN: &str = r"^([A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)*)?$";

fn name_regex() -> &'static Regex {
    static NAME_ONCE: OnceLock<Regex> = OnceLock::new();
    NAME_ONCE.get_or_init(|| Regex::new(NAME_PATTERN).expect("Regex is valid"))
}

fn namespace_regex() -> &'static Regex {
    static NAMESPACE_ONCE: OnceLock<Regex> = OnceLock::new();
    NAMESPACE_ONCE.get_or_init(|| Regex::new(NAMESPACE_PATTERN).expect("Regex is valid"))
}

/// Whether `name` is a valid simple name: field names, enum symbols and the last part of a
/// fullname all follow this grammar.
pub(crate) fn is_valid_simple_name(name: &str) -> bool {
    name_regex().is_match(name)
}

/// The fully qualified name of a `record`, `enum` or `fixed` schema.
///
/// Names are qualified once, while parsing, so two `Name`s compare equal exactly when they
/// denote the same named type.
///
/// More information about schema names can be found in the
/// [Avro specification](https://avro.apache.org/docs/++version++/specification/#names)
#[derive(Clone, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct Name {
    name: String,
    namespace: Option<String>,
}

impl Name {
    /// Create a new `Name`, splitting a dotted fullname into namespace and name.
    pub fn new(fullname: &str) -> AvroResult<Self> {
        Self::with_enclosing_namespace(fullname, None)
    }

    /// Create a new `Name`, falling back to `enclosing_namespace` when `name` has no dots.
    ///
    /// An empty namespace is the null namespace.
    pub fn with_enclosing_namespace(
        name: &str,
        enclosing_namespace: Option<&str>,
    ) -> AvroResult<Self> {
        let (namespace, name) = match name.rsplit_once('.') {
            Some((namespace, name)) => (Some(namespace), name),
            None => (enclosing_namespace, name),
        };

        if !is_valid_simple_name(name) {
            return Err(Details::InvalidSchemaName(name.to_string(), NAME_PATTERN).into());
        }
        let namespace = match namespace {
            Some("") | None => None,
            Some(namespace) if namespace_regex().is_match(namespace) => Some(namespace.to_string()),
            Some(namespace) => {
                return Err(
                    Details::InvalidNamespace(namespace.to_string(), NAMESPACE_PATTERN).into(),
                );
            }
        };
        Ok(Self {
            name: name.to_string(),
            namespace,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// Return the `fullname` of this `Name`.
    pub fn fullname(&self) -> String {
        match &self.namespace {
            Some(namespace) => format!("{namespace}.{}", self.name),
            None => self.name.clone(),
        }
    }
}

impl Debug for Name {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Name({})", self.fullname())
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if let Some(namespace) = &self.namespace {
            write!(f, "{namespace}.")?;
        }
        f.write_str(&self.name)
    }
}
