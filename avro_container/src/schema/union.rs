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
    error::Details,
    schema::{Name, Schema, SchemaKind},
};
use std::collections::HashSet;

/// A description of a Union schema
#[derive(Debug, Clone, PartialEq)]
pub struct UnionSchema {
    /// The schemas that make up this union
    pub(crate) schemas: Vec<Schema>,
}

impl UnionSchema {
    /// Creates a new UnionSchema from a vector of schemas.
    ///
    /// # Errors
    /// Will return an error if `schemas` has duplicate unnamed schemas, two named schemas with the
    /// same fullname, or if `schemas` contains a union.
    pub fn new(schemas: Vec<Schema>) -> AvroResult<Self> {
        let mut unnamed: HashSet<SchemaKind> = HashSet::new();
        let mut named: HashSet<&Name> = HashSet::new();
        for schema in &schemas {
            let schema = schema.unannotated();
            if let Schema::Union(_) = schema {
                return Err(Details::GetNestedUnion.into());
            }
            match schema.name() {
                Some(name) => {
                    if !named.insert(name) {
                        return Err(Details::GetUnionDuplicate(name.fullname()).into());
                    }
                }
                None => {
                    let kind = SchemaKind::from(schema);
                    if !unnamed.insert(kind) {
                        return Err(Details::GetUnionDuplicate(format!("{kind:?}")).into());
                    }
                }
            }
        }
        Ok(UnionSchema { schemas })
    }

    /// Returns a slice to all variants of this schema.
    pub fn variants(&self) -> &[Schema] {
        &self.schemas
    }
}
