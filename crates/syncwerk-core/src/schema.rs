// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Model schemas and the association metadata the resolver walks.
//
// Schemas arrive from the app layer through `configureModelProvider` as
// serialized maps:
//
//   { "name": "Post",
//     "pluralName": "Posts",
//     "fields": {
//       "author": { "name": "author",
//                   "association": { "associationType": "BelongsTo",
//                                    "associatedType": "User",
//                                    "associatedName": "posts" } } } }

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::error::{Result, SyncwerkError};
use crate::traits::SchemaRegistry;

/// Relationship kind declared on a model field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssociationKind {
    /// This model holds the foreign key of a single parent.
    BelongsTo,
    /// This model owns a single child, referenced from this side.
    HasOne,
    /// This model owns many children. Never expanded eagerly.
    HasMany,
}

impl AssociationKind {
    /// Parse the wire name (`"BelongsTo"`, `"HasOne"`, `"HasMany"`).
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "BelongsTo" => Some(Self::BelongsTo),
            "HasOne" => Some(Self::HasOne),
            "HasMany" => Some(Self::HasMany),
            _ => None,
        }
    }

    /// Single-valued, foreign-key-style associations are resolved with the
    /// query; `HasMany` is left to the app layer.
    pub fn is_eager(self) -> bool {
        match self {
            Self::BelongsTo | Self::HasOne => true,
            Self::HasMany => false,
        }
    }
}

/// Association metadata for a single field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelAssociation {
    pub kind: AssociationKind,
    /// Model name of the associated type.
    pub associated_model: String,
    /// Field on the associated model pointing back, if declared.
    pub associated_name: Option<String>,
}

impl ModelAssociation {
    pub fn new(kind: AssociationKind, associated_model: impl Into<String>) -> Self {
        Self {
            kind,
            associated_model: associated_model.into(),
            associated_name: None,
        }
    }
}

/// Schema of a single model, reduced to what the bridge needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSchema {
    pub name: String,
    pub plural_name: Option<String>,
    /// Association metadata keyed by field name.
    pub associations: BTreeMap<String, ModelAssociation>,
}

impl ModelSchema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            plural_name: None,
            associations: BTreeMap::new(),
        }
    }

    /// Builder-style association declaration.
    pub fn with_association(
        mut self,
        field: impl Into<String>,
        kind: AssociationKind,
        associated_model: impl Into<String>,
    ) -> Self {
        self.associations
            .insert(field.into(), ModelAssociation::new(kind, associated_model));
        self
    }

    /// Parse a serialized schema map sent by the app layer.
    pub fn from_serialized(json: &Json) -> Result<Self> {
        let name = json
            .get("name")
            .and_then(Json::as_str)
            .ok_or_else(|| SyncwerkError::MalformedRequest("model schema has no name".into()))?;

        let mut schema = Self::new(name);
        schema.plural_name = json
            .get("pluralName")
            .and_then(Json::as_str)
            .map(str::to_string);

        let Some(fields) = json.get("fields") else {
            return Ok(schema);
        };
        let fields = fields.as_object().ok_or_else(|| {
            SyncwerkError::MalformedRequest(format!("fields of {name} are not a map"))
        })?;

        for (field_name, field) in fields {
            let Some(association) = field.get("association") else {
                continue;
            };
            let kind_name = association
                .get("associationType")
                .and_then(Json::as_str)
                .unwrap_or_default();
            let kind = AssociationKind::parse(kind_name).ok_or_else(|| {
                SyncwerkError::MalformedRequest(format!(
                    "{name}.{field_name}: unknown association type {kind_name:?}"
                ))
            })?;
            let associated_model = association
                .get("associatedType")
                .and_then(Json::as_str)
                .ok_or_else(|| {
                    SyncwerkError::MalformedRequest(format!(
                        "{name}.{field_name}: association has no associatedType"
                    ))
                })?;

            let mut meta = ModelAssociation::new(kind, associated_model);
            meta.associated_name = association
                .get("associatedName")
                .and_then(Json::as_str)
                .map(str::to_string);
            schema.associations.insert(field_name.clone(), meta);
        }

        Ok(schema)
    }
}

/// In-memory schema registry populated by `configureModelProvider`.
#[derive(Debug, Clone, Default)]
pub struct ModelProvider {
    version: Option<String>,
    schemas: HashMap<String, ModelSchema>,
}

impl ModelProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style registration, handy for tests and fixtures.
    pub fn with_schema(mut self, schema: ModelSchema) -> Self {
        self.add_model_schema(schema);
        self
    }

    pub fn add_model_schema(&mut self, schema: ModelSchema) {
        self.schemas.insert(schema.name.clone(), schema);
    }

    pub fn set_version(&mut self, version: impl Into<String>) {
        self.version = Some(version.into());
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    pub fn contains(&self, model_name: &str) -> bool {
        self.schemas.contains_key(model_name)
    }

    /// Registered model names, sorted.
    pub fn model_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.schemas.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Build a provider from a `configureModelProvider` request body.
    ///
    /// Requires `modelSchemas` (a list) and `modelProviderVersion`.
    pub fn from_configure_request(request: &Json) -> Result<Self> {
        let schemas = request.get("modelSchemas").and_then(Json::as_array);
        let version = request.get("modelProviderVersion").and_then(Json::as_str);
        let (Some(schemas), Some(version)) = (schemas, version) else {
            return Err(SyncwerkError::MalformedRequest(
                "modelSchemas and/or modelProviderVersion are not available".into(),
            ));
        };

        let mut provider = Self::new();
        for schema in schemas {
            provider.add_model_schema(ModelSchema::from_serialized(schema)?);
        }
        provider.set_version(version);
        Ok(provider)
    }
}

impl SchemaRegistry for ModelProvider {
    fn schema(&self, model_name: &str) -> Option<&ModelSchema> {
        self.schemas.get(model_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn configure_request() -> Json {
        json!({
            "modelProviderVersion": "4a1c",
            "modelSchemas": [
                {
                    "name": "Post",
                    "pluralName": "Posts",
                    "fields": {
                        "id": { "name": "id" },
                        "title": { "name": "title" },
                        "blog": {
                            "name": "blog",
                            "association": { "associationType": "BelongsTo", "associatedType": "Blog" }
                        },
                        "comments": {
                            "name": "comments",
                            "association": {
                                "associationType": "HasMany",
                                "associatedType": "Comment",
                                "associatedName": "post"
                            }
                        }
                    }
                },
                { "name": "Blog" }
            ]
        })
    }

    #[test]
    fn configure_request_registers_schemas_and_version() {
        let provider = ModelProvider::from_configure_request(&configure_request()).expect("parse");
        assert_eq!(provider.version(), Some("4a1c"));
        assert_eq!(provider.model_names(), vec!["Blog", "Post"]);

        let post = provider.schema("Post").expect("Post schema");
        assert_eq!(post.plural_name.as_deref(), Some("Posts"));
        assert_eq!(post.associations.len(), 2);
        assert_eq!(post.associations["blog"].kind, AssociationKind::BelongsTo);
        assert_eq!(post.associations["blog"].associated_model, "Blog");
        assert_eq!(
            post.associations["comments"].associated_name.as_deref(),
            Some("post")
        );
    }

    #[test]
    fn missing_version_is_malformed() {
        let err = ModelProvider::from_configure_request(&json!({ "modelSchemas": [] })).unwrap_err();
        assert!(matches!(err, SyncwerkError::MalformedRequest(_)));
    }

    #[test]
    fn non_list_schemas_are_malformed() {
        let request = json!({ "modelSchemas": {}, "modelProviderVersion": "1" });
        assert!(ModelProvider::from_configure_request(&request).is_err());
    }

    #[test]
    fn unknown_association_type_is_rejected() {
        let schema = json!({
            "name": "Post",
            "fields": { "tags": { "association": { "associationType": "ManyToMany", "associatedType": "Tag" } } }
        });
        assert!(ModelSchema::from_serialized(&schema).is_err());
    }

    #[test]
    fn only_single_valued_kinds_are_eager() {
        assert!(AssociationKind::BelongsTo.is_eager());
        assert!(AssociationKind::HasOne.is_eager());
        assert!(!AssociationKind::HasMany.is_eager());
    }

    #[test]
    fn registry_lookup_for_unknown_model_is_none() {
        let provider = ModelProvider::new().with_schema(ModelSchema::new("Post"));
        assert!(provider.associations_for("User").is_none());
        assert!(provider.associations_for("Post").is_some_and(|a| a.is_empty()));
    }
}
