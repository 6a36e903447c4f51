use crate::errors::{StoreError, StoreResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Cardinality {
    One,
    Many,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Relationship {
    pub target: String,
    pub cardinality: Cardinality,
}

/// Describes one kind of resource: its views, its identity schemes and the
/// directory it lives under.
///
/// ```ignore
/// let item = ResourceType::new("Item")
///     .view("default", ["name", "price"])
///     .identify("flat_db", ["id"]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceType {
    name: String,
    base_path: Vec<String>,
    views: BTreeMap<String, Vec<String>>,
    identity_schemes: BTreeMap<String, Vec<String>>,
    relationships: BTreeMap<String, Relationship>,
}

impl ResourceType {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            base_path: vec![name.to_ascii_lowercase()],
            name,
            views: BTreeMap::new(),
            identity_schemes: BTreeMap::new(),
            relationships: BTreeMap::new(),
        }
    }

    pub fn view<I, S>(mut self, name: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.views
            .insert(name.into(), fields.into_iter().map(Into::into).collect());
        self
    }

    pub fn identify<I, S>(mut self, scheme: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.identity_schemes
            .insert(scheme.into(), fields.into_iter().map(Into::into).collect());
        self
    }

    /// Overrides the literal directory segments the type is stored under.
    pub fn base_path<I, S>(mut self, segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.base_path = segments.into_iter().map(Into::into).collect();
        self
    }

    pub fn relationship(
        mut self,
        field: impl Into<String>,
        target: impl Into<String>,
        cardinality: Cardinality,
    ) -> Self {
        self.relationships.insert(
            field.into(),
            Relationship {
                target: target.into(),
                cardinality,
            },
        );
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn base_segments(&self) -> &[String] {
        &self.base_path
    }

    pub fn views(&self) -> &BTreeMap<String, Vec<String>> {
        &self.views
    }

    pub fn identity_schemes(&self) -> &BTreeMap<String, Vec<String>> {
        &self.identity_schemes
    }

    pub fn relationships(&self) -> &BTreeMap<String, Relationship> {
        &self.relationships
    }

    pub fn has_view(&self, view: &str) -> bool {
        self.views.contains_key(view)
    }

    pub fn view_fields(&self, view: &str) -> StoreResult<&[String]> {
        self.views.get(view).map(Vec::as_slice).ok_or_else(|| {
            StoreError::UnknownView(format!("type '{}' has no view '{}'", self.name, view))
        })
    }

    pub fn scheme_fields(&self, scheme: &str) -> StoreResult<&[String]> {
        self.identity_schemes
            .get(scheme)
            .map(Vec::as_slice)
            .ok_or_else(|| {
                StoreError::UnknownScheme(format!(
                    "type '{}' has no identity scheme '{}'",
                    self.name, scheme
                ))
            })
    }

    pub fn relationship_for(&self, field: &str) -> Option<&Relationship> {
        self.relationships.get(field)
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// A concrete record that can be stored by a `Db`.
pub trait Resource {
    fn resource_type(&self) -> Arc<ResourceType>;

    /// Value of a plain field. Relationship fields are answered by `related`.
    fn field(&self, name: &str) -> Option<Value>;

    fn related(&self, _name: &str) -> Vec<&dyn Resource> {
        Vec::new()
    }
}

/// A resource held as a loose field map.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    kind: Arc<ResourceType>,
    fields: Map<String, Value>,
}

impl Record {
    pub fn new(kind: Arc<ResourceType>) -> Self {
        Self {
            kind,
            fields: Map::new(),
        }
    }

    pub fn with_fields(kind: Arc<ResourceType>, fields: Map<String, Value>) -> Self {
        Self { kind, fields }
    }

    pub fn set(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }
}

impl Resource for Record {
    fn resource_type(&self) -> Arc<ResourceType> {
        Arc::clone(&self.kind)
    }

    fn field(&self, name: &str) -> Option<Value> {
        self.fields.get(name).cloned()
    }
}
