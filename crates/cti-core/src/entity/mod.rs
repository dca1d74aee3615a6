//! Entity types and instances (spec §3 DATA MODEL, §4.4).

pub mod docs;

use std::cell::OnceCell;

use indexmap::IndexMap;
use serde_json::Value;

pub use docs::{EntityInstanceDoc, EntityTypeDoc, PackageIndex};

use crate::error::ParseFailure;
use crate::identifier::{Expression, Parser};
use crate::schema::{AccessLevel, CtiAnnotations, Schema};

/// A type declaration: a CTI, an optional parent CTI, and the schema this
/// entity contributes on top of whatever it inherits (spec §4.4).
///
/// `merged_schema` is populated lazily by [`crate::registry::Registry`] the
/// first time it is asked for — the merge is a pure function of the whole
/// ancestry chain, so once computed it never changes (spec §5: "lazy,
/// idempotent memoization").
#[derive(Debug)]
pub struct EntityType {
  pub cti: String,
  pub parent_cti: Option<String>,
  pub schema: Schema,
  pub description: Option<String>,
  /// `display_name` (spec §3): a human-facing label distinct from the
  /// identifier itself.
  pub display_name: Option<String>,
  /// `annotations: map[path -> Annotations]` (spec §3): a second, path-keyed
  /// channel for `cti.*` annotations alongside the ones embedded inline in
  /// the schema tree, consulted by the registry's chain lookups.
  pub annotations: IndexMap<String, CtiAnnotations>,
  expression: OnceCell<Expression>,
  merged_schema: OnceCell<Schema>,
}

impl EntityType {
  #[must_use]
  pub fn new(cti: String, parent_cti: Option<String>, schema: Schema) -> Self {
    Self {
      cti,
      parent_cti,
      schema,
      description: None,
      display_name: None,
      annotations: IndexMap::new(),
      expression: OnceCell::new(),
      merged_schema: OnceCell::new(),
    }
  }

  pub fn expression(&self) -> Result<&Expression, ParseFailure> {
    if let Some(expr) = self.expression.get() {
      return Ok(expr);
    }
    let expr = Parser::new().parse_identifier(&self.cti)?;
    Ok(self.expression.get_or_init(|| expr))
  }

  #[must_use]
  pub fn merged_schema(&self) -> Option<&Schema> {
    self.merged_schema.get()
  }

  /// Stores a merged schema computed by the registry. A no-op if it was
  /// already set (idempotent memoization: whoever gets there first wins,
  /// and both racers would have computed the same value anyway).
  pub fn set_merged_schema(&self, schema: Schema) -> &Schema {
    let _ = self.merged_schema.set(schema);
    self.merged_schema.get().expect("just set")
  }
}

impl From<EntityTypeDoc> for EntityType {
  fn from(doc: EntityTypeDoc) -> Self {
    let mut schema: Schema = doc.schema.into();
    // Doc-level `final`/`access`/`traits_schema`/`traits` (spec §6.2) share
    // the same `cti.*` annotation model as the inline schema keywords; a
    // value set inline always wins, the doc-level field only fills a hole.
    if schema.cti.is_final.is_none() {
      schema.cti.is_final = doc.is_final;
    }
    if schema.cti.access.is_none() {
      schema.cti.access = doc.access.as_deref().and_then(docs::parse_access_level);
    }
    if schema.cti.traits.is_empty() {
      schema.cti.traits = doc.traits.unwrap_or_default();
    }
    if let Some(traits_schema) = doc.traits_schema {
      schema.cti.extra.entry("traits_schema".to_string()).or_insert(crate::schema::AnnotationValue::Str(traits_schema));
    }

    let mut entity = Self::new(doc.cti, doc.parent, schema);
    entity.description = doc.description;
    entity.display_name = doc.display_name;
    entity.annotations = docs::annotations_from_doc(&doc.annotations);
    entity
  }
}

/// An instance declaration: a concrete value conforming to its parent
/// type's merged schema (spec §4.4).
#[derive(Debug)]
pub struct EntityInstance {
  pub cti: String,
  pub parent_cti: String,
  pub value: Value,
  pub is_final: bool,
  pub access: AccessLevel,
  pub display_name: Option<String>,
  pub description: Option<String>,
  pub annotations: IndexMap<String, CtiAnnotations>,
  expression: OnceCell<Expression>,
}

impl EntityInstance {
  #[must_use]
  pub fn new(cti: String, parent_cti: String, value: Value) -> Self {
    Self {
      cti,
      parent_cti,
      value,
      is_final: true,
      access: AccessLevel::default(),
      display_name: None,
      description: None,
      annotations: IndexMap::new(),
      expression: OnceCell::new(),
    }
  }

  pub fn expression(&self) -> Result<&Expression, ParseFailure> {
    if let Some(expr) = self.expression.get() {
      return Ok(expr);
    }
    let expr = Parser::new().parse_identifier(&self.cti)?;
    Ok(self.expression.get_or_init(|| expr))
  }
}

impl From<EntityInstanceDoc> for EntityInstance {
  fn from(doc: EntityInstanceDoc) -> Self {
    let mut entity = Self::new(doc.cti, doc.parent, doc.value);
    entity.is_final = doc.is_final.unwrap_or(true);
    entity.access = doc.access.as_deref().and_then(docs::parse_access_level).unwrap_or_default();
    entity.display_name = doc.display_name;
    entity.description = doc.description;
    entity.annotations = docs::annotations_from_doc(&doc.annotations);
    entity
  }
}

/// Either shape an entry in the registry can take (spec §3: "Entity").
#[derive(Debug)]
pub enum Entity {
  Type(EntityType),
  Instance(EntityInstance),
}

impl Entity {
  #[must_use]
  pub fn cti(&self) -> &str {
    match self {
      Self::Type(t) => &t.cti,
      Self::Instance(i) => &i.cti,
    }
  }

  #[must_use]
  pub fn parent_cti(&self) -> Option<&str> {
    match self {
      Self::Type(t) => t.parent_cti.as_deref(),
      Self::Instance(i) => Some(&i.parent_cti),
    }
  }

  #[must_use]
  pub fn as_type(&self) -> Option<&EntityType> {
    match self {
      Self::Type(t) => Some(t),
      Self::Instance(_) => None,
    }
  }

  #[must_use]
  pub fn as_instance(&self) -> Option<&EntityInstance> {
    match self {
      Self::Instance(i) => Some(i),
      Self::Type(_) => None,
    }
  }

  #[must_use]
  pub fn is_type(&self) -> bool {
    matches!(self, Self::Type(_))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::schema::SchemaType;

  #[test]
  fn entity_type_merged_schema_is_idempotent() {
    let mut schema = Schema::new();
    schema.types = vec![SchemaType::Object];
    let entity = EntityType::new("cti.acme.evt.event.v1.0".to_string(), None, schema);

    let mut computed = Schema::new();
    computed.title = Some("first".to_string());
    let first = entity.set_merged_schema(computed).clone();

    let mut second_attempt = Schema::new();
    second_attempt.title = Some("second".to_string());
    let second = entity.set_merged_schema(second_attempt);

    assert_eq!(first.title, second.title);
  }

  #[test]
  fn entity_cti_accessor_covers_both_variants() {
    let ty = Entity::Type(EntityType::new("cti.acme.evt.event.v1.0".to_string(), None, Schema::new()));
    let inst = Entity::Instance(EntityInstance::new(
      "cti.acme.evt.event_instance.v1.0~abcd".to_string(),
      "cti.acme.evt.event.v1.0".to_string(),
      serde_json::json!({}),
    ));
    assert_eq!(ty.cti(), "cti.acme.evt.event.v1.0");
    assert_eq!(inst.parent_cti(), Some("cti.acme.evt.event.v1.0"));
    assert!(ty.is_type());
    assert!(!inst.is_type());
  }

  #[test]
  fn type_doc_metadata_fields_fill_holes_in_the_schema_and_thread_through() {
    let doc: EntityTypeDoc = serde_json::from_value(serde_json::json!({
      "cti": "cti.acme.evt.event.v1.0",
      "schema": {"type": "object"},
      "final": true,
      "access": "private",
      "display_name": "Event",
      "description": "An event.",
      "traits_schema": "cti.acme.evt.event_traits.v1.0",
      "traits": ["cti.acme.trait.retryable.v1.0"],
      "annotations": {"data.amount": {"cti.reference": "cti.acme.evt.currency.v1"}},
    }))
    .unwrap();

    let ty = EntityType::from(doc);
    assert_eq!(ty.schema.cti.is_final, Some(true));
    assert_eq!(ty.schema.cti.access, Some(crate::schema::AccessLevel::Private));
    assert_eq!(ty.schema.cti.traits, vec!["cti.acme.trait.retryable.v1.0".to_string()]);
    assert_eq!(ty.display_name.as_deref(), Some("Event"));
    assert_eq!(ty.description.as_deref(), Some("An event."));
    assert_eq!(ty.annotations["data.amount"].reference.as_deref(), Some("cti.acme.evt.currency.v1"));
  }

  #[test]
  fn inline_schema_annotation_wins_over_doc_level_field() {
    let doc: EntityTypeDoc = serde_json::from_value(serde_json::json!({
      "cti": "cti.acme.evt.event.v1.0",
      "schema": {"type": "object", "cti.final": false},
      "final": true,
    }))
    .unwrap();

    let ty = EntityType::from(doc);
    assert_eq!(ty.schema.cti.is_final, Some(false));
  }
}
