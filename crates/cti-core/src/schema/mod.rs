//! The JSON-Schema-shaped [`Schema`] model, extended with `cti.*` annotations
//! (spec §3 DATA MODEL, §4.2).
//!
//! `oas3::spec::ObjectSchema` (the teacher's schema type) has no room for the
//! `cti.*` extension block and is built around OpenAPI's `allOf`-flattening
//! model rather than this crate's single-parent merge algebra, so this is a
//! crate-local type rather than a reuse of the teacher's. The ordered maps
//! follow the teacher's own `IndexMap` usage in `schema_registry.rs`.

pub mod annotations;

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use annotations::{AccessLevel, AnnotationValue, CtiAnnotations};

/// One JSON-Schema primitive type name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaType {
  Null,
  Boolean,
  Object,
  Array,
  Number,
  String,
  Integer,
}

/// `additionalProperties`: either a boolean gate or a nested schema.
#[derive(Debug, Clone, PartialEq)]
pub enum AdditionalProperties {
  Bool(bool),
  Schema(Box<Schema>),
}

/// A JSON-Schema node carrying the `cti.*` extension annotations (§3, §4.2).
///
/// Property maps use [`IndexMap`]/[`IndexSet`] rather than `HashMap`/`HashSet`
/// so that serializing a merged schema reproduces a stable, source-order
/// layout (§9 "ordered property maps").
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Schema {
  pub types: Vec<SchemaType>,
  pub title: Option<String>,
  pub description: Option<String>,
  pub properties: IndexMap<String, Schema>,
  pub pattern_properties: IndexMap<String, Schema>,
  pub required: IndexSet<String>,
  pub items: Option<Box<Schema>>,
  pub additional_properties: Option<AdditionalProperties>,
  pub definitions: IndexMap<String, Schema>,
  pub enum_values: Option<Vec<Value>>,
  pub const_value: Option<Value>,
  pub default: Option<Value>,
  pub format: Option<String>,
  pub pattern: Option<String>,
  pub minimum: Option<f64>,
  pub maximum: Option<f64>,
  pub min_length: Option<usize>,
  pub max_length: Option<usize>,
  pub any_of: Vec<Schema>,
  pub one_of: Vec<Schema>,
  pub all_of: Vec<Schema>,
  pub reference: Option<String>,
  pub cti: CtiAnnotations,
}

impl Schema {
  #[must_use]
  pub fn new() -> Self {
    Self::default()
  }

  /// True for a `$ref` node.
  #[must_use]
  pub fn is_ref(&self) -> bool {
    self.reference.is_some()
  }

  /// True for a schema built entirely out of an `anyOf` union.
  #[must_use]
  pub fn is_any_of(&self) -> bool {
    !self.any_of.is_empty()
  }

  /// True for a schema that imposes no constraint at all — the JSON Schema
  /// equivalent of the bare literal `true`. [`crate::merge`] short-circuits
  /// on this to avoid widening an already-unconstrained member.
  #[must_use]
  pub fn is_any(&self) -> bool {
    self.types.is_empty()
      && self.title.is_none()
      && self.description.is_none()
      && self.properties.is_empty()
      && self.pattern_properties.is_empty()
      && self.required.is_empty()
      && self.items.is_none()
      && self.additional_properties.is_none()
      && self.enum_values.is_none()
      && self.const_value.is_none()
      && self.default.is_none()
      && self.any_of.is_empty()
      && self.one_of.is_empty()
      && self.all_of.is_empty()
      && self.reference.is_none()
      && self.format.is_none()
      && self.pattern.is_none()
      && self.minimum.is_none()
      && self.maximum.is_none()
      && self.min_length.is_none()
      && self.max_length.is_none()
  }

}
