//! On-disk document shapes consumed when loading a package (spec §6.2, §6.3):
//! one YAML/JSON document per entity type or instance, plus a package-level
//! `index.json` manifest.
//!
//! These mirror the teacher's own pattern of a `serde`-derived "raw" shape
//! that gets converted into the crate's real domain type (see
//! `oas3-gen/src/generator/schema_registry.rs`'s use of `oas3::spec::*`
//! straight off of `serde_json`/`serde_yaml`-shaped input).

use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value;

use crate::schema::{AccessLevel, AdditionalProperties, AnnotationValue, CtiAnnotations, Schema, SchemaType};

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum RawType {
  Single(SchemaType),
  Multiple(Vec<SchemaType>),
}

impl RawType {
  fn into_vec(self) -> Vec<SchemaType> {
    match self {
      Self::Single(t) => vec![t],
      Self::Multiple(types) => types,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum RawAdditional {
  Bool(bool),
  Schema(Box<RawSchema>),
}

/// The wire shape of one schema node, before its `cti.*` keys are split out
/// of the flattened `extra` bag into [`CtiAnnotations`].
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawSchema {
  #[serde(rename = "type", default)]
  type_: Option<RawType>,
  #[serde(default)]
  title: Option<String>,
  #[serde(default)]
  description: Option<String>,
  #[serde(default)]
  properties: IndexMap<String, RawSchema>,
  #[serde(default, rename = "patternProperties")]
  pattern_properties: IndexMap<String, RawSchema>,
  #[serde(default)]
  required: Vec<String>,
  #[serde(default)]
  items: Option<Box<RawSchema>>,
  #[serde(default, rename = "additionalProperties")]
  additional_properties: Option<RawAdditional>,
  #[serde(default, rename = "$defs")]
  defs: IndexMap<String, RawSchema>,
  #[serde(default, rename = "enum")]
  enum_values: Option<Vec<Value>>,
  #[serde(default, rename = "const")]
  const_value: Option<Value>,
  #[serde(default)]
  default: Option<Value>,
  #[serde(default)]
  format: Option<String>,
  #[serde(default)]
  pattern: Option<String>,
  #[serde(default)]
  minimum: Option<f64>,
  #[serde(default)]
  maximum: Option<f64>,
  #[serde(default, rename = "minLength")]
  min_length: Option<usize>,
  #[serde(default, rename = "maxLength")]
  max_length: Option<usize>,
  #[serde(default, rename = "anyOf")]
  any_of: Vec<RawSchema>,
  #[serde(default, rename = "oneOf")]
  one_of: Vec<RawSchema>,
  #[serde(default, rename = "allOf")]
  all_of: Vec<RawSchema>,
  #[serde(default, rename = "$ref")]
  reference: Option<String>,
  #[serde(flatten)]
  extra: IndexMap<String, Value>,
}

/// Splits every `cti.<key>` entry out of a flattened JSON object into
/// [`CtiAnnotations`]'s typed fields, everything else falling into `extra`.
/// Shared by [`RawSchema`]'s own flattened bag and by a document's top-level
/// `annotations` map (spec §3: `annotations: map[path -> Annotations]`),
/// which carries the same `cti.*` keys keyed by attribute path instead of by
/// position in the schema tree.
fn cti_annotations_from_extra(extra: &IndexMap<String, Value>) -> CtiAnnotations {
  let mut cti = CtiAnnotations::default();
  for (key, value) in extra {
    let Some(name) = key.strip_prefix("cti.") else { continue };
    match name {
      "cti" => cti.cti = value.as_str().map(str::to_string),
      "access" => cti.access = value.as_str().and_then(parse_access_level),
      "overridable" => cti.overridable = value.as_bool(),
      "final" => cti.is_final = value.as_bool(),
      "reference" => cti.reference = value.as_str().map(str::to_string),
      "schema" => cti.schema = value.as_str().map(str::to_string),
      "traits" => {
        cti.traits = value.as_array().map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect()).unwrap_or_default();
      }
      other => {
        cti.extra.insert(other.to_string(), annotation_value_from_json(value));
      }
    }
  }
  cti
}

impl From<RawSchema> for Schema {
  fn from(raw: RawSchema) -> Self {
    let cti = cti_annotations_from_extra(&raw.extra);

    Schema {
      types: raw.type_.map(RawType::into_vec).unwrap_or_default(),
      title: raw.title,
      description: raw.description,
      properties: raw.properties.into_iter().map(|(k, v)| (k, Schema::from(v))).collect(),
      pattern_properties: raw.pattern_properties.into_iter().map(|(k, v)| (k, Schema::from(v))).collect(),
      required: raw.required.into_iter().collect(),
      items: raw.items.map(|i| Box::new(Schema::from(*i))),
      additional_properties: raw.additional_properties.map(|a| match a {
        RawAdditional::Bool(b) => AdditionalProperties::Bool(b),
        RawAdditional::Schema(s) => AdditionalProperties::Schema(Box::new(Schema::from(*s))),
      }),
      definitions: raw.defs.into_iter().map(|(k, v)| (k, Schema::from(v))).collect(),
      enum_values: raw.enum_values,
      const_value: raw.const_value,
      default: raw.default,
      format: raw.format,
      pattern: raw.pattern,
      minimum: raw.minimum,
      maximum: raw.maximum,
      min_length: raw.min_length,
      max_length: raw.max_length,
      any_of: raw.any_of.into_iter().map(Schema::from).collect(),
      one_of: raw.one_of.into_iter().map(Schema::from).collect(),
      all_of: raw.all_of.into_iter().map(Schema::from).collect(),
      reference: raw.reference,
      cti,
    }
  }
}

pub(crate) fn parse_access_level(s: &str) -> Option<AccessLevel> {
  match s {
    "public" => Some(AccessLevel::Public),
    "protected" => Some(AccessLevel::Protected),
    "private" => Some(AccessLevel::Private),
    _ => None,
  }
}

fn annotation_value_from_json(value: &Value) -> AnnotationValue {
  match value {
    Value::Bool(b) => AnnotationValue::Bool(*b),
    Value::Array(items) => AnnotationValue::StrList(items.iter().filter_map(|v| v.as_str().map(str::to_string)).collect()),
    Value::Object(map) => {
      AnnotationValue::Map(map.iter().map(|(k, v)| (k.clone(), annotation_value_from_json(v))).collect())
    }
    other => AnnotationValue::Str(other.as_str().map(str::to_string).unwrap_or_else(|| other.to_string())),
  }
}

/// One entity-type document (`#%CTI Type 1.0`, spec §6.2): `cti`, an
/// optional declared parent, the type's own (pre-merge) schema, and the
/// common entity-level metadata fields spec §3 lists alongside it.
#[derive(Debug, Clone, Deserialize)]
pub struct EntityTypeDoc {
  pub cti: String,
  #[serde(default)]
  pub parent: Option<String>,
  #[serde(default)]
  pub schema: RawSchema,
  #[serde(default, rename = "final")]
  pub is_final: Option<bool>,
  #[serde(default)]
  pub access: Option<String>,
  #[serde(default)]
  pub display_name: Option<String>,
  #[serde(default)]
  pub description: Option<String>,
  #[serde(default)]
  pub traits_schema: Option<String>,
  #[serde(default)]
  pub traits: Option<Vec<String>>,
  #[serde(default)]
  pub annotations: IndexMap<String, IndexMap<String, Value>>,
}

/// One entity-instance document (`#%CTI Instance 1.0`, spec §6.2): the
/// concrete `value` plus the type it instantiates, and the same common
/// entity-level metadata fields as [`EntityTypeDoc`].
#[derive(Debug, Clone, Deserialize)]
pub struct EntityInstanceDoc {
  pub cti: String,
  pub parent: String,
  pub value: Value,
  #[serde(default, rename = "final")]
  pub is_final: Option<bool>,
  #[serde(default)]
  pub access: Option<String>,
  #[serde(default)]
  pub display_name: Option<String>,
  #[serde(default)]
  pub description: Option<String>,
  #[serde(default)]
  pub annotations: IndexMap<String, IndexMap<String, Value>>,
}

/// A package's `index.json` manifest (spec §6.3): the package's own
/// identifier, the document paths it contributes to a registry build, and
/// the versions of any other packages it depends on.
#[derive(Debug, Clone, Deserialize)]
pub struct PackageIndex {
  pub package_id: String,
  #[serde(default)]
  pub entities: Vec<String>,
  #[serde(default)]
  pub depends: IndexMap<String, String>,
}

/// Converts a document's `annotations: map[path -> Annotations]` block (spec
/// §3) into the same [`CtiAnnotations`] shape used on schema nodes, keyed by
/// the dotted attribute path each entry was declared against.
pub(crate) fn annotations_from_doc(raw: &IndexMap<String, IndexMap<String, Value>>) -> IndexMap<String, CtiAnnotations> {
  raw.iter().map(|(path, extra)| (path.clone(), cti_annotations_from_extra(extra))).collect()
}
