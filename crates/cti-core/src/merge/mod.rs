//! The single-inheritance schema merger (spec §4.3).
//!
//! Merging is a one-level operation: `merge(child, parent)` produces the
//! schema `child` sees once its declared fields are overlaid onto whatever
//! `parent` leaves as holes. [`crate::entity`] folds this over a whole
//! ancestry chain.

use itertools::Itertools;

use crate::error::MergeError;
use crate::schema::{AdditionalProperties, Schema, SchemaType};

/// Merges `child` over `parent`: every field `child` sets wins; every field
/// `child` leaves unset is inherited from `parent`.
pub fn merge(child: &Schema, parent: &Schema) -> Result<Schema, MergeError> {
  if child.is_ref() {
    return Ok(child.clone());
  }
  if parent.is_any() {
    return Ok(child.clone());
  }
  if parent.is_any_of() {
    return merge_source_anyof(child, parent);
  }
  if child.is_any_of() {
    return merge_target_anyof(child, parent);
  }
  merge_object(child, parent)
}

fn type_names(types: &[SchemaType]) -> String {
  types.iter().map(|t| format!("{t:?}")).join("|")
}

fn merge_object(child: &Schema, parent: &Schema) -> Result<Schema, MergeError> {
  if !child.types.is_empty() && !parent.types.is_empty() && !child.types.iter().any(|t| parent.types.contains(t)) {
    return Err(MergeError::TypeMismatch { source_type: type_names(&child.types), target_type: type_names(&parent.types) });
  }

  let mut merged = Schema::new();
  merged.types = if child.types.is_empty() { parent.types.clone() } else { child.types.clone() };
  merged.title = child.title.clone().or_else(|| parent.title.clone());
  merged.description = child.description.clone().or_else(|| parent.description.clone());
  merged.format = child.format.clone().or_else(|| parent.format.clone());
  merged.pattern = child.pattern.clone().or_else(|| parent.pattern.clone());
  merged.minimum = child.minimum.or(parent.minimum);
  merged.maximum = child.maximum.or(parent.maximum);
  merged.min_length = child.min_length.or(parent.min_length);
  merged.max_length = child.max_length.or(parent.max_length);
  merged.enum_values = child.enum_values.clone().or_else(|| parent.enum_values.clone());
  merged.const_value = child.const_value.clone().or_else(|| parent.const_value.clone());
  merged.default = child.default.clone().or_else(|| parent.default.clone());
  merged.one_of = if child.one_of.is_empty() { parent.one_of.clone() } else { child.one_of.clone() };
  merged.all_of = if child.all_of.is_empty() { parent.all_of.clone() } else { child.all_of.clone() };
  merged.additional_properties = match (&child.additional_properties, &parent.additional_properties) {
    (Some(c), _) => Some(clone_additional(c)),
    (None, Some(p)) => Some(clone_additional(p)),
    (None, None) => None,
  };

  merged.required = parent.required.union(&child.required).cloned().collect();

  merged.properties = parent.properties.clone();
  for (name, child_prop) in &child.properties {
    match merged.properties.get(name) {
      Some(parent_prop) => {
        if !parent_prop.cti.is_overridable() {
          return Err(MergeError::NotOverridable { property: name.clone() });
        }
        let m = merge(child_prop, parent_prop)?;
        merged.properties.insert(name.clone(), m);
      }
      None => {
        merged.properties.insert(name.clone(), child_prop.clone());
      }
    }
  }

  merged.pattern_properties = parent.pattern_properties.clone();
  for (pat, child_prop) in &child.pattern_properties {
    match merged.pattern_properties.get(pat) {
      Some(parent_prop) => {
        if !parent_prop.cti.is_overridable() {
          return Err(MergeError::NotOverridable { property: pat.clone() });
        }
        let m = merge(child_prop, parent_prop)?;
        merged.pattern_properties.insert(pat.clone(), m);
      }
      None => {
        merged.pattern_properties.insert(pat.clone(), child_prop.clone());
      }
    }
  }

  merged.definitions = parent.definitions.clone();
  merged.definitions.extend(child.definitions.clone());

  merged.items = match (&child.items, &parent.items) {
    (Some(c), Some(p)) => Some(Box::new(merge(c, p)?)),
    (Some(c), None) => Some(c.clone()),
    (None, Some(p)) => Some(p.clone()),
    (None, None) => None,
  };

  merged.cti = child.cti.merged_over(&parent.cti);
  Ok(merged)
}

fn clone_additional(a: &AdditionalProperties) -> AdditionalProperties {
  match a {
    AdditionalProperties::Bool(b) => AdditionalProperties::Bool(*b),
    AdditionalProperties::Schema(s) => AdditionalProperties::Schema(s.clone()),
  }
}

/// `merge_target_anyof` (spec §4.3): `child` is itself an `anyOf` union.
/// The (concrete) `parent` is merged into every child member; unlike
/// `merge_source_anyof`, an incompatible member is not dropped but bubbles
/// up as an error, since every member of the child's own union must remain
/// representable once narrowed by its parent.
fn merge_target_anyof(child: &Schema, parent: &Schema) -> Result<Schema, MergeError> {
  let mut members = Vec::with_capacity(child.any_of.len());
  for member in &child.any_of {
    members.push(merge(member, parent)?);
  }
  let mut merged = Schema::new();
  merged.any_of = members;
  Ok(merged)
}

/// `merge_source_anyof` (spec §4.3): `parent` is itself an `anyOf` union,
/// `child` is concrete or itself a union (∃-over-∃: a variant merges
/// successfully if it is compatible with at least one parent member).
fn merge_source_anyof(child: &Schema, parent: &Schema) -> Result<Schema, MergeError> {
  if parent.any_of.iter().any(Schema::is_any) {
    return Ok(child.clone());
  }
  if child.is_any_of() {
    let successes: Vec<Schema> = parent
      .any_of
      .iter()
      .flat_map(|parent_variant| child.any_of.iter().filter_map(move |child_variant| merge(child_variant, parent_variant).ok()))
      .collect();
    return finish_anyof(successes);
  }
  let successes: Vec<Schema> = parent.any_of.iter().filter_map(|variant| merge(child, variant).ok()).collect();
  finish_anyof(successes)
}

fn finish_anyof(mut successes: Vec<Schema>) -> Result<Schema, MergeError> {
  match successes.len() {
    0 => Err(MergeError::EmptyUnionIntersection),
    1 => Ok(successes.remove(0)),
    _ => {
      let mut merged = Schema::new();
      merged.any_of = successes;
      Ok(merged)
    }
  }
}

/// Rewrites any `$ref` pointing at `old_cti` (or the bare self-reference
/// `"#"`) to point at `new_cti` instead. Applied when a schema is inherited
/// by a descendant entity, so that a self-referential field (e.g. a `parent`
/// pointer typed as "an instance of my own entity") keeps referring to the
/// entity that now owns the merged schema rather than the ancestor it was
/// written against.
pub fn fix_self_references(schema: &mut Schema, old_cti: &str, new_cti: &str) {
  if matches!(schema.reference.as_deref(), Some("#")) || schema.reference.as_deref() == Some(old_cti) {
    schema.reference = Some(new_cti.to_string());
  }
  for prop in schema.properties.values_mut() {
    fix_self_references(prop, old_cti, new_cti);
  }
  for prop in schema.pattern_properties.values_mut() {
    fix_self_references(prop, old_cti, new_cti);
  }
  if let Some(items) = schema.items.as_deref_mut() {
    fix_self_references(items, old_cti, new_cti);
  }
  for variant in schema.any_of.iter_mut().chain(schema.one_of.iter_mut()).chain(schema.all_of.iter_mut()) {
    fix_self_references(variant, old_cti, new_cti);
  }
  for def in schema.definitions.values_mut() {
    fix_self_references(def, old_cti, new_cti);
  }
}

#[cfg(test)]
mod tests {
  use pretty_assertions::assert_eq;

  use super::*;
  use crate::schema::CtiAnnotations;

  fn object(types: &[SchemaType]) -> Schema {
    let mut s = Schema::new();
    s.types = types.to_vec();
    s
  }

  #[test]
  fn child_required_unions_with_parent_required() {
    let mut parent = object(&[SchemaType::Object]);
    parent.required.insert("a".to_string());
    let mut child = object(&[SchemaType::Object]);
    child.required.insert("b".to_string());

    let merged = merge(&child, &parent).unwrap();
    assert!(merged.required.contains("a"));
    assert!(merged.required.contains("b"));
  }

  #[test]
  fn child_property_wins_over_parent_holes() {
    let mut parent = object(&[SchemaType::Object]);
    let mut parent_prop = Schema::new();
    parent_prop.types = vec![SchemaType::String];
    parent.properties.insert("name".to_string(), parent_prop);

    let mut child = object(&[SchemaType::Object]);
    let mut child_prop = Schema::new();
    child_prop.min_length = Some(3);
    child.properties.insert("name".to_string(), child_prop);

    let merged = merge(&child, &parent).unwrap();
    let name = &merged.properties["name"];
    assert_eq!(name.types, vec![SchemaType::String]);
    assert_eq!(name.min_length, Some(3));
  }

  #[test]
  fn incompatible_types_error() {
    let parent = object(&[SchemaType::Object]);
    let child = object(&[SchemaType::String]);
    assert!(matches!(merge(&child, &parent), Err(MergeError::TypeMismatch { .. })));
  }

  #[test]
  fn parent_anyof_keeps_only_compatible_variants() {
    let mut parent = Schema::new();
    parent.any_of = vec![object(&[SchemaType::String]), object(&[SchemaType::Object])];
    let child = object(&[SchemaType::Object]);

    let merged = merge(&child, &parent).unwrap();
    assert_eq!(merged.types, vec![SchemaType::Object]);
  }

  #[test]
  fn empty_anyof_intersection_is_an_error() {
    let mut parent = Schema::new();
    parent.any_of = vec![object(&[SchemaType::String]), object(&[SchemaType::Number])];
    let child = object(&[SchemaType::Boolean]);
    assert!(matches!(merge(&child, &parent), Err(MergeError::EmptyUnionIntersection)));
  }

  #[test]
  fn any_member_in_parent_anyof_returns_child_unchanged() {
    let mut parent = Schema::new();
    parent.any_of = vec![object(&[SchemaType::String]), Schema::new()];
    let mut child = object(&[SchemaType::Boolean]);
    child.title = Some("a boolean flag".to_string());

    let merged = merge(&child, &parent).unwrap();
    assert_eq!(merged, child);
  }

  #[test]
  fn both_sides_anyof_merges_compatible_pairs_only() {
    let mut parent = Schema::new();
    parent.any_of = vec![object(&[SchemaType::String]), object(&[SchemaType::Object])];
    let mut child = Schema::new();
    child.any_of = vec![object(&[SchemaType::Object]), object(&[SchemaType::Number])];

    let merged = merge(&child, &parent).unwrap();
    assert_eq!(merged.types, vec![SchemaType::Object]);
  }

  #[test]
  fn child_anyof_member_incompatible_with_concrete_parent_is_an_error() {
    let parent = object(&[SchemaType::Object]);
    let mut child = Schema::new();
    child.any_of = vec![object(&[SchemaType::Object]), object(&[SchemaType::String])];

    assert!(matches!(merge(&child, &parent), Err(MergeError::TypeMismatch { .. })));
  }

  #[test]
  fn non_overridable_parent_property_rejects_child_override() {
    let mut parent = object(&[SchemaType::Object]);
    let mut parent_prop = Schema::new();
    parent_prop.types = vec![SchemaType::String];
    parent_prop.cti.overridable = Some(false);
    parent.properties.insert("id".to_string(), parent_prop);

    let mut child = object(&[SchemaType::Object]);
    let mut child_prop = Schema::new();
    child_prop.min_length = Some(5);
    child.properties.insert("id".to_string(), child_prop);

    assert!(matches!(merge(&child, &parent), Err(MergeError::NotOverridable { ref property }) if property == "id"));
  }

  #[test]
  fn cti_annotations_merge_with_child_precedence() {
    let mut parent = Schema::new();
    parent.cti = CtiAnnotations { access: Some(crate::schema::AccessLevel::Public), ..Default::default() };
    let mut child = Schema::new();
    child.cti = CtiAnnotations { is_final: Some(true), ..Default::default() };

    let merged = merge(&child, &parent).unwrap();
    assert_eq!(merged.cti.access, Some(crate::schema::AccessLevel::Public));
    assert_eq!(merged.cti.is_final, Some(true));
  }

  #[test]
  fn fix_self_references_rewrites_bare_and_named_self_refs() {
    let mut schema = Schema::new();
    schema.reference = Some("#".to_string());
    let mut nested = Schema::new();
    nested.reference = Some("cti.acme.evt.parent.v1.0".to_string());
    schema.properties.insert("child".to_string(), nested);

    fix_self_references(&mut schema, "cti.acme.evt.parent.v1.0", "cti.acme.evt.child.v1.0");
    assert_eq!(schema.reference.as_deref(), Some("cti.acme.evt.child.v1.0"));
    assert_eq!(schema.properties["child"].reference.as_deref(), Some("cti.acme.evt.child.v1.0"));
  }
}
