//! The pairwise registry compatibility checker (spec §4.6).
//!
//! Unlike the validator, the compatibility checker never stops at a single
//! entity's first problem — "it labels and continues" (spec §4.5
//! propagation policy) — so every function here accumulates into a shared
//! `Vec<CompatibilityMessage>` rather than returning early on the first
//! finding.

use indexmap::IndexMap;
use serde_json::Value;

use crate::entity::Entity;
use crate::error::CompatibilityMessage;
use crate::identifier::{Expression, Parser};
use crate::registry::Registry;
use crate::schema::Schema;

/// The outcome of diffing two registries (spec §4.6): which CTIs are new,
/// removed, or present-in-both ("modified", even when the diff finds
/// nothing — the pairing itself is what "modified" tracks), plus the
/// severity-tagged messages produced for each modified pair.
#[derive(Debug, Default)]
pub struct CompatibilityReport {
  pub new_entities: Vec<String>,
  pub removed_entities: Vec<String>,
  pub modified_pairs: Vec<(String, String)>,
  pub messages: IndexMap<(String, String), Vec<CompatibilityMessage>>,
}

impl CompatibilityReport {
  #[must_use]
  pub fn has_errors(&self) -> bool {
    self.messages.values().any(|msgs| msgs.iter().any(|m| m.severity == crate::error::Severity::Error))
  }
}

/// Diffs `old` against `new` (spec §4.6).
#[must_use]
pub fn check_compatibility(old: &Registry, new: &Registry) -> CompatibilityReport {
  let mut report = CompatibilityReport::default();

  for entity in old.iter() {
    if new.lookup(entity.cti()).is_none() {
      report.removed_entities.push(entity.cti().to_string());
    }
  }

  for entity in new.iter() {
    let cti = entity.cti();
    if old.lookup(cti).is_some() {
      report.modified_pairs.push((cti.to_string(), cti.to_string()));
      continue;
    }
    match decrement_minor_cti(cti).filter(|prior| old.lookup(prior).is_some()) {
      Some(prior) => report.modified_pairs.push((prior, cti.to_string())),
      None => report.new_entities.push(cti.to_string()),
    }
  }

  for (old_cti, new_cti) in report.modified_pairs.clone() {
    let messages = diff_pair(old, &old_cti, new, &new_cti);
    if !messages.is_empty() {
      report.messages.insert((old_cti, new_cti), messages);
    }
  }

  report
}

/// Same identifier with the minor version component decremented by one, or
/// `None` if `cti` has no minor version or is already at `.0` (spec §4.6:
/// "prior minor version form").
fn decrement_minor_cti(cti: &str) -> Option<String> {
  use crate::identifier::ast::{Node, Version, VersionPart};

  let expr = Parser::new().parse_identifier(cti).ok()?;
  let mut root = expr.root.clone();

  fn last_mut(mut node: &mut Node) -> &mut Node {
    while node.child.is_some() {
      node = node.child.as_deref_mut().expect("just checked is_some");
    }
    node
  }

  let last = last_mut(&mut root);
  let Version::Full(major, VersionPart::Num(minor)) = last.version else { return None };
  if minor == 0 {
    return None;
  }
  last.version = Version::Full(major, VersionPart::Num(minor - 1));

  let bare = Expression { root, anonymous_uuid: expr.anonymous_uuid, query_attributes: Vec::new(), attribute_selector: None };
  Some(bare.render())
}

fn diff_pair(old_registry: &Registry, old_cti: &str, new_registry: &Registry, new_cti: &str) -> Vec<CompatibilityMessage> {
  let mut messages = Vec::new();
  let (Some(old_entity), Some(new_entity)) = (old_registry.lookup(old_cti), new_registry.lookup(new_cti)) else {
    return messages;
  };

  match (old_entity, new_entity) {
    (Entity::Type(_), Entity::Type(_)) => {
      let (Ok(old_schema), Ok(new_schema)) = (old_registry.get_merged_schema(old_cti), new_registry.get_merged_schema(new_cti)) else {
        messages.push(CompatibilityMessage::error(new_cti, "schema failed to compile for comparison"));
        return messages;
      };
      diff_schema(&old_schema, &new_schema, "$", &mut messages);

      let old_traits = &old_schema.cti.traits;
      let new_traits = &new_schema.cti.traits;
      for t in old_traits {
        if !new_traits.contains(t) {
          messages.push(CompatibilityMessage::error("cti.traits", format!("trait '{t}' was removed")));
        }
      }

      for (key, old_value) in &old_schema.cti.extra {
        match new_schema.cti.extra.get(key) {
          Some(new_value) if new_value != old_value => {
            messages.push(CompatibilityMessage::warning(format!("cti.{key}"), "annotation value changed"));
          }
          None => messages.push(CompatibilityMessage::warning(format!("cti.{key}"), "annotation was removed")),
          Some(_) => {}
        }
      }
    }
    (Entity::Instance(old_inst), Entity::Instance(new_inst)) => {
      diff_value(&old_inst.value, &new_inst.value, "$", &mut messages);
    }
    _ => {
      messages.push(CompatibilityMessage::error(new_cti, "entity changed kind between type and instance"));
    }
  }

  messages
}

/// Structural schema diff (spec §4.6 "Schema diff"): walks matched subtrees
/// in lock-step, flagging constraints that narrowed or disappeared.
fn diff_schema(old: &Schema, new: &Schema, path: &str, messages: &mut Vec<CompatibilityMessage>) {
  if !old.types.is_empty() && !new.types.is_empty() && old.types.iter().collect::<std::collections::HashSet<_>>() != new.types.iter().collect() {
    messages.push(CompatibilityMessage::error(path, "type changed"));
  }

  for field in &old.required {
    if !new.required.contains(field) {
      messages.push(CompatibilityMessage::error(path, format!("required field '{field}' was removed")));
    }
  }

  for (name, old_prop) in &old.properties {
    match new.properties.get(name) {
      Some(new_prop) => diff_schema(old_prop, new_prop, &format!("{path}.{name}"), messages),
      None => messages.push(CompatibilityMessage::error(path, format!("property '{name}' was removed"))),
    }
  }

  match (&old.items, &new.items) {
    (Some(old_items), Some(new_items)) => diff_schema(old_items, new_items, &format!("{path}[]"), messages),
    (Some(_), None) => messages.push(CompatibilityMessage::error(path, "items was removed")),
    _ => {}
  }

  match (&old.enum_values, &new.enum_values) {
    (Some(old_values), Some(new_values)) => {
      // A strict narrowing (every new value was already in the old set) is
      // allowed; anything else — widening or a disjoint change — is an error.
      let is_strict_narrowing = new_values.iter().all(|v| old_values.contains(v));
      if old_values != new_values && !is_strict_narrowing {
        messages.push(CompatibilityMessage::error(path, "enum set changed outside a strict narrowing"));
      }
    }
    (Some(_), None) => messages.push(CompatibilityMessage::error(path, "enum constraint was removed")),
    _ => {}
  }

  if old.format.is_some() && new.format.is_none() {
    messages.push(CompatibilityMessage::error(path, "format constraint was removed"));
  }
  if old.pattern.is_some() && new.pattern.is_none() {
    messages.push(CompatibilityMessage::error(path, "pattern constraint was removed"));
  }
  if old.min_length.is_some() && new.min_length.is_none() {
    messages.push(CompatibilityMessage::error(path, "minLength constraint was removed"));
  }
  if old.max_length.is_some() && new.max_length.is_none() {
    messages.push(CompatibilityMessage::error(path, "maxLength constraint was removed"));
  }
  if old.minimum.is_some() && new.minimum.is_none() {
    messages.push(CompatibilityMessage::error(path, "minimum bound was removed"));
  }
  if old.maximum.is_some() && new.maximum.is_none() {
    messages.push(CompatibilityMessage::error(path, "maximum bound was removed"));
  }

  if old.any_of.len() != new.any_of.len() {
    messages.push(CompatibilityMessage::warning(path, format!("anyOf member count changed from {} to {}", old.any_of.len(), new.any_of.len())));
  }
  for (i, (old_variant, new_variant)) in old.any_of.iter().zip(new.any_of.iter()).enumerate() {
    diff_schema(old_variant, new_variant, &format!("{path}.anyOf[{i}]"), messages);
  }
}

/// Structural value diff (spec §4.6 "Values diff").
fn diff_value(old: &Value, new: &Value, path: &str, messages: &mut Vec<CompatibilityMessage>) {
  match (old, new) {
    (Value::Object(old_map), Value::Object(new_map)) => {
      for (key, old_val) in old_map {
        match new_map.get(key) {
          Some(new_val) => diff_value(old_val, new_val, &format!("{path}.{key}"), messages),
          None => messages.push(CompatibilityMessage::warning(format!("{path}.{key}"), "key is missing in the new value")),
        }
      }
    }
    (Value::Array(old_items), Value::Array(new_items)) => {
      if old_items.len() != new_items.len() {
        messages.push(CompatibilityMessage::warning(path, format!("array length changed from {} to {}", old_items.len(), new_items.len())));
      }
      for (i, (old_item, new_item)) in old_items.iter().zip(new_items.iter()).enumerate() {
        diff_value(old_item, new_item, &format!("{path}[{i}]"), messages);
      }
    }
    _ => {
      if std::mem::discriminant(old) != std::mem::discriminant(new) {
        messages.push(CompatibilityMessage::error(path, "value type changed"));
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use pretty_assertions::assert_eq;

  use super::*;
  use crate::entity::EntityType;
  use crate::schema::SchemaType;

  fn registry_with(cti: &str, schema: Schema) -> Registry {
    let mut registry = Registry::new();
    registry.add(Entity::Type(EntityType::new(cti.to_string(), None, schema))).unwrap();
    registry
  }

  fn object() -> Schema {
    let mut s = Schema::new();
    s.types = vec![SchemaType::Object];
    s
  }

  #[test]
  fn removed_entity_is_reported() {
    let old = registry_with("cti.acme.evt.event.v1.0", object());
    let new = Registry::new();
    let report = check_compatibility(&old, &new);
    assert_eq!(report.removed_entities, vec!["cti.acme.evt.event.v1.0".to_string()]);
  }

  #[test]
  fn brand_new_entity_is_reported_as_new() {
    let old = Registry::new();
    let new = registry_with("cti.acme.evt.event.v1.0", object());
    let report = check_compatibility(&old, &new);
    assert_eq!(report.new_entities, vec!["cti.acme.evt.event.v1.0".to_string()]);
  }

  #[test]
  fn prior_minor_version_is_treated_as_modified() {
    let old = registry_with("cti.acme.evt.event.v1.0", object());
    let new = registry_with("cti.acme.evt.event.v1.1", object());
    let report = check_compatibility(&old, &new);
    assert!(report.new_entities.is_empty());
    assert_eq!(report.modified_pairs, vec![("cti.acme.evt.event.v1.0".to_string(), "cti.acme.evt.event.v1.1".to_string())]);
  }

  #[test]
  fn removed_required_field_is_an_error() {
    let mut old_schema = object();
    old_schema.required.insert("id".to_string());
    let old = registry_with("cti.acme.evt.event.v1.0", old_schema);
    let new = registry_with("cti.acme.evt.event.v1.0", object());

    let report = check_compatibility(&old, &new);
    let key = ("cti.acme.evt.event.v1.0".to_string(), "cti.acme.evt.event.v1.0".to_string());
    let messages = &report.messages[&key];
    assert!(messages.iter().any(|m| m.message.contains("id")));
    assert!(report.has_errors());
  }
}
