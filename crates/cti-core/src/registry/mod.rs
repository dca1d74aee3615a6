//! The content-addressed, insertion-ordered entity registry (spec §4.4).
//!
//! Building a registry is two phases, matching the teacher's own
//! `SchemaRegistry` workflow in `schema_registry.rs` (collect everything
//! first, then resolve cross-references): [`Registry::add`] inserts entities
//! one at a time with no cross-checking, and [`Registry::link`] walks the
//! whole arena afterward to resolve every parent pointer.

use std::collections::HashSet;

use anyhow::{anyhow, bail, Context, Result};
use indexmap::IndexMap;

use crate::entity::{Entity, EntityInstance, EntityType, PackageIndex};
use crate::error::RegistryError;
use crate::merge;
use crate::schema::{AnnotationValue, Schema};
use crate::selector::Selector;

/// The arena of every type and instance known to one build (spec §4.4).
#[derive(Debug, Default)]
pub struct Registry {
  entities: IndexMap<String, Entity>,
  /// Every entity's declared `package_id` (spec §6.3), populated by
  /// [`Registry::register_package`] — not every entity belongs to a loaded
  /// package, so this stays a lookup rather than a required field.
  package_ids: IndexMap<String, String>,
}

impl Registry {
  #[must_use]
  pub fn new() -> Self {
    Self::default()
  }

  /// Inserts `entity`, keyed by its own CTI. Does not resolve or validate
  /// its parent pointer — call [`Registry::link`] once every entity has
  /// been added.
  pub fn add(&mut self, entity: Entity) -> Result<(), RegistryError> {
    let cti = entity.cti().to_string();
    if self.entities.contains_key(&cti) {
      return Err(RegistryError::DuplicateCti { cti });
    }
    self.entities.insert(cti, entity);
    Ok(())
  }

  /// Resolves every entity's parent pointer against the arena, checking
  /// that the parent exists, is a type, and is not `cti.final`. Collects
  /// every violation rather than stopping at the first (spec §4.5's
  /// "collect, don't short-circuit" convention applies here too).
  pub fn link(&self) -> Result<(), Vec<RegistryError>> {
    let mut errors = Vec::new();
    for entity in self.entities.values() {
      let Some(parent_cti) = entity.parent_cti() else { continue };
      match self.entities.get(parent_cti) {
        None => errors.push(RegistryError::MissingParent { cti: entity.cti().to_string(), parent_cti: parent_cti.to_string() }),
        Some(parent) => match parent.as_type() {
          None => errors.push(RegistryError::MissingParent { cti: entity.cti().to_string(), parent_cti: parent_cti.to_string() }),
          Some(parent_type) => {
            if entity.is_type() && parent_type.schema.cti.is_final() {
              errors.push(RegistryError::FinalParentViolation { cti: entity.cti().to_string(), parent_cti: parent_cti.to_string() });
            }
          }
        },
      }
    }
    if errors.is_empty() {
      Ok(())
    } else {
      Err(errors)
    }
  }

  /// Records that every entity named in `index.entities` belongs to
  /// `index.package_id` (spec §6.3), so rule 1 can check an identifier's own
  /// vendor/package segments against the package that declared it.
  pub fn register_package(&mut self, index: &PackageIndex) {
    for cti in &index.entities {
      self.package_ids.insert(cti.clone(), index.package_id.clone());
    }
  }

  #[must_use]
  pub fn package_id_of(&self, cti: &str) -> Option<&str> {
    self.package_ids.get(cti).map(String::as_str)
  }

  #[must_use]
  pub fn lookup(&self, cti: &str) -> Option<&Entity> {
    self.entities.get(cti)
  }

  pub fn iter(&self) -> impl Iterator<Item = &Entity> {
    self.entities.values()
  }

  pub fn iter_types(&self) -> impl Iterator<Item = &EntityType> {
    self.entities.values().filter_map(Entity::as_type)
  }

  pub fn iter_instances(&self) -> impl Iterator<Item = &EntityInstance> {
    self.entities.values().filter_map(Entity::as_instance)
  }

  #[must_use]
  pub fn len(&self) -> usize {
    self.entities.len()
  }

  #[must_use]
  pub fn is_empty(&self) -> bool {
    self.entities.is_empty()
  }

  /// The root-to-leaf chain of CTIs for `cti`, guarding against a cyclical
  /// parent chain (spec §9: "recursive schema cycles").
  fn ancestry(&self, cti: &str) -> Result<Vec<String>> {
    let mut chain = Vec::new();
    let mut seen = HashSet::new();
    let mut current = Some(cti.to_string());
    while let Some(c) = current {
      if !seen.insert(c.clone()) {
        bail!("cycle detected in the parent chain of '{cti}' at '{c}'");
      }
      let entity = self.entities.get(&c).ok_or_else(|| RegistryError::NotFound { cti: c.clone() })?;
      current = entity.parent_cti().map(str::to_string);
      chain.push(c);
    }
    chain.reverse();
    Ok(chain)
  }

  /// Returns the fully merged schema for the type named `cti`, computing
  /// and caching it on first request (spec §4.3, §4.4).
  pub fn get_merged_schema(&self, cti: &str) -> Result<Schema> {
    let entity = self.entities.get(cti).ok_or_else(|| RegistryError::NotFound { cti: cti.to_string() })?;
    let ty = entity.as_type().ok_or_else(|| anyhow!("'{cti}' names an instance, not a type"))?;
    if let Some(cached) = ty.merged_schema() {
      return Ok(cached.clone());
    }

    let chain = self.ancestry(cti)?;
    let mut merged: Option<Schema> = None;
    for ancestor_cti in &chain {
      let ancestor = self
        .entities
        .get(ancestor_cti)
        .and_then(Entity::as_type)
        .ok_or_else(|| anyhow!("'{ancestor_cti}' is not a type"))?;
      merged = Some(match merged {
        None => ancestor.schema.clone(),
        Some(parent_schema) => merge::merge(&ancestor.schema, &parent_schema).with_context(|| format!("merging '{ancestor_cti}' over its parent"))?,
      });
    }
    let mut result = merged.unwrap_or_default();
    for ancestor_cti in &chain[..chain.len().saturating_sub(1)] {
      merge::fix_self_references(&mut result, ancestor_cti, cti);
    }
    merge::fix_self_references(&mut result, "#", cti);

    Ok(ty.set_merged_schema(result).clone())
  }

  /// Resolves an attribute selector against the merged schema of `cti`.
  pub fn resolve_selector(&self, cti: &str, selector: &Selector) -> Result<Schema> {
    let merged = self.get_merged_schema(cti)?;
    Ok(selector.walk_schema(&merged)?.clone())
  }

  /// Collects every `cti.<key>` annotation value set at `path` (within each
  /// ancestor's own schema, `&[]` meaning the schema root) at any level of
  /// `cti`'s ancestry, most specific first, labeled with the CTI of the
  /// entity that set it (spec §4.4: `find_annotations_by_key_in_chain(path)`).
  pub fn find_annotations_by_key_in_chain(&self, cti: &str, path: &[String], key: &str) -> Result<Vec<(String, AnnotationValue)>> {
    self.find_annotations_by_predicate_in_chain(cti, path, |k, _| k == key)
  }

  pub fn find_annotations_by_predicate_in_chain(
    &self,
    cti: &str,
    path: &[String],
    predicate: impl Fn(&str, &AnnotationValue) -> bool,
  ) -> Result<Vec<(String, AnnotationValue)>> {
    let mut chain = self.ancestry(cti)?;
    chain.reverse(); // most specific first
    let selector = Selector::compile(path);
    let path_key = path.join(".");
    let mut found = Vec::new();
    for ancestor_cti in &chain {
      let ancestor = self.entities.get(ancestor_cti).and_then(Entity::as_type).ok_or_else(|| anyhow!("'{ancestor_cti}' is not a type"))?;
      let node = if path.is_empty() { Some(&ancestor.schema) } else { selector.walk_schema(&ancestor.schema).ok() };
      if let Some(node) = node {
        for (key, value) in node.cti.iter() {
          if predicate(&key, &value) {
            found.push((ancestor_cti.clone(), value));
          }
        }
      }
      if let Some(path_annotations) = ancestor.annotations.get(&path_key) {
        for (key, value) in path_annotations.iter() {
          if predicate(&key, &value) {
            found.push((ancestor_cti.clone(), value));
          }
        }
      }
    }
    Ok(found)
  }
}

#[cfg(test)]
mod tests {
  use pretty_assertions::assert_eq;

  use super::*;
  use crate::schema::SchemaType;

  fn type_with(cti: &str, parent: Option<&str>, types: &[SchemaType]) -> Entity {
    let mut schema = Schema::new();
    schema.types = types.to_vec();
    Entity::Type(EntityType::new(cti.to_string(), parent.map(str::to_string), schema))
  }

  #[test]
  fn link_reports_missing_parent() {
    let mut registry = Registry::new();
    registry.add(type_with("cti.acme.evt.child.v1.0", Some("cti.acme.evt.parent.v1.0"), &[])).unwrap();
    let errors = registry.link().unwrap_err();
    assert_eq!(errors.len(), 1);
    assert!(matches!(&errors[0], RegistryError::MissingParent { .. }));
  }

  #[test]
  fn link_reports_final_parent_violation() {
    let mut registry = Registry::new();
    let mut parent_schema = Schema::new();
    parent_schema.cti.is_final = Some(true);
    registry.add(Entity::Type(EntityType::new("cti.acme.evt.parent.v1.0".to_string(), None, parent_schema))).unwrap();
    registry.add(type_with("cti.acme.evt.child.v1.0", Some("cti.acme.evt.parent.v1.0"), &[])).unwrap();

    let errors = registry.link().unwrap_err();
    assert!(matches!(&errors[0], RegistryError::FinalParentViolation { .. }));
  }

  #[test]
  fn register_package_tracks_membership_by_cti() {
    let mut registry = Registry::new();
    registry.add(type_with("cti.acme.evt.event.v1.0", None, &[])).unwrap();
    registry.register_package(&PackageIndex {
      package_id: "acme.evt".to_string(),
      entities: vec!["cti.acme.evt.event.v1.0".to_string()],
      depends: IndexMap::new(),
    });

    assert_eq!(registry.package_id_of("cti.acme.evt.event.v1.0"), Some("acme.evt"));
    assert_eq!(registry.package_id_of("cti.acme.evt.other.v1.0"), None);
  }

  #[test]
  fn duplicate_cti_is_rejected() {
    let mut registry = Registry::new();
    registry.add(type_with("cti.acme.evt.event.v1.0", None, &[])).unwrap();
    let err = registry.add(type_with("cti.acme.evt.event.v1.0", None, &[])).unwrap_err();
    assert!(matches!(err, RegistryError::DuplicateCti { .. }));
  }

  #[test]
  fn merged_schema_walks_the_whole_chain() {
    let mut registry = Registry::new();
    let mut grandparent = Schema::new();
    grandparent.types = vec![SchemaType::Object];
    grandparent.required.insert("id".to_string());
    registry.add(Entity::Type(EntityType::new("cti.acme.evt.base.v1.0".to_string(), None, grandparent))).unwrap();

    let mut parent = Schema::new();
    parent.required.insert("name".to_string());
    registry.add(Entity::Type(EntityType::new("cti.acme.evt.mid.v1.0".to_string(), Some("cti.acme.evt.base.v1.0".to_string()), parent))).unwrap();

    let mut child = Schema::new();
    child.required.insert("amount".to_string());
    registry.add(Entity::Type(EntityType::new("cti.acme.evt.leaf.v1.0".to_string(), Some("cti.acme.evt.mid.v1.0".to_string()), child))).unwrap();

    registry.link().unwrap();
    let merged = registry.get_merged_schema("cti.acme.evt.leaf.v1.0").unwrap();
    assert!(merged.required.contains("id"));
    assert!(merged.required.contains("name"));
    assert!(merged.required.contains("amount"));
  }
}
