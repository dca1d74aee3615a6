//! The registry-wide validator (spec §4.5).
//!
//! Validation is per-entity and collects every violated rule rather than
//! stopping at the first, except that a schema compile failure for a type
//! stops further rule checks for that entity — mirroring the teacher's
//! `GenerationStats::record_warning` accumulate-don't-abort pattern in
//! `oas3-gen/src/generator/stats.rs`.

use std::rc::Rc;

use crate::entity::{Entity, EntityInstance, EntityType};
use crate::error::{ValidationError, ValidationReport};
use crate::identifier::{match_expression, Expression, MatchMode, Parser};
use crate::registry::Registry;
use crate::schema::AccessLevel;
use crate::selector::{for_each_schema_path, Selector};

type CustomCheck = Rc<dyn Fn(&Entity, &Registry) -> Vec<ValidationError>>;

struct CustomRule {
  pattern: Expression,
  check: CustomCheck,
}

/// Runs the ten numbered rules from spec §4.5 against every entity in a
/// [`Registry`], plus any custom by-CTI rules registered beforehand.
pub struct Validator<'r> {
  registry: &'r Registry,
  type_rules: Vec<CustomRule>,
  instance_rules: Vec<CustomRule>,
}

impl<'r> Validator<'r> {
  #[must_use]
  pub fn new(registry: &'r Registry) -> Self {
    Self { registry, type_rules: Vec::new(), instance_rules: Vec::new() }
  }

  /// Registers a custom rule for every `EntityType` whose CTI the
  /// (possibly wildcarded) `pattern` reference subsumes. Rules fire in
  /// registration order (spec §4.5: "custom rules").
  pub fn register_type_rule(
    &mut self,
    pattern: &str,
    check: impl Fn(&EntityType, &Registry) -> Vec<ValidationError> + 'static,
  ) -> Result<(), crate::error::ParseFailure> {
    let pattern = Parser::new().parse_reference(pattern)?;
    self.type_rules.push(CustomRule {
      pattern,
      check: Rc::new(move |entity, registry| match entity.as_type() {
        Some(t) => check(t, registry),
        None => Vec::new(),
      }),
    });
    Ok(())
  }

  pub fn register_instance_rule(
    &mut self,
    pattern: &str,
    check: impl Fn(&EntityInstance, &Registry) -> Vec<ValidationError> + 'static,
  ) -> Result<(), crate::error::ParseFailure> {
    let pattern = Parser::new().parse_reference(pattern)?;
    self.instance_rules.push(CustomRule {
      pattern,
      check: Rc::new(move |entity, registry| match entity.as_instance() {
        Some(i) => check(i, registry),
        None => Vec::new(),
      }),
    });
    Ok(())
  }

  /// Validates every entity in the registry, cooperatively cancellable via
  /// `should_cancel` (spec §5: "cooperative cancellation").
  pub fn validate(&self, should_cancel: &dyn Fn() -> bool) -> ValidationReport {
    let mut report = ValidationReport::new();
    for entity in self.registry.iter() {
      if should_cancel() {
        break;
      }
      let errors = self.validate_entity(entity);
      if !errors.is_empty() {
        report.extend(entity.cti(), errors);
      }
    }
    report
  }

  fn validate_entity(&self, entity: &Entity) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    let Ok(expression) = Parser::new().parse_identifier(entity.cti()) else {
      errors.push(ValidationError::error("identifier", format!("'{}' is not a well-formed CTI", entity.cti())));
      return errors;
    };

    self.check_vendor_package(entity, &expression, &mut errors);
    self.check_parent_subsumption_and_access(entity, &expression, &mut errors);

    match entity {
      Entity::Type(ty) => {
        self.check_final_parent(ty, &mut errors);
        if !self.check_schema_compiles(ty, &mut errors) {
          return errors; // schema compile failure stops further rules for this entity
        }
        self.check_traits(ty, &mut errors);
        self.check_reference_narrowing(ty, &mut errors);
        self.check_schema_annotation(ty, &mut errors);
        self.fire_custom(&self.type_rules, entity, &mut errors);
      }
      Entity::Instance(inst) => {
        self.check_instance_parent_is_type(inst, &mut errors);
        self.check_instance_value_conforms(inst, &mut errors);
        self.check_instance_reference_values(inst, &mut errors);
        self.fire_custom(&self.instance_rules, entity, &mut errors);
      }
    }

    errors
  }

  fn fire_custom(&self, rules: &[CustomRule], entity: &Entity, errors: &mut Vec<ValidationError>) {
    let Ok(expression) = Parser::new().parse_identifier(entity.cti()) else { return };
    for rule in rules {
      if match_expression(&rule.pattern, &expression, MatchMode::IgnoreQuery) {
        errors.extend((rule.check)(entity, self.registry));
      }
    }
  }

  // Rule 1: vendor/package in the identifier must equal the owning
  // package's declared vendor/package (spec §4.5 rule 1, §6.3). Package
  // membership itself is asserted by whoever loaded the registry, via
  // `Registry::register_package`; an entity that was never registered to a
  // package only gets the bare well-formedness check below.
  fn check_vendor_package(&self, entity: &Entity, expression: &Expression, errors: &mut Vec<ValidationError>) {
    let own = expression.last_node();
    let own_vendor = own.vendor.as_named().filter(|v| !v.is_empty());
    let own_package = own.package.as_named().filter(|p| !p.is_empty());
    if own_vendor.is_none() {
      errors.push(ValidationError::error("vendor-package", "identifier is missing a concrete vendor segment"));
    }
    if own_package.is_none() {
      errors.push(ValidationError::error("vendor-package", "identifier is missing a concrete package segment"));
    }

    let Some(package_id) = self.registry.package_id_of(entity.cti()) else { return };
    let Some((declared_vendor, declared_package)) = package_id.split_once('.') else {
      errors.push(ValidationError::error("vendor-package", format!("declared package id '{package_id}' is not of the form 'vendor.package'")));
      return;
    };
    if own_vendor != Some(declared_vendor) || own_package != Some(declared_package) {
      errors.push(ValidationError::error(
        "vendor-package",
        format!("identifier's vendor/package does not match its declared package '{package_id}'"),
      ));
    }
  }

  // Rule 2: parent must transitively subsume the child's expression; child
  // access must be at least as restrictive as parent.
  fn check_parent_subsumption_and_access(&self, entity: &Entity, expression: &Expression, errors: &mut Vec<ValidationError>) {
    let Some(parent_cti) = entity.parent_cti() else { return };
    let Some(parent) = self.registry.lookup(parent_cti).and_then(Entity::as_type) else {
      errors.push(ValidationError::error("parent", format!("parent '{parent_cti}' does not exist")));
      return;
    };
    let Ok(parent_expression) = Parser::new().parse_identifier(parent_cti) else {
      errors.push(ValidationError::error("parent", format!("parent '{parent_cti}' is not a well-formed CTI")));
      return;
    };
    if !match_expression(&parent_expression, expression, MatchMode::IgnoreQuery) {
      errors.push(ValidationError::error("parent", format!("'{parent_cti}' does not subsume '{}'", expression_cti(expression))));
    }

    if let Entity::Type(child) = entity
      && !parent.schema.cti.access_or_default().at_least(child.schema.cti.access_or_default())
    {
      errors.push(ValidationError::error("access", "child access must be at least as restrictive as its parent's"));
    }

    if !access_reachable(expression_cti(expression).as_str(), parent.schema.cti.access_or_default(), parent_cti) {
      errors.push(ValidationError::error("access", format!("'{parent_cti}' is not access-reachable from '{}'", expression_cti(expression))));
    }
  }

  // Rule 3.
  fn check_final_parent(&self, ty: &EntityType, errors: &mut Vec<ValidationError>) {
    let Some(parent_cti) = &ty.parent_cti else { return };
    if let Some(parent) = self.registry.lookup(parent_cti).and_then(Entity::as_type)
      && parent.schema.cti.is_final()
    {
      errors.push(ValidationError::error("final-parent", format!("'{parent_cti}' is final and cannot be derived from")));
    }
  }

  // Rule 4: schema must be compilable. Our in-memory `Schema` is already
  // structurally typed by the time it reaches the registry, so "compiles"
  // means the merge across the ancestry chain succeeds.
  fn check_schema_compiles(&self, ty: &EntityType, errors: &mut Vec<ValidationError>) -> bool {
    match self.registry.get_merged_schema(&ty.cti) {
      Ok(_) => true,
      Err(e) => {
        errors.push(ValidationError::error("schema-compile", e.to_string()));
        false
      }
    }
  }

  // Rule 5: traits validation. A full JSON-Schema validator is out of scope
  // (spec §1 Non-goals); this checks that an ancestor declares a
  // `cti.traits_schema`-equivalent selector when `traits` are set.
  fn check_traits(&self, ty: &EntityType, errors: &mut Vec<ValidationError>) {
    if ty.schema.cti.traits.is_empty() {
      return;
    }
    let has_ancestor_traits_schema = self
      .registry
      .find_annotations_by_key_in_chain(&ty.cti, &[], "traits_schema")
      .map(|found| !found.is_empty())
      .unwrap_or(false);
    if !has_ancestor_traits_schema {
      errors.push(ValidationError::error("traits", "traits are set but no ancestor declares a traits schema"));
    }
  }

  // Rule 6: `cti.reference` narrowing, ∃-over-∃ (spec §9 open question (c)).
  fn check_reference_narrowing(&self, ty: &EntityType, errors: &mut Vec<ValidationError>) {
    let Some(child_ref) = &ty.schema.cti.reference else { return };
    let Ok(child_expr) = Parser::new().parse_reference(child_ref) else {
      errors.push(ValidationError::error("reference", format!("'{child_ref}' is not a valid reference")));
      return;
    };

    let parent_refs = self.registry.find_annotations_by_key_in_chain(&ty.cti, &[], "reference").unwrap_or_default();
    if parent_refs.is_empty() {
      return;
    }
    let narrows_some_parent = parent_refs.iter().any(|(_, value)| {
      let crate::schema::AnnotationValue::Str(parent_ref) = value else { return false };
      Parser::new()
        .parse_reference(parent_ref)
        .is_ok_and(|parent_expr| match_expression(&parent_expr, &child_expr, MatchMode::IgnoreQuery))
    });
    if !narrows_some_parent {
      errors.push(ValidationError::error("reference", format!("'{child_ref}' does not narrow any ancestor reference")));
    }
  }

  // Rule 7: `cti.schema` resolution, checked at every path in the merged
  // schema (spec §4.5 rule 7), not only the root — a nested property may
  // declare its own `cti.schema` independently of its type's root.
  fn check_schema_annotation(&self, ty: &EntityType, errors: &mut Vec<ValidationError>) {
    let Ok(merged) = self.registry.get_merged_schema(&ty.cti) else { return };
    for_each_schema_path(&merged, &mut |_path, node| {
      let Some(schema_ref) = &node.cti.schema else { return };
      let Ok(expr) = Parser::new().parse_attribute_selector(schema_ref).or_else(|_| Parser::new().parse_reference(schema_ref)) else {
        errors.push(ValidationError::error("cti-schema", format!("'{schema_ref}' is not a valid reference or selector")));
        return;
      };
      let target_cti = expression_cti(&expr);
      let Some(target) = self.registry.lookup(&target_cti).and_then(Entity::as_type) else {
        errors.push(ValidationError::error("cti-schema", format!("'{target_cti}' does not name a type in the registry")));
        return;
      };
      if !access_reachable(&ty.cti, target.schema.cti.access_or_default(), &target_cti) {
        errors.push(ValidationError::error("cti-schema", format!("'{target_cti}' is not access-reachable from '{}'", ty.cti)));
      }
      if let Some(selector_path) = &expr.attribute_selector {
        let selector = Selector::compile(selector_path);
        if self.registry.resolve_selector(&target_cti, &selector).is_err() {
          errors.push(ValidationError::error("cti-schema", format!("selector does not resolve against '{target_cti}'")));
        }
      }
    });
  }

  // Rule 8.
  fn check_instance_parent_is_type(&self, inst: &EntityInstance, errors: &mut Vec<ValidationError>) {
    if self.registry.lookup(&inst.parent_cti).and_then(Entity::as_type).is_none() {
      errors.push(ValidationError::error("instance-parent", format!("parent '{}' is not an entity type", inst.parent_cti)));
    }
  }

  // Rule 9: values must validate against the parent's merged schema. A full
  // JSON-Schema validator is out of scope (spec §1); this checks the
  // structural subset the rest of the validator exercises elsewhere —
  // that the instance is the right JSON kind, and that every field the
  // schema marks `required` is actually present.
  fn check_instance_value_conforms(&self, inst: &EntityInstance, errors: &mut Vec<ValidationError>) {
    let Ok(schema) = self.registry.get_merged_schema(&inst.parent_cti) else { return };
    let Some(obj) = inst.value.as_object() else {
      if !schema.types.is_empty() && !schema.types.contains(&crate::schema::SchemaType::Object) {
        return;
      }
      errors.push(ValidationError::error("instance-value", "instance value is not a JSON object"));
      return;
    };
    for field in &schema.required {
      if !obj.contains_key(field) {
        errors.push(ValidationError::error("instance-value", format!("missing required field '{field}'")));
      }
    }
  }

  // Rule 10: for every path in the parent's merged schema that declares a
  // `cti.reference`, every CTI value at that path in the instance must
  // match the reference and must resolve in the registry (spec §4.5 rule
  // 10) — not just a reference borne by the instance's root value.
  fn check_instance_reference_values(&self, inst: &EntityInstance, errors: &mut Vec<ValidationError>) {
    let Ok(schema) = self.registry.get_merged_schema(&inst.parent_cti) else { return };
    let mut reference_paths: Vec<(Vec<String>, String)> = Vec::new();
    for_each_schema_path(&schema, &mut |path, node| {
      if let Some(pattern_str) = &node.cti.reference {
        reference_paths.push((path.to_vec(), pattern_str.clone()));
      }
    });

    for (path, pattern_str) in reference_paths {
      let Ok(pattern) = Parser::new().parse_reference(&pattern_str) else { continue };
      let selector = Selector::compile(&path);
      let Ok(candidates) = selector.walk_value(&inst.value) else { continue };
      let location = if path.is_empty() { "$".to_string() } else { path.join(".") };
      for candidate_value in candidates {
        let Some(candidate) = candidate_value.as_str() else { continue };
        let Ok(candidate_expr) = Parser::new().parse_identifier(candidate) else {
          errors.push(ValidationError::error("instance-reference", format!("'{candidate}' at '{location}' is not a valid CTI")));
          continue;
        };
        if !match_expression(&pattern, &candidate_expr, MatchMode::IgnoreQuery) {
          errors.push(ValidationError::error(
            "instance-reference",
            format!("'{candidate}' at '{location}' does not match reference '{pattern_str}'"),
          ));
        }
        if self.registry.lookup(candidate).is_none() {
          errors.push(ValidationError::error("instance-reference", format!("'{candidate}' at '{location}' does not resolve in the registry")));
        }
      }
    }
  }
}

/// Renders just the inheritance chain of `expression`, dropping any query
/// attributes or attribute selector, for use as a registry lookup key.
fn expression_cti(expression: &Expression) -> String {
  let bare = Expression { root: expression.root.clone(), anonymous_uuid: expression.anonymous_uuid, query_attributes: Vec::new(), attribute_selector: None };
  bare.render()
}

/// Spec §4.5 rule 2's reachability rule: public is reachable from anywhere;
/// protected requires the same vendor; private requires the same
/// vendor and package.
fn access_reachable(from_cti: &str, target_access: AccessLevel, target_cti: &str) -> bool {
  match target_access {
    AccessLevel::Public => true,
    AccessLevel::Protected | AccessLevel::Private => {
      let (Ok(from), Ok(target)) = (Parser::new().parse_identifier(from_cti), Parser::new().parse_identifier(target_cti)) else { return true };
      let (from_node, target_node) = (from.last_node(), target.last_node());
      let same_vendor = from_node.vendor == target_node.vendor;
      if target_access == AccessLevel::Protected {
        same_vendor
      } else {
        same_vendor && from_node.package == target_node.package
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use pretty_assertions::assert_eq;

  use super::*;
  use crate::entity::EntityType;
  use crate::schema::{Schema, SchemaType};

  fn leaf_type(cti: &str, parent: Option<&str>) -> Entity {
    let mut schema = Schema::new();
    schema.types = vec![SchemaType::Object];
    Entity::Type(EntityType::new(cti.to_string(), parent.map(str::to_string), schema))
  }

  #[test]
  fn final_parent_violation_is_reported() {
    let mut registry = Registry::new();
    let mut parent_schema = Schema::new();
    parent_schema.cti.is_final = Some(true);
    registry.add(Entity::Type(EntityType::new("cti.acme.evt.parent.v1.0".to_string(), None, parent_schema))).unwrap();
    registry.add(leaf_type("cti.acme.evt.child.v1.0", Some("cti.acme.evt.parent.v1.0"))).unwrap();

    let validator = Validator::new(&registry);
    let report = validator.validate(&|| false);
    let messages = report.for_entity("cti.acme.evt.child.v1.0");
    assert!(messages.iter().any(|m| m.rule == "final-parent"));
  }

  #[test]
  fn vendor_package_mismatch_against_declared_package_is_reported() {
    let mut registry = Registry::new();
    registry.add(leaf_type("cti.acme.evt.event.v1.0", None)).unwrap();
    registry.register_package(&crate::entity::PackageIndex {
      package_id: "other_vendor.other_pkg".to_string(),
      entities: vec!["cti.acme.evt.event.v1.0".to_string()],
      depends: indexmap::IndexMap::new(),
    });

    let validator = Validator::new(&registry);
    let report = validator.validate(&|| false);
    let messages = report.for_entity("cti.acme.evt.event.v1.0");
    assert!(messages.iter().any(|m| m.rule == "vendor-package" && m.message.contains("declared package")));
  }

  #[test]
  fn instance_missing_required_field_is_reported() {
    let mut registry = Registry::new();
    let mut ty_schema = Schema::new();
    ty_schema.types = vec![SchemaType::Object];
    ty_schema.required.insert("amount".to_string());
    registry.add(Entity::Type(EntityType::new("cti.acme.evt.payment.v1.0".to_string(), None, ty_schema))).unwrap();
    registry
      .add(Entity::Instance(EntityInstance::new(
        "cti.acme.evt.payment_instance.v1.0~11111111-1111-1111-1111-111111111111".to_string(),
        "cti.acme.evt.payment.v1.0".to_string(),
        serde_json::json!({}),
      )))
      .unwrap();

    let validator = Validator::new(&registry);
    let report = validator.validate(&|| false);
    let messages = report.for_entity("cti.acme.evt.payment_instance.v1.0~11111111-1111-1111-1111-111111111111");
    assert!(messages.iter().any(|m| m.message.contains("amount")));
  }

  #[test]
  fn instance_reference_mismatch_at_a_nested_path_is_reported() {
    let mut registry = Registry::new();
    registry.add(leaf_type("cti.acme.evt.tenant.v1.0", None)).unwrap();

    let mut payment_schema = Schema::new();
    payment_schema.types = vec![SchemaType::Object];
    let mut tenant_prop = Schema::new();
    tenant_prop.types = vec![SchemaType::String];
    tenant_prop.cti.reference = Some("cti.acme.evt.tenant.v1".to_string());
    payment_schema.properties.insert("tenant".to_string(), tenant_prop);
    registry.add(Entity::Type(EntityType::new("cti.acme.evt.payment.v1.0".to_string(), None, payment_schema))).unwrap();

    registry
      .add(Entity::Instance(EntityInstance::new(
        "cti.acme.evt.payment_instance.v1.0~11111111-1111-1111-1111-111111111111".to_string(),
        "cti.acme.evt.payment.v1.0".to_string(),
        serde_json::json!({"tenant": "not-a-cti"}),
      )))
      .unwrap();

    let validator = Validator::new(&registry);
    let report = validator.validate(&|| false);
    let messages = report.for_entity("cti.acme.evt.payment_instance.v1.0~11111111-1111-1111-1111-111111111111");
    assert!(messages.iter().any(|m| m.rule == "instance-reference" && m.message.contains("tenant")));
  }

  #[test]
  fn schema_annotation_nested_in_a_property_resolves_against_the_registry() {
    let mut registry = Registry::new();
    registry.add(leaf_type("cti.acme.evt.target.v1.0", None)).unwrap();

    let mut parent_schema = Schema::new();
    parent_schema.types = vec![SchemaType::Object];
    let mut nested_prop = Schema::new();
    nested_prop.types = vec![SchemaType::String];
    nested_prop.cti.schema = Some("cti.acme.evt.nonexistent.v1.0".to_string());
    parent_schema.properties.insert("linked".to_string(), nested_prop);
    registry.add(Entity::Type(EntityType::new("cti.acme.evt.event.v1.0".to_string(), None, parent_schema))).unwrap();

    let validator = Validator::new(&registry);
    let report = validator.validate(&|| false);
    let messages = report.for_entity("cti.acme.evt.event.v1.0");
    assert!(messages.iter().any(|m| m.rule == "cti-schema"));
  }

  #[test]
  fn custom_type_rule_fires_for_matching_entities() {
    let mut registry = Registry::new();
    registry.add(leaf_type("cti.acme.evt.event.v1.0", None)).unwrap();

    let mut validator = Validator::new(&registry);
    validator
      .register_type_rule("cti.acme.evt.*", |ty, _registry| vec![ValidationError::info("custom", format!("saw {}", ty.cti))])
      .unwrap();

    let report = validator.validate(&|| false);
    let messages = report.for_entity("cti.acme.evt.event.v1.0");
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].rule, "custom");
  }
}
