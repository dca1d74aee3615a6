//! Compiled attribute selectors and the schema/value walkers that resolve
//! them (spec §4.2 "attribute selector resolution").

use serde_json::Value;
use strum::Display;

use crate::schema::Schema;

/// One step of a compiled selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
  Field(String),
  /// `#`: descend into an array's item schema/every element of an array value.
  Index,
}

/// A dotted attribute-selector path (`@a.b.c`), compiled from
/// [`crate::identifier::Expression::attribute_selector`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Selector {
  pub steps: Vec<Step>,
}

#[derive(Debug, Clone, PartialEq, Eq, Display)]
pub enum SelectorError {
  #[strum(to_string = "selector '{selector}' has no segment '{segment}' on an object schema")]
  NoSuchProperty { selector: String, segment: String },
  #[strum(to_string = "selector '{selector}' expects an array at this position")]
  NotAnArray { selector: String },
  #[strum(to_string = "selector '{selector}' expects an object at this position")]
  NotAnObject { selector: String },
  #[strum(to_string = "selector '{selector}' is empty")]
  Empty { selector: String },
}

impl std::error::Error for SelectorError {}

impl Selector {
  #[must_use]
  pub fn compile(path: &[String]) -> Self {
    Self {
      steps: path
        .iter()
        .map(|seg| if seg == "#" { Step::Index } else { Step::Field(seg.clone()) })
        .collect(),
    }
  }

  fn rendered(&self) -> String {
    self
      .steps
      .iter()
      .map(|s| match s {
        Step::Field(f) => f.clone(),
        Step::Index => "#".to_string(),
      })
      .collect::<Vec<_>>()
      .join(".")
  }

  /// Walks `schema` along this selector's steps, returning the schema node
  /// the path resolves to.
  pub fn walk_schema<'a>(&self, schema: &'a Schema) -> Result<&'a Schema, SelectorError> {
    if self.steps.is_empty() {
      return Err(SelectorError::Empty { selector: self.rendered() });
    }
    let mut current = schema;
    for step in &self.steps {
      current = match step {
        Step::Field(name) => current
          .properties
          .get(name)
          .or_else(|| find_pattern_property(current, name))
          .ok_or_else(|| SelectorError::NoSuchProperty { selector: self.rendered(), segment: name.clone() })?,
        Step::Index => current.items.as_deref().ok_or_else(|| SelectorError::NotAnArray { selector: self.rendered() })?,
      };
    }
    Ok(current)
  }

  /// Walks `value` along this selector's steps. An [`Step::Index`] step
  /// collects the resolution across every array element.
  pub fn walk_value<'a>(&self, value: &'a Value) -> Result<Vec<&'a Value>, SelectorError> {
    let mut frontier = vec![value];
    for step in &self.steps {
      let mut next = Vec::new();
      for v in frontier {
        match step {
          Step::Field(name) => {
            let obj = v.as_object().ok_or_else(|| SelectorError::NotAnObject { selector: self.rendered() })?;
            if let Some(child) = obj.get(name) {
              next.push(child);
            }
          }
          Step::Index => {
            let arr = v.as_array().ok_or_else(|| SelectorError::NotAnArray { selector: self.rendered() })?;
            next.extend(arr.iter());
          }
        }
      }
      frontier = next;
    }
    Ok(frontier)
  }
}

/// Finds a `patternProperties` entry whose key, read as a regex, matches
/// `name` (spec §4.2: "for a named step, index into `properties` or
/// `patternProperties`"). A pattern that fails to compile as a regex never
/// matches anything rather than aborting the walk.
fn find_pattern_property<'a>(schema: &'a Schema, name: &str) -> Option<&'a Schema> {
  schema
    .pattern_properties
    .iter()
    .find(|(pattern, _)| regex::Regex::new(pattern).is_ok_and(|re| re.is_match(name)))
    .map(|(_, prop)| prop)
}

/// Visits every schema node reachable from `schema`, depth-first, passing
/// each visitor its JSON-path-style segment list (named properties,
/// `patternProperties` keys, and `#` for array items). Used by the
/// validator to find `cti.schema`/`cti.reference` annotations declared at
/// any depth rather than only at the schema's root (spec §4.5 rules 7, 10).
pub fn for_each_schema_path(schema: &Schema, visit: &mut impl FnMut(&[String], &Schema)) {
  let mut path = Vec::new();
  walk_paths(schema, &mut path, visit);
}

fn walk_paths(schema: &Schema, path: &mut Vec<String>, visit: &mut impl FnMut(&[String], &Schema)) {
  visit(path, schema);
  for (name, prop) in &schema.properties {
    path.push(name.clone());
    walk_paths(prop, path, visit);
    path.pop();
  }
  for (pattern, prop) in &schema.pattern_properties {
    path.push(pattern.clone());
    walk_paths(prop, path, visit);
    path.pop();
  }
  if let Some(items) = &schema.items {
    path.push("#".to_string());
    walk_paths(items, path, visit);
    path.pop();
  }
  for variant in schema.any_of.iter().chain(&schema.one_of).chain(&schema.all_of) {
    walk_paths(variant, path, visit);
  }
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  fn object_schema(props: &[(&str, Schema)]) -> Schema {
    let mut schema = Schema::new();
    schema.types = vec![crate::schema::SchemaType::Object];
    for (k, v) in props {
      schema.properties.insert((*k).to_string(), v.clone());
    }
    schema
  }

  #[test]
  fn walks_nested_object_schema() {
    let leaf = Schema::new();
    let inner = object_schema(&[("amount", leaf.clone())]);
    let outer = object_schema(&[("payload", inner)]);

    let selector = Selector::compile(&["payload".to_string(), "amount".to_string()]);
    assert_eq!(selector.walk_schema(&outer), Ok(&leaf));
  }

  #[test]
  fn walks_array_values_with_index_step() {
    let selector = Selector::compile(&["items".to_string(), "#".to_string(), "id".to_string()]);
    let value = json!({"items": [{"id": 1}, {"id": 2}]});
    let resolved = selector.walk_value(&value).unwrap();
    assert_eq!(resolved, vec![&json!(1), &json!(2)]);
  }

  #[test]
  fn walks_schema_falls_back_to_matching_pattern_property() {
    let leaf = Schema::new();
    let mut outer = Schema::new();
    outer.types = vec![crate::schema::SchemaType::Object];
    outer.pattern_properties.insert("^x-.*$".to_string(), leaf.clone());

    let selector = Selector::compile(&["x-custom".to_string()]);
    assert_eq!(selector.walk_schema(&outer), Ok(&leaf));
  }

  #[test]
  fn for_each_schema_path_visits_nested_properties_and_patterns() {
    let leaf = Schema::new();
    let inner = object_schema(&[("amount", leaf.clone())]);
    let mut outer = object_schema(&[("payload", inner)]);
    outer.pattern_properties.insert("^x-.*$".to_string(), leaf);

    let mut seen = Vec::new();
    for_each_schema_path(&outer, &mut |path, _| seen.push(path.join(".")));

    assert!(seen.contains(&String::new()));
    assert!(seen.contains(&"payload".to_string()));
    assert!(seen.contains(&"payload.amount".to_string()));
    assert!(seen.contains(&"^x-.*$".to_string()));
  }
}
