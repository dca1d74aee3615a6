//! The `cti.*` extension keywords carried on a JSON-Schema-shaped [`super::Schema`] node.

use indexmap::IndexMap;
use strum::Display;

/// `cti.access` (spec §4.2, §9): unset resolves to [`AccessLevel::Protected`]
/// per the decided open question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display)]
pub enum AccessLevel {
  Public,
  #[default]
  Protected,
  Private,
}

impl AccessLevel {
  /// `self` is at least as open as `other` (public > protected > private),
  /// used by the validator's parent-access-monotonicity rule.
  #[must_use]
  pub fn at_least(self, other: Self) -> bool {
    self.rank() >= other.rank()
  }

  fn rank(self) -> u8 {
    match self {
      Self::Private => 0,
      Self::Protected => 1,
      Self::Public => 2,
    }
  }
}

/// One value of a `cti.*` annotation that isn't one of the well-known keys.
#[derive(Debug, Clone, PartialEq)]
pub enum AnnotationValue {
  Bool(bool),
  Str(String),
  StrList(Vec<String>),
  Map(IndexMap<String, AnnotationValue>),
}

/// The well-known `cti.*` keywords plus an overflow bag for any others,
/// keyed case-sensitively as they appear in the source document (§9 decided
/// open question: annotation keys are case-sensitive).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CtiAnnotations {
  /// `cti.cti`: the identifier this schema node itself declares.
  pub cti: Option<String>,
  /// `cti.access`.
  pub access: Option<AccessLevel>,
  /// `cti.overridable`: whether a descendant may replace this subtree wholesale.
  pub overridable: Option<bool>,
  /// `cti.final`: no further descendants may derive from this entity.
  pub is_final: Option<bool>,
  /// `cti.reference`: the CTI pattern a reference-typed value must subsume.
  pub reference: Option<String>,
  /// `cti.schema`: a selector/CTI naming the schema this node resolves against.
  pub schema: Option<String>,
  /// `cti.traits`: trait CTIs this entity composes, for the traits-validation rule.
  pub traits: Vec<String>,
  /// Any other `cti.*` key not named above.
  pub extra: IndexMap<String, AnnotationValue>,
}

impl CtiAnnotations {
  #[must_use]
  pub fn access_or_default(&self) -> AccessLevel {
    self.access.unwrap_or_default()
  }

  #[must_use]
  pub fn is_final(&self) -> bool {
    self.is_final.unwrap_or(false)
  }

  #[must_use]
  pub fn is_overridable(&self) -> bool {
    self.overridable.unwrap_or(true)
  }

  /// Looks up a `cti.<key>` value, checking the well-known typed fields
  /// first and falling back to the overflow bag. Lets registry chain
  /// lookups treat `reference`/`schema`/`overridable`/`final`/`traits` the
  /// same as any other annotation key, since `entity::docs`'s conversion
  /// routes those into typed fields rather than `extra`.
  #[must_use]
  pub fn get(&self, key: &str) -> Option<AnnotationValue> {
    match key {
      "cti" => self.cti.clone().map(AnnotationValue::Str),
      "access" => self.access.map(|a| AnnotationValue::Str(a.to_string().to_lowercase())),
      "overridable" => self.overridable.map(AnnotationValue::Bool),
      "final" => self.is_final.map(AnnotationValue::Bool),
      "reference" => self.reference.clone().map(AnnotationValue::Str),
      "schema" => self.schema.clone().map(AnnotationValue::Str),
      "traits" => (!self.traits.is_empty()).then(|| AnnotationValue::StrList(self.traits.clone())),
      other => self.extra.get(other).cloned(),
    }
  }

  /// Iterates every `cti.<key>` annotation set on this node, well-known
  /// fields and overflow bag alike.
  pub fn iter(&self) -> impl Iterator<Item = (String, AnnotationValue)> + '_ {
    const WELL_KNOWN: &[&str] = &["cti", "access", "overridable", "final", "reference", "schema", "traits"];
    WELL_KNOWN
      .iter()
      .filter_map(|key| self.get(key).map(|value| ((*key).to_string(), value)))
      .chain(self.extra.iter().map(|(k, v)| (k.clone(), v.clone())))
  }

  /// Child-wins-on-holes merge of two annotation sets (spec §4.3): any field
  /// the child leaves unset is filled in from the parent.
  #[must_use]
  pub fn merged_over(&self, parent: &Self) -> Self {
    Self {
      cti: self.cti.clone().or_else(|| parent.cti.clone()),
      access: self.access.or(parent.access),
      overridable: self.overridable.or(parent.overridable),
      is_final: self.is_final.or(parent.is_final),
      reference: self.reference.clone().or_else(|| parent.reference.clone()),
      schema: self.schema.clone().or_else(|| parent.schema.clone()),
      traits: if self.traits.is_empty() { parent.traits.clone() } else { self.traits.clone() },
      extra: {
        let mut merged = parent.extra.clone();
        merged.extend(self.extra.clone());
        merged
      },
    }
  }
}
