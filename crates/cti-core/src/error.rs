//! The closed error taxonomy described in spec §7.
//!
//! Every fallible operation in this crate returns one of the types defined
//! here. None of them wrap a dynamic `Box<dyn Error>` — the set is closed so
//! callers can match exhaustively.

use strum::Display;

/// Severity of a validation or compatibility message (§6.4, §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display)]
pub enum Severity {
  Info,
  Warning,
  Error,
}

/// Signalled when a string was expected to be a CTI but does not even begin
/// with `cti.`. Kept separate from [`ParseError`] because callers (notably
/// the query-attribute post-check in the parser itself) branch on this case
/// specifically to decide whether to keep a raw string value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotExpression {
  pub input: String,
}

impl std::fmt::Display for NotExpression {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "'{}' does not begin with 'cti.'", self.input)
  }
}

impl std::error::Error for NotExpression {}

/// A malformed CTI string that did begin with `cti.` but failed to parse
/// further. Carries the offending raw input alongside the specific grammar
/// violation.
#[derive(Debug, Clone, PartialEq, Eq, Display)]
pub enum ParseError {
  #[strum(to_string = "'{input}': invalid vendor '{segment}' at byte {position}")]
  InvalidVendor { input: String, segment: String, position: usize },

  #[strum(to_string = "'{input}': invalid package '{segment}' at byte {position}")]
  InvalidPackage { input: String, segment: String, position: usize },

  #[strum(to_string = "'{input}': invalid entity-name segment '{segment}' at byte {position}")]
  InvalidEntityName { input: String, segment: String, position: usize },

  #[strum(to_string = "'{input}': invalid version '{version}' at byte {position}")]
  InvalidVersion { input: String, version: String, position: usize },

  #[strum(to_string = "'{input}': a version is required here")]
  VersionRequired { input: String },

  #[strum(to_string = "'{input}': wildcard must terminate the expression")]
  WildcardNotTerminal { input: String },

  #[strum(to_string = "'{input}': unexpected trailing input at byte {position}: '{rest}'")]
  TrailingInput { input: String, position: usize, rest: String },

  #[strum(to_string = "'{input}': malformed query attributes: {message}")]
  InvalidQuery { input: String, message: String },

  #[strum(to_string = "'{input}': malformed attribute selector: {message}")]
  InvalidSelector { input: String, message: String },

  #[strum(to_string = "'{input}': a second anonymous uuid is not allowed")]
  DuplicateUuid { input: String },

  #[strum(to_string = "'{input}': anonymous uuid must be the last segment")]
  UuidNotTerminal { input: String },

  #[strum(to_string = "'{input}': unknown dynamic parameter '{name}'")]
  UnknownParameter { input: String, name: String },

  #[strum(to_string = "'{input}': query and attribute selector are mutually exclusive")]
  QueryAndSelector { input: String },

  #[strum(to_string = "'{input}': empty expression after 'cti.'")]
  Empty { input: String },
}

impl ParseError {
  #[must_use]
  pub fn input(&self) -> &str {
    match self {
      Self::InvalidVendor { input, .. }
      | Self::InvalidPackage { input, .. }
      | Self::InvalidEntityName { input, .. }
      | Self::InvalidVersion { input, .. }
      | Self::VersionRequired { input }
      | Self::WildcardNotTerminal { input }
      | Self::TrailingInput { input, .. }
      | Self::InvalidQuery { input, .. }
      | Self::InvalidSelector { input, .. }
      | Self::DuplicateUuid { input }
      | Self::UuidNotTerminal { input }
      | Self::UnknownParameter { input, .. }
      | Self::QueryAndSelector { input }
      | Self::Empty { input } => input,
    }
  }
}

impl std::error::Error for ParseError {}

/// The error returned by every parser entry point in [`crate::identifier`].
#[derive(Debug, Clone, PartialEq, Eq, Display)]
pub enum ParseFailure {
  #[strum(to_string = "{0}")]
  NotExpression(NotExpression),
  #[strum(to_string = "{0}")]
  Malformed(ParseError),
}

impl std::error::Error for ParseFailure {}

impl From<NotExpression> for ParseFailure {
  fn from(value: NotExpression) -> Self {
    Self::NotExpression(value)
  }
}

impl From<ParseError> for ParseFailure {
  fn from(value: ParseError) -> Self {
    Self::Malformed(value)
  }
}

/// Registry construction/linking failures (§4.4, §7).
#[derive(Debug, Clone, PartialEq, Eq, Display)]
pub enum RegistryError {
  #[strum(to_string = "an entity with cti '{cti}' already exists in the registry")]
  DuplicateCti { cti: String },

  #[strum(to_string = "entity '{cti}' declares parent '{parent_cti}' but no such type exists")]
  MissingParent { cti: String, parent_cti: String },

  #[strum(to_string = "entity '{cti}' cannot derive from final parent '{parent_cti}'")]
  FinalParentViolation { cti: String, parent_cti: String },

  #[strum(to_string = "'{cti}' does not name an entity in the registry")]
  NotFound { cti: String },
}

impl std::error::Error for RegistryError {}

/// Schema merge failures (§4.3, §7).
#[derive(Debug, Clone, PartialEq, Eq, Display)]
pub enum MergeError {
  #[strum(to_string = "cannot merge schema of type '{source_type}' into schema of type '{target_type}'")]
  TypeMismatch { source_type: String, target_type: String },

  #[strum(to_string = "no member of the parent anyOf union is compatible with the child schema")]
  EmptyUnionIntersection,

  #[strum(to_string = "attribute selector '{selector}' does not resolve against the merged schema")]
  SelectorNotFound { selector: String },

  #[strum(to_string = "property '{property}' is declared 'cti.overridable: false' by its parent and cannot be overridden")]
  NotOverridable { property: String },
}

impl std::error::Error for MergeError {}

/// One violated validation rule, tagged with a [`Severity`] (§4.5, §7).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
  pub severity: Severity,
  pub rule: &'static str,
  pub message: String,
}

impl ValidationError {
  #[must_use]
  pub fn error(rule: &'static str, message: impl Into<String>) -> Self {
    Self { severity: Severity::Error, rule, message: message.into() }
  }

  #[must_use]
  pub fn warning(rule: &'static str, message: impl Into<String>) -> Self {
    Self { severity: Severity::Warning, rule, message: message.into() }
  }

  #[must_use]
  pub fn info(rule: &'static str, message: impl Into<String>) -> Self {
    Self { severity: Severity::Info, rule, message: message.into() }
  }
}

impl std::fmt::Display for ValidationError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "[{}] {}: {}", self.severity, self.rule, self.message)
  }
}

impl std::error::Error for ValidationError {}

/// A tree of validation messages rooted at one entity's CTI (§4.5, §7).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
  pub messages: indexmap::IndexMap<String, Vec<ValidationError>>,
}

impl ValidationReport {
  #[must_use]
  pub fn new() -> Self {
    Self::default()
  }

  pub fn record(&mut self, cti: &str, error: ValidationError) {
    self.messages.entry(cti.to_string()).or_default().push(error);
  }

  pub fn extend(&mut self, cti: &str, errors: impl IntoIterator<Item = ValidationError>) {
    self.messages.entry(cti.to_string()).or_default().extend(errors);
  }

  #[must_use]
  pub fn has_errors(&self) -> bool {
    self
      .messages
      .values()
      .any(|errs| errs.iter().any(|e| e.severity == Severity::Error))
  }

  #[must_use]
  pub fn for_entity(&self, cti: &str) -> &[ValidationError] {
    self.messages.get(cti).map_or(&[], Vec::as_slice)
  }

  pub fn iter(&self) -> impl Iterator<Item = (&str, &ValidationError)> {
    self
      .messages
      .iter()
      .flat_map(|(cti, errs)| errs.iter().map(move |e| (cti.as_str(), e)))
  }
}

/// A severity-tagged free-text message keyed by an (old, new) entity pair
/// during compatibility checking (§4.6, §7).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompatibilityMessage {
  pub severity: Severity,
  pub path: String,
  pub message: String,
}

impl CompatibilityMessage {
  #[must_use]
  pub fn error(path: impl Into<String>, message: impl Into<String>) -> Self {
    Self { severity: Severity::Error, path: path.into(), message: message.into() }
  }

  #[must_use]
  pub fn warning(path: impl Into<String>, message: impl Into<String>) -> Self {
    Self { severity: Severity::Warning, path: path.into(), message: message.into() }
  }
}

impl std::fmt::Display for CompatibilityMessage {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "[{}] {}: {}", self.severity, self.path, self.message)
  }
}

impl std::error::Error for CompatibilityMessage {}
