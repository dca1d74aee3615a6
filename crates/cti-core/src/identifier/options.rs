use std::collections::BTreeSet;

/// Parser configuration, set once at construction (§9: "Parser options as a
/// config record").
///
/// Neither flag leaks into [`super::ast::Expression`] — they only change
/// which grammar extensions a given `Parser` instance will accept.
#[derive(Debug, Clone, Default)]
pub struct ParserOptions {
  /// Whether a trailing `~<uuid>` anonymous-entity suffix is admitted.
  pub allow_anonymous_uuid: bool,
  /// When `Some`, dynamic parameters `${name}` are admitted for any `name`
  /// in the set; `None` rejects all dynamic parameters.
  pub allowed_params: Option<BTreeSet<String>>,
}

impl ParserOptions {
  #[must_use]
  pub fn new() -> Self {
    Self::default()
  }

  #[must_use]
  pub fn with_anonymous_uuid(mut self) -> Self {
    self.allow_anonymous_uuid = true;
    self
  }

  #[must_use]
  pub fn with_allowed_params(mut self, params: impl IntoIterator<Item = impl Into<String>>) -> Self {
    self.allowed_params = Some(params.into_iter().map(Into::into).collect());
    self
  }

  #[must_use]
  pub(crate) fn param_allowed(&self, name: &str) -> bool {
    self.allowed_params.as_ref().is_some_and(|set| set.contains(name))
  }
}
