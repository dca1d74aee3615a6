//! The typed AST for the CTI string family (spec §3, §6.1).

use uuid::Uuid;

/// A vendor or package segment: either a lowercase identifier or the
/// literal wildcard `*`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
  Named(String),
  Wildcard,
}

impl Segment {
  #[must_use]
  pub fn as_named(&self) -> Option<&str> {
    match self {
      Self::Named(s) => Some(s.as_str()),
      Self::Wildcard => None,
    }
  }

  #[must_use]
  pub fn is_wildcard(&self) -> bool {
    matches!(self, Self::Wildcard)
  }
}

/// One segment of a dot-separated entity name. Only the last segment of the
/// whole name may be [`NameSegment::Wildcard`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NameSegment {
  Word(String),
  Wildcard,
}

impl NameSegment {
  #[must_use]
  pub fn is_wildcard(&self) -> bool {
    matches!(self, Self::Wildcard)
  }
}

/// A numeric version component, or the literal wildcard `*`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VersionPart {
  Num(u32),
  Wildcard,
}

/// The version lexeme of one node, in one of the three states named in
/// spec §3: absent, major-only, or full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Version {
  Absent,
  Major(VersionPart),
  Full(VersionPart, VersionPart),
}

impl Version {
  #[must_use]
  pub fn is_absent(&self) -> bool {
    matches!(self, Self::Absent)
  }

  #[must_use]
  pub fn major(&self) -> Option<VersionPart> {
    match self {
      Self::Absent => None,
      Self::Major(m) | Self::Full(m, _) => Some(*m),
    }
  }

  #[must_use]
  pub fn minor(&self) -> Option<VersionPart> {
    match self {
      Self::Full(_, m) => Some(*m),
      _ => None,
    }
  }
}

/// One node (`CTX`) of the inheritance chain.
///
/// A wildcard on `vendor`, `package`, the last `entity_name` segment, or the
/// version terminates the node: fields after the wildcarded one are left at
/// their "nothing declared" default (empty name, absent version) rather
/// than populated, since the grammar never supplies them in that case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
  pub vendor: Segment,
  pub package: Segment,
  pub entity_name: Vec<NameSegment>,
  pub version: Version,
  pub child: Option<Box<Node>>,
}

impl Node {
  /// True if this node ends in a wildcard anywhere (vendor, package, the
  /// last name segment, or the version) — per §4.1, such a node must be the
  /// last in the chain and the expression must end there.
  #[must_use]
  pub fn is_wildcard_terminal(&self) -> bool {
    self.vendor.is_wildcard()
      || self.package.is_wildcard()
      || self.entity_name.last().is_some_and(NameSegment::is_wildcard)
      || matches!(self.version, Version::Major(VersionPart::Wildcard) | Version::Full(_, VersionPart::Wildcard))
  }

  /// The dotted entity name with underscore-wrapped segments rendered
  /// literally (`_seg_`), used by [`crate::identifier::render`].
  #[must_use]
  pub fn entity_name_words(&self) -> Vec<&str> {
    self
      .entity_name
      .iter()
      .map(|seg| match seg {
        NameSegment::Word(w) => w.as_str(),
        NameSegment::Wildcard => "*",
      })
      .collect()
  }
}

/// One `name=value` query attribute (§3, §4.1, §6.1).
///
/// The value is always kept as the literal string that appeared in the
/// source; if it additionally parses as a CTI reference, that parse is
/// cached in `parsed_value` per §4.1 ("each value is additionally re-parsed
/// as a reference").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryAttribute {
  pub name: String,
  pub raw_value: String,
  pub parsed_value: Option<Box<Expression>>,
}

/// A fully parsed CTI string plus its trailing decorations (§3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expression {
  pub root: Node,
  pub anonymous_uuid: Option<Uuid>,
  pub query_attributes: Vec<QueryAttribute>,
  pub attribute_selector: Option<Vec<String>>,
}

impl Expression {
  /// Iterates the inheritance chain from root to the final (most derived)
  /// node.
  pub fn chain(&self) -> impl Iterator<Item = &Node> {
    let mut current = Some(&self.root);
    std::iter::from_fn(move || {
      let node = current.take()?;
      current = node.child.as_deref();
      Some(node)
    })
  }

  /// The last (most derived) node in the chain.
  #[must_use]
  pub fn last_node(&self) -> &Node {
    self.chain().last().expect("chain always has at least one node")
  }

  /// True if the chain has more than one node, i.e. this expression
  /// declares a parent via `~`.
  #[must_use]
  pub fn has_parent(&self) -> bool {
    self.root.child.is_some()
  }

  #[must_use]
  pub fn depth(&self) -> usize {
    self.chain().count()
  }
}
