//! Pattern subsumption: does a (possibly wildcarded) pattern expression
//! match a concrete expression (spec §4.1, §8 "matching laws").

use super::ast::{Expression, NameSegment, Node, Segment, Version, VersionPart};

/// Controls whether query attributes participate in the match (spec §4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
  Strict,
  IgnoreQuery,
}

/// True if `pattern` subsumes `concrete`: every field `pattern` declares
/// must agree with `concrete`, and a wildcard at any position matches
/// anything remaining from that position on.
#[must_use]
pub fn match_expression(pattern: &Expression, concrete: &Expression, mode: MatchMode) -> bool {
  let mut p_iter = pattern.chain();
  let mut c_iter = concrete.chain();

  loop {
    match (p_iter.next(), c_iter.next()) {
      (Some(p), Some(c)) => {
        if !node_matches(p, c) {
          return false;
        }
        if p.is_wildcard_terminal() {
          return true;
        }
      }
      (Some(_), None) | (None, Some(_)) => return false,
      (None, None) => break,
    }
  }

  if pattern.anonymous_uuid.is_some() && pattern.anonymous_uuid != concrete.anonymous_uuid {
    return false;
  }

  if mode == MatchMode::Strict && !query_attributes_match(pattern, concrete) {
    return false;
  }

  if let Some(selector) = &pattern.attribute_selector
    && Some(selector) != concrete.attribute_selector.as_ref()
  {
    return false;
  }

  true
}

fn query_attributes_match(pattern: &Expression, concrete: &Expression) -> bool {
  pattern.query_attributes.iter().all(|p_attr| {
    concrete
      .query_attributes
      .iter()
      .any(|c_attr| c_attr.name == p_attr.name && c_attr.raw_value == p_attr.raw_value)
  })
}

fn node_matches(p: &Node, c: &Node) -> bool {
  if p.vendor.is_wildcard() {
    return true;
  }
  if !segment_matches(&p.vendor, &c.vendor) {
    return false;
  }

  if p.package.is_wildcard() {
    return true;
  }
  if !segment_matches(&p.package, &c.package) {
    return false;
  }

  if !entity_name_matches(&p.entity_name, &c.entity_name) {
    return false;
  }
  if p.entity_name.last().is_some_and(NameSegment::is_wildcard) {
    return true;
  }

  version_matches(p.version, c.version)
}

fn segment_matches(p: &Segment, c: &Segment) -> bool {
  match (p, c) {
    (Segment::Wildcard, _) => true,
    (Segment::Named(pn), Segment::Named(cn)) => pn == cn,
    (Segment::Named(_), Segment::Wildcard) => false,
  }
}

fn entity_name_matches(p: &[NameSegment], c: &[NameSegment]) -> bool {
  if p.last().is_some_and(NameSegment::is_wildcard) {
    let prefix = &p[..p.len() - 1];
    if c.len() < prefix.len() {
      return false;
    }
    return prefix.iter().zip(c.iter()).all(|(pw, cw)| matches!((pw, cw), (NameSegment::Word(a), NameSegment::Word(b)) if a == b));
  }

  if p.len() != c.len() {
    return false;
  }
  p.iter().zip(c.iter()).all(|(pw, cw)| matches!((pw, cw), (NameSegment::Word(a), NameSegment::Word(b)) if a == b))
}

fn version_matches(p: Version, c: Version) -> bool {
  match p {
    Version::Absent => true,
    Version::Major(VersionPart::Wildcard) => true,
    Version::Major(VersionPart::Num(m)) | Version::Full(VersionPart::Num(m), VersionPart::Wildcard) => {
      matches!(c.major(), Some(VersionPart::Num(cm)) if cm == m)
    }
    Version::Full(VersionPart::Num(m), VersionPart::Num(n)) => {
      matches!(c.major(), Some(VersionPart::Num(cm)) if cm == m) && matches!(c.minor(), Some(VersionPart::Num(cn)) if cn == n)
    }
    Version::Full(VersionPart::Wildcard, _) => true,
  }
}

#[cfg(test)]
mod tests {
  use test_case::test_case;

  use super::*;
  use crate::identifier::parser::Parser;

  fn parse_ref(s: &str) -> Expression {
    Parser::new().parse_reference(s).unwrap()
  }

  #[test_case("cti.*", "cti.acme.evt.event.v1.0" => true; "bare wildcard subsumes everything")]
  #[test_case("cti.acme.*", "cti.acme.evt.event.v1.0" => true; "vendor-scoped wildcard")]
  #[test_case("cti.other.*", "cti.acme.evt.event.v1.0" => false; "vendor mismatch")]
  #[test_case("cti.acme.evt.event.v*", "cti.acme.evt.event.v1.0" => true; "version wildcard ignores major and minor")]
  #[test_case("cti.acme.evt.event.v1", "cti.acme.evt.event.v1.9" => true; "major-only subsumes any minor")]
  #[test_case("cti.acme.evt.event.v1", "cti.acme.evt.event.v2.0" => false; "major mismatch rejected")]
  #[test_case("cti.acme.evt.event.v1.*", "cti.acme.evt.event.v1.9" => true; "explicit minor wildcard")]
  #[test_case("cti.acme.evt.event.v1.0", "cti.acme.evt.event.v1.1" => false; "exact version requires exact match")]
  #[test_case("cti.acme.evt.*", "cti.acme.evt.event.v1.0" => true; "name-level wildcard")]
  #[test_case("cti.acme.evt.event.v1.0~acme.evt.child.v2.0", "cti.acme.evt.event.v1.0~acme.evt.child.v2.0" => true; "two node chain exact match")]
  #[test_case("cti.acme.evt.event.v1.0~acme.evt.child.v2.0", "cti.acme.evt.event.v1.0" => false; "pattern deeper than concrete")]
  #[test_case("cti.acme.evt.event.v1.0", "cti.acme.evt.event.v1.0~acme.evt.child.v2.0" => false; "concrete deeper than pattern")]
  fn subsumption(pattern: &str, concrete: &str) -> bool {
    match_expression(&parse_ref(pattern), &parse_ref(concrete), MatchMode::Strict)
  }

  #[test]
  fn ignore_query_mode_skips_query_attributes() {
    let parser = Parser::new();
    let pattern = parser.parse_query("cti.acme.evt.event.v1[region=\"us\"]").unwrap();
    let concrete = parser.parse_query("cti.acme.evt.event.v1[region=\"eu\"]").unwrap();
    assert!(!match_expression(&pattern, &concrete, MatchMode::Strict));
    assert!(match_expression(&pattern, &concrete, MatchMode::IgnoreQuery));
  }
}
