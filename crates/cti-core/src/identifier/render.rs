//! Canonical rendering of a parsed [`Expression`] back to its string form.
//!
//! Rendering is the left inverse of parsing: `parse(render(parse(s)))` always
//! reproduces the same [`Expression`], even though `render(parse(s))` is not
//! required to equal `s` byte-for-byte (query values are always rendered with
//! double quotes, regardless of how the source wrote them — see §8's
//! round-trip property).

use std::fmt::Write as _;

use super::ast::{Expression, NameSegment, Node, Segment, Version, VersionPart};

impl Expression {
  /// Renders this expression back to its canonical CTI string form.
  #[must_use]
  pub fn render(&self) -> String {
    let mut out = String::from("cti.");
    let mut first = true;
    for node in self.chain() {
      if !first {
        out.push('~');
      }
      first = false;
      render_node(node, &mut out);
    }

    if let Some(uuid) = &self.anonymous_uuid {
      write!(out, "~{uuid}").expect("writing to a String never fails");
    }

    if !self.query_attributes.is_empty() {
      out.push('[');
      for (i, attr) in self.query_attributes.iter().enumerate() {
        if i > 0 {
          out.push(',');
        }
        write!(out, "{}=\"{}\"", attr.name, escape_value(&attr.raw_value)).expect("writing to a String never fails");
      }
      out.push(']');
    } else if let Some(path) = &self.attribute_selector {
      out.push('@');
      out.push_str(&path.join("."));
    }

    out
  }
}

impl std::fmt::Display for Expression {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(&self.render())
  }
}

fn render_node(node: &Node, out: &mut String) {
  render_segment(&node.vendor, out);
  if matches!(node.vendor, Segment::Wildcard) {
    return;
  }
  out.push('.');
  render_segment(&node.package, out);
  if matches!(node.package, Segment::Wildcard) {
    return;
  }

  out.push('.');
  let words = node.entity_name_words();
  out.push_str(&words.join("."));
  if node.entity_name.last().is_some_and(NameSegment::is_wildcard) {
    return;
  }

  render_version(node.version, out);
}

fn render_segment(segment: &Segment, out: &mut String) {
  match segment {
    Segment::Named(name) => out.push_str(name),
    Segment::Wildcard => out.push('*'),
  }
}

fn render_version(version: Version, out: &mut String) {
  match version {
    Version::Absent => {}
    Version::Major(part) => {
      out.push('.');
      render_version_part(part, out, true);
    }
    Version::Full(major, minor) => {
      out.push('.');
      render_version_part(major, out, true);
      out.push('.');
      render_version_part(minor, out, false);
    }
  }
}

fn render_version_part(part: VersionPart, out: &mut String, is_major: bool) {
  match part {
    VersionPart::Wildcard => {
      if is_major {
        out.push_str("v*");
      } else {
        out.push('*');
      }
    }
    VersionPart::Num(n) => {
      if is_major {
        write!(out, "v{n}").expect("writing to a String never fails");
      } else {
        write!(out, "{n}").expect("writing to a String never fails");
      }
    }
  }
}

fn escape_value(raw: &str) -> String {
  let mut out = String::with_capacity(raw.len());
  for c in raw.chars() {
    match c {
      '"' => out.push_str("\\\""),
      '\\' => out.push_str("\\\\"),
      '\n' => out.push_str("\\n"),
      '\r' => out.push_str("\\r"),
      '\t' => out.push_str("\\t"),
      other => out.push(other),
    }
  }
  out
}

#[cfg(test)]
mod tests {
  use pretty_assertions::assert_eq;

  use crate::identifier::parser::Parser;

  #[test]
  fn renders_full_chain_canonically() {
    let parser = Parser::new();
    let expr = parser.parse("cti.acme.evt.event.v1.0~acme.evt.login_event.v2.1").unwrap();
    assert_eq!(expr.render(), "cti.acme.evt.event.v1.0~acme.evt.login_event.v2.1");
  }

  #[test]
  fn round_trips_wildcard_forms() {
    let parser = Parser::new();
    for input in ["cti.*", "cti.acme.*", "cti.acme.evt.*", "cti.acme.evt.event.v*", "cti.acme.evt.event.v1.*"] {
      let expr = parser.parse(input).unwrap();
      assert_eq!(expr.render(), input, "input: {input}");
      let reparsed = parser.parse(&expr.render()).unwrap();
      assert_eq!(expr, reparsed);
    }
  }

  #[test]
  fn normalizes_query_value_quoting() {
    let parser = Parser::new();
    let expr = parser.parse_query("cti.acme.evt.event.v1[region='us']").unwrap();
    assert_eq!(expr.render(), "cti.acme.evt.event.v1[region=\"us\"]");
  }

  #[test]
  fn renders_attribute_selector() {
    let parser = Parser::new();
    let expr = parser.parse_attribute_selector("cti.acme.evt.event.v1@payload.amount").unwrap();
    assert_eq!(expr.render(), "cti.acme.evt.event.v1@payload.amount");
  }
}
