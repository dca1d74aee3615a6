//! The recursive-descent parser for the CTI grammar (spec §4.1, §6.1).
//!
//! The pack carries no parser-combinator crate (`nom`/`pest`/`winnow` appear
//! in none of the five example repos), so this follows the teacher's own
//! style of hand-rolled scanning over `&str` (see
//! `oas3-gen/src/generator/ast/parsed_path.rs::PathSegment::tokenize`):
//! slice the input at structural delimiters, then validate each slice with
//! a small static regex, the way the teacher validates rust identifiers in
//! `naming/identifiers.rs`.

use std::sync::LazyLock;

use regex::Regex;
use uuid::Uuid;

use super::ast::{Expression, NameSegment, Node, QueryAttribute, Segment, Version, VersionPart};
use super::options::ParserOptions;
use crate::error::{NotExpression, ParseError, ParseFailure};

static VENDOR_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[a-z][a-z0-9_]*$").unwrap());
static NAME_WORD_RE: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"^[A-Za-z0-9]([A-Za-z0-9_-]*[A-Za-z0-9])?$").unwrap());
static QUERY_KEY_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_]*$").unwrap());
static PARAM_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\$\{([A-Za-z_][A-Za-z0-9_]*)\}$").unwrap());

const PREFIX: &str = "cti.";

/// What a version lexeme is allowed to look like for a given entry point
/// (spec §4.1 table).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VersionMode {
  /// Full grammar: `v`, `v*`, `vN`, `vN.*`, `vN.N`; must be present.
  Full,
  /// `v`, `v*`, `vN` only (no minor part); must be present.
  MajorOnly,
  /// Any of the full forms, or omitted entirely.
  CanBeAbsent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Requirement {
  Forbidden,
  Optional,
  Required,
}

#[derive(Debug, Clone, Copy)]
struct EntryConfig {
  wildcards: bool,
  version: VersionMode,
  query: Requirement,
  selector: Requirement,
}

/// A configured CTI parser (spec §4.1, §9).
#[derive(Debug, Clone, Default)]
pub struct Parser {
  options: ParserOptions,
}

impl Parser {
  #[must_use]
  pub fn new() -> Self {
    Self { options: ParserOptions::new() }
  }

  #[must_use]
  pub fn with_options(options: ParserOptions) -> Self {
    Self { options }
  }

  /// Full grammar: query, selector, wildcards, full version.
  pub fn parse(&self, input: &str) -> Result<Expression, ParseFailure> {
    self.run(
      input,
      EntryConfig { wildcards: true, version: VersionMode::Full, query: Requirement::Optional, selector: Requirement::Optional },
    )
  }

  /// Query form: query required, no selector, no wildcards, major-only version.
  pub fn parse_query(&self, input: &str) -> Result<Expression, ParseFailure> {
    self.run(
      input,
      EntryConfig {
        wildcards: false,
        version: VersionMode::MajorOnly,
        query: Requirement::Required,
        selector: Requirement::Forbidden,
      },
    )
  }

  /// Attribute-selector form: selector required, no query, no wildcards, major-only version.
  pub fn parse_attribute_selector(&self, input: &str) -> Result<Expression, ParseFailure> {
    self.run(
      input,
      EntryConfig {
        wildcards: false,
        version: VersionMode::MajorOnly,
        query: Requirement::Forbidden,
        selector: Requirement::Required,
      },
    )
  }

  /// Plain identifier: no query, no selector, no wildcards, full version.
  pub fn parse_identifier(&self, input: &str) -> Result<Expression, ParseFailure> {
    if input.contains(['*', '[', '@']) {
      return Err(ParseError::WildcardNotTerminal { input: input.to_string() }.into());
    }
    self.run(
      input,
      EntryConfig { wildcards: false, version: VersionMode::Full, query: Requirement::Forbidden, selector: Requirement::Forbidden },
    )
  }

  /// Reference form: wildcards allowed, version may be absent, no query/selector.
  pub fn parse_reference(&self, input: &str) -> Result<Expression, ParseFailure> {
    self.run(
      input,
      EntryConfig {
        wildcards: true,
        version: VersionMode::CanBeAbsent,
        query: Requirement::Forbidden,
        selector: Requirement::Forbidden,
      },
    )
  }

  fn run(&self, input: &str, cfg: EntryConfig) -> Result<Expression, ParseFailure> {
    let Some(rest) = input.strip_prefix(PREFIX) else {
      return Err(NotExpression { input: input.to_string() }.into());
    };

    if cfg.query == Requirement::Required && !input.contains('[') {
      return Err(ParseError::InvalidQuery { input: input.to_string(), message: "a query block is required".into() }.into());
    }
    if cfg.selector == Requirement::Required && !input.contains('@') {
      return Err(ParseError::InvalidSelector { input: input.to_string(), message: "an attribute selector is required".into() }.into());
    }

    let mut cursor = rest;
    let mut nodes: Vec<Node> = Vec::new();
    let mut anonymous_uuid = None;

    loop {
      let delim_pos = cursor.find(['~', '[', '@']);
      let chunk = match delim_pos {
        Some(p) => &cursor[..p],
        None => cursor,
      };

      let node = parse_ctx(input, chunk, cfg, &self.options)?;
      cursor = match delim_pos {
        Some(p) => &cursor[p..],
        None => "",
      };
      let node_is_wildcard_terminal = node.is_wildcard_terminal();
      nodes.push(node);

      let Some(delim) = cursor.chars().next() else { break };

      if delim == '~' {
        if node_is_wildcard_terminal {
          return Err(ParseError::WildcardNotTerminal { input: input.to_string() }.into());
        }

        let after_tilde = &cursor[1..];
        if self.options.allow_anonymous_uuid && after_tilde.len() >= 36 && after_tilde.as_bytes()[..36].is_ascii() {
          if let Ok(uuid) = after_tilde[..36].parse::<Uuid>() {
            let remainder = &after_tilde[36..];
            if remainder.starts_with('~') {
              let second = &remainder[1..];
              if second.len() >= 36 && second[..36.min(second.len())].parse::<Uuid>().is_ok() {
                return Err(ParseError::DuplicateUuid { input: input.to_string() }.into());
              }
              return Err(ParseError::UuidNotTerminal { input: input.to_string() }.into());
            }
            anonymous_uuid = Some(uuid);
            cursor = remainder;
            break;
          }
        }

        cursor = after_tilde;
        continue;
      }

      break;
    }

    if nodes.is_empty() {
      return Err(ParseError::Empty { input: input.to_string() }.into());
    }
    let root = nodes
      .into_iter()
      .rev()
      .reduce(|child, mut parent| {
        parent.child = Some(Box::new(child));
        parent
      })
      .expect("nodes is non-empty");

    let (query_attributes, attribute_selector) = parse_decorations(input, cursor, cfg, &self.options)?;

    Ok(Expression { root, anonymous_uuid, query_attributes, attribute_selector })
  }
}

fn parse_ctx(input: &str, chunk: &str, cfg: EntryConfig, options: &ParserOptions) -> Result<Node, ParseFailure> {
  let tokens: Vec<&str> = chunk.split('.').collect();
  if tokens.is_empty() || tokens[0].is_empty() {
    return Err(ParseError::Empty { input: input.to_string() }.into());
  }

  // Lone "*": the entire node is wildcarded.
  if cfg.wildcards && tokens.len() == 1 && tokens[0] == "*" {
    return Ok(Node { vendor: Segment::Wildcard, package: Segment::Wildcard, entity_name: Vec::new(), version: Version::Absent, child: None });
  }

  let vendor = parse_segment(input, tokens[0], "vendor", cfg, options)?;
  if matches!(vendor, Segment::Wildcard) {
    if tokens.len() != 1 {
      return Err(ParseError::WildcardNotTerminal { input: input.to_string() }.into());
    }
    return Ok(Node { vendor, package: Segment::Wildcard, entity_name: Vec::new(), version: Version::Absent, child: None });
  }

  if tokens.len() < 2 {
    return Err(ParseError::InvalidPackage { input: input.to_string(), segment: String::new(), position: 0 }.into());
  }
  let package = parse_segment(input, tokens[1], "package", cfg, options)?;
  if matches!(package, Segment::Wildcard) {
    if tokens.len() != 2 {
      return Err(ParseError::WildcardNotTerminal { input: input.to_string() }.into());
    }
    return Ok(Node { vendor, package, entity_name: Vec::new(), version: Version::Absent, child: None });
  }

  let remaining = &tokens[2..];
  if remaining.is_empty() {
    return Err(ParseError::InvalidEntityName { input: input.to_string(), segment: String::new(), position: 0 }.into());
  }

  // A bare trailing "*" is a wildcard entity-name segment, not a version.
  if cfg.wildcards && *remaining.last().unwrap() == "*" {
    let mut entity_name = parse_name_words(input, &remaining[..remaining.len() - 1])?;
    entity_name.push(NameSegment::Wildcard);
    return Ok(Node { vendor, package, entity_name, version: Version::Absent, child: None });
  }

  let (name_tokens, version) = split_version(input, remaining, cfg.version)?;
  if name_tokens.is_empty() {
    return Err(ParseError::InvalidEntityName { input: input.to_string(), segment: String::new(), position: 0 }.into());
  }
  let entity_name = parse_name_words(input, name_tokens)?;

  Ok(Node { vendor, package, entity_name, version, child: None })
}

fn parse_segment(input: &str, token: &str, field: &str, cfg: EntryConfig, options: &ParserOptions) -> Result<Segment, ParseFailure> {
  if cfg.wildcards && token == "*" {
    return Ok(Segment::Wildcard);
  }
  if let Some(caps) = PARAM_RE.captures(token) {
    let name = caps[1].to_string();
    if !options.param_allowed(&name) {
      return Err(ParseError::UnknownParameter { input: input.to_string(), name }.into());
    }
    return Ok(Segment::Named(name));
  }
  if VENDOR_RE.is_match(token) {
    return Ok(Segment::Named(token.to_string()));
  }
  let err = match field {
    "vendor" => ParseError::InvalidVendor { input: input.to_string(), segment: token.to_string(), position: 0 },
    _ => ParseError::InvalidPackage { input: input.to_string(), segment: token.to_string(), position: 0 },
  };
  Err(err.into())
}

fn parse_name_words(input: &str, tokens: &[&str]) -> Result<Vec<NameSegment>, ParseFailure> {
  tokens.iter().map(|tok| parse_name_word(input, tok)).collect()
}

fn parse_name_word(input: &str, token: &str) -> Result<NameSegment, ParseFailure> {
  if let Some(inner) = token.strip_prefix('_').and_then(|t| t.strip_suffix('_')) {
    if inner.is_empty() || NAME_WORD_RE.is_match(inner) {
      return Ok(NameSegment::Word(token.to_string()));
    }
  } else if NAME_WORD_RE.is_match(token) {
    return Ok(NameSegment::Word(token.to_string()));
  }
  Err(ParseError::InvalidEntityName { input: input.to_string(), segment: token.to_string(), position: 0 }.into())
}

fn is_version_major_token(tok: &str) -> bool {
  tok == "v" || tok == "v*" || is_version_major_digits(tok)
}

/// True for `vN` specifically (not bare `v`/`v*`) — the only major form the
/// two-token `vN.N` production admits.
fn is_version_major_digits(tok: &str) -> bool {
  tok.len() > 1 && tok.starts_with('v') && tok[1..].bytes().all(|b| b.is_ascii_digit())
}

fn is_version_minor_token(tok: &str) -> bool {
  tok == "*" || (!tok.is_empty() && tok.bytes().all(|b| b.is_ascii_digit()))
}

/// `None` on a major segment whose digits don't fit a `u32` — the caller
/// turns that into `ParseError::InvalidVersion` rather than silently
/// aliasing an oversized version onto `v0`.
fn parse_major(tok: &str) -> Option<VersionPart> {
  if tok == "v" || tok == "v*" {
    Some(VersionPart::Wildcard)
  } else {
    tok[1..].parse().ok().map(VersionPart::Num)
  }
}

fn parse_minor(tok: &str) -> Option<VersionPart> {
  if tok == "*" {
    Some(VersionPart::Wildcard)
  } else {
    tok.parse().ok().map(VersionPart::Num)
  }
}

fn no_leading_zero(tok: &str) -> bool {
  let digits = tok.trim_start_matches('v');
  digits == "0" || digits == "*" || !digits.starts_with('0')
}

/// Splits the dot-tokens following vendor/package into `(name_tokens, version)`,
/// honouring the entry point's [`VersionMode`].
fn split_version<'a>(input: &str, remaining: &'a [&'a str], mode: VersionMode) -> Result<(&'a [&'a str], Version), ParseFailure> {
  if remaining.len() >= 2 {
    let major_tok = remaining[remaining.len() - 2];
    let minor_tok = remaining[remaining.len() - 1];
    if is_version_major_digits(major_tok) && is_version_minor_token(minor_tok) && no_leading_zero(major_tok) && no_leading_zero(minor_tok) {
      if mode == VersionMode::MajorOnly {
        return Err(ParseError::InvalidVersion { input: input.to_string(), version: format!("{major_tok}.{minor_tok}"), position: 0 }.into());
      }
      let (Some(major), Some(minor)) = (parse_major(major_tok), parse_minor(minor_tok)) else {
        return Err(ParseError::InvalidVersion { input: input.to_string(), version: format!("{major_tok}.{minor_tok}"), position: 0 }.into());
      };
      let version = Version::Full(major, minor);
      if matches!(version, Version::Full(VersionPart::Num(0), VersionPart::Num(0))) {
        return Err(ParseError::InvalidVersion { input: input.to_string(), version: "0.0".to_string(), position: 0 }.into());
      }
      return Ok((&remaining[..remaining.len() - 2], version));
    }
  }

  if let Some(last) = remaining.last()
    && is_version_major_token(last)
    && no_leading_zero(last)
  {
    let Some(major) = parse_major(last) else {
      return Err(ParseError::InvalidVersion { input: input.to_string(), version: last.to_string(), position: 0 }.into());
    };
    return Ok((&remaining[..remaining.len() - 1], Version::Major(major)));
  }

  match mode {
    VersionMode::CanBeAbsent => Ok((remaining, Version::Absent)),
    VersionMode::Full | VersionMode::MajorOnly => Err(ParseError::VersionRequired { input: input.to_string() }.into()),
  }
}

fn parse_decorations(
  input: &str,
  cursor: &str,
  cfg: EntryConfig,
  options: &ParserOptions,
) -> Result<(Vec<QueryAttribute>, Option<Vec<String>>), ParseFailure> {
  if cursor.is_empty() {
    return Ok((Vec::new(), None));
  }

  if let Some(rest) = cursor.strip_prefix('[') {
    if cfg.query == Requirement::Forbidden {
      return Err(ParseError::TrailingInput { input: input.to_string(), position: 0, rest: cursor.to_string() }.into());
    }
    let (attrs, tail) = parse_query_block(input, rest, options)?;
    if !tail.is_empty() {
      return Err(ParseError::TrailingInput { input: input.to_string(), position: 0, rest: tail.to_string() }.into());
    }
    return Ok((attrs, None));
  }

  if let Some(rest) = cursor.strip_prefix('@') {
    if cfg.selector == Requirement::Forbidden {
      return Err(ParseError::TrailingInput { input: input.to_string(), position: 0, rest: cursor.to_string() }.into());
    }
    let selector = parse_selector_path(input, rest)?;
    return Ok((Vec::new(), Some(selector)));
  }

  Err(ParseError::TrailingInput { input: input.to_string(), position: 0, rest: cursor.to_string() }.into())
}

fn parse_selector_path(input: &str, path: &str) -> Result<Vec<String>, ParseFailure> {
  if path.is_empty() {
    return Err(ParseError::InvalidSelector { input: input.to_string(), message: "empty path".into() }.into());
  }
  let segments: Vec<&str> = path.split('.').collect();
  for seg in &segments {
    // "#" denotes "every element" when a selector walks through an array schema.
    if *seg == "#" {
      continue;
    }
    if seg.is_empty() || !seg.chars().next().unwrap().is_ascii_alphabetic() {
      return Err(ParseError::InvalidSelector { input: input.to_string(), message: format!("invalid path segment '{seg}'") }.into());
    }
    if !seg.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
      return Err(ParseError::InvalidSelector { input: input.to_string(), message: format!("invalid path segment '{seg}'") }.into());
    }
  }
  Ok(segments.into_iter().map(str::to_string).collect())
}

/// Parses `k1=v1,k2=v2,...]`, returning the attributes and whatever trails
/// the closing `]`.
fn parse_query_block<'a>(input: &str, rest: &'a str, options: &ParserOptions) -> Result<(Vec<QueryAttribute>, &'a str), ParseFailure> {
  let mut attrs = Vec::new();
  let mut cursor = rest;

  loop {
    let (key, after_key) = take_key(input, cursor)?;
    let after_eq = after_key
      .strip_prefix('=')
      .ok_or_else(|| ParseFailure::from(ParseError::InvalidQuery { input: input.to_string(), message: format!("expected '=' after key '{key}'") }))?;
    let (raw_value, after_value) = take_value(input, after_eq)?;

    if attrs.iter().any(|a: &QueryAttribute| a.name == key) {
      return Err(ParseError::InvalidQuery { input: input.to_string(), message: format!("duplicate key '{key}'") }.into());
    }

    let parsed_value = Parser::with_options(options.clone()).parse_reference(&raw_value).ok().map(Box::new);
    attrs.push(QueryAttribute { name: key, raw_value, parsed_value });

    cursor = after_value;
    if let Some(next) = cursor.strip_prefix(',') {
      cursor = next;
      continue;
    }
    if let Some(tail) = cursor.strip_prefix(']') {
      return Ok((attrs, tail));
    }
    return Err(ParseError::InvalidQuery { input: input.to_string(), message: "expected ',' or ']'".into() }.into());
  }
}

fn take_key<'a>(input: &str, cursor: &'a str) -> Result<(String, &'a str), ParseFailure> {
  let end = cursor.find('=').ok_or_else(|| ParseFailure::from(ParseError::InvalidQuery { input: input.to_string(), message: "missing '='".into() }))?;
  let key = &cursor[..end];
  if !QUERY_KEY_RE.is_match(key) {
    return Err(ParseError::InvalidQuery { input: input.to_string(), message: format!("invalid key '{key}'") }.into());
  }
  Ok((key.to_string(), &cursor[end..]))
}

fn take_value<'a>(input: &str, cursor: &'a str) -> Result<(String, &'a str), ParseFailure> {
  if let Some(rest) = cursor.strip_prefix('\'') {
    return take_quoted(input, rest, '\'');
  }
  if let Some(rest) = cursor.strip_prefix('"') {
    return take_quoted(input, rest, '"');
  }
  let end = cursor.find([',', ']']).unwrap_or(cursor.len());
  Ok((cursor[..end].to_string(), &cursor[end..]))
}

#[cfg(test)]
mod tests {
  use pretty_assertions::assert_eq;

  use super::*;
  use crate::error::ParseError;

  fn parser_with_uuid() -> Parser {
    Parser::with_options(ParserOptions::new().with_anonymous_uuid())
  }

  #[test]
  fn parse_identifier_rejects_decorations() {
    let parser = Parser::new();
    assert!(parser.parse_identifier("cti.acme.evt.*").is_err());
    assert!(parser.parse_identifier("cti.acme.evt.event.v1[region=\"us\"]").is_err());
    assert!(parser.parse_identifier("cti.acme.evt.event.v1@payload").is_err());
    assert!(parser.parse_identifier("cti.acme.evt.event.v1.0").is_ok());
  }

  #[test]
  fn parse_query_requires_a_query_block() {
    let parser = Parser::new();
    assert!(parser.parse_query("cti.acme.evt.event.v1").is_err());
    assert!(parser.parse_query("cti.acme.evt.event.v1[region=\"us\"]").is_ok());
  }

  #[test]
  fn parse_attribute_selector_requires_a_selector() {
    let parser = Parser::new();
    assert!(parser.parse_attribute_selector("cti.acme.evt.event.v1").is_err());
    assert!(parser.parse_attribute_selector("cti.acme.evt.event.v1@payload.amount").is_ok());
  }

  #[test]
  fn parse_reference_accepts_wildcard_and_absent_version_forms() {
    let parser = Parser::new();
    for input in ["cti.acme.*", "cti.*", "cti.acme.evt.event.v", "cti.acme.evt.event.v1", "cti.acme.evt.event.v1.*", "cti.acme.evt.event"] {
      assert!(parser.parse_reference(input).is_ok(), "expected {input} to parse");
    }
  }

  #[test]
  fn version_zero_zero_is_rejected() {
    let parser = Parser::new();
    let err = parser.parse_identifier("cti.acme.evt.event.v0.0").unwrap_err();
    assert!(matches!(err, ParseFailure::Malformed(ParseError::InvalidVersion { .. })));
  }

  #[test]
  fn version_leading_zero_is_rejected() {
    let parser = Parser::new();
    assert!(parser.parse_identifier("cti.acme.evt.event.v01.0").is_err());
    assert!(parser.parse_identifier("cti.acme.evt.event.v1.00").is_err());
  }

  #[test]
  fn version_overflowing_u32_is_rejected_not_aliased_to_zero() {
    let parser = Parser::new();
    let err = parser.parse_identifier("cti.acme.evt.event.v4294967296").unwrap_err();
    assert!(matches!(err, ParseFailure::Malformed(ParseError::InvalidVersion { .. })));
    let err = parser.parse_identifier("cti.acme.evt.event.v1.4294967296").unwrap_err();
    assert!(matches!(err, ParseFailure::Malformed(ParseError::InvalidVersion { .. })));
  }

  #[test]
  fn anonymous_uuid_must_be_the_last_segment() {
    let parser = parser_with_uuid();
    let expr = parser.parse("cti.acme.evt.event.v1.0~550e8400-e29b-41d4-a716-446655440000").unwrap();
    assert!(expr.anonymous_uuid.is_some());

    let err = parser
      .parse("cti.acme.evt.event.v1.0~550e8400-e29b-41d4-a716-446655440000~other.evt.login.v1.0")
      .unwrap_err();
    assert!(matches!(err, ParseFailure::Malformed(ParseError::UuidNotTerminal { .. })));

    let err = parser
      .parse("cti.acme.evt.event.v1.0~550e8400-e29b-41d4-a716-446655440000~660e8400-e29b-41d4-a716-446655440000")
      .unwrap_err();
    assert!(matches!(err, ParseFailure::Malformed(ParseError::DuplicateUuid { .. })));
  }

  #[test]
  fn anonymous_uuid_rejected_without_option() {
    let parser = Parser::new();
    let expr = parser.parse("cti.acme.evt.event.v1.0~other.evt.login.v1.0").unwrap();
    assert_eq!(expr.depth(), 2);
  }

  #[test]
  fn not_an_expression_is_distinguished_from_malformed() {
    let parser = Parser::new();
    assert!(matches!(parser.parse("not-a-cti"), Err(ParseFailure::NotExpression(_))));
    assert!(matches!(parser.parse("cti.ACME.evt.event.v1.0"), Err(ParseFailure::Malformed(_))));
  }
}

fn take_quoted<'a>(input: &str, rest: &'a str, quote: char) -> Result<(String, &'a str), ParseFailure> {
  let mut value = String::new();
  let mut chars = rest.char_indices();
  while let Some((i, c)) = chars.next() {
    if c == '\\' {
      let Some((_, escaped)) = chars.next() else {
        return Err(ParseError::InvalidQuery { input: input.to_string(), message: "dangling escape".into() }.into());
      };
      value.push(match escaped {
        'a' => '\u{07}',
        'b' => '\u{08}',
        'f' => '\u{0C}',
        'n' => '\n',
        'r' => '\r',
        't' => '\t',
        'v' => '\u{0B}',
        '\'' => '\'',
        '"' => '"',
        '\\' => '\\',
        other => other,
      });
      continue;
    }
    if c == quote {
      return Ok((value, &rest[i + 1..]));
    }
    value.push(c);
  }
  Err(ParseError::InvalidQuery { input: input.to_string(), message: "unterminated quoted value".into() }.into())
}
