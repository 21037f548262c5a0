//! Invariant markers embedded in contract source.
//!
//! Detection is lexical: it matches the literal identifiers `FuzzLand`, `AssertionFailed`,
//! `assertionFailed` and names containing `Scribble`, without resolving symbols. Importing the
//! harness under another name or aliasing the event defeats it.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::Display;

use super::node::{AstNode, NodeKind};
use super::AstError;
use crate::compiler::output::RawCompilationOutput;

/// Harness contract exposing `bug()` and `typed_bug(..)`.
pub const HARNESS_CONTRACT: &str = "FuzzLand";
/// Prefix of the helper libraries Scribble injects into instrumented sources.
pub const UTILITY_LIBRARY_PREFIX: &str = "__ScribbleUtilsLib";
pub const ECHIDNA_PREFIX: &str = "echidna_";
pub const ASSERTION_EVENT: &str = "AssertionFailed";
pub const SCRIBBLE_ASSERTION_CALL: &str = "assertionFailed";
pub const SCRIBBLE_MARKER: &str = "Scribble";
pub const UNKNOWN_INVARIANT: &str = "Unknown Invariant";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum InvariantKind {
  Echidna,
  Bug,
  TypedBug,
  Scribble,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvariantFinding {
  pub name: String,
  #[serde(rename = "type")]
  pub kind: InvariantKind,
}

impl InvariantFinding {
  fn new(name: impl Into<String>, kind: InvariantKind) -> Self {
    Self {
      name: name.into(),
      kind,
    }
  }
}

/// Run a fresh extraction over every file of `output`.
pub fn extract(output: &RawCompilationOutput) -> Result<Vec<InvariantFinding>, AstError> {
  Extraction::new().run(output)
}

/// One extraction run. Owns the unnamed-bug counter so independent runs never share numbering.
#[derive(Debug, Default)]
pub struct Extraction {
  unnamed_bugs: usize,
  findings: Vec<InvariantFinding>,
}

impl Extraction {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn run(mut self, output: &RawCompilationOutput) -> Result<Vec<InvariantFinding>, AstError> {
    for (file, source) in &output.sources {
      let ast = source
        .ast
        .as_ref()
        .ok_or_else(|| AstError::MissingAst(file.clone()))?;
      let unit = AstNode::new(ast).ok_or_else(|| AstError::UnexpectedNode {
        expected: "SourceUnit",
        found: "non-node value".to_string(),
      })?;
      self.visit_source_unit(file, unit)?;
    }
    Ok(self.findings)
  }

  fn visit_source_unit(&mut self, file: &str, unit: AstNode<'_>) -> Result<(), AstError> {
    for contract in unit.nodes_of(NodeKind::ContractDefinition) {
      let name = contract
        .str("name")
        .filter(|name| !name.is_empty())
        .ok_or_else(|| AstError::MissingName {
          file: file.to_string(),
          node_type: "ContractDefinition",
        })?;
      if name == HARNESS_CONTRACT || name.starts_with(UTILITY_LIBRARY_PREFIX) {
        continue;
      }
      for function in contract.nodes_of(NodeKind::FunctionDefinition) {
        self.visit_function(function);
      }
    }
    Ok(())
  }

  fn visit_function(&mut self, function: AstNode<'_>) {
    if function.name().starts_with(ECHIDNA_PREFIX) {
      self
        .findings
        .push(InvariantFinding::new(function.name(), InvariantKind::Echidna));
    }
    function.walk(&mut |node| match node.kind() {
      NodeKind::FunctionCall => self.inspect_call(node),
      NodeKind::EmitStatement => self.inspect_emit(node),
      _ => {}
    });
  }

  /// `FuzzLand.bug()`, `FuzzLand.typed_bug(..)` and `<*Scribble*>.assertionFailed(..)`.
  fn inspect_call(&mut self, call: AstNode<'_>) {
    let Some(callee) = call.child("expression") else {
      return;
    };
    if !callee.is(NodeKind::MemberAccess) {
      return;
    }
    let base = callee
      .child("expression")
      .and_then(|base| base.str("name"))
      .unwrap_or_default();
    let member = callee.str_or_empty("memberName");

    if base == HARNESS_CONTRACT {
      match member {
        "bug" => {
          let name = format!("Unnamed Bug {}", self.unnamed_bugs);
          self.unnamed_bugs += 1;
          self.findings.push(InvariantFinding::new(name, InvariantKind::Bug));
        }
        "typed_bug" => self.findings.push(InvariantFinding::new(
          joined_arguments(call, callee),
          InvariantKind::TypedBug,
        )),
        _ => {}
      }
    }
    if base.contains(SCRIBBLE_MARKER) && member == SCRIBBLE_ASSERTION_CALL {
      self.findings.push(InvariantFinding::new(
        joined_arguments(call, callee),
        InvariantKind::Scribble,
      ));
    }
  }

  /// `emit AssertionFailed(..)` and `emit <*Scribble*>.AssertionFailed(..)`.
  fn inspect_emit(&mut self, emit: AstNode<'_>) {
    let Some(event_call) = emit.child("eventCall") else {
      return;
    };
    let Some(event) = event_call.child("expression") else {
      return;
    };

    match event.kind() {
      NodeKind::Identifier if event.name() == ASSERTION_EVENT => {
        self.findings.push(InvariantFinding::new(
          joined_arguments(event_call, event),
          InvariantKind::TypedBug,
        ));
      }
      NodeKind::MemberAccess if event.str("memberName") == Some(ASSERTION_EVENT) => {
        let base = event
          .child("expression")
          .and_then(|base| base.str("name"))
          .unwrap_or_default();
        if base.contains(SCRIBBLE_MARKER) {
          self.findings.push(InvariantFinding::new(
            joined_arguments(event_call, event),
            InvariantKind::Scribble,
          ));
        }
      }
      _ => {}
    }
  }
}

/// Name an invariant after its call arguments: literal values or identifier names when any
/// argument carries one, else the static argument types with string-literal markers stripped,
/// else [`UNKNOWN_INVARIANT`].
pub fn joined_arguments(call: AstNode<'_>, callee: AstNode<'_>) -> String {
  let arguments = call.children("arguments");
  let labels: Vec<Option<&str>> = arguments
    .iter()
    .map(|argument| {
      argument
        .str("value")
        .filter(|value| !value.is_empty())
        .or_else(|| argument.str("name").filter(|name| !name.is_empty()))
    })
    .collect();
  if labels.iter().any(Option::is_some) {
    return labels
      .into_iter()
      .map(Option::unwrap_or_default)
      .collect::<Vec<_>>()
      .join(",");
  }

  let types = argument_types(call).or_else(|| argument_types(callee));
  match types {
    Some(types) if !types.is_empty() => types.join(","),
    _ => UNKNOWN_INVARIANT.to_string(),
  }
}

fn argument_types(node: AstNode<'_>) -> Option<Vec<String>> {
  let entries = node.value("argumentTypes")?.as_array()?;
  let types: Vec<String> = entries
    .iter()
    .filter_map(|entry| entry.get("typeString").and_then(Value::as_str))
    .map(strip_literal_marker)
    .collect();
  (!types.is_empty()).then_some(types)
}

fn strip_literal_marker(type_string: &str) -> String {
  match type_string.strip_prefix("literal_string \"") {
    Some(rest) => rest.strip_suffix('"').unwrap_or(rest).to_string(),
    None => type_string.to_string(),
  }
}
