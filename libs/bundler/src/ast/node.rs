use std::str::FromStr;

use serde_json::{Map, Value};
use strum::EnumString;

const STACK_RED_ZONE: usize = 128 * 1024;
const STACK_GROW_SIZE: usize = 4 * 1024 * 1024;

/// Grow the stack before recursing into deeply nested AST nodes.
#[inline]
pub fn with_stack<R>(f: impl FnOnce() -> R) -> R {
  stacker::maybe_grow(STACK_RED_ZONE, STACK_GROW_SIZE, f)
}

/// The `nodeType` values this crate interprets. Anything else parses to `Unhandled` and is
/// treated generically.
#[derive(Clone, Debug, PartialEq, Eq, EnumString)]
pub enum NodeKind {
  SourceUnit,
  PragmaDirective,
  ImportDirective,
  ContractDefinition,
  InheritanceSpecifier,
  UsingForDirective,
  StructDefinition,
  EnumDefinition,
  EnumValue,
  UserDefinedValueTypeDefinition,
  ErrorDefinition,
  EventDefinition,
  FunctionDefinition,
  ModifierDefinition,
  ModifierInvocation,
  OverrideSpecifier,
  VariableDeclaration,
  ParameterList,
  StructuredDocumentation,
  IdentifierPath,

  ElementaryTypeName,
  UserDefinedTypeName,
  ArrayTypeName,
  Mapping,
  FunctionTypeName,

  Block,
  UncheckedBlock,
  ExpressionStatement,
  VariableDeclarationStatement,
  IfStatement,
  ForStatement,
  WhileStatement,
  DoWhileStatement,
  Return,
  EmitStatement,
  RevertStatement,
  TryStatement,
  TryCatchClause,
  Break,
  Continue,
  Throw,
  PlaceholderStatement,
  InlineAssembly,

  Assignment,
  BinaryOperation,
  UnaryOperation,
  Conditional,
  FunctionCall,
  FunctionCallOptions,
  MemberAccess,
  IndexAccess,
  IndexRangeAccess,
  Identifier,
  Literal,
  ElementaryTypeNameExpression,
  NewExpression,
  TupleExpression,

  YulBlock,
  YulVariableDeclaration,
  YulAssignment,
  YulExpressionStatement,
  YulFunctionCall,
  YulIdentifier,
  YulLiteral,
  YulTypedName,
  YulIf,
  YulSwitch,
  YulCase,
  YulForLoop,
  YulFunctionDefinition,
  YulBreak,
  YulContinue,
  YulLeave,

  #[strum(default)]
  Unhandled(String),
}

/// Borrowed view over one compact-JSON AST node (an object carrying `nodeType`).
#[derive(Clone, Copy, Debug)]
pub struct AstNode<'a> {
  raw: &'a Value,
  fields: &'a Map<String, Value>,
}

impl<'a> AstNode<'a> {
  pub fn new(raw: &'a Value) -> Option<Self> {
    let fields = raw.as_object()?;
    fields.get("nodeType")?.as_str()?;
    Some(Self { raw, fields })
  }

  pub fn raw(&self) -> &'a Value {
    self.raw
  }

  pub fn node_type(&self) -> &'a str {
    self
      .fields
      .get("nodeType")
      .and_then(Value::as_str)
      .unwrap_or_default()
  }

  pub fn kind(&self) -> NodeKind {
    let node_type = self.node_type();
    NodeKind::from_str(node_type).unwrap_or_else(|_| NodeKind::Unhandled(node_type.into()))
  }

  pub fn is(&self, kind: NodeKind) -> bool {
    self.kind() == kind
  }

  pub fn value(&self, key: &str) -> Option<&'a Value> {
    self.fields.get(key).filter(|value| !value.is_null())
  }

  pub fn str(&self, key: &str) -> Option<&'a str> {
    self.fields.get(key).and_then(Value::as_str)
  }

  pub fn str_or_empty(&self, key: &str) -> &'a str {
    self.str(key).unwrap_or_default()
  }

  pub fn bool(&self, key: &str) -> bool {
    self.fields.get(key).and_then(Value::as_bool).unwrap_or(false)
  }

  pub fn name(&self) -> &'a str {
    self.str_or_empty("name")
  }

  pub fn id(&self) -> Option<i64> {
    self.fields.get("id").and_then(Value::as_i64)
  }

  pub fn child(&self, key: &str) -> Option<AstNode<'a>> {
    self.fields.get(key).and_then(AstNode::new)
  }

  /// Node-valued entries of an array field. Non-node entries are skipped.
  pub fn children(&self, key: &str) -> Vec<AstNode<'a>> {
    self
      .fields
      .get(key)
      .and_then(Value::as_array)
      .map(|items| items.iter().filter_map(AstNode::new).collect())
      .unwrap_or_default()
  }

  /// Array field entries with holes preserved, as in tuple components.
  pub fn optional_children(&self, key: &str) -> Vec<Option<AstNode<'a>>> {
    self
      .fields
      .get(key)
      .and_then(Value::as_array)
      .map(|items| items.iter().map(AstNode::new).collect())
      .unwrap_or_default()
  }

  pub fn strings(&self, key: &str) -> Vec<&'a str> {
    self
      .fields
      .get(key)
      .and_then(Value::as_array)
      .map(|items| items.iter().filter_map(Value::as_str).collect())
      .unwrap_or_default()
  }

  /// Start offset from the `src` triple `start:length:file`.
  pub fn src_offset(&self) -> Option<usize> {
    self
      .str("src")?
      .split(':')
      .next()
      .and_then(|start| start.parse().ok())
  }

  /// Every node directly below this one, in source order.
  pub fn direct_children(&self) -> Vec<AstNode<'a>> {
    let mut found = Vec::new();
    for value in self.fields.values() {
      match value {
        Value::Object(_) => found.extend(AstNode::new(value)),
        Value::Array(items) => found.extend(items.iter().filter_map(AstNode::new)),
        _ => {}
      }
    }
    found.sort_by_key(|node| node.src_offset().unwrap_or(usize::MAX));
    found
  }

  /// Pre-order traversal, siblings visited in source order.
  pub fn walk(&self, visit: &mut dyn FnMut(AstNode<'a>)) {
    with_stack(|| {
      visit(*self);
      for child in self.direct_children() {
        child.walk(visit);
      }
    })
  }

  /// `nodes` entries of a source unit or contract, filtered to one kind.
  pub fn nodes_of(&self, kind: NodeKind) -> Vec<AstNode<'a>> {
    self
      .children("nodes")
      .into_iter()
      .filter(|node| node.kind() == kind)
      .collect()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn unknown_node_types_fall_back_to_unhandled() {
    let value = json!({ "nodeType": "FunctionCall" });
    let node = AstNode::new(&value).expect("node");
    assert_eq!(node.kind(), NodeKind::FunctionCall);

    let value = json!({ "nodeType": "SomethingNew" });
    let node = AstNode::new(&value).expect("node");
    assert_eq!(node.kind(), NodeKind::Unhandled("SomethingNew".into()));

    assert!(AstNode::new(&json!({ "name": "x" })).is_none());
  }

  #[test]
  fn walk_is_pre_order_in_source_order() {
    let value = json!({
      "nodeType": "Block", "src": "0:50:0",
      "statements": [
        { "nodeType": "Break", "src": "30:6:0" },
        { "nodeType": "ExpressionStatement", "src": "2:10:0",
          "expression": { "nodeType": "Identifier", "name": "a", "src": "2:1:0" } }
      ],
      "documentation": { "nodeType": "StructuredDocumentation", "src": "20:5:0", "text": "x" }
    });
    let node = AstNode::new(&value).expect("node");
    let mut seen = Vec::new();
    node.walk(&mut |visited| seen.push(visited.node_type().to_string()));
    assert_eq!(
      seen,
      vec!["Block", "ExpressionStatement", "Identifier", "StructuredDocumentation", "Break"]
    );
  }

  #[test]
  fn tuple_holes_are_preserved() {
    let value = json!({
      "nodeType": "TupleExpression",
      "components": [null, { "nodeType": "Identifier", "name": "b" }]
    });
    let node = AstNode::new(&value).expect("node");
    let components = node.optional_children("components");
    assert!(components[0].is_none());
    assert_eq!(components[1].map(|c| c.name()), Some("b"));
  }
}
