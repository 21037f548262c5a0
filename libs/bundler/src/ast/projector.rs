use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::node::{AstNode, NodeKind};
use super::writer::{indent, SourceWriter};
use super::AstError;
use crate::compiler::output::RawCompilationOutput;

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceUnitProjection {
  pub header: String,
  pub contracts: Vec<ContractProjection>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContractProjection {
  pub name: String,
  pub docs: String,
  pub kind: String,
  #[serde(rename = "abstract")]
  pub is_abstract: bool,
  pub bases: Vec<String>,
  pub contract_header: String,
  pub modifiers: Vec<String>,
  pub state_variables: Vec<StateVariableProjection>,
  pub functions: Vec<FunctionProjection>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StateVariableProjection {
  pub name: String,
  pub docs: String,
  #[serde(rename = "type")]
  pub ty: String,
  pub body: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FunctionProjection {
  pub name: String,
  pub docs: String,
  pub args: Vec<ParameterProjection>,
  pub rets: Vec<ParameterProjection>,
  pub source: String,
  pub constructor: bool,
  pub implemented: bool,
  pub visibility: String,
  #[serde(rename = "virtual")]
  pub is_virtual: bool,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ParameterProjection {
  pub name: String,
  #[serde(rename = "type")]
  pub ty: String,
}

/// Project every file of a compiler output, keyed by source unit name.
pub fn project(
  output: &RawCompilationOutput,
) -> Result<BTreeMap<String, SourceUnitProjection>, AstError> {
  let mut projections = BTreeMap::new();
  for (file, source) in &output.sources {
    let ast = source
      .ast
      .as_ref()
      .ok_or_else(|| AstError::MissingAst(file.clone()))?;
    let unit = AstNode::new(ast)
      .filter(|node| node.is(NodeKind::SourceUnit))
      .ok_or_else(|| AstError::UnexpectedNode {
        expected: "SourceUnit",
        found: ast
          .get("nodeType")
          .and_then(|value| value.as_str())
          .unwrap_or("<none>")
          .to_string(),
      })?;
    let writer = SourceWriter::for_source_unit(unit);
    projections.insert(file.clone(), project_source_unit(&writer, unit));
  }
  Ok(projections)
}

pub fn project_source_unit(writer: &SourceWriter, unit: AstNode<'_>) -> SourceUnitProjection {
  let header = join_groups(
    writer,
    unit,
    &[
      NodeKind::PragmaDirective,
      NodeKind::ImportDirective,
      NodeKind::EnumDefinition,
      NodeKind::StructDefinition,
      NodeKind::UserDefinedValueTypeDefinition,
      NodeKind::UsingForDirective,
      NodeKind::VariableDeclaration,
      NodeKind::ErrorDefinition,
      NodeKind::FunctionDefinition,
    ],
  );
  let contracts = unit
    .nodes_of(NodeKind::ContractDefinition)
    .into_iter()
    .map(|contract| project_contract(writer, contract))
    .collect();
  SourceUnitProjection { header, contracts }
}

/// Each group's non-empty renderings joined by newlines, then non-empty groups joined the same way.
fn join_groups(writer: &SourceWriter, parent: AstNode<'_>, groups: &[NodeKind]) -> String {
  groups
    .iter()
    .map(|kind| {
      parent
        .nodes_of(kind.clone())
        .into_iter()
        .map(|node| match node.kind() {
          NodeKind::VariableDeclaration => writer.free_variable(node),
          _ => writer.write(node),
        })
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
    })
    .filter(|group| !group.is_empty())
    .collect::<Vec<_>>()
    .join("\n")
}

fn project_contract(writer: &SourceWriter, contract: AstNode<'_>) -> ContractProjection {
  let contract_header = join_groups(
    writer,
    contract,
    &[
      NodeKind::UsingForDirective,
      NodeKind::EnumDefinition,
      NodeKind::UserDefinedValueTypeDefinition,
      NodeKind::ErrorDefinition,
      NodeKind::EventDefinition,
      NodeKind::StructDefinition,
    ],
  );

  let state_variables = contract
    .nodes_of(NodeKind::VariableDeclaration)
    .into_iter()
    .map(|variable| StateVariableProjection {
      name: variable.name().to_string(),
      docs: writer.documentation(variable.value("documentation")),
      ty: variable
        .child("typeName")
        .map(|ty| writer.type_name(ty))
        .unwrap_or_default(),
      body: writer.state_variable(variable),
    })
    .collect();

  let functions = contract
    .nodes_of(NodeKind::FunctionDefinition)
    .into_iter()
    .map(|function| project_function(writer, function))
    .collect();

  let modifiers = contract
    .nodes_of(NodeKind::ModifierDefinition)
    .into_iter()
    .map(|modifier| writer.write(modifier))
    .collect();

  ContractProjection {
    name: contract.name().to_string(),
    docs: writer.documentation(contract.value("documentation")),
    kind: writer.contract_kind(contract).to_string(),
    is_abstract: contract.bool("abstract"),
    bases: contract
      .children("baseContracts")
      .into_iter()
      .map(|base| writer.inheritance(base))
      .collect(),
    contract_header,
    modifiers,
    state_variables,
    functions,
  }
}

fn project_function(writer: &SourceWriter, function: AstNode<'_>) -> FunctionProjection {
  let parameters = |key: &str| -> Vec<ParameterProjection> {
    function
      .child(key)
      .map(|list| list.children("parameters"))
      .unwrap_or_default()
      .into_iter()
      .map(|parameter| ParameterProjection {
        name: parameter.name().to_string(),
        ty: parameter
          .child("typeName")
          .map(|ty| writer.type_name(ty))
          .unwrap_or_default(),
      })
      .collect()
  };

  let implemented = match function.value("implemented") {
    Some(value) => value.as_bool().unwrap_or(false),
    None => function.child("body").is_some(),
  };

  FunctionProjection {
    name: function.name().to_string(),
    docs: writer.documentation(function.value("documentation")),
    args: parameters("parameters"),
    rets: parameters("returnParameters"),
    source: writer.write(function),
    constructor: function.str("kind") == Some("constructor") || function.bool("isConstructor"),
    implemented,
    visibility: function.str_or_empty("visibility").to_string(),
    is_virtual: function.bool("virtual"),
  }
}

impl SourceUnitProjection {
  /// Reassemble the projection into compilable source text.
  pub fn render(&self) -> String {
    let mut sections = Vec::new();
    if !self.header.is_empty() {
      sections.push(self.header.clone());
    }
    sections.extend(self.contracts.iter().map(ContractProjection::render));
    let mut text = sections.join("\n\n");
    text.push('\n');
    text
  }
}

impl ContractProjection {
  pub fn render(&self) -> String {
    let mut opening = String::new();
    if self.is_abstract {
      opening.push_str("abstract ");
    }
    opening.push_str(if self.kind.is_empty() {
      "contract"
    } else {
      self.kind.as_str()
    });
    opening.push(' ');
    opening.push_str(&self.name);
    if !self.bases.is_empty() {
      opening.push_str(" is ");
      opening.push_str(&self.bases.join(", "));
    }

    let mut members = Vec::new();
    if !self.contract_header.is_empty() {
      members.push(self.contract_header.clone());
    }
    members.extend(
      self
        .state_variables
        .iter()
        .map(|variable| with_docs(&variable.docs, &variable.body)),
    );
    members.extend(self.modifiers.iter().cloned());
    members.extend(
      self
        .functions
        .iter()
        .map(|function| with_docs(&function.docs, &function.source)),
    );

    let body = if members.is_empty() {
      "{}".to_string()
    } else {
      format!("{{\n{}\n}}", indent(&members.join("\n")))
    };
    format!("{}{opening} {body}", with_docs(&self.docs, ""))
  }
}

/// Prefix `text` with its documentation, commenting out plain-text docs from older compilers.
fn with_docs(docs: &str, text: &str) -> String {
  if docs.is_empty() {
    return text.to_string();
  }
  let comment = if docs.starts_with("//") || docs.starts_with("/*") {
    docs.to_string()
  } else {
    docs
      .lines()
      .map(|line| format!("/// {line}"))
      .collect::<Vec<_>>()
      .join("\n")
  };
  format!("{comment}\n{text}")
}
