//! Solidity AST handling: a typed view over compact-JSON nodes, a source writer, the per-contract
//! projection and invariant extraction.

pub mod invariants;
pub mod node;
pub mod projector;
pub mod writer;

use crate::internal::errors::Error;

pub use invariants::{extract, Extraction, InvariantFinding, InvariantKind};
pub use node::{AstNode, NodeKind};
pub use projector::{project, ContractProjection, FunctionProjection, SourceUnitProjection};
pub use writer::SourceWriter;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AstError {
  MissingAst(String),
  UnexpectedNode {
    expected: &'static str,
    found: String,
  },
  MissingName {
    file: String,
    node_type: &'static str,
  },
}

impl std::fmt::Display for AstError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Self::MissingAst(file) => write!(f, "No AST in compiler output for {}", file),
      Self::UnexpectedNode { expected, found } => {
        write!(f, "Expected {} node, found {}", expected, found)
      }
      Self::MissingName { file, node_type } => write!(f, "{} without a name in {}", node_type, file),
    }
  }
}

impl std::error::Error for AstError {}

impl From<AstError> for Error {
  fn from(err: AstError) -> Self {
    Error::new(err.to_string())
  }
}
