//! Per-unit compilation artifact: projection, invariants and per-contract compiler outputs.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ast::{self, InvariantFinding, SourceUnitProjection};
use crate::compiler::input::CompilerInputDocument;
use crate::compiler::invoke::CompileOutcome;
use crate::compiler::output::{ContractOutput, RawCompilationOutput};
use crate::internal::errors::{map_err_with_context, Result};

/// A per-contract field: `file -> contract -> value`, or the value of the single requested
/// contract.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum PerContract<T> {
  Nested(BTreeMap<String, BTreeMap<String, T>>),
  Single(T),
}

impl<T> PerContract<T> {
  pub fn get(&self, file: &str, contract: &str) -> Option<&T> {
    match self {
      PerContract::Nested(files) => files.get(file).and_then(|contracts| contracts.get(contract)),
      PerContract::Single(_) => None,
    }
  }

  pub fn nested(&self) -> Option<&BTreeMap<String, BTreeMap<String, T>>> {
    match self {
      PerContract::Nested(files) => Some(files),
      PerContract::Single(_) => None,
    }
  }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceRecord {
  pub id: Option<u64>,
  pub source: Option<String>,
}

/// What was compiled and with which compiler, kept for replay.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct CompilerArgs {
  pub version: String,
  pub compiler_json: CompilerInputDocument,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct CompilationArtifact {
  pub success: bool,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub err: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub remappings: Option<Vec<String>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub ast: Option<BTreeMap<String, SourceUnitProjection>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub sourcemap: Option<PerContract<String>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub sources: Option<BTreeMap<String, SourceRecord>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub bytecode: Option<PerContract<String>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub runtime_bytecode: Option<PerContract<String>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub abi: Option<PerContract<Value>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub invariants: Option<Vec<InvariantFinding>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub compiler_args: Option<CompilerArgs>,
  /// Reconciled deployment addresses, `file -> contract -> address`.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub address: Option<BTreeMap<String, BTreeMap<String, String>>>,
  /// Targets the reconciler could not match, as `file:Contract`.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub unresolved: Option<Vec<String>>,
}

impl CompilationArtifact {
  pub fn failed(err: impl Into<String>) -> Self {
    Self {
      success: false,
      err: Some(err.into()),
      ..Default::default()
    }
  }
}

/// Build the artifact for one compiled unit. A failed compile yields `{success: false, err}`;
/// a failed invariant extraction only leaves `invariants` empty.
pub fn assemble(
  outcome: CompileOutcome,
  compiler_args: CompilerArgs,
  target_contract: Option<&str>,
) -> CompilationArtifact {
  let output = match outcome {
    CompileOutcome::Success(output) => output,
    CompileOutcome::Failure(failure) => return CompilationArtifact::failed(failure.to_string()),
  };

  let started = Instant::now();
  let projection = match ast::project(&output) {
    Ok(projection) => projection,
    Err(err) => {
      tracing::error!(%err, "AST projection failed");
      return CompilationArtifact::failed(err.to_string());
    }
  };
  tracing::info!(
    elapsed_ms = started.elapsed().as_millis() as u64,
    "analyzing AST took"
  );

  let invariants = match ast::extract(&output) {
    Ok(findings) => Some(findings),
    Err(err) => {
      tracing::warn!(%err, "invariant extraction failed");
      None
    }
  };

  let text = |select: fn(&ContractOutput) -> Option<&str>| {
    per_contract(&output, target_contract, |contract| {
      select(contract).unwrap_or_default().to_string()
    })
  };

  CompilationArtifact {
    success: true,
    err: None,
    remappings: Some(compiler_args.compiler_json.settings.remappings.clone()),
    ast: Some(projection),
    sourcemap: text(ContractOutput::runtime_source_map),
    bytecode: text(ContractOutput::bytecode),
    runtime_bytecode: text(ContractOutput::runtime_bytecode),
    abi: per_contract(&output, target_contract, |contract| {
      contract.abi.clone().unwrap_or(Value::Null)
    }),
    sources: Some(source_records(&output)),
    invariants,
    compiler_args: Some(compiler_args),
    address: None,
    unresolved: None,
  }
}

/// Nested per-contract map, or the requested contract's value (the last match wins when several
/// files declare it). `None` when the requested contract is absent.
fn per_contract<T>(
  output: &RawCompilationOutput,
  target_contract: Option<&str>,
  select: impl Fn(&ContractOutput) -> T,
) -> Option<PerContract<T>> {
  match target_contract {
    Some(target) => output
      .contracts
      .values()
      .flat_map(|contracts| contracts.iter())
      .filter(|(name, _)| name.as_str() == target)
      .last()
      .map(|(_, contract)| PerContract::Single(select(contract))),
    None => Some(PerContract::Nested(
      output
        .contracts
        .iter()
        .map(|(file, contracts)| {
          let selected = contracts
            .iter()
            .map(|(name, contract)| (name.clone(), select(contract)))
            .collect();
          (file.clone(), selected)
        })
        .collect(),
    )),
  }
}

fn source_records(output: &RawCompilationOutput) -> BTreeMap<String, SourceRecord> {
  output
    .sources
    .iter()
    .map(|(file, source)| {
      (
        file.clone(),
        SourceRecord {
          id: source.id,
          source: source.source.clone(),
        },
      )
    })
    .collect()
}

/// Write `value` as JSON indented by four spaces.
pub fn write_pretty_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
  let mut buffer = Vec::new();
  let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
  let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, formatter);
  map_err_with_context(
    value.serialize(&mut serializer),
    format!("Failed to serialize {}", path.display()),
  )?;
  map_err_with_context(
    fs::write(path, buffer),
    format!("Failed to write {}", path.display()),
  )
}
