use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Compiler standard-JSON output. Only the pieces the projector, extractor and assembler read
/// are typed; AST and ABI stay as raw JSON.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RawCompilationOutput {
  #[serde(default)]
  pub errors: Vec<Diagnostic>,
  #[serde(default)]
  pub sources: BTreeMap<String, SourceOutput>,
  #[serde(default)]
  pub contracts: BTreeMap<String, BTreeMap<String, ContractOutput>>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Diagnostic {
  #[serde(default)]
  pub severity: String,
  #[serde(default)]
  pub message: String,
  #[serde(
    rename = "formattedMessage",
    default,
    skip_serializing_if = "Option::is_none"
  )]
  pub formatted_message: Option<String>,
  #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
  pub kind: Option<String>,
}

impl Diagnostic {
  pub fn is_error(&self) -> bool {
    self.severity.eq_ignore_ascii_case("error")
  }

  /// Human readable text, preferring the compiler's formatted rendering.
  pub fn text(&self) -> &str {
    self
      .formatted_message
      .as_deref()
      .filter(|text| !text.is_empty())
      .unwrap_or(&self.message)
  }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SourceOutput {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub id: Option<u64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub ast: Option<Value>,
  #[serde(rename = "legacyAST", default, skip_serializing_if = "Option::is_none")]
  pub legacy_ast: Option<Value>,
  /// Original source text, overlaid after compilation.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub source: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ContractOutput {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub abi: Option<Value>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub evm: Option<EvmOutput>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct EvmOutput {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub bytecode: Option<BytecodeOutput>,
  #[serde(
    rename = "deployedBytecode",
    default,
    skip_serializing_if = "Option::is_none"
  )]
  pub deployed_bytecode: Option<BytecodeOutput>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct BytecodeOutput {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub object: Option<String>,
  #[serde(rename = "sourceMap", default, skip_serializing_if = "Option::is_none")]
  pub source_map: Option<String>,
}

impl ContractOutput {
  pub fn bytecode(&self) -> Option<&str> {
    self
      .evm
      .as_ref()
      .and_then(|evm| evm.bytecode.as_ref())
      .and_then(|code| code.object.as_deref())
  }

  pub fn runtime_bytecode(&self) -> Option<&str> {
    self.deployed().and_then(|code| code.object.as_deref())
  }

  pub fn runtime_source_map(&self) -> Option<&str> {
    self.deployed().and_then(|code| code.source_map.as_deref())
  }

  fn deployed(&self) -> Option<&BytecodeOutput> {
    self.evm.as_ref().and_then(|evm| evm.deployed_bytecode.as_ref())
  }
}

impl RawCompilationOutput {
  /// Parse compiler output with the recursion limit disabled. Deeply nested ASTs need a large
  /// stack here; callers run this on a stack grown to the configured size.
  pub fn from_slice(bytes: &[u8]) -> serde_json::Result<Self> {
    let mut deserializer = serde_json::Deserializer::from_slice(bytes);
    deserializer.disable_recursion_limit();
    let output = Self::deserialize(&mut deserializer)?;
    deserializer.end()?;
    Ok(output)
  }

  pub fn error_diagnostics(&self) -> impl Iterator<Item = &Diagnostic> {
    self.errors.iter().filter(|diagnostic| diagnostic.is_error())
  }

  pub fn has_errors(&self) -> bool {
    self.error_diagnostics().next().is_some()
  }

  /// Copy source text into every file entry that exists in the output.
  pub fn overlay_sources<'a>(&mut self, contents: impl IntoIterator<Item = (&'a str, &'a str)>) {
    for (path, content) in contents {
      if let Some(entry) = self.sources.get_mut(path) {
        entry.source = Some(content.to_string());
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn nested(depth: usize) -> String {
    let mut ast = String::from("{\"nodeType\":\"Leaf\"}");
    for _ in 0..depth {
      ast = format!("{{\"nodeType\":\"Block\",\"statements\":[{ast}]}}");
    }
    format!("{{\"sources\":{{\"A.sol\":{{\"id\":0,\"ast\":{ast}}}}}}}")
  }

  #[test]
  fn parses_nesting_beyond_default_recursion_limit() {
    let text = nested(400);
    assert!(serde_json::from_str::<Value>(&text).is_err());

    let output = stacker::grow(64 * 1024 * 1024, || {
      let parsed = RawCompilationOutput::from_slice(text.as_bytes()).expect("deep output");
      let id = parsed.sources["A.sol"].id;
      drop(parsed);
      id
    });
    assert_eq!(output, Some(0));
  }

  #[test]
  fn error_severity_detected_case_insensitively() {
    let output: RawCompilationOutput = serde_json::from_value(json!({
      "errors": [
        { "severity": "warning", "message": "unused" },
        { "severity": "Error", "message": "bad", "formattedMessage": "A.sol:1: bad" }
      ]
    }))
    .expect("output");
    let errors: Vec<_> = output.error_diagnostics().map(Diagnostic::text).collect();
    assert_eq!(errors, vec!["A.sol:1: bad"]);
  }

  #[test]
  fn overlay_only_touches_files_present_in_output() {
    let mut output: RawCompilationOutput = serde_json::from_value(json!({
      "sources": { "A.sol": { "id": 3 } }
    }))
    .expect("output");
    output.overlay_sources([("A.sol", "contract A {}"), ("B.sol", "contract B {}")]);
    assert_eq!(output.sources["A.sol"].source.as_deref(), Some("contract A {}"));
    assert!(!output.sources.contains_key("B.sol"));
  }

  #[test]
  fn contract_accessors_read_nested_evm_fields() {
    let contract: ContractOutput = serde_json::from_value(json!({
      "abi": [],
      "evm": {
        "bytecode": { "object": "6080" },
        "deployedBytecode": { "object": "6081", "sourceMap": "1:2:0" }
      }
    }))
    .expect("contract");
    assert_eq!(contract.bytecode(), Some("6080"));
    assert_eq!(contract.runtime_bytecode(), Some("6081"));
    assert_eq!(contract.runtime_source_map(), Some("1:2:0"));
  }
}
