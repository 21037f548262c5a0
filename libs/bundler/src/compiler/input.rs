use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const SOLIDITY_LANGUAGE: &str = "Solidity";

/// Selectors requested for every contract regardless of what the caller asked for.
pub const FORCED_CONTRACT_OUTPUTS: [&str; 6] = [
  "ast",
  "legacyAST",
  "evm.deployedBytecode.sourceMap",
  "evm.bytecode",
  "evm.deployedBytecode",
  "abi",
];

/// Selectors requested at file level (the empty contract key).
pub const FORCED_FILE_OUTPUTS: [&str; 2] = ["ast", "legacyAST"];

/// `file pattern -> contract pattern -> selectors`, as in solc's standard JSON.
pub type OutputSelection = BTreeMap<String, BTreeMap<String, Vec<String>>>;

/// Standard-JSON compiler input, as produced by the build backends and handed to a worker.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct CompilerInputDocument {
  pub language: String,
  pub sources: BTreeMap<String, SourceEntry>,
  #[serde(default)]
  pub settings: InputSettings,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct SourceEntry {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub content: Option<String>,
  /// `urls`, `keccak256` and anything else a build tool emitted, passed through untouched.
  #[serde(flatten)]
  pub extra: Map<String, Value>,
}

impl SourceEntry {
  pub fn from_content(content: impl Into<String>) -> Self {
    Self {
      content: Some(content.into()),
      extra: Map::new(),
    }
  }
}

/// Compiler settings. Only the keys this crate manipulates are typed; every other key
/// (optimizer, evmVersion, libraries, metadata, ...) survives in `extra`.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct InputSettings {
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub remappings: Vec<String>,
  #[serde(rename = "outputSelection", default)]
  pub output_selection: OutputSelection,
  #[serde(flatten)]
  pub extra: Map<String, Value>,
}

impl InputSettings {
  pub fn with_remappings(remappings: Vec<String>) -> Self {
    Self {
      remappings,
      ..Default::default()
    }
  }

  /// Add the forced selectors to the wildcard entries, keeping whatever the caller selected.
  pub fn force_outputs(&mut self) {
    let file_selection = self.output_selection.entry("*".to_string()).or_default();

    let contract_outputs = file_selection.entry("*".to_string()).or_default();
    push_missing(contract_outputs, &FORCED_CONTRACT_OUTPUTS);

    let unit_outputs = file_selection.entry(String::new()).or_default();
    push_missing(unit_outputs, &FORCED_FILE_OUTPUTS);
  }

  pub fn has_forced_outputs(&self) -> bool {
    let Some(file_selection) = self.output_selection.get("*") else {
      return false;
    };
    let covers = |key: &str, required: &[&str]| {
      file_selection
        .get(key)
        .map(|selected| {
          required
            .iter()
            .all(|output| selected.iter().any(|value| value == output))
        })
        .unwrap_or(false)
    };
    covers("*", &FORCED_CONTRACT_OUTPUTS) && covers("", &FORCED_FILE_OUTPUTS)
  }
}

fn push_missing(target: &mut Vec<String>, required: &[&str]) {
  for output in required {
    if !target.iter().any(|existing| existing == output) {
      target.push((*output).to_string());
    }
  }
}

impl CompilerInputDocument {
  pub fn solidity(sources: BTreeMap<String, SourceEntry>, settings: InputSettings) -> Self {
    Self {
      language: SOLIDITY_LANGUAGE.to_string(),
      sources,
      settings,
    }
  }

  /// Return the document with the forced output selectors applied.
  pub fn with_forced_outputs(mut self) -> Self {
    self.settings.force_outputs();
    self
  }

  /// Original source text keyed by file, used to overlay sources stripped by the compiler.
  pub fn source_contents(&self) -> impl Iterator<Item = (&str, &str)> {
    self.sources.iter().filter_map(|(path, entry)| {
      entry
        .content
        .as_deref()
        .map(|content| (path.as_str(), content))
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn forced_outputs_added_to_empty_settings() {
    let document = CompilerInputDocument::solidity(BTreeMap::new(), InputSettings::default())
      .with_forced_outputs();
    assert!(document.settings.has_forced_outputs());
    let selection = &document.settings.output_selection["*"];
    assert_eq!(selection["*"].len(), FORCED_CONTRACT_OUTPUTS.len());
    assert_eq!(selection[""], vec!["ast".to_string(), "legacyAST".to_string()]);
  }

  #[test]
  fn forced_outputs_survive_conflicting_caller_settings() {
    let mut document: CompilerInputDocument = serde_json::from_value(json!({
      "language": "Solidity",
      "sources": { "A.sol": { "content": "contract A {}" } },
      "settings": {
        "optimizer": { "enabled": true, "runs": 200 },
        "outputSelection": {
          "*": { "*": ["metadata", "abi"], "": [] },
          "A.sol": { "A": ["storageLayout"] }
        }
      }
    }))
    .expect("document");
    document = document.with_forced_outputs();

    assert!(document.settings.has_forced_outputs());
    let wildcard = &document.settings.output_selection["*"]["*"];
    assert_eq!(wildcard.iter().filter(|value| *value == "abi").count(), 1);
    assert!(wildcard.contains(&"metadata".to_string()));
    assert_eq!(
      document.settings.output_selection["A.sol"]["A"],
      vec!["storageLayout".to_string()]
    );
    assert_eq!(
      document.settings.extra["optimizer"],
      json!({ "enabled": true, "runs": 200 })
    );
  }

  #[test]
  fn forcing_is_idempotent() {
    let once = CompilerInputDocument::default().with_forced_outputs();
    let twice = once.clone().with_forced_outputs();
    assert_eq!(once, twice);
  }

  #[test]
  fn unknown_source_keys_round_trip() {
    let value = json!({
      "language": "Solidity",
      "sources": { "B.sol": { "urls": ["bzz-raw://abc"], "keccak256": "0x01" } },
      "settings": { "remappings": ["@oz/=lib/oz/"] }
    });
    let document: CompilerInputDocument = serde_json::from_value(value).expect("document");
    assert_eq!(document.settings.remappings, vec!["@oz/=lib/oz/".to_string()]);
    assert_eq!(document.source_contents().count(), 0);

    let serialized = serde_json::to_value(&document).expect("serialize");
    assert_eq!(serialized["sources"]["B.sol"]["keccak256"], json!("0x01"));
    assert!(serialized["sources"]["B.sol"].get("content").is_none());
  }
}
