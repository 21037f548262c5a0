use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};

use crate::artifact::CompilationArtifact;
use crate::internal::errors::{map_err_with_context, Result};

pub const DEFAULT_CONSTRUCTOR_ARGS: &str = "0x";

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeploymentTarget {
  pub address: String,
  #[serde(default = "default_constructor_args")]
  pub constructor_args: String,
}

fn default_constructor_args() -> String {
  DEFAULT_CONSTRUCTOR_ARGS.to_string()
}

impl DeploymentTarget {
  /// A target with a random placeholder address and no constructor arguments.
  pub fn placeholder() -> Self {
    Self {
      address: format!("0x{}", hex::encode(Address::random())),
      constructor_args: default_constructor_args(),
    }
  }
}

/// `file -> contract -> target`: which contracts to deploy and with which constructor arguments.
/// Persisted as `offchain_config.json`.
///
/// Entries are kept sorted by file, then by contract. Key order in a loaded file is not
/// preserved, and deployment follows the sorted order.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct TargetMap {
  entries: BTreeMap<String, BTreeMap<String, DeploymentTarget>>,
}

impl TargetMap {
  pub fn new() -> Self {
    Self::default()
  }

  /// Seed a target for every contract that has an ABI in a successful artifact.
  pub fn from_artifacts(artifacts: &[CompilationArtifact]) -> Self {
    let mut targets = TargetMap::new();
    for artifact in artifacts.iter().filter(|artifact| artifact.success) {
      let Some(files) = artifact.abi.as_ref().and_then(|abi| abi.nested()) else {
        continue;
      };
      for (file, contracts) in files {
        for contract in contracts.keys() {
          if targets.get(file, contract).is_none() {
            targets.insert(file, contract, DeploymentTarget::placeholder());
          }
        }
      }
    }
    targets
  }

  pub fn load(path: &Path) -> Result<Self> {
    let contents = map_err_with_context(
      fs::read_to_string(path),
      format!("Failed to read targets {}", path.display()),
    )?;
    map_err_with_context(
      serde_json::from_str(&contents),
      format!("Invalid targets file {}", path.display()),
    )
  }

  pub fn insert(&mut self, file: &str, contract: &str, target: DeploymentTarget) {
    self
      .entries
      .entry(file.to_string())
      .or_default()
      .insert(contract.to_string(), target);
  }

  pub fn get(&self, file: &str, contract: &str) -> Option<&DeploymentTarget> {
    self.entries.get(file).and_then(|contracts| contracts.get(contract))
  }

  pub fn is_empty(&self) -> bool {
    self.entries.values().all(BTreeMap::is_empty)
  }

  /// Targets in deployment order: sorted by file, then by contract.
  pub fn iter(&self) -> impl Iterator<Item = (&str, &str, &DeploymentTarget)> {
    self.entries.iter().flat_map(|(file, contracts)| {
      contracts
        .iter()
        .map(move |(contract, target)| (file.as_str(), contract.as_str(), target))
    })
  }

  /// Replace placeholder addresses with the addresses the reconciler resolved.
  pub fn apply(&mut self, artifacts: &[CompilationArtifact]) {
    for resolved in artifacts.iter().filter_map(|artifact| artifact.address.as_ref()) {
      for (file, contracts) in resolved {
        for (contract, address) in contracts {
          if let Some(target) = self
            .entries
            .get_mut(file)
            .and_then(|targets| targets.get_mut(contract))
          {
            target.address = address.clone();
          }
        }
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::artifact::PerContract;
  use serde_json::json;

  fn artifact_with_abi(file: &str, contracts: &[&str]) -> CompilationArtifact {
    let mut per_file = BTreeMap::new();
    per_file.insert(
      file.to_string(),
      contracts
        .iter()
        .map(|name| (name.to_string(), json!([])))
        .collect(),
    );
    CompilationArtifact {
      success: true,
      abi: Some(PerContract::Nested(per_file)),
      ..Default::default()
    }
  }

  #[test]
  fn seeds_placeholders_for_every_contract() {
    let artifacts = vec![
      artifact_with_abi("A.sol", &["A", "Helper"]),
      CompilationArtifact::failed("boom"),
      artifact_with_abi("B.sol", &["B"]),
    ];
    let targets = TargetMap::from_artifacts(&artifacts);
    let listed: Vec<(&str, &str)> = targets.iter().map(|(file, name, _)| (file, name)).collect();
    assert_eq!(listed, vec![("A.sol", "A"), ("A.sol", "Helper"), ("B.sol", "B")]);

    let target = targets.get("A.sol", "A").expect("target");
    assert_eq!(target.constructor_args, "0x");
    assert_eq!(target.address.len(), 42);
    assert!(target.address.starts_with("0x"));
  }

  #[test]
  fn apply_overwrites_only_known_targets() {
    let mut targets = TargetMap::from_artifacts(&[artifact_with_abi("A.sol", &["A"])]);
    let mut resolved = BTreeMap::new();
    resolved.insert(
      "A.sol".to_string(),
      BTreeMap::from([
        ("A".to_string(), "0x00000000000000000000000000000000000000aa".to_string()),
        ("Ghost".to_string(), "0x00000000000000000000000000000000000000bb".to_string()),
      ]),
    );
    let artifact = CompilationArtifact {
      success: true,
      address: Some(resolved),
      ..Default::default()
    };
    targets.apply(&[artifact]);
    assert_eq!(
      targets.get("A.sol", "A").map(|target| target.address.as_str()),
      Some("0x00000000000000000000000000000000000000aa")
    );
    assert!(targets.get("A.sol", "Ghost").is_none());
  }

  #[test]
  fn loads_targets_with_default_constructor_args() {
    let temp = tempfile::tempdir().expect("tempdir");
    let path = temp.path().join("offchain_config.json");
    fs::write(
      &path,
      r#"{ "A.sol": { "A": { "address": "0x01" }, "B": { "address": "0x02", "constructor_args": "0xff" } } }"#,
    )
    .expect("write");
    let targets = TargetMap::load(&path).expect("targets");
    assert_eq!(targets.get("A.sol", "A").map(|t| t.constructor_args.as_str()), Some("0x"));
    assert_eq!(targets.get("A.sol", "B").map(|t| t.constructor_args.as_str()), Some("0xff"));
  }

  #[test]
  fn loaded_targets_iterate_sorted_regardless_of_file_order() {
    let temp = tempfile::tempdir().expect("tempdir");
    let path = temp.path().join("offchain_config.json");
    fs::write(
      &path,
      r#"{
        "src/Zoo.sol": { "Zebra": { "address": "0x03" }, "Ant": { "address": "0x04" } },
        "src/Bank.sol": { "Vault": { "address": "0x01" }, "Ledger": { "address": "0x02" } }
      }"#,
    )
    .expect("write");
    let targets = TargetMap::load(&path).expect("targets");
    let listed: Vec<(&str, &str)> = targets.iter().map(|(file, name, _)| (file, name)).collect();
    assert_eq!(
      listed,
      vec![
        ("src/Bank.sol", "Ledger"),
        ("src/Bank.sol", "Vault"),
        ("src/Zoo.sol", "Ant"),
        ("src/Zoo.sol", "Zebra"),
      ]
    );
  }
}
