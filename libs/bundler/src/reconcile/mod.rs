//! Deploy compiled contracts against a development node and recover their addresses by
//! comparing runtime code observed in deployment traces.

pub mod matcher;
pub mod rpc;
pub mod targets;

use crate::artifact::CompilationArtifact;

pub use matcher::{Candidate, ReconciliationMap, Resolution};
pub use rpc::{ChainRpc, JsonRpcClient, RpcError};
pub use targets::{DeploymentTarget, TargetMap};

pub struct Reconciler<R> {
  rpc: R,
  length_tolerance: f64,
}

impl<R: ChainRpc> Reconciler<R> {
  pub fn new(rpc: R, length_tolerance: f64) -> Self {
    Self {
      rpc,
      length_tolerance,
    }
  }

  /// Deploy every target, then record resolved addresses and unresolved targets on each
  /// successful artifact.
  pub async fn reconcile(&self, artifacts: &mut [CompilationArtifact], targets: &TargetMap) {
    let candidates = self.deploy_all(artifacts, targets).await;
    tracing::info!(candidates = candidates.len(), "collected deployed code");
    for artifact in artifacts.iter_mut().filter(|artifact| artifact.success) {
      let map = self.match_artifact(artifact, targets, &candidates);
      artifact.address = Some(map.addresses());
      artifact.unresolved = Some(map.unresolved());
    }
  }

  /// Deploy targets one at a time and gather the code each deployment left behind. Failed
  /// deployments are logged and skipped.
  pub async fn deploy_all(
    &self,
    artifacts: &[CompilationArtifact],
    targets: &TargetMap,
  ) -> Vec<Candidate> {
    let sender = match self.rpc.accounts().await {
      Ok(accounts) => match accounts.into_iter().next() {
        Some(sender) => sender,
        None => {
          tracing::warn!("node reported no accounts, skipping deployment");
          return Vec::new();
        }
      },
      Err(err) => {
        tracing::warn!(%err, "could not list accounts, skipping deployment");
        return Vec::new();
      }
    };

    let mut candidates = Vec::new();
    for (file, contract, target) in targets.iter() {
      let Some(bytecode) = creation_code(artifacts, file, contract) else {
        tracing::debug!(file, contract, "no bytecode for target");
        continue;
      };
      let data = deployment_data(bytecode, &target.constructor_args);
      let tx_hash = match self.rpc.send_transaction(&sender, &data).await {
        Ok(tx_hash) => tx_hash,
        Err(err) => {
          tracing::warn!(file, contract, %err, "deployment failed");
          continue;
        }
      };
      match self.rpc.trace_transaction(&tx_hash).await {
        Ok(trace) => candidates.extend(matcher::candidates_from_trace(&trace)),
        Err(err) => tracing::warn!(file, contract, %err, "trace failed"),
      }
    }
    candidates
  }

  /// Match each target present in `artifact` against the deployed candidates.
  pub fn match_artifact(
    &self,
    artifact: &CompilationArtifact,
    targets: &TargetMap,
    candidates: &[Candidate],
  ) -> ReconciliationMap {
    let mut map = ReconciliationMap::new();
    let Some(runtime) = artifact.runtime_bytecode.as_ref() else {
      return map;
    };
    for (file, contract, _) in targets.iter() {
      let Some(code) = runtime.get(file, contract) else {
        continue;
      };
      let target_code = match matcher::decode_bytecode(code) {
        Ok(code) => code,
        Err(err) => {
          tracing::warn!(file, contract, %err, "undecodable runtime bytecode");
          map.record(file, contract, Resolution::Unresolved);
          continue;
        }
      };
      if target_code.is_empty() {
        // interfaces and abstract contracts leave no runtime code to compare
        tracing::debug!(file, contract, "empty runtime bytecode");
        map.record(file, contract, Resolution::Unresolved);
        continue;
      }
      let resolution = match matcher::best_match(&target_code, candidates, self.length_tolerance) {
        Some((candidate, distance)) => Resolution::Resolved {
          address: candidate.address.clone(),
          distance,
        },
        None => Resolution::Unresolved,
      };
      map.record(file, contract, resolution);
    }
    map
  }
}

fn creation_code<'a>(
  artifacts: &'a [CompilationArtifact],
  file: &str,
  contract: &str,
) -> Option<&'a str> {
  artifacts
    .iter()
    .filter(|artifact| artifact.success)
    .filter_map(|artifact| artifact.bytecode.as_ref()?.get(file, contract))
    .map(String::as_str)
    .find(|code| !code.trim_start_matches("0x").is_empty())
}

/// Creation transaction payload: linked bytecode followed by the constructor arguments.
fn deployment_data(bytecode: &str, constructor_args: &str) -> String {
  let args = constructor_args
    .strip_prefix("0x")
    .unwrap_or(constructor_args);
  format!("0x{}{}", matcher::normalize_hex(bytecode), args)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::artifact::PerContract;
  use serde_json::{json, Value};
  use std::collections::BTreeMap;
  use std::sync::Mutex;

  #[derive(Default)]
  struct FakeNode {
    accounts: Vec<String>,
    /// Deployed payload prefix -> trace returned for that deployment.
    traces: Vec<(String, Value)>,
    sent: Mutex<Vec<(String, String)>>,
  }

  impl ChainRpc for FakeNode {
    async fn accounts(&self) -> Result<Vec<String>, RpcError> {
      Ok(self.accounts.clone())
    }

    async fn send_transaction(&self, from: &str, data: &str) -> Result<String, RpcError> {
      let mut sent = self.sent.lock().expect("lock");
      sent.push((from.to_string(), data.to_string()));
      if data.contains("dead") {
        return Err(RpcError::Rejected {
          method: "eth_sendTransaction".into(),
          message: "out of gas".into(),
        });
      }
      Ok(format!("0xtx{}", sent.len()))
    }

    async fn trace_transaction(&self, tx_hash: &str) -> Result<Value, RpcError> {
      let sent = self.sent.lock().expect("lock");
      let index: usize = tx_hash
        .trim_start_matches("0xtx")
        .parse()
        .expect("index");
      let data = &sent[index - 1].1;
      Ok(
        self
          .traces
          .iter()
          .find(|(prefix, _)| data.starts_with(prefix.as_str()))
          .map(|(_, trace)| trace.clone())
          .unwrap_or(json!([])),
      )
    }
  }

  fn nested(entries: &[(&str, &str, &str)]) -> PerContract<String> {
    let mut files: BTreeMap<String, BTreeMap<String, String>> = BTreeMap::new();
    for (file, contract, code) in entries {
      files
        .entry(file.to_string())
        .or_default()
        .insert(contract.to_string(), code.to_string());
    }
    PerContract::Nested(files)
  }

  fn target(args: &str) -> DeploymentTarget {
    DeploymentTarget {
      address: "0x0000000000000000000000000000000000000000".into(),
      constructor_args: args.into(),
    }
  }

  #[tokio::test]
  async fn resolves_deployed_addresses_and_reports_misses() {
    let artifact = CompilationArtifact {
      success: true,
      bytecode: Some(nested(&[
        ("A.sol", "A", "60aa"),
        ("A.sol", "Lib", "60dead"),
        ("B.sol", "B", "60bb"),
      ])),
      runtime_bytecode: Some(nested(&[
        ("A.sol", "A", "6080aabb"),
        ("A.sol", "Lib", "6080"),
        ("B.sol", "B", "ffffffffffffffffffff"),
      ])),
      ..Default::default()
    };
    let mut targets = TargetMap::new();
    targets.insert("A.sol", "A", target("0x0001"));
    targets.insert("A.sol", "Lib", target("0x"));
    targets.insert("B.sol", "B", target("0x"));

    let node = FakeNode {
      accounts: vec!["0xsender".into(), "0xother".into()],
      traces: vec![(
        "0x60aa".into(),
        json!([
          { "result": { "address": "0xa1", "code": "0x6080aabc" } },
          { "result": { "address": "0xa2", "code": "0x6080aabb" } }
        ]),
      )],
      ..Default::default()
    };
    let reconciler = Reconciler::new(node, 0.10);
    let mut artifacts = vec![artifact, CompilationArtifact::failed("boom")];
    reconciler.reconcile(&mut artifacts, &targets).await;

    let sent = reconciler.rpc.sent.lock().expect("lock").clone();
    assert_eq!(
      sent,
      vec![
        ("0xsender".to_string(), "0x60aa0001".to_string()),
        ("0xsender".to_string(), "0x60dead".to_string()),
        ("0xsender".to_string(), "0x60bb".to_string()),
      ]
    );

    let resolved = artifacts[0].address.as_ref().expect("addresses");
    assert_eq!(resolved["A.sol"]["A"], "0xa2");
    assert_eq!(
      artifacts[0].unresolved,
      Some(vec!["A.sol:Lib".to_string(), "B.sol:B".to_string()])
    );
    assert!(artifacts[1].address.is_none());
  }

  #[tokio::test]
  async fn no_accounts_means_no_deployments() {
    let artifact = CompilationArtifact {
      success: true,
      bytecode: Some(nested(&[("A.sol", "A", "60aa")])),
      runtime_bytecode: Some(nested(&[("A.sol", "A", "60aa")])),
      ..Default::default()
    };
    let mut targets = TargetMap::new();
    targets.insert("A.sol", "A", target("0x"));
    let reconciler = Reconciler::new(FakeNode::default(), 0.10);
    let mut artifacts = vec![artifact];
    reconciler.reconcile(&mut artifacts, &targets).await;

    assert!(reconciler.rpc.sent.lock().expect("lock").is_empty());
    assert_eq!(artifacts[0].unresolved, Some(vec!["A.sol:A".to_string()]));
    assert_eq!(artifacts[0].address, Some(BTreeMap::new()));
  }

  #[test]
  fn deployment_data_zero_fills_links_and_appends_args() {
    let bytecode = format!("0x60{}00", "__$0123456789abcdef0123456789abcdef01$__");
    assert_eq!(
      deployment_data(&bytecode, "0xbeef"),
      format!("0x60{}00beef", "0".repeat(40))
    );
    assert_eq!(deployment_data("6000", "0x"), "0x6000");
  }

  #[test]
  fn empty_runtime_code_is_never_matched() {
    let artifact = CompilationArtifact {
      success: true,
      runtime_bytecode: Some(nested(&[
        ("A.sol", "IToken", "0x"),
        ("A.sol", "Token", "6080aa"),
        ("B.sol", "Base", ""),
      ])),
      ..Default::default()
    };
    let mut targets = TargetMap::new();
    targets.insert("A.sol", "IToken", target("0x"));
    targets.insert("A.sol", "Token", target("0x"));
    targets.insert("B.sol", "Base", target("0x"));
    let candidates = vec![
      Candidate { address: "0xe0".into(), code: Vec::new() },
      Candidate { address: "0xa1".into(), code: vec![0x60, 0x80, 0xaa] },
    ];

    let reconciler = Reconciler::new(FakeNode::default(), 0.10);
    let map = reconciler.match_artifact(&artifact, &targets, &candidates);
    assert_eq!(map.addresses()["A.sol"]["Token"], "0xa1");
    assert!(!map.addresses()["A.sol"].contains_key("IToken"));
    assert_eq!(
      map.unresolved(),
      vec!["A.sol:IToken".to_string(), "B.sol:Base".to_string()]
    );
  }
}
