//! Build driver: backend, then one compile task per unit, then reconciliation.

use std::path::PathBuf;

use futures::future::join_all;

use crate::artifact::{self, CompilationArtifact, CompilerArgs};
use crate::backend::{self, BackendKind, BuildUnit};
use crate::compiler::invoke::CompilerInvoker;
use crate::internal::config::BuildConfig;
use crate::internal::errors::Result;
use crate::reconcile::{ChainRpc, Reconciler, TargetMap};

#[derive(Clone, Debug, Default)]
pub struct BuildRequest {
  pub root: PathBuf,
  /// Detected from marker files when absent.
  pub backend: Option<BackendKind>,
  pub compiler_version: Option<String>,
  pub target_contract: Option<String>,
}

/// Turn the project into units and compile them all. Only backend failures are errors; a unit that
/// fails to compile settles as a failed artifact.
pub async fn build_project(
  request: &BuildRequest,
  config: &BuildConfig,
) -> Result<Vec<CompilationArtifact>> {
  let kind = request
    .backend
    .unwrap_or_else(|| backend::detect_backend(&request.root));
  tracing::info!(backend = %kind, root = %request.root.display(), "building project");
  let units = backend::build_units(
    kind,
    &request.root,
    request.compiler_version.as_deref(),
    config,
  )
  .await?;
  tracing::info!(units = units.len(), "collected compilation units");

  let invoker = CompilerInvoker::from_config(config)?;
  Ok(compile_units(&invoker, units, request.target_contract.as_deref()).await)
}

/// Compile every unit concurrently. Artifacts come back in unit order.
pub async fn compile_units(
  invoker: &CompilerInvoker,
  units: Vec<BuildUnit>,
  target_contract: Option<&str>,
) -> Vec<CompilationArtifact> {
  let tasks = units.into_iter().map(|unit| {
    let invoker = invoker.clone();
    let target_contract = target_contract.map(str::to_string);
    tokio::spawn(async move { compile_unit(invoker, unit, target_contract).await })
  });

  join_all(tasks)
    .await
    .into_iter()
    .map(|joined| {
      joined.unwrap_or_else(|err| {
        tracing::error!(%err, "compile task did not finish");
        CompilationArtifact::failed(format!("compile task did not finish: {err}"))
      })
    })
    .collect()
}

async fn compile_unit(
  invoker: CompilerInvoker,
  unit: BuildUnit,
  target_contract: Option<String>,
) -> CompilationArtifact {
  let BuildUnit {
    compiler_version,
    input,
  } = unit;
  let input = input.with_forced_outputs();
  let outcome = invoker.compile(&compiler_version, &input).await;
  let compiler_args = CompilerArgs {
    version: compiler_version,
    compiler_json: input,
  };

  // The output is walked recursively and dropped at the end of assembly.
  let stack_size = invoker.stack_size();
  let assembled = tokio::task::spawn_blocking(move || {
    stacker::grow(stack_size, move || {
      artifact::assemble(outcome, compiler_args, target_contract.as_deref())
    })
  })
  .await;

  assembled.unwrap_or_else(|err| {
    tracing::error!(%err, "artifact assembly did not finish");
    CompilationArtifact::failed(format!("artifact assembly did not finish: {err}"))
  })
}

/// Deploy the targets (seeded from the artifacts when none are given), record the outcome on each
/// artifact and return the targets with resolved addresses applied.
pub async fn reconcile_addresses<R: ChainRpc>(
  rpc: R,
  artifacts: &mut [CompilationArtifact],
  targets: Option<TargetMap>,
  length_tolerance: f64,
) -> TargetMap {
  let mut targets = targets.unwrap_or_else(|| TargetMap::from_artifacts(artifacts));
  if targets.is_empty() {
    tracing::info!("no deployment targets");
    return targets;
  }
  Reconciler::new(rpc, length_tolerance)
    .reconcile(artifacts, &targets)
    .await;
  targets.apply(artifacts);
  targets
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::artifact::PerContract;
  use crate::compiler::input::{CompilerInputDocument, InputSettings, SourceEntry};
  use crate::internal::config::WorkerCommand;
  use crate::reconcile::RpcError;
  use serde_json::{json, Value};
  use std::collections::BTreeMap;
  use std::fs;
  use std::path::Path;

  const WORKER: &str = r#"
case "$1" in
  0.4.1) echo "solc 0.4.1 not found" >&2; exit 1 ;;
esac
cat > "$2" <<'JSON'
{"sources":{"A.sol":{"id":0,"ast":{"nodeType":"SourceUnit","nodes":[
  {"nodeType":"ContractDefinition","name":"A","contractKind":"contract","abstract":false,"baseContracts":[],"nodes":[]}
]}}},
"contracts":{"A.sol":{"A":{"abi":[],"evm":{"bytecode":{"object":"60aa"},"deployedBytecode":{"object":"6080aabb","sourceMap":""}}}}}}
JSON
"#;

  fn invoker(dir: &Path) -> CompilerInvoker {
    let script = dir.join("worker.sh");
    fs::write(&script, WORKER).expect("write worker");
    CompilerInvoker::new(
      WorkerCommand {
        program: PathBuf::from("/bin/sh"),
        args: vec![script.display().to_string()],
      },
      dir.join("scratch"),
      8 * 1024 * 1024,
      false,
    )
  }

  fn unit(version: &str) -> BuildUnit {
    let mut sources = BTreeMap::new();
    sources.insert("A.sol".to_string(), SourceEntry::from_content("contract A {}"));
    BuildUnit {
      compiler_version: version.to_string(),
      input: CompilerInputDocument::solidity(sources, InputSettings::default()),
    }
  }

  #[tokio::test]
  async fn failing_unit_does_not_affect_siblings() {
    let temp = tempfile::tempdir().expect("tempdir");
    let invoker = invoker(temp.path());
    let artifacts =
      compile_units(&invoker, vec![unit("0.8.19"), unit("0.4.1"), unit("0.7.6")], None).await;

    assert_eq!(artifacts.len(), 3);
    assert!(artifacts[0].success);
    assert!(!artifacts[1].success);
    assert_eq!(
      artifacts[1].err.as_deref(),
      Some("compiler worker failed: solc 0.4.1 not found")
    );
    assert!(artifacts[2].success);

    let args = artifacts[2].compiler_args.as_ref().expect("compiler args");
    assert_eq!(args.version, "0.7.6");
    assert!(args.compiler_json.settings.has_forced_outputs());
    assert_eq!(
      artifacts[0].runtime_bytecode.as_ref().and_then(|code| code.get("A.sol", "A")),
      Some(&"6080aabb".to_string())
    );
  }

  #[tokio::test]
  async fn target_contract_flattens_every_artifact() {
    let temp = tempfile::tempdir().expect("tempdir");
    let invoker = invoker(temp.path());
    let artifacts = compile_units(&invoker, vec![unit("0.8.19")], Some("A")).await;
    assert_eq!(artifacts[0].bytecode, Some(PerContract::Single("60aa".to_string())));
  }

  #[tokio::test]
  async fn folder_project_builds_end_to_end() {
    let temp = tempfile::tempdir().expect("tempdir");
    let project = temp.path().join("project");
    fs::create_dir_all(&project).expect("project dir");
    fs::write(project.join("A.sol"), "contract A {}").expect("source");

    let config = BuildConfig {
      worker_program: Some(PathBuf::from("/bin/sh")),
      worker_args: vec![{
        let script = temp.path().join("worker.sh");
        fs::write(&script, WORKER).expect("write worker");
        script.display().to_string()
      }],
      scratch_dir: temp.path().join("scratch"),
      ..BuildConfig::default()
    };
    let request = BuildRequest {
      root: project,
      compiler_version: Some("0.8.19".into()),
      ..BuildRequest::default()
    };
    let artifacts = build_project(&request, &config).await.expect("build");
    assert_eq!(artifacts.len(), 1);
    assert!(artifacts[0].success);

    let missing_version = BuildRequest {
      compiler_version: None,
      ..request
    };
    assert!(build_project(&missing_version, &config).await.is_err());
  }

  struct SingleContractNode;

  impl ChainRpc for SingleContractNode {
    async fn accounts(&self) -> std::result::Result<Vec<String>, RpcError> {
      Ok(vec!["0xsender".into()])
    }

    async fn send_transaction(
      &self,
      _from: &str,
      _data: &str,
    ) -> std::result::Result<String, RpcError> {
      Ok("0xtx".into())
    }

    async fn trace_transaction(&self, _tx_hash: &str) -> std::result::Result<Value, RpcError> {
      Ok(json!([{
        "result": {
          "address": "0x00000000000000000000000000000000000000a1",
          "code": "0x6080aabb"
        }
      }]))
    }
  }

  #[tokio::test]
  async fn seeded_targets_pick_up_resolved_addresses() {
    let temp = tempfile::tempdir().expect("tempdir");
    let invoker = invoker(temp.path());
    let mut artifacts = compile_units(&invoker, vec![unit("0.8.19")], None).await;

    let targets = reconcile_addresses(SingleContractNode, &mut artifacts, None, 0.10).await;
    assert_eq!(
      targets.get("A.sol", "A").map(|target| target.address.as_str()),
      Some("0x00000000000000000000000000000000000000a1")
    );
    assert_eq!(artifacts[0].unresolved, Some(Vec::new()));
  }
}
