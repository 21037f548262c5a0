//! `bundler`: build a Solidity project into fuzzer artifacts and reconcile deployed addresses.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use artifact_bundler::compiler::worker;
use artifact_bundler::{
  build_project, reconcile_addresses, write_pretty_json, BackendKind, BuildConfig,
  BuildConfigOptions, BuildRequest, Error, JsonRpcClient, Result, TargetMap, WorkerRequest,
};
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "bundler", version, about = "Solidity artifact bundler")]
struct Cli {
  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Compile a project and write the artifact bundle
  Build {
    /// Project directory
    #[arg(default_value = ".")]
    dir: PathBuf,
    /// forge, hardhat or solidity_folder; detected from marker files when omitted
    #[arg(long)]
    project_type: Option<String>,
    /// Compiler version for plain source folders
    #[arg(long)]
    compiler_version: Option<String>,
    /// Emit only this contract's outputs instead of the per-file maps
    #[arg(long)]
    contract: Option<String>,
    /// JSON-RPC endpoint of the development node
    #[arg(long)]
    rpc_url: Option<String>,
    /// Deployment targets; seeded from the compiled ABIs when omitted
    #[arg(long)]
    targets: Option<PathBuf>,
    /// Where the resolved targets are written
    #[arg(long, default_value = "offchain_config.json")]
    targets_output: PathBuf,
    /// Where the artifact bundle is written
    #[arg(long, default_value = "results.json")]
    output: PathBuf,
    /// Skip deployment and address reconciliation
    #[arg(long)]
    no_deploy: bool,
    /// Keep compiler scratch files and build-info directories
    #[arg(long)]
    keep_scratch: bool,
  },
  /// Compile one scratch file in place (spawned by `build`)
  #[command(name = "solc-worker", hide = true)]
  SolcWorker {
    version: String,
    scratch: PathBuf,
    #[arg(long)]
    stack_size: usize,
  },
}

struct BuildArgs {
  dir: PathBuf,
  project_type: Option<String>,
  compiler_version: Option<String>,
  contract: Option<String>,
  targets: Option<PathBuf>,
  targets_output: PathBuf,
  output: PathBuf,
  no_deploy: bool,
  overrides: BuildConfigOptions,
}

fn main() -> ExitCode {
  let cli = Cli::parse();

  let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
  tracing_subscriber::fmt()
    .with_env_filter(env_filter)
    .with_writer(std::io::stderr)
    .init();

  let result = match cli.command {
    Command::Build {
      dir,
      project_type,
      compiler_version,
      contract,
      rpc_url,
      targets,
      targets_output,
      output,
      no_deploy,
      keep_scratch,
    } => run_build(BuildArgs {
      dir,
      project_type,
      compiler_version,
      contract,
      targets,
      targets_output,
      output,
      no_deploy,
      overrides: BuildConfigOptions {
        rpc_url,
        keep_scratch: keep_scratch.then_some(true),
        ..BuildConfigOptions::default()
      },
    }),
    Command::SolcWorker {
      version,
      scratch,
      stack_size,
    } => worker::run(WorkerRequest {
      version,
      scratch,
      stack_size,
    }),
  };

  match result {
    Ok(()) => ExitCode::SUCCESS,
    Err(err) => {
      eprintln!("Error: {err}");
      ExitCode::FAILURE
    }
  }
}

fn run_build(args: BuildArgs) -> Result<()> {
  let backend = args
    .project_type
    .as_deref()
    .map(BackendKind::parse)
    .transpose()?;
  let config = BuildConfig::load(&args.dir, Some(&args.overrides))?;
  let targets = args.targets.as_deref().map(TargetMap::load).transpose()?;
  let request = BuildRequest {
    root: args.dir,
    backend,
    compiler_version: args.compiler_version,
    target_contract: args.contract,
  };

  let runtime = tokio::runtime::Runtime::new()
    .map_err(|err| Error::with_context("Failed to start the async runtime", err))?;
  runtime.block_on(async {
    let mut artifacts = build_project(&request, &config).await?;
    let succeeded = artifacts.iter().filter(|artifact| artifact.success).count();
    tracing::info!(
      succeeded,
      failed = artifacts.len() - succeeded,
      "compilation finished"
    );

    let targets = if args.no_deploy {
      targets.unwrap_or_else(|| TargetMap::from_artifacts(&artifacts))
    } else {
      let rpc = JsonRpcClient::new(config.rpc_url.clone());
      reconcile_addresses(rpc, &mut artifacts, targets, config.length_tolerance).await
    };

    write_output(&args.output, &artifacts)?;
    write_output(&args.targets_output, &targets)
  })
}

fn write_output<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
  write_pretty_json(path, value)?;
  tracing::info!(path = %path.display(), "wrote");
  Ok(())
}
