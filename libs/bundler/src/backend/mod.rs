//! Build backends: turn a project directory into one or more compilation units.

pub mod build_info;
pub mod folder;
pub mod foundry;
pub mod hardhat;

use std::path::Path;
use std::process::{Output, Stdio};
use std::str::FromStr;

use strum::{Display, EnumString};
use tokio::process::Command;

use crate::compiler::input::CompilerInputDocument;
use crate::internal::config::BuildConfig;
use crate::internal::errors::{Error, Result};

/// A compiler version paired with the standard-JSON input it should compile.
#[derive(Clone, Debug, PartialEq)]
pub struct BuildUnit {
  pub compiler_version: String,
  pub input: CompilerInputDocument,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, EnumString, Display)]
#[strum(ascii_case_insensitive)]
pub enum BackendKind {
  #[strum(to_string = "solidity_folder", serialize = "folder")]
  Folder,
  #[strum(to_string = "forge", serialize = "foundry")]
  Foundry,
  #[strum(to_string = "hardhat")]
  Hardhat,
}

impl BackendKind {
  pub fn parse(name: &str) -> Result<Self> {
    BackendKind::from_str(name.trim())
      .map_err(|_| Error::new(format!("Unknown project type {name}")))
  }
}

const FOUNDRY_MARKERS: [&str; 2] = ["foundry.toml", "forge.toml"];
const HARDHAT_MARKERS: [&str; 2] = ["hardhat.config.js", "hardhat.config.ts"];

/// Pick a backend from marker files in `root`, falling back to a bare folder of sources.
pub fn detect_backend(root: &Path) -> BackendKind {
  if FOUNDRY_MARKERS.iter().any(|marker| root.join(marker).is_file()) {
    return BackendKind::Foundry;
  }
  if HARDHAT_MARKERS.iter().any(|marker| root.join(marker).is_file()) {
    return BackendKind::Hardhat;
  }
  tracing::info!(
    root = %root.display(),
    "unknown project layout, treating every *.sol file as a contract source"
  );
  BackendKind::Folder
}

/// Produce the compilation units for `root` using the given backend.
pub async fn build_units(
  kind: BackendKind,
  root: &Path,
  compiler_version: Option<&str>,
  config: &BuildConfig,
) -> Result<Vec<BuildUnit>> {
  match kind {
    BackendKind::Folder => folder::collect_unit(root, compiler_version).map(|unit| vec![unit]),
    BackendKind::Foundry => foundry::build(root, config).await,
    BackendKind::Hardhat => hardhat::build(root, config).await,
  }
}

/// Run an external build tool in `root`, echoing its output to the log. A non-zero exit is an
/// error carrying the tool's stderr.
async fn run_build_tool(program: &str, args: &[&str], root: &Path) -> Result<Output> {
  tracing::info!(program, ?args, root = %root.display(), "running build tool");
  let output = Command::new(program)
    .args(args)
    .current_dir(root)
    .stdin(Stdio::null())
    .stdout(Stdio::piped())
    .stderr(Stdio::piped())
    .output()
    .await
    .map_err(|err| Error::with_context(format!("Failed to run {program}"), err))?;

  for line in String::from_utf8_lossy(&output.stdout).lines() {
    tracing::debug!(program, "{line}");
  }
  if !output.status.success() {
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    let detail = if stderr.is_empty() {
      format!("exited with {}", output.status)
    } else {
      stderr
    };
    return Err(Error::new(format!("{program} {} failed: {detail}", args.join(" "))));
  }
  Ok(output)
}
