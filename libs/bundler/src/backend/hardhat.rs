use std::path::Path;

use super::{build_info, run_build_tool, BuildUnit};
use crate::internal::config::BuildConfig;
use crate::internal::errors::Result;

pub const BUILD_INFO_DIR: &str = "artifacts/build-info";

/// Install dependencies, run `hardhat compile` and read the generated build-info fragments.
pub async fn build(root: &Path, config: &BuildConfig) -> Result<Vec<BuildUnit>> {
  if config.npm_install {
    run_build_tool(&config.npm_program, &["i"], root).await?;
  }
  run_build_tool(&config.npx_program, &["hardhat", "compile"], root).await?;
  tracing::info!("hardhat compile finished");

  let build_info_dir = root.join(BUILD_INFO_DIR);
  if !build_info_dir.is_dir() {
    tracing::warn!(path = %build_info_dir.display(), "hardhat produced no build info");
    return Ok(Vec::new());
  }
  build_info::read_units(&build_info_dir, config.stack_size)
}
