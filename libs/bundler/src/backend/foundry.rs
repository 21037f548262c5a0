use std::fs;
use std::path::Path;

use uuid::Uuid;

use super::{build_info, run_build_tool, BuildUnit};
use crate::internal::config::BuildConfig;
use crate::internal::errors::{Error, Result};
use crate::internal::path::canonicalize_path;

/// Run `forge build` into a fresh build-info directory and turn every fragment into a unit.
pub async fn build(root: &Path, config: &BuildConfig) -> Result<Vec<BuildUnit>> {
  // forge runs inside `root`, so the output path must not be relative to our cwd
  let root = canonicalize_path(root);
  let root = root.as_path();
  let build_info_dir = root.join(format!("build-info-{}", Uuid::new_v4()));
  let build_info_arg = build_info_dir.display().to_string();
  let optimizer_runs = config.forge_optimizer_runs.to_string();

  let result = run_build_tool(
    &config.forge_program,
    &[
      "build",
      "--build-info",
      "--build-info-path",
      &build_info_arg,
      "--force",
      "--optimizer-runs",
      &optimizer_runs,
    ],
    root,
  )
  .await;

  let units = match result {
    Ok(_) if build_info_dir.is_dir() => build_info::read_units(&build_info_dir, config.stack_size),
    Ok(_) => Err(Error::new(format!(
      "forge build produced no build info at {}",
      build_info_dir.display()
    ))),
    Err(err) => Err(err),
  };

  if !config.keep_scratch && build_info_dir.exists() {
    if let Err(err) = fs::remove_dir_all(&build_info_dir) {
      tracing::debug!(path = %build_info_dir.display(), %err, "failed to remove build info");
    }
  }
  units
}
