use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::BuildUnit;
use crate::compiler::input::CompilerInputDocument;
use crate::internal::errors::{map_err_with_context, Error, Result};
use crate::internal::solc::version_from_long_version;

/// The subset of a build-info file needed to recompile it. The embedded `output` is skipped.
#[derive(Debug, Deserialize)]
struct BuildInfoFragment {
  #[serde(rename = "solcLongVersion")]
  solc_long_version: String,
  input: CompilerInputDocument,
}

/// Read every `*.json` build-info fragment in `dir`, in file-name order, as one unit each.
pub fn read_units(dir: &Path, stack_size: usize) -> Result<Vec<BuildUnit>> {
  let mut fragments: Vec<PathBuf> = map_err_with_context(
    fs::read_dir(dir),
    format!("Failed to read build-info directory {}", dir.display()),
  )?
  .filter_map(|entry| entry.ok().map(|entry| entry.path()))
  .filter(|path| {
    path.is_file()
      && path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false)
  })
  .collect();
  fragments.sort();

  let mut units = Vec::with_capacity(fragments.len());
  for path in fragments {
    let bytes = map_err_with_context(
      fs::read(&path),
      format!("Failed to read build-info {}", path.display()),
    )?;
    let unit = stacker::grow(stack_size, || parse_unit(&bytes));
    units.push(unit.map_err(|err| Error::with_context(path.display().to_string(), err))?);
  }
  Ok(units)
}

/// Parse one build-info fragment. Fragments embed the full compiler output, so the recursion
/// limit is lifted and the caller provides the stack.
pub fn parse_unit(bytes: &[u8]) -> Result<BuildUnit> {
  let mut deserializer = serde_json::Deserializer::from_slice(bytes);
  deserializer.disable_recursion_limit();
  let fragment = map_err_with_context(
    BuildInfoFragment::deserialize(&mut deserializer),
    "Invalid build-info",
  )?;

  let compiler_version =
    version_from_long_version(&fragment.solc_long_version).ok_or_else(|| {
      Error::new(format!(
        "Unrecognised solcLongVersion {}",
        fragment.solc_long_version
      ))
    })?;
  Ok(BuildUnit {
    compiler_version,
    input: fragment.input,
  })
}
