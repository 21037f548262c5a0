use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use foundry_compilers::artifacts::remappings::Remapping;

use super::BuildUnit;
use crate::compiler::input::{CompilerInputDocument, InputSettings, SourceEntry};
use crate::internal::errors::{map_err_with_context, Error, Result};
use crate::internal::path::{collect_files_with_extension, source_unit_name};
use crate::internal::solc::parse_version;

pub const REMAPPINGS_FILE: &str = "remappings.txt";

/// Collect every `.sol` file under `root` into a single unit compiled with `compiler_version`.
pub fn collect_unit(root: &Path, compiler_version: Option<&str>) -> Result<BuildUnit> {
  let version = compiler_version
    .map(str::trim)
    .filter(|version| !version.is_empty())
    .ok_or_else(|| Error::new("Compiler version not specified"))?;
  parse_version(version)?;

  let mut sources = BTreeMap::new();
  for path in collect_files_with_extension(root, "sol")? {
    let content = map_err_with_context(
      fs::read_to_string(&path),
      format!("Failed to read {}", path.display()),
    )?;
    sources.insert(source_unit_name(root, &path), SourceEntry::from_content(content));
  }
  if sources.is_empty() {
    tracing::warn!(root = %root.display(), "no Solidity sources found");
  }

  let remappings = read_remappings(root)?;
  Ok(BuildUnit {
    compiler_version: version.to_string(),
    input: CompilerInputDocument::solidity(sources, InputSettings::with_remappings(remappings)),
  })
}

/// One remapping per non-blank line of `remappings.txt`. Lines foundry cannot parse are kept
/// and passed to the compiler as written.
pub fn read_remappings(root: &Path) -> Result<Vec<String>> {
  let path = root.join(REMAPPINGS_FILE);
  if !path.is_file() {
    return Ok(Vec::new());
  }
  let contents = map_err_with_context(
    fs::read_to_string(&path),
    format!("Failed to read {}", path.display()),
  )?;

  Ok(
    contents
      .lines()
      .map(str::trim)
      .filter(|line| !line.is_empty())
      .inspect(|line| {
        if let Err(err) = Remapping::from_str(line) {
          tracing::warn!(remapping = %line, %err, "remapping does not look valid");
        }
      })
      .map(str::to_string)
      .collect(),
  )
}
