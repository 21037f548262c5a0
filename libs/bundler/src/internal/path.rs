use std::fs;
use std::path::{Path, PathBuf};

use super::errors::{map_err_with_context, Result};

/// Canonicalises a path while falling back to an absolute join if canonicalisation fails, so
/// scratch directories that do not exist yet still resolve predictably.
pub fn canonicalize_path(path: &Path) -> PathBuf {
  match fs::canonicalize(path) {
    Ok(canonical) => canonical,
    Err(_) => {
      if path.is_absolute() {
        path.to_path_buf()
      } else {
        std::env::current_dir()
          .unwrap_or_else(|_| PathBuf::from("."))
          .join(path)
      }
    }
  }
}

/// Recursively collect every file below `root` with the given extension. Hidden entries
/// (leading `.`) are skipped. The result is sorted so source maps stay deterministic.
pub fn collect_files_with_extension(root: &Path, extension: &str) -> Result<Vec<PathBuf>> {
  let mut found = Vec::new();
  let mut pending = vec![root.to_path_buf()];

  while let Some(dir) = pending.pop() {
    let entries = map_err_with_context(
      fs::read_dir(&dir),
      format!("Failed to read directory {}", dir.display()),
    )?;
    for entry in entries.flatten() {
      let path = entry.path();
      let hidden = path
        .file_name()
        .and_then(|name| name.to_str())
        .map(|name| name.starts_with('.'))
        .unwrap_or(false);
      if hidden {
        continue;
      }
      let Ok(file_type) = entry.file_type() else {
        continue;
      };
      if file_type.is_dir() {
        pending.push(path);
      } else if file_type.is_file()
        && path
          .extension()
          .and_then(|ext| ext.to_str())
          .map(|ext| ext.eq_ignore_ascii_case(extension))
          .unwrap_or(false)
      {
        found.push(path);
      }
    }
  }

  found.sort();
  Ok(found)
}

/// Source unit name for `path` relative to `root`, always using forward slashes.
pub fn source_unit_name(root: &Path, path: &Path) -> String {
  let relative = path.strip_prefix(root).unwrap_or(path);
  relative
    .components()
    .map(|component| component.as_os_str().to_string_lossy())
    .collect::<Vec<_>>()
    .join("/")
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn collects_nested_sources_and_skips_hidden_dirs() {
    let temp = tempfile::tempdir().expect("tempdir");
    let root = temp.path();
    fs::create_dir_all(root.join("contracts/lib")).expect("nested");
    fs::create_dir_all(root.join(".git")).expect("hidden");
    fs::write(root.join("contracts/Token.sol"), "").expect("token");
    fs::write(root.join("contracts/lib/Math.SOL"), "").expect("math");
    fs::write(root.join("contracts/README.md"), "").expect("readme");
    fs::write(root.join(".git/Ignored.sol"), "").expect("ignored");

    let files = collect_files_with_extension(root, "sol").expect("collect");
    let names = files
      .iter()
      .map(|path| source_unit_name(root, path))
      .collect::<Vec<_>>();
    assert_eq!(names, vec!["contracts/Token.sol", "contracts/lib/Math.SOL"]);
  }

  #[test]
  fn canonicalize_relative_missing_path_joins_cwd() {
    let resolved = canonicalize_path(Path::new("does-not-exist/.tmp"));
    assert!(resolved.is_absolute());
    assert!(resolved.ends_with("does-not-exist/.tmp"));
  }
}
