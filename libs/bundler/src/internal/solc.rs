use std::sync::{Mutex, OnceLock};

use foundry_compilers::solc::Solc;
use regex::Regex;
use semver::{BuildMetadata, Version};

use super::errors::{map_err_with_context, Error, Result};

/// Parse a user or build-info supplied compiler version. A leading `v` and any `+commit.<hash>`
/// build metadata are accepted and dropped, since SVM releases are keyed by the bare version.
pub fn parse_version(version: &str) -> Result<Version> {
  let trimmed = version.trim().trim_start_matches('v');
  let mut parsed = map_err_with_context(Version::parse(trimmed), "Failed to parse solc version")?;
  parsed.build = BuildMetadata::EMPTY;
  Ok(parsed)
}

fn long_version_pattern() -> Option<&'static Regex> {
  static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
  PATTERN
    .get_or_init(|| Regex::new(r"^(.+?)\+commit\.[0-9a-z]+").ok())
    .as_ref()
}

/// Extract the semantic version prefix from a build-info `solcLongVersion` such as
/// `0.8.19+commit.7dd6d404`. Returns `None` when no `+commit.<hash>` suffix is present.
pub fn version_from_long_version(long_version: &str) -> Option<String> {
  long_version_pattern()?
    .captures(long_version.trim())
    .and_then(|captures| captures.get(1))
    .map(|prefix| prefix.as_str().to_string())
}

pub fn find_installed_version(version: &Version) -> Result<Option<Solc>> {
  map_err_with_context(
    Solc::find_svm_installed_version(version),
    "Failed to inspect solc versions",
  )
}

fn install_mutex() -> &'static Mutex<()> {
  static INSTALL_MUTEX: OnceLock<Mutex<()>> = OnceLock::new();
  INSTALL_MUTEX.get_or_init(|| Mutex::new(()))
}

/// Locate the requested release in the SVM cache, downloading it first when missing.
pub fn ensure_installed(version: &Version) -> Result<Solc> {
  if let Some(solc) = find_installed_version(version)? {
    return Ok(solc);
  }

  let _guard = install_mutex()
    .lock()
    .map_err(|err| Error::new(format!("Solc install mutex poisoned: {err}")))?;

  // another thread may have finished the download while we waited
  if let Some(solc) = find_installed_version(version)? {
    return Ok(solc);
  }
  tracing::info!(%version, "installing solc release");
  map_err_with_context(
    Solc::blocking_install(version),
    format!("Failed to install solc {version}"),
  )
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parse_version_accepts_prefix_and_build_metadata() {
    let version = parse_version("v0.8.19+commit.7dd6d404").expect("version");
    assert_eq!(version, Version::new(0, 8, 19));

    let version = parse_version(" 0.7.6 ").expect("version");
    assert_eq!(version, Version::new(0, 7, 6));
  }

  #[test]
  fn parse_version_rejects_garbage() {
    let err = parse_version("latest").unwrap_err();
    assert!(err.message().starts_with("Failed to parse solc version"));
  }

  #[test]
  fn long_version_prefix_excludes_commit_suffix() {
    assert_eq!(
      version_from_long_version("0.8.19+commit.7dd6d404").as_deref(),
      Some("0.8.19")
    );
    assert_eq!(
      version_from_long_version("0.6.12+commit.27d51765.Emscripten.clang").as_deref(),
      Some("0.6.12")
    );
    assert_eq!(version_from_long_version("0.8.19"), None);
  }
}
