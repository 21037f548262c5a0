use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::internal::errors::{map_err_with_context, Error, Result};
use crate::internal::solc;

/// One compiler run as requested by the parent process: `<version> <scratch> --stack-size <n>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerRequest {
  pub version: String,
  pub scratch: PathBuf,
  pub stack_size: usize,
}

/// Run the request on a thread with the requested native stack and wait for it.
pub fn run(request: WorkerRequest) -> Result<()> {
  let stack_size = request.stack_size;
  let handle = map_err_with_context(
    std::thread::Builder::new()
      .name(format!("solc-worker({})", request.version))
      .stack_size(stack_size)
      .spawn(move || compile_in_place(&request.version, &request.scratch)),
    "Failed to start compiler worker thread",
  )?;
  handle
    .join()
    .map_err(|_| Error::new("Compiler worker thread panicked"))?
}

/// Read the standard-JSON input at `scratch`, compile it with `version` and overwrite the same
/// file with the compiler's raw output.
pub fn compile_in_place(version: &str, scratch: &Path) -> Result<()> {
  let version = solc::parse_version(version)?;
  let solc = solc::ensure_installed(&version)?;

  let input = map_err_with_context(
    fs::read(scratch),
    format!("Failed to read compiler input {}", scratch.display()),
  )?;
  let input = parse_input(&input)?;

  tracing::debug!(%version, scratch = %scratch.display(), "running solc --standard-json");
  let output = map_err_with_context(
    solc.compile_output(&input),
    format!("solc {version} failed"),
  )?;

  map_err_with_context(
    fs::write(scratch, output),
    format!("Failed to write compiler output {}", scratch.display()),
  )
}

fn parse_input(bytes: &[u8]) -> Result<Value> {
  let mut deserializer = serde_json::Deserializer::from_slice(bytes);
  deserializer.disable_recursion_limit();
  let value = map_err_with_context(
    serde::Deserialize::deserialize(&mut deserializer),
    "Compiler input is not valid JSON",
  )?;
  map_err_with_context(deserializer.end(), "Compiler input has trailing data")?;
  Ok(value)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn rejects_bad_version_before_touching_scratch() {
    let temp = tempfile::tempdir().expect("tempdir");
    let scratch = temp.path().join("missing.json");
    let err = compile_in_place("latest", &scratch).unwrap_err();
    assert!(err.message().starts_with("Failed to parse solc version"));
  }

  #[test]
  fn input_parsing_reports_trailing_data() {
    assert!(parse_input(br#"{"language":"Solidity"}"#).is_ok());
    let err = parse_input(br#"{"language":"Solidity"} {}"#).unwrap_err();
    assert!(err.message().starts_with("Compiler input has trailing data"));
  }

  #[test]
  fn thread_failures_surface_as_errors() {
    let err = run(WorkerRequest {
      version: "not-a-version".to_string(),
      scratch: PathBuf::from("unused.json"),
      stack_size: 4 * 1024 * 1024,
    })
    .unwrap_err();
    assert!(err.message().contains("solc version"));
  }
}
