use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Instant;

use thiserror::Error;
use tokio::process::Command;
use uuid::Uuid;

use super::input::CompilerInputDocument;
use super::output::RawCompilationOutput;
use crate::internal::config::{BuildConfig, WorkerCommand};
use crate::internal::errors::Result;

/// Why a single compilation unit produced no output. Never aborts sibling units.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileFailure {
  #[error("compiler reported errors:\n{0}")]
  Diagnostics(String),
  #[error("compiler worker failed: {0}")]
  Subprocess(String),
  #[error("scratch file error: {0}")]
  Scratch(String),
  #[error("malformed compiler output: {0}")]
  MalformedOutput(String),
}

#[derive(Debug)]
pub enum CompileOutcome {
  Success(RawCompilationOutput),
  Failure(CompileFailure),
}

impl CompileOutcome {
  pub fn is_success(&self) -> bool {
    matches!(self, CompileOutcome::Success(_))
  }

  pub fn into_result(self) -> std::result::Result<RawCompilationOutput, CompileFailure> {
    match self {
      CompileOutcome::Success(output) => Ok(output),
      CompileOutcome::Failure(failure) => Err(failure),
    }
  }
}

/// Runs one compiler version per call in a separate worker process, exchanging the input and
/// output documents through a scratch file.
#[derive(Debug, Clone)]
pub struct CompilerInvoker {
  worker: WorkerCommand,
  scratch_dir: PathBuf,
  stack_size: usize,
  keep_scratch: bool,
}

impl CompilerInvoker {
  pub fn new(
    worker: WorkerCommand,
    scratch_dir: impl Into<PathBuf>,
    stack_size: usize,
    keep_scratch: bool,
  ) -> Self {
    Self {
      worker,
      scratch_dir: scratch_dir.into(),
      stack_size,
      keep_scratch,
    }
  }

  pub fn from_config(config: &BuildConfig) -> Result<Self> {
    Ok(Self::new(
      config.worker_command()?,
      config.scratch_dir.clone(),
      config.stack_size,
      config.keep_scratch,
    ))
  }

  pub fn stack_size(&self) -> usize {
    self.stack_size
  }

  /// Compile `document` with the given compiler version. Forced output selectors are applied
  /// before the document is written out.
  pub async fn compile(&self, version: &str, document: &CompilerInputDocument) -> CompileOutcome {
    let document = document.clone().with_forced_outputs();
    let scratch = self.scratch_path();

    if let Err(failure) = self.write_scratch(&scratch, &document).await {
      return CompileOutcome::Failure(failure);
    }

    let started = Instant::now();
    let outcome = match self.run_worker(version, &scratch).await {
      Ok(()) => self.read_output(&scratch, &document).await,
      Err(failure) => CompileOutcome::Failure(failure),
    };
    tracing::info!(
      version,
      elapsed_ms = started.elapsed().as_millis() as u64,
      "compiling took"
    );

    if !self.keep_scratch {
      if let Err(err) = tokio::fs::remove_file(&scratch).await {
        if err.kind() != std::io::ErrorKind::NotFound {
          tracing::debug!(path = %scratch.display(), %err, "failed to remove scratch file");
        }
      }
    }
    outcome
  }

  fn scratch_path(&self) -> PathBuf {
    self
      .scratch_dir
      .join(format!("{}-{}.json", std::process::id(), Uuid::new_v4()))
  }

  async fn write_scratch(
    &self,
    scratch: &Path,
    document: &CompilerInputDocument,
  ) -> std::result::Result<(), CompileFailure> {
    tokio::fs::create_dir_all(&self.scratch_dir)
      .await
      .map_err(|err| scratch_failure(scratch, err))?;
    let bytes = serde_json::to_vec(document).map_err(|err| scratch_failure(scratch, err))?;
    tokio::fs::write(scratch, bytes)
      .await
      .map_err(|err| scratch_failure(scratch, err))
  }

  async fn run_worker(&self, version: &str, scratch: &Path) -> std::result::Result<(), CompileFailure> {
    tracing::debug!(
      program = %self.worker.program.display(),
      version,
      scratch = %scratch.display(),
      "spawning compiler worker"
    );
    let output = Command::new(&self.worker.program)
      .args(&self.worker.args)
      .arg(version)
      .arg(scratch)
      .arg("--stack-size")
      .arg(self.stack_size.to_string())
      .stdin(Stdio::null())
      .stdout(Stdio::piped())
      .stderr(Stdio::piped())
      .output()
      .await
      .map_err(|err| {
        CompileFailure::Subprocess(format!(
          "failed to launch {}: {err}",
          self.worker.program.display()
        ))
      })?;

    if output.status.success() {
      return Ok(());
    }
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    if stderr.is_empty() {
      Err(CompileFailure::Subprocess(format!(
        "worker exited with {}",
        output.status
      )))
    } else {
      Err(CompileFailure::Subprocess(stderr))
    }
  }

  async fn read_output(&self, scratch: &Path, document: &CompilerInputDocument) -> CompileOutcome {
    let bytes = match tokio::fs::read(scratch).await {
      Ok(bytes) => bytes,
      Err(err) => {
        return CompileOutcome::Failure(CompileFailure::Subprocess(format!(
          "worker left no output at {}: {err}",
          scratch.display()
        )))
      }
    };

    let contents: Vec<(String, String)> = document
      .source_contents()
      .map(|(path, content)| (path.to_string(), content.to_string()))
      .collect();
    let stack_size = self.stack_size;
    let parsed = tokio::task::spawn_blocking(move || {
      stacker::grow(stack_size, move || finish_output(&bytes, &contents))
    })
    .await;

    match parsed {
      Ok(outcome) => outcome,
      Err(err) => CompileOutcome::Failure(CompileFailure::MalformedOutput(format!(
        "output parser did not finish: {err}"
      ))),
    }
  }
}

fn scratch_failure(path: &Path, err: impl std::fmt::Display) -> CompileFailure {
  CompileFailure::Scratch(format!("{}: {err}", path.display()))
}

/// Parse, check diagnostics and overlay sources. A rejected output is dropped here, on the grown
/// stack it was parsed on.
fn finish_output(bytes: &[u8], contents: &[(String, String)]) -> CompileOutcome {
  let mut output = match RawCompilationOutput::from_slice(bytes) {
    Ok(output) => output,
    Err(err) => return CompileOutcome::Failure(CompileFailure::MalformedOutput(err.to_string())),
  };

  if output.has_errors() {
    let messages: Vec<&str> = output.error_diagnostics().map(|diag| diag.text()).collect();
    for message in &messages {
      tracing::warn!("{message}");
    }
    let failure = CompileFailure::Diagnostics(messages.join("\n"));
    drop(output);
    return CompileOutcome::Failure(failure);
  }

  output.overlay_sources(
    contents
      .iter()
      .map(|(path, content)| (path.as_str(), content.as_str())),
  );
  CompileOutcome::Success(output)
}
