use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::errors::{map_err_with_context, Error, Result};

/// Name of the optional per-project configuration file.
pub const CONFIG_FILE_NAME: &str = "bundler.toml";

pub const DEFAULT_SCRATCH_DIR: &str = ".tmp";
pub const DEFAULT_WORKER_SUBCOMMAND: &str = "solc-worker";
/// Native stack handed to the compiler worker; deeply nested ASTs recurse far past the default.
pub const DEFAULT_STACK_SIZE: usize = 64 * 1024 * 1024;
pub const DEFAULT_OPTIMIZER_RUNS: u32 = 1000;
pub const DEFAULT_RPC_URL: &str = "http://127.0.0.1:8545";
pub const DEFAULT_LENGTH_TOLERANCE: f64 = 0.10;

/// Finalised configuration consumed by the backends, the compiler adapter and the reconciler.
#[derive(Clone, Debug, PartialEq)]
pub struct BuildConfig {
  pub scratch_dir: PathBuf,
  pub keep_scratch: bool,
  pub worker_program: Option<PathBuf>,
  pub worker_args: Vec<String>,
  pub stack_size: usize,
  pub forge_program: String,
  pub forge_optimizer_runs: u32,
  pub npm_program: String,
  pub npx_program: String,
  pub npm_install: bool,
  pub rpc_url: String,
  pub length_tolerance: f64,
}

impl Default for BuildConfig {
  fn default() -> Self {
    BuildConfig {
      scratch_dir: PathBuf::from(DEFAULT_SCRATCH_DIR),
      keep_scratch: false,
      worker_program: None,
      worker_args: vec![DEFAULT_WORKER_SUBCOMMAND.to_string()],
      stack_size: DEFAULT_STACK_SIZE,
      forge_program: "forge".to_string(),
      forge_optimizer_runs: DEFAULT_OPTIMIZER_RUNS,
      npm_program: "npm".to_string(),
      npx_program: "npx".to_string(),
      npm_install: true,
      rpc_url: DEFAULT_RPC_URL.to_string(),
      length_tolerance: DEFAULT_LENGTH_TOLERANCE,
    }
  }
}

impl BuildConfig {
  pub fn from_options(options: Option<BuildConfigOptions>) -> Result<Self> {
    let mut builder = BuildConfigBuilder::from_defaults();
    if let Some(overrides) = options {
      builder = builder.apply_options(overrides);
    }
    builder.build()
  }

  pub fn merge_options(&self, options: Option<&BuildConfigOptions>) -> Result<Self> {
    let mut builder = BuildConfigBuilder::with_base(self.clone());
    if let Some(overrides) = options {
      builder = builder.apply_options(overrides.clone());
    }
    builder.build()
  }

  /// Defaults, then `bundler.toml` from `project_root` (when present), then `overrides`.
  pub fn load(project_root: &Path, overrides: Option<&BuildConfigOptions>) -> Result<Self> {
    let file_options = BuildConfigOptions::from_project_root(project_root)?;
    BuildConfig::from_options(file_options)?.merge_options(overrides)
  }

  /// Resolve the program + argument prefix used to launch a compiler worker. Without an explicit
  /// program the running executable is re-entered through its `solc-worker` subcommand.
  pub fn worker_command(&self) -> Result<WorkerCommand> {
    let program = match &self.worker_program {
      Some(program) => program.clone(),
      None => map_err_with_context(
        std::env::current_exe(),
        "Failed to resolve the current executable for the compiler worker",
      )?,
    };
    Ok(WorkerCommand {
      program,
      args: self.worker_args.clone(),
    })
  }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkerCommand {
  pub program: PathBuf,
  pub args: Vec<String>,
}

/// Optional overrides merged on top of a [`BuildConfig`]. Deserialised from `bundler.toml` and
/// populated from CLI flags.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct BuildConfigOptions {
  pub scratch_dir: Option<PathBuf>,
  pub keep_scratch: Option<bool>,
  pub worker_program: Option<PathBuf>,
  pub worker_args: Option<Vec<String>>,
  pub stack_size: Option<usize>,
  pub forge_program: Option<String>,
  pub forge_optimizer_runs: Option<u32>,
  pub npm_program: Option<String>,
  pub npx_program: Option<String>,
  pub npm_install: Option<bool>,
  pub rpc_url: Option<String>,
  pub length_tolerance: Option<f64>,
}

impl BuildConfigOptions {
  pub fn from_toml_str(contents: &str) -> Result<Self> {
    map_err_with_context(toml::from_str(contents), "Failed to parse bundler.toml")
  }

  pub fn from_project_root(root: &Path) -> Result<Option<Self>> {
    let path = root.join(CONFIG_FILE_NAME);
    if !path.is_file() {
      return Ok(None);
    }
    let contents = map_err_with_context(
      fs::read_to_string(&path),
      format!("Failed to read {}", path.display()),
    )?;
    Self::from_toml_str(&contents).map(Some)
  }
}

struct BuildConfigBuilder {
  config: BuildConfig,
}

impl BuildConfigBuilder {
  fn from_defaults() -> Self {
    Self::with_base(BuildConfig::default())
  }

  fn with_base(config: BuildConfig) -> Self {
    Self { config }
  }

  fn apply_options(mut self, options: BuildConfigOptions) -> Self {
    let BuildConfigOptions {
      scratch_dir,
      keep_scratch,
      worker_program,
      worker_args,
      stack_size,
      forge_program,
      forge_optimizer_runs,
      npm_program,
      npx_program,
      npm_install,
      rpc_url,
      length_tolerance,
    } = options;
    let config = &mut self.config;

    if let Some(value) = scratch_dir {
      config.scratch_dir = value;
    }
    if let Some(value) = keep_scratch {
      config.keep_scratch = value;
    }
    if let Some(value) = worker_program {
      config.worker_program = Some(value);
    }
    if let Some(value) = worker_args {
      config.worker_args = value;
    }
    if let Some(value) = stack_size {
      config.stack_size = value;
    }
    if let Some(value) = forge_program {
      config.forge_program = value;
    }
    if let Some(value) = forge_optimizer_runs {
      config.forge_optimizer_runs = value;
    }
    if let Some(value) = npm_program {
      config.npm_program = value;
    }
    if let Some(value) = npx_program {
      config.npx_program = value;
    }
    if let Some(value) = npm_install {
      config.npm_install = value;
    }
    if let Some(value) = rpc_url {
      config.rpc_url = value;
    }
    if let Some(value) = length_tolerance {
      config.length_tolerance = value;
    }
    self
  }

  fn build(self) -> Result<BuildConfig> {
    let config = self.config;
    if config.stack_size == 0 {
      return Err(Error::new("stack-size must be greater than zero"));
    }
    if !config.length_tolerance.is_finite() || config.length_tolerance < 0.0 {
      return Err(Error::new(format!(
        "length-tolerance must be a non-negative number, got {}",
        config.length_tolerance
      )));
    }
    Ok(config)
  }
}
