#![recursion_limit = "256"]

pub mod artifact;
pub mod ast;
pub mod backend;
pub mod compiler;
mod internal;
pub mod pipeline;
pub mod reconcile;

pub use artifact::{
  write_pretty_json, CompilationArtifact, CompilerArgs, PerContract, SourceRecord,
};
pub use backend::{detect_backend, BackendKind, BuildUnit};
pub use compiler::{
  worker::WorkerRequest, CompileFailure, CompileOutcome, CompilerInputDocument, CompilerInvoker,
  RawCompilationOutput,
};
pub use internal::config::{BuildConfig, BuildConfigOptions, WorkerCommand};
pub use internal::errors::{Error, Result};
pub use pipeline::{build_project, compile_units, reconcile_addresses, BuildRequest};
pub use reconcile::{ChainRpc, DeploymentTarget, JsonRpcClient, TargetMap};
