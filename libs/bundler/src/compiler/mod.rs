//! Compiler invocation: input documents, the worker subprocess protocol and raw output.

pub mod input;
pub mod invoke;
pub mod output;
pub mod worker;

pub use input::{CompilerInputDocument, InputSettings, SourceEntry};
pub use invoke::{CompileFailure, CompileOutcome, CompilerInvoker};
pub use output::RawCompilationOutput;
