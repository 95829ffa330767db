//! Engine for notebook cells written in a small pipe-oriented scripting
//! language: lexing, parsing, tree-walking evaluation against a persistent
//! context, a namespaced host-function bridge, and a JSON execution host.

pub mod ast;
pub mod config;
pub mod context;
pub mod diagnostics;
pub mod host;
pub mod lexer;
pub mod library;
pub mod output;
pub mod parser;
pub mod protocol;
pub mod repl;
pub mod runtime;
pub mod session;
pub mod value;
pub mod worker;

pub use config::EngineConfig;
pub use context::Context;
pub use diagnostics::{CellError, Diagnostic, DiagnosticKind, Position, RuntimeFault};
pub use host::{HostBridge, HostError, HostNamespace};
pub use output::Output;
pub use protocol::{ExecuteRequest, Request, Response};
pub use repl::Repl;
pub use runtime::{DisplayOutput, Evaluation, ExecutionLimits, Interpreter};
pub use session::ExecutionHost;
pub use value::Value;
pub use worker::Worker;
