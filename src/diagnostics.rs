use std::fmt;

use thiserror::Error;

/// A 1-based line/column location within cell source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Position {
    pub line: usize,
    pub col: usize,
}

impl Position {
    pub const fn new(line: usize, col: usize) -> Self {
        Self { line, col }
    }
}

/// The closed set of faults the interpreter can raise while evaluating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeFault {
    UndefinedVariable,
    DivisionByZero,
    IterableType,
    UnknownNamespace,
    UnknownFunction,
    InvalidPipeTarget,
    TypeMismatch,
    BudgetExceeded,
}

/// Classification of a diagnostic event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    Parser,
    Runtime(RuntimeFault),
    Host,
}

/// A single user-facing failure: one message, optionally anchored to a line.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub message: String,
    pub position: Option<Position>,
    pub notes: Vec<String>,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            position: None,
            notes: Vec::new(),
        }
    }

    pub fn parser(message: impl Into<String>, position: Position) -> Self {
        Self::new(DiagnosticKind::Parser, message).at(position)
    }

    pub fn runtime(fault: RuntimeFault, message: impl Into<String>, position: Position) -> Self {
        Self::new(DiagnosticKind::Runtime(fault), message).at(position)
    }

    pub fn at(mut self, position: Position) -> Self {
        self.position = Some(position);
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    pub fn line(&self) -> Option<usize> {
        self.position.map(|pos| pos.line)
    }

    pub fn fault(&self) -> Option<RuntimeFault> {
        match self.kind {
            DiagnosticKind::Runtime(fault) => Some(fault),
            _ => None,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.position {
            Some(pos) => write!(f, "Line {}: {}", pos.line, self.message)?,
            None => write!(f, "{}", self.message)?,
        }
        for note in &self.notes {
            write!(f, " ({note})")?;
        }
        Ok(())
    }
}

impl std::error::Error for Diagnostic {}

/// Unified error type for the cellscript engine and its host.
#[derive(Debug, Error)]
pub enum CellError {
    #[error("{0}")]
    Diagnostic(#[from] Diagnostic),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed message: {0}")]
    Message(#[from] serde_json::Error),
    #[error("invalid configuration: {0}")]
    Config(#[from] toml::de::Error),
    #[error("host runtime failed to initialize: {0}")]
    HostInit(String),
    #[error("execution worker has shut down")]
    WorkerClosed,
}

pub type Result<T> = std::result::Result<T, CellError>;
