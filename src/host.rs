use std::fmt;

use indexmap::IndexMap;
use thiserror::Error;
use tracing::debug;

use crate::value::Value;

/// Failure raised by a host function. Surfaced to the user verbatim.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum HostError {
    #[error("Unknown function: {namespace}.{function}")]
    UnknownFunction { namespace: String, function: String },
    #[error("`{function}` expected {expected} arguments but received {received}")]
    Arity {
        function: String,
        expected: String,
        received: usize,
    },
    #[error("`{function}` expected {expected} but found {found}")]
    ArgumentType {
        function: String,
        expected: &'static str,
        found: &'static str,
    },
    #[error("{0}")]
    Failed(String),
}

impl HostError {
    pub fn failed(message: impl Into<String>) -> Self {
        HostError::Failed(message.into())
    }
}

pub type HostResult = std::result::Result<Value, HostError>;

/// A named group of callable host functions.
pub trait HostNamespace: Send + Sync {
    fn name(&self) -> &str;

    fn has_function(&self, function: &str) -> bool;

    fn call(&self, function: &str, args: &[Value]) -> HostResult;

    fn functions(&self) -> Vec<&str> {
        Vec::new()
    }
}

/// Accepted argument count for a native function, inclusive on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Arity {
    pub min: usize,
    pub max: usize,
}

impl Arity {
    pub const fn exact(count: usize) -> Self {
        Self {
            min: count,
            max: count,
        }
    }

    pub const fn between(min: usize, max: usize) -> Self {
        Self { min, max }
    }

    fn admits(self, count: usize) -> bool {
        (self.min..=self.max).contains(&count)
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.min == self.max {
            write!(f, "{}", self.min)
        } else {
            write!(f, "{} to {}", self.min, self.max)
        }
    }
}

#[derive(Clone)]
pub struct NativeFunction {
    pub name: &'static str,
    pub arity: Arity,
    pub callback: fn(&[Value]) -> HostResult,
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<native fn {}>", self.name)
    }
}

pub fn native(
    name: &'static str,
    arity: Arity,
    callback: fn(&[Value]) -> HostResult,
) -> NativeFunction {
    NativeFunction {
        name,
        arity,
        callback,
    }
}

/// A namespace backed by a table of plain Rust functions.
#[derive(Debug, Clone)]
pub struct NativeNamespace {
    name: String,
    functions: IndexMap<&'static str, NativeFunction>,
}

impl NativeNamespace {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            functions: IndexMap::new(),
        }
    }

    pub fn with(mut self, function: NativeFunction) -> Self {
        self.functions.insert(function.name, function);
        self
    }
}

impl HostNamespace for NativeNamespace {
    fn name(&self) -> &str {
        &self.name
    }

    fn has_function(&self, function: &str) -> bool {
        self.functions.contains_key(function)
    }

    fn call(&self, function: &str, args: &[Value]) -> HostResult {
        let Some(native) = self.functions.get(function) else {
            return Err(HostError::UnknownFunction {
                namespace: self.name.clone(),
                function: function.to_string(),
            });
        };
        if !native.arity.admits(args.len()) {
            return Err(HostError::Arity {
                function: format!("{}.{}", self.name, native.name),
                expected: native.arity.to_string(),
                received: args.len(),
            });
        }
        (native.callback)(args)
    }

    fn functions(&self) -> Vec<&str> {
        self.functions.keys().copied().collect()
    }
}

/// Registry from namespace name to capability object.
#[derive(Default)]
pub struct HostBridge {
    namespaces: IndexMap<String, Box<dyn HostNamespace>>,
}

impl fmt::Debug for HostBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostBridge")
            .field("namespaces", &self.namespaces.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl HostBridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a namespace under its own name, replacing any earlier one.
    pub fn register<N: HostNamespace + 'static>(&mut self, namespace: N) -> &mut Self {
        self.namespaces
            .insert(namespace.name().to_string(), Box::new(namespace));
        self
    }

    pub fn with<N: HostNamespace + 'static>(mut self, namespace: N) -> Self {
        self.register(namespace);
        self
    }

    pub fn resolve(&self, namespace: &str) -> Option<&dyn HostNamespace> {
        self.namespaces.get(namespace).map(|ns| ns.as_ref())
    }

    pub fn dispatch(&self, handle: &dyn HostNamespace, function: &str, args: &[Value]) -> HostResult {
        debug!(
            namespace = handle.name(),
            function,
            args = args.len(),
            "dispatching host call"
        );
        handle.call(function, args)
    }

    pub fn namespaces(&self) -> impl Iterator<Item = &str> {
        self.namespaces.keys().map(String::as_str)
    }
}

pub fn expect_number(value: &Value, name: &str) -> Result<f64, HostError> {
    value.as_number().ok_or_else(|| mismatch(value, "number", name))
}

pub fn expect_string<'v>(value: &'v Value, name: &str) -> Result<&'v str, HostError> {
    value.as_str().ok_or_else(|| mismatch(value, "string", name))
}

pub fn expect_array<'v>(value: &'v Value, name: &str) -> Result<&'v [Value], HostError> {
    value.as_array().ok_or_else(|| mismatch(value, "array", name))
}

pub fn expect_numbers(value: &Value, name: &str) -> Result<Vec<f64>, HostError> {
    expect_array(value, name)?
        .iter()
        .map(|item| expect_number(item, name))
        .collect()
}

fn mismatch(value: &Value, expected: &'static str, name: &str) -> HostError {
    HostError::ArgumentType {
        function: name.to_string(),
        expected,
        found: value.type_name(),
    }
}
