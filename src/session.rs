use std::{
    io::{BufRead, Write},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Instant,
};

use once_cell::sync::OnceCell;
use tracing::{debug, error, info, warn};

use crate::{
    context::Context,
    diagnostics::{CellError, Result},
    host::HostBridge,
    library,
    output::select_output,
    protocol::{self, CellId, ExecuteRequest, OutputEnvelope, Request, Response},
    runtime::{ExecutionLimits, Interpreter},
};

type RuntimeLoader = Box<dyn Fn() -> Result<HostBridge> + Send + Sync>;

/// Runs execute requests against a host runtime that is built once, on the
/// first request, and shared by every request after it.
pub struct ExecutionHost {
    loader: RuntimeLoader,
    runtime: OnceCell<Arc<HostBridge>>,
    initializations: AtomicUsize,
    limits: ExecutionLimits,
}

impl ExecutionHost {
    pub fn new<F>(loader: F) -> Self
    where
        F: Fn() -> Result<HostBridge> + Send + Sync + 'static,
    {
        Self {
            loader: Box::new(loader),
            runtime: OnceCell::new(),
            initializations: AtomicUsize::new(0),
            limits: ExecutionLimits::default(),
        }
    }

    /// A host backed by the built-in `Core`, `Seq`, `Stats` and `Align` namespaces.
    pub fn standard() -> Self {
        Self::new(|| Ok(library::standard_bridge()))
    }

    pub fn with_limits(mut self, limits: ExecutionLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn limits(&self) -> ExecutionLimits {
        self.limits
    }

    /// Returns the shared runtime, running the loader if this is the first call.
    /// Concurrent callers block on the same initialization.
    pub fn runtime(&self) -> Result<Arc<HostBridge>> {
        self.runtime
            .get_or_try_init(|| {
                self.initializations.fetch_add(1, Ordering::SeqCst);
                let bridge = (self.loader)()?;
                info!(
                    namespaces = ?bridge.namespaces().collect::<Vec<_>>(),
                    "host runtime initialized"
                );
                Ok(Arc::new(bridge))
            })
            .cloned()
    }

    pub fn is_initialized(&self) -> bool {
        self.runtime.get().is_some()
    }

    /// Number of times the loader has run (successfully or not).
    pub fn initializations(&self) -> usize {
        self.initializations.load(Ordering::SeqCst)
    }

    /// Drops the runtime so the next request initializes it again.
    pub fn reset(&mut self) {
        if self.runtime.take().is_some() {
            debug!("host runtime reset");
        }
    }

    pub fn execute(&self, request: ExecuteRequest) -> Response {
        let ExecuteRequest {
            cell_id,
            code,
            mut context,
        } = request;
        debug!(cell = %cell_id, bindings = context.len(), "execute request received");

        let bridge = match self.runtime() {
            Ok(bridge) => bridge,
            Err(err) => {
                error!(cell = %cell_id, error = %err, "host runtime unavailable");
                return Response::Error {
                    cell_id,
                    message: err.to_string(),
                    context,
                };
            }
        };

        let started = Instant::now();
        let mut interpreter = Interpreter::new(bridge).with_limits(self.limits);
        let outcome = interpreter.eval_source(&code, &mut context);
        let timing_ms = (started.elapsed().as_secs_f64() * 1000.0).round() as u64;

        match outcome {
            Ok(evaluation) => {
                let output = select_output(&evaluation);
                debug!(cell = %cell_id, timing_ms, kind = %output.kind, "cell executed");
                Response::Result {
                    cell_id,
                    output: OutputEnvelope { output, timing_ms },
                    context,
                }
            }
            Err(diagnostic) => {
                warn!(cell = %cell_id, timing_ms, error = %diagnostic, "cell failed");
                Response::Error {
                    cell_id,
                    message: diagnostic.to_string(),
                    context,
                }
            }
        }
    }

    /// `None` for message types other than `execute`.
    pub fn handle(&self, request: Request) -> Option<Response> {
        match request {
            Request::Execute(request) => Some(self.execute(request)),
            Request::Unknown => {
                debug!("ignoring non-execute message");
                None
            }
        }
    }

    pub fn handle_json(&self, line: &str) -> Option<String> {
        let response = match protocol::decode_request(line) {
            Ok(request) => self.handle(request)?,
            Err(err) => {
                let err = CellError::from(err);
                warn!(error = %err, "rejecting undecodable message");
                Response::Error {
                    cell_id: salvage_cell_id(line),
                    message: err.to_string(),
                    context: Context::new(),
                }
            }
        };
        match protocol::encode_response(&response) {
            Ok(encoded) => Some(encoded),
            Err(err) => {
                error!(error = %err, "failed to encode response");
                None
            }
        }
    }

    /// Newline-delimited JSON loop: one request per line in, one response per
    /// line out, strictly in order. Blank lines are skipped.
    pub fn serve<R: BufRead, W: Write>(&self, reader: R, mut writer: W) -> Result<()> {
        info!("serving execute requests");
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            if let Some(response) = self.handle_json(&line) {
                writeln!(writer, "{response}")?;
                writer.flush()?;
            }
        }
        info!("input closed, host stopping");
        Ok(())
    }
}

/// The `cellId` of a message that failed to decode, if it is still readable JSON.
fn salvage_cell_id(line: &str) -> CellId {
    serde_json::from_str::<serde_json::Value>(line)
        .ok()
        .and_then(|mut raw| raw.get_mut("cellId").map(serde_json::Value::take))
        .unwrap_or_default()
}

impl std::fmt::Debug for ExecutionHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionHost")
            .field("initialized", &self.is_initialized())
            .field("initializations", &self.initializations())
            .field("limits", &self.limits)
            .finish()
    }
}
