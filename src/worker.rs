use std::{
    sync::mpsc::{self, Receiver, Sender},
    thread::{self, JoinHandle},
};

use tracing::{debug, info};

use crate::{
    diagnostics::{CellError, Result},
    protocol::{ExecuteRequest, Response},
    session::ExecutionHost,
};

/// Parser and interpreter recursion both run on this stack.
const WORKER_STACK_SIZE: usize = 16 * 1024 * 1024;

/// An execution host running on its own thread. Requests are handled one at a
/// time in the order they were posted.
pub struct Worker {
    requests: Option<Sender<ExecuteRequest>>,
    responses: Receiver<Response>,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    pub fn spawn(host: ExecutionHost) -> Result<Self> {
        let (request_tx, request_rx) = mpsc::channel::<ExecuteRequest>();
        let (response_tx, response_rx) = mpsc::channel::<Response>();
        let handle = thread::Builder::new()
            .name("cellscript-worker".into())
            .stack_size(WORKER_STACK_SIZE)
            .spawn(move || {
                info!("worker started");
                for request in request_rx {
                    debug!(cell = %request.cell_id, "worker picked up request");
                    if response_tx.send(host.execute(request)).is_err() {
                        break;
                    }
                }
                info!("worker stopped");
            })?;
        Ok(Self {
            requests: Some(request_tx),
            responses: response_rx,
            handle: Some(handle),
        })
    }

    pub fn post(&self, request: ExecuteRequest) -> Result<()> {
        let sender = self.requests.as_ref().ok_or(CellError::WorkerClosed)?;
        sender.send(request).map_err(|_| CellError::WorkerClosed)
    }

    /// Blocks until the next response arrives.
    pub fn recv(&self) -> Result<Response> {
        self.responses.recv().map_err(|_| CellError::WorkerClosed)
    }

    pub fn execute(&self, request: ExecuteRequest) -> Result<Response> {
        self.post(request)?;
        self.recv()
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.requests.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
