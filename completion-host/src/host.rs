//! Simulated asynchronous host
//!
//! Plays the part of a client library with an async API such as
//! `query_async(conn, sql, fp, param)`: it knows only the stored trampoline and
//! an opaque `param`, and fires `fp(param, result, code)` later from one of its
//! own worker threads. The user callbacks behind `param` are built here too, in
//! the role of the code that starts each operation.

use crate::config::OperationConfig;
use crate::loader::HostCallback;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use completion_trampoline::{CallbackContext, OpaqueRef, StatusCode};
use serde::Serialize;
use std::pin::Pin;
use std::ptr;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

/// Result object the host hands out behind the result pointer
///
/// Owned by the host and valid only while the completion runs.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct QueryResult {
    pub value: i64,
}

/// One invocation of a user callback, as seen by that callback
#[derive(Debug, Clone, Serialize)]
pub struct Invocation {
    pub operation: String,
    pub code: StatusCode,
    pub result: Option<i64>,
    pub thread: String,
    pub completed_at: DateTime<Utc>,
}

/// Outcome of one configured operation
#[derive(Debug, Clone, Serialize)]
pub struct OperationOutcome {
    pub name: String,
    /// Completions the host fired for this operation
    pub delivered: u32,
    /// Times the user callback actually ran
    pub invoked: usize,
    /// Whether the context reports its callback as taken
    pub consumed: bool,
    pub invocations: Vec<Invocation>,
}

impl OperationOutcome {
    /// Deliveries the trampoline refused to forward
    pub fn rejected(&self) -> usize {
        (self.delivered as usize).saturating_sub(self.invoked)
    }
}

/// Host with its own completion thread pool
pub struct SimulatedHost {
    pool: rayon::ThreadPool,
    callback: HostCallback,
}

impl SimulatedHost {
    pub fn new(workers: usize, callback: HostCallback) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("host-worker-{}", i))
            .build()
            .context("Failed to start host worker pool")?;

        log::info!(
            "Simulated host started: {} workers, trampoline {} at {:?}",
            workers,
            callback.source(),
            callback.handle()
        );

        Ok(Self { pool, callback })
    }

    pub fn callback(&self) -> &HostCallback {
        &self.callback
    }

    /// Start every operation, fire its completions, and wait for all of them
    pub fn run(&self, operations: &[OperationConfig]) -> Vec<OperationOutcome> {
        let (tx, rx) = mpsc::channel();

        // Initiator side: one context per operation, alive until every
        // delivery for it has returned
        let contexts: Vec<Pin<Box<CallbackContext>>> = operations
            .iter()
            .map(|op| recording_context(&op.name, tx.clone()))
            .collect();
        drop(tx);

        let trampoline = self.callback.handle();
        self.pool.scope(|scope| {
            for (op, context) in operations.iter().zip(&contexts) {
                let param = context.as_ref().as_param() as usize;
                for attempt in 1..=op.repeat {
                    scope.spawn(move |_| {
                        if op.delay_ms > 0 {
                            thread::sleep(Duration::from_millis(op.delay_ms));
                        }

                        let mut result = op.result.map(|value| QueryResult { value });
                        let result_ptr = result
                            .as_mut()
                            .map_or(ptr::null_mut(), |r| r as *mut QueryResult as OpaqueRef);

                        log::debug!(
                            "Delivering completion for '{}' (attempt {}/{}, code {})",
                            op.name,
                            attempt,
                            op.repeat,
                            op.code
                        );
                        // SAFETY: `param` is a live checked context owned by
                        // `contexts`, which outlives this scope; `result_ptr` is
                        // null or points at `result` on this stack frame.
                        unsafe { trampoline.invoke(param as OpaqueRef, result_ptr, op.code) };
                    });
                }
            }
        });

        // The scope has joined, so every send has happened
        let invocations: Vec<Invocation> = rx.try_iter().collect();

        operations
            .iter()
            .zip(&contexts)
            .map(|(op, context)| {
                let mine: Vec<Invocation> = invocations
                    .iter()
                    .filter(|inv| inv.operation == op.name)
                    .cloned()
                    .collect();
                let outcome = OperationOutcome {
                    name: op.name.clone(),
                    delivered: op.repeat,
                    invoked: mine.len(),
                    consumed: context.is_consumed(),
                    invocations: mine,
                };
                if outcome.rejected() > 0 {
                    log::warn!(
                        "Operation '{}': {} of {} completions rejected",
                        op.name,
                        outcome.rejected(),
                        op.repeat
                    );
                }
                outcome
            })
            .collect()
    }
}

/// User callback for one operation: reads the host's result and reports back
fn recording_context(name: &str, tx: mpsc::Sender<Invocation>) -> Pin<Box<CallbackContext>> {
    let operation = name.to_string();
    CallbackContext::new(move |result: OpaqueRef, code: StatusCode| {
        // SAFETY: this host only ever delivers null or a live `QueryResult`.
        let value = unsafe { (result as *const QueryResult).as_ref() }.map(|r| r.value);
        let invocation = Invocation {
            operation,
            code,
            result: value,
            thread: thread::current().name().unwrap_or("unnamed").to_string(),
            completed_at: Utc::now(),
        };
        if tx.send(invocation).is_err() {
            log::warn!("Completion arrived after the host stopped listening");
        }
    })
}
