//! Compiled, executable graphs
//!
//! A [`CompiledGraph`] runs threads of a validated graph. Each thread is an
//! independent, resumable conversation identified by a caller-chosen id.
//!
//! # Execution protocol
//!
//! ```text
//!  run(thread, input)
//!     │  no checkpoint ............ fresh state + input, start at entry
//!     │  completed checkpoint ..... stored state + input, start at entry
//!     │  in-flight checkpoint ..... stored state + input, continue at cursor
//!     │  suspended checkpoint ..... return the pending interrupts untouched
//!     ▼
//!  ┌──────── loop ─────────────────────────────────────────────┐
//!  │ node(state, ctx) ─► Continue{update, goto}                │
//!  │                      merge, route, checkpoint, next node  │
//!  │                  ─► Suspend{update, requests}             │
//!  │                      merge, checkpoint with pending ──────┼─► Interrupted
//!  │ next == END ─► checkpoint completed ──────────────────────┼─► Completed
//!  └───────────────────────────────────────────────────────────┘
//!
//!  resume(thread, responses)
//!     validate against the pending requests (no mutation on failure)
//!     checkpoint with pending cleared, re-enter the suspended node
//! ```
//!
//! Steps of one thread never overlap: every entry point takes the thread's
//! async mutex for its whole duration. Different threads run concurrently.

mod execution;
mod state;

pub use execution::RunOutcome;
pub use state::ThreadSnapshot;

use crate::graph::GraphDefinition;
use crate::runtime::Runtime;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use waypoint_checkpoint::CheckpointSaver;

/// Default cap on node executions per invocation
pub const DEFAULT_RECURSION_LIMIT: usize = 25;

/// Per-thread execution locks
#[derive(Default)]
struct ThreadLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl ThreadLocks {
    async fn acquire<'a>(&'a self, thread_id: &str) -> ThreadGuard<'a> {
        let lock = self
            .locks
            .lock()
            .entry(thread_id.to_string())
            .or_default()
            .clone();
        ThreadGuard {
            locks: self,
            thread_id: thread_id.to_string(),
            _guard: lock.lock_owned().await,
        }
    }

    /// Forget a thread's lock; must be called while holding its guard
    fn release(&self, thread_id: &str) {
        let mut locks = self.locks.lock();
        // map entry + caller's guard; anyone else means a waiter still needs it
        if locks
            .get(thread_id)
            .is_some_and(|lock| Arc::strong_count(lock) <= 2)
        {
            locks.remove(thread_id);
        }
    }

    fn len(&self) -> usize {
        self.locks.lock().len()
    }
}

/// Holds a thread's lock; drops the map entry on exit unless others wait
struct ThreadGuard<'a> {
    locks: &'a ThreadLocks,
    thread_id: String,
    _guard: OwnedMutexGuard<()>,
}

impl Drop for ThreadGuard<'_> {
    fn drop(&mut self) {
        // runs before `_guard` is dropped, so the lock is still held here
        self.locks.release(&self.thread_id);
    }
}

/// An executable workflow graph
#[derive(Clone)]
pub struct CompiledGraph {
    graph: Arc<GraphDefinition>,
    runtime: Runtime,
    checkpointer: Arc<dyn CheckpointSaver>,
    locks: Arc<ThreadLocks>,
    recursion_limit: usize,
}

impl CompiledGraph {
    pub(crate) fn new(
        graph: GraphDefinition,
        runtime: Runtime,
        checkpointer: Arc<dyn CheckpointSaver>,
    ) -> Self {
        Self {
            graph: Arc::new(graph),
            runtime,
            checkpointer,
            locks: Arc::new(ThreadLocks::default()),
            recursion_limit: DEFAULT_RECURSION_LIMIT,
        }
    }

    /// Cap node executions per `run`/`resume` call
    pub fn with_recursion_limit(mut self, limit: usize) -> Self {
        self.recursion_limit = limit.max(1);
        self
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    pub fn checkpointer(&self) -> &Arc<dyn CheckpointSaver> {
        &self.checkpointer
    }

    /// Threads that currently hold or wait for an execution lock
    pub fn active_threads(&self) -> usize {
        self.locks.len()
    }

    pub fn node_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.graph.nodes.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
