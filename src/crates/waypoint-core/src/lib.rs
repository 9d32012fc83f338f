//! # waypoint-core
//!
//! Interruptible, checkpointed workflow graphs for human-in-the-loop agents.
//!
//! ## Overview
//!
//! - **Graph engine** ([`StateGraph`], [`CompiledGraph`]): named async nodes,
//!   direct and conditional edges, a checkpoint after every step, and
//!   suspension until a human answers
//! - **State** ([`State`], [`Update`], [`StateSchema`]): a message list plus
//!   free-form fields merged through per-field reducers
//! - **Memory store** ([`Store`], [`InMemoryStore`]): namespaced JSON items
//!   with prefix search and per-key serialized writes
//! - **Models** ([`ChatModel`], [`invoke_with_retry`]): a provider-agnostic
//!   contract with retries and an explicit "no answer" fallback
//! - **Extraction** ([`Extractor`], [`apply_ops`]): model-proposed record
//!   creation and patching against a schema
//! - **Review** ([`ReviewMediator`]): accept, edit, ignore or answer each
//!   proposed tool call before it runs, and learn preferences from the
//!   decisions
//!
//! ## Threads
//!
//! Every conversation is a thread with its own checkpoint history. Calls on
//! one thread are serialized; different threads run concurrently.
//!
//! ```text
//! run(thread, input) ──► Completed(state)
//!                    └─► Interrupted{requests} ── resume(thread, responses) ──► ...
//! ```

pub mod compiled;
pub mod error;
pub mod extract;
pub mod graph;
pub mod interrupt;
pub mod llm;
pub mod memory;
pub mod messages;
pub mod node_result;
pub mod retry;
pub mod review;
pub mod runtime;
pub mod state;
pub mod store;
pub mod testing;

pub use compiled::{CompiledGraph, RunOutcome, ThreadSnapshot, DEFAULT_RECURSION_LIMIT};
pub use error::{GraphError, Result};
pub use extract::{apply_ops, apply_proposed, ApplyReport, Extractor, OpOutcome, ProposedOp, RecordOp, RecordSchema};
pub use graph::{Edge, NodeId, StateGraph, END, START};
pub use interrupt::{ActionRequest, HumanResponse, InterruptRequest, ResponseModes};
pub use llm::{ChatModel, ChatRequest, ChatResponse, ModelError, OutputSchema, ToolChoice, ToolDefinition};
pub use memory::{get_memory, PreferenceUpdate, PreferenceUpdater, UserPreferences, PREFERENCES_KEY};
pub use messages::{Message, Role, ToolCall};
pub use node_result::StepResult;
pub use retry::{invoke_with_retry, with_retry, RetryPolicy};
pub use review::{
    ActionError, ActionExecutor, Decision, DecisionEffect, PreferenceSignal, ReviewHandler,
    ReviewMediator, ReviewPolicy, ReviewState, ReviewableAction,
};
pub use runtime::{NodeContext, RunConfig, Runtime};
pub use state::{Reducer, State, StateSchema, Update};
pub use store::{Item, InMemoryStore, Namespace, Store, StoreError};

pub use waypoint_checkpoint::{
    CheckpointSaver, FileCheckpointSaver, InMemoryCheckpointSaver,
};
