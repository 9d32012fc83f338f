//! Graph construction
//!
//! [`StateGraph`] is the builder for workflow graphs: named async nodes,
//! direct and conditional edges, and a [`StateSchema`] describing how node
//! updates merge into the shared state.
//!
//! ```text
//!   START ──► triage ──(router)──┬─ "respond" ──► draft ──► END
//!                                ├─ "notify"  ──► review ──► draft
//!                                └─ "ignore"  ──► END
//! ```
//!
//! A node may also pick its successor itself by returning
//! [`StepResult::goto`]; such nodes declare the targets they may jump to
//! with [`StateGraph::add_node_with_destinations`] so `compile` can check
//! them. At run time a `goto` wins over the node's edge.
//!
//! # Validation
//!
//! [`StateGraph::compile`] rejects graphs where:
//!
//! - no entry point is set, or it names an unknown node
//! - an edge or branch points at an unknown node
//! - a declared destination is unknown
//! - a node has no outgoing edge and no declared destinations
//! - a node is added twice, or uses a reserved name
//!
//! Routing problems that only show up at run time (a router returning an
//! unmapped label, a `goto` to an unknown node) fail the run with
//! [`GraphError::Configuration`].
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use waypoint_core::{
//!     InMemoryCheckpointSaver, Message, Runtime, State, StateGraph, StepResult, Update, END, START,
//! };
//!
//! # fn main() -> waypoint_core::Result<()> {
//! let mut graph = StateGraph::new();
//! graph
//!     .add_node("greet", |_state: State, _ctx| async move {
//!         Ok(StepResult::update(Update::from(Message::assistant("hello"))))
//!     })
//!     .add_edge(START, "greet")
//!     .add_edge("greet", END);
//!
//! let compiled = graph.compile(Runtime::default(), Arc::new(InMemoryCheckpointSaver::new()))?;
//! # let _ = compiled;
//! # Ok(())
//! # }
//! ```

use crate::compiled::CompiledGraph;
use crate::error::{GraphError, Result};
use crate::node_result::StepResult;
use crate::runtime::{NodeContext, Runtime};
use crate::state::{State, StateSchema};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use waypoint_checkpoint::CheckpointSaver;

/// Node identifier
pub type NodeId = String;

/// Virtual node a graph starts from
pub const START: &str = "__start__";

/// Virtual node that completes a run
pub const END: &str = "__end__";

/// Boxed future returned by a node
pub type NodeFuture = Pin<Box<dyn Future<Output = Result<StepResult>> + Send>>;

/// Type-erased node function
pub type NodeExecutor = Arc<dyn Fn(State, NodeContext) -> NodeFuture + Send + Sync>;

/// Router of a conditional edge: inspects the merged state, returns a label
pub type RouterFn = Arc<dyn Fn(&State) -> Result<String> + Send + Sync>;

/// Outgoing control flow of a node
#[derive(Clone)]
pub enum Edge {
    /// Always continue at this node
    Direct(NodeId),

    /// Continue at `branches[router(state)]`
    Conditional {
        router: RouterFn,
        branches: HashMap<String, NodeId>,
    },
}

impl std::fmt::Debug for Edge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Edge::Direct(to) => f.debug_tuple("Direct").field(to).finish(),
            Edge::Conditional { branches, .. } => f
                .debug_struct("Conditional")
                .field("branches", branches)
                .finish_non_exhaustive(),
        }
    }
}

#[derive(Clone)]
pub(crate) struct NodeSpec {
    pub(crate) executor: NodeExecutor,
    pub(crate) destinations: Vec<NodeId>,
}

/// Validated, immutable graph shared by a [`CompiledGraph`]
pub(crate) struct GraphDefinition {
    pub(crate) nodes: HashMap<NodeId, NodeSpec>,
    pub(crate) edges: HashMap<NodeId, Edge>,
    pub(crate) entry: NodeId,
    pub(crate) schema: StateSchema,
}

impl GraphDefinition {
    /// Where to go after `node` returned `goto`, given the merged state
    pub(crate) fn next_node(&self, node: &str, state: &State, goto: Option<String>) -> Result<NodeId> {
        if let Some(target) = goto {
            if target == END || self.nodes.contains_key(&target) {
                return Ok(target);
            }
            return Err(GraphError::Configuration(format!(
                "node '{node}' jumped to unknown node '{target}'"
            )));
        }

        match self.edges.get(node) {
            Some(Edge::Direct(to)) => Ok(to.clone()),
            Some(Edge::Conditional { router, branches }) => {
                let label = router(state)?;
                branches.get(&label).cloned().ok_or_else(|| {
                    GraphError::Configuration(format!(
                        "router of node '{node}' returned unknown route '{label}'"
                    ))
                })
            }
            None => Err(GraphError::Configuration(format!(
                "node '{node}' has no route to continue"
            ))),
        }
    }
}

/// Builder for workflow graphs
#[derive(Default)]
pub struct StateGraph {
    nodes: HashMap<NodeId, NodeSpec>,
    edges: HashMap<NodeId, Edge>,
    entry: Option<NodeId>,
    schema: StateSchema,
    errors: Vec<String>,
}

impl StateGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_schema(schema: StateSchema) -> Self {
        Self {
            schema,
            ..Self::default()
        }
    }

    /// Add a node that follows its outgoing edge
    pub fn add_node<F, Fut>(&mut self, name: impl Into<String>, node: F) -> &mut Self
    where
        F: Fn(State, NodeContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<StepResult>> + Send + 'static,
    {
        self.insert_node(name.into(), Vec::new(), node)
    }

    /// Add a node that may route itself with `goto` to one of `destinations`
    pub fn add_node_with_destinations<F, Fut, I, S>(
        &mut self,
        name: impl Into<String>,
        destinations: I,
        node: F,
    ) -> &mut Self
    where
        F: Fn(State, NodeContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<StepResult>> + Send + 'static,
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let destinations = destinations.into_iter().map(Into::into).collect();
        self.insert_node(name.into(), destinations, node)
    }

    fn insert_node<F, Fut>(&mut self, name: String, destinations: Vec<NodeId>, node: F) -> &mut Self
    where
        F: Fn(State, NodeContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<StepResult>> + Send + 'static,
    {
        if name == START || name == END || name.is_empty() {
            self.errors.push(format!("'{name}' is not a valid node name"));
            return self;
        }
        if self.nodes.contains_key(&name) {
            self.errors.push(format!("node '{name}' added twice"));
            return self;
        }

        let executor: NodeExecutor = Arc::new(move |state, ctx| Box::pin(node(state, ctx)));
        self.nodes.insert(
            name,
            NodeSpec {
                executor,
                destinations,
            },
        );
        self
    }

    /// Add an unconditional edge; an edge from [`START`] sets the entry point
    pub fn add_edge(&mut self, from: impl Into<String>, to: impl Into<String>) -> &mut Self {
        let (from, to) = (from.into(), to.into());
        if from == START {
            self.set_entry_point(to);
        } else {
            self.insert_edge(from, Edge::Direct(to));
        }
        self
    }

    pub fn set_entry_point(&mut self, node: impl Into<String>) -> &mut Self {
        let node = node.into();
        if let Some(existing) = &self.entry {
            self.errors
                .push(format!("entry point set twice ('{existing}' and '{node}')"));
        }
        self.entry = Some(node);
        self
    }

    /// Add a conditional edge mapping router labels to target nodes
    pub fn add_conditional_edges<R, I, L, T>(
        &mut self,
        from: impl Into<String>,
        router: R,
        branches: I,
    ) -> &mut Self
    where
        R: Fn(&State) -> Result<String> + Send + Sync + 'static,
        I: IntoIterator<Item = (L, T)>,
        L: Into<String>,
        T: Into<String>,
    {
        let branches = branches
            .into_iter()
            .map(|(label, target)| (label.into(), target.into()))
            .collect();
        self.insert_edge(
            from.into(),
            Edge::Conditional {
                router: Arc::new(router),
                branches,
            },
        );
        self
    }

    fn insert_edge(&mut self, from: NodeId, edge: Edge) {
        if self.edges.contains_key(&from) {
            self.errors
                .push(format!("node '{from}' already has an outgoing edge"));
            return;
        }
        self.edges.insert(from, edge);
    }

    fn is_target(&self, node: &str) -> bool {
        node == END || self.nodes.contains_key(node)
    }

    /// Check the structure without compiling
    pub fn validate(&self) -> Result<()> {
        if let Some(error) = self.errors.first() {
            return Err(GraphError::Validation(error.clone()));
        }

        let entry = self
            .entry
            .as_ref()
            .ok_or_else(|| GraphError::Validation("no entry point; add an edge from START".into()))?;
        if !self.nodes.contains_key(entry) {
            return Err(GraphError::Validation(format!(
                "entry point '{entry}' does not exist"
            )));
        }

        for (from, edge) in &self.edges {
            if !self.nodes.contains_key(from) {
                return Err(GraphError::Validation(format!(
                    "edge source '{from}' does not exist"
                )));
            }
            match edge {
                Edge::Direct(to) if !self.is_target(to) => {
                    return Err(GraphError::Validation(format!(
                        "edge target '{to}' does not exist"
                    )));
                }
                Edge::Conditional { branches, .. } => {
                    if branches.is_empty() {
                        return Err(GraphError::Validation(format!(
                            "conditional edge of '{from}' has no branches"
                        )));
                    }
                    if let Some(to) = branches.values().find(|to| !self.is_target(to)) {
                        return Err(GraphError::Validation(format!(
                            "branch target '{to}' of '{from}' does not exist"
                        )));
                    }
                }
                Edge::Direct(_) => {}
            }
        }

        for (name, spec) in &self.nodes {
            if let Some(to) = spec.destinations.iter().find(|to| !self.is_target(to)) {
                return Err(GraphError::Validation(format!(
                    "destination '{to}' of '{name}' does not exist"
                )));
            }
            if spec.destinations.is_empty() && !self.edges.contains_key(name) {
                return Err(GraphError::Validation(format!(
                    "node '{name}' has no outgoing edge"
                )));
            }
        }

        Ok(())
    }

    /// Validate and freeze the graph
    pub fn compile(
        self,
        runtime: Runtime,
        checkpointer: Arc<dyn CheckpointSaver>,
    ) -> Result<CompiledGraph> {
        self.validate()?;
        let entry = self
            .entry
            .ok_or_else(|| GraphError::Validation("no entry point".into()))?;

        let definition = GraphDefinition {
            nodes: self.nodes,
            edges: self.edges,
            entry,
            schema: self.schema,
        };
        Ok(CompiledGraph::new(definition, runtime, checkpointer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Update;

    fn noop(_state: State, _ctx: NodeContext) -> NodeFuture {
        Box::pin(async { Ok(StepResult::update(Update::new())) })
    }

    #[test]
    fn test_valid_graph() {
        let mut graph = StateGraph::new();
        graph
            .add_node("a", noop)
            .add_node("b", noop)
            .add_edge(START, "a")
            .add_conditional_edges("a", |_: &State| Ok("next".to_string()), [("next", "b"), ("stop", END)])
            .add_edge("b", END);
        assert!(graph.validate().is_ok());
    }

    #[test]
    fn test_missing_entry() {
        let mut graph = StateGraph::new();
        graph.add_node("a", noop).add_edge("a", END);
        assert!(matches!(graph.validate(), Err(GraphError::Validation(_))));
    }

    #[test]
    fn test_unknown_edge_target() {
        let mut graph = StateGraph::new();
        graph.add_node("a", noop).add_edge(START, "a").add_edge("a", "ghost");
        let err = graph.validate().unwrap_err();
        assert!(err.to_string().contains("ghost"));
    }

    #[test]
    fn test_unknown_branch_target() {
        let mut graph = StateGraph::new();
        graph
            .add_node("a", noop)
            .add_edge(START, "a")
            .add_conditional_edges("a", |_: &State| Ok("x".to_string()), [("x", "nowhere")]);
        assert!(graph.validate().is_err());
    }

    #[test]
    fn test_dead_end_node() {
        let mut graph = StateGraph::new();
        graph.add_node("a", noop).add_node("b", noop).add_edge(START, "a").add_edge("a", "b");
        let err = graph.validate().unwrap_err();
        assert!(err.to_string().contains("'b' has no outgoing edge"));
    }

    #[test]
    fn test_destinations_satisfy_routing() {
        let mut graph = StateGraph::new();
        graph
            .add_node_with_destinations("a", ["b", END], noop)
            .add_node("b", noop)
            .add_edge(START, "a")
            .add_edge("b", END);
        assert!(graph.validate().is_ok());

        let mut bad = StateGraph::new();
        bad.add_node_with_destinations("a", ["missing"], noop).add_edge(START, "a");
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_duplicate_and_reserved_names() {
        let mut graph = StateGraph::new();
        graph.add_node("a", noop).add_node("a", noop).add_edge(START, "a").add_edge("a", END);
        assert!(graph.validate().unwrap_err().to_string().contains("added twice"));

        let mut reserved = StateGraph::new();
        reserved.add_node(END, noop);
        assert!(reserved.validate().is_err());
    }

    #[test]
    fn test_second_outgoing_edge_rejected() {
        let mut graph = StateGraph::new();
        graph
            .add_node("a", noop)
            .add_edge(START, "a")
            .add_edge("a", END)
            .add_edge("a", END);
        assert!(graph.validate().is_err());
    }
}
