use super::CompiledGraph;
use crate::error::{GraphError, Result};
use crate::graph::{NodeId, END};
use crate::interrupt::{HumanResponse, InterruptRequest};
use crate::node_result::StepResult;
use crate::runtime::{NodeContext, ResponseQueue, RunConfig};
use crate::state::{State, Update};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use waypoint_checkpoint::{Checkpoint, CheckpointMetadata, CheckpointSource, Cursor};

/// Metadata key holding the run configuration
pub(crate) const RUN_CONFIG_KEY: &str = "run_config";

/// How a `run` or `resume` call ended
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// The thread reached the end node
    Completed(State),

    /// The thread is suspended until `resume` is called with one response per request
    Interrupted {
        thread_id: String,
        interrupts: Vec<InterruptRequest>,
    },
}

impl RunOutcome {
    pub fn is_interrupted(&self) -> bool {
        matches!(self, RunOutcome::Interrupted { .. })
    }

    pub fn interrupts(&self) -> &[InterruptRequest] {
        match self {
            RunOutcome::Interrupted { interrupts, .. } => interrupts,
            RunOutcome::Completed(_) => &[],
        }
    }

    pub fn state(&self) -> Option<&State> {
        match self {
            RunOutcome::Completed(state) => Some(state),
            RunOutcome::Interrupted { .. } => None,
        }
    }

    pub fn into_state(self) -> Option<State> {
        match self {
            RunOutcome::Completed(state) => Some(state),
            RunOutcome::Interrupted { .. } => None,
        }
    }
}

pub(crate) fn decode_pending(pending: &[Value]) -> Result<Vec<InterruptRequest>> {
    pending
        .iter()
        .map(|value| Ok(serde_json::from_value(value.clone())?))
        .collect()
}

pub(crate) fn stored_config(metadata: &CheckpointMetadata) -> Result<RunConfig> {
    match metadata.extra.get(RUN_CONFIG_KEY) {
        Some(value) => Ok(serde_json::from_value(value.clone())?),
        None => Ok(RunConfig::default()),
    }
}

fn check_thread_id(thread_id: &str) -> Result<()> {
    if thread_id.trim().is_empty() {
        return Err(GraphError::InvalidInput("thread_id must not be empty".into()));
    }
    Ok(())
}

impl CompiledGraph {
    /// Start or continue a thread with `input`
    pub async fn run(&self, thread_id: &str, input: Update) -> Result<RunOutcome> {
        self.run_with_config(thread_id, input, RunConfig::default())
            .await
    }

    /// Like [`run`](Self::run), with per-run configuration
    ///
    /// An empty `config` reuses the configuration stored with the thread.
    #[tracing::instrument(skip(self, thread_id, input, config), fields(thread_id = %thread_id))]
    pub async fn run_with_config(
        &self,
        thread_id: &str,
        input: Update,
        config: RunConfig,
    ) -> Result<RunOutcome> {
        check_thread_id(thread_id)?;
        let _guard = self.locks.acquire(thread_id).await;

        let latest = self.checkpointer.get_latest(thread_id).await?;

        let (mut state, start, step, config) = match latest {
            Some(checkpoint) if checkpoint.cursor.is_suspended() => {
                if !input.is_empty() {
                    warn!("Thread is suspended; input ignored until it is resumed");
                }
                return Ok(RunOutcome::Interrupted {
                    thread_id: thread_id.to_string(),
                    interrupts: decode_pending(&checkpoint.cursor.pending)?,
                });
            }
            Some(checkpoint) => {
                let previous = stored_config(&checkpoint.metadata)?;
                let start = checkpoint
                    .cursor
                    .next
                    .clone()
                    .unwrap_or_else(|| self.graph.entry.clone());
                debug!(start = %start, "Continuing existing thread");
                (
                    State::from_value(checkpoint.state)?,
                    start,
                    checkpoint.metadata.step,
                    if config.is_empty() { previous } else { config },
                )
            }
            None => (State::new(), self.graph.entry.clone(), 0, config),
        };

        info!(start = %start, "Starting run");
        self.graph.schema.apply(&mut state, input)?;
        self.persist(
            thread_id,
            &state,
            Cursor::at(&start),
            CheckpointSource::Input,
            step,
            None,
            &config,
        )
        .await?;

        self.execute(thread_id, state, start, step, config, Vec::new())
            .await
    }

    /// Deliver decisions for a suspended thread and continue it
    #[tracing::instrument(skip(self, thread_id, responses), fields(thread_id = %thread_id, responses = responses.len()))]
    pub async fn resume(&self, thread_id: &str, responses: Vec<HumanResponse>) -> Result<RunOutcome> {
        check_thread_id(thread_id)?;
        let _guard = self.locks.acquire(thread_id).await;

        let nothing = || GraphError::NothingToResume {
            thread_id: thread_id.to_string(),
        };
        let checkpoint = self
            .checkpointer
            .get_latest(thread_id)
            .await?
            .ok_or_else(nothing)?;
        if !checkpoint.cursor.is_suspended() {
            return Err(nothing());
        }
        let node = checkpoint.cursor.next.clone().ok_or_else(nothing)?;

        let pending = decode_pending(&checkpoint.cursor.pending)?;
        if pending.len() != responses.len() {
            return Err(GraphError::ResponseCountMismatch {
                thread_id: thread_id.to_string(),
                expected: pending.len(),
                actual: responses.len(),
            });
        }
        for (request, response) in pending.iter().zip(&responses) {
            if !request.config.permits(response) {
                return Err(GraphError::ResponseNotPermitted {
                    action: request.action_request.action.clone(),
                    response: response.kind().to_string(),
                });
            }
        }

        let config = stored_config(&checkpoint.metadata)?;
        let step = checkpoint.metadata.step;
        let state = State::from_value(checkpoint.state)?;

        info!(node = %node, "Resuming suspended node");
        self.persist(
            thread_id,
            &state,
            Cursor::at(&node),
            CheckpointSource::Resume,
            step,
            Some(&node),
            &config,
        )
        .await?;

        self.execute(thread_id, state, node, step, config, responses)
            .await
    }

    async fn execute(
        &self,
        thread_id: &str,
        mut state: State,
        mut node: NodeId,
        mut step: u64,
        config: RunConfig,
        responses: Vec<HumanResponse>,
    ) -> Result<RunOutcome> {
        let mut responses: VecDeque<HumanResponse> = responses.into();
        let mut executed = 0usize;

        loop {
            if node == END {
                self.persist(
                    thread_id,
                    &state,
                    Cursor::completed(),
                    CheckpointSource::Loop,
                    step,
                    None,
                    &config,
                )
                .await?;
                info!(step, messages = state.messages.len(), "Run completed");
                return Ok(RunOutcome::Completed(state));
            }

            if executed >= self.recursion_limit {
                error!(limit = self.recursion_limit, node = %node, "Recursion limit reached");
                return Err(GraphError::RecursionLimit {
                    limit: self.recursion_limit,
                });
            }

            let spec = self.graph.nodes.get(&node).cloned().ok_or_else(|| {
                GraphError::Configuration(format!("unknown node '{node}'"))
            })?;

            let queue: ResponseQueue = Arc::new(Mutex::new(std::mem::take(&mut responses)));
            let ctx = NodeContext::new(
                thread_id,
                node.clone(),
                step,
                self.runtime.clone(),
                config.clone(),
                queue.clone(),
            );

            debug!(node = %node, step, "Executing node");
            let result = (spec.executor)(state.clone(), ctx).await.map_err(|err| {
                error!(node = %node, step, error = %err, "Node failed");
                err
            })?;
            executed += 1;
            step += 1;

            let leftover = queue.lock().len();
            if leftover > 0 {
                warn!(node = %node, leftover, "Discarding responses the node did not consume");
            }

            match result {
                StepResult::Suspend { update, requests } => {
                    if requests.is_empty() {
                        return Err(GraphError::Configuration(format!(
                            "node '{node}' suspended without interrupt requests"
                        )));
                    }
                    self.graph.schema.apply(&mut state, update)?;
                    let pending = requests
                        .iter()
                        .map(serde_json::to_value)
                        .collect::<std::result::Result<Vec<_>, _>>()?;
                    self.persist(
                        thread_id,
                        &state,
                        Cursor::suspended(&node, pending),
                        CheckpointSource::Interrupt,
                        step,
                        Some(&node),
                        &config,
                    )
                    .await?;

                    info!(node = %node, interrupts = requests.len(), "Run suspended");
                    return Ok(RunOutcome::Interrupted {
                        thread_id: thread_id.to_string(),
                        interrupts: requests,
                    });
                }
                StepResult::Continue { update, goto } => {
                    self.graph.schema.apply(&mut state, update)?;
                    let next = self.graph.next_node(&node, &state, goto)?;
                    debug!(from = %node, to = %next, "Routing");
                    if next != END {
                        self.persist(
                            thread_id,
                            &state,
                            Cursor::at(&next),
                            CheckpointSource::Loop,
                            step,
                            Some(&node),
                            &config,
                        )
                        .await?;
                    }
                    node = next;
                }
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn persist(
        &self,
        thread_id: &str,
        state: &State,
        cursor: Cursor,
        source: CheckpointSource,
        step: u64,
        node: Option<&str>,
        config: &RunConfig,
    ) -> Result<()> {
        let mut metadata = CheckpointMetadata::new().with_source(source).with_step(step);
        if let Some(node) = node {
            metadata = metadata.with_node(node);
        }
        if !config.is_empty() {
            metadata = metadata.with_extra(RUN_CONFIG_KEY, serde_json::to_value(config)?);
        }

        let checkpoint = Checkpoint::new(thread_id, state.to_value()?, cursor).with_metadata(metadata);
        self.checkpointer.put(checkpoint).await?;
        Ok(())
    }
}
