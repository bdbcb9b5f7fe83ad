//! Task Dispatcher (C10, spec §4.10): thin wrapper exposing `compile`, `run`,
//! `run_test`, coordinating C3–C8 with cancellation-safe cleanup.
//!
//! Grounded on the teacher's `ExecutorConfig`/retry-driven task wrapper
//! (`executor/config.rs`, `executor/retry.rs`): configuration carried
//! alongside the worker, `Retry`-style values instead of raised exceptions
//! for "try again later", and an idempotent cleanup guard around the hot
//! path.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use uuid::Uuid;

use flow_core::{AdapterRegistry, ExecutionContext, ExecutionControl};
use flow_events::{admission_backoff, EventStream, SlotManager, Terminator};
use flow_exec::{ExecError, Executor, ExecutionResult, Result as ExecResult};
use flow_graph::{compile, load, Graph, GraphError, GraphRequest, NodeRegistry};

use crate::config::AdmissionConfig;

/// Result of a compile-only request (spec §4.10 "returns compile status").
#[derive(Debug, Clone, Serialize)]
pub struct CompileStatus {
    pub success: bool,
    pub total_nodes: usize,
    pub total_layers: usize,
    pub error: Option<String>,
}

/// Whether a test case is eligible to run; an external collaborator (the
/// persistence layer is out of scope) that `dispatch_run_test` consults
/// before spending an admission slot on cancelled work.
pub trait CaseStatusLookup: Send + Sync {
    fn is_cancelled(&self, case_id: &str) -> bool;
}

/// Dev/test stand-in: nothing is ever cancelled.
#[derive(Debug, Default, Clone, Copy)]
pub struct NeverCancelled;

impl CaseStatusLookup for NeverCancelled {
    fn is_cancelled(&self, _case_id: &str) -> bool {
        false
    }
}

/// Outcome of an admission-gated dispatch attempt (spec §4.10 step 3).
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    /// The case was already cancelled; no slot was touched.
    SkippedCancelled,
    /// No slot was available; the caller should re-queue after `after`.
    Requeued { after: Duration },
    /// A slot was acquired; the caller should submit `run_flow_test`.
    Dispatched { task_id: String },
}

pub struct TaskDispatcher {
    registry: Arc<NodeRegistry>,
    adapters: Arc<AdapterRegistry>,
    events: EventStream,
    slots: SlotManager,
    admission: AdmissionConfig,
    workers: usize,
    case_status: Arc<dyn CaseStatusLookup>,
}

impl TaskDispatcher {
    pub fn new(registry: Arc<NodeRegistry>, adapters: Arc<AdapterRegistry>, workers: usize, admission: AdmissionConfig) -> Self {
        Self {
            registry,
            adapters,
            events: EventStream::new(),
            slots: SlotManager::new(admission.max_per_user),
            admission,
            workers,
            case_status: Arc::new(NeverCancelled),
        }
    }

    pub fn with_case_status_lookup(mut self, lookup: Arc<dyn CaseStatusLookup>) -> Self {
        self.case_status = lookup;
        self
    }

    pub fn events(&self) -> &EventStream {
        &self.events
    }

    pub fn slots(&self) -> &SlotManager {
        &self.slots
    }

    fn compile_graph(&self, request: GraphRequest) -> Result<(Graph, flow_graph::ExecutionPlan), GraphError> {
        let mut graph = load(&self.registry, &self.adapters, request)?;
        let plan = compile(&mut graph, true)?;
        Ok((graph, plan))
    }

    /// `compile_flow(flow_id, request)` (spec §4.10): runs C3 + C4, returns
    /// compile status rather than propagating the error, since a failed
    /// compile is a normal (non-fatal-to-the-process) outcome for callers.
    pub fn compile_flow(&self, _flow_id: &str, request: GraphRequest) -> Result<CompileStatus, GraphError> {
        match self.compile_graph(request) {
            Ok((graph, plan)) => Ok(CompileStatus {
                success: true,
                total_nodes: graph.node_count(),
                total_layers: plan.layers.len(),
                error: None,
            }),
            Err(err) => Ok(CompileStatus { success: false, total_nodes: 0, total_layers: 0, error: Some(err.to_string()) }),
        }
    }

    /// `run_flow(user_id, flow_id, request, enable_debug)` (spec §4.10):
    /// compiles and runs with strategy FULL, returning the aggregated result.
    pub async fn run_flow(
        &self,
        user_id: &str,
        flow_id: &str,
        request: GraphRequest,
        _enable_debug: bool,
    ) -> ExecResult<ExecutionResult> {
        let (mut graph, plan) = self.compile_graph(request)?;
        let run_id = Uuid::new_v4().to_string();
        let task_id = Uuid::new_v4().to_string();
        let ctx = ExecutionContext::new(run_id, flow_id).with_user_id(user_id);
        let control = ExecutionControl::full();

        let executor = Executor::new(self.registry.clone(), self.adapters.clone(), self.events.clone(), self.workers);
        executor.run(&mut graph, &plan, &ctx, &control, &task_id).await
    }

    /// `dispatch_run_test(generated_task_id, user_id, flow_id, case_id)`
    /// (spec §4.10): admission-gated entry point. Does not itself submit the
    /// worker task or schedule the retry — that belongs to the outer task
    /// runner, which is out of scope here.
    pub fn dispatch_run_test(&self, generated_task_id: &str, user_id: &str, case_id: &str) -> DispatchOutcome {
        if self.case_status.is_cancelled(case_id) {
            return DispatchOutcome::SkippedCancelled;
        }
        if !self.slots.acquire(user_id) {
            let after = admission_backoff(self.admission.backoff_base(), self.admission.backoff_jitter());
            return DispatchOutcome::Requeued { after };
        }
        DispatchOutcome::Dispatched { task_id: generated_task_id.to_string() }
    }

    /// `run_flow_test` (spec §4.10): wraps the executor with a hard/soft
    /// wall-clock limit and releases the admission slot exactly once via a
    /// [`Terminator`], regardless of whether it finishes, times out, or is
    /// cancelled by the caller dropping the future.
    pub async fn run_flow_test(
        &self,
        user_id: &str,
        flow_id: &str,
        request: GraphRequest,
        hard_limit: Duration,
        soft_limit: Duration,
    ) -> ExecResult<ExecutionResult> {
        let terminator = Terminator::new(self.slots.clone(), user_id);

        let run_fut = self.run_flow(user_id, flow_id, request, false);
        tokio::pin!(run_fut);

        let outcome = tokio::select! {
            result = &mut run_fut => result,
            _ = tokio::time::sleep(soft_limit) => {
                tracing::warn!(user_id, flow_id, "run_flow_test exceeded its soft wall-clock limit, giving it a grace period to finish");
                tokio::select! {
                    result = &mut run_fut => result,
                    _ = tokio::time::sleep(hard_limit.saturating_sub(soft_limit)) => {
                        tracing::error!(user_id, flow_id, "run_flow_test exceeded its hard wall-clock limit, aborting");
                        Err(ExecError::TimedOut)
                    }
                }
            }
        };

        terminator.finish();
        outcome
    }
}
