//! Caller-facing entry points: plan an intent, run a plan, read statistics.
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::broadcast;

use crate::agent_engine::engine::{ConfirmationHandler, Executor, ExecutorStats, ProgressFn};
use crate::agent_engine::event_bus::ProgressEvent;
use crate::agent_engine::state::{ActionSequence, ExecutionReport};
use crate::config::AppConfig;
use crate::errors::DeskPilotResult;
use crate::executor::dispatcher::Capabilities;
use crate::executor::safety::SecurityPolicy;
use crate::llm::provider::PlanningModel;
use crate::llm::registry::{ProviderRegistry, RolePlanningModel};
use crate::planner::{optimize, PlanParser};

pub struct DeskPilot {
    parser: PlanParser,
    executor: Executor,
}

impl DeskPilot {
    pub fn new(parser: PlanParser, executor: Executor) -> Self {
        Self { parser, executor }
    }

    /// Wires the planner, policy and executor from configuration. The
    /// planning model is only used when at least one provider is configured.
    pub fn from_config(config: &AppConfig, registry: Arc<ProviderRegistry>, caps: Capabilities) -> Self {
        let model: Option<Arc<dyn PlanningModel>> = if registry.is_empty() {
            tracing::info!("no LLM providers configured, planning with rules only");
            None
        } else {
            Some(Arc::new(RolePlanningModel::new(registry)))
        };
        let policy = Arc::new(SecurityPolicy::new(config.security.clone()));
        Self::new(
            PlanParser::from_config(model, config),
            Executor::new(caps, policy, config.executor.clone()),
        )
    }

    /// Plans `text` and applies the optimizer. Never fails.
    pub async fn parse_intent(&self, text: &str, context: Option<&Value>) -> ActionSequence {
        let seq = self.parser.parse(text, context).await;
        optimize(&seq)
    }

    pub async fn execute(
        &self,
        seq: &mut ActionSequence,
        confirm: Option<&dyn ConfirmationHandler>,
        progress: Option<ProgressFn<'_>>,
    ) -> DeskPilotResult<ExecutionReport> {
        self.executor.execute(seq, confirm, progress).await
    }

    pub fn get_stats(&self) -> ExecutorStats {
        self.executor.get_stats()
    }

    pub fn cancel(&self) {
        self.executor.cancel();
    }

    pub fn is_running(&self) -> bool {
        self.executor.is_running()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.executor.subscribe()
    }

    pub fn executor(&self) -> &Executor {
        &self.executor
    }
}
