pub mod agent_engine;
pub mod commands;
pub mod config;
pub mod errors;
pub mod executor;
pub mod llm;
pub mod perception;
pub mod planner;

#[cfg(test)]
mod test_support;

pub use agent_engine::engine::{ConfirmWith, ConfirmationHandler, Executor, ExecutorStats};
pub use agent_engine::event_bus::ProgressEvent;
pub use agent_engine::state::{
    Action, ActionKind, ActionSequence, ActionSpec, ActionStatus, ExecutionReport, SequenceStatus,
};
pub use commands::DeskPilot;
pub use config::AppConfig;
pub use errors::{DeskPilotError, DeskPilotResult};

/// Installs the global fmt subscriber. `RUST_LOG` overrides the `info` default.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .try_init();
}
