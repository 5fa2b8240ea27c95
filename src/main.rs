use std::sync::Arc;

use clap::{Parser, Subcommand};

use deskpilot::config::{self, ExecutionMode};
use deskpilot::llm::provider::PlanningModel;
use deskpilot::llm::registry::{ProviderRegistry, RolePlanningModel};
use deskpilot::planner::{optimize, PlanParser};
use deskpilot::{init_tracing, DeskPilotResult};

#[derive(Parser)]
#[command(name = "deskpilot", version, about = "Plan and run desktop actions from plain-language requests")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the optimized action plan for a request as JSON.
    Plan { intent: String },
    /// Plan a request and execute it on this desktop.
    Run {
        intent: String,
        /// Skip the confirmation prompt.
        #[arg(long, short)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    init_tracing();

    if let Err(e) = run(Cli::parse()).await {
        tracing::error!(error = %e, "deskpilot failed");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> DeskPilotResult<()> {
    let mut config = config::load_config_or_default()?;
    let registry = Arc::new(ProviderRegistry::from_config(&config));

    match cli.command {
        Command::Plan { intent } => {
            let model = (!registry.is_empty())
                .then(|| Arc::new(RolePlanningModel::new(registry.clone())) as Arc<dyn PlanningModel>);
            let parser = PlanParser::from_config(model, &config);
            let seq = optimize(&parser.parse(&intent, None).await);
            println!("{}", serde_json::to_string_pretty(&seq)?);
            Ok(())
        }
        Command::Run { intent, yes } => {
            if yes {
                config.executor.mode = ExecutionMode::Auto;
            }
            run_on_desktop(&config, registry, &intent).await
        }
    }
}

#[cfg(feature = "desktop")]
async fn run_on_desktop(
    config: &deskpilot::AppConfig,
    registry: Arc<ProviderRegistry>,
    intent: &str,
) -> DeskPilotResult<()> {
    use deskpilot::executor::dispatcher::Capabilities;
    use deskpilot::{ConfirmWith, ProgressEvent};

    let caps = Capabilities::desktop(registry.clone());
    let pilot = deskpilot::DeskPilot::from_config(config, registry, caps);
    let mut seq = pilot.parse_intent(intent, None).await;

    let progress = |event: &ProgressEvent| {
        if let ProgressEvent::ActionStarted { index, total, description, .. } = event {
            eprintln!("[{}/{}] {}", index + 1, total, description);
        }
    };
    let confirm = ConfirmWith(ask_on_stdin);
    let report = pilot.execute(&mut seq, Some(&confirm), Some(&progress)).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

#[cfg(not(feature = "desktop"))]
async fn run_on_desktop(
    _config: &deskpilot::AppConfig,
    _registry: Arc<ProviderRegistry>,
    _intent: &str,
) -> DeskPilotResult<()> {
    Err(deskpilot::DeskPilotError::Config(
        "built without the `desktop` feature; rebuild with --features desktop to execute plans".into(),
    ))
}

/// Prints the plan and reads a y/N answer.
#[cfg(feature = "desktop")]
fn ask_on_stdin(seq: &deskpilot::ActionSequence) -> bool {
    use std::io::{BufRead, Write};

    eprintln!("{} ({} actions):", seq.name, seq.len());
    for (i, action) in seq.actions.iter().enumerate() {
        eprintln!("  {}. {}", i + 1, action.description);
    }
    eprint!("Run this plan? [y/N] ");
    let _ = std::io::stderr().flush();

    let mut answer = String::new();
    if std::io::stdin().lock().read_line(&mut answer).is_err() {
        return false;
    }
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}
