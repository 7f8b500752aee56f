//! Task Engine - command line entry point.
//!
//! Lists the task catalogue, previews assembled prompts, replays scripted
//! runs through the real engine, and shows recorded executions.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use serde_json::Value;
use task_engine::capability::CapabilityRegistry;
use task_engine::engine::{assemble, seed_message, Engine};
use task_engine::llm::{Script, ScriptedModelService};
use task_engine::run::{RunEvent, RunObserver, RunSummary, Step, StepKind, SubAction, TracingObserver};
use task_engine::store::open_store;
use task_engine::task::{ExecutionContext, InputMap, TaskCatalogue, TaskDefinition};
use task_engine::EngineConfig;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

/// Run catalogue tasks through the task engine.
#[derive(Parser, Debug)]
#[command(name = "task-engine")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Task catalogue directory (overrides TASK_ENGINE_TASKS_DIR)
    #[arg(long, global = true)]
    tasks_dir: Option<PathBuf>,

    /// SQLite file for execution records (overrides TASK_ENGINE_DATABASE)
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    /// Fail runs that declare unknown capabilities
    #[arg(long, global = true)]
    strict: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the tasks in the catalogue.
    List,

    /// Print the assembled prompt and seed message for a task.
    Prompt(InvokeArgs),

    /// Run a task against a scripted model session.
    ///
    /// Capabilities are invoked for real; only the model decisions come
    /// from the script.
    Replay(ReplayArgs),

    /// Show recent execution records of a task.
    Show(ShowArgs),
}

#[derive(Args, Debug)]
struct InvokeArgs {
    /// Task id
    task_id: String,

    /// Input field as key=value; the value is parsed as JSON when possible
    #[arg(short = 'i', long = "input", value_parser = parse_input)]
    inputs: Vec<(String, Value)>,

    /// Tenant id recorded on the execution
    #[arg(long, default_value = "local")]
    tenant: String,

    /// Tenant-level prompt override
    #[arg(long)]
    tenant_prompt: Option<String>,
}

#[derive(Args, Debug)]
struct ReplayArgs {
    #[command(flatten)]
    invoke: InvokeArgs,

    /// Script file (JSON or YAML)
    #[arg(long)]
    script: PathBuf,

    /// Print run events as JSON lines
    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug)]
struct ShowArgs {
    /// Task id
    task_id: String,

    /// Maximum number of records
    #[arg(long, default_value_t = 10)]
    limit: usize,
}

fn parse_input(raw: &str) -> Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{}'", raw))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty input name in '{}'", raw));
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "task_engine=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let mut config = EngineConfig::from_env()?;
    if let Some(dir) = cli.tasks_dir {
        config.tasks_dir = dir;
    }
    if cli.database.is_some() {
        config.database_path = cli.database;
    }
    if cli.strict {
        config = config.with_strict_capabilities(true);
    }

    match cli.command {
        Command::List => list(&config),
        Command::Prompt(args) => prompt(&config, args),
        Command::Replay(args) => replay(config, args).await,
        Command::Show(args) => show(&config, args).await,
    }
}

fn load_catalogue(config: &EngineConfig) -> anyhow::Result<TaskCatalogue> {
    TaskCatalogue::load_dir(&config.tasks_dir)
        .with_context(|| format!("Failed to load tasks from {}", config.tasks_dir.display()))
}

fn find_task(catalogue: &TaskCatalogue, id: &str) -> anyhow::Result<Arc<TaskDefinition>> {
    catalogue
        .get(id)
        .ok_or_else(|| anyhow::anyhow!("Unknown task '{}'", id))
}

/// Validate input against the task's contract and build the context.
fn build_context(task: &TaskDefinition, args: &InvokeArgs) -> anyhow::Result<ExecutionContext> {
    let input: InputMap = args.inputs.iter().cloned().collect();
    let input = task.input.apply(input)?;
    let mut ctx = ExecutionContext::new(args.tenant.clone(), whoami()).with_input(input);
    if let Some(prompt) = &args.tenant_prompt {
        ctx = ctx.with_tenant_prompt(prompt.clone());
    }
    Ok(ctx)
}

fn whoami() -> String {
    std::env::var("USER").unwrap_or_else(|_| "cli".to_string())
}

fn list(config: &EngineConfig) -> anyhow::Result<()> {
    let catalogue = load_catalogue(config)?;
    if catalogue.is_empty() {
        println!("No tasks in {}", config.tasks_dir.display());
        return Ok(());
    }
    for task in catalogue.iter() {
        println!(
            "{:<24} {:<6} v{:<6} {}  [{}]",
            task.id,
            task.kind.as_str(),
            task.version,
            task.name,
            task.capabilities.join(", ")
        );
    }
    Ok(())
}

fn prompt(config: &EngineConfig, args: InvokeArgs) -> anyhow::Result<()> {
    let catalogue = load_catalogue(config)?;
    let task = find_task(&catalogue, &args.task_id)?;
    let ctx = build_context(&task, &args)?;

    let dynamic_context = match &task.dynamic_context {
        Some(resolver) => resolver.resolve(&ctx)?,
        None => String::new(),
    };
    println!("{}", assemble(&task, &ctx, &dynamic_context));
    println!("\n---\n");
    println!("{}", seed_message(task.kind, &ctx.input));
    Ok(())
}

async fn replay(config: EngineConfig, args: ReplayArgs) -> anyhow::Result<()> {
    let catalogue = load_catalogue(&config)?;
    let task = find_task(&catalogue, &args.invoke.task_id)?;
    let ctx = build_context(&task, &args.invoke)?;
    let script = Script::from_file(&args.script)?;

    let store = open_store(&config)?;
    let engine = Engine::new(
        Arc::new(CapabilityRegistry::with_builtins()),
        Arc::new(ScriptedModelService::new(script)),
        store,
        config,
    );

    info!("Replaying task {} from {}", task.id, args.script.display());
    let mut observers: Vec<Box<dyn RunObserver>> = vec![
        Box::new(TracingObserver::new()),
        Box::new(ConsoleObserver { json: args.json }),
    ];
    match engine.spawn(task, ctx).observe(&mut observers).await {
        Some(RunEvent::Complete { .. }) => Ok(()),
        Some(RunEvent::Error { message, .. }) => Err(anyhow::anyhow!(message)),
        _ => Err(anyhow::anyhow!("run ended without a terminal event")),
    }
}

async fn show(config: &EngineConfig, args: ShowArgs) -> anyhow::Result<()> {
    let store = open_store(config)?;
    if !store.is_persistent() {
        anyhow::bail!("No database configured; set TASK_ENGINE_DATABASE or pass --database");
    }
    let records = store
        .list_for_task(&args.task_id, args.limit)
        .await
        .map_err(|e| anyhow::anyhow!(e))?;
    if records.is_empty() {
        println!("No executions recorded for {}", args.task_id);
    }
    for record in records {
        let outcome = record
            .summary()
            .or(record.error())
            .unwrap_or("-")
            .replace('\n', " ");
        println!(
            "{}  {}  {:<9} steps={:<3} {}ms  {}",
            record.id,
            record.started_at.format("%Y-%m-%d %H:%M:%S"),
            record.status.as_str(),
            record.steps.len(),
            record.duration_ms.unwrap_or(0),
            outcome
        );
    }
    Ok(())
}

/// Prints run events to stdout.
struct ConsoleObserver {
    json: bool,
}

impl ConsoleObserver {
    fn print_json(&self, event: RunEvent) {
        match serde_json::to_string(&event) {
            Ok(line) => println!("{}", line),
            Err(e) => tracing::warn!("Failed to encode event: {}", e),
        }
    }
}

impl RunObserver for ConsoleObserver {
    fn on_execution_created(&mut self, record_id: Uuid) {
        if self.json {
            self.print_json(RunEvent::Created { record_id });
        } else {
            println!("execution {}", record_id);
        }
    }

    fn on_step(&mut self, step: &Step) {
        if self.json {
            self.print_json(RunEvent::Step { step: step.clone() });
            return;
        }
        match &step.kind {
            StepKind::CapabilityCall {
                capability,
                input,
                output,
            } => {
                let output = output
                    .as_ref()
                    .map(Value::to_string)
                    .unwrap_or_else(|| "(no output)".to_string());
                println!("[{}] {}({}) -> {}", step.index, capability, input, output);
            }
            StepKind::Text { content } => println!("[{}] {}", step.index, content),
        }
    }

    fn on_live_view(&mut self, url: &str) {
        if self.json {
            self.print_json(RunEvent::LiveView {
                url: url.to_string(),
            });
        } else {
            println!("    live view: {}", url);
        }
    }

    fn on_sub_action(&mut self, capability: &str, action: &SubAction) {
        if self.json {
            self.print_json(RunEvent::SubAction {
                capability: capability.to_string(),
                action: action.clone(),
            });
        } else {
            println!("    {} #{} {}", capability, action.index, action.action_type);
        }
    }

    fn on_complete(&mut self, summary: &RunSummary) {
        if self.json {
            self.print_json(RunEvent::Complete {
                summary: summary.clone(),
            });
        } else {
            println!(
                "completed in {}ms ({} steps, {} units): {}",
                summary.duration_ms,
                summary.steps.len(),
                summary.usage.total_units,
                summary.summary
            );
        }
    }

    fn on_error(&mut self, record_id: Option<Uuid>, message: &str) {
        if self.json {
            self.print_json(RunEvent::Error {
                record_id,
                message: message.to_string(),
            });
        } else {
            println!("failed: {}", message);
        }
    }
}
