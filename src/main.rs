use std::collections::HashMap;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt as _, util::SubscriberInitExt as _};

use autolife_activity::{analyze_task_category, generate_activity_title};
use autolife_config::ConsoleConfig;
use autolife_store::{ChatHistory as _, MemoryStore, NewMessage};
use autolife_stream::{
  AgentTransport, HttpTransport, ScriptedTransport, TaskStreamController, demo_script,
};
use autolife_task::{StepStatus, TaskExecution, TaskStatus};

/// Autolife - drive a phone automation agent from the terminal
#[derive(Parser)]
#[command(name = "autolife")]
#[command(version, about, long_about = None)]
struct Cli {
  /// Path to the config file (default: ~/.autolife/config.json)
  #[arg(long, global = true)]
  config: Option<PathBuf>,

  /// Override the agent API base URL, e.g. http://localhost:8000/api
  #[arg(long, global = true)]
  base_url: Option<String>,

  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
  /// Run a task and follow its progress
  Run {
    /// What the agent should do, e.g. "帮我点外卖"
    text: String,

    /// Task id to send to the backend (default: task_<millis>)
    #[arg(long)]
    task_id: Option<String>,

    /// Replay a canned run instead of contacting the backend
    #[arg(long)]
    mock: bool,

    /// Print the finished run as JSON
    #[arg(long)]
    json: bool,
  },

  /// Show the activity category and title a task would get
  Classify {
    text: String,
  },

  /// Ask the backend to cancel a task
  Cancel {
    task_id: String,
  },

  /// Check whether the backend is reachable
  Health,
}

fn main() -> Result<ExitCode> {
  tracing_subscriber::registry()
    .with(
      tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
    )
    .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
    .init();

  let cli = Cli::parse();

  let Some(command) = cli.command else {
    println!("autolife - use --help to see available commands");
    return Ok(ExitCode::SUCCESS);
  };

  if let Commands::Classify { text } = &command {
    classify(text);
    return Ok(ExitCode::SUCCESS);
  }

  let config = load_config(cli.config, cli.base_url)?;
  let rt = tokio::runtime::Runtime::new()?;
  rt.block_on(async {
    match command {
      Commands::Run {
        text,
        task_id,
        mock,
        json,
      } => run_task(config, text, task_id, mock, json).await,
      Commands::Cancel { task_id } => cancel_task(config, task_id).await,
      Commands::Health => health(config).await,
      Commands::Classify { .. } => Ok(ExitCode::SUCCESS),
    }
  })
}

fn load_config(path: Option<PathBuf>, base_url: Option<String>) -> Result<ConsoleConfig> {
  let path = match path {
    Some(path) => path,
    None => dirs::home_dir()
      .context("could not determine home directory")?
      .join(".autolife")
      .join("config.json"),
  };

  let config = ConsoleConfig::load_or_default(&path)
    .with_context(|| format!("failed to load config: {}", path.display()))?;

  Ok(match base_url {
    Some(base_url) => config.with_base_url(base_url),
    None => config,
  })
}

fn classify(text: &str) {
  let category = analyze_task_category(text);
  let title = generate_activity_title(&TaskExecution::running("classify", text));
  println!("category: {}", category.as_str());
  println!("title:    {}", title);
}

async fn run_task(
  config: ConsoleConfig,
  text: String,
  task_id: Option<String>,
  mock: bool,
  json: bool,
) -> Result<ExitCode> {
  let task_id = task_id.unwrap_or_else(new_task_id);

  let transport: Arc<dyn AgentTransport> = if mock {
    Arc::new(ScriptedTransport::with_script(demo_script(&task_id)))
  } else {
    Arc::new(HttpTransport::new(&config).context("failed to create HTTP transport")?)
  };

  let store = Arc::new(MemoryStore::new());
  let controller = TaskStreamController::new(transport, store.clone());
  store.append_message(NewMessage::user(text.clone()));

  let render_cancel = CancellationToken::new();
  let render = tokio::spawn(render_progress(store.subscribe(), render_cancel.clone()));

  eprintln!("▶ {} ({})", text, task_id);
  controller.start(task_id.clone(), text);

  tokio::select! {
    _ = controller.wait_idle() => {}
    _ = tokio::signal::ctrl_c() => {
      info!(%task_id, "interrupted, cancelling task");
      controller.cancel().await;
    }
  }

  render_cancel.cancel();
  if let Err(e) = render.await {
    warn!(error = %e, "progress renderer did not exit cleanly");
  }

  if let Some(reply) = store.messages().last() {
    println!("{}", reply.content);
  }
  for activity in store.activities() {
    eprintln!(
      "activity recorded: {} [{}]",
      activity.title,
      activity.category.as_str()
    );
  }

  let finished = store.task_history().pop();
  if json && let Some(task) = &finished {
    println!("{}", serde_json::to_string_pretty(task)?);
  }

  Ok(match finished.map(|task| task.status) {
    Some(TaskStatus::Completed) => ExitCode::SUCCESS,
    _ => ExitCode::FAILURE,
  })
}

async fn render_progress(
  mut current: watch::Receiver<Option<TaskExecution>>,
  cancel: CancellationToken,
) {
  let mut shown = HashMap::new();
  loop {
    show_steps(&current.borrow_and_update(), &mut shown);

    tokio::select! {
      _ = cancel.cancelled() => break,
      changed = current.changed() => {
        if changed.is_err() {
          break;
        }
      }
    }
  }
  show_steps(&current.borrow(), &mut shown);
}

/// Print what changed since the last snapshot. `shown` tracks the status and
/// whether thinking was printed for each step.
fn show_steps(task: &Option<TaskExecution>, shown: &mut HashMap<u32, (StepStatus, bool)>) {
  let Some(task) = task else {
    return;
  };

  for step in &task.steps {
    let state = (step.status, step.thinking.is_some());
    let previous = shown.insert(step.step_number, state);
    if previous == Some(state) {
      continue;
    }

    if previous.is_none() {
      let title = step
        .action
        .as_ref()
        .map(|action| action.title())
        .unwrap_or_default();
      eprintln!("  [{}] {}", step.step_number, title);
    }
    if let Some(thinking) = &step.thinking
      && previous.is_none_or(|(_, had_thinking)| !had_thinking)
    {
      eprintln!("      💭 {}", thinking);
    }
    if previous.map(|(status, _)| status) == Some(step.status) {
      continue;
    }
    match step.status {
      StepStatus::Completed => eprintln!(
        "      ✓ {}{}",
        step.result.as_deref().unwrap_or(""),
        step
          .duration
          .map(|ms| format!(" ({} ms)", ms))
          .unwrap_or_default()
      ),
      StepStatus::Error => eprintln!("      ✗"),
      StepStatus::Pending | StepStatus::Running => {}
    }
  }
}

async fn cancel_task(config: ConsoleConfig, task_id: String) -> Result<ExitCode> {
  let transport = HttpTransport::new(&config).context("failed to create HTTP transport")?;
  transport
    .cancel_task(&task_id)
    .await
    .with_context(|| format!("failed to cancel task {}", task_id))?;
  println!("cancellation requested for {}", task_id);
  Ok(ExitCode::SUCCESS)
}

async fn health(config: ConsoleConfig) -> Result<ExitCode> {
  let transport = HttpTransport::new(&config).context("failed to create HTTP transport")?;
  if transport.health_check().await {
    println!("backend is healthy ({})", config.health_url);
    Ok(ExitCode::SUCCESS)
  } else {
    println!("backend is unreachable ({})", config.health_url);
    Ok(ExitCode::FAILURE)
  }
}

fn new_task_id() -> String {
  let millis = SystemTime::now()
    .duration_since(UNIX_EPOCH)
    .map(|d| d.as_millis())
    .unwrap_or_default();
  format!("task_{}", millis)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn test_render_progress_exits_on_cancel() {
    let (tx, rx) = watch::channel(Some(TaskExecution::running("t1", "打开微信")));
    let cancel = CancellationToken::new();
    let render = tokio::spawn(render_progress(rx, cancel.clone()));

    cancel.cancel();
    assert!(render.await.is_ok());
    drop(tx);
  }

  #[tokio::test]
  async fn test_render_progress_exits_when_store_drops() {
    let (tx, rx) = watch::channel(None);
    let render = tokio::spawn(render_progress(rx, CancellationToken::new()));

    drop(tx);
    assert!(render.await.is_ok());
  }
}
