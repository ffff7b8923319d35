use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use futures::StreamExt;
use tracing_subscriber::EnvFilter;

use cadence_cache::{Cache, CacheConfig};
use cadence_config::{TriggerType, WorkflowDef};
use cadence_engine::{EngineConfig, ExecutionEngine, ProgressStream, RunRequest};
use cadence_registry::{ModuleRegistry, RegistryBuilder, register_builtins};
use cadence_store::{CachedStore, RunStore, SqliteStore, Store, WorkflowStore};

/// Cadence - run workflows of module functions and watch them progress
#[derive(Parser)]
#[command(name = "cadence")]
#[command(version, about, long_about = None)]
struct Cli {
  /// Path to the data directory (default: ~/.cadence)
  #[arg(long, global = true, env = "CADENCE_DATA_DIR")]
  data_dir: Option<PathBuf>,

  /// Cache backend for workflow and run lookups: off, memory, or a redis:// URL
  #[arg(long, global = true, env = "CADENCE_CACHE")]
  cache: Option<CacheConfig>,

  /// Redis server to cache in when --cache is not given
  #[arg(long, global = true, env = "REDIS_URL")]
  redis_url: Option<String>,

  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
  /// Save a workflow file and run it, printing the live event feed
  Run {
    /// Path to the workflow file (JSON)
    workflow_file: PathBuf,

    /// How the run is triggered
    #[arg(long, default_value = "manual")]
    trigger_type: TriggerType,

    /// Trigger payload as JSON (default: read from stdin, or `{}`)
    #[arg(long)]
    payload: Option<String>,

    /// Identity the run is attributed to
    #[arg(long, default_value = "cli")]
    caller: String,

    /// Fail a step that takes longer than this many milliseconds
    #[arg(long)]
    step_timeout_ms: Option<u64>,
  },

  /// List module functions
  Modules {
    /// Only show functions whose path or description matches
    #[arg(long)]
    search: Option<String>,
  },

  /// Show documentation for one module function
  ModuleInfo {
    /// Path in the form category.module.function
    path: String,
  },

  /// List stored workflows
  Workflows,

  /// Show past runs of a workflow, newest first
  History {
    workflow_id: String,

    #[arg(long, default_value_t = 20)]
    limit: usize,
  },

  /// Show aggregate run counts
  Stats {
    /// Only count runs started by this caller
    #[arg(long)]
    caller: Option<String>,
  },
}

fn main() -> Result<()> {
  let cli = Cli::parse();

  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(io::stderr)
    .init();

  let Some(command) = cli.command else {
    println!("cadence - use --help to see available commands");
    return Ok(());
  };

  let data_dir = match cli.data_dir {
    Some(dir) => dir,
    None => dirs::home_dir()
      .context("could not determine home directory; pass --data-dir")?
      .join(".cadence"),
  };

  let cache_config = cli
    .cache
    .or_else(|| cli.redis_url.map(CacheConfig::Redis))
    .unwrap_or_default();

  let rt = tokio::runtime::Runtime::new()?;
  rt.block_on(async {
    let cache = Cache::from_config(cache_config);
    let result = dispatch(command, &data_dir, &cache).await;
    cache.flush().await;
    result
  })
}

async fn dispatch(command: Commands, data_dir: &Path, cache: &Cache) -> Result<()> {
  let registry = Arc::new(builtin_registry()?);

  match command {
    Commands::Modules { search } => list_modules(&registry, search.as_deref()),
    Commands::ModuleInfo { path } => module_info(&registry, &path),
    Commands::Run {
      workflow_file,
      trigger_type,
      payload,
      caller,
      step_timeout_ms,
    } => {
      let payload = match payload {
        Some(json) => serde_json::from_str(&json).context("failed to parse --payload JSON")?,
        None => read_payload_from_stdin()?,
      };
      let config = EngineConfig {
        step_timeout: step_timeout_ms.map(Duration::from_millis),
      };
      let store = open_store(data_dir, cache).await?;
      let engine = ExecutionEngine::with_config(registry, store, config);
      run_workflow(Arc::new(engine), &workflow_file, trigger_type, payload, caller).await
    }
    Commands::Workflows => {
      let store = open_store(data_dir, cache).await?;
      list_workflows(store.as_ref()).await
    }
    Commands::History { workflow_id, limit } => {
      let store = open_store(data_dir, cache).await?;
      show_history(store.as_ref(), &workflow_id, limit).await
    }
    Commands::Stats { caller } => {
      let store = open_store(data_dir, cache).await?;
      show_stats(store.as_ref(), caller.as_deref()).await
    }
  }
}

fn builtin_registry() -> Result<ModuleRegistry> {
  let mut builder = RegistryBuilder::new();
  register_builtins(&mut builder).context("failed to register builtin modules")?;
  Ok(builder.build())
}

async fn open_store(data_dir: &Path, cache: &Cache) -> Result<Arc<dyn Store>> {
  tokio::fs::create_dir_all(data_dir)
    .await
    .with_context(|| format!("failed to create data directory: {}", data_dir.display()))?;

  let db_path = data_dir.join("cadence.db");
  let sqlite = SqliteStore::open(&db_path)
    .await
    .with_context(|| format!("failed to open database: {}", db_path.display()))?;

  Ok(Arc::new(CachedStore::new(sqlite, cache.clone())))
}

async fn run_workflow(
  engine: Arc<ExecutionEngine>,
  workflow_file: &Path,
  trigger_type: TriggerType,
  payload: serde_json::Value,
  caller: String,
) -> Result<()> {
  let workflow_content = tokio::fs::read_to_string(workflow_file)
    .await
    .with_context(|| format!("failed to read workflow file: {}", workflow_file.display()))?;

  let workflow_def: WorkflowDef = serde_json::from_str(&workflow_content)
    .with_context(|| format!("failed to parse workflow file: {}", workflow_file.display()))?;

  engine
    .store()
    .save_workflow(&workflow_def)
    .await
    .context("failed to save workflow")?;

  eprintln!(
    "Loaded workflow: {} ({} steps)",
    workflow_def.name,
    workflow_def.steps.len()
  );

  let request = RunRequest::new(&workflow_def.id, caller).with_trigger(trigger_type, payload);
  let mut feed = ProgressStream::start(engine, request);

  let mut last_event = None;
  let mut stdout = io::stdout().lock();
  while let Some(frame) = feed.next().await {
    stdout.write_all(frame.encode().as_bytes())?;
    stdout.flush()?;
    last_event = Some(frame.event);
  }

  match last_event.as_deref() {
    Some("workflow_completed") => Ok(()),
    Some(event) => bail!("run did not complete (last event: {})", event),
    None => bail!("run produced no events"),
  }
}

fn list_modules(registry: &ModuleRegistry, search: Option<&str>) -> Result<()> {
  let functions = match search {
    Some(query) => registry.search(query),
    None => registry.functions().collect(),
  };

  if functions.is_empty() {
    eprintln!("No module functions found");
    return Ok(());
  }

  for f in functions {
    println!("{:<36} {}", f.path(), f.function.description);
  }
  Ok(())
}

fn module_info(registry: &ModuleRegistry, path: &str) -> Result<()> {
  let found = registry
    .lookup(path)
    .with_context(|| format!("unknown module function '{}'", path))?;
  let function = found.function;

  println!("{}", found.path());
  println!();
  println!("  {}", function.description);
  println!();
  println!("Signature:");
  println!("  {}", function.signature);

  if let Some(example) = &function.example {
    println!();
    println!("Example:");
    println!("  {}", example);
  }

  println!();
  println!("Usage:");
  println!("{}", serde_json::to_string_pretty(&found.usage_snippet())?);

  let related = found.related(5);
  if !related.is_empty() {
    println!();
    println!("Related:");
    for f in related {
      println!(
        "  {}.{}.{}  {}",
        found.category.name, found.module.name, f.name, f.description
      );
    }
  }

  Ok(())
}

async fn list_workflows(store: &dyn Store) -> Result<()> {
  let workflows = store
    .list_workflows()
    .await
    .context("failed to list workflows")?;

  for w in workflows {
    println!(
      "{:<24} {:<8} {:>3} steps  {}",
      w.id,
      w.status.as_str(),
      w.steps.len(),
      w.name
    );
  }
  Ok(())
}

async fn show_history(store: &dyn Store, workflow_id: &str, limit: usize) -> Result<()> {
  let runs = store
    .list_runs(workflow_id)
    .await
    .with_context(|| format!("failed to list runs for '{}'", workflow_id))?;

  if runs.is_empty() {
    eprintln!("No runs recorded for '{}'", workflow_id);
    return Ok(());
  }

  for run in runs.into_iter().take(limit) {
    let finished = run
      .finished_at
      .map(|t| t.to_rfc3339())
      .unwrap_or_else(|| "-".to_string());
    println!(
      "{}  {:<8} {:<10} {}  {}  {}",
      run.id,
      run.status,
      run.trigger_type,
      run.started_at.to_rfc3339(),
      finished,
      run.error.as_deref().unwrap_or("")
    );
  }
  Ok(())
}

async fn show_stats(store: &dyn Store, caller: Option<&str>) -> Result<()> {
  let stats = store
    .stats(caller)
    .await
    .context("failed to compute run stats")?;
  println!("{}", serde_json::to_string_pretty(&stats)?);
  Ok(())
}

fn read_payload_from_stdin() -> Result<serde_json::Value> {
  use std::io::IsTerminal;

  if io::stdin().is_terminal() {
    return Ok(serde_json::json!({}));
  }

  let mut input = String::new();
  io::stdin()
    .read_to_string(&mut input)
    .context("failed to read payload from stdin")?;

  if input.trim().is_empty() {
    Ok(serde_json::json!({}))
  } else {
    serde_json::from_str(&input).context("failed to parse payload JSON from stdin")
  }
}
