use clap::Parser;
use colored::*;
use eyre::{Context, Result, eyre};
use log::info;
use secrecy::ExposeSecret;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;

use replyr::credentials::{SealedCredentialStore, Sealer};
use replyr::domain::{RunOutcome, RunStatusReport};
use replyr::id::now_ms;
use replyr::llm::{OpenAiClient, OpenAiConfig};
use replyr::pipeline::RunPipeline;
use replyr::scheduler::Scheduler;
use replyr::service::ReplyService;
use replyr::source::{SourceRegistry, YoutubeConnector};
use replyr::storage::{SqliteStore, Store};
use replyr::worker::{TaskQueue, TaskRunner, WorkerConfig};

mod cli;
mod config;

use cli::Cli;
use cli::commands::Commands;
use config::Config;

const ACCESS_TOKEN_ENV: &str = "REPLYR_ACCESS_TOKEN";
const REFRESH_TOKEN_ENV: &str = "REPLYR_REFRESH_TOKEN";

fn setup_logging() -> Result<()> {
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("replyr")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("replyr.log");

    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    env_logger::Builder::from_default_env()
        .target(env_logger::Target::Pipe(target))
        .init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

/// Store and queue; enough for commands that never call out
struct App {
    config: Config,
    store: Arc<SqliteStore>,
    queue: TaskQueue,
}

impl App {
    fn open(config: &Config) -> Result<Self> {
        let store = Arc::new(
            SqliteStore::open(&config.storage.data_dir)
                .context(format!("Failed to open store in {}", config.storage.data_dir.display()))?,
        );
        let queue = TaskQueue::new(store.clone(), config.worker.max_attempts);
        Ok(Self {
            config: config.clone(),
            store,
            queue,
        })
    }

    /// Full pipeline: sealed credentials, YouTube source, OpenAI classifier and responder
    fn pipeline(&self) -> Result<Arc<RunPipeline>> {
        let sealer = Sealer::from_env(&self.config.credentials.key_env).context("Failed to load sealing key")?;
        let credentials = SealedCredentialStore::new(self.store.clone(), sealer);

        let youtube = YoutubeConnector::new((&self.config.youtube).into()).context("Failed to build YouTube client")?;
        let sources = SourceRegistry::new().with(Arc::new(youtube));

        let llm = Arc::new(
            OpenAiClient::new(OpenAiConfig::from(&self.config.llm)).context("Failed to build OpenAI client")?,
        );
        info!("Using model {}", llm.model());

        Ok(Arc::new(RunPipeline::new(
            self.store.clone(),
            Arc::new(credentials),
            Arc::new(sources),
            llm.clone(),
            llm,
            (&self.config.pipeline).into(),
        )))
    }

    fn runner(&self, pipeline: Arc<RunPipeline>, workers: Option<usize>) -> Arc<TaskRunner> {
        let mut worker_config = WorkerConfig::from(&self.config.worker);
        if let Some(workers) = workers {
            worker_config.workers = workers;
        }
        Arc::new(TaskRunner::new(self.queue.clone(), pipeline, worker_config))
    }

    fn service(&self) -> Result<ReplyService> {
        let pipeline = self.pipeline()?;
        Ok(ReplyService::new(self.runner(pipeline.clone(), None), pipeline))
    }

    fn scheduler(&self) -> Scheduler {
        Scheduler::new(self.store.clone(), self.queue.clone(), (&self.config.scheduler).into())
    }
}

fn print_outcome(outcome: &RunOutcome) {
    let label = match outcome {
        RunOutcome::Completed(_) => outcome.as_str().green(),
        o if o.is_gated() => o.as_str().yellow(),
        o => o.as_str().red(),
    };
    println!("{} {}", "Outcome:".bold(), label);
    if let Some(summary) = outcome.summary() {
        println!(
            "  responded {}, pending {}, skipped {}, discarded {}, failed {}, duplicates {}",
            summary.responded, summary.pending, summary.skipped, summary.discarded, summary.failed, summary.duplicates
        );
    } else {
        println!("  {}", outcome);
    }
}

fn print_report(report: &RunStatusReport) {
    println!("{} {}", "Task:".bold(), report.task_id);
    println!("  status: {} ({})", report.status.to_string().cyan(), report.state.as_str());
    println!("  attempts: {}", report.attempts);
    if let Some(error) = &report.error {
        println!("  last error: {}", error.red());
    }
    if let Some(result) = &report.result {
        print_outcome(result);
    }
}

async fn run_application(cli: &Cli, config: &Config) -> Result<()> {
    info!("Starting application");

    if cli.is_verbose() {
        println!("{}", "Verbose mode enabled".yellow());
    }

    let app = App::open(config)?;

    match &cli.command {
        Commands::Daemon { workers } => handle_daemon(&app, *workers).await,
        Commands::Tick => {
            let result = app.scheduler().tick()?;
            println!("{} {} run(s) queued", "Tick:".green(), result.enqueued);
            if result.errors > 0 {
                println!("  {} integration(s) failed to enqueue", result.errors.to_string().red());
            }
            Ok(())
        }
        Commands::RunNow { integration } => {
            println!("{} {}", "Running:".cyan(), integration);
            let outcome = app.pipeline()?.run(integration).await?;
            print_outcome(&outcome);
            Ok(())
        }
        Commands::Enqueue { integration } => {
            app.store
                .get_enabled_integration(integration)?
                .ok_or_else(|| eyre!("Integration {} not found or disabled", integration))?;
            let task = app.queue.enqueue(integration)?;
            println!("{} {}", "Queued:".green(), task.id);
            Ok(())
        }
        Commands::Status { task } => {
            print_report(&app.queue.status(task)?);
            Ok(())
        }
        Commands::Cancel { task } => {
            if app.queue.cancel(task)? {
                println!("{} {}", "Cancelled:".red(), task);
            } else {
                println!("{} {} already finished", "Unchanged:".yellow(), task);
            }
            Ok(())
        }
        Commands::Approve { response } => {
            let response = app.service()?.approve_response(response).await?;
            println!("{} {} -> {}", "Approved:".green(), response.id, response.status);
            if let Some(error) = &response.error {
                println!("  {}", error.red());
            }
            Ok(())
        }
        Commands::Reject { response } => {
            let response = app.service()?.reject_response(response)?;
            println!("{} {}", "Rejected:".red(), response.id);
            Ok(())
        }
        Commands::Seal { integration } => handle_seal(&app, integration),
        Commands::Keygen => {
            let key = Sealer::generate_key_hex()?;
            println!("{}", key.expose_secret());
            Ok(())
        }
    }
}

async fn handle_daemon(app: &App, workers: Option<usize>) -> Result<()> {
    let runner = app.runner(app.pipeline()?, workers);
    let scheduler = app.scheduler();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    println!(
        "{} ticking every {:?}, Ctrl-C to stop",
        "Daemon started:".green(),
        scheduler.config().tick_interval
    );

    let worker_handle = tokio::spawn(runner.run(shutdown_rx.clone()));
    let scheduler_handle = tokio::spawn(async move { scheduler.run(shutdown_rx).await });

    tokio::signal::ctrl_c().await.context("Failed to listen for Ctrl-C")?;
    println!("{}", "Shutting down...".yellow());
    info!("Shutdown requested");
    let _ = shutdown_tx.send(true);

    let state = scheduler_handle.await.context("Scheduler task panicked")??;
    worker_handle.await.context("Worker task panicked")??;

    println!("{} {} tick(s), {} run(s) queued", "Stopped:".green(), state.tick_count, state.total_enqueued);
    Ok(())
}

fn handle_seal(app: &App, integration_id: &str) -> Result<()> {
    let access = std::env::var(ACCESS_TOKEN_ENV).map_err(|_| eyre!("{} is not set", ACCESS_TOKEN_ENV))?;
    let refresh = std::env::var(REFRESH_TOKEN_ENV).ok().filter(|t| !t.is_empty());

    let sealer = Sealer::from_env(&app.config.credentials.key_env).context("Failed to load sealing key")?;
    let integration = app
        .store
        .get_integration(integration_id)?
        .ok_or_else(|| eyre!("Integration {} not found", integration_id))?;

    let sealed_access = sealer.seal(integration_id, &access)?;
    let sealed_refresh = refresh.map(|t| sealer.seal(integration_id, &t)).transpose()?;
    let mut integration = integration.with_sealed_tokens(sealed_access, sealed_refresh);
    integration.updated_at = now_ms();
    app.store.update_integration(&integration)?;

    println!("{} tokens sealed for {}", "Sealed:".green(), integration_id);
    Ok(())
}

fn main() -> Result<()> {
    setup_logging().context("Failed to setup logging")?;

    let cli = Cli::parse();

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    info!("Starting with config from: {:?}", cli.config);

    let runtime = tokio::runtime::Runtime::new().context("Failed to start tokio runtime")?;
    runtime
        .block_on(run_application(&cli, &config))
        .context("Application failed")?;

    Ok(())
}
