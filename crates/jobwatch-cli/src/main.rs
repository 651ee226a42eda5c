use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use jobwatch_core::app::{FailurePolicy, Tracker, TrackerBuilder, TrackerConfig};
use jobwatch_core::domain::{CorrelationId, DeploymentStatus, JobId, JobStatus, TrainingStatus};
use jobwatch_core::impls::{
    HttpModelRegistrar, HttpStatusClient, JsonFileStorage, LoggingHook, NoopHook, Routes,
};
use jobwatch_core::ports::{CompletionHook, RecordStorage};
use tokio::task::JoinSet;
use tracing_subscriber::EnvFilter;

/// jobwatch - track training experiments and model deployments until they finish
#[derive(Parser, Debug)]
#[command(name = "jobwatch")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Base URL of the jobs API
    #[arg(long, env = "JOBWATCH_API_URL", default_value = "http://localhost:8000")]
    api_url: String,

    /// Directory holding the persisted task records
    #[arg(long, env = "JOBWATCH_STATE_DIR", default_value = ".jobwatch")]
    state_dir: PathBuf,

    /// Delay between two polls of the same job
    #[arg(long, env = "JOBWATCH_POLL_INTERVAL_MS", default_value_t = 5_000)]
    poll_interval_ms: u64,

    /// What to do after a failed poll: halt or retry
    #[arg(long, env = "JOBWATCH_FAILURE_POLICY", default_value = "halt")]
    failure_policy: FailurePolicy,

    /// Upper bound for one HTTP request
    #[arg(long, env = "JOBWATCH_FETCH_TIMEOUT_SECS", default_value_t = 30)]
    fetch_timeout_secs: u64,

    /// Experiment to track, as EXPERIMENT_ID=MODEL_ID (repeatable)
    #[arg(long = "experiment", value_name = "EXPERIMENT_ID=MODEL_ID", value_parser = parse_pair)]
    experiments: Vec<(String, String)>,

    /// Deployment to track, as DEPLOYMENT_ID=MODEL_ID (repeatable)
    #[arg(long = "deployment", value_name = "DEPLOYMENT_ID=MODEL_ID", value_parser = parse_pair)]
    deployments: Vec<(String, String)>,

    /// Do not resume unfinished jobs from the state directory
    #[arg(long)]
    no_restore: bool,

    /// Log finished experiments instead of registering their model
    #[arg(long)]
    skip_model_registration: bool,

    /// Verbose output (ignored when RUST_LOG is set)
    #[arg(short, long)]
    verbose: bool,
}

fn parse_pair(raw: &str) -> Result<(String, String), String> {
    let (job, correlation) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected ID=MODEL_ID, got '{raw}'"))?;
    Ok((job.trim().to_string(), correlation.trim().to_string()))
}

impl Cli {
    fn tracker_config(&self) -> TrackerConfig {
        TrackerConfig {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            failure_policy: self.failure_policy.clone(),
            fetch_timeout: Some(self.fetch_timeout()),
        }
    }

    fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs.max(1))
    }
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .init();

    let storage: Arc<dyn RecordStorage> = Arc::new(JsonFileStorage::new(cli.state_dir.clone()));
    let timeout = cli.fetch_timeout();

    let training_hook: Arc<dyn CompletionHook<TrainingStatus>> = if cli.skip_model_registration {
        Arc::new(LoggingHook)
    } else {
        Arc::new(
            HttpModelRegistrar::new(&cli.api_url, timeout)
                .context("failed to create model registrar")?,
        )
    };
    let training = TrackerBuilder::<TrainingStatus>::new()
        .storage(storage.clone())
        .status_client(Arc::new(
            HttpStatusClient::<TrainingStatus>::new(&cli.api_url, Routes::training(), timeout)
                .context("failed to create training status client")?,
        ))
        .completion_hook(training_hook)
        .config(cli.tracker_config())
        .build()
        .await
        .context("failed to build training tracker")?;

    let deployment = TrackerBuilder::<DeploymentStatus>::new()
        .storage(storage)
        .status_client(Arc::new(
            HttpStatusClient::<DeploymentStatus>::new(&cli.api_url, Routes::deployment(), timeout)
                .context("failed to create deployment status client")?,
        ))
        .completion_hook(Arc::new(NoopHook))
        .config(cli.tracker_config())
        .build()
        .await
        .context("failed to build deployment tracker")?;

    let training = Arc::new(training);
    let deployment = Arc::new(deployment);

    let mut training_jobs = BTreeSet::new();
    let mut deployment_jobs = BTreeSet::new();
    if !cli.no_restore {
        training_jobs.extend(restore(&training).await);
        deployment_jobs.extend(restore(&deployment).await);
    }
    for (job, model) in &cli.experiments {
        training_jobs.insert(seed(&training, job, model).await?);
    }
    for (job, model) in &cli.deployments {
        deployment_jobs.insert(seed(&deployment, job, model).await?);
    }

    let mut watchers = JoinSet::new();
    spawn_watchers(&mut watchers, &training, training_jobs);
    spawn_watchers(&mut watchers, &deployment, deployment_jobs);
    if watchers.is_empty() {
        tracing::info!("nothing to watch");
        return Ok(());
    }

    tokio::select! {
        _ = async { while watchers.join_next().await.is_some() {} } => {
            tracing::info!("all watched jobs settled");
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("interrupted, stopping pollers");
        }
    }

    training.shutdown().await;
    deployment.shutdown().await;
    Ok(())
}

/// Resume persisted jobs and return the ones that were still unfinished.
async fn restore<S: JobStatus>(tracker: &Tracker<S>) -> Vec<JobId> {
    let pending = tracker
        .all()
        .await
        .into_iter()
        .filter(|(_, record)| !record.is_terminal())
        .map(|(job_id, _)| job_id)
        .collect();
    tracker.restore_all().await;
    pending
}

async fn seed<S: JobStatus>(tracker: &Tracker<S>, job: &str, model: &str) -> Result<JobId> {
    let job_id = JobId::parse(job)?;
    let correlation_id = CorrelationId::parse(model)?;
    tracker
        .seed_task(&job_id, &correlation_id)
        .await
        .with_context(|| format!("failed to seed {} job {job_id}", S::TRACKER))?;
    Ok(job_id)
}

/// Print every update of each job, including jobs whose poller already ended.
fn spawn_watchers<S: JobStatus>(
    watchers: &mut JoinSet<()>,
    tracker: &Arc<Tracker<S>>,
    jobs: BTreeSet<JobId>,
) {
    for job_id in jobs {
        let tracker = tracker.clone();
        watchers.spawn(async move { watch_job(&tracker, job_id).await });
    }
}

async fn watch_job<S: JobStatus>(tracker: &Tracker<S>, job_id: JobId) {
    let mut rx = tracker.subscribe(&job_id).await;
    loop {
        let current = rx.borrow_and_update().clone();
        if let Some(record) = current {
            match serde_json::to_string(&record) {
                Ok(line) => println!("{line}"),
                Err(err) => tracing::warn!(job_id = %job_id, error = %err, "failed to encode record"),
            }
            if record.is_terminal() {
                return;
            }
            if record.active_poller.is_none() {
                tracing::warn!(
                    tracker = S::TRACKER,
                    job_id = %job_id,
                    last_error = ?record.last_error,
                    "polling stopped before the job finished"
                );
                return;
            }
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}
