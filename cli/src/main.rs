mod cli;

use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use clap::Parser;
use preview_tracker::logging::{init_logging, LogFormat};
use preview_tracker::{
    default_config_path, default_database_path, load_config, ConfigError, HttpStatusClient,
    JobInput, JobPhase, JobStore, LogDiagnostics, MigrationState, OwnershipRegistry,
    PollingRuntime, PreviewJob, Result, RuntimeOptions, SqliteStorage, StoreOptions,
    TrackerConfig, TrackerError,
};

use crate::cli::{Args, Commands};

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let format = if args.json_logs {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };
    if let Err(e) = init_logging(format, &args.log_level) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }

    if let Err(e) = run(args).await {
        log::error!("{}", e);
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

/// Explicit `--config`, then the default path if it exists, then nothing.
fn resolve_config(args: &Args) -> Result<Option<TrackerConfig>> {
    let mut config = match &args.config {
        Some(path) => Some(load_config(path)?),
        None => {
            let path = default_config_path();
            if path.exists() {
                log::debug!("Using config at {}", path.display());
                Some(load_config(&path)?)
            } else {
                None
            }
        }
    };

    if let Some(endpoint) = &args.endpoint {
        match config.as_mut() {
            Some(config) => config.status_endpoint = endpoint.clone(),
            None => config = Some(TrackerConfig::with_endpoint(endpoint.clone())),
        }
    }
    Ok(config)
}

fn resolve_database(args: &Args, config: Option<&TrackerConfig>) -> Result<PathBuf> {
    args.database
        .clone()
        .or_else(|| config.and_then(|c| c.database_path.clone()))
        .or_else(default_database_path)
        .ok_or_else(|| {
            TrackerError::Config(ConfigError::Validation {
                message: "Cannot determine a database path; pass --database".to_string(),
            })
        })
}

fn open_store(args: &Args, config: Option<&TrackerConfig>) -> Result<Arc<JobStore>> {
    let path = resolve_database(args, config)?;
    let storage = SqliteStorage::open(&path)?;
    let options = config.map(StoreOptions::from_config).unwrap_or_default();
    let store = Arc::new(JobStore::new(
        Arc::new(storage),
        options,
        MigrationState::NotStarted,
    ));
    if let Some(report) = store.hydrate() {
        log::debug!(
            "Loaded {} job(s) from {} ({} dropped)",
            report.loaded,
            path.display(),
            report.dropped_unknown_status + report.dropped_malformed
        );
    }
    Ok(store)
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).map_err(TrackerError::Output)?;
    println!("{}", text);
    Ok(())
}

async fn run(args: Args) -> Result<()> {
    let config = resolve_config(&args)?;
    let store = open_store(&args, config.as_ref())?;

    match &args.command {
        Commands::Track {
            id,
            token,
            url,
            source_lang,
            target_lang,
            email,
        } => {
            let input = JobInput::new(id, token, JobPhase::Pending).with_request(
                url,
                source_lang,
                target_lang,
                email.as_deref(),
            );
            let job = store.upsert_job(input);
            print_json(&job)?;
        }
        Commands::List => print_json(store.snapshot().jobs())?,
        Commands::Show {
            request_key,
            preferred,
        } => {
            let job: Option<PreviewJob> = match (request_key, preferred) {
                (Some(key), _) => store.latest_job_for_request_key(key),
                (None, true) => store.preferred_job(),
                (None, false) => store.latest_active_job(),
            };
            print_json(&job)?;
        }
        Commands::Remove { id } => {
            store.remove_job(id);
            log::info!("Removed preview job '{}'", id);
        }
        Commands::Cleanup => {
            let before = store.snapshot().len();
            store.cleanup();
            log::info!(
                "Cleanup kept {} of {} job(s)",
                store.snapshot().len(),
                before
            );
        }
        Commands::Watch => {
            let config = config.ok_or_else(|| ConfigError::Validation {
                message: "watch needs a status endpoint; pass --endpoint or --config".to_string(),
            })?;
            watch(store, &config).await?;
        }
    }

    Ok(())
}

async fn watch(store: Arc<JobStore>, config: &TrackerConfig) -> Result<()> {
    let client = HttpStatusClient::from_config(config)?;
    let mut changes = store.watch();
    let runtime = PollingRuntime::mount(
        Arc::clone(&store),
        Arc::new(client),
        &OwnershipRegistry::global(),
        RuntimeOptions::from_config(config),
        Arc::new(LogDiagnostics),
    );

    loop {
        let done = {
            let snapshot = changes.borrow_and_update();
            for job in snapshot.jobs() {
                log::info!(
                    "{} {}{}",
                    job.preview_id,
                    job.status,
                    job.stage.map(|s| format!(" ({})", s)).unwrap_or_default()
                );
            }
            !snapshot.has_active()
        };
        if done {
            break;
        }

        tokio::select! {
            changed = changes.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                log::info!("Interrupted, stopping");
                break;
            }
        }
    }

    runtime.unmount();
    print_json(store.snapshot().jobs())
}
