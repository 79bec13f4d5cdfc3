//! Binary entry point: loads configuration, wires the composition root, and
//! either serves the HTTP API or runs a one-shot CLI command (§6, §9).

use clap::Parser;
use orch_core::config::OrchestratorConfig;
use orch_core::traits::StateStore;
use orchestrator::api::{build_router, AppState};
use orchestrator::cli::{Cli, Command};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn init_tracing(config: &OrchestratorConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.general.log_level.clone()));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    if config.general.log_format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

async fn build_state_store(config: &OrchestratorConfig) -> anyhow::Result<Arc<dyn StateStore>> {
    match config.state_store.backend.as_str() {
        "sqlite" => {
            let url = format!("sqlite://{}?mode=rwc", config.state_store.sqlite_path.display());
            let backend = orch_state::SqliteKvBackend::connect(&url).await?;
            let store = orch_state::DurableStateStore::new(
                backend,
                Duration::from_secs(config.state_store.lock_ttl_secs),
                Duration::from_secs(config.state_store.lock_acquire_timeout_secs),
            );
            Ok(Arc::new(store))
        }
        _ => Ok(Arc::new(orch_state::InMemoryStateStore::new())),
    }
}

async fn serve(config: OrchestratorConfig) -> anyhow::Result<ExitCode> {
    let bind = config.server.bind.clone();

    let state_store = match build_state_store(&config).await {
        Ok(store) => store,
        Err(err) => {
            error!(error = %err, "failed to connect to durable state store");
            return Ok(ExitCode::from(2));
        }
    };

    let (engine, agents) = orchestrator::bootstrap(config, state_store);
    let app_state = AppState { engine, agents };
    let router = build_router(app_state).layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&bind).await?;
    info!(%bind, "orchestrator listening");
    axum::serve(listener, router).await?;
    Ok(ExitCode::SUCCESS)
}

async fn submit(task_type: String, input: String, url: String) -> anyhow::Result<ExitCode> {
    let input_value: serde_json::Value = serde_json::from_str(&input)?;
    let client = reqwest::Client::new();
    let response = client
        .post(format!("{url}/tasks"))
        .json(&serde_json::json!({"type": task_type, "input": input_value}))
        .send()
        .await?;
    let status = response.status();
    let body: serde_json::Value = response.json().await?;
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(if status.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn status(task_id: String, url: String) -> anyhow::Result<ExitCode> {
    let client = reqwest::Client::new();
    let response = client.get(format!("{url}/tasks/{task_id}")).send().await?;
    let status = response.status();
    let body: serde_json::Value = response.json().await?;
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(if status.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match OrchestratorConfig::load() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("fatal configuration error: {err}");
            return ExitCode::from(1);
        }
    };
    init_tracing(&config);

    let result = match cli.command {
        Command::Serve => serve(config).await,
        Command::Submit { task_type, input, url } => submit(task_type, input, url).await,
        Command::Status { task_id, url } => status(task_id, url).await,
    };

    match result {
        Ok(code) => code,
        Err(err) => {
            error!(error = %err, "orchestrator exited with an error");
            ExitCode::from(1)
        }
    }
}
