use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use clap::{Args, Parser, Subcommand};
use serde_json::json;
use tracing::info;

use fieldops::config::AppConfig;
use fieldops::error::AppError;
use fieldops::events::{DomainEvent, EventDispatcher, EventHandler, EventKind, HandlerError};
use fieldops::scheduling::{scheduling_router, InMemoryVisitRepository, SchedulingService};
use fieldops::telemetry;

#[derive(Clone)]
struct AppState {
    readiness: Arc<AtomicBool>,
}

#[derive(Parser, Debug)]
#[command(
    name = "Field Operations Backend",
    about = "Run the field-service scheduling backend",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
}

#[derive(Args, Debug, Default)]
struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    port: Option<u16>,
}

/// Default registrant: writes every domain event to the structured log so
/// deployments without downstream consumers still get an audit trail.
struct EventLogHandler;

#[async_trait::async_trait]
impl EventHandler for EventLogHandler {
    async fn handle(&self, event: &DomainEvent) -> Result<(), HandlerError> {
        info!(
            event_id = %event.id,
            event = event.kind.label(),
            request_id = %event.context.request_id,
            actor = %event.context.actor.id,
            actor_type = event.context.actor.actor_type.label(),
            "domain event"
        );
        Ok(())
    }
}

#[tokio::main]
async fn main() {
    if let Err(err) = run_cli().await {
        eprintln!("application error: {err}");
        std::process::exit(1);
    }
}

async fn run_cli() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => run_server(args).await,
    }
}

async fn run_server(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let mut dispatcher = EventDispatcher::new();
    let log_handler = Arc::new(EventLogHandler);
    for kind in [
        EventKind::VisitScheduled,
        EventKind::VisitCompleted,
        EventKind::AccountCreated,
        EventKind::AccountStatusChanged,
    ] {
        dispatcher.on(kind, log_handler.clone());
    }

    let repository = Arc::new(InMemoryVisitRepository::new());
    let service = Arc::new(SchedulingService::new(
        repository,
        Arc::new(dispatcher),
        config.scheduling.clone(),
    ));

    let readiness_flag = Arc::new(AtomicBool::new(false));
    let state = AppState {
        readiness: readiness_flag.clone(),
    };

    let app = Router::new()
        .route("/health", get(healthcheck))
        .route("/ready", get(readiness_endpoint))
        .with_state(state)
        .merge(scheduling_router(service));

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "field operations backend ready");

    axum::serve(listener, app).await?;
    Ok(())
}

async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn readiness_endpoint(State(state): State<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}
