use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::info;

use bradax_broker::api::{self, AppState};
use bradax_broker::auth::AuthService;
use bradax_broker::config::BrokerConfig;
use bradax_broker::middleware::RateLimiter;
use bradax_gateway::OrchestratorBuilder;
use bradax_guardrails::RuleStore;
use bradax_provider::ChatHttpProvider;
use bradax_store::{ModelCatalog, ProjectStore};
use bradax_telemetry::TelemetryWriter;

/// bradax broker HTTP server.
#[derive(Parser, Debug)]
#[command(name = "bradax-broker", about = "Governance gateway for LLM invocations")]
struct Cli {
    /// Override the bind host.
    #[arg(long)]
    host: Option<String>,

    /// Override the bind port.
    #[arg(long)]
    port: Option<u16>,

    /// Override the data directory.
    #[arg(long)]
    data_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing subscriber from RUST_LOG or default to info.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    // Configuration comes from the environment; startup refuses to continue
    // on a missing or weak master secret.
    let mut config = BrokerConfig::from_env()?;
    if let Some(host) = cli.host {
        config.host = host;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(data_dir) = cli.data_dir {
        config.data_dir = data_dir;
    }

    // Stores validate their files up front and fail fast on integrity
    // violations.
    let projects = Arc::new(ProjectStore::load(config.data_dir.join("projects.json"))?);
    let catalog = Arc::new(ModelCatalog::load(config.data_dir.join("llm_models.json"))?);
    let rules = Arc::new(RuleStore::load(config.data_dir.join("guardrails.json"))?);
    let writer = Arc::new(
        TelemetryWriter::new(config.data_dir.clone())?.with_interactions_cap(config.interactions_cap),
    );

    let provider = Arc::new(ChatHttpProvider::new(
        "openai",
        config.provider_base_url.clone(),
        config.provider_api_key.clone(),
    ));

    let orchestrator = Arc::new(
        OrchestratorBuilder::new()
            .projects(Arc::clone(&projects))
            .catalog(Arc::clone(&catalog))
            .rules(Arc::clone(&rules))
            .provider(provider)
            .writer(Arc::clone(&writer))
            .provider_timeout(config.provider_timeout)
            .build()?,
    );

    let auth = Arc::new(AuthService::new(
        config.master_secret.clone(),
        Arc::clone(&projects),
        Arc::clone(&writer),
        config.jwt_expiry_minutes,
    ));
    let limiter = Arc::new(RateLimiter::new(config.rate_limit));

    let state = AppState {
        orchestrator,
        auth,
        projects,
        catalog,
        rules,
        writer,
        environment: config.environment,
    };
    let app = api::router(state, limiter, config.trusted_hosts.clone());

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(
        address = %addr,
        environment = config.environment.as_str(),
        "bradax-broker listening"
    );

    // Serve with graceful shutdown on SIGINT / SIGTERM.
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("bradax-broker shut down");
    Ok(())
}

/// Wait for SIGINT (Ctrl+C) or SIGTERM, then return to trigger graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { info!("received SIGINT"); }
        () = terminate => { info!("received SIGTERM"); }
    }
}
