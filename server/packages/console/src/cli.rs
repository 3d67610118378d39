use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use thiserror::Error;
use tower_http::cors::{Any, CorsLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use url::Url;

use agent_console_error::ConsoleError;
use agent_console_provider::{HttpProvider, HttpProviderConfig, ProviderApi, ProviderError};
use agent_console_registry::types::RegistryScope;

use crate::orchestrator::Orchestrator;
use crate::router::{build_router_with_state, registry_response, AppState, AuthConfig};

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 8790;
const DEFAULT_LOCATION: &str = "us-central1";

const ENV_PROJECT: &str = "AGENT_CONSOLE_PROJECT";
const ENV_LOCATIONS: &str = "AGENT_CONSOLE_LOCATIONS";
const ENV_RUNTIME_API: &str = "AGENT_CONSOLE_RUNTIME_API";
const ENV_CONTAINER_API: &str = "AGENT_CONSOLE_CONTAINER_API";
const ENV_DISCOVERY_API: &str = "AGENT_CONSOLE_DISCOVERY_API";
const ENV_ACCESS_TOKEN: &str = "AGENT_CONSOLE_ACCESS_TOKEN";

#[derive(Parser, Debug)]
#[command(name = "agent-console", bin_name = "agent-console")]
#[command(about = "Management console for cloud-hosted agent runtimes")]
#[command(arg_required_else_help = true)]
pub struct ConsoleCli {
    #[command(subcommand)]
    command: Command,

    /// Token required by the console's own HTTP API.
    #[arg(long, short = 't', global = true)]
    token: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the console HTTP server.
    Server(ServerArgs),
    /// Fetch the runtime registry once and print it as JSON.
    Runtimes(RuntimesArgs),
    /// Delete runtimes by identity, draining live sessions first.
    Delete(DeleteArgs),
}

#[derive(Args, Debug)]
pub struct ServerArgs {
    #[arg(long, short = 'H', default_value = DEFAULT_HOST)]
    host: String,

    #[arg(long, short = 'p', default_value_t = DEFAULT_PORT)]
    port: u16,

    #[arg(long = "cors-allow-origin", short = 'O')]
    cors_allow_origin: Vec<String>,

    #[arg(long = "cors-allow-method", short = 'M')]
    cors_allow_method: Vec<String>,

    #[arg(long = "cors-allow-header", short = 'A')]
    cors_allow_header: Vec<String>,

    #[command(flatten)]
    provider: ProviderArgs,
}

#[derive(Args, Debug)]
pub struct RuntimesArgs {
    #[command(flatten)]
    provider: ProviderArgs,
}

#[derive(Args, Debug)]
pub struct DeleteArgs {
    /// Full resource paths of the runtimes to delete.
    #[arg(required = true)]
    identities: Vec<String>,

    #[command(flatten)]
    provider: ProviderArgs,
}

/// Where and as whom to talk to the provider. Every flag falls back to an
/// `AGENT_CONSOLE_*` environment variable.
#[derive(Args, Debug)]
pub struct ProviderArgs {
    /// Cloud project to scan.
    #[arg(long)]
    project: Option<String>,

    /// Compute location to scan (repeatable).
    #[arg(long = "location", short = 'l')]
    locations: Vec<String>,

    /// Logical-hierarchy location to scan for agents (repeatable).
    #[arg(long = "discovery-location")]
    discovery_locations: Vec<String>,

    /// Base URL of the managed runtime API.
    #[arg(long = "runtime-api")]
    runtime_api: Option<String>,

    /// Base URL of the container service API.
    #[arg(long = "container-api")]
    container_api: Option<String>,

    /// Base URL of the agent discovery API.
    #[arg(long = "discovery-api")]
    discovery_api: Option<String>,

    /// Bearer token attached to provider API calls.
    #[arg(long = "access-token")]
    access_token: Option<String>,
}

#[derive(Debug, Error)]
pub enum CliError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("invalid cors origin: {0}")]
    InvalidCorsOrigin(String),
    #[error("invalid cors method: {0}")]
    InvalidCorsMethod(String),
    #[error("invalid cors header: {0}")]
    InvalidCorsHeader(String),
    #[error("server error: {0}")]
    Server(String),
    #[error("deletion failed: {0}")]
    DeletionFailed(String),
    #[error(transparent)]
    Console(#[from] ConsoleError),
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub fn run_console() -> Result<(), CliError> {
    let cli = ConsoleCli::parse();
    let ConsoleCli { command, token } = cli;
    init_logging();
    run_command(&command, token)
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_logfmt::builder()
                .layer()
                .with_writer(std::io::stderr),
        )
        .init();
}

fn run_command(command: &Command, token: Option<String>) -> Result<(), CliError> {
    match command {
        Command::Server(args) => run_server(args, token),
        Command::Runtimes(args) => run_runtimes(args),
        Command::Delete(args) => run_delete(args),
    }
}

fn resolve_provider(args: &ProviderArgs) -> Result<(Arc<dyn ProviderApi>, RegistryScope), CliError> {
    let project = args
        .project
        .clone()
        .or_else(|| read_env(ENV_PROJECT))
        .ok_or_else(|| CliError::Config(format!("missing --project (or {ENV_PROJECT})")))?;

    let mut locations = args.locations.clone();
    if locations.is_empty() {
        if let Some(raw) = read_env(ENV_LOCATIONS) {
            locations = raw
                .split(',')
                .map(str::trim)
                .filter(|location| !location.is_empty())
                .map(ToOwned::to_owned)
                .collect();
        }
    }
    if locations.is_empty() {
        locations = vec![DEFAULT_LOCATION.to_string()];
    }

    let mut scope = RegistryScope::new(project, locations);
    if !args.discovery_locations.is_empty() {
        scope.discovery_locations = args.discovery_locations.clone();
    }

    let config = HttpProviderConfig {
        runtime_api: resolve_url(&args.runtime_api, ENV_RUNTIME_API, "--runtime-api")?,
        container_api: resolve_url(&args.container_api, ENV_CONTAINER_API, "--container-api")?,
        discovery_api: resolve_url(&args.discovery_api, ENV_DISCOVERY_API, "--discovery-api")?,
        bearer_token: args.access_token.clone().or_else(|| read_env(ENV_ACCESS_TOKEN)),
    };
    let provider = HttpProvider::new(config)?;
    Ok((Arc::new(provider), scope))
}

fn resolve_url(arg: &Option<String>, env: &str, flag: &str) -> Result<Url, CliError> {
    let raw = arg
        .clone()
        .or_else(|| read_env(env))
        .ok_or_else(|| CliError::Config(format!("missing {flag} (or {env})")))?;
    Url::parse(&raw).map_err(|err| CliError::Config(format!("invalid {flag}: {err}")))
}

fn read_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.is_empty())
}

fn run_server(args: &ServerArgs, token: Option<String>) -> Result<(), CliError> {
    let auth = match token {
        Some(token) => AuthConfig::with_token(token),
        None => AuthConfig::disabled(),
    };

    let (provider, scope) = resolve_provider(&args.provider)?;
    let state = Arc::new(AppState::new(auth, provider, scope));
    let (mut router, _state) = build_router_with_state(state);

    let cors = build_cors_layer(args)?;
    router = router.layer(cors);

    let addr = format!("{}:{}", args.host, args.port);
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| CliError::Server(err.to_string()))?;

    runtime.block_on(async move {
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        tracing::info!(addr = %addr, "console listening");
        axum::serve(listener, router)
            .with_graceful_shutdown(async {
                let _ = tokio::signal::ctrl_c().await;
            })
            .await
            .map_err(|err| CliError::Server(err.to_string()))
    })
}

fn build_cors_layer(server: &ServerArgs) -> Result<CorsLayer, CliError> {
    let mut cors = CorsLayer::new();

    let mut origins = Vec::new();
    for origin in &server.cors_allow_origin {
        let value = origin
            .parse()
            .map_err(|_| CliError::InvalidCorsOrigin(origin.clone()))?;
        origins.push(value);
    }
    if origins.is_empty() {
        cors = cors.allow_origin(tower_http::cors::AllowOrigin::predicate(|_, _| false));
    } else {
        cors = cors.allow_origin(origins);
    }

    if server.cors_allow_method.is_empty() {
        cors = cors.allow_methods(Any);
    } else {
        let mut methods = Vec::new();
        for method in &server.cors_allow_method {
            let parsed = method
                .parse()
                .map_err(|_| CliError::InvalidCorsMethod(method.clone()))?;
            methods.push(parsed);
        }
        cors = cors.allow_methods(methods);
    }

    if server.cors_allow_header.is_empty() {
        cors = cors.allow_headers(Any);
    } else {
        let mut headers = Vec::new();
        for header in &server.cors_allow_header {
            let parsed = header
                .parse()
                .map_err(|_| CliError::InvalidCorsHeader(header.clone()))?;
            headers.push(parsed);
        }
        cors = cors.allow_headers(headers);
    }

    Ok(cors)
}

fn run_runtimes(args: &RuntimesArgs) -> Result<(), CliError> {
    let (provider, scope) = resolve_provider(&args.provider)?;
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|err| CliError::Server(err.to_string()))?;

    runtime.block_on(async move {
        let mut orchestrator = Orchestrator::new(provider, scope);
        orchestrator.refresh().await?;
        let response = registry_response(&orchestrator)?;
        println!("{}", serde_json::to_string_pretty(&response)?);
        Ok(())
    })
}

fn run_delete(args: &DeleteArgs) -> Result<(), CliError> {
    let (provider, scope) = resolve_provider(&args.provider)?;
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|err| CliError::Server(err.to_string()))?;

    runtime.block_on(async move {
        let mut orchestrator = Orchestrator::new(provider, scope);
        orchestrator.refresh().await?;
        for identity in &args.identities {
            orchestrator.toggle(identity)?;
        }
        let report = orchestrator.delete_selected().await?;
        println!("{}", serde_json::to_string_pretty(&report)?);

        if let Some(refresh_error) = &report.refresh_error {
            return Err(CliError::DeletionFailed(refresh_error.clone()));
        }
        if let Some(failure_report) = &report.failure_report {
            return Err(CliError::DeletionFailed(failure_report.clone()));
        }
        Ok(())
    })
}
