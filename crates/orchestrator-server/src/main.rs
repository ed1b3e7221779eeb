mod configuration;
mod error;
mod routes;
mod state;

use configuration::Settings;
use http::{header, HeaderValue, Method};
use orchestrator::agent::Agent;
use orchestrator::github::channel::{RemoteToolChannel, RestToolChannel};
use orchestrator::github::tools::register_github_tools;
use orchestrator::github::GitHubClient;
use orchestrator::providers::openai::OpenAiProvider;
use orchestrator::registry::ToolRegistry;
use state::AppState;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let settings = Settings::new()?;
    let addr = settings.server.socket_addr()?;

    let github = Arc::new(GitHubClient::new(settings.github.to_config())?);
    let channel: Arc<dyn RemoteToolChannel> = Arc::new(RestToolChannel::new(github.clone()));
    let mut registry = ToolRegistry::new();
    register_github_tools(&mut registry, github.clone(), channel)?;
    info!(tools = registry.list_all().len(), "registered tools");

    let provider = OpenAiProvider::new(settings.provider.into_config()?)?;
    let agent = Agent::new(Box::new(provider), Arc::new(registry), github)
        .with_config(settings.agent.to_config());

    let state = AppState {
        agent: Arc::new(agent),
        fallback_token: settings.github.token.clone(),
        cookie_name: settings.auth.cookie_name.clone(),
        request_timeout: settings.agent.request_timeout(),
    };

    // Credentialed CORS needs an explicit origin, method and header list
    let cors = CorsLayer::new()
        .allow_origin(settings.server.client_url.parse::<HeaderValue>()?)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    let app = routes::configure(state).layer(cors);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}
