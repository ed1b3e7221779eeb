use crate::error::{to_env_var, ConfigError};
use config::{Config, Environment, File};
use orchestrator::agent::AgentConfig;
use orchestrator::github::GitHubConfig;
use orchestrator::providers::configs::{OpenAiProviderConfig, DEFAULT_HOST, DEFAULT_MODEL};
use serde::Deserialize;
use std::net::{AddrParseError, SocketAddr};
use std::time::Duration;

#[derive(Debug, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Origin of the chat interface, allowed to call the API with credentials
    #[serde(default = "default_client_url")]
    pub client_url: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            client_url: default_client_url(),
        }
    }
}

impl ServerSettings {
    pub fn socket_addr(&self) -> Result<SocketAddr, AddrParseError> {
        format!("{}:{}", self.host, self.port).parse()
    }
}

#[derive(Debug, Deserialize)]
pub struct ProviderSettings {
    #[serde(default = "default_provider_host")]
    pub host: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: i32,
    #[serde(default = "default_provider_timeout")]
    pub timeout_secs: u64,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            host: default_provider_host(),
            api_key: None,
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_provider_timeout(),
        }
    }
}

impl ProviderSettings {
    pub fn into_config(self) -> Result<OpenAiProviderConfig, ConfigError> {
        let api_key = self.api_key.ok_or_else(|| ConfigError::MissingEnvVar {
            env_var: to_env_var("provider.api_key"),
        })?;
        Ok(OpenAiProviderConfig {
            host: self.host,
            api_key,
            model: self.model,
            temperature: Some(self.temperature),
            max_tokens: Some(self.max_tokens),
            timeout: Duration::from_secs(self.timeout_secs),
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct GitHubSettings {
    #[serde(default = "default_github_api_url")]
    pub api_url: String,
    /// Used when a request carries no credential of its own
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "default_github_timeout")]
    pub timeout_secs: u64,
}

impl Default for GitHubSettings {
    fn default() -> Self {
        Self {
            api_url: default_github_api_url(),
            token: None,
            timeout_secs: default_github_timeout(),
        }
    }
}

impl GitHubSettings {
    pub fn to_config(&self) -> GitHubConfig {
        GitHubConfig {
            api_url: self.api_url.clone(),
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AgentSettings {
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    #[serde(default = "default_quality_threshold")]
    pub quality_threshold: f32,
    #[serde(default = "default_true")]
    pub quality_enabled: bool,
    #[serde(default = "default_tool_timeout")]
    pub tool_timeout_secs: u64,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            max_iterations: default_max_iterations(),
            quality_threshold: default_quality_threshold(),
            quality_enabled: true,
            tool_timeout_secs: default_tool_timeout(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl AgentSettings {
    pub fn to_config(&self) -> AgentConfig {
        AgentConfig {
            max_retries: self.max_retries,
            max_iterations: self.max_iterations,
            quality_threshold: self.quality_threshold,
            quality_enabled: self.quality_enabled,
            tool_timeout: Duration::from_secs(self.tool_timeout_secs),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Deserialize)]
pub struct AuthSettings {
    /// Cookie holding the user's GitHub token when no Authorization header is sent
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            cookie_name: default_cookie_name(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub provider: ProviderSettings,
    #[serde(default)]
    pub github: GitHubSettings,
    #[serde(default)]
    pub agent: AgentSettings,
    #[serde(default)]
    pub auth: AuthSettings,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        Self::load_and_validate()
    }

    fn load_and_validate() -> Result<Self, ConfigError> {
        let config = Config::builder()
            .set_default("server.host", default_host())?
            .set_default("provider.host", default_provider_host())?
            .set_default("provider.model", default_model())?
            .add_source(File::with_name("orchestrator").required(false))
            .add_source(
                Environment::with_prefix("ORCHESTRATOR")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let settings: Self = match config.try_deserialize() {
            Ok(settings) => settings,
            Err(err) => {
                tracing::debug!("Configuration error: {:?}", &err);

                let error_str = err.to_string();
                if error_str.starts_with("missing field") {
                    let field = error_str
                        .trim_start_matches("missing field `")
                        .trim_end_matches('`');
                    return Err(ConfigError::MissingEnvVar {
                        env_var: to_env_var(field),
                    });
                } else if let config::ConfigError::NotFound(field) = &err {
                    return Err(ConfigError::MissingEnvVar {
                        env_var: to_env_var(field),
                    });
                }
                return Err(ConfigError::Other(err));
            }
        };

        if settings.provider.api_key.is_none() {
            return Err(ConfigError::MissingEnvVar {
                env_var: to_env_var("provider.api_key"),
            });
        }
        Ok(settings)
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3001
}

fn default_client_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_provider_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> i32 {
    1024
}

fn default_provider_timeout() -> u64 {
    60
}

fn default_github_api_url() -> String {
    "https://api.github.com".to_string()
}

fn default_github_timeout() -> u64 {
    30
}

fn default_max_retries() -> usize {
    2
}

fn default_max_iterations() -> usize {
    3
}

fn default_quality_threshold() -> f32 {
    0.8
}

fn default_true() -> bool {
    true
}

fn default_tool_timeout() -> u64 {
    30
}

fn default_request_timeout() -> u64 {
    120
}

fn default_cookie_name() -> String {
    "github_access_token".to_string()
}
