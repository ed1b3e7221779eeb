use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

pub const GITHUB_API_URL: &str = "https://api.github.com";

#[derive(Debug, Clone)]
pub struct GitHubConfig {
    pub api_url: String,
    pub timeout: Duration,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_url: GITHUB_API_URL.to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// The user a credential belongs to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GitHubUser {
    pub login: String,
    pub id: u64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub public_repos: Option<u64>,
}

/// Resolves a credential to the user it belongs to
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn authenticated_user(&self, credential: &str) -> Result<GitHubUser>;
}

/// Thin wrapper over the GitHub REST API. The credential is passed per call, the
/// client itself holds no user state.
pub struct GitHubClient {
    client: Client,
    config: GitHubConfig,
}

impl GitHubClient {
    pub fn new(config: GitHubConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("github-orchestrator/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { client, config })
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.config.api_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    fn authorized(&self, request: RequestBuilder, credential: &str) -> RequestBuilder {
        request
            .header("Authorization", format!("Bearer {}", credential))
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28")
    }

    pub async fn get(&self, credential: &str, path: &str, query: &[(&str, String)]) -> Result<Value> {
        let request = self.client.get(self.url(path)).query(query);
        self.send(self.authorized(request, credential)).await
    }

    pub async fn post(&self, credential: &str, path: &str, body: &Value) -> Result<Value> {
        let request = self.client.post(self.url(path)).json(body);
        self.send(self.authorized(request, credential)).await
    }

    pub async fn put(&self, credential: &str, path: &str, body: &Value) -> Result<Value> {
        let request = self.client.put(self.url(path)).json(body);
        self.send(self.authorized(request, credential)).await
    }

    async fn send(&self, request: RequestBuilder) -> Result<Value> {
        let response = request.send().await?;
        let status = response.status();

        if status.is_success() {
            if status == StatusCode::NO_CONTENT {
                return Ok(Value::Null);
            }
            return Ok(response.json().await?);
        }

        let body: Value = response.json().await.unwrap_or(Value::Null);
        let message = body
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("no message");
        Err(anyhow!("GitHub API error {}: {}", status, message))
    }
}

#[async_trait]
impl IdentityProvider for GitHubClient {
    async fn authenticated_user(&self, credential: &str) -> Result<GitHubUser> {
        let user = self.get(credential, "/user", &[]).await?;
        Ok(serde_json::from_value(user)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> GitHubClient {
        GitHubClient::new(GitHubConfig {
            api_url: server.uri(),
            ..GitHubConfig::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_authenticated_user() -> Result<()> {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/user"))
            .and(header("Authorization", "Bearer gho_test"))
            .and(header("Accept", "application/vnd.github+json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "login": "alice",
                "id": 42,
                "name": "Alice Liddell",
                "public_repos": 7,
                "followers": 3
            })))
            .mount(&mock_server)
            .await;

        let user = client_for(&mock_server).authenticated_user("gho_test").await?;
        assert_eq!(user.login, "alice");
        assert_eq!(user.id, 42);
        assert_eq!(user.name.as_deref(), Some("Alice Liddell"));
        assert_eq!(user.public_repos, Some(7));
        Ok(())
    }

    #[tokio::test]
    async fn test_error_status_carries_github_message() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/user"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "message": "Bad credentials"
            })))
            .mount(&mock_server)
            .await;

        let err = client_for(&mock_server)
            .authenticated_user("expired")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("401"));
        assert!(err.to_string().contains("Bad credentials"));
    }

    #[tokio::test]
    async fn test_get_with_query() -> Result<()> {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search/repositories"))
            .and(query_param("q", "user:alice"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "total_count": 1,
                "items": [{"full_name": "alice/wonderland"}]
            })))
            .mount(&mock_server)
            .await;

        let result = client_for(&mock_server)
            .get("t", "search/repositories", &[("q", "user:alice".to_string())])
            .await?;
        assert_eq!(result["items"][0]["full_name"], "alice/wonderland");
        Ok(())
    }
}
