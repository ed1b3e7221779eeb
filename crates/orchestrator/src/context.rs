use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;

use crate::github::channel::RemoteTool;
use crate::github::tools::PROXY_TOOL_NAME;
use crate::github::{GitHubUser, IdentityProvider};
use crate::registry::{ToolRegistry, CREDENTIAL_KEY};

/// What we learned about the caller before the first model call
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PreFetchedContext {
    pub authenticated_user: Option<GitHubUser>,
    pub available_github_tools: Option<Vec<RemoteTool>>,
}

/// Look up the caller's identity and the remotely available GitHub operations.
///
/// Runs once per request. Every failure is swallowed and leaves the matching field
/// empty; without a credential nothing is fetched at all. The tool listing gets the
/// same `tool_timeout` as any other tool call.
pub async fn prefetch(
    credential: Option<&str>,
    identity: &dyn IdentityProvider,
    registry: &ToolRegistry,
    tool_timeout: Duration,
) -> PreFetchedContext {
    let Some(credential) = credential else {
        return PreFetchedContext::default();
    };

    let authenticated_user = match identity.authenticated_user(credential).await {
        Ok(user) => {
            tracing::debug!(login = %user.login, "prefetched authenticated user");
            Some(user)
        }
        Err(e) => {
            tracing::warn!("could not prefetch authenticated user: {}", e);
            None
        }
    };

    let available_github_tools = match registry.lookup(PROXY_TOOL_NAME) {
        Some(proxy) => {
            let arguments = json!({ CREDENTIAL_KEY: credential, "listTools": true });
            match tokio::time::timeout(tool_timeout, proxy.handler.call(arguments)).await {
                Ok(Ok(result)) => Some(
                    result
                        .get("tools")
                        .cloned()
                        .and_then(|tools| serde_json::from_value(tools).ok())
                        .unwrap_or_default(),
                ),
                Ok(Err(e)) => {
                    tracing::warn!("could not prefetch remote GitHub tools: {}", e);
                    None
                }
                Err(_) => {
                    tracing::warn!(
                        timeout_ms = tool_timeout.as_millis() as u64,
                        "listing remote GitHub tools timed out"
                    );
                    None
                }
            }
        }
        None => None,
    };

    PreFetchedContext {
        authenticated_user,
        available_github_tools,
    }
}
