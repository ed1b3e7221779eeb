use async_trait::async_trait;
use indoc::indoc;
use serde_json::{json, Value};
use std::sync::Arc;

use super::channel::RemoteToolChannel;
use super::client::{GitHubClient, IdentityProvider};
use crate::errors::{AgentError, AgentResult};
use crate::models::tool::Tool;
use crate::registry::{ToolDefinition, ToolHandler, ToolRegistry, CREDENTIAL_KEY};

pub const PROXY_TOOL_NAME: &str = "github_proxy";

const README_PROMPT: &str = indoc! {"
    Analyze this project structure and generate README content with:

    1. Project title and 3-4 line description
    2. Key features (3-5 bullet points)
    3. Tech stack used
    4. Usage example
    5. Project structure overview

    Return ONLY the markdown content, no additional text. Be concise and developer-friendly."
};

const DISCOVERY_GUIDANCE: &str = "Before asking the user for repository information, \
discover the owner with get_github_user and the repository with github_proxy, then ask the \
user to confirm the values instead of providing them from scratch.";

/// Register every GitHub tool the model may call
pub fn register_github_tools(
    registry: &mut ToolRegistry,
    client: Arc<GitHubClient>,
    channel: Arc<dyn RemoteToolChannel>,
) -> AgentResult<()> {
    registry.register(ToolDefinition::new(
        Tool::new(
            PROXY_TOOL_NAME,
            "Call any GitHub operation by name. Pass the operation as `toolName` and its \
            arguments as `toolArgs`. Set `listTools` to true to discover the available operations.",
            json!({
                "type": "object",
                "properties": {
                    "toolName": {"type": "string", "description": "Name of the GitHub operation"},
                    "toolArgs": {"type": "object", "description": "Arguments for the operation"},
                    "listTools": {"type": "boolean", "description": "List the available operations instead"}
                }
            }),
        ),
        ProxyTool {
            channel: channel.clone(),
        },
    ))?;

    registry.register(ToolDefinition::new(
        Tool::new(
            "get_github_user",
            "Get the profile of the authenticated GitHub user",
            json!({"type": "object", "properties": {}}),
        ),
        UserTool {
            client: client.clone(),
        },
    ))?;

    registry.register(ToolDefinition::new(
        Tool::new(
            "github_search_repositories",
            "Fetch all repositories for the authenticated GitHub user",
            json!({"type": "object", "properties": {}}),
        ),
        RepositoriesTool {
            client: client.clone(),
            channel: channel.clone(),
        },
    ))?;

    registry.register(ToolDefinition::new(
        Tool::new(
            "github_get_file_contents",
            "Get contents of a file or directory in a repository",
            json!({
                "type": "object",
                "properties": {
                    "owner": {"type": "string", "description": "Owner of the repository"},
                    "repo": {"type": "string", "description": "Name of the repository"},
                    "path": {"type": "string", "description": "Path to file/directory"}
                },
                "required": ["owner", "repo", "path"]
            }),
        ),
        FileContentsTool {
            channel: channel.clone(),
        },
    ))?;

    registry.register(ToolDefinition::new(
        Tool::new(
            "generate_readme",
            format!(
                "Analyze repository structure and generate README.md content. Returns the \
                structure and instructions to create the file using github_proxy. {}",
                DISCOVERY_GUIDANCE
            ),
            json!({
                "type": "object",
                "properties": {
                    "owner": {"type": "string", "description": "Repository owner"},
                    "repo": {"type": "string", "description": "Repository name"},
                    "branch": {"type": "string", "description": "Branch name (default: main)"}
                }
            }),
        ),
        ReadmeTool { channel },
    ))?;

    Ok(())
}

/// The injected credential, which every GitHub tool needs
pub fn credential(arguments: &Value) -> AgentResult<&str> {
    arguments
        .get(CREDENTIAL_KEY)
        .and_then(|c| c.as_str())
        .filter(|c| !c.is_empty())
        .ok_or_else(|| AgentError::MissingCredential("GitHub token is required".to_string()))
}

fn execution_error(err: anyhow::Error) -> AgentError {
    AgentError::ExecutionError(err.to_string())
}

struct ProxyTool {
    channel: Arc<dyn RemoteToolChannel>,
}

#[async_trait]
impl ToolHandler for ProxyTool {
    async fn call(&self, arguments: Value) -> AgentResult<Value> {
        let credential = credential(&arguments)?;

        if arguments.get("listTools").and_then(|l| l.as_bool()).unwrap_or(false) {
            let tools = self.channel.list_tools(credential).await?;
            return Ok(json!({ "tools": tools }));
        }

        let tool_name = arguments
            .get("toolName")
            .and_then(|n| n.as_str())
            .ok_or_else(|| {
                AgentError::InvalidParameters(
                    "either listTools or toolName must be provided".to_string(),
                )
            })?;
        let tool_args = arguments.get("toolArgs").cloned().unwrap_or_else(|| json!({}));

        self.channel.call_tool(credential, tool_name, tool_args).await
    }
}

struct UserTool {
    client: Arc<GitHubClient>,
}

#[async_trait]
impl ToolHandler for UserTool {
    async fn call(&self, arguments: Value) -> AgentResult<Value> {
        let user = self
            .client
            .authenticated_user(credential(&arguments)?)
            .await
            .map_err(execution_error)?;
        serde_json::to_value(user).map_err(|e| AgentError::Internal(e.to_string()))
    }
}

const REPOSITORY_PAGE_SIZE: usize = 100;
// Repository search serves at most 1000 results
const MAX_REPOSITORY_PAGES: usize = 10;

/// Searches `user:<login>` page by page and merges the items into a single result
struct RepositoriesTool {
    client: Arc<GitHubClient>,
    channel: Arc<dyn RemoteToolChannel>,
}

#[async_trait]
impl ToolHandler for RepositoriesTool {
    async fn call(&self, arguments: Value) -> AgentResult<Value> {
        let credential = credential(&arguments)?;
        let user = self
            .client
            .authenticated_user(credential)
            .await
            .map_err(execution_error)?;
        let query = format!("user:{}", user.login);

        let mut items = Vec::new();
        let mut total_count = 0;
        for page in 1..=MAX_REPOSITORY_PAGES {
            let result = self
                .channel
                .call_tool(
                    credential,
                    "search_repositories",
                    json!({"query": query, "page": page, "perPage": REPOSITORY_PAGE_SIZE}),
                )
                .await?;
            total_count = result["total_count"].as_u64().unwrap_or_default();
            let page_items = match result.get("items") {
                Some(Value::Array(page_items)) => page_items.clone(),
                _ => Vec::new(),
            };
            let fetched = page_items.len();
            items.extend(page_items);

            if fetched < REPOSITORY_PAGE_SIZE || items.len() as u64 >= total_count {
                break;
            }
        }
        tracing::debug!(login = %user.login, repositories = items.len(), "fetched repositories");

        Ok(json!({"total_count": total_count, "items": items}))
    }
}

struct FileContentsTool {
    channel: Arc<dyn RemoteToolChannel>,
}

#[async_trait]
impl ToolHandler for FileContentsTool {
    async fn call(&self, arguments: Value) -> AgentResult<Value> {
        let credential = credential(&arguments)?;
        let forwarded = json!({
            "owner": arguments.get("owner"),
            "repo": arguments.get("repo"),
            "path": arguments.get("path"),
        });
        self.channel
            .call_tool(credential, "get_file_contents", forwarded)
            .await
    }
}

struct ReadmeTool {
    channel: Arc<dyn RemoteToolChannel>,
}

#[async_trait]
impl ToolHandler for ReadmeTool {
    async fn call(&self, arguments: Value) -> AgentResult<Value> {
        let owner = arguments.get("owner").and_then(|o| o.as_str());
        let repo = arguments.get("repo").and_then(|r| r.as_str());
        let (Some(owner), Some(repo)) = (owner, repo) else {
            return Err(AgentError::InvalidParameters(
                "Owner and repo are required. Use available tools to discover these values \
                before calling this tool."
                    .to_string(),
            ));
        };
        let branch = arguments
            .get("branch")
            .and_then(|b| b.as_str())
            .unwrap_or("main");

        let listing = self
            .channel
            .call_tool(
                credential(&arguments)?,
                "get_file_contents",
                json!({"owner": owner, "repo": repo, "path": "", "branch": branch}),
            )
            .await?;
        let structure = serde_json::to_string_pretty(&listing)
            .map_err(|e| AgentError::Internal(e.to_string()))?;

        Ok(json!({
            "structure": structure,
            "instructions": format!(
                "{}\n\nUse the {} tool with create_or_update_file to create README.md in {}/{} on branch {} with this content.",
                README_PROMPT, PROXY_TOOL_NAME, owner, repo, branch
            ),
        }))
    }
}
