use async_trait::async_trait;
use base64::Engine;
use indoc::indoc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

use super::client::{GitHubClient, IdentityProvider};
use crate::errors::{AgentError, AgentResult};

/// A GitHub operation reachable through the proxy tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteTool {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

impl RemoteTool {
    fn new(name: &str, description: &str, input_schema: Value) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            input_schema,
        }
    }
}

/// The secondary channel that discovers and invokes GitHub operations by name
#[async_trait]
pub trait RemoteToolChannel: Send + Sync {
    async fn list_tools(&self, credential: &str) -> AgentResult<Vec<RemoteTool>>;

    async fn call_tool(&self, credential: &str, name: &str, arguments: Value) -> AgentResult<Value>;
}

/// Serves a fixed catalog of GitHub operations over the REST API
pub struct RestToolChannel {
    client: Arc<GitHubClient>,
    catalog: Vec<RemoteTool>,
}

impl RestToolChannel {
    pub fn new(client: Arc<GitHubClient>) -> Self {
        Self {
            client,
            catalog: catalog(),
        }
    }

    async fn search_repositories(&self, credential: &str, args: &Value) -> AgentResult<Value> {
        let mut query = str_arg(args, "query")?.to_string();
        if query.contains("@me") {
            let user = self
                .client
                .authenticated_user(credential)
                .await
                .map_err(execution_error)?;
            query = query.replace("@me", &user.login);
        }

        let mut params = vec![("q", query)];
        if let Some(page) = args.get("page").and_then(|p| p.as_u64()) {
            params.push(("page", page.to_string()));
        }
        if let Some(per_page) = args.get("perPage").and_then(|p| p.as_u64()) {
            params.push(("per_page", per_page.to_string()));
        }

        self.client
            .get(credential, "/search/repositories", &params)
            .await
            .map_err(execution_error)
    }

    async fn get_file_contents(&self, credential: &str, args: &Value) -> AgentResult<Value> {
        let path = format!(
            "/repos/{}/{}/contents/{}",
            segment(str_arg(args, "owner")?),
            segment(str_arg(args, "repo")?),
            encode_path(opt_str_arg(args, "path").unwrap_or_default())
        );
        let mut params = Vec::new();
        if let Some(branch) = opt_str_arg(args, "branch") {
            params.push(("ref", branch.to_string()));
        }

        self.client
            .get(credential, &path, &params)
            .await
            .map_err(execution_error)
    }

    async fn list_issues(&self, credential: &str, args: &Value) -> AgentResult<Value> {
        let path = format!("{}/issues", repo_path(args)?);
        let params = vec![("state", opt_str_arg(args, "state").unwrap_or("open").to_string())];

        self.client
            .get(credential, &path, &params)
            .await
            .map_err(execution_error)
    }

    async fn get_issue(&self, credential: &str, args: &Value) -> AgentResult<Value> {
        let number = args
            .get("issue_number")
            .and_then(|n| n.as_u64())
            .ok_or_else(|| {
                AgentError::InvalidParameters("issue_number must be a positive integer".to_string())
            })?;
        let path = format!("{}/issues/{}", repo_path(args)?, number);

        self.client
            .get(credential, &path, &[])
            .await
            .map_err(execution_error)
    }

    async fn create_issue(&self, credential: &str, args: &Value) -> AgentResult<Value> {
        let path = format!("{}/issues", repo_path(args)?);
        let mut body = json!({ "title": str_arg(args, "title")? });
        if let Some(text) = opt_str_arg(args, "body") {
            body["body"] = json!(text);
        }

        self.client
            .post(credential, &path, &body)
            .await
            .map_err(execution_error)
    }

    async fn list_pull_requests(&self, credential: &str, args: &Value) -> AgentResult<Value> {
        let path = format!("{}/pulls", repo_path(args)?);
        let params = vec![("state", opt_str_arg(args, "state").unwrap_or("open").to_string())];

        self.client
            .get(credential, &path, &params)
            .await
            .map_err(execution_error)
    }

    async fn list_commits(&self, credential: &str, args: &Value) -> AgentResult<Value> {
        let path = format!("{}/commits", repo_path(args)?);
        let mut params = Vec::new();
        if let Some(sha) = opt_str_arg(args, "sha") {
            params.push(("sha", sha.to_string()));
        }

        self.client
            .get(credential, &path, &params)
            .await
            .map_err(execution_error)
    }

    async fn create_or_update_file(&self, credential: &str, args: &Value) -> AgentResult<Value> {
        let path = format!(
            "{}/contents/{}",
            repo_path(args)?,
            encode_path(str_arg(args, "path")?)
        );
        let content = base64::engine::general_purpose::STANDARD.encode(str_arg(args, "content")?);
        let mut body = json!({
            "message": str_arg(args, "message")?,
            "content": content,
        });
        if let Some(branch) = opt_str_arg(args, "branch") {
            body["branch"] = json!(branch);
        }
        if let Some(sha) = opt_str_arg(args, "sha") {
            body["sha"] = json!(sha);
        }

        self.client
            .put(credential, &path, &body)
            .await
            .map_err(execution_error)
    }
}

#[async_trait]
impl RemoteToolChannel for RestToolChannel {
    async fn list_tools(&self, _credential: &str) -> AgentResult<Vec<RemoteTool>> {
        Ok(self.catalog.clone())
    }

    async fn call_tool(&self, credential: &str, name: &str, arguments: Value) -> AgentResult<Value> {
        tracing::debug!(tool = name, "calling remote GitHub tool");
        match name {
            "search_repositories" => self.search_repositories(credential, &arguments).await,
            "get_file_contents" => self.get_file_contents(credential, &arguments).await,
            "list_issues" => self.list_issues(credential, &arguments).await,
            "get_issue" => self.get_issue(credential, &arguments).await,
            "create_issue" => self.create_issue(credential, &arguments).await,
            "list_pull_requests" => self.list_pull_requests(credential, &arguments).await,
            "list_commits" => self.list_commits(credential, &arguments).await,
            "create_or_update_file" => self.create_or_update_file(credential, &arguments).await,
            _ => Err(AgentError::ToolNotFound(name.to_string())),
        }
    }
}

fn execution_error(err: anyhow::Error) -> AgentError {
    AgentError::ExecutionError(err.to_string())
}

fn str_arg<'a>(args: &'a Value, key: &str) -> AgentResult<&'a str> {
    opt_str_arg(args, key)
        .ok_or_else(|| AgentError::InvalidParameters(format!("'{}' is required", key)))
}

fn opt_str_arg<'a>(args: &'a Value, key: &str) -> Option<&'a str> {
    args.get(key).and_then(|v| v.as_str())
}

fn segment(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}

fn encode_path(path: &str) -> String {
    path.trim_matches('/')
        .split('/')
        .map(segment)
        .collect::<Vec<_>>()
        .join("/")
}

fn repo_path(args: &Value) -> AgentResult<String> {
    Ok(format!(
        "/repos/{}/{}",
        segment(str_arg(args, "owner")?),
        segment(str_arg(args, "repo")?)
    ))
}

fn repo_schema(extra: Value, required: &[&str]) -> Value {
    let mut properties = json!({
        "owner": {"type": "string", "description": "Repository owner"},
        "repo": {"type": "string", "description": "Repository name"}
    });
    if let (Some(base), Some(extra)) = (properties.as_object_mut(), extra.as_object()) {
        base.extend(extra.clone());
    }
    let mut all_required = vec!["owner", "repo"];
    all_required.extend_from_slice(required);
    json!({
        "type": "object",
        "properties": properties,
        "required": all_required
    })
}

fn catalog() -> Vec<RemoteTool> {
    vec![
        RemoteTool::new(
            "search_repositories",
            indoc! {"
                Search for GitHub repositories. Use the query `user:<login>` to list the
                repositories of a user."
            },
            json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string", "description": "GitHub search query"},
                    "page": {"type": "integer"},
                    "perPage": {"type": "integer"}
                },
                "required": ["query"]
            }),
        ),
        RemoteTool::new(
            "get_file_contents",
            "Get the contents of a file or directory from a GitHub repository",
            repo_schema(
                json!({
                    "path": {"type": "string", "description": "Path to the file or directory"},
                    "branch": {"type": "string"}
                }),
                &[],
            ),
        ),
        RemoteTool::new(
            "list_issues",
            "List issues in a GitHub repository",
            repo_schema(json!({"state": {"type": "string", "enum": ["open", "closed", "all"]}}), &[]),
        ),
        RemoteTool::new(
            "get_issue",
            "Get the details of a single issue",
            repo_schema(json!({"issue_number": {"type": "integer"}}), &["issue_number"]),
        ),
        RemoteTool::new(
            "create_issue",
            "Create a new issue in a GitHub repository",
            repo_schema(
                json!({"title": {"type": "string"}, "body": {"type": "string"}}),
                &["title"],
            ),
        ),
        RemoteTool::new(
            "list_pull_requests",
            "List pull requests in a GitHub repository",
            repo_schema(json!({"state": {"type": "string", "enum": ["open", "closed", "all"]}}), &[]),
        ),
        RemoteTool::new(
            "list_commits",
            "List commits of a branch in a GitHub repository",
            repo_schema(json!({"sha": {"type": "string", "description": "Branch name or commit SHA"}}), &[]),
        ),
        RemoteTool::new(
            "create_or_update_file",
            "Create or update a single file in a GitHub repository",
            repo_schema(
                json!({
                    "path": {"type": "string"},
                    "content": {"type": "string", "description": "Plain text file content"},
                    "message": {"type": "string", "description": "Commit message"},
                    "branch": {"type": "string"},
                    "sha": {"type": "string", "description": "Blob SHA of the file being replaced"}
                }),
                &["path", "content", "message"],
            ),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::github::client::GitHubConfig;
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn channel_for(server: &MockServer) -> RestToolChannel {
        let client = GitHubClient::new(GitHubConfig {
            api_url: server.uri(),
            ..GitHubConfig::default()
        })
        .unwrap();
        RestToolChannel::new(Arc::new(client))
    }

    #[tokio::test]
    async fn test_list_tools_returns_catalog() {
        let server = MockServer::start().await;
        let tools = channel_for(&server).list_tools("t").await.unwrap();

        let names: Vec<&str> = tools.iter().map(|t| t.name.as_str()).collect();
        assert!(names.contains(&"search_repositories"));
        assert!(names.contains(&"create_or_update_file"));
        assert_eq!(tools[0].input_schema["required"][0], "query");
    }

    #[tokio::test]
    async fn test_search_repositories_resolves_me() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/user"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"login": "alice", "id": 1})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/search/repositories"))
            .and(query_param("q", "user:alice"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"total_count": 0, "items": []})))
            .expect(1)
            .mount(&server)
            .await;

        let result = channel_for(&server)
            .call_tool("t", "search_repositories", json!({"query": "user:@me"}))
            .await
            .unwrap();
        assert_eq!(result["total_count"], 0);
    }

    #[tokio::test]
    async fn test_get_file_contents_encodes_path() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/alice/wonderland/contents/docs/read%20me.md"))
            .and(query_param("ref", "dev"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"name": "read me.md"})))
            .mount(&server)
            .await;

        let result = channel_for(&server)
            .call_tool(
                "t",
                "get_file_contents",
                json!({"owner": "alice", "repo": "wonderland", "path": "docs/read me.md", "branch": "dev"}),
            )
            .await
            .unwrap();
        assert_eq!(result["name"], "read me.md");
    }

    #[tokio::test]
    async fn test_create_or_update_file_encodes_content() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/repos/alice/wonderland/contents/README.md"))
            .and(body_partial_json(json!({
                "message": "Add README",
                "content": "IyBXb25kZXJsYW5k",
                "branch": "main"
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"content": {"path": "README.md"}})))
            .mount(&server)
            .await;

        let result = channel_for(&server)
            .call_tool(
                "t",
                "create_or_update_file",
                json!({
                    "owner": "alice",
                    "repo": "wonderland",
                    "path": "README.md",
                    "content": "# Wonderland",
                    "message": "Add README",
                    "branch": "main"
                }),
            )
            .await
            .unwrap();
        assert_eq!(result["content"]["path"], "README.md");
    }

    #[tokio::test]
    async fn test_unknown_tool_and_missing_argument() {
        let server = MockServer::start().await;
        let channel = channel_for(&server);

        let err = channel.call_tool("t", "delete_everything", json!({})).await.unwrap_err();
        assert_eq!(err, AgentError::ToolNotFound("delete_everything".to_string()));

        let err = channel.call_tool("t", "list_issues", json!({"owner": "alice"})).await.unwrap_err();
        assert_eq!(err, AgentError::InvalidParameters("'repo' is required".to_string()));
    }

    #[tokio::test]
    async fn test_remote_failure_is_execution_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/alice/wonderland/issues"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({"message": "Not Found"})))
            .mount(&server)
            .await;

        let err = channel_for(&server)
            .call_tool("t", "list_issues", json!({"owner": "alice", "repo": "wonderland"}))
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::ExecutionError(ref msg) if msg.contains("Not Found")));
    }
}
