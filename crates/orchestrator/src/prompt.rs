//! Rendering of every prompt the agent sends. All functions are pure: the output
//! depends only on their arguments and the embedded templates.
use serde::Serialize;
use serde_json::Value;

use crate::context::PreFetchedContext;
use crate::errors::{AgentError, AgentResult};
use crate::github::channel::RemoteTool;
use crate::github::tools::PROXY_TOOL_NAME;
use crate::github::GitHubUser;
use crate::models::tool::Tool;
use crate::prompt_template::load_prompt_file;
use crate::providers::utils::ToolValidationError;
use crate::registry::{ToolRegistry, CREDENTIAL_KEY};

#[derive(Serialize)]
struct SystemPromptContext<'a> {
    user: Option<&'a GitHubUser>,
    remote_tools: Option<&'a [RemoteTool]>,
    direct_tools: Vec<Tool>,
    proxy_tool: &'static str,
    credential_key: &'static str,
}

fn render<T: Serialize>(template: &str, context: &T) -> AgentResult<String> {
    load_prompt_file(template, context).map_err(|e| AgentError::Internal(e.to_string()))
}

pub fn build_system_prompt(
    context: &PreFetchedContext,
    registry: &ToolRegistry,
) -> AgentResult<String> {
    render(
        "system.md",
        &SystemPromptContext {
            user: context.authenticated_user.as_ref(),
            remote_tools: context.available_github_tools.as_deref(),
            direct_tools: registry.tools(),
            proxy_tool: PROXY_TOOL_NAME,
            credential_key: CREDENTIAL_KEY,
        },
    )
}

#[derive(Serialize)]
struct FormatResultContext<'a> {
    prompt: &'a str,
    tool_name: &'a str,
    result: String,
}

/// Request for the tool-free pass that turns a raw tool result into an answer
pub fn format_result_prompt(prompt: &str, tool_name: &str, result: &Value) -> AgentResult<String> {
    let result = serde_json::to_string_pretty(result).map_err(|e| AgentError::Internal(e.to_string()))?;
    render(
        "format_result.md",
        &FormatResultContext {
            prompt,
            tool_name,
            result,
        },
    )
}

#[derive(Serialize)]
struct EvaluateContext<'a> {
    prompt: &'a str,
    response: &'a str,
}

pub fn evaluation_prompt(response: &str, prompt: &str) -> AgentResult<String> {
    render("evaluate.md", &EvaluateContext { prompt, response })
}

#[derive(Serialize)]
struct ToolRetryContext<'a> {
    error: &'a str,
    failed_generation: Option<&'a str>,
    proxy_tool: &'static str,
}

/// Corrective user message after the endpoint rejected a generated tool call
pub fn tool_retry_message(error: &ToolValidationError) -> AgentResult<String> {
    render(
        "tool_retry.md",
        &ToolRetryContext {
            error: &error.message,
            failed_generation: error.failed_generation.as_deref(),
            proxy_tool: PROXY_TOOL_NAME,
        },
    )
}

#[derive(Serialize)]
struct RefineContext {
    score: String,
}

/// Corrective user message when a candidate answer scored below the threshold
pub fn refine_message(score: f32) -> AgentResult<String> {
    render(
        "refine.md",
        &RefineContext {
            score: format!("{:.2}", score),
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ToolDefinition;
    use serde_json::json;

    fn registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        for (name, description) in [
            ("github_proxy", "Call any GitHub operation"),
            ("get_github_user", "Get the authenticated user"),
        ] {
            registry
                .register(ToolDefinition::new(
                    Tool::new(name, description, json!({"type": "object"})),
                    |_args: Value| async { Ok::<_, AgentError>(Value::Null) },
                ))
                .unwrap();
        }
        registry
    }

    fn full_context() -> PreFetchedContext {
        PreFetchedContext {
            authenticated_user: Some(GitHubUser {
                login: "alice".to_string(),
                id: 42,
                name: Some("Alice Liddell".to_string()),
                public_repos: Some(7),
            }),
            available_github_tools: Some(vec![RemoteTool {
                name: "list_issues".to_string(),
                description: "List issues in a repository".to_string(),
                input_schema: json!({"type": "object"}),
            }]),
        }
    }

    #[test]
    fn test_system_prompt_embeds_context() {
        let prompt = build_system_prompt(&full_context(), &registry()).unwrap();

        assert!(prompt.contains("## Authenticated User"));
        assert!(prompt.contains("- Username: alice"));
        assert!(prompt.contains("- ID: 42"));
        assert!(prompt.contains("- Name: Alice Liddell"));
        assert!(prompt.contains("- Public repositories: 7"));
        assert!(prompt.contains("- list_issues: List issues in a repository"));
        assert!(prompt.contains("- github_proxy: Call any GitHub operation"));
        assert!(prompt.contains("- get_github_user: Get the authenticated user"));
        assert!(prompt.contains("`githubToken` argument is injected automatically"));
        assert!(prompt.contains("`toolName`"));
        assert!(prompt.contains("`toolArgs`"));
    }

    #[test]
    fn test_system_prompt_without_identity() {
        let context = PreFetchedContext {
            authenticated_user: None,
            ..full_context()
        };
        let prompt = build_system_prompt(&context, &registry()).unwrap();

        assert!(!prompt.contains("Authenticated User"));
        assert!(prompt.contains("## GitHub Operations"));
        assert!(prompt.contains("## Rules"));
    }

    #[test]
    fn test_system_prompt_is_deterministic() {
        let first = build_system_prompt(&full_context(), &registry()).unwrap();
        let second = build_system_prompt(&full_context(), &registry()).unwrap();
        assert_eq!(first, second);

        let empty = build_system_prompt(&PreFetchedContext::default(), &registry()).unwrap();
        assert!(!empty.contains("## GitHub Operations"));
        assert!(empty.contains("## Direct Tools"));
    }

    #[test]
    fn test_format_result_prompt() {
        let prompt =
            format_result_prompt("list my repos", "search_repositories", &json!({"total_count": 2}))
                .unwrap();
        assert!(prompt.contains("list my repos"));
        assert!(prompt.contains("`search_repositories`"));
        assert!(prompt.contains("\"total_count\": 2"));
    }

    #[test]
    fn test_tool_retry_message() {
        let error = ToolValidationError {
            message: "tool call validation failed: missing toolName".to_string(),
            failed_generation: Some("{\"toolArgs\": {}}".to_string()),
        };
        let message = tool_retry_message(&error).unwrap();
        assert!(message.contains("rejected: tool call validation failed: missing toolName"));
        assert!(message.contains("{\"toolArgs\": {}}"));
        assert!(message.contains("github_proxy"));
    }

    #[test]
    fn test_refine_message_quotes_score() {
        let message = refine_message(0.55).unwrap();
        assert!(message.contains("scored 0.55 out of 1.0"));
    }
}
