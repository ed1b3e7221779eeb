use anyhow::{anyhow, Result};
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{json, Value};

use crate::errors::AgentError;
use crate::models::message::{Message, MessageContent, RawToolCall};
use crate::models::role::Role;
use crate::models::tool::{Tool, ToolCall};

lazy_static! {
    static ref INVALID_NAME_CHARS: Regex = Regex::new(r"[^a-zA-Z0-9_-]").unwrap();
    static ref VALID_NAME: Regex = Regex::new(r"^[a-zA-Z0-9_-]+$").unwrap();
}

/// Convert internal Message format to the OpenAI chat completions message specification
pub fn messages_to_openai_spec(messages: &[Message]) -> Vec<Value> {
    let mut messages_spec = Vec::new();

    for message in messages {
        let mut converted = json!({
            "role": message.role
        });

        let mut output = Vec::new();

        for content in &message.content {
            match content {
                MessageContent::Text(text) => {
                    if !text.text.is_empty() {
                        converted["content"] = json!(text.text);
                    }
                }
                MessageContent::ToolRequest(request) => {
                    // Unparseable calls go back verbatim so their tool reply has a matching id
                    let call = match (&request.tool_call, &request.raw) {
                        (Ok(tool_call), _) => {
                            Some((tool_call.name.as_str(), tool_call.arguments.to_string()))
                        }
                        (Err(_), Some(raw)) => Some((raw.name.as_str(), raw.arguments.clone())),
                        (Err(_), None) => None,
                    };
                    if let Some((name, arguments)) = call {
                        if let Some(object) = converted.as_object_mut() {
                            let tool_calls = object.entry("tool_calls").or_insert(json!([]));
                            if let Some(array) = tool_calls.as_array_mut() {
                                array.push(json!({
                                    "id": request.id,
                                    "type": "function",
                                    "function": {
                                        "name": sanitize_function_name(name),
                                        "arguments": arguments,
                                    }
                                }));
                            }
                        }
                    }
                }
                MessageContent::ToolResponse(response) => {
                    // Errors are shown as output so the model can react to them
                    let content = match &response.tool_result {
                        Ok(result) => result.to_string(),
                        Err(e) => json!({"error": e.message()}).to_string(),
                    };
                    output.push(json!({
                        "role": "tool",
                        "content": content,
                        "tool_call_id": response.id
                    }));
                }
            }
        }

        if converted.get("content").is_some() || converted.get("tool_calls").is_some() {
            output.insert(0, converted);
        }
        messages_spec.extend(output);
    }

    messages_spec
}

/// Convert internal Tool format to the OpenAI tool specification
pub fn tools_to_openai_spec(tools: &[Tool]) -> Result<Vec<Value>> {
    let mut tool_names = std::collections::HashSet::new();
    let mut result = Vec::new();

    for tool in tools {
        if !tool_names.insert(&tool.name) {
            return Err(anyhow!("Duplicate tool name: {}", tool.name));
        }

        result.push(json!({
            "type": "function",
            "function": {
                "name": tool.name,
                "description": tool.description,
                "parameters": tool.input_schema,
            }
        }));
    }

    Ok(result)
}

/// Convert an OpenAI-compatible response to internal Message format
pub fn openai_response_to_message(response: Value) -> Result<Message> {
    let original = response["choices"][0]["message"].clone();
    let mut content = Vec::new();

    if let Some(text) = original.get("content") {
        if let Some(text_str) = text.as_str() {
            content.push(MessageContent::text(text_str));
        }
    }

    if let Some(tool_calls) = original.get("tool_calls") {
        if let Some(tool_calls_array) = tool_calls.as_array() {
            for tool_call in tool_calls_array {
                let id = tool_call["id"].as_str().unwrap_or_default().to_string();
                let function_name = tool_call["function"]["name"]
                    .as_str()
                    .unwrap_or_default()
                    .to_string();
                let arguments = tool_call["function"]["arguments"]
                    .as_str()
                    .unwrap_or_default()
                    .to_string();

                if !is_valid_function_name(&function_name) {
                    let error = AgentError::ToolNotFound(format!(
                        "The provided function name '{}' had invalid characters, it must match this regex [a-zA-Z0-9_-]+",
                        function_name
                    ));
                    let raw = RawToolCall {
                        name: function_name,
                        arguments,
                    };
                    content.push(MessageContent::unparsed_tool_request(id, raw, error));
                    continue;
                }

                // Some endpoints send an empty string for a call with no arguments
                let arguments = if arguments.trim().is_empty() {
                    "{}".to_string()
                } else {
                    arguments
                };

                match serde_json::from_str::<Value>(&arguments) {
                    Ok(params) => {
                        content.push(MessageContent::tool_request(
                            id,
                            Ok(ToolCall::new(&function_name, params)),
                        ));
                    }
                    Err(e) => {
                        let error = AgentError::InvalidParameters(format!(
                            "Could not interpret tool use parameters for id {}: {}",
                            id, e
                        ));
                        let raw = RawToolCall {
                            name: function_name,
                            arguments,
                        };
                        content.push(MessageContent::unparsed_tool_request(id, raw, error));
                    }
                }
            }
        }
    }

    Ok(Message {
        role: Role::Assistant,
        created: chrono::Utc::now().timestamp(),
        content,
    })
}

fn sanitize_function_name(name: &str) -> String {
    INVALID_NAME_CHARS.replace_all(name, "_").to_string()
}

fn is_valid_function_name(name: &str) -> bool {
    VALID_NAME.is_match(name)
}

/// The endpoint refused a tool call the model generated, usually because its
/// arguments did not match the declared schema
#[derive(Debug, thiserror::Error)]
#[error("Tool call validation failed: {message}")]
pub struct ToolValidationError {
    pub message: String,
    pub failed_generation: Option<String>,
}

pub fn check_tool_validation_error(error: &Value) -> Option<ToolValidationError> {
    let message = error
        .get("message")
        .and_then(|m| m.as_str())
        .unwrap_or_default();
    let code = error.get("code").and_then(|c| c.as_str()).unwrap_or_default();

    let is_validation = code == "tool_use_failed"
        || message.to_lowercase().contains("tool call validation failed");
    if !is_validation {
        return None;
    }

    Some(ToolValidationError {
        message: message.to_string(),
        failed_generation: error
            .get("failed_generation")
            .and_then(|g| g.as_str())
            .map(String::from),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const OPENAI_TOOL_USE_RESPONSE: &str = r#"{
        "choices": [{
            "role": "assistant",
            "message": {
                "tool_calls": [{
                    "id": "1",
                    "function": {
                        "name": "example_fn",
                        "arguments": "{\"param\": \"value\"}"
                    }
                }]
            }
        }]
    }"#;

    #[test]
    fn test_messages_to_openai_spec() {
        let message = Message::user().with_text("Hello");
        let spec = messages_to_openai_spec(&[message]);

        assert_eq!(spec.len(), 1);
        assert_eq!(spec[0]["role"], "user");
        assert_eq!(spec[0]["content"], "Hello");
    }

    #[test]
    fn test_messages_to_openai_spec_tool_round() {
        let messages = vec![
            Message::user().with_text("How are you?"),
            Message::assistant()
                .with_tool_request("tc_0", Ok(ToolCall::new("example", json!({"a": 1}))))
                .with_tool_request("tc_1", Ok(ToolCall::new("example", json!({"a": 2})))),
            Message::user()
                .with_tool_response("tc_0", Ok(json!({"ok": true})))
                .with_tool_response(
                    "tc_1",
                    Err(AgentError::ExecutionError("rate limited".to_string())),
                ),
        ];

        let spec = messages_to_openai_spec(&messages);

        assert_eq!(spec.len(), 4);
        assert_eq!(spec[1]["role"], "assistant");
        assert_eq!(spec[1]["tool_calls"][1]["id"], "tc_1");
        assert_eq!(spec[1]["tool_calls"][0]["function"]["arguments"], "{\"a\":1}");
        assert_eq!(spec[2]["role"], "tool");
        assert_eq!(spec[2]["tool_call_id"], "tc_0");
        assert_eq!(spec[2]["content"], "{\"ok\":true}");
        assert_eq!(spec[3]["tool_call_id"], "tc_1");
        assert_eq!(spec[3]["content"], "{\"error\":\"rate limited\"}");
    }

    #[test]
    fn test_tools_to_openai_spec() -> Result<()> {
        let tool = Tool::new(
            "test_tool",
            "A test tool",
            json!({
                "type": "object",
                "properties": {
                    "input": {"type": "string", "description": "Test parameter"}
                },
                "required": ["input"]
            }),
        );

        let spec = tools_to_openai_spec(&[tool])?;

        assert_eq!(spec.len(), 1);
        assert_eq!(spec[0]["type"], "function");
        assert_eq!(spec[0]["function"]["name"], "test_tool");
        assert_eq!(spec[0]["function"]["parameters"]["required"][0], "input");
        Ok(())
    }

    #[test]
    fn test_tools_to_openai_spec_duplicate() {
        let tool = Tool::new("test_tool", "Test tool", json!({"type": "object"}));
        let result = tools_to_openai_spec(&[tool.clone(), tool]);
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Duplicate tool name"));
    }

    #[test]
    fn test_sanitize_function_name() {
        assert_eq!(sanitize_function_name("hello-world"), "hello-world");
        assert_eq!(sanitize_function_name("hello world"), "hello_world");
        assert_eq!(sanitize_function_name("hello@world"), "hello_world");
    }

    #[test]
    fn test_openai_response_to_message_text() -> Result<()> {
        let response = json!({
            "choices": [{
                "message": {"content": "Hello there"}
            }]
        });

        let message = openai_response_to_message(response)?;
        assert_eq!(message.content.len(), 1);
        assert_eq!(message.text(), "Hello there");
        assert_eq!(message.role, Role::Assistant);
        Ok(())
    }

    #[test]
    fn test_openai_response_to_message_valid_toolrequest() -> Result<()> {
        let response: Value = serde_json::from_str(OPENAI_TOOL_USE_RESPONSE)?;
        let message = openai_response_to_message(response)?;

        assert_eq!(message.content.len(), 1);
        let request = message.tool_requests()[0];
        let tool_call = request.tool_call.as_ref().unwrap();
        assert_eq!(tool_call.name, "example_fn");
        assert_eq!(tool_call.arguments, json!({"param": "value"}));
        Ok(())
    }

    #[test]
    fn test_openai_response_to_message_empty_arguments() -> Result<()> {
        let mut response: Value = serde_json::from_str(OPENAI_TOOL_USE_RESPONSE)?;
        response["choices"][0]["message"]["tool_calls"][0]["function"]["arguments"] = json!("");

        let message = openai_response_to_message(response)?;
        let tool_call = message.tool_requests()[0].tool_call.clone().unwrap();
        assert_eq!(tool_call.arguments, json!({}));
        Ok(())
    }

    #[test]
    fn test_openai_response_to_message_invalid_func_name() -> Result<()> {
        let mut response: Value = serde_json::from_str(OPENAI_TOOL_USE_RESPONSE)?;
        response["choices"][0]["message"]["tool_calls"][0]["function"]["name"] =
            json!("invalid fn");

        let message = openai_response_to_message(response)?;

        match &message.tool_requests()[0].tool_call {
            Err(AgentError::ToolNotFound(msg)) => {
                assert!(msg.starts_with("The provided function name"));
            }
            _ => panic!("Expected ToolNotFound error"),
        }
        Ok(())
    }

    #[test]
    fn test_openai_response_to_message_json_decode_error() -> Result<()> {
        let mut response: Value = serde_json::from_str(OPENAI_TOOL_USE_RESPONSE)?;
        response["choices"][0]["message"]["tool_calls"][0]["function"]["arguments"] =
            json!("invalid json {");

        let message = openai_response_to_message(response)?;

        match &message.tool_requests()[0].tool_call {
            Err(AgentError::InvalidParameters(msg)) => {
                assert!(msg.starts_with("Could not interpret tool use parameters"));
            }
            _ => panic!("Expected InvalidParameters error"),
        }
        Ok(())
    }

    #[test]
    fn test_malformed_call_is_sent_back_before_its_tool_reply() -> Result<()> {
        let mut response: Value = serde_json::from_str(OPENAI_TOOL_USE_RESPONSE)?;
        response["choices"][0]["message"]["tool_calls"][0]["id"] = json!("tc_0");
        response["choices"][0]["message"]["tool_calls"][0]["function"]["arguments"] =
            json!("{\"param\": ");

        let assistant = openai_response_to_message(response)?;
        let error = assistant.tool_requests()[0].tool_call.clone().unwrap_err();
        let messages = vec![
            Message::user().with_text("list my repos"),
            assistant,
            Message::user().with_tool_response("tc_0", Err(error)),
        ];

        let spec = messages_to_openai_spec(&messages);

        assert_eq!(spec.len(), 3);
        assert_eq!(spec[1]["role"], "assistant");
        assert_eq!(spec[1]["tool_calls"][0]["id"], "tc_0");
        assert_eq!(spec[1]["tool_calls"][0]["function"]["name"], "example_fn");
        assert_eq!(spec[1]["tool_calls"][0]["function"]["arguments"], "{\"param\": ");
        assert_eq!(spec[2]["role"], "tool");
        assert_eq!(spec[2]["tool_call_id"], "tc_0");
        Ok(())
    }

    #[test]
    fn test_invalid_function_name_is_sent_back_sanitized() -> Result<()> {
        let mut response: Value = serde_json::from_str(OPENAI_TOOL_USE_RESPONSE)?;
        response["choices"][0]["message"]["tool_calls"][0]["function"]["name"] =
            json!("example fn");

        let spec = messages_to_openai_spec(&[openai_response_to_message(response)?]);

        assert_eq!(spec[0]["tool_calls"][0]["id"], "1");
        assert_eq!(spec[0]["tool_calls"][0]["function"]["name"], "example_fn");
        assert_eq!(
            spec[0]["tool_calls"][0]["function"]["arguments"],
            "{\"param\": \"value\"}"
        );
        Ok(())
    }

    #[test]
    fn test_check_tool_validation_error() {
        let error = json!({
            "message": "tool call validation failed: parameters for tool github_proxy did not match schema",
            "type": "invalid_request_error",
            "code": "tool_use_failed",
            "failed_generation": "<function=github_proxy>{\"toolName\": 3}</function>"
        });

        let result = check_tool_validation_error(&error).unwrap();
        assert!(result.message.starts_with("tool call validation failed"));
        assert_eq!(
            result.failed_generation.as_deref(),
            Some("<function=github_proxy>{\"toolName\": 3}</function>")
        );

        let error = json!({
            "code": "rate_limit_exceeded",
            "message": "Too many requests"
        });
        assert!(check_tool_validation_error(&error).is_none());
    }
}
