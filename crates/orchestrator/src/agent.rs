use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

use crate::context::prefetch;
use crate::detector::{PatternDetector, ProseToolCallDetector};
use crate::errors::{AgentError, AgentResult};
use crate::evaluator::QualityEvaluator;
use crate::github::tools::PROXY_TOOL_NAME;
use crate::github::IdentityProvider;
use crate::models::message::{Message, ToolRequest};
use crate::models::tool::Tool;
use crate::prompt::{build_system_prompt, format_result_prompt, refine_message, tool_retry_message};
use crate::providers::base::Provider;
use crate::providers::utils::ToolValidationError;
use crate::registry::{ToolDefinition, ToolRegistry, CREDENTIAL_KEY};

/// Returned when the model keeps producing tool calls the endpoint rejects
pub const APOLOGY: &str =
    "I'm sorry, I wasn't able to complete that request. Could you please rephrase your question?";

#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Corrective retries after a rejected tool call, on top of the first attempt
    pub max_retries: usize,
    /// Candidate answers produced before settling for the best one
    pub max_iterations: usize,
    pub quality_threshold: f32,
    pub quality_enabled: bool,
    pub tool_timeout: Duration,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            max_iterations: 3,
            quality_threshold: 0.8,
            quality_enabled: true,
            tool_timeout: Duration::from_secs(30),
        }
    }
}

/// A chat history entry as the interface sends it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: String,
    pub content: String,
}

/// Convert caller supplied history into messages. Only user and assistant turns are kept.
pub fn convert_history(entries: &[HistoryEntry]) -> Vec<Message> {
    entries
        .iter()
        .filter_map(|entry| match entry.role.as_str() {
            "user" => Some(Message::user().with_text(&entry.content)),
            "assistant" => Some(Message::assistant().with_text(&entry.content)),
            other => {
                tracing::warn!(role = other, "skipping history entry with unsupported role");
                None
            }
        })
        .collect()
}

enum Round {
    Answer(String),
    Exhausted,
}

/// Agent drives the model through tool calls until it produces an answer for the user
pub struct Agent {
    provider: Box<dyn Provider>,
    registry: Arc<ToolRegistry>,
    identity: Arc<dyn IdentityProvider>,
    detector: Box<dyn ProseToolCallDetector>,
    config: AgentConfig,
}

impl Agent {
    pub fn new(
        provider: Box<dyn Provider>,
        registry: Arc<ToolRegistry>,
        identity: Arc<dyn IdentityProvider>,
    ) -> Self {
        Self {
            provider,
            registry,
            identity,
            detector: Box::new(PatternDetector::new(PROXY_TOOL_NAME)),
            config: AgentConfig::default(),
        }
    }

    pub fn with_config(mut self, config: AgentConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_detector(mut self, detector: Box<dyn ProseToolCallDetector>) -> Self {
        self.detector = detector;
        self
    }

    /// Answer `prompt` given the earlier conversation. Each call is independent: nothing
    /// is kept between requests.
    pub async fn reply(
        &self,
        prompt: &str,
        history: &[Message],
        credential: Option<&str>,
    ) -> Result<String> {
        tracing::info!(
            has_credential = credential.is_some(),
            history = history.len(),
            "starting reply"
        );

        let context = prefetch(
            credential,
            self.identity.as_ref(),
            &self.registry,
            self.config.tool_timeout,
        )
        .await;
        let system = build_system_prompt(&context, &self.registry)?;
        let tools = self.registry.tools();
        let login = context
            .authenticated_user
            .as_ref()
            .map(|user| user.login.as_str());

        let mut messages = history.to_vec();
        messages.push(Message::user().with_text(prompt));

        let evaluator = QualityEvaluator::new(self.provider.as_ref());
        let mut best: Option<(String, f32)> = None;
        let mut last: Option<String> = None;
        let mut iteration = 0;

        loop {
            iteration += 1;
            let candidate = match self
                .run_round(&system, prompt, &tools, &mut messages, credential, login)
                .await?
            {
                Round::Answer(candidate) => candidate,
                // Keep an answer already produced by an earlier iteration
                Round::Exhausted => {
                    return Ok(best
                        .map(|(answer, _)| answer)
                        .or(last)
                        .unwrap_or_else(|| APOLOGY.to_string()));
                }
            };

            if !self.config.quality_enabled {
                return Ok(candidate);
            }

            let score = evaluator.evaluate(&candidate, prompt).await;
            tracing::info!(iteration, score, "evaluated candidate answer");
            if score >= self.config.quality_threshold {
                return Ok(candidate);
            }

            if score > best.as_ref().map_or(0.0, |(_, best_score)| *best_score) {
                best = Some((candidate.clone(), score));
            }
            if iteration >= self.config.max_iterations {
                return Ok(best.map(|(answer, _)| answer).unwrap_or(candidate));
            }

            messages.push(Message::assistant().with_text(candidate.clone()));
            messages.push(Message::user().with_text(refine_message(score)?));
            last = Some(candidate);
        }
    }

    /// One model round: a tool enabled call (retried on rejected tool calls), any tool
    /// dispatch it asks for, and the tool-free call that turns results into an answer.
    async fn run_round(
        &self,
        system: &str,
        prompt: &str,
        tools: &[Tool],
        messages: &mut Vec<Message>,
        credential: Option<&str>,
        login: Option<&str>,
    ) -> Result<Round> {
        let mut retries = 0;
        let response = loop {
            match self.provider.complete(system, messages, tools).await {
                Ok((response, _)) => break response,
                Err(e) => match e.downcast_ref::<ToolValidationError>() {
                    Some(rejected) if retries < self.config.max_retries => {
                        retries += 1;
                        tracing::info!(retry = retries, "retrying after rejected tool call: {}", rejected.message);
                        messages.push(Message::user().with_text(tool_retry_message(rejected)?));
                    }
                    Some(_) => {
                        tracing::warn!(retries, "giving up after repeated rejected tool calls");
                        return Ok(Round::Exhausted);
                    }
                    None => return Err(e),
                },
            }
        };

        let requests = response.tool_requests();
        if !requests.is_empty() {
            messages.push(response.clone());
            let results = self.dispatch_tool_requests(&requests, credential).await;
            if !results.content.is_empty() {
                messages.push(results);
            }

            let (answer, _) = self.provider.complete(system, messages, &[]).await?;
            return Ok(Round::Answer(answer.text()));
        }

        let text = response.text();
        match self
            .answer_prose_call(system, prompt, &text, messages, credential, login)
            .await?
        {
            Some(answer) => Ok(Round::Answer(answer)),
            None => Ok(Round::Answer(text)),
        }
    }

    /// Run the requested tools one after another, in the order the model emitted them.
    /// Every outcome, including failures, becomes a tool response keyed by the call id.
    async fn dispatch_tool_requests(
        &self,
        requests: &[&ToolRequest],
        credential: Option<&str>,
    ) -> Message {
        let mut results = Message::user();

        for request in requests {
            let call = match &request.tool_call {
                Ok(call) => call,
                Err(e) => {
                    tracing::warn!(id = %request.id, "unusable tool call: {}", e);
                    results = results.with_tool_response(request.id.clone(), Err(e.clone()));
                    continue;
                }
            };

            let Some(definition) = self.registry.lookup(&call.name) else {
                tracing::warn!(id = %request.id, tool = %call.name, "call to unregistered tool");
                let error =
                    AgentError::ToolNotFound(format!("{} is not an available tool", call.name));
                results = results.with_tool_response(request.id.clone(), Err(error));
                continue;
            };

            tracing::info!(id = %request.id, tool = %call.name, "dispatching tool call");
            let result = self
                .dispatch(definition, call.arguments.clone(), credential)
                .await;
            if let Err(e) = &result {
                tracing::warn!(id = %request.id, tool = %call.name, "tool call failed: {}", e);
            }
            results = results.with_tool_response(request.id.clone(), result);
        }

        results
    }

    async fn dispatch(
        &self,
        definition: &ToolDefinition,
        mut arguments: Value,
        credential: Option<&str>,
    ) -> AgentResult<Value> {
        definition.validate(&arguments)?;
        inject_credential(&mut arguments, credential);

        match tokio::time::timeout(self.config.tool_timeout, definition.handler.call(arguments)).await
        {
            Ok(result) => result,
            Err(_) => Err(AgentError::Timeout(format!(
                "{} did not finish within {}ms",
                definition.name(),
                self.config.tool_timeout.as_millis()
            ))),
        }
    }

    /// Handle a text answer that spells out a proxy call instead of making it. The call
    /// is run here and the model formats its result without tools.
    async fn answer_prose_call(
        &self,
        system: &str,
        prompt: &str,
        text: &str,
        messages: &mut Vec<Message>,
        credential: Option<&str>,
        login: Option<&str>,
    ) -> Result<Option<String>> {
        let Some(proxy) = self.registry.lookup(PROXY_TOOL_NAME) else {
            return Ok(None);
        };
        let Some(mut invocation) = self.detector.detect(text) else {
            return Ok(None);
        };
        if let Some(login) = login {
            invocation = invocation.resolve_login(login);
        }

        tracing::info!(tool = %invocation.tool_name, "running tool call written out as text");
        let result = self
            .dispatch(proxy, invocation.proxy_arguments(), credential)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(tool = %invocation.tool_name, "proxied call failed: {}", e);
                json!({ "error": e.message() })
            });

        messages.push(Message::user().with_text(format_result_prompt(
            prompt,
            &invocation.tool_name,
            &result,
        )?));
        let (answer, _) = self.provider.complete(system, messages, &[]).await?;
        Ok(Some(answer.text()))
    }
}

/// Write the caller's credential into the arguments, replacing whatever the model put there
fn inject_credential(arguments: &mut Value, credential: Option<&str>) {
    let Some(arguments) = arguments.as_object_mut() else {
        return;
    };
    match credential {
        Some(credential) => {
            arguments.insert(CREDENTIAL_KEY.to_string(), json!(credential));
        }
        None => {
            arguments.remove(CREDENTIAL_KEY);
        }
    }
}
