//! Detection of tool calls the model wrote out as prose.
//!
//! Some models answer with text such as
//! `github_proxy(toolName="search_repositories", toolArgs={"query": "user:@me"})`
//! instead of using the structured tool calling mechanism. The rules here recognise
//! that text and recover the envelope so the agent can run the call itself.
use regex::Regex;
use serde_json::{json, Value};

/// A proxy call recovered from prose
#[derive(Debug, Clone, PartialEq)]
pub struct ProxyInvocation {
    pub tool_name: String,
    pub tool_args: Value,
}

impl ProxyInvocation {
    /// Point `@me` references at the authenticated login. A repository search without
    /// a query becomes a search over the user's own repositories.
    pub fn resolve_login(mut self, login: &str) -> Self {
        replace_me(&mut self.tool_args, login);
        if self.tool_name == "search_repositories" && self.tool_args.get("query").is_none() {
            if let Some(args) = self.tool_args.as_object_mut() {
                args.insert("query".to_string(), json!(format!("user:{}", login)));
            }
        }
        self
    }

    /// Arguments for the proxy tool itself
    pub fn proxy_arguments(&self) -> Value {
        json!({
            "toolName": self.tool_name,
            "toolArgs": self.tool_args,
        })
    }
}

fn replace_me(value: &mut Value, login: &str) {
    match value {
        Value::String(s) if s.contains("@me") => *s = s.replace("@me", login),
        Value::Array(items) => items.iter_mut().for_each(|item| replace_me(item, login)),
        Value::Object(map) => map.values_mut().for_each(|item| replace_me(item, login)),
        _ => {}
    }
}

pub trait ProseToolCallDetector: Send + Sync {
    /// Recover a proxy call from model text, or None when the text is a normal answer
    /// or the call cannot be parsed
    fn detect(&self, text: &str) -> Option<ProxyInvocation>;
}

/// Substring and regex rules for the proxy tool's call syntax
pub struct PatternDetector {
    proxy_tool: String,
    call_syntax: Regex,
    tool_name: Regex,
    tool_args: Regex,
    bare_key: Regex,
}

impl PatternDetector {
    pub fn new(proxy_tool: &str) -> Self {
        let escaped = regex::escape(proxy_tool);
        Self {
            proxy_tool: proxy_tool.to_string(),
            call_syntax: Regex::new(&format!(r"(?:{}\s*\(|<function={}>)", escaped, escaped))
                .expect("valid call syntax pattern"),
            tool_name: Regex::new(r#"["']?toolName["']?\s*[=:]\s*["']([^"']+)["']"#)
                .expect("valid toolName pattern"),
            tool_args: Regex::new(r#"["']?toolArgs["']?\s*[=:]\s*"#).expect("valid toolArgs pattern"),
            bare_key: Regex::new(r"([{,]\s*)([A-Za-z_][A-Za-z0-9_]*)\s*:")
                .expect("valid bare key pattern"),
        }
    }

    /// Whether the text looks like a written-out proxy call at all
    pub fn looks_like_call(&self, text: &str) -> bool {
        if self.call_syntax.is_match(text) {
            return true;
        }
        text.contains(&self.proxy_tool) && (text.contains("toolName") || text.contains("toolArgs"))
    }

    fn extract_args(&self, text: &str) -> Option<Value> {
        let Some(marker) = self.tool_args.find(text) else {
            return Some(json!({}));
        };
        let rest = &text[marker.end()..];
        if !rest.starts_with('{') {
            return None;
        }
        let raw = balanced_object(rest)?;
        self.parse_object(raw)
    }

    fn parse_object(&self, raw: &str) -> Option<Value> {
        if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(raw) {
            return Some(value);
        }
        let normalized = raw.replace('\'', "\"");
        let normalized = self.bare_key.replace_all(&normalized, "$1\"$2\":");
        match serde_json::from_str::<Value>(&normalized) {
            Ok(value @ Value::Object(_)) => Some(value),
            _ => None,
        }
    }
}

impl ProseToolCallDetector for PatternDetector {
    fn detect(&self, text: &str) -> Option<ProxyInvocation> {
        if !self.looks_like_call(text) {
            return None;
        }

        let tool_name = self.tool_name.captures(text)?.get(1)?.as_str().to_string();
        let Some(tool_args) = self.extract_args(text) else {
            tracing::debug!(tool = %tool_name, "could not parse toolArgs from prose tool call");
            return None;
        };

        Some(ProxyInvocation {
            tool_name,
            tool_args,
        })
    }
}

/// The leading `{...}` of `text` with nested braces balanced, skipping braces in strings
fn balanced_object(text: &str) -> Option<&str> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for (i, c) in text.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '"' | '\'' => quote = Some(c),
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(&text[..=i]);
                }
            }
            _ => {}
        }
    }
    None
}
