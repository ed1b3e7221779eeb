use serde::{Deserialize, Serialize};

/// Plain text passed to or from an LLM
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextContent {
    pub text: String,
}
