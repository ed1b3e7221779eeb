use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
/// Tool results travel inside user messages and become `tool` role entries on the wire
pub enum Role {
    User,
    Assistant,
}
