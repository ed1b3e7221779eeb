//! These models represent the objects passed around by the agent
//!
//! There are a few related formats we need to interact with:
//! - chat history entries, sent from the interface to the server
//! - openai-compatible messages/tools, sent from the agent to the LLM
//! - tool arguments and results, exchanged with the registered tool handlers
//!
//! We always immediately convert those data models into the internal structs using
//! to/from helpers. Because of the need for compatibility, the internal models are not
//! an exact match to any of these formats.
pub mod content;
pub mod message;
pub mod role;
pub mod tool;
