//! GitHub collaborators: the REST client used for identity lookups, the remote tool
//! channel behind the proxy tool, and the tools registered for the model.
pub mod channel;
pub mod client;
pub mod tools;

pub use client::{GitHubClient, GitHubConfig, GitHubUser, IdentityProvider};
