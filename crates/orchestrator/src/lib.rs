pub mod agent;
pub mod context;
pub mod detector;
pub mod errors;
pub mod evaluator;
pub mod github;
pub mod models;
pub mod prompt;
pub mod prompt_template;
pub mod providers;
pub mod registry;
