pub mod auth;
pub mod buzz;
pub mod chat;
pub mod conf;
pub mod data;
pub mod docs;
pub mod error;
pub mod llm;
pub mod prompt;
pub mod quota;
pub mod server;
pub mod tracing;
pub mod types;
