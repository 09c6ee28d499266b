//! Command-line front end wiring the store adapter, the generation contract
//! and an HTTP chat-completions oracle together.

pub mod cli;
pub mod config;
pub mod oracle;
pub mod telemetry;
