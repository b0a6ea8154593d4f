//! CLI command implementations.

pub mod broker;
pub mod kv;
pub mod object;
pub mod registry;

/// Error type shared by the commands.
pub type CommandResult = Result<(), Box<dyn std::error::Error>>;
