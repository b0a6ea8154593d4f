//! Key-value commands.

use super::CommandResult;
use crate::output::{self, Format};
use crate::KvCommand;
use std::time::Duration;
use stowage_client::Kv;

/// Runs a key-value subcommand.
pub async fn run(kv: &Kv<'_>, command: KvCommand, format: Format) -> CommandResult {
    match command {
        KvCommand::Get { key } => match kv.get(&key).await? {
            Some(value) => output::print_value(format, &value),
            None => return Err(format!("key {key:?} not found").into()),
        },
        KvCommand::Set {
            key,
            value,
            kind,
            ttl_ms,
        } => {
            let value = output::parse_value(&value, &kind)?;
            match ttl_ms {
                Some(ms) => kv.set_with_ttl(&key, &value, Duration::from_millis(ms)).await?,
                None => kv.set(&key, &value).await?,
            }
            tracing::debug!(key = %key, "stored");
        }
        KvCommand::Delete { key } => kv.delete(&key).await?,
        KvCommand::Keys => output::print_list(format, &kv.keys().await?),
    }
    Ok(())
}
