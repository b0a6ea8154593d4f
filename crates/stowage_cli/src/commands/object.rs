//! Object commands.

use super::CommandResult;
use crate::output::{self, Format};
use crate::ObjectCommand;
use std::io::Write;
use stowage_client::Objects;

/// Runs an object subcommand.
pub async fn run(objects: &Objects<'_>, command: ObjectCommand, format: Format) -> CommandResult {
    match command {
        ObjectCommand::Put { key, file } => {
            let data = tokio::fs::read(&file).await?;
            if data.is_empty() {
                return Err(format!("{} is empty", file.display()).into());
            }
            objects.put(&key, &data).await?;
            if let Some(info) = objects.metadata(&key).await? {
                println!("{key}: {} bytes, crc32 {:08x}", info.size, info.checksum);
            }
        }
        ObjectCommand::Get { key, out } => {
            let Some(data) = objects.get(&key).await? else {
                return Err(format!("object {key:?} not found").into());
            };
            match out {
                Some(path) => tokio::fs::write(&path, &data).await?,
                None => std::io::stdout().write_all(&data)?,
            }
        }
        ObjectCommand::Delete { key } => objects.delete(&key).await?,
        ObjectCommand::List { prefix } => output::print_list(format, &objects.list(&prefix).await?),
    }
    Ok(())
}
