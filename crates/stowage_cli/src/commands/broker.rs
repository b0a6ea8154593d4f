//! Broker commands.

use super::CommandResult;
use crate::BrokerCommand;
use stowage_client::Broker;

/// Runs a broker subcommand.
///
/// `subscribe` prints each message on its own line until `count` messages
/// arrived, the connection closes or Ctrl-C is pressed.
pub async fn run(broker: &Broker<'_>, command: BrokerCommand) -> CommandResult {
    match command {
        BrokerCommand::Publish { subject, message } => {
            broker.publish(&subject, message.as_bytes()).await?;
        }
        BrokerCommand::Subscribe {
            subject,
            queue,
            count,
        } => {
            let mut subscription = match &queue {
                Some(queue) => broker.subscribe_queue(&subject, queue).await?,
                None => broker.subscribe(&subject).await?,
            };
            eprintln!("listening on {}", subscription.key());

            let mut received = 0usize;
            while count.map_or(true, |limit| received < limit) {
                let message = tokio::select! {
                    message = subscription.next() => message,
                    _ = tokio::signal::ctrl_c() => break,
                };
                let Some(message) = message else {
                    return Err("connection closed".into());
                };
                println!("{}", String::from_utf8_lossy(&message));
                received += 1;
            }
            broker.unsubscribe(&subject).await?;
        }
    }
    Ok(())
}
