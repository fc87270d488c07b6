use clap::Subcommand;

use super::open_context;

#[derive(Subcommand)]
pub enum QueueAction {
    /// List queued mint requests
    List,
    /// Replay queued requests now
    Replay,
    /// Drop requests older than the retention window
    Purge,
}

pub async fn run(action: QueueAction) -> Result<(), Box<dyn std::error::Error>> {
    let ctx = open_context()?;
    let queue = ctx.queue();

    match action {
        QueueAction::List => {
            println!("{}", serde_json::to_string_pretty(&queue.pending()?)?);
        }
        QueueAction::Replay => {
            let report = queue
                .replay(ctx.transport().as_ref(), chrono::Utc::now())
                .await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        QueueAction::Purge => {
            let purged = queue.purge_expired(chrono::Utc::now())?;
            println!("purged {purged} expired request(s)");
        }
    }
    Ok(())
}
