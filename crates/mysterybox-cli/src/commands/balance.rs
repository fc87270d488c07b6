use clap::Subcommand;
use mysterybox_core::PollState;
use std::sync::Arc;
use tokio::sync::Notify;

use super::open_context;

#[derive(Subcommand)]
pub enum BalanceAction {
    /// Fetch the balance once
    Get {
        #[arg(long)]
        account: String,
    },
    /// Poll the balance until Ctrl-C or the idle timeout
    Watch {
        #[arg(long)]
        account: String,
    },
}

pub async fn run(action: BalanceAction) -> Result<(), Box<dyn std::error::Error>> {
    let ctx = open_context()?;

    match action {
        BalanceAction::Get { account } => {
            ctx.gateway().ensure_account_network(&account)?;
            let balance = ctx.gateway().fetch_balance(&account).await?;
            println!("{balance}");
        }
        BalanceAction::Watch { account } => {
            ctx.start_replay();
            let disconnected = Arc::new(Notify::new());
            let signal = disconnected.clone();
            let session = ctx.connect(&account, Arc::new(move || signal.notify_one()))?;
            let mut balance = session.subscribe_balance();
            print_state(&balance.borrow_and_update());

            loop {
                tokio::select! {
                    changed = balance.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        print_state(&balance.borrow_and_update());
                    }
                    _ = disconnected.notified() => {
                        println!("Disconnected after inactivity");
                        break;
                    }
                    _ = tokio::signal::ctrl_c() => break,
                }
            }

            session.teardown();
        }
    }
    Ok(())
}

fn print_state(state: &PollState) {
    match (&state.last_balance, &state.last_error) {
        (Some(balance), _) => println!("XRD: {balance}"),
        (None, Some(error)) => eprintln!("{error}"),
        (None, None) => {}
    }
}
