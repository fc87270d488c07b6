use clap::Subcommand;

use super::open_context;

#[derive(Subcommand)]
pub enum DappAction {
    /// Show the active dApp definition address
    Get,
    /// Save a dApp definition address
    Set {
        /// Address starting with "account_"
        address: String,
    },
}

pub fn run(action: DappAction) -> Result<(), Box<dyn std::error::Error>> {
    let ctx = open_context()?;

    match action {
        DappAction::Get => {
            let address = ctx.dapp_definition()?;
            if address.is_empty() {
                println!("(not set)");
            } else {
                println!("{address}");
            }
        }
        DappAction::Set { address } => {
            ctx.save_dapp_definition(&address)?;
            println!("Saved. Reload to apply.");
        }
    }
    Ok(())
}
