use clap::Subcommand;

use super::open_context;

#[derive(Subcommand)]
pub enum BoxAction {
    /// Draw a badge class and submit its mint
    Open {
        /// Connected account address
        #[arg(long)]
        account: Option<String>,
        /// Print the request and outcome as JSON
        #[arg(long)]
        json: bool,
    },
}

pub async fn run(action: BoxAction) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        BoxAction::Open { account, json } => {
            let ctx = open_context()?;
            let (request, outcome) = ctx.open_box(account.as_deref()).await?;
            if json {
                let out = serde_json::json!({ "request": request, "outcome": outcome });
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                println!("Badge class: {}", request.badge_class);
                println!("{}", outcome.message());
            }
        }
    }
    Ok(())
}
