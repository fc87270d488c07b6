use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "mysterybox", version, about = "Mystery Box CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Daily visit streak
    Streak {
        #[command(subcommand)]
        action: commands::streak::StreakAction,
    },
    /// Open a mystery box and mint the badge
    Box {
        #[command(subcommand)]
        action: commands::mint::BoxAction,
    },
    /// Account balance
    Balance {
        #[command(subcommand)]
        action: commands::balance::BalanceAction,
    },
    /// Offline mint queue
    Queue {
        #[command(subcommand)]
        action: commands::queue::QueueAction,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
    /// dApp definition address
    Dapp {
        #[command(subcommand)]
        action: commands::dapp::DappAction,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("MYSTERYBOX_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    init_tracing();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Streak { action } => commands::streak::run(action),
        Commands::Box { action } => commands::mint::run(action).await,
        Commands::Balance { action } => commands::balance::run(action).await,
        Commands::Queue { action } => commands::queue::run(action).await,
        Commands::Config { action } => commands::config::run(action),
        Commands::Dapp { action } => commands::dapp::run(action),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
