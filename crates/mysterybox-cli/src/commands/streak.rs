use clap::Subcommand;
use mysterybox_core::storage::SqliteStore;
use mysterybox_core::StreakStore;
use std::sync::Arc;

#[derive(Subcommand)]
pub enum StreakAction {
    /// Show the current streak without recording a visit
    Show,
    /// Record today's visit and show the streak
    Visit,
}

pub fn run(action: StreakAction) -> Result<(), Box<dyn std::error::Error>> {
    let streaks = StreakStore::new(Arc::new(SqliteStore::open()?));

    match action {
        StreakAction::Show => {
            println!("Streak: {}", streaks.load_count()?);
        }
        StreakAction::Visit => {
            let record = streaks.record_visit(chrono::Local::now().date_naive())?;
            println!("Streak: {}", record.count);
        }
    }
    Ok(())
}
