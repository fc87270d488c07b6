pub mod balance;
pub mod config;
pub mod dapp;
pub mod mint;
pub mod queue;
pub mod streak;

use std::sync::Arc;

use mysterybox_core::{AppContext, HostEvents};

/// Context over the user's store and config, with default host signals.
pub(crate) fn open_context() -> Result<AppContext, Box<dyn std::error::Error>> {
    Ok(AppContext::open(Arc::new(HostEvents::default()))?)
}
