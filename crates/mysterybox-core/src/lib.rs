//! # Mysterybox Core Library
//!
//! Client runtime for the mystery box mini-app: a wallet-connected page that
//! shows an on-chain balance, keeps a daily visit streak and mints a random
//! badge when a box is opened. The `mysterybox` CLI is a thin layer over
//! this library.
//!
//! ## Architecture
//!
//! - **Outcomes**: unbiased draws from the OS CSPRNG ([`rng`])
//! - **Streak**: pure day-gap state machine with durable storage ([`streak`])
//! - **Balance**: gateway lookup ([`gateway`]) polled on a visibility-aware
//!   schedule ([`poller`])
//! - **Idle guard**: native idle detection with an activity-tracking
//!   fallback ([`idle`])
//! - **Offline queue**: durable FIFO replayed on reconnect ([`queue`],
//!   [`mint`])
//! - **Storage**: SQLite key-value store and TOML configuration
//!
//! ## Key Components
//!
//! - [`AppContext`]: process-wide wiring, built once
//! - [`AccountSession`]: poller and idle guard for one connected account
//! - [`HostEvents`]: visibility, activity and connectivity signals

pub mod app;
pub mod error;
pub mod events;
pub mod gateway;
pub mod idle;
pub mod mint;
pub mod poller;
pub mod queue;
pub mod rng;
pub mod storage;
pub mod streak;

pub use app::{AccountSession, AppContext};
pub use error::{ConfigError, CoreError, GatewayError, IdleError, Result, StorageError};
pub use events::{ActivityEvent, Connectivity, HostEvents, Visibility};
pub use gateway::{build_http_client, extract_amount, FungiblesShape, GatewayClient};
pub use idle::{GuardState, IdleDetector, IdleGuard, IdleStrategy, SessionDisconnect, StrategyKind};
pub use mint::{MintClient, MintOutcome, MintRequest};
pub use poller::{BalancePoller, PollState};
pub use queue::{ActionQueue, HttpTransport, QueuedAction, ReplayReport, ReplayWorker};
pub use rng::{new_correlation_id, pick, BADGE_CLASSES};
pub use storage::{Config, KeyValueStore, MemoryStore, SqliteStore};
pub use streak::{on_visit, StreakRecord, StreakStore};
