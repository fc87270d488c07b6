//! Process-wide context and the per-account session.
//!
//! [`AppContext`] is built once and owns everything shared across accounts:
//! store, configuration, gateway and mint clients, host events and the
//! queue replay worker. [`AccountSession`] lives while one account is
//! connected and owns that account's balance poller and idle guard.

use chrono::{NaiveDate, Utc};
use std::sync::{Arc, Mutex};

use crate::error::{CoreError, Result};
use crate::events::HostEvents;
use crate::events::Connectivity;
use crate::gateway::{build_http_client, GatewayClient};
use crate::idle::{GuardState, IdleDetector, IdleGuard, SessionDisconnect};
use crate::mint::{MintClient, MintOutcome, MintRequest};
use crate::poller::{BalancePoller, PollState};
use crate::queue::{ActionQueue, HttpTransport, ReplayWorker, ReqwestTransport, MINT_QUEUE_TAG};
use crate::storage::{Config, KeyValueStore, SqliteStore};
use crate::streak::{StreakRecord, StreakStore};

pub const DAPP_DEFINITION_KEY: &str = "mysterybox.dappDefAddr";
/// Environment fallback for the dApp definition address.
pub const DAPP_DEFINITION_ENV: &str = "MYSTERYBOX_DAPP_DEFINITION_ADDRESS";
const DAPP_DEFINITION_PREFIX: &str = "account_";

pub struct AppContext {
    config: Config,
    store: Arc<dyn KeyValueStore>,
    events: Arc<HostEvents>,
    gateway: Arc<GatewayClient>,
    queue: Arc<ActionQueue>,
    transport: Arc<dyn HttpTransport>,
    mint: MintClient,
    streaks: StreakStore,
    idle_detector: Option<Arc<dyn IdleDetector>>,
    replay: Mutex<Option<ReplayWorker>>,
}

impl AppContext {
    /// Open the on-disk store and the user's configuration.
    pub fn open(events: Arc<HostEvents>) -> Result<Self> {
        let store: Arc<dyn KeyValueStore> = Arc::new(SqliteStore::open()?);
        Self::new(Config::load_or_default(), store, events)
    }

    pub fn new(
        config: Config,
        store: Arc<dyn KeyValueStore>,
        events: Arc<HostEvents>,
    ) -> Result<Self> {
        let http = build_http_client(&config.gateway)?;
        Ok(Self::with_parts(
            config.clone(),
            store,
            events,
            Arc::new(GatewayClient::with_client(http.clone(), config.gateway)),
            Arc::new(ReqwestTransport::new(http)),
        ))
    }

    /// Build from explicit clients.
    pub fn with_parts(
        config: Config,
        store: Arc<dyn KeyValueStore>,
        events: Arc<HostEvents>,
        gateway: Arc<GatewayClient>,
        transport: Arc<dyn HttpTransport>,
    ) -> Self {
        let queue = Arc::new(ActionQueue::new(
            store.clone(),
            MINT_QUEUE_TAG,
            config.mint.retention(),
        ));
        let mint = MintClient::new(config.mint.endpoint.clone(), transport.clone(), queue.clone());
        Self {
            streaks: StreakStore::new(store.clone()),
            config,
            store,
            events,
            gateway,
            queue,
            transport,
            mint,
            idle_detector: None,
            replay: Mutex::new(None),
        }
    }

    /// Use a host-provided native idle detector for account sessions.
    pub fn with_idle_detector(mut self, detector: Arc<dyn IdleDetector>) -> Self {
        self.idle_detector = Some(detector);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn events(&self) -> &Arc<HostEvents> {
        &self.events
    }

    pub fn gateway(&self) -> &Arc<GatewayClient> {
        &self.gateway
    }

    pub fn queue(&self) -> &Arc<ActionQueue> {
        &self.queue
    }

    pub fn transport(&self) -> &Arc<dyn HttpTransport> {
        &self.transport
    }

    pub fn streaks(&self) -> &StreakStore {
        &self.streaks
    }

    /// Start replaying the mint queue on reconnect. No-op when running.
    pub fn start_replay(&self) {
        let mut replay = self.replay.lock().unwrap_or_else(|e| e.into_inner());
        if replay.is_none() {
            *replay = Some(ReplayWorker::spawn(
                self.queue.clone(),
                self.transport.clone(),
                self.events.watch_connectivity(),
            ));
        }
    }

    pub fn stop_replay(&self) {
        let worker = self.replay.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(worker) = worker {
            worker.stop();
        }
    }

    pub fn record_visit(&self, today: NaiveDate) -> Result<StreakRecord> {
        self.streaks.record_visit(today)
    }

    /// Saved dApp definition address, else the environment, else empty.
    pub fn dapp_definition(&self) -> Result<String> {
        let saved = self
            .store
            .get(DAPP_DEFINITION_KEY)?
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        Ok(saved
            .or_else(|| std::env::var(DAPP_DEFINITION_ENV).ok())
            .unwrap_or_default())
    }

    pub fn save_dapp_definition(&self, address: &str) -> Result<()> {
        let address = address.trim();
        if !address.starts_with(DAPP_DEFINITION_PREFIX) {
            return Err(CoreError::InvalidArgument(format!(
                "dApp definition address must start with {DAPP_DEFINITION_PREFIX}"
            )));
        }
        self.store.set(DAPP_DEFINITION_KEY, address)?;
        tracing::info!(%address, "dApp definition address saved");
        Ok(())
    }

    /// Draw a badge for `account` and submit its mint.
    ///
    /// # Errors
    /// `NotConnected` without an account; `MintRejected` when the endpoint
    /// refuses the request.
    pub async fn open_box(&self, account: Option<&str>) -> Result<(MintRequest, MintOutcome)> {
        let request = MintRequest::open_box(account.unwrap_or_default(), Utc::now())?;
        let outcome = self.mint.submit(&request).await?;
        Ok((request, outcome))
    }

    /// Begin the session for a newly connected account.
    ///
    /// Balance fetches also drive the connectivity signal: a fetch that never
    /// reaches the gateway marks the host offline, any answer marks it
    /// online, which is what triggers queue replay.
    ///
    /// # Errors
    /// `WrongNetwork` when the account belongs to another network; nothing
    /// is started in that case.
    pub fn connect(
        &self,
        address: &str,
        session: Arc<dyn SessionDisconnect>,
    ) -> Result<AccountSession> {
        self.gateway.ensure_account_network(address)?;

        let gateway = self.gateway.clone();
        let events = self.events.clone();
        let account = address.to_string();
        let poller = BalancePoller::start(
            move || {
                let gateway = gateway.clone();
                let events = events.clone();
                let account = account.clone();
                async move {
                    let result = gateway.fetch_balance(&account).await;
                    events.set_connectivity(match &result {
                        Err(e) if e.is_connectivity() => Connectivity::Offline,
                        _ => Connectivity::Online,
                    });
                    result
                }
            },
            self.config.polling.interval(),
            self.events.watch_visibility(),
        );
        let guard = IdleGuard::start(
            &self.config.idle,
            self.idle_detector.clone(),
            &self.events,
            session,
        );
        tracing::info!(%address, "account session started");

        Ok(AccountSession {
            address: address.to_string(),
            poller,
            guard,
        })
    }
}

impl Drop for AppContext {
    fn drop(&mut self) {
        self.stop_replay();
    }
}

/// Poller and idle guard for one connected account. Dropping it stops both.
pub struct AccountSession {
    address: String,
    poller: BalancePoller,
    guard: IdleGuard,
}

impl AccountSession {
    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn balance(&self) -> PollState {
        self.poller.state()
    }

    pub fn subscribe_balance(&self) -> tokio::sync::watch::Receiver<PollState> {
        self.poller.subscribe()
    }

    pub fn guard_state(&self) -> GuardState {
        self.guard.state()
    }

    pub fn subscribe_guard(&self) -> tokio::sync::watch::Receiver<GuardState> {
        self.guard.subscribe()
    }

    /// Stop polling and idle tracking. Idempotent.
    pub fn teardown(&self) {
        self.poller.stop();
        self.guard.teardown();
    }
}

impl Drop for AccountSession {
    fn drop(&mut self) {
        self.teardown();
    }
}
