use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, timeout, Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::client::{AuthResult, ClientError, Credentials, FailureKind, PushEvent, RemoteClient};
use crate::command::{self, Command, CommandRequest};
use crate::config::CoordinatorConfig;
use crate::error::SyncError;
use crate::normalize::Normalizer;
use crate::reconcile::{reconcile, Reconciliation, RegistryState};
use crate::snapshot::{Published, SnapshotGeneration};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "kind", rename_all = "snake_case")]
pub enum CoordinatorState {
    Idle,
    Refreshing,
    Failed(FailureKind),
    Stopped,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncStats {
    pub fetches_ok: u64,
    pub fetches_err: u64,
    pub reconnects: u64,
    pub last_ok_ts: Option<DateTime<Utc>>,
}

type Outcome = Option<Result<(), SyncError>>;

struct Flight {
    current: watch::Receiver<Outcome>,
    started: bool,
    follow_up: Option<(watch::Sender<Outcome>, watch::Receiver<Outcome>)>,
}

pub struct Coordinator<C: RemoteClient> {
    inner: Arc<Inner<C>>,
}

impl<C: RemoteClient> Clone for Coordinator<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct Inner<C> {
    client: C,
    config: CoordinatorConfig,
    normalizer: Normalizer,
    state: watch::Sender<CoordinatorState>,
    published: watch::Sender<Arc<Published>>,
    in_flight: Mutex<Option<Flight>>,
    shutdown: CancellationToken,
    run: Mutex<CancellationToken>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    mfa_token: Mutex<Option<String>>,
    fetches_ok: AtomicU64,
    fetches_err: AtomicU64,
    reconnects: AtomicU64,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<C: RemoteClient + 'static> Coordinator<C> {
    pub fn new(client: C, config: CoordinatorConfig) -> Self {
        let (state, _) = watch::channel(CoordinatorState::Idle);
        let (published, _) = watch::channel(Arc::new(Published::empty()));
        let shutdown = CancellationToken::new();
        let run = shutdown.child_token();

        Self {
            inner: Arc::new(Inner {
                client,
                normalizer: Normalizer::new(config.normalize.clone()),
                config,
                state,
                published,
                in_flight: Mutex::new(None),
                shutdown,
                run: Mutex::new(run),
                tasks: Mutex::new(Vec::new()),
                mfa_token: Mutex::new(None),
                fetches_ok: AtomicU64::new(0),
                fetches_err: AtomicU64::new(0),
                reconnects: AtomicU64::new(0),
            }),
        }
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.inner.config
    }

    pub fn client(&self) -> &C {
        &self.inner.client
    }

    pub fn state(&self) -> CoordinatorState {
        *self.inner.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<CoordinatorState> {
        self.inner.state.subscribe()
    }

    pub fn get_snapshot(&self) -> Arc<SnapshotGeneration> {
        Arc::clone(&self.inner.published.borrow().generation)
    }

    pub fn published(&self) -> Arc<Published> {
        Arc::clone(&self.inner.published.borrow())
    }

    pub fn on_update(&self) -> watch::Receiver<Arc<Published>> {
        self.inner.published.subscribe()
    }

    pub fn mfa_token(&self) -> Option<String> {
        lock(&self.inner.mfa_token).clone()
    }

    pub fn stats(&self) -> SyncStats {
        SyncStats {
            fetches_ok: self.inner.fetches_ok.load(Ordering::Relaxed),
            fetches_err: self.inner.fetches_err.load(Ordering::Relaxed),
            reconnects: self.inner.reconnects.load(Ordering::Relaxed),
            last_ok_ts: self.inner.published.borrow().fetched_at,
        }
    }

    pub fn reconcile_registry(&self, registry: &RegistryState) -> Reconciliation {
        reconcile(&self.get_snapshot().ids(), registry)
    }

    /// Tears down any previous run first, so it doubles as retry after a failure.
    pub async fn start(&self, credentials: &Credentials) -> Result<(), SyncError> {
        if self.inner.shutdown.is_cancelled() {
            return Err(SyncError::Stopped);
        }

        self.stop_tasks().await;
        self.inner.force_state(CoordinatorState::Refreshing);

        if let Err(err) = self.authenticate(credentials).await {
            let kind = err.failure_kind().unwrap_or(FailureKind::Auth);
            error!(error = %err, "login failed");
            self.inner.force_state(CoordinatorState::Failed(kind));
            return Err(err);
        }

        let run = self.inner.shutdown.child_token();
        *lock(&self.inner.run) = run.clone();

        if let Err(err) = self.request_refresh(true).await {
            let kind = err.failure_kind().unwrap_or(FailureKind::Transient);
            run.cancel();
            self.inner.force_state(CoordinatorState::Failed(kind));
            return Err(err);
        }

        let mut handles = vec![tokio::spawn(schedule_loop(self.clone(), run.clone()))];
        if self.inner.config.push_events {
            handles.push(tokio::spawn(event_loop(self.clone(), run)));
        }
        lock(&self.inner.tasks).extend(handles);

        info!(
            interval_s = self.inner.config.update_interval.as_secs(),
            entities = self.get_snapshot().len(),
            "coordinator started"
        );
        Ok(())
    }

    pub async fn request_refresh(&self, critical: bool) -> Result<(), SyncError> {
        match self.state() {
            CoordinatorState::Stopped => return Err(SyncError::Stopped),
            CoordinatorState::Failed(FailureKind::Auth) => {
                if critical {
                    return Err(SyncError::ReauthRequired);
                }
                debug!("refresh skipped, reauthentication required");
                return Ok(());
            }
            _ => {}
        }

        let outcome = self.inner.begin_refresh(critical);
        if critical {
            wait_outcome(outcome).await
        } else {
            Ok(())
        }
    }

    pub async fn dispatch_command(
        &self,
        device_id: &str,
        command: Command,
        request: CommandRequest,
    ) -> Result<(), SyncError> {
        match self.state() {
            CoordinatorState::Stopped => return Err(SyncError::Stopped),
            CoordinatorState::Failed(FailureKind::Auth) => return Err(SyncError::ReauthRequired),
            _ => {}
        }

        let generation = self.get_snapshot();
        let entity = generation
            .get(device_id)
            .ok_or_else(|| SyncError::UnknownDevice(device_id.to_string()))?;

        let config = &self.inner.config;
        let args = command::resolve(entity, command, &request, config.arm_code.as_deref(), &config.arming)
            .inspect_err(|err| warn!(device_id, %command, error = %err, "command rejected"))?;
        let target = command::target_device(entity);

        info!(device_id, target_id = target, %command, "dispatching command");
        let sent = timeout(
            config.command_timeout,
            self.inner.client.send_command(target, command, &args),
        )
        .await
        .unwrap_or(Err(ClientError::Timeout));

        if let Err(err) = sent {
            warn!(device_id, %command, error = %err, "command failed");
            return Err(err.into());
        }

        self.request_refresh(true).await
    }

    /// Terminal: a stopped coordinator cannot be started again.
    pub async fn shutdown(&self) {
        self.inner.shutdown.cancel();
        self.inner.state.send_replace(CoordinatorState::Stopped);
        self.join_tasks().await;
        info!("coordinator stopped");
    }

    async fn stop_tasks(&self) {
        lock(&self.inner.run).cancel();
        self.join_tasks().await;
    }

    async fn join_tasks(&self) {
        let handles: Vec<JoinHandle<()>> = lock(&self.inner.tasks).drain(..).collect();
        for handle in handles {
            let _ = handle.await;
        }
    }

    async fn authenticate(&self, credentials: &Credentials) -> Result<(), SyncError> {
        let client = &self.inner.client;
        let limit = self.inner.config.fetch_timeout;

        let result = timeout(limit, client.login(credentials))
            .await
            .unwrap_or(Err(ClientError::Timeout))?;

        match result {
            AuthResult::Success => {
                debug!(username = %credentials.username, "logged in");
                Ok(())
            }
            AuthResult::OtpRequired { methods } => {
                let Some(otp) = credentials.one_time_code.as_ref() else {
                    return Err(SyncError::Auth("one-time code required".to_string()));
                };
                if !methods.is_empty() && !methods.contains(&otp.method) {
                    return Err(SyncError::Auth(format!(
                        "one-time code method {:?} not offered",
                        otp.method
                    )));
                }

                let token = timeout(limit, client.submit_otp(otp.method, &otp.code))
                    .await
                    .unwrap_or(Err(ClientError::Timeout))?;
                *lock(&self.inner.mfa_token) = Some(token);
                info!(method = ?otp.method, "two-factor authentication completed");
                Ok(())
            }
            AuthResult::MustEnableMfa => Err(SyncError::Auth(
                "two-factor authentication must be enabled on the account".to_string(),
            )),
        }
    }
}

impl<C: RemoteClient + 'static> Inner<C> {
    /// Non-critical requests join the running fetch. Critical ones need a
    /// fetch that starts after the request, so they share one follow-up
    /// queued behind it. At most one fetch runs at a time.
    fn begin_refresh(self: &Arc<Self>, critical: bool) -> watch::Receiver<Outcome> {
        let mut slot = lock(&self.in_flight);
        // A closed sender means the fetch task died without reporting.
        if let Some(flight) = slot.as_mut().filter(|f| f.current.has_changed().is_ok()) {
            if !critical || !flight.started {
                debug!("refresh already in flight, joining it");
                return flight.current.clone();
            }
            debug!("refresh in flight, queueing a follow-up");
            let (_, follow_up) = flight.follow_up.get_or_insert_with(|| watch::channel(None));
            return follow_up.clone();
        }

        let (tx, rx) = watch::channel(None);
        *slot = Some(Flight {
            current: rx.clone(),
            started: false,
            follow_up: None,
        });
        drop(slot);

        tokio::spawn(Arc::clone(self).run_fetches(tx));
        rx
    }

    async fn run_fetches(self: Arc<Self>, mut tx: watch::Sender<Outcome>) {
        loop {
            {
                let mut slot = lock(&self.in_flight);
                if let Some(flight) = slot.as_mut() {
                    flight.started = true;
                }
            }
            let outcome = self.fetch_and_publish().await;

            let next = {
                let mut slot = lock(&self.in_flight);
                match slot.as_mut().and_then(|f| f.follow_up.take()) {
                    Some((next_tx, next_rx)) => {
                        if let Some(flight) = slot.as_mut() {
                            flight.current = next_rx;
                            flight.started = false;
                        }
                        Some(next_tx)
                    }
                    None => {
                        *slot = None;
                        None
                    }
                }
            };

            tx.send_replace(Some(outcome));
            match next {
                Some(next_tx) => tx = next_tx,
                None => break,
            }
        }
    }

    async fn fetch_and_publish(&self) -> Result<(), SyncError> {
        match *self.state.borrow() {
            CoordinatorState::Stopped => return Err(SyncError::Stopped),
            CoordinatorState::Failed(FailureKind::Auth) => return Err(SyncError::ReauthRequired),
            _ => {}
        }
        self.transition(CoordinatorState::Refreshing);

        let fetched = tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => return Err(SyncError::Stopped),
            result = timeout(self.config.fetch_timeout, self.client.fetch_state()) => {
                result.unwrap_or(Err(ClientError::Timeout))
            }
        };

        match fetched {
            Ok(raw) => {
                let generation = self.normalizer.normalize(&raw);
                self.publish(generation);
                self.fetches_ok.fetch_add(1, Ordering::Relaxed);
                self.transition(CoordinatorState::Idle);
                Ok(())
            }
            Err(err) => {
                self.fetches_err.fetch_add(1, Ordering::Relaxed);
                Err(self.record_failure(err))
            }
        }
    }

    fn publish(&self, generation: SnapshotGeneration) {
        let entities = generation.len();
        let generation = Arc::new(generation);
        let mut seq = 0;
        self.published.send_modify(|current| {
            seq = current.seq + 1;
            *current = Arc::new(Published {
                seq,
                fetched_at: Some(Utc::now()),
                generation,
            });
        });
        debug!(seq, entities, "published snapshot generation");
    }

    fn record_failure(&self, err: ClientError) -> SyncError {
        match err.kind() {
            FailureKind::Auth => {
                error!(error = %err, "credentials rejected, reauthentication required");
                self.transition(CoordinatorState::Failed(FailureKind::Auth));
                lock(&self.run).cancel();
            }
            FailureKind::Transient => {
                warn!(error = %err, "refresh failed, retrying on the next tick");
                self.transition(CoordinatorState::Idle);
            }
            FailureKind::Protocol => {
                warn!(error = %err, "unexpected payload, keeping the previous snapshot");
                self.transition(CoordinatorState::Idle);
            }
        }
        err.into()
    }

    // `Failed(Auth)` only clears through `start`.
    fn transition(&self, next: CoordinatorState) {
        self.state.send_if_modified(|current| {
            let sticky = matches!(
                current,
                CoordinatorState::Stopped | CoordinatorState::Failed(FailureKind::Auth)
            );
            if sticky || *current == next {
                return false;
            }
            *current = next;
            true
        });
    }

    fn force_state(&self, next: CoordinatorState) {
        self.state.send_if_modified(|current| {
            if *current == CoordinatorState::Stopped || *current == next {
                return false;
            }
            *current = next;
            true
        });
    }
}

async fn wait_outcome(mut outcome: watch::Receiver<Outcome>) -> Result<(), SyncError> {
    match outcome.wait_for(Option::is_some).await {
        Ok(done) => (*done).clone().unwrap_or(Err(SyncError::Stopped)),
        Err(_) => Err(SyncError::Stopped),
    }
}

fn ticker(period: std::time::Duration) -> Interval {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

async fn tick_optional(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn schedule_loop<C: RemoteClient + 'static>(coordinator: Coordinator<C>, run: CancellationToken) {
    let config = &coordinator.inner.config;
    let mut refresh = ticker(config.update_interval);
    let mut keep_alive = config.keep_alive_interval.map(ticker);

    loop {
        tokio::select! {
            biased;
            _ = run.cancelled() => break,
            _ = refresh.tick() => {
                if coordinator.state() == CoordinatorState::Failed(FailureKind::Auth) {
                    break;
                }
                if let Err(err) = coordinator.request_refresh(false).await {
                    debug!(error = %err, "scheduled refresh not started");
                }
            }
            _ = tick_optional(&mut keep_alive) => {
                let alive = timeout(config.fetch_timeout, coordinator.inner.client.keep_alive())
                    .await
                    .unwrap_or(Err(ClientError::Timeout));
                if let Err(err) = alive {
                    warn!(error = %err, "session keep-alive failed");
                }
            }
        }
    }

    debug!("refresh scheduler stopped");
}

enum StreamEnd {
    Cancelled,
    Disconnected,
    Stopped,
}

async fn event_loop<C: RemoteClient + 'static>(coordinator: Coordinator<C>, run: CancellationToken) {
    let config = &coordinator.inner.config;
    let mut delay = config.reconnect_delay;

    loop {
        let subscribed = tokio::select! {
            biased;
            _ = run.cancelled() => break,
            result = timeout(config.fetch_timeout, coordinator.inner.client.subscribe()) => {
                result.unwrap_or(Err(ClientError::Timeout))
            }
        };

        match subscribed {
            Ok(None) => {
                debug!("client has no push channel, polling only");
                break;
            }
            Ok(Some(mut events)) => {
                info!("subscribed to push events");
                delay = config.reconnect_delay;

                let ended = loop {
                    tokio::select! {
                        biased;
                        _ = run.cancelled() => break StreamEnd::Cancelled,
                        event = events.recv() => match event {
                            Some(PushEvent::Changed { device_id }) => {
                                debug!(device_id = ?device_id, "push event, refreshing");
                                if let Err(err) = coordinator.request_refresh(false).await {
                                    debug!(error = %err, "push-triggered refresh not started");
                                }
                            }
                            Some(PushEvent::Disconnected) | None => break StreamEnd::Disconnected,
                            Some(PushEvent::Stopped) => break StreamEnd::Stopped,
                        },
                    }
                };

                match ended {
                    StreamEnd::Cancelled => break,
                    StreamEnd::Stopped => {
                        info!("push stream stopped, not resubscribing");
                        break;
                    }
                    StreamEnd::Disconnected => {
                        coordinator.inner.reconnects.fetch_add(1, Ordering::Relaxed);
                        warn!(delay_ms = delay.as_millis() as u64, "push stream disconnected");
                    }
                }
            }
            Err(err) if err.kind() == FailureKind::Auth => {
                coordinator.inner.record_failure(err);
                break;
            }
            Err(err) => {
                warn!(error = %err, delay_ms = delay.as_millis() as u64, "subscribe failed");
            }
        }

        tokio::select! {
            biased;
            _ = run.cancelled() => break,
            _ = sleep(delay) => {}
        }
        delay = (delay * 2).min(config.reconnect_delay_max);
    }

    debug!("push event loop stopped");
}
