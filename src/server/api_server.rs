//! API Server
//!
//! Request lifecycle on top of the proxy chain: session methods, worker
//! checkout per request, interactive sessions that keep a worker across
//! requests, and the implicit transaction wrapped around non-interactive
//! calls.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::api::{dispatch, ApiError, ApiMethod, ApiRequest, ApiResult, ApiValue};
use crate::auth::crypto::constant_time_str_eq;
use crate::auth::AuthenticationInfoProvider;
use crate::core::ProxyChain;
use crate::observability::{log_event_with_fields, Event, Logger};
use crate::pool::{PoolResult, Worker, WorkerGuard, WorkerPool};

/// How often the reaper looks for idle interactive workers
const REAPER_INTERVAL: Duration = Duration::from_millis(1000);

/// Keys and timeouts for the request lifecycle
#[derive(Debug, Clone)]
pub struct ApiServerConfig {
    pub interactive_session_key: String,
    pub transaction_manager_key: String,
    /// Idle time after which an interactive worker is rolled back
    pub worker_idle_timeout: Duration,
}

enum SessionSlot {
    Idle { worker: Worker, last_accessed: Instant },
    /// A request is running on the session's worker
    Busy,
}

/// Exclusive use of an interactive session's worker for one request.
///
/// Dropped without `release` (the request future was cancelled), the slot
/// is removed and the worker checked in as failed.
struct SessionLease<'a> {
    server: &'a ApiServer,
    token: String,
    guard: Option<WorkerGuard>,
}

impl SessionLease<'_> {
    fn guard(&mut self) -> ApiResult<&mut WorkerGuard> {
        self.guard
            .as_mut()
            .ok_or_else(|| ApiError::internal("Session worker already released"))
    }

    /// Park the worker for the next request, or end the session
    fn release(mut self, keep: bool, error: bool) {
        let Some(mut guard) = self.guard.take() else {
            return;
        };
        if keep {
            if let Some(worker) = guard.into_worker() {
                self.server.park(&self.token, worker);
            }
        } else {
            self.server.remove_slot(&self.token);
            guard.finish(error);
        }
    }
}

impl Drop for SessionLease<'_> {
    fn drop(&mut self) {
        if let Some(mut guard) = self.guard.take() {
            self.server.remove_slot(&self.token);
            guard.mark_failed();
        }
    }
}

/// Gateway request processor
pub struct ApiServer {
    chain: Arc<ProxyChain>,
    pool: Arc<WorkerPool>,
    authenticator: Arc<dyn AuthenticationInfoProvider>,
    config: ApiServerConfig,
    sessions: Mutex<HashMap<String, SessionSlot>>,
    shutdown: AtomicBool,
    reaper: Mutex<Option<JoinHandle<()>>>,
}

impl ApiServer {
    pub fn new(
        chain: Arc<ProxyChain>,
        pool: Arc<WorkerPool>,
        authenticator: Arc<dyn AuthenticationInfoProvider>,
        config: ApiServerConfig,
    ) -> Self {
        Self {
            chain,
            pool,
            authenticator,
            config,
            sessions: Mutex::new(HashMap::new()),
            shutdown: AtomicBool::new(false),
            reaper: Mutex::new(None),
        }
    }

    pub fn chain(&self) -> &Arc<ProxyChain> {
        &self.chain
    }

    pub fn pool(&self) -> &Arc<WorkerPool> {
        &self.pool
    }

    pub fn authenticator(&self) -> &Arc<dyn AuthenticationInfoProvider> {
        &self.authenticator
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Interactive sessions currently holding a worker
    pub fn has_workers_in_use(&self) -> bool {
        self.sessions
            .lock()
            .map(|sessions| !sessions.is_empty())
            .unwrap_or(false)
    }

    fn key_matches(expected: &str, given: Option<&str>) -> bool {
        given.is_some_and(|given| constant_time_str_eq(expected, given))
    }

    /// Process one parsed request
    pub async fn process_operation(&self, request: ApiRequest) -> ApiResult<ApiValue> {
        if self.is_shutting_down() {
            return Err(ApiError::shutting_down());
        }

        let method = request.api_method()?;
        request.check_parameters(method)?;

        if method.is_session_method() {
            return self.process_session_method(method, &request);
        }

        let interactive = Self::key_matches(
            &self.config.interactive_session_key,
            request.interactive_session_key.as_deref(),
        );
        let transaction_manager_mode = Self::key_matches(
            &self.config.transaction_manager_key,
            request.transaction_manager_key.as_deref(),
        );

        if !interactive && method.is_transaction_control() {
            return Err(ApiError::incorrect_parameters(format!(
                "Method '{}' is only available in an interactive session",
                method
            )));
        }

        match (interactive, request.session_token.clone()) {
            (true, Some(token)) => {
                self.process_interactive(method, &request, token, transaction_manager_mode)
                    .await
            }
            (true, None) => self.process_single(method, &request, transaction_manager_mode).await,
            (false, _) => {
                self.process_non_interactive(method, &request, transaction_manager_mode)
                    .await
            }
        }
    }

    fn process_session_method(
        &self,
        method: ApiMethod,
        request: &ApiRequest,
    ) -> ApiResult<ApiValue> {
        match method {
            ApiMethod::Login => {
                let user_id = request.string("userId")?;
                match self.authenticator.login(user_id, request.string("password")?) {
                    Ok(token) => {
                        log_event_with_fields(Event::LoginSucceeded, &[("user_id", user_id)]);
                        Ok(ApiValue::Json(Value::String(token)))
                    }
                    Err(e) => {
                        log_event_with_fields(Event::LoginFailed, &[("user_id", user_id)]);
                        Err(e.into())
                    }
                }
            }
            ApiMethod::Logout => {
                let token = request.session_token.as_deref().ok_or_else(|| {
                    ApiError::incorrect_parameters("logout requires a session token")
                })?;
                let revoked = self.authenticator.logout(token)?;
                self.end_session(token);
                Logger::info(Event::Logout.as_str(), &[("revoked", &revoked.to_string())]);
                Ok(ApiValue::Json(Value::Bool(revoked)))
            }
            ApiMethod::IsSessionValid => {
                let valid = request
                    .session_token
                    .as_deref()
                    .is_some_and(|token| self.authenticator.is_session_valid(token));
                Ok(ApiValue::Json(Value::Bool(valid)))
            }
            other => Err(ApiError::internal(format!(
                "Method '{}' is not a session method",
                other
            ))),
        }
    }

    async fn fresh_worker(
        &self,
        session_token: Option<&str>,
        transaction_manager_mode: bool,
    ) -> ApiResult<WorkerGuard> {
        let mut worker = self.pool.check_out().await?;
        let ctx = worker.context_mut();
        ctx.set_session_token(session_token.map(str::to_string));
        ctx.transaction_manager_mode = transaction_manager_mode;
        Ok(WorkerGuard::new(Arc::clone(&self.pool), worker))
    }

    /// One request on one worker, no implicit transaction
    async fn process_single(
        &self,
        method: ApiMethod,
        request: &ApiRequest,
        transaction_manager_mode: bool,
    ) -> ApiResult<ApiValue> {
        let mut guard = self.fresh_worker(None, transaction_manager_mode).await?;
        let ctx = guard
            .context_mut()
            .ok_or_else(|| ApiError::internal("Worker released early"))?;
        let result = dispatch(&self.chain, ctx, method, request).await;
        guard.finish(result.is_err());
        result
    }

    /// Fresh worker; with a session token the call is wrapped in its own
    /// transaction, committed on success and rolled back on failure
    async fn process_non_interactive(
        &self,
        method: ApiMethod,
        request: &ApiRequest,
        transaction_manager_mode: bool,
    ) -> ApiResult<ApiValue> {
        let Some(token) = request.session_token.as_deref() else {
            return self
                .process_single(method, request, transaction_manager_mode)
                .await;
        };

        let mut guard = self.fresh_worker(Some(token), transaction_manager_mode).await?;
        let ctx = guard
            .context_mut()
            .ok_or_else(|| ApiError::internal("Worker released early"))?;

        let result = async {
            self.chain.begin(ctx, Uuid::new_v4()).await?;
            let value = dispatch(&self.chain, ctx, method, request).await?;
            self.chain.commit(ctx).await?;
            Ok::<_, ApiError>(value)
        }
        .await;

        if result.is_err() && ctx.transaction_id.is_some() {
            if let Err(e) = self.chain.rollback(ctx).await {
                Logger::warn(
                    Event::TransactionRollback.as_str(),
                    &[("request_id", &ctx.request_id.to_string()), ("error", &e.to_string())],
                );
            }
        }
        guard.finish(result.is_err());
        result
    }

    /// Run on the worker bound to `token`, checking one out on first use
    async fn process_interactive(
        &self,
        method: ApiMethod,
        request: &ApiRequest,
        token: String,
        transaction_manager_mode: bool,
    ) -> ApiResult<ApiValue> {
        let mut lease = self
            .lease(token.clone(), transaction_manager_mode)
            .await?;

        let guard = lease.guard()?;
        let ctx = guard
            .context_mut()
            .ok_or_else(|| ApiError::internal("Worker released early"))?;
        let result = dispatch(&self.chain, ctx, method, request).await;

        let error = result.is_err();
        let keep = !error && !method.finishes_session();
        lease.release(keep, error);
        result
    }

    async fn lease(
        &self,
        token: String,
        transaction_manager_mode: bool,
    ) -> ApiResult<SessionLease<'_>> {
        let parked = {
            let mut sessions = self
                .sessions
                .lock()
                .map_err(|_| ApiError::internal("Session table lock poisoned"))?;
            match sessions.insert(token.clone(), SessionSlot::Busy) {
                Some(SessionSlot::Idle { worker, .. }) => Some(worker),
                Some(SessionSlot::Busy) => return Err(ApiError::session_busy()),
                None => None,
            }
        };

        let guard = match parked {
            Some(worker) => WorkerGuard::new(Arc::clone(&self.pool), worker),
            None => match self.fresh_worker(Some(&token), transaction_manager_mode).await {
                Ok(guard) => guard,
                Err(e) => {
                    self.remove_slot(&token);
                    return Err(e);
                }
            },
        };

        Ok(SessionLease {
            server: self,
            token,
            guard: Some(guard),
        })
    }

    fn park(&self, token: &str, worker: Worker) {
        match self.sessions.lock() {
            Ok(mut sessions) => {
                sessions.insert(
                    token.to_string(),
                    SessionSlot::Idle {
                        worker,
                        last_accessed: Instant::now(),
                    },
                );
            }
            Err(_) => self.pool.check_in(true, worker),
        }
    }

    fn remove_slot(&self, token: &str) -> Option<Worker> {
        let slot = self.sessions.lock().ok()?.remove(token)?;
        match slot {
            SessionSlot::Idle { worker, .. } => Some(worker),
            SessionSlot::Busy => None,
        }
    }

    /// Drop an interactive session, rolling back its open transaction
    fn end_session(&self, token: &str) {
        if let Some(worker) = self.remove_slot(token) {
            self.pool.check_in(true, worker);
        }
    }

    /// Roll back and check in interactive workers idle for longer than the
    /// configured timeout. Returns how many were reclaimed.
    pub fn reap_idle_workers(&self) -> usize {
        let timeout = self.config.worker_idle_timeout;
        let expired: Vec<Worker> = match self.sessions.lock() {
            Ok(mut sessions) => {
                let tokens: Vec<String> = sessions
                    .iter()
                    .filter_map(|(token, slot)| match slot {
                        SessionSlot::Idle { last_accessed, .. }
                            if last_accessed.elapsed() > timeout =>
                        {
                            Some(token.clone())
                        }
                        _ => None,
                    })
                    .collect();
                tokens
                    .iter()
                    .filter_map(|token| match sessions.remove(token) {
                        Some(SessionSlot::Idle { worker, .. }) => Some(worker),
                        _ => None,
                    })
                    .collect()
            }
            Err(_) => Vec::new(),
        };

        let count = expired.len();
        for worker in expired {
            log_event_with_fields(Event::WorkerReaped, &[("worker_id", &worker.id().to_string())]);
            self.pool.check_in(true, worker);
        }
        count
    }

    /// Drop expired sessions from the authenticator
    pub fn purge_expired_sessions(&self) -> usize {
        match self.authenticator.purge_expired() {
            Ok(0) => 0,
            Ok(count) => {
                log_event_with_fields(Event::SessionsPurged, &[("count", &count.to_string())]);
                count
            }
            Err(e) => {
                Logger::warn(Event::SessionsPurged.as_str(), &[("error", &e.to_string())]);
                0
            }
        }
    }

    /// Spawn the background task that reaps idle interactive workers and
    /// expired sessions
    pub fn start_reaper(self: &Arc<Self>) {
        let server: Weak<ApiServer> = Arc::downgrade(self);
        let period = REAPER_INTERVAL.min(self.config.worker_idle_timeout.max(Duration::from_millis(10)));
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                let Some(server) = server.upgrade() else {
                    break;
                };
                if server.is_shutting_down() {
                    break;
                }
                server.reap_idle_workers();
                server.purge_expired_sessions();
            }
        });
        if let Ok(mut reaper) = self.reaper.lock() {
            if let Some(previous) = reaper.replace(handle) {
                previous.abort();
            }
        }
    }

    /// Refuse new requests, stop the reaper and roll back parked sessions
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
        if let Ok(mut reaper) = self.reaper.lock() {
            if let Some(handle) = reaper.take() {
                handle.abort();
            }
        }

        let parked: Vec<Worker> = match self.sessions.lock() {
            Ok(mut sessions) => sessions
                .drain()
                .filter_map(|(_, slot)| match slot {
                    SessionSlot::Idle { worker, .. } => Some(worker),
                    SessionSlot::Busy => None,
                })
                .collect(),
            Err(_) => Vec::new(),
        };
        for worker in parked {
            self.pool.check_in(true, worker);
        }
    }

    /// Check out a worker for an extension such as archive streaming
    pub async fn check_out(&self) -> PoolResult<Worker> {
        self.pool.check_out().await
    }

    pub fn check_in(&self, error: bool, worker: Worker) {
        self.pool.check_in(error, worker);
    }
}

impl Drop for ApiServer {
    fn drop(&mut self) {
        if let Ok(mut reaper) = self.reaper.lock() {
            if let Some(handle) = reaper.take() {
                handle.abort();
            }
        }
    }
}
