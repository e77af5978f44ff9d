// SPDX-FileCopyrightText: 2026 Murmur Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-user session lifecycle: active, idle, closed.
//!
//! A user has at most one active session. A turn after the idle sweep reuses
//! the most recently idled session when it went idle no longer than the
//! reactivation window ago; otherwise a fresh session is started. Closed is
//! terminal. The store enforces the single-active invariant; the manager
//! serializes lookups per user so one process never races itself.

use std::sync::Arc;
use std::time::Duration;

use chrono::Duration as ChronoDuration;
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use murmur_config::model::SessionConfig;
use murmur_core::time::{format_timestamp, new_id, parse_timestamp};
use murmur_core::types::{Session, SessionState};
use murmur_core::{CacheAdapter, Clock, MurmurError, StorageAdapter};

/// How a session was obtained for a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionOrigin {
    Existing,
    Reactivated,
    Created,
}

/// Owns the session state machine on top of the store and cache.
pub struct SessionManager {
    storage: Arc<dyn StorageAdapter>,
    cache: Arc<dyn CacheAdapter>,
    clock: Arc<dyn Clock>,
    config: SessionConfig,
    cache_ttl: Duration,
    user_locks: DashMap<String, Arc<Mutex<()>>>,
    session_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl SessionManager {
    pub fn new(
        storage: Arc<dyn StorageAdapter>,
        cache: Arc<dyn CacheAdapter>,
        clock: Arc<dyn Clock>,
        config: SessionConfig,
        cache_ttl: Duration,
    ) -> Self {
        Self {
            storage,
            cache,
            clock,
            config,
            cache_ttl,
            user_locks: DashMap::new(),
            session_locks: DashMap::new(),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// The active session for `user_id`, reactivating or creating one as needed.
    pub async fn get_or_create_session(&self, user_id: &str) -> Result<Session, MurmurError> {
        self.resolve(user_id, None).await.map(|(session, _)| session)
    }

    /// Like [`get_or_create_session`](Self::get_or_create_session) but
    /// prefers `hint` when it names a session of this user that can be
    /// continued, and reports how the session was obtained.
    pub async fn resolve(
        &self,
        user_id: &str,
        hint: Option<&str>,
    ) -> Result<(Session, SessionOrigin), MurmurError> {
        if user_id.trim().is_empty() {
            return Err(MurmurError::Validation("user id is empty".into()));
        }
        let lock = Self::lock_for(&self.user_locks, user_id);
        let _guard = lock.lock().await;

        if let Some(found) = self.cached_active(user_id).await? {
            return Ok((found, SessionOrigin::Existing));
        }

        if let Some(active) = self.storage.get_active_session_for_user(user_id).await? {
            if let Some(hint) = hint
                && hint != active.id
            {
                debug!(user = user_id, hint, active = %active.id, "ignoring stale session hint");
            }
            self.remember(&active).await;
            return Ok((active, SessionOrigin::Existing));
        }

        if let Some(session) = self.try_reactivate(user_id, hint).await? {
            return Ok((session, SessionOrigin::Reactivated));
        }

        self.create(user_id).await
    }

    /// Record activity on an active session. Returns false if the session
    /// exists but is not active.
    pub async fn touch(&self, session_id: &str) -> Result<bool, MurmurError> {
        let now = format_timestamp(self.clock.now());
        if self.storage.touch_active_session(session_id, &now).await? {
            return Ok(true);
        }
        match self.storage.get_session(session_id).await? {
            Some(_) => Ok(false),
            None => Err(MurmurError::not_found("session", session_id)),
        }
    }

    /// Move every active session idle for longer than `timeout` to idle.
    /// Returns the number of sessions that changed.
    pub async fn sweep_idle(&self, timeout: Duration) -> Result<usize, MurmurError> {
        let now = self.clock.now();
        let timeout = ChronoDuration::from_std(timeout)
            .map_err(|e| MurmurError::Validation(format!("session timeout out of range: {e}")))?;
        let cutoff = format_timestamp(now - timeout);
        let idled = self
            .storage
            .mark_idle_sessions(&cutoff, &format_timestamp(now))
            .await?;

        for session in &idled {
            self.forget(session).await;
            info!(
                session_id = %session.id,
                user = %session.user_id,
                messages = session.message_count,
                "session idled"
            );
        }
        if !idled.is_empty() {
            self.report_active().await;
        }
        Ok(idled.len())
    }

    /// Administratively close a session. Returns false if it was already closed.
    pub async fn close_session(&self, session_id: &str) -> Result<bool, MurmurError> {
        let session = self
            .storage
            .get_session(session_id)
            .await?
            .ok_or_else(|| MurmurError::not_found("session", session_id))?;
        let now = format_timestamp(self.clock.now());
        let closed = self.storage.close_session(session_id, &now).await?;
        self.forget(&session).await;
        if closed {
            info!(session_id, user = %session.user_id, "session closed");
            self.report_active().await;
        }
        Ok(closed)
    }

    /// Note that a write moved an idle session back to active.
    pub async fn resumed(&self, session: &Session) {
        info!(user = %session.user_id, session_id = %session.id, "idle session resumed by a write");
        self.remember(session).await;
        self.report_active().await;
    }

    /// Lock serializing writes to one session's history.
    pub fn session_lock(&self, session_id: &str) -> Arc<Mutex<()>> {
        Self::lock_for(&self.session_locks, session_id)
    }

    /// Session id cached for `user_id`, re-verified against the store.
    async fn cached_active(&self, user_id: &str) -> Result<Option<Session>, MurmurError> {
        let key = Self::cache_key(user_id);
        let cached = match self.cache.get(&key).await {
            Ok(cached) => cached,
            Err(e) => {
                debug!(key, error = %e, "session cache read failed");
                None
            }
        };
        let Some(session_id) = cached else {
            return Ok(None);
        };
        match self.storage.get_session(&session_id).await? {
            Some(session) if session.state == SessionState::Active && session.user_id == user_id => {
                Ok(Some(session))
            }
            _ => {
                debug!(user = user_id, session_id, "cached session no longer active");
                self.evict(user_id).await;
                Ok(None)
            }
        }
    }

    async fn try_reactivate(
        &self,
        user_id: &str,
        hint: Option<&str>,
    ) -> Result<Option<Session>, MurmurError> {
        let candidate = match hint {
            Some(hint) => match self.storage.get_session(hint).await? {
                Some(s) if s.user_id == user_id && s.state == SessionState::Idle => Some(s),
                _ => self.storage.get_latest_idle_session_for_user(user_id).await?,
            },
            None => self.storage.get_latest_idle_session_for_user(user_id).await?,
        };
        let Some(candidate) = candidate else {
            return Ok(None);
        };
        if !self.within_window(&candidate)? {
            debug!(user = user_id, session_id = %candidate.id, "idle session outside reactivation window");
            return Ok(None);
        }

        let now = format_timestamp(self.clock.now());
        if !self.storage.reactivate_session(&candidate.id, &now).await? {
            warn!(user = user_id, session_id = %candidate.id, "reactivation lost a race");
            return Ok(None);
        }
        match self.storage.get_session(&candidate.id).await? {
            Some(session) if session.state == SessionState::Active => {
                info!(user = user_id, session_id = %session.id, "session reactivated");
                self.remember(&session).await;
                self.report_active().await;
                Ok(Some(session))
            }
            _ => Ok(None),
        }
    }

    fn within_window(&self, session: &Session) -> Result<bool, MurmurError> {
        let since = session.idled_at.as_deref().unwrap_or(&session.last_activity_at);
        let idle_for = self.clock.now() - parse_timestamp(since)?;
        let window = ChronoDuration::seconds(
            i64::try_from(self.config.reactivation_window_secs).unwrap_or(i64::MAX),
        );
        Ok(idle_for <= window)
    }

    async fn create(&self, user_id: &str) -> Result<(Session, SessionOrigin), MurmurError> {
        let now = format_timestamp(self.clock.now());
        let session = Session {
            id: new_id(),
            user_id: user_id.to_string(),
            state: SessionState::Active,
            started_at: now.clone(),
            last_activity_at: now,
            idled_at: None,
            closed_at: None,
            message_count: 0,
        };
        match self.storage.create_session(&session).await {
            Ok(()) => {}
            Err(MurmurError::Validation(reason)) => {
                // Another writer created the active session first.
                let active = self.storage.get_active_session_for_user(user_id).await?;
                return match active {
                    Some(active) => {
                        self.remember(&active).await;
                        Ok((active, SessionOrigin::Existing))
                    }
                    None => Err(MurmurError::Validation(reason)),
                };
            }
            Err(e) => return Err(e),
        }
        info!(user = user_id, session_id = %session.id, "session created");
        self.remember(&session).await;
        self.report_active().await;
        Ok((session, SessionOrigin::Created))
    }

    async fn remember(&self, session: &Session) {
        let key = Self::cache_key(&session.user_id);
        if let Err(e) = self.cache.set(&key, session.id.clone(), self.cache_ttl).await {
            debug!(key, error = %e, "session cache write failed");
        }
    }

    async fn forget(&self, session: &Session) {
        self.evict(&session.user_id).await;
        // A writer still holding the lock keeps the entry.
        self.session_locks
            .remove_if(&session.id, |_, lock| Arc::strong_count(lock) == 1);
    }

    async fn evict(&self, user_id: &str) {
        let key = Self::cache_key(user_id);
        if let Err(e) = self.cache.delete(&key).await {
            debug!(key, error = %e, "session cache delete failed");
        }
    }

    async fn report_active(&self) {
        match self.storage.count_active_sessions().await {
            Ok(count) => metrics::gauge!("murmur_active_sessions").set(count as f64),
            Err(e) => debug!(error = %e, "could not count active sessions"),
        }
    }

    fn cache_key(user_id: &str) -> String {
        format!("session:{user_id}")
    }

    fn lock_for(locks: &DashMap<String, Arc<Mutex<()>>>, key: &str) -> Arc<Mutex<()>> {
        Arc::clone(
            locks
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .value(),
        )
    }
}
