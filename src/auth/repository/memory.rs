// In-process auth storage
//
// Refresh tokens live in an arena keyed by id with a digest index; rotation
// inserts a new record and flips the old one's revoked_at/replaced_by.
// A single async mutex serialises every read-modify-write, which gives the
// same per-key atomicity the Postgres row locks provide.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::auth::{
    error::AuthError,
    models::{LoginAttempt, LoginIpLimit, RefreshToken, User},
    repository::{
        CredentialStore, LoginAttemptTracker, LoginIpLimitStore, RefreshTokenLedger, StoreHealth,
    },
    token::hash_refresh_token,
};

#[derive(Debug, Clone)]
struct AttemptRow {
    attempt: LoginAttempt,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct MemoryState {
    users: Vec<User>,
    attempts: HashMap<String, AttemptRow>,
    tokens: BTreeMap<Uuid, RefreshToken>,
    tokens_by_hash: HashMap<String, Uuid>,
    ip_limits: HashMap<String, LoginIpLimit>,
}

impl MemoryState {
    fn insert_token(&mut self, token: RefreshToken) {
        self.tokens_by_hash.insert(token.token_hash.clone(), token.id);
        self.tokens.insert(token.id, token);
    }

    fn token_id_for(&self, raw_token: &str) -> Option<Uuid> {
        self.tokens_by_hash
            .get(&hash_refresh_token(raw_token))
            .copied()
    }
}

/// Auth storage held entirely in memory
///
/// Suitable for single-instance deployments and tests. Cloning shares state.
#[derive(Debug, Clone, Default)]
pub struct MemoryAuthRepository {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryAuthRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every ledger record in creation order
    pub async fn refresh_tokens(&self) -> Vec<RefreshToken> {
        let state = self.state.lock().await;
        let mut tokens: Vec<RefreshToken> = state.tokens.values().cloned().collect();
        tokens.sort_by_key(|t| (t.created_at, t.id));
        tokens
    }

    pub async fn users(&self) -> Vec<User> {
        self.state.lock().await.users.clone()
    }

    pub async fn ip_limit(&self, ip: &str) -> Option<LoginIpLimit> {
        self.state.lock().await.ip_limits.get(ip).cloned()
    }
}

#[async_trait]
impl CredentialStore for MemoryAuthRepository {
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, AuthError> {
        let state = self.state.lock().await;
        Ok(state.users.iter().find(|u| u.username == username).cloned())
    }

    async fn upsert_sole_user(
        &self,
        username: &str,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<User, AuthError> {
        let mut state = self.state.lock().await;

        let survivor = match state.users.iter().min_by_key(|u| (u.created_at, u.id)) {
            Some(existing) => User {
                username: username.to_string(),
                password_hash: password_hash.to_string(),
                updated_at: now,
                ..existing.clone()
            },
            None => User {
                id: Uuid::now_v7(),
                username: username.to_string(),
                password_hash: password_hash.to_string(),
                created_at: now,
                updated_at: now,
            },
        };

        state.users = vec![survivor.clone()];
        Ok(survivor)
    }
}

#[async_trait]
impl LoginAttemptTracker for MemoryAuthRepository {
    async fn get_attempt(&self, username: &str) -> Result<LoginAttempt, AuthError> {
        let state = self.state.lock().await;
        Ok(state
            .attempts
            .get(username)
            .map(|row| row.attempt.clone())
            .unwrap_or_else(|| LoginAttempt::empty(username)))
    }

    async fn register_failure(
        &self,
        username: &str,
        max_attempts: u32,
        lock_duration: Duration,
        now: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>, AuthError> {
        let mut state = self.state.lock().await;

        let current = state
            .attempts
            .get(username)
            .map(|row| row.attempt.clone())
            .unwrap_or_else(|| LoginAttempt::empty(username));

        if let Some(until) = current.active_lock(now) {
            return Ok(Some(until));
        }

        let failed = current.failed_attempts + 1;
        let (failed, locked_until) = if failed as i64 >= max_attempts as i64 {
            (0, Some(now + lock_duration))
        } else {
            (failed, None)
        };

        state.attempts.insert(
            username.to_string(),
            AttemptRow {
                attempt: LoginAttempt {
                    username: username.to_string(),
                    failed_attempts: failed,
                    locked_until,
                },
                updated_at: now,
            },
        );

        Ok(locked_until)
    }

    async fn reset(&self, username: &str) -> Result<(), AuthError> {
        self.state.lock().await.attempts.remove(username);
        Ok(())
    }

    async fn delete_stale_attempts(
        &self,
        cutoff: DateTime<Utc>,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<u64, AuthError> {
        let mut state = self.state.lock().await;

        let stale: Vec<String> = state
            .attempts
            .iter()
            .filter(|(_, row)| row.updated_at < cutoff && row.attempt.active_lock(now).is_none())
            .map(|(username, _)| username.clone())
            .take(limit.max(0) as usize)
            .collect();

        for username in &stale {
            state.attempts.remove(username);
        }
        Ok(stale.len() as u64)
    }
}

#[async_trait]
impl RefreshTokenLedger for MemoryAuthRepository {
    async fn create(
        &self,
        user_id: Uuid,
        raw_token: &str,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<RefreshToken, AuthError> {
        let mut state = self.state.lock().await;

        let token_hash = hash_refresh_token(raw_token);
        if state.tokens_by_hash.contains_key(&token_hash) {
            return Err(AuthError::DatabaseError(
                "duplicate refresh token hash".to_string(),
            ));
        }

        let record = RefreshToken {
            id: Uuid::now_v7(),
            user_id,
            token_hash,
            expires_at,
            revoked_at: None,
            replaced_by: None,
            created_at: now,
        };
        state.insert_token(record.clone());
        Ok(record)
    }

    async fn rotate(
        &self,
        raw_old_token: &str,
        raw_new_token: &str,
        new_expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Uuid, AuthError> {
        let mut state = self.state.lock().await;

        let old_id = state
            .token_id_for(raw_old_token)
            .ok_or(AuthError::InvalidRefreshToken)?;
        let old = state
            .tokens
            .get(&old_id)
            .cloned()
            .ok_or(AuthError::InvalidRefreshToken)?;

        if !old.is_usable(now) {
            if old.replaced_by.is_some() {
                tracing::warn!(token_id = %old.id, user_id = %old.user_id, "Rotated refresh token presented again");
            }
            return Err(AuthError::InvalidRefreshToken);
        }

        let new_hash = hash_refresh_token(raw_new_token);
        if state.tokens_by_hash.contains_key(&new_hash) {
            return Err(AuthError::DatabaseError(
                "duplicate refresh token hash".to_string(),
            ));
        }

        let successor = RefreshToken {
            id: Uuid::now_v7(),
            user_id: old.user_id,
            token_hash: new_hash,
            expires_at: new_expires_at,
            revoked_at: None,
            replaced_by: None,
            created_at: now,
        };
        let successor_id = successor.id;
        state.insert_token(successor);

        if let Some(record) = state.tokens.get_mut(&old_id) {
            record.revoked_at = Some(now);
            record.replaced_by = Some(successor_id);
        }

        Ok(old.user_id)
    }

    async fn revoke(&self, raw_token: &str, now: DateTime<Utc>) -> Result<bool, AuthError> {
        let mut state = self.state.lock().await;

        let Some(id) = state.token_id_for(raw_token) else {
            return Ok(false);
        };
        if let Some(record) = state.tokens.get_mut(&id) {
            record.revoked_at.get_or_insert(now);
        }
        Ok(true)
    }

    async fn delete_stale_tokens(
        &self,
        cutoff: DateTime<Utc>,
        limit: i64,
    ) -> Result<u64, AuthError> {
        let mut state = self.state.lock().await;

        let stale: Vec<(Uuid, String)> = state
            .tokens
            .values()
            .filter(|t| t.expires_at < cutoff || t.revoked_at.is_some_and(|at| at < cutoff))
            .map(|t| (t.id, t.token_hash.clone()))
            .take(limit.max(0) as usize)
            .collect();

        for (id, hash) in &stale {
            state.tokens.remove(id);
            state.tokens_by_hash.remove(hash);
        }

        // Survivors must not point at deleted successors
        for record in state.tokens.values_mut() {
            if record
                .replaced_by
                .is_some_and(|next| stale.iter().any(|(id, _)| *id == next))
            {
                record.replaced_by = None;
            }
        }
        Ok(stale.len() as u64)
    }
}

#[async_trait]
impl LoginIpLimitStore for MemoryAuthRepository {
    async fn record_hit(
        &self,
        ip: &str,
        window: Duration,
        now: DateTime<Utc>,
    ) -> Result<LoginIpLimit, AuthError> {
        let mut state = self.state.lock().await;

        let row = state
            .ip_limits
            .entry(ip.to_string())
            .and_modify(|row| {
                if row.window_started_at <= now - window {
                    row.window_started_at = now;
                    row.hits = 1;
                } else {
                    row.hits += 1;
                }
            })
            .or_insert_with(|| LoginIpLimit {
                ip: ip.to_string(),
                window_started_at: now,
                hits: 1,
            });

        Ok(row.clone())
    }

    async fn delete_stale_limits(
        &self,
        cutoff: DateTime<Utc>,
        limit: i64,
    ) -> Result<u64, AuthError> {
        let mut state = self.state.lock().await;

        let stale: Vec<String> = state
            .ip_limits
            .values()
            .filter(|row| row.window_started_at < cutoff)
            .map(|row| row.ip.clone())
            .take(limit.max(0) as usize)
            .collect();

        for ip in &stale {
            state.ip_limits.remove(ip);
        }
        Ok(stale.len() as u64)
    }
}

#[async_trait]
impl StoreHealth for MemoryAuthRepository {
    async fn ping(&self) -> Result<(), AuthError> {
        Ok(())
    }
}
