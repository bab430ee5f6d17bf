//! In-memory stores for tests.
//!
//! Both stores keep their state behind a `std::sync::Mutex` and never hold
//! the guard across an await point.

use crate::error::{DatabaseError, Result};
use crate::store::{AuthStore, LogStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use ticketing_models::{
    DedupKey, FailedLogin, LockoutPolicy, LogFilter, LogQuery, LogRecord, LogRepeat,
    NewLogRecord, NewSession, NewUser, SecurityAttributes, Session, User, UserAccount,
    UserPreferences,
};
use uuid::Uuid;

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|_| DatabaseError::Other("Mutex lock failed".to_string()))
}

#[derive(Default)]
struct LogTable {
    rows: Vec<LogRecord>,
    next_id: i64,
}

/// In-memory [`LogStore`] with switchable failures.
#[derive(Clone, Default)]
pub struct MemoryLogStore {
    table: Arc<Mutex<LogTable>>,
    fail_lookups: Arc<AtomicBool>,
    fail_inserts: Arc<AtomicBool>,
    insert_calls: Arc<AtomicUsize>,
}

impl MemoryLogStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `find_recent_duplicate` return an error.
    pub fn fail_lookups(&self, fail: bool) {
        self.fail_lookups.store(fail, Ordering::SeqCst);
    }

    /// Make `insert_batch` return an error.
    pub fn fail_inserts(&self, fail: bool) {
        self.fail_inserts.store(fail, Ordering::SeqCst);
    }

    /// Number of `insert_batch` calls, failed ones included.
    pub fn insert_calls(&self) -> usize {
        self.insert_calls.load(Ordering::SeqCst)
    }

    /// Snapshot of every stored row in insertion order.
    pub fn records(&self) -> Vec<LogRecord> {
        self.table
            .lock()
            .map(|table| table.rows.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl LogStore for MemoryLogStore {
    async fn find_recent_duplicate(
        &self,
        key: DedupKey<'_>,
        since: DateTime<Utc>,
    ) -> Result<Option<LogRecord>> {
        if self.fail_lookups.load(Ordering::SeqCst) {
            return Err(DatabaseError::Other("lookup failed".to_string()));
        }

        let table = lock(&self.table)?;
        Ok(table
            .rows
            .iter()
            .filter(|row| row.deleted_at.is_none() && row.created_at >= since)
            .filter(|row| row.dedup_key() == Some(key))
            .max_by_key(|row| row.created_at)
            .cloned())
    }

    async fn record_repeat(&self, id: i64, repeat: &LogRepeat) -> Result<()> {
        let mut table = lock(&self.table)?;
        let row = table
            .rows
            .iter_mut()
            .find(|row| row.id == id)
            .ok_or_else(|| DatabaseError::not_found("Log", &id.to_string()))?;

        row.absorb(repeat);
        Ok(())
    }

    async fn insert_batch(&self, records: &[NewLogRecord]) -> Result<u64> {
        self.insert_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(DatabaseError::Other("insert failed".to_string()));
        }

        let mut table = lock(&self.table)?;
        for record in records {
            table.next_id += 1;
            let id = table.next_id;
            table.rows.push(LogRecord {
                id,
                level: record.level,
                message: record.message.clone(),
                route: record.route.clone(),
                method: record.method.clone(),
                status_code: record.status_code,
                ip_address: record.ip_address.clone(),
                user_agent: record.user_agent.clone(),
                file: record.file.clone(),
                line: record.line,
                stack: record.stack.clone(),
                environment: record.environment.clone(),
                context: record.context.clone(),
                occurrences: record.occurrences,
                created_at: record.created_at,
                updated_at: record.updated_at,
                deleted_at: None,
            });
        }

        Ok(records.len() as u64)
    }

    async fn query(&self, query: &LogQuery) -> Result<Vec<LogRecord>> {
        let table = lock(&self.table)?;
        let mut rows: Vec<LogRecord> = table
            .rows
            .iter()
            .filter(|row| query.matches(row))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        Ok(rows
            .into_iter()
            .skip(query.offset.max(0) as usize)
            .take(query.limit.max(0) as usize)
            .collect())
    }

    async fn delete(&self, filters: &[LogFilter]) -> Result<u64> {
        let mut table = lock(&self.table)?;
        let before = table.rows.len();
        table
            .rows
            .retain(|row| !filters.iter().all(|filter| filter.matches(row)));

        Ok((before - table.rows.len()) as u64)
    }
}

#[derive(Default)]
struct AuthTables {
    roles: HashMap<String, Uuid>,
    users: HashMap<Uuid, User>,
    security: HashMap<Uuid, SecurityAttributes>,
    preferences: HashMap<Uuid, UserPreferences>,
    sessions: Vec<Session>,
}

impl AuthTables {
    fn account(&self, user_id: Uuid) -> Option<UserAccount> {
        let user = self.users.get(&user_id)?.clone();
        let security = self.security.get(&user_id)?.clone();
        Some(UserAccount { user, security })
    }

    fn security_mut(&mut self, user_id: Uuid) -> Result<&mut SecurityAttributes> {
        self.security
            .get_mut(&user_id)
            .ok_or_else(|| DatabaseError::not_found("SecurityAttributes", &user_id.to_string()))
    }
}

/// In-memory [`AuthStore`].
#[derive(Clone, Default)]
pub struct MemoryAuthStore {
    tables: Arc<Mutex<AuthTables>>,
    end_session_delay: Arc<Mutex<Option<Duration>>>,
}

impl MemoryAuthStore {
    /// An empty store without any roles.
    pub fn new() -> Self {
        Self::default()
    }

    /// A store seeded with the `guest` role sign-up requires.
    pub fn with_guest_role() -> Self {
        let store = Self::new();
        if let Ok(mut tables) = store.tables.lock() {
            tables.roles.insert("guest".to_string(), Uuid::new_v4());
        }
        store
    }

    pub fn security_of(&self, user_id: Uuid) -> Option<SecurityAttributes> {
        self.tables
            .lock()
            .ok()
            .and_then(|tables| tables.security.get(&user_id).cloned())
    }

    pub fn preferences_of(&self, user_id: Uuid) -> Option<UserPreferences> {
        self.tables
            .lock()
            .ok()
            .and_then(|tables| tables.preferences.get(&user_id).cloned())
    }

    /// Every session ever created, active or not.
    pub fn sessions(&self) -> Vec<Session> {
        self.tables
            .lock()
            .map(|tables| tables.sessions.clone())
            .unwrap_or_default()
    }

    /// Make `end_session` wait before committing, to widen logout races.
    pub fn delay_end_session(&self, delay: Duration) {
        if let Ok(mut slot) = self.end_session_delay.lock() {
            *slot = Some(delay);
        }
    }

    /// Overwrite a session in place, e.g. to expire it.
    pub fn update_session(&self, session_token: &str, f: impl FnOnce(&mut Session)) {
        if let Ok(mut tables) = self.tables.lock() {
            if let Some(session) = tables
                .sessions
                .iter_mut()
                .find(|s| s.session_token == session_token)
            {
                f(session);
            }
        }
    }

    /// Overwrite security attributes, e.g. to expire a token in a test.
    pub fn update_security(&self, user_id: Uuid, f: impl FnOnce(&mut SecurityAttributes)) {
        if let Ok(mut tables) = self.tables.lock() {
            if let Some(security) = tables.security.get_mut(&user_id) {
                f(security);
            }
        }
    }
}

#[async_trait]
impl AuthStore for MemoryAuthStore {
    async fn guest_role_id(&self) -> Result<Option<Uuid>> {
        Ok(lock(&self.tables)?.roles.get("guest").copied())
    }

    async fn username_exists(&self, username: &str) -> Result<bool> {
        Ok(lock(&self.tables)?
            .users
            .values()
            .any(|u| u.username == username))
    }

    async fn email_exists(&self, email: &str) -> Result<bool> {
        Ok(lock(&self.tables)?.users.values().any(|u| u.email == email))
    }

    async fn create_account(
        &self,
        user: &NewUser,
        security: &SecurityAttributes,
        preferences: &UserPreferences,
    ) -> Result<User> {
        let mut tables = lock(&self.tables)?;

        if tables.users.values().any(|u| u.username == user.username) {
            return Err(DatabaseError::duplicate("username"));
        }
        if tables.users.values().any(|u| u.email == user.email) {
            return Err(DatabaseError::duplicate("email"));
        }

        let now = security.updated_at;
        let created = User {
            id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            phone: user.phone.clone(),
            date_of_birth: user.date_of_birth,
            role_id: user.role_id,
            created_at: now,
            updated_at: now,
        };

        tables.users.insert(user.id, created.clone());
        tables.security.insert(user.id, security.clone());
        tables.preferences.insert(user.id, preferences.clone());
        Ok(created)
    }

    async fn find_account_by_id(&self, user_id: Uuid) -> Result<Option<UserAccount>> {
        Ok(lock(&self.tables)?.account(user_id))
    }

    async fn find_account_by_identifier(&self, identifier: &str) -> Result<Option<UserAccount>> {
        let tables = lock(&self.tables)?;
        let id = tables
            .users
            .values()
            .find(|u| u.username == identifier || u.email == identifier)
            .map(|u| u.id);

        Ok(id.and_then(|id| tables.account(id)))
    }

    async fn find_account_by_reset_token(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<UserAccount>> {
        let tables = lock(&self.tables)?;
        let id = tables
            .security
            .values()
            .find(|s| s.active_reset_token(now) == Some(token))
            .map(|s| s.user_id);

        Ok(id.and_then(|id| tables.account(id)))
    }

    async fn set_verification_token(
        &self,
        user_id: Uuid,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut tables = lock(&self.tables)?;
        let security = tables.security_mut(user_id)?;
        security.email_verification_token = Some(token.to_string());
        security.email_token_expiry = Some(expires_at);
        Ok(())
    }

    async fn mark_email_verified(&self, user_id: Uuid, now: DateTime<Utc>) -> Result<()> {
        let mut tables = lock(&self.tables)?;
        let security = tables.security_mut(user_id)?;
        security.email_verified = true;
        security.email_verified_at = Some(now);
        security.email_verification_token = None;
        security.email_token_expiry = None;
        security.updated_at = now;
        let pending = security.pending_email.clone().filter(|e| !e.is_empty());

        if let Some(email) = pending {
            let adopted = match tables.users.get_mut(&user_id) {
                Some(user) if user.email.is_empty() => {
                    user.email = email;
                    user.updated_at = now;
                    true
                }
                _ => false,
            };
            if adopted {
                tables.security_mut(user_id)?.pending_email = None;
            }
        }
        Ok(())
    }

    async fn record_failed_login(
        &self,
        user_id: Uuid,
        policy: LockoutPolicy,
        now: DateTime<Utc>,
    ) -> Result<FailedLogin> {
        let mut tables = lock(&self.tables)?;
        let security = tables.security_mut(user_id)?;
        security.failed_login_attempts += 1;
        let attempts = security.failed_login_attempts;
        let lock_until = policy.lock_until(attempts, now);
        if lock_until.is_some() {
            security.lock_until = lock_until;
        }
        security.updated_at = now;

        Ok(FailedLogin {
            attempts,
            lock_until,
        })
    }

    async fn complete_sign_in(&self, session: &NewSession) -> Result<Session> {
        let mut tables = lock(&self.tables)?;
        let security = tables.security_mut(session.user_id)?;
        security.failed_login_attempts = 0;
        security.lock_until = None;

        let now = Utc::now();
        let created = Session {
            id: Uuid::new_v4(),
            user_id: session.user_id,
            session_token: session.session_token.clone(),
            refresh_token: session.refresh_token.clone(),
            ip_address: session.ip_address.clone(),
            user_agent: session.user_agent.clone(),
            device_type: session.device_type,
            is_active: true,
            expires_at: session.expires_at,
            refresh_expiry: session.refresh_expiry,
            logged_out_at: None,
            created_at: now,
            updated_at: now,
        };
        tables.sessions.push(created.clone());
        Ok(created)
    }

    async fn find_active_session(&self, session_token: &str) -> Result<Option<Session>> {
        let now = Utc::now();
        Ok(lock(&self.tables)?
            .sessions
            .iter()
            .find(|s| s.session_token == session_token && s.is_valid(now))
            .cloned())
    }

    async fn find_open_session(&self, session_token: &str) -> Result<Option<Session>> {
        Ok(lock(&self.tables)?
            .sessions
            .iter()
            .find(|s| s.session_token == session_token && s.is_active)
            .cloned())
    }

    async fn end_session(&self, session_id: Uuid, now: DateTime<Utc>) -> Result<bool> {
        let delay = *lock(&self.end_session_delay)?;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut tables = lock(&self.tables)?;
        match tables
            .sessions
            .iter_mut()
            .find(|s| s.id == session_id && s.is_active)
        {
            Some(session) => {
                session.is_active = false;
                session.logged_out_at = Some(now);
                session.updated_at = now;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn set_password_reset_token(
        &self,
        user_id: Uuid,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut tables = lock(&self.tables)?;
        let security = tables.security_mut(user_id)?;
        security.password_reset_token = Some(token.to_string());
        security.password_reset_token_expiry = Some(expires_at);
        Ok(())
    }

    async fn complete_password_reset(&self, user_id: Uuid, password_hash: &str) -> Result<()> {
        let mut tables = lock(&self.tables)?;
        let security = tables.security_mut(user_id)?;
        security.password_hash = password_hash.to_string();
        security.password_reset_token = None;
        security.password_reset_token_expiry = None;
        security.failed_login_attempts = 0;
        security.lock_until = None;
        Ok(())
    }

    async fn update_password_hash(&self, user_id: Uuid, password_hash: &str) -> Result<()> {
        let mut tables = lock(&self.tables)?;
        tables.security_mut(user_id)?.password_hash = password_hash.to_string();
        Ok(())
    }

    async fn set_pending_email(
        &self,
        user_id: Uuid,
        email: &str,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut tables = lock(&self.tables)?;
        let security = tables.security_mut(user_id)?;
        security.pending_email = Some(email.to_string());
        security.email_verification_token = Some(token.to_string());
        security.email_token_expiry = Some(expires_at);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use ticketing_models::LogLevel;

    fn new_record(message: &str, created_at: DateTime<Utc>) -> NewLogRecord {
        let mut record = NewLogRecord::new(LogLevel::Info, message, "test");
        record.ip_address = Some("198.51.100.7".into());
        record.route = Some("/api/v1/events".into());
        record.created_at = created_at;
        record.updated_at = created_at;
        record
    }

    #[tokio::test]
    async fn test_duplicate_lookup_respects_window() {
        let store = MemoryLogStore::new();
        let t0 = Utc::now();
        store.insert_batch(&[new_record("boom", t0)]).await.unwrap();

        let probe = new_record("boom", t0);
        let key = probe.dedup_key().unwrap();

        assert!(store
            .find_recent_duplicate(key, t0 - Duration::minutes(5))
            .await
            .unwrap()
            .is_some());
        assert!(store
            .find_recent_duplicate(key, t0 + Duration::seconds(1))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_delete_requires_all_filters() {
        let store = MemoryLogStore::new();
        let t0 = Utc::now();
        store
            .insert_batch(&[new_record("a", t0), new_record("b", t0)])
            .await
            .unwrap();

        let deleted = store
            .delete(&[
                LogFilter::MessageContains("a".into()),
                LogFilter::IpEquals("198.51.100.7".into()),
            ])
            .await
            .unwrap();

        assert_eq!(deleted, 1);
        assert_eq!(store.records().len(), 1);
        assert_eq!(store.records()[0].message, "b");
    }

    #[tokio::test]
    async fn test_create_account_reports_duplicate_field() {
        let store = MemoryAuthStore::with_guest_role();
        let role_id = store.guest_role_id().await.unwrap().unwrap();
        let now = Utc::now();

        let user = NewUser {
            id: Uuid::new_v4(),
            username: "first_user".into(),
            email: "first@example.com".into(),
            phone: None,
            date_of_birth: None,
            role_id,
        };
        let security = SecurityAttributes::new(user.id, "hash".into(), now);
        let prefs = UserPreferences::defaults_for(user.id);
        store.create_account(&user, &security, &prefs).await.unwrap();

        let clash = NewUser {
            id: Uuid::new_v4(),
            email: "other@example.com".into(),
            ..user.clone()
        };
        match store.create_account(&clash, &security, &prefs).await {
            Err(DatabaseError::DuplicateEntry(field)) => assert_eq!(field, "username"),
            other => panic!("expected duplicate username, got {:?}", other.map(|u| u.id)),
        }
    }

    #[tokio::test]
    async fn test_failed_logins_lock_progressively() {
        let store = MemoryAuthStore::with_guest_role();
        let user_id = Uuid::new_v4();
        let now = Utc::now();
        let user = NewUser {
            id: user_id,
            username: "lock_me".into(),
            email: "lock@example.com".into(),
            phone: None,
            date_of_birth: None,
            role_id: Uuid::new_v4(),
        };
        store
            .create_account(
                &user,
                &SecurityAttributes::new(user_id, "hash".into(), now),
                &UserPreferences::defaults_for(user_id),
            )
            .await
            .unwrap();

        let policy = LockoutPolicy::default();
        let mut last = None;
        for _ in 0..6 {
            last = Some(store.record_failed_login(user_id, policy, now).await.unwrap());
        }

        let last = last.unwrap();
        assert_eq!(last.attempts, 6);
        assert_eq!(last.lock_until, Some(now + Duration::hours(2)));
    }
}
