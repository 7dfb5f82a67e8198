//! Account Storage
//! Mission: Securely store and manage user accounts with SQLite

use crate::auth::lockout::{self, LockState};
use crate::auth::models::{User, UserRole};
use anyhow::{Context, Result};
use bcrypt::{hash, DEFAULT_COST};
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OpenFlags};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

const SCHEMA_SQL: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;

CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY,
    username TEXT UNIQUE NOT NULL,
    email TEXT UNIQUE NOT NULL,
    phone TEXT,
    password_hash TEXT NOT NULL,
    role TEXT NOT NULL,
    is_active INTEGER NOT NULL DEFAULT 1,
    last_login INTEGER,
    failed_login_attempts INTEGER NOT NULL DEFAULT 0,
    locked_until INTEGER,
    reset_token TEXT,
    reset_token_expires INTEGER,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
) WITHOUT ROWID;

CREATE INDEX IF NOT EXISTS idx_users_phone ON users(phone);
CREATE INDEX IF NOT EXISTS idx_users_reset_token ON users(reset_token);
"#;

const USER_COLUMNS: &str = "id, username, email, phone, password_hash, role, is_active, \
     last_login, failed_login_attempts, locked_until, created_at, updated_at";

/// Fields for a new account row. The hash is produced by the caller so the
/// store never sees a plaintext password.
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub phone: Option<String>,
    pub password_hash: String,
    pub role: UserRole,
}

/// Account storage with SQLite backend. All access goes through a single
/// mutex-guarded connection, so read-modify-write sequences like the lockout
/// counter update are atomic within the process.
pub struct UserStore {
    conn: Arc<Mutex<Connection>>,
}

impl UserStore {
    /// Open (or create) the database and initialize the schema
    pub fn new(db_path: &str) -> Result<Self> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX; // We handle our own locking

        let conn = Connection::open_with_flags(db_path, flags)
            .with_context(|| format!("Failed to open database at {}", db_path))?;

        conn.execute_batch(SCHEMA_SQL)
            .context("Failed to initialize users schema")?;

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.create_default_admin()?;
        Ok(store)
    }

    /// Create a default admin account for initial setup
    fn create_default_admin(&self) -> Result<()> {
        let conn = self.conn.lock();

        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM users WHERE role = 'admin'",
                [],
                |row| row.get(0),
            )
            .context("Failed to check for admin accounts")?;

        if count > 0 {
            return Ok(());
        }

        let email = std::env::var("ADMIN_EMAIL").unwrap_or_else(|_| "admin@storefront.local".to_string());
        let password = std::env::var("ADMIN_PASSWORD").unwrap_or_else(|_| "Admin1234".to_string());
        let password_hash = hash(&password, DEFAULT_COST).context("Failed to hash password")?;

        let now = Utc::now().timestamp();
        conn.execute(
            "INSERT INTO users (id, username, email, phone, password_hash, role, is_active,
                                failed_login_attempts, created_at, updated_at)
             VALUES (?1, ?2, ?3, NULL, ?4, 'admin', 1, 0, ?5, ?5)",
            params![Uuid::new_v4().to_string(), "admin", email, password_hash, now],
        )
        .context("Failed to insert admin account")?;

        info!("🔐 Default admin account created ({})", email);
        warn!("⚠️  CHANGE DEFAULT ADMIN PASSWORD IN PRODUCTION!");

        Ok(())
    }

    /// Create a new account
    pub fn create_user(&self, new_user: NewUser) -> Result<User> {
        let id = Uuid::new_v4();
        let now = Utc::now().timestamp();

        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO users (id, username, email, phone, password_hash, role, is_active,
                                failed_login_attempts, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1, 0, ?7, ?7)",
            params![
                id.to_string(),
                new_user.username,
                new_user.email,
                new_user.phone,
                new_user.password_hash,
                new_user.role.as_str(),
                now,
            ],
        )
        .context("Failed to insert account")?;
        drop(conn);

        info!("✅ Created account: {} ({})", new_user.username, new_user.role.as_str());

        self.find_by_id(&id)?
            .context("Inserted account missing on re-read")
    }

    pub fn find_by_id(&self, id: &Uuid) -> Result<Option<User>> {
        self.find_by_column("id", &id.to_string())
    }

    /// Lookup by case-folded email
    pub fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        self.find_by_column("email", email)
    }

    pub fn find_by_username(&self, username: &str) -> Result<Option<User>> {
        self.find_by_column("username", username)
    }

    pub fn find_by_phone(&self, phone: &str) -> Result<Option<User>> {
        self.find_by_column("phone", phone)
    }

    fn find_by_column(&self, column: &str, value: &str) -> Result<Option<User>> {
        let conn = self.conn.lock();
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE {column} = ?1");
        let mut stmt = conn.prepare_cached(&sql)?;

        match stmt.query_row(params![value], row_to_user) {
            Ok(user) => Ok(Some(user)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Re-fetch an account for request authorization, excluding the password
    /// hash column. Claims in a verified token are treated only as an identity
    /// pointer; role and active flag come from this read.
    pub fn find_for_request(&self, id: &Uuid) -> Result<Option<User>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT id, username, email, phone, '' AS password_hash, role, is_active,
                    last_login, failed_login_attempts, locked_until, created_at, updated_at
             FROM users WHERE id = ?1",
        )?;

        match stmt.query_row(params![id.to_string()], row_to_user) {
            Ok(user) => Ok(Some(user)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// List all accounts (admin only)
    pub fn list_users(&self) -> Result<Vec<User>> {
        let conn = self.conn.lock();
        let sql = format!("SELECT {USER_COLUMNS} FROM users ORDER BY created_at ASC");
        let mut stmt = conn.prepare_cached(&sql)?;

        let users = stmt
            .query_map([], row_to_user)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(users)
    }

    /// Record one failed password check. Reloads the stored counter and lock
    /// under the connection lock, clears an expired lock, increments, and
    /// engages a new lock when the threshold is reached. Returns the state
    /// after the increment.
    pub fn record_failed_attempt(
        &self,
        id: &Uuid,
        threshold: u32,
        window: Duration,
    ) -> Result<LockState> {
        let now = Utc::now();
        let conn = self.conn.lock();

        let (attempts, locked_until): (u32, Option<i64>) = conn
            .query_row(
                "SELECT failed_login_attempts, locked_until FROM users WHERE id = ?1",
                params![id.to_string()],
                |row| Ok((row.get::<_, i64>(0)? as u32, row.get(1)?)),
            )
            .context("Account missing while recording failed login")?;

        let state = lockout::after_failure(
            attempts,
            locked_until.and_then(|s| DateTime::from_timestamp(s, 0)),
            threshold,
            window,
            now,
        );

        let (new_attempts, new_lock) = match &state {
            LockState::Open { attempts } => (*attempts, None),
            LockState::Locked { until } => (threshold, Some(until.timestamp())),
        };

        conn.execute(
            "UPDATE users SET failed_login_attempts = ?2, locked_until = ?3, updated_at = ?4
             WHERE id = ?1",
            params![id.to_string(), new_attempts, new_lock, now.timestamp()],
        )
        .context("Failed to persist lockout state")?;

        if let LockState::Locked { until } = &state {
            warn!("🔒 Account {} locked until {}", id, until);
        }

        Ok(state)
    }

    /// Clear the failed-attempt counter and lock, and stamp last_login
    pub fn record_successful_login(&self, id: &Uuid) -> Result<()> {
        let now = Utc::now().timestamp();
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE users SET failed_login_attempts = 0, locked_until = NULL,
                              last_login = ?2, updated_at = ?2
             WHERE id = ?1",
            params![id.to_string(), now],
        )
        .context("Failed to record login")?;
        Ok(())
    }

    /// Change an account's role (admin only). Returns None when the account
    /// does not exist.
    pub fn set_role(&self, id: &Uuid, role: UserRole) -> Result<Option<User>> {
        let now = Utc::now().timestamp();
        let changed = {
            let conn = self.conn.lock();
            conn.execute(
                "UPDATE users SET role = ?2, updated_at = ?3 WHERE id = ?1",
                params![id.to_string(), role.as_str(), now],
            )?
        };

        if changed == 0 {
            return Ok(None);
        }
        info!("👤 Account {} role set to {}", id, role.as_str());
        self.find_by_id(id)
    }

    /// Toggle the active flag (admin only). Accounts are never hard-deleted;
    /// deactivation is the only exposed way to retire one.
    pub fn set_active(&self, id: &Uuid, active: bool) -> Result<Option<User>> {
        let now = Utc::now().timestamp();
        let changed = {
            let conn = self.conn.lock();
            conn.execute(
                "UPDATE users SET is_active = ?2, updated_at = ?3 WHERE id = ?1",
                params![id.to_string(), active as i64, now],
            )?
        };

        if changed == 0 {
            return Ok(None);
        }
        info!(
            "👤 Account {} {}",
            id,
            if active { "activated" } else { "deactivated" }
        );
        self.find_by_id(id)
    }

    /// Attach a password-reset token valid until `expires`
    pub fn set_reset_token(&self, id: &Uuid, token: &str, expires: DateTime<Utc>) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE users SET reset_token = ?2, reset_token_expires = ?3, updated_at = ?4
             WHERE id = ?1",
            params![
                id.to_string(),
                token,
                expires.timestamp(),
                Utc::now().timestamp()
            ],
        )
        .context("Failed to store reset token")?;
        Ok(())
    }

    /// Redeem a reset token: if it matches and has not expired, install the
    /// new password hash, clear the token, and clear any lockout. Returns
    /// false for an unknown or expired token.
    pub fn consume_reset_token(&self, token: &str, new_password_hash: &str) -> Result<bool> {
        let now = Utc::now().timestamp();
        let conn = self.conn.lock();

        let row: Option<(String, Option<i64>)> = match conn.query_row(
            "SELECT id, reset_token_expires FROM users WHERE reset_token = ?1",
            params![token],
            |row| Ok((row.get(0)?, row.get(1)?)),
        ) {
            Ok(r) => Some(r),
            Err(rusqlite::Error::QueryReturnedNoRows) => None,
            Err(e) => return Err(e.into()),
        };

        let Some((id, expires)) = row else {
            return Ok(false);
        };
        if expires.map_or(true, |exp| exp < now) {
            return Ok(false);
        }

        conn.execute(
            "UPDATE users SET password_hash = ?2, reset_token = NULL, reset_token_expires = NULL,
                              failed_login_attempts = 0, locked_until = NULL, updated_at = ?3
             WHERE id = ?1",
            params![id, new_password_hash, now],
        )
        .context("Failed to apply password reset")?;

        info!("🔑 Password reset applied for account {}", id);
        Ok(true)
    }

    #[cfg(test)]
    pub(crate) fn force_lock_state(
        &self,
        id: &Uuid,
        attempts: u32,
        locked_until: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE users SET failed_login_attempts = ?2, locked_until = ?3 WHERE id = ?1",
            params![
                id.to_string(),
                attempts,
                locked_until.map(|t| t.timestamp())
            ],
        )?;
        Ok(())
    }
}

fn row_to_user(row: &rusqlite::Row) -> rusqlite::Result<User> {
    let role_str: String = row.get(5)?;
    Ok(User {
        id: Uuid::parse_str(&row.get::<_, String>(0)?).unwrap_or_else(|_| Uuid::nil()),
        username: row.get(1)?,
        email: row.get(2)?,
        phone: row.get(3)?,
        password_hash: row.get(4)?,
        role: UserRole::from_str(&role_str).unwrap_or(UserRole::Customer),
        is_active: row.get::<_, i64>(6)? != 0,
        last_login: row
            .get::<_, Option<i64>>(7)?
            .and_then(|s| DateTime::from_timestamp(s, 0)),
        failed_login_attempts: row.get::<_, i64>(8)? as u32,
        locked_until: row
            .get::<_, Option<i64>>(9)?
            .and_then(|s| DateTime::from_timestamp(s, 0)),
        created_at: DateTime::from_timestamp(row.get::<_, i64>(10)?, 0).unwrap_or_default(),
        updated_at: DateTime::from_timestamp(row.get::<_, i64>(11)?, 0).unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn create_test_store() -> (UserStore, NamedTempFile) {
        let temp_file = NamedTempFile::new().unwrap();
        let db_path = temp_file.path().to_str().unwrap();
        let store = UserStore::new(db_path).unwrap();
        (store, temp_file)
    }

    fn new_customer(username: &str, email: &str) -> NewUser {
        NewUser {
            username: username.to_string(),
            email: email.to_string(),
            phone: None,
            password_hash: "not-a-real-hash".to_string(),
            role: UserRole::Customer,
        }
    }

    #[test]
    fn test_default_admin_created() {
        let (store, _temp) = create_test_store();

        let admin = store.find_by_username("admin").unwrap();
        assert!(admin.is_some());

        let admin = admin.unwrap();
        assert_eq!(admin.role, UserRole::Admin);
        assert!(admin.is_active);
    }

    #[test]
    fn test_create_and_retrieve_user() {
        let (store, _temp) = create_test_store();

        let user = store.create_user(new_customer("gamer1", "a@b.com")).unwrap();
        assert_eq!(user.role, UserRole::Customer);
        assert_eq!(user.failed_login_attempts, 0);
        assert!(user.locked_until.is_none());

        let by_email = store.find_by_email("a@b.com").unwrap().unwrap();
        assert_eq!(by_email.id, user.id);

        let by_name = store.find_by_username("gamer1").unwrap().unwrap();
        assert_eq!(by_name.id, user.id);
    }

    #[test]
    fn test_duplicate_email_rejected() {
        let (store, _temp) = create_test_store();

        store.create_user(new_customer("gamer1", "a@b.com")).unwrap();
        let dup = store.create_user(new_customer("gamer2", "a@b.com"));
        assert!(dup.is_err());

        let dup_name = store.create_user(new_customer("gamer1", "other@b.com"));
        assert!(dup_name.is_err());
    }

    #[test]
    fn test_failed_attempts_accumulate_and_lock() {
        let (store, _temp) = create_test_store();
        let user = store.create_user(new_customer("gamer1", "a@b.com")).unwrap();
        let window = Duration::minutes(15);

        for expected in 1..=4u32 {
            let state = store.record_failed_attempt(&user.id, 5, window).unwrap();
            assert_eq!(state, LockState::Open { attempts: expected });
        }

        let state = store.record_failed_attempt(&user.id, 5, window).unwrap();
        assert!(matches!(state, LockState::Locked { .. }));

        let stored = store.find_by_id(&user.id).unwrap().unwrap();
        assert_eq!(stored.failed_login_attempts, 5);
        assert!(stored.locked_until.is_some());
    }

    #[test]
    fn test_successful_login_clears_lockout() {
        let (store, _temp) = create_test_store();
        let user = store.create_user(new_customer("gamer1", "a@b.com")).unwrap();

        for _ in 0..3 {
            store
                .record_failed_attempt(&user.id, 5, Duration::minutes(15))
                .unwrap();
        }

        store.record_successful_login(&user.id).unwrap();

        let stored = store.find_by_id(&user.id).unwrap().unwrap();
        assert_eq!(stored.failed_login_attempts, 0);
        assert!(stored.locked_until.is_none());
        assert!(stored.last_login.is_some());
    }

    #[test]
    fn test_expired_lock_restarts_counter() {
        let (store, _temp) = create_test_store();
        let user = store.create_user(new_customer("gamer1", "a@b.com")).unwrap();

        // Simulate a lock that has already elapsed
        store
            .force_lock_state(&user.id, 5, Some(Utc::now() - Duration::minutes(1)))
            .unwrap();

        let state = store
            .record_failed_attempt(&user.id, 5, Duration::minutes(15))
            .unwrap();
        assert_eq!(state, LockState::Open { attempts: 1 });
    }

    #[test]
    fn test_find_for_request_excludes_hash() {
        let (store, _temp) = create_test_store();
        let user = store.create_user(new_customer("gamer1", "a@b.com")).unwrap();

        let fetched = store.find_for_request(&user.id).unwrap().unwrap();
        assert!(fetched.password_hash.is_empty());
        assert_eq!(fetched.username, "gamer1");
    }

    #[test]
    fn test_role_and_active_updates() {
        let (store, _temp) = create_test_store();
        let user = store.create_user(new_customer("gamer1", "a@b.com")).unwrap();

        let updated = store.set_role(&user.id, UserRole::Editor).unwrap().unwrap();
        assert_eq!(updated.role, UserRole::Editor);

        let deactivated = store.set_active(&user.id, false).unwrap().unwrap();
        assert!(!deactivated.is_active);

        let missing = store.set_role(&Uuid::new_v4(), UserRole::Editor).unwrap();
        assert!(missing.is_none());
    }

    #[test]
    fn test_reset_token_flow() {
        let (store, _temp) = create_test_store();
        let user = store.create_user(new_customer("gamer1", "a@b.com")).unwrap();

        store
            .set_reset_token(&user.id, "tok123", Utc::now() + Duration::hours(1))
            .unwrap();

        assert!(!store.consume_reset_token("wrong", "newhash").unwrap());
        assert!(store.consume_reset_token("tok123", "newhash").unwrap());

        // Token is single-use
        assert!(!store.consume_reset_token("tok123", "otherhash").unwrap());

        let stored = store.find_by_id(&user.id).unwrap().unwrap();
        assert_eq!(stored.password_hash, "newhash");
    }

    #[test]
    fn test_expired_reset_token_rejected() {
        let (store, _temp) = create_test_store();
        let user = store.create_user(new_customer("gamer1", "a@b.com")).unwrap();

        store
            .set_reset_token(&user.id, "tok123", Utc::now() - Duration::minutes(1))
            .unwrap();
        assert!(!store.consume_reset_token("tok123", "newhash").unwrap());
    }

    #[test]
    fn test_list_users() {
        let (store, _temp) = create_test_store();

        store.create_user(new_customer("gamer1", "a@b.com")).unwrap();
        store.create_user(new_customer("gamer2", "c@d.com")).unwrap();

        let users = store.list_users().unwrap();
        assert_eq!(users.len(), 3); // default admin + two customers
    }
}
