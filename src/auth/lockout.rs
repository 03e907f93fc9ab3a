//! Login Security State Machine
//!
//! Tracks consecutive failed logins per account and locks the account once
//! the count reaches [`LOCKOUT_THRESHOLD`].
//!
//! ```text
//!              mismatch (attempts + 1 < 5)
//!              ┌───────────────┐
//!              ▼               │
//!   ┌──────────────────────────┴─┐   mismatch (attempts + 1 == 5)   ┌────────┐
//!   │ Unlocked { attempts: 0..4 }│ ───────────────────────────────► │ Locked │
//!   └──────────────────────────┬─┘                                  └───┬────┘
//!              ▲               │ match: reset to 0                      │
//!              └───────────────┘                                        │
//!              ▲                                                        │
//!              └──────── UPDATE_USER writes loginAttempts = 0 ──────────┘
//! ```
//!
//! The whole read-verify-write sequence for an account runs under a
//! per-account async lock, and the increment itself is a single atomic store
//! operation, so concurrent logins against one account are counted exactly
//! once each.
//!
//! Unknown emails are verified against the hasher's dummy hash, so every
//! login that reaches verification performs exactly one hash check and the
//! response never reveals whether the email exists.

use crate::auth::hasher::{verify_blocking, CredentialHasher};
use crate::model::{Role, User};
use crate::protocol::Response;
use crate::storage::{StoreResult, UserRepository};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Failed attempts at which an account locks.
pub const LOCKOUT_THRESHOLD: u32 = 5;

/// Message for a failed login. Identical for unknown emails and wrong passwords.
pub const INVALID_CREDENTIALS: &str = "Invalid email or password.";

/// Message for a locked account.
pub const ACCOUNT_LOCKED: &str =
    "Account locked due to too many failed login attempts. Contact an administrator.";

/// Lock state derived from an account's failed-attempt counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountState {
    Unlocked { attempts: u32 },
    Locked,
}

impl AccountState {
    pub fn from_attempts(attempts: u32) -> Self {
        if attempts >= LOCKOUT_THRESHOLD {
            AccountState::Locked
        } else {
            AccountState::Unlocked { attempts }
        }
    }

    pub fn is_locked(&self) -> bool {
        matches!(self, AccountState::Locked)
    }
}

/// Result of one LOGIN attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginOutcome {
    Authenticated { name: String, role: Role },
    /// `remaining` is `None` when the email is unknown
    InvalidCredentials { remaining: Option<u32> },
    Locked,
}

impl LoginOutcome {
    /// Renders the wire response for this outcome.
    pub fn into_response(self) -> Response {
        match self {
            LoginOutcome::Authenticated { name, role } => {
                Response::success(format!("{name}|{role}"))
            }
            LoginOutcome::InvalidCredentials { remaining: None } => {
                Response::failure(INVALID_CREDENTIALS)
            }
            LoginOutcome::InvalidCredentials {
                remaining: Some(remaining),
            } => Response::failure(format!(
                "{INVALID_CREDENTIALS} {remaining} attempts remaining."
            )),
            LoginOutcome::Locked => Response::locked(ACCOUNT_LOCKED),
        }
    }
}

/// Runs the login sequence against the user store.
#[derive(Clone)]
pub struct LoginGuard {
    users: UserRepository,
    hasher: Arc<dyn CredentialHasher>,
    /// One async lock per account currently mid-login
    account_locks: Arc<DashMap<i64, Arc<Mutex<()>>>>,
}

impl LoginGuard {
    pub fn new(users: UserRepository, hasher: Arc<dyn CredentialHasher>) -> Self {
        Self {
            users,
            hasher,
            account_locks: Arc::new(DashMap::new()),
        }
    }

    /// Authenticates `email` with `password`.
    ///
    /// Store faults are returned as errors; every credential outcome,
    /// including lockout, is an `Ok`.
    pub async fn login(&self, email: &str, password: &str) -> StoreResult<LoginOutcome> {
        let Some(id) = self.users.find_by_email(email).await?.and_then(|u| u.id) else {
            self.verify_dummy(password).await;
            debug!("Login rejected for unknown email");
            return Ok(LoginOutcome::InvalidCredentials { remaining: None });
        };

        let lock = self.account_lock(id);
        let outcome = {
            let _held = lock.lock().await;
            self.login_account(id, password).await
        };

        drop(lock);
        self.account_locks
            .remove_if(&id, |_, lock| Arc::strong_count(lock) == 1);

        outcome
    }

    /// The sequence for a known account. Caller holds the account lock.
    async fn login_account(&self, id: i64, password: &str) -> StoreResult<LoginOutcome> {
        // Re-read under the lock so the attempt count is current.
        let Some(user) = self.users.find_by_id(id).await? else {
            self.verify_dummy(password).await;
            return Ok(LoginOutcome::InvalidCredentials { remaining: None });
        };

        if AccountState::from_attempts(user.login_attempts).is_locked() {
            info!(user_id = id, "Login refused for locked account");
            return Ok(LoginOutcome::Locked);
        }

        let User {
            name,
            role,
            pwd_hash,
            login_attempts,
            ..
        } = user;

        let matched =
            verify_blocking(Arc::clone(&self.hasher), password.to_string(), pwd_hash).await;

        if matched {
            if login_attempts != 0 {
                self.users.reset_login_attempts(id).await?;
            }
            info!(user_id = id, role = %role, "User logged in");
            return Ok(LoginOutcome::Authenticated { name, role });
        }

        let attempts = self.users.record_failed_login(id).await?;
        match AccountState::from_attempts(attempts) {
            AccountState::Locked => {
                warn!(user_id = id, attempts, "Account locked after repeated failed logins");
                Ok(LoginOutcome::Locked)
            }
            AccountState::Unlocked { attempts } => {
                debug!(user_id = id, attempts, "Failed login");
                Ok(LoginOutcome::InvalidCredentials {
                    remaining: Some(LOCKOUT_THRESHOLD - attempts),
                })
            }
        }
    }

    async fn verify_dummy(&self, password: &str) {
        let dummy = self.hasher.dummy_hash().to_string();
        verify_blocking(Arc::clone(&self.hasher), password.to_string(), dummy).await;
    }

    fn account_lock(&self, id: i64) -> Arc<Mutex<()>> {
        Arc::clone(
            self.account_locks
                .entry(id)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .value(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::hasher::{Argon2Hasher, HashError, HashParams};
    use crate::storage::{Database, PoolConfig, StorePool};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Wraps a real hasher and counts verification calls.
    struct CountingHasher {
        inner: Argon2Hasher,
        verifies: AtomicUsize,
    }

    impl CredentialHasher for CountingHasher {
        fn hash(&self, plaintext: &str) -> Result<String, HashError> {
            self.inner.hash(plaintext)
        }

        fn verify(&self, plaintext: &str, hash: &str) -> bool {
            self.verifies.fetch_add(1, Ordering::SeqCst);
            self.inner.verify(plaintext, hash)
        }

        fn dummy_hash(&self) -> &str {
            self.inner.dummy_hash()
        }
    }

    struct Fixture {
        guard: LoginGuard,
        users: UserRepository,
        hasher: Arc<CountingHasher>,
        user_id: i64,
    }

    impl Fixture {
        fn verifies(&self) -> usize {
            self.hasher.verifies.load(Ordering::SeqCst)
        }
    }

    async fn fixture() -> Fixture {
        let pool = StorePool::new(Arc::new(Database::new()), PoolConfig::default())
            .await
            .unwrap();
        let users = UserRepository::new(pool);
        let hasher = Arc::new(CountingHasher {
            inner: Argon2Hasher::new(HashParams::fast()).unwrap(),
            verifies: AtomicUsize::new(0),
        });

        let user_id = users
            .add_one(User {
                id: None,
                role: Role::Staff,
                name: "Bob".to_string(),
                pwd_hash: hasher.hash("correct horse").unwrap(),
                email: "bob@example.com".to_string(),
                phone: String::new(),
                login_attempts: 0,
            })
            .await
            .unwrap();

        let guard = LoginGuard::new(users.clone(), hasher.clone());
        Fixture {
            guard,
            users,
            hasher,
            user_id,
        }
    }

    #[test]
    fn test_account_state() {
        assert_eq!(AccountState::from_attempts(0), AccountState::Unlocked { attempts: 0 });
        assert_eq!(AccountState::from_attempts(4), AccountState::Unlocked { attempts: 4 });
        assert!(AccountState::from_attempts(5).is_locked());
        assert!(AccountState::from_attempts(9).is_locked());
    }

    #[test]
    fn test_outcome_responses() {
        assert_eq!(
            LoginOutcome::InvalidCredentials { remaining: None }
                .into_response()
                .serialize(),
            "FAILURE: Invalid email or password."
        );
        assert_eq!(
            LoginOutcome::InvalidCredentials { remaining: Some(1) }
                .into_response()
                .serialize(),
            "FAILURE: Invalid email or password. 1 attempts remaining."
        );
        assert_eq!(
            LoginOutcome::Locked.into_response().serialize(),
            format!("LOCKED|{ACCOUNT_LOCKED}")
        );
        assert_eq!(
            LoginOutcome::Authenticated {
                name: "Bob".into(),
                role: Role::Admin
            }
            .into_response()
            .serialize(),
            "SUCCESS|Bob|admin"
        );
    }

    #[tokio::test]
    async fn test_successful_login() {
        let f = fixture().await;
        let outcome = f.guard.login("Bob@Example.com", "correct horse").await.unwrap();
        assert_eq!(
            outcome,
            LoginOutcome::Authenticated {
                name: "Bob".into(),
                role: Role::Staff
            }
        );
        assert_eq!(f.verifies(), 1);
    }

    #[tokio::test]
    async fn test_unknown_email_verifies_once() {
        let f = fixture().await;
        let outcome = f.guard.login("nouser@x.com", "anything").await.unwrap();
        assert_eq!(outcome, LoginOutcome::InvalidCredentials { remaining: None });
        assert_eq!(f.verifies(), 1);
    }

    #[tokio::test]
    async fn test_wrong_password_verifies_once() {
        let f = fixture().await;
        let outcome = f.guard.login("bob@example.com", "wrong").await.unwrap();
        assert_eq!(outcome, LoginOutcome::InvalidCredentials { remaining: Some(4) });
        assert_eq!(f.verifies(), 1);
    }

    #[tokio::test]
    async fn test_lockout_sequence() {
        let f = fixture().await;

        for remaining in [4, 3, 2, 1] {
            let outcome = f.guard.login("bob@example.com", "wrong").await.unwrap();
            assert_eq!(
                outcome,
                LoginOutcome::InvalidCredentials {
                    remaining: Some(remaining)
                }
            );
        }

        let fifth = f.guard.login("bob@example.com", "wrong").await.unwrap();
        assert_eq!(fifth, LoginOutcome::Locked);
        assert_eq!(f.verifies(), 5);

        // Locked even with the right password, and no verification happens
        let sixth = f.guard.login("bob@example.com", "correct horse").await.unwrap();
        assert_eq!(sixth, LoginOutcome::Locked);
        assert_eq!(f.verifies(), 5);

        let stored = f.users.find_by_id(f.user_id).await.unwrap().unwrap();
        assert_eq!(stored.login_attempts, LOCKOUT_THRESHOLD);
    }

    #[tokio::test]
    async fn test_success_resets_attempts() {
        let f = fixture().await;
        f.guard.login("bob@example.com", "wrong").await.unwrap();
        f.guard.login("bob@example.com", "wrong").await.unwrap();

        let outcome = f.guard.login("bob@example.com", "correct horse").await.unwrap();
        assert!(matches!(outcome, LoginOutcome::Authenticated { .. }));

        let stored = f.users.find_by_id(f.user_id).await.unwrap().unwrap();
        assert_eq!(stored.login_attempts, 0);
    }

    #[tokio::test]
    async fn test_admin_reset_unlocks() {
        let f = fixture().await;
        for _ in 0..LOCKOUT_THRESHOLD {
            f.guard.login("bob@example.com", "wrong").await.unwrap();
        }

        let mut user = f.users.find_by_id(f.user_id).await.unwrap().unwrap();
        user.login_attempts = 0;
        user.pwd_hash = String::new();
        f.users.update(user).await.unwrap();

        let outcome = f.guard.login("bob@example.com", "correct horse").await.unwrap();
        assert!(matches!(outcome, LoginOutcome::Authenticated { .. }));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_failures_counted_exactly() {
        let f = fixture().await;

        let tasks: Vec<_> = (0..3)
            .map(|_| {
                let guard = f.guard.clone();
                tokio::spawn(async move { guard.login("bob@example.com", "wrong").await })
            })
            .collect();

        let mut remaining = Vec::new();
        for task in tasks {
            match task.await.unwrap().unwrap() {
                LoginOutcome::InvalidCredentials { remaining: Some(n) } => remaining.push(n),
                other => panic!("unexpected outcome: {other:?}"),
            }
        }
        remaining.sort_unstable();
        assert_eq!(remaining, vec![2, 3, 4]);

        let stored = f.users.find_by_id(f.user_id).await.unwrap().unwrap();
        assert_eq!(stored.login_attempts, 3);
        assert!(f.guard.account_locks.is_empty());
    }
}
