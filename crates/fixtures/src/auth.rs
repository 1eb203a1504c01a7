//! Per-role bearer token cache with single-flight login
//!
//! Concurrent callers asking for the same role while a login is in flight
//! await the same shared future, so the backend sees one `/auth/login` per
//! role no matter how many scenarios start at once.

use std::collections::HashMap;
use std::future::Future;

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use tracing::debug;

use crate::error::{FixtureError, FixtureResult};
use crate::model::Role;

/// Why a login flight failed. Cloned to every caller that shared the flight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginFailure {
    pub status: Option<u16>,
    pub message: String,
}

type LoginFlight = Shared<BoxFuture<'static, Result<String, LoginFailure>>>;

#[derive(Default)]
struct SessionState {
    tokens: HashMap<Role, String>,
    pending: HashMap<Role, LoginFlight>,
}

#[derive(Default)]
pub struct AuthSessionStore {
    state: Mutex<SessionState>,
}

impl AuthSessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached token for `role`, or the result of a (shared) login flight.
    ///
    /// `login` is only invoked when no token is cached and no flight is
    /// pending. A failed flight is reported to every waiter and not cached.
    pub async fn token_with<F, Fut>(&self, role: Role, login: F) -> FixtureResult<String>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<String, LoginFailure>> + Send + 'static,
    {
        let flight = {
            let mut state = self.state.lock();
            if let Some(token) = state.tokens.get(&role) {
                return Ok(token.clone());
            }
            match state.pending.get(&role) {
                Some(flight) => {
                    debug!(%role, "joining in-flight login");
                    flight.clone()
                }
                None => {
                    debug!(%role, "starting login");
                    let flight = login().boxed().shared();
                    state.pending.insert(role, flight.clone());
                    flight
                }
            }
        };

        let outcome = flight.clone().await;

        {
            let mut state = self.state.lock();
            let still_current = state
                .pending
                .get(&role)
                .map_or(false, |pending| pending.ptr_eq(&flight));
            if still_current {
                state.pending.remove(&role);
                if let Ok(token) = &outcome {
                    state.tokens.insert(role, token.clone());
                }
            }
        }

        outcome.map_err(|failure| FixtureError::Login {
            role,
            status: failure.status,
            message: failure.message,
        })
    }

    pub fn cached(&self, role: Role) -> Option<String> {
        self.state.lock().tokens.get(&role).cloned()
    }

    /// Drop the cached token for one role.
    pub fn invalidate(&self, role: Role) {
        let mut state = self.state.lock();
        state.tokens.remove(&role);
        state.pending.remove(&role);
    }

    /// Drop every cached token and forget pending flights.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.tokens.clear();
        state.pending.clear();
    }
}

impl std::fmt::Debug for AuthSessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("AuthSessionStore")
            .field("cached_roles", &state.tokens.keys().collect::<Vec<_>>())
            .field("pending_roles", &state.pending.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn counting_login(
        calls: Arc<AtomicUsize>,
        result: Result<&'static str, LoginFailure>,
    ) -> impl FnOnce() -> BoxFuture<'static, Result<String, LoginFailure>> {
        move || {
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(30)).await;
                result.map(str::to_string)
            }
            .boxed()
        }
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_login() {
        let store = AuthSessionStore::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let waiters = (0..5).map(|_| store.token_with(Role::Admin, counting_login(calls.clone(), Ok("tok-a"))));
        let tokens = futures::future::join_all(waiters).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(tokens.iter().all(|t| t.as_deref().ok() == Some("tok-a")));
        assert_eq!(store.cached(Role::Admin).as_deref(), Some("tok-a"));
    }

    #[tokio::test]
    async fn roles_are_cached_separately() {
        let store = AuthSessionStore::new();
        let calls = Arc::new(AtomicUsize::new(0));

        store.token_with(Role::Admin, counting_login(calls.clone(), Ok("admin"))).await.unwrap();
        let user = store
            .token_with(Role::StandardUser, counting_login(calls.clone(), Ok("user")))
            .await
            .unwrap();
        let admin_again = store
            .token_with(Role::Admin, counting_login(calls.clone(), Ok("other")))
            .await
            .unwrap();

        assert_eq!(user, "user");
        assert_eq!(admin_again, "admin");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failed_flight_is_shared_but_not_cached() {
        let store = AuthSessionStore::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let failure = LoginFailure {
            status: Some(401),
            message: "Invalid credentials".to_string(),
        };

        let waiters = (0..3).map(|_| {
            store.token_with(Role::Admin, counting_login(calls.clone(), Err(failure.clone())))
        });
        let results = futures::future::join_all(waiters).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(results
            .iter()
            .all(|r| matches!(r, Err(FixtureError::Login { status: Some(401), .. }))));

        let retry = store
            .token_with(Role::Admin, counting_login(calls.clone(), Ok("fresh")))
            .await
            .unwrap();
        assert_eq!(retry, "fresh");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn reset_forces_a_new_login() {
        let store = AuthSessionStore::new();
        let calls = Arc::new(AtomicUsize::new(0));

        store.token_with(Role::Admin, counting_login(calls.clone(), Ok("one"))).await.unwrap();
        store.reset();
        assert!(store.cached(Role::Admin).is_none());

        let token = store
            .token_with(Role::Admin, counting_login(calls.clone(), Ok("two")))
            .await
            .unwrap();
        assert_eq!(token, "two");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
