//! Session Context
//!
//! The request-entry layer installs the caller's identity once with
//! [`SessionContext::scope`]; any component awaited inside that future reads
//! it with [`SessionContext::current_identity`]. The value is bound to the
//! scoped future, so concurrent requests multiplexed on the same worker
//! threads each see only their own identity.

use std::cell::RefCell;
use std::future::Future;

use serde::{Deserialize, Serialize};

tokio::task_local! {
    static SESSION_IDENTITY: RefCell<Option<SessionIdentity>>;
}

/// Authenticated identity for one request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionIdentity {
    pub user_id: i64,
    pub email: String,
}

impl SessionIdentity {
    pub fn new(user_id: i64, email: impl Into<String>) -> Self {
        Self {
            user_id,
            email: email.into(),
        }
    }
}

/// Accessors for the ambient session identity
pub struct SessionContext;

impl SessionContext {
    /// Run `fut` with `identity` installed (`None` for anonymous requests)
    pub async fn scope<F>(identity: Option<SessionIdentity>, fut: F) -> F::Output
    where
        F: Future,
    {
        SESSION_IDENTITY.scope(RefCell::new(identity), fut).await
    }

    /// Identity of the caller, if the request is authenticated
    pub fn current_identity() -> Option<SessionIdentity> {
        SESSION_IDENTITY
            .try_with(|cell| cell.borrow().clone())
            .ok()
            .flatten()
    }

    /// True when called inside a request scope, authenticated or not
    pub fn is_active() -> bool {
        SESSION_IDENTITY.try_with(|_| ()).is_ok()
    }

    /// Replace the identity for the remainder of the current request
    ///
    /// Meant for the request-entry layer, e.g. right after a login succeeds.
    /// Returns false (and does nothing) outside a request scope.
    pub fn update_identity(identity: Option<SessionIdentity>) -> bool {
        SESSION_IDENTITY
            .try_with(|cell| {
                cell.replace(identity);
            })
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_no_identity_outside_scope() {
        assert!(!SessionContext::is_active());
        assert_eq!(SessionContext::current_identity(), None);
        assert!(!SessionContext::update_identity(Some(SessionIdentity::new(1, "a@x.com"))));
        assert_eq!(SessionContext::current_identity(), None);
    }

    #[tokio::test]
    async fn test_nested_components_read_identity() {
        async fn nested() -> Option<i64> {
            tokio::task::yield_now().await;
            SessionContext::current_identity().map(|identity| identity.user_id)
        }

        let seen = SessionContext::scope(Some(SessionIdentity::new(7, "seven@x.com")), async {
            nested().await
        })
        .await;

        assert_eq!(seen, Some(7));
    }

    #[tokio::test]
    async fn test_anonymous_scope() {
        let seen = SessionContext::scope(None, async {
            (SessionContext::is_active(), SessionContext::current_identity())
        })
        .await;

        assert_eq!(seen, (true, None));
    }

    #[tokio::test]
    async fn test_update_applies_to_remainder_of_request() {
        let (before, after) = SessionContext::scope(None, async {
            let before = SessionContext::current_identity();
            assert!(SessionContext::update_identity(Some(SessionIdentity::new(3, "c@x.com"))));
            tokio::task::yield_now().await;
            (before, SessionContext::current_identity())
        })
        .await;

        assert_eq!(before, None);
        assert_eq!(after, Some(SessionIdentity::new(3, "c@x.com")));
        assert_eq!(SessionContext::current_identity(), None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_requests_are_isolated() {
        let mut handles = Vec::new();
        for user_id in 1..=16i64 {
            handles.push(tokio::spawn(async move {
                SessionContext::scope(
                    Some(SessionIdentity::new(user_id, format!("u{}@x.com", user_id))),
                    async move {
                        for _ in 0..10 {
                            tokio::time::sleep(Duration::from_millis(1)).await;
                            let identity = SessionContext::current_identity();
                            assert_eq!(identity.map(|i| i.user_id), Some(user_id));
                        }
                        if user_id % 2 == 0 {
                            SessionContext::update_identity(Some(SessionIdentity::new(
                                user_id * 100,
                                "updated@x.com",
                            )));
                        }
                        tokio::task::yield_now().await;
                        SessionContext::current_identity().map(|i| i.user_id)
                    },
                )
                .await
            }));
        }

        for (index, handle) in handles.into_iter().enumerate() {
            let user_id = index as i64 + 1;
            let expected = if user_id % 2 == 0 { user_id * 100 } else { user_id };
            assert_eq!(handle.await.unwrap(), Some(expected));
        }
    }

    #[tokio::test]
    async fn test_interleaved_scopes_on_one_task() {
        let first = SessionContext::scope(Some(SessionIdentity::new(1, "one@x.com")), async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            SessionContext::current_identity().map(|i| i.user_id)
        });
        let second = SessionContext::scope(Some(SessionIdentity::new(2, "two@x.com")), async {
            tokio::task::yield_now().await;
            SessionContext::current_identity().map(|i| i.user_id)
        });

        let (a, b) = tokio::join!(first, second);
        assert_eq!(a, Some(1));
        assert_eq!(b, Some(2));
    }
}
