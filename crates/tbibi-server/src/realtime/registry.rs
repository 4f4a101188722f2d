//! Process-wide map of online users to their live session.
//!
//! At most one session is registered per user id. A newer connection for
//! the same id replaces the older one and closes it. Removal is guarded by
//! pointer identity so a superseded session tearing down late can never
//! evict its replacement.

use std::sync::Arc;

use dashmap::DashMap;
use metrics::counter;
use tracing::info;

use super::session::Session;
use crate::metrics::WS_SESSIONS_SUPERSEDED_TOTAL;

/// Registry of live sessions keyed by user id.
#[derive(Default)]
pub struct ConnectionRegistry {
    sessions: DashMap<String, Arc<Session>>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `session` as the current handle for its user id.
    ///
    /// Returns the session it replaced, which has already been closed.
    pub fn register(&self, session: Arc<Session>) -> Option<Arc<Session>> {
        let user_id = session.user_id().to_string();
        let previous = self.sessions.insert(user_id, Arc::clone(&session));

        if let Some(prev) = &previous {
            if !Arc::ptr_eq(prev, &session) {
                prev.close();
                counter!(WS_SESSIONS_SUPERSEDED_TOTAL).increment(1);
                info!(
                    user_id = %session.user_id(),
                    old_session = %prev.id(),
                    new_session = %session.id(),
                    "session superseded by reconnect"
                );
            }
        }
        previous
    }

    /// Current session for `user_id`, if online.
    pub fn lookup(&self, user_id: &str) -> Option<Arc<Session>> {
        self.sessions
            .get(user_id)
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Remove the entry for `user_id` only if it is exactly `session`.
    ///
    /// Returns whether an entry was removed.
    pub fn deregister(&self, user_id: &str, session: &Arc<Session>) -> bool {
        self.sessions
            .remove_if(user_id, |_, current| Arc::ptr_eq(current, session))
            .is_some()
    }

    /// Whether `user_id` has a registered session.
    pub fn is_online(&self, user_id: &str) -> bool {
        self.sessions.contains_key(user_id)
    }

    /// Number of online users.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether nobody is online.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Ids of online users, in no particular order.
    pub fn online_users(&self) -> Vec<String> {
        self.sessions.iter().map(|e| e.key().clone()).collect()
    }
}

#[cfg(test)]
#[allow(unused_results)]
mod tests {
    use tokio_util::sync::CancellationToken;

    use super::*;

    fn session(user: &str) -> Arc<Session> {
        let (session, _rx) = Session::new(user, 4, CancellationToken::new());
        session
    }

    #[test]
    fn register_and_lookup() {
        let registry = ConnectionRegistry::new();
        let s = session("u1");
        assert!(registry.register(Arc::clone(&s)).is_none());
        assert!(Arc::ptr_eq(&registry.lookup("u1").unwrap(), &s));
        assert!(registry.lookup("u2").is_none());
        assert!(registry.is_online("u1"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn second_register_supersedes_and_closes_first() {
        let registry = ConnectionRegistry::new();
        let first = session("u1");
        let second = session("u1");
        registry.register(Arc::clone(&first));

        let replaced = registry.register(Arc::clone(&second)).unwrap();
        assert!(Arc::ptr_eq(&replaced, &first));
        assert!(first.is_closed());
        assert!(!second.is_closed());
        assert!(Arc::ptr_eq(&registry.lookup("u1").unwrap(), &second));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn re_registering_same_session_does_not_close_it() {
        let registry = ConnectionRegistry::new();
        let s = session("u1");
        registry.register(Arc::clone(&s));
        registry.register(Arc::clone(&s));
        assert!(!s.is_closed());
    }

    #[test]
    fn deregister_requires_identity() {
        let registry = ConnectionRegistry::new();
        let old = session("u1");
        let new = session("u1");
        registry.register(Arc::clone(&old));
        registry.register(Arc::clone(&new));

        assert!(!registry.deregister("u1", &old));
        assert!(registry.is_online("u1"));
        assert!(registry.deregister("u1", &new));
        assert!(registry.is_empty());
        assert!(!registry.deregister("u1", &new));
    }

    #[test]
    fn online_users_lists_each_user() {
        let registry = ConnectionRegistry::new();
        let a = session("a");
        let b = session("b");
        registry.register(Arc::clone(&a));
        registry.register(Arc::clone(&b));

        let mut users = registry.online_users();
        users.sort();
        assert_eq!(users, vec!["a".to_string(), "b".to_string()]);
        assert!(!a.is_closed() && !b.is_closed());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_registers_leave_one_live_session_per_user() {
        let registry = Arc::new(ConnectionRegistry::new());
        let handles: Vec<_> = (0..64)
            .map(|i| {
                let registry = Arc::clone(&registry);
                tokio::spawn(async move {
                    let s = session(&format!("u{}", i % 4));
                    registry.register(Arc::clone(&s));
                    s
                })
            })
            .collect();

        let mut all = Vec::new();
        for h in handles {
            all.push(h.await.unwrap());
        }

        assert_eq!(registry.len(), 4);
        for user in ["u0", "u1", "u2", "u3"] {
            let current = registry.lookup(user).unwrap();
            assert!(!current.is_closed());
            let live = all
                .iter()
                .filter(|s| s.user_id() == user && !s.is_closed())
                .count();
            assert_eq!(live, 1, "exactly one open session for {user}");
        }
    }
}
