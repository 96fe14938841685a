//! Session registry
//!
//! The one structure mutated from many tasks at once. All access goes
//! through these atomic operations; nothing else holds a reference to the
//! underlying map, and no operation here runs caller code while a map shard
//! is locked.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use tether_core::SessionId;

use crate::error::{Result, SignalingError};
use crate::session::Session;

pub struct SessionRegistry {
    sessions: DashMap<SessionId, Arc<Session>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }

    /// Atomic check-and-insert. An existing session is never overwritten;
    /// a collision is the caller's bug and comes back as `AlreadyExists`.
    pub fn register(&self, session: Arc<Session>) -> Result<()> {
        match self.sessions.entry(session.id().clone()) {
            Entry::Occupied(_) => Err(SignalingError::AlreadyExists(session.id().clone())),
            Entry::Vacant(slot) => {
                slot.insert(session);
                Ok(())
            }
        }
    }

    /// Atomic remove-and-return, transferring ownership so teardown can run
    /// outside any registry lock.
    pub fn unregister(&self, id: &SessionId) -> Result<Arc<Session>> {
        self.sessions
            .remove(id)
            .map(|(_, session)| session)
            .ok_or_else(|| SignalingError::NotFound(id.clone()))
    }

    /// Shared handle valid at the instant of the call; the session may be
    /// unregistered the moment this returns.
    pub fn lookup(&self, id: &SessionId) -> Option<Arc<Session>> {
        self.sessions.get(id).map(|entry| entry.value().clone())
    }

    /// Visit every registered session. The entries are snapshotted first,
    /// so the visitor is free to register or unregister sessions itself.
    pub fn for_each(&self, mut visitor: impl FnMut(&Arc<Session>)) {
        let snapshot: Vec<Arc<Session>> = self
            .sessions
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        for session in &snapshot {
            visitor(session);
        }
    }

    pub fn count(&self) -> usize {
        self.sessions.len()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{session_with_outbound, SessionRole};

    fn make_session(id: &str) -> Arc<Session> {
        let (session, _rx) =
            session_with_outbound(SessionId::new(id).unwrap(), SessionRole::Answering, 4, 4);
        session
    }

    #[test]
    fn count_tracks_register_and_unregister() {
        let registry = SessionRegistry::new();
        assert_eq!(registry.count(), 0);

        registry.register(make_session("a")).unwrap();
        registry.register(make_session("b")).unwrap();
        assert_eq!(registry.count(), 2);

        registry
            .unregister(&SessionId::new("a").unwrap())
            .unwrap();
        assert_eq!(registry.count(), 1);

        assert!(registry
            .unregister(&SessionId::new("a").unwrap())
            .is_err());
        assert_eq!(registry.count(), 1);
    }

    #[test]
    fn register_never_replaces() {
        let registry = SessionRegistry::new();
        let first = make_session("dup");
        registry.register(first.clone()).unwrap();

        let err = registry.register(make_session("dup")).unwrap_err();
        assert!(matches!(err, SignalingError::AlreadyExists(_)));

        let found = registry.lookup(&SessionId::new("dup").unwrap()).unwrap();
        assert!(Arc::ptr_eq(&found, &first));
    }

    #[test]
    fn lookup_misses_return_none() {
        let registry = SessionRegistry::new();
        assert!(registry.lookup(&SessionId::new("ghost").unwrap()).is_none());
    }

    #[test]
    fn for_each_tolerates_reentrant_mutation() {
        let registry = SessionRegistry::new();
        registry.register(make_session("a")).unwrap();
        registry.register(make_session("b")).unwrap();

        let mut visited = Vec::new();
        registry.for_each(|session| {
            visited.push(session.id().to_string());
            // unregistering while iterating must not deadlock or skip
            let _ = registry.unregister(session.id());
            let _ = registry.register(make_session("c"));
        });

        assert_eq!(visited.len(), 2);
    }
}
