//! Server-side sessions binding opaque tokens to authenticated principals.

use crate::models::Principal;
use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// An opaque reference to a server-side session. The token carries no
/// identity information itself; only the store can resolve it.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, Eq, PartialEq, Hash, Display)]
pub struct SessionToken(Uuid);

impl SessionToken {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

/// Storage for live sessions, injected into the service so tests and
/// embedders can supply their own backing.
///
/// Each successful login creates an independent session; nothing merges or
/// limits sessions across devices.
pub trait SessionStore {
    /// Binds a principal to a fresh token.
    fn insert(&mut self, principal: Principal) -> SessionToken;

    /// Resolves a token to the principal it was bound to, if the session
    /// is still live.
    fn resolve(&self, token: &SessionToken) -> Option<Principal>;

    /// Invalidates a session. Resolving the token afterwards returns None.
    /// Unknown tokens are ignored.
    fn remove(&mut self, token: &SessionToken);
}

/// In-process session store backed by a map.
#[derive(Default)]
pub struct MemorySessionStore {
    sessions: HashMap<SessionToken, Principal>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemorySessionStore {
    fn insert(&mut self, principal: Principal) -> SessionToken {
        let token = SessionToken::new();
        self.sessions.insert(token, principal);
        token
    }

    fn resolve(&self, token: &SessionToken) -> Option<Principal> {
        self.sessions.get(token).cloned()
    }

    fn remove(&mut self, token: &SessionToken) {
        self.sessions.remove(token);
    }
}
