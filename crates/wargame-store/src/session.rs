//! Session identity and resolution

use crate::keys;
use crate::store::SessionKeyStore;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use url::Url;

/// Identifier literal used when nothing else is known
pub const DEFAULT_SESSION: &str = "default-session";

/// Query-string parameter carrying the session
pub const SESSION_PARAM: &str = "sessionId";

/// Opaque game session identifier
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Wrap a session string
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow as str
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self(DEFAULT_SESSION.to_string())
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for SessionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Derives the active session for a page load
///
/// Precedence: `sessionId` query parameter (persisted as the new default),
/// then the persisted `currentSessionId`, then [`DEFAULT_SESSION`].
pub struct SessionResolver<'a> {
    store: &'a SessionKeyStore,
}

impl<'a> SessionResolver<'a> {
    /// Create a resolver over a store
    #[inline]
    #[must_use]
    pub fn new(store: &'a SessionKeyStore) -> Self {
        Self { store }
    }

    /// Resolve from a raw query string (leading `?` optional)
    pub fn resolve(&self, query: Option<&str>) -> SessionId {
        let from_query = query.and_then(query_session);
        let session = match from_query {
            Some(id) => {
                if !self.store.set_raw(keys::CURRENT_SESSION_ID, &id) {
                    debug!(session = %id, "could not persist session from query");
                }
                info!(session = %id, "session taken from query string");
                SessionId(id)
            }
            None => self.persisted().unwrap_or_default(),
        };
        self.store.bind_session(session.clone());
        session
    }

    /// Resolve from a full page URL
    pub fn resolve_url(&self, page: &str) -> SessionId {
        let query = Url::parse(page)
            .ok()
            .and_then(|url| url.query().map(str::to_string));
        self.resolve(query.as_deref())
    }

    /// Adopt a session announced by another context
    pub fn adopt(&self, session: &SessionId) {
        if self.persisted().as_ref() != Some(session) {
            info!(session = %session, "adopting session from shared game state");
            self.store.set_raw(keys::CURRENT_SESSION_ID, session.as_str());
        }
        self.store.bind_session(session.clone());
    }

    fn persisted(&self) -> Option<SessionId> {
        self.store
            .get_raw(keys::CURRENT_SESSION_ID)
            .filter(|id| !id.is_empty())
            .map(SessionId)
    }
}

fn query_session(query: &str) -> Option<String> {
    let query = query.strip_prefix('?').unwrap_or(query);
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(name, _)| name == SESSION_PARAM)
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.is_empty())
}
