//! In-memory session store.

use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::identity::Identity;
use crate::ids::SessionId;

/// One logical client conversation context.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Stable identifier.
    pub session_id: SessionId,
    /// Identity string, `"anonymous"` when unauthenticated.
    pub user_id: String,
    /// Optional label for personalisation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Set once at first creation.
    pub created_at: DateTime<Utc>,
    /// Updated on attach, detach and push.
    pub last_activity_at: DateTime<Utc>,
}

impl Session {
    fn new(session_id: SessionId, identity: Identity, now: DateTime<Utc>) -> Self {
        Self {
            session_id,
            user_id: identity.user_id,
            display_name: identity.display_name,
            created_at: now,
            last_activity_at: now,
        }
    }

    /// Whether the session belongs to the anonymous sentinel user.
    pub fn is_anonymous(&self) -> bool {
        self.user_id == crate::identity::ANONYMOUS_USER_ID
    }

    /// Time since the last recorded activity.
    pub fn idle_for(&self, now: DateTime<Utc>) -> Duration {
        (now - self.last_activity_at).to_std().unwrap_or_default()
    }
}

/// What a repeat `get_or_create` may do with the identity it is given.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReidentifyPolicy {
    /// Identity arguments on a repeat call are ignored.
    Never,
    /// An anonymous session adopts the first authenticated identity. The same
    /// user may refresh their display name. A session is never handed to a
    /// different authenticated user.
    #[default]
    UpgradeAnonymous,
}

/// Map from session id to session record.
///
/// Mutations are serialized per key by the underlying sharded map; unrelated
/// sessions do not contend.
pub struct SessionStore {
    sessions: DashMap<SessionId, Session>,
    reidentify: ReidentifyPolicy,
}

impl SessionStore {
    /// Create an empty store.
    pub fn new(reidentify: ReidentifyPolicy) -> Self {
        Self {
            sessions: DashMap::new(),
            reidentify,
        }
    }

    /// Return the session for `session_id`, creating it on first request.
    ///
    /// Idempotent: `created_at` of an existing record is never touched, but
    /// `last_activity_at` is, so a session being attached to is never idle.
    pub fn get_or_create(&self, session_id: &SessionId, identity: Identity) -> Session {
        match self.sessions.entry(session_id.clone()) {
            Entry::Occupied(mut entry) => {
                let session = entry.get_mut();
                session.last_activity_at = Utc::now();
                self.apply_identity(session, identity);
                session.clone()
            }
            Entry::Vacant(entry) => {
                let session = Session::new(session_id.clone(), identity, Utc::now());
                info!(session_id = %session_id, user_id = %session.user_id, "session created");
                entry.insert(session).clone()
            }
        }
    }

    fn apply_identity(&self, session: &mut Session, identity: Identity) {
        if self.reidentify == ReidentifyPolicy::Never || identity.is_anonymous() {
            return;
        }
        if session.is_anonymous() {
            debug!(
                session_id = %session.session_id,
                user_id = %identity.user_id,
                "anonymous session re-identified"
            );
            session.user_id = identity.user_id;
            session.display_name = identity.display_name;
        } else if session.user_id == identity.user_id && identity.display_name.is_some() {
            session.display_name = identity.display_name;
        }
    }

    /// Snapshot of a session record.
    pub fn get(&self, session_id: &SessionId) -> Option<Session> {
        self.sessions.get(session_id).map(|s| s.value().clone())
    }

    /// Bump `last_activity_at`. Returns `false` if the session is unknown.
    pub fn touch(&self, session_id: &SessionId) -> bool {
        match self.sessions.get_mut(session_id) {
            Some(mut session) => {
                session.last_activity_at = Utc::now();
                true
            }
            None => false,
        }
    }

    /// Whether the session exists.
    pub fn contains(&self, session_id: &SessionId) -> bool {
        self.sessions.contains_key(session_id)
    }

    /// Number of known sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether the store holds no sessions.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Remove sessions idle for longer than `max_idle` that have no live
    /// channel according to `is_live`. Returns the evicted ids.
    pub fn evict_idle(
        &self,
        max_idle: Duration,
        is_live: impl Fn(&SessionId) -> bool,
    ) -> Vec<SessionId> {
        let now = Utc::now();
        let candidates: Vec<SessionId> = self
            .sessions
            .iter()
            .filter(|entry| entry.value().idle_for(now) > max_idle)
            .map(|entry| entry.key().clone())
            .collect();

        let mut evicted = Vec::new();
        for id in candidates {
            if is_live(&id) {
                continue;
            }
            // Re-check under the shard lock; a concurrent attach refreshes
            // last_activity_at in get_or_create before it registers.
            let removed = self
                .sessions
                .remove_if(&id, |_, session| session.idle_for(Utc::now()) > max_idle);
            if removed.is_some() {
                evicted.push(id);
            }
        }
        evicted
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(ReidentifyPolicy::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sid(s: &str) -> SessionId {
        SessionId::parse(s).unwrap()
    }

    #[test]
    fn get_or_create_twice_keeps_created_at() {
        let store = SessionStore::default();
        let first = store.get_or_create(&sid("abc"), Identity::anonymous());
        std::thread::sleep(Duration::from_millis(5));
        let second = store.get_or_create(&sid("abc"), Identity::anonymous());
        assert_eq!(first.created_at, second.created_at);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn repeat_get_or_create_refreshes_activity() {
        let store = SessionStore::default();
        let first = store.get_or_create(&sid("abc"), Identity::anonymous());
        std::thread::sleep(Duration::from_millis(20));
        let second = store.get_or_create(&sid("abc"), Identity::anonymous());
        assert!(second.last_activity_at > first.last_activity_at);
        assert_eq!(second.created_at, first.created_at);
    }

    #[test]
    fn refreshed_session_survives_eviction() {
        let store = SessionStore::default();
        let _ = store.get_or_create(&sid("abc"), Identity::anonymous());
        std::thread::sleep(Duration::from_millis(30));
        let _ = store.get_or_create(&sid("abc"), Identity::anonymous());

        let evicted = store.evict_idle(Duration::from_millis(20), |_| false);
        assert!(evicted.is_empty());
        assert!(store.contains(&sid("abc")));
    }

    #[test]
    fn new_session_defaults_to_anonymous() {
        let store = SessionStore::default();
        let session = store.get_or_create(&sid("abc"), Identity::default());
        assert!(session.is_anonymous());
        assert_eq!(session.created_at, session.last_activity_at);
    }

    #[test]
    fn anonymous_session_upgrades_on_login() {
        let store = SessionStore::default();
        let _ = store.get_or_create(&sid("abc"), Identity::anonymous());
        let session = store.get_or_create(&sid("abc"), Identity::new("u_1", Some("Ada".into())));
        assert_eq!(session.user_id, "u_1");
        assert_eq!(session.display_name.as_deref(), Some("Ada"));
    }

    #[test]
    fn authenticated_session_is_not_reassigned() {
        let store = SessionStore::default();
        let _ = store.get_or_create(&sid("abc"), Identity::new("u_1", None));
        let session = store.get_or_create(&sid("abc"), Identity::new("u_2", Some("Eve".into())));
        assert_eq!(session.user_id, "u_1");
        assert!(session.display_name.is_none());
    }

    #[test]
    fn same_user_refreshes_display_name() {
        let store = SessionStore::default();
        let _ = store.get_or_create(&sid("abc"), Identity::new("u_1", Some("Ada".into())));
        let session = store.get_or_create(&sid("abc"), Identity::new("u_1", Some("Ada L.".into())));
        assert_eq!(session.display_name.as_deref(), Some("Ada L."));
    }

    #[test]
    fn later_anonymous_call_does_not_downgrade() {
        let store = SessionStore::default();
        let _ = store.get_or_create(&sid("abc"), Identity::new("u_1", None));
        let session = store.get_or_create(&sid("abc"), Identity::anonymous());
        assert_eq!(session.user_id, "u_1");
    }

    #[test]
    fn never_policy_ignores_identity() {
        let store = SessionStore::new(ReidentifyPolicy::Never);
        let _ = store.get_or_create(&sid("abc"), Identity::anonymous());
        let session = store.get_or_create(&sid("abc"), Identity::new("u_1", None));
        assert!(session.is_anonymous());
    }

    #[test]
    fn touch_updates_last_activity_only() {
        let store = SessionStore::default();
        let created = store.get_or_create(&sid("abc"), Identity::anonymous());
        std::thread::sleep(Duration::from_millis(5));
        assert!(store.touch(&sid("abc")));
        let after = store.get(&sid("abc")).unwrap();
        assert_eq!(after.created_at, created.created_at);
        assert!(after.last_activity_at > created.last_activity_at);
    }

    #[test]
    fn touch_unknown_session_is_false() {
        let store = SessionStore::default();
        assert!(!store.touch(&sid("nope")));
        assert!(store.is_empty());
    }

    #[test]
    fn evict_idle_skips_live_sessions() {
        let store = SessionStore::default();
        let _ = store.get_or_create(&sid("idle"), Identity::anonymous());
        let _ = store.get_or_create(&sid("live"), Identity::anonymous());
        std::thread::sleep(Duration::from_millis(20));

        let evicted = store.evict_idle(Duration::from_millis(1), |id| id.as_str() == "live");
        assert_eq!(evicted, vec![sid("idle")]);
        assert!(store.contains(&sid("live")));
        assert!(!store.contains(&sid("idle")));
    }

    #[test]
    fn evict_idle_keeps_recent_sessions() {
        let store = SessionStore::default();
        let _ = store.get_or_create(&sid("fresh"), Identity::anonymous());
        let evicted = store.evict_idle(Duration::from_secs(3600), |_| false);
        assert!(evicted.is_empty());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn concurrent_get_or_create_yields_one_record() {
        let store = std::sync::Arc::new(SessionStore::default());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || store.get_or_create(&sid("shared"), Identity::anonymous()))
            })
            .collect();
        let sessions: Vec<Session> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(store.len(), 1);
        assert!(sessions.windows(2).all(|w| w[0].created_at == w[1].created_at));
    }
}
