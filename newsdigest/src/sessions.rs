use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use common::TranslationConfig;
use tracing::{debug, info};
use uuid::Uuid;

use crate::cache::SingleFlight;
use crate::error::FetchError;
use crate::translation::TranslationCache;

/// Per-visitor state: derived content that is worth keeping between requests
/// from the same reader and nowhere else.
pub struct Session {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub translations: TranslationCache,
    /// Scraped page text keyed by article link
    pub contents: SingleFlight<String, String, FetchError>,
}

impl Session {
    /// `max_entries` bounds both the translations and the page text.
    pub fn new(id: impl Into<String>, max_entries: Option<usize>) -> Self {
        Self {
            id: id.into(),
            created_at: Utc::now(),
            translations: TranslationCache::with_capacity(max_entries),
            contents: SingleFlight::new(max_entries),
        }
    }
}

struct Entry {
    session: Arc<Session>,
    last_seen: Instant,
}

/// In-memory session registry. Sessions idle for longer than the configured
/// timeout are dropped the next time a session is looked up or created.
pub struct SessionStore {
    sessions: Mutex<HashMap<String, Entry>>,
    max_entries: Option<usize>,
    idle_timeout: Option<Duration>,
}

impl SessionStore {
    pub fn new(max_entries: Option<usize>, idle_timeout: Option<Duration>) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            max_entries,
            idle_timeout,
        }
    }

    pub fn from_config(config: &TranslationConfig) -> Self {
        let idle = (config.session_idle_seconds > 0)
            .then(|| Duration::from_secs(config.session_idle_seconds));
        Self::new(config.max_entries, idle)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        self.sessions.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn prune(&self, sessions: &mut HashMap<String, Entry>, now: Instant) {
        let Some(idle) = self.idle_timeout else {
            return;
        };
        sessions.retain(|id, entry| {
            let alive = now.duration_since(entry.last_seen) < idle;
            if !alive {
                let age = Utc::now() - entry.session.created_at;
                debug!(session_id = %id, age_seconds = age.num_seconds(), "session expired");
            }
            alive
        });
    }

    /// Look up `id`, or start a fresh session when it is absent, unknown or expired.
    pub fn get_or_create(&self, id: Option<&str>) -> Arc<Session> {
        let now = Instant::now();
        let mut sessions = self.lock();
        self.prune(&mut sessions, now);

        if let Some(entry) = id.and_then(|id| sessions.get_mut(id)) {
            entry.last_seen = now;
            return Arc::clone(&entry.session);
        }

        let id = Uuid::new_v4().to_string();
        let session = Arc::new(Session::new(id.clone(), self.max_entries));
        sessions.insert(
            id.clone(),
            Entry {
                session: Arc::clone(&session),
                last_seen: now,
            },
        );
        info!(session_id = %id, active = sessions.len(), "session created");
        session
    }

    pub fn get(&self, id: &str) -> Option<Arc<Session>> {
        self.lock().get(id).map(|entry| Arc::clone(&entry.session))
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_id_returns_same_session() {
        let store = SessionStore::new(None, None);
        let first = store.get_or_create(None);
        let again = store.get_or_create(Some(&first.id));

        assert!(Arc::ptr_eq(&first, &again));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn unknown_id_starts_a_new_session() {
        let store = SessionStore::new(Some(10), None);
        let session = store.get_or_create(Some("stale-cookie"));

        assert_ne!(session.id, "stale-cookie");
        assert!(store.get("stale-cookie").is_none());
        assert!(store.get(&session.id).is_some());
    }

    #[test]
    fn sessions_do_not_share_translations() {
        let store = SessionStore::new(None, None);
        let a = store.get_or_create(None);
        let b = store.get_or_create(None);

        assert_ne!(a.id, b.id);
        assert!(!std::ptr::eq(&a.translations, &b.translations));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn idle_sessions_expire_on_next_lookup() {
        let store = SessionStore::new(None, Some(Duration::from_millis(50)));
        let stale = store.get_or_create(None);
        std::thread::sleep(Duration::from_millis(120));

        let fresh = store.get_or_create(Some(&stale.id));

        assert_ne!(fresh.id, stale.id);
        assert!(store.get(&stale.id).is_none());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn anonymous_requests_do_not_accumulate_past_idle_timeout() {
        let store = SessionStore::new(None, Some(Duration::from_millis(50)));
        for _ in 0..100 {
            store.get_or_create(None);
        }
        assert_eq!(store.len(), 100);
        std::thread::sleep(Duration::from_millis(120));

        store.get_or_create(None);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn zero_idle_seconds_keeps_sessions() {
        let config = TranslationConfig {
            session_idle_seconds: 0,
            ..TranslationConfig::default()
        };
        let store = SessionStore::from_config(&config);
        let first = store.get_or_create(None);
        std::thread::sleep(Duration::from_millis(20));

        let again = store.get_or_create(Some(&first.id));
        assert!(Arc::ptr_eq(&first, &again));
    }

    #[tokio::test]
    async fn page_text_is_bounded_like_translations() {
        let session = Session::new("s", Some(2));
        for link in ["https://example.com/1", "https://example.com/2", "https://example.com/3"] {
            session
                .contents
                .get_or_try_insert(link.to_string(), || async move {
                    Ok::<_, FetchError>(format!("text of {link}"))
                })
                .await
                .unwrap();
        }

        assert_eq!(session.contents.len(), 2);
        assert!(session.contents.get(&"https://example.com/1".to_string()).is_none());
        assert!(session.contents.get(&"https://example.com/3".to_string()).is_some());
    }
}
