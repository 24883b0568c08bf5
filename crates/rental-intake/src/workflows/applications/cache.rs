//! Read-through side cache for status views.
//!
//! Never the system of record: entries are dropped on every committed write and expire after a
//! fixed TTL. A view rendered from a revision older than the last committed write is refused, so a
//! slow reader cannot put back what a writer just invalidated. When full, the oldest insertion is
//! evicted first.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use super::domain::{ApplicationId, ApplicationStatusView};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheSettings {
    pub ttl_secs: u64,
    pub capacity: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            ttl_secs: 30,
            capacity: 256,
        }
    }
}

#[derive(Debug, Clone)]
struct CachedView {
    view: ApplicationStatusView,
    inserted_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<ApplicationId, CachedView>,
    order: VecDeque<(ApplicationId, DateTime<Utc>)>,
    /// Last committed revision per application.
    floors: HashMap<ApplicationId, u64>,
}

#[derive(Debug)]
pub struct StatusViewCache {
    settings: CacheSettings,
    state: Mutex<CacheState>,
}

impl StatusViewCache {
    pub fn new(settings: CacheSettings) -> Self {
        Self {
            settings,
            state: Mutex::new(CacheState::default()),
        }
    }

    pub fn settings(&self) -> CacheSettings {
        self.settings
    }

    fn ttl(&self) -> Duration {
        Duration::seconds(i64::try_from(self.settings.ttl_secs).unwrap_or(i64::MAX))
    }

    /// A fresh entry, if any. A poisoned lock reads as a miss.
    pub fn get(&self, id: &ApplicationId, now: DateTime<Utc>) -> Option<ApplicationStatusView> {
        let ttl = self.ttl();
        let mut state = self.state.lock().ok()?;
        let cached = state.entries.get(id).cloned();
        let fresh = match cached {
            Some(entry) if now - entry.inserted_at < ttl => Some(entry.view),
            Some(_) => {
                state.entries.remove(id);
                None
            }
            None => None,
        };
        debug!(application_id = %id, hit = fresh.is_some(), "status view cache lookup");
        fresh
    }

    pub fn insert(&self, view: ApplicationStatusView, now: DateTime<Utc>) {
        if self.settings.capacity == 0 {
            return;
        }
        let Ok(mut state) = self.state.lock() else {
            return;
        };

        let id = view.application_id.clone();
        if state
            .floors
            .get(&id)
            .is_some_and(|floor| view.revision < *floor)
        {
            debug!(
                application_id = %id,
                revision = view.revision,
                "refused status view older than the last committed write"
            );
            return;
        }
        while !state.entries.contains_key(&id) && state.entries.len() >= self.settings.capacity {
            let Some((oldest, stamp)) = state.order.pop_front() else {
                break;
            };
            // Queue entries left behind by invalidation or re-insertion are skipped.
            if state
                .entries
                .get(&oldest)
                .is_some_and(|entry| entry.inserted_at == stamp)
            {
                state.entries.remove(&oldest);
                debug!(application_id = %oldest, "evicted status view");
            }
        }

        state.order.push_back((id.clone(), now));
        state.entries.insert(
            id,
            CachedView {
                view,
                inserted_at: now,
            },
        );
    }

    /// Drop the entry after a write at `committed_revision`. Later inserts rendered from an
    /// older revision are refused.
    pub fn invalidate(&self, id: &ApplicationId, committed_revision: u64) {
        if let Ok(mut state) = self.state.lock() {
            state.entries.remove(id);
            let floor = state.floors.entry(id.clone()).or_insert(committed_revision);
            *floor = (*floor).max(committed_revision);
        }
    }

    /// Sweep expired entries, returning how many were dropped.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let ttl = self.ttl();
        let Ok(mut state) = self.state.lock() else {
            return 0;
        };
        let before = state.entries.len();
        state.entries.retain(|_, entry| now - entry.inserted_at < ttl);
        let live = &state.entries;
        let order: VecDeque<_> = state
            .order
            .iter()
            .filter(|(id, stamp)| live.get(id).is_some_and(|entry| entry.inserted_at == *stamp))
            .cloned()
            .collect();
        state.order = order;
        let purged = before - state.entries.len();
        if purged > 0 {
            debug!(purged, "purged expired status views");
        }
        purged
    }

    pub fn len(&self) -> usize {
        self.state.lock().map(|state| state.entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for StatusViewCache {
    fn default() -> Self {
        Self::new(CacheSettings::default())
    }
}
