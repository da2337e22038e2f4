//! Pending rewritten drafts, one per user.
//!
//! In-memory only; everything is lost on restart. A draft leaves the store
//! when it is sent, cancelled, replaced by a newer compose, or expires.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Duration, Utc};

use crate::config::DraftsConfig;
use crate::error::DraftError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Draft {
    pub owner_id: String,
    pub rewritten_text: String,
    pub origin_channel_id: String,
    pub created_at: DateTime<Utc>,
}

impl Draft {
    pub fn new(
        owner_id: impl Into<String>,
        rewritten_text: impl Into<String>,
        origin_channel_id: impl Into<String>,
    ) -> Self {
        Self {
            owner_id: owner_id.into(),
            rewritten_text: rewritten_text.into(),
            origin_channel_id: origin_channel_id.into(),
            created_at: Utc::now(),
        }
    }
}

pub struct DraftStore {
    drafts: Mutex<HashMap<String, Draft>>,
    /// `None` disables expiry.
    ttl: Option<Duration>,
    max_entries: usize,
}

impl DraftStore {
    pub fn new(config: &DraftsConfig) -> Self {
        let ttl = (config.ttl_secs > 0)
            .then(|| Duration::seconds(i64::try_from(config.ttl_secs).unwrap_or(i64::MAX)));
        Self {
            drafts: Mutex::new(HashMap::new()),
            ttl,
            max_entries: config.max_entries.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Draft>> {
        self.drafts.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_expired(&self, draft: &Draft, now: DateTime<Utc>) -> bool {
        self.ttl.is_some_and(|ttl| now - draft.created_at >= ttl)
    }

    /// Store `draft` as its owner's pending draft, returning the one it replaced.
    ///
    /// Two submissions racing for the same owner resolve last-write-wins.
    /// Evict expired drafts, then the oldest one, when a new owner would
    /// push the store past capacity.
    fn make_room(&self, drafts: &mut HashMap<String, Draft>, owner_id: &str, now: DateTime<Utc>) {
        if drafts.contains_key(owner_id) || drafts.len() < self.max_entries {
            return;
        }
        drafts.retain(|_, existing| !self.is_expired(existing, now));
        if drafts.len() >= self.max_entries {
            let oldest = drafts
                .values()
                .min_by_key(|existing| existing.created_at)
                .map(|existing| existing.owner_id.clone());
            if let Some(owner_id) = oldest {
                drafts.remove(&owner_id);
                tracing::debug!(owner_id = %owner_id, "drafts.evicted_for_capacity");
            }
        }
    }

    pub fn put(&self, draft: Draft) -> Option<Draft> {
        let now = Utc::now();
        let mut drafts = self.lock();
        self.make_room(&mut drafts, &draft.owner_id, now);
        drafts
            .insert(draft.owner_id.clone(), draft)
            .filter(|replaced| !self.is_expired(replaced, now))
    }

    /// Put back a draft taken for sending, unless the owner has composed a
    /// newer one in the meantime. Returns whether the draft was restored.
    pub fn restore(&self, draft: Draft) -> bool {
        let now = Utc::now();
        let mut drafts = self.lock();
        if drafts
            .get(&draft.owner_id)
            .is_some_and(|existing| !self.is_expired(existing, now))
        {
            return false;
        }
        self.make_room(&mut drafts, &draft.owner_id, now);
        drafts.insert(draft.owner_id.clone(), draft);
        true
    }

    /// Remove and return the owner's draft if it was composed in `channel_id`.
    ///
    /// On a channel mismatch the draft stays in the store.
    pub fn take_for_send(&self, owner_id: &str, channel_id: &str) -> Result<Draft, DraftError> {
        let now = Utc::now();
        let mut drafts = self.lock();

        let Some(draft) = drafts.get(owner_id) else {
            return Err(DraftError::NotFound);
        };
        if self.is_expired(draft, now) {
            drafts.remove(owner_id);
            return Err(DraftError::NotFound);
        }
        if draft.origin_channel_id != channel_id {
            return Err(DraftError::ChannelMismatch {
                origin_channel_id: draft.origin_channel_id.clone(),
                requested_channel_id: channel_id.to_string(),
            });
        }

        drafts.remove(owner_id).ok_or(DraftError::NotFound)
    }

    pub fn cancel(&self, owner_id: &str) -> Option<Draft> {
        let now = Utc::now();
        self.lock()
            .remove(owner_id)
            .filter(|draft| !self.is_expired(draft, now))
    }

    pub fn get(&self, owner_id: &str) -> Option<Draft> {
        let now = Utc::now();
        let mut drafts = self.lock();
        match drafts.get(owner_id) {
            Some(draft) if self.is_expired(draft, now) => {
                drafts.remove(owner_id);
                None
            }
            Some(draft) => Some(draft.clone()),
            None => None,
        }
    }

    /// Drop every expired draft, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        if self.ttl.is_none() {
            return 0;
        }
        let now = Utc::now();
        let mut drafts = self.lock();
        let before = drafts.len();
        drafts.retain(|_, draft| !self.is_expired(draft, now));
        before - drafts.len()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

impl Default for DraftStore {
    fn default() -> Self {
        Self::new(&DraftsConfig::default())
    }
}

impl std::fmt::Debug for DraftStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DraftStore")
            .field("ttl", &self.ttl)
            .field("max_entries", &self.max_entries)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aged(owner: &str, channel: &str, age_secs: i64) -> Draft {
        let mut draft = Draft::new(owner, format!("text from {owner}"), channel);
        draft.created_at = Utc::now() - Duration::seconds(age_secs);
        draft
    }

    fn store(ttl_secs: u64, max_entries: usize) -> DraftStore {
        DraftStore::new(&DraftsConfig {
            ttl_secs,
            max_entries,
            ..DraftsConfig::default()
        })
    }

    #[test]
    fn send_from_origin_channel_consumes_draft() {
        let store = DraftStore::default();
        store.put(Draft::new("u1", "Hello there.", "c1"));

        let draft = store.take_for_send("u1", "c1").unwrap();
        assert_eq!(draft.rewritten_text, "Hello there.");
        assert_eq!(draft.origin_channel_id, "c1");
        assert!(store.get("u1").is_none());
        assert_eq!(
            store.take_for_send("u1", "c1").unwrap_err(),
            DraftError::NotFound
        );
    }

    #[test]
    fn send_from_other_channel_keeps_draft() {
        let store = DraftStore::default();
        store.put(Draft::new("u1", "Hello there.", "c1"));

        let err = store.take_for_send("u1", "c2").unwrap_err();
        assert_eq!(
            err,
            DraftError::ChannelMismatch {
                origin_channel_id: "c1".into(),
                requested_channel_id: "c2".into(),
            }
        );
        assert_eq!(store.get("u1").unwrap().rewritten_text, "Hello there.");
        assert!(store.take_for_send("u1", "c1").is_ok());
    }

    #[test]
    fn cancel_removes_without_returning_on_second_call() {
        let store = DraftStore::default();
        store.put(Draft::new("u1", "Hello there.", "c1"));

        assert!(store.cancel("u1").is_some());
        assert!(store.cancel("u1").is_none());
        assert!(store.get("u1").is_none());
    }

    #[test]
    fn last_write_wins_per_owner() {
        let store = DraftStore::default();
        assert!(store.put(Draft::new("u1", "first", "c1")).is_none());
        let replaced = store.put(Draft::new("u1", "second", "c2")).unwrap();

        assert_eq!(replaced.rewritten_text, "first");
        assert_eq!(store.len(), 1);
        let live = store.get("u1").unwrap();
        assert_eq!(live.rewritten_text, "second");
        assert_eq!(live.origin_channel_id, "c2");
    }

    #[test]
    fn drafts_are_isolated_per_owner() {
        let store = DraftStore::default();
        store.put(Draft::new("u1", "mine", "c1"));
        store.put(Draft::new("u2", "yours", "c1"));

        assert_eq!(store.take_for_send("u2", "c1").unwrap().rewritten_text, "yours");
        assert_eq!(store.get("u1").unwrap().rewritten_text, "mine");
    }

    #[test]
    fn expired_drafts_are_invisible() {
        let store = store(60, 100);
        store.put(aged("u1", "c1", 120));

        assert!(store.get("u1").is_none());
        assert!(store.is_empty());

        store.put(aged("u2", "c1", 120));
        assert_eq!(
            store.take_for_send("u2", "c1").unwrap_err(),
            DraftError::NotFound
        );
    }

    #[test]
    fn purge_expired_counts_removed() {
        let store = store(60, 100);
        store.put(aged("old-1", "c1", 61));
        store.put(aged("old-2", "c1", 3600));
        store.put(aged("fresh", "c1", 5));

        assert_eq!(store.purge_expired(), 2);
        assert_eq!(store.len(), 1);
        assert!(store.get("fresh").is_some());
    }

    #[test]
    fn zero_ttl_disables_expiry() {
        let store = store(0, 100);
        store.put(aged("u1", "c1", 86_400 * 30));

        assert_eq!(store.purge_expired(), 0);
        assert!(store.get("u1").is_some());
    }

    #[test]
    fn capacity_evicts_oldest_draft() {
        let store = store(0, 2);
        store.put(aged("oldest", "c1", 30));
        store.put(aged("newer", "c1", 10));
        store.put(Draft::new("newest", "x", "c1"));

        assert_eq!(store.len(), 2);
        assert!(store.get("oldest").is_none());
        assert!(store.get("newer").is_some());
        assert!(store.get("newest").is_some());
    }

    #[test]
    fn replacing_at_capacity_does_not_evict_others() {
        let store = store(0, 2);
        store.put(aged("a", "c1", 30));
        store.put(aged("b", "c1", 10));
        store.put(Draft::new("a", "again", "c1"));

        assert_eq!(store.len(), 2);
        assert_eq!(store.get("a").unwrap().rewritten_text, "again");
        assert!(store.get("b").is_some());
    }

    #[test]
    fn restore_refills_an_empty_slot() {
        let store = DraftStore::default();
        store.put(Draft::new("u1", "Hello there.", "c1"));
        let taken = store.take_for_send("u1", "c1").unwrap();

        assert!(store.restore(taken));
        assert_eq!(store.get("u1").unwrap().rewritten_text, "Hello there.");
    }

    #[test]
    fn restore_never_overwrites_a_newer_draft() {
        let store = DraftStore::default();
        store.put(Draft::new("u1", "old draft", "c1"));
        let taken = store.take_for_send("u1", "c1").unwrap();
        store.put(Draft::new("u1", "new draft", "c1"));

        assert!(!store.restore(taken));
        assert_eq!(store.get("u1").unwrap().rewritten_text, "new draft");
    }

    #[test]
    fn restore_replaces_an_expired_draft() {
        let store = store(60, 10);
        let taken = Draft::new("u1", "kept", "c1");
        store.put(aged("u1", "c1", 120));

        assert!(store.restore(taken));
        assert_eq!(store.get("u1").unwrap().rewritten_text, "kept");
    }
}
