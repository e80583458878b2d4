//! Bounded entity caches
//!
//! Fixed-capacity LRU stores for singly fetched messages and contacts. Each
//! entry remembers the parameters it was fetched with; a lookup with other
//! parameters is a miss, and the re-fetched value takes the same slot.

use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use tracing::debug;

use crate::calendar::CalendarSummaryCache;
use crate::config::MirrorConfig;
use crate::index::IdentityIndex;
use crate::models::{Contact, Entity, Message};
use crate::pagination::PagedResultCache;
use crate::transport::{ContactParams, MessageParams};

/// One cached value with the parameters it was fetched with
#[derive(Debug, Clone)]
pub struct CacheEntry<P, V> {
    pub params: P,
    pub value: Arc<V>,
    /// Set when the value is known to be out of date
    pub dirty: bool,
}

#[derive(Debug)]
pub struct BoundedCache<P, V> {
    name: &'static str,
    entries: LruCache<String, CacheEntry<P, V>>,
}

impl<P: PartialEq, V: Clone> BoundedCache<P, V> {
    pub fn new(name: &'static str, capacity: NonZeroUsize) -> Self {
        Self {
            name,
            entries: LruCache::new(capacity),
        }
    }

    /// Clean value fetched with exactly `params`; refreshes recency on hit
    pub fn get(&mut self, id: &str, params: &P) -> Option<Arc<V>> {
        let entry = self.entries.get(id)?;
        if entry.dirty || entry.params != *params {
            return None;
        }
        Some(Arc::clone(&entry.value))
    }

    /// Value regardless of parameters, without touching recency
    pub fn peek(&self, id: &str) -> Option<Arc<V>> {
        self.entries
            .peek(id)
            .filter(|e| !e.dirty)
            .map(|e| Arc::clone(&e.value))
    }

    /// Insert or replace; returns the id of the least recently used entry
    /// when it had to go
    pub fn put(&mut self, id: impl Into<String>, params: P, value: Arc<V>) -> Option<String> {
        let entry = CacheEntry {
            params,
            value,
            dirty: false,
        };
        match self.entries.push(id.into(), entry) {
            Some((evicted, _)) if !self.entries.contains(&evicted) => {
                debug!(cache = self.name, id = %evicted, "evicted least recently used entry");
                Some(evicted)
            }
            _ => None,
        }
    }

    /// Stored value even when dirty, without touching recency
    fn stored(&self, id: &str) -> Option<Arc<V>> {
        self.entries.peek(id).map(|e| Arc::clone(&e.value))
    }

    pub fn remove(&mut self, id: &str) -> bool {
        self.entries.pop(id).is_some()
    }

    /// Patch a cached value in place; returns whether it was cached
    pub fn update(&mut self, id: &str, patch: impl FnOnce(&mut V)) -> bool {
        match self.entries.peek_mut(id) {
            Some(entry) => {
                patch(Arc::make_mut(&mut entry.value));
                true
            }
            None => false,
        }
    }

    /// Mark dirty every entry whose value matches `pred`; returns the count
    pub fn mark_dirty_where(&mut self, pred: impl Fn(&V) -> bool) -> usize {
        let mut marked = 0;
        for (_, entry) in self.entries.iter_mut() {
            if !entry.dirty && pred(&entry.value) {
                entry.dirty = true;
                marked += 1;
            }
        }
        marked
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.entries.cap().get()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains(id)
    }
}

/// Every cache a session keeps next to the mirror
///
/// Messages and contacts are also indexed by id and uuid for as long as
/// they stay cached; go through the `*_message`/`*_contact` methods so the
/// index follows puts, patches, evictions and removals.
#[derive(Debug)]
pub struct SessionCaches {
    pub messages: BoundedCache<MessageParams, Message>,
    pub contacts: BoundedCache<ContactParams, Contact>,
    items: IdentityIndex,
    /// Plain search pagers, dropped when matching items are created
    pub searches: PagedResultCache,
    pub conv_searches: PagedResultCache,
    pub calendar: CalendarSummaryCache,
}

impl SessionCaches {
    pub fn new(config: &MirrorConfig) -> Self {
        Self {
            messages: BoundedCache::new("messages", config.message_cache_size),
            contacts: BoundedCache::new("contacts", config.contact_cache_size),
            items: IdentityIndex::new(config.account_id.clone()),
            searches: PagedResultCache::new("search", config.search_pager_cache_size, true),
            conv_searches: PagedResultCache::new(
                "conversation-search",
                config.conv_pager_cache_size,
                false,
            ),
            calendar: CalendarSummaryCache::new(config.appt_summary_cache_size),
        }
    }

    pub fn put_message(&mut self, params: MessageParams, message: Arc<Message>) {
        let key = self.items.key(&message.id);
        if let Some(evicted) = self.messages.put(key, params, Arc::clone(&message)) {
            self.items.remove_by_id(&evicted);
        }
        self.items.put(Entity::Message(message));
    }

    pub fn put_contact(&mut self, params: ContactParams, contact: Arc<Contact>) {
        let key = self.items.key(&contact.id);
        if let Some(evicted) = self.contacts.put(key, params, Arc::clone(&contact)) {
            self.items.remove_by_id(&evicted);
        }
        self.items.put(Entity::Contact(contact));
    }

    /// Patch a cached message in place; returns whether it was cached
    pub fn patch_message(&mut self, id: &str, patch: impl FnOnce(&mut Message)) -> bool {
        let key = self.items.key(id);
        if !self.messages.update(&key, patch) {
            return false;
        }
        if let Some(message) = self.messages.stored(&key) {
            self.items.put(Entity::Message(message));
        }
        true
    }

    pub fn patch_contact(&mut self, id: &str, patch: impl FnOnce(&mut Contact)) -> bool {
        let key = self.items.key(id);
        if !self.contacts.update(&key, patch) {
            return false;
        }
        if let Some(contact) = self.contacts.stored(&key) {
            self.items.put(Entity::Contact(contact));
        }
        true
    }

    /// Forget a deleted item in both caches and the item index
    pub fn remove_item(&mut self, id: &str) {
        let key = self.items.key(id);
        self.messages.remove(&key);
        self.contacts.remove(&key);
        self.items.remove_by_id(&key);
    }

    /// Clean cached message or contact by id
    pub fn item_by_id(&self, id: &str) -> Option<Entity> {
        let entity = self.items.get_by_id(id)?;
        self.still_clean(entity)
    }

    /// Clean cached message or contact by uuid
    pub fn item_by_uuid(&self, uuid: &str) -> Option<Entity> {
        let entity = self.items.get_by_uuid(uuid)?;
        self.still_clean(entity)
    }

    fn still_clean(&self, entity: &Entity) -> Option<Entity> {
        let key = self.items.key(entity.id());
        let clean = match entity {
            Entity::Message(_) => self.messages.peek(&key).is_some(),
            Entity::Contact(_) => self.contacts.peek(&key).is_some(),
            Entity::Folder(_) | Entity::Tag(_) => false,
        };
        clean.then(|| entity.clone())
    }

    pub fn clear(&mut self) {
        self.messages.clear();
        self.contacts.clear();
        self.items = IdentityIndex::new(self.items.account_id().map(str::to_owned));
        self.searches.clear();
        self.conv_searches.clear();
        self.calendar.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
            && self.contacts.is_empty()
            && self.items.is_empty()
            && self.searches.is_empty()
            && self.conv_searches.is_empty()
            && self.calendar.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroUsize;
    use std::sync::Arc;

    use super::{BoundedCache, SessionCaches};
    use crate::config::MirrorConfig;
    use crate::models::{Entity, Message, MessageRecord};
    use crate::transport::MessageParams;

    fn message(id: &str) -> Arc<Message> {
        Arc::new(Message::from_record(MessageRecord {
            id: id.to_owned(),
            uuid: Some(format!("m-{id}")),
            ..MessageRecord::default()
        }))
    }

    fn cache(capacity: usize) -> BoundedCache<bool, String> {
        BoundedCache::new("test", NonZeroUsize::new(capacity).expect("non-zero"))
    }

    #[test]
    fn capacity_plus_one_evicts_least_recently_used() {
        let mut cache = cache(3);
        for id in ["a", "b", "c"] {
            cache.put(id, false, Arc::new(id.to_owned()));
        }
        assert!(cache.get("a", &false).is_some());
        cache.put("d", false, Arc::new("d".to_owned()));

        assert_eq!(cache.len(), 3);
        assert!(!cache.contains("b"));
        for id in ["a", "c", "d"] {
            assert!(cache.contains(id), "{id} should survive");
        }
    }

    #[test]
    fn different_params_miss_and_refetch_takes_same_slot() {
        let mut cache = cache(2);
        cache.put("77", false, Arc::new("plain".to_owned()));
        assert!(cache.get("77", &true).is_none());
        cache.put("77", true, Arc::new("html".to_owned()));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("77", &true).as_deref().map(String::as_str), Some("html"));
    }

    #[test]
    fn dirty_entries_miss() {
        let mut cache = cache(2);
        cache.put("900", false, Arc::new("group".to_owned()));
        assert_eq!(cache.mark_dirty_where(|v| v == "group"), 1);
        assert!(cache.get("900", &false).is_none());
        assert!(cache.peek("900").is_none());
    }

    #[test]
    fn update_patches_in_place() {
        let mut cache = cache(1);
        let original = Arc::new("u".to_owned());
        cache.put("77", false, Arc::clone(&original));
        assert!(cache.update("77", |v| v.clear()));
        assert_eq!(original.as_str(), "u");
        assert_eq!(cache.get("77", &false).as_deref().map(String::as_str), Some(""));
        assert!(!cache.update("78", |v| v.clear()));
        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn cached_items_resolve_by_uuid_until_evicted() {
        let mut caches = SessionCaches::new(&MirrorConfig::default());
        caches.put_message(MessageParams::default(), message("77"));
        assert!(matches!(caches.item_by_uuid("m-77"), Some(Entity::Message(m)) if m.id == "77"));
        assert!(caches.item_by_id("77").is_some());

        caches.put_message(MessageParams::default(), message("78"));
        assert!(caches.item_by_uuid("m-77").is_none());
        assert!(caches.item_by_id("77").is_none());
        assert!(caches.item_by_uuid("m-78").is_some());

        caches.remove_item("78");
        assert!(caches.item_by_uuid("m-78").is_none());
        assert!(caches.is_empty());
    }

    #[test]
    fn dirty_item_is_not_served_by_uuid() {
        let mut caches = SessionCaches::new(&MirrorConfig::default());
        caches.put_message(MessageParams::default(), message("77"));
        caches.messages.mark_dirty_where(|_| true);
        assert!(caches.item_by_uuid("m-77").is_none());

        caches.clear();
        assert!(caches.is_empty());
    }
}
