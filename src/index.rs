//! Dual-keyed identity index
//!
//! Every mirrored folder and tag lives here exactly once, keyed by its
//! canonical id. A secondary map resolves stable uuids to that key, and an
//! alias map lets mountpoints be found by the id of the folder they mount.

use std::collections::HashMap;
use std::sync::Arc;

use crate::item_id::{alternate_key, canonical_key};
use crate::models::{Entity, FolderNode, Tag};

/// Entity lookup by id, uuid or alias
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IdentityIndex {
    account_id: Option<String>,
    by_id: HashMap<String, Entity>,
    by_uuid: HashMap<String, String>,
    aliases: HashMap<String, String>,
}

impl IdentityIndex {
    pub fn new(account_id: Option<String>) -> Self {
        Self {
            account_id,
            ..Self::default()
        }
    }

    pub fn account_id(&self) -> Option<&str> {
        self.account_id.as_deref()
    }

    /// Canonical storage key for a raw id
    pub fn key(&self, raw: &str) -> String {
        canonical_key(raw, self.account_id.as_deref())
    }

    /// Insert or overwrite; returns the entity previously stored under the same id
    pub fn put(&mut self, entity: Entity) -> Option<Entity> {
        let key = self.key(entity.id());
        let uuid = entity.uuid().map(str::to_owned);
        let previous = self.by_id.insert(key.clone(), entity);
        if let Some(old_uuid) = previous.as_ref().and_then(Entity::uuid)
            && uuid.as_deref() != Some(old_uuid)
        {
            self.by_uuid.remove(old_uuid);
        }
        if let Some(uuid) = uuid {
            self.by_uuid.insert(uuid, key);
        }
        previous
    }

    /// Make `alias` resolve to the entity stored under `id`
    pub fn put_alias(&mut self, alias: impl Into<String>, id: &str) {
        let key = self.key(id);
        self.aliases.insert(alias.into(), key);
    }

    pub fn remove_alias(&mut self, alias: &str) {
        self.aliases.remove(alias);
    }

    /// Resolve a raw id to the key it is stored under
    ///
    /// Tries the direct key, a registered alias, then the alternate
    /// (short or owner-qualified) form.
    pub fn resolve(&self, raw: &str) -> Option<String> {
        let key = self.key(raw);
        if self.by_id.contains_key(&key) {
            return Some(key);
        }
        if let Some(target) = self.aliases.get(raw).or_else(|| self.aliases.get(&key))
            && self.by_id.contains_key(target)
        {
            return Some(target.clone());
        }
        alternate_key(raw, self.account_id.as_deref()).filter(|alt| self.by_id.contains_key(alt))
    }

    pub fn get_by_id(&self, raw: &str) -> Option<&Entity> {
        self.resolve(raw).and_then(|key| self.by_id.get(&key))
    }

    pub fn get_by_uuid(&self, uuid: &str) -> Option<&Entity> {
        self.by_uuid.get(uuid).and_then(|key| self.by_id.get(key))
    }

    /// Remove an entity with its uuid mapping and any alias pointing at it
    pub fn remove_by_id(&mut self, raw: &str) -> Option<Entity> {
        let key = self.resolve(raw)?;
        let removed = self.by_id.remove(&key)?;
        if let Some(uuid) = removed.uuid() {
            self.by_uuid.remove(uuid);
        }
        self.aliases.retain(|_, target| *target != key);
        Some(removed)
    }

    pub fn contains(&self, raw: &str) -> bool {
        self.resolve(raw).is_some()
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub fn folder(&self, raw: &str) -> Option<&Arc<FolderNode>> {
        self.get_by_id(raw).and_then(Entity::as_folder)
    }

    /// Folder stored under an already resolved key
    pub(crate) fn folder_by_key(&self, key: &str) -> Option<&Arc<FolderNode>> {
        self.by_id.get(key).and_then(Entity::as_folder)
    }

    /// Copy-on-write access to a folder stored under `key`
    pub(crate) fn folder_mut(&mut self, key: &str) -> Option<&mut FolderNode> {
        match self.by_id.get_mut(key)? {
            Entity::Folder(node) => Some(Arc::make_mut(node)),
            _ => None,
        }
    }

    pub fn tag(&self, raw: &str) -> Option<&Arc<Tag>> {
        self.get_by_id(raw).and_then(Entity::as_tag)
    }

    pub(crate) fn tag_mut(&mut self, key: &str) -> Option<&mut Tag> {
        match self.by_id.get_mut(key)? {
            Entity::Tag(tag) => Some(Arc::make_mut(tag)),
            _ => None,
        }
    }

    pub fn folders(&self) -> impl Iterator<Item = &Arc<FolderNode>> {
        self.by_id.values().filter_map(Entity::as_folder)
    }

    pub fn tags(&self) -> impl Iterator<Item = &Arc<Tag>> {
        self.by_id.values().filter_map(Entity::as_tag)
    }
}
