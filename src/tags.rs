//! Tag name registry
//!
//! Tags share the identity index with folders; this registry only adds the
//! name lookup. Names compare case-insensitively.

use std::collections::HashMap;
use std::sync::Arc;

use crate::index::IdentityIndex;
use crate::models::{Entity, Tag};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagRegistry {
    /// `None` until the registry has been populated
    by_name: Option<HashMap<String, String>>,
}

fn fold(name: &str) -> String {
    name.to_lowercase()
}

impl TagRegistry {
    /// An empty but populated registry
    pub fn populated() -> Self {
        Self {
            by_name: Some(HashMap::new()),
        }
    }

    pub fn is_populated(&self) -> bool {
        self.by_name.is_some()
    }

    /// Index a tag and map its name
    pub fn insert(&mut self, index: &mut IdentityIndex, tag: Tag) {
        let key = index.key(&tag.id);
        let name = fold(&tag.name);
        if let Some(Entity::Tag(old)) = index.put(Entity::Tag(Arc::new(tag))) {
            self.forget_name(&old.name, &key);
        }
        self.by_name.get_or_insert_with(HashMap::new).insert(name, key);
    }

    /// Drop the name mapping of a removed tag
    pub fn forget(&mut self, tag: &Tag, key: &str) {
        self.forget_name(&tag.name, key);
    }

    /// Move the name mapping from `old_name` to `new_name`
    pub fn rename(&mut self, old_name: &str, new_name: &str, key: &str) {
        self.forget_name(old_name, key);
        if let Some(map) = self.by_name.as_mut() {
            map.insert(fold(new_name), key.to_owned());
        }
    }

    /// Index key of the tag named `name`
    pub fn key_for(&self, name: &str) -> Option<&str> {
        self.by_name.as_ref()?.get(&fold(name)).map(String::as_str)
    }

    pub fn get<'a>(&self, index: &'a IdentityIndex, name: &str) -> Option<&'a Arc<Tag>> {
        self.key_for(name).and_then(|key| index.tag(key))
    }

    pub fn len(&self) -> usize {
        self.by_name.as_ref().map_or(0, HashMap::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn forget_name(&mut self, name: &str, key: &str) {
        let Some(map) = self.by_name.as_mut() else {
            return;
        };
        let folded = fold(name);
        if map.get(&folded).is_some_and(|k| k == key) {
            map.remove(&folded);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::TagRegistry;
    use crate::index::IdentityIndex;
    use crate::models::Tag;

    fn tag(id: &str, name: &str) -> Tag {
        Tag {
            id: id.to_owned(),
            uuid: None,
            name: name.to_owned(),
            color: 0,
            rgb: None,
            unread: 0,
            count: 0,
        }
    }

    #[test]
    fn unpopulated_until_first_insert() {
        let mut index = IdentityIndex::new(None);
        let mut tags = TagRegistry::default();
        assert!(!tags.is_populated());
        tags.insert(&mut index, tag("64", "Work"));
        assert!(tags.is_populated());
        assert_eq!(tags.get(&index, "work").map(|t| t.id.as_str()), Some("64"));
    }

    #[test]
    fn rename_moves_the_name_mapping() {
        let mut index = IdentityIndex::new(None);
        let mut tags = TagRegistry::populated();
        tags.insert(&mut index, tag("64", "work"));
        tags.rename("work", "office", "64");
        assert!(tags.key_for("work").is_none());
        assert_eq!(tags.key_for("OFFICE"), Some("64"));
        assert_eq!(tags.len(), 1);
    }

    #[test]
    fn reinsert_under_new_name_drops_old_name() {
        let mut index = IdentityIndex::new(None);
        let mut tags = TagRegistry::populated();
        tags.insert(&mut index, tag("64", "work"));
        tags.insert(&mut index, tag("64", "office"));
        assert!(tags.key_for("work").is_none());
        assert_eq!(tags.len(), 1);
        assert_eq!(index.len(), 1);
    }
}
