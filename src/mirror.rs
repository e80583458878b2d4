//! Immutable mailbox mirror snapshot
//!
//! A [`Mirror`] bundles the identity index, folder tree, tag registry and
//! mailbox size. Sessions publish it behind an `Arc`; mutation happens on a
//! private copy under the session lock.

use std::sync::Arc;

use serde_json::Value;

use crate::context::RefreshBlock;
use crate::errors::{MirrorError, MirrorResult};
use crate::index::IdentityIndex;
use crate::models::{
    Entity, FolderElement, FolderNode, FolderRecord, MailboxRecord, MountSpec, Tag, TagRecord,
    folder_ids,
};
use crate::tags::TagRegistry;
use crate::tree::FolderTree;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mirror {
    pub(crate) index: IdentityIndex,
    pub(crate) tree: FolderTree,
    pub(crate) tags: TagRegistry,
    pub(crate) size: u64,
}

impl Mirror {
    pub fn empty(account_id: Option<String>) -> Self {
        Self {
            index: IdentityIndex::new(account_id),
            ..Self::default()
        }
    }

    /// Build a complete mirror from a refresh payload
    ///
    /// All-or-nothing: any malformed part fails the whole build.
    ///
    /// # Errors
    ///
    /// Returns `Malformed` if the root folder, a tag or a mailbox record
    /// cannot be decoded.
    pub fn from_refresh(block: &RefreshBlock, account_id: Option<String>) -> MirrorResult<Self> {
        let mut mirror = Self::empty(account_id);
        for mbx in &block.mbx {
            let record: MailboxRecord = decode(mbx, "mbx")?;
            let own = match (&record.account_id, mirror.index.account_id()) {
                (Some(acct), Some(own)) => acct == own,
                _ => true,
            };
            if own && let Some(size) = record.size {
                mirror.size = size;
            }
        }
        if let Some(root) = &block.folder {
            let root: FolderRecord = decode(root, "folder")?;
            load_tree(&mut mirror.index, &mut mirror.tree, &root)?;
        }
        if let Some(tags) = &block.tags {
            let records = tags
                .tag
                .iter()
                .map(|t| decode::<TagRecord>(t, "tag"))
                .collect::<MirrorResult<Vec<_>>>()?;
            load_tags(&mut mirror.index, &mut mirror.tags, &records)?;
        }
        Ok(mirror)
    }

    /// Copy of this mirror with the folder tree rebuilt from `root`
    ///
    /// # Errors
    ///
    /// Returns `Malformed` if any folder record is invalid.
    pub fn with_folders(&self, root: &FolderRecord) -> MirrorResult<Self> {
        let mut next = self.clone();
        let stale: Vec<String> = next.index.folders().map(|f| f.id.clone()).collect();
        for id in stale {
            next.index.remove_by_id(&id);
        }
        next.tree = FolderTree::default();
        load_tree(&mut next.index, &mut next.tree, root)?;
        Ok(next)
    }

    /// Copy of this mirror with the tag registry rebuilt from `records`
    ///
    /// # Errors
    ///
    /// Returns `Malformed` if any tag record lacks a name.
    pub fn with_tags(&self, records: &[TagRecord]) -> MirrorResult<Self> {
        let mut next = self.clone();
        let stale: Vec<String> = next.index.tags().map(|t| t.id.clone()).collect();
        for id in stale {
            next.index.remove_by_id(&id);
        }
        next.tags = TagRegistry::populated();
        load_tags(&mut next.index, &mut next.tags, records)?;
        Ok(next)
    }

    pub fn folders_loaded(&self) -> bool {
        self.tree.root().is_some()
    }

    pub fn tags_loaded(&self) -> bool {
        self.tags.is_populated()
    }

    pub fn account_id(&self) -> Option<&str> {
        self.index.account_id()
    }

    /// Folder by id; placeholders are not returned
    pub fn folder_by_id(&self, id: &str) -> Option<Arc<FolderNode>> {
        self.index
            .folder(id)
            .filter(|f| !f.is_placeholder())
            .cloned()
    }

    pub fn folder_by_uuid(&self, uuid: &str) -> Option<Arc<FolderNode>> {
        self.index
            .get_by_uuid(uuid)
            .and_then(Entity::as_folder)
            .filter(|f| !f.is_placeholder())
            .cloned()
    }

    pub fn folder_by_path(&self, path: &str) -> Option<Arc<FolderNode>> {
        self.tree.get_by_path(&self.index, path)
    }

    /// Path lookup first, then id
    pub fn folder(&self, path_or_id: &str) -> Option<Arc<FolderNode>> {
        self.folder_by_path(path_or_id)
            .or_else(|| self.folder_by_id(path_or_id))
    }

    pub fn user_root(&self) -> Option<Arc<FolderNode>> {
        self.tree
            .root()
            .and_then(|key| self.index.folder(key))
            .cloned()
    }

    /// Every visible folder in tree order
    pub fn all_folders(&self) -> Vec<Arc<FolderNode>> {
        self.tree.subtree(&self.index)
    }

    pub fn orphans(&self) -> Vec<Arc<FolderNode>> {
        self.tree
            .orphans()
            .iter()
            .filter_map(|key| self.index.folder(key).cloned())
            .collect()
    }

    pub fn is_placeholder(&self, id: &str) -> bool {
        self.index.folder(id).is_some_and(|f| f.is_placeholder())
    }

    pub fn tag_by_id(&self, id: &str) -> Option<Arc<Tag>> {
        self.index.tag(id).cloned()
    }

    pub fn tag_by_name(&self, name: &str) -> Option<Arc<Tag>> {
        self.tags.get(&self.index, name).cloned()
    }

    /// All tags ordered by name
    pub fn all_tags(&self) -> Vec<Arc<Tag>> {
        let mut tags: Vec<Arc<Tag>> = self.index.tags().cloned().collect();
        tags.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
        tags
    }

    /// Mailbox size in bytes as last reported
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn index(&self) -> &IdentityIndex {
        &self.index
    }

    pub fn tree(&self) -> &FolderTree {
        &self.tree
    }

    /// Folder id matching a mountpoint's owner-qualified target id
    pub fn mountpoint_for_remote(&self, remote_id: &str) -> Option<Arc<FolderNode>> {
        self.index
            .folder(remote_id)
            .filter(|f| f.mount().is_some())
            .cloned()
    }
}

fn decode<T: serde::de::DeserializeOwned>(value: &Value, element: &str) -> MirrorResult<T> {
    serde_json::from_value(value.clone())
        .map_err(|e| MirrorError::malformed(format!("bad <{element}> in refresh: {e}")))
}

/// Index a nested folder record tree and link it under `root`
fn load_tree(index: &mut IdentityIndex, tree: &mut FolderTree, root: &FolderRecord) -> MirrorResult<()> {
    let root_node = FolderNode::from_record(root, FolderElement::Folder)?;
    index.put(Entity::Folder(Arc::new(root_node)));
    tree.set_root(index, &root.id)?;
    let mut stack = vec![root];
    while let Some(parent) = stack.pop() {
        let groups = [
            (FolderElement::Folder, &parent.folder),
            (FolderElement::Search, &parent.search),
            (FolderElement::Link, &parent.link),
        ];
        for (element, children) in groups {
            for child in children {
                let node = FolderNode::from_record(child, element)?;
                let alias = node.mount().map(MountSpec::canonical_remote_id);
                index.put(Entity::Folder(Arc::new(node)));
                if let Some(alias) = alias {
                    index.put_alias(alias, &child.id);
                }
                tree.add_child(index, &parent.id, &child.id);
                stack.push(child);
            }
        }
    }
    if index.folder(folder_ids::USER_ROOT).is_none() {
        tracing::debug!(root = %root.id, "refresh root is not the standard user root");
    }
    Ok(())
}

fn load_tags(index: &mut IdentityIndex, tags: &mut TagRegistry, records: &[TagRecord]) -> MirrorResult<()> {
    *tags = TagRegistry::populated();
    for record in records {
        tags.insert(index, Tag::from_record(record)?);
    }
    Ok(())
}
