//! Folder hierarchy over the identity index
//!
//! Nodes live in the [`IdentityIndex`]; the tree only tracks the root key and
//! the folders whose parent is not (yet) known. Every structural change swaps
//! in a freshly allocated children list and re-derives the cached paths of
//! the affected subtree.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::errors::{MirrorError, MirrorResult};
use crate::index::IdentityIndex;
use crate::models::{FolderNode, PATH_SEPARATOR};

/// Where a folder ended up after being placed in the tree
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    Attached,
    Orphaned,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FolderTree {
    root: Option<String>,
    orphans: Arc<Vec<String>>,
}

impl FolderTree {
    pub fn root(&self) -> Option<&str> {
        self.root.as_deref()
    }

    /// Root-level folders whose declared parent is unknown
    pub fn orphans(&self) -> &[String] {
        &self.orphans
    }

    pub(crate) fn set_root(&mut self, index: &mut IdentityIndex, raw: &str) -> MirrorResult<()> {
        let key = index
            .resolve(raw)
            .ok_or_else(|| MirrorError::NotFound(format!("root folder {raw}")))?;
        self.root = Some(key.clone());
        self.refresh_paths(index, &key);
        Ok(())
    }

    /// Append `node` to `parent`'s children
    ///
    /// Returns false when either is unknown, they are the same folder, or
    /// `parent` already hangs beneath `node`.
    pub fn add_child(&mut self, index: &mut IdentityIndex, parent: &str, node: &str) -> bool {
        let (Some(parent_key), Some(node_key)) = (index.resolve(parent), index.resolve(node)) else {
            return false;
        };
        if parent_key == node_key || index.folder_by_key(&node_key).is_none() {
            return false;
        }
        if self.is_within(index, &parent_key, &node_key) {
            warn!(folder = %node_key, parent = %parent_key, "rejected attach that would form a cycle");
            return false;
        }
        let Some(parent_node) = index.folder_mut(&parent_key) else {
            return false;
        };
        if !parent_node.children.contains(&node_key) {
            let mut children = Vec::with_capacity(parent_node.children.len() + 1);
            children.extend(parent_node.children.iter().cloned());
            children.push(node_key.clone());
            parent_node.children = Arc::new(children);
        }
        self.drop_orphan(&node_key);
        self.refresh_paths(index, &node_key);
        true
    }

    /// Remove `node` from `parent`'s children; returns whether it was there
    pub fn remove_child(&mut self, index: &mut IdentityIndex, parent: &str, node: &str) -> bool {
        let Some(parent_key) = index.resolve(parent) else {
            return false;
        };
        let node_key = index.resolve(node).unwrap_or_else(|| index.key(node));
        let present = index
            .folder_by_key(&parent_key)
            .is_some_and(|p| p.children.contains(&node_key));
        if !present {
            return false;
        }
        if let Some(parent_node) = index.folder_mut(&parent_key) {
            let children: Vec<String> = parent_node
                .children
                .iter()
                .filter(|k| **k != node_key)
                .cloned()
                .collect();
            parent_node.children = Arc::new(children);
        }
        true
    }

    /// Attach a folder under its declared parent if that parent is indexed
    pub(crate) fn try_attach(&mut self, index: &mut IdentityIndex, key: &str) -> bool {
        let Some(parent_id) = index.folder_by_key(key).and_then(|n| n.parent_id.clone()) else {
            return false;
        };
        self.add_child(index, &parent_id, key)
    }

    /// Keep a folder at root level until its parent shows up
    pub(crate) fn make_orphan(&mut self, index: &mut IdentityIndex, key: &str) {
        if !self.orphans.iter().any(|k| k == key) {
            let mut orphans = Vec::with_capacity(self.orphans.len() + 1);
            orphans.extend(self.orphans.iter().cloned());
            orphans.push(key.to_owned());
            self.orphans = Arc::new(orphans);
        }
        warn!(
            folder = %key,
            parent = ?index.folder_by_key(key).and_then(|n| n.parent_id.clone()),
            "folder parent unknown, kept as root-level orphan"
        );
        self.refresh_paths(index, key);
    }

    /// Re-attach orphans whose parent is now indexed; returns how many moved
    pub(crate) fn retry_orphans(&mut self, index: &mut IdentityIndex) -> usize {
        let pending: Vec<String> = self.orphans.iter().cloned().collect();
        let mut attached = 0;
        for key in pending {
            if self.try_attach(index, &key) {
                debug!(folder = %key, "orphaned folder re-attached");
                attached += 1;
            }
        }
        attached
    }

    /// Unlink a folder from wherever it currently hangs
    pub(crate) fn detach(&mut self, index: &mut IdentityIndex, key: &str) {
        self.drop_orphan(key);
        let declared = index.folder_by_key(key).and_then(|n| n.parent_id.clone());
        if let Some(parent) = declared
            && self.remove_child(index, &parent, key)
        {
            return;
        }
        // placeholders and stale parent ids: find the holder by scanning
        let holder = index
            .folders()
            .find(|f| f.children.iter().any(|c| c == key))
            .map(|f| f.id.clone());
        if let Some(holder) = holder {
            self.remove_child(index, &holder, key);
        }
    }

    /// Move a folder beneath a new parent
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown folder and `InvalidInput` when the
    /// move would put the folder beneath itself or move the root.
    pub fn reparent(
        &mut self,
        index: &mut IdentityIndex,
        node: &str,
        new_parent: &str,
    ) -> MirrorResult<Placement> {
        let key = index
            .resolve(node)
            .filter(|k| index.folder_by_key(k).is_some())
            .ok_or_else(|| MirrorError::NotFound(format!("folder {node}")))?;
        if self.root.as_deref() == Some(key.as_str()) {
            return Err(MirrorError::invalid("the user root cannot be moved"));
        }
        if let Some(parent_key) = index.resolve(new_parent)
            && self.is_within(index, &parent_key, &key)
        {
            warn!(folder = %key, new_parent = %parent_key, "rejected move of folder beneath itself");
            return Err(MirrorError::invalid(format!(
                "cannot move folder {node} beneath {new_parent}"
            )));
        }
        self.detach(index, &key);
        if let Some(n) = index.folder_mut(&key) {
            n.parent_id = Some(new_parent.to_owned());
        }
        if self.try_attach(index, &key) {
            Ok(Placement::Attached)
        } else {
            self.make_orphan(index, &key);
            Ok(Placement::Orphaned)
        }
    }

    /// Whether `candidate` is `ancestor` or one of its descendants
    fn is_within(&self, index: &IdentityIndex, candidate: &str, ancestor: &str) -> bool {
        let mut current = Some(candidate.to_owned());
        let mut steps = 0;
        while let Some(key) = current {
            if key == ancestor {
                return true;
            }
            steps += 1;
            if steps > index.len() {
                return false;
            }
            current = index
                .folder_by_key(&key)
                .and_then(|n| n.parent_id.as_deref())
                .and_then(|p| index.resolve(p));
        }
        false
    }

    /// Resolve an absolute path, segment by segment, ignoring case
    ///
    /// Placeholders may be walked through but never returned.
    pub fn get_by_path(&self, index: &IdentityIndex, path: &str) -> Option<Arc<FolderNode>> {
        let root_key = self.root.as_deref()?;
        let mut current = index.folder_by_key(root_key)?;
        let mut at_root = true;
        for segment in path.split(PATH_SEPARATOR).filter(|s| !s.is_empty()) {
            let wanted = segment.to_lowercase();
            let matches = |key: &String| {
                index
                    .folder_by_key(key)
                    .filter(|f| f.name.to_lowercase() == wanted)
            };
            let next = current.children.iter().find_map(matches);
            let next = match next {
                Some(n) => n,
                None if at_root => self.orphans.iter().find_map(matches)?,
                None => return None,
            };
            current = next;
            at_root = false;
        }
        if current.is_placeholder() {
            None
        } else {
            Some(Arc::clone(current))
        }
    }

    /// Every visible folder in preorder, root first, orphans last
    pub fn subtree(&self, index: &IdentityIndex) -> Vec<Arc<FolderNode>> {
        let mut out = Vec::new();
        let mut stack: Vec<&str> = self.orphans.iter().rev().map(String::as_str).collect();
        if let Some(root) = self.root.as_deref() {
            stack.push(root);
        }
        let mut visited = 0;
        while let Some(key) = stack.pop() {
            let Some(node) = index.folder_by_key(key) else {
                continue;
            };
            visited += 1;
            if visited > index.len() {
                break;
            }
            if !node.is_placeholder() {
                out.push(Arc::clone(node));
            }
            stack.extend(node.children.iter().rev().map(String::as_str));
        }
        out
    }

    fn drop_orphan(&mut self, key: &str) {
        if self.orphans.iter().any(|k| k == key) {
            let orphans: Vec<String> = self.orphans.iter().filter(|k| *k != key).cloned().collect();
            self.orphans = Arc::new(orphans);
        }
    }

    fn base_path(&self, index: &IdentityIndex, key: &str) -> Option<String> {
        let node = index.folder_by_key(key)?;
        if self.root.as_deref() == Some(key) {
            return Some(PATH_SEPARATOR.to_owned());
        }
        let holder = node
            .parent_id
            .as_deref()
            .and_then(|p| index.resolve(p))
            .and_then(|p| index.folder_by_key(&p))
            .filter(|p| p.children.iter().any(|c| c == key))
            .or_else(|| index.folders().find(|f| f.children.iter().any(|c| c == key)));
        Some(match holder {
            Some(parent) => node.path_under(&parent.path),
            None => node.path_under(PATH_SEPARATOR),
        })
    }

    /// Re-derive the cached path of `key` and everything beneath it
    pub(crate) fn refresh_paths(&self, index: &mut IdentityIndex, key: &str) {
        let Some(start) = self.base_path(index, key) else {
            return;
        };
        let mut stack = vec![(key.to_owned(), start)];
        let mut visited = 0;
        while let Some((current, path)) = stack.pop() {
            visited += 1;
            if visited > index.len() {
                warn!(folder = %key, "folder path derivation exceeded index size");
                break;
            }
            let Some(node) = index.folder_by_key(&current) else {
                continue;
            };
            let children = Arc::clone(&node.children);
            if node.path != path
                && let Some(node) = index.folder_mut(&current)
            {
                node.path = path.clone();
            }
            for child in children.iter() {
                if let Some(child_node) = index.folder_by_key(child) {
                    stack.push((child.clone(), child_node.path_under(&path)));
                }
            }
        }
    }
}
