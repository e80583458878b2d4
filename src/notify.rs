//! Response context application
//!
//! Applies one response's context to the mirror and caches in a fixed order:
//! the refresh block, the change block, then every notify block. Inside a
//! notify block deletions go first, then creations (with a parent fixup
//! pass), then modifications, then pending generic modifications.
//!
//! A record that cannot be decoded is logged and skipped. Only a bad refresh
//! payload fails the whole context, and then nothing is applied.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::cache::SessionCaches;
use crate::context::{NotifyBlock, RawRecord, RefreshBlock, ResponseContext, element, search_type_for};
use crate::errors::{MirrorError, MirrorResult};
use crate::events::{Listeners, MirrorEvent};
use crate::item_id::split_id_list;
use crate::mirror::Mirror;
use crate::models::{
    ContactRecord, Entity, FolderElement, FolderNode, FolderRecord, ItemPatch, MailboxRecord,
    MountSpec, Tag, TagRecord,
};
use crate::sync::{ChangeObservation, SyncState};

/// What applying a context did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyOutcome {
    /// A refresh payload replaced the mirror
    pub refreshed: bool,
    /// The change sequence went backwards
    pub discontinuity: bool,
}

pub struct NotificationApplier<'a> {
    mirror: &'a mut Arc<Mirror>,
    caches: &'a mut SessionCaches,
    sync: &'a mut SyncState,
    listeners: &'a Listeners,
    events: Vec<MirrorEvent>,
}

impl<'a> NotificationApplier<'a> {
    pub fn new(
        mirror: &'a mut Arc<Mirror>,
        caches: &'a mut SessionCaches,
        sync: &'a mut SyncState,
        listeners: &'a Listeners,
    ) -> Self {
        Self {
            mirror,
            caches,
            sync,
            listeners,
            events: Vec::new(),
        }
    }

    /// Apply a whole response context
    ///
    /// # Errors
    ///
    /// Returns `Malformed` when the refresh payload cannot be decoded; the
    /// mirror, caches and sequence state are then left untouched.
    pub fn apply(mut self, ctx: &ResponseContext) -> MirrorResult<ApplyOutcome> {
        let mut outcome = ApplyOutcome::default();
        if let Some(refresh) = &ctx.refresh {
            self.apply_refresh(refresh)?;
            outcome.refreshed = true;
            self.flush();
        }
        if let Some(change) = &ctx.change {
            outcome.discontinuity =
                self.sync.observe_change(change.token) == ChangeObservation::Discontinuity;
        }
        for block in &ctx.notify {
            self.apply_notify(block);
            self.flush();
        }
        Ok(outcome)
    }

    fn flush(&mut self) {
        let events = std::mem::take(&mut self.events);
        self.listeners.dispatch(&events, &**self.mirror);
    }

    fn apply_refresh(&mut self, block: &RefreshBlock) -> MirrorResult<()> {
        let account = self.mirror.account_id().map(str::to_owned);
        let rebuilt = Mirror::from_refresh(block, account).inspect_err(|e| {
            warn!(error = %e, "refresh payload rejected, keeping previous mirror");
        })?;
        *self.mirror = Arc::new(rebuilt);
        self.caches.clear();
        self.sync.reset_after_refresh();
        info!(
            folders = self.mirror.index.folders().count(),
            tags = self.mirror.tags.len(),
            "mirror rebuilt from refresh"
        );
        self.events.push(MirrorEvent::Refresh);
        Ok(())
    }

    fn apply_notify(&mut self, block: &NotifyBlock) {
        self.sync.observe_notify_seq(block.seq);
        if let Some(deleted) = &block.deleted {
            let ids = split_id_list(&deleted.id);
            if !ids.is_empty() {
                self.apply_deleted(&ids);
                self.events.push(MirrorEvent::Deleted(ids));
            }
        }
        if !block.created.is_empty() {
            self.apply_created(&block.created);
        }
        for record in &block.modified {
            match self.apply_modified(record) {
                Ok(()) => self.events.push(MirrorEvent::Modified(record.clone())),
                Err(e) => skip(record, "modified", &e),
            }
        }
        if let Some(mods) = &block.a {
            self.events.push(MirrorEvent::Pending {
                change_id: self.sync.last_change().map(|c| c.id),
                mods: mods.clone(),
            });
        }
    }

    fn apply_deleted(&mut self, ids: &[String]) {
        for id in ids {
            self.caches.remove_item(id);
            self.caches
                .contacts
                .mark_dirty_where(|c| c.is_group() && c.references(id));
            self.caches.calendar.invalidate_item(id);
            self.caches.calendar.invalidate_folder(id);
        }
        self.caches.searches.remove_ids(ids);
        self.caches.conv_searches.remove_ids(ids);

        if !ids.iter().any(|id| self.mirror.index.contains(id)) {
            return;
        }
        let Mirror {
            index, tree, tags, ..
        } = Arc::make_mut(self.mirror);
        for id in ids {
            let Some(key) = index.resolve(id) else {
                continue;
            };
            match index.get_by_id(&key).cloned() {
                Some(Entity::Folder(node)) => {
                    tree.detach(index, &key);
                    index.remove_by_id(&key);
                    if let Some(mount) = node.mount() {
                        index.remove_alias(&mount.canonical_remote_id());
                    }
                    for child in node.children() {
                        if index.folder_by_key(child).is_some() {
                            tree.make_orphan(index, child);
                        }
                    }
                    debug!(folder = %key, "folder deleted");
                }
                Some(Entity::Tag(tag)) => {
                    index.remove_by_id(&key);
                    tags.forget(&tag, &key);
                    debug!(tag = %key, "tag deleted");
                }
                Some(_) => {
                    index.remove_by_id(&key);
                }
                None => {}
            }
        }
    }

    fn apply_created(&mut self, records: &[RawRecord]) {
        let mut deferred: Vec<String> = Vec::new();
        for record in records {
            let result = match record.element.as_str() {
                element::FOLDER | element::SEARCH | element::LINK => {
                    self.create_folder(record).map(|pending| deferred.extend(pending))
                }
                element::TAG => self.create_tag(record),
                element::MESSAGE | element::CONVERSATION | element::CONTACT => {
                    if let Some(search_type) = search_type_for(&record.element) {
                        self.caches.searches.on_created(search_type);
                    }
                    Ok(())
                }
                element::APPOINTMENT | element::TASK => {
                    if let Some(search_type) = search_type_for(&record.element) {
                        self.caches.searches.on_created(search_type);
                    }
                    self.caches.calendar.clear();
                    Ok(())
                }
                other => Err(MirrorError::malformed(format!("unknown element <{other}>"))),
            };
            match result {
                Ok(()) => self.events.push(MirrorEvent::Created(record.clone())),
                Err(e) => skip(record, "created", &e),
            }
        }
        if !deferred.is_empty() || !self.mirror.tree.orphans().is_empty() {
            self.fixup(deferred);
        }
    }

    /// Index a created folder; returns its key when its parent is not known yet
    fn create_folder(&mut self, record: &RawRecord) -> MirrorResult<Option<String>> {
        let element = FolderElement::from_element(&record.element)
            .ok_or_else(|| MirrorError::malformed(format!("<{}> is not a folder", record.element)))?;
        let folder: FolderRecord = record.decode()?;
        let mut node = FolderNode::from_record(&folder, element)?;
        if !self.mirror.folders_loaded() {
            debug!(folder = %folder.id, "folder tree not loaded, created folder not mirrored");
            return Ok(None);
        }
        let alias = node.mount().map(MountSpec::canonical_remote_id);
        let Mirror { index, tree, .. } = Arc::make_mut(self.mirror);
        let key = index.key(&folder.id);
        // a re-announced folder keeps its subtree
        if let Some(existing) = index.folder_by_key(&key) {
            node.children = Arc::clone(&existing.children);
            tree.detach(index, &key);
        }
        index.put(Entity::Folder(Arc::new(node)));
        if let Some(alias) = alias {
            index.put_alias(alias, &key);
        }
        if tree.root() == Some(key.as_str()) {
            tree.refresh_paths(index, &key);
            return Ok(None);
        }
        if tree.try_attach(index, &key) {
            Ok(None)
        } else {
            Ok(Some(key))
        }
    }

    /// Attach deferred folders once the whole created list is indexed
    fn fixup(&mut self, mut deferred: Vec<String>) {
        let Mirror { index, tree, .. } = Arc::make_mut(self.mirror);
        loop {
            let before = deferred.len();
            deferred.retain(|key| !tree.try_attach(index, key));
            if deferred.len() == before {
                break;
            }
        }
        for key in &deferred {
            tree.make_orphan(index, key);
        }
        let reattached = tree.retry_orphans(index);
        if reattached > 0 {
            debug!(reattached, "orphaned folders found their parent");
        }
    }

    fn create_tag(&mut self, record: &RawRecord) -> MirrorResult<()> {
        let tag = Tag::from_record(&record.decode::<TagRecord>()?)?;
        if !self.mirror.tags_loaded() {
            debug!(tag = %tag.id, "tag registry not loaded, created tag not mirrored");
            return Ok(());
        }
        let Mirror { index, tags, .. } = Arc::make_mut(self.mirror);
        tags.insert(index, tag);
        Ok(())
    }

    fn apply_modified(&mut self, record: &RawRecord) -> MirrorResult<()> {
        match record.element.as_str() {
            element::FOLDER | element::SEARCH | element::LINK => self.modify_folder(record),
            element::TAG => self.modify_tag(record),
            element::MESSAGE => {
                let patch: ItemPatch = record.decode()?;
                self.caches.patch_message(&patch.id, |m| m.apply_patch(&patch));
                self.patch_hits(&patch);
                Ok(())
            }
            element::CONVERSATION => {
                let patch: ItemPatch = record.decode()?;
                self.patch_hits(&patch);
                Ok(())
            }
            element::CONTACT => {
                let contact: ContactRecord = record.decode()?;
                self.caches.patch_contact(&contact.id, |c| c.apply_patch(&contact));
                self.caches
                    .contacts
                    .mark_dirty_where(|c| c.is_group() && c.references(&contact.id));
                self.patch_hits(&record.decode()?);
                Ok(())
            }
            element::APPOINTMENT | element::TASK => {
                let patch: ItemPatch = record.decode()?;
                self.caches.calendar.invalidate_item(&patch.id);
                self.caches.calendar.clear_mini_cal();
                self.patch_hits(&patch);
                Ok(())
            }
            element::MAILBOX => {
                let mbx: MailboxRecord = record.decode()?;
                if let Some(size) = mbx.size
                    && self.mirror.size != size
                {
                    Arc::make_mut(self.mirror).size = size;
                }
                Ok(())
            }
            other => Err(MirrorError::malformed(format!("unknown element <{other}>"))),
        }
    }

    fn patch_hits(&mut self, patch: &ItemPatch) {
        self.caches.searches.patch_hit(patch);
        self.caches.conv_searches.patch_hit(patch);
    }

    fn modify_folder(&mut self, record: &RawRecord) -> MirrorResult<()> {
        let patch: FolderRecord = record.decode()?;
        let Some(key) = self.mirror.index.resolve(&patch.id) else {
            debug!(folder = %patch.id, "modification for unknown folder ignored");
            return Ok(());
        };
        let Mirror { index, tree, .. } = Arc::make_mut(self.mirror);
        let current_parent = index.folder_by_key(&key).and_then(|f| f.parent_id.clone());
        if let Some(new_parent) = &patch.parent_id
            && current_parent.as_deref() != Some(new_parent.as_str())
            && let Err(e) = tree.reparent(index, &key, new_parent)
        {
            warn!(folder = %key, error = %e, "folder move not applied");
        }
        let renamed = index
            .folder_mut(&key)
            .is_some_and(|node| node.apply_patch(&patch));
        if renamed {
            tree.refresh_paths(index, &key);
        }
        Ok(())
    }

    fn modify_tag(&mut self, record: &RawRecord) -> MirrorResult<()> {
        let patch: TagRecord = record.decode()?;
        let Some(key) = self.mirror.index.resolve(&patch.id) else {
            debug!(tag = %patch.id, "modification for unknown tag ignored");
            return Ok(());
        };
        let Mirror { index, tags, .. } = Arc::make_mut(self.mirror);
        let Some(tag) = index.tag_mut(&key) else {
            return Ok(());
        };
        if let Some(old_name) = tag.apply_patch(&patch) {
            let new_name = tag.name.clone();
            tags.rename(&old_name, &new_name, &key);
        }
        Ok(())
    }
}

fn skip(record: &RawRecord, list: &str, error: &MirrorError) {
    warn!(
        element = %record.element,
        id = ?record.id(),
        list,
        error = %error,
        "skipping malformed notification record"
    );
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::NotificationApplier;
    use crate::cache::SessionCaches;
    use crate::config::MirrorConfig;
    use crate::context::ResponseContext;
    use crate::events::Listeners;
    use crate::mirror::Mirror;
    use crate::models::{Contact, ContactRecord, Entity, Message, MessageRecord};
    use crate::pagination::{PagePlan, SearchParams};
    use crate::sync::SyncState;
    use crate::testing::{RecordingListener, refresh_payload};
    use crate::transport::{ContactParams, MessageParams};

    struct Harness {
        mirror: Arc<Mirror>,
        caches: SessionCaches,
        sync: SyncState,
        listeners: Listeners,
    }

    impl Harness {
        fn new() -> Self {
            let config = MirrorConfig {
                account_id: Some("me".to_owned()),
                message_cache_size: std::num::NonZeroUsize::new(4).expect("non-zero"),
                ..MirrorConfig::default()
            };
            let mirror = Mirror::from_refresh(&refresh_payload(), Some("me".to_owned()))
                .expect("refresh applies");
            Self {
                mirror: Arc::new(mirror),
                caches: SessionCaches::new(&config),
                sync: SyncState::new(&config),
                listeners: Listeners::default(),
            }
        }

        fn apply(&mut self, ctx: serde_json::Value) -> super::ApplyOutcome {
            let ctx: ResponseContext = serde_json::from_value(ctx).expect("context parses");
            NotificationApplier::new(
                &mut self.mirror,
                &mut self.caches,
                &mut self.sync,
                &self.listeners,
            )
            .apply(&ctx)
            .expect("context applies")
        }
    }

    #[test]
    fn unread_only_modification_touches_only_unread() {
        let mut h = Harness::new();
        let before = h.mirror.folder_by_id("2").expect("inbox");
        h.apply(json!({"notify": [{"seq": 1, "modified": [{"type": "folder", "id": "2", "u": 3}]}]}));
        let after = h.mirror.folder_by_id("2").expect("inbox");

        assert_eq!(after.unread, 3);
        let mut expected = (*before).clone();
        expected.unread = 3;
        assert_eq!(*after, expected);
        assert_eq!(before.unread, 5);
    }

    #[test]
    fn created_child_before_parent_is_linked_by_fixup() {
        let mut h = Harness::new();
        h.apply(json!({"notify": [{"seq": 1, "created": [
            {"type": "folder", "id": "101", "name": "Child", "l": "100"},
            {"type": "folder", "id": "100", "name": "Parent", "l": "1"}
        ]}]}));

        let parent = h.mirror.folder_by_id("100").expect("parent indexed");
        assert_eq!(parent.children(), ["101".to_owned()]);
        assert_eq!(
            h.mirror.folder_by_path("/Parent/Child").map(|f| f.id.clone()),
            Some("101".to_owned())
        );
        assert!(h.mirror.tree().orphans().is_empty());
    }

    #[test]
    fn unresolved_parent_leaves_root_level_orphan_until_parent_arrives() {
        let mut h = Harness::new();
        h.apply(json!({"notify": [{"seq": 1, "created": [
            {"type": "folder", "id": "201", "name": "Lost", "l": "200"}
        ]}]}));
        assert_eq!(h.mirror.orphans().len(), 1);
        assert!(h.mirror.all_folders().iter().any(|f| f.id == "201"));
        assert_eq!(h.mirror.folder_by_id("201").map(|f| f.path().to_owned()), Some("/Lost".to_owned()));

        h.apply(json!({"notify": [{"seq": 2, "created": [
            {"type": "folder", "id": "200", "name": "Found", "l": "1"}
        ]}]}));
        assert!(h.mirror.orphans().is_empty());
        assert_eq!(
            h.mirror.folder_by_id("201").map(|f| f.path().to_owned()),
            Some("/Found/Lost".to_owned())
        );
    }

    #[test]
    fn modified_parent_reparents_before_rename() {
        let mut h = Harness::new();
        h.apply(json!({"notify": [{"seq": 1, "modified": [
            {"type": "folder", "id": "257", "l": "5", "name": "Projects"}
        ]}]}));
        let moved = h.mirror.folder_by_id("257").expect("indexed");
        assert_eq!(moved.path(), "/Sent/Projects");
        assert!(!h.mirror.folder_by_id("2").expect("inbox").children().contains(&"257".to_owned()));
    }

    #[test]
    fn deletes_clear_index_uuid_alias_and_tag_name() {
        let mut h = Harness::new();
        h.apply(json!({"notify": [{"seq": 1, "deleted": {"id": "2,301,64"}}]}));

        assert!(h.mirror.folder_by_id("2").is_none());
        assert!(h.mirror.folder_by_uuid("f-2").is_none());
        assert!(h.mirror.index().get_by_uuid("f-2").is_none());
        assert!(h.mirror.mountpoint_for_remote("boss:2").is_none());
        assert!(h.mirror.tag_by_name("work").is_none());
        assert!(h.mirror.index().get_by_uuid("t-64").is_none());
        let root = h.mirror.user_root().expect("root");
        assert!(!root.children().contains(&"2".to_owned()));
        // Work lost its parent
        assert_eq!(h.mirror.folder_by_id("257").map(|f| f.path().to_owned()), Some("/Work".to_owned()));
    }

    #[test]
    fn malformed_and_unknown_records_are_skipped() {
        let mut h = Harness::new();
        h.apply(json!({"notify": [{"seq": 1,
            "created": [
                {"type": "gizmo", "id": "1000"},
                {"type": "folder", "id": "102"},
                {"type": "tag", "id": "70", "name": "new-tag"}
            ],
            "modified": [
                {"type": "folder", "id": "2", "u": "lots"},
                {"type": "folder", "id": "5", "u": 9},
                {"type": "folder", "id": "9999", "u": 1}
            ]
        }]}));
        assert!(h.mirror.index().get_by_id("102").is_none());
        assert!(h.mirror.tag_by_name("new-tag").is_some());
        assert_eq!(h.mirror.folder_by_id("2").map(|f| f.unread), Some(5));
        assert_eq!(h.mirror.folder_by_id("5").map(|f| f.unread), Some(9));
        assert!(h.mirror.index().get_by_id("9999").is_none());
    }

    #[test]
    fn tag_rename_moves_name_mapping() {
        let mut h = Harness::new();
        h.apply(json!({"notify": [{"seq": 1, "modified": [
            {"type": "tag", "id": "64", "name": "office", "color": 4}
        ]}]}));
        assert!(h.mirror.tag_by_name("work").is_none());
        let tag = h.mirror.tag_by_name("office").expect("renamed tag");
        assert_eq!((tag.id.as_str(), tag.color, tag.unread), ("64", 4, 2));
    }

    #[test]
    fn refresh_after_notifications_matches_fresh_build() {
        let mut h = Harness::new();
        h.apply(json!({"change": {"token": 10}, "notify": [{"seq": 4,
            "deleted": {"id": "5"},
            "created": [{"type": "folder", "id": "400", "name": "Extra", "l": "2"}],
            "modified": [{"type": "folder", "id": "2", "u": 0}, {"type": "mbx", "s": 1}]
        }]}));
        assert_ne!(*h.mirror, Mirror::from_refresh(&refresh_payload(), Some("me".to_owned())).expect("applies"));

        let payload = serde_json::to_value(refresh_payload()).expect("payload serializes");
        let outcome = h.apply(json!({"refresh": payload}));
        assert!(outcome.refreshed);
        let fresh = Mirror::from_refresh(&refresh_payload(), Some("me".to_owned())).expect("applies");
        assert_eq!(*h.mirror, fresh);
        assert_eq!(h.sync.notify_seq(), 0);
        assert!(h.sync.last_change().is_none());

        h.apply(json!({"refresh": serde_json::to_value(refresh_payload()).expect("serializes")}));
        assert_eq!(*h.mirror, fresh);
    }

    #[test]
    fn bad_refresh_keeps_previous_state() {
        let mut h = Harness::new();
        h.caches
            .messages
            .put("77", MessageParams::default(), Arc::new(message("77", "u")));
        let before = Arc::clone(&h.mirror);
        let ctx: ResponseContext = serde_json::from_value(json!({
            "refresh": {"folder": {"id": "1"}}
        }))
        .expect("context parses");
        let err = NotificationApplier::new(&mut h.mirror, &mut h.caches, &mut h.sync, &h.listeners)
            .apply(&ctx)
            .expect_err("nameless root rejected");
        assert_eq!(err.code(), "malformed");
        assert!(Arc::ptr_eq(&before, &h.mirror));
        assert_eq!(h.caches.messages.len(), 1);
    }

    fn message(id: &str, flags: &str) -> Message {
        Message::from_record(
            serde_json::from_value::<MessageRecord>(json!({"id": id, "uuid": format!("m-{id}"), "f": flags}))
                .expect("valid"),
        )
    }

    #[test]
    fn cached_items_are_patched_purged_and_groups_dirtied() {
        let mut h = Harness::new();
        let params = MessageParams::default();
        h.caches.put_message(params.clone(), Arc::new(message("77", "u")));
        h.caches.put_message(params.clone(), Arc::new(message("78", "")));
        let group = Contact::from_record(
            serde_json::from_value::<ContactRecord>(json!({
                "id": "900", "_attrs": {"type": "group"}, "m": [{"type": "C", "value": "901"}]
            }))
            .expect("valid"),
        );
        h.caches.put_contact(ContactParams::default(), Arc::new(group));

        h.apply(json!({"notify": [{"seq": 1,
            "deleted": {"id": "78"},
            "modified": [
                {"type": "m", "id": "77", "f": ""},
                {"type": "cn", "id": "901", "_attrs": {"email": "new@example.com"}}
            ]
        }]}));

        let patched = h.caches.messages.get("77", &params).expect("still cached");
        assert!(!patched.is_unread());
        assert!(!h.caches.messages.contains("78"));
        assert!(h.caches.item_by_uuid("m-78").is_none());
        assert!(h.caches.item_by_id("78").is_none());
        assert!(matches!(
            h.caches.item_by_uuid("m-77"),
            Some(Entity::Message(m)) if !m.is_unread()
        ));
        assert!(h.caches.contacts.get("900", &ContactParams::default()).is_none());
        assert!(h.caches.item_by_id("900").is_none());
    }

    #[test]
    fn deleting_an_uncached_item_keeps_mini_cal_sets() {
        let mut h = Harness::new();
        let folders = ["10".to_owned()];
        h.caches
            .calendar
            .put_mini_cal(1, 2, &folders, std::collections::BTreeSet::new());
        h.apply(json!({"notify": [{"seq": 1, "deleted": {"id": "78"}}]}));
        assert!(h.caches.calendar.mini_cal(1, 2, &folders).is_some());

        h.apply(json!({"notify": [{"seq": 2, "modified": [{"type": "appt", "id": "500"}]}]}));
        assert!(h.caches.calendar.mini_cal(1, 2, &folders).is_none());
    }

    #[test]
    fn recreated_folder_keeps_its_children() {
        let mut h = Harness::new();
        h.apply(json!({"notify": [{"seq": 1, "created": [
            {"type": "folder", "id": "2", "name": "Inbox", "l": "1", "u": 6}
        ]}]}));

        let inbox = h.mirror.folder_by_id("2").expect("inbox mirrored");
        assert_eq!(inbox.unread, 6);
        assert_eq!(inbox.children(), ["257".to_owned()]);
        assert_eq!(
            h.mirror.folder_by_id("257").map(|f| f.path().to_owned()).as_deref(),
            Some("/Inbox/Work")
        );
        assert!(h.mirror.all_folders().iter().any(|f| f.id == "257"));
        assert!(h.mirror.orphans().is_empty());
    }

    #[test]
    fn created_messages_drop_plain_search_pagers_only() {
        let mut h = Harness::new();
        let params = SearchParams::new("in:inbox").with_types("message");
        for cache in [&mut h.caches.searches, &mut h.caches.conv_searches] {
            let PagePlan::Fetch(fetch) = cache.plan(&params) else {
                panic!("empty cache must fetch");
            };
            cache.absorb(&params, &fetch, Vec::new(), false);
        }
        h.apply(json!({"notify": [{"seq": 1, "created": [{"type": "m", "id": "80", "l": "2"}]}]}));
        assert!(h.caches.searches.is_empty());
        assert_eq!(h.caches.conv_searches.len(), 1);
    }

    #[test]
    fn listeners_see_changes_and_pending_with_change_id() {
        let mut h = Harness::new();
        let recorder = Arc::new(RecordingListener::default());
        h.listeners.add(recorder.clone());
        h.apply(json!({"change": {"token": 451}, "notify": [{"seq": 1,
            "deleted": {"id": "5"},
            "created": [{"type": "m", "id": "80"}],
            "modified": [{"type": "folder", "id": "2", "u": 1}],
            "a": {"mods": []}
        }]}));
        assert_eq!(
            recorder.seen(),
            ["delete 5", "create m 80", "modify folder 2", "pending 451"]
        );
    }

    #[test]
    fn lower_change_token_is_reported() {
        let mut h = Harness::new();
        assert!(!h.apply(json!({"change": {"token": 450}})).discontinuity);
        assert!(h.apply(json!({"change": {"token": 12}})).discontinuity);
        assert!(h.sync.refresh_pending());
    }
}
