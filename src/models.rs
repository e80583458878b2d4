//! Mirrored entity types and the server records they are built from
//!
//! Records (`*Record`, [`ItemPatch`]) mirror the server's attribute names
//! and keep every attribute optional except the id, so the same type serves
//! both full records and "only what changed" modifications. Entities are the
//! validated, owned shapes stored in the mirror.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::{MirrorError, MirrorResult};

/// Path separator for folder paths
pub const PATH_SEPARATOR: &str = "/";

/// Well-known folder ids
pub mod folder_ids {
    pub const USER_ROOT: &str = "1";
    pub const INBOX: &str = "2";
    pub const TRASH: &str = "3";
    pub const SPAM: &str = "4";
    pub const SENT: &str = "5";
    pub const DRAFTS: &str = "6";
    pub const CONTACTS: &str = "7";
    pub const CALENDAR: &str = "10";
    pub const TASKS: &str = "15";
    /// Ids below this are system folders
    pub const FIRST_USER_ID: u32 = 256;
}

/// Default view of a folder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FolderView {
    Conversation,
    Message,
    Contact,
    Appointment,
    Task,
    Document,
    Wiki,
    #[default]
    #[serde(other)]
    Unknown,
}

/// Access grant on a folder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grant {
    /// Grantee type (`usr`, `grp`, `dom`, `pub`, ...)
    #[serde(rename = "gt")]
    pub grantee_type: String,
    #[serde(rename = "zid", default)]
    pub grantee_id: Option<String>,
    #[serde(rename = "d", default)]
    pub grantee_name: Option<String>,
    /// Granted rights, one letter each
    pub perm: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct AclRecord {
    #[serde(default)]
    pub grant: Vec<Grant>,
}

/// Folder, search folder or mountpoint record
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct FolderRecord {
    pub id: String,
    #[serde(default)]
    pub uuid: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "l", default)]
    pub parent_id: Option<String>,
    #[serde(rename = "f", default)]
    pub flags: Option<String>,
    #[serde(default)]
    pub color: Option<u8>,
    #[serde(default)]
    pub rgb: Option<String>,
    #[serde(rename = "u", default)]
    pub unread: Option<u32>,
    #[serde(rename = "n", default)]
    pub count: Option<u32>,
    #[serde(rename = "s", default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub view: Option<FolderView>,
    #[serde(default)]
    pub perm: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub acl: Option<AclRecord>,
    #[serde(rename = "ms", default)]
    pub modified_sequence: Option<i64>,
    #[serde(rename = "rev", default)]
    pub content_sequence: Option<i64>,
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub types: Option<String>,
    #[serde(rename = "sortBy", default)]
    pub sort_by: Option<String>,
    #[serde(rename = "zid", default)]
    pub owner_id: Option<String>,
    #[serde(rename = "rid", default)]
    pub remote_id: Option<String>,
    #[serde(rename = "owner", default)]
    pub owner_name: Option<String>,
    #[serde(default)]
    pub folder: Vec<FolderRecord>,
    #[serde(default)]
    pub search: Vec<FolderRecord>,
    #[serde(default)]
    pub link: Vec<FolderRecord>,
}

/// Element a folder-like record was delivered as
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FolderElement {
    Folder,
    Search,
    Link,
}

impl FolderElement {
    /// Map a record element name to a folder element
    pub fn from_element(name: &str) -> Option<Self> {
        match name {
            "folder" => Some(Self::Folder),
            "search" => Some(Self::Search),
            "link" => Some(Self::Link),
            _ => None,
        }
    }
}

/// Saved search definition carried by a search folder
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SearchSpec {
    pub query: String,
    pub types: Option<String>,
    pub sort_by: Option<String>,
}

/// Target of a mountpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountSpec {
    /// Account id of the mailbox that owns the target folder
    pub owner_id: String,
    /// Folder id inside the owner's mailbox
    pub remote_id: String,
    pub owner_name: Option<String>,
}

impl MountSpec {
    /// Owner-qualified id of the target folder
    pub fn canonical_remote_id(&self) -> String {
        format!("{}:{}", self.owner_id, self.remote_id)
    }
}

/// What kind of folder node this is
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FolderKind {
    #[default]
    Folder,
    Search(SearchSpec),
    Mountpoint(MountSpec),
}

/// A node of the folder tree
///
/// Children are referenced by index key and shared copy-on-write, so a
/// snapshot handed to a reader never observes a half-built list.
#[derive(Debug, Clone, PartialEq)]
pub struct FolderNode {
    pub id: String,
    pub uuid: Option<String>,
    pub name: String,
    /// Parent folder id; absent for hierarchy placeholders
    pub parent_id: Option<String>,
    pub kind: FolderKind,
    pub flags: String,
    pub color: u8,
    pub rgb: Option<String>,
    pub unread: u32,
    pub count: u32,
    pub size: u64,
    pub view: FolderView,
    pub perm: Option<String>,
    pub url: Option<String>,
    pub grants: Arc<Vec<Grant>>,
    pub modified_sequence: i64,
    pub content_sequence: i64,
    pub(crate) children: Arc<Vec<String>>,
    pub(crate) path: String,
}

impl FolderNode {
    /// Build a node from a record, without its children
    ///
    /// # Errors
    ///
    /// Returns `Malformed` when `name` is missing, or when a mountpoint lacks
    /// its owner or remote id.
    pub fn from_record(record: &FolderRecord, element: FolderElement) -> MirrorResult<Self> {
        let name = record
            .name
            .clone()
            .ok_or_else(|| MirrorError::malformed(format!("folder {} has no name", record.id)))?;
        let kind = match element {
            FolderElement::Folder => FolderKind::Folder,
            FolderElement::Search => FolderKind::Search(SearchSpec {
                query: record.query.clone().unwrap_or_default(),
                types: record.types.clone(),
                sort_by: record.sort_by.clone(),
            }),
            FolderElement::Link => FolderKind::Mountpoint(MountSpec {
                owner_id: record.owner_id.clone().ok_or_else(|| {
                    MirrorError::malformed(format!("mountpoint {} has no owner id", record.id))
                })?,
                remote_id: record.remote_id.clone().ok_or_else(|| {
                    MirrorError::malformed(format!("mountpoint {} has no remote id", record.id))
                })?,
                owner_name: record.owner_name.clone(),
            }),
        };
        Ok(Self {
            id: record.id.clone(),
            uuid: record.uuid.clone(),
            name,
            parent_id: record.parent_id.clone(),
            kind,
            flags: record.flags.clone().unwrap_or_default(),
            color: record.color.unwrap_or(0),
            rgb: record.rgb.clone(),
            unread: record.unread.unwrap_or(0),
            count: record.count.unwrap_or(0),
            size: record.size.unwrap_or(0),
            view: record.view.unwrap_or_default(),
            perm: record.perm.clone(),
            url: record.url.clone(),
            grants: Arc::new(
                record
                    .acl
                    .as_ref()
                    .map(|acl| acl.grant.clone())
                    .unwrap_or_default(),
            ),
            modified_sequence: record.modified_sequence.unwrap_or(-1),
            content_sequence: record.content_sequence.unwrap_or(-1),
            children: Arc::new(Vec::new()),
            path: String::new(),
        })
    }

    /// Merge every attribute present in `patch`; returns whether the name changed
    ///
    /// The parent id is not touched here: moving a node is a tree operation.
    pub fn apply_patch(&mut self, patch: &FolderRecord) -> bool {
        let name_changed = patch.name.as_ref().is_some_and(|name| *name != self.name);
        if let Some(name) = &patch.name {
            self.name = name.clone();
        }
        if let Some(flags) = &patch.flags {
            self.flags = flags.clone();
        }
        if let Some(color) = patch.color {
            self.color = color;
        }
        if let Some(rgb) = &patch.rgb {
            self.rgb = Some(rgb.clone());
        }
        if let Some(unread) = patch.unread {
            self.unread = unread;
        }
        if let Some(count) = patch.count {
            self.count = count;
        }
        if let Some(size) = patch.size {
            self.size = size;
        }
        if let Some(view) = patch.view {
            self.view = view;
        }
        if let Some(perm) = &patch.perm {
            self.perm = Some(perm.clone());
        }
        if let Some(url) = &patch.url {
            self.url = Some(url.clone());
        }
        if let Some(acl) = &patch.acl {
            self.grants = Arc::new(acl.grant.clone());
        }
        if let Some(ms) = patch.modified_sequence {
            self.modified_sequence = ms;
        }
        if let Some(rev) = patch.content_sequence {
            self.content_sequence = rev;
        }
        match &mut self.kind {
            FolderKind::Search(spec) => {
                if let Some(query) = &patch.query {
                    spec.query = query.clone();
                }
                if let Some(types) = &patch.types {
                    spec.types = Some(types.clone());
                }
                if let Some(sort_by) = &patch.sort_by {
                    spec.sort_by = Some(sort_by.clone());
                }
            }
            FolderKind::Mountpoint(spec) => {
                if let Some(owner_name) = &patch.owner_name {
                    spec.owner_name = Some(owner_name.clone());
                }
            }
            FolderKind::Folder => {}
        }
        name_changed
    }

    /// Whether this node only exists to hold children the user cannot see the parent of
    pub fn is_placeholder(&self) -> bool {
        self.parent_id.is_none()
    }

    /// Child keys in display order
    pub fn children(&self) -> &[String] {
        &self.children
    }

    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }

    /// Absolute path, `/` for the user root
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Absolute path with every segment URL-encoded
    pub fn path_url_encoded(&self) -> String {
        if self.path == PATH_SEPARATOR {
            return self.path.clone();
        }
        self.path
            .split(PATH_SEPARATOR)
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect::<Vec<_>>()
            .join(PATH_SEPARATOR)
    }

    /// Path without the leading separator
    pub fn root_relative_path(&self) -> &str {
        self.path.strip_prefix(PATH_SEPARATOR).unwrap_or(&self.path)
    }

    pub fn is_unread(&self) -> bool {
        self.unread > 0
    }

    pub fn is_system(&self) -> bool {
        self.id
            .parse::<u32>()
            .is_ok_and(|id| id < folder_ids::FIRST_USER_ID)
    }

    pub fn mount(&self) -> Option<&MountSpec> {
        match &self.kind {
            FolderKind::Mountpoint(spec) => Some(spec),
            _ => None,
        }
    }

    pub(crate) fn path_under(&self, parent_path: &str) -> String {
        if parent_path == PATH_SEPARATOR {
            format!("{PATH_SEPARATOR}{}", self.name)
        } else {
            format!("{parent_path}{PATH_SEPARATOR}{}", self.name)
        }
    }
}

/// Tag record
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TagRecord {
    pub id: String,
    #[serde(default)]
    pub uuid: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub color: Option<u8>,
    #[serde(default)]
    pub rgb: Option<String>,
    #[serde(rename = "u", default)]
    pub unread: Option<u32>,
    #[serde(rename = "n", default)]
    pub count: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    pub id: String,
    pub uuid: Option<String>,
    pub name: String,
    pub color: u8,
    pub rgb: Option<String>,
    pub unread: u32,
    pub count: u32,
}

impl Tag {
    pub fn from_record(record: &TagRecord) -> MirrorResult<Self> {
        Ok(Self {
            id: record.id.clone(),
            uuid: record.uuid.clone(),
            name: record
                .name
                .clone()
                .ok_or_else(|| MirrorError::malformed(format!("tag {} has no name", record.id)))?,
            color: record.color.unwrap_or(0),
            rgb: record.rgb.clone(),
            unread: record.unread.unwrap_or(0),
            count: record.count.unwrap_or(0),
        })
    }

    /// Merge a modification; returns the previous name if it changed
    pub fn apply_patch(&mut self, patch: &TagRecord) -> Option<String> {
        let mut old_name = None;
        if let Some(name) = &patch.name {
            if !name.eq_ignore_ascii_case(&self.name) {
                old_name = Some(std::mem::replace(&mut self.name, name.clone()));
            } else {
                self.name = name.clone();
            }
        }
        if let Some(color) = patch.color {
            self.color = color;
        }
        if let Some(rgb) = &patch.rgb {
            self.rgb = Some(rgb.clone());
        }
        if let Some(unread) = patch.unread {
            self.unread = unread;
        }
        if let Some(count) = patch.count {
            self.count = count;
        }
        old_name
    }
}

/// Partial item attributes shared by messages, conversations and search hits
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ItemPatch {
    pub id: String,
    #[serde(rename = "l", default)]
    pub folder_id: Option<String>,
    #[serde(rename = "cid", default)]
    pub conversation_id: Option<String>,
    #[serde(rename = "f", default)]
    pub flags: Option<String>,
    #[serde(rename = "t", default)]
    pub tags: Option<String>,
    #[serde(rename = "su", default)]
    pub subject: Option<String>,
    #[serde(rename = "fr", default)]
    pub fragment: Option<String>,
    #[serde(rename = "n", default)]
    pub count: Option<u32>,
}

/// Message record as returned by a message fetch
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct MessageRecord {
    pub id: String,
    #[serde(default)]
    pub uuid: Option<String>,
    #[serde(rename = "l", default)]
    pub folder_id: Option<String>,
    #[serde(rename = "cid", default)]
    pub conversation_id: Option<String>,
    #[serde(rename = "f", default)]
    pub flags: Option<String>,
    #[serde(rename = "t", default)]
    pub tags: Option<String>,
    #[serde(rename = "su", default)]
    pub subject: Option<String>,
    #[serde(rename = "fr", default)]
    pub fragment: Option<String>,
    #[serde(rename = "s", default)]
    pub size: Option<u64>,
    #[serde(rename = "d", default)]
    pub date: Option<i64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A singly fetched message
///
/// MIME structure and other detail stays opaque in `extra`.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub id: String,
    pub uuid: Option<String>,
    pub folder_id: Option<String>,
    pub conversation_id: Option<String>,
    pub flags: String,
    pub tags: String,
    pub subject: Option<String>,
    pub fragment: Option<String>,
    pub size: u64,
    pub date: Option<i64>,
    pub extra: Map<String, Value>,
}

impl Message {
    pub fn from_record(record: MessageRecord) -> Self {
        Self {
            id: record.id,
            uuid: record.uuid,
            folder_id: record.folder_id,
            conversation_id: record.conversation_id,
            flags: record.flags.unwrap_or_default(),
            tags: record.tags.unwrap_or_default(),
            subject: record.subject,
            fragment: record.fragment,
            size: record.size.unwrap_or(0),
            date: record.date,
            extra: record.extra,
        }
    }

    pub fn apply_patch(&mut self, patch: &ItemPatch) {
        if let Some(folder_id) = &patch.folder_id {
            self.folder_id = Some(folder_id.clone());
        }
        if let Some(cid) = &patch.conversation_id {
            self.conversation_id = Some(cid.clone());
        }
        if let Some(flags) = &patch.flags {
            self.flags = flags.clone();
        }
        if let Some(tags) = &patch.tags {
            self.tags = tags.clone();
        }
        if let Some(subject) = &patch.subject {
            self.subject = Some(subject.clone());
        }
        if let Some(fragment) = &patch.fragment {
            self.fragment = Some(fragment.clone());
        }
    }

    /// `u` in the flag string marks an unread message
    pub fn is_unread(&self) -> bool {
        self.flags.contains('u')
    }
}

/// Member reference of a contact group
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ContactMemberRecord {
    /// `C` (contact ref), `G` (GAL ref) or `I` (inline address)
    #[serde(rename = "type")]
    pub kind: String,
    pub value: String,
}

/// Contact record
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ContactRecord {
    pub id: String,
    #[serde(default)]
    pub uuid: Option<String>,
    #[serde(rename = "l", default)]
    pub folder_id: Option<String>,
    #[serde(rename = "f", default)]
    pub flags: Option<String>,
    #[serde(rename = "t", default)]
    pub tags: Option<String>,
    #[serde(rename = "fileAsStr", default)]
    pub file_as: Option<String>,
    #[serde(rename = "_attrs", default)]
    pub attrs: Option<BTreeMap<String, String>>,
    #[serde(rename = "m", default)]
    pub members: Option<Vec<ContactMemberRecord>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contact {
    pub id: String,
    pub uuid: Option<String>,
    pub folder_id: Option<String>,
    pub flags: String,
    pub tags: String,
    pub file_as: Option<String>,
    pub attrs: BTreeMap<String, String>,
    pub members: Vec<ContactMemberRecord>,
}

impl Contact {
    pub fn from_record(record: ContactRecord) -> Self {
        Self {
            id: record.id,
            uuid: record.uuid,
            folder_id: record.folder_id,
            flags: record.flags.unwrap_or_default(),
            tags: record.tags.unwrap_or_default(),
            file_as: record.file_as,
            attrs: record.attrs.unwrap_or_default(),
            members: record.members.unwrap_or_default(),
        }
    }

    pub fn apply_patch(&mut self, patch: &ContactRecord) {
        if let Some(folder_id) = &patch.folder_id {
            self.folder_id = Some(folder_id.clone());
        }
        if let Some(flags) = &patch.flags {
            self.flags = flags.clone();
        }
        if let Some(tags) = &patch.tags {
            self.tags = tags.clone();
        }
        if let Some(file_as) = &patch.file_as {
            self.file_as = Some(file_as.clone());
        }
        if let Some(attrs) = &patch.attrs {
            self.attrs = attrs.clone();
        }
        if let Some(members) = &patch.members {
            self.members = members.clone();
        }
    }

    pub fn is_group(&self) -> bool {
        self.attrs.get("type").is_some_and(|t| t == "group")
    }

    /// Whether `id` is one of this group's contact references
    pub fn references(&self, id: &str) -> bool {
        self.members
            .iter()
            .any(|m| m.kind == "C" && (m.value == id || m.value.rsplit(':').next() == Some(id)))
    }
}

/// Mailbox-level record (`mbx`)
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct MailboxRecord {
    #[serde(rename = "acct", default)]
    pub account_id: Option<String>,
    #[serde(rename = "s", default)]
    pub size: Option<u64>,
}

/// One hit of a search result page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    /// Hit element: `m`, `c`, `cn`, `appt`, `task`, `doc`
    #[serde(rename = "type")]
    pub kind: String,
    pub id: String,
    #[serde(rename = "l", default)]
    pub folder_id: Option<String>,
    #[serde(rename = "cid", default)]
    pub conversation_id: Option<String>,
    #[serde(rename = "f", default)]
    pub flags: Option<String>,
    #[serde(rename = "t", default)]
    pub tags: Option<String>,
    #[serde(rename = "sf", default)]
    pub sort_field: Option<String>,
    #[serde(rename = "su", default)]
    pub subject: Option<String>,
    #[serde(rename = "fr", default)]
    pub fragment: Option<String>,
    #[serde(rename = "d", default)]
    pub date: Option<i64>,
    #[serde(rename = "n", default)]
    pub count: Option<u32>,
}

impl SearchHit {
    pub fn apply_patch(&mut self, patch: &ItemPatch) {
        if let Some(folder_id) = &patch.folder_id {
            self.folder_id = Some(folder_id.clone());
        }
        if let Some(cid) = &patch.conversation_id {
            self.conversation_id = Some(cid.clone());
        }
        if let Some(flags) = &patch.flags {
            self.flags = Some(flags.clone());
        }
        if let Some(tags) = &patch.tags {
            self.tags = Some(tags.clone());
        }
        if let Some(subject) = &patch.subject {
            self.subject = Some(subject.clone());
        }
        if let Some(fragment) = &patch.fragment {
            self.fragment = Some(fragment.clone());
        }
        if let Some(count) = patch.count {
            self.count = Some(count);
        }
    }
}

/// Kind of a mirrored entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Folder,
    SearchFolder,
    Mountpoint,
    Tag,
    Message,
    Contact,
}

/// Any entity the identity index can hold
///
/// Payloads are shared immutable values; mutation goes through
/// `Arc::make_mut` under the session lock.
#[derive(Debug, Clone, PartialEq)]
pub enum Entity {
    Folder(Arc<FolderNode>),
    Tag(Arc<Tag>),
    Message(Arc<Message>),
    Contact(Arc<Contact>),
}

impl Entity {
    pub fn id(&self) -> &str {
        match self {
            Self::Folder(f) => &f.id,
            Self::Tag(t) => &t.id,
            Self::Message(m) => &m.id,
            Self::Contact(c) => &c.id,
        }
    }

    pub fn uuid(&self) -> Option<&str> {
        match self {
            Self::Folder(f) => f.uuid.as_deref(),
            Self::Tag(t) => t.uuid.as_deref(),
            Self::Message(m) => m.uuid.as_deref(),
            Self::Contact(c) => c.uuid.as_deref(),
        }
    }

    pub fn kind(&self) -> EntityKind {
        match self {
            Self::Folder(f) => match f.kind {
                FolderKind::Folder => EntityKind::Folder,
                FolderKind::Search(_) => EntityKind::SearchFolder,
                FolderKind::Mountpoint(_) => EntityKind::Mountpoint,
            },
            Self::Tag(_) => EntityKind::Tag,
            Self::Message(_) => EntityKind::Message,
            Self::Contact(_) => EntityKind::Contact,
        }
    }

    pub fn as_folder(&self) -> Option<&Arc<FolderNode>> {
        match self {
            Self::Folder(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_tag(&self) -> Option<&Arc<Tag>> {
        match self {
            Self::Tag(t) => Some(t),
            _ => None,
        }
    }
}

/// Parent of an absolute path
///
/// Strips one trailing separator, then drops the last segment.
///
/// # Errors
///
/// Returns `InvalidInput` if `path` is not absolute.
pub fn parent_path(path: &str) -> MirrorResult<String> {
    if path == PATH_SEPARATOR {
        return Ok(PATH_SEPARATOR.to_owned());
    }
    let trimmed = absolute_trimmed(path)?;
    match trimmed.rfind(PATH_SEPARATOR) {
        Some(0) | None => Ok(PATH_SEPARATOR.to_owned()),
        Some(index) => Ok(trimmed[..index].to_owned()),
    }
}

/// Last segment of an absolute path
///
/// # Errors
///
/// Returns `InvalidInput` if `path` is not absolute.
pub fn base_path(path: &str) -> MirrorResult<String> {
    if path == PATH_SEPARATOR {
        return Ok(PATH_SEPARATOR.to_owned());
    }
    let trimmed = absolute_trimmed(path)?;
    let index = trimmed.rfind(PATH_SEPARATOR).map_or(0, |i| i + 1);
    Ok(trimmed[index..].to_owned())
}

fn absolute_trimmed(path: &str) -> MirrorResult<&str> {
    if !path.starts_with(PATH_SEPARATOR) {
        return Err(MirrorError::invalid(format!("path must be absolute: {path}")));
    }
    Ok(path.strip_suffix(PATH_SEPARATOR).unwrap_or(path))
}
