//! Response context envelope
//!
//! The "what changed" fragment the server attaches to every response. The
//! envelope is typed; the records inside stay raw JSON until the applier
//! decodes them by element name, so one bad record cannot sink the batch.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::{MirrorError, MirrorResult};

/// Context fragment of one response
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh: Option<RefreshBlock>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change: Option<ChangeBlock>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notify: Vec<NotifyBlock>,
}

impl ResponseContext {
    pub fn is_empty(&self) -> bool {
        self.refresh.is_none() && self.change.is_none() && self.notify.is_empty()
    }
}

/// Full mailbox state sent when the server decides the client must start over
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RefreshBlock {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mbx: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<TagsBlock>,
    /// Root folder record with nested children
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TagsBlock {
    #[serde(default)]
    pub tag: Vec<Value>,
}

/// Current change sequence of the mailbox
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeBlock {
    pub token: u64,
}

/// One batch of incremental changes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NotifyBlock {
    #[serde(default)]
    pub seq: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted: Option<DeletedBlock>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub created: Vec<RawRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub modified: Vec<RawRecord>,
    /// Pending generic modifications, passed through untouched
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub a: Option<Value>,
}

/// Comma separated list of deleted ids
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletedBlock {
    #[serde(default)]
    pub id: String,
}

/// Element-tagged record whose attributes are decoded on demand
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    #[serde(rename = "type")]
    pub element: String,
    #[serde(flatten)]
    pub attrs: Map<String, Value>,
}

impl RawRecord {
    pub fn new(element: impl Into<String>, attrs: Value) -> Self {
        let attrs = match attrs {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self {
            element: element.into(),
            attrs,
        }
    }

    /// Record id, if present as a string or number
    pub fn id(&self) -> Option<String> {
        match self.attrs.get("id")? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Decode the attributes into a typed record
    ///
    /// # Errors
    ///
    /// Returns `Malformed` when a required attribute is missing or has the
    /// wrong type.
    pub fn decode<T: serde::de::DeserializeOwned>(&self) -> MirrorResult<T> {
        serde_json::from_value(Value::Object(self.attrs.clone())).map_err(|e| {
            MirrorError::malformed(format!("bad <{}> record: {e}", self.element))
        })
    }
}

/// Element names carried in created/modified lists
pub mod element {
    pub const FOLDER: &str = "folder";
    pub const SEARCH: &str = "search";
    pub const LINK: &str = "link";
    pub const TAG: &str = "tag";
    pub const MESSAGE: &str = "m";
    pub const CONVERSATION: &str = "c";
    pub const CONTACT: &str = "cn";
    pub const APPOINTMENT: &str = "appt";
    pub const TASK: &str = "task";
    pub const MAILBOX: &str = "mbx";
}

/// Search type name matching a record element, for pager invalidation
pub fn search_type_for(element_name: &str) -> Option<&'static str> {
    match element_name {
        element::MESSAGE => Some("message"),
        element::CONVERSATION => Some("conversation"),
        element::CONTACT => Some("contact"),
        element::APPOINTMENT => Some("appointment"),
        element::TASK => Some("task"),
        _ => None,
    }
}
