//! Shared test fixtures

use std::sync::{Mutex, PoisonError};

use serde_json::{Value, json};

use crate::context::{RawRecord, RefreshBlock};
use crate::events::MirrorListener;
use crate::mirror::Mirror;

/// Refresh payload of a small mailbox
///
/// Root with Inbox (unread 5, child Work), Sent, a placeholder `shared`
/// holding `Team`, a search folder and a mountpoint onto `boss:2`; tags
/// `work` (uuid `t-64`) and `Home`; mailbox size 4096.
pub fn refresh_json() -> Value {
    json!({
        "mbx": [{"s": 4096}],
        "tags": {"tag": [
            {"id": "64", "uuid": "t-64", "name": "work", "u": 2},
            {"id": "65", "name": "Home"}
        ]},
        "folder": {
            "id": "1", "uuid": "f-1", "name": "USER_ROOT", "l": "11",
            "folder": [
                {"id": "2", "uuid": "f-2", "name": "Inbox", "l": "1", "u": 5, "n": 40,
                 "folder": [{"id": "257", "name": "Work", "l": "2"}]},
                {"id": "5", "name": "Sent", "l": "1"},
                {"id": "10", "name": "Calendar", "l": "1", "view": "appointment"},
                {"id": "other:9", "name": "shared",
                 "folder": [{"id": "other:10", "name": "Team", "l": "other:9"}]}
            ],
            "search": [{"id": "300", "name": "Unread", "l": "1", "query": "is:unread"}],
            "link": [{"id": "301", "name": "Boss", "l": "1", "zid": "boss", "rid": "2",
                      "view": "appointment"}]
        }
    })
}

pub fn refresh_payload() -> RefreshBlock {
    serde_json::from_value(refresh_json()).expect("refresh payload parses")
}

/// Listener that writes one line per callback
#[derive(Debug, Default)]
pub struct RecordingListener {
    seen: Mutex<Vec<String>>,
}

impl RecordingListener {
    pub fn seen(&self) -> Vec<String> {
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn record(&self, line: String) {
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(line);
    }
}

impl MirrorListener for RecordingListener {
    fn on_refresh(&self, _mirror: &Mirror) {
        self.record("refresh".to_owned());
    }

    fn on_create(&self, record: &RawRecord, _mirror: &Mirror) {
        self.record(format!("create {} {}", record.element, record.id().unwrap_or_default()));
    }

    fn on_modify(&self, record: &RawRecord, _mirror: &Mirror) {
        self.record(format!("modify {} {}", record.element, record.id().unwrap_or_default()));
    }

    fn on_delete(&self, ids: &[String], _mirror: &Mirror) {
        self.record(format!("delete {}", ids.join(",")));
    }

    fn on_pending_modifications(&self, change_id: Option<u64>, _mods: &Value, _mirror: &Mirror) {
        let change = change_id.map_or_else(|| "none".to_owned(), |id| id.to_string());
        self.record(format!("pending {change}"));
    }
}
