//! Change listeners
//!
//! Listeners are called synchronously while the session lock is held, in
//! registration order, once per applied batch. They only ever see a shared
//! reference to the mirror, so they cannot call back into the session.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::context::RawRecord;
use crate::mirror::Mirror;

/// Receiver of mirror changes; every method defaults to a no-op
pub trait MirrorListener: Send + Sync {
    /// The whole mirror was rebuilt from a refresh payload
    fn on_refresh(&self, _mirror: &Mirror) {}

    fn on_create(&self, _record: &RawRecord, _mirror: &Mirror) {}

    fn on_modify(&self, _record: &RawRecord, _mirror: &Mirror) {}

    fn on_delete(&self, _ids: &[String], _mirror: &Mirror) {}

    /// Opaque pending modifications, with the change id current when they arrived
    fn on_pending_modifications(&self, _change_id: Option<u64>, _mods: &Value, _mirror: &Mirror) {}
}

/// One change produced while applying a response context
#[derive(Debug, Clone, PartialEq)]
pub enum MirrorEvent {
    Refresh,
    Deleted(Vec<String>),
    Created(RawRecord),
    Modified(RawRecord),
    Pending { change_id: Option<u64>, mods: Value },
}

#[derive(Clone, Default)]
pub struct Listeners {
    inner: Vec<Arc<dyn MirrorListener>>,
}

impl fmt::Debug for Listeners {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listeners")
            .field("count", &self.inner.len())
            .finish()
    }
}

impl Listeners {
    pub fn add(&mut self, listener: Arc<dyn MirrorListener>) {
        self.inner.push(listener);
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Deliver events in order to every listener
    pub fn dispatch(&self, events: &[MirrorEvent], mirror: &Mirror) {
        if self.inner.is_empty() {
            return;
        }
        for event in events {
            for listener in &self.inner {
                match event {
                    MirrorEvent::Refresh => listener.on_refresh(mirror),
                    MirrorEvent::Deleted(ids) => listener.on_delete(ids, mirror),
                    MirrorEvent::Created(record) => listener.on_create(record, mirror),
                    MirrorEvent::Modified(record) => listener.on_modify(record, mirror),
                    MirrorEvent::Pending { change_id, mods } => {
                        listener.on_pending_modifications(*change_id, mods, mirror)
                    }
                }
            }
        }
    }
}
