//! Session synchronization state
//!
//! Tracks the change sequence, the highest acknowledged notification
//! sequence and whether the mirror must be refreshed, and decides how folders
//! and tags get populated on first access.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::MirrorConfig;
use crate::mirror::Mirror;
use crate::transport::RequestContext;

/// Whether the server keeps a notification session for this client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionMode {
    /// Changes piggy-back on every response
    #[default]
    Full,
    /// No notifications; state is fetched explicitly
    NoSession,
}

/// Last change id reported by the server and when it last moved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastChange {
    pub id: u64,
    pub since: DateTime<Utc>,
}

impl LastChange {
    pub fn new(id: u64) -> Self {
        Self {
            id,
            since: Utc::now(),
        }
    }

    /// Move to `id`; the timestamp only changes when the id does
    pub fn set_id(&mut self, id: u64) {
        if self.id != id {
            self.id = id;
            self.since = Utc::now();
        }
    }
}

/// How a folder or tag access must be satisfied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PopulatePlan {
    /// Mirror already holds the data
    Ready,
    /// Round trip a no-op so pending notifications get applied
    NoOp,
    /// No-op asking for a refresh; fetch explicitly if none arrives
    NoOpThenFetch,
    /// Fetch explicitly
    Fetch,
    /// Never loaded in this session
    Skip,
}

/// Result of observing a change token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeObservation {
    First,
    Unchanged,
    Advanced,
    /// Token went backwards: the server session was lost
    Discontinuity,
}

#[derive(Debug, Clone)]
pub struct SyncState {
    mode: SessionMode,
    always_refresh_folders: bool,
    no_tag_cache: bool,
    account_id: Option<String>,
    last_change: Option<LastChange>,
    notify_seq: u64,
    refresh_pending: bool,
}

impl SyncState {
    pub fn new(config: &MirrorConfig) -> Self {
        Self {
            mode: if config.no_session {
                SessionMode::NoSession
            } else {
                SessionMode::Full
            },
            always_refresh_folders: config.always_refresh_folders,
            no_tag_cache: config.no_tag_cache,
            account_id: config.account_id.clone(),
            last_change: None,
            notify_seq: 0,
            refresh_pending: false,
        }
    }

    pub fn mode(&self) -> SessionMode {
        self.mode
    }

    pub fn last_change(&self) -> Option<&LastChange> {
        self.last_change.as_ref()
    }

    pub fn notify_seq(&self) -> u64 {
        self.notify_seq
    }

    pub fn refresh_pending(&self) -> bool {
        self.refresh_pending
    }

    /// Record a change token from a response
    pub fn observe_change(&mut self, token: u64) -> ChangeObservation {
        match self.last_change.as_mut() {
            None => {
                self.last_change = Some(LastChange::new(token));
                ChangeObservation::First
            }
            Some(last) if token < last.id => {
                warn!(
                    previous = last.id,
                    current = token,
                    "change sequence went backwards, refresh scheduled"
                );
                last.set_id(token);
                self.refresh_pending = true;
                ChangeObservation::Discontinuity
            }
            Some(last) if token == last.id => ChangeObservation::Unchanged,
            Some(last) => {
                last.set_id(token);
                ChangeObservation::Advanced
            }
        }
    }

    pub fn observe_notify_seq(&mut self, seq: u64) {
        self.notify_seq = self.notify_seq.max(seq);
    }

    /// A refresh payload was applied: start counting from scratch
    pub fn reset_after_refresh(&mut self) {
        self.last_change = None;
        self.notify_seq = 0;
        self.refresh_pending = false;
    }

    /// The mirror was reloaded explicitly after a requested refresh did not come
    pub fn refresh_satisfied(&mut self) {
        if self.refresh_pending {
            info!("mirror reloaded without a refresh payload");
        }
        self.refresh_pending = false;
    }

    pub fn schedule_refresh(&mut self) {
        self.refresh_pending = true;
    }

    /// Context for the next request
    ///
    /// A pending refresh acknowledges no notifications and asks for the
    /// full state.
    pub fn request_context(&self, want_refresh: bool) -> RequestContext {
        let refresh = want_refresh || self.refresh_pending;
        RequestContext {
            account_id: self.account_id.clone(),
            notify_seq: if refresh { 0 } else { self.notify_seq },
            refresh,
            session: self.mode,
        }
    }

    pub fn plan_folders(&self, mirror: &Mirror) -> PopulatePlan {
        if self.refresh_pending {
            return PopulatePlan::NoOpThenFetch;
        }
        match (mirror.folders_loaded(), self.mode) {
            (true, _) if self.always_refresh_folders => PopulatePlan::NoOp,
            (true, _) => PopulatePlan::Ready,
            (false, SessionMode::Full) => PopulatePlan::NoOpThenFetch,
            (false, SessionMode::NoSession) => PopulatePlan::Fetch,
        }
    }

    pub fn plan_tags(&self, mirror: &Mirror) -> PopulatePlan {
        if self.no_tag_cache {
            return PopulatePlan::Skip;
        }
        if self.refresh_pending {
            return PopulatePlan::NoOpThenFetch;
        }
        match (mirror.tags_loaded(), self.mode) {
            (true, _) => PopulatePlan::Ready,
            (false, SessionMode::Full) => PopulatePlan::NoOpThenFetch,
            (false, SessionMode::NoSession) => PopulatePlan::Fetch,
        }
    }
}
