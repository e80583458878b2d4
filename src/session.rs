//! Mailbox session
//!
//! The public face of the mirror. Every operation takes the session lock,
//! makes sure the mirror is current enough for what was asked, talks to the
//! transport if it has to, applies the response context and publishes the
//! new mirror snapshot before releasing the lock.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, PoisonError, RwLock};

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::cache::SessionCaches;
use crate::calendar::{
    ApptSummary, ApptSummaryResult, MiniCalError, MiniCalResult, SUMMARY_MAX_PAGES,
    SUMMARY_PAGE_LIMIT, SummaryKey,
};
use crate::config::MirrorConfig;
use crate::errors::{MirrorError, MirrorResult, TransportError};
use crate::events::{Listeners, MirrorEvent, MirrorListener};
use crate::guard::SessionLock;
use crate::item_id::canonical_key;
use crate::mirror::Mirror;
use crate::models::{
    Contact, ContactRecord, Entity, FolderNode, FolderRecord, Message, MessageRecord, PATH_SEPARATOR,
    SearchHit, Tag, TagRecord, folder_ids,
};
use crate::notify::NotificationApplier;
use crate::pagination::{PagePlan, PagedResultCache, SearchPage, SearchParams};
use crate::sync::{LastChange, PopulatePlan, SyncState};
use crate::transport::{ContactFetch, MessageFetch, Request, Transport};

/// Everything guarded by the session lock
#[derive(Debug)]
struct SessionState {
    mirror: Arc<Mirror>,
    caches: SessionCaches,
    sync: SyncState,
    listeners: Listeners,
}

/// Appointment summary request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApptSummaryQuery {
    /// Extra search query ANDed with the folder restriction
    pub query: String,
    /// Range start, epoch milliseconds
    pub start: i64,
    /// Range end, epoch milliseconds
    pub end: i64,
    /// Folders to summarize; the calendar folder when empty
    pub folder_ids: Vec<String>,
    pub timezone: Option<String>,
    /// `appointment` and/or `task`
    pub types: Option<String>,
}

impl ApptSummaryQuery {
    pub fn new(start: i64, end: i64) -> Self {
        Self {
            query: String::new(),
            start,
            end,
            folder_ids: Vec::new(),
            timezone: None,
            types: None,
        }
    }
}

/// Client-side mirror of one remote mailbox
///
/// Cheap to share behind an `Arc`; all methods take `&self`.
pub struct MailboxSession<T> {
    config: Arc<MirrorConfig>,
    transport: T,
    state: SessionLock<SessionState>,
    published: RwLock<Arc<Mirror>>,
}

impl<T: Transport> MailboxSession<T> {
    pub fn new(config: MirrorConfig, transport: T) -> Self {
        let mirror = Arc::new(Mirror::empty(config.account_id.clone()));
        let state = SessionState {
            mirror: Arc::clone(&mirror),
            caches: SessionCaches::new(&config),
            sync: SyncState::new(&config),
            listeners: Listeners::default(),
        };
        Self {
            state: SessionLock::new(state, config.lock_max_waiting, config.lock_timeout()),
            config: Arc::new(config),
            transport,
            published: RwLock::new(mirror),
        }
    }

    pub fn config(&self) -> &MirrorConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Latest published mirror, without taking the session lock
    ///
    /// May lag behind a call in progress but is always complete.
    pub fn snapshot(&self) -> Arc<Mirror> {
        Arc::clone(&self.published.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Lock-free placeholder check against the published mirror
    pub fn is_placeholder(&self, id: &str) -> bool {
        self.snapshot().is_placeholder(id)
    }

    fn publish(&self, mirror: &Arc<Mirror>) {
        *self.published.write().unwrap_or_else(PoisonError::into_inner) = Arc::clone(mirror);
    }

    /// Send one request and apply whatever its response says changed
    async fn invoke_locked(
        &self,
        state: &mut SessionState,
        request: Request,
        want_refresh: bool,
    ) -> MirrorResult<Value> {
        let ctx = state.sync.request_context(want_refresh);
        let name = request.name().to_owned();
        let response = self.transport.invoke(ctx, request).await.map_err(|e| {
            warn!(request = %name, error = %e, "remote call failed");
            MirrorError::Transport(e)
        })?;
        if let Some(context) = &response.context {
            NotificationApplier::new(
                &mut state.mirror,
                &mut state.caches,
                &mut state.sync,
                &state.listeners,
            )
            .apply(context)?;
            self.publish(&state.mirror);
        }
        Ok(response.body)
    }

    /// Resolve a pending refresh before anything else is answered
    async fn prepare(&self, state: &mut SessionState) -> MirrorResult<()> {
        if state.sync.refresh_pending() {
            self.ensure_folders(state).await?;
        }
        Ok(())
    }

    async fn ensure_folders(&self, state: &mut SessionState) -> MirrorResult<()> {
        match state.sync.plan_folders(&state.mirror) {
            PopulatePlan::Ready | PopulatePlan::Skip => Ok(()),
            PopulatePlan::NoOp => self.invoke_locked(state, Request::NoOp, false).await.map(drop),
            PopulatePlan::NoOpThenFetch => {
                self.invoke_locked(state, Request::NoOp, true).await?;
                if state.sync.refresh_pending() {
                    self.reload(state).await
                } else if !state.mirror.folders_loaded() {
                    self.fetch_folders(state).await
                } else {
                    Ok(())
                }
            }
            PopulatePlan::Fetch => self.fetch_folders(state).await,
        }
    }

    async fn ensure_tags(&self, state: &mut SessionState) -> MirrorResult<()> {
        match state.sync.plan_tags(&state.mirror) {
            PopulatePlan::Ready | PopulatePlan::Skip => Ok(()),
            PopulatePlan::NoOp => self.invoke_locked(state, Request::NoOp, false).await.map(drop),
            PopulatePlan::NoOpThenFetch => {
                self.invoke_locked(state, Request::NoOp, true).await?;
                if state.sync.refresh_pending() {
                    self.reload(state).await
                } else if !state.mirror.tags_loaded() {
                    self.fetch_tags(state).await
                } else {
                    Ok(())
                }
            }
            PopulatePlan::Fetch => self.fetch_tags(state).await,
        }
    }

    /// A refresh was asked for but never came: start over explicitly
    async fn reload(&self, state: &mut SessionState) -> MirrorResult<()> {
        info!("requested refresh not delivered, reloading folders and tags");
        state.caches.clear();
        self.fetch_folders(state).await?;
        if !self.config.no_tag_cache {
            self.fetch_tags(state).await?;
        }
        state.sync.refresh_satisfied();
        Ok(())
    }

    async fn fetch_folders(&self, state: &mut SessionState) -> MirrorResult<()> {
        let body = self.invoke_locked(state, Request::GetFolder, false).await?;
        let root: FolderRecord = body_field(&body, "folder")?;
        let next = state.mirror.with_folders(&root)?;
        self.replace_mirror(state, next);
        debug!(folders = state.mirror.all_folders().len(), "folder tree fetched");
        Ok(())
    }

    async fn fetch_tags(&self, state: &mut SessionState) -> MirrorResult<()> {
        let records: Vec<TagRecord> = match self.invoke_locked(state, Request::GetTags, false).await {
            Ok(body) => match body.get("tag") {
                Some(_) => body_field(&body, "tag")?,
                None => Vec::new(),
            },
            Err(MirrorError::Transport(e)) if e.is_fault(TransportError::PERM_DENIED) => {
                debug!("tag fetch denied, using empty tag registry");
                Vec::new()
            }
            Err(e) => return Err(e),
        };
        let next = state.mirror.with_tags(&records)?;
        self.replace_mirror(state, next);
        Ok(())
    }

    fn replace_mirror(&self, state: &mut SessionState, next: Mirror) {
        state.mirror = Arc::new(next);
        self.publish(&state.mirror);
        state
            .listeners
            .dispatch(&[MirrorEvent::Refresh], &state.mirror);
    }

    async fn read_folders<R>(&self, read: impl FnOnce(&Mirror) -> R) -> MirrorResult<R> {
        let mut state = self.state.lock().await?;
        self.prepare(&mut state).await?;
        self.ensure_folders(&mut state).await?;
        Ok(read(state.mirror.as_ref()))
    }

    async fn read_tags<R>(&self, read: impl FnOnce(&Mirror) -> R) -> MirrorResult<R> {
        let mut state = self.state.lock().await?;
        self.prepare(&mut state).await?;
        self.ensure_tags(&mut state).await?;
        Ok(read(state.mirror.as_ref()))
    }

    pub async fn folder_by_id(&self, id: &str) -> MirrorResult<Option<Arc<FolderNode>>> {
        self.read_folders(|m| m.folder_by_id(id)).await
    }

    pub async fn folder_by_uuid(&self, uuid: &str) -> MirrorResult<Option<Arc<FolderNode>>> {
        self.read_folders(|m| m.folder_by_uuid(uuid)).await
    }

    /// Folder at an absolute path; segments match case-insensitively
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for a relative path.
    pub async fn folder_by_path(&self, path: &str) -> MirrorResult<Option<Arc<FolderNode>>> {
        if !path.starts_with(PATH_SEPARATOR) {
            return Err(MirrorError::invalid(format!("path must be absolute: {path}")));
        }
        self.read_folders(|m| m.folder_by_path(path)).await
    }

    /// Path lookup first, then id
    pub async fn folder(&self, path_or_id: &str) -> MirrorResult<Option<Arc<FolderNode>>> {
        self.read_folders(|m| m.folder(path_or_id)).await
    }

    pub async fn user_root(&self) -> MirrorResult<Option<Arc<FolderNode>>> {
        self.read_folders(Mirror::user_root).await
    }

    pub async fn all_folders(&self) -> MirrorResult<Vec<Arc<FolderNode>>> {
        self.read_folders(Mirror::all_folders).await
    }

    pub async fn tag_by_id(&self, id: &str) -> MirrorResult<Option<Arc<Tag>>> {
        self.read_tags(|m| m.tag_by_id(id)).await
    }

    pub async fn tag_by_name(&self, name: &str) -> MirrorResult<Option<Arc<Tag>>> {
        self.read_tags(|m| m.tag_by_name(name)).await
    }

    pub async fn tags(&self) -> MirrorResult<Vec<Arc<Tag>>> {
        self.read_tags(Mirror::all_tags).await
    }

    /// Mailbox size in bytes
    pub async fn size(&self) -> MirrorResult<u64> {
        self.read_folders(Mirror::size).await
    }

    /// Fetch a message, answering from the cache when fetched with equal parameters
    ///
    /// A cache hit with `mark_read` on an unread message sends a read action;
    /// the flag change comes back as a notification.
    pub async fn message(&self, fetch: MessageFetch) -> MirrorResult<Arc<Message>> {
        let key = canonical_key(&fetch.id, self.config.account_id.as_deref());
        let mut state = self.state.lock().await?;
        self.prepare(&mut state).await?;

        if let Some(cached) = state.caches.messages.get(&key, &fetch.params) {
            if !(fetch.mark_read && cached.is_unread()) {
                return Ok(cached);
            }
            let action = Request::MessageAction {
                op: "read".to_owned(),
                ids: vec![fetch.id.clone()],
            };
            self.invoke_locked(&mut state, action, false).await?;
            return Ok(state
                .caches
                .messages
                .get(&key, &fetch.params)
                .unwrap_or(cached));
        }

        let params = fetch.params.clone();
        let body = self
            .invoke_locked(&mut state, Request::GetMessage(fetch), false)
            .await?;
        let message = Arc::new(Message::from_record(body_field::<MessageRecord>(&body, "m")?));
        state.caches.put_message(params, Arc::clone(&message));
        Ok(message)
    }

    /// Cached message regardless of fetch parameters; never goes remote
    pub async fn cached_message(&self, id: &str) -> MirrorResult<Option<Arc<Message>>> {
        let key = canonical_key(id, self.config.account_id.as_deref());
        let state = self.state.lock().await?;
        Ok(state.caches.messages.peek(&key))
    }

    pub async fn contact(&self, fetch: ContactFetch) -> MirrorResult<Arc<Contact>> {
        let key = canonical_key(&fetch.id, self.config.account_id.as_deref());
        let mut state = self.state.lock().await?;
        self.prepare(&mut state).await?;

        if let Some(cached) = state.caches.contacts.get(&key, &fetch.params) {
            return Ok(cached);
        }
        let params = fetch.params.clone();
        let body = self
            .invoke_locked(&mut state, Request::GetContact(fetch), false)
            .await?;
        let contact = Arc::new(Contact::from_record(body_field::<ContactRecord>(&body, "cn")?));
        state.caches.put_contact(params, Arc::clone(&contact));
        Ok(contact)
    }

    pub async fn cached_contact(&self, id: &str) -> MirrorResult<Option<Arc<Contact>>> {
        let key = canonical_key(id, self.config.account_id.as_deref());
        let state = self.state.lock().await?;
        Ok(state.caches.contacts.peek(&key))
    }

    /// Cached message or contact by its stable uuid; never goes remote
    pub async fn cached_item_by_uuid(&self, uuid: &str) -> MirrorResult<Option<Entity>> {
        let state = self.state.lock().await?;
        Ok(state.caches.item_by_uuid(uuid))
    }

    /// One page of a plain search
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for a zero limit.
    pub async fn search(&self, params: SearchParams) -> MirrorResult<SearchPage> {
        self.paged_search(params, |caches| &mut caches.searches).await
    }

    /// One page of the messages of a conversation
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` when no conversation id is set or the limit is zero.
    pub async fn search_conversation(&self, params: SearchParams) -> MirrorResult<SearchPage> {
        if params.conversation_id.is_none() {
            return Err(MirrorError::invalid("conversation search needs a conversation id"));
        }
        self.paged_search(params, |caches| &mut caches.conv_searches).await
    }

    async fn paged_search(
        &self,
        params: SearchParams,
        pick: fn(&mut SessionCaches) -> &mut PagedResultCache,
    ) -> MirrorResult<SearchPage> {
        if params.limit == 0 {
            return Err(MirrorError::invalid("search limit must be at least 1"));
        }
        let mut state = self.state.lock().await?;
        self.prepare(&mut state).await?;
        let fetch = match pick(&mut state.caches).plan(&params) {
            PagePlan::Hit(page) => return Ok(page),
            PagePlan::Fetch(fetch) => fetch,
        };
        let body = self
            .invoke_locked(&mut state, Request::Search(fetch.clone()), false)
            .await?;
        let (hits, more) = parse_hits::<SearchHit>(&body)?;
        Ok(pick(&mut state.caches).absorb(&params, &fetch, hits, more))
    }

    /// Drop cached pagers whose search covers `search_type`
    pub async fn clear_search_cache(&self, search_type: &str) -> MirrorResult<()> {
        let mut state = self.state.lock().await?;
        state.caches.searches.clear_type(search_type);
        state.caches.conv_searches.clear_type(search_type);
        Ok(())
    }

    /// Appointment summaries per folder, fetching only folders not cached
    pub async fn appointment_summaries(
        &self,
        request: &ApptSummaryQuery,
    ) -> MirrorResult<Vec<Arc<ApptSummaryResult>>> {
        let folder_ids = if request.folder_ids.is_empty() {
            vec![folder_ids::CALENDAR.to_owned()]
        } else {
            request.folder_ids.clone()
        };
        let mut state = self.state.lock().await?;
        self.prepare(&mut state).await?;
        self.ensure_folders(&mut state).await?;

        let mut summaries = Vec::with_capacity(folder_ids.len());
        let mut missing: Vec<SummaryKey> = Vec::new();
        for folder_id in &folder_ids {
            let key = SummaryKey {
                start: request.start,
                end: request.end,
                folder_id: folder_id.clone(),
                timezone: request.timezone.clone(),
                query: request.query.clone(),
            };
            match state.caches.calendar.get(&key) {
                Some(cached) => summaries.push(cached),
                None => missing.push(key),
            }
        }
        if missing.is_empty() {
            return Ok(summaries);
        }

        // hits report mountpoint contents under the owner-qualified remote id
        let mut folder_for_hit: HashMap<String, String> = HashMap::new();
        let mut fetched: Vec<ApptSummaryResult> = Vec::with_capacity(missing.len());
        for key in &missing {
            let remote = state
                .mirror
                .folder_by_id(&key.folder_id)
                .and_then(|f| f.mount().map(|m| m.canonical_remote_id()));
            folder_for_hit.insert(remote.unwrap_or_else(|| key.folder_id.clone()), key.folder_id.clone());
            fetched.push(ApptSummaryResult::new(key));
        }
        let mut query = format!(
            "({})",
            missing
                .iter()
                .map(|k| format!("inid:\"{}\"", k.folder_id))
                .collect::<Vec<_>>()
                .join(" or ")
        );
        if !request.query.is_empty() {
            query.push_str(&format!(" AND ({})", request.query));
        }
        let mut params = SearchParams::new(query)
            .with_types(request.types.clone().unwrap_or_else(|| "appointment".to_owned()))
            .with_page(0, SUMMARY_PAGE_LIMIT);
        params.sort_by = Some("none".to_owned());
        params.timezone = request.timezone.clone();
        params.cal_expand_start = Some(request.start);
        params.cal_expand_end = Some(request.end);

        for _ in 0..SUMMARY_MAX_PAGES {
            let body = self
                .invoke_locked(&mut state, Request::Search(params.clone()), false)
                .await?;
            let (hits, more) = parse_hits::<ApptSummary>(&body)?;
            let count = hits.len();
            for appt in hits {
                let folder_id = folder_for_hit
                    .get(&appt.folder_id)
                    .cloned()
                    .unwrap_or_else(|| appt.folder_id.clone());
                match fetched.iter_mut().find(|r| r.folder_id == folder_id) {
                    Some(result) => result.appointments.push(appt),
                    None => {
                        let mut result = ApptSummaryResult::new(&SummaryKey {
                            folder_id,
                            ..missing[0].clone()
                        });
                        result.appointments.push(appt);
                        fetched.push(result);
                    }
                }
            }
            if !more || count == 0 {
                break;
            }
            params.offset += count;
        }
        for result in fetched {
            summaries.push(state.caches.calendar.put(result));
        }
        Ok(summaries)
    }

    /// Dates with appointments in the given folders
    pub async fn mini_calendar(
        &self,
        start: i64,
        end: i64,
        folder_ids: &[String],
    ) -> MirrorResult<MiniCalResult> {
        let mut state = self.state.lock().await?;
        self.prepare(&mut state).await?;
        if let Some(dates) = state.caches.calendar.mini_cal(start, end, folder_ids) {
            return Ok(MiniCalResult {
                dates,
                errors: Vec::new(),
            });
        }
        let request = Request::GetMiniCal {
            start,
            end,
            folder_ids: folder_ids.to_vec(),
        };
        let body = self.invoke_locked(&mut state, request, false).await?;
        let dates: BTreeSet<String> = optional_field::<Vec<String>>(&body, "date")?
            .unwrap_or_default()
            .into_iter()
            .map(|d| d.trim().to_owned())
            .collect();
        let errors = optional_field::<Vec<MiniCalError>>(&body, "error")?.unwrap_or_default();
        let dates = state
            .caches
            .calendar
            .put_mini_cal(start, end, folder_ids, dates);
        Ok(MiniCalResult { dates, errors })
    }

    /// Forget cached calendar summaries (shared calendars are not notified)
    pub async fn clear_appt_summary_cache(&self) -> MirrorResult<()> {
        self.state.lock().await?.caches.calendar.clear();
        Ok(())
    }

    pub async fn add_listener(&self, listener: Arc<dyn MirrorListener>) -> MirrorResult<()> {
        self.state.lock().await?.listeners.add(listener);
        Ok(())
    }

    /// Empty every item and result cache; the mirror itself is kept
    pub async fn clear_caches(&self) -> MirrorResult<()> {
        self.state.lock().await?.caches.clear();
        Ok(())
    }

    /// Ask the server for a full refresh, reloading explicitly if it does not send one
    pub async fn refresh(&self) -> MirrorResult<()> {
        let mut state = self.state.lock().await?;
        state.sync.schedule_refresh();
        self.ensure_folders(&mut state).await?;
        self.ensure_tags(&mut state).await
    }

    /// Round trip that only picks up pending notifications
    pub async fn noop(&self) -> MirrorResult<()> {
        let mut state = self.state.lock().await?;
        self.prepare(&mut state).await?;
        self.invoke_locked(&mut state, Request::NoOp, false).await.map(drop)
    }

    /// Send any request; its response context is applied like any other
    pub async fn invoke(&self, request: Request) -> MirrorResult<Value> {
        let mut state = self.state.lock().await?;
        self.prepare(&mut state).await?;
        self.invoke_locked(&mut state, request, false).await
    }

    pub async fn last_change(&self) -> MirrorResult<Option<LastChange>> {
        Ok(self.state.lock().await?.sync.last_change().cloned())
    }
}

/// Decode a required field of a response body
///
/// A one-element array is accepted where a single record is expected.
fn body_field<R: DeserializeOwned>(body: &Value, field: &str) -> MirrorResult<R> {
    let value = body
        .get(field)
        .ok_or_else(|| MirrorError::malformed(format!("response has no <{field}>")))?;
    let value = match value {
        Value::Array(items) if items.len() == 1 && !field_is_list(field) => &items[0],
        other => other,
    };
    serde_json::from_value(value.clone())
        .map_err(|e| MirrorError::malformed(format!("bad <{field}> in response: {e}")))
}

fn field_is_list(field: &str) -> bool {
    matches!(field, "tag" | "hits" | "date" | "error")
}

fn optional_field<R: DeserializeOwned>(body: &Value, field: &str) -> MirrorResult<Option<R>> {
    match body.get(field) {
        Some(_) => body_field(body, field).map(Some),
        None => Ok(None),
    }
}

/// Hits and has-more flag of a search response
fn parse_hits<H: DeserializeOwned>(body: &Value) -> MirrorResult<(Vec<H>, bool)> {
    let hits = optional_field::<Vec<H>>(body, "hits")?.unwrap_or_default();
    let more = body.get("more").and_then(Value::as_bool).unwrap_or(false);
    Ok((hits, more))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use serde_json::json;

    use super::{ApptSummaryQuery, MailboxSession};
    use crate::config::MirrorConfig;
    use crate::context::{ChangeBlock, NotifyBlock, RawRecord, ResponseContext};
    use crate::errors::TransportError;
    use crate::events::MirrorListener;
    use crate::models::Entity;
    use crate::pagination::SearchParams;
    use crate::sync::SessionMode;
    use crate::testing::{RecordingListener, refresh_json, refresh_payload};
    use crate::transport::{MessageFetch, ReplayTransport, Request, Response};

    fn session(config: MirrorConfig, transport: ReplayTransport) -> MailboxSession<ReplayTransport> {
        MailboxSession::new(config, transport)
    }

    fn with_change(token: u64) -> ResponseContext {
        ResponseContext {
            change: Some(ChangeBlock { token }),
            ..ResponseContext::default()
        }
    }

    fn refresh_reply(token: u64) -> Response {
        Response::new(json!({})).with_context(ResponseContext {
            refresh: Some(refresh_payload()),
            ..with_change(token)
        })
    }

    #[tokio::test]
    async fn cold_start_noop_populates_mirror() {
        let transport = ReplayTransport::new();
        transport.push(refresh_reply(450));
        let session = session(MirrorConfig::default(), transport);
        let listener = Arc::new(RecordingListener::default());
        session
            .add_listener(Arc::clone(&listener) as Arc<dyn MirrorListener>)
            .await
            .expect("listener added");

        let inbox = session
            .folder_by_path("/inbox")
            .await
            .expect("lookup succeeds")
            .expect("inbox mirrored");
        assert_eq!(inbox.id, "2");
        let work = session.tag_by_name("WORK").await.expect("lookup succeeds");
        assert_eq!(work.map(|t| t.id.clone()).as_deref(), Some("64"));
        assert_eq!(session.size().await.expect("size"), 4096);

        let calls = session.transport().calls();
        assert_eq!(session.transport().request_names(), ["NoOp"]);
        assert!(calls[0].context.refresh);
        assert_eq!(calls[0].context.notify_seq, 0);
        assert_eq!(listener.seen(), ["refresh"]);
        assert!(session.snapshot().folder_by_id("257").is_some());
        assert!(session.is_placeholder("other:9"));
        assert_eq!(
            session.last_change().await.expect("lock").map(|c| c.id),
            Some(450)
        );
    }

    #[tokio::test]
    async fn falls_back_to_explicit_fetch_without_refresh() {
        let transport = ReplayTransport::new();
        transport.push(Response::new(json!({})));
        transport.push(Response::new(json!({"folder": refresh_json()["folder"].clone()})));
        transport.push(Response::new(json!({})));
        transport.push(Response::new(json!({"tag": [{"id": "64", "name": "work"}]})));
        let session = session(MirrorConfig::default(), transport);

        let folders = session.all_folders().await.expect("folders load");
        assert!(folders.iter().any(|f| f.path() == "/Inbox/Work"));
        let tags = session.tags().await.expect("tags load");
        assert_eq!(tags.len(), 1);
        assert_eq!(
            session.transport().request_names(),
            ["NoOp", "GetFolder", "NoOp", "GetTag"]
        );

        session.folder("2").await.expect("cached lookup");
        assert_eq!(session.transport().calls().len(), 4);
    }

    #[tokio::test]
    async fn no_session_mode_fetches_directly() {
        let transport = ReplayTransport::new();
        transport.push(Response::new(json!({"folder": refresh_json()["folder"].clone()})));
        let config = MirrorConfig {
            no_session: true,
            ..MirrorConfig::default()
        };
        let session = session(config, transport);

        let root = session.user_root().await.expect("lookup").expect("root");
        assert_eq!(root.id, "1");
        let calls = session.transport().calls();
        assert_eq!(session.transport().request_names(), ["GetFolder"]);
        assert_eq!(calls[0].context.session, SessionMode::NoSession);
    }

    #[tokio::test]
    async fn denied_tag_fetch_yields_empty_registry() {
        let transport = ReplayTransport::new();
        transport.push_error(TransportError::Fault {
            code: TransportError::PERM_DENIED.to_owned(),
            message: "permission denied".to_owned(),
        });
        let config = MirrorConfig {
            no_session: true,
            ..MirrorConfig::default()
        };
        let session = session(config, transport);

        assert!(session.tags().await.expect("denial is not an error").is_empty());
        assert!(session.tag_by_name("work").await.expect("lookup").is_none());
        assert_eq!(session.transport().request_names(), ["GetTag"]);
    }

    #[tokio::test]
    async fn relative_path_is_rejected_without_a_call() {
        let session = session(MirrorConfig::default(), ReplayTransport::new());
        let err = session.folder_by_path("Inbox").await.expect_err("relative path");
        assert_eq!(err.code(), "invalid_input");
        assert!(session.transport().calls().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_fetches_share_one_remote_call() {
        let transport = ReplayTransport::new().with_delay(Duration::from_millis(50));
        transport.push(Response::new(json!({"m": {"id": "77", "f": "u", "su": "hello"}})));
        let session = Arc::new(session(MirrorConfig::default(), transport));

        let fetch = |session: Arc<MailboxSession<ReplayTransport>>| {
            tokio::spawn(async move { session.message(MessageFetch::new("77")).await })
        };
        let first = fetch(Arc::clone(&session));
        let second = fetch(Arc::clone(&session));
        let first = first.await.expect("task joins").expect("fetch succeeds");
        let second = second.await.expect("task joins").expect("fetch succeeds");

        assert_eq!(first.subject.as_deref(), Some("hello"));
        assert_eq!(first, second);
        assert_eq!(session.transport().request_names(), ["GetMsg"]);
    }

    #[tokio::test]
    async fn mark_read_on_cache_hit_sends_action_and_applies_notification() {
        let transport = ReplayTransport::new();
        transport.push(Response::new(json!({"m": [{"id": "77", "uuid": "m-77", "f": "u"}]})));
        transport.push(Response::new(json!({})).with_context(ResponseContext {
            notify: vec![NotifyBlock {
                seq: 3,
                modified: vec![RawRecord::new("m", json!({"id": "77", "f": ""}))],
                ..NotifyBlock::default()
            }],
            ..ResponseContext::default()
        }));
        let session = session(MirrorConfig::default(), transport);

        let unread = session.message(MessageFetch::new("77")).await.expect("fetch");
        assert!(unread.is_unread());

        let mut fetch = MessageFetch::new("77");
        fetch.mark_read = true;
        let read = session.message(fetch.clone()).await.expect("cache hit");
        assert!(!read.is_unread());
        session.message(fetch).await.expect("already read");

        assert_eq!(session.transport().request_names(), ["GetMsg", "MsgAction"]);
        let cached = session.cached_message("77").await.expect("lock");
        assert_eq!(cached.map(|m| m.flags.clone()).as_deref(), Some(""));
        let by_uuid = session.cached_item_by_uuid("m-77").await.expect("lock");
        assert!(matches!(by_uuid, Some(Entity::Message(m)) if m.flags.is_empty()));
    }

    #[tokio::test]
    async fn lower_change_token_forces_refresh_request() {
        let transport = ReplayTransport::new();
        transport.push(refresh_reply(450));
        transport.push(Response::new(json!({})).with_context(ResponseContext {
            notify: vec![NotifyBlock {
                seq: 7,
                ..NotifyBlock::default()
            }],
            ..with_change(12)
        }));
        transport.push(refresh_reply(12));
        let session = session(MirrorConfig::default(), transport);

        session.folder_by_id("2").await.expect("cold start");
        session.noop().await.expect("noop");
        assert!(!session.transport().calls()[1].context.refresh);
        session.folder_by_id("2").await.expect("lookup after discontinuity");

        let calls = session.transport().calls();
        assert_eq!(session.transport().request_names(), ["NoOp", "NoOp", "NoOp"]);
        assert!(calls[2].context.refresh);
        assert_eq!(calls[2].context.notify_seq, 0);
        assert_eq!(
            session.last_change().await.expect("lock").map(|c| c.id),
            Some(12)
        );

        session.folder_by_id("5").await.expect("settled");
        assert_eq!(session.transport().calls().len(), 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn waiter_times_out_behind_slow_call() {
        let transport = ReplayTransport::new().with_delay(Duration::from_millis(300));
        let config = MirrorConfig {
            lock_timeout_ms: 20,
            ..MirrorConfig::default()
        };
        let session = Arc::new(session(config, transport));

        let slow = {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.noop().await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        let err = session.clear_caches().await.expect_err("lock is held");
        assert_eq!(err.code(), "lock_timeout");
        slow.await.expect("task joins").expect("noop succeeds");
    }

    #[tokio::test]
    async fn transport_failure_leaves_mirror_untouched() {
        let transport = ReplayTransport::new();
        transport.push(refresh_reply(450));
        transport.push_error(TransportError::Io("connection reset".to_owned()));
        let session = session(MirrorConfig::default(), transport);

        session.folder_by_id("2").await.expect("cold start");
        let before = session.snapshot();
        let err = session
            .invoke(Request::Custom {
                name: "ItemAction".to_owned(),
                body: json!({"op": "move"}),
            })
            .await
            .expect_err("scripted failure");

        assert_eq!(err.code(), "transport");
        assert!(Arc::ptr_eq(&before, &session.snapshot()));
    }

    #[tokio::test]
    async fn search_pages_are_served_from_the_pager() {
        let transport = ReplayTransport::new();
        transport.push(Response::new(json!({
            "hits": [
                {"type": "m", "id": "1", "sf": "a"},
                {"type": "m", "id": "2", "sf": "b"}
            ],
            "more": true
        })));
        let session = session(MirrorConfig::default(), transport);
        let params = SearchParams::new("in:inbox").with_types("message").with_page(0, 2);

        let page = session.search(params.clone()).await.expect("search");
        assert_eq!(page.hits.len(), 2);
        assert!(page.has_more);
        let again = session.search(params).await.expect("cached page");
        assert_eq!(again, page);
        assert_eq!(session.transport().request_names(), ["Search"]);

        let err = session
            .search_conversation(SearchParams::new("in:inbox"))
            .await
            .expect_err("no conversation id");
        assert_eq!(err.code(), "invalid_input");
    }

    #[tokio::test]
    async fn appointment_summaries_fetch_once_and_map_mountpoints() {
        let transport = ReplayTransport::new();
        transport.push(refresh_reply(450));
        transport.push(Response::new(json!({
            "hits": [
                {"id": "900", "l": "10", "name": "standup", "inst": [{"s": 1500, "dur": 900}]},
                {"id": "901", "l": "boss:2", "name": "one on one"}
            ],
            "more": false
        })));
        let session = session(MirrorConfig::default(), transport);
        let query = ApptSummaryQuery {
            folder_ids: vec!["10".to_owned(), "301".to_owned()],
            ..ApptSummaryQuery::new(1_000, 2_000)
        };

        let results = session.appointment_summaries(&query).await.expect("summaries");
        assert_eq!(results.len(), 2);
        let own = results.iter().find(|r| r.folder_id == "10").expect("own calendar");
        assert_eq!(own.appointments[0].id, "900");
        let mounted = results.iter().find(|r| r.folder_id == "301").expect("mountpoint");
        assert_eq!(mounted.appointments[0].id, "901");

        let calls = session.transport().calls();
        let Request::Search(params) = &calls[1].request else {
            panic!("expected a search, got {:?}", calls[1].request);
        };
        assert_eq!(params.query, "(inid:\"10\" or inid:\"301\")");
        assert_eq!(params.cal_expand_start, Some(1_000));

        session.appointment_summaries(&query).await.expect("cached");
        assert_eq!(session.transport().calls().len(), 2);
    }

    #[tokio::test]
    async fn mini_calendar_is_cached_per_range_and_folders() {
        let transport = ReplayTransport::new();
        transport.push(Response::new(json!({
            "date": ["20260105", " 20260107"],
            "error": [{"id": "301", "code": "service.PERM_DENIED"}]
        })));
        let session = session(MirrorConfig::default(), transport);
        let folders = vec!["10".to_owned(), "301".to_owned()];

        let first = session.mini_calendar(1, 2, &folders).await.expect("mini cal");
        assert!(first.dates.contains("20260107"));
        assert_eq!(first.errors[0].folder_id, "301");
        let second = session.mini_calendar(1, 2, &folders).await.expect("cached");
        assert_eq!(second.dates, first.dates);
        assert!(second.errors.is_empty());
        assert_eq!(session.transport().request_names(), ["GetMiniCal"]);
    }
}
