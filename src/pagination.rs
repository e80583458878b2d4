//! Paged search result storage
//!
//! Keeps a few search pagers keyed by the signature of the search (every
//! parameter except where the page starts and how long it is). A pager holds
//! one contiguous window of hits, so later pages extend it forwards, earlier
//! pages extend it backwards, and a disjoint request replaces it.

use std::num::NonZeroUsize;

use lru::LruCache;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::models::{ItemPatch, SearchHit};

/// Default page length
pub const DEFAULT_LIMIT: usize = 10;

/// Position marker passed to the server when extending a pager forwards
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    /// Id of the last hit already loaded
    pub id: String,
    /// Sort value of that hit
    #[serde(rename = "sortVal", default, skip_serializing_if = "Option::is_none")]
    pub sort_value: Option<String>,
}

/// Search parameters
///
/// `offset`, `limit` and `cursor` select a page; everything else identifies
/// the search itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchParams {
    pub query: String,
    /// Comma separated item types (`conversation`, `message`, `contact`, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub types: Option<String>,
    #[serde(rename = "sortBy", default, skip_serializing_if = "Option::is_none")]
    pub sort_by: Option<String>,
    /// Conversation to search within (conversation search only)
    #[serde(rename = "cid", default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fetch: Option<String>,
    #[serde(rename = "tz", default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    #[serde(rename = "calExpandInstStart", default, skip_serializing_if = "Option::is_none")]
    pub cal_expand_start: Option<i64>,
    #[serde(rename = "calExpandInstEnd", default, skip_serializing_if = "Option::is_none")]
    pub cal_expand_end: Option<i64>,
    #[serde(default)]
    pub offset: usize,
    pub limit: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<Cursor>,
}

impl SearchParams {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            types: None,
            sort_by: None,
            conversation_id: None,
            fetch: None,
            timezone: None,
            cal_expand_start: None,
            cal_expand_end: None,
            offset: 0,
            limit: DEFAULT_LIMIT,
            cursor: None,
        }
    }

    pub fn with_types(mut self, types: impl Into<String>) -> Self {
        self.types = Some(types.into());
        self
    }

    pub fn with_page(mut self, offset: usize, limit: usize) -> Self {
        self.offset = offset;
        self.limit = limit;
        self
    }

    pub fn in_conversation(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = Some(conversation_id.into());
        self
    }

    /// Cache key: all parameters except offset, limit and cursor
    pub fn signature(&self) -> String {
        fn part<T: ToString>(value: &Option<T>) -> String {
            value.as_ref().map(ToString::to_string).unwrap_or_default()
        }
        [
            self.query.clone(),
            part(&self.types),
            part(&self.sort_by),
            part(&self.conversation_id),
            part(&self.fetch),
            part(&self.timezone),
            part(&self.cal_expand_start),
            part(&self.cal_expand_end),
        ]
        .join("\u{1f}")
    }

    /// Whether this search covers items of `search_type`
    ///
    /// A search without explicit types is a conversation search.
    pub fn covers_type(&self, search_type: &str) -> bool {
        self.types
            .as_deref()
            .unwrap_or("conversation")
            .split(',')
            .any(|t| t.trim().eq_ignore_ascii_case(search_type))
    }
}

/// One page handed back to the caller
#[derive(Debug, Clone, PartialEq)]
pub struct SearchPage {
    pub offset: usize,
    pub hits: Vec<SearchHit>,
    pub has_more: bool,
}

/// Contiguous window of loaded hits
#[derive(Debug, Clone, PartialEq)]
struct SearchPager {
    params: SearchParams,
    start: usize,
    hits: Vec<SearchHit>,
    has_more: bool,
}

impl SearchPager {
    fn end(&self) -> usize {
        self.start.saturating_add(self.hits.len())
    }

    fn page(&self, offset: usize, limit: usize) -> SearchPage {
        let from = offset.saturating_sub(self.start).min(self.hits.len());
        let to = from.saturating_add(limit).min(self.hits.len());
        let has_more = to < self.hits.len() || self.has_more;
        SearchPage {
            offset,
            hits: self.hits[from..to].to_vec(),
            has_more,
        }
    }

    fn cursor(&self) -> Option<Cursor> {
        self.hits.last().map(|hit| Cursor {
            id: hit.id.clone(),
            sort_value: hit.sort_field.clone(),
        })
    }
}

/// What a search needs before it can be answered
#[derive(Debug, Clone, PartialEq)]
pub enum PagePlan {
    /// Fully answered from the cache
    Hit(SearchPage),
    /// Fetch these parameters, then [`PagedResultCache::absorb`] the result
    Fetch(SearchParams),
}

#[derive(Debug)]
pub struct PagedResultCache {
    name: &'static str,
    /// Drop pagers when items of a covered type are created
    clear_on_create: bool,
    pagers: LruCache<String, SearchPager>,
}

impl PagedResultCache {
    pub fn new(name: &'static str, capacity: NonZeroUsize, clear_on_create: bool) -> Self {
        Self {
            name,
            clear_on_create,
            pagers: LruCache::new(capacity),
        }
    }

    /// Decide how to answer `params`
    ///
    /// # Cases
    ///
    /// - Window covers the request, or nothing more exists: cache hit
    /// - Request runs past the loaded end: fetch the missing tail with a
    ///   cursor at the last loaded hit
    /// - Request starts before the window and ends inside it (or nothing
    ///   more exists): fetch the gap
    /// - Otherwise: fetch the requested page and replace the window
    pub fn plan(&mut self, params: &SearchParams) -> PagePlan {
        let signature = params.signature();
        let requested_end = params.offset.saturating_add(params.limit);
        let Some(pager) = self.pagers.get(&signature) else {
            return PagePlan::Fetch(page_request(params, params.offset, params.limit, None));
        };
        let (start, end) = (pager.start, pager.end());
        if params.offset >= start && params.offset <= end {
            if requested_end <= end || !pager.has_more {
                return PagePlan::Hit(pager.page(params.offset, params.limit));
            }
            return PagePlan::Fetch(page_request(
                params,
                end,
                requested_end - end,
                pager.cursor(),
            ));
        }
        let covers_rest = requested_end <= end || !pager.has_more;
        if params.offset < start && requested_end >= start && covers_rest {
            return PagePlan::Fetch(page_request(params, params.offset, start - params.offset, None));
        }
        PagePlan::Fetch(page_request(params, params.offset, params.limit, None))
    }

    /// Merge fetched hits and answer the original request
    pub fn absorb(
        &mut self,
        requested: &SearchParams,
        fetched: &SearchParams,
        hits: Vec<SearchHit>,
        more: bool,
    ) -> SearchPage {
        let signature = requested.signature();
        let merged = match self.pagers.pop(&signature) {
            Some(mut pager) if fetched.offset == pager.end() && !pager.hits.is_empty() => {
                pager.hits.extend(hits);
                pager.has_more = more;
                pager
            }
            Some(mut pager)
                if fetched.offset < pager.start && fetched.offset + hits.len() == pager.start =>
            {
                let mut joined = hits;
                joined.append(&mut pager.hits);
                pager.hits = joined;
                pager.start = fetched.offset;
                pager
            }
            _ => SearchPager {
                params: requested.clone(),
                start: fetched.offset,
                hits,
                has_more: more,
            },
        };
        let page = merged.page(requested.offset, requested.limit);
        if let Some((evicted, _)) = self.pagers.push(signature, merged) {
            debug!(cache = self.name, signature = %evicted, "evicted search pager");
        }
        page
    }

    /// Drop hits for deleted items
    pub fn remove_ids(&mut self, ids: &[String]) {
        for (_, pager) in self.pagers.iter_mut() {
            pager.hits.retain(|hit| !ids.contains(&hit.id));
        }
    }

    /// Merge modified attributes into matching hits
    pub fn patch_hit(&mut self, patch: &ItemPatch) {
        for (_, pager) in self.pagers.iter_mut() {
            for hit in pager.hits.iter_mut().filter(|h| h.id == patch.id) {
                hit.apply_patch(patch);
            }
        }
    }

    /// Drop pagers whose search covers `search_type`
    pub fn clear_type(&mut self, search_type: &str) -> usize {
        let stale: Vec<String> = self
            .pagers
            .iter()
            .filter(|(_, pager)| pager.params.covers_type(search_type))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &stale {
            self.pagers.pop(key);
        }
        stale.len()
    }

    /// Items of `search_type` were created; pagers may now be incomplete
    pub fn on_created(&mut self, search_type: &str) {
        if self.clear_on_create {
            let cleared = self.clear_type(search_type);
            if cleared > 0 {
                debug!(cache = self.name, search_type, cleared, "cleared pagers after create");
            }
        }
    }

    pub fn clear(&mut self) {
        self.pagers.clear();
    }

    pub fn len(&self) -> usize {
        self.pagers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pagers.is_empty()
    }
}

fn page_request(
    params: &SearchParams,
    offset: usize,
    limit: usize,
    cursor: Option<Cursor>,
) -> SearchParams {
    SearchParams {
        offset,
        limit,
        cursor,
        ..params.clone()
    }
}
