//! Calendar summary cache
//!
//! Appointment summaries are cached per folder for one time range, timezone
//! and query. Mini-calendar date sets are cached per range and folder set.
//! Calendar item changes drop whatever they may have made stale.

use std::collections::BTreeSet;
use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

/// Search page size used when expanding appointment summaries
pub const SUMMARY_PAGE_LIMIT: usize = 2000;
/// Upper bound on summary search round trips
pub const SUMMARY_MAX_PAGES: usize = 100;

/// One expanded instance of an appointment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApptInstance {
    #[serde(rename = "s", default)]
    pub start: Option<i64>,
    #[serde(rename = "dur", default)]
    pub duration: Option<i64>,
    #[serde(rename = "allDay", default)]
    pub all_day: bool,
}

/// Appointment or task hit of a calendar-expanded search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApptSummary {
    pub id: String,
    #[serde(rename = "l")]
    pub folder_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "inst", default)]
    pub instances: Vec<ApptInstance>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Summaries of one folder for one range
#[derive(Debug, Clone, PartialEq)]
pub struct ApptSummaryResult {
    pub start: i64,
    pub end: i64,
    pub folder_id: String,
    pub timezone: Option<String>,
    pub query: String,
    pub appointments: Vec<ApptSummary>,
}

impl ApptSummaryResult {
    pub fn new(key: &SummaryKey) -> Self {
        Self {
            start: key.start,
            end: key.end,
            folder_id: key.folder_id.clone(),
            timezone: key.timezone.clone(),
            query: key.query.clone(),
            appointments: Vec::new(),
        }
    }

    pub fn key(&self) -> SummaryKey {
        SummaryKey {
            start: self.start,
            end: self.end,
            folder_id: self.folder_id.clone(),
            timezone: self.timezone.clone(),
            query: self.query.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SummaryKey {
    pub start: i64,
    pub end: i64,
    pub folder_id: String,
    pub timezone: Option<String>,
    pub query: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct MiniCalKey {
    start: i64,
    end: i64,
    folders: BTreeSet<String>,
}

impl MiniCalKey {
    fn new(start: i64, end: i64, folder_ids: &[String]) -> Self {
        Self {
            start,
            end,
            folders: folder_ids.iter().cloned().collect(),
        }
    }
}

/// Per-folder failure reported by a mini-calendar fetch
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MiniCalError {
    #[serde(rename = "id")]
    pub folder_id: String,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(rename = "_content", default)]
    pub message: Option<String>,
}

/// Dates (`yyyyMMdd`) with at least one appointment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MiniCalResult {
    pub dates: Arc<BTreeSet<String>>,
    /// Only present on the fetch that produced the dates
    pub errors: Vec<MiniCalError>,
}

/// Bounded store of summaries and mini-calendar date sets
#[derive(Debug)]
pub struct CalendarSummaryCache {
    summaries: LruCache<SummaryKey, Arc<ApptSummaryResult>>,
    mini_cal: LruCache<MiniCalKey, Arc<BTreeSet<String>>>,
}

impl CalendarSummaryCache {
    /// Both stores hold at most `capacity` entries
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            summaries: LruCache::new(capacity),
            mini_cal: LruCache::new(capacity),
        }
    }

    pub fn get(&mut self, key: &SummaryKey) -> Option<Arc<ApptSummaryResult>> {
        self.summaries.get(key).cloned()
    }

    pub fn put(&mut self, result: ApptSummaryResult) -> Arc<ApptSummaryResult> {
        let result = Arc::new(result);
        if let Some((evicted, _)) = self.summaries.push(result.key(), Arc::clone(&result))
            && evicted != result.key()
        {
            debug!(folder = %evicted.folder_id, start = evicted.start, "evicted appointment summary");
        }
        result
    }

    pub fn mini_cal(&mut self, start: i64, end: i64, folder_ids: &[String]) -> Option<Arc<BTreeSet<String>>> {
        self.mini_cal
            .get(&MiniCalKey::new(start, end, folder_ids))
            .cloned()
    }

    pub fn put_mini_cal(
        &mut self,
        start: i64,
        end: i64,
        folder_ids: &[String],
        dates: BTreeSet<String>,
    ) -> Arc<BTreeSet<String>> {
        let dates = Arc::new(dates);
        self.mini_cal
            .put(MiniCalKey::new(start, end, folder_ids), Arc::clone(&dates));
        dates
    }

    /// Drop results holding item `id`; date sets go too when one did
    pub fn invalidate_item(&mut self, id: &str) -> usize {
        let stale: Vec<SummaryKey> = self
            .summaries
            .iter()
            .filter(|(_, result)| result.appointments.iter().any(|a| a.id == id))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &stale {
            self.summaries.pop(key);
        }
        if !stale.is_empty() {
            self.mini_cal.clear();
        }
        stale.len()
    }

    /// Forget every date set; any calendar item change may move dates
    pub fn clear_mini_cal(&mut self) {
        self.mini_cal.clear();
    }

    /// Drop everything cached for a folder
    pub fn invalidate_folder(&mut self, folder_id: &str) -> usize {
        let stale: Vec<SummaryKey> = self
            .summaries
            .iter()
            .filter(|(key, _)| key.folder_id == folder_id)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &stale {
            self.summaries.pop(key);
        }
        let stale_sets: Vec<MiniCalKey> = self
            .mini_cal
            .iter()
            .filter(|(key, _)| key.folders.contains(folder_id))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &stale_sets {
            self.mini_cal.pop(key);
        }
        stale.len()
    }

    pub fn clear(&mut self) {
        self.summaries.clear();
        self.mini_cal.clear();
    }

    pub fn len(&self) -> usize {
        self.summaries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.summaries.is_empty() && self.mini_cal.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.summaries.cap().get()
    }
}
