//! Session configuration
//!
//! All configuration is loaded from environment variables following the
//! pattern `MAILBOX_MIRROR_<KEY>`. Every value has a default, so an empty
//! environment yields [`MirrorConfig::default`].

use std::env;
use std::env::VarError;
use std::num::NonZeroUsize;
use std::time::Duration;

use crate::errors::{MirrorError, MirrorResult};

/// Mailbox session configuration
///
/// Injected into a session at construction; nothing here is global state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorConfig {
    /// Account id of the mailbox owner, used to canonicalize qualified ids
    pub account_id: Option<String>,
    /// Capacity of the singly-fetched message cache
    pub message_cache_size: NonZeroUsize,
    /// Capacity of the contact cache
    pub contact_cache_size: NonZeroUsize,
    /// Number of plain search pagers retained
    pub search_pager_cache_size: NonZeroUsize,
    /// Number of conversation search pagers retained
    pub conv_pager_cache_size: NonZeroUsize,
    /// Appointment summaries (and, separately, mini-calendar sets) retained
    pub appt_summary_cache_size: NonZeroUsize,
    /// Maximum number of callers allowed to wait on the session lock
    pub lock_max_waiting: usize,
    /// How long a caller waits for the session lock, in milliseconds
    pub lock_timeout_ms: u64,
    /// Issue a no-op before trusting an already populated folder tree
    pub always_refresh_folders: bool,
    /// Run without a notification session (no piggy-backed changes)
    pub no_session: bool,
    /// Never fetch or cache tags
    pub no_tag_cache: bool,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            account_id: None,
            message_cache_size: NonZeroUsize::MIN,
            contact_cache_size: nonzero(25),
            search_pager_cache_size: nonzero(5),
            conv_pager_cache_size: nonzero(5),
            appt_summary_cache_size: nonzero(32),
            lock_max_waiting: 15,
            lock_timeout_ms: 60_000,
            always_refresh_folders: false,
            no_session: false,
            no_tag_cache: false,
        }
    }
}

impl MirrorConfig {
    /// Load all configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if a variable is set to a malformed value or a
    /// cache capacity is zero.
    ///
    /// # Example Environment
    ///
    /// ```text
    /// MAILBOX_MIRROR_ACCOUNT_ID=6f1f0e3c-1d5e-4a41-9f6b-0c6d2b7a9e10
    /// MAILBOX_MIRROR_MESSAGE_CACHE_SIZE=10
    /// MAILBOX_MIRROR_LOCK_TIMEOUT_MS=30000
    /// MAILBOX_MIRROR_NO_SESSION=false
    /// ```
    pub fn load_from_env() -> MirrorResult<Self> {
        let defaults = Self::default();
        Ok(Self {
            account_id: optional_env("MAILBOX_MIRROR_ACCOUNT_ID")?,
            message_cache_size: parse_capacity_env(
                "MAILBOX_MIRROR_MESSAGE_CACHE_SIZE",
                defaults.message_cache_size,
            )?,
            contact_cache_size: parse_capacity_env(
                "MAILBOX_MIRROR_CONTACT_CACHE_SIZE",
                defaults.contact_cache_size,
            )?,
            search_pager_cache_size: parse_capacity_env(
                "MAILBOX_MIRROR_SEARCH_PAGER_CACHE_SIZE",
                defaults.search_pager_cache_size,
            )?,
            conv_pager_cache_size: parse_capacity_env(
                "MAILBOX_MIRROR_CONV_PAGER_CACHE_SIZE",
                defaults.conv_pager_cache_size,
            )?,
            appt_summary_cache_size: parse_capacity_env(
                "MAILBOX_MIRROR_APPT_SUMMARY_CACHE_SIZE",
                defaults.appt_summary_cache_size,
            )?,
            lock_max_waiting: parse_usize_env(
                "MAILBOX_MIRROR_LOCK_MAX_WAITING",
                defaults.lock_max_waiting,
            )?,
            lock_timeout_ms: parse_u64_env("MAILBOX_MIRROR_LOCK_TIMEOUT_MS", defaults.lock_timeout_ms)?,
            always_refresh_folders: parse_bool_env("MAILBOX_MIRROR_ALWAYS_REFRESH_FOLDERS", false)?,
            no_session: parse_bool_env("MAILBOX_MIRROR_NO_SESSION", false)?,
            no_tag_cache: parse_bool_env("MAILBOX_MIRROR_NO_TAG_CACHE", false)?,
        })
    }

    /// Lock acquisition timeout as a `Duration`
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}

fn nonzero(value: usize) -> NonZeroUsize {
    NonZeroUsize::new(value).unwrap_or(NonZeroUsize::MIN)
}

/// Read an optional environment variable, treating blank as unset
fn optional_env(key: &str) -> MirrorResult<Option<String>> {
    match env::var(key) {
        Ok(v) if v.trim().is_empty() => Ok(None),
        Ok(v) => Ok(Some(v.trim().to_owned())),
        Err(VarError::NotPresent) => Ok(None),
        Err(VarError::NotUnicode(_)) => Err(MirrorError::InvalidInput(format!(
            "environment variable {key} contains non-unicode data"
        ))),
    }
}

/// Parse a boolean environment variable with flexible values
///
/// Accepts: `1`, `true`, `yes`, `y`, `on` (truthy) or `0`, `false`, `no`,
/// `n`, `off` (falsy). Case-insensitive. Returns `default` if unset.
fn parse_bool_env(key: &str, default: bool) -> MirrorResult<bool> {
    match optional_env(key)? {
        Some(v) => parse_bool_value(&v).ok_or_else(|| {
            MirrorError::InvalidInput(format!("invalid boolean environment variable {key}: '{v}'"))
        }),
        None => Ok(default),
    }
}

fn parse_bool_value(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "y" | "on" => Some(true),
        "0" | "false" | "no" | "n" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a `u64` environment variable with default fallback
fn parse_u64_env(key: &str, default: u64) -> MirrorResult<u64> {
    match optional_env(key)? {
        Some(v) => v.parse::<u64>().map_err(|_| {
            MirrorError::InvalidInput(format!("invalid u64 environment variable {key}: '{v}'"))
        }),
        None => Ok(default),
    }
}

/// Parse a `usize` environment variable with default fallback
fn parse_usize_env(key: &str, default: usize) -> MirrorResult<usize> {
    match optional_env(key)? {
        Some(v) => v.parse::<usize>().map_err(|_| {
            MirrorError::InvalidInput(format!("invalid usize environment variable {key}: '{v}'"))
        }),
        None => Ok(default),
    }
}

/// Parse a cache capacity; zero is rejected
fn parse_capacity_env(key: &str, default: NonZeroUsize) -> MirrorResult<NonZeroUsize> {
    let raw = parse_usize_env(key, default.get())?;
    parse_capacity(raw).ok_or_else(|| {
        MirrorError::InvalidInput(format!("{key} must be at least 1, got {raw}"))
    })
}

fn parse_capacity(raw: usize) -> Option<NonZeroUsize> {
    NonZeroUsize::new(raw)
}

#[cfg(test)]
mod tests {
    use super::{MirrorConfig, parse_bool_value, parse_capacity};

    #[test]
    fn parse_bool_value_accepts_common_truthy_and_falsy_values() {
        for truthy in ["1", "true", "TRUE", " yes ", "Y", "on"] {
            assert_eq!(parse_bool_value(truthy), Some(true));
        }

        for falsy in ["0", "false", "FALSE", " no ", "N", "off"] {
            assert_eq!(parse_bool_value(falsy), Some(false));
        }
    }

    #[test]
    fn parse_bool_value_rejects_unrecognized_values() {
        for invalid in ["", "2", "maybe", "enabled"] {
            assert_eq!(parse_bool_value(invalid), None);
        }
    }

    #[test]
    fn zero_capacity_is_rejected() {
        assert!(parse_capacity(0).is_none());
        assert_eq!(parse_capacity(7).map(|c| c.get()), Some(7));
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = MirrorConfig::default();
        assert_eq!(config.message_cache_size.get(), 1);
        assert_eq!(config.contact_cache_size.get(), 25);
        assert_eq!(config.search_pager_cache_size.get(), 5);
        assert_eq!(config.conv_pager_cache_size.get(), 5);
        assert_eq!(config.appt_summary_cache_size.get(), 32);
        assert_eq!(config.lock_max_waiting, 15);
        assert_eq!(config.lock_timeout().as_secs(), 60);
        assert!(!config.no_session);
    }
}
