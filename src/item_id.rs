//! Item identifier parsing and canonical forms
//!
//! Server item ids come in two textual forms that name the same item: the
//! short local form (`257`) and the owner-qualified form
//! (`<account-id>:257`). References into shared or mounted mailboxes always
//! use the qualified form, local operations the short one.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::{MirrorError, MirrorResult};

/// Parsed item identifier
///
/// # Format
///
/// `{item}` or `{account_id}:{item}` where `item` is a decimal number. The
/// account id is everything before the last colon.
///
/// # Example
///
/// ```
/// use mailbox_mirror::item_id::ItemId;
///
/// let id = ItemId::parse("acct-1:257").unwrap();
/// assert_eq!(id.account_id.as_deref(), Some("acct-1"));
/// assert_eq!(id.item, "257");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemId {
    /// Owning account, absent for the short form
    pub account_id: Option<String>,
    /// Item number within the owning mailbox
    pub item: String,
}

impl ItemId {
    /// Parse an id in either form
    ///
    /// Returns an error if the item part is empty or not numeric, or if the
    /// account part of a qualified id is empty. Folder names such as `INBOX`
    /// are therefore rejected.
    pub fn parse(raw: &str) -> MirrorResult<Self> {
        let raw = raw.trim();
        let (account_id, item) = match raw.rsplit_once(':') {
            Some((account, item)) => {
                if account.is_empty() {
                    return Err(MirrorError::invalid(format!(
                        "item id '{raw}' has an empty account part"
                    )));
                }
                (Some(account.to_owned()), item)
            }
            None => (None, raw),
        };
        if item.is_empty() || !item.bytes().all(|b| b.is_ascii_digit()) {
            return Err(MirrorError::invalid(format!(
                "item id '{raw}' must end in a numeric item part"
            )));
        }
        Ok(Self {
            account_id,
            item: item.to_owned(),
        })
    }

    /// Encode in the simplest form relative to `own_account`
    ///
    /// Drops the account part when it names the mailbox owner.
    pub fn simplest(&self, own_account: Option<&str>) -> String {
        match (&self.account_id, own_account) {
            (Some(account), Some(own)) if account == own => self.item.clone(),
            (Some(account), _) => format!("{account}:{}", self.item),
            (None, _) => self.item.clone(),
        }
    }

    /// Encode in the owner-qualified form, defaulting to `own_account`
    pub fn qualified(&self, own_account: &str) -> String {
        let account = self.account_id.as_deref().unwrap_or(own_account);
        format!("{account}:{}", self.item)
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.account_id {
            Some(account) => write!(f, "{account}:{}", self.item),
            None => f.write_str(&self.item),
        }
    }
}

/// Canonical index key for `raw`
///
/// Ids that do not parse (names, opaque tokens) are used verbatim.
pub fn canonical_key(raw: &str, own_account: Option<&str>) -> String {
    match ItemId::parse(raw) {
        Ok(id) => id.simplest(own_account),
        Err(_) => raw.to_owned(),
    }
}

/// The other textual form of `raw`, if one exists
///
/// A short id maps to its qualified form and a self-qualified id to its
/// short form. Ids owned by another account have no alternate.
pub fn alternate_key(raw: &str, own_account: Option<&str>) -> Option<String> {
    let own = own_account?;
    let id = ItemId::parse(raw).ok()?;
    match id.account_id.as_deref() {
        None => Some(id.qualified(own)),
        Some(account) if account == own => Some(id.item),
        Some(_) => None,
    }
}

/// Split a comma separated id list, dropping blanks
pub fn split_id_list(ids: &str) -> Vec<String> {
    ids.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{ItemId, alternate_key, canonical_key, split_id_list};

    #[test]
    fn parses_short_and_qualified_ids() {
        let short = ItemId::parse("257").expect("parse succeeds");
        assert_eq!(short.account_id, None);
        assert_eq!(short.item, "257");

        let qualified = ItemId::parse("a1b2:300").expect("parse succeeds");
        assert_eq!(qualified.account_id.as_deref(), Some("a1b2"));
        assert_eq!(qualified.to_string(), "a1b2:300");
    }

    #[test]
    fn rejects_folder_names_and_empty_parts() {
        assert!(ItemId::parse("INBOX").is_err());
        assert!(ItemId::parse(":12").is_err());
        assert!(ItemId::parse("acct:").is_err());
    }

    #[test]
    fn own_account_qualification_collapses() {
        assert_eq!(canonical_key("me:2", Some("me")), "2");
        assert_eq!(canonical_key("other:2", Some("me")), "other:2");
        assert_eq!(canonical_key("Inbox", Some("me")), "Inbox");
    }

    #[test]
    fn alternate_forms() {
        assert_eq!(alternate_key("2", Some("me")).as_deref(), Some("me:2"));
        assert_eq!(alternate_key("me:2", Some("me")).as_deref(), Some("2"));
        assert_eq!(alternate_key("other:2", Some("me")), None);
        assert_eq!(alternate_key("2", None), None);
    }

    #[test]
    fn splits_deleted_id_lists() {
        assert_eq!(split_id_list("1, 2,,3 "), vec!["1", "2", "3"]);
        assert!(split_id_list("").is_empty());
    }
}
