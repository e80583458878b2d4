//! mailbox-mirror: client-side mailbox mirror kept current by notifications
//!
//! A session keeps a local copy of a remote mailbox's folder tree, tag
//! registry and mailbox size, plus bounded caches of fetched messages,
//! contacts, search pages and calendar summaries. Every response from the
//! server carries a context fragment (full refresh, change token,
//! incremental created/modified/deleted records) that is applied to the
//! mirror before the caller sees the result.
//!
//! # Architecture
//!
//! - [`session`]: Public API; lock, populate, invoke, apply, publish
//! - [`notify`]: Applies response contexts to the mirror and caches
//! - [`mirror`]: Immutable-snapshot mirror of folders, tags and size
//! - [`tree`]: Folder hierarchy with paths, orphans and reparenting
//! - [`index`]: Id/uuid/alias identity index
//! - [`tags`]: Case-insensitive tag name registry
//! - [`cache`]: Bounded LRU caches for messages and contacts
//! - [`pagination`]: Search pagers with windowed page merging
//! - [`calendar`]: Appointment summary and mini-calendar caches
//! - [`sync`]: Change token, notification sequence and refresh planning
//! - [`guard`]: Bounded-wait session lock
//! - [`events`]: Listener registration and dispatch
//! - [`transport`]: Remote call seam and a scripted replay transport
//! - [`context`]: Response context envelope
//! - [`models`]: Folder, tag, message, contact and hit records
//! - [`item_id`]: Account-qualified item id handling
//! - [`config`]: Environment-driven configuration
//! - [`errors`]: Error model with stable codes

pub mod cache;
pub mod calendar;
pub mod config;
pub mod context;
pub mod errors;
pub mod events;
pub mod guard;
pub mod index;
pub mod item_id;
pub mod mirror;
pub mod models;
pub mod notify;
pub mod pagination;
pub mod session;
pub mod sync;
pub mod tags;
pub mod transport;
pub mod tree;

#[cfg(test)]
pub(crate) mod testing;

pub use config::MirrorConfig;
pub use errors::{MirrorError, MirrorResult, TransportError};
pub use events::MirrorListener;
pub use mirror::Mirror;
pub use models::{Contact, FolderNode, Message, SearchHit, Tag};
pub use pagination::{SearchPage, SearchParams};
pub use session::{ApptSummaryQuery, MailboxSession};
pub use transport::{ReplayTransport, Request, Response, Transport};
