//! Transport seam
//!
//! The session never speaks a wire protocol itself. It hands a typed
//! [`Request`] plus the [`RequestContext`] to a [`Transport`] and gets back the
//! decoded body and context fragment. [`ReplayTransport`] serves scripted
//! responses, for tests and for replaying captured sessions.

use std::collections::VecDeque;
use std::future::Future;
use std::path::Path;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::context::ResponseContext;
use crate::errors::{MirrorError, MirrorResult, TransportError};
use crate::pagination::SearchParams;
use crate::sync::SessionMode;

/// Per-request session header
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequestContext {
    /// Own account id, if known
    pub account_id: Option<String>,
    /// Highest notification sequence already applied
    pub notify_seq: u64,
    /// Ask the server for a full refresh payload
    pub refresh: bool,
    pub session: SessionMode,
}

/// Parameters that decide what a message fetch returns
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
pub struct MessageParams {
    pub raw: bool,
    pub want_html: bool,
    pub part: Option<String>,
    pub max_inline_length: Option<usize>,
    pub headers: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageFetch {
    pub id: String,
    pub params: MessageParams,
    /// Mark the message read as part of the fetch
    pub mark_read: bool,
}

impl MessageFetch {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            params: MessageParams::default(),
            mark_read: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
pub struct ContactParams {
    /// Resolve group member references
    pub deref_members: bool,
    /// Restrict returned attributes
    pub attrs: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContactFetch {
    pub id: String,
    pub params: ContactParams,
}

impl ContactFetch {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            params: ContactParams::default(),
        }
    }
}

/// Operation sent through the transport
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    NoOp,
    GetFolder,
    GetTags,
    GetMessage(MessageFetch),
    GetContact(ContactFetch),
    Search(SearchParams),
    GetMiniCal {
        start: i64,
        end: i64,
        folder_ids: Vec<String>,
    },
    /// Item action such as `read` or `flag` on messages
    MessageAction { op: String, ids: Vec<String> },
    /// Any other request, passed through untouched
    Custom { name: String, body: Value },
}

impl Request {
    pub fn name(&self) -> &str {
        match self {
            Self::NoOp => "NoOp",
            Self::GetFolder => "GetFolder",
            Self::GetTags => "GetTag",
            Self::GetMessage(_) => "GetMsg",
            Self::GetContact(_) => "GetContacts",
            Self::Search(_) => "Search",
            Self::GetMiniCal { .. } => "GetMiniCal",
            Self::MessageAction { .. } => "MsgAction",
            Self::Custom { name, .. } => name,
        }
    }
}

/// Decoded response: body plus optional context fragment
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Response {
    #[serde(default)]
    pub body: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<ResponseContext>,
}

impl Response {
    pub fn new(body: Value) -> Self {
        Self {
            body,
            context: None,
        }
    }

    pub fn with_context(mut self, context: ResponseContext) -> Self {
        self.context = Some(context);
        self
    }
}

/// Remote call collaborator
pub trait Transport: Send + Sync {
    fn invoke(
        &self,
        ctx: RequestContext,
        request: Request,
    ) -> impl Future<Output = Result<Response, TransportError>> + Send;
}

/// One call seen by a [`ReplayTransport`]
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub context: RequestContext,
    pub request: Request,
}

/// Transport answering from a script of canned replies
///
/// Every call is recorded. Once the script runs dry, calls get an empty
/// body without context.
#[derive(Debug, Default)]
pub struct ReplayTransport {
    script: Mutex<VecDeque<Result<Response, TransportError>>>,
    calls: Mutex<Vec<RecordedCall>>,
    delay: Option<Duration>,
}

impl ReplayTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replies loaded from a JSON array of `{ "body": ..., "context": ... }`
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if the file cannot be read and `Malformed` if
    /// it is not a list of responses.
    pub fn from_file(path: &Path) -> MirrorResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            MirrorError::invalid(format!("cannot read {}: {e}", path.display()))
        })?;
        let replies: Vec<Response> = serde_json::from_str(&raw)
            .map_err(|e| MirrorError::malformed(format!("{}: {e}", path.display())))?;
        let transport = Self::new();
        for reply in replies {
            transport.push(reply);
        }
        Ok(transport)
    }

    /// Hold every call for `delay` before answering
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn push(&self, response: Response) {
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(Ok(response));
    }

    pub fn push_error(&self, error: TransportError) {
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(Err(error));
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Names of the requests seen so far
    pub fn request_names(&self) -> Vec<String> {
        self.calls()
            .iter()
            .map(|c| c.request.name().to_owned())
            .collect()
    }

    pub fn remaining(&self) -> usize {
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl Transport for ReplayTransport {
    async fn invoke(&self, ctx: RequestContext, request: Request) -> Result<Response, TransportError> {
        debug!(request = request.name(), notify_seq = ctx.notify_seq, refresh = ctx.refresh, "replaying request");
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(RecordedCall {
                context: ctx,
                request,
            });
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let reply = self
            .script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        reply.unwrap_or_else(|| Ok(Response::new(Value::Object(Default::default()))))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{ReplayTransport, Request, RequestContext, Response, Transport};
    use crate::errors::TransportError;
    use crate::sync::SessionMode;

    fn ctx() -> RequestContext {
        RequestContext {
            account_id: None,
            notify_seq: 3,
            refresh: false,
            session: SessionMode::Full,
        }
    }

    #[tokio::test]
    async fn replays_in_order_and_records_calls() {
        let transport = ReplayTransport::new();
        transport.push(Response::new(json!({"a": 1})));
        transport.push_error(TransportError::Io("reset".to_owned()));

        let first = transport.invoke(ctx(), Request::NoOp).await.expect("scripted ok");
        assert_eq!(first.body, json!({"a": 1}));
        let second = transport.invoke(ctx(), Request::GetFolder).await;
        assert_eq!(second, Err(TransportError::Io("reset".to_owned())));
        let dry = transport.invoke(ctx(), Request::GetTags).await.expect("empty reply");
        assert!(dry.context.is_none());

        assert_eq!(transport.request_names(), ["NoOp", "GetFolder", "GetTag"]);
        assert_eq!(transport.calls()[0].context.notify_seq, 3);
        assert_eq!(transport.remaining(), 0);
    }

    #[test]
    fn responses_parse_from_capture_format() {
        let replies: Vec<Response> = serde_json::from_value(json!([
            {"body": {}, "context": {"change": {"token": 9}}},
            {"body": {"m": {"id": "77"}}}
        ]))
        .expect("capture parses");
        assert_eq!(replies.len(), 2);
        assert_eq!(
            replies[0].context.as_ref().and_then(|c| c.change.as_ref()).map(|c| c.token),
            Some(9)
        );
    }
}
