//! JSON-lines host protocol.
//!
//! One frame per line in each direction:
//!
//! ```text
//! → {"id":1,"type":"fetch","request":{"method":"GET","url":"/styles.css"}}
//! ← {"id":1,"ok":true,"outcome":{"kind":"response","class":"static",...}}
//! → {"id":2,"type":"sync","tag":"raffle-action"}
//! ← {"id":2,"ok":false,"error":{"code":"QUEUE_UNAVAILABLE","message":"..."}}
//! ```
//!
//! `id` is optional and echoed verbatim. Bodies travel as text when they are
//! valid UTF-8 and as standard base64 otherwise; `body_encoding` says which.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use swcache_client::fetch::resolve;
use swcache_client::{DrainReport, RequestClass, ResponseSource};
use swcache_core::{EvictionReport, Headers, NewAction, QueuedAction, Request, Response, ResponseType};

use crate::error::{ErrorBody, HostError};
use crate::lifecycle::{Event, LifecycleController, Outcome};

/// How a body is carried inside a JSON string.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BodyEncoding {
    #[default]
    Utf8,
    Base64,
}

impl BodyEncoding {
    /// Pick the encoding that carries `body` without loss.
    fn encode(body: &[u8]) -> (Self, String) {
        match std::str::from_utf8(body) {
            Ok(text) => (BodyEncoding::Utf8, text.to_string()),
            Err(_) => (BodyEncoding::Base64, STANDARD.encode(body)),
        }
    }

    fn decode(self, body: String) -> Result<Bytes, HostError> {
        match self {
            BodyEncoding::Utf8 => Ok(Bytes::from(body)),
            BodyEncoding::Base64 => STANDARD
                .decode(body.as_bytes())
                .map(Bytes::from)
                .map_err(|e| HostError::MalformedFrame(format!("body is not valid base64: {e}"))),
        }
    }
}

/// An intercepted request as sent by the host.
#[derive(Debug, Clone, Deserialize)]
pub struct WireRequest {
    #[serde(default = "default_method")]
    pub method: String,
    /// Absolute, or relative to the serving origin.
    pub url: String,
    #[serde(default)]
    pub headers: Headers,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub body_encoding: BodyEncoding,
}

fn default_method() -> String {
    "GET".into()
}

impl WireRequest {
    pub fn into_request(self, origin: &Url) -> Result<Request, HostError> {
        let url = resolve(&self.url, origin).map_err(|e| HostError::MalformedFrame(e.to_string()))?;
        let mut request = Request::new(&self.method, url);
        for (name, value) in self.headers {
            request = request.with_header(&name, value);
        }
        if let Some(body) = self.body {
            request = request.with_body(self.body_encoding.decode(body)?);
        }
        Ok(request)
    }
}

/// Inbound event frame, minus its id.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WireEvent {
    Install,
    Activate,
    Fetch { request: WireRequest },
    Sync { tag: String },
    Enqueue { action: NewAction },
    Retire,
}

impl WireEvent {
    pub fn into_event(self, origin: &Url) -> Result<Event, HostError> {
        Ok(match self {
            WireEvent::Install => Event::Install,
            WireEvent::Activate => Event::Activate,
            WireEvent::Fetch { request } => Event::Fetch(request.into_request(origin)?),
            WireEvent::Sync { tag } => Event::Sync { tag },
            WireEvent::Enqueue { action } => {
                action.validate()?;
                Event::Enqueue(action)
            }
            WireEvent::Retire => Event::Retire,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct WireResponse {
    pub url: String,
    pub status: u16,
    #[serde(rename = "type")]
    pub response_type: ResponseType,
    pub headers: Headers,
    pub body: String,
    pub body_encoding: BodyEncoding,
}

impl From<Response> for WireResponse {
    fn from(response: Response) -> Self {
        let (body_encoding, body) = BodyEncoding::encode(&response.body);
        WireResponse {
            url: response.url.to_string(),
            status: response.status,
            response_type: response.response_type,
            headers: response.headers,
            body,
            body_encoding,
        }
    }
}

/// Outcome as written on the wire.
#[derive(Debug, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WireOutcome {
    Installed {
        generation: String,
        seeded: bool,
    },
    Activated {
        generation: String,
        eviction: EvictionReport,
    },
    Response {
        class: RequestClass,
        controlled: bool,
        source: ResponseSource,
        response: WireResponse,
    },
    Drained(DrainReport),
    Enqueued {
        action: QueuedAction,
    },
    Retired,
    Ignored {
        reason: String,
    },
}

impl From<Outcome> for WireOutcome {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Installed { generation, seeded } => WireOutcome::Installed { generation, seeded },
            Outcome::Activated { generation, eviction } => WireOutcome::Activated { generation, eviction },
            Outcome::Response { class, controlled, resolution } => WireOutcome::Response {
                class,
                controlled,
                source: resolution.source,
                response: resolution.response.into(),
            },
            Outcome::Drained(report) => WireOutcome::Drained(report),
            Outcome::Enqueued(action) => WireOutcome::Enqueued { action },
            Outcome::Retired => WireOutcome::Retired,
            Outcome::Ignored { reason } => WireOutcome::Ignored { reason },
        }
    }
}

/// Reply frame for one event.
#[derive(Debug, Serialize)]
pub struct Reply {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<WireOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl Reply {
    fn ok(id: Option<Value>, outcome: Outcome) -> Self {
        Self { id, ok: true, outcome: Some(outcome.into()), error: None }
    }

    pub fn err(id: Option<Value>, err: HostError) -> Self {
        Self { id, ok: false, outcome: None, error: Some(err.into()) }
    }

    /// Serialize as a single line without the trailing newline.
    pub fn to_line(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            tracing::error!(error = %e, "failed to encode reply");
            r#"{"ok":false,"error":{"code":"SERIALIZATION","message":"failed to encode reply"}}"#.to_string()
        })
    }
}

/// Split a raw line into its id and event.
pub fn parse_frame(line: &str) -> (Option<Value>, Result<WireEvent, HostError>) {
    let mut value: Value = match serde_json::from_str(line) {
        Ok(value) => value,
        Err(e) => return (None, Err(HostError::MalformedFrame(e.to_string()))),
    };

    let id = value.as_object_mut().and_then(|frame| frame.remove("id"));
    let event = serde_json::from_value(value).map_err(|e| HostError::MalformedFrame(e.to_string()));
    (id, event)
}

/// Handle one inbound line and build its reply.
pub async fn dispatch(controller: &LifecycleController, line: &str) -> Reply {
    let (id, event) = parse_frame(line);

    let event = match event.and_then(|e| e.into_event(controller.origin())) {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!(error = %e, "rejected frame");
            return Reply::err(id, e);
        }
    };

    match controller.handle(event).await {
        Ok(outcome) => Reply::ok(id, outcome),
        Err(e) => Reply::err(id, e.into()),
    }
}
