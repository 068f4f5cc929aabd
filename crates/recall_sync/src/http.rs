//! HTTP endpoint over the remote events/attachments API.
//!
//! Wire surface:
//! - `GET /events?afterID&limit` → `{"type": "list", "hasMore": bool,
//!   "items": [Event]}`
//! - `PATCH /events` with an `Event[]` body → 204
//! - `GET`/`POST`/`HEAD` `/attachments/{id}` for payload bytes, with the
//!   MIME type carried in `Content-Type`
//!
//! The credential is an opaque bearer token; policy behind it is the
//! server's concern.

use crate::endpoint::{EventBatch, SyncEndpoint};
use crate::error::{SyncError, SyncResult};
use recall_core::{AttachmentMimeType, EntityId, Event, EventId};
use serde::Deserialize;
use std::io::Read;
use std::time::Duration;

/// Hard cap on attachment payloads read into memory.
const MAX_ATTACHMENT_BYTES: u64 = 64 * 1024 * 1024;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListEnvelope {
    #[serde(rename = "type")]
    kind: String,
    has_more: bool,
    items: Vec<Event>,
}

/// [`SyncEndpoint`] talking to a remote server over HTTP.
pub struct HttpEndpoint {
    agent: ureq::Agent,
    base_url: String,
    authorization: String,
}

impl HttpEndpoint {
    /// Creates an endpoint for `base_url` (no trailing slash) using the
    /// given bearer credential.
    #[must_use]
    pub fn new(base_url: impl Into<String>, credential: &str) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(30))
            .build();
        Self {
            agent,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            authorization: format!("Bearer {credential}"),
        }
    }

    /// Returns the base URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

fn status_error(code: u16, body: String) -> SyncError {
    match code {
        401 | 403 => SyncError::AuthenticationFailed(body),
        500..=599 => SyncError::ServerError(format!("status {code}: {body}")),
        _ => SyncError::Protocol(format!("unexpected status {code}: {body}")),
    }
}

fn request_error(error: ureq::Error) -> SyncError {
    match error {
        ureq::Error::Status(code, response) => {
            let body = response.into_string().unwrap_or_default();
            status_error(code, body)
        }
        ureq::Error::Transport(transport) => {
            SyncError::transport_retryable(transport.to_string())
        }
    }
}

fn read_body(response: ureq::Response) -> SyncResult<Vec<u8>> {
    read_limited(response.into_reader(), MAX_ATTACHMENT_BYTES)
}

/// Reads at most `cap` bytes; a longer body is a protocol error, never a
/// silent truncation (attachments are immutable once stored).
fn read_limited(reader: impl Read, cap: u64) -> SyncResult<Vec<u8>> {
    let mut bytes = Vec::new();
    reader
        .take(cap + 1)
        .read_to_end(&mut bytes)
        .map_err(|e| SyncError::transport_retryable(e.to_string()))?;
    if bytes.len() as u64 > cap {
        return Err(SyncError::Protocol(format!(
            "attachment payload exceeds the {cap}-byte limit"
        )));
    }
    Ok(bytes)
}

impl SyncEndpoint for HttpEndpoint {
    fn list_events(&self, after: Option<&EventId>, limit: usize) -> SyncResult<EventBatch> {
        let mut request = self
            .agent
            .get(&self.url("/events"))
            .set("Authorization", &self.authorization)
            .query("limit", &limit.to_string());
        if let Some(after) = after {
            request = request.query("afterID", after.as_str());
        }

        let envelope: ListEnvelope = request
            .call()
            .map_err(request_error)?
            .into_json()
            .map_err(|e| SyncError::Protocol(format!("bad list response: {e}")))?;

        if envelope.kind != "list" {
            return Err(SyncError::Protocol(format!(
                "expected a list response, got {:?}",
                envelope.kind
            )));
        }
        Ok(EventBatch {
            events: envelope.items,
            has_more: envelope.has_more,
        })
    }

    fn put_events(&self, events: Vec<Event>) -> SyncResult<()> {
        self.agent
            .request("PATCH", &self.url("/events"))
            .set("Authorization", &self.authorization)
            .send_json(&events)
            .map_err(request_error)?;
        Ok(())
    }

    fn put_attachment(
        &self,
        id: &EntityId,
        mime_type: AttachmentMimeType,
        contents: &[u8],
    ) -> SyncResult<()> {
        self.agent
            .post(&self.url(&format!("/attachments/{id}")))
            .set("Authorization", &self.authorization)
            .set("Content-Type", mime_type.as_str())
            .send_bytes(contents)
            .map_err(request_error)?;
        Ok(())
    }

    fn get_attachment(
        &self,
        id: &EntityId,
    ) -> SyncResult<Option<(AttachmentMimeType, Vec<u8>)>> {
        let response = match self
            .agent
            .get(&self.url(&format!("/attachments/{id}")))
            .set("Authorization", &self.authorization)
            .call()
        {
            Ok(response) => response,
            Err(ureq::Error::Status(404, _)) => return Ok(None),
            Err(error) => return Err(request_error(error)),
        };

        let content_type = response.content_type().to_string();
        let mime_type = AttachmentMimeType::from_str_opt(&content_type).ok_or_else(|| {
            SyncError::Protocol(format!("unsupported attachment type {content_type:?}"))
        })?;
        Ok(Some((mime_type, read_body(response)?)))
    }

    fn has_attachment(&self, id: &EntityId) -> SyncResult<bool> {
        match self
            .agent
            .head(&self.url(&format!("/attachments/{id}")))
            .set("Authorization", &self.authorization)
            .call()
        {
            Ok(_) => Ok(true),
            Err(ureq::Error::Status(404, _)) => Ok(false),
            Err(error) => Err(request_error(error)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_map_to_error_kinds() {
        assert!(matches!(
            status_error(401, String::new()),
            SyncError::AuthenticationFailed(_)
        ));
        assert!(status_error(503, String::new()).is_retryable());
        assert!(!status_error(422, String::new()).is_retryable());
    }

    #[test]
    fn oversized_payloads_error_instead_of_truncating() {
        let body = vec![7u8; 9];
        assert!(matches!(
            read_limited(&body[..], 8),
            Err(SyncError::Protocol(_))
        ));

        let body = vec![7u8; 8];
        assert_eq!(read_limited(&body[..], 8).unwrap(), body);
    }

    #[test]
    fn base_url_drops_trailing_slash() {
        let endpoint = HttpEndpoint::new("https://api.example.com/", "token");
        assert_eq!(endpoint.base_url(), "https://api.example.com");
        assert_eq!(endpoint.url("/events"), "https://api.example.com/events");
    }
}
