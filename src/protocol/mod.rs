//! Tus protocol handlers.
//!
//! Implements the slice of the tus resumable-upload protocol the mock
//! models: creation (`POST`), status (`HEAD`) and append (`PATCH`), with the
//! `creation` extension only. Requests are dispatched through a static route
//! table; every failure resolves here into a protocol-legible response, so
//! nothing propagates past the handler boundary.

use crate::delay;
use crate::emitter::Emitter;
use crate::id::IdGenerator;
use crate::store::{KeyValueStore, StoreError, UploadStore};
use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{HeaderMap, CONTENT_TYPE, LOCATION};
use hyper::{Method, Response, StatusCode};
use tracing::{error, info, warn};

/// Protocol version advertised on create responses.
pub const TUS_VERSION: &str = "1.0.0";

/// Extensions advertised on create responses. Only creation is modeled.
pub const TUS_EXTENSIONS: &str = "creation";

/// Largest declared length a create request is allowed to ask for (1 GiB).
/// The mock allocates the whole buffer up front, so an absurd length would
/// otherwise take down the serving task instead of producing a response.
pub const MAX_UPLOAD_LENGTH: u64 = 1 << 30;

/// A request routed to one of the mock's operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TusOperation {
    Create,
    Status { id: String },
    Append { id: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RouteKind {
    Create,
    Status,
    Append,
}

/// Route table, tried in order. Patterns are relative to the configured path
/// prefix; `{id}` captures a single non-empty segment.
const ROUTES: &[(&str, &str, RouteKind)] = &[
    ("POST", "/", RouteKind::Create),
    ("HEAD", "/{id}", RouteKind::Status),
    ("PATCH", "/{id}", RouteKind::Append),
];

/// Match `path` against the route table. `None` means the request does not
/// target the upload endpoint; the server turns that into a plain 404.
pub fn route(prefix: &str, method: &Method, path: &str) -> Option<TusOperation> {
    let rest = path.strip_prefix(prefix)?;
    for (route_method, pattern, kind) in ROUTES {
        if method.as_str() != *route_method {
            continue;
        }
        if let Some(id) = match_pattern(pattern, rest) {
            return Some(match kind {
                RouteKind::Create => TusOperation::Create,
                RouteKind::Status => TusOperation::Status { id: id?.to_string() },
                RouteKind::Append => TusOperation::Append { id: id?.to_string() },
            });
        }
    }
    None
}

/// Compare a path against a pattern one URL segment at a time.
///
/// Returns `None` on a miss; on a hit, the inner option carries the segment
/// captured by `{id}`, if the pattern has one. A `{id}` segment never matches
/// an empty path segment.
fn match_pattern<'p>(pattern: &str, path: &'p str) -> Option<Option<&'p str>> {
    let mut captured = None;
    let mut pattern_segments = pattern.split('/');
    let mut path_segments = path.split('/');
    loop {
        match (pattern_segments.next(), path_segments.next()) {
            (None, None) => return Some(captured),
            (Some("{id}"), Some(segment)) if !segment.is_empty() => captured = Some(segment),
            (Some(expected), Some(segment)) if expected == segment => {}
            _ => return None,
        }
    }
}

/// Events published on the mock's mutating paths, for harnesses that want to
/// await upload activity instead of polling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadEvent {
    Created { id: String, length: u64 },
    Appended { id: String, new_offset: u64 },
}

/// The three protocol handlers, bound to an upload store and an id
/// generator.
///
/// Handlers keep no per-session state of their own; every request is
/// resolved against the store. The offset-compare-then-append sequence is
/// only atomic with respect to one caller awaiting sequentially, not across
/// interleaved appends to the same id. The mock targets sequential test
/// scenarios, not concurrent-writer correctness.
pub struct TusHandlers<S> {
    store: UploadStore<S>,
    ids: IdGenerator,
    path_prefix: String,
    patch_delay_ms: u64,
    events: Emitter<UploadEvent>,
}

impl<S: KeyValueStore> TusHandlers<S> {
    pub fn new(store: UploadStore<S>, path_prefix: impl Into<String>, patch_delay_ms: u64) -> Self {
        Self::with_id_generator(store, path_prefix, patch_delay_ms, IdGenerator::new())
    }

    /// Construct with an injected id generator, for tests that need a
    /// deterministic id sequence.
    pub fn with_id_generator(
        store: UploadStore<S>,
        path_prefix: impl Into<String>,
        patch_delay_ms: u64,
        ids: IdGenerator,
    ) -> Self {
        Self {
            store,
            ids,
            path_prefix: path_prefix.into(),
            patch_delay_ms,
            events: Emitter::new(),
        }
    }

    /// The backing record store, exposed so harnesses can inspect upload
    /// contents directly.
    pub fn store(&self) -> &UploadStore<S> {
        &self.store
    }

    /// Event stream fed by the create and append success paths.
    pub fn events(&self) -> &Emitter<UploadEvent> {
        &self.events
    }

    /// Dispatch a request through the route table.
    ///
    /// `None` means the request does not target the upload endpoint at all;
    /// any routed request produces a response, never an error.
    pub async fn handle(
        &self,
        method: &Method,
        path: &str,
        headers: &HeaderMap,
        body: Bytes,
    ) -> Option<Response<Full<Bytes>>> {
        match route(&self.path_prefix, method, path)? {
            TusOperation::Create => Some(self.create(headers).await),
            TusOperation::Status { id } => Some(self.status(&id).await),
            TusOperation::Append { id } => Some(self.append(&id, headers, body).await),
        }
    }

    async fn create(&self, headers: &HeaderMap) -> Response<Full<Bytes>> {
        let Some(declared_length) = header_u64(headers, "Upload-Length") else {
            warn!("create rejected: missing or unparsable Upload-Length");
            return text_response(StatusCode::BAD_REQUEST, "Upload-Length header required");
        };
        if declared_length > MAX_UPLOAD_LENGTH {
            warn!(declared_length, "create rejected: Upload-Length too large");
            return text_response(StatusCode::BAD_REQUEST, "Upload-Length exceeds supported maximum");
        }

        let id = self.ids.next_id();
        if let Err(e) = self.store.create(&id, declared_length).await {
            return internal_error(e);
        }

        info!(id = %id, declared_length, "created upload");
        self.events.emit(&UploadEvent::Created {
            id: id.clone(),
            length: declared_length,
        });

        Response::builder()
            .status(StatusCode::CREATED)
            .header(LOCATION, format!("{}/{}", self.path_prefix, id))
            .header("Tus-Resumable", TUS_VERSION)
            .header("Tus-Extension", TUS_EXTENSIONS)
            .body(Full::new(Bytes::new()))
            .expect("Failed to build create response")
    }

    async fn status(&self, id: &str) -> Response<Full<Bytes>> {
        match self.status_inner(id).await {
            Ok(response) => response,
            Err(StoreError::NotFound(_)) => status_only(StatusCode::NOT_FOUND),
            Err(e) => internal_error(e),
        }
    }

    async fn status_inner(&self, id: &str) -> Result<Response<Full<Bytes>>, StoreError> {
        if !self.store.exists(id).await? {
            return Err(StoreError::NotFound(id.to_string()));
        }
        let length = self.store.upload_length(id).await?;
        let offset = self.store.upload_offset(id).await?;

        Ok(Response::builder()
            .status(StatusCode::OK)
            .header("Upload-Length", length)
            .header("Upload-Offset", offset)
            .body(Full::new(Bytes::new()))
            .expect("Failed to build status response"))
    }

    async fn append(&self, id: &str, headers: &HeaderMap, body: Bytes) -> Response<Full<Bytes>> {
        match self.append_inner(id, headers, body).await {
            Ok(response) => response,
            Err(StoreError::NotFound(_)) => status_only(StatusCode::NOT_FOUND),
            Err(e) => internal_error(e),
        }
    }

    async fn append_inner(
        &self,
        id: &str,
        headers: &HeaderMap,
        body: Bytes,
    ) -> Result<Response<Full<Bytes>>, StoreError> {
        if !self.store.exists(id).await? {
            return Err(StoreError::NotFound(id.to_string()));
        }

        // Missing header means offset 0; an unparsable value can never equal
        // the stored offset, so it falls out as a conflict.
        let supplied = match headers.get("Upload-Offset") {
            None => Some(0),
            Some(value) => value.to_str().ok().and_then(|s| s.trim().parse::<u64>().ok()),
        };
        let current = self.store.upload_offset(id).await?;
        let offset = match supplied {
            Some(offset) if offset == current => offset,
            _ => {
                warn!(id, current, supplied = ?supplied, "offset mismatch, rejecting append");
                return Ok(status_only(StatusCode::CONFLICT));
            }
        };

        if let Err(e) = self.store.append(id, offset, body).await {
            // The record slipped away (or the write overran the buffer)
            // between the offset check and the write. Hand the client the
            // bytes we do have so it can re-synchronize.
            warn!(id, error = %e, "append failed, returning current body");
            let current_body = self.store.body(id).await?;
            return Ok(Response::builder()
                .status(StatusCode::OK)
                .header(CONTENT_TYPE, "image/png")
                .body(Full::new(current_body))
                .expect("Failed to build recovery response"));
        }

        // Deliberate short delay, part of the observable contract for test
        // scenarios that race uploads against timers.
        delay::wait_millis(self.patch_delay_ms).await;

        let new_offset = self.store.upload_offset(id).await?;
        info!(id, new_offset, "append applied");
        self.events.emit(&UploadEvent::Appended {
            id: id.to_string(),
            new_offset,
        });

        Ok(Response::builder()
            .status(StatusCode::NO_CONTENT)
            .header("Upload-Offset", new_offset)
            .body(Full::new(Bytes::new()))
            .expect("Failed to build append response"))
    }
}

fn header_u64(headers: &HeaderMap, name: &str) -> Option<u64> {
    headers
        .get(name)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
}

fn status_only(status: StatusCode) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .body(Full::new(Bytes::new()))
        .expect("Failed to build response")
}

fn text_response(status: StatusCode, message: &str) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header(CONTENT_TYPE, "text/plain")
        .body(Full::new(Bytes::from(message.to_string())))
        .expect("Failed to build text response")
}

fn internal_error(e: StoreError) -> Response<Full<Bytes>> {
    error!(error = %e, "store failure escaped protocol mapping");
    text_response(StatusCode::INTERNAL_SERVER_ERROR, "internal store error")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_create() {
        let op = route("/files", &Method::POST, "/files/").unwrap();
        assert_eq!(op, TusOperation::Create);
    }

    #[test]
    fn test_route_status_extracts_id() {
        let op = route("/files", &Method::HEAD, "/files/17-0").unwrap();
        assert_eq!(op, TusOperation::Status { id: "17-0".into() });
    }

    #[test]
    fn test_route_append_extracts_id() {
        let op = route("/files", &Method::PATCH, "/files/17-0").unwrap();
        assert_eq!(op, TusOperation::Append { id: "17-0".into() });
    }

    #[test]
    fn test_route_rejects_other_methods() {
        assert!(route("/files", &Method::GET, "/files/17-0").is_none());
        assert!(route("/files", &Method::DELETE, "/files/").is_none());
    }

    #[test]
    fn test_route_rejects_foreign_prefix() {
        assert!(route("/files", &Method::POST, "/uploads/").is_none());
    }

    #[test]
    fn test_route_rejects_nested_paths() {
        assert!(route("/files", &Method::HEAD, "/files/a/b").is_none());
        assert!(route("/files", &Method::PATCH, "/files/").is_none());
    }

    #[test]
    fn test_match_pattern_requires_nonempty_id() {
        assert!(match_pattern("/{id}", "/").is_none());
        assert_eq!(match_pattern("/{id}", "/abc"), Some(Some("abc")));
        assert_eq!(match_pattern("/", "/"), Some(None));
    }
}
